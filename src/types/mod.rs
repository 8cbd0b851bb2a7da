//! Shared type definitions
//!
//! This module contains all shared data types used across the crate.

pub mod config;
pub mod generation;
pub mod model;
