//! localchat core library
//!
//! Fully offline chat over locally hosted language models: artifact
//! discovery, engine process lifecycle, and serialized inference sessions
//! with synchronous and streamed generation.

pub mod app;
pub mod catalog;
pub mod engine;
pub mod manager;
pub mod session;
pub mod types;
