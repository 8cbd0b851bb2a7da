//! External inference engine subprocess
//!
//! Owns one llama.cpp-style engine process and its line-oriented duplex
//! transport: the prompt goes to stdin terminated by a newline, response
//! lines come back on stdout, and a blank line or the configured sentinel
//! ends the turn. The transport is half-duplex; submitting a new prompt
//! before the prior response is fully drained corrupts the stream, so the
//! session layer enforces single-flight access.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::engine::{BackendKind, EngineBackend, EngineError, GenerationParams};

/// How long `stop` waits for the process to exit before force-killing.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Window after spawn in which an instant exit is treated as a launch failure
/// (bad model path, missing shared libraries).
const LAUNCH_PROBE: Duration = Duration::from_millis(50);

/// One line read from the engine transport.
#[derive(Debug, PartialEq, Eq)]
pub enum TransportLine {
    Line(String),
    /// stdout closed; the engine exited or broke the pipe
    EndOfStream,
}

/// A running external inference engine and its stdio transport.
#[derive(Debug)]
pub struct InferenceProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    sentinel: String,
    read_timeout: Duration,
    stopped: bool,
}

impl InferenceProcess {
    /// Launch the engine with `<engine> -m <model> --ctx-size <n>`.
    ///
    /// Fails with [`EngineError::Launch`] if the executable is missing or the
    /// process exits immediately; the caller is expected to fall back to an
    /// embedded backend.
    pub async fn spawn(
        engine_path: &Path,
        model_path: &Path,
        context_size: u32,
        sentinel: impl Into<String>,
        read_timeout: Duration,
    ) -> Result<Self, EngineError> {
        if !engine_path.is_file() {
            return Err(EngineError::Launch(format!(
                "engine executable not found: {}",
                engine_path.display()
            )));
        }

        let mut child = Command::new(engine_path)
            .arg("-m")
            .arg(model_path)
            .arg("--ctx-size")
            .arg(context_size.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Launch(e.to_string()))?;

        tokio::time::sleep(LAUNCH_PROBE).await;
        if let Ok(Some(status)) = child.try_wait() {
            return Err(EngineError::Launch(format!(
                "engine exited immediately with {status}"
            )));
        }

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Launch("engine stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Launch("engine stdout not captured".to_string()))?;

        // Drain stderr so the engine never blocks on a full pipe; its
        // diagnostics land in our logs.
        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "localchat::engine_stderr", "{}", line);
                }
            });
        }

        tracing::info!(
            "inference engine started for {} (ctx {})",
            model_path.display(),
            context_size
        );

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            sentinel: sentinel.into(),
            read_timeout,
            stopped: false,
        })
    }

    /// True while the engine process has not exited.
    pub fn is_alive(&mut self) -> bool {
        !self.stopped && matches!(self.child.try_wait(), Ok(None))
    }

    /// Write one prompt to the engine followed by a line terminator.
    pub async fn submit(&mut self, prompt: &str) -> Result<(), EngineError> {
        let write = async {
            self.stdin.write_all(prompt.as_bytes()).await?;
            self.stdin.write_all(b"\n").await?;
            self.stdin.flush().await
        };
        write
            .await
            .map_err(|e| EngineError::TransportWrite(e.to_string()))
    }

    /// Read one line from the engine with the configured per-read timeout.
    pub async fn read_line(&mut self) -> Result<TransportLine, EngineError> {
        match timeout(self.read_timeout, self.stdout.next_line()).await {
            Err(_) => Err(EngineError::ReadTimeout(self.read_timeout)),
            Ok(Err(e)) => Err(EngineError::Crashed(e.to_string())),
            Ok(Ok(None)) => Ok(TransportLine::EndOfStream),
            Ok(Ok(Some(line))) => Ok(TransportLine::Line(line)),
        }
    }

    /// Terminate the engine: kill, bounded wait, force-kill on timeout.
    /// Idempotent; stopping an already-stopped process is a no-op.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if let Err(e) = self.child.start_kill() {
            tracing::debug!("engine process already gone: {}", e);
        }
        match timeout(STOP_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => tracing::info!("inference engine stopped ({status})"),
            Ok(Err(e)) => tracing::warn!("failed to reap inference engine: {}", e),
            Err(_) => {
                let _ = self.child.kill().await;
                tracing::warn!("inference engine force-killed after grace period");
            }
        }
    }

    /// True when `line` (already trimmed) ends the current turn.
    fn ends_turn(&self, line: &str) -> bool {
        line.is_empty() || line == self.sentinel
    }
}

#[async_trait]
impl EngineBackend for InferenceProcess {
    fn kind(&self) -> BackendKind {
        BackendKind::Process
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn complete(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, EngineError> {
        self.submit(prompt).await?;

        let mut lines_out: Vec<String> = Vec::new();
        loop {
            // Safety valve against an engine that never emits the sentinel.
            if lines_out.len() >= params.max_tokens as usize {
                tracing::warn!(
                    "engine response exceeded {} lines without a sentinel, truncating",
                    params.max_tokens
                );
                break;
            }
            match self.read_line().await? {
                TransportLine::EndOfStream => {
                    return Err(EngineError::Crashed(
                        "engine closed stdout before ending the turn".to_string(),
                    ));
                }
                TransportLine::Line(raw) => {
                    let line = raw.trim();
                    if self.ends_turn(line) {
                        break;
                    }
                    lines_out.push(line.to_string());
                }
            }
        }
        Ok(lines_out.join("\n"))
    }

    async fn stream(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        tx: mpsc::Sender<String>,
    ) -> Result<(), EngineError> {
        self.submit(prompt).await?;

        let mut sent = 0usize;
        let mut receiver_gone = false;
        loop {
            if sent >= params.max_tokens as usize {
                tracing::warn!(
                    "engine stream exceeded {} lines without a sentinel, truncating",
                    params.max_tokens
                );
                break;
            }
            match self.read_line().await? {
                TransportLine::EndOfStream => {
                    return Err(EngineError::Crashed(
                        "engine closed stdout before ending the turn".to_string(),
                    ));
                }
                TransportLine::Line(raw) => {
                    let line = raw.trim();
                    if self.ends_turn(line) {
                        break;
                    }
                    sent += 1;
                    // Keep draining to the sentinel even when the consumer is
                    // gone, so the transport is clean for the next turn.
                    if !receiver_gone && tx.send(format!("{line}\n")).await.is_err() {
                        receiver_gone = true;
                    }
                }
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.stop().await;
    }
}
