// src/present.rs - QR display and clipboard hand-off

use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PresentError {
    #[error("no command configured")]
    NotConfigured,

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write to `{command}`: {source}")]
    Write {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: ExitStatus },
}

/// User-facing side effects the control client triggers but does not implement.
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Show `uri` as a scannable code
    async fn show_qr(&self, uri: &str) -> Result<(), PresentError>;

    /// Put `text` on the system clipboard
    async fn copy(&self, text: &str) -> Result<(), PresentError>;
}

/// Pipes text into external tools, e.g. `qrencode` and `xclip`.
#[derive(Debug, Clone)]
pub struct CommandPresenter {
    qr_command: Vec<String>,
    clipboard_command: Vec<String>,
}

impl CommandPresenter {
    pub fn new(qr_command: Vec<String>, clipboard_command: Vec<String>) -> Self {
        Self {
            qr_command,
            clipboard_command,
        }
    }
}

#[async_trait]
impl Presenter for CommandPresenter {
    async fn show_qr(&self, uri: &str) -> Result<(), PresentError> {
        pipe_into(&self.qr_command, uri, true).await
    }

    async fn copy(&self, text: &str) -> Result<(), PresentError> {
        pipe_into(&self.clipboard_command, text, false).await
    }
}

async fn pipe_into(argv: &[String], input: &str, show_output: bool) -> Result<(), PresentError> {
    let (program, args) = argv.split_first().ok_or(PresentError::NotConfigured)?;
    let command = argv.join(" ");
    debug!("Piping {} bytes into `{}`", input.len(), command);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(if show_output { Stdio::inherit() } else { Stdio::null() })
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| PresentError::Spawn {
            command: command.clone(),
            source,
        })?;

    // The child is always reaped, even when it stops reading early.
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(input.as_bytes()).await,
        None => Ok(()),
    };

    let status = child.wait().await.map_err(|source| PresentError::Spawn {
        command: command.clone(),
        source,
    })?;

    if !status.success() {
        return Err(PresentError::Failed { command, status });
    }
    written.map_err(|source| PresentError::Write { command, source })
}
