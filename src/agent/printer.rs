use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

use super::ClaimedJob;

#[derive(Debug, thiserror::Error)]
pub enum PrintError {
    #[error("Spooler invocation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Spooler(String),
}

/// Boundary to the rendering/printing backend. The queue side of the
/// system only ever sees success or failure of this call.
#[async_trait]
pub trait PrintBackend: Send + Sync {
    async fn render_and_print(&self, path: &Path, job: &ClaimedJob) -> Result<(), PrintError>;
}

/// Prints through the local CUPS spooler via `lp`.
pub struct LpPrinter {
    printer_name: String,
    copies: u32,
}

impl LpPrinter {
    pub fn new(printer_name: impl Into<String>, copies: u32) -> Self {
        Self {
            printer_name: printer_name.into(),
            copies: copies.max(1),
        }
    }
}

#[async_trait]
impl PrintBackend for LpPrinter {
    async fn render_and_print(&self, path: &Path, job: &ClaimedJob) -> Result<(), PrintError> {
        tracing::debug!(
            job_id = job.id,
            printer = %self.printer_name,
            file = %path.display(),
            "Sending file to spooler"
        );

        let output = Command::new("lp")
            .arg("-d")
            .arg(&self.printer_name)
            .arg("-n")
            .arg(self.copies.to_string())
            .arg(path)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let detail = if stderr.is_empty() { stdout } else { stderr };
            return Err(PrintError::Spooler(format!(
                "lp failed (code={}): {detail}",
                output.status.code().unwrap_or(-1)
            )));
        }
        Ok(())
    }
}
