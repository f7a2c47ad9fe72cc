use std::path::PathBuf;

use thiserror::Error;

use crate::io::psd_reader::PsdError;
use crate::utils::logging::{LogLevel, LogMessage};

/// Fatal failures, grouped by the stage that produced them
#[derive(Debug, Error)]
pub enum ExportFailure {
    #[error("PSD file not found: {}", .0.display())]
    InputNotFound(PathBuf),
    #[error("{0:#}")]
    Config(anyhow::Error),
    #[error("{0:#}")]
    Decode(anyhow::Error),
    #[error("{0:#}")]
    Write(anyhow::Error),
}

impl ExportFailure {
    /// Classify an export error; anything caused by a `PsdError` is a decode failure
    pub fn from_export_error(error: anyhow::Error) -> Self {
        if error.chain().any(|cause| cause.downcast_ref::<PsdError>().is_some()) {
            ExportFailure::Decode(error)
        } else {
            ExportFailure::Write(error)
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ExportFailure::InputNotFound(_) | ExportFailure::Config(_) => 2,
            ExportFailure::Decode(_) => 3,
            ExportFailure::Write(_) => 4,
        }
    }

    pub fn context(&self) -> &'static str {
        match self {
            ExportFailure::InputNotFound(_) => "input",
            ExportFailure::Config(_) => "config",
            ExportFailure::Decode(_) => "psd",
            ExportFailure::Write(_) => "export",
        }
    }
}

/// Reports an error with its full cause chain
pub fn report_error(context: &str, error: impl std::fmt::Display) {
    LogMessage::new(LogLevel::Error, format!("{:#}", error))
        .with_context(context)
        .send();
}
