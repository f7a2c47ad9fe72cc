use tracing_subscriber::EnvFilter;

/// Log levels for console messages
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
    Success,
}

impl LogLevel {
    fn as_tag(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warning => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Success => "success",
        }
    }
}

/// Builder for creating formatted log messages
pub struct LogMessage {
    level: LogLevel,
    context: Option<String>,
    message: String,
}

impl LogMessage {
    /// Create a new log message with the specified level
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            context: None,
            message: message.into(),
        }
    }

    /// Add context to the log message (e.g., "export", "psd")
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Format the message for console output
    fn format_for_console(&self) -> String {
        match &self.context {
            Some(ctx) => format!("[{}] {}", ctx, self.message),
            None => self.message.clone(),
        }
    }

    /// Emit through `tracing` at the matching level
    pub fn send(self) {
        let text = self.format_for_console();
        match self.level {
            LogLevel::Error => tracing::error!("{}", text),
            LogLevel::Warning => tracing::warn!("{}", text),
            LogLevel::Info => tracing::info!("{}", text),
            LogLevel::Debug => tracing::debug!("{}", text),
            LogLevel::Success => tracing::info!(outcome = self.level.as_tag(), "{}", text),
        }
    }
}

pub fn log_info_ctx(context: &str, message: impl Into<String>) {
    LogMessage::new(LogLevel::Info, message).with_context(context).send();
}

pub fn log_warning_ctx(context: &str, message: impl Into<String>) {
    LogMessage::new(LogLevel::Warning, message).with_context(context).send();
}

pub fn log_debug_ctx(context: &str, message: impl Into<String>) {
    LogMessage::new(LogLevel::Debug, message).with_context(context).send();
}

pub fn log_success_ctx(context: &str, message: impl Into<String>) {
    LogMessage::new(LogLevel::Success, message).with_context(context).send();
}

/// Filter directive for the requested verbosity
fn filter_directive(verbose: u8, quiet: bool) -> String {
    let level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    format!("psd_layer_export={level}")
}

/// Install the global `tracing` subscriber. `RUST_LOG` wins over the flags.
pub fn init_logging(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbose, quiet)));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
