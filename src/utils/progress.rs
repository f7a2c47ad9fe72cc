use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info};

pub trait ProgressSink: Send + Sync {
    fn start_indeterminate(&self, message: Option<&str>);
    fn set(&self, progress_0_1: f32, message: Option<&str>);
    fn finish(&self, message: Option<&str>);
}

/// Progress reported through the log, throttled
pub struct LogProgress {
    last_update: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::with_interval(Duration::from_millis(500))
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            last_update: Mutex::new(None),
            min_interval,
        }
    }

    /// Returns true when enough time has passed since the last report
    fn should_report(&self, force: bool) -> bool {
        let Ok(mut last) = self.last_update.lock() else {
            return false;
        };
        let now = Instant::now();
        let due = (*last).map_or(true, |at| now.duration_since(at) >= self.min_interval);
        if force || due {
            *last = Some(now);
            true
        } else {
            false
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for LogProgress {
    fn start_indeterminate(&self, message: Option<&str>) {
        if self.should_report(true) {
            if let Some(m) = message {
                info!("[progress] {}", m);
            }
        }
    }

    fn set(&self, progress_0_1: f32, message: Option<&str>) {
        let clamped = progress_0_1.clamp(0.0, 1.0);
        // Messages and the end points are always shown
        let force = message.is_some() || clamped >= 0.99 || clamped <= 0.01;
        if self.should_report(force) {
            match message {
                Some(m) => debug!("[progress] {:>3.0}% {}", clamped * 100.0, m),
                None => debug!("[progress] {:>3.0}%", clamped * 100.0),
            }
        }
    }

    fn finish(&self, message: Option<&str>) {
        if self.should_report(true) {
            if let Some(m) = message {
                info!("[progress] {}", m);
            }
        }
    }
}

pub struct NoopProgress;
impl ProgressSink for NoopProgress {
    fn start_indeterminate(&self, _message: Option<&str>) {}
    fn set(&self, _progress_0_1: f32, _message: Option<&str>) {}
    fn finish(&self, _message: Option<&str>) {}
}
