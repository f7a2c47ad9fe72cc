pub mod buffer_pool;
pub mod error_handling;
pub mod export_config;
pub mod logging;
pub mod progress;

pub use buffer_pool::BufferPool;
pub use error_handling::{report_error, ExportFailure};
