//! Extracts the layers of a PSD document into a tree of transparent PNG files.

pub mod io;
pub mod options;
pub mod processing;
pub mod utils;

pub use io::layer_record::{CanvasSize, LayerDocument, LayerRecord};
pub use io::png_writer::{LayerImageWriter, PngWriter};
pub use io::psd_reader::{PsdDocument, PsdError};
pub use processing::layer_export::{ExportOptions, ExportSummary, LayerExporter};
pub use processing::path_builder::Layout;
