//! Layer role detection from section divider metadata and raster bounds

use crate::io::layer_record::{LayerRecord, SectionDivider};

/// Role of one layer record during traversal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerKind {
    FolderOpen,
    FolderClose,
    Raster,
    /// Raster without pixels; produces no output
    Empty,
}

pub fn classify_layer(record: &LayerRecord) -> LayerKind {
    match record.section_divider() {
        Some(SectionDivider::OpenFolder | SectionDivider::ClosedFolder) => LayerKind::FolderOpen,
        Some(SectionDivider::BoundingDivider) => LayerKind::FolderClose,
        Some(SectionDivider::Other) | None => {
            if record.width() == 0 || record.height() == 0 {
                LayerKind::Empty
            } else {
                LayerKind::Raster
            }
        }
    }
}
