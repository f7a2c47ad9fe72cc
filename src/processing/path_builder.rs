use std::path::{Path, PathBuf};

use super::folder_stack::IndexedLayer;

/// Characters that are invalid in a file name on at least one common filesystem
const INVALID_CHARS: [char; 9] = ['"', '<', '>', '|', ':', '*', '?', '\\', '/'];

/// Output directory layout
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Layout {
    /// One subdirectory per folder
    #[default]
    Hierarchical,
    /// Everything in the output directory, folder names joined with `_`
    Flattened,
}

/// Make a single path component safe for the filesystem
pub fn sanitize_segment(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if c.is_ascii_control() || INVALID_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = replaced.trim();

    if trimmed.is_empty() {
        "_".to_string()
    } else if trimmed.chars().all(|c| c == '.') {
        "_".repeat(trimmed.len())
    } else {
        trimmed.to_string()
    }
}

/// File name segment for one layer, numbered by traversal index when requested
pub fn layer_segment(layer: &IndexedLayer<'_>, numbering: bool) -> String {
    let mut name = layer.record.display_name().to_string();
    if numbering && layer.record.layer_id().is_some() {
        name.push_str(&layer.index.to_string());
    }
    sanitize_segment(&name)
}

/// Output path for a raster layer under its current ancestors
pub fn build_output_path(
    output_dir: &Path,
    ancestors: &[IndexedLayer<'_>],
    layer: &IndexedLayer<'_>,
    layout: Layout,
    numbering: bool,
) -> PathBuf {
    let file_name = format!("{}.png", layer_segment(layer, numbering));

    match layout {
        Layout::Hierarchical => {
            let mut path = output_dir.to_path_buf();
            for ancestor in ancestors {
                path.push(layer_segment(ancestor, numbering));
            }
            path.push(file_name);
            path
        }
        Layout::Flattened => {
            let mut joined: Vec<String> = ancestors.iter().map(|a| layer_segment(a, numbering)).collect();
            joined.push(file_name);
            output_dir.join(joined.join("_"))
        }
    }
}
