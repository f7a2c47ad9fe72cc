use std::path::Path;

use anyhow::{Context, Result};
use image::{ExtendedColorType, ImageFormat};

/// Sink for finished layer images
pub trait LayerImageWriter {
    /// Persist a tightly packed RGBA8 buffer of `width * height` pixels
    fn write(&self, path: &Path, width: u32, height: u32, rgba: &[u8]) -> Result<()>;
}

/// Writes PNG files, creating parent directories as needed
#[derive(Clone, Copy, Debug, Default)]
pub struct PngWriter;

impl LayerImageWriter for PngWriter {
    fn write(&self, path: &Path, width: u32, height: u32, rgba: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        image::save_buffer_with_format(path, rgba, width, height, ExtendedColorType::Rgba8, ImageFormat::Png)
            .with_context(|| format!("Failed to write PNG: {}", path.display()))?;

        Ok(())
    }
}
