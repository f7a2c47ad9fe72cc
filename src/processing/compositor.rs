use crate::io::layer_record::{CanvasSize, LayerRecord};
use crate::utils::BufferPool;

/// Final RGBA8 pixels handed to the image writer
#[derive(Clone, Debug, PartialEq)]
pub struct LayerPixels {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Layer bounds relative to the canvas origin
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Placement {
    pub fn of(record: &LayerRecord) -> Self {
        Self {
            left: record.left(),
            top: record.top(),
            width: record.width(),
            height: record.height(),
        }
    }
}

/// Produce the buffer to persist for one layer.
///
/// With `crop` the raw buffer is returned untouched. Otherwise the layer is
/// copied into a transparent canvas-sized buffer at its offset; pixels that
/// land outside the canvas are dropped.
pub fn composite_layer(
    raw: Vec<u8>,
    placement: Placement,
    canvas: CanvasSize,
    crop: bool,
    pool: &BufferPool,
) -> LayerPixels {
    if crop {
        return LayerPixels {
            width: placement.width,
            height: placement.height,
            data: raw,
        };
    }

    let canvas_len = canvas.width as usize * canvas.height as usize * 4;
    let mut data = pool.get_u8_buffer(canvas_len);
    data.resize(canvas_len, 0);
    place_on_canvas(&raw, placement, canvas, &mut data);

    LayerPixels {
        width: canvas.width,
        height: canvas.height,
        data,
    }
}

/// Copy `raw` into `canvas_buf` row by row, clamped to the canvas extent
fn place_on_canvas(raw: &[u8], placement: Placement, canvas: CanvasSize, canvas_buf: &mut [u8]) {
    let layer_w = placement.width as i64;
    let canvas_w = canvas.width as i64;
    let canvas_h = canvas.height as i64;
    if layer_w == 0 || canvas_w == 0 {
        return;
    }

    // Visible column range within the layer
    let left = placement.left as i64;
    let x_start = (-left).clamp(0, layer_w);
    let x_end = (canvas_w - left).clamp(0, layer_w);
    if x_start >= x_end {
        return;
    }

    let row_bytes = placement.width as usize * 4;
    for (y, row) in raw.chunks_exact(row_bytes).take(placement.height as usize).enumerate() {
        let dst_y = placement.top as i64 + y as i64;
        if dst_y < 0 || dst_y >= canvas_h {
            continue;
        }
        let src = &row[x_start as usize * 4..x_end as usize * 4];
        let dst_start = ((dst_y * canvas_w + left + x_start) * 4) as usize;
        canvas_buf[dst_start..dst_start + src.len()].copy_from_slice(src);
    }
}
