use std::io::Read;
use std::path::Path;

use anyhow::Context;
use flate2::read::ZlibDecoder;
use thiserror::Error;
use tracing::debug;

use super::layer_record::{
    AdditionalInfo, CanvasSize, ChannelInfo, LayerDocument, LayerRecord, SectionDivider,
};
use super::rle::unpack_bits_row;

const SIGNATURE: &[u8; 4] = b"8BPS";
const COLOR_MODE_RGB: u16 = 3;

/// Additional layer information keys that carry a 64-bit length in PSB files
const PSB_LONG_KEYS: [&[u8; 4]; 13] = [
    b"LMsk", b"Lr16", b"Lr32", b"Layr", b"Mt16", b"Mt32", b"Mtrn", b"Alph", b"FMsk", b"lnk2",
    b"FEid", b"FXid", b"PxSD",
];

#[derive(Debug, Error)]
pub enum PsdError {
    #[error("unexpected end of data at offset {offset} (needed {needed} more bytes)")]
    Truncated { offset: usize, needed: usize },
    #[error("not a PSD document (signature {0:?})")]
    BadSignature([u8; 4]),
    #[error("unsupported PSD version {0}")]
    UnsupportedVersion(u16),
    #[error("unsupported bit depth {0}, only 8-bit documents can be exported")]
    UnsupportedDepth(u16),
    #[error("canvas {width}x{height} exceeds the {limit} pixel limit of the format")]
    CanvasTooLarge { width: u32, height: u32, limit: u32 },
    #[error("layer {position} is {width}x{height}, beyond the {limit} pixel limit of the format")]
    LayerTooLarge { position: usize, width: u32, height: u32, limit: u32 },
    #[error("unsupported color mode {0}, only RGB documents can be exported")]
    UnsupportedColorMode(u16),
    #[error("invalid blend mode signature in layer record {0}")]
    BadBlendSignature(usize),
    #[error("unknown channel compression {0}")]
    UnknownCompression(u16),
    #[error("corrupt RLE channel data")]
    CorruptRle,
    #[error("corrupt ZIP channel data: {0}")]
    CorruptZip(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PsdVersion {
    Psd,
    Psb,
}

impl PsdVersion {
    fn is_psb(self) -> bool {
        self == PsdVersion::Psb
    }

    /// Largest width or height the format allows
    pub fn max_dimension(self) -> u32 {
        match self {
            PsdVersion::Psd => 30_000,
            PsdVersion::Psb => 300_000,
        }
    }
}

/// Big-endian cursor over the document bytes
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], PsdError> {
        let end = self.pos.checked_add(count).filter(|end| *end <= self.data.len());
        match end {
            Some(end) => {
                let slice = &self.data[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(PsdError::Truncated {
                offset: self.pos,
                needed: count.saturating_sub(self.data.len().saturating_sub(self.pos)),
            }),
        }
    }

    fn skip(&mut self, count: usize) -> Result<(), PsdError> {
        self.take(count).map(|_| ())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], PsdError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, PsdError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, PsdError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn i16(&mut self) -> Result<i16, PsdError> {
        Ok(i16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, PsdError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, PsdError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, PsdError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    /// Section length: 32-bit in PSD, 64-bit in PSB
    fn length(&mut self, version: PsdVersion) -> Result<usize, PsdError> {
        let value = if version.is_psb() { self.u64()? } else { self.u32()? as u64 };
        usize::try_from(value).map_err(|_| PsdError::Truncated {
            offset: self.pos,
            needed: usize::MAX,
        })
    }

    /// A 32-bit length-prefixed block, skipped
    fn skip_block(&mut self) -> Result<(), PsdError> {
        let len = self.u32()? as usize;
        self.skip(len)
    }

    fn peek(&self, count: usize) -> Option<&'a [u8]> {
        self.data.get(self.pos..self.pos.checked_add(count)?)
    }
}

/// A PSD/PSB document held in memory; layer pixels are decoded on demand
pub struct PsdDocument {
    data: Vec<u8>,
    version: PsdVersion,
    canvas: CanvasSize,
    records: Vec<LayerRecord>,
}

impl PsdDocument {
    /// Read and parse a document from disk
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read PSD file: {}", path.display()))?;
        let document = Self::from_bytes(data)
            .with_context(|| format!("Failed to decode PSD file: {}", path.display()))?;
        debug!(
            "[psd] {} layer records, canvas {}x{} from {}",
            document.records.len(),
            document.canvas.width,
            document.canvas.height,
            path.display()
        );
        Ok(document)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self, PsdError> {
        let (version, canvas, records) = parse_document(&data)?;
        Ok(Self { data, version, canvas, records })
    }

    pub fn version(&self) -> PsdVersion {
        self.version
    }

    /// Decode a single channel plane of `width * height` bytes
    fn decode_channel(&self, channel: &ChannelInfo, width: usize, height: usize) -> Result<Vec<u8>, PsdError> {
        let plane_len = width * height;
        if plane_len == 0 {
            return Ok(Vec::new());
        }

        let bytes = self
            .data
            .get(channel.offset..channel.offset + channel.length)
            .ok_or(PsdError::Truncated { offset: channel.offset, needed: channel.length })?;
        let mut reader = ByteReader::new(bytes);
        let compression = reader.u16()?;

        match compression {
            0 => Ok(reader.take(plane_len)?.to_vec()),
            1 => {
                let mut row_lengths = Vec::with_capacity(height);
                for _ in 0..height {
                    let len = if self.version.is_psb() { reader.u32()? as usize } else { reader.u16()? as usize };
                    row_lengths.push(len);
                }
                let mut plane = vec![0u8; plane_len];
                for (row, len) in plane.chunks_exact_mut(width).zip(row_lengths) {
                    unpack_bits_row(reader.take(len)?, row)?;
                }
                Ok(plane)
            }
            2 | 3 => {
                let compressed = &bytes[reader.pos..];
                let mut plane = Vec::with_capacity(plane_len);
                ZlibDecoder::new(compressed)
                    .take(plane_len as u64)
                    .read_to_end(&mut plane)
                    .map_err(|e| PsdError::CorruptZip(e.to_string()))?;
                if plane.len() != plane_len {
                    return Err(PsdError::CorruptZip(format!(
                        "expected {} bytes, got {}",
                        plane_len,
                        plane.len()
                    )));
                }
                if compression == 3 {
                    // Per-row delta prediction
                    for row in plane.chunks_exact_mut(width) {
                        for x in 1..width {
                            row[x] = row[x].wrapping_add(row[x - 1]);
                        }
                    }
                }
                Ok(plane)
            }
            other => Err(PsdError::UnknownCompression(other)),
        }
    }
}

impl LayerDocument for PsdDocument {
    fn canvas_size(&self) -> CanvasSize {
        self.canvas
    }

    fn records(&self) -> &[LayerRecord] {
        &self.records
    }

    fn read_rgba(&self, record: &LayerRecord) -> anyhow::Result<Vec<u8>> {
        let limit = self.version.max_dimension();
        if record.width() > limit || record.height() > limit {
            return Err(PsdError::LayerTooLarge {
                position: record.position,
                width: record.width(),
                height: record.height(),
                limit,
            }
            .into());
        }
        let width = record.width() as usize;
        let height = record.height() as usize;
        let byte_len = width
            .checked_mul(height)
            .and_then(|count| count.checked_mul(4))
            .ok_or(PsdError::LayerTooLarge {
                position: record.position,
                width: record.width(),
                height: record.height(),
                limit,
            })?;
        let mut rgba = vec![0u8; byte_len];

        let has_alpha = record.channels.iter().any(|c| c.id == -1);
        if !has_alpha {
            rgba.chunks_exact_mut(4).for_each(|px| px[3] = 255);
        }

        for channel in &record.channels {
            let slot = match channel.id {
                0 => 0,
                1 => 1,
                2 => 2,
                -1 => 3,
                _ => continue,
            };
            let plane = self
                .decode_channel(channel, width, height)
                .with_context(|| format!("Failed to decode channel {} of layer '{}'", channel.id, record.display_name()))?;
            for (px, value) in rgba.chunks_exact_mut(4).zip(plane) {
                px[slot] = value;
            }
        }

        Ok(rgba)
    }
}

fn parse_document(data: &[u8]) -> Result<(PsdVersion, CanvasSize, Vec<LayerRecord>), PsdError> {
    let mut reader = ByteReader::new(data);

    let signature: [u8; 4] = reader.array()?;
    if &signature != SIGNATURE {
        return Err(PsdError::BadSignature(signature));
    }
    let version = match reader.u16()? {
        1 => PsdVersion::Psd,
        2 => PsdVersion::Psb,
        other => return Err(PsdError::UnsupportedVersion(other)),
    };
    reader.skip(6)?;
    let _channels = reader.u16()?;
    let height = reader.u32()?;
    let width = reader.u32()?;
    let limit = version.max_dimension();
    if width > limit || height > limit {
        return Err(PsdError::CanvasTooLarge { width, height, limit });
    }
    let depth = reader.u16()?;
    if depth != 8 {
        return Err(PsdError::UnsupportedDepth(depth));
    }
    let color_mode = reader.u16()?;
    if color_mode != COLOR_MODE_RGB {
        return Err(PsdError::UnsupportedColorMode(color_mode));
    }

    // Color mode data, image resources
    reader.skip_block()?;
    reader.skip_block()?;

    let records = parse_layer_info(&mut reader, version)?;
    Ok((version, CanvasSize::new(width, height), records))
}

fn parse_layer_info(reader: &mut ByteReader<'_>, version: PsdVersion) -> Result<Vec<LayerRecord>, PsdError> {
    let section_len = reader.length(version)?;
    if section_len == 0 {
        return Ok(Vec::new());
    }
    let info_len = reader.length(version)?;
    if info_len == 0 {
        return Ok(Vec::new());
    }

    // Negative count means the first alpha channel holds merged transparency
    let count = reader.i16()?.unsigned_abs() as usize;
    let mut records = Vec::with_capacity(count);
    let mut channel_lengths = Vec::with_capacity(count);
    for position in 0..count {
        let (record, lengths) = parse_layer_record(reader, version, position)?;
        records.push(record);
        channel_lengths.push(lengths);
    }

    // Channel image data follows the records in the same order
    for (record, lengths) in records.iter_mut().zip(channel_lengths) {
        for (channel, length) in record.channels.iter_mut().zip(lengths) {
            channel.offset = reader.pos;
            channel.length = length;
            reader.skip(length)?;
        }
    }

    Ok(records)
}

fn parse_layer_record(
    reader: &mut ByteReader<'_>,
    version: PsdVersion,
    position: usize,
) -> Result<(LayerRecord, Vec<usize>), PsdError> {
    let top = reader.i32()?;
    let left = reader.i32()?;
    let bottom = reader.i32()?;
    let right = reader.i32()?;

    let channel_count = reader.u16()? as usize;
    let mut channels = Vec::with_capacity(channel_count);
    let mut lengths = Vec::with_capacity(channel_count);
    for _ in 0..channel_count {
        let id = reader.i16()?;
        let length = reader.length(version)?;
        channels.push(ChannelInfo { id, offset: 0, length: 0 });
        lengths.push(length);
    }

    let blend_signature: [u8; 4] = reader.array()?;
    if &blend_signature != b"8BIM" && &blend_signature != b"8B64" {
        return Err(PsdError::BadBlendSignature(position));
    }
    // Blend key, opacity, clipping, flags, filler
    reader.skip(8)?;

    let extra_len = reader.u32()? as usize;
    let extra = reader.take(extra_len)?;
    let mut extra_reader = ByteReader::new(extra);
    extra_reader.skip_block()?; // layer mask data
    extra_reader.skip_block()?; // blending ranges

    let name_len = extra_reader.u8()? as usize;
    let name = String::from_utf8_lossy(extra_reader.take(name_len)?).into_owned();
    let padded = (1 + name_len + 3) / 4 * 4;
    extra_reader.skip(padded - 1 - name_len)?;

    let additional = parse_additional_info(&mut extra_reader, version)?;

    let record = LayerRecord {
        position,
        name,
        top,
        left,
        bottom,
        right,
        channels,
        additional,
    };
    Ok((record, lengths))
}

fn is_block_signature(bytes: &[u8]) -> bool {
    bytes == b"8BIM" || bytes == b"8B64"
}

fn parse_additional_info(reader: &mut ByteReader<'_>, version: PsdVersion) -> Result<Vec<AdditionalInfo>, PsdError> {
    let mut blocks = Vec::new();

    while reader.peek(12).is_some() {
        // Some writers pad blocks to 4 bytes without counting it in the length
        let mut padding = 0;
        while padding < 3 && !reader.peek(4).is_some_and(is_block_signature) && reader.peek(5).is_some() {
            reader.skip(1)?;
            padding += 1;
        }
        if !reader.peek(4).is_some_and(is_block_signature) || reader.peek(12).is_none() {
            break;
        }

        reader.skip(4)?;
        let key: [u8; 4] = reader.array()?;
        let length = if version.is_psb() && PSB_LONG_KEYS.contains(&&key) {
            reader.length(version)?
        } else {
            reader.u32()? as usize
        };
        let body = reader.take(length)?;
        blocks.push(parse_block(key, body)?);
    }

    Ok(blocks)
}

fn parse_block(key: [u8; 4], body: &[u8]) -> Result<AdditionalInfo, PsdError> {
    let mut reader = ByteReader::new(body);
    let info = match &key {
        b"lsct" | b"lsdk" => AdditionalInfo::SectionDivider(SectionDivider::from_raw(reader.u32()?)),
        b"lyid" => AdditionalInfo::LayerId(reader.u32()?),
        b"luni" => {
            let units = reader.u32()? as usize;
            let bytes = reader.take(units * 2)?;
            let code_units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            let name = String::from_utf16_lossy(&code_units);
            AdditionalInfo::UnicodeName(name.trim_end_matches('\0').to_string())
        }
        _ => AdditionalInfo::Unknown(key),
    };
    Ok(info)
}
