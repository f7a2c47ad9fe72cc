//! PackBits decoding used by RLE-compressed channel data

use super::psd_reader::PsdError;

/// Decode one PackBits-compressed row into `out`, which must be exactly the row width.
pub fn unpack_bits_row(input: &[u8], out: &mut [u8]) -> Result<(), PsdError> {
    let mut src = 0usize;
    let mut dst = 0usize;

    while dst < out.len() {
        let header = *input.get(src).ok_or(PsdError::CorruptRle)? as i8;
        src += 1;

        if header >= 0 {
            // Literal run of header + 1 bytes
            let count = header as usize + 1;
            let literal = input.get(src..src + count).ok_or(PsdError::CorruptRle)?;
            let target = out.get_mut(dst..dst + count).ok_or(PsdError::CorruptRle)?;
            target.copy_from_slice(literal);
            src += count;
            dst += count;
        } else if header != -128 {
            // Repeat next byte 1 - header times
            let count = (1 - header as isize) as usize;
            let value = *input.get(src).ok_or(PsdError::CorruptRle)?;
            let target = out.get_mut(dst..dst + count).ok_or(PsdError::CorruptRle)?;
            target.fill(value);
            src += 1;
            dst += count;
        }
        // -128 is a no-op
    }

    Ok(())
}
