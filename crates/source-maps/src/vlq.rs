//! Base64 variable-length quantity decoding used by the `mappings` field.

use crate::SourceMapError;

const CONTINUATION_BIT: u8 = 0b10_0000;
const VALUE_MASK: u8 = 0b01_1111;

fn digit_value(byte: u8) -> Result<u8, SourceMapError> {
    let value = match byte {
        b'A'..=b'Z' => byte - b'A',
        b'a'..=b'z' => byte - b'a' + 26,
        b'0'..=b'9' => byte - b'0' + 52,
        b'+' => 62,
        b'/' => 63,
        other => return Err(SourceMapError::InvalidVlqDigit(other as char)),
    };
    Ok(value)
}

/// Decodes every value of one comma-delimited segment into `out`.
pub fn decode_segment(segment: &str, out: &mut Vec<i64>) -> Result<(), SourceMapError> {
    let mut accumulated: i64 = 0;
    let mut shift: u32 = 0;

    for byte in segment.bytes() {
        let digit = digit_value(byte)?;
        accumulated += i64::from(digit & VALUE_MASK) << shift;
        if digit & CONTINUATION_BIT != 0 {
            shift += 5;
            if shift > 60 {
                return Err(SourceMapError::VlqOverflow);
            }
            continue;
        }
        let negative = accumulated & 1 == 1;
        let magnitude = accumulated >> 1;
        out.push(if negative { -magnitude } else { magnitude });
        accumulated = 0;
        shift = 0;
    }

    if shift != 0 {
        return Err(SourceMapError::UnterminatedVlq);
    }
    Ok(())
}
