// src/common/crc.rs

use super::error::Sdi12Error;
use arrayvec::ArrayString;
use crc::{Algorithm, Crc};

/// Custom CRC algorithm matching the SDI-12 standard (CRC-16/ARC).
/// Polynomial: 0x8005 (normal representation of 0xA001 reversed)
/// Initial Value: 0x0000
/// Input Reflected: true
/// Output Reflected: true
/// Final XOR: 0x0000
/// Check Value: 0xBB3D (for "123456789") - standard for CRC-16/ARC
/// Residue: 0x0000
pub const SDI12_CRC: Algorithm<u16> = Algorithm {
    width: 16,
    poly: 0x8005,
    init: 0x0000,
    refin: true,
    refout: true,
    xorout: 0x0000,
    check: 0xBB3D,
    residue: 0x0000,
};

// Create a Crc instance for the SDI-12 algorithm for reuse.
const CRC_COMPUTER: Crc<u16> = Crc::<u16>::new(&SDI12_CRC);

/// Length of the ASCII-encoded CRC appended to a response.
pub const CRC_ASCII_LEN: usize = 3;

/// Calculates the SDI-12 CRC-16 (CRC-16/ARC) for the given data buffer.
///
/// The calculation starts from the first byte (typically the address) up to
/// the byte *before* the CRC itself or the trailing `<CR><LF>`.
#[inline]
pub fn calculate_crc16(data: &[u8]) -> u16 {
    CRC_COMPUTER.checksum(data)
}

/// Calculates the CRC of a message, ignoring any trailing `<CR>` / `<LF>`.
pub fn calculate_crc(message: &[u8]) -> u16 {
    calculate_crc16(strip_line_ending(message))
}

/// Encodes a 16-bit CRC value into three ASCII characters according to SDI-12 standard.
///
/// Follows section 4.4.12.2 of the SDI-12 specification v1.4:
/// 1st character = 0x40 OR (CRC shifted right 12 bits),
/// 2nd character = 0x40 OR ((CRC shifted right 6 bits) AND 0x3F),
/// 3rd character = 0x40 OR (CRC AND 0x3F).
pub fn encode_crc_ascii(crc_value: u16) -> [u8; CRC_ASCII_LEN] {
    let char1 = 0x40 | ((crc_value >> 12) & 0x3F) as u8;
    let char2 = 0x40 | ((crc_value >> 6) & 0x3F) as u8;
    let char3 = 0x40 | (crc_value & 0x3F) as u8;
    [char1, char2, char3]
}

/// Same as [`encode_crc_ascii`], as a printable string.
pub fn crc_to_string(crc_value: u16) -> ArrayString<CRC_ASCII_LEN> {
    let mut out = ArrayString::new();
    for byte in encode_crc_ascii(crc_value) {
        // All three characters are in 0x40..=0x7F, so this never overflows or fails.
        let _ = out.try_push(char::from(byte));
    }
    out
}

/// Decodes three SDI-12 ASCII-encoded CRC characters back into a 16-bit value.
pub fn decode_crc_ascii(crc_chars: &[u8; CRC_ASCII_LEN]) -> u16 {
    let byte1 = u16::from(crc_chars[0] & 0x3F);
    let byte2 = u16::from(crc_chars[1] & 0x3F);
    let byte3 = u16::from(crc_chars[2] & 0x3F);
    (byte1 << 12) | (byte2 << 6) | byte3
}

/// Verifies an SDI-12 response string that includes an ASCII CRC.
///
/// A trailing `<CR><LF>` is tolerated and ignored. The three characters before
/// it are the CRC; everything in front of them is the covered payload.
///
/// # Returns
///
/// * `Ok(())` if the CRC is valid.
/// * `Err(Sdi12Error::InvalidFormat)` if the buffer is too short.
/// * `Err(Sdi12Error::CrcMismatch)` if the CRC characters don't match the payload.
pub fn verify_response_crc_ascii<E>(response_with_crc: &[u8]) -> Result<(), Sdi12Error<E>>
where
    E: core::fmt::Debug,
{
    let response = strip_line_ending(response_with_crc);
    if response.len() < CRC_ASCII_LEN {
        return Err(Sdi12Error::InvalidFormat);
    }
    let (data_part, received) = response.split_at(response.len() - CRC_ASCII_LEN);
    let received: &[u8; CRC_ASCII_LEN] = received
        .try_into()
        .map_err(|_| Sdi12Error::InvalidFormat)?;

    let calculated_crc = calculate_crc16(data_part);
    // Compare the encoded form so a character with stray high bits is rejected
    // even when its low six bits happen to match.
    if encode_crc_ascii(calculated_crc) == *received {
        Ok(())
    } else {
        Err(Sdi12Error::CrcMismatch {
            expected: decode_crc_ascii(received),
            calculated: calculated_crc,
        })
    }
}

/// Boolean form of [`verify_response_crc_ascii`].
///
/// `false` means "discard or retry", never a fatal condition.
pub fn verify_crc(response_with_crc: &[u8]) -> bool {
    verify_response_crc_ascii::<()>(response_with_crc).is_ok()
}

/// Drops any `<CR>` / `<LF>` characters from the end of `message`.
pub fn strip_line_ending(message: &[u8]) -> &[u8] {
    let mut end = message.len();
    while end > 0 && matches!(message[end - 1], b'\r' | b'\n') {
        end -= 1;
    }
    &message[..end]
}
