//! 7-bit-safe integer encoding and the SysEx checksum.
//!
//! MIDI data bytes cannot use their most significant bit, which is reserved
//! for status bytes. Every integer embedded in a frame payload is therefore
//! split into groups of 7 bits.

use core::num::Wrapping;

/// Encodes a 32-bit value into five 7-bit groups, most significant group first.
///
/// The first byte only carries the upper 4 bits of the value.
///
/// ```
/// assert_eq!(midicore::encode_u32(0x0800_0000), [0x00, 0x40, 0x00, 0x00, 0x00]);
/// ```
#[must_use]
pub fn encode_u32(val: u32) -> [u8; 5] {
    [
        (val >> 28) as u8 & 0x0f,
        (val >> 21) as u8 & 0x7f,
        (val >> 14) as u8 & 0x7f,
        (val >> 7) as u8 & 0x7f,
        val as u8 & 0x7f,
    ]
}

/// Decodes five 7-bit groups produced by [`encode_u32`].
///
/// High bits of the input bytes are ignored.
#[must_use]
pub fn decode_u32(bytes: [u8; 5]) -> u32 {
    bytes
        .iter()
        .fold(0, |acc, &byte| (acc << 7) | u32::from(byte & 0x7f))
}

/// Encodes a 14-bit value into two 7-bit groups, most significant group first.
///
/// Bits above bit 13 are discarded.
#[must_use]
pub fn encode_u14(val: u16) -> [u8; 2] {
    [(val >> 7) as u8 & 0x7f, val as u8 & 0x7f]
}

/// Decodes two 7-bit groups produced by [`encode_u14`].
#[must_use]
pub fn decode_u14(bytes: [u8; 2]) -> u16 {
    (u16::from(bytes[0] & 0x7f) << 7) | u16::from(bytes[1] & 0x7f)
}

/// Computes the 7-bit additive checksum of the given bytes.
///
/// Adding the checksum to the sum of `data` yields a multiple of 128.
/// The sender covers the command byte and the payload, the receiver
/// recomputes it over the same bytes and compares.
///
/// ```
/// let data = [0x02, 0x10, 0x7f];
/// let sum: u32 = data.iter().map(|&b| u32::from(b)).sum();
///
/// assert_eq!((sum + u32::from(midicore::checksum(&data))) % 128, 0);
/// ```
#[must_use]
pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().map(|&x| Wrapping(x)).sum::<Wrapping<u8>>();

    (-sum).0 & 0x7f
}
