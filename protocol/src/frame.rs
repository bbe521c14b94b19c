//! SysEx frame construction and parsing.
//!
//! Every message of the protocol is a single SysEx frame:
//!
//! ```text
//! F0 00 00 7E <family> <instance> <command> <payload...> <checksum> F7
//! ```
//!
//! The manufacturer ID together with the family byte identifies the protocol dialect.
//! Frames of other dialects are reported as [`FrameError::WrongDialect`] and are
//! expected to be ignored by callers, since a shared MIDI transport routinely
//! carries unrelated traffic.

use crate::codec::checksum;
use alloc::{string::String, vec::Vec};
use core::fmt::{Display, Formatter};
use log::{debug, warn};
use strum::FromRepr;

/// Start of a System Exclusive message.
pub const SYSEX_START: u8 = 0xf0;

/// End of a System Exclusive message.
pub const SYSEX_END: u8 = 0xf7;

/// Manufacturer ID shared by all dialects of the protocol.
pub const MANUFACTURER_ID: [u8; 3] = [0x00, 0x00, 0x7e];

/// Device family of the query and debug terminal dialect.
pub const QUERY_FAMILY: u8 = 0x32;

/// Device family of the bootloader (firmware upload) dialect.
pub const BOOTLOADER_FAMILY: u8 = 0x40;

/// Device instance addressed when none is configured.
pub const DEFAULT_INSTANCE: u8 = 0x00;

// Start byte, manufacturer ID, family, instance and command
const HEADER_LEN: usize = 7;

// Upper bound for frames collected by the stream assembler
const MAX_FRAME_LEN: usize = 0x400;

/// Command byte of a frame.
///
/// The numeric values are fixed by the existing device firmware.
#[derive(FromRepr, PartialEq, Eq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum Command {
    /// Identity query, answered with [`Command::AckResponse`].
    Query = 0x00,
    /// Writes a block of the firmware image to flash.
    WriteBlock = 0x02,
    /// Erases the application area of the flash.
    EraseApp = 0x04,
    /// Starts the freshly written application.
    JumpApp = 0x05,
    /// Text message of the debug terminal.
    DebugMessage = 0x0d,
    /// Response to a query, carrying ASCII text.
    AckResponse = 0x0f,
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> Self {
        cmd as u8
    }
}

/// Error type for [`Codec::parse_frame`].
///
/// None of these errors is fatal. Frames failing to parse are simply discarded.
#[non_exhaustive]
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum FrameError {
    /// The frame is shorter than the smallest valid frame.
    TooShort,
    /// The frame does not start with `F0` or does not end with `F7`.
    BadDelimiters,
    /// The frame belongs to another manufacturer or device family.
    WrongDialect,
}

impl Display for FrameError {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        match self {
            Self::TooShort => write!(f, "frame too short"),
            Self::BadDelimiters => write!(f, "missing SysEx delimiters"),
            Self::WrongDialect => write!(f, "frame of foreign dialect"),
        }
    }
}

impl core::error::Error for FrameError {}

/// The checksum of a received frame does not match its contents.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct ChecksumMismatch {
    /// Checksum computed over the received command and payload.
    pub expected: u8,
    /// Checksum byte carried by the frame.
    pub actual: u8,
}

impl Display for ChecksumMismatch {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        write!(
            f,
            "checksum mismatch: expected {:#04x}, got {:#04x}",
            self.expected, self.actual
        )
    }
}

impl core::error::Error for ChecksumMismatch {}

/// A frame successfully split into its fields by [`Codec::parse_frame`].
///
/// The payload borrows from the parsed bytes.
#[derive(PartialEq, Eq, Debug)]
pub struct ParsedFrame<'a> {
    /// Addressed device instance.
    pub instance: u8,
    /// Raw command byte, see [`ParsedFrame::kind`].
    pub command: u8,
    /// Payload between command byte and checksum.
    pub payload: &'a [u8],
    /// Checksum byte, if the dialect carries one.
    pub checksum: Option<u8>,
    // Command byte and payload, as covered by the checksum
    signed: &'a [u8],
}

impl ParsedFrame<'_> {
    /// Returns the command, if the command byte is known.
    #[must_use]
    pub fn kind(&self) -> Option<Command> {
        Command::from_repr(self.command)
    }

    /// Validates the checksum against command byte and payload.
    ///
    /// Frames without a checksum always pass.
    pub fn verify_checksum(&self) -> Result<(), ChecksumMismatch> {
        match self.checksum {
            Some(actual) if actual != checksum(self.signed) => Err(ChecksumMismatch {
                expected: checksum(self.signed),
                actual,
            }),
            _ => Ok(()),
        }
    }
}

/// Builds and parses frames of one protocol dialect.
///
/// A codec captures everything that differs between the variants of the protocol
/// observed in the field: the device family, the addressed device instance,
/// whether frames carry a checksum and whether debug messages carry a direction marker.
///
/// # Examples
///
/// ```
/// use midicore::{Codec, Command};
///
/// let codec = Codec::bootloader();
/// let frame = codec.build_frame(Command::EraseApp, &[]);
///
/// assert_eq!(frame, [0xf0, 0x00, 0x00, 0x7e, 0x40, 0x00, 0x04, 0x7c, 0xf7]);
///
/// let parsed = codec.parse_frame(&frame).unwrap();
///
/// assert_eq!(parsed.kind(), Some(Command::EraseApp));
/// assert!(parsed.verify_checksum().is_ok());
/// ```
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Codec {
    family: u8,
    instance: u8,
    checksum: bool,
    debug_marker: bool,
}

impl Default for Codec {
    /// Returns the codec of the query and debug terminal dialect.
    fn default() -> Self {
        Self::new(QUERY_FAMILY)
    }
}

impl Codec {
    /// Constructs a codec for the given device family.
    ///
    /// Frames carry a checksum and debug messages carry a direction marker.
    #[must_use]
    pub const fn new(family: u8) -> Self {
        Self {
            family: family & 0x7f,
            instance: DEFAULT_INSTANCE,
            checksum: true,
            debug_marker: true,
        }
    }

    /// Constructs a codec for the bootloader dialect used by firmware uploads.
    #[must_use]
    pub const fn bootloader() -> Self {
        Self::new(BOOTLOADER_FAMILY)
    }

    /// Addresses the given device instance instead of [`DEFAULT_INSTANCE`].
    #[must_use]
    pub const fn with_instance(self, instance: u8) -> Self {
        Self {
            instance: instance & 0x7f,
            ..self
        }
    }

    /// Enables or disables the trailing checksum byte.
    ///
    /// MIOS Studio sends queries and terminal messages without checksum.
    #[must_use]
    pub const fn with_checksum(self, checksum: bool) -> Self {
        Self { checksum, ..self }
    }

    /// Enables or disables the direction marker of debug messages.
    #[must_use]
    pub const fn with_debug_marker(self, debug_marker: bool) -> Self {
        Self {
            debug_marker,
            ..self
        }
    }

    /// Returns the device family byte.
    #[must_use]
    pub const fn family(&self) -> u8 {
        self.family
    }

    /// Returns the addressed device instance.
    #[must_use]
    pub const fn instance(&self) -> u8 {
        self.instance
    }

    /// Returns whether frames carry a checksum.
    #[must_use]
    pub const fn checksum(&self) -> bool {
        self.checksum
    }

    /// Returns whether debug messages carry a direction marker.
    #[must_use]
    pub const fn debug_marker(&self) -> bool {
        self.debug_marker
    }

    /// Builds a frame addressed to the configured device instance.
    #[must_use]
    pub fn build_frame(&self, cmd: Command, payload: &[u8]) -> Vec<u8> {
        self.build_frame_for(self.instance, cmd, payload)
    }

    /// Builds a frame addressed to the given device instance.
    #[must_use]
    pub fn build_frame_for(&self, instance: u8, cmd: Command, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + 2);

        frame.push(SYSEX_START);
        frame.extend_from_slice(&MANUFACTURER_ID);
        frame.push(self.family);
        frame.push(instance & 0x7f);
        frame.push(cmd.into());
        frame.extend_from_slice(payload);

        if self.checksum {
            // Covers command byte and payload
            frame.push(checksum(&frame[HEADER_LEN - 1..]));
        }

        frame.push(SYSEX_END);

        frame
    }

    /// Splits a frame into its fields.
    ///
    /// The checksum is not validated, see [`ParsedFrame::verify_checksum`].
    ///
    /// # Errors
    ///
    /// - [`FrameError::TooShort`] if the frame cannot hold header, checksum and terminator.
    /// - [`FrameError::BadDelimiters`] if the frame is not enclosed in `F0` and `F7`.
    /// - [`FrameError::WrongDialect`] if manufacturer ID or device family differ.
    pub fn parse_frame<'a>(&self, bytes: &'a [u8]) -> Result<ParsedFrame<'a>, FrameError> {
        let trailer = usize::from(self.checksum) + 1;

        if bytes.len() < HEADER_LEN + trailer {
            return Err(FrameError::TooShort);
        }

        if bytes[0] != SYSEX_START || bytes[bytes.len() - 1] != SYSEX_END {
            return Err(FrameError::BadDelimiters);
        }

        if bytes[1..4] != MANUFACTURER_ID || bytes[4] != self.family {
            return Err(FrameError::WrongDialect);
        }

        let end = bytes.len() - trailer;

        Ok(ParsedFrame {
            instance: bytes[5],
            command: bytes[6],
            payload: &bytes[HEADER_LEN..end],
            checksum: self.checksum.then(|| bytes[end]),
            signed: &bytes[HEADER_LEN - 1..end],
        })
    }
}

/// Converts text into a payload of 7-bit ASCII bytes.
///
/// Characters outside ASCII cannot be transported and are replaced by `?`.
pub(crate) fn ascii_payload(text: &str) -> Vec<u8> {
    if !text.is_ascii() {
        warn!("Replacing non-ASCII characters in {text:?}");
    }

    text.chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}

/// Converts a payload back into text, replacing bytes outside ASCII by `?`.
pub(crate) fn ascii_text(payload: &[u8]) -> String {
    payload
        .iter()
        .map(|&b| if b.is_ascii() { char::from(b) } else { '?' })
        .collect()
}

/// Cuts complete SysEx frames out of a MIDI byte stream.
///
/// Bytes outside a frame are ignored and realtime messages interleaved with
/// a frame are dropped, as permitted by the MIDI specification.
/// Any other status byte ends a frame without completing it,
/// and a new start byte discards an unterminated frame.
#[derive(Default, Debug)]
pub struct SysexAssembler {
    buf: Vec<u8>,
    active: bool,
}

impl SysexAssembler {
    /// Constructs an assembler waiting for the next start byte.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a byte into the assembler.
    ///
    /// Returns a frame, including both delimiters, once its terminator arrives.
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        match byte {
            SYSEX_START => {
                if self.active {
                    debug!("Discarding unterminated SysEx: {:02x?}", self.buf);
                }

                self.buf.clear();
                self.buf.push(byte);
                self.active = true;

                None
            }
            SYSEX_END if self.active => {
                self.buf.push(byte);
                self.active = false;

                Some(core::mem::take(&mut self.buf))
            }
            0xf8..=0xff => None,
            0x80..=0xf6 if self.active => {
                debug!("Aborting SysEx on status byte {byte:#04x}: {:02x?}", self.buf);
                self.buf.clear();
                self.active = false;

                None
            }
            _ if self.active => {
                if self.buf.len() < MAX_FRAME_LEN {
                    self.buf.push(byte);
                } else {
                    debug!("Discarding oversized SysEx");
                    self.buf.clear();
                    self.active = false;
                }

                None
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::init_logger;

    #[test]
    fn build_frame_with_checksum() {
        init_logger();

        let frame = Codec::bootloader().build_frame(Command::WriteBlock, &[0x01, 0x02, 0x03]);

        assert_eq!(
            frame,
            [
                0xf0, 0x00, 0x00, 0x7e, 0x40, 0x00, 0x02, 0x01, 0x02, 0x03, 0x78, 0xf7
            ],
            "frame contents should be correct"
        );
    }

    #[test]
    fn build_frame_without_checksum() {
        init_logger();

        let codec = Codec::default().with_checksum(false).with_instance(0x05);
        let frame = codec.build_frame(Command::Query, &[0x01]);

        assert_eq!(
            frame,
            [0xf0, 0x00, 0x00, 0x7e, 0x32, 0x05, 0x00, 0x01, 0xf7],
            "frame contents should be correct"
        );
    }

    #[test]
    fn build_frame_masks_instance() {
        init_logger();

        let frame = Codec::default().build_frame_for(0xff, Command::JumpApp, &[]);

        assert_eq!(frame[5], 0x7f, "instance should be 7-bit safe");
    }

    #[test]
    fn parse_frame_fields() {
        init_logger();

        let codec = Codec::bootloader();
        let bytes = [
            0xf0, 0x00, 0x00, 0x7e, 0x40, 0x03, 0x02, 0x01, 0x02, 0x03, 0x78, 0xf7,
        ];
        let frame = codec.parse_frame(&bytes).unwrap();

        assert_eq!(frame.instance, 0x03, "instance should be correct");
        assert_eq!(frame.kind(), Some(Command::WriteBlock), "command should be correct");
        assert_eq!(frame.payload, [0x01, 0x02, 0x03], "payload should be correct");
        assert_eq!(frame.checksum, Some(0x78), "checksum should be correct");
        assert_eq!(frame.verify_checksum(), Ok(()), "checksum should verify");
    }

    #[test]
    fn parse_frame_round_trip() {
        init_logger();

        let codec = Codec::default().with_instance(0x11);
        let bytes = codec.build_frame(Command::AckResponse, b"STM32F4");
        let frame = codec.parse_frame(&bytes).unwrap();

        assert_eq!(frame.instance, 0x11, "instance should be correct");
        assert_eq!(frame.kind(), Some(Command::AckResponse), "command should be correct");
        assert_eq!(frame.payload, b"STM32F4", "payload should be correct");
        assert_eq!(frame.verify_checksum(), Ok(()), "checksum should verify");
    }

    #[test]
    fn parse_frame_unknown_command() {
        init_logger();

        let bytes = [0xf0, 0x00, 0x00, 0x7e, 0x32, 0x00, 0x33, 0x4d, 0xf7];
        let frame = Codec::default().parse_frame(&bytes).unwrap();

        assert_eq!(frame.command, 0x33, "raw command should be kept");
        assert_eq!(frame.kind(), None, "command should be unknown");
    }

    #[test]
    fn error_checksum_mismatch() {
        init_logger();

        let bytes = [
            0xf0, 0x00, 0x00, 0x7e, 0x40, 0x00, 0x02, 0x01, 0x02, 0x03, 0x00, 0xf7,
        ];
        let frame = Codec::bootloader().parse_frame(&bytes).unwrap();

        assert_eq!(
            frame.verify_checksum(),
            Err(ChecksumMismatch {
                expected: 0x78,
                actual: 0x00
            }),
            "result should be checksum mismatch"
        );
    }

    #[test]
    fn error_too_short() {
        init_logger();

        let codec = Codec::default();

        for len in 0..9 {
            let bytes = [0xf0, 0x00, 0x00, 0x7e, 0x32, 0x00, 0x00, 0x00, 0xf7];

            assert_eq!(
                codec.parse_frame(&bytes[..len]),
                Err(FrameError::TooShort),
                "result should be too short error for length {len}"
            );
        }

        assert_eq!(
            codec
                .with_checksum(false)
                .parse_frame(&[0xf0, 0x00, 0x00, 0x7e, 0x32, 0x00, 0x0f, 0xf7])
                .map(|frame| frame.payload.len()),
            Ok(0),
            "frame without checksum should be one byte shorter"
        );
    }

    #[test]
    fn error_bad_delimiters() {
        init_logger();

        let codec = Codec::default();

        assert_eq!(
            codec.parse_frame(&[0xf1, 0x00, 0x00, 0x7e, 0x32, 0x00, 0x00, 0x01, 0x7f, 0xf7]),
            Err(FrameError::BadDelimiters),
            "result should be bad delimiters error"
        );
        assert_eq!(
            codec.parse_frame(&[0xf0, 0x00, 0x00, 0x7e, 0x32, 0x00, 0x00, 0x01, 0x7f, 0x00]),
            Err(FrameError::BadDelimiters),
            "result should be bad delimiters error"
        );
    }

    #[test]
    fn error_wrong_dialect() {
        init_logger();

        let codec = Codec::default();

        assert_eq!(
            codec.parse_frame(&[0xf0, 0x7d, 0x00, 0x01, 0x32, 0x00, 0x00, 0x01, 0x7f, 0xf7]),
            Err(FrameError::WrongDialect),
            "foreign manufacturer should be wrong dialect"
        );
        assert_eq!(
            codec.parse_frame(&Codec::bootloader().build_frame(Command::EraseApp, &[])),
            Err(FrameError::WrongDialect),
            "bootloader frame should be wrong dialect for query codec"
        );
    }

    #[test]
    fn ascii_conversion() {
        init_logger();

        assert_eq!(ascii_payload("v1.0"), b"v1.0", "ASCII should be kept");
        assert_eq!(ascii_payload("1°C"), b"1?C", "non-ASCII should be replaced");
        assert_eq!(ascii_text(&[0x68, 0x69, 0xf7]), "hi?", "high bytes should be replaced");
    }

    #[test]
    fn assembler_extracts_frames() {
        init_logger();

        let mut asm = SysexAssembler::new();
        let stream = [
            0x90, 0x3c, 0x7f, // Note on outside of frame
            0xf0, 0x00, 0x00, 0xf8, 0x7e, 0x32, 0x00, 0x0f, 0x68, 0x69, 0xf7, // Clock inside
            0xfe, 0xf0, 0x01, 0xf7,
        ];
        let frames: Vec<_> = stream.iter().filter_map(|&b| asm.push(b)).collect();

        assert_eq!(
            frames,
            [
                alloc::vec![0xf0, 0x00, 0x00, 0x7e, 0x32, 0x00, 0x0f, 0x68, 0x69, 0xf7],
                alloc::vec![0xf0, 0x01, 0xf7],
            ],
            "frames should be extracted"
        );
    }

    #[test]
    fn assembler_aborts_on_status_byte() {
        init_logger();

        let mut asm = SysexAssembler::new();
        let stream = [
            0xf0, 0x00, 0x00, 0x7e, 0x90, 0x3c, 0x7f, // Note on inside
            0x32, 0x00, 0x0f, 0x68, 0x69, 0xf7, // Remainder of the broken frame
            0xf0, 0x01, 0xf7,
        ];
        let frames: Vec<_> = stream.iter().filter_map(|&b| asm.push(b)).collect();

        assert_eq!(
            frames,
            [alloc::vec![0xf0, 0x01, 0xf7]],
            "only the intact frame should be extracted"
        );
    }

    #[test]
    fn assembler_restarts_on_start_byte() {
        init_logger();

        let mut asm = SysexAssembler::new();

        assert_eq!(asm.push(0xf0), None, "start should not complete a frame");
        assert_eq!(asm.push(0x01), None, "data should not complete a frame");
        assert_eq!(asm.push(0xf0), None, "restart should not complete a frame");
        assert_eq!(asm.push(0x02), None, "data should not complete a frame");
        assert_eq!(
            asm.push(0xf7),
            Some(alloc::vec![0xf0, 0x02, 0xf7]),
            "only the restarted frame should be returned"
        );
        assert_eq!(asm.push(0xf7), None, "stray terminator should be ignored");
    }

    #[test]
    fn assembler_drops_oversized_frames() {
        init_logger();

        let mut asm = SysexAssembler::new();

        asm.push(0xf0);

        for _ in 0..MAX_FRAME_LEN {
            assert_eq!(asm.push(0x00), None, "data should not complete a frame");
        }

        assert_eq!(asm.push(0xf7), None, "oversized frame should be dropped");
    }
}
