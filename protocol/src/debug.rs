//! Debug terminal messages.
//!
//! Terminal text travels in [`Command::DebugMessage`] frames in both directions.
//! Most firmware versions put a direction marker in front of the text,
//! `0x40` for terminal output and `0x00` for terminal input:
//!
//! ```text
//! F0 00 00 7E 32 <instance> 0D 40 <text...> <checksum> F7
//! ```
//!
//! Terminal clients relying on the marker silently discard messages without it,
//! while older tools omit it. The marker is therefore a property of the [`Codec`],
//! see [`Codec::with_debug_marker`].
//!
//! Debug messages are never answered.

use crate::frame::{Codec, Command, ascii_payload, ascii_text};
use alloc::{string::String, vec::Vec};
use strum::FromRepr;

/// Direction marker of a debug message.
#[derive(FromRepr, PartialEq, Eq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum Direction {
    /// Command typed into the host's terminal, sent to the device.
    Input = 0x00,
    /// Terminal output produced by the device.
    Output = 0x40,
}

/// A parsed debug message.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct DebugMessage {
    /// Device instance of the sender or recipient.
    pub instance: u8,
    /// Direction marker, if the dialect carries one.
    pub direction: Option<Direction>,
    /// Message text.
    pub text: String,
}

impl Codec {
    /// Builds a terminal output message.
    ///
    /// ```
    /// let frame = midicore::Codec::default().build_debug_message("hi");
    ///
    /// assert_eq!(&frame[6..10], [0x0d, 0x40, b'h', b'i']);
    /// ```
    #[must_use]
    pub fn build_debug_message(&self, text: &str) -> Vec<u8> {
        self.build_debug(Direction::Output, text)
    }

    /// Builds a terminal input message, i.e. a command for the device's terminal.
    #[must_use]
    pub fn build_terminal_input(&self, text: &str) -> Vec<u8> {
        self.build_debug(Direction::Input, text)
    }

    fn build_debug(&self, dir: Direction, text: &str) -> Vec<u8> {
        let mut payload = Vec::with_capacity(text.len() + 1);

        if self.debug_marker() {
            payload.push(dir as u8);
        }

        payload.extend(ascii_payload(text));

        self.build_frame(Command::DebugMessage, &payload)
    }

    /// Parses a debug message of either direction.
    ///
    /// Returns [`None`] if the frame is not a debug message of this dialect
    /// or if the direction marker is unknown.
    #[must_use]
    pub fn parse_debug_message(&self, bytes: &[u8]) -> Option<DebugMessage> {
        let frame = self.parse_frame(bytes).ok()?;

        if frame.kind() != Some(Command::DebugMessage) {
            return None;
        }

        let (direction, text) = if self.debug_marker() {
            let (&marker, text) = frame.payload.split_first()?;

            (Some(Direction::from_repr(marker)?), text)
        } else {
            (None, frame.payload)
        };

        Some(DebugMessage {
            instance: frame.instance,
            direction,
            text: ascii_text(text),
        })
    }
}
