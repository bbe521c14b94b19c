//! Device identity queries.
//!
//! A host identifies a device by sending one [`Command::Query`] frame per
//! attribute. The device answers each query with a [`Command::AckResponse`]
//! frame carrying the attribute as ASCII text:
//!
//! ```text
//! F0 00 00 7E 32 <instance> 00 <query type> <checksum> F7
//! F0 00 00 7E 32 <instance> 0F <text...> <checksum> F7
//! ```
//!
//! Responses carry no length prefix, the terminating `F7` ends the text.

use crate::frame::{Codec, Command, ascii_payload, ascii_text};
use alloc::{format, string::String, vec::Vec};
use log::debug;
use strum::{Display, FromRepr, VariantArray};

/// Attribute requested by a query.
///
/// Unknown query types are still transported as raw bytes,
/// see [`Codec::build_query`] and [`Codec::parse_query`].
#[derive(FromRepr, Display, VariantArray, PartialEq, Eq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum QueryType {
    /// Name of the operating system, e.g. `MIOS32`.
    #[strum(to_string = "Operating System")]
    OperatingSystem = 0x01,
    /// Name of the board.
    #[strum(to_string = "Board Name")]
    Board = 0x02,
    /// Microcontroller core family.
    #[strum(to_string = "Core Family")]
    CoreFamily = 0x03,
    /// Unique chip ID.
    #[strum(to_string = "Chip ID")]
    ChipId = 0x04,
    /// Device serial number.
    #[strum(to_string = "Serial Number")]
    SerialNumber = 0x05,
    /// Flash size in bytes.
    #[strum(to_string = "Flash Size")]
    FlashSize = 0x06,
    /// RAM size in bytes.
    #[strum(to_string = "RAM Size")]
    RamSize = 0x07,
    /// First line of the application identification.
    #[strum(to_string = "Application Name (Line 1)")]
    AppName1 = 0x08,
    /// Second line of the application identification.
    #[strum(to_string = "Application Name (Line 2)")]
    AppName2 = 0x09,
}

impl From<QueryType> for u8 {
    fn from(query_type: QueryType) -> Self {
        query_type as u8
    }
}

impl QueryType {
    /// Returns a human-readable label for a raw query type byte.
    #[must_use]
    pub fn describe(raw: u8) -> String {
        match Self::from_repr(raw) {
            Some(query_type) => format!("{query_type}"),
            None => format!("Unknown (0x{raw:02x})"),
        }
    }
}

impl Codec {
    /// Builds a query for the configured device instance.
    ///
    /// ```
    /// use midicore::{Codec, query::QueryType};
    ///
    /// let frame = Codec::default().build_query(QueryType::OperatingSystem);
    ///
    /// assert_eq!(frame, [0xf0, 0x00, 0x00, 0x7e, 0x32, 0x00, 0x00, 0x01, 0x7f, 0xf7]);
    /// ```
    #[must_use]
    pub fn build_query(&self, query_type: impl Into<u8>) -> Vec<u8> {
        self.build_query_with_instance(self.instance(), query_type)
    }

    /// Builds a query for the given device instance.
    #[must_use]
    pub fn build_query_with_instance(&self, instance: u8, query_type: impl Into<u8>) -> Vec<u8> {
        self.build_frame_for(instance, Command::Query, &[query_type.into() & 0x7f])
    }

    /// Parses a query, returning the device instance and the raw query type.
    ///
    /// Returns [`None`] for anything that is not a well-formed query of this dialect,
    /// including queries with an incorrect checksum.
    #[must_use]
    pub fn parse_query(&self, bytes: &[u8]) -> Option<(u8, u8)> {
        let frame = self.parse_frame(bytes).ok()?;

        if frame.kind() != Some(Command::Query) {
            return None;
        }

        if let Err(err) = frame.verify_checksum() {
            debug!("Discarding query: {err}");

            return None;
        }

        frame
            .payload
            .first()
            .map(|&query_type| (frame.instance, query_type))
    }

    /// Builds the response to a query.
    ///
    /// Characters outside ASCII are replaced by `?`, which also guarantees
    /// that the text never contains the `F7` terminator.
    #[must_use]
    pub fn build_query_response(&self, instance: u8, text: &str) -> Vec<u8> {
        self.build_frame_for(instance, Command::AckResponse, &ascii_payload(text))
    }

    /// Parses the response to a query, returning the device instance and the text.
    ///
    /// The checksum of responses is not enforced, as some firmware versions
    /// compute it inconsistently.
    #[must_use]
    pub fn parse_query_response(&self, bytes: &[u8]) -> Option<(u8, String)> {
        let frame = self.parse_frame(bytes).ok()?;

        if frame.kind() != Some(Command::AckResponse) {
            return None;
        }

        if let Err(err) = frame.verify_checksum() {
            debug!("Accepting response despite {err}");
        }

        Some((frame.instance, ascii_text(frame.payload)))
    }
}
