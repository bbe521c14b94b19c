//! Emulated MidiCore device.
//!
//! [`Target`] plays the device role of the protocol without any transport:
//! frames go in through [`Target::handle`] and responses come out as bytes.
//! It answers queries from a [`DeviceInfoTable`], logs terminal input and
//! firmware upload commands (which are never executed) and produces the
//! debug messages of a running device.

use crate::{
    frame::{Codec, Command, FrameError},
    query::QueryType,
    upload::parse_write_block,
};
use alloc::{
    collections::BTreeMap,
    format,
    string::{String, ToString},
    vec::Vec,
};
use core::time::Duration;
use log::{debug, info, warn};

/// Response to queries missing from the [`DeviceInfoTable`].
pub const UNKNOWN_RESPONSE: &str = "Unknown";

/// Interval between two heartbeat messages.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Time given to the host to connect before the greeting is sent.
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(5);

/// Pause after each introductory greeting message.
pub const GREETING_DELAY: Duration = Duration::from_millis(200);

/// Pause after each numbered test message of the greeting.
pub const NUMBERED_DELAY: Duration = Duration::from_millis(500);

const GREETING: [&str; 4] = [
    "\r\n*** MidiCore Emulator Started ***\r\n",
    "MIOS Studio Terminal Test\r\n",
    "If you see this, terminal is WORKING!\r\n",
    "\r\n",
];

const FAREWELL: [&str; 4] = [
    "\r\n",
    "All test messages sent!\r\n",
    "If you see all 5 messages above, terminal is working perfectly.\r\n",
    "\r\n",
];

const TEST_MESSAGE_COUNT: usize = 5;

/// Answers of the emulated device, indexed by raw query type.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct DeviceInfoTable(BTreeMap<u8, String>);

impl Default for DeviceInfoTable {
    /// Returns the identity of a MidiCore device.
    fn default() -> Self {
        Self::new()
            .with(QueryType::OperatingSystem, "MIOS32")
            .with(QueryType::Board, "STM32F407VGT6")
            .with(QueryType::CoreFamily, "STM32F4")
            .with(QueryType::ChipId, "00000000")
            .with(QueryType::SerialNumber, "000001")
            .with(QueryType::FlashSize, "1048576")
            .with(QueryType::RamSize, "131072")
            .with(QueryType::AppName1, "MidiCore")
            .with(QueryType::AppName2, "v1.0")
    }
}

impl DeviceInfoTable {
    /// Constructs an empty table, answering every query with [`UNKNOWN_RESPONSE`].
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds or replaces an answer.
    #[must_use]
    pub fn with(mut self, query_type: impl Into<u8>, text: impl Into<String>) -> Self {
        self.0.insert(query_type.into(), text.into());
        self
    }

    /// Returns the answer to a query.
    #[must_use]
    pub fn lookup(&self, query_type: u8) -> &str {
        self.0.get(&query_type).map_or(UNKNOWN_RESPONSE, String::as_str)
    }
}

/// Emulated device.
#[derive(Debug)]
pub struct Target {
    codec: Codec,
    bootloader: Codec,
    info: DeviceInfoTable,
    messages_sent: usize,
    heartbeats: usize,
}

impl Target {
    /// Constructs a target talking the default query dialect.
    #[must_use]
    pub fn new(info: DeviceInfoTable) -> Self {
        Self::with_codec(Codec::default(), info)
    }

    /// Constructs a target talking a custom variant of the query dialect.
    ///
    /// Bootloader frames are always expected with checksum.
    #[must_use]
    pub fn with_codec(codec: Codec, info: DeviceInfoTable) -> Self {
        Self {
            codec,
            bootloader: Codec::bootloader(),
            info,
            messages_sent: 0,
            heartbeats: 0,
        }
    }

    /// Returns the codec of the query dialect.
    #[must_use]
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Returns the number of debug messages produced so far.
    #[must_use]
    pub fn messages_sent(&self) -> usize {
        self.messages_sent
    }

    /// Handles a received frame, returning the response if one is due.
    ///
    /// Only queries are answered. Malformed and foreign frames are ignored.
    pub fn handle(&mut self, bytes: &[u8]) -> Option<Vec<u8>> {
        let frame = match self.codec.parse_frame(bytes) {
            Ok(frame) => frame,
            Err(FrameError::WrongDialect) => {
                self.handle_bootloader(bytes);

                return None;
            }
            Err(err) => {
                debug!("Ignoring frame: {err}");

                return None;
            }
        };

        match frame.kind() {
            Some(Command::Query) => {
                let (instance, query_type) = self.codec.parse_query(bytes)?;
                let text = self.info.lookup(query_type);

                info!(
                    "Query for {} from instance {instance}: {text}",
                    QueryType::describe(query_type)
                );

                Some(self.codec.build_query_response(instance, text))
            }
            Some(Command::DebugMessage) => {
                if let Some(msg) = self.codec.parse_debug_message(bytes) {
                    info!("Terminal input: {}", msg.text.trim_end());
                }

                None
            }
            _ => {
                debug!("Ignoring command {:#04x}", frame.command);

                None
            }
        }
    }

    fn handle_bootloader(&self, bytes: &[u8]) {
        let Ok(frame) = self.bootloader.parse_frame(bytes) else {
            debug!("Ignoring frame of foreign dialect");

            return;
        };

        if let Err(err) = frame.verify_checksum() {
            warn!("Discarding bootloader frame: {err}");

            return;
        }

        match frame.kind() {
            Some(Command::EraseApp) => info!("Ignoring erase request"),
            Some(Command::WriteBlock) => match parse_write_block(frame.payload) {
                Some((addr, block)) => {
                    info!("Ignoring write of {} bytes at {addr:#010x}", block.len());
                }
                None => warn!("Discarding malformed block write"),
            },
            Some(Command::JumpApp) => info!("Ignoring jump request"),
            _ => debug!("Ignoring bootloader command {:#04x}", frame.command),
        }
    }

    /// Produces a debug message.
    pub fn debug_message(&mut self, text: &str) -> Vec<u8> {
        self.messages_sent += 1;
        debug!("Sending debug message {text:?}");

        self.codec.build_debug_message(text)
    }

    /// Returns the messages to send after startup, each with the pause following it.
    ///
    /// The introduction is spaced by [`GREETING_DELAY`], the numbered test messages
    /// by [`NUMBERED_DELAY`] and the closing messages are sent back to back.
    /// Frames are produced through [`Target::debug_message`] when sending,
    /// so that only messages actually sent are counted.
    #[must_use]
    pub fn greeting() -> Vec<(String, Duration)> {
        let intro = GREETING.iter().map(|text| (text.to_string(), GREETING_DELAY));
        let numbered = (1..=TEST_MESSAGE_COUNT)
            .map(|i| (format!("Test Message #{i}\r\n"), NUMBERED_DELAY));
        let farewell = FAREWELL.iter().map(|text| (text.to_string(), Duration::ZERO));

        intro.chain(numbered).chain(farewell).collect()
    }

    /// Produces the next heartbeat message.
    pub fn heartbeat(&mut self) -> Vec<u8> {
        self.heartbeats += 1;

        let text = format!(
            "[Heartbeat #{}] Terminal alive, sent {} messages\r\n",
            self.heartbeats, self.messages_sent
        );

        self.debug_message(&text)
    }
}
