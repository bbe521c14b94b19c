//! Talk to MidiCore and MIOS32 devices through their SysEx protocol.
//!
//! # Overview
//!
//! The `midicore` crate implements the System Exclusive protocol spoken by
//! MidiCore firmware and by MIOS Studio. It offers an asynchronous,
//! platform-agnostic API for identifying devices, exchanging debug terminal
//! messages and uploading firmware through the bootloader.
//!
//! Depending on your needs, you can:
//!
//! - Build and parse frames with a [`Codec`], without any I/O.
//! - Exchange frames with a device through an [`Interface`].
//! - Upload firmware with the state machine in the [`upload`] module.
//! - Play the device role in tests with the [`emulator`] module.
//!
//! # Getting started
//!
//! Devices are reached through any MIDI transport carrying SysEx,
//! e.g. a raw MIDI character device or a serial MIDI adapter.
//! If you enable the `native-midi` feature, you can open a compatible
//! port using [`port::open_rawmidi`] or [`port::open_serial`]:
//!
//! ```no_run
//! # #[cfg(feature = "native-midi")]
//! # #[tokio::main]
//! # async fn main() -> Result<(), midicore::port::PortError> {
//! let mut port = midicore::port::open_rawmidi("/dev/snd/midiC1D0").await?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "native-midi"))]
//! # fn main() {}
//! ```
//!
//! # Examples
//!
//! ## Identifying a device
//!
//! ```no_run
//! use midicore::query::QueryType;
//!
//! # #[cfg(feature = "native-midi")]
//! # #[tokio::main]
//! # async fn main() -> midicore::Result<(), midicore::port::PortError> {
//! # let port = midicore::port::open_rawmidi("/dev/snd/midiC1D0").await?;
//! let mut intf = midicore::Interface::new(port);
//!
//! println!("Operating system: {}", intf.query(QueryType::OperatingSystem).await?);
//! println!("Board: {}", intf.query(QueryType::Board).await?);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "native-midi"))]
//! # fn main() {}
//! ```
//!
//! ## Working with frames
//!
//! ```
//! use midicore::{Codec, query::QueryType};
//!
//! let codec = Codec::default().with_instance(0x01);
//! let query = codec.build_query(QueryType::ChipId);
//!
//! assert_eq!(codec.parse_query(&query), Some((0x01, 0x04)));
//! ```
//!
//! # Protocol details
//!
//! Frames of the protocol are SysEx messages with the manufacturer ID `00 00 7E`,
//! followed by a device family byte selecting the dialect. The query and debug
//! terminal dialect uses family `0x32`, the bootloader uses family `0x40`.
//!
//! Nothing except queries is acknowledged. In particular, the bootloader never
//! confirms erases or written blocks, so uploads rely on fixed delays.
//! Responses are not correlated with queries either: a response arriving
//! after its query timed out is taken for the answer to the next query,
//! unless the port is drained before sending.
#![no_std]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;
#[cfg(feature = "native-midi")]
extern crate std;

pub mod codec;
pub mod debug;
pub mod emulator;
pub mod frame;
#[cfg(feature = "native-midi")]
#[cfg_attr(docsrs, doc(cfg(feature = "native-midi")))]
pub mod port;
pub mod query;
pub mod upload;

pub use codec::{checksum, decode_u14, decode_u32, encode_u14, encode_u32};
pub use embedded_io_async;
pub use frame::{ChecksumMismatch, Codec, Command, FrameError, ParsedFrame, SysexAssembler};

use alloc::{string::String, vec::Vec};
use core::fmt::{Display, Formatter};
use embedded_io_async::{Read, ReadExactError, Write};
use log::{debug, trace};

/// A specialized [`Result`] type for [`Interface`] operations.
///
/// Uses [`Error<E>`] as the error variant, which can include port-specific errors.
pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Error type for [`Interface`] operations.
///
/// The generic parameter `E` allows the error type to carry a port-specific error.
///
/// This enum is marked `#[non_exhaustive]` to allow for future variants.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug)]
pub enum Error<E> {
    /// The port encountered an unexpected end-of-file.
    UnexpectedEof,
    /// A port-specific input/output error.
    Io(E),
}

impl<E: core::error::Error> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end-of-file"),
            Self::Io(err) => write!(f, "input/output error: {err}"),
        }
    }
}

impl<E: core::error::Error> core::error::Error for Error<E> {}

impl<E> From<E> for Error<E> {
    fn from(err: E) -> Self {
        Self::Io(err)
    }
}

impl<E> From<ReadExactError<E>> for Error<E> {
    fn from(err: ReadExactError<E>) -> Self {
        match err {
            ReadExactError::UnexpectedEof => Self::UnexpectedEof,
            ReadExactError::Other(err) => Self::Io(err),
        }
    }
}

/// Asynchronous SysEx interface to a device.
///
/// Requires a port that implements [`Write`] for sending and [`Read`] for receiving.
/// Received bytes are collected by a [`SysexAssembler`] owned by the interface,
/// so a cancelled [`Interface::receive`] keeps partially received frames.
///
/// Frames are built with the interface's [`Codec`], see [`Interface::with_codec`].
///
/// # Examples
///
/// ```no_run
/// # #[cfg(feature = "native-midi")]
/// # async fn example() -> midicore::Result<(), midicore::port::PortError> {
/// let port = midicore::port::open_serial("/dev/ttyUSB0", midicore::port::MIDI_BAUD_RATE)?;
/// let mut intf = midicore::Interface::new(port);
///
/// intf.send_terminal_input("help").await?;
///
/// loop {
///     let frame = intf.receive().await?;
///
///     if let Some(msg) = intf.codec().parse_debug_message(&frame) {
///         print!("{}", msg.text);
///     }
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct Interface<P> {
    port: P,
    codec: Codec,
    assembler: SysexAssembler,
}

impl<P> Interface<P> {
    /// Constructs a new interface talking the default query dialect.
    pub fn new(port: P) -> Self {
        Self::with_codec(port, Codec::default())
    }

    /// Constructs a new interface talking a custom dialect.
    pub fn with_codec(port: P, codec: Codec) -> Self {
        Self {
            port,
            codec,
            assembler: SysexAssembler::new(),
        }
    }

    /// Returns the codec used for building frames.
    #[must_use]
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Returns a reference to the underlying port.
    #[must_use]
    pub fn port(&self) -> &P {
        &self.port
    }
}

impl<P: Write> Interface<P> {
    /// Sends a complete frame.
    pub async fn send(&mut self, frame: &[u8]) -> Result<(), P::Error> {
        trace!("Write to port: {frame:02x?}");
        self.port.write_all(frame).await?;
        self.port.flush().await?;

        Ok(())
    }

    /// Sends terminal output to the host, as a device would.
    pub async fn send_debug_message(&mut self, text: &str) -> Result<(), P::Error> {
        let frame = self.codec.build_debug_message(text);

        self.send(&frame).await
    }

    /// Sends a command to the device's terminal.
    pub async fn send_terminal_input(&mut self, text: &str) -> Result<(), P::Error> {
        let frame = self.codec.build_terminal_input(text);

        self.send(&frame).await
    }
}

impl<P: Read> Interface<P> {
    /// Receives the next complete SysEx frame.
    ///
    /// Frames of any dialect are returned, including both delimiters.
    /// Other MIDI messages are skipped.
    ///
    /// This method is cancel safe, bytes of an incomplete frame are kept
    /// for the next call.
    ///
    /// # Errors
    ///
    /// - [`Error::UnexpectedEof`] if the port is closed.
    pub async fn receive(&mut self) -> Result<Vec<u8>, P::Error> {
        loop {
            let mut byte = [0x00];

            self.port.read_exact(&mut byte).await?;

            if let Some(frame) = self.assembler.push(byte[0]) {
                trace!("Read from port: {frame:02x?}");

                return Ok(frame);
            }
        }
    }
}

impl<P: Read + Write> Interface<P> {
    /// Queries an attribute of the device.
    ///
    /// Frames received before the response are discarded, as are responses
    /// of other device instances. Responses waiting from earlier queries are
    /// not told apart, so callers should drain the port first
    /// (see `Interface::drain` with the `native-midi` feature).
    ///
    /// The query does not time out on its own. Callers should wrap it,
    /// e.g. in `tokio::time::timeout`.
    pub async fn query(&mut self, query_type: impl Into<u8>) -> Result<String, P::Error> {
        let frame = self.codec.build_query(query_type);

        self.send(&frame).await?;

        loop {
            let frame = self.receive().await?;

            match self.codec.parse_query_response(&frame) {
                Some((instance, text)) if instance == self.codec.instance() => return Ok(text),
                Some((instance, _)) => debug!("Skipping response of instance {instance}"),
                None => debug!("Skipping frame while waiting for response: {frame:02x?}"),
            }
        }
    }
}
