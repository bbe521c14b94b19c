//! Native asynchronous MIDI port support for [`Interface`](crate::Interface).
//!
//! Devices are reached either through a raw MIDI character device
//! (e.g. `/dev/snd/midiC1D0` on Linux), or through a serial port
//! using the [`serial2-tokio`](https://crates.io/crates/serial2-tokio) crate.
//!
//! Also provides the command-line arguments shared by the bundled tools.

use crate::{
    Codec, Interface,
    frame::{DEFAULT_INSTANCE, QUERY_FAMILY},
};
use clap::Args;
use embedded_io_adapters::tokio_1::FromTokio;
use embedded_io_async::{ErrorType, Read, Write};
use log::debug;
use serial2_tokio::{SerialPort, Settings};
use std::{string::String, time::Duration};
use tokio::{
    fs::{File, OpenOptions},
    time,
};

/// Baud rate of a MIDI DIN connection.
pub const MIDI_BAUD_RATE: u32 = 31_250;

/// Serial port type implementing [`Read`] and [`Write`].
pub type SerialMidiPort = FromTokio<SerialPort>;

/// Raw MIDI device implementing [`Read`] and [`Write`].
///
/// The device is opened once for reading and once for writing.
/// A read left pending by a cancelled receive never holds up a write.
pub struct RawMidiPort {
    input: FromTokio<File>,
    output: FromTokio<File>,
}

impl ErrorType for RawMidiPort {
    type Error = PortError;
}

impl Read for RawMidiPort {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.input.read(buf).await
    }
}

impl Write for RawMidiPort {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.output.write(buf).await
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.output.flush().await
    }
}

/// Port-specific error type to be used as `E` for the generic [`Error<E>`](crate::Error) type.
pub type PortError = std::io::Error;

/// Opens a serial port at the given path, e.g. of a USB MIDI adapter in CDC mode.
///
/// Returns a [`SerialMidiPort`] that can be passed to [`Interface::new`](crate::Interface::new).
pub fn open_serial(path: &str, baud_rate: u32) -> Result<SerialMidiPort, PortError> {
    let port = SerialPort::open(path, |mut settings: Settings| {
        settings.set_raw();
        settings.set_baud_rate(baud_rate)?;

        Ok(settings)
    })?;

    port.discard_buffers()?;

    Ok(FromTokio::new(port))
}

/// Opens a raw MIDI device at the given path.
///
/// Returns a [`RawMidiPort`] that can be passed to [`Interface::new`](crate::Interface::new).
pub async fn open_rawmidi(path: &str) -> Result<RawMidiPort, PortError> {
    // Both ends are opened together, as opening one end of a FIFO waits for the other
    let mut read_options = OpenOptions::new();
    read_options.read(true);
    let mut write_options = OpenOptions::new();
    write_options.write(true);
    let (input, output) = tokio::try_join!(
        read_options.open(path),
        write_options.open(path),
    )?;

    Ok(RawMidiPort {
        input: FromTokio::new(input),
        output: FromTokio::new(output),
    })
}

/// Either kind of native port.
pub enum Port {
    /// Serial port.
    Serial(SerialMidiPort),
    /// Raw MIDI device.
    RawMidi(RawMidiPort),
}

impl ErrorType for Port {
    type Error = PortError;
}

impl Read for Port {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match self {
            Self::Serial(port) => port.read(buf).await,
            Self::RawMidi(port) => port.read(buf).await,
        }
    }
}

impl Write for Port {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        match self {
            Self::Serial(port) => port.write(buf).await,
            Self::RawMidi(port) => port.write(buf).await,
        }
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        match self {
            Self::Serial(port) => port.flush().await,
            Self::RawMidi(port) => port.flush().await,
        }
    }
}

impl<P: Read> Interface<P> {
    /// Discards frames already waiting on the port.
    ///
    /// Frames are received until the port stays quiet for the given time.
    /// Returns the number of discarded frames.
    pub async fn drain(&mut self, quiet: Duration) -> crate::Result<usize, P::Error> {
        let mut discarded = 0;

        while let Ok(res) = time::timeout(quiet, self.receive()).await {
            let frame = res?;

            debug!("Discarding pending frame: {frame:02x?}");
            discarded += 1;
        }

        Ok(discarded)
    }
}

/// Command-line arguments selecting a port.
#[derive(Args, Debug)]
pub struct PortArgs {
    /// MIDI port path (raw MIDI device, or serial port with `--serial`)
    #[arg(short, long, default_value = "/dev/snd/midiC1D0")]
    pub port: String,

    /// Open the port as serial port
    #[arg(short, long)]
    pub serial: bool,

    /// Baud rate of the serial port
    #[arg(short, long, default_value_t = MIDI_BAUD_RATE)]
    pub baud: u32,
}

impl PortArgs {
    /// Opens the selected port.
    pub async fn open(&self) -> Result<Port, PortError> {
        if self.serial {
            Ok(Port::Serial(open_serial(&self.port, self.baud)?))
        } else {
            Ok(Port::RawMidi(open_rawmidi(&self.port).await?))
        }
    }
}

/// Command-line arguments selecting a protocol variant.
#[derive(Args, Debug)]
pub struct ProtocolArgs {
    /// Device instance (0-127)
    #[arg(short, long, default_value_t = DEFAULT_INSTANCE, value_parser = clap::value_parser!(u8).range(0..=127))]
    pub instance: u8,

    /// Omit the checksum, as MIOS Studio does
    #[arg(long)]
    pub plain: bool,

    /// Omit the direction marker of debug messages
    #[arg(long)]
    pub no_marker: bool,
}

impl ProtocolArgs {
    /// Returns the codec of the query dialect for the selected variant.
    #[must_use]
    pub fn codec(&self) -> Codec {
        Codec::new(QUERY_FAMILY)
            .with_instance(self.instance)
            .with_checksum(!self.plain)
            .with_debug_marker(!self.no_marker)
    }
}
