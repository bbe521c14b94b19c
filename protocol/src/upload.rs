//! Firmware upload through the bootloader dialect.
//!
//! An upload is a fixed sequence of frames sent to the bootloader:
//!
//! 1. [`Command::EraseApp`] erases the application area.
//!    The bootloader does not acknowledge the erase, so the host has to wait
//!    blindly (see [`DEFAULT_ERASE_DELAY`]) before calling [`Uploader::erase_settled`].
//! 2. One [`Command::WriteBlock`] per block of the image, sent by [`Uploader::next_block`].
//!    Each payload carries the encoded start address, the encoded block length
//!    and the block itself.
//! 3. [`Command::JumpApp`] starts the new application, sent by [`Uploader::finish`].
//!
//! No frame is acknowledged and failed uploads are not resumed.
//! Waiting is left to the caller, which keeps the state machine free of any timer
//! and allows waits to be interrupted through [`Uploader::cancel`].
//!
//! # Examples
//!
//! ```
//! use midicore::{
//!     Interface,
//!     embedded_io_async::Write,
//!     upload::{DEFAULT_BLOCK_DELAY, DEFAULT_BLOCK_SIZE, DEFAULT_ERASE_DELAY, State, UploadError, Uploader},
//! };
//!
//! async fn upload<P: Write>(port: P, firmware: Vec<u8>) -> Result<(), UploadError<P::Error>> {
//!     let mut intf = Interface::new(port);
//!     let mut uploader = Uploader::new();
//!
//!     uploader.start(&mut intf, firmware, DEFAULT_BLOCK_SIZE).await?;
//!     tokio::time::sleep(DEFAULT_ERASE_DELAY).await;
//!     uploader.erase_settled()?;
//!
//!     while let State::Writing { .. } = uploader.state() {
//!         let progress = uploader.next_block(&mut intf).await?;
//!
//!         println!("{}%", progress.percent());
//!         tokio::time::sleep(DEFAULT_BLOCK_DELAY).await;
//!     }
//!
//!     uploader.finish(&mut intf).await
//! }
//! ```

use crate::{
    Error, Interface,
    codec::{decode_u14, decode_u32, encode_u14, encode_u32},
    frame::{Codec, Command},
};
use alloc::vec::Vec;
use core::{
    fmt::{Display, Formatter},
    time::Duration,
};
use embedded_io_async::Write;
use log::{debug, info, warn};

/// Largest block accepted by the bootloader.
pub const MAX_BLOCK_SIZE: u8 = 127;

/// Block size used by the upload tool unless configured otherwise.
pub const DEFAULT_BLOCK_SIZE: u8 = 64;

/// Time the bootloader needs to erase the application area.
pub const DEFAULT_ERASE_DELAY: Duration = Duration::from_secs(3);

/// Pause between two consecutive blocks.
pub const DEFAULT_BLOCK_DELAY: Duration = Duration::from_millis(20);

/// Pause after the jump command before the application is expected to run.
pub const DEFAULT_JUMP_DELAY: Duration = Duration::from_millis(500);

// Encoded address and encoded length
const BLOCK_HEADER_LEN: usize = 7;

/// State of an [`Uploader`].
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum State {
    /// No upload has been started.
    Idle,
    /// The erase command was sent, waiting for the erase to settle.
    Erasing,
    /// Blocks are being written, starting with the block at `offset`.
    Writing {
        /// Offset of the next block within the image.
        offset: usize,
    },
    /// All blocks were written, the jump command is pending.
    Jumping,
    /// The jump command was sent.
    Done,
    /// The upload was cancelled or failed.
    Aborted,
}

impl State {
    /// Returns whether an upload session exists in this state.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Erasing | Self::Writing { .. } | Self::Jumping)
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Erasing => write!(f, "erasing"),
            Self::Writing { offset } => write!(f, "writing at offset {offset}"),
            Self::Jumping => write!(f, "jumping"),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Progress of an upload session.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Progress {
    /// Number of blocks sent so far.
    pub blocks_sent: usize,
    /// Number of blocks making up the image.
    pub blocks_total: usize,
    /// Number of bytes sent so far.
    pub bytes_sent: usize,
    /// Size of the image.
    pub bytes_total: usize,
}

impl Progress {
    /// Returns the share of bytes sent in percent.
    #[must_use]
    pub fn percent(&self) -> u8 {
        let sent = self.bytes_sent as u64 * 100;

        u8::try_from(sent / self.bytes_total.max(1) as u64).unwrap_or(100)
    }
}

/// An operation was requested in a state that does not allow it.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct InvalidState(pub State);

impl Display for InvalidState {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        write!(f, "operation not allowed while {}", self.0)
    }
}

impl core::error::Error for InvalidState {}

/// Error type for [`Uploader`] operations.
///
/// Every error except [`UploadError::SessionAlreadyActive`] leaves the
/// uploader without a session.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug)]
pub enum UploadError<E> {
    /// The block size is outside `1..=127`.
    InvalidBlockSize(u8),
    /// The firmware image is empty.
    EmptyFirmware,
    /// The firmware image does not fit the 32-bit address space.
    FirmwareTooLarge,
    /// Another upload is in progress.
    SessionAlreadyActive,
    /// The operation is not allowed in the current state.
    InvalidState(State),
    /// Sending a frame failed, the upload was aborted.
    TransportFailure {
        /// Offset of the block (or of the next block) at the time of the failure.
        offset: usize,
        /// Underlying transport error.
        source: Error<E>,
    },
}

impl<E: core::error::Error> Display for UploadError<E> {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        match self {
            Self::InvalidBlockSize(size) => {
                write!(f, "invalid block size {size}, must be 1..={MAX_BLOCK_SIZE}")
            }
            Self::EmptyFirmware => write!(f, "empty firmware image"),
            Self::FirmwareTooLarge => write!(f, "firmware image too large"),
            Self::SessionAlreadyActive => write!(f, "upload session already active"),
            Self::InvalidState(state) => write!(f, "operation not allowed while {state}"),
            Self::TransportFailure { offset, source } => {
                write!(f, "transport failure at offset {offset:#x}: {source}")
            }
        }
    }
}

impl<E: core::error::Error + 'static> core::error::Error for UploadError<E> {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::TransportFailure { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl<E> From<InvalidState> for UploadError<E> {
    fn from(err: InvalidState) -> Self {
        Self::InvalidState(err.0)
    }
}

#[derive(Debug)]
struct UploadSession {
    firmware: Vec<u8>,
    offset: usize,
    block_size: usize,
    blocks_total: usize,
    blocks_sent: usize,
}

impl UploadSession {
    fn progress(&self) -> Progress {
        Progress {
            blocks_sent: self.blocks_sent,
            blocks_total: self.blocks_total,
            bytes_sent: self.offset,
            bytes_total: self.firmware.len(),
        }
    }
}

/// Firmware upload state machine.
///
/// At most one upload session exists at a time. The session owns the firmware
/// image and is dropped as soon as the upload completes or aborts.
#[derive(Debug)]
pub struct Uploader {
    codec: Codec,
    state: State,
    session: Option<UploadSession>,
}

impl Default for Uploader {
    fn default() -> Self {
        Self::new()
    }
}

impl Uploader {
    /// Constructs an idle uploader talking the bootloader dialect.
    #[must_use]
    pub fn new() -> Self {
        Self::with_codec(Codec::bootloader())
    }

    /// Constructs an idle uploader using a custom codec,
    /// e.g. to address another device instance.
    #[must_use]
    pub fn with_codec(codec: Codec) -> Self {
        Self {
            codec,
            state: State::Idle,
            session: None,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns the progress of the active session.
    #[must_use]
    pub fn progress(&self) -> Option<Progress> {
        self.session.as_ref().map(UploadSession::progress)
    }

    /// Starts an upload by erasing the application area.
    ///
    /// Afterwards, the caller has to wait for the erase to settle and then call
    /// [`Uploader::erase_settled`].
    ///
    /// # Errors
    ///
    /// - [`UploadError::SessionAlreadyActive`] if an upload is in progress.
    ///   The active session is left untouched.
    /// - [`UploadError::InvalidBlockSize`] if `block_size` is outside `1..=127`.
    /// - [`UploadError::EmptyFirmware`] if `firmware` is empty.
    /// - [`UploadError::TransportFailure`] if the erase command could not be sent.
    pub async fn start<P: Write>(
        &mut self,
        intf: &mut Interface<P>,
        firmware: Vec<u8>,
        block_size: u8,
    ) -> Result<Progress, UploadError<P::Error>> {
        if self.state.is_active() {
            return Err(UploadError::SessionAlreadyActive);
        }

        if block_size == 0 || block_size > MAX_BLOCK_SIZE {
            return Err(UploadError::InvalidBlockSize(block_size));
        }

        if firmware.is_empty() {
            return Err(UploadError::EmptyFirmware);
        }

        if u32::try_from(firmware.len()).is_err() {
            return Err(UploadError::FirmwareTooLarge);
        }

        let block_size = usize::from(block_size);
        let session = UploadSession {
            blocks_total: firmware.len().div_ceil(block_size),
            firmware,
            offset: 0,
            block_size,
            blocks_sent: 0,
        };
        let progress = session.progress();

        info!(
            "Erasing application for {} bytes in {} blocks",
            progress.bytes_total, progress.blocks_total
        );

        self.session = Some(session);
        self.state = State::Erasing;

        let frame = self.codec.build_frame(Command::EraseApp, &[]);

        self.transmit(intf, &frame, 0).await?;

        Ok(progress)
    }

    /// Signals that the erase has settled, allowing blocks to be written.
    pub fn erase_settled(&mut self) -> Result<(), InvalidState> {
        if self.state != State::Erasing {
            return Err(InvalidState(self.state));
        }

        debug!("Erase settled");
        self.state = State::Writing { offset: 0 };

        Ok(())
    }

    /// Aborts the active upload and drops its session.
    ///
    /// Completed uploads are not affected.
    pub fn cancel(&mut self) {
        if self.state == State::Done {
            return;
        }

        if self.state.is_active() {
            warn!("Upload cancelled while {}", self.state);
        }

        self.abort();
    }

    /// Sends the next block of the image.
    ///
    /// Moves on to [`State::Jumping`] once the last block was sent.
    pub async fn next_block<P: Write>(
        &mut self,
        intf: &mut Interface<P>,
    ) -> Result<Progress, UploadError<P::Error>> {
        let State::Writing { offset } = self.state else {
            return Err(InvalidState(self.state).into());
        };
        let session = self.session.as_mut().ok_or(InvalidState(self.state))?;
        let end = session.firmware.len().min(offset + session.block_size);
        let addr = u32::try_from(offset).map_err(|_| UploadError::FirmwareTooLarge)?;
        let frame = self
            .codec
            .build_write_block(addr, &session.firmware[offset..end]);

        // Session is dropped if the transmission fails
        session.offset = end;
        session.blocks_sent += 1;

        let progress = session.progress();

        self.state = if end < session.firmware.len() {
            State::Writing { offset: end }
        } else {
            info!("All {} blocks written", progress.blocks_sent);

            State::Jumping
        };

        self.transmit(intf, &frame, offset).await?;

        Ok(progress)
    }

    /// Starts the uploaded application, completing the upload.
    pub async fn finish<P: Write>(
        &mut self,
        intf: &mut Interface<P>,
    ) -> Result<(), UploadError<P::Error>> {
        if self.state != State::Jumping {
            return Err(InvalidState(self.state).into());
        }

        let offset = self.session.as_ref().map_or(0, |sess| sess.offset);
        let frame = self.codec.build_frame(Command::JumpApp, &[]);

        self.transmit(intf, &frame, offset).await?;

        info!("Jumping to application");
        self.state = State::Done;
        self.session = None;

        Ok(())
    }

    async fn transmit<P: Write>(
        &mut self,
        intf: &mut Interface<P>,
        frame: &[u8],
        offset: usize,
    ) -> Result<(), UploadError<P::Error>> {
        intf.send(frame).await.map_err(|source| {
            warn!("Aborting upload at offset {offset:#x}: {source:?}");
            self.abort();

            UploadError::TransportFailure { offset, source }
        })
    }

    fn abort(&mut self) {
        self.state = State::Aborted;
        self.session = None;
    }
}

impl Codec {
    /// Builds a [`Command::WriteBlock`] frame for a block starting at `addr`.
    ///
    /// The block bytes are placed into the frame as they are, as the bootloader
    /// expects them. Bytes of `0x80` and above are MIDI status bytes, so receivers
    /// cut such a frame short or drop it.
    ///
    /// ```
    /// let frame = midicore::Codec::bootloader().build_write_block(0x80, &[0x12, 0x34]);
    ///
    /// assert_eq!(&frame[7..14], [0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x02]);
    /// assert_eq!(&frame[14..16], [0x12, 0x34]);
    /// ```
    #[must_use]
    pub fn build_write_block(&self, addr: u32, block: &[u8]) -> Vec<u8> {
        if let Some(pos) = block.iter().position(|&b| b >= 0x80) {
            warn!(
                "Block at {addr:#010x} contains status byte {:#04x} at {pos}, frame will not survive MIDI transport",
                block[pos]
            );
        }

        let mut payload = Vec::with_capacity(BLOCK_HEADER_LEN + block.len());

        payload.extend_from_slice(&encode_u32(addr));
        payload.extend_from_slice(&encode_u14(block.len() as u16));
        payload.extend_from_slice(block);

        self.build_frame(Command::WriteBlock, &payload)
    }
}

/// Splits the payload of a [`Command::WriteBlock`] frame into address and block.
///
/// Returns [`None`] if the encoded length does not match the payload.
#[must_use]
pub fn parse_write_block(payload: &[u8]) -> Option<(u32, &[u8])> {
    let (header, block) = payload.split_at_checked(BLOCK_HEADER_LEN)?;
    let addr = decode_u32(header[..5].try_into().ok()?);
    let len = decode_u14(header[5..].try_into().ok()?);

    (block.len() == usize::from(len)).then_some((addr, block))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::init_logger;
    use alloc::{collections::vec_deque::VecDeque, vec};
    use core::{convert::Infallible, iter};
    use embedded_io_async::{ErrorKind, ErrorType};

    /// Port accepting a limited number of writes.
    struct FailingPort {
        written: Vec<u8>,
        writes_left: usize,
    }

    impl ErrorType for FailingPort {
        type Error = ErrorKind;
    }

    impl Write for FailingPort {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            if self.writes_left == 0 {
                return Err(ErrorKind::Other);
            }

            self.writes_left -= 1;
            self.written.extend_from_slice(buf);

            Ok(buf.len())
        }

        async fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    /// Splits the written bytes into the frames of an upload.
    ///
    /// Blocks may contain the terminator, so frames are cut by their known length.
    fn frames(bytes: &VecDeque<u8>, firmware_len: usize, block_size: u8) -> Vec<Vec<u8>> {
        let block_size = usize::from(block_size);
        let writes = (0..firmware_len)
            .step_by(block_size)
            .map(|offset| 16 + block_size.min(firmware_len - offset));
        let mut bytes = bytes.iter().copied();
        let frames = iter::once(9)
            .chain(writes)
            .chain(iter::once(9))
            .map(|len| bytes.by_ref().take(len).collect())
            .collect();

        assert_eq!(bytes.next(), None, "no bytes should follow the jump");

        frames
    }

    async fn upload(
        intf: &mut Interface<&mut VecDeque<u8>>,
        firmware: Vec<u8>,
        block_size: u8,
    ) -> Result<(), UploadError<Infallible>> {
        let mut uploader = Uploader::new();

        uploader.start(intf, firmware, block_size).await?;
        uploader.erase_settled()?;

        while let State::Writing { .. } = uploader.state() {
            uploader.next_block(intf).await?;
        }

        uploader.finish(intf).await
    }

    #[test]
    fn write_block_payload() {
        init_logger();

        let frame = Codec::bootloader()
            .with_checksum(false)
            .build_write_block(0x0000_0100, &[0xaa, 0x55]);

        assert_eq!(
            frame,
            [
                0xf0, 0x00, 0x00, 0x7e, 0x40, 0x00, 0x02, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00,
                0x02, 0xaa, 0x55, 0xf7
            ],
            "frame contents should be correct"
        );
        assert_eq!(
            parse_write_block(&frame[7..16]),
            Some((0x0000_0100, &[0xaa, 0x55][..])),
            "payload should be parsed"
        );
        assert_eq!(
            parse_write_block(&frame[7..15]),
            None,
            "truncated payload should be rejected"
        );
    }

    #[tokio::test]
    async fn upload_blocks() -> Result<(), UploadError<Infallible>> {
        init_logger();

        let firmware: Vec<u8> = (0..130).collect();
        let mut deque = VecDeque::new();
        let mut intf = Interface::new(&mut deque);

        upload(&mut intf, firmware.clone(), 64).await?;

        let frames = frames(&deque, 130, 64);
        let codec = Codec::bootloader();

        assert_eq!(frames.len(), 5, "frame count should be correct");
        assert_eq!(
            frames[0],
            [0xf0, 0x00, 0x00, 0x7e, 0x40, 0x00, 0x04, 0x7c, 0xf7],
            "first frame should erase"
        );
        assert_eq!(
            frames[4],
            [0xf0, 0x00, 0x00, 0x7e, 0x40, 0x00, 0x05, 0x7b, 0xf7],
            "last frame should jump"
        );

        let blocks: Vec<_> = frames[1..4]
            .iter()
            .map(|frame| {
                let frame = codec.parse_frame(frame).unwrap();

                assert_eq!(frame.kind(), Some(Command::WriteBlock), "command should be correct");
                assert_eq!(frame.verify_checksum(), Ok(()), "checksum should verify");

                let (addr, block) = parse_write_block(frame.payload).unwrap();

                (addr, block.to_vec())
            })
            .collect();

        assert_eq!(
            blocks.iter().map(|(addr, _)| *addr).collect::<Vec<_>>(),
            [0, 64, 128],
            "block addresses should be correct"
        );
        assert_eq!(
            blocks.iter().map(|(_, block)| block.len()).collect::<Vec<_>>(),
            [64, 64, 2],
            "block lengths should be correct"
        );
        assert_eq!(
            blocks.into_iter().flat_map(|(_, block)| block).collect::<Vec<_>>(),
            firmware,
            "blocks should reconstruct the image"
        );

        Ok(())
    }

    #[tokio::test]
    async fn upload_covers_image() -> Result<(), UploadError<Infallible>> {
        init_logger();

        let codec = Codec::bootloader();

        // Images contain status bytes and terminators
        for (len, block_size) in [(1_usize, 1), (1, 127), (127, 127), (128, 127), (1000, 33)] {
            let firmware: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
            let mut deque = VecDeque::new();
            let mut intf = Interface::new(&mut deque);

            upload(&mut intf, firmware.clone(), block_size).await?;

            let frames = frames(&deque, len, block_size);
            let mut image = Vec::new();

            assert_eq!(
                frames.len() - 2,
                len.div_ceil(usize::from(block_size)),
                "block count should be correct for {len} bytes"
            );

            for (i, frame) in frames[1..frames.len() - 1].iter().enumerate() {
                let frame = codec.parse_frame(frame).unwrap();
                let (addr, block) = parse_write_block(frame.payload).unwrap();

                assert_eq!(
                    addr as usize,
                    i * usize::from(block_size),
                    "address of block {i} should be correct"
                );

                image.extend_from_slice(block);
            }

            assert_eq!(image, firmware, "blocks should reconstruct the image");
        }

        Ok(())
    }

    #[tokio::test]
    async fn progress() -> Result<(), UploadError<Infallible>> {
        init_logger();

        let mut deque = VecDeque::new();
        let mut intf = Interface::new(&mut deque);
        let mut uploader = Uploader::new();

        assert_eq!(uploader.progress(), None, "idle uploader should have no progress");

        let progress = uploader.start(&mut intf, vec![0x00; 100], 40).await?;

        assert_eq!(
            progress,
            Progress {
                blocks_sent: 0,
                blocks_total: 3,
                bytes_sent: 0,
                bytes_total: 100,
            },
            "initial progress should be correct"
        );

        uploader.erase_settled()?;

        let progress = uploader.next_block(&mut intf).await?;

        assert_eq!(progress.blocks_sent, 1, "block count should increase");
        assert_eq!(progress.bytes_sent, 40, "byte count should increase");
        assert_eq!(progress.percent(), 40, "percentage should be correct");
        assert_eq!(uploader.progress(), Some(progress), "progress should be kept");

        uploader.next_block(&mut intf).await?;

        let progress = uploader.next_block(&mut intf).await?;

        assert_eq!(progress.blocks_sent, 3, "all blocks should be sent");
        assert_eq!(progress.percent(), 100, "percentage should be complete");
        assert_eq!(uploader.state(), State::Jumping, "state should be jumping");

        uploader.finish(&mut intf).await?;

        assert_eq!(uploader.state(), State::Done, "state should be done");
        assert_eq!(uploader.progress(), None, "session should be dropped");

        Ok(())
    }

    #[tokio::test]
    async fn state_sequence() -> Result<(), UploadError<Infallible>> {
        init_logger();

        let mut deque = VecDeque::new();
        let mut intf = Interface::new(&mut deque);
        let mut uploader = Uploader::new();

        assert_eq!(uploader.state(), State::Idle, "state should be idle");
        assert_eq!(
            uploader.next_block(&mut intf).await,
            Err(UploadError::InvalidState(State::Idle)),
            "writing should not be allowed while idle"
        );

        uploader.start(&mut intf, vec![0x01, 0x02, 0x03], 2).await?;

        assert_eq!(uploader.state(), State::Erasing, "state should be erasing");
        assert_eq!(
            uploader.finish(&mut intf).await,
            Err(UploadError::InvalidState(State::Erasing)),
            "jumping should not be allowed while erasing"
        );

        uploader.erase_settled()?;

        assert_eq!(
            uploader.state(),
            State::Writing { offset: 0 },
            "state should be writing"
        );
        assert_eq!(
            uploader.erase_settled(),
            Err(InvalidState(State::Writing { offset: 0 })),
            "erase should not settle twice"
        );

        uploader.next_block(&mut intf).await?;

        assert_eq!(
            uploader.state(),
            State::Writing { offset: 2 },
            "offset should advance"
        );

        uploader.next_block(&mut intf).await?;
        uploader.finish(&mut intf).await?;

        assert_eq!(uploader.state(), State::Done, "state should be done");

        uploader.cancel();

        assert_eq!(uploader.state(), State::Done, "cancel should not undo completion");

        Ok(())
    }

    #[tokio::test]
    async fn error_session_already_active() -> Result<(), UploadError<Infallible>> {
        init_logger();

        let mut deque = VecDeque::new();
        let mut intf = Interface::new(&mut deque);
        let mut uploader = Uploader::new();

        uploader.start(&mut intf, vec![0x00; 200], 64).await?;
        uploader.erase_settled()?;
        uploader.next_block(&mut intf).await?;

        let progress = uploader.progress();
        let written = intf.port().len();

        assert_eq!(
            uploader.start(&mut intf, vec![0xff; 10], 8).await,
            Err(UploadError::SessionAlreadyActive),
            "result should be session already active error"
        );
        assert_eq!(uploader.progress(), progress, "progress should be unchanged");
        assert_eq!(
            uploader.state(),
            State::Writing { offset: 64 },
            "state should be unchanged"
        );
        assert_eq!(intf.port().len(), written, "nothing should be sent");

        Ok(())
    }

    #[tokio::test]
    async fn error_invalid_arguments() {
        init_logger();

        let mut deque = VecDeque::new();
        let mut intf = Interface::new(&mut deque);
        let mut uploader = Uploader::new();

        for block_size in [0, 128, 255] {
            assert_eq!(
                uploader.start(&mut intf, vec![0x00; 10], block_size).await,
                Err(UploadError::InvalidBlockSize(block_size)),
                "result should be invalid block size error for {block_size}"
            );
        }

        assert_eq!(
            uploader.start(&mut intf, Vec::new(), 64).await,
            Err(UploadError::EmptyFirmware),
            "result should be empty firmware error"
        );
        assert_eq!(uploader.state(), State::Idle, "state should be unchanged");
        assert!(intf.port().is_empty(), "nothing should be sent");
    }

    #[tokio::test]
    async fn error_transport_failure() {
        init_logger();

        // Erase and first block
        let mut port = FailingPort {
            written: Vec::new(),
            writes_left: 2,
        };
        let mut intf = Interface::new(&mut port);
        let mut uploader = Uploader::new();

        uploader
            .start(&mut intf, vec![0x00; 100], 50)
            .await
            .unwrap();
        uploader.erase_settled().unwrap();
        uploader.next_block(&mut intf).await.unwrap();

        assert_eq!(
            uploader.next_block(&mut intf).await,
            Err(UploadError::TransportFailure {
                offset: 50,
                source: Error::Io(ErrorKind::Other),
            }),
            "result should be transport failure at second block"
        );
        assert_eq!(uploader.state(), State::Aborted, "state should be aborted");
        assert_eq!(uploader.progress(), None, "session should be dropped");
        assert_eq!(
            uploader.next_block(&mut intf).await,
            Err(UploadError::InvalidState(State::Aborted)),
            "upload should not resume"
        );
    }

    #[tokio::test]
    async fn error_transport_failure_on_erase() {
        init_logger();

        let mut port = FailingPort {
            written: Vec::new(),
            writes_left: 0,
        };
        let mut intf = Interface::new(&mut port);
        let mut uploader = Uploader::new();

        assert_eq!(
            uploader.start(&mut intf, vec![0x00; 10], 64).await,
            Err(UploadError::TransportFailure {
                offset: 0,
                source: Error::Io(ErrorKind::Other),
            }),
            "result should be transport failure"
        );
        assert_eq!(uploader.state(), State::Aborted, "state should be aborted");
        assert!(intf.port().written.is_empty(), "nothing should be written");
    }

    #[tokio::test]
    async fn cancel_during_erase() -> Result<(), UploadError<Infallible>> {
        init_logger();

        let mut deque = VecDeque::new();
        let mut intf = Interface::new(&mut deque);
        let mut uploader = Uploader::new();

        uploader.start(&mut intf, vec![0x00; 10], 64).await?;
        uploader.cancel();

        assert_eq!(uploader.state(), State::Aborted, "state should be aborted");
        assert_eq!(uploader.progress(), None, "session should be dropped");
        assert_eq!(
            uploader.erase_settled(),
            Err(InvalidState(State::Aborted)),
            "erase should not settle after cancel"
        );

        // A new session may follow an aborted one
        uploader.start(&mut intf, vec![0x00; 10], 64).await?;

        assert_eq!(uploader.state(), State::Erasing, "state should be erasing");

        Ok(())
    }
}
