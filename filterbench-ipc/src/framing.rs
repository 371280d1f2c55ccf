//! Length-Prefixed Framing
//!
//! Gives message boundaries to the byte streams shared by the supervisor and
//! its worker processes (inherited pipe fds, or stdin/stdout as a fallback).
//!
//! ```text
//! +----------------+------------------+
//! | length (4 LE)  | rkyv payload     |
//! +----------------+------------------+
//! ```

use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::io::{BufReader, BufWriter, Read, Write};
use thiserror::Error;

/// Largest payload accepted on the wire (1 MB). Work items and results are a
/// few paths and an error string, so anything bigger is a corrupted stream.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Errors raised while encoding or decoding a frame
#[derive(Debug, Error)]
pub enum FrameError {
    /// Reading or writing the underlying stream failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// rkyv could not serialize the message
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The payload failed validation or deserialization
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// Length prefix above [`MAX_FRAME_SIZE`]
    #[error("Frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge {
        /// Announced or encoded size
        size: usize,
        /// Limit in force
        max: usize,
    },

    /// Length prefix of zero
    #[error("Empty frame")]
    EmptyFrame,

    /// The peer closed the stream between frames
    #[error("End of stream")]
    EndOfStream,
}

/// Serialize `message` and write it as one frame, flushing afterwards.
pub fn write_frame<W, T>(writer: &mut BufWriter<W>, message: &T) -> Result<(), FrameError>
where
    W: Write,
    T: Serialize<AllocSerializer<256>>,
{
    let bytes =
        rkyv::to_bytes::<_, 256>(message).map_err(|e| FrameError::Serialization(e.to_string()))?;

    if bytes.len() > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: bytes.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
    writer.write_all(&bytes)?;
    // A worker blocks on the reply, so every frame goes out immediately.
    writer.flush()?;

    Ok(())
}

/// Read one frame and deserialize it into `T`.
///
/// A clean EOF before the length prefix is reported as
/// [`FrameError::EndOfStream`] so callers can tell a closed peer apart from a
/// torn frame.
pub fn read_frame<R, T>(reader: &mut BufReader<R>) -> Result<T, FrameError>
where
    R: Read,
    T: Archive,
    T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::EndOfStream);
        }
        Err(e) => return Err(FrameError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    if len == 0 {
        return Err(FrameError::EmptyFrame);
    }

    let mut buf = rkyv::AlignedVec::with_capacity(len);
    buf.resize(len, 0);
    reader.read_exact(&mut buf)?;

    let archived =
        rkyv::check_archived_root::<T>(&buf).map_err(|e| FrameError::Malformed(e.to_string()))?;

    archived
        .deserialize(&mut Infallible)
        .map_err(|e| FrameError::Malformed(format!("{:?}", e)))
}

/// Buffered writer side of a framed channel
pub struct FrameWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> FrameWriter<W> {
    /// Wrap a raw writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(16 * 1024, writer),
        }
    }

    /// Send one message
    pub fn send<T>(&mut self, message: &T) -> Result<(), FrameError>
    where
        T: Serialize<AllocSerializer<256>>,
    {
        write_frame(&mut self.writer, message)
    }
}

/// Buffered reader side of a framed channel
pub struct FrameReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Wrap a raw reader
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(16 * 1024, reader),
        }
    }

    /// Receive one message
    pub fn recv<T>(&mut self) -> Result<T, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        read_frame(&mut self.reader)
    }

    /// Whether bytes are already sitting in the read buffer.
    ///
    /// The supervisor polls the raw fd for readiness, which says nothing about
    /// data that was pulled into this buffer by an earlier read.
    pub fn has_buffered_data(&self) -> bool {
        !self.reader.buffer().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SupervisorCommand, WorkItem, WorkResult, WorkerId, WorkerMessage};
    use std::io::Cursor;

    #[test]
    fn test_command_then_reply_share_one_stream() {
        let mut buffer = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buffer);
            writer
                .send(&SupervisorCommand::Apply(WorkItem::new(
                    "in/pie/1.jpg",
                    "out",
                )))
                .unwrap();
            writer
                .send(&WorkerMessage::Completed(WorkResult::success(
                    "pie_1.jpg",
                    WorkerId::Known(7),
                )))
                .unwrap();
        }

        let mut reader = FrameReader::new(Cursor::new(buffer));
        match reader.recv::<SupervisorCommand>().unwrap() {
            SupervisorCommand::Apply(item) => assert_eq!(item.source, "in/pie/1.jpg"),
            other => panic!("unexpected command {:?}", other),
        }
        match reader.recv::<WorkerMessage>().unwrap() {
            WorkerMessage::Completed(result) => {
                assert!(result.is_success());
                assert_eq!(result.worker, WorkerId::Known(7));
            }
            other => panic!("unexpected message {:?}", other),
        }
        assert!(matches!(
            reader.recv::<WorkerMessage>(),
            Err(FrameError::EndOfStream)
        ));
    }

    #[test]
    fn test_oversized_length_prefix_rejected() {
        let mut bytes = ((MAX_FRAME_SIZE + 1) as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 16]);
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let result: Result<WorkerMessage, _> = reader.recv();
        assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_zero_length_frame_rejected() {
        let mut reader = FrameReader::new(Cursor::new(0u32.to_le_bytes().to_vec()));
        let result: Result<WorkerMessage, _> = reader.recv();
        assert!(matches!(result, Err(FrameError::EmptyFrame)));
    }

    #[test]
    fn test_truncated_payload_is_io_error() {
        let mut bytes = 64u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[1u8; 10]);
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let result: Result<WorkerMessage, _> = reader.recv();
        assert!(matches!(result, Err(FrameError::Io(_))));
    }
}
