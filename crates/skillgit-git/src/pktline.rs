//! Git pkt-line format implementation.
//!
//! The pkt-line format is used for all git protocol communication.
//! Each line is prefixed with a 4-character hex length, or "0000" for flush.

use crate::{GitError, Result};
use std::io::{Read, Write};

/// A pkt-line packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Data line with content.
    Data(Vec<u8>),
    /// Flush packet (0000).
    Flush,
    /// Delimiter packet (0001).
    Delimiter,
    /// Response-end packet (0002).
    ResponseEnd,
}

impl PktLine {
    /// Largest payload a single data packet can carry.
    pub const MAX_DATA_LEN: usize = 65516;

    /// Encodes the packet to bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Data(data) => {
                let len = data.len() + 4; // 4 bytes for the length prefix
                let mut result = format!("{:04x}", len).into_bytes();
                result.extend_from_slice(data);
                result
            }
            Self::Flush => b"0000".to_vec(),
            Self::Delimiter => b"0001".to_vec(),
            Self::ResponseEnd => b"0002".to_vec(),
        }
    }

    /// Returns the data content, or None for special packets.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the data as a string, trimming any trailing newline.
    pub fn as_str(&self) -> Option<&str> {
        self.data()
            .and_then(|d| std::str::from_utf8(d).ok())
            .map(|s| s.trim_end_matches('\n'))
    }
}

/// Side-band channels of `side-band-64k`. Responses advertise
/// `no-progress`, so pack data is the only band written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Band {
    /// Pack data.
    PackData = 1,
}

impl Band {
    /// Payload bytes per packet once the band byte is accounted for.
    pub const MAX_CHUNK: usize = PktLine::MAX_DATA_LEN - 1;
}

/// Reader for pkt-line format.
pub struct PktLineReader<R> {
    reader: R,
}

impl<R: Read> PktLineReader<R> {
    /// Creates a new pkt-line reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the next packet.
    pub fn read(&mut self) -> Result<Option<PktLine>> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len_str = std::str::from_utf8(&len_buf)
            .map_err(|_| GitError::InvalidPktLine("invalid length prefix".to_string()))?;

        match len_str {
            "0000" => Ok(Some(PktLine::Flush)),
            "0001" => Ok(Some(PktLine::Delimiter)),
            "0002" => Ok(Some(PktLine::ResponseEnd)),
            _ => {
                let len = u16::from_str_radix(len_str, 16)
                    .map_err(|_| GitError::InvalidPktLine("invalid length".to_string()))?
                    as usize;

                if len < 4 {
                    return Err(GitError::InvalidPktLine("length too small".to_string()));
                }

                let mut data = vec![0u8; len - 4];
                self.reader.read_exact(&mut data)?;

                Ok(Some(PktLine::Data(data)))
            }
        }
    }
}

/// Writer for pkt-line format.
pub struct PktLineWriter<W> {
    writer: W,
}

impl<W: Write> PktLineWriter<W> {
    /// Creates a new pkt-line writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a packet.
    pub fn write(&mut self, pkt: &PktLine) -> Result<()> {
        if let PktLine::Data(data) = pkt {
            if data.len() > PktLine::MAX_DATA_LEN {
                return Err(GitError::InvalidPktLine(format!(
                    "payload of {} bytes exceeds {}",
                    data.len(),
                    PktLine::MAX_DATA_LEN
                )));
            }
        }
        self.writer.write_all(&pkt.encode())?;
        Ok(())
    }

    /// Writes a data line.
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        self.write(&PktLine::Data(data.to_vec()))
    }

    /// Writes a string line (with newline).
    pub fn write_line(&mut self, s: &str) -> Result<()> {
        let mut data = s.as_bytes().to_vec();
        if !s.ends_with('\n') {
            data.push(b'\n');
        }
        self.write(&PktLine::Data(data))
    }

    /// Writes a flush packet.
    pub fn flush_pkt(&mut self) -> Result<()> {
        self.write(&PktLine::Flush)
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Writes `data` on `band`, split into packets of at most
/// [`Band::MAX_CHUNK`] bytes each.
pub fn write_sideband<W: Write>(writer: &mut PktLineWriter<W>, band: Band, data: &[u8]) -> Result<()> {
    for chunk in data.chunks(Band::MAX_CHUNK) {
        let mut payload = Vec::with_capacity(chunk.len() + 1);
        payload.push(band as u8);
        payload.extend_from_slice(chunk);
        writer.write(&PktLine::Data(payload))?;
    }
    Ok(())
}
