//! Payload decoder
//!
//! Rebuilds a JSON object from block reads. The tag carries no length
//! field, so the end of data is inferred: a block that holds fewer than
//! [`BLOCK_SIZE`] non-zero bytes is the last one. A failing read is also
//! taken as the end of data unless [`FaultPolicy::Abort`] is selected.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DecodeError, BASE_BLOCK, BLOCK_SIZE};
use crate::reader::ReaderError;

/// What a failing block read means to the decode loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// Treat the fault as the end of the tag's data
    #[default]
    Terminate,
    /// Fail the read with the fault
    Abort,
}

/// Decode loop settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    pub fault_policy: FaultPolicy,
    /// Stop after this many blocks even if the last one was full
    pub max_blocks: Option<usize>,
}

/// Result of feeding one block read into the decoder
#[derive(Debug)]
pub enum BlockStep {
    /// Block was full; its bytes were kept and the next block should be read
    Continue(Vec<u8>),
    /// No further block should be read
    EndOfData,
    /// The read failed
    Fault(ReaderError),
}

/// A payload read back from the tag
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub payload: Value,
    pub blocks_read: usize,
}

/// Incremental decoder state
#[derive(Debug)]
pub struct TagDecoder {
    buffer: Vec<u8>,
    next_block: Option<u8>,
    blocks_read: usize,
}

impl Default for TagDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TagDecoder {
    /// Create a decoder positioned at [`BASE_BLOCK`]
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            next_block: Some(BASE_BLOCK),
            blocks_read: 0,
        }
    }

    /// Index of the block to read next, or None once the loop has ended
    pub fn next_block(&self) -> Option<u8> {
        self.next_block
    }

    /// Number of blocks successfully read so far
    pub fn blocks_read(&self) -> usize {
        self.blocks_read
    }

    /// Feed the outcome of reading [`Self::next_block`]
    pub fn feed(&mut self, read: Result<Vec<u8>, ReaderError>) -> BlockStep {
        let Some(index) = self.next_block else {
            return BlockStep::EndOfData;
        };

        let raw = match read {
            Ok(raw) => raw,
            Err(e) => {
                self.next_block = None;
                return BlockStep::Fault(e);
            }
        };

        self.blocks_read += 1;
        let stripped: Vec<u8> = raw.into_iter().filter(|&b| b != 0).collect();
        self.buffer.extend_from_slice(&stripped);

        if stripped.len() < BLOCK_SIZE {
            debug!("Block {} holds {} data bytes, end of data", index, stripped.len());
            self.next_block = None;
            return BlockStep::EndOfData;
        }

        self.next_block = index.checked_add(1);
        match self.next_block {
            Some(_) => BlockStep::Continue(stripped),
            None => BlockStep::EndOfData,
        }
    }

    /// Turn the accumulated bytes into a JSON value
    pub fn finish(self) -> Result<Decoded, DecodeError> {
        let text = String::from_utf8_lossy(&self.buffer).replace('\0', "");
        let text = text.trim();

        if !(text.starts_with('{') && text.ends_with('}')) {
            return Err(DecodeError::MalformedFraming(text.to_string()));
        }

        let payload = serde_json::from_str(text)?;
        Ok(Decoded {
            payload,
            blocks_read: self.blocks_read,
        })
    }
}

/// Run the decode loop, calling `read_block` with each block index in turn
///
/// A `Detached` fault always fails the decode: the reader went away under
/// the read and the bytes gathered so far are not a complete payload.
pub fn decode_blocks<F>(options: &DecodeOptions, mut read_block: F) -> Result<Decoded, DecodeError>
where
    F: FnMut(u8) -> Result<Vec<u8>, ReaderError>,
{
    let mut decoder = TagDecoder::new();

    while let Some(index) = decoder.next_block() {
        if let Some(max) = options.max_blocks {
            if decoder.blocks_read() >= max {
                debug!("Block limit {} reached", max);
                break;
            }
        }

        match decoder.feed(read_block(index)) {
            BlockStep::Continue(_) | BlockStep::EndOfData => {}
            BlockStep::Fault(source) => {
                let abort = options.fault_policy == FaultPolicy::Abort
                    || matches!(source, ReaderError::Detached);
                if abort {
                    warn!("Read of block {} failed: {}", index, source);
                    return Err(DecodeError::Fault { block: index, source });
                }
                debug!("Read of block {} failed ({}), treating as end of data", index, source);
            }
        }
    }

    decoder.finish()
}
