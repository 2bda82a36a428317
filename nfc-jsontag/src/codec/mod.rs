//! Tag codec: JSON payload <-> fixed-size memory blocks
//!
//! A payload is serialized to compact JSON, right-padded with zero bytes to a
//! multiple of [`BLOCK_SIZE`], and laid out in consecutive blocks starting at
//! [`BASE_BLOCK`]. Reading walks the blocks from the base index, drops the
//! zero bytes and stops at the first block that was not completely filled.
//!
//! # Example
//! ```ignore
//! use nfc_jsontag::codec::{encode, BASE_BLOCK};
//!
//! let blocks = encode(&serde_json::json!({"a": 1})).unwrap();
//! assert_eq!(blocks.len(), 2);
//! assert_eq!(blocks[0].index, BASE_BLOCK);
//! ```

mod decoder;
mod encoder;

pub use decoder::{decode_blocks, BlockStep, DecodeOptions, Decoded, FaultPolicy, TagDecoder};
pub use encoder::{encode, encode_bytes, padded_len, serialize};

use thiserror::Error;

use crate::reader::ReaderError;

/// Size of one tag memory block (an NTAG page) in bytes
pub const BLOCK_SIZE: usize = 4;

/// First block used for payload data; lower blocks hold UID, lock and
/// capability-container bytes
pub const BASE_BLOCK: u8 = 4;

/// Largest accepted serialized payload, before padding
pub const MAX_PAYLOAD_LEN: usize = 180;

/// One block of encoded payload, addressed by its tag page index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Page index on the tag
    pub index: u8,
    /// Raw block content
    pub data: [u8; BLOCK_SIZE],
}

/// Errors produced while encoding a payload
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("payload is {len} bytes, maximum is {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("payload must be a JSON object")]
    NotAnObject,
}

/// Errors produced while reconstructing a payload from tag blocks
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("reading block {block} failed: {source}")]
    Fault {
        block: u8,
        #[source]
        source: ReaderError,
    },

    #[error("tag content is not a JSON object: {0:?}")]
    MalformedFraming(String),

    #[error("tag content is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
