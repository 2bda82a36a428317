//! Reader capability and hardware events
//!
//! The core only needs two primitives from a reader driver: write one block,
//! read a run of bytes starting at a block. Attach/detach and card presence
//! arrive as [`ReaderEvent`]s on a channel.

pub mod image;
pub mod virtual_tag;

pub use image::TagImageStore;
pub use virtual_tag::{VirtualReader, VirtualTag};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::BLOCK_SIZE;

/// Errors reported by a reader for a single block operation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReaderError {
    #[error("reader detached")]
    Detached,

    #[error("no tag on the reader")]
    NoCard,

    #[error("block {block} is outside tag memory")]
    OutOfRange { block: u8 },

    #[error("block {block} is read-only")]
    ReadOnly { block: u8 },

    #[error("medium error: {0}")]
    Medium(String),
}

/// Block-level access to the tag currently on a reader
pub trait TagReader: Send + Sync {
    /// Write one block at `block`
    fn write_block(&self, block: u8, data: &[u8; BLOCK_SIZE]) -> Result<(), ReaderError>;

    /// Read `len` bytes starting at `block`
    fn read_block(&self, block: u8, len: usize) -> Result<Vec<u8>, ReaderError>;
}

/// What the reader saw when a tag entered the field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDescriptor {
    /// Tag UID as uppercase hex
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atr: Option<String>,
    /// Tag standard, e.g. "TAG_ISO_14443_3"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<String>,
}

/// Notifications published by a reader driver
#[derive(Clone)]
pub enum ReaderEvent {
    Attached {
        device_id: String,
        reader: Arc<dyn TagReader>,
    },
    Detached,
    CardPresent(CardDescriptor),
    CardAbsent,
    Error(String),
}

impl fmt::Debug for ReaderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attached { device_id, .. } => {
                f.debug_struct("Attached").field("device_id", device_id).finish_non_exhaustive()
            }
            Self::Detached => f.write_str("Detached"),
            Self::CardPresent(card) => f.debug_tuple("CardPresent").field(card).finish(),
            Self::CardAbsent => f.write_str("CardAbsent"),
            Self::Error(cause) => f.debug_tuple("Error").field(cause).finish(),
        }
    }
}

/// Format bytes as uppercase hex without separators
pub fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}
