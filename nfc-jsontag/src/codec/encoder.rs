//! Payload encoder
//!
//! Turns a JSON object into the block sequence written to the tag.

use log::debug;
use serde_json::Value;

use super::{Block, EncodeError, BASE_BLOCK, BLOCK_SIZE, MAX_PAYLOAD_LEN};

/// Encode a JSON object into blocks starting at [`BASE_BLOCK`]
///
/// The size limit is checked on the compact serialization before padding.
pub fn encode(payload: &Value) -> Result<Vec<Block>, EncodeError> {
    encode_bytes(serialize(payload)?.as_bytes())
}

/// Compact serialization of a JSON object, the form stored on the tag
pub fn serialize(payload: &Value) -> Result<String, EncodeError> {
    if !payload.is_object() {
        return Err(EncodeError::NotAnObject);
    }
    Ok(payload.to_string())
}

/// Frame already-serialized bytes into zero-padded blocks
pub fn encode_bytes(bytes: &[u8]) -> Result<Vec<Block>, EncodeError> {
    if bytes.len() > MAX_PAYLOAD_LEN {
        return Err(EncodeError::PayloadTooLarge {
            len: bytes.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut buffer = vec![0u8; padded_len(bytes.len())];
    buffer[..bytes.len()].copy_from_slice(bytes);

    let blocks: Vec<Block> = buffer
        .chunks_exact(BLOCK_SIZE)
        .zip(BASE_BLOCK..)
        .map(|(chunk, index)| {
            let mut data = [0u8; BLOCK_SIZE];
            data.copy_from_slice(chunk);
            Block { index, data }
        })
        .collect();

    debug!(
        "Encoded {} payload bytes into {} blocks ({} padding)",
        bytes.len(),
        blocks.len(),
        buffer.len() - bytes.len()
    );
    Ok(blocks)
}

/// Smallest multiple of [`BLOCK_SIZE`] that holds `len` bytes
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}
