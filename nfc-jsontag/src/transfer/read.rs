use log::info;

use super::{ReadError, ReadOutcome};
use crate::codec::{self, DecodeOptions, BLOCK_SIZE};
use crate::reader::TagReader;
use crate::session::SessionRegistry;

/// Read the JSON payload from the tag on the current reader
pub fn read_payload(registry: &SessionRegistry, options: &DecodeOptions) -> Result<ReadOutcome, ReadError> {
    let (reader, has_card) = registry
        .current_reader_with_card()
        .ok_or(ReadError::NoReaderAvailable)?;
    if !has_card {
        return Err(ReadError::NoCardPresent);
    }

    let decoded = codec::decode_blocks(options, |block| reader.read_block(block, BLOCK_SIZE))?;
    info!(
        "Read payload from {} ({} blocks)",
        reader.device_id(),
        decoded.blocks_read
    );

    Ok(ReadOutcome {
        payload: decoded.payload,
        blocks_read: decoded.blocks_read,
    })
}
