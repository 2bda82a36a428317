use log::{debug, info, warn};
use serde_json::Value;

use super::{WriteError, WriteOutcome};
use crate::codec;
use crate::reader::TagReader;
use crate::session::SessionRegistry;

/// Write `payload` to the tag on the current reader
///
/// The payload is fully encoded and size-checked before the first block is
/// written. Blocks go out in increasing index order, one at a time; the
/// first failing block ends the operation.
pub fn write_payload(registry: &SessionRegistry, payload: &Value) -> Result<WriteOutcome, WriteError> {
    let reader = registry.current_reader().ok_or(WriteError::NoReaderAvailable)?;
    let text = codec::serialize(payload)?;
    let blocks = codec::encode_bytes(text.as_bytes())?;
    let bytes = text.len();

    info!(
        "Writing {} bytes as {} blocks to {}",
        bytes,
        blocks.len(),
        reader.device_id()
    );

    for block in &blocks {
        debug!("WRITE block {}: {:02X?}", block.index, block.data);
        reader.write_block(block.index, &block.data).map_err(|source| {
            warn!("Write of block {} failed: {}", block.index, source);
            WriteError::WriteFailed {
                block: block.index,
                source,
            }
        })?;
    }

    Ok(WriteOutcome {
        blocks_written: blocks.len(),
        bytes,
    })
}
