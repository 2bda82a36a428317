//! Tag read/write operations
//!
//! Each operation takes the registry's current reader, then issues its
//! block operations one at a time. There are no retries and no rollback:
//! a write that fails part way leaves the earlier blocks on the tag.

mod read;
mod write;

pub use read::read_payload;
pub use write::write_payload;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::codec::{DecodeError, EncodeError};
use crate::reader::ReaderError;

/// Successful write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub blocks_written: usize,
    /// Serialized payload length before padding
    pub bytes: usize,
}

/// Successful read
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadOutcome {
    pub payload: Value,
    pub blocks_read: usize,
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("no reader available")]
    NoReaderAvailable,

    #[error("payload is {len} bytes, maximum is {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("payload must be a JSON object")]
    NotAnObject,

    #[error("writing block {block} failed: {source}")]
    WriteFailed {
        block: u8,
        #[source]
        source: ReaderError,
    },
}

impl From<EncodeError> for WriteError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::PayloadTooLarge { len, max } => Self::PayloadTooLarge { len, max },
            EncodeError::NotAnObject => Self::NotAnObject,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("no reader available")]
    NoReaderAvailable,

    #[error("no card on the reader")]
    NoCardPresent,

    #[error("reading block {block} failed: {source}")]
    ReadFailed {
        block: u8,
        #[source]
        source: ReaderError,
    },

    #[error("tag content is not a JSON object: {0:?}")]
    MalformedFraming(String),

    #[error("tag content is not valid JSON: {0}")]
    ParseError(#[source] serde_json::Error),
}

impl From<DecodeError> for ReadError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Fault { block, source } => Self::ReadFailed { block, source },
            DecodeError::MalformedFraming(text) => Self::MalformedFraming(text),
            DecodeError::Parse(e) => Self::ParseError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::codec::{DecodeOptions, FaultPolicy, MAX_PAYLOAD_LEN};
    use crate::reader::virtual_tag::{NTAG213_PAGES, NTAG215_PAGES};
    use crate::reader::{TagReader, VirtualReader, VirtualTag};
    use crate::session::SessionRegistry;

    /// Registry with an attached virtual reader holding a blank tag
    fn setup(pages: usize) -> (SessionRegistry, Arc<VirtualReader>) {
        let registry = SessionRegistry::new();
        let reader = Arc::new(VirtualReader::new("acr122u"));
        registry.on_attach("acr122u", reader.clone());
        let card = reader.place_tag(VirtualTag::blank(pages));
        registry.on_card_present(card);
        (registry, reader)
    }

    fn object_of_len(len: usize) -> Value {
        json!({ "v": "x".repeat(len - 8) })
    }

    #[test]
    fn test_write_then_read() {
        let (registry, reader) = setup(NTAG215_PAGES);
        let payload = json!({"a": 1});

        let outcome = write_payload(&registry, &payload).unwrap();
        assert_eq!(outcome, WriteOutcome { blocks_written: 2, bytes: 7 });
        assert_eq!(reader.read_block(4, 8).unwrap(), b"{\"a\":1}\0".to_vec());

        let read = read_payload(&registry, &DecodeOptions::default()).unwrap();
        assert_eq!(read.payload, payload);
        assert_eq!(read.blocks_read, 2);
    }

    #[test]
    fn test_max_payload_round_trip() {
        let (registry, _reader) = setup(NTAG215_PAGES);
        let payload = object_of_len(MAX_PAYLOAD_LEN);

        let outcome = write_payload(&registry, &payload).unwrap();
        assert_eq!(outcome.blocks_written, 45);

        let read = read_payload(&registry, &DecodeOptions::default()).unwrap();
        assert_eq!(read.payload, payload);
    }

    #[test]
    fn test_no_reader() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            write_payload(&registry, &json!({"a": 1})),
            Err(WriteError::NoReaderAvailable)
        ));
        assert!(matches!(
            read_payload(&registry, &DecodeOptions::default()),
            Err(ReadError::NoReaderAvailable)
        ));
    }

    #[test]
    fn test_no_reader_checked_before_size() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            write_payload(&registry, &object_of_len(MAX_PAYLOAD_LEN + 1)),
            Err(WriteError::NoReaderAvailable)
        ));
    }

    #[test]
    fn test_read_without_card() {
        let (registry, _reader) = setup(NTAG215_PAGES);
        registry.on_card_absent();
        assert!(matches!(
            read_payload(&registry, &DecodeOptions::default()),
            Err(ReadError::NoCardPresent)
        ));
    }

    #[test]
    fn test_oversize_rejected_before_any_write() {
        let (registry, reader) = setup(NTAG215_PAGES);
        let before = reader.with_tag(|t| t.memory()).unwrap();

        let result = write_payload(&registry, &object_of_len(MAX_PAYLOAD_LEN + 1));
        assert!(matches!(
            result,
            Err(WriteError::PayloadTooLarge { len: 181, max: 180 })
        ));
        assert_eq!(reader.with_tag(|t| t.memory()).unwrap(), before);
    }

    #[test]
    fn test_non_object_rejected() {
        let (registry, _reader) = setup(NTAG215_PAGES);
        assert!(matches!(
            write_payload(&registry, &json!([1, 2])),
            Err(WriteError::NotAnObject)
        ));
    }

    #[test]
    fn test_partial_write_not_rolled_back() {
        let (registry, reader) = setup(NTAG215_PAGES);
        reader.fail_writes_at(Some(6));

        let result = write_payload(&registry, &object_of_len(20));
        assert!(matches!(
            result,
            Err(WriteError::WriteFailed { block: 6, source: ReaderError::Medium(_) })
        ));
        // Blocks 4 and 5 stay written, nothing after the failure is touched
        assert_eq!(reader.read_block(4, 4).unwrap(), b"{\"v\"".to_vec());
        assert_eq!(reader.read_block(7, 4).unwrap(), vec![0; 4]);
    }

    #[test]
    fn test_write_past_end_of_small_tag() {
        // NTAG213 has pages 0..=44, a 180 byte payload needs pages 4..=48
        let (registry, _reader) = setup(NTAG213_PAGES);
        let result = write_payload(&registry, &object_of_len(MAX_PAYLOAD_LEN));
        assert!(matches!(
            result,
            Err(WriteError::WriteFailed { block: 45, source: ReaderError::OutOfRange { block: 45 } })
        ));
    }

    #[test]
    fn test_write_without_card_fails_per_block() {
        // Card presence is not checked before writing
        let (registry, reader) = setup(NTAG215_PAGES);
        reader.remove_tag();
        registry.on_card_absent();
        assert!(matches!(
            write_payload(&registry, &json!({"a": 1})),
            Err(WriteError::WriteFailed { block: 4, source: ReaderError::NoCard })
        ));
    }

    #[test]
    fn test_read_fault_terminates_or_aborts() {
        let (registry, reader) = setup(NTAG215_PAGES);
        write_payload(&registry, &json!({"ab":1})).unwrap();
        reader.fail_reads_at(Some(6));

        let read = read_payload(&registry, &DecodeOptions::default()).unwrap();
        assert_eq!(read.payload, json!({"ab": 1}));

        let abort = DecodeOptions {
            fault_policy: FaultPolicy::Abort,
            max_blocks: None,
        };
        assert!(matches!(
            read_payload(&registry, &abort),
            Err(ReadError::ReadFailed { block: 6, .. })
        ));
    }

    #[test]
    fn test_read_blank_tag_is_malformed() {
        let (registry, _reader) = setup(NTAG215_PAGES);
        assert!(matches!(
            read_payload(&registry, &DecodeOptions::default()),
            Err(ReadError::MalformedFraming(ref s)) if s.is_empty()
        ));
    }

    #[test]
    fn test_read_garbage_tag() {
        let (registry, reader) = setup(NTAG215_PAGES);
        reader.write_block(4, b"{bad").unwrap();
        reader.write_block(5, &[b'}', 0, 0, 0]).unwrap();
        assert!(matches!(
            read_payload(&registry, &DecodeOptions::default()),
            Err(ReadError::ParseError(_))
        ));
    }

    #[test]
    fn test_shorter_payload_over_longer_one() {
        // Padding of the new payload terminates the read before the old tail
        let (registry, _reader) = setup(NTAG215_PAGES);
        write_payload(&registry, &object_of_len(100)).unwrap();
        write_payload(&registry, &json!({"a": 1})).unwrap();

        let read = read_payload(&registry, &DecodeOptions::default()).unwrap();
        assert_eq!(read.payload, json!({"a": 1}));
    }

    #[test]
    fn test_detach_mid_read_fails() {
        /// Reader that reports a detach through the registry after one read
        struct Unplugging {
            inner: VirtualReader,
            registry: Arc<SessionRegistry>,
        }

        impl TagReader for Unplugging {
            fn write_block(&self, block: u8, data: &[u8; 4]) -> Result<(), ReaderError> {
                self.inner.write_block(block, data)
            }

            fn read_block(&self, block: u8, len: usize) -> Result<Vec<u8>, ReaderError> {
                let data = self.inner.read_block(block, len);
                self.registry.on_detach();
                data
            }
        }

        let registry = Arc::new(SessionRegistry::new());
        let inner = VirtualReader::new("acr122u");
        let mut tag = VirtualTag::blank(NTAG215_PAGES);
        tag.write(4, b"{\"ab").unwrap();
        tag.write(5, b"\":1}").unwrap();
        let card = inner.place_tag(tag);

        registry.on_attach(
            "acr122u",
            Arc::new(Unplugging {
                inner,
                registry: registry.clone(),
            }),
        );
        registry.on_card_present(card);

        assert!(matches!(
            read_payload(&registry, &DecodeOptions::default()),
            Err(ReadError::ReadFailed { block: 5, source: ReaderError::Detached })
        ));
    }

    #[test]
    fn test_detach_mid_write_fails() {
        /// Reader that reports a detach through the registry after one write
        struct UnplugOnWrite {
            inner: Arc<VirtualReader>,
            registry: Arc<SessionRegistry>,
        }

        impl TagReader for UnplugOnWrite {
            fn write_block(&self, block: u8, data: &[u8; 4]) -> Result<(), ReaderError> {
                let result = self.inner.write_block(block, data);
                self.registry.on_detach();
                result
            }

            fn read_block(&self, block: u8, len: usize) -> Result<Vec<u8>, ReaderError> {
                self.inner.read_block(block, len)
            }
        }

        let registry = Arc::new(SessionRegistry::new());
        let inner = Arc::new(VirtualReader::new("acr122u"));
        let card = inner.place_tag(VirtualTag::blank(NTAG215_PAGES));
        registry.on_attach(
            "acr122u",
            Arc::new(UnplugOnWrite {
                inner: inner.clone(),
                registry: registry.clone(),
            }),
        );
        registry.on_card_present(card);

        assert!(matches!(
            write_payload(&registry, &json!({"abc": "defgh"})),
            Err(WriteError::WriteFailed { block: 5, source: ReaderError::Detached })
        ));
        // Block 4 went out before the detach and is not rolled back
        assert_eq!(inner.read_block(4, 4).unwrap(), b"{\"ab".to_vec());
        assert_eq!(inner.read_block(5, 4).unwrap(), vec![0; 4]);
    }
}
