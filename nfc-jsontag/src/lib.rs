//! JSON payload storage on NFC tags
//!
//! Stores one small JSON object in the user memory of an NTAG21x-style tag
//! reached through a single attached reader.
//!
//! The tag is treated as a run of 4-byte blocks starting at block 4:
//! - writes serialize the object, pad it with zero bytes and write it
//!   block by block
//! - reads walk the blocks until one is not completely filled, then parse
//!   what was collected
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use nfc_jsontag::reader::{VirtualReader, VirtualTag};
//! use nfc_jsontag::session::SessionRegistry;
//! use nfc_jsontag::transfer::{read_payload, write_payload};
//!
//! let registry = SessionRegistry::new();
//! let reader = Arc::new(VirtualReader::new("acr122u"));
//! registry.on_attach("acr122u", reader.clone());
//! registry.on_card_present(reader.place_tag(VirtualTag::blank(135)));
//!
//! write_payload(&registry, &serde_json::json!({"a": 1}))?;
//! let outcome = read_payload(&registry, &Default::default())?;
//! ```

pub mod codec;
pub mod config;
pub mod reader;
pub mod session;
pub mod transfer;

pub use codec::{DecodeOptions, FaultPolicy, BASE_BLOCK, BLOCK_SIZE, MAX_PAYLOAD_LEN};
pub use config::GatewayConfig;
pub use reader::{CardDescriptor, ReaderError, ReaderEvent, TagReader};
pub use session::{ReaderHandle, SessionRegistry};
pub use transfer::{read_payload, write_payload, ReadError, ReadOutcome, WriteError, WriteOutcome};
