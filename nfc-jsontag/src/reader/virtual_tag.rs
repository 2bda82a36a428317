//! Virtual NTAG reader
//!
//! An in-memory reader with at most one NTAG21x-style tag on its antenna.
//! Pages 0-3 hold the UID, lock bytes and capability container and are
//! read-only here; payload pages start at [`BASE_BLOCK`].

use log::{debug, info};
use parking_lot::Mutex;

use super::{hex_upper, CardDescriptor, ReaderError, TagReader};
use crate::codec::{BASE_BLOCK, BLOCK_SIZE};

/// A single memory page
pub type Page = [u8; BLOCK_SIZE];

/// Length of an NTAG21x UID
pub const UID_LEN: usize = 7;

/// Page counts of the NTAG21x family
pub const NTAG213_PAGES: usize = 45;
pub const NTAG215_PAGES: usize = 135;
pub const NTAG216_PAGES: usize = 231;

/// Configuration pages at the end of NTAG21x memory
const CONFIG_PAGES: usize = 5;

const DEFAULT_UID: [u8; UID_LEN] = [0x04, 0xA2, 0x3C, 0x5A, 0x71, 0x6E, 0x80];

/// In-memory tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualTag {
    uid: [u8; UID_LEN],
    pages: Vec<Page>,
}

impl VirtualTag {
    /// Create a blank tag with the given UID and page count
    ///
    /// `page_count` is clamped to the range a one-byte page address can reach.
    pub fn new(uid: [u8; UID_LEN], page_count: usize) -> Self {
        let page_count = page_count.clamp(BASE_BLOCK as usize, 256);
        let mut pages = vec![[0u8; BLOCK_SIZE]; page_count];

        // Cascade tag + BCC layout of ISO 14443-3 double-size UIDs
        let bcc0 = 0x88 ^ uid[0] ^ uid[1] ^ uid[2];
        let bcc1 = uid[3] ^ uid[4] ^ uid[5] ^ uid[6];
        pages[0] = [uid[0], uid[1], uid[2], bcc0];
        pages[1] = [uid[3], uid[4], uid[5], uid[6]];
        pages[2] = [bcc1, 0x48, 0x00, 0x00];

        // NDEF capability container: magic, version, data area size / 8, access
        let user_bytes = page_count.saturating_sub(BASE_BLOCK as usize + CONFIG_PAGES) * BLOCK_SIZE;
        pages[3] = [0xE1, 0x10, (user_bytes / 8).min(0xFF) as u8, 0x00];

        Self { uid, pages }
    }

    /// Create a blank tag with the default UID
    pub fn blank(page_count: usize) -> Self {
        Self::new(DEFAULT_UID, page_count)
    }

    /// Rebuild a tag from a saved memory image
    ///
    /// Returns None if the image is not a whole number of pages or does not
    /// cover the reserved pages.
    pub fn from_image(uid: &[u8], memory: &[u8]) -> Option<Self> {
        let uid: [u8; UID_LEN] = uid.try_into().ok()?;
        if memory.len() % BLOCK_SIZE != 0 {
            return None;
        }
        let page_count = memory.len() / BLOCK_SIZE;
        if page_count < BASE_BLOCK as usize || page_count > 256 {
            return None;
        }

        let pages = memory
            .chunks_exact(BLOCK_SIZE)
            .map(|chunk| {
                let mut page = [0u8; BLOCK_SIZE];
                page.copy_from_slice(chunk);
                page
            })
            .collect();
        Some(Self { uid, pages })
    }

    pub fn uid(&self) -> &[u8; UID_LEN] {
        &self.uid
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Flattened memory image, page 0 first
    pub fn memory(&self) -> Vec<u8> {
        self.pages.iter().flatten().copied().collect()
    }

    /// What a reader reports when this tag enters the field
    pub fn descriptor(&self) -> CardDescriptor {
        CardDescriptor {
            uid: hex_upper(&self.uid),
            atr: None,
            standard: Some("TAG_ISO_14443_3".to_string()),
        }
    }

    /// Read `len` bytes starting at `block`
    pub fn read(&self, block: u8, len: usize) -> Result<Vec<u8>, ReaderError> {
        let start = block as usize * BLOCK_SIZE;
        let end = start
            .checked_add(len)
            .ok_or(ReaderError::OutOfRange { block })?;
        if block as usize >= self.pages.len() || end > self.pages.len() * BLOCK_SIZE {
            return Err(ReaderError::OutOfRange { block });
        }
        let memory = self.memory();
        Ok(memory[start..end].to_vec())
    }

    /// Write one page
    pub fn write(&mut self, block: u8, data: &Page) -> Result<(), ReaderError> {
        if block < BASE_BLOCK {
            return Err(ReaderError::ReadOnly { block });
        }
        let page = self
            .pages
            .get_mut(block as usize)
            .ok_or(ReaderError::OutOfRange { block })?;
        *page = *data;
        Ok(())
    }
}

/// Injected failures for exercising error paths
#[derive(Debug, Default)]
struct FaultPlan {
    read_fault_at: Option<u8>,
    write_fault_at: Option<u8>,
}

/// Reader with an optional virtual tag in its field
pub struct VirtualReader {
    name: String,
    tag: Mutex<Option<VirtualTag>>,
    faults: Mutex<FaultPlan>,
}

impl VirtualReader {
    /// Create a reader with an empty field
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: Mutex::new(None),
            faults: Mutex::new(FaultPlan::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Put a tag on the antenna, replacing any tag already there
    pub fn place_tag(&self, tag: VirtualTag) -> CardDescriptor {
        let descriptor = tag.descriptor();
        info!("[{}] Tag {} placed", self.name, descriptor.uid);
        *self.tag.lock() = Some(tag);
        descriptor
    }

    /// Take the tag off the antenna
    pub fn remove_tag(&self) -> Option<VirtualTag> {
        let tag = self.tag.lock().take();
        if let Some(ref t) = tag {
            info!("[{}] Tag {} removed", self.name, hex_upper(t.uid()));
        }
        tag
    }

    pub fn has_tag(&self) -> bool {
        self.tag.lock().is_some()
    }

    /// Run `f` against the tag in the field, if any
    pub fn with_tag<R>(&self, f: impl FnOnce(&VirtualTag) -> R) -> Option<R> {
        self.tag.lock().as_ref().map(f)
    }

    /// Make reads of `block` fail with a medium error
    pub fn fail_reads_at(&self, block: Option<u8>) {
        self.faults.lock().read_fault_at = block;
    }

    /// Make writes of `block` fail with a medium error
    pub fn fail_writes_at(&self, block: Option<u8>) {
        self.faults.lock().write_fault_at = block;
    }
}

impl TagReader for VirtualReader {
    fn write_block(&self, block: u8, data: &[u8; BLOCK_SIZE]) -> Result<(), ReaderError> {
        if self.faults.lock().write_fault_at == Some(block) {
            return Err(ReaderError::Medium(format!("write NAK at page {}", block)));
        }
        let mut guard = self.tag.lock();
        let tag = guard.as_mut().ok_or(ReaderError::NoCard)?;
        tag.write(block, data)?;
        debug!("[{}] WRITE page {}: {:02X?}", self.name, block, data);
        Ok(())
    }

    fn read_block(&self, block: u8, len: usize) -> Result<Vec<u8>, ReaderError> {
        if self.faults.lock().read_fault_at == Some(block) {
            return Err(ReaderError::Medium(format!("read NAK at page {}", block)));
        }
        let guard = self.tag.lock();
        let tag = guard.as_ref().ok_or(ReaderError::NoCard)?;
        let data = tag.read(block, len)?;
        debug!("[{}] READ page {}: {:02X?}", self.name, block, data);
        Ok(data)
    }
}
