//! Virtual tag image storage
//!
//! Keeps the memory of the virtual tag on disk as JSON so its content
//! survives a gateway restart.

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::virtual_tag::VirtualTag;

/// Environment variable naming the directory for the tag image
const STORAGE_ENV: &str = "JSONTAG_STORAGE_DIR";

const IMAGE_FILE: &str = "tag_image.json";

/// On-disk form of a tag, both fields base64 text
#[derive(Debug, Serialize, Deserialize)]
struct TagImage {
    uid: String,
    memory: String,
}

impl TagImage {
    fn capture(tag: &VirtualTag) -> Self {
        Self {
            uid: STANDARD.encode(tag.uid()),
            memory: STANDARD.encode(tag.memory()),
        }
    }

    /// Rebuild the tag, or explain why the image is unusable
    fn restore(&self) -> Result<VirtualTag, String> {
        let uid = STANDARD.decode(&self.uid).map_err(|e| format!("uid: {}", e))?;
        let memory = STANDARD
            .decode(&self.memory)
            .map_err(|e| format!("memory: {}", e))?;
        VirtualTag::from_image(&uid, &memory).ok_or_else(|| {
            format!(
                "unusable layout (uid {} bytes, memory {} bytes)",
                uid.len(),
                memory.len()
            )
        })
    }
}

/// `$JSONTAG_STORAGE_DIR`, else `~/.jsontag`, else `/var/lib/jsontag`
fn default_dir() -> PathBuf {
    std::env::var_os(STORAGE_ENV)
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".jsontag")))
        .unwrap_or_else(|| PathBuf::from("/var/lib/jsontag"))
}

/// Saves and restores the virtual tag's memory
pub struct TagImageStore {
    storage_dir: PathBuf,
    image_file: PathBuf,
}

impl TagImageStore {
    /// Create a store rooted at `storage_path`, or the default directory
    pub fn new(storage_path: Option<PathBuf>) -> Self {
        let storage_dir = storage_path.unwrap_or_else(default_dir);
        let image_file = storage_dir.join(IMAGE_FILE);
        Self {
            storage_dir,
            image_file,
        }
    }

    pub fn path(&self) -> &Path {
        &self.image_file
    }

    /// Load the saved tag
    ///
    /// Returns None when there is no image or it cannot be used.
    pub fn load(&self) -> Option<VirtualTag> {
        if !self.image_file.exists() {
            info!("No saved tag image at {:?}", self.image_file);
            return None;
        }

        let content = match fs::read_to_string(&self.image_file) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read tag image: {}", e);
                return None;
            }
        };

        let image: TagImage = match serde_json::from_str(&content) {
            Ok(image) => image,
            Err(e) => {
                warn!("Failed to parse tag image: {}", e);
                return None;
            }
        };

        match image.restore() {
            Ok(tag) => {
                info!("Loaded tag image from {:?} ({} pages)", self.image_file, tag.page_count());
                Some(tag)
            }
            Err(reason) => {
                warn!("Ignoring tag image {:?}: {}", self.image_file, reason);
                None
            }
        }
    }

    /// Save `tag`, returning whether the image was written
    pub fn save(&self, tag: &VirtualTag) -> bool {
        if let Err(e) = fs::create_dir_all(&self.storage_dir) {
            warn!("Failed to create storage directory: {}", e);
            return false;
        }

        match serde_json::to_string_pretty(&TagImage::capture(tag)) {
            Ok(json) => match fs::write(&self.image_file, json) {
                Ok(()) => {
                    debug!("Saved tag image to {:?}", self.image_file);
                    true
                }
                Err(e) => {
                    warn!("Failed to write tag image: {}", e);
                    false
                }
            },
            Err(e) => {
                warn!("Failed to serialize tag image: {}", e);
                false
            }
        }
    }
}
