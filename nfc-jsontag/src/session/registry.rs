//! Session registry
//!
//! Holds the one reader session the process may have and applies reader
//! events to it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;

use crate::codec::BLOCK_SIZE;
use crate::reader::{CardDescriptor, ReaderError, ReaderEvent, TagReader};

/// Registry state as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryState {
    NoReader,
    CardAbsent,
    CardPresent,
}

/// Snapshot of the registry for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: RegistryState,
    pub reader_attached: bool,
    pub device_id: Option<String>,
    pub card: Option<CardDescriptor>,
}

/// The attached reader
struct Session {
    device_id: String,
    reader: Arc<dyn TagReader>,
    card: Option<CardDescriptor>,
    /// Shared with every handle given out for this session
    live: Arc<AtomicBool>,
}

impl Session {
    fn retire(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn handle(&self) -> ReaderHandle {
        ReaderHandle {
            device_id: self.device_id.clone(),
            reader: Arc::clone(&self.reader),
            live: Arc::clone(&self.live),
        }
    }
}

/// Reader handle bound to the session it was taken from
///
/// Once that session is detached or replaced, every block operation through
/// the handle fails with [`ReaderError::Detached`].
#[derive(Clone)]
pub struct ReaderHandle {
    device_id: String,
    reader: Arc<dyn TagReader>,
    live: Arc<AtomicBool>,
}

impl ReaderHandle {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Whether the session behind this handle is still attached
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn check_live(&self) -> Result<(), ReaderError> {
        if self.is_live() {
            Ok(())
        } else {
            Err(ReaderError::Detached)
        }
    }
}

impl TagReader for ReaderHandle {
    fn write_block(&self, block: u8, data: &[u8; BLOCK_SIZE]) -> Result<(), ReaderError> {
        self.check_live()?;
        self.reader.write_block(block, data)
    }

    fn read_block(&self, block: u8, len: usize) -> Result<Vec<u8>, ReaderError> {
        self.check_live()?;
        self.reader.read_block(block, len)
    }
}

/// Single source of truth for the attached reader and its card
#[derive(Default)]
pub struct SessionRegistry {
    session: Mutex<Option<Session>>,
}

impl SessionRegistry {
    /// Create a registry in the `NoReader` state
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one reader event
    pub fn handle_event(&self, event: ReaderEvent) {
        match event {
            ReaderEvent::Attached { device_id, reader } => self.on_attach(device_id, reader),
            ReaderEvent::Detached => self.on_detach(),
            ReaderEvent::CardPresent(card) => self.on_card_present(card),
            ReaderEvent::CardAbsent => self.on_card_absent(),
            ReaderEvent::Error(cause) => warn!("Reader error: {}", cause),
        }
    }

    /// Install a new session, discarding the previous one
    pub fn on_attach(&self, device_id: impl Into<String>, reader: Arc<dyn TagReader>) {
        let device_id = device_id.into();
        let mut guard = self.session.lock();
        if let Some(old) = guard.take() {
            info!("Reader {} replaced by {}", old.device_id, device_id);
            old.retire();
        }
        info!("Reader {} attached", device_id);
        *guard = Some(Session {
            device_id,
            reader,
            card: None,
            live: Arc::new(AtomicBool::new(true)),
        });
    }

    /// Drop the session; handles taken from it stop working
    pub fn on_detach(&self) {
        match self.session.lock().take() {
            Some(old) => {
                old.retire();
                info!("Reader {} detached", old.device_id);
            }
            None => debug!("Detach with no reader attached"),
        }
    }

    pub fn on_card_present(&self, card: CardDescriptor) {
        let mut guard = self.session.lock();
        match guard.as_mut() {
            Some(session) => {
                info!("Card {} detected on {}", card.uid, session.device_id);
                session.card = Some(card);
            }
            None => debug!("Card {} reported with no reader attached", card.uid),
        }
    }

    pub fn on_card_absent(&self) {
        let mut guard = self.session.lock();
        match guard.as_mut() {
            Some(session) => {
                if let Some(card) = session.card.take() {
                    info!("Card {} removed from {}", card.uid, session.device_id);
                }
            }
            None => debug!("Card removal reported with no reader attached"),
        }
    }

    /// Handle to the attached reader, if any
    pub fn current_reader(&self) -> Option<ReaderHandle> {
        self.session.lock().as_ref().map(Session::handle)
    }

    /// Handle to the attached reader plus whether it sees a card, taken
    /// under one lock so both describe the same session
    pub fn current_reader_with_card(&self) -> Option<(ReaderHandle, bool)> {
        self.session
            .lock()
            .as_ref()
            .map(|s| (s.handle(), s.card.is_some()))
    }

    /// Whether the attached reader currently sees a card
    pub fn has_card(&self) -> bool {
        self.session.lock().as_ref().is_some_and(|s| s.card.is_some())
    }

    pub fn state(&self) -> RegistryState {
        state_of(self.session.lock().as_ref())
    }

    pub fn status(&self) -> SessionStatus {
        let guard = self.session.lock();
        SessionStatus {
            state: state_of(guard.as_ref()),
            reader_attached: guard.is_some(),
            device_id: guard.as_ref().map(|s| s.device_id.clone()),
            card: guard.as_ref().and_then(|s| s.card.clone()),
        }
    }
}

fn state_of(session: Option<&Session>) -> RegistryState {
    match session {
        None => RegistryState::NoReader,
        Some(s) if s.card.is_some() => RegistryState::CardPresent,
        Some(_) => RegistryState::CardAbsent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{VirtualReader, VirtualTag};

    fn card(uid: &str) -> CardDescriptor {
        CardDescriptor {
            uid: uid.to_string(),
            atr: None,
            standard: None,
        }
    }

    fn attached(registry: &SessionRegistry, device_id: &str) -> Arc<VirtualReader> {
        let reader = Arc::new(VirtualReader::new(device_id));
        registry.on_attach(device_id, reader.clone());
        reader
    }

    #[test]
    fn test_initial_state() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.state(), RegistryState::NoReader);
        assert!(registry.current_reader().is_none());
        assert!(!registry.has_card());
    }

    #[test]
    fn test_lifecycle() {
        let registry = SessionRegistry::new();
        attached(&registry, "acr122u");
        assert_eq!(registry.state(), RegistryState::CardAbsent);
        assert!(!registry.has_card());

        registry.on_card_present(card("04A2"));
        assert_eq!(registry.state(), RegistryState::CardPresent);
        assert!(registry.has_card());

        registry.on_card_absent();
        assert_eq!(registry.state(), RegistryState::CardAbsent);

        registry.on_card_present(card("04A3"));
        registry.on_detach();
        assert_eq!(registry.state(), RegistryState::NoReader);
        assert!(!registry.has_card());
    }

    #[test]
    fn test_card_events_without_reader_are_ignored() {
        let registry = SessionRegistry::new();
        registry.on_card_present(card("04A2"));
        assert_eq!(registry.state(), RegistryState::NoReader);
        registry.on_card_absent();
        registry.on_detach();
        assert_eq!(registry.state(), RegistryState::NoReader);
    }

    #[test]
    fn test_attach_resets_card() {
        let registry = SessionRegistry::new();
        attached(&registry, "first");
        registry.on_card_present(card("04A2"));

        attached(&registry, "second");
        assert!(!registry.has_card());
        assert_eq!(registry.status().device_id.as_deref(), Some("second"));
    }

    #[test]
    fn test_handle_fails_after_detach() {
        let registry = SessionRegistry::new();
        let reader = attached(&registry, "acr122u");
        reader.place_tag(VirtualTag::blank(45));
        registry.on_card_present(card("04A2"));

        let handle = registry.current_reader().unwrap();
        assert!(handle.read_block(4, 4).is_ok());

        registry.on_detach();
        assert!(!handle.is_live());
        assert_eq!(handle.read_block(4, 4), Err(ReaderError::Detached));
        assert_eq!(handle.write_block(4, &[1; 4]), Err(ReaderError::Detached));
    }

    #[test]
    fn test_reader_with_card_snapshot() {
        let registry = SessionRegistry::new();
        assert!(registry.current_reader_with_card().is_none());

        attached(&registry, "acr122u");
        let (handle, has_card) = registry.current_reader_with_card().unwrap();
        assert_eq!(handle.device_id(), "acr122u");
        assert!(!has_card);

        registry.on_card_present(card("04A2"));
        let (_, has_card) = registry.current_reader_with_card().unwrap();
        assert!(has_card);

        // A replacement session starts without a card and retires the old handle
        attached(&registry, "second");
        let (new, has_card) = registry.current_reader_with_card().unwrap();
        assert!(!has_card);
        assert!(!handle.is_live());
        assert_eq!(new.device_id(), "second");
    }

    #[test]
    fn test_handle_fails_after_replacement() {
        let registry = SessionRegistry::new();
        attached(&registry, "first");
        let old = registry.current_reader().unwrap();

        attached(&registry, "second");
        let new = registry.current_reader().unwrap();
        assert!(!old.is_live());
        assert!(new.is_live());
        assert_eq!(new.device_id(), "second");
    }

    #[test]
    fn test_handle_event_dispatch() {
        let registry = SessionRegistry::new();
        registry.handle_event(ReaderEvent::Attached {
            device_id: "acr122u".to_string(),
            reader: Arc::new(VirtualReader::new("acr122u")),
        });
        registry.handle_event(ReaderEvent::CardPresent(card("04A2")));
        registry.handle_event(ReaderEvent::Error("antenna glitch".to_string()));
        assert_eq!(registry.state(), RegistryState::CardPresent);

        registry.handle_event(ReaderEvent::CardAbsent);
        assert_eq!(registry.state(), RegistryState::CardAbsent);

        registry.handle_event(ReaderEvent::Detached);
        assert_eq!(registry.state(), RegistryState::NoReader);
    }

    #[test]
    fn test_status_snapshot() {
        let registry = SessionRegistry::new();
        assert_eq!(
            registry.status(),
            SessionStatus {
                state: RegistryState::NoReader,
                reader_attached: false,
                device_id: None,
                card: None,
            }
        );

        attached(&registry, "acr122u");
        registry.on_card_present(card("04A2"));
        let status = registry.status();
        assert_eq!(status.state, RegistryState::CardPresent);
        assert!(status.reader_attached);
        assert_eq!(status.card, Some(card("04A2")));

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "card_present");
    }
}
