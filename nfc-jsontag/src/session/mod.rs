//! Reader session tracking
//!
//! A reader driver publishes [`ReaderEvent`]s on a channel; a dedicated
//! thread drains the channel into the [`SessionRegistry`], which is the
//! only place session state changes.

mod registry;

pub use registry::{ReaderHandle, RegistryState, SessionRegistry, SessionStatus};

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use log::debug;

use crate::reader::ReaderEvent;

/// Create the channel a reader driver publishes its events on
pub fn event_channel() -> (Sender<ReaderEvent>, Receiver<ReaderEvent>) {
    channel::unbounded()
}

/// Apply events to `registry` on a background thread
///
/// The thread exits once every sender has been dropped.
pub fn spawn_event_loop(
    registry: Arc<SessionRegistry>,
    events: Receiver<ReaderEvent>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("jsontag-events".to_string())
        .spawn(move || {
            for event in events.iter() {
                debug!("Reader event: {:?}", event);
                registry.handle_event(event);
            }
            debug!("Reader event channel closed");
        })
}
