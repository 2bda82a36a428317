//! jsontag gateway - HTTP access to a JSON payload stored on an NFC tag
//!
//! Serves the tag on a virtual NTAG reader. Simulated hardware events
//! (reader attach/detach, tag placed/removed) are posted to the admin
//! endpoints and travel through the same event channel a real driver uses.
//!
//! # Usage
//!
//! ```bash
//! # Start on the configured address (default 127.0.0.1:3000)
//! jsontag-gateway
//!
//! # Custom port and config file
//! jsontag-gateway --port 8080 --config gateway.json
//! ```
//!
//! # Endpoints
//!
//! - `POST /api/v1/tag` - Write a JSON object to the tag
//! - `GET /api/v1/tag` - Read the JSON object from the tag
//! - `GET /api/v1/status` - Reader and card state
//! - `POST /api/v1/reader/attach`, `POST /api/v1/reader/detach`
//! - `POST /api/v1/card/present`, `POST /api/v1/card/absent`
//! - `GET /api/v1/health` - Health check

mod handlers;
mod routes;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use crossbeam::channel::Sender;
use log::{error, info, warn};

use nfc_jsontag::codec::DecodeOptions;
use nfc_jsontag::config::GatewayConfig;
use nfc_jsontag::reader::{CardDescriptor, ReaderEvent, TagImageStore, VirtualReader, VirtualTag};
use nfc_jsontag::session::{self, SessionRegistry};

/// HTTP gateway for JSON payloads on NFC tags
#[derive(Parser, Debug)]
#[command(name = "jsontag-gateway")]
#[command(version)]
struct Args {
    /// HTTP server port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address (overrides the config file)
    #[arg(short, long)]
    bind: Option<String>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Shared application state
pub struct AppState {
    registry: Arc<SessionRegistry>,
    events: Sender<ReaderEvent>,
    reader: Arc<VirtualReader>,
    store: TagImageStore,
    tag_pages: usize,
    decode: DecodeOptions,
}

impl AppState {
    fn new(config: &GatewayConfig, registry: Arc<SessionRegistry>, events: Sender<ReaderEvent>) -> Self {
        Self {
            registry,
            events,
            reader: Arc::new(VirtualReader::new(config.device_id.clone())),
            store: TagImageStore::new(config.storage_dir.clone()),
            tag_pages: config.tag_pages,
            decode: config.decode_options(),
        }
    }

    fn publish(&self, event: ReaderEvent) -> bool {
        match self.events.send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!("Reader event dropped, event loop is gone: {:?}", e.0);
                false
            }
        }
    }

    /// Plug the virtual reader in
    fn attach(&self) -> bool {
        self.publish(ReaderEvent::Attached {
            device_id: self.reader.name().to_string(),
            reader: self.reader.clone(),
        })
    }

    fn detach(&self) -> bool {
        self.publish(ReaderEvent::Detached)
    }

    /// Put the saved tag (or a blank one) on the reader
    fn present_card(&self) -> Option<CardDescriptor> {
        let card = match self.reader.with_tag(|tag| tag.descriptor()) {
            Some(card) => card,
            None => {
                let tag = self
                    .store
                    .load()
                    .unwrap_or_else(|| VirtualTag::blank(self.tag_pages));
                self.reader.place_tag(tag)
            }
        };
        self.publish(ReaderEvent::CardPresent(card.clone())).then_some(card)
    }

    /// Take the tag off the reader, saving its content
    fn remove_card(&self) -> bool {
        if let Some(tag) = self.reader.remove_tag() {
            self.store.save(&tag);
        }
        self.publish(ReaderEvent::CardAbsent)
    }

    fn persist_tag(&self) {
        self.reader.with_tag(|tag| self.store.save(tag));
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = args.log_level.parse().unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();

    let mut config = match GatewayConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    let registry = Arc::new(SessionRegistry::new());
    let (events, receiver) = session::event_channel();
    if let Err(e) = session::spawn_event_loop(registry.clone(), receiver) {
        error!("Failed to start reader event loop: {}", e);
        process::exit(1);
    }

    let state = Arc::new(AppState::new(&config, registry, events));
    info!("Tag image: {:?}", state.store.path());
    if config.attach_on_start {
        state.attach();
        if config.card_on_start {
            state.present_card();
        }
    }

    let app = routes::build_router(state);

    let addr = format!("{}:{}", config.bind, config.port);
    info!("jsontag gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("HTTP server: http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        process::exit(1);
    }
}
