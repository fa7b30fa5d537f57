//! Timestamp polling of the exchange file and the signal marker
//!
//! Each tick costs two `stat` calls. File contents are only read after a
//! modification time moves forward.

use std::path::Path;
use std::time::SystemTime;

use super::MarkerPaths;
use crate::exchange::{EXECUTED_SENTINEL, read_first_line};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// Jw_cad rewrote the exchange file and left the sentinel on top
    ExchangeUpdated,
    /// The CAD-side hook announced a selection
    SignalReceived,
}

pub struct Watcher {
    paths: MarkerPaths,
    exchange_seen: Option<SystemTime>,
    signal_seen: Option<SystemTime>,
}

impl Watcher {
    /// Seeds the last-seen timestamps from disk, so files that already
    /// existed at startup do not count as news
    pub fn new(paths: MarkerPaths) -> Self {
        let exchange_seen = modified(&paths.exchange);
        let signal_seen = modified(&paths.signal);
        Self {
            paths,
            exchange_seen,
            signal_seen,
        }
    }

    /// At most one event per tick; a signal wins over a bare exchange update
    /// because the hook writes both for the same selection.
    pub fn tick(&mut self) -> Option<WatchEvent> {
        let exchange = self.exchange_changed();
        let signal = self.signal_changed();
        if signal {
            Some(WatchEvent::SignalReceived)
        } else if exchange {
            Some(WatchEvent::ExchangeUpdated)
        } else {
            None
        }
    }

    fn exchange_changed(&mut self) -> bool {
        if advanced(&self.paths.exchange, &mut self.exchange_seen).is_none() {
            return false;
        }
        match read_first_line(&self.paths.exchange) {
            Ok(first) if first == EXECUTED_SENTINEL => {
                log::info!("Exchange file updated");
                true
            }
            Ok(_) => {
                log::debug!("Exchange file changed without the sentinel, ignoring");
                false
            }
            Err(e) => {
                log::warn!("Could not read {}: {}", self.paths.exchange.display(), e);
                false
            }
        }
    }

    fn signal_changed(&mut self) -> bool {
        if advanced(&self.paths.signal, &mut self.signal_seen).is_some() {
            log::info!("Signal marker received");
            true
        } else {
            false
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// New mtime of `path` if it moved past `seen`, updating `seen`
fn advanced(path: &Path, seen: &mut Option<SystemTime>) -> Option<SystemTime> {
    let mtime = modified(path)?;
    if Some(mtime) > *seen {
        *seen = Some(mtime);
        Some(mtime)
    } else {
        None
    }
}
