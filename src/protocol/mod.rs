//! File-marker handshake between Jw_cad and the assistant
//!
//! The two processes share nothing but a working directory. Jw_cad writes the
//! exchange file (and, through `jwai hook`, a signal marker); the assistant
//! rewrites the exchange file and answers with a done marker.

mod liveness;
mod markers;
pub mod session;
pub mod watcher;

use std::path::{Path, PathBuf};

pub use markers::{
    cleanup_signal_files, create_lock, is_main_running, live_lock_owner, read_done, read_signal,
    remove_lock, write_done, write_signal,
};

pub const EXCHANGE_FILE: &str = "JWC_TEMP.TXT";
pub const SIGNAL_FILE: &str = "jwai_signal.json";
pub const DONE_FILE: &str = "jwai_done.json";
pub const LOCK_FILE: &str = "jwai_main.lock";
pub const READY_FILE: &str = "jwai_ready.json";
pub const SCREENSHOT_FILE: &str = "jwai_screenshot.png";

/// Every path the handshake touches, derived from one working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPaths {
    pub work_dir: PathBuf,
    pub exchange: PathBuf,
    pub signal: PathBuf,
    pub done: PathBuf,
    pub lock: PathBuf,
    pub ready: PathBuf,
    pub screenshot: PathBuf,
}

impl MarkerPaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            work_dir: dir.to_path_buf(),
            exchange: dir.join(EXCHANGE_FILE),
            signal: dir.join(SIGNAL_FILE),
            done: dir.join(DONE_FILE),
            lock: dir.join(LOCK_FILE),
            ready: dir.join(READY_FILE),
            screenshot: dir.join(SCREENSHOT_FILE),
        }
    }
}
