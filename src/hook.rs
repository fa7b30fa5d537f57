//! `jwai hook`: the Jw_cad side of the handshake
//!
//! Jw_cad runs this as its external transform program. It announces the
//! selection, then blocks until the assistant writes the done marker, so
//! Jw_cad re-reads the exchange file only after the assistant is finished.

use std::time::{Duration, Instant};

use anyhow::{Result, bail};

use crate::fsio::remove_if_exists;
use crate::protocol::{MarkerPaths, is_main_running, read_done, write_signal};

pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

const SIGNAL_MESSAGE: &str = "external transform requested";

pub fn run(paths: &MarkerPaths, timeout: Duration) -> Result<()> {
    run_with_poll(paths, timeout, POLL_INTERVAL)
}

pub fn run_with_poll(paths: &MarkerPaths, timeout: Duration, poll: Duration) -> Result<()> {
    if !is_main_running(paths) {
        bail!(
            "The assistant is not running in {}; start it with `jwai run`",
            paths.work_dir.display()
        );
    }
    if !paths.exchange.exists() {
        log::warn!("{} does not exist yet", paths.exchange.display());
    }
    if remove_if_exists(&paths.done)? {
        log::warn!("Removed a done marker left over from an earlier cycle");
    }

    write_signal(paths, SIGNAL_MESSAGE)?;
    log::info!("Waiting for the assistant (timeout {}s)", timeout.as_secs());

    let started = Instant::now();
    let outcome = loop {
        if read_done(paths).is_some() {
            break Ok(());
        }
        if !is_main_running(paths) {
            break Err(anyhow::anyhow!("The assistant exited before finishing"));
        }
        if started.elapsed() >= timeout {
            break Err(anyhow::anyhow!(
                "Timed out after {}s waiting for the assistant",
                timeout.as_secs()
            ));
        }
        std::thread::sleep(poll);
    };

    for path in [&paths.done, &paths.signal] {
        if let Err(e) = remove_if_exists(path) {
            log::error!("Failed to delete {}: {}", path.display(), e);
        }
    }
    if outcome.is_ok() {
        log::info!("Assistant finished; returning to Jw_cad");
    }
    outcome
}
