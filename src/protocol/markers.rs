//! Lock, ready, signal and done markers
//!
//! Markers are small files replaced whole, so the other side never sees a
//! half-written one.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::MarkerPaths;
use super::liveness::process_alive;
use crate::error::{BridgeError, Result};
use crate::fsio::{remove_if_exists, replace_contents};

/// Written by the CAD side when it hands over a selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub message: String,
    pub timestamp: f64,
    pub jwc_temp: PathBuf,
}

/// Written by the assistant once the exchange file holds the result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoneRecord {
    pub done: bool,
    pub timestamp: f64,
}

/// Announces a running assistant next to the lock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyRecord {
    pub pid: u32,
    pub timestamp: f64,
}

/// Seconds since the Unix epoch, with sub-second precision
fn timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| BridgeError::write(path, e.into()))?;
    replace_contents(path, &json).map_err(|e| BridgeError::write(path, e))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let json = std::fs::read(path).ok()?;
    match serde_json::from_slice(&json) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Ignoring malformed marker {}: {}", path.display(), e);
            None
        }
    }
}

fn remove_logged(path: &Path) {
    if let Err(e) = remove_if_exists(path) {
        log::error!("Failed to delete {}: {}", path.display(), e);
    }
}

/// Claim the lock for this process and announce readiness
pub fn create_lock(paths: &MarkerPaths) -> Result<()> {
    let pid = std::process::id();
    replace_contents(&paths.lock, pid.to_string().as_bytes())
        .map_err(|e| BridgeError::write(&paths.lock, e))?;
    write_json(
        &paths.ready,
        &ReadyRecord {
            pid,
            timestamp: timestamp(),
        },
    )?;
    log::info!("Lock created for pid {pid}");
    Ok(())
}

pub fn remove_lock(paths: &MarkerPaths) {
    remove_logged(&paths.lock);
    remove_logged(&paths.ready);
}

/// Pid in the lock marker, if that process is still running.
///
/// A lock that is missing, unparsable or owned by a dead process is deleted
/// on the spot.
pub fn live_lock_owner(paths: &MarkerPaths) -> Option<u32> {
    let contents = std::fs::read_to_string(&paths.lock).ok()?;
    match contents.trim().parse::<u32>() {
        Ok(pid) if process_alive(pid) => return Some(pid),
        Ok(pid) => log::warn!("Found stale lock (PID {pid} is dead), cleaning up"),
        Err(_) => log::warn!("Found unreadable lock {:?}, cleaning up", contents.trim()),
    }
    remove_lock(paths);
    None
}

pub fn is_main_running(paths: &MarkerPaths) -> bool {
    live_lock_owner(paths).is_some()
}

pub fn write_signal(paths: &MarkerPaths, message: &str) -> Result<()> {
    write_json(
        &paths.signal,
        &SignalRecord {
            message: message.to_string(),
            timestamp: timestamp(),
            jwc_temp: paths.exchange.clone(),
        },
    )
}

pub fn read_signal(paths: &MarkerPaths) -> Option<SignalRecord> {
    read_json(&paths.signal)
}

pub fn write_done(paths: &MarkerPaths) -> Result<()> {
    write_json(
        &paths.done,
        &DoneRecord {
            done: true,
            timestamp: timestamp(),
        },
    )
}

/// The done marker, only when it actually says done
pub fn read_done(paths: &MarkerPaths) -> Option<DoneRecord> {
    read_json::<DoneRecord>(&paths.done).filter(|d| d.done)
}

/// Delete signal and done markers left over from an earlier cycle
pub fn cleanup_signal_files(paths: &MarkerPaths) {
    remove_logged(&paths.signal);
    remove_logged(&paths.done);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MarkerPaths::in_dir(dir.path());
        assert!(!is_main_running(&paths));

        create_lock(&paths).unwrap();
        assert_eq!(live_lock_owner(&paths), Some(std::process::id()));
        let ready: ReadyRecord = read_json(&paths.ready).unwrap();
        assert_eq!(ready.pid, std::process::id());

        remove_lock(&paths);
        assert!(!paths.lock.exists());
        assert!(!paths.ready.exists());
    }

    #[test]
    fn test_stale_lock_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MarkerPaths::in_dir(dir.path());
        std::fs::write(&paths.lock, "2147483000").unwrap();
        std::fs::write(&paths.ready, "{}").unwrap();

        assert!(!is_main_running(&paths));
        assert!(!paths.lock.exists());
        assert!(!paths.ready.exists());
    }

    #[test]
    fn test_garbage_lock_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MarkerPaths::in_dir(dir.path());
        std::fs::write(&paths.lock, "not a pid").unwrap();
        assert!(!is_main_running(&paths));
        assert!(!paths.lock.exists());
    }

    #[test]
    fn test_signal_and_done() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MarkerPaths::in_dir(dir.path());

        write_signal(&paths, "external transform").unwrap();
        let signal = read_signal(&paths).unwrap();
        assert_eq!(signal.message, "external transform");
        assert_eq!(signal.jwc_temp, paths.exchange);

        assert!(read_done(&paths).is_none());
        write_done(&paths).unwrap();
        let done = read_done(&paths).unwrap();
        assert!(done.done);
        assert!(done.timestamp > 1_600_000_000.0);
        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&paths.done).unwrap()).unwrap();
        assert!(raw["timestamp"].is_number());

        cleanup_signal_files(&paths);
        assert!(!paths.signal.exists());
        assert!(!paths.done.exists());
        // nothing left to clean is fine
        cleanup_signal_files(&paths);
    }

    #[test]
    fn test_done_written_by_another_process() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MarkerPaths::in_dir(dir.path());
        std::fs::write(&paths.done, r#"{"done": true, "timestamp": 1760000000.5}"#).unwrap();
        let done = read_done(&paths).unwrap();
        assert_eq!(done.timestamp, 1760000000.5);

        std::fs::write(
            &paths.signal,
            r#"{"message": "ready", "timestamp": 1760000000, "jwc_temp": "C:/JWW/JWC_TEMP.TXT"}"#,
        )
        .unwrap();
        assert_eq!(read_signal(&paths).unwrap().message, "ready");
    }

    #[test]
    fn test_done_false_is_not_done() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MarkerPaths::in_dir(dir.path());
        std::fs::write(&paths.done, r#"{"done": false, "timestamp": 1760000000.5}"#).unwrap();
        assert!(read_done(&paths).is_none());
        std::fs::write(&paths.done, "{half").unwrap();
        assert!(read_done(&paths).is_none());
    }

    #[test]
    fn test_write_done_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MarkerPaths::in_dir(dir.path());
        std::fs::create_dir(&paths.done).unwrap();
        assert!(matches!(
            write_done(&paths),
            Err(BridgeError::WriteFailure { .. })
        ));
    }
}
