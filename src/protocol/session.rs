//! One exchange cycle at a time: detect, instruct, transform, write back,
//! return control to Jw_cad

use std::fmt;

use super::watcher::WatchEvent;
use super::{MarkerPaths, write_done};
use crate::error::{BridgeError, Result};
use crate::exchange::{ExchangeDocument, Modifications, read_exchange_file, write_exchange_file};
use crate::transform::{self, TransformDescriptor, TransformKind, extract_descriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    DataReady,
    InstructionPending,
    TransformReady,
    Applied,
    Returned,
}

impl CycleState {
    pub fn name(self) -> &'static str {
        match self {
            CycleState::Idle => "idle",
            CycleState::DataReady => "data ready",
            CycleState::InstructionPending => "waiting for a reply",
            CycleState::TransformReady => "transform ready",
            CycleState::Applied => "applied",
            CycleState::Returned => "returned",
        }
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an apply step did to the exchange file
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyReport {
    pub transform: Option<String>,
    pub lines_changed: usize,
    pub arcs_changed: usize,
    pub arcs_skipped: usize,
    /// Arcs were selected but `rotate` only moves lines
    pub rotate_left_arcs: bool,
}

impl fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(transform) = &self.transform else {
            return f.write_str("no transform; sentinel cleared, geometry untouched");
        };
        write!(
            f,
            "{transform}: {} line(s) and {} arc(s) changed",
            self.lines_changed, self.arcs_changed
        )?;
        if self.rotate_left_arcs {
            write!(f, "; {} arc(s) left in place (rotate moves lines only)", self.arcs_skipped)?;
        } else if self.arcs_skipped > 0 {
            write!(f, "; {} arc(s) without angles skipped", self.arcs_skipped)?;
        }
        Ok(())
    }
}

pub struct Session {
    paths: MarkerPaths,
    state: CycleState,
    document: Option<ExchangeDocument>,
    descriptor: Option<TransformDescriptor>,
    /// State to fall back to if the outstanding request fails
    before_dispatch: CycleState,
}

impl Session {
    pub fn new(paths: MarkerPaths) -> Self {
        Self {
            paths,
            state: CycleState::Idle,
            document: None,
            descriptor: None,
            before_dispatch: CycleState::Idle,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn paths(&self) -> &MarkerPaths {
        &self.paths
    }

    pub fn document(&self) -> Option<&ExchangeDocument> {
        self.document.as_ref()
    }

    pub fn descriptor(&self) -> Option<&TransformDescriptor> {
        self.descriptor.as_ref()
    }

    fn invalid(&self, action: &'static str) -> BridgeError {
        BridgeError::InvalidState {
            action,
            state: self.state.name(),
        }
    }

    /// Decode the exchange file after the watcher fired. Only valid when idle;
    /// a read failure leaves the session idle.
    pub fn begin_cycle(&mut self, trigger: WatchEvent) -> Result<&ExchangeDocument> {
        if self.state != CycleState::Idle {
            return Err(self.invalid("start a new cycle"));
        }
        let document = read_exchange_file(&self.paths.exchange)?;
        log::info!(
            "Cycle started by {:?}: {} lines, {} arcs, {} texts",
            trigger,
            document.lines().count(),
            document.arcs().count(),
            document.texts().count()
        );
        self.descriptor = None;
        self.state = CycleState::DataReady;
        Ok(&*self.document.insert(document))
    }

    /// Mark an instruction as sent to the completion service
    pub fn submit_instruction(&mut self) -> Result<()> {
        match self.state {
            CycleState::DataReady | CycleState::TransformReady => {
                self.before_dispatch = self.state;
                self.state = CycleState::InstructionPending;
                Ok(())
            }
            _ => Err(self.invalid("send an instruction")),
        }
    }

    /// Digest a reply. Without a descriptor the cycle falls back to
    /// `DataReady` and any earlier descriptor is dropped.
    pub fn receive_response(&mut self, reply: &str) -> Result<Option<&TransformDescriptor>> {
        if self.state != CycleState::InstructionPending {
            return Err(self.invalid("accept a reply"));
        }
        self.descriptor = extract_descriptor(reply);
        self.state = if self.descriptor.is_some() {
            CycleState::TransformReady
        } else {
            CycleState::DataReady
        };
        Ok(self.descriptor.as_ref())
    }

    /// The request failed; go back to where the cycle was before it
    pub fn response_failed(&mut self) {
        if self.state == CycleState::InstructionPending {
            self.state = self.before_dispatch;
        }
    }

    /// Run the transform (if any) and rewrite the exchange file. The
    /// sentinel is dropped either way. A failed write changes nothing.
    pub fn apply(&mut self) -> Result<ApplyReport> {
        if !matches!(
            self.state,
            CycleState::DataReady | CycleState::TransformReady
        ) {
            return Err(self.invalid("apply"));
        }
        let Some(document) = &self.document else {
            return Err(self.invalid("apply"));
        };

        let report = write_back(&self.paths, document, self.descriptor.as_ref())?;
        log::info!("Applied: {report}");
        self.state = CycleState::Applied;
        Ok(report)
    }

    /// Write the done marker and forget the cycle. From `DataReady` or
    /// `TransformReady` the exchange file is written back first so that
    /// done never precedes the write.
    pub fn return_to_cad(&mut self) -> Result<Option<ApplyReport>> {
        let report = match self.state {
            CycleState::DataReady | CycleState::TransformReady => Some(self.apply()?),
            CycleState::Applied => None,
            _ => return Err(self.invalid("return to Jw_cad")),
        };
        write_done(&self.paths)?;
        self.state = CycleState::Returned;
        log::info!("Returned control to Jw_cad");

        self.document = None;
        self.descriptor = None;
        self.state = CycleState::Idle;
        Ok(report)
    }

    /// Abandon whatever cycle is in progress
    pub fn reset(&mut self) {
        if self.state != CycleState::Idle {
            log::warn!("Abandoning cycle in state {}", self.state);
        }
        self.state = CycleState::Idle;
        self.document = None;
        self.descriptor = None;
    }
}

/// Transform `document` and write it over the exchange file
pub fn write_back(
    paths: &MarkerPaths,
    document: &ExchangeDocument,
    descriptor: Option<&TransformDescriptor>,
) -> Result<ApplyReport> {
    let (modifications, report) = match descriptor {
        Some(descriptor) => {
            let outcome = transform::apply(&document.elements, descriptor);
            let report = ApplyReport {
                transform: Some(descriptor.summary()),
                lines_changed: outcome.lines_changed,
                arcs_changed: outcome.arcs_changed,
                arcs_skipped: outcome.arcs_skipped,
                rotate_left_arcs: descriptor.kind == TransformKind::Rotate
                    && outcome.arcs_skipped > 0,
            };
            (outcome.modifications, report)
        }
        None => (
            Modifications::default(),
            ApplyReport {
                transform: None,
                lines_changed: 0,
                arcs_changed: 0,
                arcs_skipped: 0,
                rotate_left_arcs: false,
            },
        ),
    };
    write_exchange_file(&paths.exchange, &document.serialize(&modifications))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::read_done;

    fn session_with(exchange: &str) -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let paths = MarkerPaths::in_dir(dir.path());
        std::fs::write(&paths.exchange, exchange).unwrap();
        (dir, Session::new(paths))
    }

    fn prepare(session: &mut Session, descriptor_json: &str) {
        session.submit_instruction().unwrap();
        let reply = format!("```json\n{descriptor_json}\n```");
        assert!(session.receive_response(&reply).unwrap().is_some());
    }

    fn exchange_text(session: &Session) -> String {
        std::fs::read_to_string(&session.paths().exchange).unwrap()
    }

    #[test]
    fn test_full_cycle() {
        let (_dir, mut session) = session_with("hq\nlg1\n0 0 100 0\nci 500 500 800 90 180\n");

        session.begin_cycle(WatchEvent::ExchangeUpdated).unwrap();
        assert_eq!(session.state(), CycleState::DataReady);

        session.submit_instruction().unwrap();
        assert_eq!(session.state(), CycleState::InstructionPending);
        let reply = "Flip it.\n```json\n{\"type\": \"arc_flip_x\"}\n```";
        assert!(session.receive_response(reply).unwrap().is_some());
        assert_eq!(session.state(), CycleState::TransformReady);

        let report = session.apply().unwrap();
        assert_eq!(session.state(), CycleState::Applied);
        assert_eq!(report.arcs_changed, 1);
        assert_eq!(exchange_text(&session), "lg1\n0 0 100 0\nci 500 500 800 0 90\n");

        assert!(session.return_to_cad().unwrap().is_none());
        assert_eq!(session.state(), CycleState::Idle);
        assert!(session.document().is_none());
        assert!(read_done(session.paths()).is_some());
    }

    #[test]
    fn test_reply_without_descriptor() {
        let (_dir, mut session) = session_with("hq\n0 0 1 0\n");
        session.begin_cycle(WatchEvent::SignalReceived).unwrap();
        session.submit_instruction().unwrap();
        assert!(session.receive_response("Looks fine as is.").unwrap().is_none());
        assert_eq!(session.state(), CycleState::DataReady);
    }

    #[test]
    fn test_failed_request_restores_state() {
        let (_dir, mut session) = session_with("hq\n0 0 1 0\n");
        session.begin_cycle(WatchEvent::SignalReceived).unwrap();
        prepare(&mut session, r#"{"type": "mirror_x"}"#);
        session.submit_instruction().unwrap();
        session.response_failed();
        assert_eq!(session.state(), CycleState::TransformReady);
        assert!(session.descriptor().is_some());
    }

    #[test]
    fn test_apply_without_transform_strips_sentinel() {
        let (_dir, mut session) = session_with("hq\n0 0 1 0\n");
        session.begin_cycle(WatchEvent::ExchangeUpdated).unwrap();
        let report = session.apply().unwrap();
        assert!(report.transform.is_none());
        assert_eq!(exchange_text(&session), "0 0 1 0\n");
    }

    #[test]
    fn test_return_from_data_ready_writes_back_first() {
        let (_dir, mut session) = session_with("hq\n0 0 1 0\n");
        session.begin_cycle(WatchEvent::ExchangeUpdated).unwrap();
        let report = session.return_to_cad().unwrap();
        assert!(report.is_some());
        assert_eq!(exchange_text(&session), "0 0 1 0\n");
        assert!(read_done(session.paths()).is_some());
    }

    #[test]
    fn test_done_write_failure_keeps_applied() {
        let (_dir, mut session) = session_with("hq\n0 0 1 0\n");
        std::fs::create_dir(&session.paths().done).unwrap();
        session.begin_cycle(WatchEvent::ExchangeUpdated).unwrap();
        session.apply().unwrap();

        assert!(matches!(
            session.return_to_cad(),
            Err(BridgeError::WriteFailure { .. })
        ));
        assert_eq!(session.state(), CycleState::Applied);
        assert!(session.document().is_some());
    }

    #[test]
    fn test_cycles_do_not_overlap() {
        let (_dir, mut session) = session_with("hq\n0 0 1 0\n");
        session.begin_cycle(WatchEvent::ExchangeUpdated).unwrap();
        assert!(matches!(
            session.begin_cycle(WatchEvent::SignalReceived),
            Err(BridgeError::InvalidState { .. })
        ));
        session.reset();
        assert!(session.begin_cycle(WatchEvent::SignalReceived).is_ok());
    }

    #[test]
    fn test_missing_exchange_stays_idle() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(MarkerPaths::in_dir(dir.path()));
        assert!(matches!(
            session.begin_cycle(WatchEvent::SignalReceived),
            Err(BridgeError::MissingFile(_))
        ));
        assert_eq!(session.state(), CycleState::Idle);
    }

    #[test]
    fn test_apply_out_of_order() {
        let (_dir, mut session) = session_with("hq\n");
        assert!(session.apply().is_err());
        assert!(session.return_to_cad().is_err());
        assert!(session.submit_instruction().is_err());
    }

    #[test]
    fn test_rotate_report_mentions_arcs() {
        let (_dir, mut session) = session_with("hq\n10 0 20 0\nci 0 0 5 0 90\n");
        session.begin_cycle(WatchEvent::ExchangeUpdated).unwrap();
        prepare(&mut session, r#"{"type": "rotate", "angle": 90}"#);
        let report = session.apply().unwrap();
        assert!(report.rotate_left_arcs);
        assert!(report.to_string().contains("rotate moves lines only"));
    }
}
