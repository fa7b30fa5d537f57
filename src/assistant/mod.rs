//! The assistant process
//!
//! Everything that changes state arrives as an [`AppMsg`] on one channel and
//! is handled by [`Assistant::update`]: watcher ticks, operator lines from
//! stdin, and replies from completion requests running on blocking workers.

pub mod completion;
pub mod prompt;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::drawing::{RecordTypes, decode_drawing};
use crate::protocol::session::{CycleState, Session};
use crate::protocol::watcher::{WatchEvent, Watcher};
use crate::protocol::{
    MarkerPaths, cleanup_signal_files, create_lock, live_lock_owner, read_signal, remove_lock,
};
use completion::{ChatMessage, CompletionRequest, CompletionService};

const DRAWING_SUMMARY_LINES: usize = 50;
const DRAWING_SUMMARY_ARCS: usize = 30;

const HELP: &str = "  <text>    instruction for the current selection
  :apply    write the transform (or just clear the sentinel) to the exchange file
  :return   hand control back to Jw_cad
  :reset    abandon the current cycle
  :status   show the cycle state
  :quit     exit";

pub struct AssistantOptions {
    pub paths: MarkerPaths,
    pub poll_interval: Duration,
    pub drawing: Option<PathBuf>,
    pub record_types: RecordTypes,
    pub service: Arc<dyn CompletionService>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Instruct(String),
    Apply,
    Return,
    Reset,
    Status,
    Help,
    Quit,
}

impl OperatorCommand {
    /// `None` for a blank line
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(match line {
            ":apply" => OperatorCommand::Apply,
            ":return" => OperatorCommand::Return,
            ":reset" => OperatorCommand::Reset,
            ":status" => OperatorCommand::Status,
            ":quit" | ":q" => OperatorCommand::Quit,
            _ if line.starts_with(':') => OperatorCommand::Help,
            _ => OperatorCommand::Instruct(line.to_string()),
        })
    }
}

#[derive(Debug)]
pub enum AppMsg {
    /// Poll the working directory
    Tick,
    Operator(OperatorCommand),
    /// A completion request finished; `request` matches the id handed out
    /// when it was dispatched
    Completion { request: u64, result: Result<String> },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Assistant {
    session: Session,
    watcher: Watcher,
    service: Arc<dyn CompletionService>,
    drawing: Option<PathBuf>,
    record_types: RecordTypes,
    drawing_summary: Option<String>,
    selection: Option<String>,
    history: Vec<ChatMessage>,
    next_request: u64,
    /// Request whose reply the current cycle is waiting for
    pending_request: Option<u64>,
    tx: mpsc::Sender<AppMsg>,
}

impl Assistant {
    pub fn new(options: AssistantOptions, tx: mpsc::Sender<AppMsg>) -> Self {
        Self {
            session: Session::new(options.paths.clone()),
            watcher: Watcher::new(options.paths),
            service: options.service,
            drawing: options.drawing,
            record_types: options.record_types,
            drawing_summary: None,
            selection: None,
            history: Vec::new(),
            next_request: 0,
            pending_request: None,
            tx,
        }
    }

    pub fn state(&self) -> CycleState {
        self.session.state()
    }

    pub fn update(&mut self, msg: AppMsg) -> Flow {
        match msg {
            AppMsg::Tick => {
                if let Some(event) = self.watcher.tick() {
                    self.on_watch_event(event);
                }
            }
            AppMsg::Operator(command) => return self.on_command(command),
            AppMsg::Completion { request, result } => {
                if self.pending_request != Some(request) {
                    log::warn!("Dropping reply to abandoned request {request}");
                    return Flow::Continue;
                }
                self.pending_request = None;
                match result {
                    Ok(reply) => self.on_reply(reply),
                    Err(e) => {
                        log::error!("Completion request failed: {:#}", e);
                        println!("Request failed: {e:#}");
                        self.history.pop();
                        self.session.response_failed();
                    }
                }
            }
            AppMsg::Shutdown => return Flow::Exit,
        }
        Flow::Continue
    }

    fn on_watch_event(&mut self, event: WatchEvent) {
        if self.session.state() != CycleState::Idle {
            log::warn!(
                "Ignoring {:?}: a cycle is already {}",
                event,
                self.session.state()
            );
            return;
        }
        if event == WatchEvent::SignalReceived {
            if let Some(signal) = read_signal(self.session.paths()) {
                log::info!("Signal from Jw_cad at {}: {}", signal.timestamp, signal.message);
            }
        }
        let selection = match self.session.begin_cycle(event) {
            Ok(document) => prompt::selection_context(document),
            Err(e) => {
                log::error!("Could not start a cycle: {}", e);
                return;
            }
        };
        self.drawing_summary = self.load_drawing_summary();
        self.history.clear();
        println!("\n{selection}");
        println!("Describe the change, or :apply / :return.");
        self.selection = Some(selection);
    }

    fn load_drawing_summary(&self) -> Option<String> {
        let path = self.drawing.as_ref()?;
        match decode_drawing(path, &self.record_types) {
            Ok(doc) => Some(doc.summary(DRAWING_SUMMARY_LINES, DRAWING_SUMMARY_ARCS)),
            Err(e) => {
                log::warn!("Drawing context unavailable: {}", e);
                None
            }
        }
    }

    fn on_command(&mut self, command: OperatorCommand) -> Flow {
        match command {
            OperatorCommand::Instruct(text) => self.dispatch(text),
            OperatorCommand::Apply => match self.session.apply() {
                Ok(report) => println!("{report}"),
                Err(e) => println!("Cannot apply: {e}"),
            },
            OperatorCommand::Return => match self.session.return_to_cad() {
                Ok(report) => {
                    if let Some(report) = report {
                        println!("{report}");
                    }
                    println!("Returned to Jw_cad.");
                    self.end_cycle();
                }
                Err(e) => println!("Cannot return: {e}"),
            },
            OperatorCommand::Reset => {
                self.session.reset();
                self.end_cycle();
                println!("Cycle abandoned.");
            }
            OperatorCommand::Status => self.print_status(),
            OperatorCommand::Help => println!("{HELP}"),
            OperatorCommand::Quit => return Flow::Exit,
        }
        Flow::Continue
    }

    fn end_cycle(&mut self) {
        self.selection = None;
        self.drawing_summary = None;
        self.history.clear();
        self.pending_request = None;
    }

    fn dispatch(&mut self, text: String) {
        if let Err(e) = self.session.submit_instruction() {
            println!("Cannot send: {e}");
            return;
        }
        self.history.push(ChatMessage::user(text));

        let screenshot = &self.session.paths().screenshot;
        let image = screenshot.exists().then(|| screenshot.clone());
        let request = CompletionRequest {
            system: prompt::system_prompt(
                self.selection.as_deref(),
                self.drawing_summary.as_deref(),
                image.is_some(),
            ),
            messages: self.history.clone(),
            image,
        };

        self.next_request += 1;
        let id = self.next_request;
        self.pending_request = Some(id);

        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();
        tokio::task::spawn_blocking(move || {
            let result = service.complete(&request);
            let msg = AppMsg::Completion {
                request: id,
                result,
            };
            if tx.blocking_send(msg).is_err() {
                log::debug!("Reply arrived after shutdown");
            }
        });
        println!("...");
    }

    fn on_reply(&mut self, reply: String) {
        println!("{reply}");
        self.history.push(ChatMessage::assistant(reply.clone()));
        match self.session.receive_response(&reply) {
            Ok(Some(descriptor)) => {
                println!("Transform ready: {}. :apply to write it.", descriptor.summary())
            }
            Ok(None) => println!("(no transform in the reply)"),
            Err(e) => log::warn!("Unexpected reply: {}", e),
        }
    }

    fn print_status(&self) {
        println!("State: {}", self.state());
        if let Some(doc) = self.session.document() {
            println!(
                "Selection: {} lines, {} arcs, {} texts",
                doc.lines().count(),
                doc.arcs().count(),
                doc.texts().count()
            );
        }
        if let Some(descriptor) = self.session.descriptor() {
            println!("Transform: {}", descriptor.summary());
        }
        println!("Working directory: {}", self.session.paths().work_dir.display());
    }
}

/// Run the assistant until `:quit`, end of input or Ctrl-C
pub fn run(options: AssistantOptions) -> Result<()> {
    let paths = options.paths.clone();
    std::fs::create_dir_all(&paths.work_dir)
        .with_context(|| format!("Failed to create {}", paths.work_dir.display()))?;

    if let Some(pid) = live_lock_owner(&paths) {
        if pid != std::process::id() {
            bail!("Another assistant is already running (PID {pid})");
        }
    }
    create_lock(&paths)?;
    cleanup_signal_files(&paths);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    let result = runtime.block_on(event_loop(options));

    remove_lock(&paths);
    log::info!("Assistant stopped");
    result
}

async fn event_loop(options: AssistantOptions) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(64);

    let ticker_tx = tx.clone();
    let interval = options.poll_interval;
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticks.tick().await;
            if ticker_tx.send(AppMsg::Tick).await.is_err() {
                break;
            }
        }
    });

    let signal_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted");
            let _ = signal_tx.send(AppMsg::Shutdown).await;
        }
    });

    spawn_operator_input(tx.clone());

    println!(
        "Watching {} (type :help for commands)",
        options.paths.work_dir.display()
    );
    let mut assistant = Assistant::new(options, tx);
    while let Some(msg) = rx.recv().await {
        if assistant.update(msg) == Flow::Exit {
            break;
        }
    }
    Ok(())
}

/// Forward stdin lines from a plain thread; end of input shuts down
fn spawn_operator_input(tx: mpsc::Sender<AppMsg>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if let Some(command) = OperatorCommand::parse(&line) {
                        if tx.blocking_send(AppMsg::Operator(command)).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    log::error!("Failed to read operator input: {}", e);
                    break;
                }
            }
        }
        let _ = tx.blocking_send(AppMsg::Shutdown);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::completion::EchoCompletion;
    use crate::protocol::read_done;
    use crate::transform::TransformKind;
    use std::time::SystemTime;

    fn assistant_in(dir: &std::path::Path) -> (Assistant, mpsc::Receiver<AppMsg>) {
        let (tx, rx) = mpsc::channel(8);
        let options = AssistantOptions {
            paths: MarkerPaths::in_dir(dir),
            poll_interval: Duration::from_millis(10),
            drawing: None,
            record_types: RecordTypes::default(),
            service: Arc::new(EchoCompletion),
        };
        (Assistant::new(options, tx), rx)
    }

    fn write_selection(path: &std::path::Path, text: &str) {
        std::fs::write(path, text).unwrap();
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(10))
            .unwrap();
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(OperatorCommand::parse("   "), None);
        assert_eq!(OperatorCommand::parse(":apply"), Some(OperatorCommand::Apply));
        assert_eq!(OperatorCommand::parse(" :return "), Some(OperatorCommand::Return));
        assert_eq!(OperatorCommand::parse(":q"), Some(OperatorCommand::Quit));
        assert_eq!(OperatorCommand::parse(":bogus"), Some(OperatorCommand::Help));
        assert_eq!(
            OperatorCommand::parse("flip the door"),
            Some(OperatorCommand::Instruct("flip the door".into()))
        );
    }

    #[tokio::test]
    async fn test_full_exchange_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assistant, mut rx) = assistant_in(dir.path());
        let paths = MarkerPaths::in_dir(dir.path());

        assert_eq!(assistant.update(AppMsg::Tick), Flow::Continue);
        assert_eq!(assistant.state(), CycleState::Idle);

        write_selection(&paths.exchange, "hq\n0 0 100 0\nci 500 500 800 90 180\n");
        assistant.update(AppMsg::Tick);
        assert_eq!(assistant.state(), CycleState::DataReady);

        assistant.update(AppMsg::Operator(OperatorCommand::Instruct(
            r#"{"type": "arc_flip_x", "circle_indices": [0]}"#.into(),
        )));
        assert_eq!(assistant.state(), CycleState::InstructionPending);
        let reply = rx.recv().await.unwrap();
        assistant.update(reply);
        assert_eq!(assistant.state(), CycleState::TransformReady);

        assistant.update(AppMsg::Operator(OperatorCommand::Apply));
        assert_eq!(
            std::fs::read_to_string(&paths.exchange).unwrap(),
            "0 0 100 0\nci 500 500 800 0 90\n"
        );

        assistant.update(AppMsg::Operator(OperatorCommand::Return));
        assert_eq!(assistant.state(), CycleState::Idle);
        assert!(read_done(&paths).is_some());
    }

    #[tokio::test]
    async fn test_failed_completion_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assistant, _rx) = assistant_in(dir.path());
        let paths = MarkerPaths::in_dir(dir.path());
        write_selection(&paths.exchange, "hq\n0 0 1 0\n");
        assistant.update(AppMsg::Tick);

        assistant.update(AppMsg::Operator(OperatorCommand::Instruct("x".into())));
        let request = assistant.pending_request.unwrap();
        assistant.update(AppMsg::Completion {
            request,
            result: Err(anyhow::anyhow!("offline")),
        });
        assert_eq!(assistant.state(), CycleState::DataReady);
        assert!(assistant.history.is_empty());
    }

    #[tokio::test]
    async fn test_reply_from_abandoned_cycle_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assistant, mut rx) = assistant_in(dir.path());
        let paths = MarkerPaths::in_dir(dir.path());
        write_selection(&paths.exchange, "hq\n0 0 100 0\n");
        assistant.update(AppMsg::Tick);

        assistant.update(AppMsg::Operator(OperatorCommand::Instruct(
            r#"{"type": "mirror_y", "axis_y": 0}"#.into(),
        )));
        let stale = rx.recv().await.unwrap();
        assistant.update(AppMsg::Operator(OperatorCommand::Reset));
        assert_eq!(assistant.state(), CycleState::Idle);

        let signal = r#"{"message": "again", "timestamp": 1.0, "jwc_temp": "x"}"#;
        write_selection(&paths.signal, signal);
        assistant.update(AppMsg::Tick);
        assert_eq!(assistant.state(), CycleState::DataReady);
        assistant.update(AppMsg::Operator(OperatorCommand::Instruct(
            r#"{"type": "mirror_x", "axis_x": 50}"#.into(),
        )));

        assistant.update(stale);
        assert_eq!(assistant.state(), CycleState::InstructionPending);
        assert_eq!(assistant.history.len(), 1);

        let fresh = rx.recv().await.unwrap();
        assistant.update(fresh);
        assert_eq!(assistant.state(), CycleState::TransformReady);
        assert_eq!(
            assistant.session.descriptor().unwrap().kind,
            TransformKind::MirrorX
        );

        // a failure for an old id must not touch the current history
        assistant.update(AppMsg::Completion {
            request: 1,
            result: Err(anyhow::anyhow!("late")),
        });
        assert_eq!(assistant.history.len(), 2);
        assert_eq!(assistant.state(), CycleState::TransformReady);
    }

    #[tokio::test]
    async fn test_trigger_during_cycle_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assistant, _rx) = assistant_in(dir.path());
        let paths = MarkerPaths::in_dir(dir.path());
        write_selection(&paths.exchange, "hq\n0 0 1 0\n");
        assistant.update(AppMsg::Tick);
        assistant.update(AppMsg::Operator(OperatorCommand::Apply));

        write_selection(&paths.signal, "{}");
        assistant.update(AppMsg::Tick);
        assert_eq!(assistant.state(), CycleState::Applied);

        assistant.update(AppMsg::Operator(OperatorCommand::Reset));
        assert_eq!(assistant.state(), CycleState::Idle);
    }

    #[tokio::test]
    async fn test_quit_and_shutdown_exit() {
        let dir = tempfile::tempdir().unwrap();
        let (mut assistant, _rx) = assistant_in(dir.path());
        assert_eq!(
            assistant.update(AppMsg::Operator(OperatorCommand::Quit)),
            Flow::Exit
        );
        assert_eq!(assistant.update(AppMsg::Shutdown), Flow::Exit);
    }

    #[cfg(unix)]
    #[test]
    fn test_second_instance_refused() {
        let dir = tempfile::tempdir().unwrap();
        let paths = MarkerPaths::in_dir(dir.path());
        let mut other = std::process::Command::new("sleep").arg("5").spawn().unwrap();
        std::fs::write(&paths.lock, other.id().to_string()).unwrap();

        let options = AssistantOptions {
            paths: paths.clone(),
            poll_interval: Duration::from_millis(10),
            drawing: None,
            record_types: RecordTypes::default(),
            service: Arc::new(EchoCompletion),
        };
        let err = run(options).unwrap_err();
        assert!(err.to_string().contains("already running"));
        // the live lock is left alone
        assert!(paths.lock.exists());

        other.kill().unwrap();
        other.wait().unwrap();
    }
}
