//! Session task
//!
//! Each session is a tokio task that owns its process handle, normalizer,
//! extractor and timers. It selects over registry commands, process events
//! and the nearest deadline, so output for one session is handled strictly
//! in arrival order and timers die with the task.

use super::extractor::{CompletionReason, ExtractorState, ResponseExtractor, TurnOutcome};
use super::{ProjectId, SessionEvent, SessionTimings};
use crate::error::{SessionError, SessionResult};
use crate::infrastructure::spawn::{ProcessEvent, ProcessHandle};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Shared project → session map
pub(crate) type SessionMap = Mutex<HashMap<ProjectId, SessionHandle>>;

#[derive(Debug)]
pub(crate) enum SessionCommand {
    Submit(String),
    Stop,
}

/// Registry-side view of a running session
#[derive(Debug)]
pub(crate) struct SessionHandle {
    pub(crate) id: Uuid,
    pub(crate) agent_id: String,
    pub(crate) project_path: PathBuf,
    pub(crate) pid: Option<u32>,
    pub(crate) created_at: DateTime<Utc>,
    busy: Arc<AtomicBool>,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub(crate) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Whether the session task has ended
    pub(crate) fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Hand a message to the session, or reject it if a turn is in flight.
    pub(crate) fn try_submit(&self, project_id: &str, message: &str) -> SessionResult<()> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::ConcurrentSubmission {
                project_id: project_id.to_string(),
            });
        }

        if self
            .commands
            .send(SessionCommand::Submit(message.to_string()))
            .is_err()
        {
            self.busy.store(false, Ordering::SeqCst);
            return Err(SessionError::NotFound {
                project_id: project_id.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn stop(&self) {
        let _ = self.commands.send(SessionCommand::Stop);
    }
}

/// Everything a new session task needs
pub(crate) struct SessionSetup {
    pub(crate) project_id: ProjectId,
    pub(crate) agent_id: String,
    pub(crate) project_path: PathBuf,
    pub(crate) timings: SessionTimings,
    pub(crate) events: mpsc::UnboundedSender<SessionEvent>,
    pub(crate) sessions: Weak<SessionMap>,
}

/// Spawn the task driving `process` and return its registry handle
pub(crate) fn start(setup: SessionSetup, process: ProcessHandle) -> SessionHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let busy = Arc::new(AtomicBool::new(false));
    let id = Uuid::new_v4();

    let handle = SessionHandle {
        id,
        agent_id: setup.agent_id,
        project_path: setup.project_path,
        pid: process.pid,
        created_at: Utc::now(),
        busy: busy.clone(),
        commands: command_tx,
    };

    let span = tracing::info_span!("session", project_id = %setup.project_id, session_id = %id);
    let actor = SessionActor {
        project_id: setup.project_id,
        session_id: id,
        process,
        commands: command_rx,
        extractor: ResponseExtractor::new(),
        timings: setup.timings,
        first_turn: true,
        busy,
        events: setup.events,
        sessions: setup.sessions,
        start_deadline: None,
        idle_deadline: None,
    };
    tokio::spawn(actor.run().instrument(span));

    handle
}

struct SessionActor {
    project_id: ProjectId,
    session_id: Uuid,
    process: ProcessHandle,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    extractor: ResponseExtractor,
    timings: SessionTimings,
    first_turn: bool,
    busy: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<SessionEvent>,
    sessions: Weak<SessionMap>,
    /// Deadline for the first content line, with the configured wait in seconds
    start_deadline: Option<(Instant, u64)>,
    idle_deadline: Option<Instant>,
}

impl SessionActor {
    async fn run(mut self) {
        info!(pid = ?self.process.pid, "Session started");

        loop {
            let deadline = self.next_deadline();
            let timer = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;

                // Output that arrived before a submission belongs to the idle period
                event = self.process.events.recv() => match event {
                    Some(ProcessEvent::Output(bytes)) => self.on_output(&bytes),
                    Some(ProcessEvent::Exited { code }) => {
                        self.on_exit(code).await;
                        return;
                    }
                    None => {
                        self.on_exit(None).await;
                        return;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Submit(message)) => self.submit(message),
                    Some(SessionCommand::Stop) => {
                        self.stop();
                        return;
                    }
                    None => {
                        debug!("Registry dropped, stopping session");
                        self.stop();
                        return;
                    }
                },
                () = timer => self.on_timer(),
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.start_deadline.map(|(at, _)| at), self.idle_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn submit(&mut self, message: String) {
        if !self.extractor.begin(&message) {
            warn!(state = self.extractor.state().as_str(), "Submission while a turn is in flight");
            return;
        }

        let timeout = if self.first_turn {
            self.timings.first_response_timeout
        } else {
            self.timings.response_timeout
        };
        self.first_turn = false;
        self.start_deadline = Some((Instant::now() + timeout, timeout.as_secs()));
        self.idle_deadline = None;

        debug!(chars = message.chars().count(), "Submitting message");
        let mut payload = message.into_bytes();
        payload.extend_from_slice(self.process.line_ending.as_bytes());
        if self.process.input.send(payload).is_err() {
            // The exit event finalizes the turn
            warn!("{}", SessionError::InputClosed);
        }
    }

    fn on_output(&mut self, bytes: &[u8]) {
        let text = self.process.normalizer.feed(bytes);
        if !self.extractor.state().is_busy() {
            return;
        }

        self.idle_deadline = Some(Instant::now() + self.timings.idle_flush);
        if text.is_empty() {
            return;
        }

        if let Some(outcome) = self.extractor.feed(&text) {
            self.emit(outcome);
        } else if self.extractor.state() == ExtractorState::Streaming {
            self.start_deadline = None;
        }
    }

    fn on_timer(&mut self) {
        let now = Instant::now();

        if self.idle_deadline.is_some_and(|at| at <= now) {
            self.idle_deadline = None;
            let rest = self.process.normalizer.flush();
            let outcome = self
                .extractor
                .feed(&rest)
                .or_else(|| self.extractor.finish(CompletionReason::IdleFlush));
            if let Some(outcome) = outcome {
                self.emit(outcome);
                return;
            }
            if self.extractor.state() == ExtractorState::Streaming {
                self.start_deadline = None;
            }
        }

        if let Some((at, waited_secs)) = self.start_deadline {
            if at <= now {
                self.start_deadline = None;
                if let Some(outcome) = self.extractor.start_timeout(waited_secs) {
                    self.emit(outcome);
                }
            }
        }
    }

    /// Finalize whatever is in flight with the given exit status
    fn finalize(&mut self, code: Option<i32>) -> bool {
        let rest = self.process.normalizer.flush();
        let outcome = self
            .extractor
            .feed(&rest)
            .or_else(|| self.extractor.finish(CompletionReason::ProcessExit { code }));
        match outcome {
            Some(outcome) => {
                self.emit(outcome);
                true
            }
            None => false,
        }
    }

    async fn on_exit(&mut self, code: Option<i32>) {
        info!(code = ?code, "CLI process exited");
        deregister(self.sessions.clone(), &self.project_id, self.session_id).await;

        if !self.finalize(code) && code.is_some_and(|code| code != 0) {
            warn!(code = ?code, "CLI exited abnormally with no message in flight");
        }
        self.reject_pending();
    }

    fn stop(&mut self) {
        info!("Stopping session");
        if let Err(e) = self.process.control.kill() {
            warn!(error = %e, "Failed to kill CLI process");
        }
        self.finalize(None);
        self.reject_pending();
    }

    /// Answer submissions that were queued after the session ended
    fn reject_pending(&mut self) {
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            if let SessionCommand::Submit(_) = command {
                self.busy.store(false, Ordering::SeqCst);
                self.send(SessionEvent::Error {
                    project_id: self.project_id.clone(),
                    message: SessionError::InputClosed.to_string(),
                });
                self.send(SessionEvent::Done {
                    project_id: self.project_id.clone(),
                });
            }
        }
    }

    fn emit(&mut self, outcome: TurnOutcome) {
        self.start_deadline = None;
        self.idle_deadline = None;
        // Cleared before `Done` so the host can submit again right away
        self.busy.store(false, Ordering::SeqCst);

        debug!(reason = ?outcome.reason, "Turn finished");
        let project_id = self.project_id.clone();
        if let Some(text) = outcome.response {
            self.send(SessionEvent::Output {
                project_id: project_id.clone(),
                text,
            });
        }
        if let Some(failure) = outcome.failure {
            let error = failure.into_error();
            warn!(error = %error, "Turn failed");
            self.send(SessionEvent::Error {
                project_id: project_id.clone(),
                message: error.to_string(),
            });
        }
        self.send(SessionEvent::Done { project_id });
    }

    fn send(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

/// Remove a session from the registry unless it was already replaced
async fn deregister(sessions: Weak<SessionMap>, project_id: &str, session_id: Uuid) {
    let Some(sessions) = sessions.upgrade() else {
        return;
    };
    let mut sessions = sessions.lock().await;
    if sessions
        .get(project_id)
        .is_some_and(|handle| handle.id == session_id)
    {
        sessions.remove(project_id);
        debug!("Session removed from registry");
    }
}
