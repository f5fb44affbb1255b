//! Session registry
//!
//! Maps project ids to running sessions. Sessions are created lazily on the
//! first message for a project, reused for later ones, and removed when
//! stopped or when their process exits.

use super::actor::{self, SessionMap, SessionSetup};
use super::{ProjectId, SessionEvent, SessionTimings};
use crate::config::AppConfig;
use crate::error::{SessionError, SessionResult};
use crate::infrastructure::spawn::{PipeSpawner, PtySpawner, Spawner};
use crate::launcher::{LaunchParams, Launcher};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Snapshot of a running session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub project_id: ProjectId,
    pub session_id: Uuid,
    pub agent_id: String,
    pub project_path: PathBuf,
    pub pid: Option<u32>,
    pub busy: bool,
    pub created_at: DateTime<Utc>,
}

/// Owner of all sessions
///
/// Dropping the registry stops every session it owns.
pub struct SessionRegistry {
    sessions: Arc<SessionMap>,
    /// Projects that had a session during this run
    started: Mutex<HashSet<ProjectId>>,
    spawner: Arc<dyn Spawner>,
    launcher: Launcher,
    timings: SessionTimings,
    resume_previous: bool,
    max_sessions: usize,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionRegistry {
    /// Create a registry and the receiver for its events
    pub fn new(
        launcher: Launcher,
        spawner: Arc<dyn Spawner>,
        timings: SessionTimings,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let registry = Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            started: Mutex::new(HashSet::new()),
            spawner,
            launcher,
            timings,
            resume_previous: true,
            max_sessions: usize::MAX,
            events,
        };
        (registry, receiver)
    }

    /// Registry using the spawner, launcher and timings from `config`
    pub fn from_config(config: &AppConfig) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let spawner: Arc<dyn Spawner> = if config.cli.use_pty {
            Arc::new(PtySpawner::new(config.cli.cols, config.cli.rows))
        } else {
            Arc::new(PipeSpawner)
        };
        let (registry, receiver) = Self::new(
            Launcher::new(config),
            spawner,
            SessionTimings::from(&config.session),
        );
        let registry = registry
            .with_resume_previous(config.session.resume_previous)
            .with_max_sessions(config.session.max_sessions);
        (registry, receiver)
    }

    /// Start sessions with `--resume` when the project already had one
    pub fn with_resume_previous(mut self, resume_previous: bool) -> Self {
        self.resume_previous = resume_previous;
        self
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Send `message` to the project's session, starting it if needed.
    ///
    /// The outcome arrives as events: optional `Output`, optional `Error`,
    /// then exactly one `Done`. A launch failure is reported the same way.
    /// Only a submission while a response is still in flight is rejected
    /// here, with [`SessionError::ConcurrentSubmission`] and no events.
    #[instrument(skip(self, project_path, message), fields(chars = message.chars().count()))]
    pub async fn initiate(
        &self,
        project_id: &str,
        project_path: impl Into<PathBuf>,
        agent_id: &str,
        message: &str,
    ) -> SessionResult<()> {
        let launch = LaunchParams::new(project_path, agent_id);
        let mut sessions = self.sessions.lock().await;

        let submitted = match self.ensure_session(&mut sessions, project_id, &launch).await {
            Ok(()) => sessions
                .get(project_id)
                .ok_or_else(|| SessionError::NotFound {
                    project_id: project_id.to_string(),
                })
                .and_then(|handle| handle.try_submit(project_id, message)),
            Err(e) => Err(e),
        };
        drop(sessions);

        match submitted {
            Err(e @ SessionError::ConcurrentSubmission { .. }) => {
                debug!("Rejected concurrent submission");
                Err(e)
            }
            Err(e) => {
                self.report_failure(project_id, &e);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// Return the project's session, starting it if needed
    pub async fn get_or_create(
        &self,
        project_id: &str,
        launch: &LaunchParams,
    ) -> SessionResult<SessionInfo> {
        let mut sessions = self.sessions.lock().await;
        self.ensure_session(&mut sessions, project_id, launch).await?;
        sessions
            .get(project_id)
            .map(|handle| info_of(project_id, handle))
            .ok_or_else(|| SessionError::NotFound {
                project_id: project_id.to_string(),
            })
    }

    /// Start the project's session ahead of the first message.
    ///
    /// The CLI's startup output is discarded; only later turns produce
    /// events.
    pub async fn warm(&self, project_id: &str, launch: &LaunchParams) -> SessionResult<()> {
        self.get_or_create(project_id, launch).await.map(|_| ())
    }

    /// Send `message` to an existing session
    pub async fn submit(&self, project_id: &str, message: &str) -> SessionResult<()> {
        let sessions = self.sessions.lock().await;
        let handle = sessions.get(project_id).ok_or_else(|| SessionError::NotFound {
            project_id: project_id.to_string(),
        })?;
        handle.try_submit(project_id, message)
    }

    /// Stop one session, or all of them with `None`
    pub async fn stop(&self, project_id: Option<&str>) {
        let mut sessions = self.sessions.lock().await;
        match project_id {
            Some(project_id) => {
                if let Some(handle) = sessions.remove(project_id) {
                    info!(project_id, "Stopping session");
                    handle.stop();
                }
            }
            None => {
                info!(count = sessions.len(), "Stopping all sessions");
                for (_, handle) in sessions.drain() {
                    handle.stop();
                }
            }
        }
    }

    /// Snapshots of all running sessions, ordered by project id
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.lock().await;
        let mut infos: Vec<SessionInfo> = sessions
            .iter()
            .map(|(project_id, handle)| info_of(project_id, handle))
            .collect();
        infos.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        infos
    }

    pub async fn is_busy(&self, project_id: &str) -> bool {
        let sessions = self.sessions.lock().await;
        sessions.get(project_id).is_some_and(|handle| handle.is_busy())
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    async fn ensure_session(
        &self,
        sessions: &mut HashMap<ProjectId, actor::SessionHandle>,
        project_id: &str,
        launch: &LaunchParams,
    ) -> SessionResult<()> {
        if let Some(handle) = sessions.get(project_id) {
            if handle.is_closed() {
                debug!(project_id, "Dropping ended session");
                sessions.remove(project_id);
            } else if handle.agent_id != launch.agent_id && !handle.is_busy() {
                info!(
                    project_id,
                    from = %handle.agent_id,
                    to = %launch.agent_id,
                    "Agent changed, restarting session"
                );
                if let Some(old) = sessions.remove(project_id) {
                    old.stop();
                }
            } else {
                return Ok(());
            }
        }

        if sessions.len() >= self.max_sessions {
            warn!(max = self.max_sessions, "Session limit reached");
            return Err(SessionError::LimitReached {
                max: self.max_sessions,
            });
        }

        let mut started = self.started.lock().await;
        let resume = launch.resume || (self.resume_previous && started.contains(project_id));
        let spec = self.launcher.interactive(&launch.clone().resume(resume));
        debug!(project_id, program = %spec.program, args = ?spec.args, "Launching session");

        let process = self.spawner.spawn(&spec)?;
        started.insert(project_id.to_string());

        let handle = actor::start(
            SessionSetup {
                project_id: project_id.to_string(),
                agent_id: launch.agent_id.clone(),
                project_path: launch.project_path.clone(),
                timings: self.timings,
                events: self.events.clone(),
                sessions: Arc::downgrade(&self.sessions),
            },
            process,
        );
        info!(project_id, session_id = %handle.id, pid = ?handle.pid, resume, "Session created");
        sessions.insert(project_id.to_string(), handle);
        Ok(())
    }

    fn report_failure(&self, project_id: &str, error: &SessionError) {
        warn!(project_id, error = %error, "Message could not be delivered");
        let _ = self.events.send(SessionEvent::Error {
            project_id: project_id.to_string(),
            message: error.to_string(),
        });
        let _ = self.events.send(SessionEvent::Done {
            project_id: project_id.to_string(),
        });
    }
}

fn info_of(project_id: &str, handle: &actor::SessionHandle) -> SessionInfo {
    SessionInfo {
        project_id: project_id.to_string(),
        session_id: handle.id,
        agent_id: handle.agent_id.clone(),
        project_path: handle.project_path.clone(),
        pid: handle.pid,
        busy: handle.is_busy(),
        created_at: handle.created_at,
    }
}
