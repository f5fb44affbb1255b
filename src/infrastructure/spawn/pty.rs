//! Pseudo-terminal spawner (`portable-pty`)
//!
//! Interactive CLIs that refuse to run without a terminal are started on a
//! PTY. Reading, writing and waiting are blocking calls and run on dedicated
//! threads that forward into tokio channels.

use super::{ProcessControl, ProcessEvent, ProcessHandle, Spawner};
use crate::error::{SessionError, SessionResult};
use crate::launcher::CommandSpec;
use crate::terminal::TtyLineRenderer;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, PtySize};
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

/// Spawns the CLI on a pseudo-terminal of a fixed size
#[derive(Debug, Clone, Copy)]
pub struct PtySpawner {
    pub cols: u16,
    pub rows: u16,
}

impl Default for PtySpawner {
    fn default() -> Self {
        Self { cols: 120, rows: 40 }
    }
}

impl PtySpawner {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

struct PtyControl {
    killer: Box<dyn ChildKiller + Send + Sync>,
}

impl ProcessControl for PtyControl {
    fn kill(&mut self) -> std::io::Result<()> {
        self.killer.kill()
    }
}

fn launch_failure(what: &str, e: impl std::fmt::Display) -> SessionError {
    error!(error = %e, "{}", what);
    SessionError::LaunchFailure {
        reason: format!("{what}: {e}"),
    }
}

impl Spawner for PtySpawner {
    #[instrument(skip_all, fields(program = %spec.program, rows = self.rows, cols = self.cols))]
    fn spawn(&self, spec: &CommandSpec) -> SessionResult<ProcessHandle> {
        let pty_system = native_pty_system();
        let size = PtySize {
            rows: self.rows,
            cols: self.cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system
            .openpty(size)
            .map_err(|e| launch_failure("Failed to open PTY", e))?;

        let mut cmd = CommandBuilder::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(cwd) = &spec.cwd {
            cmd.cwd(cwd);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| launch_failure("Failed to spawn CLI", e))?;
        let pid = child.process_id();
        info!(pid = ?pid, "CLI process started on PTY");

        let killer = child.clone_killer();
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| launch_failure("Failed to clone PTY reader", e))?;
        let mut writer = pair
            .master
            .take_writer()
            .map_err(|e| launch_failure("Failed to take PTY writer", e))?;

        drop(pair.slave);
        let master = pair.master;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let output_tx = event_tx.clone();
        let reader_thread = thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if output_tx.send(ProcessEvent::Output(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(10));
                    }
                    // EIO once the slave side is closed
                    Err(_) => break,
                }
            }
        });

        thread::spawn(move || {
            while let Some(data) = input_rx.blocking_recv() {
                if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
                    debug!(error = %e, "PTY input closed");
                    break;
                }
            }
        });

        thread::spawn(move || {
            let status = child.wait();
            let _ = reader_thread.join();
            drop(master);

            let code = status.ok().map(|status| status.exit_code() as i32);
            info!(pid = ?pid, code = ?code, "CLI process exited");
            let _ = event_tx.send(ProcessEvent::Exited { code });
        });

        Ok(ProcessHandle {
            pid,
            input: input_tx,
            events: event_rx,
            control: Box::new(PtyControl { killer }),
            line_ending: "\r",
            normalizer: Box::new(TtyLineRenderer::new()),
        })
    }
}
