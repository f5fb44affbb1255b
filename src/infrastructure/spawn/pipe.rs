//! Pipe-based spawner (`tokio::process`)

use super::{ProcessControl, ProcessEvent, ProcessHandle, Spawner};
use crate::error::{SessionError, SessionResult};
use crate::launcher::CommandSpec;
use crate::terminal::StripNormalizer;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument};

/// Spawns the CLI with piped stdin/stdout/stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct PipeSpawner;

struct PipeControl {
    kill_tx: Option<oneshot::Sender<()>>,
}

impl ProcessControl for PipeControl {
    fn kill(&mut self) -> std::io::Result<()> {
        if let Some(kill_tx) = self.kill_tx.take() {
            // The waiter is gone once the process has exited
            let _ = kill_tx.send(());
        }
        Ok(())
    }
}

impl Spawner for PipeSpawner {
    #[instrument(skip_all, fields(program = %spec.program))]
    fn spawn(&self, spec: &CommandSpec) -> SessionResult<ProcessHandle> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            error!(error = %e, "Failed to spawn CLI");
            SessionError::LaunchFailure {
                reason: format!("{}: {}", spec.program, e),
            }
        })?;
        let pid = child.id();
        info!(pid = ?pid, "CLI process started");

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                while let Some(data) = input_rx.recv().await {
                    if let Err(e) = stdin.write_all(&data).await {
                        debug!(error = %e, "CLI stdin closed");
                        break;
                    }
                    if stdin.flush().await.is_err() {
                        break;
                    }
                }
            });
        }

        let readers: Vec<_> = [
            child.stdout.take().map(|out| tokio::spawn(pump(out, event_tx.clone()))),
            child.stderr.take().map(|err| tokio::spawn(pump(err, event_tx.clone()))),
        ]
        .into_iter()
        .flatten()
        .collect();

        tokio::spawn(async move {
            let waited = tokio::select! {
                status = child.wait() => Some(status),
                Ok(()) = kill_rx => None,
            };
            let status = match waited {
                Some(status) => status,
                None => {
                    debug!(pid = ?pid, "Killing CLI process");
                    let _ = child.start_kill();
                    child.wait().await
                }
            };

            // Drain remaining output before reporting the exit
            for reader in readers {
                let _ = reader.await;
            }

            let code = status.ok().and_then(|status| status.code());
            info!(pid = ?pid, code = ?code, "CLI process exited");
            let _ = event_tx.send(ProcessEvent::Exited { code });
        });

        Ok(ProcessHandle {
            pid,
            input: input_tx,
            events: event_rx,
            control: Box::new(PipeControl {
                kill_tx: Some(kill_tx),
            }),
            line_ending: "\n",
            normalizer: Box::new(StripNormalizer::new()),
        })
    }
}

async fn pump<R>(mut reader: R, tx: mpsc::UnboundedSender<ProcessEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(ProcessEvent::Output(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "CLI output stream error");
                break;
            }
        }
    }
}
