// ─── Process Supervisor ───
// Owns one spawned game process: merged stdout/stderr as a line stream,
// plus an idempotent termination handle usable from the cancellation path.

use std::io::{BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{mpsc, Arc, Mutex};

use tracing::{debug, info, warn};

use crate::error::{LauncherError, LauncherResult};

type SharedChild = Arc<Mutex<Option<Child>>>;

/// Clonable handle that can only request termination; it never exposes the
/// child itself.
#[derive(Clone)]
pub struct ProcessKiller {
    child: SharedChild,
}

impl ProcessKiller {
    /// Request termination. Idempotent and safe to call concurrently with an
    /// in-progress read: killing the child closes its pipes, which unblocks
    /// any pending line read.
    pub fn terminate(&self) {
        let mut guard = lock(&self.child);
        if let Some(child) = guard.as_mut() {
            if let Err(err) = child.kill() {
                debug!("Terminate request ignored (process likely exited): {err}");
            } else {
                info!("Termination requested for game process");
            }
        }
    }
}

/// Supervises exactly one spawned process at a time.
#[derive(Debug)]
pub struct ProcessSupervisor {
    child: SharedChild,
    lines: Receiver<String>,
}

impl ProcessSupervisor {
    /// Spawn `argv` with stdout and stderr captured and merged into a single
    /// line-buffered stream.
    pub fn spawn(argv: &[String]) -> LauncherResult<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| LauncherError::Spawn("empty command line".into()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LauncherError::Spawn(e.to_string()))?;

        info!("Spawned game process (pid {})", child.id());

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, tx);
        }

        Ok(Self {
            child: Arc::new(Mutex::new(Some(child))),
            lines: rx,
        })
    }

    pub fn killer(&self) -> ProcessKiller {
        ProcessKiller {
            child: self.child.clone(),
        }
    }

    /// Blocking iterator over the combined output, one line at a time.
    /// Finite: ends once the process has exited and both pipes are drained.
    /// Not restartable.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.lines.iter()
    }

    /// Reap the process after its output is drained. The exit status is
    /// logged but deliberately not surfaced as an error: every exit is
    /// reported as the plain fact that the process closed.
    pub fn wait(&self) -> Option<ExitStatus> {
        let child = lock(&self.child).take();
        let mut child = child?;
        match child.wait() {
            Ok(status) => {
                info!("Game process closed ({status})");
                Some(status)
            }
            Err(err) => {
                warn!("Failed to reap game process: {err}");
                None
            }
        }
    }
}

fn spawn_line_reader<R: Read + Send + 'static>(pipe: R, tx: Sender<String>) {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match std::io::BufRead::read_until(&mut reader, b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    // Non-UTF-8 bytes from the child are replaced, not dropped.
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\r', '\n']).to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    debug!("Pipe read ended: {err}");
                    break;
                }
            }
        }
    });
}

fn lock(child: &SharedChild) -> std::sync::MutexGuard<'_, Option<Child>> {
    match child.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
