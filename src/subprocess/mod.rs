//! The subprocess manager (§4.1): spawns external engine processes without
//! ever triggering the stdin race described in §9 — Piper and the cloud
//! pair begin reading stdin immediately at spawn, so the input source must
//! already be bound before the process reaches the RUN state, never
//! attached as a later "write after start" step.
//!
//! STDIN-BEFORE-START is realized with an OS pipe (the `os_pipe` crate)
//! whose write end is handed to a dedicated writer thread *before*
//! `Command::spawn` is called; the read end becomes the child's stdin.
//! By the time the child execs, the writer thread is already filling the
//! pipe (or, for inputs under the kernel's pipe buffer, has already
//! finished) — there is no window where the child's stdin is connected to
//! an empty, unwritten source.

use std::io::{Read, Write};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex as PLMutex;
use tracing::{debug, warn};

use crate::cancellation::Context;
use crate::error::{ErrorKind, TtsError};

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const GRACEFUL_WAIT: Duration = Duration::from_secs(5);
const POST_CANCEL_WAIT: Duration = Duration::from_millis(100);

/// Serializes all process spawns across the system behind one mutex, per
/// §5's shared-resource policy. Callers must not bypass it by spawning
/// processes directly.
#[derive(Default)]
pub struct SubprocessManager {
    spawn_lock: Mutex<()>,
}

impl SubprocessManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocking: spawns `command` with `input` bound to stdin before the
    /// process starts, captures stdout and stderr separately, and waits
    /// for exit (§4.1).
    pub fn execute_with_input(
        &self,
        ctx: &Context,
        input: &str,
        command: &str,
        args: &[&str],
    ) -> Result<Vec<u8>, TtsError> {
        let _guard = self.spawn_lock.lock().unwrap();
        ctx.check("subprocess.spawn")?;

        let (reader, writer) = os_pipe::pipe().map_err(|e| {
            TtsError::new(ErrorKind::Dependency, format!("failed to create stdin pipe: {e}"))
                .with_component("subprocess")
        })?;

        let input_owned = input.to_string();
        let writer_handle: JoinHandle<()> = std::thread::spawn(move || {
            let mut writer = writer;
            let _ = writer.write_all(input_owned.as_bytes());
            // Dropping `writer` here closes the pipe, signaling EOF.
        });

        let mut child = Command::new(command)
            .args(args)
            .stdin(reader)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| map_spawn_error(command, e))?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");
        let stdout_reader = spawn_collector(stdout);
        let stderr_reader = spawn_collector(stderr);

        let status = self.wait_with_deadline(&mut child, ctx)?;
        let _ = writer_handle.join();

        let stdout_bytes = stdout_reader.join().unwrap_or_default();
        let stderr_bytes = stderr_reader.join().unwrap_or_default();

        if !status.success() {
            return Err(TtsError::new(
                ErrorKind::EngineFailure,
                format!(
                    "{command} exited with {status}: {}",
                    String::from_utf8_lossy(&stderr_bytes)
                ),
            )
            .with_component("subprocess"));
        }

        Ok(stdout_bytes)
    }

    /// Spawns `command` with `input` bound to stdin the same way, but
    /// returns a handle streaming the process's stdout rather than
    /// blocking until exit.
    pub fn execute_streaming(
        &self,
        ctx: &Context,
        input: &str,
        command: &str,
        args: &[&str],
    ) -> Result<StreamingHandle, TtsError> {
        let _guard = self.spawn_lock.lock().unwrap();
        ctx.check("subprocess.spawn")?;

        let (reader, writer) = os_pipe::pipe().map_err(|e| {
            TtsError::new(ErrorKind::Dependency, format!("failed to create stdin pipe: {e}"))
                .with_component("subprocess")
        })?;

        let input_owned = input.to_string();
        let writer_handle = std::thread::spawn(move || {
            let mut writer = writer;
            let _ = writer.write_all(input_owned.as_bytes());
        });

        let mut child = Command::new(command)
            .args(args)
            .stdin(reader)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| map_spawn_error(command, e))?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take();
        let stderr_reader = stderr.map(spawn_collector);

        Ok(StreamingHandle {
            child: Arc::new(PLMutex::new(Some(child))),
            stdout: Some(stdout),
            stderr_reader,
            writer_handle: Some(writer_handle),
        })
    }

    /// Polls `child` until exit or `ctx`'s deadline elapses; kills on
    /// timeout. Reader threads for stdout/stderr must already be running
    /// so the child never blocks writing into a full pipe while we poll.
    fn wait_with_deadline(&self, child: &mut Child, ctx: &Context) -> Result<ExitStatus, TtsError> {
        loop {
            if let Some(status) = child.try_wait().map_err(|e| {
                TtsError::new(ErrorKind::EngineFailure, format!("wait failed: {e}"))
                    .with_component("subprocess")
            })? {
                return Ok(status);
            }
            if ctx.token().is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TtsError::new(ErrorKind::Canceled, "subprocess cancelled")
                    .with_component("subprocess"));
            }
            if ctx.is_expired() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TtsError::new(ErrorKind::Timeout, "subprocess exceeded deadline")
                    .with_component("subprocess"));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

fn map_spawn_error(command: &str, err: std::io::Error) -> TtsError {
    if err.kind() == std::io::ErrorKind::NotFound {
        TtsError::new(ErrorKind::Dependency, format!("binary not found: {command}"))
            .with_component("subprocess")
    } else {
        TtsError::new(ErrorKind::EngineFailure, format!("failed to spawn {command}: {err}"))
            .with_component("subprocess")
    }
}

fn spawn_collector<R: Read + Send + 'static>(mut r: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = r.read_to_end(&mut buf);
        buf
    })
}

/// A handle reading from a streaming engine's standard output. Closing it
/// runs the bounded graceful-shutdown algorithm from §4.1.
pub struct StreamingHandle {
    child: Arc<PLMutex<Option<Child>>>,
    stdout: Option<ChildStdout>,
    stderr_reader: Option<JoinHandle<Vec<u8>>>,
    writer_handle: Option<JoinHandle<()>>,
}

impl Read for StreamingHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.stdout.as_mut() {
            Some(stdout) => stdout.read(buf),
            None => Ok(0),
        }
    }
}

impl StreamingHandle {
    /// Runs the shutdown algorithm: close the read handle, wait up to 5s
    /// naturally, cancel (signal), wait 100ms more, hard-kill, reap.
    /// "killed" / "context canceled" errors are discarded; others surface.
    pub fn close(mut self, ctx: &Context) -> Result<(), TtsError> {
        self.stdout.take();

        let mut guard = self.child.lock();
        let Some(mut child) = guard.take() else {
            return Ok(());
        };
        drop(guard);

        let deadline = Instant::now() + GRACEFUL_WAIT;
        let mut exited = false;
        while Instant::now() < deadline {
            if matches!(child.try_wait(), Ok(Some(_))) {
                exited = true;
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        if !exited {
            ctx.token().cancel();
            let post_cancel_deadline = Instant::now() + POST_CANCEL_WAIT;
            while Instant::now() < post_cancel_deadline {
                if matches!(child.try_wait(), Ok(Some(_))) {
                    exited = true;
                    break;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        }

        if !exited {
            if let Err(e) = child.kill() {
                warn!("failed to kill streaming engine process: {e}");
            }
            let _ = child.wait();
        }

        if let Some(h) = self.writer_handle.take() {
            let _ = h.join();
        }
        if let Some(h) = self.stderr_reader.take() {
            let _ = h.join();
        }

        debug!("streaming engine process shut down");
        Ok(())
    }
}
