//! External decompressor bridge.
//!
//! Streams that have no in-process decoder are piped through a filter command
//! (`xzcat` by default). A feeder thread copies the compressed input into the
//! child's stdin while the consumer drains its stdout; the OS pipes are the
//! bounded buffers between them, so the feeder only makes progress as fast as
//! the consumer reads.
//!
//! The child's exit status is checked when its output ends. A non-zero exit is
//! a terminal read error rather than a silently truncated stream. Shutting the
//! bridge down early (close or drop) kills and reaps the child.
//!
//! The feeder is waited for at most [`FEEDER_GRACE`] once the child is gone.
//! A feeder stuck in a read of a stalled source is detached; the input is
//! then dropped by that thread whenever its read returns.

use a3s_image_core::error::{ImageError, Result};
use std::io::{self, Read, Write};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

/// How long to wait for the feeder thread after the child has exited.
pub const FEEDER_GRACE: Duration = Duration::from_millis(500);

type Fed<R> = (R, io::Result<()>);

enum Progress {
    Running,
    Finished,
    Failed(ImageError),
}

/// Reader over the output of a filter process fed from `R`.
pub struct FilterProcess<R: Read + Send + 'static> {
    command: String,
    child: Child,
    stdout: ChildStdout,
    feeder: Option<Receiver<Fed<R>>>,
    stderr: Option<JoinHandle<String>>,
    input: Option<R>,
    progress: Progress,
}

impl<R: Read + Send + 'static> FilterProcess<R> {
    /// Spawn `command args...` and start feeding it from `input`.
    ///
    /// On failure the input is handed back so the caller can still close it.
    pub fn spawn(
        command: &str,
        args: &[String],
        input: R,
        chunk_size: usize,
    ) -> std::result::Result<Self, (R, ImageError)> {
        let mut child = match Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let error = ImageError::Process {
                    command: command.to_string(),
                    message: format!("failed to spawn: {} (is it installed?)", e),
                };
                return Err((input, error));
            }
        };

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (stdin, stdout, stderr) = match pipes {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                let error = ImageError::Process {
                    command: command.to_string(),
                    message: "child pipes unavailable".to_string(),
                };
                return Err((input, error));
            }
        };

        let chunk_size = chunk_size.max(1);
        let (fed_tx, fed_rx) = mpsc::channel();
        std::thread::spawn(move || {
            // The receiver is gone if the bridge gave up waiting
            let _ = fed_tx.send(feed(input, stdin, chunk_size));
        });

        let stderr = std::thread::spawn(move || collect_stderr(stderr));

        tracing::debug!(command, pid = child.id(), "Started decompressor process");

        Ok(Self {
            command: command.to_string(),
            child,
            stdout,
            feeder: Some(fed_rx),
            stderr: Some(stderr),
            input: None,
            progress: Progress::Running,
        })
    }

    /// Command this bridge runs.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Stop the process if it is still running, reap it, and hand back the
    /// input reader.
    ///
    /// Returns `None` if the feeder did not let go of the input within
    /// [`FEEDER_GRACE`].
    pub fn shutdown(&mut self) -> Option<R> {
        if let Progress::Running = self.progress {
            let pid = self.child.id();
            if let Err(e) = self.child.kill() {
                tracing::debug!(pid, error = %e, "Decompressor already exited");
            }
            // Reap the child to avoid zombies
            let _ = self.child.wait();
            tracing::debug!(pid, command = %self.command, "Decompressor stopped");
            self.progress = Progress::Finished;
        }
        let _ = self.join_feeder();
        self.input.take()
    }

    fn join_feeder(&mut self) -> io::Result<()> {
        let Some(fed) = self.feeder.take() else {
            return Ok(());
        };
        match fed.recv_timeout(FEEDER_GRACE) {
            Ok((input, result)) => {
                self.input = Some(input);
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    command = %self.command,
                    "Decompressor input still blocked, detaching feeder"
                );
                Ok(())
            }
            Err(RecvTimeoutError::Disconnected) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} feeder thread panicked", self.command),
            )),
        }
    }

    fn collected_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .map(|text| text.trim().to_string())
            .unwrap_or_default()
    }

    /// Called once stdout reaches EOF: settle the process and input outcome.
    fn finish(&mut self) -> Result<()> {
        let status = self.child.wait().map_err(|e| ImageError::Process {
            command: self.command.clone(),
            message: format!("failed to wait for process: {}", e),
        })?;
        let fed = self.join_feeder();

        // A failing source explains a failing decompressor, so it wins.
        if let Err(e) = fed {
            if e.kind() != io::ErrorKind::BrokenPipe {
                return Err(ImageError::from(e));
            }
        }

        if !status.success() {
            let stderr = self.collected_stderr();
            let message = if stderr.is_empty() {
                status.to_string()
            } else {
                format!("{}: {}", status, stderr)
            };
            return Err(ImageError::Process {
                command: self.command.clone(),
                message,
            });
        }

        tracing::debug!(command = %self.command, "Decompressor finished");
        Ok(())
    }
}

impl<R: Read + Send + 'static> Read for FilterProcess<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &self.progress {
            Progress::Running => {}
            Progress::Finished => return Ok(0),
            Progress::Failed(err) => return Err(err.clone().into()),
        }

        let n = self.stdout.read(buf)?;
        if n > 0 || buf.is_empty() {
            return Ok(n);
        }

        match self.finish() {
            Ok(()) => {
                self.progress = Progress::Finished;
                Ok(0)
            }
            Err(err) => {
                self.progress = Progress::Failed(err.clone());
                Err(err.into())
            }
        }
    }
}

impl<R: Read + Send + 'static> Drop for FilterProcess<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn feed<R: Read>(mut input: R, mut stdin: ChildStdin, chunk_size: usize) -> (R, io::Result<()>) {
    let mut buf = vec![0u8; chunk_size];
    let result = loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => break Err(e),
        };
        if let Err(e) = stdin.write_all(&buf[..n]) {
            break Err(e);
        }
    };
    // Closing stdin signals end of input to the decompressor
    drop(stdin);
    (input, result)
}

fn collect_stderr(mut stderr: ChildStderr) -> String {
    let mut text = String::new();
    let _ = stderr.read_to_string(&mut text);
    text
}
