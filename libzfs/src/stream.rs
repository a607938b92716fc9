//! Streaming adapter.
//!
//! Some commands write their result to a file descriptor named in the input
//! list and only return once everything is written. [`Zfs::start_stream`]
//! turns such a command into a [`SendStream`]:
//!
//! ```text
//!  caller ──start_stream──► pipe2(O_CLOEXEC)
//!                           worker thread: execute(cmd, fd = write end)
//!                             ├─ outcome ──► one-slot channel
//!                             └─ drop write end (after the outcome)
//!  caller ◄── peek ≥ 1 byte ── read end
//! ```
//!
//! The peek makes early failures (bad name, missing snapshot) come back from
//! `start_stream` itself instead of as a truncated stream. Because the
//! outcome is always deposited before the write end closes, EOF on the read
//! end means the outcome is ready.

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use libnvlist::Record;
use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use tracing::{debug, warn};

use crate::cmd::ZfsCmd;
use crate::error::{StreamEnd, ZfsError};
use crate::ioc::Ioc;
use crate::transport::{Request, Zfs};

/// An input record with a slot for the output descriptor.
pub trait FdSlot: Record {
    fn set_fd(&mut self, fd: RawFd);
}

type Outcome = Result<(), ZfsError>;

const PEEK_SIZE: usize = 4096;

impl Zfs {
    /// Start a streaming command and wait for its first byte.
    ///
    /// Fails with the command's own error when it ends before producing
    /// any output. A command that succeeds without output yields a stream
    /// that is already at EOF.
    pub fn start_stream<I: FdSlot>(
        &self,
        ioc: Ioc,
        name: &str,
        mut cmd: Box<ZfsCmd>,
        mut input: I,
    ) -> Result<SendStream, ZfsError> {
        let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC)?;
        input.set_fd(write_end.as_raw_fd());
        let list = input.to_nvlist()?;
        let name = name.to_owned();

        let (tx, rx) = mpsc::sync_channel::<Outcome>(1);
        let zfs = self.clone();
        let worker = thread::Builder::new()
            .name(format!("zfs-{}", ioc.name().to_ascii_lowercase()))
            .spawn(move || {
                let req = Request::new(ioc, &name).with_input(list);
                let outcome = catch_unwind(AssertUnwindSafe(|| zfs.execute(&req, &mut cmd)))
                    .unwrap_or_else(|_| Err(ZfsError::io("stream worker panicked")));
                // Receiver gone means the stream was dropped; nobody to tell.
                let _ = tx.send(outcome);
                drop(write_end);
            })
            .map_err(ZfsError::io)?;

        debug!(ioc = %ioc, "stream started");
        let mut stream = SendStream {
            reader: Some(File::from(read_end)),
            peeked: Vec::new(),
            pos: 0,
            outcome: Some(rx),
            worker: Some(worker),
            end: None,
        };
        stream.peek()?;
        Ok(stream)
    }
}

/// Output of a streaming command, read incrementally.
///
/// Reading past the last byte reports the command's outcome: `Ok(0)` on
/// success, otherwise an error wrapping [`ZfsError::StreamTerminated`].
/// The outcome is collected once and repeated on every later read.
#[derive(Debug)]
pub struct SendStream {
    reader: Option<File>,
    peeked: Vec<u8>,
    pos: usize,
    outcome: Option<Receiver<Outcome>>,
    worker: Option<JoinHandle<()>>,
    end: Option<StreamEnd>,
}

impl SendStream {
    /// Read until at least one byte is buffered or the command ends.
    fn peek(&mut self) -> Result<(), ZfsError> {
        let mut buf = vec![0u8; PEEK_SIZE];
        loop {
            let Some(reader) = self.reader.as_mut() else {
                return Ok(());
            };
            match reader.read(&mut buf) {
                Ok(0) => {
                    return match self.finish() {
                        StreamEnd::Completed => Ok(()),
                        StreamEnd::Failed(e) => Err(*e),
                        StreamEnd::Cancelled => Err(ZfsError::StreamTerminated(StreamEnd::Cancelled)),
                    };
                }
                Ok(n) => {
                    buf.truncate(n);
                    self.peeked = buf;
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Close our end so the worker stops, then reap it.
                    self.finish();
                    return Err(ZfsError::io(e));
                }
            }
        }
    }

    /// Collect the worker's outcome after EOF.
    fn finish(&mut self) -> StreamEnd {
        self.reader = None;
        let end = match self.collect() {
            Ok(()) => StreamEnd::Completed,
            Err(e) => StreamEnd::Failed(Box::new(e)),
        };
        debug!(outcome = %end, "stream finished");
        self.end = Some(end.clone());
        end
    }

    fn collect(&mut self) -> Outcome {
        let outcome = match self.outcome.take() {
            Some(rx) => rx
                .recv()
                .unwrap_or_else(|_| Err(ZfsError::io("stream worker exited without an outcome"))),
            None => Err(ZfsError::io("stream outcome already collected")),
        };
        join(self.worker.take());
        outcome
    }

    /// Terminal outcome, once the stream has been read to the end.
    pub fn termination(&self) -> Option<&StreamEnd> {
        self.end.as_ref()
    }

    /// Stop reading. The command sees a broken pipe on its next write;
    /// [`Abandoned::wait`] reports how it ended.
    pub fn close(mut self) -> Abandoned {
        drop(self.reader.take());
        Abandoned {
            outcome: self.outcome.take(),
            worker: self.worker.take(),
            end: self.end.take(),
        }
    }
}

impl Read for SendStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos < self.peeked.len() {
            let n = buf.len().min(self.peeked.len() - self.pos);
            buf[..n].copy_from_slice(&self.peeked[self.pos..self.pos + n]);
            self.pos += n;
            if self.pos == self.peeked.len() {
                self.peeked = Vec::new();
                self.pos = 0;
            }
            return Ok(n);
        }

        let end = match self.end.clone() {
            Some(end) => end,
            None => {
                let Some(reader) = self.reader.as_mut() else {
                    return Err(io::Error::other("stream already closed"));
                };
                match reader.read(buf)? {
                    0 => self.finish(),
                    n => return Ok(n),
                }
            }
        };
        match end {
            StreamEnd::Completed => Ok(0),
            other => Err(ZfsError::StreamTerminated(other).into()),
        }
    }
}

/// A stream whose read end has been closed.
#[derive(Debug)]
pub struct Abandoned {
    outcome: Option<Receiver<Outcome>>,
    worker: Option<JoinHandle<()>>,
    end: Option<StreamEnd>,
}

impl Abandoned {
    /// Wait for the command to return and classify how it ended.
    ///
    /// A broken pipe is the expected result of closing early and is
    /// reported as [`StreamEnd::Cancelled`].
    pub fn wait(mut self) -> StreamEnd {
        if let Some(end) = self.end.take() {
            return end;
        }
        let outcome = match self.outcome.take() {
            Some(rx) => rx
                .recv()
                .unwrap_or_else(|_| Err(ZfsError::io("stream worker exited without an outcome"))),
            None => Err(ZfsError::io("stream outcome already collected")),
        };
        join(self.worker.take());
        match outcome {
            Ok(()) => StreamEnd::Completed,
            Err(e) if e.kernel().is_some_and(|k| k.is_broken_pipe()) => {
                debug!("stream cancelled by reader");
                StreamEnd::Cancelled
            }
            Err(e) => StreamEnd::Failed(Box::new(e)),
        }
    }
}

fn join(worker: Option<JoinHandle<()>>) {
    if let Some(handle) = worker {
        if handle.join().is_err() {
            warn!("stream worker panicked outside the command");
        }
    }
}
