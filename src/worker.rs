//! One OS process per adapter (§5: "Workers are separate OS processes, not
//! threads, because each owns a kernel socket that must not be multiplexed
//! and because scenario logic uses long blocking waits").
//!
//! Grounded on `bluetool.core.HCIWorker` (`self.sock`/`self.send`/
//! `self.recv`/`self.wait`/`self.signal`, used throughout
//! `test/whitelist.py` and `test/sniff.py`) and re-expressed as a real
//! `fork`+pipe process model: a `UnixStream` pair frames the typed
//! parent/child protocol, the way the rest of this crate already uses a
//! `UnixStream` as the transport beneath a length-prefixed `bincode`
//! message. The binary wake signal is its own tiny duplex socket rather
//! than a shared semaphore, since each worker has exactly one coordinator
//! on the other end (§5: "one producer, one consumer").

use std::io::{Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use nix::unistd::Pid;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{HciError, Result};
use crate::socket::Socket;
use crate::task::HciTask;

fn poll_readable(fd: RawFd, timeout_ms: Option<u32>) -> Result<bool> {
    let timeout = timeout_ms.map(|ms| ms as libc::c_int).unwrap_or(-1);
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    loop {
        let n = unsafe { libc::poll(&mut pfd, 1, timeout) };
        if n < 0 {
            let e = std::io::Error::last_os_error();
            if e.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(e.into());
        }
        return Ok(n > 0);
    }
}

/// The typed duplex channel between a worker and its coordinator, plus the
/// one-way binary wake signal the coordinator uses to release a worker
/// blocked in [`WorkerChannel::wait`].
///
/// `stream` carries `send`/`recv` traffic in both directions; `signal_rx`
/// is this worker's read end of the coordinator-to-worker wake pipe
/// (`WorkerHandle::signal` owns the write end).
pub struct WorkerChannel {
    stream: UnixStream,
    signal_rx: UnixStream,
}

impl WorkerChannel {
    fn new(stream: UnixStream, signal_rx: UnixStream) -> Self {
        WorkerChannel { stream, signal_rx }
    }

    /// Send one message. Frame: `u32` little-endian length, then the
    /// `bincode` encoding of `value`.
    pub fn send<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let body = bincode::serialize(value)
            .map_err(|e| HciError::Protocol(format!("encoding worker message: {e}")))?;
        if body.len() > u32::MAX as usize {
            return Err(HciError::Protocol("worker message too large".into()));
        }
        self.stream.write_all(&(body.len() as u32).to_le_bytes())?;
        self.stream.write_all(&body)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Receive one message, waiting up to `timeout_ms` (`None` = forever)
    /// for the length prefix to start arriving.
    pub fn recv<T: DeserializeOwned>(&mut self, timeout_ms: Option<u32>) -> Result<T> {
        if !poll_readable(self.stream.as_raw_fd(), timeout_ms)? {
            return Err(HciError::Timeout { what: "worker message" });
        }
        let mut len_bytes = [0u8; 4];
        self.stream.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body)?;
        bincode::deserialize(&body).map_err(|e| HciError::Protocol(format!("decoding worker message: {e}")))
    }

    /// Block until the coordinator calls `signal()` at least once since
    /// the last `wait`, or `timeout_ms` elapses.
    pub fn wait(&mut self, timeout_ms: Option<u32>) -> Result<()> {
        if !poll_readable(self.signal_rx.as_raw_fd(), timeout_ms)? {
            return Err(HciError::Timeout { what: "worker signal" });
        }
        // Drain everything queued: any number of `signal()` calls made
        // before this `wait()` collapse into the single wakeup it models.
        let mut buf = [0u8; 64];
        loop {
            match self.signal_rx.set_nonblocking(true) {
                Ok(()) => {}
                Err(e) => return Err(e.into()),
            }
            match self.signal_rx.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        let _ = self.signal_rx.set_nonblocking(false);
        Ok(())
    }
}

/// Everything a scenario's worker body touches: the HCI task against this
/// adapter's own socket, plus the channel back to the coordinator.
pub struct WorkerContext {
    pub task: HciTask<Socket>,
    pub channel: WorkerChannel,
}

impl WorkerContext {
    pub fn send_acl_data(&self, connection_handle: u16, pb_flag: u8, bc_flag: u8, payload: &[u8]) -> Result<()> {
        self.task.send_acl_data(connection_handle, pb_flag, bc_flag, payload)
    }
}

/// A scenario's behaviour for one worker. Implementations correspond to
/// `bluetool`'s `HCIWorker` subclasses (`WhiteListMaster`, `LegacySlave`,
/// ...): given exclusive access to one adapter, run to completion or
/// return an error.
pub trait WorkerMain: Send {
    fn main(&mut self, ctx: &mut WorkerContext) -> Result<()>;
}

impl<F> WorkerMain for F
where
    F: FnMut(&mut WorkerContext) -> Result<()> + Send,
{
    fn main(&mut self, ctx: &mut WorkerContext) -> Result<()> {
        self(ctx)
    }
}

impl WorkerMain for Box<dyn WorkerMain> {
    fn main(&mut self, ctx: &mut WorkerContext) -> Result<()> {
        (**self).main(ctx)
    }
}

/// The parent-side handle to a running worker: its pid, message channel,
/// wake signal, and cached BD_ADDR (read by the coordinator before the
/// fork, per §4.9).
pub struct WorkerHandle {
    pub pid: Pid,
    pub bd_addr: [u8; 6],
    stream: UnixStream,
    signal_tx: UnixStream,
}

impl WorkerHandle {
    pub fn send<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let body = bincode::serialize(value)
            .map_err(|e| HciError::Protocol(format!("encoding worker message: {e}")))?;
        self.stream.write_all(&(body.len() as u32).to_le_bytes())?;
        self.stream.write_all(&body)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Receive one message from the worker. Additionally wakes up with
    /// [`HciError::Aborted`] if `abort_fd` (the coordinator's
    /// terminated-workers queue — readable the instant any sibling
    /// worker pushes its pid onto it, not only once it has fully exited)
    /// becomes readable first, per §9's "Aborted message on an
    /// error-fan-in channel".
    pub fn recv<T: DeserializeOwned>(&mut self, timeout_ms: Option<u32>, abort_fd: RawFd) -> Result<T> {
        self.wait_fd_or_abort(self.stream.as_raw_fd(), timeout_ms, abort_fd, "worker message")?;
        let mut len_bytes = [0u8; 4];
        self.stream.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body)?;
        bincode::deserialize(&body).map_err(|e| HciError::Protocol(format!("decoding worker message: {e}")))
    }

    pub fn signal(&mut self) -> Result<()> {
        self.signal_tx.write_all(&[0u8])?;
        Ok(())
    }

    /// Block (respecting `abort_fd`) until the worker signals back — used
    /// only by scenarios that model a bidirectional rendezvous through the
    /// coordinator (all inter-worker signalling goes through it per §4.9).
    fn wait_fd_or_abort(&self, fd: RawFd, timeout_ms: Option<u32>, abort_fd: RawFd, what: &'static str) -> Result<()> {
        let deadline = timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms as u64));
        loop {
            let remaining = match deadline {
                None => -1,
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Err(HciError::Timeout { what });
                    }
                    (d - now).as_millis() as libc::c_int
                }
            };
            let mut fds = [
                libc::pollfd { fd, events: libc::POLLIN, revents: 0 },
                libc::pollfd { fd: abort_fd, events: libc::POLLIN, revents: 0 },
            ];
            let n = unsafe { libc::poll(fds.as_mut_ptr(), 2, remaining) };
            if n < 0 {
                let e = std::io::Error::last_os_error();
                if e.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return Err(e.into());
            }
            if n == 0 {
                return Err(HciError::Timeout { what });
            }
            if fds[1].revents & libc::POLLIN != 0 {
                return Err(HciError::Aborted("sibling worker failed or process interrupted".into()));
            }
            if fds[0].revents & libc::POLLIN != 0 {
                return Ok(());
            }
        }
    }
}

/// Both halves of a freshly created worker, before it is forked: the
/// parent's [`WorkerHandle`] plus the channel the child will own.
pub(crate) struct WorkerPair {
    pub handle_stream: UnixStream,
    pub handle_signal_tx: UnixStream,
    pub child_stream: UnixStream,
    pub child_signal_rx: UnixStream,
}

pub(crate) fn make_pair() -> Result<WorkerPair> {
    let (handle_stream, child_stream) = UnixStream::pair()?;
    let (handle_signal_tx, child_signal_rx) = UnixStream::pair()?;
    Ok(WorkerPair {
        handle_stream,
        handle_signal_tx,
        child_stream,
        child_signal_rx,
    })
}

pub(crate) fn make_handle(pair: &WorkerPair, pid: Pid, bd_addr: [u8; 6]) -> Result<WorkerHandle> {
    Ok(WorkerHandle {
        pid,
        bd_addr,
        stream: pair.handle_stream.try_clone()?,
        signal_tx: pair.handle_signal_tx.try_clone()?,
    })
}

pub(crate) fn make_context(pair: &WorkerPair, task: HciTask<Socket>) -> Result<WorkerContext> {
    Ok(WorkerContext {
        task,
        channel: WorkerChannel::new(pair.child_stream.try_clone()?, pair.child_signal_rx.try_clone()?),
    })
}
