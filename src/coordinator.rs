//! The coordinator: starts one worker process per configured adapter,
//! fans their messages and termination in, and tears everything down as
//! soon as any of them fails or the process receives SIGINT.
//!
//! Grounded on `bluetool.core.HCICoordinator`/`HCIWorkerProxy` (`add_worker`
//! registers a `(name, dev_id, WorkerClass)` triple; `run` starts every
//! worker, then blocks on `os.waitpid` in a loop, killing the rest as soon
//! as one exits abnormally) and on `bluetool.__init__.run_config`, which
//! drives that same sequence from a parsed configuration object.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use crate::command::info_params::ReadBdAddr;
use crate::error::{HciError, Result};
use crate::event::{Event, ReturnParams};
use crate::socket::Socket;
use crate::task::HciTask;
use crate::worker::{self, WorkerHandle, WorkerMain};

/// The read end of a self-pipe written to by the SIGINT handler. The
/// handler itself only calls `write(2)`; everything else happens on the
/// main thread polling `read_fd` — the standard self-pipe trick for
/// moving work out of an async-signal-safe context.
struct SelfPipe {
    read_fd: RawFd,
    write_fd: RawFd,
}

static mut SELF_PIPE_WRITE_FD: RawFd = -1;

extern "C" fn handle_sigint(_: libc::c_int) {
    unsafe {
        if SELF_PIPE_WRITE_FD >= 0 {
            let byte = [1u8];
            libc::write(SELF_PIPE_WRITE_FD, byte.as_ptr() as *const libc::c_void, 1);
        }
    }
}

impl SelfPipe {
    fn install() -> Result<Self> {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        let (read_fd, write_fd) = (fds[0], fds[1]);
        unsafe {
            SELF_PIPE_WRITE_FD = write_fd;
            signal::signal(Signal::SIGINT, SigHandler::Handler(handle_sigint))?;
        }
        Ok(SelfPipe { read_fd, write_fd })
    }

    fn interrupted(&self) -> bool {
        let mut buf = [0u8; 1];
        let mut pfd = libc::pollfd {
            fd: self.read_fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let n = unsafe { libc::poll(&mut pfd, 1, 0) };
        n > 0 && unsafe { libc::read(self.read_fd, buf.as_mut_ptr() as *mut libc::c_void, 1) } > 0
    }
}

impl Drop for SelfPipe {
    fn drop(&mut self) {
        unsafe {
            SELF_PIPE_WRITE_FD = -1;
            libc::close(self.read_fd);
            libc::close(self.write_fd);
        }
    }
}

/// Non-blocking check for whether `fd` currently has anything to read,
/// used to peek at the terminated-workers queue without consuming it.
fn fd_has_pending(fd: RawFd) -> bool {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let n = unsafe { libc::poll(&mut pfd, 1, 0) };
    n > 0 && pfd.revents & libc::POLLIN != 0
}

/// One registered-but-not-yet-started worker: its device index and the
/// scenario body to run once forked.
struct PendingWorker {
    name: String,
    dev_id: u16,
    main: Box<dyn WorkerMain>,
}

/// A factory producing a fresh scenario body for one worker slot. Boxed
/// rather than stored as a bare `WorkerMain` because [`ScenarioConfig`] is
/// built once (by the CLI entry point this crate declares but does not
/// implement, per §1) and may need to hand out the same worker type to
/// more than one named slot.
pub type WorkerFactory = Box<dyn Fn() -> Box<dyn WorkerMain>>;

/// The in-memory counterpart of `bluetool.__init__.run_config`'s `cfg`
/// dict: an ordered `(attribute_name, worker_class)` list plus an optional
/// device index list, defaulting to `0..worker.len()` when omitted. File
/// parsing / dynamic module loading that would build one of these from a
/// scenario file on disk is an external CLI concern (§1, §9's open
/// question on `run_bluetest`) and out of scope here.
#[derive(Default)]
pub struct ScenarioConfig {
    pub workers: Vec<(String, WorkerFactory)>,
    pub devices: Option<Vec<u16>>,
}

impl ScenarioConfig {
    pub fn new() -> Self {
        ScenarioConfig {
            workers: Vec::new(),
            devices: None,
        }
    }

    pub fn worker(mut self, name: impl Into<String>, factory: WorkerFactory) -> Self {
        self.workers.push((name.into(), factory));
        self
    }

    pub fn devices(mut self, devices: Vec<u16>) -> Self {
        self.devices = Some(devices);
        self
    }
}

/// Drives a set of workers, one OS process per adapter, through
/// start/run/teardown. Not `Send`/`Sync`: it owns raw fds tied to one
/// process's signal disposition.
pub struct Coordinator {
    pending: Vec<PendingWorker>,
    handles: HashMap<String, WorkerHandle>,
    /// One shared `UnixStream::pair()`. The write half is cloned into
    /// every forked child; a child that fails (its `main()` returns `Err`,
    /// or it cannot even build its `WorkerContext`) writes its own pid
    /// here just before calling `process::exit`, then exits. A child that
    /// finishes cleanly writes nothing. This is the multi-producer/
    /// single-consumer "a worker terminated" notification (§9's
    /// "terminated workers queue" design note): `term_read` becomes
    /// readable the instant *any* child pushes, not only once every
    /// clone has closed, so a coordinator blocked in `recv`/`wait` for one
    /// worker wakes up promptly when a sibling fails, even while other
    /// workers are still alive. Each push is 4 bytes, written in one
    /// `write_all` call, so concurrent pushes from different children
    /// don't interleave.
    term_write: UnixStream,
    term_read: UnixStream,
}

impl Coordinator {
    pub fn new() -> Result<Self> {
        let (term_read, term_write) = UnixStream::pair()?;
        Ok(Coordinator {
            pending: Vec::new(),
            handles: HashMap::new(),
            term_write,
            term_read,
        })
    }

    /// Register a worker. `main` runs in the forked child with exclusive
    /// access to `dev_id`'s adapter; it is not started until [`Self::run`].
    pub fn add_worker(&mut self, name: impl Into<String>, dev_id: u16, main: impl WorkerMain + 'static) {
        self.pending.push(PendingWorker {
            name: name.into(),
            dev_id,
            main: Box::new(main),
        });
    }

    /// Register every worker named in `cfg`, pairing each with a device
    /// index from `cfg.devices` (or `0..cfg.workers.len()` if `cfg.devices`
    /// is `None`). Mirrors `HCICoordinator.load`: one `add_worker` call per
    /// configured `(name, worker_type)` pair, in order.
    pub fn load(&mut self, cfg: ScenarioConfig) -> Result<()> {
        let devices: Vec<u16> = match cfg.devices {
            Some(devices) => devices,
            None => (0..cfg.workers.len() as u16).collect(),
        };
        if devices.len() != cfg.workers.len() {
            return Err(HciError::Protocol(format!(
                "scenario config lists {} device(s) for {} worker(s)",
                devices.len(),
                cfg.workers.len()
            )));
        }
        for ((name, factory), dev_id) in cfg.workers.into_iter().zip(devices) {
            self.add_worker(name, dev_id, factory());
        }
        Ok(())
    }

    /// The bluetooth address cached for an already-started worker
    /// (bootstrapped before the fork, per §4.9).
    pub fn bd_addr(&self, name: &str) -> Option<[u8; 6]> {
        self.handles.get(name).map(|h| h.bd_addr)
    }

    pub fn send<T: serde::Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        self.handle_mut(name)?.send(value)
    }

    pub fn signal(&mut self, name: &str) -> Result<()> {
        self.handle_mut(name)?.signal()
    }

    /// Receive a message from worker `name`, also waking with
    /// [`HciError::Aborted`] if this coordinator's terminated-workers
    /// queue (see [`Self::term_fd`]) becomes readable first.
    pub fn recv<T: serde::de::DeserializeOwned>(&mut self, name: &str, timeout_ms: Option<u32>) -> Result<T> {
        let term_fd = self.term_fd();
        self.handle_mut(name)?.recv(timeout_ms, term_fd)
    }

    fn handle_mut(&mut self, name: &str) -> Result<&mut WorkerHandle> {
        self.handles
            .get_mut(name)
            .ok_or_else(|| HciError::Protocol(format!("no such worker: {name}")))
    }

    /// Read end of the terminated-workers queue: becomes readable the
    /// moment any child pushes its pid onto it (see the `term_write`
    /// field doc), independent of whether any other worker is still
    /// alive.
    pub fn term_fd(&self) -> RawFd {
        self.term_read.as_raw_fd()
    }

    /// Drain every pid currently queued on `term_read` without blocking.
    /// Used by `run`'s teardown step ("drain the terminated-workers
    /// queue" per §4.9) purely for logging; the pids themselves are not
    /// otherwise needed because `reap_and_teardown` learns about exits
    /// from `waitpid` directly.
    fn drain_terminated(&self) -> Vec<Pid> {
        let mut out = Vec::new();
        let _ = self.term_read.set_nonblocking(true);
        let mut buf = [0u8; 4];
        loop {
            match (&self.term_read).read_exact(&mut buf) {
                Ok(()) => out.push(Pid::from_raw(i32::from_le_bytes(buf))),
                Err(_) => break,
            }
        }
        let _ = self.term_read.set_nonblocking(false);
        out
    }

    /// Start every registered worker, call `main` to orchestrate the
    /// scenario (§4.9 step 2 — this is where `send`/`recv`/`signal`/
    /// `bd_addr` and inter-worker routing are actually driven), then tear
    /// down: wait for every worker to exit cleanly, or kill the rest the
    /// moment `main` fails, a worker fails, or the process receives
    /// SIGINT. Returns `main`'s returned code, or `1` if any of those
    /// interruptions happened.
    ///
    /// Mirrors `HCICoordinator.run`: start every worker, call the
    /// subclass `main()`, then loop on `os.waitpid(-1, 0)` until all
    /// children are reaped, killing the remaining group the moment one
    /// exits abnormally.
    pub fn run(mut self, main: impl FnOnce(&mut Coordinator) -> Result<i32>) -> Result<i32> {
        let self_pipe = SelfPipe::install()?;
        let pending = std::mem::take(&mut self.pending);

        for worker in pending {
            self.spawn_worker(worker)?;
        }

        let remaining: Vec<Pid> = self.handles.values().map(|h| h.pid).collect();
        let term_fd = self.term_fd();

        let main_result = main(&mut self);
        let main_failed = if let Err(ref e) = main_result {
            log::error!("scenario main failed: {e}");
            true
        } else {
            false
        };

        for pid in self.drain_terminated() {
            log::warn!("worker {pid} reported failure before teardown");
        }

        let teardown_code = Self::reap_and_teardown(remaining, || {
            main_failed || self_pipe.interrupted() || fd_has_pending(term_fd)
        })?;

        if main_failed || teardown_code != 0 {
            Ok(1)
        } else {
            main_result
        }
    }

    /// The part of `run` that does not depend on how `remaining`'s
    /// processes were spawned: wait for every pid to exit, killing the
    /// rest the moment one exits abnormally or `interrupted` reports true.
    /// Split out so the teardown behaviour (P10/S6) can be exercised with
    /// plain forked test processes instead of real HCI sockets.
    fn reap_and_teardown(mut remaining: Vec<Pid>, interrupted: impl Fn() -> bool) -> Result<i32> {
        let mut exit_code = 0;

        while !remaining.is_empty() {
            if interrupted() {
                log::warn!("coordinator interrupted, terminating workers");
                exit_code = 1;
                break;
            }
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, status)) => {
                    remaining.retain(|p| *p != pid);
                    if status != 0 {
                        log::error!("worker {pid} exited with status {status}");
                        exit_code = 1;
                        break;
                    }
                    log::info!("worker {pid} exited cleanly");
                }
                Ok(WaitStatus::Signaled(pid, sig, _)) => {
                    remaining.retain(|p| *p != pid);
                    log::error!("worker {pid} killed by signal {sig:?}");
                    exit_code = 1;
                    break;
                }
                Ok(_) => {
                    std::thread::sleep(std::time::Duration::from_millis(20));
                }
                Err(nix::Error::ECHILD) => break,
                Err(e) => return Err(e.into()),
            }
        }

        if exit_code != 0 {
            Self::terminate_remaining(&remaining);
        }
        Ok(exit_code)
    }

    fn spawn_worker(&mut self, pending: PendingWorker) -> Result<()> {
        let socket = Socket::new(pending.dev_id)?;
        let mut bootstrap = HciTask::new(socket);
        let bd_addr = match bootstrap.send_cmd_wait_complete_check_status(&ReadBdAddr)? {
            Event::CommandComplete {
                return_params: ReturnParams::ReadBdAddr { bd_addr, .. },
                ..
            } => bd_addr,
            other => {
                return Err(HciError::Protocol(format!(
                    "unexpected response bootstrapping BD_ADDR: {other:?}"
                )))
            }
        };
        let socket = bootstrap.into_channel();

        let pair = worker::make_pair()?;
        let mut term_write = self.term_write.try_clone()?;

        match unsafe { fork()? } {
            ForkResult::Parent { child } => {
                // The parent never touches a worker's socket again once
                // handed off (invariant: no socket is shared across
                // processes).
                drop(socket);
                drop(term_write);
                let handle = worker::make_handle(&pair, child, bd_addr)?;
                self.handles.insert(pending.name, handle);
                Ok(())
            }
            ForkResult::Child => {
                let mut main = pending.main;
                let task = HciTask::new(socket);
                let mut ctx = match worker::make_context(&pair, task) {
                    Ok(ctx) => ctx,
                    Err(e) => {
                        log::error!("worker {} failed to build context: {e}", pending.name);
                        Self::push_failure(&mut term_write);
                        std::process::exit(1);
                    }
                };
                let code = match main.main(&mut ctx) {
                    Ok(()) => 0,
                    Err(e) => {
                        log::error!("worker {} failed: {e}", pending.name);
                        Self::push_failure(&mut term_write);
                        1
                    }
                };
                std::process::exit(code);
            }
        }
    }

    /// Push this process's own pid onto the terminated-workers queue,
    /// just before a failing worker exits. Best-effort: if the write
    /// fails there is nothing left to do but exit anyway, and
    /// `reap_and_teardown`'s `waitpid` loop will still notice the
    /// abnormal exit.
    fn push_failure(term_write: &mut UnixStream) {
        let pid = nix::unistd::getpid().as_raw().to_le_bytes();
        let _ = term_write.write_all(&pid);
        let _ = term_write.flush();
    }

    fn terminate_remaining(remaining: &[Pid]) {
        for pid in remaining {
            let _ = signal::kill(*pid, Signal::SIGTERM);
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
        for pid in remaining {
            let _ = signal::kill(*pid, Signal::SIGKILL);
            let _ = waitpid(*pid, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn fork_exiting(code: i32) -> Pid {
        match unsafe { fork().expect("fork") } {
            ForkResult::Parent { child } => child,
            ForkResult::Child => std::process::exit(code),
        }
    }

    fn fork_sleeping(millis: u64) -> Pid {
        match unsafe { fork().expect("fork") } {
            ForkResult::Parent { child } => child,
            ForkResult::Child => {
                std::thread::sleep(std::time::Duration::from_millis(millis));
                std::process::exit(0);
            }
        }
    }

    /// S6 / P10: one worker raises (models a non-zero exit), the other is
    /// still blocked in recv (models a long sleep). `reap_and_teardown`
    /// must notice the failure, kill the sibling instead of waiting for
    /// it, and report a non-zero exit code, all within a couple of
    /// seconds.
    #[test]
    fn worker_failure_kills_sibling_and_reports_nonzero() {
        let worker_a = fork_exiting(1);
        let worker_b = fork_sleeping(60_000);

        let start = Instant::now();
        let code = Coordinator::reap_and_teardown(vec![worker_a, worker_b], || false)
            .expect("reap_and_teardown");
        let elapsed = start.elapsed();

        assert_eq!(code, 1);
        assert!(
            elapsed < std::time::Duration::from_secs(2),
            "teardown took too long: {elapsed:?}"
        );

        // worker_b must actually be gone, not merely forgotten about.
        assert_eq!(waitpid(worker_b, Some(WaitPidFlag::WNOHANG)), Err(nix::Error::ECHILD));
    }

    /// Every worker exiting cleanly is the ordinary, non-S6 path: exit
    /// code 0, no signals sent.
    #[test]
    fn all_workers_clean_exit_reports_zero() {
        let worker_a = fork_exiting(0);
        let worker_b = fork_exiting(0);

        let code = Coordinator::reap_and_teardown(vec![worker_a, worker_b], || false)
            .expect("reap_and_teardown");

        assert_eq!(code, 0);
    }

    /// An `interrupted` signal (SIGINT path) terminates every worker even
    /// though none of them has exited on its own yet.
    #[test]
    fn interrupted_terminates_all_workers() {
        let worker_a = fork_sleeping(60_000);
        let worker_b = fork_sleeping(60_000);

        let mut first_call = true;
        let code = Coordinator::reap_and_teardown(vec![worker_a, worker_b], move || {
            let was_first = first_call;
            first_call = false;
            was_first
        })
        .expect("reap_and_teardown");

        assert_eq!(code, 1);
        assert_eq!(waitpid(worker_a, Some(WaitPidFlag::WNOHANG)), Err(nix::Error::ECHILD));
        assert_eq!(waitpid(worker_b, Some(WaitPidFlag::WNOHANG)), Err(nix::Error::ECHILD));
    }
}
