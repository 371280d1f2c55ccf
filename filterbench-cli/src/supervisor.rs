//! Supervisor
//!
//! Owns the workers the parallel runners hand items to. A worker is either a
//! separate OS process (the `filterbench` binary in worker mode, talking over
//! inherited pipes) or a thread in this process. Runners only see the
//! [`Worker`] and [`WorkerSpawner`] traits.
//!
//! A worker that crashes, times out or breaks the protocol is reported as a
//! [`SupervisorError`]; runners turn that into a counted failure for the item
//! and replace the worker.

use crate::config::IsolationMode;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use filterbench_core::{UnitOfWork, apply_contained, assume_identity};
use filterbench_ipc::{
    FrameError, FrameReader, FrameWriter, IPC_FD_ENV, PROTOCOL_VERSION, SupervisorCommand,
    WORKER_FLAG, WorkItem, WorkResult, WorkerHello, WorkerId, WorkerMessage,
};
use std::os::unix::io::{FromRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Poll granularity while waiting on a worker
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Grace period between SIGTERM and SIGKILL
const TERM_GRACE: Duration = Duration::from_millis(500);

/// Worker spawn, transport and liveness failures
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The worker could not be started
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(#[from] std::io::Error),

    /// The channel to the worker failed
    #[error("IPC error: {0}")]
    IpcError(String),

    /// The worker died while holding an item
    #[error("Worker crashed: {0}")]
    WorkerCrashed(String),

    /// No answer within the per-item timeout
    #[error("Timeout waiting for worker")]
    Timeout,

    /// The worker sent something out of sequence
    #[error("Worker protocol error: expected {expected}, got {got}")]
    ProtocolError {
        /// Message the supervisor waited for
        expected: String,
        /// Message actually received
        got: String,
    },
}

impl From<FrameError> for SupervisorError {
    fn from(e: FrameError) -> Self {
        SupervisorError::IpcError(e.to_string())
    }
}

impl SupervisorError {
    /// Worker a failure is charged to. Timeouts and spawn failures have no
    /// trustworthy worker identity.
    pub fn attribution(&self, worker: WorkerId) -> WorkerId {
        match self {
            SupervisorError::Timeout | SupervisorError::SpawnFailed(_) => WorkerId::Unknown,
            _ => worker,
        }
    }
}

/// Error result for an item that never produced one of its own
pub fn infrastructure_failure(
    item: &WorkItem,
    worker: WorkerId,
    error: &SupervisorError,
) -> WorkResult {
    WorkResult::error(item.identifier(), error.attribution(worker), error.to_string())
}

/// A worker able to apply the unit of work to one item at a time
pub trait Worker: Send {
    /// Identity results from this worker are expected to carry
    fn id(&self) -> WorkerId;

    /// Apply the unit of work to `item` and wait for its result
    fn apply(&mut self, item: &WorkItem) -> Result<WorkResult, SupervisorError>;

    /// Whether the worker can accept another item
    fn is_alive(&mut self) -> bool;

    /// Stop the worker and wait for it to exit
    fn shutdown(self: Box<Self>);
}

/// Creates workers for a runner
pub trait WorkerSpawner: Send + Sync {
    /// Start a fresh worker
    fn spawn(&self) -> Result<Box<dyn Worker>, SupervisorError>;

    /// Isolation the spawned workers provide
    fn isolation(&self) -> IsolationMode;

    /// Wait for workers that were retired while still busy. Runners call
    /// this before returning so nothing outlives its run.
    fn reap(&self) {}
}

// ---------------------------------------------------------------------------
// Process workers
// ---------------------------------------------------------------------------

/// Result of polling for data
#[derive(Debug)]
enum PollResult {
    DataAvailable,
    Timeout,
    PipeClosed,
    Error(std::io::Error),
}

/// Wait for data to be available on a file descriptor with timeout
fn wait_for_data(fd: RawFd, timeout_ms: i32) -> PollResult {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    let result = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };

    if result < 0 {
        PollResult::Error(std::io::Error::last_os_error())
    } else if result == 0 {
        PollResult::Timeout
    } else if pollfd.revents & libc::POLLIN != 0 {
        // Readable even if the pipe is closing; drain first.
        PollResult::DataAvailable
    } else if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        PollResult::PipeClosed
    } else {
        PollResult::Timeout
    }
}

/// Create a pipe pair with close-on-exec set, returning (read_fd, write_fd).
///
/// Workers are spawned from several threads at once, so the flag must be set
/// atomically with the pipe or a concurrent fork inherits both ends.
#[cfg(not(target_vendor = "apple"))]
fn create_pipe() -> Result<(RawFd, RawFd), std::io::Error> {
    let mut fds = [0 as RawFd; 2];
    let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok((fds[0], fds[1]))
}

/// Create a pipe pair with close-on-exec set, returning (read_fd, write_fd).
///
/// No `pipe2` here; the flag is set right after creation.
#[cfg(target_vendor = "apple")]
fn create_pipe() -> Result<(RawFd, RawFd), std::io::Error> {
    let mut fds = [0 as RawFd; 2];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    for &fd in &fds {
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }
    }
    Ok((fds[0], fds[1]))
}

/// Child side of spawn: place `fd` at `target` and keep it across exec.
///
/// Runs between fork and exec, so only async-signal-safe calls.
fn install_fd(fd: RawFd, target: RawFd) -> Result<(), std::io::Error> {
    unsafe {
        if fd != target {
            if libc::dup2(fd, target) < 0 {
                return Err(std::io::Error::last_os_error());
            }
            libc::close(fd);
        }
        let flags = libc::fcntl(target, libc::F_GETFD);
        if flags < 0 || libc::fcntl(target, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

fn send_sigterm(pid: u32) -> Result<(), std::io::Error> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Wait for Hello and validate the protocol version
fn read_hello(reader: &mut FrameReader<std::fs::File>) -> Result<WorkerHello, SupervisorError> {
    match reader.recv::<WorkerMessage>()? {
        WorkerMessage::Hello(hello) => {
            if hello.protocol_version != PROTOCOL_VERSION {
                return Err(SupervisorError::ProtocolError {
                    expected: format!("protocol version {}", PROTOCOL_VERSION),
                    got: format!("protocol version {}", hello.protocol_version),
                });
            }
            Ok(hello)
        }
        other => Err(SupervisorError::ProtocolError {
            expected: "Hello".to_string(),
            got: format!("{:?}", other),
        }),
    }
}

/// Handle to one worker process
pub struct WorkerHandle {
    child: Child,
    reader: FrameReader<std::fs::File>,
    writer: FrameWriter<std::fs::File>,
    hello: WorkerHello,
    timeout: Option<Duration>,
    msg_read_fd: RawFd,
}

impl WorkerHandle {
    /// Spawn `binary` in worker mode, using fd 3/4 for IPC.
    pub fn spawn(binary: &Path, timeout: Option<Duration>) -> Result<Self, SupervisorError> {
        // cmd pipe: supervisor writes, worker reads on fd 3
        let (cmd_read, cmd_write) = create_pipe()?;
        // msg pipe: worker writes on fd 4, supervisor reads
        let (msg_read, msg_write) = match create_pipe() {
            Ok(fds) => fds,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                return Err(SupervisorError::SpawnFailed(e));
            }
        };

        let mut command = Command::new(binary);
        command
            .arg(WORKER_FLAG)
            .env(IPC_FD_ENV, "3,4")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        unsafe {
            command.pre_exec(move || {
                // Parent-side ends go first: either may sit on fd 3 or 4.
                libc::close(cmd_write);
                libc::close(msg_read);

                // Keep the message end clear of fd 3 before the command end
                // lands there.
                let mut msg_fd = msg_write;
                if msg_fd == 3 {
                    msg_fd = libc::fcntl(msg_write, libc::F_DUPFD_CLOEXEC, 5);
                    if msg_fd < 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    libc::close(msg_write);
                }

                install_fd(cmd_read, 3)?;
                install_fd(msg_fd, 4)?;
                Ok(())
            });
        }

        let mut child = match command.spawn() {
            Ok(c) => c,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                close_fd(msg_read);
                close_fd(msg_write);
                return Err(SupervisorError::SpawnFailed(e));
            }
        };

        close_fd(cmd_read);
        close_fd(msg_write);

        let writer_file = unsafe { std::fs::File::from_raw_fd(cmd_write) };
        let reader_file = unsafe { std::fs::File::from_raw_fd(msg_read) };
        let mut reader = FrameReader::new(reader_file);
        let hello = match read_hello(&mut reader) {
            Ok(hello) => hello,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };
        tracing::debug!(pid = hello.pid, "worker process ready");

        Ok(Self {
            child,
            reader,
            writer: FrameWriter::new(writer_file),
            hello,
            timeout,
            msg_read_fd: msg_read,
        })
    }

    /// Pid reported in the handshake
    pub fn pid(&self) -> u32 {
        self.hello.pid
    }

    fn crashed(&mut self, what: &str) -> SupervisorError {
        let status = self
            .child
            .try_wait()
            .ok()
            .flatten()
            .map(|s| format!(" ({})", s))
            .unwrap_or_default();
        SupervisorError::WorkerCrashed(format!("{}{}", what, status))
    }

    /// Block until the next worker message, honoring the timeout.
    fn next_message(&mut self, deadline: Option<Instant>) -> Result<WorkerMessage, SupervisorError> {
        loop {
            let wait = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(self.handle_timeout());
                    }
                    remaining.min(POLL_INTERVAL)
                }
                None => POLL_INTERVAL,
            };

            // Buffered bytes may be an incomplete frame that never completes.
            if self.reader.has_buffered_data() {
                if !self.is_alive() {
                    return Err(self.crashed("worker exited with a partial frame buffered"));
                }
            } else {
                match wait_for_data(self.msg_read_fd, wait.as_millis() as i32) {
                    PollResult::DataAvailable => {}
                    PollResult::Timeout => {
                        if !self.is_alive() {
                            return Err(self.crashed("worker exited unexpectedly"));
                        }
                        continue;
                    }
                    PollResult::PipeClosed => {
                        return Err(self.crashed("worker pipe closed unexpectedly"));
                    }
                    PollResult::Error(e) => {
                        return Err(self.crashed(&format!("pipe error: {}", e)));
                    }
                }
            }

            return match self.reader.recv::<WorkerMessage>() {
                Ok(msg) => Ok(msg),
                Err(FrameError::EndOfStream) => {
                    Err(self.crashed("worker closed connection unexpectedly"))
                }
                Err(e) => {
                    if !self.is_alive() {
                        return Err(self.crashed("worker crashed during read"));
                    }
                    Err(SupervisorError::IpcError(e.to_string()))
                }
            };
        }
    }

    /// SIGTERM, a short drain window, then SIGKILL.
    fn handle_timeout(&mut self) -> SupervisorError {
        tracing::warn!(pid = self.hello.pid, "worker timed out, terminating");
        let _ = send_sigterm(self.child.id());

        let drain_deadline = Instant::now() + TERM_GRACE;
        loop {
            let remaining = drain_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !self.is_alive() {
                break;
            }
            match wait_for_data(self.msg_read_fd, remaining.as_millis() as i32) {
                // A result arriving now is too late; discard it.
                PollResult::DataAvailable => {
                    if self.reader.recv::<WorkerMessage>().is_err() {
                        break;
                    }
                }
                _ => break,
            }
        }

        if self.is_alive() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();

        SupervisorError::Timeout
    }

    /// Check the worker is responsive
    pub fn ping(&mut self) -> Result<(), SupervisorError> {
        self.writer.send(&SupervisorCommand::Ping)?;
        let deadline = self.timeout.map(|t| Instant::now() + t);
        match self.next_message(deadline)? {
            WorkerMessage::Pong => Ok(()),
            other => Err(SupervisorError::ProtocolError {
                expected: "Pong".to_string(),
                got: format!("{:?}", other),
            }),
        }
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Worker for WorkerHandle {
    fn id(&self) -> WorkerId {
        WorkerId::from_pid(self.hello.pid)
    }

    fn apply(&mut self, item: &WorkItem) -> Result<WorkResult, SupervisorError> {
        if let Err(e) = self.writer.send(&SupervisorCommand::Apply(item.clone())) {
            return Err(if self.is_alive() {
                e.into()
            } else {
                self.crashed("worker exited before accepting work")
            });
        }

        let deadline = self.timeout.map(|t| Instant::now() + t);
        loop {
            match self.next_message(deadline)? {
                WorkerMessage::Completed(result) => return Ok(result),
                WorkerMessage::Pong => continue,
                WorkerMessage::Hello(_) => {
                    return Err(SupervisorError::ProtocolError {
                        expected: "Completed".to_string(),
                        got: "Hello".to_string(),
                    });
                }
            }
        }
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn shutdown(mut self: Box<Self>) {
        if self.writer.send(&SupervisorCommand::Shutdown).is_err() {
            self.kill();
            return;
        }
        let _ = self.child.wait();
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            let _ = send_sigterm(self.child.id());
            std::thread::sleep(Duration::from_millis(50));
            if self.is_alive() {
                let _ = self.child.kill();
            }
            let _ = self.child.wait();
        }
    }
}

/// Spawns worker processes from a worker-capable binary
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessSpawner {
    /// Workers are the currently running executable
    pub fn current_exe(timeout: Option<Duration>) -> Result<Self, SupervisorError> {
        let binary = std::env::current_exe().map_err(SupervisorError::SpawnFailed)?;
        Ok(Self::with_binary(binary, timeout))
    }

    /// Workers are `binary`
    pub fn with_binary(binary: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

impl WorkerSpawner for ProcessSpawner {
    fn spawn(&self) -> Result<Box<dyn Worker>, SupervisorError> {
        Ok(Box::new(WorkerHandle::spawn(&self.binary, self.timeout)?))
    }

    fn isolation(&self) -> IsolationMode {
        IsolationMode::Process
    }
}

// ---------------------------------------------------------------------------
// Thread workers
// ---------------------------------------------------------------------------

/// Synthetic identities for thread workers
static NEXT_THREAD_WORKER: AtomicU64 = AtomicU64::new(1);

/// Threads whose item timed out. A thread cannot be killed, so it is parked
/// here until its item returns and the owning spawner reaps it.
#[derive(Clone, Default)]
struct RetiredThreads(Arc<Mutex<Vec<JoinHandle<()>>>>);

impl RetiredThreads {
    fn push(&self, thread: JoinHandle<()>) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(thread);
    }

    fn join_all(&self) -> usize {
        let threads: Vec<_> = self
            .0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        let count = threads.len();
        for thread in threads {
            let _ = thread.join();
        }
        count
    }
}

/// Worker running on a dedicated thread in this process
pub struct ThreadWorker {
    id: WorkerId,
    job_tx: Option<Sender<WorkItem>>,
    result_rx: Receiver<WorkResult>,
    thread: Option<JoinHandle<()>>,
    timeout: Option<Duration>,
    /// Set when an item timed out; the worker takes no more items.
    abandoned: bool,
    retired: RetiredThreads,
}

impl ThreadWorker {
    /// Start a thread worker applying `unit`
    pub fn spawn(
        unit: Arc<dyn UnitOfWork>,
        timeout: Option<Duration>,
    ) -> Result<Self, SupervisorError> {
        Self::spawn_into(unit, timeout, RetiredThreads::default())
    }

    fn spawn_into(
        unit: Arc<dyn UnitOfWork>,
        timeout: Option<Duration>,
        retired: RetiredThreads,
    ) -> Result<Self, SupervisorError> {
        let id = WorkerId::Known(NEXT_THREAD_WORKER.fetch_add(1, Ordering::Relaxed));
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<WorkItem>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<WorkResult>();

        let thread = std::thread::Builder::new()
            .name(format!("filterbench-worker-{}", id))
            .spawn(move || {
                let _identity = assume_identity(id);
                for item in job_rx {
                    let result = apply_contained(unit.as_ref(), &item);
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            id,
            job_tx: Some(job_tx),
            result_rx,
            thread: Some(thread),
            timeout,
            abandoned: false,
            retired,
        })
    }

    fn abandon(&mut self) {
        // Closing the job channel lets the thread exit once its item returns.
        self.abandoned = true;
        self.job_tx = None;
        if let Some(thread) = self.thread.take() {
            self.retired.push(thread);
        }
    }
}

impl Worker for ThreadWorker {
    fn id(&self) -> WorkerId {
        self.id
    }

    fn apply(&mut self, item: &WorkItem) -> Result<WorkResult, SupervisorError> {
        let Some(job_tx) = self.job_tx.as_ref() else {
            return Err(SupervisorError::WorkerCrashed("worker thread retired".into()));
        };
        if job_tx.send(item.clone()).is_err() {
            return Err(SupervisorError::WorkerCrashed("worker thread exited".into()));
        }

        match self.timeout {
            Some(timeout) => match self.result_rx.recv_timeout(timeout) {
                Ok(result) => Ok(result),
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(worker = %self.id, "worker thread timed out, abandoning");
                    self.abandon();
                    Err(SupervisorError::Timeout)
                }
                Err(RecvTimeoutError::Disconnected) => {
                    Err(SupervisorError::WorkerCrashed("worker thread exited".into()))
                }
            },
            None => self
                .result_rx
                .recv()
                .map_err(|_| SupervisorError::WorkerCrashed("worker thread exited".into())),
        }
    }

    fn is_alive(&mut self) -> bool {
        !self.abandoned
            && self
                .thread
                .as_ref()
                .is_some_and(|thread| !thread.is_finished())
    }

    fn shutdown(mut self: Box<Self>) {
        self.job_tx = None;
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Spawns thread workers sharing one unit of work
#[derive(Clone)]
pub struct ThreadSpawner {
    unit: Arc<dyn UnitOfWork>,
    timeout: Option<Duration>,
    retired: RetiredThreads,
}

impl ThreadSpawner {
    /// Thread workers applying `unit`
    pub fn new(unit: Arc<dyn UnitOfWork>, timeout: Option<Duration>) -> Self {
        Self {
            unit,
            timeout,
            retired: RetiredThreads::default(),
        }
    }
}

impl WorkerSpawner for ThreadSpawner {
    fn spawn(&self) -> Result<Box<dyn Worker>, SupervisorError> {
        Ok(Box::new(ThreadWorker::spawn_into(
            self.unit.clone(),
            self.timeout,
            self.retired.clone(),
        )?))
    }

    fn isolation(&self) -> IsolationMode {
        IsolationMode::Thread
    }

    fn reap(&self) {
        let joined = self.retired.join_all();
        if joined > 0 {
            tracing::debug!(threads = joined, "joined timed-out worker threads");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filterbench_core::current_worker_id;

    fn echo_unit() -> Arc<dyn UnitOfWork> {
        Arc::new(|item: &WorkItem| WorkResult::success(item.file_name(), current_worker_id()))
    }

    #[test]
    fn test_thread_worker_reports_its_identity() {
        let mut worker = ThreadSpawner::new(echo_unit(), None).spawn().unwrap();
        let id = worker.id();
        assert!(id.is_known());

        let result = worker.apply(&WorkItem::new("in/a.png", "out")).unwrap();
        assert_eq!(result.identifier, "a.png");
        assert_eq!(result.worker, id);
        assert!(worker.is_alive());
        worker.shutdown();
    }

    #[test]
    fn test_thread_workers_get_distinct_ids() {
        let spawner = ThreadSpawner::new(echo_unit(), None);
        let a = spawner.spawn().unwrap();
        let b = spawner.spawn().unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), current_worker_id());
        a.shutdown();
        b.shutdown();
    }

    #[test]
    fn test_thread_worker_timeout_retires_worker() {
        let slow: Arc<dyn UnitOfWork> = Arc::new(|item: &WorkItem| {
            std::thread::sleep(Duration::from_millis(300));
            WorkResult::success(item.file_name(), current_worker_id())
        });
        let mut worker = ThreadSpawner::new(slow, Some(Duration::from_millis(20)))
            .spawn()
            .unwrap();

        let err = worker.apply(&WorkItem::new("in/slow.png", "out")).unwrap_err();
        assert!(matches!(err, SupervisorError::Timeout));
        assert_eq!(err.attribution(worker.id()), WorkerId::Unknown);
        assert!(!worker.is_alive());
        assert!(worker.apply(&WorkItem::new("in/next.png", "out")).is_err());
    }

    #[test]
    fn test_reap_waits_for_timed_out_threads() {
        let finished = Arc::new(AtomicU64::new(0));
        let done = finished.clone();
        let slow: Arc<dyn UnitOfWork> = Arc::new(move |item: &WorkItem| {
            std::thread::sleep(Duration::from_millis(200));
            done.fetch_add(1, Ordering::SeqCst);
            WorkResult::success(item.file_name(), current_worker_id())
        });
        let spawner = ThreadSpawner::new(slow, Some(Duration::from_millis(20)));
        let mut worker = spawner.spawn().unwrap();

        assert!(worker.apply(&WorkItem::new("in/slow.png", "out")).is_err());
        worker.shutdown();
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        spawner.reap();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        // Nothing left to join the second time.
        spawner.reap();
    }

    #[test]
    fn test_pipes_are_close_on_exec() {
        let (read_fd, write_fd) = create_pipe().unwrap();
        for fd in [read_fd, write_fd] {
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
            assert!(flags >= 0);
            assert_ne!(flags & libc::FD_CLOEXEC, 0);
            close_fd(fd);
        }
    }

    #[test]
    fn test_panicking_unit_is_contained_by_thread_worker() {
        let unit: Arc<dyn UnitOfWork> = Arc::new(|_: &WorkItem| -> WorkResult { panic!("bad") });
        let mut worker = ThreadSpawner::new(unit, None).spawn().unwrap();
        let result = worker.apply(&WorkItem::new("in/p.png", "out")).unwrap();
        assert!(!result.is_success());
        assert!(worker.is_alive());
        worker.shutdown();
    }

    #[test]
    fn test_infrastructure_failure_attribution() {
        let item = WorkItem::new("in/x.png", "out");
        let crash = SupervisorError::WorkerCrashed("signal 9".into());
        let result = infrastructure_failure(&item, WorkerId::Known(77), &crash);
        assert_eq!(result.worker, WorkerId::Known(77));
        assert_eq!(result.identifier, "in_x.png");
        assert!(!result.is_success());

        let timeout = infrastructure_failure(&item, WorkerId::Known(77), &SupervisorError::Timeout);
        assert_eq!(timeout.worker, WorkerId::Unknown);
    }

    #[test]
    fn test_spawning_missing_binary_fails() {
        let spawner = ProcessSpawner::with_binary("/nonexistent/filterbench", None);
        assert!(matches!(
            spawner.spawn(),
            Err(SupervisorError::SpawnFailed(_))
        ));
        assert_eq!(spawner.isolation(), IsolationMode::Process);
    }
}
