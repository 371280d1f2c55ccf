//! Worker Process Entry Point
//!
//! The worker side of the supervisor-worker architecture. A worker process is
//! the `filterbench` binary started with the hidden worker flag; it says hello,
//! then applies its unit of work to every item the supervisor sends until told
//! to shut down.
//!
//! On Unix, uses the fd pair named by `FILTERBENCH_IPC_FD` and installs a
//! SIGTERM handler for graceful shutdown. Elsewhere it falls back to
//! stdin/stdout and skips signal handling.

use crate::unit::{UnitOfWork, apply_contained};
use filterbench_ipc::{
    FrameError, FrameReader, FrameWriter, IPC_FD_ENV, SupervisorCommand, WorkerHello,
    WorkerMessage,
};
use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(unix)]
use std::os::unix::io::FromRawFd;

/// Set by the SIGTERM handler.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Whether a graceful shutdown has been requested via SIGTERM.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

#[cfg(unix)]
fn install_sigterm_handler() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = sigterm_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
    }
}

#[cfg(unix)]
extern "C" fn sigterm_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

#[cfg(not(unix))]
fn install_sigterm_handler() {}

enum IpcTransport {
    #[cfg(unix)]
    Fds { read_fd: i32, write_fd: i32 },
    Stdio,
}

fn detect_transport() -> IpcTransport {
    #[cfg(unix)]
    if let Ok(val) = std::env::var(IPC_FD_ENV) {
        if let Some((r, w)) = val.split_once(',') {
            if let (Ok(read_fd), Ok(write_fd)) = (r.trim().parse(), w.trim().parse()) {
                return IpcTransport::Fds { read_fd, write_fd };
            }
        }
        eprintln!(
            "filterbench: warning: invalid {}={:?} (expected <read_fd>,<write_fd>), falling back to stdio",
            IPC_FD_ENV, val
        );
    }
    IpcTransport::Stdio
}

/// Worker main loop
pub struct WorkerMain {
    reader: FrameReader<Box<dyn Read>>,
    writer: FrameWriter<Box<dyn Write>>,
    unit: Arc<dyn UnitOfWork>,
}

impl WorkerMain {
    /// Create a worker applying `unit`, using the inherited fd pair if
    /// `FILTERBENCH_IPC_FD` is set, otherwise stdin/stdout.
    pub fn new(unit: Arc<dyn UnitOfWork>) -> Self {
        match detect_transport() {
            #[cfg(unix)]
            IpcTransport::Fds { read_fd, write_fd } => {
                let read_file = unsafe { std::fs::File::from_raw_fd(read_fd) };
                let write_file = unsafe { std::fs::File::from_raw_fd(write_fd) };
                Self::with_streams(Box::new(read_file), Box::new(write_file), unit)
            }
            IpcTransport::Stdio => {
                Self::with_streams(Box::new(std::io::stdin()), Box::new(std::io::stdout()), unit)
            }
        }
    }

    /// Create a worker over arbitrary streams
    pub fn with_streams(
        reader: Box<dyn Read>,
        writer: Box<dyn Write>,
        unit: Arc<dyn UnitOfWork>,
    ) -> Self {
        Self {
            reader: FrameReader::new(reader),
            writer: FrameWriter::new(writer),
            unit,
        }
    }

    /// Run until `Shutdown`, SIGTERM, or the supervisor closes the channel.
    /// Returns the number of items processed.
    pub fn run(&mut self) -> Result<u64, FrameError> {
        install_sigterm_handler();

        self.writer
            .send(&WorkerMessage::Hello(WorkerHello::current()))?;

        let mut processed = 0u64;
        loop {
            if shutdown_requested() {
                break;
            }

            let command: SupervisorCommand = match self.reader.recv() {
                Ok(command) => command,
                // Supervisor went away; nothing left to answer.
                Err(FrameError::EndOfStream) => break,
                Err(e) => return Err(e),
            };

            match command {
                SupervisorCommand::Apply(item) => {
                    let result = apply_contained(self.unit.as_ref(), &item);
                    self.writer.send(&WorkerMessage::Completed(result))?;
                    processed += 1;
                }
                SupervisorCommand::Ping => {
                    self.writer.send(&WorkerMessage::Pong)?;
                }
                SupervisorCommand::Shutdown => break,
            }
        }

        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filterbench_ipc::{WorkItem, WorkResult, WorkerId};
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Writer that keeps its bytes reachable after being boxed
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn commands(cmds: &[SupervisorCommand]) -> Vec<u8> {
        let out = SharedBuf::default();
        {
            let mut writer = FrameWriter::new(out.clone());
            for cmd in cmds {
                writer.send(cmd).unwrap();
            }
        }
        std::mem::take(&mut *out.0.lock().unwrap())
    }

    fn replies(buf: &SharedBuf) -> Vec<WorkerMessage> {
        let bytes = buf.0.lock().unwrap().clone();
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let mut out = Vec::new();
        while let Ok(msg) = reader.recv::<WorkerMessage>() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_hello_then_one_reply_per_item() {
        let input = commands(&[
            SupervisorCommand::Apply(WorkItem::new("a/1.png", "out")),
            SupervisorCommand::Ping,
            SupervisorCommand::Apply(WorkItem::new("a/2.png", "out")),
            SupervisorCommand::Shutdown,
            SupervisorCommand::Apply(WorkItem::new("a/never.png", "out")),
        ]);
        let output = SharedBuf::default();
        let unit = Arc::new(|item: &WorkItem| WorkResult::success(item.file_name(), WorkerId::Known(5)));

        let mut worker =
            WorkerMain::with_streams(Box::new(Cursor::new(input)), Box::new(output.clone()), unit);
        assert_eq!(worker.run().unwrap(), 2);

        let msgs = replies(&output);
        assert_eq!(msgs.len(), 4);
        match &msgs[0] {
            WorkerMessage::Hello(hello) => assert_eq!(hello.pid, std::process::id()),
            other => panic!("expected Hello, got {:?}", other),
        }
        assert!(matches!(&msgs[1], WorkerMessage::Completed(r) if r.identifier == "1.png"));
        assert!(matches!(&msgs[2], WorkerMessage::Pong));
        assert!(matches!(&msgs[3], WorkerMessage::Completed(r) if r.identifier == "2.png"));
    }

    #[test]
    fn test_closed_channel_ends_loop_cleanly() {
        let output = SharedBuf::default();
        let unit = Arc::new(|item: &WorkItem| WorkResult::success(item.file_name(), WorkerId::Unknown));
        let mut worker = WorkerMain::with_streams(
            Box::new(Cursor::new(Vec::new())),
            Box::new(output.clone()),
            unit,
        );
        assert_eq!(worker.run().unwrap(), 0);
        assert_eq!(replies(&output).len(), 1);
    }

    #[test]
    fn test_panicking_unit_still_replies() {
        let input = commands(&[SupervisorCommand::Apply(WorkItem::new("x/boom.png", "out"))]);
        let output = SharedBuf::default();
        let unit = Arc::new(|_: &WorkItem| -> WorkResult { panic!("boom") });

        let mut worker =
            WorkerMain::with_streams(Box::new(Cursor::new(input)), Box::new(output.clone()), unit);
        assert_eq!(worker.run().unwrap(), 1);

        match &replies(&output)[1] {
            WorkerMessage::Completed(result) => {
                assert!(!result.is_success());
                assert_eq!(result.identifier, "x_boom.png");
            }
            other => panic!("expected Completed, got {:?}", other),
        }
    }
}
