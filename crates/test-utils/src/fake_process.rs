use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::oneshot;

use cmdtask::exec::{ExitReport, ManagedProcess, OutputStream, ProcessLauncher, SignalError};
use cmdtask::task::{SpawnError, TaskSpec};

/// A control call the runner made on a fake process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessCall {
    Terminate,
    Kill,
    Pause,
    Resume,
}

const PIPE_CAPACITY: usize = 64 * 1024;
const FAKE_PID: u32 = 4242;

type ExitSender = Arc<Mutex<Option<oneshot::Sender<ExitReport>>>>;
type Pipe = Arc<tokio::sync::Mutex<Option<DuplexStream>>>;

/// A launcher whose processes are scripted from the test.
///
/// Each call to [`FakeLauncher::script`] queues one process; `launch` hands
/// them out in order and fails with a spawn error when none is queued.
pub struct FakeLauncher {
    queued: Mutex<VecDeque<FakeProcess>>,
    launched: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    suspension: bool,
}

impl FakeLauncher {
    pub fn new(suspension: bool) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            launched: Arc::new(Mutex::new(Vec::new())),
            suspension,
        }
    }

    /// Queue a process for the next launch and return its remote control.
    pub fn script(&self) -> FakeProcessControl {
        let (stdout_writer, stdout_reader) = tokio::io::duplex(PIPE_CAPACITY);
        let (stderr_writer, stderr_reader) = tokio::io::duplex(PIPE_CAPACITY);
        let (exit_tx, exit_rx) = oneshot::channel();

        let control = FakeProcessControl {
            stdout: Arc::new(tokio::sync::Mutex::new(Some(stdout_writer))),
            stderr: Arc::new(tokio::sync::Mutex::new(Some(stderr_writer))),
            exit: Arc::new(Mutex::new(Some(exit_tx))),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_signals: Arc::new(AtomicBool::new(false)),
            exit_on_terminate: Arc::new(AtomicBool::new(true)),
            gone: Arc::new(AtomicBool::new(false)),
        };

        let process = FakeProcess {
            stdout: Some(Box::new(stdout_reader)),
            stderr: Some(Box::new(stderr_reader)),
            exit_rx,
            control: control.clone(),
            suspension: self.suspension,
            paused: false,
            exited: false,
        };

        self.queued.lock().unwrap().push_back(process);
        control
    }

    /// `(program, args)` of every launch, in order.
    pub fn launched(&self) -> Vec<(String, Vec<String>)> {
        self.launched.lock().unwrap().clone()
    }

    pub fn launch_count(&self) -> usize {
        self.launched.lock().unwrap().len()
    }
}

impl ProcessLauncher for FakeLauncher {
    type Process = FakeProcess;

    fn launch(&self, spec: &TaskSpec) -> Result<FakeProcess, SpawnError> {
        let next = self.queued.lock().unwrap().pop_front();
        match next {
            Some(process) => {
                self.launched
                    .lock()
                    .unwrap()
                    .push((spec.program.clone(), spec.args.clone()));
                Ok(process)
            }
            None => Err(SpawnError::from_io(
                spec.program.clone(),
                &io::Error::new(io::ErrorKind::NotFound, "no scripted process"),
            )),
        }
    }

    fn supports_suspension(&self) -> bool {
        self.suspension
    }
}

/// Test-side remote control for one fake process.
#[derive(Clone)]
pub struct FakeProcessControl {
    stdout: Pipe,
    stderr: Pipe,
    exit: ExitSender,
    calls: Arc<Mutex<Vec<ProcessCall>>>,
    fail_signals: Arc<AtomicBool>,
    exit_on_terminate: Arc<AtomicBool>,
    gone: Arc<AtomicBool>,
}

impl FakeProcessControl {
    pub async fn write_stdout(&self, text: &str) {
        write_pipe(&self.stdout, text.as_bytes()).await;
    }

    pub async fn write_stderr(&self, text: &str) {
        write_pipe(&self.stderr, text.as_bytes()).await;
    }

    pub async fn write_stdout_bytes(&self, bytes: &[u8]) {
        write_pipe(&self.stdout, bytes).await;
    }

    pub async fn write_stderr_bytes(&self, bytes: &[u8]) {
        write_pipe(&self.stderr, bytes).await;
    }

    /// Close stdout and stderr (EOF on the runner side).
    pub async fn close_output(&self) {
        self.stdout.lock().await.take();
        self.stderr.lock().await.take();
    }

    /// Close output and make the process exit with `report`.
    pub async fn exit(&self, report: ExitReport) {
        self.close_output().await;
        send_exit(&self.exit, report);
    }

    /// Make pause / resume / terminate fail with a delivery error.
    pub fn fail_signals(&self, fail: bool) {
        self.fail_signals.store(fail, Ordering::SeqCst);
    }

    /// Make every signal fail with `ProcessGone`, as for a process that has
    /// died but not been reaped yet.
    pub fn vanish(&self) {
        self.gone.store(true, Ordering::SeqCst);
    }

    /// Whether terminate makes the process exit (default: true).
    pub fn exit_on_terminate(&self, exit: bool) {
        self.exit_on_terminate.store(exit, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ProcessCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: ProcessCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    fn record(&self, call: ProcessCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn signal_result(&self, signal: &'static str) -> Result<(), SignalError> {
        if self.gone.load(Ordering::SeqCst) {
            Err(SignalError::ProcessGone { pid: FAKE_PID })
        } else if self.fail_signals.load(Ordering::SeqCst) {
            Err(SignalError::Delivery {
                pid: FAKE_PID,
                signal,
                reason: "scripted failure".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn close_pipes_now(&self) {
        if let Ok(mut out) = self.stdout.try_lock() {
            out.take();
        }
        if let Ok(mut err) = self.stderr.try_lock() {
            err.take();
        }
    }
}

async fn write_pipe(pipe: &Pipe, bytes: &[u8]) {
    let mut guard = pipe.lock().await;
    if let Some(writer) = guard.as_mut() {
        writer
            .write_all(bytes)
            .await
            .expect("fake pipe write failed");
        writer.flush().await.expect("fake pipe flush failed");
    }
}

fn send_exit(exit: &ExitSender, report: ExitReport) {
    if let Some(tx) = exit.lock().unwrap().take() {
        let _ = tx.send(report);
    }
}

/// Runner-side half of a scripted process.
pub struct FakeProcess {
    stdout: Option<OutputStream>,
    stderr: Option<OutputStream>,
    exit_rx: oneshot::Receiver<ExitReport>,
    control: FakeProcessControl,
    suspension: bool,
    paused: bool,
    exited: bool,
}

impl ManagedProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(FAKE_PID)
    }

    fn take_stdout(&mut self) -> Option<OutputStream> {
        self.stdout.take()
    }

    fn take_stderr(&mut self) -> Option<OutputStream> {
        self.stderr.take()
    }

    fn terminate(&mut self) -> Result<(), SignalError> {
        self.control.record(ProcessCall::Terminate);
        self.control.signal_result("SIGTERM")?;
        if self.control.exit_on_terminate.load(Ordering::SeqCst) {
            self.control.close_pipes_now();
            send_exit(&self.control.exit, ExitReport::Signaled(Some(15)));
        }
        Ok(())
    }

    fn kill(&mut self) -> Result<(), SignalError> {
        self.control.record(ProcessCall::Kill);
        if self.control.gone.load(Ordering::SeqCst) {
            return Err(SignalError::ProcessGone { pid: FAKE_PID });
        }
        self.control.close_pipes_now();
        send_exit(&self.control.exit, ExitReport::Signaled(Some(9)));
        Ok(())
    }

    fn supports_suspension(&self) -> bool {
        self.suspension
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn pause(&mut self) -> Result<(), SignalError> {
        if !self.suspension {
            return Err(SignalError::Unsupported);
        }
        if self.paused {
            return Ok(());
        }
        self.control.record(ProcessCall::Pause);
        self.control.signal_result("SIGSTOP")?;
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), SignalError> {
        if !self.paused {
            return Ok(());
        }
        self.control.record(ProcessCall::Resume);
        self.control.signal_result("SIGCONT")?;
        self.paused = false;
        Ok(())
    }

    fn wait_for_exit(&mut self) -> Pin<Box<dyn Future<Output = ExitReport> + Send + '_>> {
        Box::pin(async move {
            if self.exited {
                return ExitReport::WaitFailed("already reaped".to_string());
            }
            let report = match (&mut self.exit_rx).await {
                Ok(report) => report,
                Err(_) => ExitReport::WaitFailed("fake process control dropped".to_string()),
            };
            self.exited = true;
            self.paused = false;
            report
        })
    }
}
