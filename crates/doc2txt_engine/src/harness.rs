//! Process-isolated execution of conversion tasks.
//!
//! Each worker is a child process speaking the [`crate::protocol`] over its
//! stdin/stdout. A reader thread per worker forwards replies to the
//! aggregation loop, which waits on that channel no longer than the earliest
//! running deadline. A task whose deadline passes is reported as timed out,
//! its worker is detached from the pool and a fresh worker takes the slot.
//!
//! On unix every worker leads its own process group, so killing a worker also
//! kills any converter it started. External-tool work directories are created
//! inside a scratch directory owned by the run and removed when it ends.

use std::collections::{BTreeMap, VecDeque};
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use doc2txt_core::{
    update, ProgressLine, RunStatistics, SourceFile, TaskCompletion, TaskId, TaskResult, TaskState,
};
use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use tempfile::TempDir;

use crate::protocol::{
    read_message, write_message, ProtocolError, WorkerReply, WorkerRequest, WorkerSettings,
    WORKER_FLAG,
};

/// How a worker process is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The running executable, re-invoked in worker mode.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, vec![WORKER_FLAG.to_string()]))
    }
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub concurrency: usize,
    pub task_timeout: Duration,
    /// Kill a timed-out worker right away instead of at the end of the run.
    pub kill_on_timeout: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            concurrency: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            task_timeout: Duration::from_secs(120),
            kill_on_timeout: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarnessEvent {
    TaskStarted {
        task_id: TaskId,
        relative_path: PathBuf,
    },
    TaskFinished {
        completion: TaskCompletion,
        line: ProgressLine,
    },
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: HarnessEvent);
}

pub struct ChannelProgressSink {
    tx: mpsc::Sender<HarnessEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<HarnessEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: HarnessEvent) {
        let _ = self.tx.send(event);
    }
}

enum WorkerSignal {
    Reply { worker_id: usize, reply: WorkerReply },
    Exited { worker_id: usize },
}

struct Running {
    task_id: TaskId,
    relative_path: PathBuf,
    deadline: Instant,
}

struct Worker {
    id: usize,
    child: Child,
    stdin: Option<ChildStdin>,
    running: Option<Running>,
}

impl Worker {
    fn send(&mut self, request: &WorkerRequest) -> Result<(), ProtocolError> {
        match self.stdin.as_mut() {
            Some(stdin) => write_message(stdin, request),
            None => Err(ProtocolError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "worker input already closed",
            ))),
        }
    }

    fn kill(mut self) {
        self.stdin = None;
        kill_process_group(&mut self.child);
        let _ = self.child.wait();
    }

    /// Closes stdin and waits for the worker to exit on its own.
    fn shut_down(mut self) {
        self.stdin = None;
        match self.child.wait() {
            Ok(status) => engine_debug!("worker {} exited: {status}", self.id),
            Err(err) => engine_warn!("worker {} could not be reaped: {err}", self.id),
        }
    }
}

/// Runs every source file in a bounded pool of worker processes.
pub struct Harness {
    command: WorkerCommand,
    settings: WorkerSettings,
    config: HarnessConfig,
}

impl Harness {
    pub fn new(command: WorkerCommand, settings: WorkerSettings, config: HarnessConfig) -> Self {
        Self {
            command,
            settings,
            config,
        }
    }

    /// Converts all `sources` and returns the finalized statistics. Task ids
    /// are assigned from 1 in input order.
    pub fn run(&self, sources: Vec<SourceFile>, sink: &dyn ProgressSink) -> RunStatistics {
        let started = Instant::now();
        let scratch = match tempfile::Builder::new().prefix("doc2txt-run-").tempdir() {
            Ok(dir) => Some(dir),
            Err(err) => {
                engine_warn!("cannot create scratch directory: {err}");
                None
            }
        };
        let mut settings = self.settings.clone();
        settings.handlers.scratch_dir = scratch.as_ref().map(|dir| dir.path().to_path_buf());

        let mut run = RunState::new(self, settings, sources, sink);
        run.drive();
        let mut stats = run.finish();
        if let Some(dir) = scratch {
            remove_scratch(dir);
        }
        stats.finalize(started.elapsed());
        stats
    }
}

fn remove_scratch(dir: TempDir) {
    let path = dir.path().to_path_buf();
    match dir.close() {
        Ok(()) => engine_debug!("removed scratch directory {}", path.display()),
        Err(err) => engine_warn!("cannot remove scratch directory {}: {err}", path.display()),
    }
}

#[cfg(unix)]
fn configure_worker(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn configure_worker(_command: &mut Command) {}

/// Kills the worker and everything in its process group.
#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    // SAFETY: kill(2) only delivers a signal; the group id is our own child's pid.
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } != 0 {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}

struct RunState<'a> {
    harness: &'a Harness,
    settings: WorkerSettings,
    sink: &'a dyn ProgressSink,
    queue: VecDeque<(TaskId, SourceFile)>,
    states: BTreeMap<TaskId, TaskState>,
    slots: Vec<Option<Worker>>,
    detached: Vec<Worker>,
    stats: RunStatistics,
    next_worker_id: usize,
    tx: mpsc::Sender<WorkerSignal>,
    rx: mpsc::Receiver<WorkerSignal>,
}

impl<'a> RunState<'a> {
    fn new(
        harness: &'a Harness,
        settings: WorkerSettings,
        sources: Vec<SourceFile>,
        sink: &'a dyn ProgressSink,
    ) -> Self {
        let pool = harness.config.concurrency.min(sources.len()).max(1);
        let queue: VecDeque<(TaskId, SourceFile)> = (1..).zip(sources).collect();
        let states = queue
            .iter()
            .map(|(task_id, _)| (*task_id, TaskState::default()))
            .collect();
        let (tx, rx) = mpsc::channel();
        engine_info!(
            "running {} task(s) on {pool} worker(s), timeout {} s",
            queue.len(),
            harness.config.task_timeout.as_secs()
        );
        Self {
            harness,
            settings,
            sink,
            queue,
            states,
            slots: (0..pool).map(|_| None).collect(),
            detached: Vec::new(),
            stats: RunStatistics::new(),
            next_worker_id: 1,
            tx,
            rx,
        }
    }

    fn drive(&mut self) {
        loop {
            self.expire_deadlines();
            self.dispatch_queued();
            if self.queue.is_empty() && self.busy_count() == 0 {
                break;
            }
            let wait = self
                .earliest_deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(self.harness.config.task_timeout);
            match self.rx.recv_timeout(wait) {
                Ok(signal) => self.handle(signal),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn finish(mut self) -> RunStatistics {
        for worker in self.slots.iter_mut().filter_map(Option::take) {
            worker.shut_down();
        }
        for worker in self.detached.drain(..) {
            engine_debug!("terminating detached worker {}", worker.id);
            worker.kill();
        }
        self.stats
    }

    fn busy_count(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|worker| worker.running.is_some())
            .count()
    }

    fn earliest_deadline(&self) -> Option<Instant> {
        self.slots
            .iter()
            .flatten()
            .filter_map(|worker| worker.running.as_ref().map(|task| task.deadline))
            .min()
    }

    fn dispatch_queued(&mut self) {
        for slot in 0..self.slots.len() {
            while !self.queue.is_empty() {
                if self.slots[slot].is_none() {
                    match self.spawn_worker() {
                        Ok(worker) => self.slots[slot] = Some(worker),
                        Err(err) => {
                            engine_error!("cannot start worker: {err}");
                            if let Some((task_id, source)) = self.queue.pop_front() {
                                self.complete(
                                    task_id,
                                    source.relative_path,
                                    TaskResult::CrashedWorker {
                                        detail: format!("worker could not be started: {err}"),
                                    },
                                );
                            }
                            continue;
                        }
                    }
                }
                if !self.assign_next(slot) {
                    break;
                }
            }
        }
    }

    /// Sends the next queued task to the idle worker in `slot`. Returns false
    /// when the worker is busy.
    fn assign_next(&mut self, slot: usize) -> bool {
        let Some(worker) = self.slots[slot].as_mut() else {
            return true;
        };
        if worker.running.is_some() {
            return false;
        }
        let Some((task_id, source)) = self.queue.pop_front() else {
            return false;
        };
        let request = WorkerRequest::Convert {
            task_id,
            source: source.clone(),
        };
        if let Err(err) = worker.send(&request) {
            engine_warn!("worker {} rejected task {task_id}: {err}", worker.id);
            if let Some(worker) = self.slots[slot].take() {
                worker.kill();
            }
            self.complete(
                task_id,
                source.relative_path,
                TaskResult::CrashedWorker {
                    detail: format!("worker stopped accepting tasks: {err}"),
                },
            );
            return true;
        }

        worker.running = Some(Running {
            task_id,
            relative_path: source.relative_path.clone(),
            deadline: Instant::now() + self.harness.config.task_timeout,
        });
        if let Some(state) = self.states.get_mut(&task_id) {
            if let Some(next) = state.start() {
                *state = next;
            }
        }
        self.sink.emit(HarnessEvent::TaskStarted {
            task_id,
            relative_path: source.relative_path,
        });
        true
    }

    fn spawn_worker(&mut self) -> Result<Worker, ProtocolError> {
        let id = self.next_worker_id;
        self.next_worker_id += 1;
        let command = &self.harness.command;
        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        configure_worker(&mut process);
        let mut child = process.spawn()?;

        let stdout = child.stdout.take();
        let stdin = child.stdin.take();
        let tx = self.tx.clone();
        thread::spawn(move || {
            if let Some(stdout) = stdout {
                forward_replies(id, BufReader::new(stdout), &tx);
            }
            let _ = tx.send(WorkerSignal::Exited { worker_id: id });
        });

        let mut worker = Worker {
            id,
            child,
            stdin,
            running: None,
        };
        if let Err(err) = worker.send(&WorkerRequest::Init(self.settings.clone())) {
            worker.kill();
            return Err(err);
        }
        engine_debug!("worker {id} started (pid {})", worker.child.id());
        Ok(worker)
    }

    fn slot_of(&self, worker_id: usize) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|worker| worker.id == worker_id))
    }

    fn handle(&mut self, signal: WorkerSignal) {
        match signal {
            WorkerSignal::Reply {
                worker_id,
                reply: WorkerReply::Ready { pid },
            } => engine_debug!("worker {worker_id} ready as pid {pid}"),
            WorkerSignal::Reply {
                worker_id,
                reply: WorkerReply::Done { task_id, report },
            } => {
                let Some(slot) = self.slot_of(worker_id) else {
                    engine_debug!(
                        "ignoring late result for task {task_id} from worker {worker_id}"
                    );
                    return;
                };
                let Some(worker) = self.slots[slot].as_mut() else {
                    return;
                };
                match worker.running.take() {
                    Some(task) if task.task_id == task_id => {
                        self.complete(task_id, task.relative_path, TaskResult::Completed(report));
                    }
                    other => {
                        engine_warn!("worker {worker_id} answered unexpected task {task_id}");
                        worker.running = other;
                    }
                }
            }
            WorkerSignal::Reply {
                worker_id,
                reply: WorkerReply::Fatal { message },
            } => {
                engine_error!("worker {worker_id} gave up: {message}");
                self.retire(worker_id, message);
            }
            WorkerSignal::Exited { worker_id } => {
                self.retire(worker_id, "worker process exited unexpectedly".to_string());
            }
        }
    }

    /// Removes a dead worker from its slot; its running task, if any, is
    /// reported as crashed. The slot is refilled on the next dispatch.
    fn retire(&mut self, worker_id: usize, detail: String) {
        let Some(slot) = self.slot_of(worker_id) else {
            return;
        };
        let Some(mut worker) = self.slots[slot].take() else {
            return;
        };
        let running = worker.running.take();
        let status = match worker.child.try_wait() {
            Ok(Some(status)) => status.to_string(),
            _ => "still running".to_string(),
        };
        worker.kill();
        if let Some(task) = running {
            engine_error!("worker {worker_id} lost task {} ({status})", task.task_id);
            self.complete(
                task.task_id,
                task.relative_path,
                TaskResult::CrashedWorker {
                    detail: format!("{detail} ({status})"),
                },
            );
        }
    }

    fn expire_deadlines(&mut self) {
        let now = Instant::now();
        for slot in 0..self.slots.len() {
            let expired = self.slots[slot]
                .as_ref()
                .and_then(|worker| worker.running.as_ref())
                .is_some_and(|task| task.deadline <= now);
            if !expired {
                continue;
            }
            let Some(mut worker) = self.slots[slot].take() else {
                continue;
            };
            let Some(task) = worker.running.take() else {
                continue;
            };
            let after = self.harness.config.task_timeout;
            engine_warn!(
                "task {} ({}) exceeded {} s; detaching worker {}",
                task.task_id,
                task.relative_path.display(),
                after.as_secs(),
                worker.id
            );
            if self.harness.config.kill_on_timeout {
                worker.kill();
            } else {
                worker.stdin = None;
                self.detached.push(worker);
            }
            self.complete(task.task_id, task.relative_path, TaskResult::TimedOut { after });
        }
    }

    fn complete(&mut self, task_id: TaskId, relative_path: PathBuf, result: TaskResult) {
        let Some(state) = self.states.get_mut(&task_id) else {
            return;
        };
        let Some(next) = state.finish(&result) else {
            engine_warn!("task {task_id} already finished as {state:?}; ignoring {result:?}");
            return;
        };
        *state = next;
        let completion = TaskCompletion {
            task_id,
            relative_path,
            result,
        };
        let (stats, line) = update(std::mem::take(&mut self.stats), &completion);
        self.stats = stats;
        engine_info!("{line}");
        self.sink.emit(HarnessEvent::TaskFinished { completion, line });
    }
}

fn forward_replies<R: io::BufRead>(
    worker_id: usize,
    mut reader: R,
    tx: &mpsc::Sender<WorkerSignal>,
) {
    loop {
        match read_message::<_, WorkerReply>(&mut reader) {
            Ok(Some(reply)) => {
                if tx.send(WorkerSignal::Reply { worker_id, reply }).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(ProtocolError::Json(err)) => {
                engine_debug!("worker {worker_id}: ignoring non-protocol output ({err})");
            }
            Err(ProtocolError::Io(err)) => {
                engine_debug!("worker {worker_id}: output stream failed: {err}");
                return;
            }
        }
    }
}
