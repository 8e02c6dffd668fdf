/*!
 * Translation queue.
 *
 * Files are admitted in FIFO order and translated with at most
 * `concurrency_limit` files in flight. Every input is parsed when a run starts
 * so that cue totals are known up front and progress never moves backwards.
 *
 * Observers registered with `on_progress` and `on_file_complete` are called
 * synchronously, never while the queue state is locked.
 */

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use log::{error, info, warn};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::app_config::Config;
use crate::errors::QueueError;
use crate::job::{FileJob, FileReport, JobId, JobProgress, JobRequest, JobStatus};
use crate::providers::CompletionProvider;
use crate::translation::TranslationEngine;

/// Progress of one file
#[derive(Debug, Clone, PartialEq)]
pub struct FileProgress {
    pub job_id: JobId,
    pub source_path: PathBuf,
    pub status: JobStatus,
    pub completed_cues: usize,
    pub total_cues: usize,
    pub completed_batches: usize,
    pub total_batches: usize,
    pub ratio: f64,
}

/// Progress across every file in the queue
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverallProgress {
    pub total_files: usize,
    pub finished_files: usize,
    /// Resolved cues; a finished file counts all of its cues
    pub completed_cues: usize,
    pub total_cues: usize,
    pub ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueProgress {
    pub per_file: Vec<FileProgress>,
    pub overall: OverallProgress,
}

/// Delivered to `on_progress` observers
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub file: FileProgress,
    pub overall: OverallProgress,
}

/// Result of a `start` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueReport {
    /// Reports of the files handled by the run, in admission order
    pub files: Vec<FileReport>,
    /// Set when the run was halted
    pub fatal: Option<QueueError>,
}

impl QueueReport {
    fn count(&self, pred: impl Fn(&JobStatus) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.status)).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|s| *s == JobStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, JobStatus::Failed(_)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|s| matches!(s, JobStatus::Cancelled(_)))
    }

    pub fn degraded(&self) -> usize {
        self.files.iter().filter(|f| f.is_degraded()).count()
    }

    /// Files of the run that produced no output
    pub fn unfinished(&self) -> usize {
        self.files.len() - self.succeeded()
    }
}

type ProgressObserver = Box<dyn Fn(&ProgressEvent) + Send + Sync>;
type CompletionObserver = Box<dyn Fn(&FileReport) + Send + Sync>;

#[derive(Default)]
struct Observers {
    progress: Vec<ProgressObserver>,
    file_complete: Vec<CompletionObserver>,
}

// @struct: Queue bookkeeping for one job
struct JobSlot {
    request: JobRequest,
    progress: JobProgress,
    report: Option<FileReport>,
    // @field: Set while the job belongs to a run
    cancel: Option<CancellationToken>,
}

impl JobSlot {
    fn new(id: JobId, request: JobRequest) -> Self {
        Self {
            request,
            progress: JobProgress {
                job_id: id,
                status: JobStatus::Pending,
                completed_cues: 0,
                total_cues: 0,
                completed_batches: 0,
                total_batches: 0,
            },
            report: None,
            cancel: None,
        }
    }

    fn id(&self) -> JobId {
        self.progress.job_id
    }

    fn status(&self) -> &JobStatus {
        &self.progress.status
    }

    fn file_progress(&self) -> FileProgress {
        FileProgress {
            job_id: self.id(),
            source_path: self.request.source_path.clone(),
            status: self.progress.status.clone(),
            completed_cues: self.progress.completed_cues,
            total_cues: self.progress.total_cues,
            completed_batches: self.progress.completed_batches,
            total_batches: self.progress.total_batches,
            ratio: self.progress.ratio(),
        }
    }
}

struct QueueState {
    slots: Vec<JobSlot>,
    next_id: JobId,
    running: bool,
    run_cancel: CancellationToken,
}

impl QueueState {
    fn slot_mut(&mut self, id: JobId) -> Option<&mut JobSlot> {
        self.slots.iter_mut().find(|s| s.id() == id)
    }

    fn push(&mut self, request: JobRequest) -> JobId {
        let id = self.next_id;
        self.next_id += 1;
        self.slots.push(JobSlot::new(id, request));
        id
    }

    fn overall(&self) -> OverallProgress {
        let mut overall = OverallProgress {
            total_files: self.slots.len(),
            ..OverallProgress::default()
        };
        for slot in &self.slots {
            let progress = &slot.progress;
            overall.total_cues += progress.total_cues;
            if progress.status.is_terminal() {
                overall.finished_files += 1;
                overall.completed_cues += progress.total_cues;
            } else {
                overall.completed_cues += progress.completed_cues;
            }
        }
        overall.ratio = if overall.total_files > 0 && overall.finished_files == overall.total_files {
            1.0
        } else if overall.total_cues == 0 {
            0.0
        } else {
            overall.completed_cues as f64 / overall.total_cues as f64
        };
        overall
    }
}

/// FIFO translation queue with bounded concurrency
pub struct QueueScheduler {
    engine: Arc<TranslationEngine>,
    concurrency_limit: usize,
    state: Mutex<QueueState>,
    observers: RwLock<Observers>,
}

impl QueueScheduler {
    /// Create a scheduler for `config`, calling the model through `provider`
    pub fn new(config: &Config, provider: Arc<dyn CompletionProvider>) -> Result<Self> {
        let engine = TranslationEngine::from_config(config, provider)?;
        Ok(Self::with_engine(Arc::new(engine), config.queue.concurrency_limit))
    }

    pub fn with_engine(engine: Arc<TranslationEngine>, concurrency_limit: usize) -> Self {
        Self {
            engine,
            concurrency_limit: concurrency_limit.max(1),
            state: Mutex::new(QueueState {
                slots: Vec::new(),
                next_id: 1,
                running: false,
                run_cancel: CancellationToken::new(),
            }),
            observers: RwLock::new(Observers::default()),
        }
    }

    pub fn engine(&self) -> &Arc<TranslationEngine> {
        &self.engine
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Add files to the back of the queue
    pub fn enqueue<I, P>(&self, paths: I, source_language: &str, target_language: &str, context_hint: &str) -> Vec<JobId>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut state = self.state.lock();
        paths
            .into_iter()
            .map(|path| {
                state.push(JobRequest {
                    source_path: path.into(),
                    source_language: source_language.to_string(),
                    target_language: target_language.to_string(),
                    context_hint: context_hint.to_string(),
                })
            })
            .collect()
    }

    /// Register a callback fired on every batch resolution and status change
    pub fn on_progress<F>(&self, callback: F)
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.observers.write().progress.push(Box::new(callback));
    }

    /// Register a callback fired when a file reaches a terminal state
    pub fn on_file_complete<F>(&self, callback: F)
    where
        F: Fn(&FileReport) + Send + Sync + 'static,
    {
        self.observers.write().file_complete.push(Box::new(callback));
    }

    /// Snapshot of every file and the aggregate
    pub fn progress(&self) -> QueueProgress {
        let state = self.state.lock();
        QueueProgress {
            per_file: state.slots.iter().map(JobSlot::file_progress).collect(),
            overall: state.overall(),
        }
    }

    /// Translate every pending file.
    ///
    /// Returns once every admitted job reached a terminal state.
    pub async fn start(&self) -> Result<QueueReport, QueueError> {
        let mut jobs: Vec<FileJob> = {
            let mut state = self.state.lock();
            if state.running {
                return Err(QueueError::AlreadyRunning);
            }
            state.running = true;
            state.run_cancel = CancellationToken::new();
            let run_cancel = state.run_cancel.clone();

            state
                .slots
                .iter_mut()
                .filter(|slot| *slot.status() == JobStatus::Pending)
                .map(|slot| {
                    let token = run_cancel.child_token();
                    slot.cancel = Some(token.clone());
                    FileJob::new(slot.id(), slot.request.clone(), token)
                })
                .collect()
        };
        info!("Starting queue run: {} files, up to {} at a time", jobs.len(), self.concurrency_limit);

        // Parse everything first so totals are known before any progress is reported
        for job in &mut jobs {
            job.prepare(&self.engine);
            self.update_progress(job.progress(), job.status().is_terminal());
        }

        let outcomes: Vec<(FileReport, Result<(), QueueError>)> = stream::iter(jobs)
            .map(|mut job| async move {
                let notify = |progress: &JobProgress| self.update_progress(progress.clone(), true);
                let result = job.run(&self.engine, &notify).await;
                if let Err(e) = &result {
                    error!("{}", e);
                    self.state.lock().run_cancel.cancel();
                }
                let report = job.report();
                self.finish_job(&report);
                (report, result)
            })
            .buffer_unordered(self.concurrency_limit)
            .collect()
            .await;

        let mut report = QueueReport::default();
        for (file, result) in outcomes {
            if let Err(e) = result {
                report.fatal.get_or_insert(e);
            }
            report.files.push(file);
        }
        report.files.sort_by_key(|f| f.job_id);

        self.state.lock().running = false;
        info!(
            "Queue run finished: {} succeeded, {} failed, {} cancelled",
            report.succeeded(),
            report.failed(),
            report.cancelled()
        );
        Ok(report)
    }

    /// Cancel the current run. When idle, pending files are cancelled instead.
    pub fn cancel(&self) {
        let events = {
            let mut state = self.state.lock();
            if state.running {
                info!("Cancelling queue run");
                state.run_cancel.cancel();
                Vec::new()
            } else {
                let mut events = Vec::new();
                for slot in state.slots.iter_mut().filter(|s| *s.status() == JobStatus::Pending) {
                    slot.progress.status = JobStatus::Cancelled("cancelled by user".to_string());
                    events.push(slot.file_progress());
                }
                let overall = state.overall();
                events
                    .into_iter()
                    .map(|file| ProgressEvent { file, overall: overall.clone() })
                    .collect()
            }
        };
        self.emit(&events);
    }

    /// Cancel one job; a running job stops before its next batch
    pub fn cancel_job(&self, id: JobId) -> Result<(), QueueError> {
        let event = {
            let mut state = self.state.lock();
            let running = state.running;
            let slot = state.slot_mut(id).ok_or(QueueError::InvalidJob(id))?;
            if slot.status().is_terminal() {
                return Err(QueueError::InvalidJob(id));
            }
            let in_run = if running { slot.cancel.clone() } else { None };
            if let Some(token) = in_run {
                token.cancel();
                None
            } else {
                slot.progress.status = JobStatus::Cancelled("cancelled by user".to_string());
                let file = slot.file_progress();
                Some(ProgressEvent { file, overall: state.overall() })
            }
        };
        if let Some(event) = event {
            self.emit(&[event]);
        }
        Ok(())
    }

    /// Remove a job that is not part of an active run
    pub fn remove(&self, id: JobId) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        let running = state.running;
        let position = state
            .slots
            .iter()
            .position(|s| s.id() == id)
            .ok_or(QueueError::InvalidJob(id))?;
        let slot = &state.slots[position];
        let removable = slot.status().is_terminal() || (!running && *slot.status() == JobStatus::Pending);
        if !removable {
            return Err(QueueError::InvalidJob(id));
        }
        state.slots.remove(position);
        Ok(())
    }

    /// Drop finished jobs, and pending ones when no run is active.
    /// Returns the number of jobs removed.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let running = state.running;
        let before = state.slots.len();
        state
            .slots
            .retain(|s| !(s.status().is_terminal() || (!running && *s.status() == JobStatus::Pending)));
        before - state.slots.len()
    }

    /// Reports of the jobs that failed
    pub fn failed_jobs(&self) -> Vec<FileReport> {
        self.state
            .lock()
            .slots
            .iter()
            .filter(|s| matches!(s.status(), JobStatus::Failed(_)))
            .filter_map(|s| s.report.clone())
            .collect()
    }

    /// Put every failed job back at the end of the queue as a new pending job
    pub fn retry_failed(&self) -> Vec<JobId> {
        let mut state = self.state.lock();
        let (failed, kept): (Vec<JobSlot>, Vec<JobSlot>) = std::mem::take(&mut state.slots)
            .into_iter()
            .partition(|s| matches!(s.status(), JobStatus::Failed(_)));
        state.slots = kept;
        let ids: Vec<JobId> = failed.into_iter().map(|slot| state.push(slot.request)).collect();
        if !ids.is_empty() {
            info!("Re-queued {} failed files", ids.len());
        }
        ids
    }

    fn update_progress(&self, progress: JobProgress, emit: bool) {
        let event = {
            let mut state = self.state.lock();
            let Some(slot) = state.slot_mut(progress.job_id) else {
                warn!("Progress for unknown job {}", progress.job_id);
                return;
            };
            slot.progress = progress;
            let file = slot.file_progress();
            ProgressEvent { file, overall: state.overall() }
        };
        if emit {
            self.emit(&[event]);
        }
    }

    fn finish_job(&self, report: &FileReport) {
        let event = {
            let mut state = self.state.lock();
            let Some(slot) = state.slot_mut(report.job_id) else {
                return;
            };
            slot.report = Some(report.clone());
            let status_changed = slot.progress.status != report.status;
            slot.progress.status = report.status.clone();
            let file = slot.file_progress();
            status_changed.then(|| ProgressEvent { file, overall: state.overall() })
        };
        if let Some(event) = event {
            self.emit(&[event]);
        }
        for callback in &self.observers.read().file_complete {
            callback(report);
        }
    }

    fn emit(&self, events: &[ProgressEvent]) {
        if events.is_empty() {
            return;
        }
        let observers = self.observers.read();
        for event in events {
            for callback in &observers.progress {
                callback(event);
            }
        }
    }
}
