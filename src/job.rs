/*!
 * Per-file translation job.
 *
 * A job reads and parses its subtitle file, splits it into batches, resolves
 * the batches one after the other and writes the output file once every batch
 * is resolved. Nothing is written for a job that fails or is cancelled.
 */

use std::fmt;
use std::path::PathBuf;

use chrono::Local;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::errors::QueueError;
use crate::file_utils::FileManager;
use crate::language_utils::prompt_language_name;
use crate::subtitle_codec::{Cue, LineEnding, SubtitleCodec};
use crate::translation::{BatchResolution, ContextDigest, CueBatch, TranslationEngine};

/// Queue-assigned job identifier
pub type JobId = usize;

/// Lifecycle of a file job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed(String),
    Cancelled(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::Cancelled(_))
    }

    /// Allowed moves: Pending to Running, Failed or Cancelled; Running to any terminal state
    pub fn can_transition_to(&self, next: &JobStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running | Self::Failed(_) | Self::Cancelled(_)) => true,
            (Self::Running, next) => next.is_terminal(),
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
            Self::Cancelled(_) => "cancelled",
        }
    }

    /// Failure or cancellation reason
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Failed(reason) | Self::Cancelled(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{}: {}", self.label(), reason),
            None => write!(f, "{}", self.label()),
        }
    }
}

/// What a job is asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub source_path: PathBuf,
    pub source_language: String,
    pub target_language: String,
    pub context_hint: String,
}

// @struct: A batch that kept its source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFallback {
    pub ordinal: usize,
    // @field: Cue number of the first cue in the batch
    pub first_cue: usize,
    pub cue_count: usize,
    pub reason: String,
}

/// Outcome of a job, as shown to callers
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub job_id: JobId,
    pub source_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub status: JobStatus,
    pub total_cues: usize,
    pub completed_cues: usize,
    pub total_batches: usize,
    pub completed_batches: usize,
    pub attempts: usize,
    pub fallbacks: Vec<BatchFallback>,
}

impl FileReport {
    /// True when the file was written and at least one batch kept its source text
    pub fn is_degraded(&self) -> bool {
        self.status == JobStatus::Succeeded && !self.fallbacks.is_empty()
    }
}

/// Progress snapshot of one job
#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    pub job_id: JobId,
    pub status: JobStatus,
    pub completed_cues: usize,
    pub total_cues: usize,
    pub completed_batches: usize,
    pub total_batches: usize,
}

impl JobProgress {
    /// Fraction of cues resolved; a finished job counts as complete
    pub fn ratio(&self) -> f64 {
        if self.status.is_terminal() {
            1.0
        } else if self.total_cues == 0 {
            0.0
        } else {
            self.completed_cues as f64 / self.total_cues as f64
        }
    }
}

/// Translation job for one subtitle file
pub struct FileJob {
    id: JobId,
    request: JobRequest,
    cancel: CancellationToken,
    status: JobStatus,
    prepared: bool,
    line_ending: LineEnding,
    total_cues: usize,
    batches: Vec<CueBatch>,
    translated: Vec<Cue>,
    completed_batches: usize,
    completed_cues: usize,
    attempts: usize,
    fallbacks: Vec<BatchFallback>,
    output_path: Option<PathBuf>,
}

impl FileJob {
    pub fn new(id: JobId, request: JobRequest, cancel: CancellationToken) -> Self {
        Self {
            id,
            request,
            cancel,
            status: JobStatus::Pending,
            prepared: false,
            line_ending: LineEnding::default(),
            total_cues: 0,
            batches: Vec::new(),
            translated: Vec::new(),
            completed_batches: 0,
            completed_cues: 0,
            attempts: 0,
            fallbacks: Vec::new(),
            output_path: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    pub fn request(&self) -> &JobRequest {
        &self.request
    }

    pub fn batches(&self) -> &[CueBatch] {
        &self.batches
    }

    pub fn progress(&self) -> JobProgress {
        JobProgress {
            job_id: self.id,
            status: self.status.clone(),
            completed_cues: self.completed_cues,
            total_cues: self.total_cues,
            completed_batches: self.completed_batches,
            total_batches: self.batches.len(),
        }
    }

    pub fn report(&self) -> FileReport {
        FileReport {
            job_id: self.id,
            source_path: self.request.source_path.clone(),
            output_path: self.output_path.clone(),
            status: self.status.clone(),
            total_cues: self.total_cues,
            completed_cues: self.completed_cues,
            total_batches: self.batches.len(),
            completed_batches: self.completed_batches,
            attempts: self.attempts,
            fallbacks: self.fallbacks.clone(),
        }
    }

    fn transition(&mut self, next: JobStatus) {
        if !self.status.can_transition_to(&next) {
            warn!("Job {}: ignoring move from {} to {}", self.id, self.status, next);
            return;
        }
        match &next {
            JobStatus::Failed(reason) => error!("{}: failed: {}", self.request.source_path.display(), reason),
            JobStatus::Cancelled(reason) => warn!("{}: cancelled: {}", self.request.source_path.display(), reason),
            JobStatus::Succeeded => info!(
                "{}: translated {} cues ({} batches kept their source text)",
                self.request.source_path.display(),
                self.total_cues,
                self.fallbacks.len()
            ),
            _ => {}
        }
        self.status = next;
    }

    /// Read, parse and batch the input.
    ///
    /// Unreadable or unparsable input moves the job from Pending to Failed.
    /// Returns whether the job is ready to run.
    pub fn prepare(&mut self, engine: &TranslationEngine) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        if self.prepared {
            return true;
        }

        let languages = prompt_language_name(&self.request.source_language)
            .and_then(|_| prompt_language_name(&self.request.target_language));
        if let Err(e) = languages {
            self.transition(JobStatus::Failed(e.to_string()));
            return false;
        }

        let (cues, line_ending) = match SubtitleCodec::read_file(&self.request.source_path) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.transition(JobStatus::Failed(e.to_string()));
                return false;
            }
        };
        if cues.is_empty() {
            self.transition(JobStatus::Failed("no subtitle cues found".to_string()));
            return false;
        }

        self.line_ending = line_ending;
        self.total_cues = cues.len();
        self.batches = engine
            .chunker()
            .split(&cues, &self.request.source_language, &self.request.target_language);
        self.translated = Vec::with_capacity(cues.len());
        self.prepared = true;
        info!(
            "{}: {} cues in {} batches",
            self.request.source_path.display(),
            self.total_cues,
            self.batches.len()
        );
        true
    }

    fn cancel_reason(engine: &TranslationEngine) -> String {
        if engine.credentials_exhausted() {
            "halted: no usable API credentials remain".to_string()
        } else {
            "cancelled by user".to_string()
        }
    }

    /// Run the job to a terminal state.
    ///
    /// `notify` is called on every batch resolution and on every status change.
    /// Returns `NoUsableCredentials` when the job was halted because no
    /// credential can be used any more.
    pub async fn run(
        &mut self,
        engine: &TranslationEngine,
        notify: &(dyn Fn(&JobProgress) + Send + Sync),
    ) -> Result<(), QueueError> {
        if self.status.is_terminal() {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            self.transition(JobStatus::Cancelled(Self::cancel_reason(engine)));
            notify(&self.progress());
            return Ok(());
        }
        if !self.prepare(engine) {
            notify(&self.progress());
            return Ok(());
        }

        self.transition(JobStatus::Running);
        notify(&self.progress());

        let mut digest = ContextDigest::from_config(engine.context_config());
        for i in 0..self.batches.len() {
            if self.cancel.is_cancelled() {
                self.transition(JobStatus::Cancelled(Self::cancel_reason(engine)));
                notify(&self.progress());
                return Ok(());
            }

            let mut batch = self.batches[i].clone();
            batch.context_digest = if i == 0 { String::new() } else { digest.render() };

            match engine.translate_batch(&batch, &self.request.context_hint, &self.cancel).await {
                BatchResolution::Translated { groups, attempts } => {
                    self.attempts += attempts.len();
                    digest.record(&groups);
                    self.translated
                        .extend(batch.cues.iter().zip(groups).map(|(cue, lines)| cue.with_lines(lines)));
                }
                BatchResolution::Fallback { reason, attempts } => {
                    self.attempts += attempts.len();
                    warn!(
                        "{}: batch {} keeps its source text: {}",
                        self.request.source_path.display(),
                        batch.ordinal + 1,
                        reason
                    );
                    self.fallbacks.push(BatchFallback {
                        ordinal: batch.ordinal,
                        first_cue: batch.cues.first().map_or(0, |c| c.index),
                        cue_count: batch.len(),
                        reason,
                    });
                    self.translated
                        .extend(batch.cues.iter().map(|cue| cue.with_lines(engine.fallback_lines(cue))));
                }
                BatchResolution::Cancelled { attempts } => {
                    self.attempts += attempts.len();
                    self.transition(JobStatus::Cancelled(Self::cancel_reason(engine)));
                    notify(&self.progress());
                    return Ok(());
                }
                BatchResolution::Halted { reason, attempts } => {
                    self.attempts += attempts.len();
                    self.transition(JobStatus::Cancelled(format!("halted: {}", reason)));
                    notify(&self.progress());
                    return Err(QueueError::NoUsableCredentials);
                }
            }

            self.completed_batches += 1;
            self.completed_cues += batch.len();
            notify(&self.progress());
        }

        if self.cancel.is_cancelled() {
            self.transition(JobStatus::Cancelled(Self::cancel_reason(engine)));
            notify(&self.progress());
            return Ok(());
        }

        let output_path = FileManager::output_path_for(&self.request.source_path, engine.output_config(), Local::now());
        match SubtitleCodec::write_file(&output_path, &self.translated, self.line_ending) {
            Ok(()) => {
                self.output_path = Some(output_path);
                self.transition(JobStatus::Succeeded);
            }
            Err(e) => {
                self.transition(JobStatus::Failed(format!("could not write {}: {}", output_path.display(), e)));
            }
        }
        notify(&self.progress());
        Ok(())
    }
}
