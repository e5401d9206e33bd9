use std::any::Any;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use walkdir::WalkDir;

use crate::detection::domain::detection_error::{CreationError, ProcessingError};
use crate::detection::domain::detector_config::DetectorConfig;
use crate::detection::domain::detector_factory::DetectorFactory;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::imaging::domain::image_reader::ImageReader;
use crate::pipeline::status_code::StatusCode;
use crate::pipeline::task_queue::{AddError, BoundedTaskQueue, Task};
use crate::shared::constants::{IMAGE_EXTENSIONS, MAX_POOL_SIZE, MAX_WORKER_COUNT};
use crate::shared::rect::Rect;

/// Tunables of a [`Processor`].
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessorOptions {
    pub max_workers: usize,
    pub queue_capacity: usize,
    /// How long the directory walk waits for queue space before dropping a
    /// path. `None` waits indefinitely.
    pub admission_timeout: Option<Duration>,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            max_workers: MAX_WORKER_COUNT,
            queue_capacity: MAX_POOL_SIZE,
            admission_timeout: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum InitError {
    #[error("workers number {requested} is outside 1..={max}")]
    IncorrectWorkerNumber { requested: usize, max: usize },
    #[error("detector description not found: {}", path.display())]
    FilesNotFound { path: PathBuf },
    #[error("failed to read detector description {}: {source}", path.display())]
    ReadSettings {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("detector description {} is not valid JSON: {source}", path.display())]
    ParseSettings {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot build detector: {0}")]
    BadDataFile(#[source] CreationError),
    #[error("processor is already initialized")]
    AlreadyInitialized,
    #[error("unexpected initialization error: {0}")]
    Unexpected(String),
}

impl InitError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            InitError::IncorrectWorkerNumber { .. } => StatusCode::InitIncorrectWorkerNumber,
            InitError::FilesNotFound { .. } => StatusCode::InitFilesNotFound,
            InitError::ReadSettings { .. } | InitError::ParseSettings { .. } => {
                StatusCode::InitBadSettingsFile
            }
            InitError::BadDataFile(_) => StatusCode::InitBadDataFile,
            InitError::AlreadyInitialized => StatusCode::InitDoubleInitialization,
            InitError::Unexpected(_) => StatusCode::InitUnexpectedError,
        }
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("processor is not initialized")]
    Uninitialized,
    #[error("image folder does not exist: {}", path.display())]
    ImageFolderNotFound { path: PathBuf },
    #[error("unexpected processing error: {0}")]
    Unexpected(String),
}

impl ProcessError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProcessError::Uninitialized => StatusCode::ProcessUninitialized,
            ProcessError::ImageFolderNotFound { .. } => StatusCode::ProcessImageFolderNotFound,
            ProcessError::Unexpected(_) => StatusCode::ProcessUnexpectedError,
        }
    }
}

pub fn init_status(result: &Result<(), InitError>) -> StatusCode {
    match result {
        Ok(()) => StatusCode::InitSuccess,
        Err(e) => e.status_code(),
    }
}

pub fn process_status(result: &Result<ProcessSummary, ProcessError>) -> StatusCode {
    match result {
        Ok(_) => StatusCode::ProcessSuccess,
        Err(e) => e.status_code(),
    }
}

/// Per-run counts. `processed + skipped + failed == admitted`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Files with an allowed extension found by the walk.
    pub discovered: usize,
    pub admitted: usize,
    /// Discovered but never queued (admission timed out or the queue closed).
    pub dropped: usize,
    /// Files that reached `notify`.
    pub processed: usize,
    /// Files that failed to decode or detect.
    pub skipped: usize,
    /// Files whose processing panicked.
    pub failed: usize,
}

enum ProcessorState {
    Uninitialized,
    Initialized(Vec<Box<dyn ObjectDetector>>),
}

/// Runs a pool of detectors over every image below a directory.
///
/// `init` builds one private detector per worker from a description file;
/// `process` may then be called any number of times. Each call walks the
/// tree on the calling thread and feeds a bounded queue drained by the
/// workers.
pub struct Processor {
    factory: Box<dyn DetectorFactory>,
    reader: Box<dyn ImageReader>,
    options: ProcessorOptions,
    state: ProcessorState,
}

impl Processor {
    pub fn new(factory: Box<dyn DetectorFactory>, reader: Box<dyn ImageReader>) -> Self {
        Self::with_options(factory, reader, ProcessorOptions::default())
    }

    pub fn with_options(
        factory: Box<dyn DetectorFactory>,
        reader: Box<dyn ImageReader>,
        options: ProcessorOptions,
    ) -> Self {
        Self {
            factory,
            reader,
            options,
            state: ProcessorState::Uninitialized,
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, ProcessorState::Initialized(_))
    }

    /// Number of pooled detectors, 0 before a successful `init`.
    pub fn workers_number(&self) -> usize {
        match &self.state {
            ProcessorState::Initialized(detectors) => detectors.len(),
            ProcessorState::Uninitialized => 0,
        }
    }

    /// Builds `workers_number` detectors from the description at
    /// `description_path`. On failure nothing is kept and `init` may be
    /// retried.
    pub fn init(
        &mut self,
        workers_number: usize,
        description_path: &Path,
    ) -> Result<(), InitError> {
        if self.is_initialized() {
            return Err(InitError::AlreadyInitialized);
        }
        if workers_number == 0 || workers_number > self.options.max_workers {
            return Err(InitError::IncorrectWorkerNumber {
                requested: workers_number,
                max: self.options.max_workers,
            });
        }

        let config = read_description(description_path)?;
        let detectors = self.build_pool(&config, workers_number)?;
        log::info!(
            "Initialized {} \"{}\" detector(s) from {}",
            detectors.len(),
            config.kind(),
            description_path.display()
        );
        self.state = ProcessorState::Initialized(detectors);
        Ok(())
    }

    fn build_pool(
        &self,
        config: &DetectorConfig,
        workers_number: usize,
    ) -> Result<Vec<Box<dyn ObjectDetector>>, InitError> {
        let mut detectors = Vec::with_capacity(workers_number);
        for worker in 0..workers_number {
            match panic::catch_unwind(AssertUnwindSafe(|| self.factory.create(config))) {
                Ok(Ok(detector)) => detectors.push(detector),
                Ok(Err(e)) => {
                    log::error!("Detector {worker} could not be created: {e}");
                    return Err(InitError::BadDataFile(e));
                }
                Err(payload) => {
                    let message = panic_message(&*payload);
                    log::error!("Detector {worker} construction panicked: {message}");
                    return Err(InitError::Unexpected(message));
                }
            }
        }
        Ok(detectors)
    }

    /// Runs every pooled detector over the images below `root_dir`.
    ///
    /// `notify` is called once per successfully processed image, from
    /// several worker threads at once and in no particular order. Images
    /// that fail to decode or detect are skipped and counted.
    pub fn process<F>(
        &mut self,
        root_dir: &Path,
        notify: F,
    ) -> Result<ProcessSummary, ProcessError>
    where
        F: Fn(&Path, &[Rect]) + Sync,
    {
        let Processor {
            reader,
            options,
            state,
            ..
        } = self;
        let detectors = match state {
            ProcessorState::Initialized(detectors) => detectors,
            ProcessorState::Uninitialized => return Err(ProcessError::Uninitialized),
        };
        if !root_dir.is_dir() {
            return Err(ProcessError::ImageFolderNotFound {
                path: root_dir.to_path_buf(),
            });
        }

        let queue = BoundedTaskQueue::<PathBuf>::new(options.queue_capacity);
        let counters = WorkerCounters::default();
        let reader: &dyn ImageReader = &**reader;
        let notify = &notify;

        let (walk, worker_deaths) = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(detectors.len());
            for (index, detector) in detectors.iter_mut().enumerate() {
                let queue = &queue;
                let counters = &counters;
                let spawned = thread::Builder::new()
                    .name(format!("detector-worker-{index}"))
                    .spawn_scoped(scope, move || {
                        run_worker(index, &mut **detector, queue, reader, notify, counters)
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        log::error!("Failed to spawn worker {index}: {e}");
                        queue.close();
                        return Err(ProcessError::Unexpected(format!(
                            "failed to spawn worker {index}: {e}"
                        )));
                    }
                }
            }

            let walk = feed_queue(root_dir, &queue, options.admission_timeout);
            queue.close();

            let deaths = handles
                .into_iter()
                .map(|handle| handle.join())
                .filter(Result::is_err)
                .count();
            Ok((walk, deaths))
        })?;

        if worker_deaths > 0 {
            return Err(ProcessError::Unexpected(format!(
                "{worker_deaths} worker(s) stopped unexpectedly"
            )));
        }

        let summary = ProcessSummary {
            discovered: walk.discovered,
            admitted: walk.admitted,
            dropped: walk.dropped,
            processed: counters.processed.load(Ordering::Relaxed),
            skipped: counters.skipped.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        };
        log::info!(
            "Processed {} of {} image(s) in {} ({} skipped, {} failed, {} dropped)",
            summary.processed,
            summary.discovered,
            root_dir.display(),
            summary.skipped,
            summary.failed,
            summary.dropped
        );
        Ok(summary)
    }
}

fn read_description(path: &Path) -> Result<DetectorConfig, InitError> {
    let text = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            InitError::FilesNotFound {
                path: path.to_path_buf(),
            }
        } else {
            InitError::ReadSettings {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    let document: serde_json::Value =
        serde_json::from_str(&text).map_err(|source| InitError::ParseSettings {
            path: path.to_path_buf(),
            source,
        })?;
    DetectorConfig::from_document(document).map_err(InitError::BadDataFile)
}

/// Case-insensitive check against the image extension allow-list.
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct WalkStats {
    discovered: usize,
    admitted: usize,
    dropped: usize,
}

fn feed_queue(
    root_dir: &Path,
    queue: &BoundedTaskQueue<PathBuf>,
    admission_timeout: Option<Duration>,
) -> WalkStats {
    let mut stats = WalkStats::default();
    for entry in WalkDir::new(root_dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry under {}: {e}", root_dir.display());
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }

        stats.discovered += 1;
        let path = entry.into_path();
        let admitted = match admission_timeout {
            Some(timeout) => queue.add_timeout(path, timeout),
            None => queue.add(path),
        };
        match admitted {
            Ok(()) => stats.admitted += 1,
            Err(AddError::Full(path)) => {
                log::warn!("Queue stayed full, dropping {}", path.display());
                stats.dropped += 1;
            }
            Err(AddError::Closed(path)) => {
                log::error!("Queue closed early, walk stopped at {}", path.display());
                stats.dropped += 1;
                break;
            }
        }
    }
    stats
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct WorkerCounters {
    processed: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

#[derive(Clone, Copy, Debug)]
enum Stage {
    Decode,
    Detect,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Decode => f.write_str("decode"),
            Stage::Detect => f.write_str("detect"),
        }
    }
}

/// Closes the queue if the owning worker unwinds, so the producer never
/// blocks on a queue nobody drains.
struct CloseOnPanic<'a, T>(&'a BoundedTaskQueue<T>);

impl<T> Drop for CloseOnPanic<'_, T> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.close();
        }
    }
}

fn run_worker<F>(
    index: usize,
    detector: &mut dyn ObjectDetector,
    queue: &BoundedTaskQueue<PathBuf>,
    reader: &dyn ImageReader,
    notify: &F,
    counters: &WorkerCounters,
) where
    F: Fn(&Path, &[Rect]) + Sync,
{
    let _guard = CloseOnPanic(queue);
    log::debug!("Worker {index} started");

    while let Task::Process(path) = queue.wait_for_task() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(
            || -> Result<(), (Stage, ProcessingError)> {
                let frame = reader.read(&path).map_err(|e| (Stage::Decode, e))?;
                let detections = detector.detect(&frame).map_err(|e| (Stage::Detect, e))?;
                notify(&path, &detections);
                Ok(())
            },
        ));

        match outcome {
            Ok(Ok(())) => {
                counters.processed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err((stage, e))) => {
                log::warn!("Skipping {}: {stage} failed: {e}", path.display());
                counters.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                log::error!(
                    "Unexpected error while processing {}: {}",
                    path.display(),
                    panic_message(&*payload)
                );
                counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    log::debug!("Worker {index} stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
