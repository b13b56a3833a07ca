//! Bounded-concurrency batch execution.
//!
//! Results come back positionally: `results[i]` belongs to `operations[i]`
//! whatever order the tasks completed in.

use std::fmt;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};

use promptvar_core::{BoxFuture, FailedOperation, FsError, FsResult};

/// A deferred, fallible async operation.
pub type BatchTask<'a, T> = Box<dyn FnOnce() -> BoxFuture<'a, FsResult<T>> + Send + 'a>;

/// Box an async closure into a [`BatchTask`].
pub fn task<'a, T, F, Fut>(f: F) -> BatchTask<'a, T>
where
    F: FnOnce() -> Fut + Send + 'a,
    Fut: std::future::Future<Output = FsResult<T>> + Send + 'a,
{
    Box::new(move || Box::pin(f()))
}

/// Progress of a running batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// Operations finished so far, successful or not.
    pub completed: usize,
    /// Total operations in the batch.
    pub total: usize,
}

impl BatchProgress {
    /// Get the completion percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.completed as f64 / self.total as f64) * 100.0
    }
}

/// Callback invoked after each completion.
pub type ProgressCallback = Arc<dyn Fn(BatchProgress) + Send + Sync>;

/// Options for [`execute_batch`].
#[derive(Clone)]
pub struct BatchOptions {
    /// Keep going after a failure.
    pub continue_on_error: bool,
    /// Maximum operations in flight. 0 or 1 runs them one at a time.
    pub max_concurrent: usize,
    /// Progress observer.
    pub on_progress: Option<ProgressCallback>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            max_concurrent: 1,
            on_progress: None,
        }
    }
}

impl fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOptions")
            .field("continue_on_error", &self.continue_on_error)
            .field("max_concurrent", &self.max_concurrent)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl BatchOptions {
    /// Run up to `max_concurrent` operations at once.
    pub fn concurrent(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            ..Self::default()
        }
    }

    /// Keep going after failures.
    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Observe progress.
    pub fn on_progress(mut self, callback: impl Fn(BatchProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }
}

/// Outcome of a batch.
#[derive(Debug)]
pub struct BatchResult<T> {
    /// True when no operation failed.
    pub success: bool,
    /// Per-operation results; `None` for failed or never-started ones.
    pub results: Vec<Option<T>>,
    /// Failures with the index of the operation.
    pub failed_operations: Vec<FailedOperation>,
}

impl<T> BatchResult<T> {
    /// Number of operations that produced a value.
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }

    /// Collapse into all values, or a [`FsError::BatchOperation`] summary.
    pub fn into_result(self) -> FsResult<Vec<T>> {
        if !self.failed_operations.is_empty() {
            return Err(FsError::BatchOperation {
                total: self.results.len(),
                failed: self.failed_operations,
            });
        }
        Ok(self.results.into_iter().flatten().collect())
    }
}

struct Tracker<'o, T> {
    results: Vec<Option<T>>,
    failed: Vec<FailedOperation>,
    completed: usize,
    options: &'o BatchOptions,
}

impl<T> Tracker<'_, T> {
    /// Record a completion; returns false when the batch should stop.
    fn record(&mut self, index: usize, outcome: FsResult<T>) -> bool {
        let keep_going = match outcome {
            Ok(value) => {
                self.results[index] = Some(value);
                true
            }
            Err(error) => {
                tracing::debug!(index, %error, "batch operation failed");
                self.failed.push(FailedOperation::new(index, error));
                self.options.continue_on_error
            }
        };
        self.completed += 1;
        if let Some(callback) = &self.options.on_progress {
            callback(BatchProgress {
                completed: self.completed,
                total: self.results.len(),
            });
        }
        keep_going
    }

    fn finish(mut self) -> BatchResult<T> {
        self.failed.sort_by_key(|f| f.index);
        BatchResult {
            success: self.failed.is_empty(),
            results: self.results,
            failed_operations: self.failed,
        }
    }
}

/// Execute `operations` with bounded concurrency.
///
/// Without `continue_on_error`, the first failure stops new operations from
/// starting; operations already in flight still complete and are recorded.
pub async fn execute_batch<'a, T>(
    operations: Vec<BatchTask<'a, T>>,
    options: &BatchOptions,
) -> BatchResult<T>
where
    T: Send + 'a,
{
    let total = operations.len();
    let mut tracker = Tracker {
        results: std::iter::repeat_with(|| None).take(total).collect(),
        failed: Vec::new(),
        completed: 0,
        options,
    };

    if options.max_concurrent <= 1 || total <= 1 {
        for (index, operation) in operations.into_iter().enumerate() {
            let outcome = operation().await;
            if !tracker.record(index, outcome) {
                break;
            }
        }
        return tracker.finish();
    }

    let mut pending = operations.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();
    let launch = |(index, operation): (usize, BatchTask<'a, T>)| {
        Box::pin(async move { (index, operation().await) })
            as BoxFuture<'a, (usize, FsResult<T>)>
    };

    for next in pending.by_ref().take(options.max_concurrent) {
        in_flight.push(launch(next));
    }

    let mut stopped = false;
    while let Some((index, outcome)) = in_flight.next().await {
        if !tracker.record(index, outcome) {
            stopped = true;
        }
        if !stopped {
            if let Some(next) = pending.next() {
                in_flight.push(launch(next));
            }
        }
    }

    tracker.finish()
}
