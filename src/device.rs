//! Execution queues and completion events.
//!
//! A [`Queue`] is the crate's accelerator: a dedicated rayon thread pool whose
//! lanes run kernels while the issuing thread carries on. Submitting work is
//! never blocking; it returns an [`Event`] straight away, and the work starts
//! once every prerequisite event has completed.
//!
//! Events are shared handles. Any number of holders may wait on one, pass it
//! as a prerequisite to later submissions, or `.await` it, since [`Event`]
//! implements [`Future`].
//!
//! # Example
//!
//! ```rust
//! use arcwise::device::{Queue, QueueConfig};
//!
//! let queue = Queue::new(QueueConfig::default().with_num_threads(2)).unwrap();
//! let first = queue.submit("first", &[], || Ok(()));
//! let second = queue.submit("second", &[first.clone()], || Ok(()));
//! second.wait().unwrap();
//! assert!(first.is_complete());
//! ```

use crate::backend::{get_backend, Backend};
use crate::error::DeviceError;
use crate::memory::{track_accesses, BufferAccess};
use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use core::task::{Context, Poll, Waker};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

type Callback = Box<dyn FnOnce(&Result<(), DeviceError>) + Send>;

enum Status {
    Pending,
    Done(Result<(), DeviceError>),
}

struct EventState {
    status: Status,
    callbacks: Vec<Callback>,
    wakers: Vec<Waker>,
}

/// Completion handle of a unit of work.
///
/// Cloning yields another handle to the same work. An event completes
/// exactly once, either successfully or with a [`DeviceError`] that every
/// holder observes.
#[derive(Clone)]
pub struct Event {
    inner: Arc<Mutex<EventState>>,
}

impl core::fmt::Debug for Event {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Event")
            .field("status", &self.status())
            .finish()
    }
}

impl Event {
    /// An event that has already completed successfully.
    #[must_use]
    pub fn completed() -> Self {
        let event = Self::pending();
        event.complete(Ok(()));
        event
    }

    pub(crate) fn pending() -> Self {
        Self {
            inner: Arc::new(Mutex::new(EventState {
                status: Status::Pending,
                callbacks: Vec::new(),
                wakers: Vec::new(),
            })),
        }
    }

    /// Whether the work has finished, successfully or not.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.inner.lock().status, Status::Done(_))
    }

    /// Outcome of the work, or `None` while it is still pending.
    #[must_use]
    pub fn status(&self) -> Option<Result<(), DeviceError>> {
        match &self.inner.lock().status {
            Status::Pending => None,
            Status::Done(result) => Some(result.clone()),
        }
    }

    /// Blocks the calling thread until the work completes.
    ///
    /// # Errors
    ///
    /// Returns the [`DeviceError`] the work failed with.
    pub fn wait(&self) -> Result<(), DeviceError> {
        pollster::block_on(self.clone())
    }

    /// Waits for every event, returning the first failure encountered.
    ///
    /// All events are waited for even after a failure.
    ///
    /// # Errors
    ///
    /// Returns the first [`DeviceError`] in iteration order.
    pub fn wait_all<'a>(events: impl IntoIterator<Item = &'a Self>) -> Result<(), DeviceError> {
        events
            .into_iter()
            .map(Self::wait)
            .fold(Ok(()), |first, next| first.and(next))
    }

    pub(crate) fn complete(&self, result: Result<(), DeviceError>) {
        let (callbacks, wakers) = {
            let mut state = self.inner.lock();
            if matches!(state.status, Status::Done(_)) {
                return;
            }
            state.status = Status::Done(result.clone());
            (
                core::mem::take(&mut state.callbacks),
                core::mem::take(&mut state.wakers),
            )
        };
        for callback in callbacks {
            callback(&result);
        }
        for waker in wakers {
            waker.wake();
        }
    }

    /// Runs `f` once the event completes; immediately if it already has.
    pub(crate) fn on_complete<F>(&self, f: F)
    where
        F: FnOnce(&Result<(), DeviceError>) + Send + 'static,
    {
        let mut state = self.inner.lock();
        let done = match &state.status {
            Status::Done(result) => Some(result.clone()),
            Status::Pending => None,
        };
        match done {
            Some(result) => {
                drop(state);
                f(&result);
            }
            None => state.callbacks.push(Box::new(f)),
        }
    }
}

impl Future for Event {
    type Output = Result<(), DeviceError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.inner.lock();
        let done = match &state.status {
            Status::Done(result) => Some(result.clone()),
            Status::Pending => None,
        };
        match done {
            Some(result) => Poll::Ready(result),
            None => {
                if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    state.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

/// Configuration of a [`Queue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Lanes of the pool; `0` lets rayon pick (one per core).
    pub num_threads: usize,
    /// Prefix of the lane thread names.
    pub thread_name: String,
    /// Largest launch, in work-items, the queue accepts.
    pub max_work_items: Option<usize>,
    /// Execution backend.
    pub backend: Backend,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            thread_name: "arcwise".to_owned(),
            max_work_items: None,
            backend: get_backend(),
        }
    }
}

impl QueueConfig {
    /// Default configuration overridden by the environment.
    ///
    /// - `ARCWISE_NUM_THREADS`: lane count
    /// - `ARCWISE_MAX_WORK_ITEMS`: launch size limit
    /// - `ARCWISE_BACKEND`: `parallel` or `serial`
    ///
    /// Unparseable values are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_parse("ARCWISE_NUM_THREADS") {
            config.num_threads = n;
        }
        if let Some(n) = env_parse("ARCWISE_MAX_WORK_ITEMS") {
            config.max_work_items = Some(n);
        }
        if let Ok(name) = std::env::var("ARCWISE_BACKEND") {
            match name.parse() {
                Ok(backend) => config.backend = backend,
                Err(()) => log::warn!("ignoring unknown ARCWISE_BACKEND={name:?}"),
            }
        }
        config
    }

    /// Sets the lane count.
    #[must_use]
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Sets the launch size limit.
    #[must_use]
    pub fn with_max_work_items(mut self, limit: usize) -> Self {
        self.max_work_items = Some(limit);
        self
    }

    /// Sets the backend.
    #[must_use]
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }
}

fn env_parse(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(e) => {
            log::warn!("ignoring {key}={raw:?}: {e}");
            None
        }
    }
}

struct QueueInner {
    pool: rayon::ThreadPool,
    config: QueueConfig,
    id: u64,
}

/// An execution context that runs submitted work asynchronously.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct Queue {
    inner: Arc<QueueInner>,
}

impl core::fmt::Debug for Queue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Queue")
            .field("id", &self.inner.id)
            .field("lanes", &self.num_lanes())
            .field("config", &self.inner.config)
            .finish()
    }
}

lazy_static::lazy_static! {
    static ref DEFAULT_QUEUE: Result<Queue, DeviceError> = Queue::new(QueueConfig::from_env());
}

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(0);

impl Queue {
    /// Creates a queue with its own pool of lanes.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Unavailable`] if the pool cannot be started.
    pub fn new(config: QueueConfig) -> Result<Self, DeviceError> {
        let threads = match config.backend {
            Backend::Parallel => config.num_threads,
            Backend::Serial => 1,
        };
        let prefix = config.thread_name.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |i| format!("{prefix}-{i}"))
            .build()
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
        let id = NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed);

        log::debug!(
            "queue {id}: {:?} backend with {} lanes",
            config.backend,
            pool.current_num_threads()
        );
        Ok(Self {
            inner: Arc::new(QueueInner { pool, config, id }),
        })
    }

    /// The lazily created process-wide queue, configured from the environment.
    ///
    /// # Errors
    ///
    /// The error the queue failed to start with, on every call.
    pub fn default_queue() -> Result<&'static Self, DeviceError> {
        DEFAULT_QUEUE.as_ref().map_err(Clone::clone)
    }

    /// Configuration the queue was built with.
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Number of lanes executing work.
    #[must_use]
    pub fn num_lanes(&self) -> usize {
        self.inner.pool.current_num_threads()
    }

    /// Fails with [`DeviceError::OutOfResources`] if a launch of
    /// `work_items` exceeds the queue limit.
    pub(crate) fn check_launch(&self, work_items: usize) -> Result<(), DeviceError> {
        match self.inner.config.max_work_items {
            Some(limit) if work_items > limit => Err(DeviceError::OutOfResources {
                requested: work_items,
                limit,
            }),
            _ => Ok(()),
        }
    }

    /// Submits a host task that runs on a lane once `depends` completed.
    ///
    /// Returns without waiting. If any prerequisite fails the task is skipped
    /// and the returned event fails with [`DeviceError::DependencyFailed`].
    pub fn submit<F>(&self, label: &'static str, depends: &[Event], task: F) -> Event
    where
        F: FnOnce() -> Result<(), DeviceError> + Send + 'static,
    {
        self.submit_with_access(label, depends, &[], task)
    }

    /// Like [`Queue::submit`], additionally ordering the task after
    /// conflicting accesses to the given buffers.
    pub(crate) fn submit_with_access<F>(
        &self,
        label: &'static str,
        depends: &[Event],
        accesses: &[BufferAccess<'_>],
        task: F,
    ) -> Event
    where
        F: FnOnce() -> Result<(), DeviceError> + Send + 'static,
    {
        let event = Event::pending();
        let hazards = track_accesses(accesses, &event);
        let mut prerequisites = depends.to_vec();
        prerequisites.extend(hazards.inherit);

        log::trace!(
            "queue {}: submitting `{label}` after {} prerequisites ({} explicit, {} ordering only)",
            self.inner.id,
            prerequisites.len() + hazards.order.len(),
            depends.len(),
            hazards.order.len()
        );

        let inner = Arc::clone(&self.inner);
        let done = event.clone();
        let job = move |failure: Option<DeviceError>| match failure {
            Some(err) => {
                log::warn!("queue {}: skipping `{label}`: {err}", inner.id);
                let cause = match err {
                    DeviceError::DependencyFailed(root) => *root,
                    other => other,
                };
                let failed = Err(DeviceError::DependencyFailed(Box::new(cause)));
                // completed from a lane so a failing chain unwinds one link per task
                inner.pool.spawn(move || done.complete(failed));
            }
            None => {
                let id = inner.id;
                inner.pool.spawn(move || {
                    let result = panic::catch_unwind(AssertUnwindSafe(task)).unwrap_or_else(
                        |payload| {
                            Err(DeviceError::KernelPanicked {
                                label,
                                message: panic_message(payload.as_ref()),
                            })
                        },
                    );
                    if let Err(err) = &result {
                        log::warn!("queue {id}: `{label}` failed: {err}");
                    }
                    done.complete(result);
                });
            }
        };

        let launch = Arc::new(Launch {
            remaining: AtomicUsize::new(prerequisites.len() + hazards.order.len() + 1),
            failure: Mutex::new(None),
            job: Mutex::new(Some(Box::new(job))),
        });
        for prerequisite in &prerequisites {
            let launch = Arc::clone(&launch);
            prerequisite.on_complete(move |result| launch.arrive(result));
        }
        for earlier in &hazards.order {
            let launch = Arc::clone(&launch);
            earlier.on_complete(move |_| launch.arrive(&Ok(())));
        }
        // the submitter's own arrival; the job may launch right here
        launch.arrive(&Ok(()));

        event
    }
}

type Job = Box<dyn FnOnce(Option<DeviceError>) + Send>;

/// Countdown over the prerequisites of one submission.
struct Launch {
    remaining: AtomicUsize,
    failure: Mutex<Option<DeviceError>>,
    job: Mutex<Option<Job>>,
}

impl Launch {
    fn arrive(&self, result: &Result<(), DeviceError>) {
        if let Err(err) = result {
            let mut failure = self.failure.lock();
            if failure.is_none() {
                *failure = Some(err.clone());
            }
        }
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let failure = self.failure.lock().take();
            let job = self.job.lock().take();
            if let Some(job) = job {
                job(failure);
            }
        }
    }
}

fn panic_message(payload: &(dyn core::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
