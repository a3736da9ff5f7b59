//! Dedicated OS thread for namespace switching
//!
//! Namespace membership belongs to an OS thread, while async tasks can hop
//! between runtime threads at every `.await`. All switch/operate/restore
//! sequences are therefore shipped to one thread as whole units:
//!
//! ```text
//!   async caller ──job──► [mpsc] ──► nsmove-netns thread
//!        ▲                             │ switch → operate → restore
//!        └─────────── result ◄─[oneshot]┘
//! ```
//!
//! The thread runs nothing else. A job, once queued, runs to completion even
//! if the caller stops waiting for it.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use nsmove_core::{Error, Result};

use crate::config::RelocationConfig;
use crate::provider::NetNsProvider;

enum Control {
    Continue,
    Stop,
}

type Job = Box<dyn FnOnce(&Arc<dyn NetNsProvider>) -> Control + Send>;

/// Handle to the namespace worker thread
pub struct NetNsWorker {
    jobs: mpsc::Sender<Job>,
    poisoned: Arc<AtomicBool>,
    thread_id: ThreadId,
    handle: Option<JoinHandle<()>>,
    provider: Arc<dyn NetNsProvider>,
}

impl NetNsWorker {
    /// Start the worker thread
    ///
    /// The thread inherits the caller's network namespace, which becomes the
    /// home namespace of every relocation it runs.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the thread cannot be spawned
    pub fn spawn(provider: Arc<dyn NetNsProvider>, config: &RelocationConfig) -> Result<Self> {
        config.validate()?;

        let (jobs, mut queue) = mpsc::channel::<Job>(config.queue_depth);
        let thread_provider = Arc::clone(&provider);

        let handle = std::thread::Builder::new()
            .name(config.worker_name.clone())
            .spawn(move || {
                info!("Namespace worker started");
                while let Some(job) = queue.blocking_recv() {
                    if let Control::Stop = job(&thread_provider) {
                        error!("Namespace worker torn down: thread namespace is unknown");
                        break;
                    }
                }
                debug!("Namespace worker exited");
            })?;

        let thread_id = handle.thread().id();
        debug!(worker = %config.worker_name, ?thread_id, "Spawned namespace worker");

        Ok(Self {
            jobs,
            poisoned: Arc::new(AtomicBool::new(false)),
            thread_id,
            handle: Some(handle),
            provider,
        })
    }

    /// OS thread the jobs run on
    #[must_use]
    pub const fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Provider shared with the worker thread
    #[must_use]
    pub const fn provider(&self) -> &Arc<dyn NetNsProvider> {
        &self.provider
    }

    /// Whether a job left the thread in an unknown namespace
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    /// Run `job` on the worker thread and wait for its result
    ///
    /// A job returning a fatal error ([`Error::is_fatal`]) tears the worker
    /// down: the thread exits and every later call fails.
    ///
    /// # Errors
    /// Returns the job's error, or [`Error::UnrecoverableState`] if the worker
    /// has been torn down
    pub async fn run<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&Arc<dyn NetNsProvider>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_poisoned() {
            return Err(torn_down());
        }

        let (reply, result) = oneshot::channel();
        let poisoned = Arc::clone(&self.poisoned);

        let job: Job = Box::new(move |provider| {
            let outcome = job(provider);
            let fatal = matches!(&outcome, Err(e) if e.is_fatal());
            if fatal {
                poisoned.store(true, Ordering::SeqCst);
            }
            if reply.send(outcome).is_err() {
                debug!("Caller stopped waiting for namespace job");
            }
            if fatal { Control::Stop } else { Control::Continue }
        });

        self.jobs.send(job).await.map_err(|_| torn_down())?;
        result.await.map_err(|_| torn_down())?
    }

    /// Queue `job` without waiting for it
    ///
    /// Usable outside an async context, including from the worker thread
    /// itself. Nobody receives the job's result; a fatal error still tears
    /// the worker down.
    ///
    /// # Errors
    /// Returns [`Error::UnrecoverableState`] if the worker has been torn down,
    /// or an I/O error of kind `WouldBlock` if the queue is full. In both
    /// cases `job` is dropped without running.
    pub fn try_run<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce(&Arc<dyn NetNsProvider>) -> Result<()> + Send + 'static,
    {
        if self.is_poisoned() {
            return Err(torn_down());
        }

        let poisoned = Arc::clone(&self.poisoned);
        let job: Job = Box::new(move |provider| match job(provider) {
            Err(e) if e.is_fatal() => {
                poisoned.store(true, Ordering::SeqCst);
                Control::Stop
            }
            Err(e) => {
                debug!(error = %e, "Detached namespace job failed");
                Control::Continue
            }
            Ok(()) => Control::Continue,
        });

        self.jobs.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => Error::Io(io::Error::new(
                io::ErrorKind::WouldBlock,
                "namespace worker queue is full",
            )),
            TrySendError::Closed(_) => torn_down(),
        })
    }

    /// Stop accepting jobs and wait for the thread to exit
    ///
    /// # Errors
    /// Returns error if the worker thread panicked
    pub async fn shutdown(mut self) -> Result<()> {
        let handle = self.handle.take();
        drop(self);

        if let Some(handle) = handle {
            let joined = tokio::task::spawn_blocking(move || handle.join())
                .await
                .map_err(|e| Error::UnrecoverableState {
                    message: format!("failed to join namespace worker: {e}"),
                })?;
            joined.map_err(|_| Error::UnrecoverableState {
                message: "namespace worker panicked".to_string(),
            })?;
        }

        info!("Namespace worker stopped");
        Ok(())
    }
}

impl std::fmt::Debug for NetNsWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetNsWorker")
            .field("thread_id", &self.thread_id)
            .field("poisoned", &self.is_poisoned())
            .finish_non_exhaustive()
    }
}

fn torn_down() -> Error {
    Error::UnrecoverableState {
        message: "namespace worker has been torn down".to_string(),
    }
}
