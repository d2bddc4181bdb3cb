//! FIFO worker queue and one-shot events for the host backend.
//!
//! The queue plays the role a device command stream plays on a GPU
//! backend: jobs submitted by the driving thread execute in submission
//! order on one worker thread, `synchronize` is a full barrier, and events
//! mark points in the stream that other queues can block on.

use std::any::Any;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::backend::EventInner;
use crate::error::{ForgeResult, TensorForgeError};

pub(super) type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueueProgress {
    completed: Mutex<u64>,
    cv: Condvar,
}

pub(super) struct WorkQueue {
    sender: Option<mpsc::Sender<Job>>,
    /// Jobs submitted so far; driven by one thread, so a plain counter.
    submitted: u64,
    progress: Arc<QueueProgress>,
    worker: Option<thread::JoinHandle<()>>,
}

impl WorkQueue {
    pub fn new(name: &str) -> ForgeResult<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let progress = Arc::new(QueueProgress {
            completed: Mutex::new(0),
            cv: Condvar::new(),
        });
        let worker_progress = progress.clone();
        let worker = thread::Builder::new()
            .name(format!("{name}-queue"))
            .spawn(move || {
                for job in receiver {
                    job();
                    let mut done = match worker_progress.completed.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    *done += 1;
                    worker_progress.cv.notify_all();
                }
                tracing::debug!("host queue worker exiting");
            })
            .map_err(|e| TensorForgeError::Internal(format!("queue worker spawn failed: {e}")))?;

        Ok(Self {
            sender: Some(sender),
            submitted: 0,
            progress,
            worker: Some(worker),
        })
    }

    /// Enqueue a job; returns the ticket that `wait_for` can block on.
    pub fn submit(&mut self, job: Job) -> ForgeResult<u64> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| TensorForgeError::Internal("queue closed".to_string()))?;
        sender
            .send(job)
            .map_err(|_| TensorForgeError::Internal("queue worker exited".to_string()))?;
        self.submitted += 1;
        Ok(self.submitted)
    }

    /// Number of jobs submitted so far; jobs up to this ticket are the
    /// "previously enqueued" work of the contract.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Block until all jobs up to `ticket` have completed.
    pub fn wait_for(&self, ticket: u64) -> ForgeResult<()> {
        let mut done = self.progress.completed.lock()?;
        while *done < ticket {
            done = self.progress.cv.wait(done)?;
        }
        Ok(())
    }

    /// Full barrier for this queue.
    pub fn synchronize(&self) -> ForgeResult<()> {
        self.wait_for(self.submitted)
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain remaining jobs and exit.
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[derive(Default)]
struct EventState {
    recorded: bool,
    reached: bool,
}

/// One-shot event: `mark_recorded` on the driving thread, `mark_reached`
/// from the queue worker when the recorded point passes.
pub(super) struct HostEvent {
    state: Mutex<EventState>,
    cv: Condvar,
}

impl HostEvent {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EventState::default()),
            cv: Condvar::new(),
        }
    }

    pub fn mark_recorded(&self) -> ForgeResult<()> {
        let mut state = self.state.lock()?;
        if state.recorded {
            return Err(TensorForgeError::EventAlreadyRecorded);
        }
        state.recorded = true;
        Ok(())
    }

    pub fn mark_reached(&self) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.reached = true;
        self.cv.notify_all();
    }

    pub fn wait_reached(&self) -> ForgeResult<()> {
        let mut state = self.state.lock()?;
        while !state.reached {
            state = self.cv.wait(state)?;
        }
        Ok(())
    }
}

impl EventInner for HostEvent {
    fn is_recorded(&self) -> bool {
        self.state.lock().map(|s| s.recorded).unwrap_or(false)
    }

    fn synchronize(&self) -> ForgeResult<()> {
        self.wait_reached()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
