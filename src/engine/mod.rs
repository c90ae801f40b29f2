//! The sequential processing engine.
//!
//! One dedicated worker thread owns the context `C` (for documents, a
//! [`DocumentContext`](crate::context::DocumentContext)) and drains a FIFO queue of
//! [`Operation`]s, one at a time. Producers on any thread only enqueue through an
//! [`EngineHandle`]; nothing else ever touches the context.
//!
//! An operation that needs something from the outside world (a dialog to close, a user to
//! answer) returns [`Flow::Pause`]. The worker then holds the queue until [`EngineHandle::resume`]
//! is called. Submissions keep being accepted while paused.
//!
//! ```text
//! Idle --submit--> Running --Continue--> Running --queue empty--> Idle
//!                     |                     ^
//!                   Pause                resume
//!                     v                     |
//!                  Paused ------------------+
//! ```
//!
//! A resume that arrives while the pausing operation is still executing (its own follow-up
//! finished first) is remembered for that operation only. Any other resume is a no-op.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::error::DocCmdError;


/// What the worker does after an operation returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flow {
    Continue,
    /// Hold the queue until [`EngineHandle::resume`].
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// Waiting for work.
    Idle,
    /// Executing or about to dequeue.
    Running,
    /// Waiting for a resume.
    Paused,
    /// The worker has exited.
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A unit of work for the engine. Operations must not block waiting on other threads; anything
/// that has to wait returns [`Flow::Pause`] and arranges for a later resume.
pub trait Operation<C>: Send {
    fn execute(&mut self, ctx: &mut C, engine: &EngineHandle<C>) -> Flow;

    /// Name used in logs.
    fn label(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

impl<C, F> Operation<C> for F
where
    F: FnMut(&mut C, &EngineHandle<C>) -> Flow + Send,
{
    fn execute(&mut self, ctx: &mut C, engine: &EngineHandle<C>) -> Flow {
        self(ctx, engine)
    }

    fn label(&self) -> String {
        "closure".to_string()
    }
}

struct QueueState<C> {
    ops: VecDeque<Box<dyn Operation<C>>>,
    state: EngineState,
    accepting: bool,
    resume_pending: bool,
    shutdown: bool,
    executed: u64,
}

struct Shared<C> {
    queue: Mutex<QueueState<C>>,
    signal: Condvar,
}

/// Cloneable submission side of an [`Engine`].
pub struct EngineHandle<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for EngineHandle<C> {
    fn clone(&self) -> Self {
        EngineHandle {
            shared: self.shared.clone(),
        }
    }
}

impl<C> fmt::Debug for EngineHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let q = self.shared.queue.lock();
        f.debug_struct("EngineHandle")
            .field("state", &q.state)
            .field("pending", &q.ops.len())
            .field("accepting", &q.accepting)
            .finish()
    }
}

impl<C> EngineHandle<C> {
    /// Appends an operation to the queue. Returns false when the engine does not accept work.
    pub fn submit<O: Operation<C> + 'static>(&self, op: O) -> bool {
        self.submit_boxed(Box::new(op))
    }

    pub fn submit_boxed(&self, op: Box<dyn Operation<C>>) -> bool {
        let mut q = self.shared.queue.lock();
        if !q.accepting || q.shutdown {
            tracing::debug!("[Engine] Not accepting work, dropping {}", op.label());
            return false;
        }
        q.ops.push_back(op);
        self.shared.signal.notify_all();
        true
    }

    /// Releases a paused queue.
    pub fn resume(&self) {
        let mut q = self.shared.queue.lock();
        match q.state {
            EngineState::Paused => {
                tracing::debug!("[Engine] Resuming");
                q.state = EngineState::Running;
                self.shared.signal.notify_all();
            }
            EngineState::Running => q.resume_pending = true,
            EngineState::Idle | EngineState::Stopped => {
                tracing::trace!("[Engine] Nothing to resume");
            }
        }
    }

    /// While not accepting, submissions are silently dropped. Queued work is not affected.
    pub fn set_accepting(&self, accepting: bool) {
        self.shared.queue.lock().accepting = accepting;
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.queue.lock().accepting
    }

    pub fn state(&self) -> EngineState {
        self.shared.queue.lock().state
    }

    /// Operations queued and not yet started.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().ops.len()
    }

    /// Operations executed so far.
    pub fn executed(&self) -> u64 {
        self.shared.queue.lock().executed
    }

    /// Blocks until the engine is idle with an empty queue, paused, or stopped. Returns false on
    /// timeout.
    pub fn wait_settled(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut q = self.shared.queue.lock();
        loop {
            let settled = match q.state {
                EngineState::Idle => q.ops.is_empty(),
                EngineState::Paused | EngineState::Stopped => true,
                EngineState::Running => false,
            };
            if settled {
                return true;
            }
            if self.shared.signal.wait_until(&mut q, deadline).timed_out() {
                return false;
            }
        }
    }
}

/// Owns the worker thread. Dropping the engine stops the worker after the operation in flight.
pub struct Engine<C: Send + 'static> {
    handle: EngineHandle<C>,
    worker: Option<JoinHandle<C>>,
}

impl<C: Send + 'static> fmt::Debug for Engine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine").field("handle", &self.handle).finish()
    }
}

impl<C: Send + 'static> Engine<C> {
    /// Spawns the worker, handing it the context.
    pub fn start(ctx: C) -> Result<Engine<C>, DocCmdError> {
        let handle = EngineHandle {
            shared: Arc::new(Shared {
                queue: Mutex::new(QueueState {
                    ops: VecDeque::new(),
                    state: EngineState::Idle,
                    accepting: true,
                    resume_pending: false,
                    shutdown: false,
                    executed: 0,
                }),
                signal: Condvar::new(),
            }),
        };
        let worker_handle = handle.clone();
        let worker = thread::Builder::new()
            .name("doccmd-engine".to_string())
            .spawn(move || run(worker_handle, ctx))?;
        Ok(Engine {
            handle,
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> EngineHandle<C> {
        self.handle.clone()
    }

    pub fn submit<O: Operation<C> + 'static>(&self, op: O) -> bool {
        self.handle.submit(op)
    }

    pub fn resume(&self) {
        self.handle.resume()
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.handle.set_accepting(accepting)
    }

    pub fn state(&self) -> EngineState {
        self.handle.state()
    }

    fn stop(&mut self) -> Option<thread::Result<C>> {
        {
            let mut q = self.handle.shared.queue.lock();
            q.shutdown = true;
            if !q.ops.is_empty() {
                tracing::info!("[Engine] Shutting down, dropping {} queued operation(s)", q.ops.len());
                q.ops.clear();
            }
            self.handle.shared.signal.notify_all();
        }
        self.worker.take().map(|worker| worker.join())
    }

    /// Stops the worker and returns the context.
    pub fn shutdown(mut self) -> Result<C, DocCmdError> {
        match self.stop() {
            Some(Ok(ctx)) => Ok(ctx),
            Some(Err(_)) => Err(DocCmdError::Engine("worker thread panicked".to_string())),
            None => Err(DocCmdError::Engine("worker already stopped".to_string())),
        }
    }
}

impl<C: Send + 'static> Drop for Engine<C> {
    fn drop(&mut self) {
        if let Some(Err(_)) = self.stop() {
            tracing::error!("[Engine] Worker thread panicked");
        }
    }
}

#[tracing::instrument(skip_all)]
fn run<C>(handle: EngineHandle<C>, mut ctx: C) -> C {
    let shared = handle.shared.clone();
    loop {
        let mut op = {
            let mut q = shared.queue.lock();
            loop {
                if q.shutdown {
                    q.state = EngineState::Stopped;
                    shared.signal.notify_all();
                    return ctx;
                }
                if q.state == EngineState::Paused {
                    shared.signal.wait(&mut q);
                    continue;
                }
                if let Some(op) = q.ops.pop_front() {
                    q.state = EngineState::Running;
                    q.resume_pending = false;
                    break op;
                }
                if q.state != EngineState::Idle {
                    q.state = EngineState::Idle;
                    shared.signal.notify_all();
                }
                shared.signal.wait(&mut q);
            }
        };

        let label = op.label();
        tracing::trace!("[Engine] Executing {label}");
        let flow = catch_unwind(AssertUnwindSafe(|| op.execute(&mut ctx, &handle)))
            .unwrap_or_else(|_| {
                tracing::error!("[Engine] Operation {label} panicked, continuing with the queue");
                Flow::Continue
            });
        drop(op);

        let mut q = shared.queue.lock();
        q.executed += 1;
        if flow == Flow::Pause {
            if q.resume_pending {
                tracing::debug!("[Engine] {label} was resumed before it paused");
                q.resume_pending = false;
            } else {
                tracing::debug!("[Engine] {label} paused the queue");
                q.state = EngineState::Paused;
                shared.signal.notify_all();
            }
        }
    }
}
