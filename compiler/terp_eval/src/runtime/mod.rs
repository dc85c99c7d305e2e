//! Concurrency runtime: task accounting, parking and deadlock detection.
//!
//! Every goroutine is a host thread. Channel state transitions, parking and
//! the running-task count all happen under the single scheduler lock, so a
//! task that finds nothing ready can enqueue itself and go to sleep without
//! missing a wake-up. A parked task sleeps on its own condition variable.
//!
//! When the running count drops to zero every live task is parked and none
//! can ever be woken: the main task is told about the deadlock.

mod channel;
mod select;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex, MutexGuard};
use rustc_hash::FxHashMap;

use crate::errors::{closed_channel, ExecResult, Panic, PanicKind, Unwind};
use crate::print_handler::SharedPrintHandler;
use crate::Value;

pub use channel::Channel;
pub(crate) use select::{SelectArm, SelectResult};

use channel::{RecvOutcome, SendOutcome, Sudog};

/// Limits for one run.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Host stack size of goroutine threads.
    pub stack_size: usize,
    /// Call depth at which a call panics with a stack overflow.
    pub max_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            stack_size: 4 * 1024 * 1024,
            max_depth: 10_000,
        }
    }
}

/// How a parked operation was completed by its counterpart.
#[derive(Debug)]
pub(crate) struct Completion {
    /// Select case (0 for plain sends and receives).
    pub case: usize,
    /// Received value; `None` when woken by `close`.
    pub value: Option<Value>,
    /// `false` when the channel was closed.
    pub ok: bool,
}

/// Parking spot of one task.
pub(crate) struct Waiter {
    id: u64,
    cv: Condvar,
    fired: Mutex<Option<Completion>>,
}

impl Waiter {
    /// Whether a counterpart already completed this task's operation.
    fn has_fired(&self) -> bool {
        self.fired.lock().is_some()
    }
}

pub(crate) struct Sched {
    running: usize,
    shutdown: bool,
    deadlock: bool,
    fatal: Option<Box<Panic>>,
    parked: FxHashMap<u64, Arc<Waiter>>,
    main: Option<Arc<Waiter>>,
}

impl Sched {
    /// Complete a parked operation and make its task runnable.
    fn wake(&mut self, sudog: Sudog, case_value: Option<Value>, ok: bool) {
        *sudog.waiter.fired.lock() = Some(Completion {
            case: sudog.case,
            value: case_value,
            ok,
        });
        self.running += 1;
        sudog.waiter.cv.notify_one();
    }

    fn notify_main(&self) {
        if let Some(main) = &self.main {
            main.cv.notify_one();
        }
    }

    fn notify_all_parked(&self) {
        for waiter in self.parked.values() {
            waiter.cv.notify_one();
        }
        self.notify_main();
    }
}

/// Shared state of one run: scheduler, print handler and goroutine threads.
pub struct Runtime {
    sched: Mutex<Sched>,
    /// Set on shutdown or fatal failure; polled at calls and branches.
    stop: AtomicBool,
    next_id: AtomicU64,
    threads: Mutex<Vec<JoinHandle<()>>>,
    print: SharedPrintHandler,
    config: RuntimeConfig,
}

impl Runtime {
    /// A runtime with the calling thread as its only running task.
    pub fn new(config: RuntimeConfig, print: SharedPrintHandler) -> Arc<Runtime> {
        Arc::new(Runtime {
            sched: Mutex::new(Sched {
                running: 1,
                shutdown: false,
                deadlock: false,
                fatal: None,
                parked: FxHashMap::default(),
                main: None,
            }),
            stop: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            threads: Mutex::new(Vec::new()),
            print,
            config,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn print(&self, text: &str) {
        self.print.write(text);
    }

    #[inline]
    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub(crate) fn new_waiter(&self) -> Arc<Waiter> {
        Arc::new(Waiter {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            cv: Condvar::new(),
            fired: Mutex::new(None),
        })
    }

    /// Register the waiter of the task that receives deadlock and fatal
    /// notifications.
    pub(crate) fn set_main(&self, waiter: &Arc<Waiter>) {
        self.sched.lock().main = Some(Arc::clone(waiter));
    }

    /// Sleep until a counterpart completes this task's operation.
    ///
    /// The caller has already enqueued `waiter` on the channels involved.
    /// Returns with the lock held so the caller can dequeue atomically.
    fn park(
        &self,
        sched: &mut MutexGuard<'_, Sched>,
        waiter: &Arc<Waiter>,
        is_main: bool,
    ) -> ExecResult<Completion> {
        sched.running -= 1;
        if sched.running == 0 && !sched.shutdown {
            tracing::debug!("every task is parked");
            sched.deadlock = true;
            sched.notify_main();
        }
        sched.parked.insert(waiter.id, Arc::clone(waiter));
        let result = loop {
            if let Some(done) = waiter.fired.lock().take() {
                break Ok(done);
            }
            if let Some(fatal) = &sched.fatal {
                break Err(if is_main {
                    Unwind::Fatal(fatal.clone())
                } else {
                    Unwind::Exit
                });
            }
            if sched.shutdown {
                break Err(Unwind::Exit);
            }
            if is_main && sched.deadlock {
                break Err(Unwind::Fatal(Box::new(Panic::deadlock())));
            }
            waiter.cv.wait(sched);
        };
        sched.parked.remove(&waiter.id);
        if result.is_err() {
            sched.running += 1;
        }
        result
    }

    /// Park with nothing enqueued: only shutdown or deadlock ends the wait.
    fn block_forever(&self, waiter: &Arc<Waiter>, is_main: bool) -> Unwind {
        let mut sched = self.sched.lock();
        loop {
            if let Err(unwind) = self.park(&mut sched, waiter, is_main) {
                return unwind;
            }
        }
    }

    // === Channel operations ===

    pub(crate) fn send(
        &self,
        chan: Option<&Arc<Channel>>,
        value: Value,
        waiter: &Arc<Waiter>,
        is_main: bool,
    ) -> ExecResult<()> {
        let Some(chan) = chan else {
            return Err(self.block_forever(waiter, is_main));
        };
        let mut sched = self.sched.lock();
        let value = match chan.try_send(&mut sched, value) {
            SendOutcome::Sent => return Ok(()),
            SendOutcome::Closed => return Err(closed_channel("send on closed channel")),
            SendOutcome::Blocked(value) => value,
        };
        chan.enqueue_send(Sudog::new(waiter, 0, Some(value)));
        let done = self.park(&mut sched, waiter, is_main);
        if done.is_err() {
            chan.remove_waiter(waiter);
        }
        if done?.ok {
            Ok(())
        } else {
            Err(closed_channel("send on closed channel"))
        }
    }

    /// Receive; `None` once the channel is closed and drained.
    pub(crate) fn recv(
        &self,
        chan: Option<&Arc<Channel>>,
        waiter: &Arc<Waiter>,
        is_main: bool,
    ) -> ExecResult<Option<Value>> {
        let Some(chan) = chan else {
            return Err(self.block_forever(waiter, is_main));
        };
        let mut sched = self.sched.lock();
        match chan.try_recv(&mut sched) {
            RecvOutcome::Value(v) => return Ok(Some(v)),
            RecvOutcome::Closed => return Ok(None),
            RecvOutcome::Blocked => {}
        }
        chan.enqueue_recv(Sudog::new(waiter, 0, None));
        let done = self.park(&mut sched, waiter, is_main);
        if done.is_err() {
            chan.remove_waiter(waiter);
        }
        Ok(done?.value)
    }

    pub(crate) fn close(&self, chan: Option<&Arc<Channel>>) -> ExecResult<()> {
        let Some(chan) = chan else {
            return Err(closed_channel("close of nil channel"));
        };
        let mut sched = self.sched.lock();
        if chan.close(&mut sched) {
            Ok(())
        } else {
            Err(closed_channel("close of closed channel"))
        }
    }

    // === Tasks ===

    /// Start a goroutine thread. The task counts as running from here on.
    pub(crate) fn spawn(
        self: &Arc<Self>,
        body: impl FnOnce() + Send + 'static,
    ) -> ExecResult<()> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sched.lock().running += 1;
        let rt = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name(format!("goroutine-{id}"))
            .stack_size(self.config.stack_size)
            .spawn(move || {
                body();
                rt.task_exit();
            });
        match spawned {
            Ok(handle) => {
                tracing::trace!(id, "goroutine started");
                self.threads.lock().push(handle);
                Ok(())
            }
            Err(err) => {
                self.task_exit();
                Err(Unwind::Panic(Box::new(Panic::new(
                    Value::string(format!("cannot start goroutine: {err}")),
                    PanicKind::Host,
                ))))
            }
        }
    }

    fn task_exit(&self) {
        let mut sched = self.sched.lock();
        sched.running -= 1;
        if sched.running == 0 && !sched.shutdown {
            sched.deadlock = true;
            sched.notify_main();
        }
    }

    /// An unrecovered panic in a goroutine ends the whole run.
    pub(crate) fn fail(&self, panic: Box<Panic>) {
        let mut sched = self.sched.lock();
        if sched.fatal.is_none() {
            tracing::debug!(panic = %panic.message, "goroutine panicked");
            sched.fatal = Some(panic);
        }
        self.stop.store(true, Ordering::Relaxed);
        sched.notify_all_parked();
    }

    /// The panic that ended the run from another goroutine, if any.
    pub(crate) fn fatal(&self) -> Option<Box<Panic>> {
        self.sched.lock().fatal.clone()
    }

    /// Stop every goroutine and wait for their threads.
    pub(crate) fn shutdown(&self) {
        {
            let mut sched = self.sched.lock();
            sched.shutdown = true;
            self.stop.store(true, Ordering::Relaxed);
            sched.notify_all_parked();
        }
        // Goroutines may still be spawning others until they observe `stop`.
        loop {
            let threads = std::mem::take(&mut *self.threads.lock());
            if threads.is_empty() {
                break;
            }
            for handle in threads {
                if handle.join().is_err() {
                    tracing::warn!("goroutine thread panicked");
                }
            }
        }
    }
}
