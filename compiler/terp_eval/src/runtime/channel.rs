//! Channels.
//!
//! A channel is a bounded FIFO plus queues of parked senders and receivers
//! (`Sudog`s). Unbuffered channels have capacity zero and hand values
//! directly from sender to receiver. All mutation happens with the scheduler
//! lock held, which the `&mut Sched` parameter witnesses.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Sched, Waiter};
use crate::Value;

/// A task parked on a channel operation.
pub(crate) struct Sudog {
    pub waiter: Arc<Waiter>,
    /// Select case the operation belongs to.
    pub case: usize,
    /// Value offered by a parked sender.
    pub value: Option<Value>,
}

impl Sudog {
    pub fn new(waiter: &Arc<Waiter>, case: usize, value: Option<Value>) -> Self {
        Sudog {
            waiter: Arc::clone(waiter),
            case,
            value,
        }
    }
}

pub(crate) enum SendOutcome {
    Sent,
    Closed,
    /// Nothing ready; the value is handed back for enqueueing.
    Blocked(Value),
}

pub(crate) enum RecvOutcome {
    Value(Value),
    /// Closed and drained.
    Closed,
    Blocked,
}

struct ChanState {
    buf: VecDeque<Value>,
    closed: bool,
    recvq: VecDeque<Sudog>,
    sendq: VecDeque<Sudog>,
}

impl ChanState {
    /// Pop the first parked task whose operation is still pending. A select
    /// completed through another channel leaves stale entries behind until
    /// it dequeues itself.
    fn pop_live(queue: &mut VecDeque<Sudog>) -> Option<Sudog> {
        while let Some(sudog) = queue.pop_front() {
            if !sudog.waiter.has_fired() {
                return Some(sudog);
            }
        }
        None
    }
}

pub struct Channel {
    cap: usize,
    state: Mutex<ChanState>,
}

impl Channel {
    pub fn new(cap: usize) -> Self {
        Channel {
            cap,
            state: Mutex::new(ChanState {
                buf: VecDeque::with_capacity(cap.min(64)),
                closed: false,
                recvq: VecDeque::new(),
                sendq: VecDeque::new(),
            }),
        }
    }

    /// Number of buffered values.
    pub fn len(&self) -> usize {
        self.state.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn try_send(&self, sched: &mut Sched, value: Value) -> SendOutcome {
        let mut st = self.state.lock();
        if st.closed {
            return SendOutcome::Closed;
        }
        if let Some(receiver) = ChanState::pop_live(&mut st.recvq) {
            sched.wake(receiver, Some(value), true);
            return SendOutcome::Sent;
        }
        if st.buf.len() < self.cap {
            st.buf.push_back(value);
            return SendOutcome::Sent;
        }
        SendOutcome::Blocked(value)
    }

    pub(crate) fn try_recv(&self, sched: &mut Sched) -> RecvOutcome {
        let mut st = self.state.lock();
        if let Some(value) = st.buf.pop_front() {
            // A slot opened up: move the first parked sender's value in.
            if let Some(mut sender) = ChanState::pop_live(&mut st.sendq) {
                if let Some(v) = sender.value.take() {
                    st.buf.push_back(v);
                }
                sched.wake(sender, None, true);
            }
            return RecvOutcome::Value(value);
        }
        if let Some(mut sender) = ChanState::pop_live(&mut st.sendq) {
            let value = sender.value.take().unwrap_or(Value::Nil);
            sched.wake(sender, None, true);
            return RecvOutcome::Value(value);
        }
        if st.closed {
            RecvOutcome::Closed
        } else {
            RecvOutcome::Blocked
        }
    }

    /// Close and wake every parked task. Returns `false` if already closed.
    pub(crate) fn close(&self, sched: &mut Sched) -> bool {
        let mut st = self.state.lock();
        if st.closed {
            return false;
        }
        st.closed = true;
        while let Some(receiver) = ChanState::pop_live(&mut st.recvq) {
            sched.wake(receiver, None, false);
        }
        // Parked senders panic once they run again.
        while let Some(sender) = ChanState::pop_live(&mut st.sendq) {
            sched.wake(sender, None, false);
        }
        true
    }

    pub(crate) fn enqueue_send(&self, sudog: Sudog) {
        self.state.lock().sendq.push_back(sudog);
    }

    pub(crate) fn enqueue_recv(&self, sudog: Sudog) {
        self.state.lock().recvq.push_back(sudog);
    }

    /// Drop every queue entry of `waiter`.
    pub(crate) fn remove_waiter(&self, waiter: &Arc<Waiter>) {
        let mut st = self.state.lock();
        st.sendq.retain(|s| !Arc::ptr_eq(&s.waiter, waiter));
        st.recvq.retain(|s| !Arc::ptr_eq(&s.waiter, waiter));
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.lock();
        f.debug_struct("Channel")
            .field("cap", &self.cap)
            .field("len", &st.buf.len())
            .field("closed", &st.closed)
            .finish_non_exhaustive()
    }
}
