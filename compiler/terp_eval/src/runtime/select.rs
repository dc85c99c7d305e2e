//! `select` over several channel operations.

use std::sync::Arc;

use rand::seq::SliceRandom;

use super::channel::{RecvOutcome, SendOutcome, Sudog};
use super::{Channel, Runtime, Waiter};
use crate::errors::{closed_channel, ExecResult};
use crate::Value;

/// One case of a select; a `None` channel is never ready.
pub(crate) enum SelectArm {
    Send {
        chan: Option<Arc<Channel>>,
        value: Value,
    },
    Recv {
        chan: Option<Arc<Channel>>,
    },
}

impl SelectArm {
    fn chan(&self) -> Option<&Arc<Channel>> {
        match self {
            SelectArm::Send { chan, .. } | SelectArm::Recv { chan } => chan.as_ref(),
        }
    }
}

#[derive(Debug)]
pub(crate) enum SelectResult {
    Default,
    Sent(usize),
    /// `value` is `None` when the channel was closed.
    Received { case: usize, value: Option<Value> },
}

impl Runtime {
    /// Complete exactly one ready case, chosen uniformly among the ready
    /// ones; otherwise run `default` or park on every case.
    pub(crate) fn select(
        &self,
        arms: &[SelectArm],
        has_default: bool,
        waiter: &Arc<Waiter>,
        is_main: bool,
    ) -> ExecResult<SelectResult> {
        let mut order: Vec<usize> = (0..arms.len()).collect();
        order.shuffle(&mut rand::thread_rng());

        let mut sched = self.sched.lock();
        for &i in &order {
            match &arms[i] {
                SelectArm::Send {
                    chan: Some(chan),
                    value,
                } => match chan.try_send(&mut sched, value.clone()) {
                    SendOutcome::Sent => return Ok(SelectResult::Sent(i)),
                    SendOutcome::Closed => return Err(closed_channel("send on closed channel")),
                    SendOutcome::Blocked(_) => {}
                },
                SelectArm::Recv { chan: Some(chan) } => match chan.try_recv(&mut sched) {
                    RecvOutcome::Value(v) => {
                        return Ok(SelectResult::Received {
                            case: i,
                            value: Some(v),
                        })
                    }
                    RecvOutcome::Closed => {
                        return Ok(SelectResult::Received {
                            case: i,
                            value: None,
                        })
                    }
                    RecvOutcome::Blocked => {}
                },
                _ => {}
            }
        }
        if has_default {
            return Ok(SelectResult::Default);
        }

        for &i in &order {
            match &arms[i] {
                SelectArm::Send {
                    chan: Some(chan),
                    value,
                } => chan.enqueue_send(Sudog::new(waiter, i, Some(value.clone()))),
                SelectArm::Recv { chan: Some(chan) } => {
                    chan.enqueue_recv(Sudog::new(waiter, i, None));
                }
                _ => {}
            }
        }
        let done = self.park(&mut sched, waiter, is_main);
        for arm in arms {
            if let Some(chan) = arm.chan() {
                chan.remove_waiter(waiter);
            }
        }
        drop(sched);

        let done = done?;
        match &arms[done.case] {
            SelectArm::Send { .. } if done.ok => Ok(SelectResult::Sent(done.case)),
            SelectArm::Send { .. } => Err(closed_channel("send on closed channel")),
            SelectArm::Recv { .. } => Ok(SelectResult::Received {
                case: done.case,
                value: done.value,
            }),
        }
    }
}
