//! Completion queue.
//!
//! The queue yields one [`CompletionEvent`] per submitted batch, in posting
//! order. Submission happens through [`Call::start_batch`]; the channel
//! worker posts the matching event when the exchange finishes.
//!
//! Events carry the submitter's correlation tag so concurrent batches could
//! be demultiplexed without a protocol change, but no demultiplexing is
//! built here: every supported usage keeps at most one batch outstanding per
//! queue and trusts FIFO delivery.
//!
//! [`Call::start_batch`]: crate::call::Call::start_batch

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::op::Tag;

/// Notification that a submitted batch has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionEvent {
    /// Correlation tag supplied at submission.
    pub tag: Tag,
    /// False when the exchange failed at the transport.
    pub ok: bool,
}

/// Outcome of one [`CompletionQueue::next`] wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEvent {
    /// One completion event became available.
    Ready(CompletionEvent),
    /// The deadline elapsed with no event available.
    TimedOut,
    /// The queue was shut down and has been drained.
    Shutdown,
}

/// Deadline for a blocking wait.
#[derive(Debug, Clone, Copy)]
pub enum Deadline {
    /// Block until an event or shutdown arrives.
    Infinite,
    /// Give up after the given duration.
    After(Duration),
}

struct QueueState {
    events: VecDeque<CompletionEvent>,
    shut_down: bool,
    posted: u64,
}

/// Blocking completion source.
///
/// `shutdown` is idempotent; queued events drain first, then every `next`
/// returns [`QueueEvent::Shutdown`].
pub struct CompletionQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                events: VecDeque::new(),
                shut_down: false,
                posted: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Post a completion event. Called by the channel worker once per batch.
    ///
    /// Events posted after shutdown are dropped; submitting new work against
    /// a queue being torn down is a harness bug, not a runtime condition.
    pub fn post(&self, event: CompletionEvent) {
        let mut state = self.state.lock().unwrap();
        if state.shut_down {
            tracing::warn!(tag = event.tag.0, "completion posted after queue shutdown, dropped");
            return;
        }
        state.events.push_back(event);
        state.posted += 1;
        drop(state);
        self.available.notify_one();
    }

    /// Block until one event is available, the deadline elapses, or the
    /// queue is shut down and drained.
    pub fn next(&self, deadline: Deadline) -> QueueEvent {
        let wait_until = match deadline {
            Deadline::Infinite => None,
            Deadline::After(d) => Some(Instant::now() + d),
        };
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(event) = state.events.pop_front() {
                return QueueEvent::Ready(event);
            }
            if state.shut_down {
                return QueueEvent::Shutdown;
            }
            match wait_until {
                None => state = self.available.wait(state).unwrap(),
                Some(until) => {
                    let now = Instant::now();
                    if now >= until {
                        return QueueEvent::TimedOut;
                    }
                    let (next_state, _timed_out) =
                        self.available.wait_timeout(state, until - now).unwrap();
                    state = next_state;
                }
            }
        }
    }

    /// Shut the queue down. Idempotent; wakes every blocked waiter.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        state.shut_down = true;
        drop(state);
        self.available.notify_all();
    }

    /// True once `shutdown` has been called.
    pub fn is_shut_down(&self) -> bool {
        self.state.lock().unwrap().shut_down
    }

    /// Total events posted over the queue's lifetime.
    pub fn events_posted(&self) -> u64 {
        self.state.lock().unwrap().posted
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn ready_event_is_fifo() {
        let cq = CompletionQueue::new();
        cq.post(CompletionEvent { tag: Tag(1), ok: true });
        cq.post(CompletionEvent { tag: Tag(2), ok: false });
        assert_eq!(
            cq.next(Deadline::Infinite),
            QueueEvent::Ready(CompletionEvent { tag: Tag(1), ok: true })
        );
        assert_eq!(
            cq.next(Deadline::Infinite),
            QueueEvent::Ready(CompletionEvent { tag: Tag(2), ok: false })
        );
    }

    #[test]
    fn bounded_wait_times_out() {
        let cq = CompletionQueue::new();
        let started = Instant::now();
        let event = cq.next(Deadline::After(Duration::from_millis(20)));
        assert_eq!(event, QueueEvent::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn shutdown_drains_queued_events_first() {
        let cq = CompletionQueue::new();
        cq.post(CompletionEvent { tag: Tag(7), ok: true });
        cq.shutdown();
        cq.shutdown(); // idempotent
        assert!(matches!(cq.next(Deadline::Infinite), QueueEvent::Ready(_)));
        assert_eq!(cq.next(Deadline::Infinite), QueueEvent::Shutdown);
        assert_eq!(cq.next(Deadline::Infinite), QueueEvent::Shutdown);
    }

    #[test]
    fn shutdown_wakes_blocked_waiter() {
        let cq = Arc::new(CompletionQueue::new());
        let waiter_cq = cq.clone();
        let waiter = thread::spawn(move || waiter_cq.next(Deadline::Infinite));
        thread::sleep(Duration::from_millis(10));
        cq.shutdown();
        assert_eq!(waiter.join().unwrap(), QueueEvent::Shutdown);
    }

    #[test]
    fn post_after_shutdown_is_dropped() {
        let cq = CompletionQueue::new();
        cq.shutdown();
        cq.post(CompletionEvent { tag: Tag(9), ok: true });
        assert_eq!(cq.next(Deadline::Infinite), QueueEvent::Shutdown);
        assert_eq!(cq.events_posted(), 0);
    }
}
