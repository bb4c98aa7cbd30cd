//! Call lifecycle.
//!
//! A [`Call`] is one bound RPC invocation: method, optional deadline, owning
//! channel and completion queue. Its state machine is
//! `active ⇄ batch-outstanding → terminated`, with at most one outstanding
//! batch at any time. Submitting a second batch before the first completes
//! is a harness programming error and fails fatally rather than queueing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::channel::Channel;
use crate::completion::{CompletionEvent, CompletionQueue};
use crate::error::{Error, Result};
use crate::op::{Batch, Metadata, Tag};

/// Terminal status codes surfaced by a recv-status operation.
///
/// A non-OK code is data, not a harness error: the benchmark loop measures
/// round-trip latency without branching on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Cancelled,
    DeadlineExceeded,
    Unimplemented,
    Internal,
    Unavailable,
}

impl StatusCode {
    /// True for [`StatusCode::Ok`].
    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }
}

/// Terminal RPC outcome: code, detail string and trailing metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcStatus {
    pub code: StatusCode,
    pub detail: String,
    pub trailing: Metadata,
}

impl RpcStatus {
    /// Successful status with no detail.
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            detail: String::new(),
            trailing: Metadata::new(),
        }
    }

    /// Status with the given code and detail.
    pub fn with_detail(code: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
            trailing: Metadata::new(),
        }
    }
}

/// Call lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Bound and able to accept a batch.
    Active,
    /// A batch is in flight; no further submissions accepted.
    BatchOutstanding,
    /// Released; accepts nothing.
    Terminated,
}

/// Receive-side output slots, filled by the channel worker before the
/// completion event is posted and drained by the caller afterwards.
#[derive(Debug, Default)]
pub(crate) struct RecvSlots {
    pub(crate) header: Option<Metadata>,
    pub(crate) payload: Option<Vec<u8>>,
    pub(crate) status: Option<RpcStatus>,
}

/// One bound RPC invocation.
pub struct Call {
    id: u64,
    method: String,
    deadline: Option<Duration>,
    channel: Channel,
    queue: Arc<CompletionQueue>,
    state: CallState,
    outstanding: Option<Tag>,
    slots: Arc<Mutex<RecvSlots>>,
}

impl Call {
    pub(crate) fn new(
        id: u64,
        method: &str,
        deadline: Option<Duration>,
        channel: Channel,
        queue: Arc<CompletionQueue>,
    ) -> Self {
        Self {
            id,
            method: method.to_owned(),
            deadline,
            channel,
            queue,
            state: CallState::Active,
            outstanding: None,
            slots: Arc::new(Mutex::new(RecvSlots::default())),
        }
    }

    /// Channel-unique identity of this call.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Bound method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Bound deadline, if any. Enforcement belongs to the transport.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CallState {
        self.state
    }

    /// Submit a batch against this call, tagged for correlation.
    ///
    /// Fails with [`Error::BatchOutstanding`] or [`Error::CallTerminated`]
    /// when the call cannot accept work; both are invariant violations the
    /// harness aborts on.
    pub fn start_batch(&mut self, batch: Batch, tag: Tag) -> Result<()> {
        match self.state {
            CallState::Active => {}
            CallState::BatchOutstanding => return Err(Error::BatchOutstanding),
            CallState::Terminated => return Err(Error::CallTerminated),
        }
        self.channel.submit_batch(
            &self.method,
            self.deadline,
            batch,
            tag,
            self.slots.clone(),
            self.queue.clone(),
        )?;
        self.state = CallState::BatchOutstanding;
        self.outstanding = Some(tag);
        Ok(())
    }

    /// Acknowledge the completion event for the outstanding batch, making
    /// the call active again. The event's tag must match the submitted one.
    pub fn finish_batch(&mut self, event: &CompletionEvent) -> Result<()> {
        match self.outstanding {
            Some(tag) if tag == event.tag => {
                self.outstanding = None;
                self.state = CallState::Active;
                Ok(())
            }
            Some(tag) => Err(Error::TagMismatch {
                expected: tag,
                got: event.tag,
            }),
            None => Err(Error::TagMismatch {
                expected: Tag(0),
                got: event.tag,
            }),
        }
    }

    /// Take the received initial metadata, if any.
    pub fn take_header(&mut self) -> Option<Metadata> {
        self.slots.lock().unwrap().header.take()
    }

    /// Take the received payload buffer, transferring ownership to the
    /// caller. Empty when the exchange produced no payload.
    pub fn take_payload(&mut self) -> Option<Vec<u8>> {
        self.slots.lock().unwrap().payload.take()
    }

    /// Take the terminal status, if one was received.
    pub fn take_status(&mut self) -> Option<RpcStatus> {
        self.slots.lock().unwrap().status.take()
    }

    /// Peek at the received status code without consuming the slot.
    pub fn status_code(&self) -> Option<StatusCode> {
        self.slots.lock().unwrap().status.as_ref().map(|s| s.code)
    }

    /// Explicitly release the call. Further submissions fail.
    pub fn terminate(&mut self) {
        self.state = CallState::Terminated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_ok_predicate() {
        assert!(StatusCode::Ok.is_ok());
        assert!(!StatusCode::Unavailable.is_ok());
        assert!(RpcStatus::ok().code.is_ok());
    }

    #[test]
    fn with_detail_keeps_code() {
        let status = RpcStatus::with_detail(StatusCode::Unavailable, "worker gone");
        assert_eq!(status.code, StatusCode::Unavailable);
        assert_eq!(status.detail, "worker gone");
        assert!(status.trailing.is_empty());
    }
}
