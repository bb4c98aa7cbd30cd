//! Channel: a reusable connection handle and the transport seam behind it.
//!
//! A [`Channel`] owns one worker thread that drives a [`Transport`]
//! implementation. Batches submitted through a call are translated into a
//! single exchange descriptor, executed on the worker, and answered with
//! exactly one completion event on the call's queue. In-flight batches are
//! tracked in a slab keyed by an internal ticket, so the channel can report
//! how much work it still owes the queue.
//!
//! The in-tree [`EchoTransport`] is a loopback endpoint that reflects the
//! outbound payload; wire transports live behind the same trait and are not
//! part of this crate.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use slab::Slab;

use crate::call::{Call, RecvSlots, RpcStatus, StatusCode};
use crate::completion::{CompletionEvent, CompletionQueue};
use crate::error::{Error, Result};
use crate::op::{Batch, Metadata, Op, Tag};
use crate::runtime::Runtime;

/// Outbound half of one batch exchange, plus the receive slots requested.
#[derive(Debug)]
pub struct OutboundBatch {
    /// Initial metadata, when the batch carries send-header.
    pub metadata: Option<Metadata>,
    /// Payload buffer, when the batch carries send-payload. Shared and
    /// never mutated after construction.
    pub payload: Option<Arc<[u8]>>,
    /// True when the batch carries send-end.
    pub end_of_input: bool,
    /// Call deadline, for transports that enforce one.
    pub deadline: Option<Duration>,
    /// True when the batch carries recv-header.
    pub want_header: bool,
    /// True when the batch carries recv-payload.
    pub want_payload: bool,
    /// True when the batch carries recv-status.
    pub want_status: bool,
}

/// Inbound half of one batch exchange.
#[derive(Debug, Default)]
pub struct InboundBatch {
    pub header: Option<Metadata>,
    pub payload: Option<Vec<u8>>,
    pub status: Option<RpcStatus>,
}

/// A connection's wire behavior. Implementations execute one batch exchange
/// at a time; the channel worker serializes calls.
pub trait Transport: Send + Sync + 'static {
    /// Execute one exchange against the remote endpoint.
    fn exchange(&self, method: &str, outbound: OutboundBatch) -> io::Result<InboundBatch>;
}

/// Loopback endpoint: echoes the outbound payload, returns empty initial
/// metadata and an OK terminal status when asked for them.
pub struct EchoTransport;

impl Transport for EchoTransport {
    fn exchange(&self, _method: &str, outbound: OutboundBatch) -> io::Result<InboundBatch> {
        Ok(InboundBatch {
            header: outbound.want_header.then(Metadata::new),
            // The payload slot stays empty when nothing was sent.
            payload: if outbound.want_payload {
                outbound.payload.as_ref().map(|p| p.to_vec())
            } else {
                None
            },
            status: outbound.want_status.then(RpcStatus::ok),
        })
    }
}

struct WorkItem {
    method: String,
    outbound: OutboundBatch,
    tag: Tag,
    ticket: usize,
    slots: Arc<Mutex<RecvSlots>>,
    queue: Arc<CompletionQueue>,
}

struct ChannelInner {
    target: String,
    secure: bool,
    sender: Mutex<Option<Sender<WorkItem>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    in_flight: Arc<Mutex<Slab<Tag>>>,
    next_call_id: AtomicU64,
    _runtime: Runtime,
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        // Close the work queue, then wait for the worker to drain it.
        self.sender.lock().unwrap().take();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

/// Builder for a [`Channel`].
pub struct ChannelBuilder {
    target: String,
    secure: bool,
    transport: Option<Arc<dyn Transport>>,
}

impl ChannelBuilder {
    /// Start building a channel to the given target address.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            secure: false,
            transport: None,
        }
    }

    /// Enable transport security. The security layer itself is the
    /// transport's concern; the flag only travels with the channel.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Use a specific transport instead of the loopback echo.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Connect: spawn the worker thread and return the shared handle.
    pub fn connect(self, runtime: &Runtime) -> Result<Channel> {
        let transport = self.transport.unwrap_or_else(|| Arc::new(EchoTransport));
        let (sender, receiver) = mpsc::channel::<WorkItem>();
        let in_flight: Arc<Mutex<Slab<Tag>>> = Arc::new(Mutex::new(Slab::new()));

        let worker_in_flight = in_flight.clone();
        let worker = thread::Builder::new()
            .name(format!("channel-{}", self.target))
            .spawn(move || {
                for item in receiver.iter() {
                    let ok = match transport.exchange(&item.method, item.outbound) {
                        Ok(inbound) => {
                            let mut slots = item.slots.lock().unwrap();
                            slots.header = inbound.header;
                            slots.payload = inbound.payload;
                            slots.status = inbound.status;
                            true
                        }
                        Err(e) => {
                            tracing::warn!(method = %item.method, error = %e, "exchange failed");
                            let mut slots = item.slots.lock().unwrap();
                            slots.payload = None;
                            slots.status =
                                Some(RpcStatus::with_detail(StatusCode::Unavailable, e.to_string()));
                            false
                        }
                    };
                    worker_in_flight.lock().unwrap().remove(item.ticket);
                    item.queue.post(CompletionEvent { tag: item.tag, ok });
                }
            })?;

        Ok(Channel {
            inner: Arc::new(ChannelInner {
                target: self.target,
                secure: self.secure,
                sender: Mutex::new(Some(sender)),
                worker: Mutex::new(Some(worker)),
                in_flight,
                next_call_id: AtomicU64::new(1),
                _runtime: runtime.clone(),
            }),
        })
    }
}

/// Reusable connection handle, shared across calls via cheap clone.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Target address this channel was built for.
    pub fn target(&self) -> &str {
        &self.inner.target
    }

    /// True when the channel was built with transport security.
    pub fn is_secure(&self) -> bool {
        self.inner.secure
    }

    /// Number of batches submitted but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().unwrap().len()
    }

    /// Bind a call to a method and deadline, delivering its completions to
    /// the given queue.
    pub fn create_call(
        &self,
        method: &str,
        deadline: Option<Duration>,
        queue: Arc<CompletionQueue>,
    ) -> Call {
        let id = self.inner.next_call_id.fetch_add(1, Ordering::Relaxed);
        Call::new(id, method, deadline, self.clone(), queue)
    }

    pub(crate) fn submit_batch(
        &self,
        method: &str,
        deadline: Option<Duration>,
        batch: Batch,
        tag: Tag,
        slots: Arc<Mutex<RecvSlots>>,
        queue: Arc<CompletionQueue>,
    ) -> Result<()> {
        let mut outbound = OutboundBatch {
            metadata: None,
            payload: None,
            end_of_input: false,
            deadline,
            want_header: false,
            want_payload: false,
            want_status: false,
        };
        for op in batch.ops() {
            match op {
                Op::SendHeader(md) => outbound.metadata = Some(md.clone()),
                Op::SendPayload(buf) => outbound.payload = Some(buf.clone()),
                Op::SendEnd => outbound.end_of_input = true,
                Op::RecvHeader => outbound.want_header = true,
                Op::RecvPayload => outbound.want_payload = true,
                Op::RecvStatus => outbound.want_status = true,
            }
        }

        let ticket = self.inner.in_flight.lock().unwrap().insert(tag);
        let item = WorkItem {
            method: method.to_owned(),
            outbound,
            tag,
            ticket,
            slots,
            queue,
        };
        let sender = self.inner.sender.lock().unwrap();
        match sender.as_ref() {
            Some(tx) => tx.send(item).map_err(|_| {
                self.inner.in_flight.lock().unwrap().remove(ticket);
                Error::ChannelClosed
            }),
            None => {
                self.inner.in_flight.lock().unwrap().remove(ticket);
                Err(Error::ChannelClosed)
            }
        }
    }
}
