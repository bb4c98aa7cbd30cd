//! Call/channel-level exchange tests against the loopback transport.

use std::io;
use std::sync::Arc;

use batchrpc::{
    Batch, CallState, ChannelBuilder, CompletionQueue, Deadline, Error, InboundBatch, Metadata,
    OutboundBatch, QueueEvent, Runtime, StatusCode, Tag, Transport,
};

// =============================================================================
// Helpers
// =============================================================================

fn unary_batch(payload: Arc<[u8]>) -> Batch {
    Batch::builder()
        .send_header(Metadata::new())
        .send_payload(payload)
        .send_end()
        .recv_header()
        .recv_payload()
        .recv_status()
        .build()
        .expect("valid batch")
}

fn wait_ready(cq: &CompletionQueue) -> batchrpc::CompletionEvent {
    match cq.next(Deadline::Infinite) {
        QueueEvent::Ready(event) => event,
        other => panic!("expected a ready event, got {:?}", other),
    }
}

/// Transport that fails every exchange, for the error-completion path.
struct FailingTransport;

impl Transport for FailingTransport {
    fn exchange(&self, _method: &str, _outbound: OutboundBatch) -> io::Result<InboundBatch> {
        Err(io::Error::other("exchange refused"))
    }
}

// =============================================================================
// Payload round trip
// =============================================================================

#[test]
fn payload_round_trip_preserves_length_and_content() {
    let runtime = Runtime::init();
    let channel = ChannelBuilder::new("localhost:443")
        .connect(&runtime)
        .expect("connect");
    let cq = Arc::new(CompletionQueue::new());

    let sent: Arc<[u8]> = (0..64u8).collect::<Vec<u8>>().into();
    let mut call = call_on(&channel, &cq);
    assert_eq!(call.state(), CallState::Active);
    call.start_batch(unary_batch(sent.clone()), Tag(1)).unwrap();
    assert_eq!(call.state(), CallState::BatchOutstanding);

    let event = wait_ready(&cq);
    assert!(event.ok);
    assert_eq!(event.tag, Tag(1));
    call.finish_batch(&event).unwrap();
    assert_eq!(call.state(), CallState::Active);

    let received = call.take_payload().expect("payload echoed back");
    assert_eq!(received.len(), sent.len());
    assert_eq!(&received[..], &sent[..]);
}

#[test]
fn recv_payload_slot_stays_empty_without_outbound_payload() {
    let runtime = Runtime::init();
    let channel = ChannelBuilder::new("localhost:443")
        .connect(&runtime)
        .expect("connect");
    let cq = Arc::new(CompletionQueue::new());

    let mut call = call_on(&channel, &cq);
    let batch = Batch::builder().recv_payload().build().unwrap();
    call.start_batch(batch, Tag(1)).unwrap();

    let event = wait_ready(&cq);
    assert!(event.ok);
    call.finish_batch(&event).unwrap();
    assert!(call.take_payload().is_none());
}

// =============================================================================
// One-outstanding-batch invariant
// =============================================================================

#[test]
fn second_batch_rejected_while_first_outstanding() {
    let runtime = Runtime::init();
    let channel = ChannelBuilder::new("localhost:443")
        .connect(&runtime)
        .expect("connect");
    let cq = Arc::new(CompletionQueue::new());
    let payload: Arc<[u8]> = vec![b'x'; 4].into();

    let mut call = call_on(&channel, &cq);
    call.start_batch(unary_batch(payload.clone()), Tag(1)).unwrap();

    let second = call.start_batch(unary_batch(payload.clone()), Tag(2));
    assert!(matches!(second, Err(Error::BatchOutstanding)));

    // After the first completes, the call accepts work again.
    let event = wait_ready(&cq);
    call.finish_batch(&event).unwrap();
    drop(call.take_payload());
    call.start_batch(unary_batch(payload), Tag(3)).unwrap();
    let event = wait_ready(&cq);
    call.finish_batch(&event).unwrap();
}

#[test]
fn batch_on_terminated_call_rejected() {
    let runtime = Runtime::init();
    let channel = ChannelBuilder::new("localhost:443")
        .connect(&runtime)
        .expect("connect");
    let cq = Arc::new(CompletionQueue::new());
    let payload: Arc<[u8]> = vec![b'x'; 1].into();

    let mut call = call_on(&channel, &cq);
    call.terminate();
    let result = call.start_batch(unary_batch(payload), Tag(1));
    assert!(matches!(result, Err(Error::CallTerminated)));
}

#[test]
fn completion_with_foreign_tag_is_a_mismatch() {
    let runtime = Runtime::init();
    let channel = ChannelBuilder::new("localhost:443")
        .connect(&runtime)
        .expect("connect");
    let cq = Arc::new(CompletionQueue::new());
    let payload: Arc<[u8]> = vec![b'x'; 1].into();

    let mut call = call_on(&channel, &cq);
    call.start_batch(unary_batch(payload), Tag(1)).unwrap();
    let mut event = wait_ready(&cq);
    event.tag = Tag(99);
    assert!(matches!(
        call.finish_batch(&event),
        Err(Error::TagMismatch { .. })
    ));
}

// =============================================================================
// Status surfaced, not branched
// =============================================================================

#[test]
fn ok_status_is_observable_after_completion() {
    let runtime = Runtime::init();
    let channel = ChannelBuilder::new("localhost:443")
        .connect(&runtime)
        .expect("connect");
    let cq = Arc::new(CompletionQueue::new());
    let payload: Arc<[u8]> = vec![b'x'; 8].into();

    let mut call = call_on(&channel, &cq);
    call.start_batch(unary_batch(payload), Tag(1)).unwrap();
    let event = wait_ready(&cq);
    call.finish_batch(&event).unwrap();

    assert_eq!(call.status_code(), Some(StatusCode::Ok));
    let status = call.take_status().unwrap();
    assert!(status.code.is_ok());
    assert!(status.trailing.is_empty());
}

#[test]
fn transport_failure_completes_with_failure_event_and_status() {
    let runtime = Runtime::init();
    let channel = ChannelBuilder::new("localhost:443")
        .transport(Arc::new(FailingTransport))
        .connect(&runtime)
        .expect("connect");
    let cq = Arc::new(CompletionQueue::new());
    let payload: Arc<[u8]> = vec![b'x'; 8].into();

    let mut call = call_on(&channel, &cq);
    call.start_batch(unary_batch(payload), Tag(1)).unwrap();

    let event = wait_ready(&cq);
    assert!(!event.ok);
    call.finish_batch(&event).unwrap();

    // Failure still yields exactly one completion; the payload slot is
    // empty and the status carries the transport detail.
    assert!(call.take_payload().is_none());
    let status = call.take_status().unwrap();
    assert_eq!(status.code, StatusCode::Unavailable);
    assert!(status.detail.contains("exchange refused"));
}

// =============================================================================
// Channel bookkeeping
// =============================================================================

#[test]
fn in_flight_returns_to_zero_after_completion() {
    let runtime = Runtime::init();
    let channel = ChannelBuilder::new("localhost:443")
        .connect(&runtime)
        .expect("connect");
    let cq = Arc::new(CompletionQueue::new());
    let payload: Arc<[u8]> = vec![b'x'; 1].into();

    let mut call = call_on(&channel, &cq);
    call.start_batch(unary_batch(payload), Tag(1)).unwrap();
    let event = wait_ready(&cq);
    call.finish_batch(&event).unwrap();
    assert_eq!(channel.in_flight(), 0);
}

#[test]
fn channel_records_target_and_security() {
    let runtime = Runtime::init();
    let channel = ChannelBuilder::new("remotehost:8443")
        .secure(true)
        .connect(&runtime)
        .expect("connect");
    assert_eq!(channel.target(), "remotehost:8443");
    assert!(channel.is_secure());
}

fn call_on(channel: &batchrpc::Channel, cq: &Arc<CompletionQueue>) -> batchrpc::Call {
    channel.create_call("/Echo/UnaryEcho", None, cq.clone())
}
