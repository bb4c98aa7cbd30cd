//! batchrpc - driving completion-queue RPC batches from synchronous code.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ Scenario {init, step}                                          │
//! │   │ builds Batch (1–6 ops, tag)                                │
//! │   ▼                                                            │
//! │ Call ── start_batch ──► Channel worker ──► Transport.exchange  │
//! │   ▲                          │                                 │
//! │   │ take_payload             ▼ fills recv slots                │
//! │   └── finish_batch ◄── CompletionQueue.next (blocking)         │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two usage shapes share this core:
//!
//! - **Benchmark loop**: one thread submits a batch per step, waits on the
//!   completion queue with an unbounded deadline, and records the
//!   round-trip duration. At most one batch is ever outstanding, so the
//!   next event always answers the batch just submitted.
//! - **One-shot wait**: an operation finishing on another execution
//!   context posts through a [`sync::CompletionHandle`]; the caller blocks
//!   in [`sync::Synchronizer::wait`] until kicked.
//!
//! Transports, wire formats and payload contents are external: the crate
//! ships a loopback [`channel::EchoTransport`] and treats buffers as
//! opaque bytes.

pub mod call;
pub mod channel;
pub mod completion;
pub mod error;
pub mod latency;
pub mod op;
pub mod runtime;
pub mod scenario;
pub mod sync;
pub mod verifier;

// Re-export main types
pub use call::{Call, CallState, RpcStatus, StatusCode};
pub use channel::{Channel, ChannelBuilder, EchoTransport, InboundBatch, OutboundBatch, Transport};
pub use completion::{CompletionEvent, CompletionQueue, Deadline, QueueEvent};
pub use error::{Error, Result};
pub use latency::LatencyRecorder;
pub use op::{Batch, BatchBuilder, Metadata, Op, OpKind, Tag};
pub use runtime::{Profiler, Runtime};
pub use scenario::{Scenario, ScenarioEnv, ScenarioKind, STREAM_METHOD, UNARY_METHOD};
pub use sync::{CompletionHandle, Synchronizer};
pub use verifier::{Claims, ClaimsVerifier, VerifyStatus};
