//! Exchange scenarios.
//!
//! A scenario is a named `{init, step}` pair selected once at process start.
//! `ping-pong-request` runs one full unary exchange per step on a fresh
//! call; `ping-pong-stream` performs a header handshake once and then one
//! payload exchange per step on a single persistent call.
//!
//! Every step submits exactly one batch and waits for exactly one
//! completion event, so the one-outstanding-batch discipline holds by
//! construction.

use std::sync::Arc;

use crate::call::Call;
use crate::channel::Channel;
use crate::completion::{CompletionEvent, CompletionQueue, Deadline, QueueEvent};
use crate::error::{Error, Result};
use crate::op::{Batch, Metadata, Tag};

/// Method driven by the unary scenario.
pub const UNARY_METHOD: &str = "/Echo/UnaryEcho";
/// Method driven by the streaming scenario.
pub const STREAM_METHOD: &str = "/Echo/StreamingEcho";

/// Correlation tag used for every batch; only one is ever outstanding.
const STEP_TAG: Tag = Tag(1);

/// Shared pieces a scenario drives: the channel, the completion queue and
/// the immutable payload buffer reused by every step.
pub struct ScenarioEnv {
    pub channel: Channel,
    pub queue: Arc<CompletionQueue>,
    pub payload: Arc<[u8]>,
}

/// One exchange shape: an `init` transition and a repeatable `step`.
pub trait Scenario {
    /// Prepare the scenario. Runs once, before any step.
    fn init(&mut self) -> Result<()>;

    /// Drive one exchange to completion.
    fn step(&mut self) -> Result<()>;

    /// Release anything held across steps.
    fn finish(&mut self);

    /// Identity of the call used by the most recent init/step, for
    /// observing call reuse.
    fn call_id(&self) -> Option<u64>;
}

/// Scenario registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    PingPongRequest,
    PingPongStream,
}

impl ScenarioKind {
    /// All supported scenarios.
    pub const ALL: [ScenarioKind; 2] = [ScenarioKind::PingPongRequest, ScenarioKind::PingPongStream];

    /// Registry name of this scenario.
    pub fn name(self) -> &'static str {
        match self {
            ScenarioKind::PingPongRequest => "ping-pong-request",
            ScenarioKind::PingPongStream => "ping-pong-stream",
        }
    }

    /// Look a scenario up by registry name.
    pub fn by_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Names of all supported scenarios, for usage messages.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.into_iter().map(ScenarioKind::name).collect()
    }

    /// Instantiate the scenario over the given environment.
    pub fn into_scenario(self, env: ScenarioEnv) -> Box<dyn Scenario> {
        match self {
            ScenarioKind::PingPongRequest => Box::new(PingPongRequest {
                env,
                last_call_id: None,
            }),
            ScenarioKind::PingPongStream => Box::new(PingPongStream { env, call: None }),
        }
    }
}

fn wait_one(queue: &CompletionQueue) -> Result<CompletionEvent> {
    match queue.next(Deadline::Infinite) {
        QueueEvent::Ready(event) => Ok(event),
        QueueEvent::TimedOut | QueueEvent::Shutdown => Err(Error::QueueShutdown),
    }
}

/// Unary exchange: one request, one response, one call per step.
struct PingPongRequest {
    env: ScenarioEnv,
    last_call_id: Option<u64>,
}

impl Scenario for PingPongRequest {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn step(&mut self) -> Result<()> {
        let mut call = self
            .env
            .channel
            .create_call(UNARY_METHOD, None, self.env.queue.clone());
        self.last_call_id = Some(call.id());

        let batch = Batch::builder()
            .send_header(Metadata::new())
            .send_payload(self.env.payload.clone())
            .send_end()
            .recv_header()
            .recv_payload()
            .recv_status()
            .build()?;
        call.start_batch(batch, STEP_TAG)?;
        let event = wait_one(&self.env.queue)?;
        call.finish_batch(&event)?;

        // The received buffer is taken and released here; the status slot is
        // not inspected, latency is measured regardless of the RPC outcome.
        drop(call.take_payload());
        call.terminate();
        Ok(())
    }

    fn finish(&mut self) {}

    fn call_id(&self) -> Option<u64> {
        self.last_call_id
    }
}

/// Streaming exchange: one persistent call, one payload round trip per step.
struct PingPongStream {
    env: ScenarioEnv,
    call: Option<Call>,
}

impl Scenario for PingPongStream {
    fn init(&mut self) -> Result<()> {
        let mut call = self
            .env
            .channel
            .create_call(STREAM_METHOD, None, self.env.queue.clone());

        let handshake = Batch::builder()
            .send_header(Metadata::new())
            .recv_header()
            .build()?;
        call.start_batch(handshake, STEP_TAG)?;
        let event = wait_one(&self.env.queue)?;
        call.finish_batch(&event)?;
        drop(call.take_header());

        self.call = Some(call);
        Ok(())
    }

    fn step(&mut self) -> Result<()> {
        let call = self.call.as_mut().ok_or(Error::CallTerminated)?;

        let batch = Batch::builder()
            .send_payload(self.env.payload.clone())
            .recv_payload()
            .build()?;
        call.start_batch(batch, STEP_TAG)?;
        let event = wait_one(&self.env.queue)?;
        call.finish_batch(&event)?;
        drop(call.take_payload());
        Ok(())
    }

    fn finish(&mut self) {
        if let Some(mut call) = self.call.take() {
            call.terminate();
        }
    }

    fn call_id(&self) -> Option<u64> {
        self.call.as_ref().map(Call::id)
    }
}
