//! Operation and batch model.
//!
//! An exchange on a call is expressed as a [`Batch`]: an ordered set of up to
//! six [`Op`]s, each kind appearing at most once, submitted atomically and
//! answered by exactly one completion event carrying the batch's [`Tag`].

use std::sync::Arc;

use crate::error::{Error, Result};

/// Correlation tag attached to a submitted batch.
///
/// Chosen by the submitter, opaque to the queue. Must be unique among
/// concurrently outstanding batches on the same completion queue; under the
/// one-outstanding-batch discipline any constant works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub u64);

/// Ordered key/value metadata pairs, possibly empty. Contents are opaque to
/// the core; the echo transport reflects none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pairs: Vec<(String, String)>,
}

impl Metadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key/value pair, keeping insertion order.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Value of the first pair with the given key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True if no pairs are present.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterate over pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The six operation kinds, used for duplicate detection and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    SendHeader,
    SendPayload,
    SendEnd,
    RecvHeader,
    RecvPayload,
    RecvStatus,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OpKind::SendHeader => "send-header",
            OpKind::SendPayload => "send-payload",
            OpKind::SendEnd => "send-end",
            OpKind::RecvHeader => "recv-header",
            OpKind::RecvPayload => "recv-payload",
            OpKind::RecvStatus => "recv-status",
        };
        f.write_str(name)
    }
}

/// A single directional action on a call.
///
/// Outbound payloads are `Arc<[u8]>`: the buffer is shared, never mutated
/// after construction, and safe to attach to any number of batches.
#[derive(Debug, Clone)]
pub enum Op {
    /// Send initial metadata (possibly empty).
    SendHeader(Metadata),
    /// Send one opaque payload buffer.
    SendPayload(Arc<[u8]>),
    /// Signal no more outbound payloads.
    SendEnd,
    /// Receive the peer's initial metadata.
    RecvHeader,
    /// Receive one payload buffer (slot stays empty on failure).
    RecvPayload,
    /// Receive the terminal status, detail string and trailing metadata.
    RecvStatus,
}

impl Op {
    /// Kind of this operation.
    pub fn kind(&self) -> OpKind {
        match self {
            Op::SendHeader(_) => OpKind::SendHeader,
            Op::SendPayload(_) => OpKind::SendPayload,
            Op::SendEnd => OpKind::SendEnd,
            Op::RecvHeader => OpKind::RecvHeader,
            Op::RecvPayload => OpKind::RecvPayload,
            Op::RecvStatus => OpKind::RecvStatus,
        }
    }
}

/// An ordered, fixed set of operations submitted atomically against one call.
///
/// Immutable once built; submission consumes it, and exactly one completion
/// event answers it.
#[derive(Debug)]
pub struct Batch {
    ops: Vec<Op>,
}

impl Batch {
    /// Start building a batch.
    pub fn builder() -> BatchBuilder {
        BatchBuilder { ops: Vec::new() }
    }

    /// Operations in submission order.
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// True if the batch contains an operation of the given kind.
    pub fn contains(&self, kind: OpKind) -> bool {
        self.ops.iter().any(|op| op.kind() == kind)
    }
}

/// Builder appending operations in the order required by the exchange shape.
#[derive(Debug, Default)]
pub struct BatchBuilder {
    ops: Vec<Op>,
}

impl BatchBuilder {
    /// Append a send-header operation.
    pub fn send_header(mut self, metadata: Metadata) -> Self {
        self.ops.push(Op::SendHeader(metadata));
        self
    }

    /// Append a send-payload operation.
    pub fn send_payload(mut self, payload: Arc<[u8]>) -> Self {
        self.ops.push(Op::SendPayload(payload));
        self
    }

    /// Append a send-end operation.
    pub fn send_end(mut self) -> Self {
        self.ops.push(Op::SendEnd);
        self
    }

    /// Append a recv-header operation.
    pub fn recv_header(mut self) -> Self {
        self.ops.push(Op::RecvHeader);
        self
    }

    /// Append a recv-payload operation.
    pub fn recv_payload(mut self) -> Self {
        self.ops.push(Op::RecvPayload);
        self
    }

    /// Append a recv-status operation.
    pub fn recv_status(mut self) -> Self {
        self.ops.push(Op::RecvStatus);
        self
    }

    /// Validate and build the batch.
    ///
    /// Fails on an empty batch or on a kind appearing more than once; order
    /// within the batch is caller-defined and preserved.
    pub fn build(self) -> Result<Batch> {
        if self.ops.is_empty() {
            return Err(Error::EmptyBatch);
        }
        for (i, op) in self.ops.iter().enumerate() {
            if self.ops[..i].iter().any(|prev| prev.kind() == op.kind()) {
                return Err(Error::DuplicateOp(op.kind()));
            }
        }
        Ok(Batch { ops: self.ops })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_preserves_op_order() {
        let payload: Arc<[u8]> = vec![1u8; 4].into();
        let batch = Batch::builder()
            .send_header(Metadata::new())
            .send_payload(payload)
            .send_end()
            .recv_header()
            .recv_payload()
            .recv_status()
            .build()
            .unwrap();
        assert!(batch.contains(OpKind::SendEnd));
        assert!(batch.contains(OpKind::RecvStatus));
        let kinds: Vec<OpKind> = batch.ops().iter().map(Op::kind).collect();
        assert_eq!(
            kinds,
            vec![
                OpKind::SendHeader,
                OpKind::SendPayload,
                OpKind::SendEnd,
                OpKind::RecvHeader,
                OpKind::RecvPayload,
                OpKind::RecvStatus,
            ]
        );
    }

    #[test]
    fn empty_batch_rejected() {
        assert!(matches!(Batch::builder().build(), Err(Error::EmptyBatch)));
    }

    #[test]
    fn duplicate_kind_rejected() {
        let result = Batch::builder().send_end().send_end().build();
        assert!(matches!(result, Err(Error::DuplicateOp(OpKind::SendEnd))));
    }

    #[test]
    fn metadata_lookup_is_first_match() {
        let mut md = Metadata::new();
        md.insert("k", "v1");
        md.insert("k", "v2");
        assert_eq!(md.get("k"), Some("v1"));
        assert_eq!(md.len(), 2);
    }
}
