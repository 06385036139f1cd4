//! Property-based test generators using proptest.
//!
//! Provides strategies for generating stream ids, payloads, and whole
//! write scripts that maintain the sequencing invariants a real caller
//! would honor.

use proptest::prelude::*;
use streamlog_core::StreamId;

/// One step of a generated write script.
///
/// Offsets are not generated directly; rewrites carry a fraction of the
/// tail at execution time so scripts stay sequencing-valid regardless of
/// how earlier steps changed the tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Append bytes at the current tail.
    Append(Vec<u8>),
    /// Append bytes at the current tail with the barrier flag.
    AppendBarrier(Vec<u8>),
    /// Rewrite at `numerator/255` of the current tail with fresh bytes.
    Rewrite {
        /// Position of the rewrite as a fraction of the tail (0..=255).
        numerator: u8,
        /// Replacement bytes written at the rewrite point.
        data: Vec<u8>,
    },
    /// Flush any coalesced bytes.
    Flush,
}

impl WriteOp {
    /// Resolves the target offset for this op given the current tail.
    #[must_use]
    pub fn offset(&self, tail: u64) -> u64 {
        match self {
            Self::Append(_) | Self::AppendBarrier(_) | Self::Flush => tail,
            Self::Rewrite { numerator, .. } => tail * u64::from(*numerator) / 255,
        }
    }
}

/// Strategy for generating stream ids.
pub fn stream_id_strategy() -> impl Strategy<Value = StreamId> {
    prop::array::uniform16(any::<u8>()).prop_map(StreamId::from_bytes)
}

/// Strategy for generating write payloads, biased toward sizes that
/// straddle the store's metadata/payload boundary.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 1..64),
        prop::collection::vec(any::<u8>(), 150..300),
        prop::collection::vec(any::<u8>(), 1024..2048),
    ]
}

/// Strategy for one write-script step.
pub fn write_op_strategy() -> impl Strategy<Value = WriteOp> {
    prop_oneof![
        4 => payload_strategy().prop_map(WriteOp::Append),
        2 => payload_strategy().prop_map(WriteOp::AppendBarrier),
        1 => (any::<u8>(), payload_strategy())
            .prop_map(|(numerator, data)| WriteOp::Rewrite { numerator, data }),
        1 => Just(WriteOp::Flush),
    ]
}

/// Strategy for a whole write script.
pub fn write_script_strategy(max_ops: usize) -> impl Strategy<Value = Vec<WriteOp>> {
    prop::collection::vec(write_op_strategy(), 1..max_ops)
}
