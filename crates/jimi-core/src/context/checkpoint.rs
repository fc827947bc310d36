//! Checkpoint identity.

/// A durable marker identifying a position in a [`super::Context`]'s message
/// sequence. Ids are 0-based and strictly increasing within one Context.
pub type CheckpointId = u64;
