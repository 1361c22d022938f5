//! Shared primitive types used across the entire calibration pipeline.

/// An agent-type identifier (H_IDX in the wire format).
pub type AgentId = i64;

/// A zone identifier (I_IDX in the wire format).
pub type ZoneId = i64;

/// A real-estate type identifier (V_IDX in the wire format).
pub type TypeId = i64;

/// A market identifier (M_IDX / IDMARKET in the wire format).
pub type MarketId = i64;
