/*!
 * Core Types
 * Common types used across the telemetry core
 */

/// Cluster identifier, included in every StatsD line's tag set
pub type ClusterId = u128;

/// Replica index within the cluster, used as the Chrome-trace `pid`
pub type ReplicaIndex = u8;

/// Timestamp in microseconds since tracer init
pub type Timestamp = u64;

/// Common result type for telemetry operations
pub type TelemetryResult<T> = Result<T, super::errors::TelemetryError>;
