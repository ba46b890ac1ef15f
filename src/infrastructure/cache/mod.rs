//! Artifact cache infrastructure.
//!
//! This module provides:
//! - Content-addressed artifact storage with atomic commits
//! - Scoped scratch workspaces
//! - In-flight de-duplication of conversions
//! - Leases and size-bounded eviction

pub mod content_cache;
pub mod inflight;
pub mod leases;
pub mod sweeper;
pub mod workspace;

pub use content_cache::{CacheStats, ContentAddressedCache};
pub use inflight::{Flight, FlightGuard, FlightWaiter, InFlightRegistry};
pub use leases::{ArtifactLease, ArtifactLeases};
pub use sweeper::{
    CacheEvictionSweeper, DEFAULT_BUDGET_BYTES, DEFAULT_SWEEP_INTERVAL, SweepReport, SweepState,
    SweeperConfig,
};
pub use workspace::{Workspace, WorkspaceRoot, list_frames};
