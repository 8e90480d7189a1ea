//! Storage pool coordination.
//!
//! Imports into the same pool are serialized through a per-pool lock.

mod locks;

pub use locks::{PoolGuard, PoolLocks};
