//! Dependency Graph
//!
//! This module owns the low-level link graph: the bidirectional adjacency
//! structure connecting dependencies (producers) and subscribers (consumers).
//! It deals purely in arena indices and flags; values, closures, and
//! scheduling live in the `reactive` module that drives it.

mod link;

pub use link::{DepId, Graph, LinkId, SubId};
