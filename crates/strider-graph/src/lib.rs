//! `strider-graph` – typed signal graph and cycle scheduler.
//!
//! The control pipeline is a directed graph of computation nodes connected by
//! typed signal links, executed once per control tick. This crate owns the
//! graph-assembly protocol and the per-cycle traversal; the numerical content
//! of each node lives in `strider-nodes`.
//!
//! # Modules
//!
//! - [`port`] – [`PortSet`][port::PortSet]: declared, typed, directionally
//!   fixed value slots with per-cycle freshness tracking.
//! - [`node`] – the [`Node`][node::Node] contract every pipeline unit
//!   implements: introspectable ports, init-before-link lifecycle, one
//!   `update` per cycle.
//! - [`graph`] – [`Graph`][graph::Graph]: node storage and the resolved
//!   link set, single writer per destination port by construction.
//! - [`builder`] – [`GraphBuilder`][builder::GraphBuilder]: required,
//!   optional, and ordered-fallback link resolution with degradation
//!   records instead of exception-driven probing.
//! - [`scheduler`] – [`CycleScheduler`][scheduler::CycleScheduler]: one
//!   synchronous ordered pass of the graph per external clock tick.

pub mod builder;
pub mod graph;
pub mod node;
pub mod port;
pub mod scheduler;

pub use builder::{Degradation, GraphBuilder};
pub use graph::{Graph, Link};
pub use node::{InitContext, Node};
pub use port::PortSet;
pub use scheduler::CycleScheduler;
