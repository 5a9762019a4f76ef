//! The [`Node`] contract – a computation unit with typed ports and a
//! per-cycle update rule.
//!
//! Nodes expose a fixed, introspectable set of ports before any link is
//! attempted; their update semantics belong to the external algorithm they
//! wrap. A node must not write anything beyond its own output port values
//! during a cycle, and must never block or await I/O mid-cycle.

use strider_types::{Direction, Lifecycle, ModelDescriptor, Shape, StriderError, Value};

use crate::port::PortSet;

/// Explicit configuration passed to every node's `initialize`.
///
/// Carrying the timestep and model descriptor as an argument (rather than
/// ambient global state) keeps assembly order-independent and lets nodes be
/// tested in isolation.
#[derive(Debug, Clone)]
pub struct InitContext {
    /// Control period in seconds.
    pub dt: f64,
    /// Kinematic/dynamic model descriptor; `model.joint_count` fixes all
    /// per-joint vector lengths.
    pub model: ModelDescriptor,
}

/// A unit in the control pipeline.
///
/// Lifecycle: constructed `Unconfigured`, then `initialize` fixes the port
/// shapes (vector lengths derived from the joint count) and moves the node
/// to `Initialized`. The graph refuses to link a node that has not been
/// initialized.
pub trait Node: Send {
    /// Unique node name within the graph.
    fn name(&self) -> &str;

    /// Current lifecycle state.
    fn lifecycle(&self) -> Lifecycle;

    /// Fix port shapes and internal state sizes from the context.
    ///
    /// # Errors
    ///
    /// `StriderError::Config` when a parameter set on the node before
    /// initialization is incompatible with the model (e.g. a gain vector of
    /// the wrong length).
    fn initialize(&mut self, ctx: &InitContext) -> Result<(), StriderError>;

    /// The node's declared ports.
    fn ports(&self) -> &PortSet;

    /// Mutable access to the node's ports (used by the scheduler to deliver
    /// link values and clear freshness).
    fn ports_mut(&mut self) -> &mut PortSet;

    /// Run one cycle of the node's update rule. Inputs have already been
    /// delivered; the node writes its output ports and nothing else.
    fn update(&mut self, cycle: u64) -> Result<(), StriderError>;

    /// Whether a port with this name and direction exists.
    fn has_port(&self, name: &str, dir: Direction) -> bool {
        self.ports().has(name, dir)
    }

    /// Declared shape of a port.
    fn port_shape(&self, name: &str, dir: Direction) -> Option<Shape> {
        self.ports().shape(name, dir)
    }

    /// Clone the current value of an output port.
    fn read_output(&self, port: &str) -> Option<Value> {
        self.ports().output(port).cloned()
    }

    /// Deliver a value into an input port.
    ///
    /// # Errors
    ///
    /// `StriderError::Config` on undeclared ports or shape mismatch.
    fn write_input(&mut self, port: &str, value: Value) -> Result<(), StriderError> {
        self.ports_mut().write_input(port, value)
    }
}
