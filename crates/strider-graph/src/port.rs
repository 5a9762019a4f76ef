//! [`PortSet`] – the typed value slots owned by a node.
//!
//! Every node declares its full port set during `initialize`, before any
//! link touching the node is attempted. A port's value is owned by its node;
//! links establish a read dependency and never transfer ownership.
//!
//! # Freshness
//!
//! Input and output ports carry a per-cycle freshness flag. The scheduler
//! clears a node's flags at the start of its turn; delivering a link or
//! calling [`PortSet::set_output`] sets them again. A consumer that finds an
//! input port not fresh this cycle knows its source did not produce a
//! value, which is the condition the control manager treats as fail-static.

use std::collections::BTreeMap;

use strider_types::{Direction, Shape, StriderError, Value};

struct InputPort {
    shape: Shape,
    value: Value,
    fresh: bool,
}

struct OutputPort {
    shape: Shape,
    value: Value,
    fresh: bool,
}

/// Declared input and output ports of one node, keyed by port name.
pub struct PortSet {
    node: String,
    inputs: BTreeMap<String, InputPort>,
    outputs: BTreeMap<String, OutputPort>,
}

impl PortSet {
    /// Create an empty port set for the node called `node`.
    pub fn new(node: &str) -> Self {
        Self {
            node: node.to_string(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Name of the owning node (used in error messages).
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Declare an input port holding the shape's default value.
    pub fn declare_input(&mut self, name: &str, shape: Shape) {
        self.inputs.insert(
            name.to_string(),
            InputPort {
                shape,
                value: shape.default_value(),
                fresh: false,
            },
        );
    }

    /// Declare an output port holding the shape's default value.
    pub fn declare_output(&mut self, name: &str, shape: Shape) {
        self.outputs.insert(
            name.to_string(),
            OutputPort {
                shape,
                value: shape.default_value(),
                fresh: false,
            },
        );
    }

    /// Whether a port with this name and direction was declared.
    pub fn has(&self, name: &str, dir: Direction) -> bool {
        match dir {
            Direction::Input => self.inputs.contains_key(name),
            Direction::Output => self.outputs.contains_key(name),
        }
    }

    /// Declared shape of a port, or `None` when it does not exist.
    pub fn shape(&self, name: &str, dir: Direction) -> Option<Shape> {
        match dir {
            Direction::Input => self.inputs.get(name).map(|p| p.shape),
            Direction::Output => self.outputs.get(name).map(|p| p.shape),
        }
    }

    /// Write `value` into the named input port, marking it fresh.
    ///
    /// # Errors
    ///
    /// `StriderError::Config` when the port was never declared (a contract
    /// violation, not a runtime fallback) or when the value's shape does not
    /// match the declared shape.
    pub fn write_input(&mut self, name: &str, value: Value) -> Result<(), StriderError> {
        let node = self.node.clone();
        let port = self.inputs.get_mut(name).ok_or_else(|| {
            StriderError::Config(format!("node '{node}' has no input port '{name}'"))
        })?;
        if value.shape() != port.shape {
            return Err(StriderError::Config(format!(
                "shape mismatch writing {node}.{name}: expected {}, got {}",
                port.shape,
                value.shape()
            )));
        }
        port.value = value;
        port.fresh = true;
        Ok(())
    }

    /// Set the named output port, marking it fresh for this cycle.
    ///
    /// # Errors
    ///
    /// `StriderError::Config` on undeclared ports or shape mismatch.
    pub fn set_output(&mut self, name: &str, value: Value) -> Result<(), StriderError> {
        let node = self.node.clone();
        let port = self.outputs.get_mut(name).ok_or_else(|| {
            StriderError::Config(format!("node '{node}' has no output port '{name}'"))
        })?;
        if value.shape() != port.shape {
            return Err(StriderError::Config(format!(
                "shape mismatch writing {node}.{name}: expected {}, got {}",
                port.shape,
                value.shape()
            )));
        }
        port.value = value;
        port.fresh = true;
        Ok(())
    }

    /// Current value of an input port.
    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name).map(|p| &p.value)
    }

    /// Current value of an output port.
    pub fn output(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name).map(|p| &p.value)
    }

    /// Whether the named input port received a value this cycle.
    pub fn input_fresh(&self, name: &str) -> bool {
        self.inputs.get(name).is_some_and(|p| p.fresh)
    }

    /// Whether the named output port was written this cycle.
    pub fn output_fresh(&self, name: &str) -> bool {
        self.outputs.get(name).is_some_and(|p| p.fresh)
    }

    /// Clear all freshness flags. Called by the scheduler at the start of
    /// the owning node's turn.
    pub fn begin_cycle(&mut self) {
        for port in self.inputs.values_mut() {
            port.fresh = false;
        }
        for port in self.outputs.values_mut() {
            port.fresh = false;
        }
    }

    /// Convenience: the named input as a slice, or an empty slice when the
    /// port is absent or not a vector. Node update rules use this after
    /// having declared the port themselves, so the empty case only arises
    /// on programmer error, which the shape checks surface elsewhere.
    pub fn in_vec(&self, name: &str) -> &[f64] {
        match self.input(name) {
            Some(Value::Vector(v)) => v,
            _ => &[],
        }
    }

    /// Convenience: the named input as a wrench, or zero.
    pub fn in_wrench(&self, name: &str) -> [f64; 6] {
        match self.input(name) {
            Some(Value::Wrench(w)) => *w,
            _ => [0.0; 6],
        }
    }

    /// Names of all declared input ports.
    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    /// Names of all declared output ports.
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }
}
