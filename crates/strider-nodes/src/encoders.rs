//! [`EncoderSelector`] – extracts the actuated-joint block from the
//! free-flyer state vector.
//!
//! The device publishes `robot_state` with the 6-dof base pose prepended;
//! everything joint-side of the pipeline wants the J encoder values only.
//! Implemented as a general `[lo, hi)` range selector.

use strider_graph::{InitContext, Node, PortSet};
use strider_types::{Lifecycle, Shape, StriderError, Value};

pub struct EncoderSelector {
    name: String,
    ports: PortSet,
    lo: usize,
    hi: usize,
    state: Lifecycle,
}

impl EncoderSelector {
    /// Selector over `[6, J+6)`: the encoder block of the device state.
    pub fn encoders(name: &str) -> Self {
        // hi is patched to J+6 at initialize.
        Self::range(name, 6, usize::MAX)
    }

    /// Selector over an explicit `[lo, hi)` range of the input vector.
    pub fn range(name: &str, lo: usize, hi: usize) -> Self {
        Self {
            name: name.to_string(),
            ports: PortSet::new(name),
            lo,
            hi,
            state: Lifecycle::Unconfigured,
        }
    }
}

impl Node for EncoderSelector {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn initialize(&mut self, ctx: &InitContext) -> Result<(), StriderError> {
        let j = ctx.model.joint_count;
        if self.hi == usize::MAX {
            self.hi = j + 6;
        }
        if self.lo >= self.hi {
            return Err(StriderError::Config(format!(
                "{}: empty selection range [{}, {})",
                self.name, self.lo, self.hi
            )));
        }
        self.ports.declare_input("sin", Shape::Vector(self.hi));
        self.ports
            .declare_output("sout", Shape::Vector(self.hi - self.lo));
        self.state = Lifecycle::Initialized;
        Ok(())
    }

    fn ports(&self) -> &PortSet {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut PortSet {
        &mut self.ports
    }

    fn update(&mut self, _cycle: u64) -> Result<(), StriderError> {
        let full = self.ports.in_vec("sin");
        if full.len() < self.hi {
            return Ok(());
        }
        let slice = full[self.lo..self.hi].to_vec();
        self.ports.set_output("sout", Value::Vector(slice))
    }
}
