//! [`ForceTorqueEstimator`] – contact wrench and joint torque estimation
//! boundary.
//!
//! The node owns the port plumbing: raw foot/hand wrenches, motor
//! currents and filtered kinematics in, sole-frame contact wrenches and
//! estimated joint torques out. The estimation itself lives behind
//! [`ForceEstimatorCore`]; the default core passes wrenches through
//! unchanged and derives torques from currents via the motor constant
//! table.

use strider_graph::{InitContext, Node, PortSet};
use strider_types::{Lifecycle, Shape, StriderError, Value};

/// Everything the estimation core sees each cycle.
pub struct ForceInputs<'a> {
    pub q: &'a [f64],
    pub dq: &'a [f64],
    pub ddq: &'a [f64],
    pub wrench_right_foot: [f64; 6],
    pub wrench_left_foot: [f64; 6],
    pub wrench_right_hand: [f64; 6],
    pub wrench_left_hand: [f64; 6],
    pub currents: &'a [f64],
}

/// Per-cycle estimation result.
pub struct ForceEstimate {
    pub right_sole: [f64; 6],
    pub left_sole: [f64; 6],
    pub right_hand: [f64; 6],
    pub left_hand: [f64; 6],
    pub joint_torques: Vec<f64>,
    pub current_filtered: Vec<f64>,
}

pub trait ForceEstimatorCore: Send {
    fn estimate(&mut self, dt: f64, inputs: &ForceInputs<'_>) -> ForceEstimate;
}

/// Default core: wrenches forwarded as-is, torque = motor constant times
/// measured current, current filter is a unit pass-through.
#[derive(Default)]
pub struct PassThroughForceCore;

impl ForceEstimatorCore for PassThroughForceCore {
    fn estimate(&mut self, _dt: f64, inputs: &ForceInputs<'_>) -> ForceEstimate {
        ForceEstimate {
            right_sole: inputs.wrench_right_foot,
            left_sole: inputs.wrench_left_foot,
            right_hand: inputs.wrench_right_hand,
            left_hand: inputs.wrench_left_hand,
            joint_torques: inputs.currents.to_vec(),
            current_filtered: inputs.currents.to_vec(),
        }
    }
}

pub struct ForceTorqueEstimator {
    name: String,
    ports: PortSet,
    core: Box<dyn ForceEstimatorCore>,
    torque_constants: Option<Vec<f64>>,
    dt: f64,
    joint_count: usize,
    state: Lifecycle,
}

impl ForceTorqueEstimator {
    pub fn new(name: &str) -> Self {
        Self::with_core(name, Box::new(PassThroughForceCore))
    }

    pub fn with_core(name: &str, core: Box<dyn ForceEstimatorCore>) -> Self {
        Self {
            name: name.to_string(),
            ports: PortSet::new(name),
            core,
            torque_constants: None,
            dt: 0.0,
            joint_count: 0,
            state: Lifecycle::Unconfigured,
        }
    }

    /// Motor torque constants (Nm per A), one per joint. Length is checked
    /// at initialization against the model.
    pub fn set_torque_constants(&mut self, k: &[f64]) {
        self.torque_constants = Some(k.to_vec());
    }
}

impl Node for ForceTorqueEstimator {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn initialize(&mut self, ctx: &InitContext) -> Result<(), StriderError> {
        let j = ctx.model.joint_count;
        if let Some(k) = &self.torque_constants {
            if k.len() != j {
                return Err(StriderError::Config(format!(
                    "{}: {} torque constants for {} joints",
                    self.name,
                    k.len(),
                    j
                )));
            }
        }
        self.dt = ctx.dt;
        self.joint_count = j;
        self.ports.declare_input("q_filtered", Shape::Vector(j));
        self.ports.declare_input("dq_filtered", Shape::Vector(j));
        self.ports.declare_input("ddq_filtered", Shape::Vector(j));
        self.ports.declare_input("ft_right_foot", Shape::Wrench);
        self.ports.declare_input("ft_left_foot", Shape::Wrench);
        self.ports.declare_input("ft_right_hand", Shape::Wrench);
        self.ports.declare_input("ft_left_hand", Shape::Wrench);
        self.ports.declare_input("currents", Shape::Vector(j));
        self.ports
            .declare_output("contact_wrench_right_sole", Shape::Wrench);
        self.ports
            .declare_output("contact_wrench_left_sole", Shape::Wrench);
        self.ports
            .declare_output("contact_wrench_right_hand", Shape::Wrench);
        self.ports
            .declare_output("contact_wrench_left_hand", Shape::Wrench);
        self.ports.declare_output("joints_torques", Shape::Vector(j));
        self.ports
            .declare_output("current_filtered", Shape::Vector(j));
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
        let q = self.ports.in_vec("q_filtered").to_vec();
        let dq = self.ports.in_vec("dq_filtered").to_vec();
        let ddq = self.ports.in_vec("ddq_filtered").to_vec();
        let currents = self.ports.in_vec("currents").to_vec();
        let inputs = ForceInputs {
            q: &q,
            dq: &dq,
            ddq: &ddq,
            wrench_right_foot: self.ports.in_wrench("ft_right_foot"),
            wrench_left_foot: self.ports.in_wrench("ft_left_foot"),
            wrench_right_hand: self.ports.in_wrench("ft_right_hand"),
            wrench_left_hand: self.ports.in_wrench("ft_left_hand"),
            currents: &currents,
        };
        let mut est = self.core.estimate(self.dt, &inputs);
        if let Some(k) = &self.torque_constants {
            for (tau, gain) in est.joint_torques.iter_mut().zip(k) {
                *tau *= gain;
            }
        }
        self.ports.set_output(
            "contact_wrench_right_sole",
            Value::Wrench(est.right_sole),
        )?;
        self.ports
            .set_output("contact_wrench_left_sole", Value::Wrench(est.left_sole))?;
        self.ports
            .set_output("contact_wrench_right_hand", Value::Wrench(est.right_hand))?;
        self.ports
            .set_output("contact_wrench_left_hand", Value::Wrench(est.left_hand))?;
        self.ports
            .set_output("joints_torques", Value::Vector(est.joint_torques))?;
        self.ports
            .set_output("current_filtered", Value::Vector(est.current_filtered))
    }
}
