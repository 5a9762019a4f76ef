//! [`AdmittanceController`] – force tracking through small joint offsets.

use strider_graph::{InitContext, Node, PortSet};
use strider_types::{Lifecycle, Shape, StriderError, Value};

/// Integrates the foot wrench tracking error into a desired joint
/// position offset.
///
/// Each controlled joint accumulates `kp · (f_ref - f_meas)` of its leg's
/// wrench error per second; joints outside the `controlled_joints` mask
/// pass the encoder value through untouched. The `q_des` output feeds the
/// `adm` control mode.
pub struct AdmittanceController {
    name: String,
    ports: PortSet,
    /// Per-axis admittance gain, length 6.
    kp: [f64; 6],
    offsets: Vec<f64>,
    /// Joint offsets are clamped to this magnitude.
    offset_limit: f64,
    /// Joints in the first half track the right foot, the rest the left.
    split: usize,
    dt: f64,
    state: Lifecycle,
}

impl AdmittanceController {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ports: PortSet::new(name),
            kp: [0.0; 6],
            offsets: Vec::new(),
            offset_limit: 0.1,
            split: 0,
            dt: 0.0,
            state: Lifecycle::Unconfigured,
        }
    }

    /// Per-axis admittance gains.
    pub fn set_kp(&mut self, kp: [f64; 6]) {
        self.kp = kp;
    }

    /// Maximum joint offset magnitude (rad).
    pub fn set_offset_limit(&mut self, limit: f64) {
        self.offset_limit = limit;
    }
}

impl Node for AdmittanceController {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn initialize(&mut self, ctx: &InitContext) -> Result<(), StriderError> {
        let j = ctx.model.joint_count;
        self.offsets = vec![0.0; j];
        self.split = j / 2;
        self.dt = ctx.dt;
        self.ports.declare_input("encoders", Shape::Vector(j));
        self.ports.declare_input("wrench_right_foot", Shape::Wrench);
        self.ports.declare_input("wrench_left_foot", Shape::Wrench);
        self.ports
            .declare_input("wrench_right_foot_ref", Shape::Wrench);
        self.ports
            .declare_input("wrench_left_foot_ref", Shape::Wrench);
        self.ports.declare_input("controlled_joints", Shape::Vector(j));
        self.ports.declare_output("q_des", Shape::Vector(j));
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
        let right = self.ports.in_wrench("wrench_right_foot");
        let left = self.ports.in_wrench("wrench_left_foot");
        let right_ref = self.ports.in_wrench("wrench_right_foot_ref");
        let left_ref = self.ports.in_wrench("wrench_left_foot_ref");
        let drive = |meas: [f64; 6], reference: [f64; 6], kp: &[f64; 6]| -> f64 {
            reference
                .iter()
                .zip(meas)
                .zip(kp)
                .map(|((r, m), k)| k * (r - m))
                .sum()
        };
        let right_drive = drive(right, right_ref, &self.kp);
        let left_drive = drive(left, left_ref, &self.kp);

        let encoders = self.ports.in_vec("encoders").to_vec();
        let mask = self.ports.in_vec("controlled_joints").to_vec();
        let mut q_des = vec![0.0; self.offsets.len()];
        for (i, q) in q_des.iter_mut().enumerate() {
            let selected = mask.get(i).copied().unwrap_or(0.0) != 0.0;
            if selected {
                let d = if i < self.split { right_drive } else { left_drive };
                self.offsets[i] = (self.offsets[i] + d * self.dt)
                    .clamp(-self.offset_limit, self.offset_limit);
            }
            *q = encoders.get(i).copied().unwrap_or(0.0) + self.offsets[i];
        }
        self.ports.set_output("q_des", Value::Vector(q_des))
    }
}
