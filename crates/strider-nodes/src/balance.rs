//! [`BalanceController`] – whole-body inverse dynamics boundary.
//!
//! The node validates gains, wires the reference and measurement ports
//! and publishes the desired joint torques plus the measured foot poses
//! (consumed by the foot trajectory generators as their starting pose).
//! The actual QP/inverse-dynamics solve is behind [`SolverCore`]; the
//! default core emits a proportional posture hold, enough for the
//! pipeline to run closed-loop in tests and simulation.

use strider_graph::{InitContext, Node, PortSet};
use strider_types::{Lifecycle, Shape, StriderError, Value};

/// Task gains and weights, validated against their task dimensions at
/// initialization: 3 for the CoM, 6 for wrench/pose tasks, J for posture.
#[derive(Debug, Clone, Default)]
pub struct BalanceGains {
    pub kp_com: Vec<f64>,
    pub kd_com: Vec<f64>,
    pub kp_feet: Vec<f64>,
    pub kd_feet: Vec<f64>,
    pub kp_constraints: Vec<f64>,
    pub kd_constraints: Vec<f64>,
    pub kp_posture: Vec<f64>,
    pub kd_posture: Vec<f64>,
    pub w_com: f64,
    pub w_feet: f64,
    pub w_forces: f64,
    pub w_posture: f64,
    /// Friction coefficient of the contact model.
    pub mu: f64,
    /// Admissible normal force range per contact.
    pub f_min: f64,
    pub f_max: f64,
}

impl BalanceGains {
    fn validate(&self, joints: usize) -> Result<(), StriderError> {
        let checks: [(&str, usize, usize); 8] = [
            ("kp_com", self.kp_com.len(), 3),
            ("kd_com", self.kd_com.len(), 3),
            ("kp_feet", self.kp_feet.len(), 6),
            ("kd_feet", self.kd_feet.len(), 6),
            ("kp_constraints", self.kp_constraints.len(), 6),
            ("kd_constraints", self.kd_constraints.len(), 6),
            ("kp_posture", self.kp_posture.len(), joints),
            ("kd_posture", self.kd_posture.len(), joints),
        ];
        for (name, got, want) in checks {
            if got != want {
                return Err(StriderError::Config(format!(
                    "balance gain {name}: expected {want} entries, got {got}"
                )));
            }
        }
        Ok(())
    }
}

/// What the solver sees each cycle.
pub struct SolveInputs<'a> {
    pub q: &'a [f64],
    pub v: &'a [f64],
    pub com_ref: &'a [f64],
    pub posture_ref: &'a [f64],
    pub wrench_right_foot: [f64; 6],
    pub wrench_left_foot: [f64; 6],
    pub gains: &'a BalanceGains,
}

/// Per-cycle solver result.
pub struct SolveOutputs {
    pub tau_des: Vec<f64>,
    pub right_foot_pos: [f64; 6],
    pub left_foot_pos: [f64; 6],
}

pub trait SolverCore: Send {
    fn solve(&mut self, dt: f64, inputs: &SolveInputs<'_>) -> SolveOutputs;
}

/// Default core: proportional posture hold against the reference, feet
/// reported at the origin. Stands in for the inverse-dynamics solver.
#[derive(Default)]
pub struct PostureHoldCore;

impl SolverCore for PostureHoldCore {
    fn solve(&mut self, _dt: f64, inputs: &SolveInputs<'_>) -> SolveOutputs {
        let joints = inputs.gains.kp_posture.len();
        // q is base-augmented; the joint block starts at 6.
        let mut tau = vec![0.0; joints];
        for i in 0..joints {
            let q_i = inputs.q.get(i + 6).copied().unwrap_or(0.0);
            let v_i = inputs.v.get(i + 6).copied().unwrap_or(0.0);
            let q_ref = inputs.posture_ref.get(i).copied().unwrap_or(0.0);
            tau[i] = inputs.gains.kp_posture[i] * (q_ref - q_i) - inputs.gains.kd_posture[i] * v_i;
        }
        SolveOutputs {
            tau_des: tau,
            right_foot_pos: [0.0; 6],
            left_foot_pos: [0.0; 6],
        }
    }
}

pub struct BalanceController {
    name: String,
    ports: PortSet,
    core: Box<dyn SolverCore>,
    gains: BalanceGains,
    dt: f64,
    state: Lifecycle,
}

impl BalanceController {
    pub fn new(name: &str, gains: BalanceGains) -> Self {
        Self::with_core(name, gains, Box::new(PostureHoldCore))
    }

    pub fn with_core(name: &str, gains: BalanceGains, core: Box<dyn SolverCore>) -> Self {
        Self {
            name: name.to_string(),
            ports: PortSet::new(name),
            core,
            gains,
            dt: 0.0,
            state: Lifecycle::Unconfigured,
        }
    }
}

impl Node for BalanceController {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn initialize(&mut self, ctx: &InitContext) -> Result<(), StriderError> {
        let j = ctx.model.joint_count;
        self.gains.validate(j)?;
        self.dt = ctx.dt;
        self.ports.declare_input("q", Shape::Vector(j + 6));
        self.ports.declare_input("v", Shape::Vector(j + 6));
        self.ports.declare_input("wrench_right_foot", Shape::Wrench);
        self.ports.declare_input("wrench_left_foot", Shape::Wrench);
        self.ports.declare_input("com_ref_pos", Shape::Vector(3));
        self.ports.declare_input("com_ref_vel", Shape::Vector(3));
        self.ports.declare_input("com_ref_acc", Shape::Vector(3));
        self.ports.declare_input("posture_ref_pos", Shape::Vector(j));
        self.ports.declare_input("posture_ref_vel", Shape::Vector(j));
        self.ports.declare_input("posture_ref_acc", Shape::Vector(j));
        self.ports.declare_output("tau_des", Shape::Vector(j));
        self.ports.declare_output("right_foot_pos", Shape::Vector(6));
        self.ports.declare_output("left_foot_pos", Shape::Vector(6));
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
        let q = self.ports.in_vec("q").to_vec();
        let v = self.ports.in_vec("v").to_vec();
        let com_ref = self.ports.in_vec("com_ref_pos").to_vec();
        let posture_ref = self.ports.in_vec("posture_ref_pos").to_vec();
        let inputs = SolveInputs {
            q: &q,
            v: &v,
            com_ref: &com_ref,
            posture_ref: &posture_ref,
            wrench_right_foot: self.ports.in_wrench("wrench_right_foot"),
            wrench_left_foot: self.ports.in_wrench("wrench_left_foot"),
            gains: &self.gains,
        };
        let out = self.core.solve(self.dt, &inputs);
        self.ports.set_output("tau_des", Value::Vector(out.tau_des))?;
        self.ports.set_output(
            "right_foot_pos",
            Value::Vector(out.right_foot_pos.to_vec()),
        )?;
        self.ports
            .set_output("left_foot_pos", Value::Vector(out.left_foot_pos.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strider_types::ModelDescriptor;

    fn gains(j: usize) -> BalanceGains {
        BalanceGains {
            kp_com: vec![30.0; 3],
            kd_com: vec![11.0; 3],
            kp_feet: vec![100.0; 6],
            kd_feet: vec![20.0; 6],
            kp_constraints: vec![100.0; 6],
            kd_constraints: vec![20.0; 6],
            kp_posture: vec![10.0; j],
            kd_posture: vec![2.0; j],
            w_com: 1.0,
            w_feet: 1.0,
            w_forces: 1e-4,
            w_posture: 1e-1,
            mu: 0.6,
            f_min: 5.0,
            f_max: 1000.0,
        }
    }

    fn ctx(j: usize) -> InitContext {
        InitContext {
            dt: 0.001,
            model: ModelDescriptor {
                name: "sim".to_string(),
                joint_count: j,
                urdf_path: None,
            },
        }
    }

    #[test]
    fn wrong_sized_gains_rejected_at_init() {
        let mut bad = gains(2);
        bad.kp_com = vec![30.0; 2];
        let mut ctrl = BalanceController::new("balance", bad);
        let err = ctrl.initialize(&ctx(2)).unwrap_err();
        assert!(err.to_string().contains("kp_com"));

        let mut bad = gains(2);
        bad.kp_posture = vec![10.0; 5];
        let mut ctrl = BalanceController::new("balance", bad);
        let err = ctrl.initialize(&ctx(2)).unwrap_err();
        assert!(err.to_string().contains("kp_posture"));
    }

    #[test]
    fn posture_hold_core_drives_joints_toward_reference() {
        let mut ctrl = BalanceController::new("balance", gains(2));
        ctrl.initialize(&ctx(2)).unwrap();
        // Joint block of q starts after the 6-dof base.
        ctrl.write_input("q", Value::Vector(vec![0.0; 8])).unwrap();
        ctrl.write_input("v", Value::Vector(vec![0.0; 8])).unwrap();
        ctrl.write_input("posture_ref_pos", Value::Vector(vec![0.5, -0.5]))
            .unwrap();
        ctrl.update(0).unwrap();
        assert_eq!(
            ctrl.read_output("tau_des"),
            Some(Value::Vector(vec![5.0, -5.0]))
        );
    }

    #[test]
    fn foot_poses_published_for_trajectory_backfill() {
        let mut ctrl = BalanceController::new("balance", gains(2));
        ctrl.initialize(&ctx(2)).unwrap();
        ctrl.update(0).unwrap();
        assert!(ctrl.read_output("right_foot_pos").is_some());
        assert!(ctrl.read_output("left_foot_pos").is_some());
    }
}
