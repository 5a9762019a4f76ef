//! [`PositionController`] – per-joint PID from the posture reference to a
//! PWM-level command.

use strider_graph::{InitContext, Node, PortSet};
use strider_types::{Lifecycle, Shape, StriderError, Value};

/// Vector PID over all actuated joints.
///
/// Error is `q_ref - encoders`; the derivative term uses the measured
/// joint velocity against `dq_ref` rather than differentiating the error,
/// so encoder quantization noise does not enter through the D path. The
/// integral accumulator is clamped to the output range (anti-windup).
pub struct PositionController {
    name: String,
    ports: PortSet,
    kp: Vec<f64>,
    ki: Vec<f64>,
    kd: Vec<f64>,
    integral: Vec<f64>,
    output_limit: f64,
    dt: f64,
    state: Lifecycle,
}

impl PositionController {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ports: PortSet::new(name),
            kp: Vec::new(),
            ki: Vec::new(),
            kd: Vec::new(),
            integral: Vec::new(),
            output_limit: f64::INFINITY,
            dt: 0.0,
            state: Lifecycle::Unconfigured,
        }
    }

    /// Per-joint gain tables, each either empty (zeros) or of length J.
    pub fn set_gains(&mut self, kp: &[f64], ki: &[f64], kd: &[f64]) {
        self.kp = kp.to_vec();
        self.ki = ki.to_vec();
        self.kd = kd.to_vec();
    }

    /// Symmetric output clamp; integral wind-up is bounded by it too.
    pub fn set_output_limit(&mut self, limit: f64) {
        self.output_limit = limit;
    }

    /// Clear the integral accumulators.
    pub fn reset(&mut self) {
        self.integral.fill(0.0);
    }
}

impl Node for PositionController {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn initialize(&mut self, ctx: &InitContext) -> Result<(), StriderError> {
        let j = ctx.model.joint_count;
        for (name, table) in [("kp", &mut self.kp), ("ki", &mut self.ki), ("kd", &mut self.kd)] {
            if table.is_empty() {
                *table = vec![0.0; j];
            } else if table.len() != j {
                return Err(StriderError::Config(format!(
                    "position controller {name}: expected {j} entries, got {}",
                    table.len()
                )));
            }
        }
        self.integral = vec![0.0; j];
        self.dt = ctx.dt;
        self.ports.declare_input("encoders", Shape::Vector(j));
        self.ports.declare_input("joints_velocities", Shape::Vector(j));
        self.ports.declare_input("q_ref", Shape::Vector(j));
        self.ports.declare_input("dq_ref", Shape::Vector(j));
        self.ports.declare_output("pwm_des", Shape::Vector(j));
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
        let q = self.ports.in_vec("encoders").to_vec();
        let dq = self.ports.in_vec("joints_velocities").to_vec();
        let q_ref = self.ports.in_vec("q_ref").to_vec();
        let dq_ref = self.ports.in_vec("dq_ref").to_vec();
        let j = self.integral.len();
        let mut out = vec![0.0; j];
        for i in 0..j {
            let err = q_ref.get(i).copied().unwrap_or(0.0) - q.get(i).copied().unwrap_or(0.0);
            let derr =
                dq_ref.get(i).copied().unwrap_or(0.0) - dq.get(i).copied().unwrap_or(0.0);
            self.integral[i] += err * self.dt;
            if self.ki[i].abs() > f64::EPSILON {
                // Back-calculate so the accumulator never pushes past the clamp.
                let bounded = (self.ki[i] * self.integral[i])
                    .clamp(-self.output_limit, self.output_limit);
                self.integral[i] = bounded / self.ki[i];
            }
            let raw = self.kp[i] * err + self.ki[i] * self.integral[i] + self.kd[i] * derr;
            out[i] = raw.clamp(-self.output_limit, self.output_limit);
        }
        self.ports.set_output("pwm_des", Value::Vector(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strider_types::ModelDescriptor;

    fn ctx(j: usize) -> InitContext {
        InitContext {
            dt: 0.01,
            model: ModelDescriptor {
                name: "sim".to_string(),
                joint_count: j,
                urdf_path: None,
            },
        }
    }

    fn out(ctrl: &PositionController) -> Vec<f64> {
        match ctrl.read_output("pwm_des") {
            Some(Value::Vector(v)) => v,
            other => panic!("pwm_des: {other:?}"),
        }
    }

    #[test]
    fn proportional_term_drives_toward_reference() {
        let mut ctrl = PositionController::new("pos_ctrl");
        ctrl.set_gains(&[10.0, 10.0], &[0.0, 0.0], &[0.0, 0.0]);
        ctrl.initialize(&ctx(2)).unwrap();
        ctrl.write_input("encoders", Value::Vector(vec![0.0, 0.5]))
            .unwrap();
        ctrl.write_input("q_ref", Value::Vector(vec![0.2, 0.5]))
            .unwrap();
        ctrl.update(0).unwrap();
        assert_eq!(out(&ctrl), vec![2.0, 0.0]);
    }

    #[test]
    fn integral_accumulates_and_respects_windup_clamp() {
        let mut ctrl = PositionController::new("pos_ctrl");
        ctrl.set_gains(&[0.0], &[1.0], &[0.0]);
        ctrl.set_output_limit(0.05);
        ctrl.initialize(&ctx(1)).unwrap();
        ctrl.write_input("encoders", Value::Vector(vec![0.0])).unwrap();
        ctrl.write_input("q_ref", Value::Vector(vec![1.0])).unwrap();

        // dt = 0.01, error = 1: integral grows 0.01 per cycle until the
        // clamp pins it at the output limit.
        for cycle in 0..20 {
            ctrl.update(cycle).unwrap();
        }
        assert_eq!(out(&ctrl), vec![0.05]);

        // Reference reached: with a wound-down accumulator the output
        // decays instead of staying pinned.
        ctrl.write_input("encoders", Value::Vector(vec![1.0])).unwrap();
        ctrl.update(20).unwrap();
        assert!(out(&ctrl)[0] <= 0.05);
        ctrl.reset();
        ctrl.update(21).unwrap();
        assert_eq!(out(&ctrl), vec![0.0]);
    }

    #[test]
    fn derivative_uses_velocity_reference() {
        let mut ctrl = PositionController::new("pos_ctrl");
        ctrl.set_gains(&[0.0], &[0.0], &[2.0]);
        ctrl.initialize(&ctx(1)).unwrap();
        ctrl.write_input("joints_velocities", Value::Vector(vec![0.3]))
            .unwrap();
        ctrl.write_input("dq_ref", Value::Vector(vec![0.5])).unwrap();
        ctrl.update(0).unwrap();
        assert!((out(&ctrl)[0] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn wrong_sized_gains_rejected_at_init() {
        let mut ctrl = PositionController::new("pos_ctrl");
        ctrl.set_gains(&[1.0], &[0.0], &[0.0]);
        assert!(matches!(
            ctrl.initialize(&ctx(2)),
            Err(StriderError::Config(_))
        ));
    }
}
