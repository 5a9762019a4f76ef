//! [`JointTorqueController`] – inner torque loop, torque error to motor
//! current.

use strider_graph::{InitContext, Node, PortSet};
use strider_types::{Lifecycle, Shape, StriderError, Value};

/// Per-joint proportional torque law.
///
/// `control_current[i] = k_tau[i] * tau_des[i] + kp[i] * (tau_des[i] -
/// tau_meas[i])`, clamped to the per-joint current bound. Velocity,
/// acceleration and measured-current inputs are exposed for friction and
/// back-EMF terms added by richer parameter tables.
pub struct JointTorqueController {
    name: String,
    ports: PortSet,
    torque_to_current: Vec<f64>,
    kp_torque: Vec<f64>,
    current_max: Vec<f64>,
    state: Lifecycle,
}

impl JointTorqueController {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ports: PortSet::new(name),
            torque_to_current: Vec::new(),
            kp_torque: Vec::new(),
            current_max: Vec::new(),
            state: Lifecycle::Unconfigured,
        }
    }

    /// Motor torque-to-current constants, one per joint.
    pub fn set_torque_to_current(&mut self, k: &[f64]) {
        self.torque_to_current = k.to_vec();
    }

    /// Proportional torque-error gains, one per joint.
    pub fn set_kp_torque(&mut self, kp: &[f64]) {
        self.kp_torque = kp.to_vec();
    }

    /// Per-joint current bound (A).
    pub fn set_current_max(&mut self, max: &[f64]) {
        self.current_max = max.to_vec();
    }

    fn check_table(name: &str, table: &[f64], j: usize) -> Result<(), StriderError> {
        if table.len() != j {
            return Err(StriderError::Config(format!(
                "torque controller table {name}: expected {j} entries, got {}",
                table.len()
            )));
        }
        Ok(())
    }
}

impl Node for JointTorqueController {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.state
    }

    fn initialize(&mut self, ctx: &InitContext) -> Result<(), StriderError> {
        let j = ctx.model.joint_count;
        if self.torque_to_current.is_empty() {
            self.torque_to_current = vec![1.0; j];
        }
        if self.kp_torque.is_empty() {
            self.kp_torque = vec![0.0; j];
        }
        if self.current_max.is_empty() {
            self.current_max = vec![f64::INFINITY; j];
        }
        Self::check_table("torque_to_current", &self.torque_to_current, j)?;
        Self::check_table("kp_torque", &self.kp_torque, j)?;
        Self::check_table("current_max", &self.current_max, j)?;
        self.ports.declare_input("tau_des", Shape::Vector(j));
        self.ports.declare_input("joints_velocities", Shape::Vector(j));
        self.ports
            .declare_input("joints_accelerations", Shape::Vector(j));
        self.ports.declare_input("joints_torques", Shape::Vector(j));
        self.ports.declare_input("current_measure", Shape::Vector(j));
        self.ports.declare_output("control_current", Shape::Vector(j));
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
        let tau_des = self.ports.in_vec("tau_des").to_vec();
        let tau_meas = self.ports.in_vec("joints_torques").to_vec();
        let out: Vec<f64> = tau_des
            .iter()
            .enumerate()
            .map(|(i, des)| {
                let meas = tau_meas.get(i).copied().unwrap_or(0.0);
                let raw = self.torque_to_current[i] * des + self.kp_torque[i] * (des - meas);
                raw.clamp(-self.current_max[i], self.current_max[i])
            })
            .collect();
        self.ports.set_output("control_current", Value::Vector(out))
    }
}
