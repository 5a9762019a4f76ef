//! Robot configuration loaded from a TOML file.
//!
//! One [`RobotConfig`] describes everything the topology assembler needs:
//! the model, the per-joint safety tables, force sensors, foot geometry,
//! balance and torque-loop gains, and the control-manager parameters.
//! Loading is strict: the file is parsed once before assembly and
//! [`RobotConfig::validate`] rejects any table whose sizing or ordering
//! does not match the declared joint count.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strider_types::{ModelDescriptor, StriderError};

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Control period in seconds.
    #[serde(default = "default_dt")]
    pub dt: f64,
    pub model: ModelConfig,
    #[serde(default)]
    pub joints: Vec<JointConfig>,
    /// urdf ordering → control ordering; identity when omitted.
    #[serde(default)]
    pub urdf_to_ctrl: Vec<usize>,
    #[serde(default)]
    pub force_sensors: Vec<ForceSensorConfig>,
    #[serde(default)]
    pub feet: FeetConfig,
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub balance: BalanceConfig,
    #[serde(default)]
    pub torque_loop: TorqueLoopConfig,
    #[serde(default)]
    pub position_loop: PositionLoopConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub joint_count: usize,
    #[serde(default)]
    pub urdf_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointConfig {
    pub name: String,
    pub id: usize,
    pub pos_min: f64,
    pub pos_max: f64,
    #[serde(default = "default_tau_max")]
    pub tau_max: f64,
    /// Per-joint current bound; the manager's global bound applies when
    /// omitted.
    #[serde(default)]
    pub current_max: Option<f64>,
    #[serde(default)]
    pub dead_zone_offset: f64,
    /// Fraction of the dead-zone offset injected as compensation, in [0, 1].
    #[serde(default)]
    pub dead_zone_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceSensorConfig {
    pub name: String,
    pub id: usize,
    pub min: [f64; 6],
    pub max: [f64; 6],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeetConfig {
    #[serde(default = "default_right_frame")]
    pub right_frame: String,
    #[serde(default = "default_left_frame")]
    pub left_frame: String,
    /// Right foot force sensor offset from the sole center.
    #[serde(default)]
    pub right_sole_xyz: [f64; 3],
}

impl Default for FeetConfig {
    fn default() -> Self {
        Self {
            right_frame: default_right_frame(),
            left_frame: default_left_frame(),
            right_sole_xyz: [0.0; 3],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default = "default_gain")]
    pub current_to_ctrl_gain: f64,
    #[serde(default = "default_max_current")]
    pub max_current: f64,
    #[serde(default = "default_sign_window")]
    pub sign_window_size: usize,
    /// Consecutive stale cycles before a degraded-source notification.
    #[serde(default = "default_stale_limit")]
    pub stale_limit: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            current_to_ctrl_gain: default_gain(),
            max_current: default_max_current(),
            sign_window_size: default_sign_window(),
            stale_limit: default_stale_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceConfig {
    #[serde(default = "default_kp_com")]
    pub kp_com: Vec<f64>,
    #[serde(default = "default_kd_com")]
    pub kd_com: Vec<f64>,
    #[serde(default = "default_kp_task6")]
    pub kp_feet: Vec<f64>,
    #[serde(default = "default_kd_task6")]
    pub kd_feet: Vec<f64>,
    #[serde(default = "default_kp_task6")]
    pub kp_constraints: Vec<f64>,
    #[serde(default = "default_kd_task6")]
    pub kd_constraints: Vec<f64>,
    /// Per-joint posture gains; broadcast from a single entry when the
    /// table has length 1.
    #[serde(default = "default_kp_posture")]
    pub kp_posture: Vec<f64>,
    #[serde(default = "default_kd_posture")]
    pub kd_posture: Vec<f64>,
    #[serde(default = "default_w_com")]
    pub w_com: f64,
    #[serde(default = "default_w_feet")]
    pub w_feet: f64,
    #[serde(default = "default_w_forces")]
    pub w_forces: f64,
    #[serde(default = "default_w_posture")]
    pub w_posture: f64,
    #[serde(default = "default_mu")]
    pub mu: f64,
    #[serde(default = "default_f_min")]
    pub f_min: f64,
    #[serde(default = "default_f_max")]
    pub f_max: f64,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            kp_com: default_kp_com(),
            kd_com: default_kd_com(),
            kp_feet: default_kp_task6(),
            kd_feet: default_kd_task6(),
            kp_constraints: default_kp_task6(),
            kd_constraints: default_kd_task6(),
            kp_posture: default_kp_posture(),
            kd_posture: default_kd_posture(),
            w_com: default_w_com(),
            w_feet: default_w_feet(),
            w_forces: default_w_forces(),
            w_posture: default_w_posture(),
            mu: default_mu(),
            f_min: default_f_min(),
            f_max: default_f_max(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TorqueLoopConfig {
    /// Motor torque-to-current constants (length J, or empty for unity).
    #[serde(default)]
    pub torque_to_current: Vec<f64>,
    #[serde(default)]
    pub kp_torque: Vec<f64>,
    #[serde(default)]
    pub current_max: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLoopConfig {
    #[serde(default)]
    pub kp: Vec<f64>,
    #[serde(default)]
    pub ki: Vec<f64>,
    #[serde(default)]
    pub kd: Vec<f64>,
    #[serde(default = "default_pwm_limit")]
    pub output_limit: f64,
}

impl Default for PositionLoopConfig {
    fn default() -> Self {
        Self {
            kp: Vec::new(),
            ki: Vec::new(),
            kd: Vec::new(),
            output_limit: default_pwm_limit(),
        }
    }
}

fn default_dt() -> f64 {
    0.001
}
fn default_tau_max() -> f64 {
    f64::INFINITY
}
fn default_right_frame() -> String {
    "RLEG_JOINT5".to_string()
}
fn default_left_frame() -> String {
    "LLEG_JOINT5".to_string()
}
fn default_gain() -> f64 {
    1.0
}
fn default_max_current() -> f64 {
    10.0
}
fn default_sign_window() -> usize {
    40
}
fn default_stale_limit() -> u32 {
    10
}
fn default_kp_com() -> Vec<f64> {
    vec![30.0; 3]
}
fn default_kd_com() -> Vec<f64> {
    vec![11.0; 3]
}
fn default_kp_task6() -> Vec<f64> {
    vec![100.0; 6]
}
fn default_kd_task6() -> Vec<f64> {
    vec![20.0; 6]
}
fn default_kp_posture() -> Vec<f64> {
    vec![10.0]
}
fn default_kd_posture() -> Vec<f64> {
    vec![2.0]
}
fn default_w_com() -> f64 {
    1.0
}
fn default_w_feet() -> f64 {
    1.0
}
fn default_w_forces() -> f64 {
    1e-4
}
fn default_w_posture() -> f64 {
    1e-1
}
fn default_mu() -> f64 {
    0.6
}
fn default_f_min() -> f64 {
    5.0
}
fn default_f_max() -> f64 {
    1000.0
}
fn default_pwm_limit() -> f64 {
    f64::INFINITY
}

impl RobotConfig {
    /// Parse and validate a configuration file.
    ///
    /// # Errors
    ///
    /// `StriderError::Config` on I/O failure, TOML syntax errors, or any
    /// validation failure.
    pub fn load_from(path: &Path) -> Result<Self, StriderError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            StriderError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| StriderError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// The model descriptor the graph initializes nodes against.
    pub fn model_descriptor(&self) -> ModelDescriptor {
        ModelDescriptor {
            name: self.model.name.clone(),
            joint_count: self.model.joint_count,
            urdf_path: self.model.urdf_path.clone(),
        }
    }

    /// A per-joint table broadcast from a single entry, or checked to be
    /// exactly J long.
    pub fn broadcast_table(table: &[f64], j: usize) -> Option<Vec<f64>> {
        match table.len() {
            1 => Some(vec![table[0]; j]),
            n if n == j => Some(table.to_vec()),
            _ => None,
        }
    }

    /// Check sizing and ordering constraints.
    ///
    /// # Errors
    ///
    /// `StriderError::Config` naming the offending table.
    pub fn validate(&self) -> Result<(), StriderError> {
        let j = self.model.joint_count;
        if self.dt <= 0.0 {
            return Err(StriderError::Config(format!(
                "dt must be positive, got {}",
                self.dt
            )));
        }
        if j == 0 {
            return Err(StriderError::Config(
                "model.joint_count must be at least 1".to_string(),
            ));
        }
        for joint in &self.joints {
            if joint.id >= j {
                return Err(StriderError::Config(format!(
                    "joint {}: id {} out of range for {} joints",
                    joint.name, joint.id, j
                )));
            }
            if joint.pos_min > joint.pos_max {
                return Err(StriderError::Config(format!(
                    "joint {}: position limits inverted",
                    joint.name
                )));
            }
            if !(0.0..=1.0).contains(&joint.dead_zone_pct) {
                return Err(StriderError::Config(format!(
                    "joint {}: dead_zone_pct must be in [0, 1]",
                    joint.name
                )));
            }
        }
        if !self.urdf_to_ctrl.is_empty() {
            if self.urdf_to_ctrl.len() != j {
                return Err(StriderError::Config(format!(
                    "urdf_to_ctrl has {} entries for {} joints",
                    self.urdf_to_ctrl.len(),
                    j
                )));
            }
            let mut seen = vec![false; j];
            for &target in &self.urdf_to_ctrl {
                if target >= j || seen[target] {
                    return Err(StriderError::Config(
                        "urdf_to_ctrl is not a permutation".to_string(),
                    ));
                }
                seen[target] = true;
            }
        }
        for sensor in &self.force_sensors {
            for axis in 0..6 {
                if sensor.min[axis] > sensor.max[axis] {
                    return Err(StriderError::Config(format!(
                        "force sensor {}: limits inverted on axis {axis}",
                        sensor.name
                    )));
                }
            }
        }
        if self.manager.max_current <= 0.0 {
            return Err(StriderError::Config(
                "manager.max_current must be positive".to_string(),
            ));
        }
        if self.manager.stale_limit == 0 {
            return Err(StriderError::Config(
                "manager.stale_limit must be at least 1".to_string(),
            ));
        }
        for (name, table) in [
            ("balance.kp_posture", &self.balance.kp_posture),
            ("balance.kd_posture", &self.balance.kd_posture),
        ] {
            if Self::broadcast_table(table, j).is_none() {
                return Err(StriderError::Config(format!(
                    "{name}: expected 1 or {j} entries, got {}",
                    table.len()
                )));
            }
        }
        for (name, table) in [
            ("torque_loop.torque_to_current", &self.torque_loop.torque_to_current),
            ("torque_loop.kp_torque", &self.torque_loop.kp_torque),
            ("torque_loop.current_max", &self.torque_loop.current_max),
            ("position_loop.kp", &self.position_loop.kp),
            ("position_loop.ki", &self.position_loop.ki),
            ("position_loop.kd", &self.position_loop.kd),
        ] {
            if !table.is_empty() && table.len() != j {
                return Err(StriderError::Config(format!(
                    "{name}: expected {j} entries, got {}",
                    table.len()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
dt = 0.005

[model]
name = "hrp2"
joint_count = 2

[[joints]]
name = "j0"
id = 0
pos_min = -1.0
pos_max = 1.0

[[joints]]
name = "j1"
id = 1
pos_min = -2.0
pos_max = 2.0
"#;

    #[test]
    fn minimal_document_parses_with_defaults() {
        let config: RobotConfig = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.dt, 0.005);
        assert_eq!(config.joints.len(), 2);
        assert_eq!(config.manager.stale_limit, 10);
        assert_eq!(config.balance.kp_com, vec![30.0; 3]);
        assert!(config.urdf_to_ctrl.is_empty());
    }

    #[test]
    fn load_from_round_trips_through_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = RobotConfig::load_from(file.path()).unwrap();
        assert_eq!(config.model.name, "hrp2");
        assert_eq!(config.model_descriptor().full_state_len(), 8);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = RobotConfig::load_from(Path::new("/nonexistent/robot.toml")).unwrap_err();
        assert!(matches!(err, StriderError::Config(_)));
    }

    #[test]
    fn bad_permutation_rejected() {
        let mut config: RobotConfig = toml::from_str(MINIMAL).unwrap();
        config.urdf_to_ctrl = vec![0, 0];
        assert!(config.validate().is_err());
        config.urdf_to_ctrl = vec![1, 0];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn joint_table_errors_name_the_joint() {
        let mut config: RobotConfig = toml::from_str(MINIMAL).unwrap();
        config.joints[1].pos_min = 5.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("j1"));
    }

    #[test]
    fn posture_gains_broadcast_from_single_entry() {
        let config: RobotConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(
            RobotConfig::broadcast_table(&config.balance.kp_posture, 2),
            Some(vec![10.0, 10.0])
        );
        assert_eq!(RobotConfig::broadcast_table(&[1.0, 2.0, 3.0], 2), None);
    }

    #[test]
    fn dead_zone_pct_bounds_checked() {
        let mut config: RobotConfig = toml::from_str(MINIMAL).unwrap();
        config.joints[0].dead_zone_pct = 1.5;
        assert!(config.validate().is_err());
    }
}
