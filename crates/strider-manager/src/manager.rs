//! [`ControlManager`] – the per-cycle safety arbitration state machine.
//!
//! The manager owns the joint limit tables, the name ↔ id mappings, the
//! per-joint control-mode selection, and the urdf → control ordering
//! permutation. Once Running it converts, every cycle, the active mode's
//! command for each joint into a bounded actuator command:
//!
//! 1. read the active mode's command vector (urdf ordering);
//! 2. on a missing value, hold the last safe command (fail-static, never
//!    fail-zero) and escalate once after a bounded number of stale cycles;
//! 3. saturating clamp against the joint's limit entry and the global
//!    current bound;
//! 4. add dead-zone compensation scaled by the windowed velocity sign;
//! 5. emit into the safe-command vector in control ordering.
//!
//! Mode switches staged via [`ControlManager::set_ctrl_mode`] take effect at
//! the top of the next cycle, never mid-cycle.

use std::collections::HashMap;

use strider_types::{ArbitrationEvent, Lifecycle, ModelDescriptor, StriderError};
use tracing::{debug, info, warn};

use crate::limits::{ForceLimits, JointLimitEntry};
use crate::name_map::NameMap;
use crate::sign_filter::SignFilter;

/// Handle to a registered control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeId(pub usize);

struct ModeSlot {
    name: String,
    /// Latest command vector fed for this mode, urdf ordering, length J.
    command: Vec<f64>,
    /// Whether `command` was fed this cycle.
    fresh: bool,
}

/// Safety arbitration state machine. See the module docs for the per-cycle
/// contract.
pub struct ControlManager {
    state: Lifecycle,
    halted: bool,
    dt: f64,
    joint_count: usize,
    current_to_ctrl_gain: f64,
    default_max_current: f64,

    joints: NameMap,
    force_sensors: NameMap,
    foot_frames: HashMap<String, String>,
    right_foot_sole_xyz: [f64; 3],

    limits: Vec<Option<JointLimitEntry>>,
    force_limits: HashMap<usize, ForceLimits>,
    urdf_to_ctrl: Vec<usize>,

    dead_zone_offsets: Vec<f64>,
    dead_zone_pct: Vec<f64>,
    sign_filters: Vec<SignFilter>,

    modes: Vec<ModeSlot>,
    active_mode: Vec<Option<usize>>,
    staged_mode: Vec<Option<usize>>,

    last_safe: Vec<f64>,
    safe_command: Vec<f64>,
    stale: Vec<u32>,
    stale_limit: u32,
    degraded_notified: Vec<bool>,

    events: Vec<ArbitrationEvent>,
}

impl ControlManager {
    /// Create an unconfigured manager. Call [`ControlManager::init`] before
    /// any registration method.
    pub fn new() -> Self {
        Self {
            state: Lifecycle::Unconfigured,
            halted: false,
            dt: 0.0,
            joint_count: 0,
            current_to_ctrl_gain: 1.0,
            default_max_current: 0.0,
            joints: NameMap::new(),
            force_sensors: NameMap::new(),
            foot_frames: HashMap::new(),
            right_foot_sole_xyz: [0.0; 3],
            limits: Vec::new(),
            force_limits: HashMap::new(),
            urdf_to_ctrl: Vec::new(),
            dead_zone_offsets: Vec::new(),
            dead_zone_pct: Vec::new(),
            sign_filters: Vec::new(),
            modes: Vec::new(),
            active_mode: Vec::new(),
            staged_mode: Vec::new(),
            last_safe: Vec::new(),
            safe_command: Vec::new(),
            stale: Vec::new(),
            stale_limit: 10,
            degraded_notified: Vec::new(),
            events: Vec::new(),
        }
    }

    // ────────────────────────────────────────────────────────────────────
    // Unconfigured → Initialized
    // ────────────────────────────────────────────────────────────────────

    /// Supply the timestep, model descriptor, current-to-control gain and
    /// global maximum current, all exactly once. Internal per-joint state
    /// vectors are sized from the model's joint count here; calling any
    /// registration method before this is a contract violation.
    ///
    /// # Errors
    ///
    /// `StriderError::Config` on re-initialization or invalid parameters.
    pub fn init(
        &mut self,
        dt: f64,
        model: &ModelDescriptor,
        current_to_ctrl_gain: f64,
        max_current: f64,
    ) -> Result<(), StriderError> {
        if self.state != Lifecycle::Unconfigured {
            return Err(StriderError::Config(
                "control manager is already initialized".to_string(),
            ));
        }
        if dt <= 0.0 {
            return Err(StriderError::Config(format!(
                "control period must be positive, got {dt}"
            )));
        }
        if model.joint_count == 0 {
            return Err(StriderError::Config(
                "model declares zero joints".to_string(),
            ));
        }
        if max_current <= 0.0 {
            return Err(StriderError::Config(format!(
                "global maximum current must be positive, got {max_current}"
            )));
        }
        let j = model.joint_count;
        self.dt = dt;
        self.joint_count = j;
        self.current_to_ctrl_gain = current_to_ctrl_gain;
        self.default_max_current = max_current;
        self.limits = vec![None; j];
        self.urdf_to_ctrl = (0..j).collect();
        self.dead_zone_offsets = vec![0.0; j];
        self.dead_zone_pct = vec![0.0; j];
        self.sign_filters = vec![SignFilter::new(1); j];
        self.active_mode = vec![None; j];
        self.staged_mode = vec![None; j];
        self.last_safe = vec![0.0; j];
        self.safe_command = vec![0.0; j];
        self.stale = vec![0; j];
        self.degraded_notified = vec![false; j];
        info!(robot = %model.name, joints = j, dt, "control manager initialized");
        self.state = Lifecycle::Initialized;
        Ok(())
    }

    fn require_initialized(&self, what: &str) -> Result<(), StriderError> {
        if self.state == Lifecycle::Unconfigured {
            return Err(StriderError::Config(format!(
                "{what} called before control manager init"
            )));
        }
        Ok(())
    }

    fn require_configurable(&self, what: &str) -> Result<(), StriderError> {
        self.require_initialized(what)?;
        if self.state == Lifecycle::Running {
            return Err(StriderError::Config(format!(
                "{what}: limit tables are immutable once running"
            )));
        }
        Ok(())
    }

    fn check_joint_id(&self, id: usize) -> Result<(), StriderError> {
        if id >= self.joint_count {
            return Err(StriderError::Lookup(format!(
                "joint id {id} out of range (J = {})",
                self.joint_count
            )));
        }
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────
    // Registration (Initialized only)
    // ────────────────────────────────────────────────────────────────────

    /// Register a joint name ↔ id pair. Idempotent for identical pairs;
    /// conflicts are rejected without mutating the table.
    pub fn set_name_to_id(&mut self, name: &str, id: usize) -> Result<(), StriderError> {
        self.require_configurable("set_name_to_id")?;
        self.check_joint_id(id)?;
        self.joints.insert(name, id)
    }

    /// Register position limits for a joint id. The remaining bounds of the
    /// entry default to the global tables until overridden.
    pub fn set_joint_limits_from_id(
        &mut self,
        id: usize,
        pos_min: f64,
        pos_max: f64,
    ) -> Result<(), StriderError> {
        self.require_configurable("set_joint_limits_from_id")?;
        self.check_joint_id(id)?;
        if pos_min > pos_max {
            return Err(StriderError::Config(format!(
                "joint {id}: position limits inverted ({pos_min} > {pos_max})"
            )));
        }
        let entry = self.limits[id].get_or_insert(JointLimitEntry {
            pos_min,
            pos_max,
            tau_max: f64::INFINITY,
            current_max: self.default_max_current,
        });
        entry.pos_min = pos_min;
        entry.pos_max = pos_max;
        Ok(())
    }

    /// Register the symmetric torque bound for a joint id.
    pub fn set_max_tau_from_id(&mut self, id: usize, tau_max: f64) -> Result<(), StriderError> {
        self.require_configurable("set_max_tau_from_id")?;
        self.check_joint_id(id)?;
        let default_current = self.default_max_current;
        let entry = self.limits[id].get_or_insert(JointLimitEntry {
            pos_min: f64::NEG_INFINITY,
            pos_max: f64::INFINITY,
            tau_max,
            current_max: default_current,
        });
        entry.tau_max = tau_max;
        Ok(())
    }

    /// Register the per-joint current bound for a joint id.
    pub fn set_max_current_from_id(
        &mut self,
        id: usize,
        current_max: f64,
    ) -> Result<(), StriderError> {
        self.require_configurable("set_max_current_from_id")?;
        self.check_joint_id(id)?;
        let entry = self.limits[id].get_or_insert(JointLimitEntry {
            pos_min: f64::NEG_INFINITY,
            pos_max: f64::INFINITY,
            tau_max: f64::INFINITY,
            current_max,
        });
        entry.current_max = current_max;
        Ok(())
    }

    /// Register a force sensor name ↔ id pair.
    pub fn set_force_name_to_id(&mut self, name: &str, id: usize) -> Result<(), StriderError> {
        self.require_configurable("set_force_name_to_id")?;
        self.force_sensors.insert(name, id)
    }

    /// Register the admissible wrench range for a force sensor id.
    pub fn set_force_limits_from_id(
        &mut self,
        id: usize,
        min: [f64; 6],
        max: [f64; 6],
    ) -> Result<(), StriderError> {
        self.require_configurable("set_force_limits_from_id")?;
        self.force_limits.insert(id, ForceLimits { min, max });
        Ok(())
    }

    /// Name the kinematic frame of a foot ("left"/"right" → frame name).
    pub fn set_foot_frame_name(&mut self, foot: &str, frame: &str) -> Result<(), StriderError> {
        self.require_configurable("set_foot_frame_name")?;
        self.foot_frames.insert(foot.to_string(), frame.to_string());
        Ok(())
    }

    /// Offset of the right foot force sensor from the sole center.
    pub fn set_right_foot_sole_xyz(&mut self, xyz: [f64; 3]) -> Result<(), StriderError> {
        self.require_configurable("set_right_foot_sole_xyz")?;
        self.right_foot_sole_xyz = xyz;
        Ok(())
    }

    /// Install the urdf → control ordering permutation.
    ///
    /// Upstream solvers index joints in urdf order; the actuator bus uses
    /// the internal control order. Neither side knows about the other's
    /// convention; this table reconciles them once at configuration time.
    ///
    /// # Errors
    ///
    /// `StriderError::Config` unless `perm` is a permutation of `0..J`.
    pub fn set_joints_urdf_to_ctrl(&mut self, perm: &[usize]) -> Result<(), StriderError> {
        self.require_configurable("set_joints_urdf_to_ctrl")?;
        if perm.len() != self.joint_count {
            return Err(StriderError::Config(format!(
                "permutation length {} does not match J = {}",
                perm.len(),
                self.joint_count
            )));
        }
        let mut seen = vec![false; self.joint_count];
        for &target in perm {
            if target >= self.joint_count || seen[target] {
                return Err(StriderError::Config(format!(
                    "urdf-to-control table is not a permutation of 0..{}",
                    self.joint_count
                )));
            }
            seen[target] = true;
        }
        self.urdf_to_ctrl = perm.to_vec();
        Ok(())
    }

    /// Per-joint driver dead-zone offsets (urdf ordering, length J).
    pub fn set_dead_zone_offsets(&mut self, offsets: &[f64]) -> Result<(), StriderError> {
        self.require_configurable("set_dead_zone_offsets")?;
        self.check_per_joint_len("dead-zone offsets", offsets)?;
        self.dead_zone_offsets = offsets.to_vec();
        Ok(())
    }

    /// Per-joint dead-zone compensation percentage in `[0, 1]`.
    pub fn set_dead_zone_compensation(&mut self, pct: &[f64]) -> Result<(), StriderError> {
        self.require_configurable("set_dead_zone_compensation")?;
        self.check_per_joint_len("dead-zone percentages", pct)?;
        self.dead_zone_pct = pct.to_vec();
        Ok(())
    }

    /// Window size of the velocity-sign filter, identical for all joints.
    pub fn set_sign_window_size(&mut self, size: usize) -> Result<(), StriderError> {
        self.require_configurable("set_sign_window_size")?;
        self.sign_filters = vec![SignFilter::new(size); self.joint_count];
        Ok(())
    }

    /// Consecutive stale cycles after which a sustained missing source is
    /// escalated to a degraded-mode notification.
    pub fn set_stale_limit(&mut self, cycles: u32) -> Result<(), StriderError> {
        self.require_configurable("set_stale_limit")?;
        if cycles == 0 {
            return Err(StriderError::Config(
                "stale limit must be at least one cycle".to_string(),
            ));
        }
        self.stale_limit = cycles;
        Ok(())
    }

    fn check_per_joint_len(&self, what: &str, values: &[f64]) -> Result<(), StriderError> {
        if values.len() != self.joint_count {
            return Err(StriderError::Config(format!(
                "{what}: expected {} entries, got {}",
                self.joint_count,
                values.len()
            )));
        }
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────
    // Control modes
    // ────────────────────────────────────────────────────────────────────

    /// Register a control mode. The mode set is open: new modes may be
    /// added at any time after init, including while Running. Idempotent:
    /// re-adding an existing name returns its id.
    pub fn add_ctrl_mode(&mut self, name: &str) -> Result<ModeId, StriderError> {
        self.require_initialized("add_ctrl_mode")?;
        if let Some(id) = self.mode_id(name) {
            return Ok(id);
        }
        self.modes.push(ModeSlot {
            name: name.to_string(),
            command: vec![0.0; self.joint_count],
            fresh: false,
        });
        debug!(mode = name, "control mode registered");
        Ok(ModeId(self.modes.len() - 1))
    }

    /// Id of a registered mode.
    pub fn mode_id(&self, name: &str) -> Option<ModeId> {
        self.modes
            .iter()
            .position(|m| m.name == name)
            .map(ModeId)
    }

    /// Names of all registered modes, in registration order.
    pub fn mode_names(&self) -> Vec<&str> {
        self.modes.iter().map(|m| m.name.as_str()).collect()
    }

    /// Select which mode commands a joint. `selector` is a joint name or
    /// the wildcard `"all"`. Before Running the switch applies immediately;
    /// while Running it is staged and takes effect at the top of the next
    /// cycle, never mid-cycle.
    ///
    /// # Errors
    ///
    /// `StriderError::Config` for an unknown mode name and
    /// `StriderError::Lookup` for an unknown joint name; neither mutates
    /// any state.
    pub fn set_ctrl_mode(&mut self, selector: &str, mode: &str) -> Result<(), StriderError> {
        self.require_initialized("set_ctrl_mode")?;
        let Some(ModeId(mode_idx)) = self.mode_id(mode) else {
            return Err(StriderError::Config(format!(
                "unknown control mode '{mode}'"
            )));
        };
        let targets: Vec<usize> = if selector == "all" {
            (0..self.joint_count).collect()
        } else {
            let Some(id) = self.joints.id_of(selector) else {
                return Err(StriderError::Lookup(format!(
                    "unknown joint '{selector}'"
                )));
            };
            vec![id]
        };
        for id in targets {
            if self.state == Lifecycle::Running {
                self.staged_mode[id] = Some(mode_idx);
            } else {
                self.active_mode[id] = Some(mode_idx);
            }
        }
        Ok(())
    }

    /// Active mode name for a joint id (this cycle's authority).
    pub fn active_mode_of(&self, id: usize) -> Option<&str> {
        let mode_idx = (*self.active_mode.get(id)?)?;
        Some(self.modes[mode_idx].name.as_str())
    }

    /// 1.0/0.0 mask (urdf ordering) of the joints currently commanded by
    /// `mode`. Upstream controllers consume this to know which joints they
    /// own this cycle.
    pub fn mode_mask(&self, mode: &str) -> Option<Vec<f64>> {
        let ModeId(mode_idx) = self.mode_id(mode)?;
        Some(
            self.active_mode
                .iter()
                .map(|m| if *m == Some(mode_idx) { 1.0 } else { 0.0 })
                .collect(),
        )
    }

    // ────────────────────────────────────────────────────────────────────
    // Initialized → Running
    // ────────────────────────────────────────────────────────────────────

    /// Verify the minimum registration set and enter Running: every joint
    /// needs a name ↔ id mapping, a position-limit entry, and an active
    /// control mode.
    ///
    /// # Errors
    ///
    /// `StriderError::Config` naming the first missing piece.
    pub fn try_start(&mut self) -> Result<(), StriderError> {
        match self.state {
            Lifecycle::Unconfigured => {
                return Err(StriderError::Config(
                    "cannot start an uninitialized control manager".to_string(),
                ));
            }
            Lifecycle::Running => return Ok(()),
            Lifecycle::Initialized => {}
        }
        if !self.joints.covers(self.joint_count) {
            return Err(StriderError::Config(format!(
                "name map incomplete: {} of {} joints registered",
                self.joints.len(),
                self.joint_count
            )));
        }
        for id in 0..self.joint_count {
            if self.limits[id].is_none() {
                return Err(StriderError::Config(format!(
                    "joint {id} has no limit entry"
                )));
            }
            if self.active_mode[id].is_none() {
                return Err(StriderError::Config(format!(
                    "joint {id} has no control mode assigned"
                )));
            }
        }
        info!(joints = self.joint_count, modes = self.modes.len(), "control manager running");
        self.state = Lifecycle::Running;
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Number of actuated joints (`J`), zero before init.
    pub fn joint_count(&self) -> usize {
        self.joint_count
    }

    // ────────────────────────────────────────────────────────────────────
    // Per-cycle operation (Running)
    // ────────────────────────────────────────────────────────────────────

    /// Feed this cycle's command vector for `mode` (urdf ordering, length
    /// J). Joints not currently assigned to the mode are ignored during
    /// arbitration.
    pub fn feed_mode_command(&mut self, mode: ModeId, values: &[f64]) -> Result<(), StriderError> {
        self.require_initialized("feed_mode_command")?;
        self.check_per_joint_len("mode command", values)?;
        let Some(slot) = self.modes.get_mut(mode.0) else {
            return Err(StriderError::Lookup(format!(
                "mode id {} is not registered",
                mode.0
            )));
        };
        slot.command.copy_from_slice(values);
        slot.fresh = true;
        Ok(())
    }

    /// Run one arbitration pass over all joints. `dq` is the filtered
    /// joint-velocity vector (urdf ordering) used by dead-zone
    /// compensation. Returns the safe command vector in control ordering.
    ///
    /// After [`ControlManager::stop`] the held vector is returned untouched
    /// (fail-static).
    ///
    /// # Errors
    ///
    /// `StriderError::Config` unless Running; `StriderError::Config` when
    /// `dq` has the wrong length.
    pub fn update(&mut self, dq: &[f64]) -> Result<&[f64], StriderError> {
        if self.state != Lifecycle::Running {
            return Err(StriderError::Config(
                "control manager update before running".to_string(),
            ));
        }
        if self.halted {
            return Ok(&self.safe_command);
        }
        self.check_per_joint_len("joint velocities", dq)?;

        // Mode switches apply here, at the top of the cycle, so no joint
        // ever reads a half-updated command vector.
        for id in 0..self.joint_count {
            if let Some(staged) = self.staged_mode[id].take() {
                if self.active_mode[id] != Some(staged) {
                    self.active_mode[id] = Some(staged);
                    self.sign_filters[id].reset();
                }
            }
        }

        for id in 0..self.joint_count {
            // try_start() guarantees both are present while Running.
            let Some(mode_idx) = self.active_mode[id] else { continue };
            let Some(entry) = self.limits[id] else { continue };
            let slot = &self.modes[mode_idx];

            let command = if slot.fresh {
                if self.stale[id] > 0 {
                    debug!(joint = id, mode = %slot.name, "command source recovered");
                }
                self.stale[id] = 0;
                self.degraded_notified[id] = false;

                let requested = slot.command[id];
                let clamped = entry.clamp(
                    requested,
                    self.default_max_current,
                    self.current_to_ctrl_gain,
                );
                if clamped != requested {
                    self.events.push(ArbitrationEvent::Saturation {
                        joint_id: id,
                        requested,
                        emitted: clamped,
                    });
                    debug!(joint = id, requested, emitted = clamped, "command saturated");
                }
                let sign = self.sign_filters[id].push(dq[id]);
                clamped + self.dead_zone_offsets[id] * self.dead_zone_pct[id] * sign
            } else {
                // Fail-static: hold the last safe command. A zero torque on
                // a loaded leg joint is more dangerous than one more cycle
                // of the last known-safe value.
                self.stale[id] += 1;
                if self.stale[id] >= self.stale_limit && !self.degraded_notified[id] {
                    self.degraded_notified[id] = true;
                    let event = ArbitrationEvent::SourceDegraded {
                        joint_id: id,
                        mode: slot.name.clone(),
                        held_cycles: self.stale[id],
                    };
                    warn!(
                        joint = id,
                        mode = %slot.name,
                        held_cycles = self.stale[id],
                        "sustained missing command source, holding last safe command"
                    );
                    self.events.push(event);
                }
                self.last_safe[id]
            };

            self.last_safe[id] = command;
            self.safe_command[self.urdf_to_ctrl[id]] = command;
        }

        // Commands are consumed; next cycle needs fresh feeds.
        for slot in &mut self.modes {
            slot.fresh = false;
        }
        Ok(&self.safe_command)
    }

    /// Freeze the manager in its last Running state: subsequent `update`
    /// calls return the held safe-command vector without processing.
    pub fn stop(&mut self) {
        if self.state == Lifecycle::Running && !self.halted {
            warn!("control manager stopped, holding last safe command");
            self.halted = true;
        }
    }

    /// Whether the manager has been stopped.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// The most recent safe command vector (control ordering).
    pub fn safe_command(&self) -> &[f64] {
        &self.safe_command
    }

    /// Take all arbitration events recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<ArbitrationEvent> {
        std::mem::take(&mut self.events)
    }
}

impl Default for ControlManager {
    fn default() -> Self {
        Self::new()
    }
}
