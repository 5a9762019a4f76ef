//! Per-joint and per-force-sensor limit tables.
//!
//! Entries are created during control manager initialization from the
//! configuration table and are immutable once the manager is Running.
//! Clamping against an entry is saturating (value pinned to the nearest
//! bound), never erroring.

/// Safety limits for one joint, keyed by its integer id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimitEntry {
    /// Minimum admissible position command (rad).
    pub pos_min: f64,
    /// Maximum admissible position command (rad).
    pub pos_max: f64,
    /// Symmetric torque bound (Nm); commands are clamped to `±tau_max`.
    pub tau_max: f64,
    /// Per-joint current bound (A). The effective bound is the smaller of
    /// this and the manager's global maximum current.
    pub current_max: f64,
}

impl JointLimitEntry {
    /// Saturating clamp of `command` against every bound of this entry.
    /// The effective current bound is the smaller of the per-joint and
    /// global current limits, converted to control units by `gain`.
    ///
    /// Returns the pinned value; the caller compares it with the request to
    /// detect a saturation event.
    pub fn clamp(&self, command: f64, global_current_max: f64, gain: f64) -> f64 {
        let current_bound = self.current_max.min(global_current_max) * gain;
        command
            .clamp(self.pos_min, self.pos_max)
            .clamp(-self.tau_max, self.tau_max)
            .clamp(-current_bound, current_bound)
    }
}

/// Admissible wrench range for one force/torque sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceLimits {
    pub min: [f64; 6],
    pub max: [f64; 6],
}

impl ForceLimits {
    /// Saturating per-axis clamp of a measured wrench.
    pub fn clamp(&self, wrench: &[f64; 6]) -> [f64; 6] {
        let mut out = [0.0; 6];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = wrench[i].clamp(self.min[i], self.max[i]);
        }
        out
    }
}
