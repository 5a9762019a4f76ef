use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value shape of a signal port. Every port declares its shape once; links
/// between ports of different shapes are rejected at assembly time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    /// A single scalar value.
    Scalar,
    /// A fixed-length vector (length checked on every write).
    Vector(usize),
    /// A 6-axis force/torque wrench.
    Wrench,
    /// A unit quaternion (w, x, y, z).
    Quaternion,
}

impl Shape {
    /// The neutral value a port of this shape holds before any source has
    /// written to it. Quaternions default to identity, everything else to
    /// zero.
    pub fn default_value(&self) -> Value {
        match self {
            Shape::Scalar => Value::Scalar(0.0),
            Shape::Vector(n) => Value::Vector(vec![0.0; *n]),
            Shape::Wrench => Value::Wrench([0.0; 6]),
            Shape::Quaternion => Value::Quaternion([1.0, 0.0, 0.0, 0.0]),
        }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shape::Scalar => write!(f, "scalar"),
            Shape::Vector(n) => write!(f, "vector<{n}>"),
            Shape::Wrench => write!(f, "wrench<6>"),
            Shape::Quaternion => write!(f, "quaternion<4>"),
        }
    }
}

/// A typed signal value flowing over a link once per control cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
    Wrench([f64; 6]),
    Quaternion([f64; 4]),
}

impl Value {
    /// The [`Shape`] this value conforms to.
    pub fn shape(&self) -> Shape {
        match self {
            Value::Scalar(_) => Shape::Scalar,
            Value::Vector(v) => Shape::Vector(v.len()),
            Value::Wrench(_) => Shape::Wrench,
            Value::Quaternion(_) => Shape::Quaternion,
        }
    }

    /// Borrow the vector payload, or `None` for non-vector values.
    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow the wrench payload, or `None` for non-wrench values.
    pub fn as_wrench(&self) -> Option<&[f64; 6]> {
        match self {
            Value::Wrench(w) => Some(w),
            _ => None,
        }
    }

    /// Borrow the scalar payload, or `None` for non-scalar values.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(s) => Some(*s),
            _ => None,
        }
    }
}

/// Direction of a signal port relative to its owning node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

/// Lifecycle of a node or of the control manager.
///
/// Everything starts `Unconfigured`, becomes `Initialized` once its port
/// shapes are fixed (vector lengths derived from the joint count), and
/// `Running` once the minimum registration set is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    Unconfigured,
    Initialized,
    Running,
}

/// Kinematic/dynamic model descriptor resolved once at startup.
///
/// `joint_count` is the single source of truth for per-joint vector lengths
/// (`J`); base-augmented vectors have length `J + 6`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Robot name, e.g. "hrp2" or "talos".
    pub name: String,
    /// Number of actuated joints (`J`).
    pub joint_count: usize,
    /// Path to the URDF file describing the kinematic chain, when one is
    /// available (boundary nodes pass it to their numerical cores).
    pub urdf_path: Option<String>,
}

impl ModelDescriptor {
    /// Length of base-augmented state vectors (base pose + joints).
    pub fn full_state_len(&self) -> usize {
        self.joint_count + 6
    }
}

/// Error taxonomy for pipeline assembly and arbitration.
///
/// `Config` and `LinkResolution` are fatal and abort startup before any
/// actuator command is emitted. `Lookup` rejects a single operation without
/// mutating state. Saturation and degraded-source conditions are *events*
/// ([`ArbitrationEvent`]), not errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StriderError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("link resolution failed: {0}")]
    LinkResolution(String),

    #[error("lookup failed: {0}")]
    Lookup(String),
}

/// Informational events produced by the control manager while Running.
///
/// These are recorded and logged but never interrupt the control cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArbitrationEvent {
    /// A command was pinned to the nearest bound of its limit entry.
    Saturation {
        joint_id: usize,
        requested: f64,
        emitted: f64,
    },
    /// The active mode's command source for a joint has been missing for
    /// `held_cycles` consecutive cycles; the last safe command is being
    /// held. Emitted exactly once per sustained outage.
    SourceDegraded {
        joint_id: usize,
        mode: String,
        held_cycles: u32,
    },
}

/// One recorded telemetry sample: the value of a registered signal at the
/// end of a control cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Qualified signal name, `"<node>.<port>"`.
    pub signal: String,
    /// Control cycle index the sample was taken at.
    pub cycle: u64,
    pub value: Value,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_default_values_match_shape() {
        assert_eq!(Shape::Scalar.default_value().shape(), Shape::Scalar);
        assert_eq!(Shape::Vector(7).default_value().shape(), Shape::Vector(7));
        assert_eq!(Shape::Wrench.default_value().shape(), Shape::Wrench);
        assert_eq!(
            Shape::Quaternion.default_value().shape(),
            Shape::Quaternion
        );
    }

    #[test]
    fn quaternion_default_is_identity() {
        match Shape::Quaternion.default_value() {
            Value::Quaternion(q) => assert_eq!(q, [1.0, 0.0, 0.0, 0.0]),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn vector_shape_carries_length() {
        let v = Value::Vector(vec![0.0; 30]);
        assert_eq!(v.shape(), Shape::Vector(30));
        assert_ne!(v.shape(), Shape::Vector(31));
    }

    #[test]
    fn value_accessors() {
        assert_eq!(Value::Scalar(2.5).as_scalar(), Some(2.5));
        assert_eq!(Value::Scalar(2.5).as_vector(), None);
        let w = Value::Wrench([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(w.as_wrench().unwrap()[5], 6.0);
    }

    #[test]
    fn model_descriptor_full_state_len() {
        let model = ModelDescriptor {
            name: "hrp2".to_string(),
            joint_count: 30,
            urdf_path: None,
        };
        assert_eq!(model.full_state_len(), 36);
    }

    #[test]
    fn error_display() {
        let err = StriderError::LinkResolution("balance_ctrl.q has no source".to_string());
        assert!(err.to_string().contains("link resolution failed"));
        assert!(err.to_string().contains("balance_ctrl.q"));
    }

    #[test]
    fn shape_display() {
        assert_eq!(Shape::Vector(30).to_string(), "vector<30>");
        assert_eq!(Shape::Wrench.to_string(), "wrench<6>");
    }
}
