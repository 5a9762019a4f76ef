//! Concrete pipeline nodes for the torque-control graph.
//!
//! Every node here implements [`strider_graph::Node`]: a fixed port set
//! sized from the robot model at initialization, plus one synchronous
//! update per control cycle. Nodes that wrap heavy numerics (attitude
//! fusion, contact-force estimation, whole-body inverse dynamics) are
//! boundary nodes: the graph-facing port plumbing lives here while the
//! numerical core sits behind a trait, so tests and simulation can plug a
//! cheap stand-in.

pub mod admittance;
pub mod balance;
pub mod base;
pub mod ctrl_node;
pub mod device;
pub mod encoders;
pub mod force;
pub mod imu;
pub mod kinematics;
pub mod position;
pub mod torque;
pub mod trajectory;

pub use admittance::AdmittanceController;
pub use balance::{BalanceController, BalanceGains, SolverCore};
pub use base::{BaseEstimator, FreeFlyerLocator, PoseCore};
pub use ctrl_node::CtrlManagerNode;
pub use device::{DeviceNode, DeviceOptions};
pub use encoders::EncoderSelector;
pub use force::{ForceEstimatorCore, ForceTorqueEstimator};
pub use imu::{AttitudeCore, AttitudeFilter, ImuOffsetCompensation};
pub use kinematics::KinematicEstimator;
pub use position::PositionController;
pub use torque::JointTorqueController;
pub use trajectory::{JointTrajectoryGenerator, NdTrajectoryGenerator};
