//! `strider-manager` – safety arbitration for the actuator command.
//!
//! The [`ControlManager`] is the sole writer of the final actuator command
//! and the sole authority allowed to clip or veto an upstream controller's
//! request. It does not plan or solve anything; it enforces limits and
//! regulates which upstream mode commands each joint.
//!
//! # Modules
//!
//! - [`name_map`] – [`NameMap`][name_map::NameMap]: bidirectional
//!   name ↔ integer-id association for joints, force sensors, and frames.
//! - [`limits`] – [`JointLimitEntry`][limits::JointLimitEntry] and
//!   [`ForceLimits`][limits::ForceLimits]: immutable per-id limit tables.
//! - [`sign_filter`] – [`SignFilter`][sign_filter::SignFilter]: fixed-size
//!   sliding window that smooths the velocity sign estimate used by
//!   dead-zone compensation.
//! - [`manager`] – [`ControlManager`][manager::ControlManager]: the
//!   per-cycle arbitration state machine itself.

pub mod limits;
pub mod manager;
pub mod name_map;
pub mod sign_filter;

pub use limits::{ForceLimits, JointLimitEntry};
pub use manager::{ControlManager, ModeId};
pub use name_map::NameMap;
pub use sign_filter::SignFilter;
