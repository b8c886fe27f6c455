//! Alert detection and notification dispatch for the infrastructure dashboard.
//!
//! Metric snapshots and log lines are evaluated against user rules in
//! [`alerting`]; fired alerts are fanned out to toast, desktop, email and chat
//! webhook channels by [`notifications`]. The [`server`] module holds the
//! configuration and host adapters used by the binary.

pub mod alerting;
pub mod notifications;
pub mod server;
pub mod version;
