//! Network emulation and NAT control.
//!
//! Thin glue over `ip`, `tc` and `iptables`: lists interfaces with their
//! current netem and NAT state, applies or removes netem qdiscs, toggles
//! source NAT, and keeps interface aliases. All commands go through a
//! [`CommandRunner`] so they can be scripted in tests.

pub mod command;
pub mod controller;
pub mod environment;
pub mod interfaces;
pub mod labels;
pub mod nat;
pub mod qdisc;
pub mod types;

pub use command::{CommandRunner, SystemRunner};
pub use controller::NetworkController;
pub use environment::HostEnvironment;
pub use labels::{InterfaceLabels, MemoryLabels};
pub use types::{InterfaceStatus, NetemSettings, Notice, NoticeLevel, ToolAvailability};
