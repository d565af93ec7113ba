//! rtc-agent service library
//!
//! Configuration and the device-side tools for the agent binary. The binary
//! in `bin/agent.rs` wires these into the core negotiator and bridge.

pub mod config;
pub mod hand;
pub mod page;
pub mod tools;
