//! # maxcube-poller: MAX! Cube polling service
//!
//! Keeps a snapshot of one MAX! Cube gateway fresh by polling it on a
//! fixed interval, and offers one-shot commands for inspecting and
//! controlling its thermostats from the command line.
//!
//! ## Modes
//!
//! - **Run**: Poll in the foreground until Ctrl-C (default).
//! - **Status / Check**: Print a snapshot or the gateway identity and exit.
//! - **Set / Temp / Preset / Hvac**: Change one device and exit.

pub mod actions;
pub mod config;
pub mod service;
