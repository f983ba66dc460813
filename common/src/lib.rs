//! Shared model for `relayprobe`: targets, configuration, the error taxonomy
//! and the scan report every component writes into.

pub mod config;
pub mod error;
pub mod log;
pub mod network;
pub mod report;
