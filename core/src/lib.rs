//! Scan engine for `relayprobe`: transport sessions, the four scan
//! components and the orchestration that ties them into one report per
//! relay.

pub mod enumeration;
pub mod escalation;
pub mod fingerprint;
pub mod network;
pub mod report;
pub mod scanner;
pub mod write_probe;

pub use scanner::Scanner;
