//! End-to-end scans over real TCP sessions against a loopback fake relay.

pub mod fake;

#[cfg(test)]
mod scan;
