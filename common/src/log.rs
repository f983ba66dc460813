//! Logging shorthands shared by every crate in the workspace.
//!
//! These wrap `tracing` so call sites read like status lines. `success!` is an
//! `INFO` event carrying `status = "success"`, which the CLI formatter renders
//! with its own glyph.

#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {
        ::tracing::info!(status = "success", $($arg)*)
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        ::tracing::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        ::tracing::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        ::tracing::error!($($arg)*)
    };
}
