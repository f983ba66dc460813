//! Transport sessions to a relay.
//!
//! Components never touch sockets directly. They talk to a [`LineChannel`]
//! (Telnet shell) or a [`RegisterChannel`] (Modbus/TCP), obtained from a
//! [`Connector`]. Each channel carries one request at a time and owns its
//! socket: `close` releases it once, and dropping a channel mid-request
//! releases it as well.

pub mod modbus;
pub mod telnet;

#[cfg(test)]
pub(crate) mod mock;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use relayprobe_common::config::ScanConfig;
use relayprobe_common::error::ScanError;
use relayprobe_common::network::target::Target;

pub use modbus::ModbusSession;
pub use telnet::TelnetSession;

/// A prompt-less, line-oriented shell.
#[async_trait]
pub trait LineChannel: Send {
    /// Writes one CRLF-terminated line.
    async fn send_line(&mut self, line: &str) -> Result<(), ScanError>;

    /// Returns whatever text has accumulated since the last read.
    async fn read_available(&mut self) -> Result<String, ScanError>;

    /// Releases the socket. Safe to call more than once.
    async fn close(&mut self);

    /// Sends a line, waits `quiescence` for the shell to answer, and reads.
    ///
    /// The wait is the only synchronization: there is no prompt detection.
    async fn exchange(&mut self, line: &str, quiescence: Duration) -> Result<String, ScanError> {
        self.send_line(line).await?;
        tokio::time::sleep(quiescence).await;
        self.read_available().await
    }
}

/// Modbus/TCP function calls against one unit.
#[async_trait]
pub trait RegisterChannel: Send {
    async fn read_holding_registers(&mut self, addr: u16, count: u16) -> Result<Vec<u16>, ScanError>;
    async fn read_input_registers(&mut self, addr: u16, count: u16) -> Result<Vec<u16>, ScanError>;
    async fn read_coils(&mut self, addr: u16, count: u16) -> Result<Vec<bool>, ScanError>;
    async fn read_discrete_inputs(&mut self, addr: u16, count: u16) -> Result<Vec<bool>, ScanError>;
    async fn write_single_coil(&mut self, addr: u16, state: bool) -> Result<(), ScanError>;
    async fn write_single_register(&mut self, addr: u16, value: u16) -> Result<(), ScanError>;

    /// Releases the socket. Safe to call more than once.
    async fn close(&mut self);
}

/// Opens sessions to a target.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open_telnet(
        &self,
        target: &Target,
        cfg: &ScanConfig,
    ) -> Result<Box<dyn LineChannel>, ScanError>;

    async fn open_modbus(
        &self,
        target: &Target,
        cfg: &ScanConfig,
    ) -> Result<Box<dyn RegisterChannel>, ScanError>;
}

/// Opens real TCP sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn open_telnet(
        &self,
        target: &Target,
        cfg: &ScanConfig,
    ) -> Result<Box<dyn LineChannel>, ScanError> {
        let session = TelnetSession::connect(target, &cfg.timing, cfg.telnet.read_limit).await?;
        Ok(Box::new(session))
    }

    async fn open_modbus(
        &self,
        target: &Target,
        cfg: &ScanConfig,
    ) -> Result<Box<dyn RegisterChannel>, ScanError> {
        let session = ModbusSession::connect(target, &cfg.timing, cfg.enumeration.unit_id).await?;
        Ok(Box::new(session))
    }
}

/// Runs `fut` unless `cancel` fires first.
///
/// When cancellation wins, `fut` is dropped in place; the session it was
/// using stays valid and can still be closed by its owner.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, ScanError>
where
    F: Future<Output = Result<T, ScanError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ScanError::Cancelled),
        result = fut => result,
    }
}

/// Cancellable pause between two protocol steps.
pub async fn pause(cancel: &CancellationToken, duration: Duration) -> Result<(), ScanError> {
    cancellable(cancel, async {
        tokio::time::sleep(duration).await;
        Ok(())
    })
    .await
}
