use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{error::Elapsed, timeout};
use tokio_modbus::client::{Context, tcp};
use tokio_modbus::prelude::*;
use tracing::debug;

use relayprobe_common::config::TimingConfig;
use relayprobe_common::error::ScanError;
use relayprobe_common::network::target::Target;

use super::RegisterChannel;

/// A Modbus/TCP client bound to one unit id.
///
/// A request that times out or gets an answer that does not match it leaves
/// the connection out of step with the device, so the connection is dropped
/// and the next request opens a fresh one. Only [`RegisterChannel::close`]
/// ends the session for good.
pub struct ModbusSession {
    endpoint: String,
    addr: SocketAddr,
    unit_id: u8,
    connect_timeout: Duration,
    io_timeout: Duration,
    ctx: Option<Context>,
    closed: bool,
}

impl ModbusSession {
    pub async fn connect(
        target: &Target,
        timing: &TimingConfig,
        unit_id: u8,
    ) -> Result<Self, ScanError> {
        let endpoint = target.modbus_endpoint();
        let connect_timeout = timing.connect_timeout();
        let addr = resolve(target, &endpoint, connect_timeout).await?;
        let ctx = open(addr, unit_id, &endpoint, connect_timeout).await?;
        debug!(%endpoint, unit_id, "modbus session open");

        Ok(Self {
            endpoint,
            addr,
            unit_id,
            connect_timeout,
            io_timeout: timing.io_timeout(),
            ctx: Some(ctx),
            closed: false,
        })
    }

    async fn context(&mut self) -> Result<&mut Context, ScanError> {
        if self.closed {
            return Err(ScanError::Closed(self.endpoint.clone()));
        }
        if self.ctx.is_none() {
            debug!(endpoint = %self.endpoint, "reopening modbus connection");
            let ctx = open(self.addr, self.unit_id, &self.endpoint, self.connect_timeout).await?;
            self.ctx = Some(ctx);
        }
        self.ctx
            .as_mut()
            .ok_or_else(|| ScanError::Closed(self.endpoint.clone()))
    }

    fn settle<T>(
        &mut self,
        operation: String,
        result: Result<io::Result<T>, Elapsed>,
    ) -> Result<T, ScanError> {
        let err = match result {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => classify(&self.endpoint, operation, e),
            Err(_elapsed) => ScanError::timeout(operation, self.io_timeout),
        };
        // a late or mismatched frame would otherwise answer the next request
        if !err.is_protocol() && self.ctx.take().is_some() {
            debug!(endpoint = %self.endpoint, error = %err, "modbus connection dropped");
        }
        Err(err)
    }
}

async fn open(
    addr: SocketAddr,
    unit_id: u8,
    endpoint: &str,
    limit: Duration,
) -> Result<Context, ScanError> {
    match timeout(limit, tcp::connect_slave(addr, Slave(unit_id))).await {
        Ok(Ok(ctx)) => Ok(ctx),
        Ok(Err(e)) => Err(ScanError::connection(endpoint, e)),
        Err(_elapsed) => Err(ScanError::timeout(
            format!("modbus connect to {endpoint}"),
            limit,
        )),
    }
}

async fn resolve(
    target: &Target,
    endpoint: &str,
    limit: Duration,
) -> Result<SocketAddr, ScanError> {
    let lookup = tokio::net::lookup_host((target.host.as_str(), target.modbus_port));
    match timeout(limit, lookup).await {
        Ok(Ok(mut addrs)) => addrs
            .next()
            .ok_or_else(|| ScanError::connection(endpoint, "host did not resolve")),
        Ok(Err(e)) => Err(ScanError::connection(endpoint, e)),
        Err(_elapsed) => Err(ScanError::timeout(format!("resolving {endpoint}"), limit)),
    }
}

/// Only an exception response (`Other`) is the device refusing a request.
/// A malformed or mismatched frame (`InvalidData`) says nothing about the
/// request, so it is treated like any other broken transport.
fn classify(endpoint: &str, operation: String, err: io::Error) -> ScanError {
    match err.kind() {
        io::ErrorKind::Other => ScanError::protocol(operation, err),
        io::ErrorKind::InvalidData => {
            ScanError::connection(endpoint, format!("{operation}: unexpected response: {err}"))
        }
        _ => ScanError::connection(endpoint, format!("{operation}: {err}")),
    }
}

#[async_trait]
impl RegisterChannel for ModbusSession {
    async fn read_holding_registers(&mut self, addr: u16, count: u16) -> Result<Vec<u16>, ScanError> {
        let limit = self.io_timeout;
        let result = timeout(limit, self.context().await?.read_holding_registers(addr, count)).await;
        self.settle(format!("read holding registers {addr}+{count}"), result)
    }

    async fn read_input_registers(&mut self, addr: u16, count: u16) -> Result<Vec<u16>, ScanError> {
        let limit = self.io_timeout;
        let result = timeout(limit, self.context().await?.read_input_registers(addr, count)).await;
        self.settle(format!("read input registers {addr}+{count}"), result)
    }

    async fn read_coils(&mut self, addr: u16, count: u16) -> Result<Vec<bool>, ScanError> {
        let limit = self.io_timeout;
        let result = timeout(limit, self.context().await?.read_coils(addr, count)).await;
        let mut bits = self.settle(format!("read coils {addr}+{count}"), result)?;
        // bit responses are padded to whole bytes
        bits.truncate(usize::from(count));
        Ok(bits)
    }

    async fn read_discrete_inputs(&mut self, addr: u16, count: u16) -> Result<Vec<bool>, ScanError> {
        let limit = self.io_timeout;
        let result = timeout(limit, self.context().await?.read_discrete_inputs(addr, count)).await;
        let mut bits = self.settle(format!("read discrete inputs {addr}+{count}"), result)?;
        bits.truncate(usize::from(count));
        Ok(bits)
    }

    async fn write_single_coil(&mut self, addr: u16, state: bool) -> Result<(), ScanError> {
        let limit = self.io_timeout;
        let result = timeout(limit, self.context().await?.write_single_coil(addr, state)).await;
        self.settle(format!("write coil {addr}"), result)
    }

    async fn write_single_register(&mut self, addr: u16, value: u16) -> Result<(), ScanError> {
        let limit = self.io_timeout;
        let result = timeout(limit, self.context().await?.write_single_register(addr, value)).await;
        self.settle(format!("write register {addr}"), result)
    }

    async fn close(&mut self) {
        self.closed = true;
        // dropping the context closes the socket
        if self.ctx.take().is_some() {
            debug!(endpoint = %self.endpoint, "modbus session closed");
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
