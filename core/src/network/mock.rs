//! In-memory relays for unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use relayprobe_common::config::ScanConfig;
use relayprobe_common::error::ScanError;
use relayprobe_common::network::target::Target;

use super::{Connector, LineChannel, RegisterChannel};

type Responder = Arc<dyn Fn(&[String]) -> Result<String, ScanError> + Send + Sync>;

/// A shell whose output is computed from the lines sent since the last read.
#[derive(Clone)]
pub struct ScriptedShell {
    responder: Responder,
    pending: Vec<String>,
    pub transcript: Arc<Mutex<Vec<String>>>,
    pub closes: Arc<Mutex<usize>>,
    closed: bool,
}

impl ScriptedShell {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&[String]) -> Result<String, ScanError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            pending: Vec::new(),
            transcript: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(Mutex::new(0)),
            closed: false,
        }
    }

    /// Mimics a relay: `id` prints `id_output`, and a role followed by its
    /// password from `accepted` prints the success marker.
    pub fn relay(id_output: &'static str, accepted: &'static [(&'static str, &'static str)]) -> Self {
        Self::new(move |lines| {
            if lines.iter().any(|l| l == "id") {
                return Ok(id_output.to_string());
            }
            match lines {
                [role, password] => {
                    let granted = accepted
                        .iter()
                        .any(|(r, p)| r.eq_ignore_ascii_case(role) && p == password);
                    if granted {
                        Ok(format!("={}\r\nPassword: ?\r\nLevel {}\r\nTRNSFRMR\r\n", role, role))
                    } else {
                        Ok(format!("={}\r\nPassword: ?\r\nInvalid Password\r\n", role))
                    }
                }
                _ => Ok(String::new()),
            }
        })
    }

    pub fn sent(&self) -> Vec<String> {
        self.transcript.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        *self.closes.lock().unwrap()
    }
}

#[async_trait]
impl LineChannel for ScriptedShell {
    async fn send_line(&mut self, line: &str) -> Result<(), ScanError> {
        if self.closed {
            return Err(ScanError::Closed("mock".into()));
        }
        self.pending.push(line.to_string());
        self.transcript.lock().unwrap().push(line.to_string());
        Ok(())
    }

    async fn read_available(&mut self) -> Result<String, ScanError> {
        if self.closed {
            return Err(ScanError::Closed("mock".into()));
        }
        let lines = std::mem::take(&mut self.pending);
        (self.responder)(&lines)
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            *self.closes.lock().unwrap() += 1;
        }
    }
}

/// A register image. Addresses not present answer with an exception.
#[derive(Clone, Default)]
pub struct MockRegisters {
    pub holding: BTreeMap<u16, u16>,
    pub input: BTreeMap<u16, u16>,
    pub coils: BTreeMap<u16, bool>,
    pub discrete: BTreeMap<u16, bool>,
    pub writable_coils: BTreeSet<u16>,
    pub writable_registers: BTreeSet<u16>,
    /// Addresses whose writes time out instead of answering.
    pub silent_writes: BTreeSet<u16>,
    /// Every request fails at transport level after this many reads.
    pub dead_after_reads: Option<usize>,
    pub writes: Arc<Mutex<Vec<(u16, u16)>>>,
    reads: usize,
}

impl MockRegisters {
    pub fn with_holding(mut self, start: u16, values: &[u16]) -> Self {
        for (offset, value) in values.iter().enumerate() {
            self.holding.insert(start + offset as u16, *value);
        }
        self
    }

    pub fn with_input(mut self, start: u16, values: &[u16]) -> Self {
        for (offset, value) in values.iter().enumerate() {
            self.input.insert(start + offset as u16, *value);
        }
        self
    }

    pub fn with_coils(mut self, start: u16, states: &[bool]) -> Self {
        for (offset, state) in states.iter().enumerate() {
            self.coils.insert(start + offset as u16, *state);
        }
        self
    }

    pub fn dead_after(mut self, reads: usize) -> Self {
        self.dead_after_reads = Some(reads);
        self
    }

    pub fn written(&self) -> Vec<(u16, u16)> {
        self.writes.lock().unwrap().clone()
    }

    fn check_alive(&mut self) -> Result<(), ScanError> {
        self.reads += 1;
        match self.dead_after_reads {
            Some(limit) if self.reads > limit => {
                Err(ScanError::connection("mock:502", "connection reset by peer"))
            }
            _ => Ok(()),
        }
    }
}

fn read_span<T: Copy>(
    image: &BTreeMap<u16, T>,
    operation: &str,
    addr: u16,
    count: u16,
) -> Result<Vec<T>, ScanError> {
    (u32::from(addr)..u32::from(addr) + u32::from(count))
        .map(|a| {
            image
                .get(&(a as u16))
                .copied()
                .ok_or_else(|| ScanError::protocol(format!("{operation} {addr}+{count}"), "Illegal data address"))
        })
        .collect()
}

#[async_trait]
impl RegisterChannel for MockRegisters {
    async fn read_holding_registers(&mut self, addr: u16, count: u16) -> Result<Vec<u16>, ScanError> {
        self.check_alive()?;
        read_span(&self.holding, "read holding registers", addr, count)
    }

    async fn read_input_registers(&mut self, addr: u16, count: u16) -> Result<Vec<u16>, ScanError> {
        self.check_alive()?;
        read_span(&self.input, "read input registers", addr, count)
    }

    async fn read_coils(&mut self, addr: u16, count: u16) -> Result<Vec<bool>, ScanError> {
        self.check_alive()?;
        read_span(&self.coils, "read coils", addr, count)
    }

    async fn read_discrete_inputs(&mut self, addr: u16, count: u16) -> Result<Vec<bool>, ScanError> {
        self.check_alive()?;
        read_span(&self.discrete, "read discrete inputs", addr, count)
    }

    async fn write_single_coil(&mut self, addr: u16, state: bool) -> Result<(), ScanError> {
        if self.silent_writes.contains(&addr) {
            return Err(ScanError::timeout(format!("write coil {addr}"), Duration::from_millis(10)));
        }
        if !self.writable_coils.contains(&addr) {
            return Err(ScanError::protocol(format!("write coil {addr}"), "Illegal data address"));
        }
        self.writes.lock().unwrap().push((addr, u16::from(state)));
        Ok(())
    }

    async fn write_single_register(&mut self, addr: u16, value: u16) -> Result<(), ScanError> {
        if self.silent_writes.contains(&addr) {
            return Err(ScanError::timeout(format!("write register {addr}"), Duration::from_millis(10)));
        }
        if !self.writable_registers.contains(&addr) {
            return Err(ScanError::protocol(format!("write register {addr}"), "Illegal data address"));
        }
        self.writes.lock().unwrap().push((addr, value));
        Ok(())
    }

    async fn close(&mut self) {}
}

/// Hands out clones of a scripted shell and register image.
pub struct MockConnector {
    pub shell: Option<ScriptedShell>,
    pub registers: Option<MockRegisters>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn open_telnet(
        &self,
        target: &Target,
        _cfg: &ScanConfig,
    ) -> Result<Box<dyn LineChannel>, ScanError> {
        match &self.shell {
            Some(shell) => Ok(Box::new(shell.clone())),
            None => Err(ScanError::connection(target.telnet_endpoint(), "connection refused")),
        }
    }

    async fn open_modbus(
        &self,
        target: &Target,
        _cfg: &ScanConfig,
    ) -> Result<Box<dyn RegisterChannel>, ScanError> {
        match &self.registers {
            Some(registers) => Ok(Box::new(registers.clone())),
            None => Err(ScanError::connection(target.modbus_endpoint(), "connection refused")),
        }
    }
}

/// A loopback Modbus/TCP server whose very first reply arrives `delay` late.
///
/// Holding and input reads answer `address - 600` per register, bit reads
/// answer all-off, and single writes are echoed back as accepted. Every new
/// connection is served, so a client that reconnects after the slow reply
/// gets prompt answers.
pub async fn slow_first_reply_server(delay: Duration) -> Target {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let stalled = Arc::new(AtomicBool::new(false));

    tokio::spawn(async move {
        while let Ok((sock, _)) = listener.accept().await {
            tokio::spawn(serve_modbus(sock, stalled.clone(), delay));
        }
    });

    Target::new("127.0.0.1").with_ports(23, port)
}

async fn serve_modbus(mut sock: TcpStream, stalled: Arc<AtomicBool>, delay: Duration) {
    loop {
        let mut header = [0u8; 7];
        if sock.read_exact(&mut header).await.is_err() {
            return;
        }
        let len = usize::from(u16::from_be_bytes([header[4], header[5]]));
        let mut request = vec![0u8; len.saturating_sub(1)];
        if sock.read_exact(&mut request).await.is_err() {
            return;
        }

        let addr = u16::from_be_bytes([request[1], request[2]]);
        let count = u16::from_be_bytes([request[3], request[4]]);
        let pdu = match request[0] {
            0x03 | 0x04 => {
                let mut pdu = vec![request[0], (count * 2) as u8];
                for offset in 0..count {
                    pdu.extend_from_slice(&(addr + offset).wrapping_sub(600).to_be_bytes());
                }
                pdu
            }
            0x01 | 0x02 => {
                let bytes = count.div_ceil(8) as usize;
                let mut pdu = vec![request[0], bytes as u8];
                pdu.resize(2 + bytes, 0);
                pdu
            }
            _ => request.clone(),
        };

        if !stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(delay).await;
        }

        let mut frame = header[..4].to_vec();
        frame.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
        frame.push(header[6]);
        frame.extend_from_slice(&pdu);
        if sock.write_all(&frame).await.is_err() {
            return;
        }
    }
}
