//! Loopback stand-ins for a relay's Telnet shell and Modbus/TCP server.
//!
//! Both listeners bind to `127.0.0.1:0` and serve until the [`FakeRelay`] is
//! dropped.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use relayprobe_common::network::target::Target;
use relayprobe_protocols::telnet::{DO, IAC};

const ECHO: u8 = 1;

pub const SEL_787_ID: &str = "\"FID=SEL-787-R110-V1-Z002001-D20190508\",\"0975\"\r\n\
    \"BFID=SLBT-3CF1-R102-V0-Z001001-D20160126\",\"0951\"\r\n\
    \"CID=D3C5\",\"0265\"\r\n\
    \"DEVID=FEEDER 7 XFMR\",\"0573\"\r\n\
    \"PARTNO=0787E2XCA1A4X5X81000230\",\"0779\"\r\n";

/// What the fake relay answers with.
#[derive(Debug, Clone)]
pub struct RelayProfile {
    pub id_output: String,
    /// `(role, password)` pairs the shell accepts.
    pub passwords: Vec<(String, String)>,
    pub holding: BTreeMap<u16, u16>,
    pub input: BTreeMap<u16, u16>,
    pub coils: BTreeMap<u16, bool>,
    pub discrete: BTreeMap<u16, bool>,
    pub writable_coils: Vec<u16>,
    pub writable_registers: Vec<u16>,
}

impl RelayProfile {
    /// An SEL-787 that still has the factory ACC password and exposes every
    /// address of the default sweep.
    pub fn sel_787() -> Self {
        let holding = (684..724).map(|a| (a, a - 600)).collect::<BTreeMap<_, _>>();
        let mut profile = Self {
            id_output: SEL_787_ID.to_string(),
            passwords: vec![("ACC".into(), "OTTER".into())],
            holding,
            input: (0..20).map(|a| (a, a * 3 + 1)).collect(),
            coils: (0..32).map(|a| (a, a % 2 == 0)).collect(),
            discrete: (0..32).map(|a| (a, a == 7)).collect(),
            writable_coils: Vec::new(),
            writable_registers: Vec::new(),
        };
        profile.holding.insert(684, 1200);
        profile.holding.insert(704, 6000);
        profile
    }

    pub fn accepting_coils(mut self, coils: &[u16]) -> Self {
        self.writable_coils = coils.to_vec();
        self
    }

    fn accepts(&self, role: &str, password: &str) -> bool {
        self.passwords
            .iter()
            .any(|(r, p)| r.eq_ignore_ascii_case(role) && p == password)
    }

    fn knows_role(&self, role: &str) -> bool {
        ["ACC", "2AC", "CAL", "BAC", "PAC"]
            .iter()
            .any(|r| r.eq_ignore_ascii_case(role))
    }
}

/// A write the Modbus fake received: `(function code, address, value)`.
pub type WriteRecord = (u8, u16, u16);

pub struct FakeRelay {
    pub telnet_port: u16,
    pub modbus_port: u16,
    writes: Arc<Mutex<Vec<WriteRecord>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl FakeRelay {
    pub async fn start(profile: RelayProfile) -> std::io::Result<Self> {
        let profile = Arc::new(profile);
        let writes = Arc::new(Mutex::new(Vec::new()));

        let telnet = TcpListener::bind("127.0.0.1:0").await?;
        let modbus = TcpListener::bind("127.0.0.1:0").await?;
        let telnet_port = telnet.local_addr()?.port();
        let modbus_port = modbus.local_addr()?.port();

        let shell_profile = Arc::clone(&profile);
        let shell = tokio::spawn(async move {
            while let Ok((stream, _)) = telnet.accept().await {
                tokio::spawn(serve_shell(stream, Arc::clone(&shell_profile)));
            }
        });

        let register_writes = Arc::clone(&writes);
        let registers = tokio::spawn(async move {
            while let Ok((stream, _)) = modbus.accept().await {
                tokio::spawn(serve_modbus(
                    stream,
                    Arc::clone(&profile),
                    Arc::clone(&register_writes),
                ));
            }
        });

        Ok(Self {
            telnet_port,
            modbus_port,
            writes,
            tasks: vec![shell, registers],
        })
    }

    pub fn target(&self) -> Target {
        Target::new("127.0.0.1").with_ports(self.telnet_port, self.modbus_port)
    }

    /// Same relay, but with nothing listening on the Modbus port.
    pub async fn target_without_modbus(&self) -> std::io::Result<Target> {
        Ok(Target::new("127.0.0.1").with_ports(self.telnet_port, closed_port().await?))
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl Drop for FakeRelay {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// A loopback port nothing listens on.
pub async fn closed_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

async fn serve_shell(mut stream: TcpStream, profile: Arc<RelayProfile>) {
    if stream.write_all(&[IAC, DO, ECHO]).await.is_err() || stream.write_all(b"=").await.is_err() {
        return;
    }

    let mut pending = Vec::new();
    let mut awaiting_password: Option<String> = None;
    let mut chunk = [0u8; 512];

    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        pending.extend(strip_negotiation(&chunk[..n]));

        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();

            let reply = match awaiting_password.take() {
                Some(role) if profile.accepts(&role, &line) => {
                    format!("\r\nLevel {}\r\nFeeder 7\r\nTRNSFRMR\r\n=>", role.to_uppercase())
                }
                Some(_) => "\r\nInvalid Password\r\n=".to_string(),
                None if line == "id" => format!("id\r\n{}=", profile.id_output),
                None if profile.knows_role(&line) => {
                    awaiting_password = Some(line);
                    "\r\nPassword: ? ".to_string()
                }
                None => "\r\nInvalid Command\r\n=".to_string(),
            };

            if stream.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

/// Drops the client's three-byte option replies.
fn strip_negotiation(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut skip = 0;
    for &b in bytes {
        if skip > 0 {
            skip -= 1;
        } else if b == IAC {
            skip = 2;
        } else {
            out.push(b);
        }
    }
    out
}

async fn serve_modbus(
    mut stream: TcpStream,
    profile: Arc<RelayProfile>,
    writes: Arc<Mutex<Vec<WriteRecord>>>,
) {
    let mut header = [0u8; 7];
    loop {
        if stream.read_exact(&mut header).await.is_err() {
            return;
        }
        let len = u16::from_be_bytes([header[4], header[5]]) as usize;
        let mut pdu = vec![0u8; len.saturating_sub(1)];
        if stream.read_exact(&mut pdu).await.is_err() {
            return;
        }

        let reply = answer(&pdu, &profile, &writes);

        let mut frame = Vec::with_capacity(7 + reply.len());
        frame.extend_from_slice(&header[..4]);
        frame.extend_from_slice(&(reply.len() as u16 + 1).to_be_bytes());
        frame.push(header[6]);
        frame.extend_from_slice(&reply);
        if stream.write_all(&frame).await.is_err() {
            return;
        }
    }
}

fn answer(pdu: &[u8], profile: &RelayProfile, writes: &Mutex<Vec<WriteRecord>>) -> Vec<u8> {
    if pdu.len() < 5 {
        return exception(pdu.first().copied().unwrap_or(0), 0x03);
    }
    let function = pdu[0];
    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
    let operand = u16::from_be_bytes([pdu[3], pdu[4]]);

    match function {
        0x01 | 0x02 => {
            let image = if function == 0x01 { &profile.coils } else { &profile.discrete };
            match read_image(image, address, operand) {
                Some(bits) => {
                    let mut packed = vec![0u8; bits.len().div_ceil(8)];
                    for (i, on) in bits.iter().enumerate() {
                        if *on {
                            packed[i / 8] |= 1 << (i % 8);
                        }
                    }
                    let mut reply = vec![function, packed.len() as u8];
                    reply.extend(packed);
                    reply
                }
                None => exception(function, 0x02),
            }
        }
        0x03 | 0x04 => {
            let image = if function == 0x03 { &profile.holding } else { &profile.input };
            match read_image(image, address, operand) {
                Some(words) => {
                    let mut reply = vec![function, (words.len() * 2) as u8];
                    for word in words {
                        reply.extend_from_slice(&word.to_be_bytes());
                    }
                    reply
                }
                None => exception(function, 0x02),
            }
        }
        0x05 | 0x06 => {
            let writable = if function == 0x05 {
                &profile.writable_coils
            } else {
                &profile.writable_registers
            };
            if !writable.contains(&address) {
                return exception(function, 0x01);
            }
            if let Ok(mut log) = writes.lock() {
                log.push((function, address, operand));
            }
            pdu[..5].to_vec()
        }
        other => exception(other, 0x01),
    }
}

fn read_image<T: Copy>(image: &BTreeMap<u16, T>, start: u16, count: u16) -> Option<Vec<T>> {
    (start..start.checked_add(count)?)
        .map(|a| image.get(&a).copied())
        .collect()
}

fn exception(function: u8, code: u8) -> Vec<u8> {
    vec![function | 0x80, code]
}
