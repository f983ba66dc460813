//! Minimal Telnet (RFC 854) handling for a relay command shell.
//!
//! The relay shell is plain text, but the server may open with option
//! negotiation. [`TelnetDecoder`] strips every IAC sequence from the byte
//! stream and produces refusals for option requests, so the shell never waits
//! on an answer we will not give. State carries across calls because a
//! sequence can be split between two reads.

use tracing::trace;

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Data,
    Iac,
    Option(u8),
    Sub,
    SubIac,
}

/// Output of one [`TelnetDecoder::feed`] call.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Application bytes with negotiation removed.
    pub text: Vec<u8>,
    /// Bytes to send back to the server.
    pub replies: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct TelnetDecoder {
    state: State,
}

impl TelnetDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Decoded {
        let mut out = Decoded::default();

        for &byte in bytes {
            self.state = match (self.state, byte) {
                (State::Data, IAC) => State::Iac,
                (State::Data, b) => {
                    out.text.push(b);
                    State::Data
                }
                (State::Iac, IAC) => {
                    out.text.push(IAC);
                    State::Data
                }
                (State::Iac, cmd @ (WILL | WONT | DO | DONT)) => State::Option(cmd),
                (State::Iac, SB) => State::Sub,
                // NOP, GA, AYT and friends carry no payload
                (State::Iac, _) => State::Data,
                (State::Option(cmd), option) => {
                    if let Some(reply) = refusal(cmd) {
                        trace!(option, "refusing telnet option");
                        out.replies.extend_from_slice(&[IAC, reply, option]);
                    }
                    State::Data
                }
                (State::Sub, IAC) => State::SubIac,
                (State::Sub, _) => State::Sub,
                (State::SubIac, SE) => State::Data,
                (State::SubIac, _) => State::Sub,
            };
        }

        out
    }
}

fn refusal(cmd: u8) -> Option<u8> {
    match cmd {
        DO => Some(WONT),
        WILL => Some(DONT),
        _ => None,
    }
}

/// Encodes one command line: IAC bytes doubled, CRLF appended.
pub fn encode_line(line: &str) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(line.len() + 2);
    for &b in line.as_bytes() {
        if b == IAC {
            encoded.push(IAC);
        }
        encoded.push(b);
    }
    encoded.extend_from_slice(b"\r\n");
    encoded
}
