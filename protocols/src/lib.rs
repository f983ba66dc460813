//! Wire-level knowledge about the relay: Telnet negotiation, the
//! identification output grammar and register map semantics.

pub mod fingerprint;
pub mod registers;
pub mod telnet;
