use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use relayprobe_common::config::TimingConfig;
use relayprobe_common::error::ScanError;
use relayprobe_common::network::target::Target;
use relayprobe_protocols::telnet::{self, TelnetDecoder};

use super::LineChannel;

/// A Telnet shell on the relay's front port.
pub struct TelnetSession {
    endpoint: String,
    stream: Option<TcpStream>,
    decoder: TelnetDecoder,
    io_timeout: Duration,
    read_limit: usize,
}

impl TelnetSession {
    pub async fn connect(
        target: &Target,
        timing: &TimingConfig,
        read_limit: usize,
    ) -> Result<Self, ScanError> {
        let endpoint = target.telnet_endpoint();
        let connect_timeout = timing.connect_timeout();

        let stream = match timeout(
            connect_timeout,
            TcpStream::connect((target.host.as_str(), target.telnet_port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ScanError::connection(endpoint, e)),
            Err(_elapsed) => {
                return Err(ScanError::timeout(
                    format!("telnet connect to {endpoint}"),
                    connect_timeout,
                ));
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            trace!(%endpoint, error = %e, "could not disable nagle");
        }
        debug!(%endpoint, "telnet session open");

        Ok(Self {
            endpoint,
            stream: Some(stream),
            decoder: TelnetDecoder::new(),
            io_timeout: timing.io_timeout(),
            read_limit,
        })
    }

    async fn write_all(&mut self, bytes: &[u8], operation: &str) -> Result<(), ScanError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(ScanError::Closed(self.endpoint.clone()));
        };

        match timeout(self.io_timeout, stream.write_all(bytes)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ScanError::connection(&self.endpoint, format!("{operation}: {e}"))),
            Err(_elapsed) => Err(ScanError::timeout(operation, self.io_timeout)),
        }
    }
}

#[async_trait]
impl LineChannel for TelnetSession {
    async fn send_line(&mut self, line: &str) -> Result<(), ScanError> {
        self.write_all(&telnet::encode_line(line), "telnet write").await
    }

    /// Drains what the shell has produced so far, up to the read limit.
    ///
    /// Waits at most the I/O timeout for the first byte. A quiet shell is not
    /// an error and yields an empty string; a shell that hung up is.
    async fn read_available(&mut self) -> Result<String, ScanError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(ScanError::Closed(self.endpoint.clone()));
        };

        match timeout(self.io_timeout, stream.readable()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ScanError::connection(&self.endpoint, e)),
            Err(_elapsed) => return Ok(String::new()),
        }

        let mut buf = vec![0u8; self.read_limit];
        let mut filled = 0;
        let mut eof = false;

        while filled < buf.len() {
            match stream.try_read(&mut buf[filled..]) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(ScanError::connection(&self.endpoint, e)),
            }
        }

        if filled == 0 && eof {
            return Err(ScanError::connection(&self.endpoint, "closed by peer"));
        }

        let decoded = self.decoder.feed(&buf[..filled]);
        if !decoded.replies.is_empty() {
            self.write_all(&decoded.replies, "telnet negotiation").await?;
        }

        trace!(endpoint = %self.endpoint, bytes = filled, "telnet read");
        Ok(String::from_utf8_lossy(&decoded.text).into_owned())
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = timeout(self.io_timeout, stream.shutdown()).await;
            debug!(endpoint = %self.endpoint, "telnet session closed");
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

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn fast_timing() -> TimingConfig {
        TimingConfig {
            connect_timeout_ms: 500,
            io_timeout_ms: 500,
            ..TimingConfig::default()
        }
    }

    async fn listener() -> (TcpListener, Target) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, Target::new("127.0.0.1").with_ports(port, 502))
    }

    #[tokio::test]
    async fn exchange_strips_negotiation_and_refuses_options() {
        let (listener, target) = listener().await;

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut line = [0u8; 4];
            sock.read_exact(&mut line).await.unwrap();
            assert_eq!(&line, b"id\r\n");
            sock.write_all(&[telnet::IAC, telnet::DO, 24]).await.unwrap();
            sock.write_all(b"\"FID=SEL-787\",\"0975\"\r\n").await.unwrap();
            let mut reply = [0u8; 3];
            sock.read_exact(&mut reply).await.unwrap();
            reply
        });

        let mut session = TelnetSession::connect(&target, &fast_timing(), 4096).await.unwrap();
        let text = session.exchange("id", Duration::from_millis(50)).await.unwrap();
        assert_eq!(text, "\"FID=SEL-787\",\"0975\"\r\n");
        session.close().await;

        assert_eq!(server.await.unwrap(), [telnet::IAC, telnet::WONT, 24]);
    }

    #[tokio::test]
    async fn quiet_shell_reads_empty() {
        let (listener, target) = listener().await;
        let _server = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(sock);
        });

        let timing = TimingConfig {
            io_timeout_ms: 50,
            ..fast_timing()
        };
        let mut session = TelnetSession::connect(&target, &timing, 4096).await.unwrap();
        assert_eq!(session.read_available().await.unwrap(), "");
    }

    #[tokio::test]
    async fn read_limit_caps_a_single_drain() {
        let (listener, target) = listener().await;
        let _server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(&[b'x'; 64]).await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let mut session = TelnetSession::connect(&target, &fast_timing(), 16).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.read_available().await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_later_requests_fail() {
        let (listener, target) = listener().await;
        let _server = tokio::spawn(async move { listener.accept().await.unwrap() });

        let mut session = TelnetSession::connect(&target, &fast_timing(), 4096).await.unwrap();
        session.close().await;
        session.close().await;
        assert!(matches!(session.send_line("id").await, Err(ScanError::Closed(_))));
    }

    #[tokio::test]
    async fn refused_port_is_a_connection_failure() {
        let (listener, target) = listener().await;
        drop(listener);

        let err = TelnetSession::connect(&target, &fast_timing(), 4096)
            .await
            .err()
            .unwrap();
        assert!(err.is_connection());
    }
}
