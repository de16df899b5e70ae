use std::net::ToSocketAddrs;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::{CachescoutError, Result};

/// Default timeout for connect, read, and write operations.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a single response line or data block.
///
/// A cluster roster is a few kilobytes at most; anything past this is a
/// corrupt or hostile peer and must not drive allocation.
const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// One connection speaking the memcached text protocol.
///
/// Commands are CRLF-terminated lines; responses are either lines
/// (`CONFIG ...`, `END`, `VERSION ...`) or a length-delimited data block
/// followed by CRLF. Every operation is bounded by the connection's
/// timeout.
///
/// # Example
///
/// ```no_run
/// use cachescout_common::transport::TextConnection;
///
/// # async fn demo() -> cachescout_common::error::Result<()> {
/// let mut conn = TextConnection::connect("10.0.0.1:11211").await?;
/// conn.send_command("version").await?;
/// let line = conn.read_line().await?;
/// assert!(line.starts_with("VERSION"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TextConnection {
    reader: BufReader<TcpStream>,
    peer: String,
    timeout: Duration,
}

impl TextConnection {
    /// Connects with the default timeout.
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_TIMEOUT).await
    }

    /// Connects to `addr`, trying each resolved address until one accepts.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the address cannot be resolved or no
    /// resolved address accepts within `timeout`.
    pub async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        let socket_addrs = addr.to_socket_addrs().map_err(|e| {
            CachescoutError::Connection(format!("Invalid address '{}': {}", addr, e))
        })?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match tokio::time::timeout(timeout, TcpStream::connect(&socket_addr)).await {
                Ok(Ok(stream)) => {
                    return Ok(Self {
                        reader: BufReader::new(stream),
                        peer: addr.to_string(),
                        timeout,
                    });
                }
                Ok(Err(e)) => last_err = Some(e.to_string()),
                Err(_) => last_err = Some(format!("connect timed out after {:?}", timeout)),
            }
        }

        Err(CachescoutError::Connection(format!(
            "Failed to connect to {}: {}",
            addr,
            last_err.unwrap_or_else(|| "no addresses resolved".to_string())
        )))
    }

    /// The address this connection was dialed with.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Sends one command line; the CRLF terminator is appended here.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        let timeout = self.timeout;
        let line = format!("{}\r\n", command);
        let stream = self.reader.get_mut();

        let written = tokio::time::timeout(timeout, async {
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| CachescoutError::Timeout(timeout.as_millis() as u64))?;

        written.map_err(|e| self.map_io_error(e, "writing command"))?;
        Ok(())
    }

    /// Reads one response line, stripped of its line terminator.
    ///
    /// # Errors
    ///
    /// Returns a connection error when the peer closes the stream, a parse
    /// error when the line exceeds the response cap, and a timeout error
    /// when no full line arrives in time.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = tokio::time::timeout(self.timeout, self.reader.read_line(&mut line))
            .await
            .map_err(|_| CachescoutError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| self.map_io_error(e, "reading response line"))?;

        if read == 0 {
            return Err(CachescoutError::Connection(format!(
                "{}: connection closed by peer",
                self.peer
            )));
        }
        if line.len() > MAX_RESPONSE_BYTES {
            return Err(CachescoutError::Parse(format!(
                "response line of {} bytes exceeds cap of {} bytes",
                line.len(),
                MAX_RESPONSE_BYTES
            )));
        }

        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    /// Reads a data block of exactly `len` bytes plus its CRLF terminator.
    pub async fn read_data(&mut self, len: usize) -> Result<Vec<u8>> {
        if len > MAX_RESPONSE_BYTES {
            return Err(CachescoutError::Parse(format!(
                "data block of {} bytes exceeds cap of {} bytes",
                len, MAX_RESPONSE_BYTES
            )));
        }

        let mut buf = vec![0u8; len];
        tokio::time::timeout(self.timeout, self.reader.read_exact(&mut buf))
            .await
            .map_err(|_| CachescoutError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| self.map_io_error(e, "reading data block"))?;

        // Consume the block terminator; servers send \r\n but a bare \n is
        // tolerated.
        let mut sep = [0u8; 1];
        tokio::time::timeout(self.timeout, self.reader.read_exact(&mut sep))
            .await
            .map_err(|_| CachescoutError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| self.map_io_error(e, "reading block terminator"))?;
        if sep[0] == b'\r' {
            tokio::time::timeout(self.timeout, self.reader.read_exact(&mut sep))
                .await
                .map_err(|_| CachescoutError::Timeout(self.timeout.as_millis() as u64))?
                .map_err(|e| self.map_io_error(e, "reading block terminator"))?;
        }
        if sep[0] != b'\n' {
            return Err(CachescoutError::Parse(
                "data block not terminated by CRLF".to_string(),
            ));
        }

        Ok(buf)
    }

    /// Map IO errors to transport error variants.
    fn map_io_error(&self, err: std::io::Error, context: &str) -> CachescoutError {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                CachescoutError::Timeout(self.timeout.as_millis() as u64)
            }
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::UnexpectedEof => {
                CachescoutError::Connection(format!("{}: {}: connection lost", self.peer, context))
            }
            _ => CachescoutError::Io(err),
        }
    }
}
