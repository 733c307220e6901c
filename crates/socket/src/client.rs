//! Socket framing client (sending side).

use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use ferry_protocol::constants::CONTROL_MAX_LEN;
use ferry_protocol::{DEFAULT_CHUNK_SIZE, FileHeader, Reply};

use crate::TCP_CONNECT_TIMEOUT;
use crate::error::SocketError;

/// Uploads files to a [`SocketServer`](crate::SocketServer).
///
/// Each call opens its own connection.
#[derive(Debug, Clone)]
pub struct SocketClient {
    addr: String,
    chunk_size: usize,
}

impl SocketClient {
    /// `addr` is anything `TcpStream::connect` accepts, e.g. `"127.0.0.1:8080"`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Uploads a local file under its own basename.
    ///
    /// Returns the number of bytes the server stored.
    pub async fn send_file(&self, path: &Path) -> Result<u64, SocketError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                SocketError::Protocol(format!("no usable file name in {}", path.display()))
            })?
            .to_string();
        let mut file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        self.send_reader(&filename, size, &mut file).await
    }

    /// Uploads exactly `size` bytes from `reader` as `filename`.
    pub async fn send_reader<R: AsyncRead + Unpin>(
        &self,
        filename: &str,
        size: u64,
        reader: &mut R,
    ) -> Result<u64, SocketError> {
        let mut stream = match tokio::time::timeout(
            TCP_CONNECT_TIMEOUT,
            TcpStream::connect(self.addr.as_str()),
        )
        .await
        {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(SocketError::Timeout),
        };
        debug!(addr = %self.addr, filename, size, "connected");

        let size_field = i64::try_from(size)
            .map_err(|_| SocketError::Protocol(format!("file too large: {size} bytes")))?;
        stream
            .write_all(&FileHeader::new(filename, size_field).encode())
            .await?;

        let mut buf = vec![0u8; CONTROL_MAX_LEN];
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(SocketError::Protocol(
                "connection closed before acknowledgement".into(),
            ));
        }
        // A zero-size upload may see OK and DONE arrive in the same read.
        let (ack, early) = split_ack(&buf[..n]);
        match Reply::decode(ack)? {
            Reply::Ok => {}
            Reply::Error(reason) => return Err(SocketError::Rejected(reason)),
            Reply::Done => {
                return Err(SocketError::Protocol("DONE before acknowledgement".into()));
            }
        }
        let mut result = early.to_vec();

        let mut remaining = size;
        let mut chunk = vec![0u8; self.chunk_size];
        while remaining > 0 {
            let to_read = (remaining as usize).min(chunk.len());
            let n = reader.read(&mut chunk[..to_read]).await?;
            if n == 0 {
                return Err(SocketError::Protocol(format!(
                    "source ended after {} of {size} bytes",
                    size - remaining
                )));
            }
            stream.write_all(&chunk[..n]).await?;
            remaining -= n as u64;
        }
        stream.flush().await?;

        (&mut stream)
            .take(CONTROL_MAX_LEN as u64)
            .read_to_end(&mut result)
            .await?;
        match Reply::decode(&result)? {
            Reply::Done => {
                info!(filename, size, "upload complete");
                Ok(size)
            }
            Reply::Error(reason) => Err(SocketError::Rejected(reason)),
            Reply::Ok => Err(SocketError::Protocol("unexpected OK after payload".into())),
        }
    }
}

/// Splits an acknowledgement from any bytes of the final reply that
/// arrived with it.
fn split_ack(bytes: &[u8]) -> (&[u8], &[u8]) {
    let ok = Reply::Ok.encode();
    if bytes.len() > ok.len() && bytes.starts_with(&ok) {
        bytes.split_at(ok.len())
    } else {
        (bytes, &[][..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;

    #[test]
    fn split_ack_separates_early_result() {
        assert_eq!(split_ack(b"OK"), (&b"OK"[..], &b""[..]));
        assert_eq!(split_ack(b"OKDONE"), (&b"OK"[..], &b"DONE"[..]));
        assert_eq!(
            split_ack(b"ERROR|Invalid request format"),
            (&b"ERROR|Invalid request format"[..], &b""[..])
        );
    }

    #[tokio::test]
    async fn rejection_is_surfaced() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf).await.unwrap();
            stream.write_all(b"ERROR|disk full").await.unwrap();
        });

        let err = SocketClient::new(addr.to_string())
            .send_reader("x", 1, &mut &b"x"[..])
            .await
            .unwrap_err();
        assert!(matches!(err, SocketError::Rejected(ref r) if r == "disk full"));
    }

    #[tokio::test]
    async fn short_source_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf).await.unwrap();
            stream.write_all(b"OK").await.unwrap();
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest).await;
        });

        let err = SocketClient::new(addr.to_string())
            .send_reader("x", 10, &mut &b"abc"[..])
            .await
            .unwrap_err();
        assert!(matches!(err, SocketError::Protocol(_)));
    }

    #[tokio::test]
    async fn send_file_rejects_missing_path() {
        let err = SocketClient::new("127.0.0.1:9")
            .send_file(Path::new("/definitely/not/here.bin"))
            .await
            .unwrap_err();
        assert!(matches!(err, SocketError::Io(_)));
    }
}
