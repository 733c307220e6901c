//! Socket framing server (receiving side).
//!
//! Every accepted connection is one upload: read the header, acknowledge,
//! receive exactly the declared number of bytes, report the outcome and
//! close.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ferry_protocol::constants::CONTROL_MAX_LEN;
use ferry_protocol::{DEFAULT_CHUNK_SIZE, DecodeError, FileHeader, Reply};
use ferry_storage::Storage;
use ferry_transfer::{DispatchMode, UploadSession, receive_from};

use crate::DEFAULT_SOCKET_PORT;
use crate::error::SocketError;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct SocketServerConfig {
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Largest single read from the peer.
    pub chunk_size: usize,
    pub mode: DispatchMode,
}

impl Default for SocketServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SOCKET_PORT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            mode: DispatchMode::Serial,
        }
    }
}

/// Upload server for the socket framing.
pub struct SocketServer {
    storage: Storage,
    config: SocketServerConfig,
    cancel: CancellationToken,
}

impl SocketServer {
    pub fn new(storage: Storage, config: SocketServerConfig, cancel: CancellationToken) -> Self {
        Self {
            storage,
            config,
            cancel,
        }
    }

    /// Binds the configured port on all interfaces.
    pub async fn bind(&self) -> Result<TcpListener, SocketError> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.config.port).into();
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, mode = %self.config.mode, "socket server listening");
        Ok(listener)
    }

    /// Binds and serves until cancellation.
    pub async fn run(&self) -> Result<(), SocketError> {
        let listener = self.bind().await?;
        self.serve(listener).await;
        Ok(())
    }

    /// Serves connections from an already bound listener until cancellation.
    pub async fn serve(&self, listener: TcpListener) {
        let storage = self.storage.clone();
        let chunk_size = self.config.chunk_size;

        ferry_transfer::serve(
            listener,
            self.config.mode,
            self.cancel.clone(),
            move |stream, peer| {
                let storage = storage.clone();
                async move {
                    if let Err(e) = handle_connection(stream, peer, &storage, chunk_size).await {
                        warn!(%peer, error = %e, "socket connection failed");
                    }
                }
            },
        )
        .await;

        info!("socket server stopped");
    }
}

/// Runs one upload to completion. The stream is closed on every path.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    storage: &Storage,
    chunk_size: usize,
) -> Result<(), SocketError> {
    let mut buf = [0u8; CONTROL_MAX_LEN];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        debug!(%peer, "connection closed before header");
        return Ok(());
    }

    let header = match FileHeader::decode(&buf[..n]) {
        Ok(h) => h,
        Err(e) => {
            warn!(%peer, error = %e, "rejected malformed header");
            return reply_and_close(&mut stream, Reply::error(header_error_reason(&e))).await;
        }
    };

    let session =
        match UploadSession::begin(storage, &header.filename, header.size, chunk_size).await {
            Ok(s) => s,
            Err(e) => {
                warn!(%peer, filename = %header.filename, error = %e, "rejected upload");
                return reply_and_close(&mut stream, Reply::error(e.reason())).await;
            }
        };
    debug!(%peer, filename = %header.filename, size = header.size, "header accepted");
    stream.write_all(&Reply::Ok.encode()).await?;

    let outcome = match receive_from(session, &mut stream).await {
        Ok(stored) => {
            info!(%peer, filename = %stored.filename, size = stored.size, "file received");
            Reply::Done
        }
        Err(e) => {
            warn!(%peer, filename = %header.filename, error = %e, "upload failed");
            Reply::error(e.reason())
        }
    };
    reply_and_close(&mut stream, outcome).await
}

/// Writes the final reply and shuts the write half down.
async fn reply_and_close(stream: &mut TcpStream, reply: Reply) -> Result<(), SocketError> {
    stream.write_all(&reply.encode()).await?;
    // The peer may already be gone.
    let _ = stream.shutdown().await;
    Ok(())
}

fn header_error_reason(err: &DecodeError) -> String {
    match err {
        DecodeError::InvalidSize(size) => format!("Invalid file size: {size}"),
        _ => "Invalid request format".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::client::SocketClient;

    struct TestServer {
        addr: SocketAddr,
        storage: Storage,
        cancel: CancellationToken,
        _dir: tempfile::TempDir,
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.cancel.cancel();
        }
    }

    async fn start(chunk_size: usize) -> TestServer {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        let cancel = CancellationToken::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = SocketServer::new(
            storage.clone(),
            SocketServerConfig {
                port: 0,
                chunk_size,
                mode: DispatchMode::Serial,
            },
            cancel.clone(),
        );
        tokio::spawn(async move { server.serve(listener).await });

        TestServer {
            addr,
            storage,
            cancel,
            _dir: dir,
        }
    }

    /// Sends raw header bytes and returns everything the server writes
    /// before closing.
    async fn raw_exchange(addr: SocketAddr, header: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(header).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        out
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[tokio::test]
    async fn round_trip_sizes() {
        let server = start(4096).await;
        let client = SocketClient::new(server.addr.to_string());

        for size in [0usize, 1, 4096, 4097, 3 * 4096 + 17] {
            let name = format!("file-{size}.bin");
            let data = pattern(size);
            let sent = client
                .send_reader(&name, size as u64, &mut &data[..])
                .await
                .unwrap();
            assert_eq!(sent, size as u64);

            let stored = std::fs::read(server.storage.resolve(&name).unwrap()).unwrap();
            assert_eq!(stored, data, "size {size}");
        }
    }

    #[tokio::test]
    async fn send_file_uses_basename() {
        let server = start(4096).await;
        let src = tempfile::tempdir().unwrap();
        let path = src.path().join("report.txt");
        std::fs::write(&path, b"quarterly numbers").unwrap();

        let sent = SocketClient::new(server.addr.to_string())
            .send_file(&path)
            .await
            .unwrap();
        assert_eq!(sent, 17);

        let stored = server.storage.stat("report.txt").await.unwrap();
        assert_eq!(stored.size, 17);
    }

    #[tokio::test]
    async fn incomplete_upload_is_reported_and_removed() {
        let server = start(4096).await;
        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        stream.write_all(&FileHeader::new("partial.bin", 100).encode()).await.unwrap();

        let mut ack = [0u8; 16];
        let n = stream.read(&mut ack).await.unwrap();
        assert_eq!(&ack[..n], b"OK");

        stream.write_all(&[1u8; 40]).await.unwrap();
        stream.shutdown().await.unwrap();

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"ERROR|Incomplete transfer");

        assert!(server.storage.stat("partial.bin").await.is_err());
        assert!(server.storage.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn incomplete_overwrite_keeps_previous_content() {
        let server = start(4096).await;
        let client = SocketClient::new(server.addr.to_string());
        client
            .send_reader("doc.txt", 3, &mut &b"old"[..])
            .await
            .unwrap();

        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        stream.write_all(&FileHeader::new("doc.txt", 50).encode()).await.unwrap();
        let mut ack = [0u8; 16];
        stream.read(&mut ack).await.unwrap();
        stream.write_all(b"new content").await.unwrap();
        stream.shutdown().await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();

        let content = std::fs::read(server.storage.resolve("doc.txt").unwrap()).unwrap();
        assert_eq!(content, b"old");
    }

    #[tokio::test]
    async fn malformed_headers_are_rejected() {
        let server = start(4096).await;

        assert_eq!(
            raw_exchange(server.addr, b"no-separator").await,
            b"ERROR|Invalid request format"
        );
        assert_eq!(
            raw_exchange(server.addr, b"a|b|c").await,
            b"ERROR|Invalid request format"
        );
        assert_eq!(
            raw_exchange(server.addr, b"a.txt|abc").await,
            b"ERROR|Invalid file size: abc"
        );
        assert_eq!(
            raw_exchange(server.addr, b"a.txt|-5").await,
            b"ERROR|Invalid file size: -5"
        );
        assert_eq!(
            raw_exchange(server.addr, b"|10").await,
            b"ERROR|Filename is required"
        );
        assert!(server.storage.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_size_completes_immediately() {
        let server = start(4096).await;
        let out = raw_exchange(server.addr, b"empty.dat|0").await;
        assert_eq!(out, b"OKDONE");

        let stored = server.storage.stat("empty.dat").await.unwrap();
        assert_eq!(stored.size, 0);
    }

    #[tokio::test]
    async fn traversal_lands_inside_root() {
        let server = start(4096).await;
        SocketClient::new(server.addr.to_string())
            .send_reader("../../etc/passwd", 4, &mut &b"root"[..])
            .await
            .unwrap();

        let files = server.storage.list().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "passwd");
        assert!(server.storage.resolve("passwd").unwrap().starts_with(server.storage.root()));
    }

    #[tokio::test]
    async fn silent_client_is_ignored() {
        let server = start(4096).await;
        let stream = TcpStream::connect(server.addr).await.unwrap();
        drop(stream);

        // The serial listener moves on to the next connection.
        SocketClient::new(server.addr.to_string())
            .send_reader("after.txt", 2, &mut &b"hi"[..])
            .await
            .unwrap();
        assert!(server.storage.stat("after.txt").await.is_ok());
    }

    #[test]
    fn header_reasons() {
        assert_eq!(
            header_error_reason(&DecodeError::InvalidFormat),
            "Invalid request format"
        );
        assert_eq!(
            header_error_reason(&DecodeError::InvalidSize("x".into())),
            "Invalid file size: x"
        );
    }
}
