//! Call client.
//!
//! Every operation opens its own connection, runs one call and closes.

use std::path::Path;

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use ferry_protocol::constants::WS_MAX_MESSAGE_SIZE;
use ferry_protocol::messages::{
    DeleteRequest, DeleteResponse, DownloadRequest, FileInfo, FileList, UploadRequest,
    UploadResponse,
};
use ferry_protocol::{Chunk, DEFAULT_CHUNK_SIZE, Message, MessageType};
use ferry_storage::PARTIAL_PREFIX;

use crate::call::{Call, Frame};
use crate::{RpcError, TCP_CONNECT_TIMEOUT};

type ClientCall = Call<MaybeTlsStream<TcpStream>>;

/// Client for an [`RpcServer`](crate::RpcServer).
#[derive(Debug, Clone)]
pub struct RpcClient {
    url: String,
    chunk_size: usize,
}

impl RpcClient {
    /// `addr` is either `host:port` or a full `ws://` URL.
    pub fn new(addr: impl AsRef<str>) -> Self {
        let addr = addr.as_ref();
        let url = if addr.starts_with("ws://") || addr.starts_with("wss://") {
            addr.to_string()
        } else {
            format!("ws://{addr}")
        };
        Self {
            url,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the payload size of outgoing chunks. Must not exceed the
    /// server's chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    async fn connect(&self) -> Result<ClientCall, RpcError> {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);

        let ws = match tokio::time::timeout(
            TCP_CONNECT_TIMEOUT,
            tokio_tungstenite::connect_async_with_config(
                self.url.as_str(),
                Some(ws_config),
                false,
            ),
        )
        .await
        {
            Ok(Ok((ws, _))) => ws,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(RpcError::Timeout),
        };
        tracing::debug!(url = %self.url, "connected");
        Ok(Call::new(ws, None))
    }

    /// Uploads a local file under its own basename.
    pub async fn upload_file(&self, path: &Path) -> Result<UploadResponse, RpcError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                RpcError::Protocol(format!("no usable file name in {}", path.display()))
            })?
            .to_string();
        let mut file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        self.upload_reader(&filename, size, &mut file).await
    }

    /// Uploads `size` bytes from `reader` as `filename`.
    ///
    /// The server's verdict comes back as the [`UploadResponse`]; check
    /// `success`. If `reader` ends early the call is ended with
    /// `upload_end` and the server reports an incomplete transfer.
    pub async fn upload_reader<R: AsyncRead + Unpin>(
        &self,
        filename: &str,
        size: u64,
        reader: &mut R,
    ) -> Result<UploadResponse, RpcError> {
        let total_size = i64::try_from(size)
            .map_err(|_| RpcError::Protocol(format!("file too large: {size} bytes")))?;
        let mut call = self.connect().await?;

        let req = UploadRequest {
            filename: filename.to_string(),
            total_size,
        };
        call.send_msg(&Message::new(next_id(), MessageType::Upload, Some(&req))?)
            .await?;

        let mut offset: i64 = 0;
        let mut buf = vec![0u8; self.chunk_size];
        while offset < total_size {
            let want = ((total_size - offset) as usize).min(buf.len());
            let n = read_full(reader, &mut buf[..want]).await?;
            if n == 0 {
                tracing::debug!(filename, offset, total_size, "source ended early");
                call.send_msg(&Message::new(
                    next_id(),
                    MessageType::UploadEnd,
                    Option::<&()>::None,
                )?)
                .await?;
                break;
            }

            let chunk = Chunk::new(filename, buf[..n].to_vec(), offset, total_size).with_checksum();
            if let Err(e) = call.send_chunk(&chunk).await {
                // The server may have rejected the upload already; its
                // verdict is still worth reading.
                tracing::debug!(filename, offset, error = %e, "chunk not sent");
                break;
            }
            offset += n as i64;
        }

        let reply = expect_message(&mut call).await?;
        call.close().await;
        into_payload(reply, MessageType::UploadResult)
    }

    /// Starts downloading `filename`.
    ///
    /// Fails with a `404` [`RpcError::Remote`] when the file does not exist.
    pub async fn download(&self, filename: &str) -> Result<Download, RpcError> {
        let mut call = self.connect().await?;
        let req = DownloadRequest {
            filename: filename.to_string(),
        };
        call.send_msg(&Message::new(next_id(), MessageType::Download, Some(&req))?)
            .await?;

        let mut download = Download {
            call: Some(call),
            first: None,
            total_size: None,
            next_offset: 0,
        };
        let first = download.receive().await?;
        download.first = Some(first);
        Ok(download)
    }

    /// Downloads `filename` into `dest`, replacing it. Returns the bytes
    /// written.
    ///
    /// Content is staged next to `dest` and renamed over it only once the
    /// last chunk arrives, so a failed download leaves `dest` untouched.
    pub async fn download_to(&self, filename: &str, dest: &Path) -> Result<u64, RpcError> {
        let mut download = self.download(filename).await?;
        let staging = dest.with_file_name(format!(
            "{PARTIAL_PREFIX}{}",
            uuid::Uuid::new_v4().simple()
        ));

        match write_download(&mut download, &staging).await {
            Ok(written) => {
                if let Err(e) = tokio::fs::rename(&staging, dest).await {
                    let _ = tokio::fs::remove_file(&staging).await;
                    return Err(e.into());
                }
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                tracing::debug!(filename, dest = %dest.display(), error = %e, "download discarded");
                Err(e)
            }
        }
    }

    /// Lists the files stored on the server, sorted by name.
    pub async fn list(&self) -> Result<Vec<FileInfo>, RpcError> {
        let mut call = self.connect().await?;
        call.send_msg(&Message::new(
            next_id(),
            MessageType::List,
            Option::<&()>::None,
        )?)
        .await?;
        let reply = expect_message(&mut call).await?;
        call.close().await;
        let list: FileList = into_payload(reply, MessageType::FileList)?;
        Ok(list.files)
    }

    /// Deletes `filename`. Deleting an absent file is not an error; the
    /// response reports `success: false`.
    pub async fn delete(&self, filename: &str) -> Result<DeleteResponse, RpcError> {
        let mut call = self.connect().await?;
        let req = DeleteRequest {
            filename: filename.to_string(),
        };
        call.send_msg(&Message::new(next_id(), MessageType::Delete, Some(&req))?)
            .await?;
        let reply = expect_message(&mut call).await?;
        call.close().await;
        into_payload(reply, MessageType::DeleteResult)
    }
}

/// An in-progress download.
///
/// Chunks are checked for contiguity and checksum as they arrive.
pub struct Download {
    call: Option<ClientCall>,
    first: Option<Chunk>,
    /// Fixed by the first chunk.
    total_size: Option<i64>,
    next_offset: i64,
}

impl Download {
    /// Size of the file as reported by the server.
    pub fn total_size(&self) -> i64 {
        self.total_size.unwrap_or(0)
    }

    /// Returns the next chunk, or `None` after the last one.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, RpcError> {
        if let Some(first) = self.first.take() {
            return Ok(Some(first));
        }
        if self.call.is_none() {
            return Ok(None);
        }
        self.receive().await.map(Some)
    }

    /// Collects the remaining content into memory.
    pub async fn read_to_end(mut self) -> Result<Vec<u8>, RpcError> {
        // The reported size is the server's word; bound the up-front reservation.
        let reserve = usize::try_from(self.total_size())
            .unwrap_or(0)
            .min(WS_MAX_MESSAGE_SIZE);
        let mut data = Vec::with_capacity(reserve);
        while let Some(chunk) = self.next_chunk().await? {
            data.extend_from_slice(&chunk.data);
        }
        Ok(data)
    }

    async fn receive(&mut self) -> Result<Chunk, RpcError> {
        let Some(call) = self.call.as_mut() else {
            return Err(RpcError::Closed);
        };
        let chunk = match call.recv().await? {
            Some(Frame::Chunk(chunk)) => chunk,
            Some(Frame::Message(msg)) => {
                return Err(match msg.error {
                    Some(err) => RpcError::Remote {
                        code: err.code,
                        message: err.message,
                    },
                    None => RpcError::Protocol(format!("unexpected {} during download", msg.msg_type)),
                });
            }
            None => return Err(RpcError::Closed),
        };

        match self.total_size {
            None => self.total_size = Some(chunk.total_size),
            Some(total) if total != chunk.total_size => {
                return Err(RpcError::Protocol(format!(
                    "chunk total size {} differs from {}",
                    chunk.total_size, total
                )));
            }
            Some(_) => {}
        }
        if chunk.offset != self.next_offset {
            return Err(RpcError::Protocol(format!(
                "out-of-order chunk: expected offset {}, got {}",
                self.next_offset, chunk.offset
            )));
        }
        if !chunk.verify_checksum() {
            return Err(RpcError::Protocol(format!(
                "checksum mismatch at offset {}",
                chunk.offset
            )));
        }
        self.next_offset = chunk.end_offset();

        if chunk.is_last {
            if let Some(call) = self.call.take() {
                call.close().await;
            }
        }
        Ok(chunk)
    }
}

async fn write_download(download: &mut Download, path: &Path) -> Result<u64, RpcError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = download.next_chunk().await? {
        file.write_all(&chunk.data).await?;
        written += chunk.data.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

fn next_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Reads until `buf` is full or the reader is exhausted.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn expect_message(call: &mut ClientCall) -> Result<Message, RpcError> {
    match call.recv().await? {
        Some(Frame::Message(msg)) => Ok(msg),
        Some(Frame::Chunk(_)) => Err(RpcError::Protocol("unexpected chunk frame".into())),
        None => Err(RpcError::Closed),
    }
}

/// Extracts the payload of a reply, turning error envelopes into
/// [`RpcError::Remote`].
fn into_payload<T: for<'de> Deserialize<'de>>(
    msg: Message,
    expected: MessageType,
) -> Result<T, RpcError> {
    if let Some(err) = &msg.error {
        return Err(RpcError::Remote {
            code: err.code,
            message: err.message.clone(),
        });
    }
    if msg.msg_type != expected {
        return Err(RpcError::Protocol(format!(
            "expected {expected}, got {}",
            msg.msg_type
        )));
    }
    msg.parse_payload::<T>()?
        .ok_or_else(|| RpcError::Protocol(format!("{expected} without payload")))
}
