//! Handler trait for processing calls.
//!
//! The server reads the opening envelope and hands the call to the
//! matching method; the handler owns the rest of the exchange.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, info, warn};

use ferry_protocol::messages::{
    DeleteRequest, DeleteResponse, DownloadRequest, FileInfo, FileList, UploadRequest,
    UploadResponse,
};
use ferry_protocol::{DEFAULT_CHUNK_SIZE, ErrorKind, Message, MessageType, WsError};
use ferry_storage::{DeleteOutcome, Storage, StorageError, StoredFile};
use ferry_transfer::{ChunkReader, TransferError, UploadSession};

use crate::call::{Call, Frame};
use crate::{NOT_IMPLEMENTED, RpcError};

/// A boxed future returned by handler methods.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), RpcError>> + Send + 'a>>;

/// Operations offered over the call framing.
///
/// Each method receives the call and its opening envelope. Default
/// implementations reply with "not implemented" so handlers only need to
/// override the operations they support.
pub trait Handler: Send + Sync + 'static {
    /// `upload`: chunk frames follow the envelope.
    fn on_upload<'a>(&'a self, call: &'a mut Call, msg: Message) -> HandlerFuture<'a> {
        Box::pin(not_implemented(call, msg))
    }

    /// `download`: reply with chunk frames.
    fn on_download<'a>(&'a self, call: &'a mut Call, msg: Message) -> HandlerFuture<'a> {
        Box::pin(not_implemented(call, msg))
    }

    fn on_list<'a>(&'a self, call: &'a mut Call, msg: Message) -> HandlerFuture<'a> {
        Box::pin(not_implemented(call, msg))
    }

    fn on_delete<'a>(&'a self, call: &'a mut Call, msg: Message) -> HandlerFuture<'a> {
        Box::pin(not_implemented(call, msg))
    }
}

async fn not_implemented(call: &mut Call, msg: Message) -> Result<(), RpcError> {
    let reply = Message {
        id: msg.id.clone(),
        msg_type: MessageType::Error,
        payload: None,
        error: Some(WsError {
            code: NOT_IMPLEMENTED,
            message: format!("{} not implemented", msg.msg_type),
        }),
    };
    call.send_msg(&reply).await
}

/// Parses the envelope payload, answering `400` when it is missing or
/// does not match `T`.
async fn request<T: for<'de> serde::Deserialize<'de>>(
    call: &mut Call,
    msg: &Message,
) -> Result<Option<T>, RpcError> {
    let reason = match msg.parse_payload::<T>() {
        Ok(Some(req)) => return Ok(Some(req)),
        Ok(None) => format!("{} requires a payload", msg.msg_type),
        Err(e) => format!("invalid {} payload: {e}", msg.msg_type),
    };
    warn!(peer = ?call.peer(), %reason, "rejected call");
    call.send_msg(&msg.reply_error(ErrorKind::MalformedRequest, reason))
        .await?;
    Ok(None)
}

/// Handler backed by a [`Storage`] root.
#[derive(Debug, Clone)]
pub struct StorageHandler {
    storage: Storage,
    chunk_size: usize,
}

impl StorageHandler {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the largest chunk accepted on upload and produced on download.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    async fn upload(&self, call: &mut Call, msg: Message) -> Result<(), RpcError> {
        let Some(req) = request::<UploadRequest>(call, &msg).await? else {
            return Ok(());
        };
        let peer = call.peer();

        let session = match UploadSession::begin(
            &self.storage,
            &req.filename,
            req.total_size,
            self.chunk_size,
        )
        .await
        {
            Ok(s) => s,
            Err(e) => {
                warn!(?peer, filename = %req.filename, error = %e, "rejected upload");
                return send_upload_result(call, &msg, Err((e, 0))).await;
            }
        };

        let outcome = receive_chunks(call, session).await;
        match &outcome {
            Ok(stored) => {
                info!(?peer, filename = %stored.filename, size = stored.size, "file received");
            }
            Err((e, received)) => {
                warn!(?peer, filename = %req.filename, received, error = %e, "upload failed");
            }
        }
        send_upload_result(call, &msg, outcome.map(|s| (s.filename, s.size))).await
    }

    async fn download(&self, call: &mut Call, msg: Message) -> Result<(), RpcError> {
        let Some(req) = request::<DownloadRequest>(call, &msg).await? else {
            return Ok(());
        };

        let mut reader =
            match ChunkReader::open(&self.storage, &req.filename, self.chunk_size).await {
                Ok(r) => r,
                Err(e) => {
                    debug!(peer = ?call.peer(), filename = %req.filename, error = %e, "download refused");
                    return call.send_msg(&msg.reply_error(e.kind(), e.reason())).await;
                }
            };

        loop {
            match reader.next_chunk().await {
                Ok(Some(chunk)) => call.send_chunk(&chunk).await?,
                Ok(None) => return Ok(()),
                Err(e) => {
                    warn!(peer = ?call.peer(), filename = %req.filename, error = %e, "download failed");
                    return call.send_msg(&msg.reply_error(e.kind(), e.reason())).await;
                }
            }
        }
    }

    async fn list(&self, call: &mut Call, msg: Message) -> Result<(), RpcError> {
        let files = match self.storage.list().await {
            Ok(files) => files,
            Err(e) => {
                let e = TransferError::from(e);
                return call.send_msg(&msg.reply_error(e.kind(), e.reason())).await;
            }
        };

        let list = FileList {
            files: files
                .iter()
                .map(|f| FileInfo {
                    filename: f.filename.clone(),
                    size: f.size as i64,
                    modified_time: f.modified_unix(),
                })
                .collect(),
        };
        debug!(peer = ?call.peer(), count = list.files.len(), "listed files");
        call.send_msg(&msg.reply(MessageType::FileList, Some(&list))?)
            .await
    }

    async fn delete(&self, call: &mut Call, msg: Message) -> Result<(), RpcError> {
        let Some(req) = request::<DeleteRequest>(call, &msg).await? else {
            return Ok(());
        };

        let response = match self.storage.delete(&req.filename).await {
            Ok(DeleteOutcome::Deleted) => DeleteResponse {
                success: true,
                message: format!("File {} deleted successfully", req.filename),
            },
            Ok(DeleteOutcome::NotFound) => DeleteResponse {
                success: false,
                message: format!("file not found: {}", req.filename),
            },
            Err(StorageError::InvalidName(reason)) => DeleteResponse {
                success: false,
                message: format!("invalid filename: {reason}"),
            },
            Err(e) => {
                warn!(peer = ?call.peer(), filename = %req.filename, error = %e, "delete failed");
                DeleteResponse {
                    success: false,
                    message: format!("failed to delete: {e}"),
                }
            }
        };
        call.send_msg(&msg.reply(MessageType::DeleteResult, Some(&response))?)
            .await
    }
}

impl Handler for StorageHandler {
    fn on_upload<'a>(&'a self, call: &'a mut Call, msg: Message) -> HandlerFuture<'a> {
        Box::pin(self.upload(call, msg))
    }

    fn on_download<'a>(&'a self, call: &'a mut Call, msg: Message) -> HandlerFuture<'a> {
        Box::pin(self.download(call, msg))
    }

    fn on_list<'a>(&'a self, call: &'a mut Call, msg: Message) -> HandlerFuture<'a> {
        Box::pin(self.list(call, msg))
    }

    fn on_delete<'a>(&'a self, call: &'a mut Call, msg: Message) -> HandlerFuture<'a> {
        Box::pin(self.delete(call, msg))
    }
}

/// Feeds chunk frames into `session` until it completes or the client
/// stops. On failure, returns the error and the bytes received.
async fn receive_chunks(
    call: &mut Call,
    mut session: UploadSession,
) -> Result<StoredFile, (TransferError, i64)> {
    while !session.is_complete() {
        let received = session.transfer().bytes_moved();
        let failure = match call.recv().await {
            Ok(Some(Frame::Chunk(chunk))) => match session.accept(&chunk).await {
                Ok(()) => continue,
                Err(e) => e,
            },
            Ok(Some(Frame::Message(m))) if m.msg_type == MessageType::UploadEnd => break,
            Ok(Some(Frame::Message(m))) => {
                TransferError::Malformed(format!("unexpected {} during upload", m.msg_type))
            }
            Ok(None) => break,
            Err(RpcError::Decode(e)) => TransferError::Malformed(e.to_string()),
            Err(e) => TransferError::Transport(e.to_string()),
        };
        session.abort().await;
        return Err((failure, received));
    }

    let received = session.transfer().bytes_moved();
    session.finish().await.map_err(|e| (e, received))
}

async fn send_upload_result(
    call: &mut Call,
    msg: &Message,
    outcome: Result<(String, u64), (TransferError, i64)>,
) -> Result<(), RpcError> {
    let response = match outcome {
        Ok((filename, size)) => UploadResponse {
            success: true,
            message: format!("File {filename} received successfully ({size} bytes)"),
            file_size: size as i64,
        },
        Err((e, received)) => UploadResponse {
            success: false,
            message: e.reason(),
            file_size: received,
        },
    };
    call.send_msg(&msg.reply(MessageType::UploadResult, Some(&response))?)
        .await
}
