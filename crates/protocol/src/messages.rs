//! Payloads carried inside call envelopes.

use serde::{Deserialize, Serialize};

/// Opens an upload call. Chunk frames follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub filename: String,
    pub total_size: i64,
}

/// Outcome of an upload call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    /// Bytes stored on success, bytes received before the failure otherwise.
    pub file_size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// A stored file as reported by `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub filename: String,
    pub size: i64,
    /// Unix timestamp (seconds).
    pub modified_time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<FileInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_request_uses_camel_case() {
        let req = UploadRequest {
            filename: "a.bin".into(),
            total_size: 42,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["totalSize"], 42);
    }

    #[test]
    fn negative_total_size_survives_parsing() {
        // Rejected by the handler, not by serde, so the peer gets a reason.
        let req: UploadRequest =
            serde_json::from_str(r#"{"filename":"a","totalSize":-5}"#).unwrap();
        assert_eq!(req.total_size, -5);
    }

    #[test]
    fn file_list_defaults_to_empty() {
        let list: FileList = serde_json::from_str("{}").unwrap();
        assert!(list.files.is_empty());
    }

    #[test]
    fn file_info_fields() {
        let info = FileInfo {
            filename: "b".into(),
            size: 0,
            modified_time: 1_700_000_000,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["modifiedTime"], 1_700_000_000i64);
        assert_eq!(json["size"], 0);
    }
}
