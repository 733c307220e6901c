//! Binary chunk frames: 4-byte big-endian header length + JSON header + raw payload.

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::error::DecodeError;

/// JSON header preceding the payload of a chunk frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkHeader {
    pub filename: String,
    pub offset: i64,
    pub total_size: i64,
    pub is_last: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
}

/// Encodes a chunk as a binary frame.
///
/// Wire format: `[4 bytes: header_len (big-endian)][header_len bytes: JSON][rest: payload]`
pub fn encode_chunk(chunk: &Chunk) -> Result<Vec<u8>, serde_json::Error> {
    let header = ChunkHeader {
        filename: chunk.filename.clone(),
        offset: chunk.offset,
        total_size: chunk.total_size,
        is_last: chunk.is_last,
        checksum: chunk.checksum.clone(),
    };
    let header_json = serde_json::to_vec(&header)?;
    let header_len = header_json.len() as u32;

    let mut buf = Vec::with_capacity(4 + header_json.len() + chunk.data.len());
    buf.extend_from_slice(&header_len.to_be_bytes());
    buf.extend_from_slice(&header_json);
    buf.extend_from_slice(&chunk.data);
    Ok(buf)
}

/// Parses a binary frame back into a [`Chunk`].
///
/// Rejects frames whose `isLast` flag disagrees with the position,
/// negative offsets or sizes, and offsets whose end overflows.
pub fn decode_chunk(data: &[u8]) -> Result<Chunk, DecodeError> {
    if data.len() < 4 {
        return Err(DecodeError::TooShort);
    }

    let header_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;

    if data.len() - 4 < header_len {
        return Err(DecodeError::HeaderTruncated {
            expected: header_len,
            got: data.len() - 4,
        });
    }

    let header_bytes = &data[4..4 + header_len];
    let payload = data[4 + header_len..].to_vec();

    let header: ChunkHeader = serde_json::from_slice(header_bytes)
        .map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    if header.offset < 0 || header.total_size < 0 {
        return Err(DecodeError::Inconsistent(format!(
            "negative offset or size (offset {}, total {})",
            header.offset, header.total_size
        )));
    }

    let end = i64::try_from(payload.len())
        .ok()
        .and_then(|len| header.offset.checked_add(len))
        .ok_or_else(|| {
            DecodeError::Inconsistent(format!(
                "offset {} with {} bytes overflows",
                header.offset,
                payload.len()
            ))
        })?;
    let is_last = end >= header.total_size;
    if is_last != header.is_last {
        return Err(DecodeError::Inconsistent(format!(
            "isLast={} at offset {} with {} bytes of {}",
            header.is_last,
            header.offset,
            payload.len(),
            header.total_size
        )));
    }

    Ok(Chunk {
        filename: header.filename,
        data: payload,
        offset: header.offset,
        total_size: header.total_size,
        is_last: header.is_last,
        checksum: header.checksum,
    })
}
