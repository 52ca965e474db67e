//! Splits outgoing messages larger than `max_message_bytes` into `chunk_bytes`
//! pieces with a `{chunk_id, index, total, sha256}` envelope the receiver uses to
//! reassemble and verify before parsing (§4.10).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkEnvelope {
    pub chunk_id: String,
    pub index: u32,
    pub total: u32,
    pub sha256: String,
    /// Base64 would hide the payload shape from log inspection; hex keeps chunked
    /// JSON messages at least eyeballable in a pcap or log line.
    pub data_hex: String,
}

/// Splits `payload` into `ChunkEnvelope`s of at most `chunk_bytes` each, only if it
/// exceeds `max_message_bytes`; otherwise returns `None` so the caller sends the
/// message whole.
pub fn chunk_if_needed(chunk_id: &str, payload: &[u8], max_message_bytes: usize, chunk_bytes: usize) -> Option<Vec<ChunkEnvelope>> {
    if payload.len() <= max_message_bytes {
        return None;
    }

    let total = payload.len().div_ceil(chunk_bytes) as u32;
    Some(
        payload
            .chunks(chunk_bytes)
            .enumerate()
            .map(|(index, piece)| {
                let sha256 = format!("{:x}", Sha256::digest(piece));
                ChunkEnvelope {
                    chunk_id: chunk_id.to_string(),
                    index: index as u32,
                    total,
                    sha256,
                    data_hex: hex::encode(piece),
                }
            })
            .collect(),
    )
}

/// Reassembles chunks (assumed already grouped by `chunk_id` and sorted by
/// `index`) into the original payload, verifying each chunk's hash first.
pub fn reassemble(chunks: &[ChunkEnvelope]) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    for chunk in chunks {
        let bytes = hex::decode(&chunk.data_hex).map_err(|e| e.to_string())?;
        let digest = format!("{:x}", Sha256::digest(&bytes));
        if digest != chunk.sha256 {
            return Err(format!("chunk {} failed hash verification", chunk.index));
        }
        out.extend_from_slice(&bytes);
    }
    Ok(out)
}
