//! Packaged transmissions and their durable form
//!
//! A [`Transmission`] is the ordered set of records addressed to one
//! destination. It can be materialized to a file for disconnected transfer.
//!
//! ## File Format
//!
//! ```text
//! +----------+-------------------+--------------------------------+
//! | version  | checksum          | payload                        |
//! | (1 byte) | (32 bytes blake3) | zstd(postcard(Transmission))   |
//! +----------+-------------------+--------------------------------+
//! ```
//!
//! The checksum covers the uncompressed postcard payload.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{SyncError, SyncResult};
use crate::types::{RecordId, ServerId, SourceId, SyncRecord, TransmissionId};

/// Current transmission file format version
pub const TRANSMISSION_VERSION: u8 = 1;

/// zstd level for transmission files (level 3 = fast with good compression)
const COMPRESSION_LEVEL: i32 = 3;

const CHECKSUM_SIZE: usize = 32;
const HEADER_SIZE: usize = 1 + CHECKSUM_SIZE;

/// Largest decompressed payload accepted from a transmission file (256 MiB)
pub const MAX_PAYLOAD_SIZE: u64 = 256 * 1024 * 1024;

/// Ordered records addressed from one journal to one destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transmission {
    pub id: TransmissionId,
    pub source_id: SourceId,
    /// Destination, absent for time-window exports to the default peer
    pub target_id: Option<ServerId>,
    pub records: Vec<SyncRecord>,
    /// The destination should answer with a transmission of its own
    pub is_requesting_transmission: bool,
    /// Unix timestamp of creation
    pub created_at: i64,
    pub file_name: String,
}

impl Transmission {
    pub fn new(source_id: SourceId, records: Vec<SyncRecord>, target_id: Option<ServerId>) -> Self {
        let id = TransmissionId::new();
        let created_at = chrono::Utc::now().timestamp();
        Self {
            id,
            source_id,
            target_id,
            records,
            is_requesting_transmission: false,
            created_at,
            file_name: format!("sync_tx_{}_{}.bin", created_at, id.0),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record_ids(&self) -> Vec<RecordId> {
        self.records.iter().map(|r| r.id).collect()
    }

    /// Finish the transmission, writing it to `dir` when `write_file` is set.
    ///
    /// Returns the written path.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidOperation` if a file is requested without a
    /// directory, and propagates encoding and I/O failures.
    pub fn create(&self, write_file: bool, dir: Option<&Path>) -> SyncResult<Option<PathBuf>> {
        if !write_file {
            return Ok(None);
        }
        let dir = dir.ok_or_else(|| {
            SyncError::InvalidOperation("no transmission directory configured".to_string())
        })?;
        self.write_to(dir).map(Some)
    }

    fn payload(&self) -> SyncResult<Vec<u8>> {
        postcard::to_allocvec(self)
            .map_err(|e| SyncError::Serialization(format!("Failed to encode transmission: {}", e)))
    }

    /// Hex blake3 digest of the serialized transmission
    pub fn checksum(&self) -> SyncResult<String> {
        Ok(blake3::hash(&self.payload()?).to_hex().to_string())
    }

    /// Encode to the durable file format
    pub fn encode(&self) -> SyncResult<Vec<u8>> {
        let payload = self.payload()?;
        let checksum = blake3::hash(&payload);
        let compressed = zstd::encode_all(&payload[..], COMPRESSION_LEVEL)
            .map_err(|e| SyncError::Serialization(format!("Compression failed: {}", e)))?;

        let mut bytes = Vec::with_capacity(HEADER_SIZE + compressed.len());
        bytes.push(TRANSMISSION_VERSION);
        bytes.extend_from_slice(checksum.as_bytes());
        bytes.extend_from_slice(&compressed);
        Ok(bytes)
    }

    /// Decode from the durable file format.
    ///
    /// # Errors
    ///
    /// - `SyncError::TransmissionVersionUnsupported` if the version is unknown
    /// - `SyncError::ChecksumMismatch` if the payload was altered
    /// - `SyncError::Serialization` if the bytes are truncated or malformed,
    ///   or decompress to more than [`MAX_PAYLOAD_SIZE`]
    pub fn decode(bytes: &[u8]) -> SyncResult<Self> {
        Self::decode_with_limit(bytes, MAX_PAYLOAD_SIZE)
    }

    fn decode_with_limit(bytes: &[u8], limit: u64) -> SyncResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(SyncError::Serialization(format!(
                "Transmission too short ({} bytes)",
                bytes.len()
            )));
        }
        if bytes[0] != TRANSMISSION_VERSION {
            return Err(SyncError::TransmissionVersionUnsupported(bytes[0]));
        }

        let expected = &bytes[1..HEADER_SIZE];
        let payload = decompress(&bytes[HEADER_SIZE..], limit)?;
        let actual = blake3::hash(&payload);
        if actual.as_bytes() != expected {
            return Err(SyncError::ChecksumMismatch {
                expected: hex::encode(expected),
                actual: actual.to_hex().to_string(),
            });
        }

        postcard::from_bytes(&payload)
            .map_err(|e| SyncError::Serialization(format!("Failed to decode transmission: {}", e)))
    }

    /// Write to `dir/<file_name>`, creating the directory if needed
    pub fn write_to(&self, dir: impl AsRef<Path>) -> SyncResult<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        let bytes = self.encode()?;
        std::fs::write(&path, &bytes)?;
        info!(
            transmission = %self.id,
            path = %path.display(),
            records = self.records.len(),
            size = bytes.len(),
            "Wrote transmission file"
        );
        Ok(path)
    }

    pub fn read_from(path: impl AsRef<Path>) -> SyncResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::decode(&bytes)
    }
}

/// Decompress at most `limit` bytes, rejecting anything larger
fn decompress(compressed: &[u8], limit: u64) -> SyncResult<Vec<u8>> {
    let decoder = zstd::stream::Decoder::new(compressed)
        .map_err(|e| SyncError::Serialization(format!("Decompression failed: {}", e)))?;
    let mut payload = Vec::new();
    decoder
        .take(limit + 1)
        .read_to_end(&mut payload)
        .map_err(|e| SyncError::Serialization(format!("Decompression failed: {}", e)))?;
    if payload.len() as u64 > limit {
        return Err(SyncError::Serialization(format!(
            "Transmission payload exceeds {} bytes",
            limit
        )));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SyncItem, SyncItemState};
    use tempfile::TempDir;

    fn sample() -> Transmission {
        let records = (0..3)
            .map(|i| {
                SyncRecord::new(vec![SyncItem::new(
                    "org.openmrs.Patient",
                    SyncItemState::New,
                    format!("u{}", i),
                    r#"{"name":"org.openmrs.Patient"}"#,
                )])
            })
            .collect();
        Transmission::new(SourceId::new(), records, Some(ServerId::new()))
    }

    #[test]
    fn test_file_name_uses_id() {
        let tx = sample();
        assert!(tx.file_name.starts_with("sync_tx_"));
        assert!(tx.file_name.contains(&tx.id.0.to_string()));
    }

    #[test]
    fn test_encode_decode() {
        let tx = sample();
        let decoded = Transmission::decode(&tx.encode().unwrap()).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut bytes = sample().encode().unwrap();
        bytes[0] = 99;
        assert!(matches!(
            Transmission::decode(&bytes),
            Err(SyncError::TransmissionVersionUnsupported(99))
        ));
    }

    #[test]
    fn test_decode_detects_tampered_checksum() {
        let mut bytes = sample().encode().unwrap();
        bytes[1] ^= 0xff;
        assert!(matches!(
            Transmission::decode(&bytes),
            Err(SyncError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_truncated() {
        assert!(matches!(
            Transmission::decode(&[TRANSMISSION_VERSION, 1, 2]),
            Err(SyncError::Serialization(_))
        ));
    }

    #[test]
    fn test_create_without_file() {
        let tx = sample();
        assert_eq!(tx.create(false, None).unwrap(), None);
    }

    #[test]
    fn test_create_requires_directory() {
        let tx = sample();
        assert!(matches!(
            tx.create(true, None),
            Err(SyncError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_write_and_read_file() {
        let temp = TempDir::new().unwrap();
        let tx = sample();

        let outbox = temp.path().join("outbox");
        let path = tx.create(true, Some(outbox.as_path())).unwrap().unwrap();
        assert!(path.exists());

        let loaded = Transmission::read_from(&path).unwrap();
        assert_eq!(loaded, tx);
        assert_eq!(loaded.checksum().unwrap(), tx.checksum().unwrap());
    }

    #[test]
    fn test_decode_rejects_oversized_payload() {
        let tx = sample();
        let bytes = tx.encode().unwrap();

        let result = Transmission::decode_with_limit(&bytes, 16);
        match result {
            Err(SyncError::Serialization(msg)) => assert!(msg.contains("exceeds 16 bytes")),
            other => panic!("expected oversized payload error, got {:?}", other),
        }
        assert_eq!(Transmission::decode(&bytes).unwrap(), tx);
    }
}
