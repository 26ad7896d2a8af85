//! WAL record types and framing.
//!
//! On-disk layout of one record:
//!
//! ```text
//! magic (4) | version (2) | op (1) | flags (1) | body len (4) | body | crc32 (4)
//! ```
//!
//! The CRC covers everything before it. The body is the JSON encoding of
//! the mutation; when flag bit 0 is set, the body bytes are
//! zstd-compressed.

use crate::error::{EngineError, EngineResult};
use crate::value::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Magic bytes identifying a WAL record.
pub const WAL_MAGIC: [u8; 4] = *b"SWAL";

/// Current WAL format version.
pub const WAL_VERSION: u16 = 1;

/// Flag bit: the body is zstd-compressed.
pub const FLAG_COMPRESSED: u8 = 0b0000_0001;

/// Operation kind of a WAL record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalOp {
    /// Entity insertion.
    Insert = 1,
    /// Entity patch.
    Update = 2,
    /// Entity removal.
    Delete = 3,
}

impl WalOp {
    /// Parses an op byte. Unknown bytes are a recovery-aborting error.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Insert),
            2 => Some(Self::Update),
            3 => Some(Self::Delete),
            _ => None,
        }
    }

    /// The wire byte for this op.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A logged mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum WalRecord {
    /// A full entity insertion (fields include internal timestamps).
    Insert {
        /// Owning entity type.
        entity_type: String,
        /// Canonical id.
        id: String,
        /// Complete field map.
        fields: BTreeMap<String, FieldValue>,
    },
    /// A patch: only the changed keys, plus the refreshed update stamp.
    Update {
        /// Owning entity type.
        entity_type: String,
        /// Canonical id.
        id: String,
        /// Patched keys only.
        fields: BTreeMap<String, FieldValue>,
    },
    /// An entity removal.
    Delete {
        /// Owning entity type.
        entity_type: String,
        /// Canonical id.
        id: String,
    },
}

/// Serde shape of a record body. Self-describing field values keep replay
/// independent of schema state.
#[derive(Serialize, Deserialize)]
struct RecordBody {
    #[serde(rename = "type")]
    entity_type: String,
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<BTreeMap<String, FieldValue>>,
}

impl WalRecord {
    /// The op kind of this record.
    #[must_use]
    pub fn op(&self) -> WalOp {
        match self {
            Self::Insert { .. } => WalOp::Insert,
            Self::Update { .. } => WalOp::Update,
            Self::Delete { .. } => WalOp::Delete,
        }
    }

    /// The entity type this record touches.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        match self {
            Self::Insert { entity_type, .. }
            | Self::Update { entity_type, .. }
            | Self::Delete { entity_type, .. } => entity_type,
        }
    }

    /// The canonical id this record touches.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Insert { id, .. } | Self::Update { id, .. } | Self::Delete { id, .. } => id,
        }
    }

    /// Serializes the record body (uncompressed JSON).
    pub fn encode_body(&self) -> EngineResult<Vec<u8>> {
        let body = match self {
            Self::Insert {
                entity_type,
                id,
                fields,
            }
            | Self::Update {
                entity_type,
                id,
                fields,
            } => RecordBody {
                entity_type: entity_type.clone(),
                id: id.clone(),
                fields: Some(fields.clone()),
            },
            Self::Delete { entity_type, id } => RecordBody {
                entity_type: entity_type.clone(),
                id: id.clone(),
                fields: None,
            },
        };
        serde_json::to_vec(&body)
            .map_err(|e| EngineError::internal(format!("WAL body encoding failed: {e}")))
    }

    /// Deserializes a record from its op kind and body bytes.
    pub fn decode_body(op: WalOp, bytes: &[u8]) -> EngineResult<Self> {
        let body: RecordBody = serde_json::from_slice(bytes)
            .map_err(|e| EngineError::WalCorruption(format!("undecodable record body: {e}")))?;

        match op {
            WalOp::Insert => Ok(Self::Insert {
                entity_type: body.entity_type,
                id: body.id,
                fields: body.fields.ok_or_else(|| {
                    EngineError::WalCorruption("insert record without fields".into())
                })?,
            }),
            WalOp::Update => Ok(Self::Update {
                entity_type: body.entity_type,
                id: body.id,
                fields: body.fields.ok_or_else(|| {
                    EngineError::WalCorruption("update record without fields".into())
                })?,
            }),
            WalOp::Delete => Ok(Self::Delete {
                entity_type: body.entity_type,
                id: body.id,
            }),
        }
    }
}

/// CRC32 (IEEE polynomial) over `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ TABLE[index];
    }
    !crc
}
