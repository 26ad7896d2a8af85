//! ID generation strategies.
//!
//! Every entity type owns one strategy, fixed at registration. Each
//! strategy defines a canonical string form, and ids are canonicalized at
//! every boundary: once stored, exactly one spelling of an id exists.

use crate::error::{EngineError, EngineResult};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// ID generation strategy for an entity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Monotonic per-type counter starting at 1; canonical decimal.
    #[default]
    AutoIncrement,
    /// RFC 4122 v4; canonical lowercase hyphenated.
    Uuid,
    /// Collision-resistant id beginning with `c`.
    Cuid,
    /// Caller-supplied, stored verbatim.
    Custom,
}

impl IdStrategy {
    /// Wire name of the strategy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AutoIncrement => "auto_increment",
            Self::Uuid => "uuid",
            Self::Cuid => "cuid",
            Self::Custom => "custom",
        }
    }

    /// Generates a fresh id, or `None` for strategies that cannot generate
    /// (`custom`, and `auto_increment` whose counter lives in the store).
    #[must_use]
    pub fn generate(self) -> Option<String> {
        match self {
            Self::Uuid => Some(Uuid::new_v4().to_string()),
            Self::Cuid => Some(new_cuid()),
            Self::AutoIncrement | Self::Custom => None,
        }
    }

    /// Validates a caller-supplied id on insert, returning canonical form.
    ///
    /// # Errors
    ///
    /// - `auto_increment`: always fails — the API forbids explicit ids
    ///   under this strategy
    /// - `uuid`: the id must parse as a UUID
    /// - `cuid`: the id must begin with `c`
    /// - `custom`: the id must be non-empty
    pub fn canonicalize_supplied(self, id: &str) -> EngineResult<String> {
        match self {
            Self::AutoIncrement => Err(EngineError::invalid_id(
                "explicit IDs are not allowed with auto_increment generation",
            )),
            Self::Uuid => Uuid::parse_str(id)
                .map(|u| u.to_string())
                .map_err(|_| EngineError::invalid_id(format!("'{id}' is not a valid UUID"))),
            Self::Cuid => {
                if id.starts_with('c') && id.len() > 1 {
                    Ok(id.to_string())
                } else {
                    Err(EngineError::invalid_id(format!(
                        "invalid CUID '{id}': must start with 'c'"
                    )))
                }
            }
            Self::Custom => {
                if id.is_empty() {
                    Err(EngineError::RequiredFieldMissing(
                        "entity ID is required for custom ID generation".into(),
                    ))
                } else {
                    Ok(id.to_string())
                }
            }
        }
    }

    /// Normalizes an incoming id on the lookup path (get/update/delete).
    ///
    /// Guarantees that equivalent client spellings map to the stored key:
    /// auto-increment ids are reparsed and reformatted, UUIDs lowercased,
    /// CUIDs prefix-checked, custom ids passed through verbatim.
    pub fn normalize(self, id: &str) -> EngineResult<String> {
        match self {
            Self::AutoIncrement => {
                let n: u64 = id.parse().map_err(|_| {
                    EngineError::invalid_id(format!("invalid auto-increment ID '{id}'"))
                })?;
                Ok(n.to_string())
            }
            Self::Uuid => Ok(id.to_ascii_lowercase()),
            Self::Cuid => {
                if id.starts_with('c') {
                    Ok(id.to_string())
                } else {
                    Err(EngineError::invalid_id(format!(
                        "invalid CUID '{id}': must start with 'c'"
                    )))
                }
            }
            Self::Custom => Ok(id.to_string()),
        }
    }

    /// Canonical string form for an auto-increment counter value.
    #[must_use]
    pub fn format_auto(n: u64) -> String {
        n.to_string()
    }
}

impl fmt::Display for IdStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide discriminator for CUIDs created in the same millisecond.
static CUID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a CUID: `c` + millisecond timestamp + counter + random block,
/// all base36.
#[must_use]
pub fn new_cuid() -> String {
    let ts = Utc::now().timestamp_millis().max(0) as u64;
    let count = CUID_COUNTER.fetch_add(1, Ordering::Relaxed) % (36u64.pow(4));
    let random: u64 = rand::thread_rng().gen();

    format!(
        "c{}{}{}",
        base36(ts, 8),
        base36(count, 4),
        base36(random % 36u64.pow(8), 8)
    )
}

fn base36(mut n: u64, width: usize) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::with_capacity(width);
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    while out.len() < width {
        out.push(b'0');
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_auto_increment() {
        assert_eq!(IdStrategy::default(), IdStrategy::AutoIncrement);
    }

    #[test]
    fn wire_names() {
        assert_eq!(IdStrategy::AutoIncrement.as_str(), "auto_increment");
        let parsed: IdStrategy = serde_json::from_str("\"auto_increment\"").unwrap();
        assert_eq!(parsed, IdStrategy::AutoIncrement);
    }

    #[test]
    fn uuid_generation_is_canonical() {
        let id = IdStrategy::Uuid.generate().unwrap();
        assert_eq!(id, id.to_ascii_lowercase());
        assert_eq!(id.len(), 36);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn uuid_supplied_ids_are_lowercased() {
        let canonical = IdStrategy::Uuid
            .canonicalize_supplied("550E8400-E29B-41D4-A716-446655440000")
            .unwrap();
        assert_eq!(canonical, "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn uuid_rejects_non_uuid() {
        assert!(IdStrategy::Uuid.canonicalize_supplied("not-a-uuid").is_err());
    }

    #[test]
    fn cuid_generation_starts_with_c() {
        let id = new_cuid();
        assert!(id.starts_with('c'));
        assert!(id.len() > 1);
    }

    #[test]
    fn cuids_are_distinct() {
        let a = new_cuid();
        let b = new_cuid();
        assert_ne!(a, b);
    }

    #[test]
    fn cuid_rejects_wrong_prefix() {
        assert!(IdStrategy::Cuid.canonicalize_supplied("xyz").is_err());
        assert!(IdStrategy::Cuid.normalize("xyz").is_err());
    }

    #[test]
    fn auto_increment_forbids_explicit_ids() {
        let err = IdStrategy::AutoIncrement
            .canonicalize_supplied("7")
            .unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::InvalidId);
    }

    #[test]
    fn auto_increment_normalization_strips_leading_zeros() {
        assert_eq!(IdStrategy::AutoIncrement.normalize("007").unwrap(), "7");
        assert!(IdStrategy::AutoIncrement.normalize("seven").is_err());
        assert!(IdStrategy::AutoIncrement.normalize("-1").is_err());
    }

    #[test]
    fn custom_requires_an_id() {
        assert!(IdStrategy::Custom.canonicalize_supplied("").is_err());
        assert_eq!(
            IdStrategy::Custom.canonicalize_supplied("order-42").unwrap(),
            "order-42"
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        // normalize(canonical) == canonical for every strategy
        let uuid = IdStrategy::Uuid.generate().unwrap();
        assert_eq!(IdStrategy::Uuid.normalize(&uuid).unwrap(), uuid);

        let cuid = IdStrategy::Cuid.generate().unwrap();
        assert_eq!(IdStrategy::Cuid.normalize(&cuid).unwrap(), cuid);

        let auto = IdStrategy::format_auto(12);
        assert_eq!(IdStrategy::AutoIncrement.normalize(&auto).unwrap(), auto);

        assert_eq!(IdStrategy::Custom.normalize("AbC").unwrap(), "AbC");
    }
}
