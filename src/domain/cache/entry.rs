//! Cache record types and their hash representation

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::domain::serialization::CodecId;
use crate::domain::CacheError;

/// Wire form of [`Expiry::Permanent`]
const PERMANENT: &str = "-1";

const FIELD_CID: &str = "cid";
const FIELD_DATA: &str = "data";
const FIELD_CREATED: &str = "created";
const FIELD_EXPIRE: &str = "expire";
const FIELD_TAGS: &str = "tags";
const FIELD_VALID: &str = "valid";
const FIELD_SERIALIZED: &str = "serialized";
const FIELD_CHECKSUM: &str = "checksum";

/// Hash field holding the validity flag of a record
pub const VALID_FIELD: &str = FIELD_VALID;

/// Expiration of a cache record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// Kept until explicitly removed (bounded by the bin's permanent TTL)
    #[default]
    Permanent,
    /// Unix timestamp in seconds
    At(i64),
}

impl Expiry {
    /// Expires `ttl` from now
    pub fn after(ttl: Duration) -> Self {
        Self::At(crate::domain::clock::unix_now().saturating_add(whole_seconds(ttl)))
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }

    /// Whether a record with this expiry is still usable at `now`
    pub fn is_live_at(&self, now: i64) -> bool {
        match self {
            Self::Permanent => true,
            Self::At(timestamp) => *timestamp >= now,
        }
    }

    /// Store TTL in seconds at `now`, capped at `permanent_ttl`
    pub fn ttl_at(&self, now: i64, permanent_ttl: Duration) -> i64 {
        let permanent = whole_seconds(permanent_ttl);

        match self {
            Self::Permanent => permanent,
            Self::At(timestamp) => timestamp.saturating_sub(now).min(permanent),
        }
    }

    fn to_wire(self) -> String {
        match self {
            Self::Permanent => PERMANENT.to_string(),
            Self::At(timestamp) => timestamp.max(0).to_string(),
        }
    }

    fn from_wire(value: &str) -> Result<Self, CacheError> {
        if value == PERMANENT {
            return Ok(Self::Permanent);
        }

        value
            .parse()
            .map(Self::At)
            .map_err(|_| CacheError::contract(format!("Malformed expire field '{}'", value)))
    }
}

/// Value written to or read from a bin
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    /// Plain string, stored as is
    Text(String),
    /// Structured value, stored through the bin's serializer
    Structured(Value),
}

impl CacheValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Self::Text(_) => None,
            Self::Structured(value) => Some(value),
        }
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Value> for CacheValue {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

/// Data as it is kept in the store
#[derive(Debug, Clone, PartialEq)]
pub enum StoredData {
    Raw(String),
    Encoded { bytes: String, codec: CodecId },
}

impl StoredData {
    pub fn is_serialized(&self) -> bool {
        matches!(self, Self::Encoded { .. })
    }

    fn bytes(&self) -> &str {
        match self {
            Self::Raw(bytes) | Self::Encoded { bytes, .. } => bytes,
        }
    }
}

/// One cache record, as stored in a hash keyed by `<prefix>:<bin>:<cid>`
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    pub cid: String,
    pub data: StoredData,
    /// Write time in fractional unix seconds
    pub created: f64,
    pub expire: Expiry,
    pub tags: Vec<String>,
    pub valid: bool,
    /// Aggregate checksum of `tags` at write time
    pub checksum: i64,
}

impl CacheRecord {
    /// Hash fields for the store
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            (FIELD_CID.to_string(), self.cid.clone()),
            (FIELD_DATA.to_string(), self.data.bytes().to_string()),
            (FIELD_CREATED.to_string(), format!("{:.6}", self.created)),
            (FIELD_EXPIRE.to_string(), self.expire.to_wire()),
            (FIELD_TAGS.to_string(), self.tags.join(" ")),
            (FIELD_VALID.to_string(), flag(self.valid).to_string()),
            (
                FIELD_SERIALIZED.to_string(),
                flag(self.data.is_serialized()).to_string(),
            ),
            (FIELD_CHECKSUM.to_string(), self.checksum.to_string()),
        ]
    }

    /// Rebuilds a record from hash fields
    ///
    /// Returns `None` when the hash has no `cid`, which is how an absent key
    /// comes back from the store. Any other missing or malformed field is a
    /// contract violation.
    pub fn from_fields(
        mut fields: HashMap<String, String>,
        codec: CodecId,
    ) -> Result<Option<Self>, CacheError> {
        let cid = match fields.remove(FIELD_CID) {
            Some(cid) if !cid.is_empty() => cid,
            _ => return Ok(None),
        };

        let bytes = take_field(&mut fields, &cid, FIELD_DATA)?;
        let serialized = take_field(&mut fields, &cid, FIELD_SERIALIZED)?;
        let data = if parse_flag(&cid, FIELD_SERIALIZED, &serialized)? {
            StoredData::Encoded { bytes, codec }
        } else {
            StoredData::Raw(bytes)
        };

        let created = take_field(&mut fields, &cid, FIELD_CREATED)?;
        let created = created.parse().map_err(|_| malformed(&cid, FIELD_CREATED, &created))?;

        let expire = Expiry::from_wire(&take_field(&mut fields, &cid, FIELD_EXPIRE)?)?;

        let tags = take_field(&mut fields, &cid, FIELD_TAGS)?
            .split(' ')
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect();

        let valid = take_field(&mut fields, &cid, FIELD_VALID)?;
        let valid = parse_flag(&cid, FIELD_VALID, &valid)?;

        let checksum = take_field(&mut fields, &cid, FIELD_CHECKSUM)?;
        let checksum = checksum
            .parse()
            .map_err(|_| malformed(&cid, FIELD_CHECKSUM, &checksum))?;

        Ok(Some(Self {
            cid,
            data,
            created,
            expire,
            tags,
            valid,
            checksum,
        }))
    }
}

/// A record returned to callers, with its data decoded
#[derive(Debug, Clone, PartialEq)]
pub struct CacheItem {
    pub cid: String,
    pub data: CacheValue,
    pub created: f64,
    pub expire: Expiry,
    pub tags: Vec<String>,
    pub checksum: i64,
    /// False only for items returned by an allow-invalid read
    pub valid: bool,
}

/// One write for [`set_multiple`](super::CacheBackend::set_multiple)
#[derive(Debug, Clone, PartialEq)]
pub struct CacheWrite {
    pub cid: String,
    pub data: CacheValue,
    pub expire: Expiry,
    pub tags: Vec<String>,
}

impl CacheWrite {
    /// Creates a permanent, untagged write
    pub fn new(cid: impl Into<String>, data: impl Into<CacheValue>) -> Self {
        Self {
            cid: cid.into(),
            data: data.into(),
            expire: Expiry::Permanent,
            tags: Vec::new(),
        }
    }

    pub fn with_expire(mut self, expire: Expiry) -> Self {
        self.expire = expire;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Result of a multi-item read: the usable items and the ids still to compute
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipleLookup {
    pub found: HashMap<String, CacheItem>,
    pub missing: Vec<String>,
}

/// Seconds of `duration`, saturating at `i64::MAX`
fn whole_seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

fn take_field(
    fields: &mut HashMap<String, String>,
    cid: &str,
    name: &str,
) -> Result<String, CacheError> {
    fields.remove(name).ok_or_else(|| {
        CacheError::contract(format!("Cache record '{}' has no '{}' field", cid, name))
    })
}

fn parse_flag(cid: &str, name: &str, value: &str) -> Result<bool, CacheError> {
    value
        .parse::<i64>()
        .map(|flag| flag != 0)
        .map_err(|_| malformed(cid, name, value))
}

fn malformed(cid: &str, name: &str, value: &str) -> CacheError {
    CacheError::contract(format!(
        "Cache record '{}' has a malformed '{}' field: '{}'",
        cid, name, value
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: CodecId = CodecId::new("json");

    fn record() -> CacheRecord {
        CacheRecord {
            cid: "front".to_string(),
            data: StoredData::Encoded {
                bytes: "{\"a\":1}".to_string(),
                codec: JSON,
            },
            created: 1_700_000_000.123456,
            expire: Expiry::Permanent,
            tags: vec!["node:5".to_string(), "x-cache-bin:page".to_string()],
            valid: true,
            checksum: 3,
        }
    }

    #[test]
    fn test_expiry_liveness() {
        assert!(Expiry::Permanent.is_live_at(i64::MAX));
        assert!(Expiry::At(100).is_live_at(100));
        assert!(!Expiry::At(99).is_live_at(100));
    }

    #[test]
    fn test_expiry_ttl() {
        let year = Duration::from_secs(31_536_000);

        assert_eq!(Expiry::Permanent.ttl_at(1_000, year), 31_536_000);
        assert_eq!(Expiry::At(1_060).ttl_at(1_000, year), 60);
        assert_eq!(Expiry::At(999).ttl_at(1_000, year), -1);
        assert_eq!(Expiry::At(i64::MAX).ttl_at(1_000, year), 31_536_000);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let now = crate::domain::clock::unix_now();

        assert_eq!(Expiry::after(Duration::from_secs(u64::MAX)), Expiry::At(i64::MAX));
        assert_eq!(Expiry::after(Duration::from_secs(i64::MAX as u64)), Expiry::At(i64::MAX));
        assert!(Expiry::after(Duration::from_secs(60)).is_live_at(now + 59));

        let forever = Duration::from_secs(u64::MAX);
        assert_eq!(Expiry::Permanent.ttl_at(now, forever), i64::MAX);
        assert_eq!(Expiry::At(now + 60).ttl_at(now, forever), 60);
    }

    #[test]
    fn test_permanent_is_not_a_timestamp() {
        assert_eq!(Expiry::from_wire("-1").unwrap(), Expiry::Permanent);
        assert_eq!(Expiry::from_wire("0").unwrap(), Expiry::At(0));
        assert_eq!(Expiry::At(-5).to_wire(), "0");
        assert!(Expiry::from_wire("soon").is_err());
    }

    #[test]
    fn test_record_fields() {
        let fields: HashMap<String, String> = record().to_fields().into_iter().collect();

        assert_eq!(fields["cid"], "front");
        assert_eq!(fields["data"], "{\"a\":1}");
        assert_eq!(fields["created"], "1700000000.123456");
        assert_eq!(fields["expire"], "-1");
        assert_eq!(fields["tags"], "node:5 x-cache-bin:page");
        assert_eq!(fields["valid"], "1");
        assert_eq!(fields["serialized"], "1");
        assert_eq!(fields["checksum"], "3");
    }

    #[test]
    fn test_record_from_fields() {
        let fields = record().to_fields().into_iter().collect();
        let parsed = CacheRecord::from_fields(fields, JSON).unwrap().unwrap();

        assert_eq!(parsed.cid, "front");
        assert_eq!(parsed.tags, vec!["node:5", "x-cache-bin:page"]);
        assert_eq!(parsed.checksum, 3);
        assert!(parsed.data.is_serialized());
        assert!((parsed.created - 1_700_000_000.123456).abs() < 1e-6);
    }

    #[test]
    fn test_raw_data_is_not_serialized() {
        let mut raw = record();
        raw.data = StoredData::Raw("<html>".to_string());

        let fields: HashMap<String, String> = raw.to_fields().into_iter().collect();
        assert_eq!(fields["serialized"], "0");

        let parsed = CacheRecord::from_fields(fields, JSON).unwrap().unwrap();
        assert_eq!(parsed.data, StoredData::Raw("<html>".to_string()));
    }

    #[test]
    fn test_empty_hash_is_absent() {
        let parsed = CacheRecord::from_fields(HashMap::new(), JSON).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn test_malformed_field_is_contract_violation() {
        let mut fields: HashMap<String, String> = record().to_fields().into_iter().collect();
        fields.insert("checksum".to_string(), "abc".to_string());

        let error = CacheRecord::from_fields(fields, JSON).unwrap_err();
        assert!(matches!(error, CacheError::Contract { .. }));
    }

    #[test]
    fn test_missing_field_is_contract_violation() {
        let mut fields: HashMap<String, String> = record().to_fields().into_iter().collect();
        fields.remove("tags");

        let error = CacheRecord::from_fields(fields, JSON).unwrap_err();
        assert!(error.to_string().contains("'tags'"));
    }

    #[test]
    fn test_cache_write_builder() {
        let write = CacheWrite::new("front", "<html>")
            .with_expire(Expiry::At(10))
            .with_tag("node:5");

        assert_eq!(write.data, CacheValue::Text("<html>".to_string()));
        assert_eq!(write.expire, Expiry::At(10));
        assert_eq!(write.tags, vec!["node:5"]);
    }
}
