//! Normalized content records.
//!
//! `SourceItem` is what the engine yields: the provider's raw hit lifted
//! into a stable shape, with a trustworthy `created_at`. Providers sometimes
//! omit the timestamp or send the `0001-01-01T00:00:00Z` sentinel; in both
//! cases the time is re-derived from the snowflake ID so `created_at`
//! ordering always agrees with ID ordering.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::RawResult;
use crate::snowflake::{SnowflakeId, SNOWFLAKE_EPOCH_MS};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Author {
    fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.username.is_none()
            && self.display_name.is_none()
            && self.url.is_none()
    }
}

/// A normalized content record. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceItem {
    pub external_id: SnowflakeId,
    pub content: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
    /// The untouched provider payload, retained for auditability.
    pub raw: Value,
}

impl SourceItem {
    /// Lift a raw provider hit into a normalized record. Hits without a
    /// parseable ID are dropped (returns `None`) — without an ID there is no
    /// cursor position to resume from.
    pub fn from_raw(raw: RawResult) -> Option<Self> {
        let id = raw.id?;
        let created_at = metadata_created_at(&raw.metadata).unwrap_or_else(|| id.created_at());
        let content_type = raw
            .metadata
            .get("content_type")
            .and_then(Value::as_str)
            .unwrap_or("text")
            .to_string();
        let url = raw
            .metadata
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string);
        let author = Author {
            id: meta_string(&raw.metadata, "user_id"),
            username: meta_string(&raw.metadata, "username"),
            display_name: meta_string(&raw.metadata, "name"),
            url: None,
        };
        let authors = if author.is_empty() {
            Vec::new()
        } else {
            vec![author]
        };

        Some(Self {
            external_id: id,
            content: raw.content,
            content_type,
            created_at,
            url,
            authors,
            raw: raw.raw,
        })
    }

    /// Ascending delivery order: chronological, ID as tie-breaker.
    pub fn sort_key(&self) -> (DateTime<Utc>, SnowflakeId) {
        (self.created_at, self.external_id)
    }
}

/// Sort a batch into delivery order (ascending by time, then ID).
pub fn sort_ascending(items: &mut [SourceItem]) {
    items.sort_by_key(SourceItem::sort_key);
}

fn meta_string(metadata: &Value, key: &str) -> Option<String> {
    match metadata.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Provider timestamp, if present and trustworthy. Anything unparseable or
/// dated before the snowflake epoch (the `0001-01-01` sentinel included) is
/// rejected.
fn metadata_created_at(metadata: &Value) -> Option<DateTime<Utc>> {
    let s = metadata.get("created_at").and_then(Value::as_str)?;
    let ts = DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc);
    let epoch = Utc.timestamp_millis_opt(SNOWFLAKE_EPOCH_MS as i64).single()?;
    if ts < epoch {
        return None;
    }
    Some(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RawResult;
    use serde_json::json;

    fn raw(v: Value) -> RawResult {
        RawResult::from_value(v)
    }

    #[test]
    fn sentinel_timestamp_is_derived_from_id() {
        let item = SourceItem::from_raw(raw(json!({
            "id": "1763069223364739073",
            "source": "twitter",
            "content": "hello",
            "metadata": {"created_at": "0001-01-01T00:00:00Z"}
        })))
        .unwrap();
        // derived from the high bits, not the sentinel
        assert!(item.created_at.timestamp_millis() > SNOWFLAKE_EPOCH_MS as i64);
        assert_eq!(item.created_at, item.external_id.created_at());
    }

    #[test]
    fn valid_provider_timestamp_wins() {
        let item = SourceItem::from_raw(raw(json!({
            "id": "901",
            "content": "x",
            "metadata": {"created_at": "2024-03-01T12:00:00Z"}
        })))
        .unwrap();
        assert_eq!(item.created_at.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn missing_id_drops_the_hit() {
        assert!(SourceItem::from_raw(raw(json!({"content": "x"}))).is_none());
    }

    #[test]
    fn authors_and_url_come_from_metadata() {
        let item = SourceItem::from_raw(raw(json!({
            "id": "901",
            "content": "x",
            "metadata": {
                "username": "fed",
                "user_id": 42,
                "name": "The Fed",
                "url": "https://example.test/901"
            }
        })))
        .unwrap();
        assert_eq!(item.url.as_deref(), Some("https://example.test/901"));
        assert_eq!(item.authors.len(), 1);
        assert_eq!(item.authors[0].username.as_deref(), Some("fed"));
        assert_eq!(item.authors[0].id.as_deref(), Some("42"));
    }

    #[test]
    fn ascending_sort_uses_time_then_id() {
        let mut items: Vec<SourceItem> = [1000u64, 901, 950]
            .iter()
            .map(|id| {
                SourceItem::from_raw(raw(json!({"id": id.to_string(), "content": "x"}))).unwrap()
            })
            .collect();
        sort_ascending(&mut items);
        let ids: Vec<u64> = items.iter().map(|i| i.external_id.get()).collect();
        assert_eq!(ids, vec![901, 950, 1000]);
    }

    #[test]
    fn serializes_with_camel_case_and_string_id() {
        let item = SourceItem::from_raw(raw(json!({"id": "901", "content": "x"}))).unwrap();
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["externalId"], json!("901"));
        assert_eq!(v["contentType"], json!("text"));
        assert!(v.get("raw").is_some());
    }
}
