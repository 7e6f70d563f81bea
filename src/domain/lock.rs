//! The lock record backing the distributed deployment semaphore.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::id::HolderToken;

const HELD_KEY: &str = "held";
const HOLDER_KEY: &str = "holder";
const ACQUIRED_AT_KEY: &str = "acquired-at";

/// State of the environment-wide deployment lock.
///
/// Stored as the data of a single config object; never deleted, only reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockRecord {
    pub held: bool,
    pub holder: Option<String>,
    pub acquired_at: Option<DateTime<Utc>>,
}

impl LockRecord {
    /// An unheld lock.
    #[must_use]
    pub fn cleared() -> Self {
        Self::default()
    }

    /// A lock held by `token` since `now`.
    #[must_use]
    pub fn claimed(token: &HolderToken, now: DateTime<Utc>) -> Self {
        Self {
            held: true,
            holder: Some(token.as_str().to_string()),
            acquired_at: Some(now),
        }
    }

    /// Decode from config-object data. Unknown or missing keys read as unheld.
    #[must_use]
    pub fn from_data(data: &BTreeMap<String, String>) -> Self {
        let held = data
            .get(HELD_KEY)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
        let holder = data.get(HOLDER_KEY).filter(|v| !v.is_empty()).cloned();
        let acquired_at = data
            .get(ACQUIRED_AT_KEY)
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|t| t.with_timezone(&Utc));
        Self {
            held,
            holder,
            acquired_at,
        }
    }

    /// Encode as config-object data.
    #[must_use]
    pub fn to_data(&self) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();
        data.insert(HELD_KEY.to_string(), self.held.to_string());
        if let Some(holder) = &self.holder {
            data.insert(HOLDER_KEY.to_string(), holder.clone());
        }
        if let Some(at) = self.acquired_at {
            data.insert(ACQUIRED_AT_KEY.to_string(), at.to_rfc3339());
        }
        data
    }

    /// Whether `token` is the current holder.
    #[must_use]
    pub fn is_held_by(&self, token: &HolderToken) -> bool {
        self.held && self.holder.as_deref() == Some(token.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn data_round_trip() {
        let token = HolderToken::new("t-1");
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let record = LockRecord::claimed(&token, now);
        let decoded = LockRecord::from_data(&record.to_data());
        assert_eq!(decoded, record);
        assert!(decoded.is_held_by(&token));
        assert!(!decoded.is_held_by(&HolderToken::new("other")));
    }

    #[test]
    fn missing_or_garbage_data_reads_unheld() {
        assert_eq!(LockRecord::from_data(&BTreeMap::new()), LockRecord::cleared());

        let mut data = BTreeMap::new();
        data.insert("held".to_string(), "maybe".to_string());
        data.insert("acquired-at".to_string(), "yesterday".to_string());
        let record = LockRecord::from_data(&data);
        assert!(!record.held);
        assert!(record.acquired_at.is_none());
    }

    #[test]
    fn cleared_record_only_stores_flag() {
        let data = LockRecord::cleared().to_data();
        assert_eq!(data.len(), 1);
        assert_eq!(data.get("held").map(String::as_str), Some("false"));
    }
}
