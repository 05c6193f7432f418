//! Shared record metadata and the trait the merge engine works against

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Modification timestamps carried by every synchronizable record.
///
/// Older clients wrote `updatedAt` instead of `lastModified`, and some records
/// only ever had `createdAt`. All three are kept so tie-breaking can fall back
/// through them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl RecordMeta {
    /// Metadata for a record created right now
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            last_modified: Some(now),
            updated_at: None,
            created_at: Some(now),
        }
    }

    /// Metadata with only an explicit modification time
    pub fn modified_at(at: DateTime<Utc>) -> Self {
        Self {
            last_modified: Some(at),
            updated_at: None,
            created_at: None,
        }
    }

    /// Mark the record as modified now
    pub fn touch(&mut self) {
        self.last_modified = Some(Utc::now());
    }

    /// Timestamp used for last-writer-wins, in milliseconds since the epoch.
    ///
    /// Precedence: `lastModified`, then `updatedAt`, then `createdAt`, then 0.
    pub fn merge_timestamp(&self) -> i64 {
        self.last_modified
            .or(self.updated_at)
            .or(self.created_at)
            .map(|t| t.timestamp_millis())
            .unwrap_or(0)
    }
}

/// A record that can take part in a snapshot merge
pub trait SyncRecord: Clone {
    /// Globally unique, device-independent identifier
    fn id(&self) -> Uuid;

    fn meta(&self) -> &RecordMeta;

    fn merge_timestamp(&self) -> i64 {
        self.meta().merge_timestamp()
    }
}

/// Implement `SyncRecord` for a struct with `id: Uuid` and `meta: RecordMeta` fields
macro_rules! impl_sync_record {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::domain::record::SyncRecord for $ty {
                fn id(&self) -> uuid::Uuid {
                    self.id
                }

                fn meta(&self) -> &$crate::domain::record::RecordMeta {
                    &self.meta
                }
            }
        )+
    };
}

pub(crate) use impl_sync_record;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_last_modified_takes_precedence() {
        let meta = RecordMeta {
            last_modified: Some(ts(30)),
            updated_at: Some(ts(20)),
            created_at: Some(ts(10)),
        };
        assert_eq!(meta.merge_timestamp(), 30);
    }

    #[test]
    fn test_falls_back_to_updated_then_created() {
        let meta = RecordMeta {
            last_modified: None,
            updated_at: Some(ts(20)),
            created_at: Some(ts(10)),
        };
        assert_eq!(meta.merge_timestamp(), 20);

        let meta = RecordMeta {
            last_modified: None,
            updated_at: None,
            created_at: Some(ts(10)),
        };
        assert_eq!(meta.merge_timestamp(), 10);
    }

    #[test]
    fn test_missing_timestamps_are_zero() {
        assert_eq!(RecordMeta::default().merge_timestamp(), 0);
    }

    #[test]
    fn test_legacy_field_names_deserialize() {
        let meta: RecordMeta =
            serde_json::from_str(r#"{"updatedAt":"2024-01-01T00:00:00Z"}"#).unwrap();
        assert!(meta.last_modified.is_none());
        assert_eq!(meta.merge_timestamp(), 1_704_067_200_000);
    }
}
