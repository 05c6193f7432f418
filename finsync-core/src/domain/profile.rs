//! User profile domain model

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// User profile record.
///
/// Fields the core does not know about are kept in `extra` so that a newer
/// client's settings survive a round trip through an older one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_income: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl UserProfile {
    /// Shallow field-wise merge: fields present on `remote` overlay `self`,
    /// except `last_modified`, which becomes the later of the two.
    pub fn overlay(&self, remote: &UserProfile) -> UserProfile {
        let mut extra = self.extra.clone();
        extra.extend(remote.extra.iter().map(|(k, v)| (k.clone(), v.clone())));

        UserProfile {
            display_name: remote.display_name.clone().or_else(|| self.display_name.clone()),
            currency: remote.currency.clone().or_else(|| self.currency.clone()),
            monthly_income: remote.monthly_income.or(self.monthly_income),
            last_modified: self.last_modified.max(remote.last_modified),
            extra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_overlay_prefers_remote_fields() {
        let local = UserProfile {
            display_name: Some("Sam".into()),
            currency: Some("USD".into()),
            monthly_income: Some(Decimal::new(4000, 0)),
            last_modified: Some(Utc.timestamp_millis_opt(2_000).unwrap()),
            extra: BTreeMap::new(),
        };
        let remote = UserProfile {
            display_name: None,
            currency: Some("EUR".into()),
            monthly_income: None,
            last_modified: Some(Utc.timestamp_millis_opt(1_000).unwrap()),
            extra: BTreeMap::new(),
        };

        let merged = local.overlay(&remote);
        assert_eq!(merged.display_name.as_deref(), Some("Sam"));
        assert_eq!(merged.currency.as_deref(), Some("EUR"));
        assert_eq!(merged.monthly_income, Some(Decimal::new(4000, 0)));
        // Later timestamp wins even though remote fields overlay
        assert_eq!(merged.last_modified, local.last_modified);
    }

    #[test]
    fn test_unknown_fields_survive() {
        let profile: UserProfile =
            serde_json::from_str(r#"{"displayName":"Ana","theme":"dark"}"#).unwrap();
        assert_eq!(profile.extra["theme"], "dark");

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["theme"], "dark");
    }

    #[test]
    fn test_overlay_with_itself_is_identity() {
        let mut profile = UserProfile::default();
        profile.display_name = Some("Kim".into());
        profile
            .extra
            .insert("locale".into(), serde_json::Value::String("de".into()));
        assert_eq!(profile.overlay(&profile), profile);
    }
}
