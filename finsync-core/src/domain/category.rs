//! Category domain model

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::{impl_sync_record, RecordMeta};

/// Transaction category.
///
/// Default categories ship with every install and are never synced; only
/// user-created ones travel between devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(flatten)]
    pub meta: RecordMeta,
}

impl Category {
    /// A user-created category
    pub fn custom(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            icon: None,
            color: None,
            is_default: false,
            meta: RecordMeta::now(),
        }
    }

    /// A built-in category
    pub fn default_category(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            icon: None,
            color: None,
            is_default: true,
            meta: RecordMeta::default(),
        }
    }
}

impl_sync_record!(Category);

/// Split categories into (default, user-created), preserving order
pub fn partition_defaults(categories: &[Category]) -> (Vec<Category>, Vec<Category>) {
    categories.iter().cloned().partition(|c| c.is_default)
}

/// Categories to store when importing `incoming` over `current`.
///
/// User categories come from `incoming`. Default categories always come from
/// `current`: incoming defaults are swapped for the local version or dropped
/// when unknown, and local defaults missing from `incoming` are appended.
pub fn with_local_defaults(current: &[Category], incoming: &[Category]) -> Vec<Category> {
    let local_defaults: HashMap<Uuid, &Category> = current
        .iter()
        .filter(|c| c.is_default)
        .map(|c| (c.id, c))
        .collect();

    let mut result: Vec<Category> = incoming
        .iter()
        .filter_map(|c| {
            if c.is_default {
                local_defaults.get(&c.id).map(|local| (*local).clone())
            } else if local_defaults.contains_key(&c.id) {
                None
            } else {
                Some(c.clone())
            }
        })
        .collect();

    for default in current.iter().filter(|c| c.is_default) {
        if !result.iter().any(|c| c.id == default.id) {
            result.push(default.clone());
        }
    }
    result
}
