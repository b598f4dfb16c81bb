//! Legacy store shape conversion
//!
//! Two pre-versioned layouts are recognized and wrapped into the current
//! document on load:
//!
//! - `{chat_id: {url, hash}}`: a single monitor per user
//! - `{chat_id: [{url, hash}, ...]}`: a list of monitors per user
//!
//! Both become a `UserData` whose monitors carry a `version = "legacy"`
//! fingerprint. The migrated view lives in memory until the next write
//! materializes it on disk.

use super::{Fingerprint, Monitor, UserData, SCHEMA_VERSION};
use crate::errors::StoreError;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

const USER_KEYS: [&str; 2] = ["user_config", "monitors"];

/// Returns the in-memory view plus whether anything needed converting.
pub fn migrate(raw: Value) -> Result<(BTreeMap<String, UserData>, bool), StoreError> {
    let Value::Object(mut top) = raw else {
        return Err(StoreError::Serialization {
            reason: "store document is not a JSON object".to_string(),
        });
    };

    let version = top
        .get("schema_version")
        .and_then(Value::as_str)
        .map(str::to_string);
    let mut migrated = version.as_deref() != Some(SCHEMA_VERSION);

    let entries = if version.is_some() {
        match top.remove("data") {
            Some(Value::Object(data)) => data,
            _ => {
                return Err(StoreError::Serialization {
                    reason: "versioned store document has no data map".to_string(),
                })
            }
        }
    } else {
        // Pre-versioned documents are a flat map keyed by chat id.
        top
    };

    let mut out = BTreeMap::new();
    for (chat_id, value) in entries {
        match convert_user(&chat_id, value) {
            Some((user, was_legacy)) => {
                migrated |= was_legacy;
                out.insert(chat_id, user);
            }
            None => migrated = true,
        }
    }
    Ok((out, migrated))
}

fn convert_user(chat_id: &str, value: Value) -> Option<(UserData, bool)> {
    match value {
        Value::Array(items) => {
            let monitors: Vec<Monitor> = items
                .into_iter()
                .filter_map(|item| legacy_monitor(chat_id, item))
                .collect();
            Some((
                UserData {
                    monitors,
                    ..UserData::default()
                },
                true,
            ))
        }
        Value::Object(map) if map.contains_key("url") => {
            let monitor = legacy_monitor(chat_id, Value::Object(map))?;
            Some((
                UserData {
                    monitors: vec![monitor],
                    ..UserData::default()
                },
                true,
            ))
        }
        Value::Object(map) => {
            for key in map.keys() {
                if !USER_KEYS.contains(&key.as_str()) {
                    warn!("dropping unknown key '{}' for chat {}", key, chat_id);
                }
            }
            match serde_json::from_value::<UserData>(Value::Object(map)) {
                Ok(user) => Some((sanitize(user), false)),
                Err(e) => {
                    warn!("dropping malformed entry for chat {}: {}", chat_id, e);
                    None
                }
            }
        }
        _ => {
            warn!("dropping unrecognized entry for chat {}", chat_id);
            None
        }
    }
}

fn legacy_monitor(chat_id: &str, value: Value) -> Option<Monitor> {
    let Value::Object(map) = value else {
        warn!("dropping malformed legacy monitor for chat {}", chat_id);
        return None;
    };
    let Some(url) = map.get("url").and_then(Value::as_str) else {
        warn!("dropping legacy monitor without url for chat {}", chat_id);
        return None;
    };
    let hash = map
        .get("hash")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let mut monitor = Monitor::new(url);
    monitor.fingerprint = Some(Fingerprint {
        hash,
        version: "legacy".to_string(),
        algorithm: "legacy".to_string(),
        content_weights: HashMap::new(),
        structure_signature: String::new(),
    });
    Some(monitor)
}

fn sanitize(mut user: UserData) -> UserData {
    user.user_config = user.user_config.sanitized();
    for monitor in &mut user.monitors {
        if let Some(config) = monitor.config.take() {
            monitor.config = Some(config.sanitized());
        }
    }
    user
}
