//! Migration chain for older save versions
//!
//! Keyed by source version; each step lifts a document one version. The
//! loader walks the chain until the document reaches the current format,
//! then deserializes. Checksums are re-verified against the migrated form
//! only for documents that were already current; older saves predate the
//! current canonical form, so their checksum is recomputed after migration.

use crate::format::SAVE_FORMAT_VERSION;
use crate::io::SaveError;
use serde_json::{json, Value};
use tracing::info;

/// Lift a save document to the current version in place.
pub fn migrate_to_current(document: &mut Value) -> Result<(), SaveError> {
    loop {
        let version = document
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| SaveError::Corrupt("missing version field".to_string()))?
            as u32;

        if version == SAVE_FORMAT_VERSION {
            return Ok(());
        }
        if version > SAVE_FORMAT_VERSION {
            return Err(SaveError::UnsupportedVersion(version));
        }

        info!(from = version, to = version + 1, "migrating save");
        match version {
            1 => migrate_v1_to_v2(document)?,
            2 => migrate_v2_to_v3(document)?,
            other => return Err(SaveError::UnsupportedVersion(other)),
        }
    }
}

/// v1 predates the quest log and recorded player choices.
fn migrate_v1_to_v2(document: &mut Value) -> Result<(), SaveError> {
    let object = document
        .as_object_mut()
        .ok_or_else(|| SaveError::Corrupt("save is not an object".to_string()))?;
    object.entry("quests").or_insert_with(|| json!({ "quests": [] }));
    object.entry("player_choices").or_insert_with(|| json!([]));
    object.insert("version".to_string(), json!(2));
    Ok(())
}

/// v2 predates the emergency-save marker.
fn migrate_v2_to_v3(document: &mut Value) -> Result<(), SaveError> {
    let object = document
        .as_object_mut()
        .ok_or_else(|| SaveError::Corrupt("save is not an object".to_string()))?;
    object.entry("emergency").or_insert(json!(false));
    object.insert("version".to_string(), json!(3));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v1_walks_the_whole_chain() {
        let mut document = json!({ "version": 1 });
        migrate_to_current(&mut document).unwrap();
        assert_eq!(document["version"], json!(SAVE_FORMAT_VERSION));
        assert_eq!(document["emergency"], json!(false));
        assert!(document["quests"]["quests"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_current_version_is_untouched() {
        let mut document = json!({ "version": SAVE_FORMAT_VERSION, "emergency": true });
        migrate_to_current(&mut document).unwrap();
        assert_eq!(document["emergency"], json!(true));
    }

    #[test]
    fn test_future_version_is_refused() {
        let mut document = json!({ "version": SAVE_FORMAT_VERSION + 1 });
        let err = migrate_to_current(&mut document).unwrap_err();
        assert!(matches!(err, SaveError::UnsupportedVersion(_)));
    }

    #[test]
    fn test_missing_version_is_corrupt() {
        let mut document = json!({ "world": {} });
        let err = migrate_to_current(&mut document).unwrap_err();
        assert!(matches!(err, SaveError::Corrupt(_)));
    }
}
