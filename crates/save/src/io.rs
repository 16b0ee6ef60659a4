//! Atomic save IO
//!
//! Writes go to a temp file in the target directory and rename into place,
//! so a crash mid-write never leaves a torn save. Loads sniff the version,
//! run the migration chain, verify the checksum, and honor the emergency
//! marker.

use crate::format::{checksum_of_value, SaveFile, SAVE_FORMAT_VERSION};
use crate::migrate::migrate_to_current;
use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("checksum mismatch: save refused")]
    ChecksumMismatch,
    #[error("unsupported save version {0}")]
    UnsupportedVersion(u32),
    #[error("corrupt save: {0}")]
    Corrupt(String),
}

/// Serialize and persist a save atomically.
pub fn save_to_path(path: &Path, save: &SaveFile) -> Result<(), SaveError> {
    let body = serde_json::to_string_pretty(save)?;

    let tmp = path.with_extension("sav.tmp");
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    info!(path = %path.display(), "game saved");
    Ok(())
}

/// Load, migrate, and verify a save.
pub fn load_from_path(path: &Path) -> Result<SaveFile, SaveError> {
    let content = fs::read_to_string(path)?;
    let mut document: Value = serde_json::from_str(&content)?;

    let original_version = document
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| SaveError::Corrupt("missing version field".to_string()))? as u32;

    migrate_to_current(&mut document)?;

    if original_version == SAVE_FORMAT_VERSION {
        verify_document_checksum(&document)?;
    } else {
        // older canonical forms hashed differently; trust the migration
        warn!(from = original_version, "checksum skipped for migrated save");
    }

    let save: SaveFile = serde_json::from_value(document)?;
    if save.emergency {
        info!(path = %path.display(), "emergency save: loading reduced-fidelity form");
        return Ok(save.reduce());
    }
    Ok(save)
}

fn verify_document_checksum(document: &Value) -> Result<(), SaveError> {
    let recorded = document
        .get("checksum")
        .and_then(Value::as_str)
        .ok_or_else(|| SaveError::Corrupt("missing checksum field".to_string()))?
        .to_string();

    let mut blanked = document.clone();
    if let Some(object) = blanked.as_object_mut() {
        object.insert("checksum".to_string(), Value::String(String::new()));
    }
    if checksum_of_value(&blanked) != recorded {
        return Err(SaveError::ChecksumMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai_bridge::MemoryRecord;
    use crawler_core::{ClassKind, Player, QuestLog};
    use crawler_world::WorldStore;

    fn sample_save() -> SaveFile {
        let mut store = WorldStore::new("S0");
        let dir = store.current_room().exits.iter().next().unwrap();
        store.move_player(dir).unwrap();
        SaveFile::new(
            store.snapshot(),
            Player::new("Hero", ClassKind::Rogue),
            MemoryRecord {
                events: Vec::new(),
                summary: "the journey began".to_string(),
                next_event_id: 4,
            },
            vec!["spared the wolf".to_string()],
            QuestLog::default(),
        )
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slot1.sav");
        let save = sample_save();
        save_to_path(&path, &save).unwrap();
        let loaded = load_from_path(&path).unwrap();
        assert_eq!(loaded.world, save.world);
        assert_eq!(loaded.player, save.player);
        assert_eq!(loaded.narrative, save.narrative);
        assert_eq!(loaded.quests, save.quests);
    }

    #[test]
    fn test_tampered_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slot1.sav");
        save_to_path(&path, &sample_save()).unwrap();

        let tampered = fs::read_to_string(&path).unwrap().replace("\"gold\": 25", "\"gold\": 9999");
        fs::write(&path, tampered).unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, SaveError::ChecksumMismatch));
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slot1.sav");
        save_to_path(&path, &sample_save()).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_emergency_save_loads_reduced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slot1.sav");
        let mut save = sample_save();
        save.emergency = true;
        save.checksum = save.compute_checksum();
        save_to_path(&path, &save).unwrap();

        let loaded = load_from_path(&path).unwrap();
        assert!(loaded.world.rooms.is_empty());
        assert_eq!(loaded.world.seed_text, "S0");
        assert_eq!(loaded.narrative.summary, "the journey began");
        assert!(loaded.narrative.events.is_empty());
    }

    #[test]
    fn test_v1_save_migrates_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.sav");

        let mut document = serde_json::to_value(sample_save()).unwrap();
        let object = document.as_object_mut().unwrap();
        object.insert("version".to_string(), serde_json::json!(1));
        object.remove("quests");
        object.remove("player_choices");
        object.remove("emergency");
        fs::write(&path, serde_json::to_string(&document).unwrap()).unwrap();

        let loaded = load_from_path(&path).unwrap();
        assert_eq!(loaded.version, SAVE_FORMAT_VERSION);
        assert!(loaded.quests.quests.is_empty());
        assert!(!loaded.emergency);
    }
}
