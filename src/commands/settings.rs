use crate::analysis::persist::write_atomic;
use crate::error::{KodoError, Result};
use crate::models::settings::Settings;
use chrono::Utc;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_DIR: &str = ".kodo";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

pub async fn get_settings(project_path: String, config_dir: String) -> std::result::Result<Settings, String> {
    load_settings_from_disk(Path::new(&project_path), &config_dir).map_err(|e| e.to_command_error())
}

/// Merges a partial JSON document onto the stored settings.
pub async fn save_settings(
    project_path: String,
    config_dir: String,
    settings: Value,
) -> std::result::Result<Settings, String> {
    save_settings_to_disk(Path::new(&project_path), &config_dir, &settings).map_err(|e| e.to_command_error())
}

/// Reads `settings.json`, falling back to defaults for a missing or
/// malformed file. A missing file is written out so users have something to
/// edit.
pub fn load_settings_from_disk(project_root: &Path, config_dir: &str) -> Result<Settings> {
    let path = settings_path(project_root, config_dir);
    ensure_config_dir(project_root, config_dir)?;

    if !path.exists() {
        let settings = Settings::default();
        write_settings_file(&path, &settings)?;
        log::info!("Created default settings at {}", path.display());
        return Ok(settings);
    }

    let raw = fs::read_to_string(&path).map_err(|source| KodoError::FileRead {
        path: path.clone(),
        source,
    })?;
    let value = serde_json::from_str::<Value>(&raw).unwrap_or_else(|e| {
        log::warn!("Ignoring malformed {}: {}", path.display(), e);
        json!({})
    });

    Ok(settings_from_value(value))
}

pub fn save_settings_to_disk(project_root: &Path, config_dir: &str, incoming: &Value) -> Result<Settings> {
    let path = settings_path(project_root, config_dir);
    let current = load_settings_from_disk(project_root, config_dir).unwrap_or_default();

    let mut merged = serde_json::to_value(&current)?;
    merge_settings(&mut merged, incoming);

    let mut settings = settings_from_value(merged);
    settings.created_at = current.created_at;
    settings.updated_at = Utc::now();
    write_settings_file(&path, &settings)?;

    log::info!(
        "Saved settings with {} columns to {}",
        settings.kanban_columns.len(),
        path.display()
    );
    Ok(settings)
}

pub fn settings_path(project_root: &Path, config_dir: &str) -> PathBuf {
    project_root.join(config_dir).join(SETTINGS_FILE_NAME)
}

fn ensure_config_dir(project_root: &Path, config_dir: &str) -> Result<()> {
    fs::create_dir_all(project_root.join(config_dir))?;
    Ok(())
}

fn write_settings_file(path: &Path, settings: &Settings) -> Result<()> {
    let raw = serde_json::to_string_pretty(settings)?;
    write_atomic(path, &raw).map_err(|source| KodoError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

fn settings_from_value(value: Value) -> Settings {
    let settings = serde_json::from_value::<Settings>(value).unwrap_or_else(|e| {
        log::warn!("Settings do not match the expected shape, using defaults: {}", e);
        Settings::default()
    });
    settings.validated()
}

/// Objects merge key by key; anything else, arrays included, replaces.
fn merge_settings(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(target_obj), Value::Object(incoming_obj)) => {
            for (key, value) in incoming_obj {
                if let Some(existing) = target_obj.get_mut(key) {
                    merge_settings(existing, value);
                } else {
                    target_obj.insert(key.clone(), value.clone());
                }
            }
        }
        (target_slot, incoming_value) => {
            *target_slot = incoming_value.clone();
        }
    }
}
