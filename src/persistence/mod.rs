//! JSON persistence for the configuration and the rephrasing cache, stored in
//! the platform data directory.

use std::{
    fs,
    path::PathBuf,
};

use serde::{
    de::DeserializeOwned,
    Serialize,
};

use crate::{
    core::RewordError,
    notes::CacheSnapshot,
    settings::TutorConfig,
};

const APP_NAME: &str = "reword";
const CONFIG_FILE: &str = "config.json";
const CACHE_FILE: &str = "rephrasings.json";

pub fn app_data_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        let app_dir = data_dir.join(APP_NAME);
        let _ = fs::create_dir_all(&app_dir);
        app_dir
    } else {
        PathBuf::from(".")
    }
}

fn data_file_path(filename: &str) -> PathBuf {
    app_data_dir().join(filename)
}

pub fn save_json<T: Serialize>(data: &T, filename: &str) -> Result<(), RewordError> {
    let file_path = data_file_path(filename);
    let json = serde_json::to_string_pretty(data)?;
    fs::write(&file_path, json)?;
    Ok(())
}

pub fn load_json<T: DeserializeOwned + Default>(filename: &str) -> Result<T, RewordError> {
    let file_path = data_file_path(filename);
    if !file_path.exists() {
        return Ok(T::default());
    }
    let json = fs::read_to_string(&file_path)?;
    Ok(serde_json::from_str(&json)?)
}

pub fn load_json_or_default<T: DeserializeOwned + Default>(filename: &str) -> T {
    match load_json::<T>(filename) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Failed to load {}: {}. Using defaults.", filename, e);
            T::default()
        }
    }
}

/// Rephrasing artifacts survive restarts so a relaunched session does not
/// regenerate every previously seen note.
pub fn save_cache(snapshot: &CacheSnapshot) -> Result<(), RewordError> {
    save_json(snapshot, CACHE_FILE)
}

pub fn load_cache() -> CacheSnapshot {
    load_json_or_default(CACHE_FILE)
}

pub fn save_config(config: &TutorConfig) -> Result<(), RewordError> {
    save_json(config, CONFIG_FILE)
}

pub fn load_config() -> TutorConfig {
    load_json_or_default(CONFIG_FILE)
}
