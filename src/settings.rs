use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Mutable sync configuration, persisted as `config.json` and edited by the
/// dashboard. Loaded fresh on every mapping operation — the file may change
/// between reads and must never be cached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncSettings {
    pub price_adjustment_pct: f64,
    pub eligibility: Eligibility,
    pub field_defaults: FieldDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Eligibility {
    pub require_category: bool,
    pub require_quantity: bool,
    pub require_images: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FieldDefaults {
    pub is_returnable: String,
    pub product_condition: String,
    pub listing_status: String,
    pub color_standard: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            price_adjustment_pct: 0.0,
            eligibility: Eligibility::default(),
            field_defaults: FieldDefaults::default(),
        }
    }
}

impl Default for Eligibility {
    fn default() -> Self {
        Self {
            require_category: true,
            require_quantity: true,
            require_images: true,
        }
    }
}

impl Default for FieldDefaults {
    fn default() -> Self {
        Self {
            is_returnable: "Not Returnable".to_string(),
            product_condition: "New".to_string(),
            listing_status: "Live".to_string(),
            color_standard: "No color".to_string(),
        }
    }
}

impl SyncSettings {
    /// Read settings from disk. A missing file yields defaults; a corrupt
    /// file yields defaults with a warning. Partial files are merged with
    /// defaults field by field, so new keys always exist.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(err) => {
                warn!(
                    target = "vendize.settings",
                    path = %path.display(),
                    error = %err,
                    "config unreadable, using defaults"
                );
                Self::default()
            }
        }
    }
}

pub fn settings_path_from_env() -> std::path::PathBuf {
    std::env::var("SYNC_CONFIG_PATH")
        .unwrap_or_else(|_| "./config.json".to_string())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let settings = SyncSettings::load(Path::new("/nonexistent/config.json"));
        assert_eq!(settings, SyncSettings::default());
        assert_eq!(settings.field_defaults.color_standard, "No color");
        assert!(settings.eligibility.require_category);
    }

    #[test]
    fn partial_file_merges_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"price_adjustment_pct": 12.5, "eligibility": {"require_images": false}}"#,
        )
        .unwrap();

        let settings = SyncSettings::load(&path);
        assert_eq!(settings.price_adjustment_pct, 12.5);
        assert!(!settings.eligibility.require_images);
        assert!(settings.eligibility.require_category);
        assert_eq!(settings.field_defaults.is_returnable, "Not Returnable");
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(SyncSettings::load(&path), SyncSettings::default());
    }
}
