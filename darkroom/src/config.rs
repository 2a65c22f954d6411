use std::path::Path;
use std::{fs, path::PathBuf};

use crate::image::ImageFormat;
use crate::transform::{DEFAULT_CUTOFF, DEFAULT_MIDPOINT};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    // Encoding for images sent back to the host
    pub output_format: ImageFormat,
    // Default cutoff for `threshold` when the request carries none
    pub threshold_cutoff: u8,
    // Luma above this turns white in `threshold-colorize`
    pub colorize_midpoint: u8,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            output_format: ImageFormat::default(),
            threshold_cutoff: DEFAULT_CUTOFF,
            colorize_midpoint: DEFAULT_MIDPOINT,
        }
    }
}

impl EditorConfig {
    pub fn load() -> Option<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Option<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Option<Self> {
        fs::read_to_string(config_path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
    }

    pub fn save_to(&self, config_path: &Path) -> Option<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).ok()?;
        }

        serde_json::to_string_pretty(self)
            .ok()
            .and_then(|json| fs::write(config_path, json).ok())
    }

    fn config_path() -> Option<PathBuf> {
        #[allow(deprecated)]
        let home = std::env::home_dir()?;
        Some(home.join(".config").join("darkroom").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PngCompression;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = EditorConfig {
            output_format: ImageFormat::Png {
                compression: PngCompression::Best,
            },
            threshold_cutoff: 90,
            colorize_midpoint: 100,
        };

        config.save_to(&path).unwrap();
        assert_eq!(EditorConfig::load_from(&path), Some(config));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "threshold_cutoff": 10 }"#).unwrap();

        let config = EditorConfig::load_from(&path).unwrap();
        assert_eq!(config.threshold_cutoff, 10);
        assert_eq!(config.colorize_midpoint, DEFAULT_MIDPOINT);
        assert_eq!(config.output_format, ImageFormat::default());
    }

    #[test]
    fn unreadable_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(EditorConfig::load_from(&path), None);
        fs::write(&path, "not json").unwrap();
        assert_eq!(EditorConfig::load_from(&path), None);
    }
}
