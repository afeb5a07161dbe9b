use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::filter::FilterOptions;
use crate::imaging::DEFAULT_JPEG_QUALITY;
use crate::mixer::PickStrategy;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "MEMIX_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub mix: MixConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub cropper: CropperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixConfig {
    #[serde(default)]
    pub how: PickStrategy,

    #[serde(default = "default_skip_duplicates")]
    pub skip_duplicates: bool,

    #[serde(default)]
    pub filters: FilterOptions,
}

fn default_skip_duplicates() -> bool {
    true
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            how: PickStrategy::default(),
            skip_duplicates: default_skip_duplicates(),
            filters: FilterOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Write composites to `dir` in addition to recording them.
    #[serde(default = "default_save_files")]
    pub save_files: bool,
}

fn default_output_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("memix")
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

fn default_save_files() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            jpeg_quality: default_jpeg_quality(),
            save_files: default_save_files(),
        }
    }
}

/// Limits applied to detected text regions before they become crops.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CropperConfig {
    #[serde(default = "default_max_regions")]
    pub max_regions: usize,

    #[serde(default = "default_min_text_len")]
    pub min_text_len: usize,

    /// Watermarks and signatures; regions containing one are dropped.
    #[serde(default = "default_banned_fragments")]
    pub banned_fragments: Vec<String>,

    #[serde(default = "default_min_relative_area")]
    pub min_relative_area: f64,

    #[serde(default = "default_max_relative_area")]
    pub max_relative_area: f64,

    /// Minimum crop width and height in pixels.
    #[serde(default = "default_min_side")]
    pub min_side: u32,
}

fn default_max_regions() -> usize {
    6
}

fn default_min_text_len() -> usize {
    2
}

fn default_banned_fragments() -> Vec<String> {
    vec![
        "comicbook".to_string(),
        "wowlol".to_string(),
        "Класс!".to_string(),
    ]
}

fn default_min_relative_area() -> f64 {
    0.0005
}

fn default_max_relative_area() -> f64 {
    0.6
}

fn default_min_side() -> u32 {
    20
}

impl Default for CropperConfig {
    fn default() -> Self {
        Self {
            max_regions: default_max_regions(),
            min_text_len: default_min_text_len(),
            banned_fragments: default_banned_fragments(),
            min_relative_area: default_min_relative_area(),
            max_relative_area: default_max_relative_area(),
            min_side: default_min_side(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("memix")
        .join("memix.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            mix: MixConfig::default(),
            output: OutputConfig::default(),
            cropper: CropperConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Read `path`, writing the defaults there first if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Invalid config in {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("memix")
            .join("config.toml")
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("memix")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.mix.how, PickStrategy::FirstOnly);
        assert!(config.mix.skip_duplicates);
        assert_eq!(config.output.jpeg_quality, 90);
        assert_eq!(config.cropper, CropperConfig::default());

        let again = Config::load_from(&path).unwrap();
        assert_eq!(again.db_path, config.db_path);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
db_path = "/tmp/corpus.db"

[mix]
how = "aligned"

[mix.filters]
include_publics = ["cats", "dogs"]
include_text = "cat"
exact_pics = 1
from_date = "2021-01-01T00:00:00"

[cropper]
max_regions = 3
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/corpus.db"));
        assert_eq!(config.mix.how, PickStrategy::Aligned);
        assert!(config.mix.skip_duplicates);
        let filters = &config.mix.filters;
        assert_eq!(
            filters.include_publics,
            Some(vec!["cats".to_string(), "dogs".to_string()])
        );
        assert_eq!(filters.include_text, Some(vec!["cat".to_string()]));
        assert_eq!(filters.exact_pics, Some(1));
        assert!(filters.from_date.is_some());
        assert_eq!(config.cropper.max_regions, 3);
        assert_eq!(config.cropper.min_side, 20);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.mix.filters.exclude_text = Some(vec!["ad".to_string()]);
        config.output.save_files = false;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.mix.filters, config.mix.filters);
        assert!(!loaded.output.save_files);
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[mix]\nhow = \"abstract\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
