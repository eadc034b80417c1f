//! Configuration management for rentwatch.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "rentwatch.db";

const OUTPUT_SUBDIR: &str = "output";
const FIXTURES_SUBDIR: &str = "fixtures";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Directory for batch output artifacts.
    pub output_dir: PathBuf,
    /// Directory holding per-source HTML fixtures for offline runs.
    pub fixtures_dir: PathBuf,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Lower bound of the randomized inter-request delay, in seconds.
    pub min_delay_secs: f64,
    /// Upper bound of the randomized inter-request delay, in seconds.
    pub max_delay_secs: f64,
    /// Fetch attempts per URL.
    pub max_attempts: u32,
    /// Pages to scrape per (source, city) pair.
    pub max_pages: u32,
    /// Scrape live sites instead of parsing fixtures.
    pub live: bool,
    /// Sources to scrape.
    pub sources: Vec<String>,
    /// Cities to scrape.
    pub cities: Vec<String>,
    /// Outbound proxy routes (SOCKS5/HTTP URLs) for egress rotation.
    pub egress_routes: Vec<String>,
    /// When set, live runs sweep vanished listings older than this many days.
    pub sweep_threshold_days: Option<i64>,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to ~/Documents/rentwatch/ for user data.
        // Falls back gracefully: Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rentwatch");

        Self {
            output_dir: data_dir.join(OUTPUT_SUBDIR),
            fixtures_dir: data_dir.join(FIXTURES_SUBDIR),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            request_timeout: 30,
            min_delay_secs: 2.0,
            max_delay_secs: 5.0,
            max_attempts: 3,
            max_pages: 3,
            live: false,
            sources: vec!["funda".to_string(), "pararius".to_string()],
            cities: vec!["amsterdam".to_string()],
            egress_routes: Vec::new(),
            sweep_threshold_days: None,
        }
    }
}

impl Settings {
    /// Full path to the database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure the data, output, and fixtures directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::create_dir_all(&self.fixtures_dir)?;
        Ok(())
    }
}

/// Configuration file structure. Every field is optional and overlays the
/// defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_delay_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cities: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub egress_routes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_threshold_days: Option<i64>,
}

impl Config {
    /// Load configuration from a file path. The format follows the file
    /// extension: TOML, YAML, or JSON (default).
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let config: Config = match ext {
            "toml" => {
                toml::from_str(&contents).map_err(|e| format!("Failed to parse TOML config: {}", e))?
            }
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };
        Ok(config)
    }

    /// Apply configuration over settings. Relative paths resolve against
    /// `base_dir`.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            let path = Path::new(data_dir);
            settings.data_dir = if path.is_absolute() {
                path.to_path_buf()
            } else {
                base_dir.join(path)
            };
            settings.output_dir = settings.data_dir.join(OUTPUT_SUBDIR);
            settings.fixtures_dir = settings.data_dir.join(FIXTURES_SUBDIR);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(min) = self.min_delay_secs {
            settings.min_delay_secs = min;
        }
        if let Some(max) = self.max_delay_secs {
            settings.max_delay_secs = max;
        }
        if let Some(attempts) = self.max_attempts {
            settings.max_attempts = attempts;
        }
        if let Some(pages) = self.max_pages {
            settings.max_pages = pages;
        }
        if let Some(live) = self.live {
            settings.live = live;
        }
        if !self.sources.is_empty() {
            settings.sources = self.sources.clone();
        }
        if !self.cities.is_empty() {
            settings.cities = self.cities.clone();
        }
        if !self.egress_routes.is_empty() {
            settings.egress_routes = self.egress_routes.clone();
        }
        if self.sweep_threshold_days.is_some() {
            settings.sweep_threshold_days = self.sweep_threshold_days;
        }
    }
}

/// Split a comma-separated list into trimmed, non-empty entries.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Load settings: defaults, then the config file (if any), then environment
/// variable overrides, then the `--data` directory override.
pub async fn load_settings(config_path: Option<&Path>, data: Option<&Path>) -> Settings {
    let mut settings = Settings::default();

    if let Some(path) = config_path {
        match Config::load_from_path(path).await {
            Ok(config) => {
                let base_dir = path
                    .parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("."));
                config.apply_to_settings(&mut settings, &base_dir);
            }
            Err(e) => {
                tracing::warn!("Ignoring config file {}: {}", path.display(), e);
            }
        }
    }

    if let Ok(sources) = std::env::var("RENTWATCH_SOURCES") {
        let sources = split_list(&sources);
        if !sources.is_empty() {
            settings.sources = sources;
        }
    }
    if let Ok(cities) = std::env::var("RENTWATCH_CITIES") {
        let cities = split_list(&cities);
        if !cities.is_empty() {
            settings.cities = cities;
        }
    }
    if let Ok(live) = std::env::var("RENTWATCH_LIVE") {
        settings.live = live == "1" || live.eq_ignore_ascii_case("true");
    }

    if let Some(data_dir) = data {
        settings.data_dir = data_dir.to_path_buf();
        settings.output_dir = settings.data_dir.join(OUTPUT_SUBDIR);
        settings.fixtures_dir = settings.data_dir.join(FIXTURES_SUBDIR);
    }

    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.database_filename, DEFAULT_DATABASE_FILENAME);
        assert_eq!(settings.request_timeout, 30);
        assert!(!settings.live);
        assert!(settings.max_delay_secs >= settings.min_delay_secs);
    }

    #[test]
    fn test_config_overlay() {
        let config = Config {
            max_pages: Some(10),
            cities: vec!["rotterdam".to_string()],
            live: Some(true),
            ..Default::default()
        };
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/tmp"));
        assert_eq!(settings.max_pages, 10);
        assert_eq!(settings.cities, vec!["rotterdam"]);
        assert!(settings.live);
        // Untouched fields keep their defaults.
        assert_eq!(settings.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rentwatch.toml");
        tokio::fs::write(&path, "max_pages = 7\ncities = [\"utrecht\"]\n")
            .await
            .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.max_pages, Some(7));
        assert_eq!(config.cities, vec!["utrecht"]);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("funda, pararius"), vec!["funda", "pararius"]);
        assert_eq!(split_list(""), Vec::<String>::new());
    }
}
