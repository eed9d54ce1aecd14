use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_FDC_ENDPOINT: &str = "https://api.nal.usda.gov/fdc/v1/";
pub const DEFAULT_FDC_API_KEY: &str = "DEMO_KEY";

/// Optional `config.json` in the data directory. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    db_path: Option<PathBuf>,
    fdc_api_key: Option<String>,
    fdc_endpoint: Option<String>,
}

#[derive(Debug)]
pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub fdc_api_key: String,
    pub fdc_endpoint: String,
}

impl Config {
    /// Resolve configuration: `config.json`, then `PLATE_DB` / `FDC_API_KEY`,
    /// then `db_override` from the command line.
    pub fn load(db_override: Option<PathBuf>) -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "plate").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Self::resolve(
            data_dir,
            std::env::var("PLATE_DB").ok(),
            std::env::var("FDC_API_KEY").ok(),
            db_override,
        )
    }

    fn resolve(
        data_dir: PathBuf,
        env_db: Option<String>,
        env_api_key: Option<String>,
        db_override: Option<PathBuf>,
    ) -> Result<Self> {
        let file = read_file_config(&data_dir.join("config.json"))?;

        let db_path = db_override
            .or_else(|| env_db.filter(|s| !s.is_empty()).map(PathBuf::from))
            .or(file.db_path)
            .unwrap_or_else(|| data_dir.join("plate.db"));

        let fdc_api_key = env_api_key
            .filter(|s| !s.is_empty())
            .or(file.fdc_api_key)
            .unwrap_or_else(|| DEFAULT_FDC_API_KEY.to_string());

        let fdc_endpoint = file
            .fdc_endpoint
            .unwrap_or_else(|| DEFAULT_FDC_ENDPOINT.to_string());

        Ok(Config {
            db_path,
            data_dir,
            fdc_api_key,
            fdc_endpoint,
        })
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::resolve(dir.path().to_path_buf(), None, None, None).unwrap();
        assert_eq!(config.db_path, dir.path().join("plate.db"));
        assert_eq!(config.fdc_api_key, "DEMO_KEY");
        assert_eq!(config.fdc_endpoint, DEFAULT_FDC_ENDPOINT);
    }

    #[test]
    fn test_config_file_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"db_path": "/tmp/other.db", "fdc_api_key": "abc123"}"#,
        )
        .unwrap();
        let config = Config::resolve(dir.path().to_path_buf(), None, None, None).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.fdc_api_key, "abc123");
    }

    #[test]
    fn test_env_and_flag_precedence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"db_path": "/tmp/file.db", "fdc_api_key": "from-file"}"#,
        )
        .unwrap();

        let config = Config::resolve(
            dir.path().to_path_buf(),
            Some("/tmp/env.db".to_string()),
            Some("from-env".to_string()),
            None,
        )
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/env.db"));
        assert_eq!(config.fdc_api_key, "from-env");

        let config = Config::resolve(
            dir.path().to_path_buf(),
            Some("/tmp/env.db".to_string()),
            None,
            Some(PathBuf::from("/tmp/flag.db")),
        )
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/flag.db"));
    }

    #[test]
    fn test_invalid_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{not json").unwrap();
        assert!(Config::resolve(dir.path().to_path_buf(), None, None, None).is_err());
    }
}
