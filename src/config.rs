//! Runtime settings with TOML + environment resolution.
//!
//! Resolution priority is environment over TOML file over built-in
//! defaults. The TOML path comes from `FACELOOM_CONFIG` and defaults to
//! `faceloom.toml` in the working directory; a missing file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Per-run collage output root.
    pub output_dir: PathBuf,
    /// Thumbnails and collages served under `/api/static`.
    pub static_dir: PathBuf,
    /// External face detection/embedding helper binary.
    pub face_tool: String,
    pub thumb_quality: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            output_dir: PathBuf::from("output"),
            static_dir: PathBuf::from("output/static"),
            face_tool: "faceproc".to_string(),
            thumb_quality: 90,
        }
    }
}

impl Settings {
    /// Resolve settings: defaults, then the TOML file, then environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("FACELOOM_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("faceloom.toml"));

        let mut settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).map_err(|source| {
                ConfigError::Read {
                    path: config_path.clone(),
                    source,
                }
            })?;
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: config_path.clone(),
                source,
            })?
        } else {
            Settings::default()
        };

        settings.apply_env()?;
        Ok(settings)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("FACELOOM_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("FACELOOM_PORT") {
            self.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "FACELOOM_PORT".to_string(),
                value: port,
            })?;
        }
        if let Ok(dir) = std::env::var("FACELOOM_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("FACELOOM_STATIC_DIR") {
            self.static_dir = PathBuf::from(dir);
        }
        if let Ok(tool) = std::env::var("FACELOOM_FACE_TOOL") {
            self.face_tool = tool;
        }
        if let Ok(quality) = std::env::var("FACELOOM_THUMB_QUALITY") {
            self.thumb_quality = quality.parse().map_err(|_| ConfigError::InvalidValue {
                key: "FACELOOM_THUMB_QUALITY".to_string(),
                value: quality,
            })?;
        }
        Ok(())
    }

    /// Create the output/static directory tree if missing.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::create_dir_all(self.thumbs_dir())?;
        std::fs::create_dir_all(self.faces_dir())?;
        std::fs::create_dir_all(self.collages_dir())?;
        Ok(())
    }

    pub fn thumbs_dir(&self) -> PathBuf {
        self.static_dir.join("thumbs")
    }

    pub fn faces_dir(&self) -> PathBuf {
        self.static_dir.join("faces")
    }

    pub fn collages_dir(&self) -> PathBuf {
        self.static_dir.join("collages")
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings pointing all output at a caller-owned directory; handy for
    /// batch runs and tests.
    pub fn with_output_root(root: &Path) -> Self {
        Self {
            output_dir: root.join("output"),
            static_dir: root.join("output/static"),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.bind_address(), "127.0.0.1:8080");
        assert_eq!(settings.faces_dir(), PathBuf::from("output/static/faces"));
    }

    #[test]
    fn toml_round_trip() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000
            face_tool = "my-faceproc"
        "#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.face_tool, "my-faceproc");
        // Unspecified fields keep their defaults.
        assert_eq!(settings.thumb_quality, 90);
    }

    #[test]
    fn with_output_root_rebases_directories() {
        let settings = Settings::with_output_root(Path::new("/tmp/faceloom"));
        assert_eq!(
            settings.collages_dir(),
            PathBuf::from("/tmp/faceloom/output/static/collages")
        );
    }
}
