use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, RoutelensError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Source code parsing configuration
    pub parsing: ParsingConfig,

    /// Report output settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Source directories to analyze
    pub source_dirs: Vec<PathBuf>,

    /// Path substrings to skip while scanning
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingConfig {
    /// File extensions treated as handler source
    pub file_extensions: Vec<String>,

    /// Maximum file size to parse (in bytes)
    pub max_file_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Pretty-print JSON reports
    pub pretty: bool,

    /// Include per-file source records (path, hash, functions) in the report
    pub include_sources: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig {
                name: "Unnamed Project".to_string(),
                source_dirs: vec![PathBuf::from(".")],
                ignore_patterns: vec![
                    ".git/".to_string(),
                    "__pycache__/".to_string(),
                    ".venv/".to_string(),
                    "node_modules/".to_string(),
                ],
            },
            parsing: ParsingConfig {
                file_extensions: vec!["py".to_string()],
                max_file_size: 1024 * 1024, // 1MB
            },
            output: OutputConfig {
                pretty: false,
                include_sources: true,
            },
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| RoutelensError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RoutelensError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                // Try common config file locations
                let candidates = [
                    "Routelens.toml",
                    "routelens.toml",
                    ".routelens.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }
}
