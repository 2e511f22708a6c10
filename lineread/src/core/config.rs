use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Editor configuration (`<config dir>/<app>/readline.toml`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReadlineConfig {
    /// Retention cap passed to the history store.
    #[serde(default = "default_max_history")]
    pub max_history_size: usize,

    #[serde(default = "default_true")]
    pub enable_completion: bool,

    #[serde(default = "default_true")]
    pub enable_hints: bool,

    #[serde(default)]
    pub colors: ColorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColorConfig {
    #[serde(default = "default_gray")]
    pub hint: String,
}

impl Default for ReadlineConfig {
    fn default() -> Self {
        Self {
            max_history_size: 1000,
            enable_completion: true,
            enable_hints: true,
            colors: ColorConfig::default(),
        }
    }
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            hint: default_gray(),
        }
    }
}

impl ReadlineConfig {
    /// Load configuration for `app` from `<config dir>/<app>/readline.toml`,
    /// falling back to defaults when the file is missing or malformed.
    pub fn load(app: &str) -> Self {
        let path = dirs::config_dir().map(|d| d.join(app).join("readline.toml"));
        if let Some(path) = path {
            if let Ok(content) = std::fs::read_to_string(&path) {
                if let Ok(config) = toml::from_str::<Self>(&content) {
                    return config;
                }
            }
        }
        Self::default()
    }

    /// Config file path for `app`, when a config directory exists.
    pub fn path(app: &str) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(app).join("readline.toml"))
    }
}

// Default functions for serde
fn default_max_history() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_gray() -> String {
    "gray".to_string()
}

impl ColorConfig {
    /// Convert color name to ANSI code
    pub fn to_ansi(&self, color_name: &str) -> &'static str {
        match color_name {
            "black" => "\x1b[30m",
            "red" => "\x1b[31m",
            "green" => "\x1b[32m",
            "yellow" => "\x1b[33m",
            "blue" => "\x1b[34m",
            "magenta" => "\x1b[35m",
            "cyan" => "\x1b[36m",
            "white" => "\x1b[37m",
            "gray" | "grey" => "\x1b[90m",
            _ => "\x1b[0m", // Reset
        }
    }

    pub fn hint_ansi(&self) -> &'static str {
        self.to_ansi(&self.hint)
    }
}
