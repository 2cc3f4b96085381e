//! Path eligibility rules and their TOML configuration.
//!
//! Every action sees the tree through a [`PathFilter`]. The filter is built
//! from command-line flags merged with an optional TOML file:
//!
//! ```toml
//! [filters]
//! include_hidden = false
//!
//! [filters.exclude]
//! patterns = ["*.tmp", "*/node_modules/*"]
//! filenames = ["Thumbs.db"]
//! extensions = ["bak"]
//! regex = []
//! ```
//!
//! Glob patterns are matched against the full path, not the basename, and `*`
//! is allowed to cross directory separators.

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Leading character that marks a file or directory as hidden.
pub const HIDDEN_MARKER: char = '.';

/// Errors that can occur while loading or compiling filter configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    /// Invalid glob pattern provided.
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlobPattern { pattern: String, reason: String },
    /// Invalid regex pattern provided.
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    /// IO error while reading configuration.
    #[error("IO error reading configuration {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Filter configuration as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub filters: FilterRules,
}

/// Root-level filter rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether hidden files and directories are processed. Defaults to false.
    #[serde(default)]
    pub include_hidden: bool,

    /// Rules for excluding files.
    #[serde(default)]
    pub exclude: ExcludeRules,
}

/// Rules for excluding files from every action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Full-path glob patterns (e.g. "*.tmp", "*/cache/*").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Exact basenames (e.g. "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// File extensions, compared case-insensitively (e.g. "bak").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the basename.
    #[serde(default)]
    pub regex: Vec<String>,
}

impl FilterConfig {
    /// Load configuration, falling back to defaults.
    ///
    /// Lookup order:
    /// 1. `config_path`, if provided (must exist)
    /// 2. `.tidyrc.toml` in the current directory
    /// 3. `~/.config/tidy/config.toml`
    /// 4. Built-in defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(".tidyrc.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("tidy")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Merges command-line settings into the loaded rules.
    ///
    /// `--include-hidden` can only switch hidden inclusion on; command-line
    /// globs come first, followed by the configured ones.
    pub fn merge_cli(mut self, include_hidden: bool, exclude_globs: &[String]) -> Self {
        self.filters.include_hidden |= include_hidden;
        let mut patterns = exclude_globs.to_vec();
        patterns.append(&mut self.filters.exclude.patterns);
        self.filters.exclude.patterns = patterns;
        self
    }

    /// Compile the rules into a [`PathFilter`].
    pub fn compile(self) -> Result<PathFilter, ConfigError> {
        PathFilter::from_rules(self.filters)
    }
}

/// Compiled eligibility rules.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include_hidden: bool,
    exclude_patterns: Vec<Pattern>,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_regexes: Vec<Regex>,
}

impl PathFilter {
    /// Builds a filter from the two command-line knobs only.
    pub fn new(include_hidden: bool, exclude_globs: &[String]) -> Result<Self, ConfigError> {
        FilterConfig::default()
            .merge_cli(include_hidden, exclude_globs)
            .compile()
    }

    fn from_rules(rules: FilterRules) -> Result<Self, ConfigError> {
        let exclude_patterns = rules
            .exclude
            .patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|e| ConfigError::InvalidGlobPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            include_hidden: rules.include_hidden,
            exclude_patterns,
            exclude_filenames: rules.exclude.filenames.into_iter().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_regexes,
        })
    }

    /// Whether hidden entries are processed.
    pub fn include_hidden(&self) -> bool {
        self.include_hidden
    }

    /// True if any normal component of `path` starts with the hidden marker.
    pub fn is_hidden(path: &Path) -> bool {
        path.components().any(|component| match component {
            Component::Normal(name) => name.to_string_lossy().starts_with(HIDDEN_MARKER),
            _ => false,
        })
    }

    /// Whether `path` may be processed, judging hidden components over the
    /// whole path.
    pub fn is_eligible(&self, path: &Path) -> bool {
        if !self.include_hidden && Self::is_hidden(path) {
            return false;
        }
        !self.is_excluded(path)
    }

    /// Like [`is_eligible`](Self::is_eligible), but hidden components are only
    /// looked for below `root`, so a root that itself lives inside a hidden
    /// directory can still be scanned. Exclusion globs still see the full path.
    pub fn is_eligible_under(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        if !self.include_hidden && Self::is_hidden(relative) {
            return false;
        }
        !self.is_excluded(path)
    }

    /// Exclusion rules only; hidden status is ignored.
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
        {
            return true;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return true;
        }

        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return true;
            }
        }

        self.exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }
}
