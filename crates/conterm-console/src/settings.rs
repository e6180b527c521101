//! User-facing console settings, loaded from a TOML file.
//!
//! All fields use serde defaults so a partial file works. After loading,
//! the settings are validated; an invalid file logs a warning and falls
//! back to defaults rather than failing the session.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use conterm_common::SettingsError;

use crate::buffer::DEFAULT_BUFFER_LINES;
use crate::info::{DEFAULT_COLS, DEFAULT_ROWS};
use crate::prompt::{PromptDetector, DEFAULT_PROMPT_PATTERN};

/// Geometry bounds accepted from a settings file.
const MIN_DIMENSION: u16 = 10;
const MAX_DIMENSION: u16 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSettings {
    /// Shell program path. Empty string means auto-detect from `$SHELL`.
    pub shell: String,
    pub cols: u16,
    pub rows: u16,
    /// Maximum retained output lines per console.
    pub buffer_line_count: usize,
    /// Regex used by the prompt detector.
    pub prompt_pattern: String,
    /// Value of `TERM` inside spawned consoles.
    pub term: String,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            shell: String::new(),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            buffer_line_count: DEFAULT_BUFFER_LINES,
            prompt_pattern: DEFAULT_PROMPT_PATTERN.to_string(),
            term: "xterm-256color".to_string(),
        }
    }
}

impl ConsoleSettings {
    /// Load settings from a TOML file. Missing fields take defaults; a file
    /// that parses but fails validation logs a warning and yields defaults.
    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::ParseError(format!("failed to read {}: {e}", path.display()))
        })?;

        let settings: Self = toml::from_str(&content)
            .map_err(|e| SettingsError::ParseError(format!("failed to parse TOML: {e}")))?;

        if let Err(e) = settings.validate() {
            warn!("settings validation warning: {e}");
            warn!("falling back to default settings");
            return Ok(Self::default());
        }

        info!("loaded console settings from {}", path.display());
        Ok(settings)
    }

    fn validate(&self) -> Result<(), String> {
        if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&self.cols) {
            return Err(format!("cols {} out of range", self.cols));
        }
        if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&self.rows) {
            return Err(format!("rows {} out of range", self.rows));
        }
        if self.buffer_line_count == 0 {
            return Err("buffer_line_count must be positive".into());
        }
        if let Err(e) = regex::Regex::new(&self.prompt_pattern) {
            return Err(format!("invalid prompt_pattern: {e}"));
        }
        Ok(())
    }

    /// Build a prompt detector from the configured pattern. The pattern was
    /// validated at load time, but a hand-constructed instance may still
    /// carry a bad one; that falls back to the default pattern.
    pub fn build_detector(&self) -> PromptDetector {
        match PromptDetector::new(&self.prompt_pattern) {
            Ok(detector) => detector,
            Err(e) => {
                warn!("invalid prompt pattern {:?}: {e}", self.prompt_pattern);
                PromptDetector::with_default_pattern()
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = ConsoleSettings::default();
        assert!(settings.shell.is_empty());
        assert_eq!(settings.cols, DEFAULT_COLS);
        assert_eq!(settings.rows, DEFAULT_ROWS);
        assert_eq!(settings.buffer_line_count, DEFAULT_BUFFER_LINES);
        assert_eq!(settings.prompt_pattern, DEFAULT_PROMPT_PATTERN);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn load_from_nonexistent_returns_file_not_found() {
        let result = ConsoleSettings::load_from_path(Path::new("/tmp/no_such_conterm.toml"));
        assert!(matches!(result, Err(SettingsError::FileNotFound(_))));
    }

    #[test]
    fn load_valid_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.toml");
        std::fs::write(
            &path,
            r#"
shell = "/bin/zsh"
cols = 132
"#,
        )
        .unwrap();

        let settings = ConsoleSettings::load_from_path(&path).unwrap();
        assert_eq!(settings.shell, "/bin/zsh");
        assert_eq!(settings.cols, 132);
        // Defaults preserved
        assert_eq!(settings.rows, DEFAULT_ROWS);
        assert_eq!(settings.term, "xterm-256color");
    }

    #[test]
    fn load_invalid_toml_returns_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.toml");
        std::fs::write(&path, "not valid toml {{{").unwrap();

        let result = ConsoleSettings::load_from_path(&path);
        assert!(matches!(result, Err(SettingsError::ParseError(_))));
    }

    #[test]
    fn out_of_range_values_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.toml");
        std::fs::write(&path, "cols = 2\n").unwrap();

        let settings = ConsoleSettings::load_from_path(&path).unwrap();
        assert_eq!(settings.cols, DEFAULT_COLS);
    }

    #[test]
    fn bad_prompt_pattern_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.toml");
        std::fs::write(&path, r#"prompt_pattern = "[unclosed""#).unwrap();

        let settings = ConsoleSettings::load_from_path(&path).unwrap();
        assert_eq!(settings.prompt_pattern, DEFAULT_PROMPT_PATTERN);
    }

    #[test]
    fn build_detector_uses_configured_pattern() {
        let settings = ConsoleSettings {
            prompt_pattern: r"> $".to_string(),
            ..Default::default()
        };
        let mut detector = settings.build_detector();
        assert_eq!(detector.pattern(), r"> $");
        assert!(detector.scan("repl> ").prompt.is_some());
    }

    #[test]
    fn build_detector_survives_bad_pattern() {
        let settings = ConsoleSettings {
            prompt_pattern: "[broken".to_string(),
            ..Default::default()
        };
        let detector = settings.build_detector();
        assert_eq!(detector.pattern(), DEFAULT_PROMPT_PATTERN);
    }
}
