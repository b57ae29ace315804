//! Engine configuration.
//!
//! A [`TerminalConfig`] carries the settings an embedder chooses before
//! constructing a [`Terminal`](crate::Terminal): grid size, scrollback
//! depth, emulation profile, and word-character spec. It loads from TOML,
//! with every field optional:
//!
//! ```toml
//! cols = 120
//! rows = 40
//! scrollback_lines = 10000
//! emulation = "xterm"
//! word_chars = "-A-Za-z0-9_./"
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::terminal::{Terminal, DEFAULT_EMULATION, DEFAULT_SCROLLBACK_LINES};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid grid size {cols}x{rows}")]
    InvalidSize { cols: u16, rows: u16 },
    #[error("unknown emulation {0:?}")]
    UnknownEmulation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub cols: u16,
    pub rows: u16,
    /// Maximum retained scrollback rows.
    pub scrollback_lines: usize,
    /// Emulation profile name, e.g. `"xterm"` or `"vt102"`.
    pub emulation: String,
    /// Extra word characters beyond alphanumerics, as literals and
    /// `a-z` ranges.
    pub word_chars: String,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            scrollback_lines: DEFAULT_SCROLLBACK_LINES,
            emulation: DEFAULT_EMULATION.to_string(),
            word_chars: String::new(),
        }
    }
}

impl TerminalConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Build a terminal from this configuration.
    pub fn build(&self) -> Result<Terminal, ConfigError> {
        if self.cols == 0 || self.rows == 0 {
            return Err(ConfigError::InvalidSize {
                cols: self.cols,
                rows: self.rows,
            });
        }
        let mut term = Terminal::new(self.cols, self.rows);
        term.set_emulation(&self.emulation)
            .map_err(|_| ConfigError::UnknownEmulation(self.emulation.clone()))?;
        term.set_scrollback_lines(self.scrollback_lines);
        if !self.word_chars.is_empty() {
            term.set_word_chars(&self.word_chars);
        }
        Ok(term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: TerminalConfig = toml::from_str("rows = 50").unwrap();
        assert_eq!(cfg.rows, 50);
        assert_eq!(cfg.cols, 80);
        assert_eq!(cfg.emulation, "xterm");
    }

    #[test]
    fn build_honors_settings() {
        let cfg: TerminalConfig = toml::from_str(
            r#"
            cols = 100
            rows = 30
            emulation = "vt102"
            "#,
        )
        .unwrap();
        let term = cfg.build().unwrap();
        assert_eq!(term.size(), (100, 30));
        assert_eq!(term.emulation(), "vt102");
    }

    #[test]
    fn build_rejects_bad_values() {
        let cfg = TerminalConfig {
            cols: 0,
            ..TerminalConfig::default()
        };
        assert!(matches!(cfg.build(), Err(ConfigError::InvalidSize { .. })));

        let cfg = TerminalConfig {
            emulation: "vt9000".to_string(),
            ..TerminalConfig::default()
        };
        assert!(matches!(cfg.build(), Err(ConfigError::UnknownEmulation(_))));
    }
}
