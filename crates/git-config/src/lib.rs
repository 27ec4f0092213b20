pub mod error;
pub mod parse;
pub mod file;
pub mod set;
pub mod types;
pub mod include;
pub mod env;
pub mod url_rewrite;

pub use error::ConfigError;
pub use file::ConfigFile;
pub use set::ConfigSet;
pub use types::{parse_bool, parse_int, parse_path, parse_color, ColorSpec, PushDefault, PushConfig};
pub use url_rewrite::{UrlRewrite, rewrite_url};

use bstr::{BString, ByteSlice, ByteVec};

/// Configuration file scope (priority order, low to high).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigScope {
    /// System-wide: /etc/gitconfig
    System,
    /// User-global: ~/.gitconfig
    Global,
    /// Repository-local: .git/config
    Local,
    /// Worktree-specific: .git/config.worktree
    Worktree,
    /// Command-line: -c key=value
    Command,
}

/// A normalized configuration key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigKey {
    /// Lowercased section name.
    pub section: BString,
    /// Case-preserved subsection name (optional).
    pub subsection: Option<BString>,
    /// Lowercased variable name.
    pub name: BString,
}

impl ConfigKey {
    /// Parse from "section.name" or "section.subsection.name".
    ///
    /// Section and variable names are lowercased. Subsection preserves case.
    pub fn parse(key: &str) -> Result<Self, ConfigError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::InvalidKey("empty key".into()));
        }

        // Split on dots. The tricky part is that subsection can contain dots.
        // Format: section.name or section.subsection.with.dots.name
        // The section is everything before the first dot, the name is everything
        // after the last dot, and the subsection is everything in between.
        let first_dot = key.find('.').ok_or_else(|| {
            ConfigError::InvalidKey(format!("key must contain at least one dot: {}", key))
        })?;

        let section = &key[..first_dot];
        let rest = &key[first_dot + 1..];

        if rest.is_empty() {
            return Err(ConfigError::InvalidKey(format!(
                "key must have a variable name after the dot: {}",
                key
            )));
        }

        // Find the last dot in rest to separate subsection from name
        let (subsection, name) = if let Some(last_dot) = rest.rfind('.') {
            let sub = &rest[..last_dot];
            let name = &rest[last_dot + 1..];
            if name.is_empty() {
                return Err(ConfigError::InvalidKey(format!(
                    "key must have a variable name after the last dot: {}",
                    key
                )));
            }
            (Some(BString::from(sub.as_bytes())), name)
        } else {
            (None, rest)
        };

        if name.is_empty() {
            return Err(ConfigError::InvalidKey(format!(
                "empty variable name in key: {}",
                key
            )));
        }

        Ok(ConfigKey {
            section: BString::from(section.to_ascii_lowercase().as_bytes()),
            subsection,
            name: BString::from(name.to_ascii_lowercase().as_bytes()),
        })
    }

    /// Format as the canonical "section.subsection.name" string.
    pub fn to_canonical(&self) -> String {
        if let Some(ref sub) = self.subsection {
            format!(
                "{}.{}.{}",
                self.section.to_str_lossy(),
                sub.to_str_lossy(),
                self.name.to_str_lossy()
            )
        } else {
            format!(
                "{}.{}",
                self.section.to_str_lossy(),
                self.name.to_str_lossy()
            )
        }
    }

    /// Check if this key matches another key.
    /// Section and name are compared case-insensitively.
    /// Subsection is compared case-sensitively.
    pub fn matches(&self, other: &ConfigKey) -> bool {
        self.section == other.section
            && self.name == other.name
            && self.subsection == other.subsection
    }

    /// The key that records a deletion-marker tombstone for this key:
    /// same section/subsection, with ".deleted" appended to the name.
    pub fn deletion_marker_key(&self) -> ConfigKey {
        let mut name = self.name.clone();
        name.push_str(b".deleted");
        ConfigKey {
            section: self.section.clone(),
            subsection: self.subsection.clone(),
            name,
        }
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_canonical())
    }
}

/// A single configuration key-value pair with metadata.
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    /// The full key.
    pub key: ConfigKey,
    /// The raw string value (None for boolean keys with no = sign).
    pub value: Option<BString>,
    /// Which scope this entry came from.
    pub scope: ConfigScope,
    /// File path this entry was read from (None for command-line/env).
    pub source_file: Option<std::path::PathBuf>,
    /// Line number in the source file.
    pub line_number: Option<usize>,
}
