//! Text-path vocabulary for the automapper.
//!
//! Every MUD words its room output a little differently. The defaults match
//! the common Diku/ROM style; anything else is supplied as JSON:
//!
//! ```
//! use mudmap_logic::config::MapperConfig;
//!
//! let config = MapperConfig::from_json(r#"{ "look_commands": ["l", "look", "glance"] }"#).unwrap();
//! assert!(config.is_look_command("GLANCE"));
//! assert!(config.validate().is_empty());
//! ```

use crate::directions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Line prefixes introducing the exits line, matched case-insensitively.
    pub exit_prefixes: Vec<String>,
    /// Commands that re-observe the current room.
    pub look_commands: Vec<String>,
    /// Lines ignored while waiting for the room name.
    pub skip_lines: Vec<String>,
    /// Extra command → direction mappings on top of the compass set.
    pub direction_aliases: BTreeMap<String, String>,
    /// Zone for text-path rooms created with no known neighbour.
    pub default_zone: String,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            exit_prefixes: vec![
                "Obvious exits:".to_string(),
                "Exits:".to_string(),
                "[Exits:".to_string(),
                "[ Exits:".to_string(),
            ],
            look_commands: vec!["l".to_string(), "look".to_string()],
            skip_lines: vec!["ok".to_string()],
            direction_aliases: BTreeMap::new(),
            default_zone: String::new(),
        }
    }
}

impl MapperConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Direction moved by a typed command, if it is a movement command.
    pub fn movement_direction(&self, command: &str) -> Option<String> {
        let cmd = command.trim().to_lowercase();
        if let Some(dir) = self.direction_aliases.get(&cmd) {
            return Some(dir.clone());
        }
        directions::canonical(&cmd).map(str::to_string)
    }

    pub fn is_look_command(&self, command: &str) -> bool {
        let cmd = command.trim();
        self.look_commands.iter().any(|c| c.eq_ignore_ascii_case(cmd))
    }

    pub fn is_skip_line(&self, line: &str) -> bool {
        let line = line.trim().trim_end_matches(['.', '!']);
        self.skip_lines.iter().any(|s| s.eq_ignore_ascii_case(line))
    }

    /// If `line` is an exits line, the text after its prefix.
    pub fn exits_payload<'a>(&self, line: &'a str) -> Option<&'a str> {
        let trimmed = line.trim_start();
        self.exit_prefixes.iter().find_map(|prefix| {
            let head = trimmed.get(..prefix.len())?;
            head.eq_ignore_ascii_case(prefix)
                .then(|| &trimmed[prefix.len()..])
        })
    }

    /// Resolve an exit token from an exits line to a direction name.
    pub fn exit_direction(&self, token: &str) -> Option<String> {
        self.movement_direction(token)
    }

    /// Check the configuration for unusable entries.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.exit_prefixes.is_empty() {
            problems.push("no exit prefixes configured".to_string());
        }
        for prefix in &self.exit_prefixes {
            if prefix.trim().is_empty() {
                problems.push("exit prefix must not be blank".to_string());
            }
        }
        for (alias, dir) in &self.direction_aliases {
            if alias.trim().is_empty() {
                problems.push(format!("alias for '{}' is blank", dir));
            }
            if dir.trim().is_empty() {
                problems.push(format!("alias '{}' maps to an empty direction", alias));
            }
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(MapperConfig::default().validate().is_empty());
    }

    #[test]
    fn test_movement_direction() {
        let mut config = MapperConfig::default();
        config
            .direction_aliases
            .insert("enter".to_string(), "enter portal".to_string());
        assert_eq!(config.movement_direction("N"), Some("north".to_string()));
        assert_eq!(config.movement_direction("enter"), Some("enter portal".to_string()));
        assert_eq!(config.movement_direction("say hi"), None);
    }

    #[test]
    fn test_exits_payload() {
        let config = MapperConfig::default();
        assert_eq!(config.exits_payload("Obvious exits: north south"), Some(" north south"));
        assert_eq!(config.exits_payload("[Exits: east]"), Some(" east]"));
        assert_eq!(config.exits_payload("exits: up"), Some(" up"));
        assert_eq!(config.exits_payload("The exit is blocked."), None);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = MapperConfig::from_json(r#"{ "default_zone": "Midgaard" }"#).unwrap();
        assert_eq!(config.default_zone, "Midgaard");
        assert_eq!(config.look_commands, vec!["l", "look"]);
    }

    #[test]
    fn test_validate_reports_bad_alias() {
        let mut config = MapperConfig::default();
        config.direction_aliases.insert("x".to_string(), " ".to_string());
        config.exit_prefixes.push(String::new());
        assert_eq!(config.validate().len(), 2);
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(matches!(
            MapperConfig::from_json("{ not json"),
            Err(ConfigError::Json(_))
        ));
    }
}
