use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// UI theme preference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::System => "system",
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    /// Unknown values fall back to `System`
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "light" => Theme::Light,
            "dark" => Theme::Dark,
            _ => Theme::System,
        }
    }
}

/// Point-in-time view of every preference the repository joins on read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceSnapshot {
    pub archived_threads: BTreeSet<i64>,
    pub pinned_threads: BTreeSet<i64>,
    pub muted_threads: BTreeSet<i64>,
    pub blocked_addresses: BTreeSet<String>,
    pub theme: Theme,
    pub auto_archive_unknown: bool,
}
