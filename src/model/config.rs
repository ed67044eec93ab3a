use serde::{Deserialize, Serialize};

use crate::model::query::{Selection, SortField, SortOrder};

/// Client configuration from config.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Server root; `/api/todos` is appended. Trailing slashes are ignored.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Initial list selection, overridable per command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sort: Option<SortField>,
    #[serde(default)]
    pub order: Option<SortOrder>,
    #[serde(default)]
    pub include_archived: bool,
}

impl DefaultsConfig {
    pub fn to_selection(&self) -> Selection {
        Selection {
            category: self.category.clone(),
            sort: self.sort,
            order: self.order,
            include_archived: self.include_archived,
            ..Default::default()
        }
    }
}
