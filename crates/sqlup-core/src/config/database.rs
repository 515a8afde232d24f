use serde::{Deserialize, Serialize};

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL of the target database (`postgres://` or `sqlite:`).
    #[serde(default)]
    pub url: String,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl DatabaseConfig {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// True when the URL is set and has no unresolved `${VAR}` reference.
    pub fn is_configured(&self) -> bool {
        let url = self.url.trim();
        !url.is_empty() && !url.contains("${")
    }
}

fn default_connect_timeout() -> u64 {
    30
}
