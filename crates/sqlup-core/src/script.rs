use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Whether a script may run again after it has been journaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPolicy {
    /// Run exactly once per identity.
    #[default]
    OnceOnly,
    /// Run again whenever the content checksum changes.
    AlwaysOnChange,
}

/// A single migration script.
///
/// Scripts are immutable once loaded; the checksum is computed from the raw
/// text at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    name: String,
    contents: String,
    checksum: String,
    policy: ReplayPolicy,
    group: u32,
}

impl Script {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        let contents = contents.into();
        Self {
            name: name.into(),
            checksum: checksum(&contents),
            contents,
            policy: ReplayPolicy::OnceOnly,
            group: 0,
        }
    }

    /// Set the replay policy.
    pub fn with_policy(mut self, policy: ReplayPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the run group. Lower groups run first.
    pub fn with_group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }

    /// Qualified script name; the journal identity.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    /// Lower-case hex SHA-256 of the contents.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn policy(&self) -> ReplayPolicy {
        self.policy
    }

    pub fn group(&self) -> u32 {
        self.group
    }

    /// Sort key used to order scripts across sources.
    pub fn order_key(&self) -> (u32, &str) {
        (self.group, &self.name)
    }
}

/// Compute the checksum stored in the journal for a script body.
pub fn checksum(contents: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents.as_bytes());
    format!("{:x}", hasher.finalize())
}
