use sqlup_core::error::Result;
use sqlup_core::script::{ReplayPolicy, Script};

use super::{ensure_unique, ScriptSource};

/// Scripts held in memory, e.g. from `include_str!`.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedScriptSource {
    scripts: Vec<(String, String)>,
    policy: ReplayPolicy,
    group: u32,
}

impl EmbeddedScriptSource {
    pub fn new(policy: ReplayPolicy) -> Self {
        Self {
            scripts: Vec::new(),
            policy,
            group: 0,
        }
    }

    pub fn with_group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }

    pub fn with_script(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.scripts.push((name.into(), sql.into()));
        self
    }
}

impl ScriptSource for EmbeddedScriptSource {
    fn describe(&self) -> String {
        format!("embedded ({} scripts)", self.scripts.len())
    }

    fn list(&self) -> Result<Vec<Script>> {
        let mut scripts: Vec<Script> = self
            .scripts
            .iter()
            .map(|(name, sql)| {
                Script::new(name.clone(), sql.clone())
                    .with_policy(self.policy)
                    .with_group(self.group)
            })
            .collect();

        ensure_unique(&scripts)?;
        scripts.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(scripts)
    }
}
