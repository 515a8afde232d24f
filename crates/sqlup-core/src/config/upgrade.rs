use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::script::ReplayPolicy;

/// Granularity at which changes are committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionScope {
    /// One transaction per script and its journal entry.
    PerScript,
    /// One transaction around the whole run.
    #[default]
    WholeRun,
    /// Autocommit; no transaction is opened.
    None,
}

/// How `$Name$` placeholders without a configured value are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableMode {
    /// Fail the run.
    #[default]
    Strict,
    /// Leave the placeholder verbatim.
    Lenient,
    /// Do not substitute at all.
    Disabled,
}

/// Location of the journal table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Schema holding the table. Defaults to the connection's default schema.
    #[serde(default)]
    pub schema: Option<String>,

    #[serde(default = "default_journal_table")]
    pub table: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            schema: None,
            table: default_journal_table(),
        }
    }
}

fn default_journal_table() -> String {
    "sqlup_journal".to_string()
}

/// Options for one upgrade run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeOptions {
    #[serde(default)]
    pub transaction_scope: TransactionScope,

    /// Placeholder values, keyed by name without the `$` delimiters.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    #[serde(default)]
    pub variable_mode: VariableMode,

    /// Policy for sources that do not set one explicitly.
    #[serde(default)]
    pub replay_policy_default: ReplayPolicy,

    #[serde(default = "default_true")]
    pub include_subdirectories: bool,

    /// Prefix script names with their subdirectory path.
    #[serde(default = "default_true")]
    pub qualify_names: bool,

    /// Hold a PostgreSQL advisory lock for the duration of the run.
    #[serde(default = "default_true")]
    pub advisory_lock: bool,

    #[serde(default)]
    pub journal: JournalConfig,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        Self {
            transaction_scope: TransactionScope::default(),
            variables: BTreeMap::new(),
            variable_mode: VariableMode::default(),
            replay_policy_default: ReplayPolicy::default(),
            include_subdirectories: true,
            qualify_names: true,
            advisory_lock: true,
            journal: JournalConfig::default(),
        }
    }
}

impl UpgradeOptions {
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_transaction_scope(mut self, scope: TransactionScope) -> Self {
        self.transaction_scope = scope;
        self
    }
}

fn default_true() -> bool {
    true
}
