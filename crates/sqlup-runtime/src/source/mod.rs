//! Script discovery.
//!
//! A [`ScriptSource`] yields scripts from one provider. [`collect_scripts`]
//! merges several providers into the single ordered list the planner works
//! on: ascending by run group, then by qualified name. Sources share group
//! 0 unless one opts into another with `with_group`.

mod embedded;
mod filesystem;

pub use embedded::EmbeddedScriptSource;
pub use filesystem::FileSystemScriptSource;

use std::collections::HashSet;

use sqlup_core::error::{Result, SqlupError};
use sqlup_core::script::Script;
use tracing::debug;

/// A provider of migration scripts.
pub trait ScriptSource: Send + Sync {
    /// Human-readable description used in logs.
    fn describe(&self) -> String;

    /// All scripts from this provider, ordered by name.
    fn list(&self) -> Result<Vec<Script>>;
}

/// Merge the scripts of every source into one deterministic order.
///
/// Fails if two scripts share an identity, since the journal could not tell
/// them apart.
pub fn collect_scripts(sources: &[Box<dyn ScriptSource>]) -> Result<Vec<Script>> {
    let mut scripts = Vec::new();
    for source in sources {
        let listed = source.list()?;
        debug!(source = %source.describe(), count = listed.len(), "Listed scripts");
        scripts.extend(listed);
    }

    ensure_unique(&scripts)?;
    scripts.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    Ok(scripts)
}

pub(crate) fn ensure_unique(scripts: &[Script]) -> Result<()> {
    let mut seen = HashSet::with_capacity(scripts.len());
    for script in scripts {
        if !seen.insert(script.name()) {
            return Err(SqlupError::Discovery(format!(
                "Duplicate script name '{}'",
                script.name()
            )));
        }
    }
    Ok(())
}
