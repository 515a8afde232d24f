//! The `Scripts/Migrations` + `Scripts/Programmability` folder convention.

use std::path::{Path, PathBuf};

use sqlup_core::config::UpgradeOptions;
use sqlup_core::error::{Result, SqlupError};
use sqlup_core::script::ReplayPolicy;
use tracing::warn;

use crate::source::{FileSystemScriptSource, ScriptSource};

pub const SCRIPTS_DIR: &str = "Scripts";
pub const MIGRATIONS_DIR: &str = "Migrations";
pub const PROGRAMMABILITY_DIR: &str = "Programmability";

/// Located script folders.
#[derive(Debug, Clone)]
pub struct ScriptsLayout {
    migrations: PathBuf,
    programmability: Option<PathBuf>,
    warnings: Vec<String>,
}

impl ScriptsLayout {
    /// Find the folders under `base_dir`.
    ///
    /// A missing `Scripts` or `Migrations` folder is fatal. A missing
    /// `Programmability` folder only produces a warning.
    pub fn locate(base_dir: &Path) -> Result<Self> {
        let scripts = base_dir.join(SCRIPTS_DIR);
        if !scripts.is_dir() {
            return Err(SqlupError::Discovery(format!(
                "Scripts not found at {}",
                scripts.display()
            )));
        }

        let migrations = scripts.join(MIGRATIONS_DIR);
        if !migrations.is_dir() {
            return Err(SqlupError::Discovery(format!(
                "Migrations not found at {}",
                migrations.display()
            )));
        }

        let mut warnings = Vec::new();
        let programmability = scripts.join(PROGRAMMABILITY_DIR);
        let programmability = if programmability.is_dir() {
            Some(programmability)
        } else {
            let message = format!(
                "Programmability objects not found at {}",
                programmability.display()
            );
            warn!("{}", message);
            warnings.push(message);
            None
        };

        Ok(Self {
            migrations,
            programmability,
            warnings,
        })
    }

    pub fn migrations(&self) -> &Path {
        &self.migrations
    }

    pub fn programmability(&self) -> Option<&Path> {
        self.programmability.as_deref()
    }

    /// Non-fatal problems found while locating folders.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Script sources for the located folders.
    ///
    /// Migrations run once; programmability objects are redeployed whenever
    /// they change. Both share a run group, so the two folders interleave by
    /// qualified name.
    pub fn sources(
        &self,
        options: &UpgradeOptions,
        extensions: &[String],
    ) -> Vec<Box<dyn ScriptSource>> {
        let mut sources: Vec<Box<dyn ScriptSource>> = vec![Box::new(
            FileSystemScriptSource::from_options(&self.migrations, options)
                .with_policy(ReplayPolicy::OnceOnly)
                .with_extensions(extensions.iter().cloned()),
        )];

        if let Some(dir) = &self.programmability {
            sources.push(Box::new(
                FileSystemScriptSource::from_options(dir, options)
                    .with_policy(ReplayPolicy::AlwaysOnChange)
                    .with_extensions(extensions.iter().cloned()),
            ));
        }

        sources
    }
}
