use std::path::{Path, PathBuf};

use sqlup_core::config::UpgradeOptions;
use sqlup_core::error::{Result, SqlupError};
use sqlup_core::script::{ReplayPolicy, Script};
use tracing::debug;
use walkdir::WalkDir;

use super::{ensure_unique, ScriptSource};

/// Scripts read from a folder tree.
///
/// With qualified naming, a file at `<root>/tables/001_init.sql` is named
/// `tables.001_init.sql`; otherwise it is named `001_init.sql`.
#[derive(Debug, Clone)]
pub struct FileSystemScriptSource {
    root: PathBuf,
    include_subdirectories: bool,
    qualify_names: bool,
    policy: ReplayPolicy,
    group: u32,
    extensions: Vec<String>,
}

impl FileSystemScriptSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include_subdirectories: false,
            qualify_names: false,
            policy: ReplayPolicy::OnceOnly,
            group: 0,
            extensions: vec!["sql".to_string()],
        }
    }

    /// Source configured from the run options' discovery defaults.
    pub fn from_options(root: impl Into<PathBuf>, options: &UpgradeOptions) -> Self {
        Self::new(root)
            .include_subdirectories(options.include_subdirectories)
            .qualify_names(options.qualify_names)
            .with_policy(options.replay_policy_default)
    }

    pub fn include_subdirectories(mut self, include: bool) -> Self {
        self.include_subdirectories = include;
        self
    }

    pub fn qualify_names(mut self, qualify: bool) -> Self {
        self.qualify_names = qualify;
        self
    }

    pub fn with_policy(mut self, policy: ReplayPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_script(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    fn script_name(&self, path: &Path) -> Result<String> {
        let relative = path.strip_prefix(&self.root).map_err(|_| {
            SqlupError::Discovery(format!("Script {:?} is outside {:?}", path, self.root))
        })?;

        let parts: Option<Vec<&str>> = if self.qualify_names {
            relative.iter().map(|part| part.to_str()).collect()
        } else {
            relative.file_name().and_then(|f| f.to_str()).map(|f| vec![f])
        };

        parts
            .map(|parts| parts.join("."))
            .ok_or_else(|| SqlupError::Discovery(format!("Invalid script file name {:?}", path)))
    }
}

impl ScriptSource for FileSystemScriptSource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn list(&self) -> Result<Vec<Script>> {
        if !self.root.is_dir() {
            return Err(SqlupError::Discovery(format!(
                "Script folder not found at {}",
                self.root.display()
            )));
        }

        let max_depth = if self.include_subdirectories {
            usize::MAX
        } else {
            1
        };

        let mut scripts = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                SqlupError::Discovery(format!("Failed to scan {}: {}", self.root.display(), e))
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() || !self.is_script(path) {
                continue;
            }

            let name = self.script_name(path)?;
            let sql = std::fs::read_to_string(path).map_err(|e| {
                SqlupError::Discovery(format!("Failed to read {}: {}", path.display(), e))
            })?;

            scripts.push(
                Script::new(name, sql)
                    .with_policy(self.policy)
                    .with_group(self.group),
            );
        }

        ensure_unique(&scripts)?;
        scripts.sort_by(|a, b| a.name().cmp(b.name()));

        debug!("Loaded {} scripts from {}", scripts.len(), self.root.display());
        Ok(scripts)
    }
}
