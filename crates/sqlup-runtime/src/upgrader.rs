//! Upgrade orchestration.
//!
//! The [`Upgrader`] discovers scripts, loads the journal, plans and runs, and
//! reports everything through one [`UpgradeResult`]. On PostgreSQL it can hold
//! an advisory lock so that only one process upgrades a database at a time.

use std::sync::Arc;

use sqlx::AnyConnection;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use sqlup_core::config::{SqlupConfig, UpgradeOptions};
use sqlup_core::error::{Result, SqlupError};
use sqlup_core::event::{EventSink, ScriptEvent, TracingSink};
use sqlup_core::result::UpgradeResult;
use sqlup_core::script::Script;

use crate::db::Dialect;
use crate::journal::{ChangeJournal, JournalEntry};
use crate::layout::ScriptsLayout;
use crate::planner::{self, ExecutionPlan};
use crate::runner::TransactionalRunner;
use crate::source::{collect_scripts, ScriptSource};

/// Lock ID for the upgrade advisory lock (arbitrary but consistent).
/// "SQLUP" in hex.
const UPGRADE_LOCK_ID: i64 = 0x53514C5550;

/// Runs pending scripts from a set of sources against one database.
pub struct Upgrader {
    options: UpgradeOptions,
    sources: Vec<Box<dyn ScriptSource>>,
    sink: Arc<dyn EventSink>,
    cancel: Option<CancellationToken>,
    warnings: Vec<String>,
}

impl Upgrader {
    pub fn new(options: UpgradeOptions, sources: Vec<Box<dyn ScriptSource>>) -> Self {
        Self {
            options,
            sources,
            sink: Arc::new(TracingSink),
            cancel: None,
            warnings: Vec::new(),
        }
    }

    /// Upgrader over the conventional `Scripts` folders under
    /// `config.scripts.base_dir`.
    pub fn from_config(config: &SqlupConfig) -> Result<Self> {
        let layout = ScriptsLayout::locate(&config.scripts.base_dir)?;
        let options = config.upgrade_options();
        let sources = layout.sources(&options, &config.scripts.extensions);

        let mut upgrader = Self::new(options, sources);
        upgrader.warnings = layout.warnings().to_vec();
        Ok(upgrader)
    }

    /// Replace the default sink, which forwards events to `tracing`.
    pub fn with_event_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Abort between scripts once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn options(&self) -> &UpgradeOptions {
        &self.options
    }

    /// All scripts from every source, in execution order.
    pub fn discover(&self) -> Result<Vec<Script>> {
        collect_scripts(&self.sources)
    }

    /// The plan a run would execute now, without executing it.
    pub async fn pending(&self, conn: &mut AnyConnection) -> Result<ExecutionPlan> {
        let scripts = self.discover()?;
        let journal = self.journal(conn)?;
        let applied = journal.load(conn).await?;
        Ok(planner::plan(scripts, &applied))
    }

    /// Journal entries in application order.
    pub async fn applied(&self, conn: &mut AnyConnection) -> Result<Vec<JournalEntry>> {
        self.journal(conn)?.entries(conn).await
    }

    /// Run every pending script.
    ///
    /// Never fails outright: errors are reported inside the result.
    pub async fn perform_upgrade(&self, conn: &mut AnyConnection) -> UpgradeResult {
        for message in &self.warnings {
            self.sink.emit(ScriptEvent::Warning {
                message: message.clone(),
            });
        }

        let scripts = match self.discover() {
            Ok(scripts) => scripts,
            Err(e) => return self.fail_early(e),
        };
        let dialect = match Dialect::of(conn) {
            Ok(dialect) => dialect,
            Err(e) => return self.fail_early(e),
        };

        let lock = self.options.advisory_lock && dialect.supports_advisory_locks();
        if lock {
            if let Err(e) = acquire_lock(conn).await {
                return self.fail_early(e);
            }
        }

        let result = self.upgrade_inner(conn, dialect, scripts).await;

        // Always release lock, even on error
        if lock {
            if let Err(e) = release_lock(conn).await {
                warn!("Failed to release upgrade lock: {}", e);
            }
        }

        if result.successful() {
            info!(executed = result.executed.len(), "Upgrade successful");
        }
        result
    }

    async fn upgrade_inner(
        &self,
        conn: &mut AnyConnection,
        dialect: Dialect,
        scripts: Vec<Script>,
    ) -> UpgradeResult {
        let journal = ChangeJournal::new(&self.options.journal, dialect);
        let applied = match journal.load(conn).await {
            Ok(applied) => applied,
            Err(e) => return self.fail_early(e),
        };
        debug!(
            discovered = scripts.len(),
            journaled = applied.len(),
            "Planning upgrade"
        );

        let plan = planner::plan(scripts, &applied);
        for (script, reason) in plan.skipped() {
            self.sink.emit(ScriptEvent::Skipped {
                script: script.clone(),
                reason: *reason,
            });
        }

        let mut runner =
            TransactionalRunner::new(&journal, self.options.transaction_scope, self.sink.as_ref());
        if let Some(token) = &self.cancel {
            runner = runner.with_cancellation(token);
        }

        let mut result = runner
            .run(
                conn,
                &plan,
                &self.options.variables,
                self.options.variable_mode,
            )
            .await;
        result.skipped = plan.skipped().iter().map(|(name, _)| name.clone()).collect();
        result
    }

    fn journal(&self, conn: &AnyConnection) -> Result<ChangeJournal> {
        Ok(ChangeJournal::new(&self.options.journal, Dialect::of(conn)?))
    }

    fn fail_early(&self, error: SqlupError) -> UpgradeResult {
        error!("Upgrade failed: {}", error);
        UpgradeResult::from_error(error)
    }
}

async fn acquire_lock(conn: &mut AnyConnection) -> Result<()> {
    debug!("Acquiring upgrade lock...");
    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(UPGRADE_LOCK_ID)
        .execute(&mut *conn)
        .await
        .map_err(|e| SqlupError::Database(format!("Failed to acquire upgrade lock: {}", e)))?;
    debug!("Upgrade lock acquired");
    Ok(())
}

async fn release_lock(conn: &mut AnyConnection) -> Result<()> {
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(UPGRADE_LOCK_ID)
        .execute(&mut *conn)
        .await
        .map_err(|e| SqlupError::Database(format!("Failed to release upgrade lock: {}", e)))?;
    debug!("Upgrade lock released");
    Ok(())
}
