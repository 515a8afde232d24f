//! Executes a plan against the target database.

use std::collections::BTreeMap;
use std::time::Instant;

use sqlx::AnyConnection;
use sqlx::Connection;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sqlup_core::config::{TransactionScope, VariableMode};
use sqlup_core::error::{Result, SqlupError};
use sqlup_core::event::{EventSink, ScriptEvent};
use sqlup_core::result::UpgradeResult;
use sqlup_core::script::Script;

use crate::db::Dialect;
use crate::journal::ChangeJournal;
use crate::planner::ExecutionPlan;
use crate::substitution::substitute;

/// Runs planned scripts on one connection, journaling each one in the same
/// transaction as its statements.
pub struct TransactionalRunner<'a> {
    journal: &'a ChangeJournal,
    scope: TransactionScope,
    sink: &'a dyn EventSink,
    cancel: Option<&'a CancellationToken>,
}

struct Prepared<'p> {
    script: &'p Script,
    sql: String,
}

impl<'a> TransactionalRunner<'a> {
    pub fn new(journal: &'a ChangeJournal, scope: TransactionScope, sink: &'a dyn EventSink) -> Self {
        Self {
            journal,
            scope,
            sink,
            cancel: None,
        }
    }

    /// Stop between scripts once the token is cancelled.
    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Execute the plan. Stops at the first failing script.
    ///
    /// Variables are substituted into every script before anything runs, so
    /// an undefined variable in strict mode leaves the database untouched.
    pub async fn run(
        &self,
        conn: &mut AnyConnection,
        plan: &ExecutionPlan,
        variables: &BTreeMap<String, String>,
        mode: VariableMode,
    ) -> UpgradeResult {
        let mut result = UpgradeResult::default();

        let mut prepared = Vec::with_capacity(plan.len());
        for script in plan.scripts() {
            match substitute(script.name(), script.contents(), variables, mode) {
                Ok(sql) => prepared.push(Prepared { script, sql }),
                Err(e) => {
                    self.fail(&mut result, script.name(), e);
                    return result;
                }
            }
        }

        if prepared.is_empty() {
            info!("No new scripts need to be executed");
            return result;
        }

        match self.scope {
            TransactionScope::WholeRun => self.run_whole(conn, &prepared, &mut result).await,
            TransactionScope::PerScript => self.run_per_script(conn, &prepared, &mut result).await,
            TransactionScope::None => self.run_autocommit(conn, &prepared, &mut result).await,
        }

        result
    }

    async fn run_whole(
        &self,
        conn: &mut AnyConnection,
        prepared: &[Prepared<'_>],
        result: &mut UpgradeResult,
    ) {
        let mut tx = match conn.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                result.record_failure(SqlupError::Database(format!(
                    "Failed to begin transaction: {}",
                    e
                )));
                return;
            }
        };

        let mut journal_ready = false;
        let mut applied = Vec::with_capacity(prepared.len());
        for item in prepared {
            let name = item.script.name();
            if let Err(e) = self.check_cancelled(name) {
                self.fail(result, name, e);
                break;
            }

            let start = Instant::now();
            match self.apply(&mut tx, item, &mut journal_ready).await {
                Ok(()) => applied.push((name, elapsed_ms(start))),
                Err(e) => {
                    self.fail(result, name, e);
                    break;
                }
            }
        }

        if result.successful() {
            if let Err(e) = tx.commit().await {
                result.record_failure(SqlupError::Database(format!(
                    "Failed to commit transaction: {}",
                    e
                )));
                return;
            }
            // Nothing is durable before the commit, so report applied now.
            for (name, duration_ms) in applied {
                self.applied(result, name, duration_ms);
            }
        } else {
            if let Err(e) = tx.rollback().await {
                warn!("Failed to roll back upgrade transaction: {}", e);
            }
            self.sink.emit(ScriptEvent::Warning {
                message: format!(
                    "Rolled back {} script(s); the database is unchanged",
                    applied.len()
                ),
            });
        }
    }

    async fn run_per_script(
        &self,
        conn: &mut AnyConnection,
        prepared: &[Prepared<'_>],
        result: &mut UpgradeResult,
    ) {
        let mut journal_ready = false;
        for item in prepared {
            let name = item.script.name();
            if let Err(e) = self.check_cancelled(name) {
                self.fail(result, name, e);
                return;
            }

            let start = Instant::now();
            let outcome = async {
                let mut tx = conn.begin().await.map_err(|e| {
                    SqlupError::Database(format!("Failed to begin transaction: {}", e))
                })?;
                let mut ready = journal_ready;
                // Dropping the transaction on error rolls it back.
                self.apply(&mut tx, item, &mut ready).await?;
                tx.commit().await.map_err(|e| SqlupError::Execution {
                    script: name.to_string(),
                    message: format!("commit failed: {}", e),
                })?;
                Ok::<bool, SqlupError>(ready)
            }
            .await;

            match outcome {
                Ok(ready) => {
                    journal_ready = ready;
                    self.applied(result, name, elapsed_ms(start));
                }
                Err(e) => {
                    self.fail(result, name, e);
                    return;
                }
            }
        }
    }

    async fn run_autocommit(
        &self,
        conn: &mut AnyConnection,
        prepared: &[Prepared<'_>],
        result: &mut UpgradeResult,
    ) {
        let mut journal_ready = false;
        for item in prepared {
            let name = item.script.name();
            if let Err(e) = self.check_cancelled(name) {
                self.fail(result, name, e);
                return;
            }

            let start = Instant::now();
            match self.apply(conn, item, &mut journal_ready).await {
                Ok(()) => self.applied(result, name, elapsed_ms(start)),
                Err(e) => {
                    self.fail(result, name, e);
                    return;
                }
            }
        }
    }

    /// Execute one script's statements and journal it on `conn`.
    async fn apply(
        &self,
        conn: &mut AnyConnection,
        item: &Prepared<'_>,
        journal_ready: &mut bool,
    ) -> Result<()> {
        let name = item.script.name();
        info!("Executing script: {}", name);

        let statements = match self.journal.dialect() {
            // SQLite runs multi-statement text itself, including trigger
            // bodies whose `BEGIN ... END` blocks contain semicolons.
            Dialect::Sqlite => whole_script(&item.sql),
            Dialect::Postgres => split_sql_statements(&item.sql),
        };

        for (idx, statement) in statements.iter().enumerate() {
            debug!(script = name, statement = idx + 1, "Executing statement");
            sqlx::raw_sql(statement)
                .execute(&mut *conn)
                .await
                .map_err(|e| SqlupError::Execution {
                    script: name.to_string(),
                    message: format!("statement {}: {}", idx + 1, e),
                })?;
        }

        if !*journal_ready {
            self.journal.ensure_table(conn).await?;
            *journal_ready = true;
        }
        self.journal.record_applied(conn, item.script).await
    }

    fn check_cancelled(&self, next: &str) -> Result<()> {
        match self.cancel {
            Some(token) if token.is_cancelled() => Err(SqlupError::Cancelled(next.to_string())),
            _ => Ok(()),
        }
    }

    fn applied(&self, result: &mut UpgradeResult, name: &str, duration_ms: u64) {
        result.executed.push(name.to_string());
        self.sink.emit(ScriptEvent::Applied {
            script: name.to_string(),
            duration_ms,
        });
    }

    fn fail(&self, result: &mut UpgradeResult, name: &str, error: SqlupError) {
        self.sink.emit(ScriptEvent::Failed {
            script: name.to_string(),
            error: error.to_string(),
        });
        result.record_script_failure(name, error);
    }
}

/// The script as a single batch, or nothing if it holds no statement.
fn whole_script(sql: &str) -> Vec<String> {
    let sql = sql.trim();
    if sql.is_empty() || is_comment_only(sql) {
        return Vec::new();
    }
    vec![sql.to_string()]
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Split SQL into individual statements.
///
/// Semicolons inside quoted strings, quoted identifiers, comments and
/// PostgreSQL dollar-quoted bodies do not end a statement. Statements made
/// only of whitespace and comments are dropped.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                let backslash_escapes = c == '\'' && ends_with_escape_prefix(&current);
                current.push(c);
                // Doubled quotes escape themselves and just reopen the string.
                let mut escaped = false;
                for next in chars.by_ref() {
                    current.push(next);
                    if escaped {
                        escaped = false;
                    } else if backslash_escapes && next == '\\' {
                        escaped = true;
                    } else if next == c {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                current.push(c);
                for next in chars.by_ref() {
                    current.push(next);
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                current.push(c);
                let mut prev = '\0';
                for next in chars.by_ref() {
                    current.push(next);
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            '$' => {
                current.push(c);
                // Collect a potential tag like $$ or $body$
                let mut tag = String::from("$");
                while let Some(&next) = chars.peek() {
                    let valid = next == '_'
                        || next.is_alphabetic()
                        || (next.is_ascii_digit() && tag.len() > 1);
                    if !valid {
                        break;
                    }
                    tag.push(next);
                    current.push(next);
                    chars.next();
                }
                if chars.peek() != Some(&'$') {
                    continue;
                }
                tag.push('$');
                current.push('$');
                chars.next();

                // Copy the body verbatim up to the closing tag
                let mut body = String::new();
                for next in chars.by_ref() {
                    body.push(next);
                    if body.ends_with(tag.as_str()) {
                        break;
                    }
                }
                current.push_str(&body);
            }
            ';' => {
                push_statement(&mut statements, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }

    // Don't forget the last statement (might not end with ;)
    push_statement(&mut statements, &current);
    statements
}

/// True when the text ends in a standalone `E` or `e`, the prefix of a
/// PostgreSQL escape string such as `E'it\'s'`.
fn ends_with_escape_prefix(text: &str) -> bool {
    let mut rev = text.chars().rev();
    match rev.next() {
        Some('E' | 'e') => !matches!(rev.next(), Some(p) if p.is_alphanumeric() || p == '_'),
        _ => false,
    }
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let stmt = raw.trim();
    if stmt.is_empty() || is_comment_only(stmt) {
        return;
    }
    statements.push(stmt.to_string());
}

fn is_comment_only(stmt: &str) -> bool {
    let mut rest = stmt.trim_start();
    loop {
        if rest.is_empty() {
            return true;
        }
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, r)| r).unwrap_or("").trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, r)| r).unwrap_or("").trim_start();
        } else {
            return false;
        }
    }
}
