//! Upgrade runs against PostgreSQL.
//!
//! These tests only run when `TEST_DATABASE_URL` points at a PostgreSQL
//! database; `DATABASE_URL` is never read. Each test works inside its own
//! schema and drops it afterwards.

use sqlx::AnyConnection;

use sqlup_core::config::{DatabaseConfig, TransactionScope, UpgradeOptions};
use sqlup_core::script::ReplayPolicy;
use sqlup_runtime::{
    connect, ChangeJournal, Dialect, EmbeddedScriptSource, ScriptSource, Upgrader,
};

struct TestSchema {
    conn: AnyConnection,
    name: String,
}

impl TestSchema {
    /// Connect and reset the schema for `tag`, or `None` without a test database.
    async fn setup(tag: &str) -> Option<Self> {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set, skipping PostgreSQL test");
            return None;
        };

        let mut conn = connect(&DatabaseConfig::from_url(url)).await.unwrap();
        assert_eq!(Dialect::of(&conn).unwrap(), Dialect::Postgres);

        let name = format!("sqlup_test_{}_{}", tag, std::process::id());
        drop_schema(&mut conn, &name).await;
        Some(Self { conn, name })
    }

    /// Options journaling into this schema, with `$Schema$` bound to it.
    fn options(&self) -> UpgradeOptions {
        let mut options = UpgradeOptions::default().with_variable("Schema", self.name.clone());
        options.journal.schema = Some(self.name.clone());
        options
    }

    fn journal(&self) -> ChangeJournal {
        ChangeJournal::new(&self.options().journal, Dialect::Postgres)
    }

    async fn schema_exists(&mut self) -> bool {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.schemata WHERE schema_name = $1",
        )
        .bind(self.name.clone())
        .fetch_one(&mut self.conn)
        .await
        .unwrap();
        count > 0
    }

    async fn count_rows(&mut self, table: &str) -> i64 {
        let sql = format!("SELECT COUNT(*) FROM {}.{}", self.name, table);
        sqlx::query_scalar(&sql)
            .fetch_one(&mut self.conn)
            .await
            .unwrap()
    }

    async fn advisory_locks_held(&mut self) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM pg_locks WHERE locktype = 'advisory' AND pid = pg_backend_pid()",
        )
        .fetch_one(&mut self.conn)
        .await
        .unwrap()
    }

    async fn teardown(mut self) {
        drop_schema(&mut self.conn, &self.name).await;
    }
}

async fn drop_schema(conn: &mut AnyConnection, name: &str) {
    let sql = format!("DROP SCHEMA IF EXISTS {} CASCADE", name);
    sqlx::raw_sql(&sql).execute(&mut *conn).await.unwrap();
}

fn scripts(scripts: &[(&str, &str)]) -> Box<dyn ScriptSource> {
    Box::new(scripts.iter().fold(
        EmbeddedScriptSource::new(ReplayPolicy::OnceOnly),
        |source, (name, sql)| source.with_script(*name, *sql),
    ))
}

const CREATE_USERS: &str = "CREATE SCHEMA IF NOT EXISTS $Schema$;\n\
    CREATE TABLE $Schema$.users (id SERIAL PRIMARY KEY, name TEXT NOT NULL);";

#[tokio::test]
async fn test_pg_journal_lives_in_configured_schema() {
    let Some(mut db) = TestSchema::setup("journal").await else {
        return;
    };
    assert!(!db.journal().exists(&mut db.conn).await.unwrap());

    let source = [
        ("001_users.sql", CREATE_USERS),
        ("002_seed.sql", "INSERT INTO $Schema$.users (name) VALUES ('alice');"),
    ];
    let first = Upgrader::new(db.options(), vec![scripts(&source)])
        .perform_upgrade(&mut db.conn)
        .await;
    assert!(first.successful(), "{:?}", first.error);
    assert_eq!(first.executed, vec!["001_users.sql", "002_seed.sql"]);

    assert!(db.journal().exists(&mut db.conn).await.unwrap());
    let entries = db.journal().entries(&mut db.conn).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(db.count_rows("sqlup_journal").await, 2);

    let second = Upgrader::new(db.options(), vec![scripts(&source)])
        .perform_upgrade(&mut db.conn)
        .await;
    assert!(second.successful());
    assert!(second.executed.is_empty());
    assert_eq!(db.count_rows("users").await, 1);

    db.teardown().await;
}

#[tokio::test]
async fn test_pg_whole_run_rollback_removes_schema_and_journal() {
    let Some(mut db) = TestSchema::setup("rollback").await else {
        return;
    };

    let source = [
        ("001_users.sql", CREATE_USERS),
        ("002_broken.sql", "INSERT INTO $Schema$.nope VALUES (1);"),
    ];
    let result = Upgrader::new(db.options(), vec![scripts(&source)])
        .perform_upgrade(&mut db.conn)
        .await;

    assert!(!result.successful());
    assert_eq!(result.failed_script.as_deref(), Some("002_broken.sql"));
    assert!(!db.schema_exists().await);
    assert!(!db.journal().exists(&mut db.conn).await.unwrap());

    db.teardown().await;
}

#[tokio::test]
async fn test_pg_per_script_failure_then_resume() {
    let Some(mut db) = TestSchema::setup("resume").await else {
        return;
    };
    let options = db
        .options()
        .with_transaction_scope(TransactionScope::PerScript);

    let broken = [
        ("001_users.sql", CREATE_USERS),
        (
            "002_seed.sql",
            "INSERT INTO $Schema$.users (name) VALUES ('alice');\nINSERT INTO $Schema$.nope VALUES (1);",
        ),
    ];
    let first = Upgrader::new(options.clone(), vec![scripts(&broken)])
        .perform_upgrade(&mut db.conn)
        .await;
    assert_eq!(first.executed, vec!["001_users.sql"]);
    assert_eq!(first.failed_script.as_deref(), Some("002_seed.sql"));
    assert_eq!(db.count_rows("users").await, 0);

    let fixed = [
        ("001_users.sql", CREATE_USERS),
        ("002_seed.sql", "INSERT INTO $Schema$.users (name) VALUES ('alice');"),
    ];
    let second = Upgrader::new(options, vec![scripts(&fixed)])
        .perform_upgrade(&mut db.conn)
        .await;
    assert!(second.successful(), "{:?}", second.error);
    assert_eq!(second.executed, vec!["002_seed.sql"]);
    assert_eq!(db.count_rows("users").await, 1);
    assert_eq!(db.count_rows("sqlup_journal").await, 2);

    db.teardown().await;
}

#[tokio::test]
async fn test_pg_advisory_lock_held_during_run_and_released() {
    let Some(mut db) = TestSchema::setup("lock").await else {
        return;
    };
    assert!(db.options().advisory_lock);

    let source = [
        ("001_users.sql", CREATE_USERS),
        (
            "002_lock_state.sql",
            "CREATE TABLE $Schema$.lock_state AS SELECT COUNT(*) AS held FROM pg_locks \
             WHERE locktype = 'advisory' AND pid = pg_backend_pid();",
        ),
    ];
    let result = Upgrader::new(db.options(), vec![scripts(&source)])
        .perform_upgrade(&mut db.conn)
        .await;
    assert!(result.successful(), "{:?}", result.error);

    let sql = format!("SELECT held FROM {}.lock_state", db.name);
    let held: i64 = sqlx::query_scalar(&sql)
        .fetch_one(&mut db.conn)
        .await
        .unwrap();
    assert_eq!(held, 1);
    assert_eq!(db.advisory_locks_held().await, 0);

    // A failing run releases the lock too.
    let failing = Upgrader::new(
        db.options(),
        vec![scripts(&[("003_broken.sql", "THIS IS NOT SQL;")])],
    )
    .perform_upgrade(&mut db.conn)
    .await;
    assert!(!failing.successful());
    assert_eq!(db.advisory_locks_held().await, 0);

    db.teardown().await;
}

#[tokio::test]
async fn test_pg_function_bodies_and_escape_strings() {
    let Some(mut db) = TestSchema::setup("plpgsql").await else {
        return;
    };

    let source = [
        ("001_users.sql", CREATE_USERS),
        (
            "002_functions.sql",
            r#"
CREATE FUNCTION $Schema$.add_user(n TEXT) RETURNS void AS $$
BEGIN
    INSERT INTO $Schema$.users (name) VALUES (n);
END;
$$ LANGUAGE plpgsql;

INSERT INTO $Schema$.users (name) VALUES (E'it\'s; fine');
SELECT $Schema$.add_user('bob');
"#,
        ),
    ];
    let result = Upgrader::new(db.options(), vec![scripts(&source)])
        .perform_upgrade(&mut db.conn)
        .await;
    assert!(result.successful(), "{:?}", result.error);

    let sql = format!("SELECT name FROM {}.users ORDER BY id", db.name);
    let names: Vec<String> = sqlx::query_scalar(&sql)
        .fetch_all(&mut db.conn)
        .await
        .unwrap();
    assert_eq!(names, vec!["it's; fine", "bob"]);

    db.teardown().await;
}
