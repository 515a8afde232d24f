pub mod db;
pub mod journal;
pub mod layout;
pub mod planner;
pub mod runner;
pub mod source;
pub mod substitution;
pub mod upgrader;

pub use db::{connect, Dialect};
pub use journal::{AppliedScripts, ChangeJournal, JournalEntry, JournalStatus};
pub use layout::ScriptsLayout;
pub use planner::{plan, ExecutionPlan};
pub use runner::{split_sql_statements, TransactionalRunner};
pub use source::{collect_scripts, EmbeddedScriptSource, FileSystemScriptSource, ScriptSource};
pub use substitution::substitute;
pub use upgrader::Upgrader;
