pub mod config;
pub mod error;
pub mod event;
pub mod result;
pub mod script;

pub use config::{
    DatabaseConfig, JournalConfig, SqlupConfig, TransactionScope, UpgradeOptions, VariableMode,
};
pub use error::{Result, SqlupError};
pub use event::{EventSink, ScriptEvent, SkipReason, TracingSink};
pub use result::UpgradeResult;
pub use script::{checksum, ReplayPolicy, Script};
