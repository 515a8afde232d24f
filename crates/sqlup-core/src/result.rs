use crate::error::SqlupError;

/// Outcome of one upgrade run. Owned by the caller.
#[derive(Debug, Default)]
pub struct UpgradeResult {
    /// Scripts executed and journaled, in execution order.
    pub executed: Vec<String>,
    /// Scripts left out of the plan.
    pub skipped: Vec<String>,
    /// First script that failed, when the failure is attached to a script.
    pub failed_script: Option<String>,
    pub error: Option<SqlupError>,
}

impl UpgradeResult {
    pub fn successful(&self) -> bool {
        self.error.is_none()
    }

    /// Result for a run that failed before any script was considered.
    pub fn from_error(error: SqlupError) -> Self {
        Self {
            failed_script: error.script().map(str::to_string),
            error: Some(error),
            ..Default::default()
        }
    }

    /// Record a failure. Only the first failure is kept.
    pub fn record_failure(&mut self, error: SqlupError) {
        if self.error.is_some() {
            return;
        }
        self.failed_script = error.script().map(str::to_string);
        self.error = Some(error);
    }

    /// Record a failure attached to a specific script.
    pub fn record_script_failure(&mut self, script: &str, error: SqlupError) {
        if self.error.is_some() {
            return;
        }
        self.failed_script = Some(script.to_string());
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_is_successful() {
        assert!(UpgradeResult::default().successful());
    }

    #[test]
    fn test_first_failure_wins() {
        let mut result = UpgradeResult::default();
        result.record_failure(SqlupError::Execution {
            script: "002.sql".into(),
            message: "syntax error".into(),
        });
        result.record_failure(SqlupError::Database("connection reset".into()));

        assert!(!result.successful());
        assert_eq!(result.failed_script.as_deref(), Some("002.sql"));
        assert!(matches!(result.error, Some(SqlupError::Execution { .. })));
    }

    #[test]
    fn test_script_failure_names_script() {
        let mut result = UpgradeResult::default();
        result.record_script_failure(
            "003.sql",
            SqlupError::JournalUnavailable("duplicate key".into()),
        );
        assert_eq!(result.failed_script.as_deref(), Some("003.sql"));
    }

    #[test]
    fn test_from_error_without_script() {
        let result = UpgradeResult::from_error(SqlupError::Discovery("missing".into()));
        assert!(!result.successful());
        assert!(result.failed_script.is_none());
    }
}
