//! Input of one migration run.

use serde::{Deserialize, Serialize};

/// Granularity at which a run stops on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StopPolicy {
    /// Stop after the first file whose fix was verified
    AfterEachFix,
    /// Stop after the first file that was processed, success or not
    AfterEachFile,
    /// Process every file
    WhenComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    CountOnly,
    MigrateOneFile,
    MigrateAllFiles,
}

impl Action {
    /// Stop policy used when the caller does not pick one.
    pub fn default_stop_policy(self) -> StopPolicy {
        match self {
            Action::MigrateOneFile => StopPolicy::AfterEachFile,
            Action::CountOnly | Action::MigrateAllFiles => StopPolicy::WhenComplete,
        }
    }
}

/// Read-only for the lifetime of a run. Free-text fields are opaque to the
/// engine; only the caller checks them for emptiness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRequest {
    pub lint_command: String,
    pub test_command: String,
    pub file_glob: String,
    pub find: String,
    pub replace: String,
    pub stop_policy: StopPolicy,
    pub action: Action,
}

impl MigrationRequest {
    /// Names of required fields that are blank for this request's action.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut fields = vec![("files", &self.file_glob), ("find", &self.find)];
        if self.action != Action::CountOnly {
            fields.extend([
                ("lint", &self.lint_command),
                ("test", &self.test_command),
                ("replace", &self.replace),
            ]);
        }
        fields
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(action: Action) -> MigrationRequest {
        MigrationRequest {
            lint_command: String::new(),
            test_command: String::new(),
            file_glob: "**/*.js".into(),
            find: "var".into(),
            replace: String::new(),
            stop_policy: action.default_stop_policy(),
            action,
        }
    }

    #[test]
    fn count_only_needs_glob_and_find() {
        assert!(request(Action::CountOnly).missing_fields().is_empty());
        assert_eq!(
            request(Action::MigrateAllFiles).missing_fields(),
            vec!["lint", "test", "replace"]
        );
    }

    #[test]
    fn default_stop_policies() {
        assert_eq!(Action::MigrateOneFile.default_stop_policy(), StopPolicy::AfterEachFile);
        assert_eq!(Action::MigrateAllFiles.default_stop_policy(), StopPolicy::WhenComplete);
    }
}
