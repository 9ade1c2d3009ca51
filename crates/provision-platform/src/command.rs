use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Outcome of one shell command. Non-zero exit codes are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, used as error diagnostics
    pub fn combined_output(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }

    /// Turn a non-zero exit into `Error::CommandExecution`.
    pub fn into_checked(self, command: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::command_execution(command, self.combined_output()))
        }
    }
}

pub trait CommandRunner: Send + Sync {
    /// Run a shell-level command to completion, capturing stdout, stderr and
    /// the exit code. Only a failure to start the process is an error.
    fn run(&self, command: &str) -> Result<CommandResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output_order() {
        let result = CommandResult::new(1, "out\n", "err\n");
        assert_eq!(result.combined_output(), "out\nerr\n");
    }

    #[test]
    fn test_into_checked() {
        assert!(CommandResult::new(0, "", "").into_checked("true").is_ok());

        let err = CommandResult::new(2, "partial", " boom")
            .into_checked("tar -xf pkg.tgz")
            .unwrap_err();
        match err {
            Error::CommandExecution { command, output } => {
                assert_eq!(command, "tar -xf pkg.tgz");
                assert_eq!(output, "partial boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
