use std::process::{Command, Stdio};

use tracing::debug;

use provision_platform::{CommandResult, CommandRunner, Error, Platform, Result};

/// Runs commands through the platform shell (`sh -c` or `cmd /C`), inheriting
/// the current environment and blocking until the child exits.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    platform: Platform,
}

impl ShellRunner {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    fn shell(&self, command: &str) -> Command {
        match self.platform {
            Platform::Windows => {
                let mut cmd = Command::new("cmd");
                cmd.args(["/S", "/C"]);
                push_cmd_line(&mut cmd, command);
                cmd
            }
            _ => {
                let mut cmd = Command::new("sh");
                cmd.args(["-c", command]);
                cmd
            }
        }
    }
}

/// cmd.exe parses its own command line, so the string must reach it without
/// the `\"` escaping the standard argument quoting would add. With `/S`, cmd
/// strips exactly the outer pair of quotes and runs the rest verbatim.
#[cfg(windows)]
fn push_cmd_line(cmd: &mut Command, command: &str) {
    use std::os::windows::process::CommandExt;
    cmd.raw_arg(format!("\"{}\"", command));
}

#[cfg(not(windows))]
fn push_cmd_line(cmd: &mut Command, command: &str) {
    cmd.arg(command);
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str) -> Result<CommandResult> {
        debug!("running: {}", command);

        let output = self
            .shell(command)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::Spawn {
                command: command.to_string(),
                source: e,
            })?;

        // No exit code means the child was killed by a signal
        let exit_code = output.status.code().unwrap_or(-1);
        debug!("exit code {}", exit_code);

        Ok(CommandResult {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_streams_and_exit_code() {
        let runner = ShellRunner::new(Platform::Linux);
        let result = runner.run("echo hello; echo oops 1>&2; exit 3").unwrap();
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.stderr, "oops\n");
        assert!(!result.success());
    }

    #[test]
    fn test_inherits_environment() {
        std::env::set_var("PROVISION_RUNNER_TEST", "inherited");
        let runner = ShellRunner::new(Platform::Linux);
        let result = runner.run("echo $PROVISION_RUNNER_TEST").unwrap();
        assert_eq!(result.stdout.trim(), "inherited");
    }

    #[test]
    fn test_missing_binary_is_not_an_error() {
        let runner = ShellRunner::new(Platform::Linux);
        let result = runner.run("definitely-not-a-real-binary-xyz").unwrap();
        assert_eq!(result.exit_code, 127);
    }
}
