//! Scripted command runner for exercising installers and the service facade
//! without spawning processes.

use std::sync::Mutex;

use crate::command::{CommandResult, CommandRunner};
use crate::error::Result;

type Responder = Box<dyn Fn(&str) -> CommandResult + Send + Sync>;

/// Records every command and answers from substring rules. The most recently
/// added matching rule wins; unmatched commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<(String, Responder)>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with a fixed result to any command containing `pattern`.
    pub fn respond(&self, pattern: &str, result: CommandResult) -> &Self {
        self.respond_with(pattern, move |_| result.clone())
    }

    /// Reply by running `f`, which may also simulate side effects on disk.
    pub fn respond_with<F>(&self, pattern: &str, f: F) -> &Self
    where
        F: Fn(&str) -> CommandResult + Send + Sync + 'static,
    {
        self.rules
            .lock()
            .unwrap()
            .push((pattern.to_string(), Box::new(f)));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Commands that contain `pattern`, in call order.
    pub fn calls_matching(&self, pattern: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.contains(pattern))
            .collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &str) -> Result<CommandResult> {
        self.calls.lock().unwrap().push(command.to_string());
        let rules = self.rules.lock().unwrap();
        let result = rules
            .iter()
            .rev()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, responder)| responder(command))
            .unwrap_or_else(|| CommandResult::new(0, "", ""));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_rule_wins() {
        let runner = ScriptedRunner::new();
        runner.respond("status", CommandResult::new(0, "splunkd is not running", ""));
        runner.respond("status", CommandResult::new(0, "splunkd is running", ""));

        let result = runner.run("/opt/splunk/bin/splunk status").unwrap();
        assert_eq!(result.stdout, "splunkd is running");

        let other = runner.run("echo hi").unwrap();
        assert!(other.success());
        assert_eq!(runner.calls().len(), 2);
        assert_eq!(runner.calls_matching("status").len(), 1);
    }
}
