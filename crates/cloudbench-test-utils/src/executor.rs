//! Scripted command executor
//!
//! Responses are keyed by an argv prefix (`["az", "vm", "show"]`). Each rule
//! holds a queue of outputs; the last output repeats once the queue drains,
//! which models "not ready N times, then ready forever".

use async_trait::async_trait;
use cloudbench_common::{CommandExecutor, CommandOutput, ExecOptions};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A recorded call to the fake executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub suppress_warning: bool,
}

impl Invocation {
    /// True if the argv starts with `prefix`
    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        self.argv.len() >= prefix.len() && self.argv.iter().zip(prefix).all(|(a, p)| a == p)
    }

    /// Value following `flag` in the argv, if present
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.argv
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.argv.get(i + 1))
            .map(String::as_str)
    }
}

enum Response {
    Output(CommandOutput),
    SpawnError(String),
}

struct Rule {
    prefix: Vec<String>,
    responses: VecDeque<Response>,
}

impl Rule {
    fn matches(&self, argv: &[String]) -> bool {
        argv.len() >= self.prefix.len() && argv.iter().zip(&self.prefix).all(|(a, p)| a == p)
    }

    fn next(&mut self) -> anyhow::Result<CommandOutput> {
        let response = if self.responses.len() > 1 {
            self.responses.pop_front()
        } else {
            self.responses.front().map(|r| match r {
                Response::Output(o) => Response::Output(o.clone()),
                Response::SpawnError(e) => Response::SpawnError(e.clone()),
            })
        };
        match response {
            Some(Response::Output(output)) => Ok(output),
            Some(Response::SpawnError(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(CommandOutput::success("")),
        }
    }
}

/// Command executor that replays scripted responses and records every call
///
/// Rules are matched most-recently-added first, so a test can register a
/// broad default and then override one command. Unmatched commands succeed
/// with empty output.
#[derive(Default)]
pub struct FakeExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Invocation>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer commands starting with `prefix` with `output`
    pub fn respond(&self, prefix: &[&str], output: CommandOutput) -> &Self {
        self.respond_sequence(prefix, vec![output])
    }

    /// Answer successive matching commands with `outputs`, repeating the last
    pub fn respond_sequence(&self, prefix: &[&str], outputs: Vec<CommandOutput>) -> &Self {
        self.push_rule(prefix, outputs.into_iter().map(Response::Output).collect())
    }

    /// Make matching commands fail to run at all
    pub fn fail_to_spawn(&self, prefix: &[&str], message: &str) -> &Self {
        self.push_rule(prefix, VecDeque::from([Response::SpawnError(message.to_string())]))
    }

    fn push_rule(&self, prefix: &[&str], responses: VecDeque<Response>) -> &Self {
        self.rules.lock().unwrap().push(Rule {
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            responses,
        });
        self
    }

    /// All recorded invocations, in call order
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded invocations whose argv starts with `prefix`
    pub fn calls_matching(&self, prefix: &[&str]) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    /// Number of invocations whose argv starts with `prefix`
    pub fn count(&self, prefix: &[&str]) -> usize {
        self.calls_matching(prefix).len()
    }
}

#[async_trait]
impl CommandExecutor for FakeExecutor {
    async fn execute(&self, argv: &[String], options: &ExecOptions) -> anyhow::Result<CommandOutput> {
        self.calls.lock().unwrap().push(Invocation {
            argv: argv.to_vec(),
            suppress_warning: options.suppress_warning,
        });

        let mut rules = self.rules.lock().unwrap();
        match rules.iter_mut().rev().find(|r| r.matches(argv)) {
            Some(rule) => rule.next(),
            None => Ok(CommandOutput::success("")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv<const N: usize>(parts: [&str; N]) -> Vec<String> {
        parts.into_iter().map(String::from).collect()
    }

    #[tokio::test]
    async fn test_sequence_repeats_last() {
        let fake = FakeExecutor::new();
        fake.respond_sequence(
            &["az", "group", "show"],
            vec![CommandOutput::failure(3, "not yet"), CommandOutput::success("done")],
        );

        let cmd = argv(["az", "group", "show", "--name", "rg"]);
        let opts = ExecOptions::default();
        assert_eq!(fake.execute(&cmd, &opts).await.unwrap().exit_code, 3);
        assert_eq!(fake.execute(&cmd, &opts).await.unwrap().stdout, "done");
        assert_eq!(fake.execute(&cmd, &opts).await.unwrap().stdout, "done");
        assert_eq!(fake.count(&["az", "group", "show"]), 3);
    }

    #[tokio::test]
    async fn test_latest_rule_wins_and_default_succeeds() {
        let fake = FakeExecutor::new();
        fake.respond(&["az"], CommandOutput::success("broad"));
        fake.respond(&["az", "vm"], CommandOutput::success("narrow"));

        let opts = ExecOptions::for_probe();
        let vm = fake.execute(&argv(["az", "vm", "show"]), &opts).await.unwrap();
        assert_eq!(vm.stdout, "narrow");
        let group = fake.execute(&argv(["az", "group"]), &opts).await.unwrap();
        assert_eq!(group.stdout, "broad");
        let other = fake.execute(&argv(["ssh"]), &opts).await.unwrap();
        assert!(other.is_success());
        assert!(fake.calls()[0].suppress_warning);
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let fake = FakeExecutor::new();
        fake.fail_to_spawn(&["az"], "az: command not found");
        let err = fake
            .execute(&argv(["az", "login"]), &ExecOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("command not found"));
    }

    #[test]
    fn test_flag_value() {
        let call = Invocation {
            argv: argv(["az", "postgres", "server", "create", "--name", "db1"]),
            suppress_warning: false,
        };
        assert_eq!(call.flag_value("--name"), Some("db1"));
        assert_eq!(call.flag_value("--missing"), None);
        assert!(call.starts_with(&["az", "postgres"]));
    }
}
