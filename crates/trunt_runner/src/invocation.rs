//! Invocation description.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One call of the external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Binary to run
    pub program: String,
    /// Arguments, starting with the subcommand
    pub args: Vec<String>,
    /// Directory the tool runs in
    pub working_dir: PathBuf,
    /// Environment overrides applied on top of the inherited environment
    pub env: BTreeMap<String, String>,
    /// Short tag (usually the stack name) prefixed to streamed output
    pub label: Option<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: PathBuf::from("."),
            env: BTreeMap::new(),
            label: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// First argument, e.g. `plan`.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(|s| s.as_str())
    }

    /// Program and arguments as a list, the way it would be exec'd.
    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Shell-like rendering for logs and summaries.
    pub fn display_command(&self) -> String {
        let mut cmd = self.program.clone();
        for arg in &self.args {
            if arg.is_empty() || arg.contains(' ') || arg.contains('\'') {
                cmd.push_str(&format!(" '{}'", arg.replace('\'', "'\\''")));
            } else {
                cmd.push(' ');
                cmd.push_str(arg);
            }
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let invocation = Invocation::new("terraform")
            .arg("apply")
            .args(["-auto-approve", "-var-file=/tmp/dev.tfvars"])
            .working_dir("/infra/vpc")
            .env("TF_IN_AUTOMATION", "1");

        assert_eq!(invocation.subcommand(), Some("apply"));
        assert_eq!(invocation.working_dir, PathBuf::from("/infra/vpc"));
        assert_eq!(invocation.env.get("TF_IN_AUTOMATION").map(String::as_str), Some("1"));
        assert_eq!(
            invocation.command_line(),
            vec!["terraform", "apply", "-auto-approve", "-var-file=/tmp/dev.tfvars"]
        );
    }

    #[test]
    fn test_display_command_quotes_spaces() {
        let invocation = Invocation::new("terraform")
            .arg("plan")
            .arg("-var=name=my stack");

        assert_eq!(
            invocation.display_command(),
            "terraform plan '-var=name=my stack'"
        );
    }
}
