//! Typed command execution at the collaborator boundary
//!
//! Every external tool invocation (provisioner, deployer, container tool,
//! test runner) goes through `CommandRunner`, so the orchestration logic
//! sees typed results instead of shell exit-code idioms and tests can
//! script collaborator behavior.

use anyhow::{Context, Result};

/// Captured result of one collaborator invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn err(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

pub trait CommandRunner: Send + Sync {
    /// Run with captured stdout/stderr.
    fn output(&self, program: &str, args: &[String]) -> Result<CommandOutput>;

    /// Run with inherited stdio for long operations whose progress the user
    /// should see (cluster create, suite execution).
    fn stream(&self, program: &str, args: &[String]) -> Result<CommandOutput>;

    /// Like `output`, but a non-zero exit is an error carrying stderr.
    fn output_checked(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let out = self.output(program, args)?;
        if !out.success {
            anyhow::bail!(
                "{} {} failed: {}",
                program,
                args.join(" "),
                out.stderr.trim()
            );
        }
        Ok(out)
    }

    fn stream_checked(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let out = self.stream(program, args)?;
        if !out.success {
            anyhow::bail!("{} {} failed", program, args.join(" "));
        }
        Ok(out)
    }
}

/// Production runner backed by duct.
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn output(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        tracing::debug!(program, ?args, "exec (captured)");
        let out = duct::cmd(program, args)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .with_context(|| format!("failed to execute {program}"))?;
        Ok(CommandOutput {
            success: out.status.success(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }

    fn stream(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        tracing::debug!(program, ?args, "exec (streamed)");
        let out = duct::cmd(program, args)
            .unchecked()
            .run()
            .with_context(|| format!("failed to execute {program}"))?;
        Ok(CommandOutput {
            success: out.status.success(),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Scripted `CommandRunner` with a call recorder. The first rule whose
    /// pattern is contained in "<program> <args..>" wins; unmatched
    /// invocations succeed with empty output.
    pub struct ScriptedRunner {
        rules: Vec<(String, CommandOutput)>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self {
                rules: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn rule(mut self, pattern: &str, out: CommandOutput) -> Self {
            self.rules.push((pattern.to_string(), out));
            self
        }

        pub fn count(&self, pattern: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|line| line.contains(pattern))
                .count()
        }

        pub fn total(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn output(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
            let line = if args.is_empty() {
                program.to_string()
            } else {
                format!("{} {}", program, args.join(" "))
            };
            self.calls.lock().unwrap().push(line.clone());
            Ok(self
                .rules
                .iter()
                .find(|(pattern, _)| line.contains(pattern.as_str()))
                .map(|(_, out)| out.clone())
                .unwrap_or_else(|| CommandOutput::ok("")))
        }

        fn stream(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
            self.output(program, args)
        }
    }

    #[test]
    fn scripted_runner_matches_first_rule() {
        let runner = ScriptedRunner::new()
            .rule("get cluster", CommandOutput::err("not found"))
            .rule("get", CommandOutput::ok("shadowed"));

        let out = runner
            .output("kops", &["get".into(), "cluster".into()])
            .unwrap();
        assert!(!out.success);
        assert_eq!(runner.count("get cluster"), 1);
    }

    #[test]
    fn scripted_runner_defaults_to_success() {
        let runner = ScriptedRunner::new();
        let out = runner.output("helm", &["version".into()]).unwrap();
        assert!(out.success);
    }
}
