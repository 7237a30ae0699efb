//! External command runner.
//!
//! This is the only place process arguments and outputs cross between
//! `OsString`/bytes and text. Everything else in the crate works on `&str`.
//! Output that is not valid UTF-8 is decoded lossily.

use std::process::{Command, Stdio};

use log::debug;

/// Finished command with decoded output.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub argv: Vec<String>,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The command as it would be typed in a shell (no quoting).
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }

    /// `Error running command `...`: <output>` with stderr preferred over stdout.
    pub fn failure_detail(&self) -> String {
        let output = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        let status = match self.code {
            Some(c) => format!("exit status {c}"),
            None => "killed by signal".to_string(),
        };
        format!(
            "Error running command `{}` ({}): {}",
            self.command_line(),
            status,
            output
        )
    }

    /// Non-empty stdout lines, trimmed.
    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// Run `program args...` to completion. No timeout: a hang here hangs the
/// hook, and APT with it.
///
/// Spawn failures (missing binary, EACCES) come back as `io::Error`; a
/// non-zero exit is a normal `CommandOutput` for the caller to classify.
pub fn run(program: &str, args: &[&str]) -> std::io::Result<CommandOutput> {
    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.push(program.to_string());
    argv.extend(args.iter().map(|a| a.to_string()));
    debug!("Running external command `{}`", argv.join(" "));

    let out = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    Ok(CommandOutput {
        argv,
        code: out.status.code(),
        stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
    })
}

/// Detail string for a command that could not be started at all.
pub fn spawn_failure_detail(program: &str, args: &[&str], err: &std::io::Error) -> String {
    let mut line = program.to_string();
    for a in args {
        line.push(' ');
        line.push_str(a);
    }
    format!("Error running command `{line}`: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(code: Option<i32>, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            argv: vec!["zfs".into(), "list".into(), "-H".into()],
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    #[test]
    fn failure_detail_prefers_stderr() {
        let o = output(Some(1), "ignored\n", "cannot open 'x': dataset does not exist\n");
        assert!(!o.success());
        assert_eq!(
            o.failure_detail(),
            "Error running command `zfs list -H` (exit status 1): cannot open 'x': dataset does not exist"
        );
    }

    #[test]
    fn failure_detail_falls_back_to_stdout() {
        let o = output(None, "partial\n", "  ");
        assert!(o.failure_detail().ends_with("(killed by signal): partial"));
    }

    #[test]
    fn stdout_lines_skip_blank() {
        let o = output(Some(0), "tank\n\n  tank/usr  \n", "");
        assert!(o.success());
        assert_eq!(o.stdout_lines().collect::<Vec<_>>(), vec!["tank", "tank/usr"]);
    }
}
