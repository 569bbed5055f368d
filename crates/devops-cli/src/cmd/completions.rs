use std::io::Write;

use anyhow::{Context as _, Result};
use clap::Args;
use clap_complete::{Shell, generate};

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to emit a completion script for.
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Print the completion script for `command` to stdout.
///
/// # Errors
///
/// Returns an error if stdout cannot be written.
pub fn run_completions(shell: Shell, command: &mut clap::Command) -> Result<()> {
    let stdout = std::io::stdout();
    write_completions(shell, command, &mut stdout.lock())
}

/// Registers the script under the command's own name.
fn write_completions(shell: Shell, command: &mut clap::Command, out: &mut dyn Write) -> Result<()> {
    let bin = command.get_name().to_string();
    generate(shell, command, bin, out);
    out.flush().context("failed to write completion script")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> clap::Command {
        clap::Command::new("dva")
            .subcommand(clap::Command::new("tree"))
            .subcommand(clap::Command::new("set-state"))
    }

    #[test]
    fn bash_script_names_binary_and_subcommands() {
        let mut buf = Vec::new();
        write_completions(Shell::Bash, &mut sample(), &mut buf).unwrap();
        let script = String::from_utf8(buf).unwrap();

        assert!(script.contains("_dva"));
        assert!(script.contains("set-state"));
        assert!(script.contains("tree"));
    }

    #[test]
    fn every_shell_produces_output() {
        for shell in [Shell::Bash, Shell::Zsh, Shell::Fish, Shell::PowerShell, Shell::Elvish] {
            let mut buf = Vec::new();
            write_completions(shell, &mut sample(), &mut buf).unwrap();
            assert!(!buf.is_empty(), "{shell} script is empty");
        }
    }
}
