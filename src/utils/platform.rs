//! Platform-specific helpers for running external programs.

use std::path::PathBuf;
use std::process::Command;

/// A command running `script` through the platform shell.
///
/// Uses `sh -c` on Unix and `cmd /C` on Windows.
pub fn shell_command(script: &str) -> Command {
    if cfg!(windows) {
        let mut command = Command::new("cmd");
        command.arg("/C").arg(script);
        command
    } else {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }
}

/// Locate a program on `PATH`.
pub fn find_tool(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Quote `value` for use as one shell word.
pub fn shell_quote(value: &str) -> String {
    if cfg!(windows) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else if !value.is_empty()
        && value.chars().all(|c| c.is_ascii_alphanumeric() || "-_./=+:,@%".contains(c))
    {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
