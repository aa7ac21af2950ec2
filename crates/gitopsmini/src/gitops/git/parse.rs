//! Helpers for reading git command output.

use std::process::Output;

/// Message for a failed git invocation: stderr first, then stdout, or the
/// exit code when git printed nothing.
pub fn format_git_error(output: &Output) -> String {
    let parts: Vec<String> = [&output.stderr, &output.stdout]
        .iter()
        .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
        .filter(|text| !text.is_empty())
        .collect();

    if parts.is_empty() {
        match output.status.code() {
            Some(code) => format!("git exited with status {}", code),
            None => "git was terminated by a signal".to_string(),
        }
    } else {
        parts.join("\n")
    }
}

/// Returns the first line of `git rev-parse` output if it looks like a commit id.
pub fn parse_commit_id(stdout: &str) -> Option<String> {
    let line = stdout.lines().next()?.trim();
    let is_hex = !line.is_empty() && line.chars().all(|c| c.is_ascii_hexdigit());
    (is_hex && line.len() >= 7).then(|| line.to_string())
}
