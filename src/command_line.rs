//! Splitting the failure annotation off a command line.

use crate::error::CommandLineError;

/// Marks a command that is expected to fail.
pub const FAIL_MARKER: &str = " --> FAIL";

/// A command line with its expectation split off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine<'a> {
    /// The command text, without the annotation.
    pub command: &'a str,
    pub must_fail: bool,
    /// Required exit code; never zero.
    pub want_exit_code: Option<i32>,
}

/// Parse a command line of the form `CMD [ --> FAIL [CODE]]`.
///
/// The rightmost [`FAIL_MARKER`] wins. The marker is case-sensitive and must be
/// spelled exactly. A code, if present, must be a non-zero integer.
pub fn parse_command_line(line: &str) -> Result<CommandLine<'_>, CommandLineError> {
    let Some(i) = line.rfind(FAIL_MARKER) else {
        return Ok(CommandLine {
            command: line,
            must_fail: false,
            want_exit_code: None,
        });
    };
    let rest = line[i + FAIL_MARKER.len()..].trim();
    let want_exit_code = if rest.is_empty() {
        None
    } else {
        let code: i32 = rest
            .parse()
            .map_err(|_| CommandLineError::InvalidExitCode(rest.to_string()))?;
        if code == 0 {
            return Err(CommandLineError::ZeroExitCode);
        }
        Some(code)
    };
    Ok(CommandLine {
        command: &line[..i],
        must_fail: true,
        want_exit_code,
    })
}
