//! The command registry seam.

use crate::error::CommandError;
use std::collections::HashMap;
use std::sync::Arc;

/// What a command produced: its output, plus the error if it failed.
///
/// Output is kept even on failure so partial output shows up in logs and in
/// the captured case output.
#[derive(Debug, Default)]
pub struct CommandOutput {
    pub output: Vec<u8>,
    pub error: Option<CommandError>,
}

impl CommandOutput {
    pub fn ok(output: impl Into<Vec<u8>>) -> Self {
        Self {
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(output: impl Into<Vec<u8>>, error: CommandError) -> Self {
        Self {
            output: output.into(),
            error: Some(error),
        }
    }
}

impl From<Result<Vec<u8>, CommandError>> for CommandOutput {
    fn from(result: Result<Vec<u8>, CommandError>) -> Self {
        match result {
            Ok(output) => Self::ok(output),
            Err(e) => Self::failed(Vec::new(), e),
        }
    }
}

/// A command that can be named as the first word of a command line.
///
/// Called with the remaining words (so `args[0]` is the first argument) and the
/// name of the file given after `<`, if any.
pub type CommandFunc = Arc<dyn Fn(&[String], Option<&str>) -> CommandOutput + Send + Sync>;

/// Command name to implementation.
pub type Commands = HashMap<String, CommandFunc>;

/// Wrap a closure returning a plain `Result` as a [`CommandFunc`].
///
/// ```
/// let shout = cmdtest::command_fn(|args, _input| Ok(args.join(" ").to_uppercase().into_bytes()));
/// let out = shout(&["hi".to_string()], None);
/// assert_eq!(out.output, b"HI");
/// ```
pub fn command_fn<F>(f: F) -> CommandFunc
where
    F: Fn(&[String], Option<&str>) -> Result<Vec<u8>, CommandError> + Send + Sync + 'static,
{
    Arc::new(move |args: &[String], input: Option<&str>| f(args, input).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExitCodeError;

    #[test]
    fn command_fn_maps_errors() {
        let f = command_fn(|_, _| {
            Err(ExitCodeError {
                msg: "nope".to_string(),
                code: 3,
            }
            .into())
        });
        let out = f(&[], None);
        assert!(out.output.is_empty());
        assert_eq!(out.error.and_then(|e| e.exit_code()), Some(3));
    }

    #[test]
    fn failed_output_keeps_bytes() {
        let out = CommandOutput::failed("partial", CommandError::usage("bad"));
        assert_eq!(out.output, b"partial");
        assert!(out.error.is_some());
    }
}
