//! Running the commands of one test case.

use crate::builtins::check_path;
use crate::command::Commands;
use crate::command_line::parse_command_line;
use crate::error::ExecError;
use crate::expand::{env_lookup, expand_variables};
use crate::parser::TestCase;
use std::path::{MAIN_SEPARATOR_STR, Path};

/// Environment variable naming a sequential run's root directory.
pub const ROOTDIR_VAR: &str = "ROOTDIR";

/// What the root directory is replaced with in captured output.
const SCRUBBED_ROOT_DIR: &str = "${ROOTDIR}";

/// Per-run switches for [`execute_case`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    /// Log each command and its output.
    pub log: bool,
    /// Replace the `ROOTDIR` directory in output with `${ROOTDIR}`.
    pub scrub_root_dir: bool,
}

/// Run the commands of `tc` in order and store their merged output in
/// `tc.got_output`.
///
/// Fails if a command line is malformed or names an unknown command, if a
/// command fails when it should succeed or vice versa, or if it fails with an
/// exit code other than the one required.
pub fn execute_case(
    tc: &mut TestCase,
    commands: &Commands,
    opts: ExecOptions,
) -> Result<(), ExecError> {
    tc.got_output = None;
    let mut all_output = Vec::new();
    for (i, cmdline) in tc.commands.iter().enumerate() {
        let line = tc.start_line + i;
        let parsed = parse_command_line(cmdline)
            .map_err(|source| ExecError::CommandLine { line, source })?;
        let mut words = parsed
            .command
            .split_whitespace()
            .map(|w| expand_variables(w, env_lookup))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| ExecError::Expand { line, source })?;
        if opts.log {
            tracing::info!("$ {}", words.join(" "));
        }

        let input = split_input_file(&mut words);
        let Some((name, args)) = words.split_first() else {
            return Err(ExecError::EmptyCommand { line });
        };
        if let Some(file) = &input
            && check_path(file).is_err()
        {
            return Err(ExecError::InputFile {
                line,
                name: file.clone(),
            });
        }
        let Some(f) = commands.get(name) else {
            return Err(ExecError::NoSuchCommand {
                line,
                name: name.clone(),
            });
        };

        let out = f(args, input.as_deref());
        if opts.log {
            tracing::info!("{}", String::from_utf8_lossy(&out.output));
        }
        all_output.extend_from_slice(&out.output);

        let command = parsed.command.to_string();
        match (out.error, parsed.must_fail) {
            (None, false) => {}
            (None, true) => return Err(ExecError::UnexpectedSuccess { line, command }),
            (Some(source), false) => {
                return Err(ExecError::UnexpectedFailure {
                    line,
                    command,
                    source,
                });
            }
            (Some(err), true) => {
                if let Some(want) = parsed.want_exit_code {
                    let Some(got) = err.exit_code() else {
                        return Err(ExecError::MissingExitCode { line, command });
                    };
                    if got != want {
                        return Err(ExecError::ExitCodeMismatch {
                            line,
                            command,
                            got,
                            want,
                        });
                    }
                }
            }
        }
    }

    if !all_output.is_empty() {
        let mut text = String::from_utf8_lossy(&all_output).into_owned();
        if opts.scrub_root_dir {
            // Read the variable now: Setup may have changed it.
            if let Some(root) = env_lookup(ROOTDIR_VAR) {
                text = scrub(Path::new(&root), &text);
            }
        }
        let text = text.trim_end_matches([' ', '\t', '\n']);
        tc.got_output = Some(text.split('\n').map(str::to_string).collect());
    }
    Ok(())
}

/// Remove a trailing `< FILE` from `words` and return FILE.
///
/// The command name itself is never taken as the `<`.
fn split_input_file(words: &mut Vec<String>) -> Option<String> {
    let n = words.len();
    if n >= 3 && words[n - 2] == "<" {
        let file = words.pop();
        words.pop();
        file
    } else {
        None
    }
}

/// Replace occurrences of `root_dir` in `text` with `${ROOTDIR}`.
pub fn scrub(root_dir: &Path, text: &str) -> String {
    let root = root_dir.to_string_lossy();
    if root.is_empty() {
        return text.to_string();
    }
    let with_sep = format!("{root}{MAIN_SEPARATOR_STR}");
    let scrubbed_with_sep = format!("{SCRUBBED_ROOT_DIR}{MAIN_SEPARATOR_STR}");
    text.replace(&with_sep, &scrubbed_with_sep)
        .replace(root.as_ref(), SCRUBBED_ROOT_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandOutput, command_fn};
    use crate::error::{CommandError, ExitCodeError};
    use std::sync::Arc;

    fn case(commands: &[&str]) -> TestCase {
        TestCase {
            start_line: 1,
            commands: commands.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn registry() -> Commands {
        let mut commands = Commands::new();
        commands.insert(
            "say".to_string(),
            command_fn(|args, input| {
                let mut s = args.join(" ");
                if let Some(file) = input {
                    s.push_str(&format!(" <{file}>"));
                }
                s.push('\n');
                Ok(s.into_bytes())
            }),
        );
        commands.insert(
            "code".to_string(),
            Arc::new(|args: &[String], _: Option<&str>| {
                let code = args.first().and_then(|a| a.parse().ok()).unwrap_or(1);
                CommandOutput::failed(
                    "oops\n",
                    ExitCodeError {
                        msg: "failed".to_string(),
                        code,
                    }
                    .into(),
                )
            }),
        );
        commands.insert(
            "vague".to_string(),
            command_fn(|_, _| Err(CommandError::usage("no code here"))),
        );
        commands.insert("quiet".to_string(), command_fn(|_, _| Ok(Vec::new())));
        commands
    }

    fn run(tc: &mut TestCase) -> Result<(), ExecError> {
        execute_case(tc, &registry(), ExecOptions::default())
    }

    #[test]
    fn captures_merged_output() {
        let mut tc = case(&["say hello", "say  world  again "]);
        run(&mut tc).unwrap();
        assert_eq!(
            tc.got_output,
            Some(vec!["hello".to_string(), "world again".to_string()])
        );
    }

    #[test]
    fn no_output_leaves_got_output_unset() {
        let mut tc = case(&["quiet"]);
        tc.got_output = Some(vec!["stale".to_string()]);
        run(&mut tc).unwrap();
        assert_eq!(tc.got_output, None);
    }

    #[test]
    fn input_redirection() {
        let mut tc = case(&["say a < in.txt"]);
        run(&mut tc).unwrap();
        assert_eq!(tc.got_output, Some(vec!["a <in.txt>".to_string()]));

        let mut tc = case(&["say < in.txt"]);
        run(&mut tc).unwrap();
        assert_eq!(tc.got_output, Some(vec![" <in.txt>".to_string()]));
    }

    #[test]
    fn input_file_must_be_local() {
        let mut tc = case(&["say a < ../in.txt"]);
        let err = run(&mut tc).unwrap_err();
        assert!(matches!(err, ExecError::InputFile { line: 1, .. }), "{err}");
    }

    #[test]
    fn unknown_command() {
        let mut tc = case(&["say ok", "nope"]);
        let err = run(&mut tc).unwrap_err();
        assert_eq!(err.to_string(), "2: no such command \"nope\"");
    }

    #[test]
    fn expected_failure_with_matching_code() {
        let mut tc = case(&["code 3 --> FAIL 3"]);
        run(&mut tc).unwrap();
        assert_eq!(tc.got_output, Some(vec!["oops".to_string()]));

        let mut tc = case(&["code 3 --> FAIL"]);
        run(&mut tc).unwrap();
    }

    #[test]
    fn exit_code_mismatch() {
        let mut tc = case(&["code 2 --> FAIL 3"]);
        let err = run(&mut tc).unwrap_err();
        assert_eq!(
            err.to_string(),
            "1: \"code 2\" failed with exit code 2, but 3 was expected"
        );
    }

    #[test]
    fn unexpected_success_and_failure() {
        let mut tc = case(&["say hi --> FAIL"]);
        let err = run(&mut tc).unwrap_err();
        assert_eq!(
            err.to_string(),
            "1: \"say hi\" succeeded, but it was expected to fail"
        );

        let mut tc = case(&["code 4"]);
        let err = run(&mut tc).unwrap_err();
        assert_eq!(err.to_string(), "1: \"code 4\" failed with failed (code 4)");
    }

    #[test]
    fn missing_exit_code() {
        let mut tc = case(&["vague --> FAIL 1"]);
        let err = run(&mut tc).unwrap_err();
        assert!(matches!(err, ExecError::MissingExitCode { .. }), "{err}");
        // Without a required code, any failure will do.
        let mut tc = case(&["vague --> FAIL"]);
        run(&mut tc).unwrap();
    }

    #[test]
    fn bad_annotation_and_undefined_variable() {
        let mut tc = case(&["say x --> FAIL 0"]);
        assert!(matches!(
            run(&mut tc).unwrap_err(),
            ExecError::CommandLine { line: 1, .. }
        ));

        let mut tc = case(&["say ok", "say ${CMDTEST_SURELY_UNDEFINED}"]);
        let err = run(&mut tc).unwrap_err();
        assert!(matches!(err, ExecError::Expand { line: 2, .. }), "{err}");
    }

    #[test]
    fn empty_command() {
        let mut tc = case(&[""]);
        assert!(matches!(
            run(&mut tc).unwrap_err(),
            ExecError::EmptyCommand { line: 1 }
        ));
    }

    #[test]
    fn expands_variables_per_word() {
        let mut tc = case(&["say ${PATH}"]);
        run(&mut tc).unwrap();
        let path = std::env::var("PATH").unwrap();
        let got = tc.got_output.unwrap().join("\n");
        assert_eq!(got, path.trim_end());
    }

    #[test]
    fn scrub_replaces_root_dir() {
        let root = Path::new("/tmp/cmdtest123");
        let text = format!(
            "at {}\nfile {}{}x\n",
            root.display(),
            root.display(),
            MAIN_SEPARATOR_STR
        );
        assert_eq!(
            scrub(root, &text),
            format!("at ${{ROOTDIR}}\nfile ${{ROOTDIR}}{MAIN_SEPARATOR_STR}x\n")
        );
        assert_eq!(scrub(Path::new(""), "unchanged"), "unchanged");
    }
}
