//! Built-in commands.
//!
//! | command | meaning |
//! |---|---|
//! | `cd DIR` | change directory |
//! | `cat FILE` | copy file to output |
//! | `mkdir DIR` | create directory |
//! | `setenv VAR VALUE` | set an environment variable |
//! | `echo ARG...` | write args to output |
//! | `fecho FILE ARG...` | write args to FILE |
//!
//! File and directory arguments must name something in the current directory.
//! None of the built-ins accept input redirection.

use crate::command::{CommandFunc, Commands, command_fn};
use crate::error::CommandError;
use std::fs;
use std::io::Write;
use std::path::Path;

/// The initial contents of every suite's registry.
pub fn builtins() -> Commands {
    Commands::from([
        ("cat".to_string(), fixed_arg_builtin(1, cat)),
        ("cd".to_string(), fixed_arg_builtin(1, cd)),
        ("echo".to_string(), command_fn(echo)),
        ("fecho".to_string(), command_fn(fecho)),
        ("mkdir".to_string(), fixed_arg_builtin(1, mkdir)),
        ("setenv".to_string(), fixed_arg_builtin(2, setenv)),
    ])
}

type Builtin = fn(&[String]) -> Result<Vec<u8>, CommandError>;

fn fixed_arg_builtin(nargs: usize, f: Builtin) -> CommandFunc {
    command_fn(move |args: &[String], input: Option<&str>| {
        if args.len() != nargs {
            return Err(CommandError::usage(format!(
                "need exactly {nargs} arguments"
            )));
        }
        no_input(input)?;
        f(args)
    })
}

fn no_input(input: Option<&str>) -> Result<(), CommandError> {
    match input {
        Some(_) => Err(CommandError::usage("input redirection not supported")),
        None => Ok(()),
    }
}

/// Reject paths that leave the current directory.
pub(crate) fn check_path(path: &str) -> Result<(), CommandError> {
    if path.contains(['/', '\\']) {
        return Err(CommandError::usage(format!(
            "argument must be in the current directory ({path:?} has a '/')"
        )));
    }
    Ok(())
}

fn cd(args: &[String]) -> Result<Vec<u8>, CommandError> {
    check_path(&args[0])?;
    let dir = std::env::current_dir()?.join(&args[0]);
    std::env::set_current_dir(&dir).map_err(|source| CommandError::Os {
        op: "chdir",
        path: dir,
        source,
    })?;
    Ok(Vec::new())
}

fn cat(args: &[String]) -> Result<Vec<u8>, CommandError> {
    check_path(&args[0])?;
    fs::read(&args[0]).map_err(|source| CommandError::Os {
        op: "open",
        path: args[0].clone().into(),
        source,
    })
}

fn mkdir(args: &[String]) -> Result<Vec<u8>, CommandError> {
    check_path(&args[0])?;
    let mut builder = fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(&args[0])
        .map_err(|source| CommandError::Os {
            op: "mkdir",
            path: args[0].clone().into(),
            source,
        })?;
    Ok(Vec::new())
}

fn setenv(args: &[String]) -> Result<Vec<u8>, CommandError> {
    // SAFETY: commands only run while the file runner holds the process-state
    // lock (see `runner::lock_process_state`), so nothing else in this crate
    // touches the environment concurrently.
    unsafe {
        std::env::set_var(&args[0], &args[1]);
    }
    Ok(Vec::new())
}

/// Join words, turn literal `\n` into newlines, and end with a newline.
fn echo_text(words: &[String]) -> String {
    let mut s = words.join(" ").replace("\\n", "\n");
    s.push('\n');
    s
}

fn echo(args: &[String], input: Option<&str>) -> Result<Vec<u8>, CommandError> {
    no_input(input)?;
    Ok(echo_text(args).into_bytes())
}

fn fecho(args: &[String], input: Option<&str>) -> Result<Vec<u8>, CommandError> {
    let Some((file, words)) = args.split_first() else {
        return Err(CommandError::usage("need at least 1 argument"));
    };
    no_input(input)?;
    check_path(file)?;
    write_private(Path::new(file), echo_text(words).as_bytes()).map_err(|source| {
        CommandError::Os {
            op: "write",
            path: file.into(),
            source,
        }
    })?;
    Ok(Vec::new())
}

fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)?.write_all(contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    fn run(name: &str, words: &[&str], input: Option<&str>) -> crate::CommandOutput {
        let commands = builtins();
        commands[name](&args(words), input)
    }

    #[test]
    fn echo_joins_and_expands_newlines() {
        let out = run("echo", &["a", "b\\nc"], None);
        assert!(out.error.is_none());
        assert_eq!(out.output, b"a b\nc\n");
        assert_eq!(run("echo", &[], None).output, b"\n");
    }

    #[test]
    fn echo_rejects_input() {
        let out = run("echo", &["a"], Some("in.txt"));
        assert_eq!(
            out.error.map(|e| e.to_string()),
            Some("input redirection not supported".to_string())
        );
    }

    #[test]
    fn fixed_arg_checks_arity() {
        let out = run("cd", &["foo", "bar"], None);
        let err = out.error.unwrap();
        assert_eq!(err.to_string(), "need exactly 1 arguments");
        assert_eq!(err.exit_code(), None);

        let out = run("setenv", &["ONLY_NAME"], None);
        assert_eq!(out.error.unwrap().to_string(), "need exactly 2 arguments");
    }

    #[test]
    fn fecho_needs_a_file() {
        let out = run("fecho", &[], None);
        assert_eq!(out.error.unwrap().to_string(), "need at least 1 argument");
    }

    #[test]
    fn paths_must_stay_in_current_directory() {
        for name in ["cat", "cd", "mkdir"] {
            let err = run(name, &["a/b"], None).error.unwrap();
            assert!(err.to_string().contains("has a '/'"), "{name}: {err}");
        }
        let err = run("fecho", &["..\\x", "hi"], None).error.unwrap();
        assert!(err.to_string().contains("current directory"), "{err}");
    }

    #[test]
    fn registry_has_all_builtins() {
        let mut names: Vec<_> = builtins().into_keys().collect();
        names.sort();
        assert_eq!(names, ["cat", "cd", "echo", "fecho", "mkdir", "setenv"]);
    }
}
