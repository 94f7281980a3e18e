//! Commands that run a program, either as a child process or in this process.

use crate::command::{CommandFunc, CommandOutput};
use crate::error::{CommandError, ExitCodeError};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

/// A command that runs the executable at `path` with the command's arguments.
///
/// Standard output and standard error are merged, in write order, into the
/// command's output. A redirected input file becomes standard input. A
/// relative `path` is resolved against the current directory now, not when
/// the command runs.
pub fn program(path: impl AsRef<Path>) -> io::Result<CommandFunc> {
    let program = std::path::absolute(path.as_ref())?;
    Ok(Arc::new(move |args: &[String], input: Option<&str>| {
        run_program(&program, args, input)
    }))
}

fn run_program(program: &Path, args: &[String], input: Option<&str>) -> CommandOutput {
    let spawn = || -> Result<(std::process::Child, io::PipeReader), CommandError> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        match input {
            Some(name) => {
                let f = File::open(name).map_err(|source| CommandError::Os {
                    op: "open",
                    path: PathBuf::from(name),
                    source,
                })?;
                cmd.stdin(f);
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }
        let (reader, writer) = io::pipe()?;
        cmd.stdout(writer.try_clone()?);
        cmd.stderr(writer);
        let child = cmd.spawn().map_err(|source| CommandError::Os {
            op: "exec",
            path: program.to_path_buf(),
            source,
        })?;
        // `cmd` holds the parent's copies of the write end; the reader only
        // sees EOF once they are gone.
        drop(cmd);
        Ok((child, reader))
    };

    let (mut child, mut reader) = match spawn() {
        Ok(spawned) => spawned,
        Err(e) => return CommandOutput::failed(Vec::new(), e),
    };
    let mut output = Vec::new();
    let read = reader.read_to_end(&mut output);
    let status = match child.wait() {
        Ok(status) => status,
        Err(e) => return CommandOutput::failed(output, e.into()),
    };
    if let Err(e) = read {
        return CommandOutput::failed(output, e.into());
    }
    if status.success() {
        CommandOutput::ok(output)
    } else {
        let err = CommandError::Exited {
            program: program.display().to_string(),
            status,
        };
        CommandOutput::failed(output, err)
    }
}

/// Entry point of an in-process program.
///
/// Receives its argument vector (with the program name first), its standard
/// input, and a sink for its merged standard output and error. Returns the
/// exit code.
pub type MainFunc = dyn Fn(&[String], &mut dyn Read, &mut dyn Write) -> i32 + Send + Sync;

/// A command that calls `main` in this process instead of spawning a child.
///
/// `main` must behave like a real entry point, except that it returns its exit
/// code instead of exiting. Its output is written into a pipe that a
/// background thread drains into the command's output. A non-zero exit code
/// becomes an [`ExitCodeError`].
pub fn in_process_program<F>(name: impl Into<String>, main: F) -> CommandFunc
where
    F: Fn(&[String], &mut dyn Read, &mut dyn Write) -> i32 + Send + Sync + 'static,
{
    let name = name.into();
    Arc::new(move |args: &[String], input: Option<&str>| {
        run_in_process(&name, &main, args, input)
    })
}

fn run_in_process(
    name: &str,
    main: &MainFunc,
    args: &[String],
    input: Option<&str>,
) -> CommandOutput {
    let mut stdin: Box<dyn Read> = match input {
        Some(file) => match File::open(file) {
            Ok(f) => Box::new(f),
            Err(source) => {
                return CommandOutput::failed(
                    Vec::new(),
                    CommandError::Os {
                        op: "open",
                        path: PathBuf::from(file),
                        source,
                    },
                );
            }
        },
        None => Box::new(io::empty()),
    };
    let (mut reader, mut writer) = match io::pipe() {
        Ok(pipe) => pipe,
        Err(e) => return CommandOutput::failed(Vec::new(), e.into()),
    };

    // Drain the pipe concurrently so `main` never blocks on a full pipe.
    let (done_tx, done_rx) = mpsc::sync_channel(1);
    let copier = thread::spawn(move || {
        let mut buf = Vec::new();
        let res = reader.read_to_end(&mut buf).map(|_| buf);
        let _ = done_tx.send(res);
    });

    let argv: Vec<String> = std::iter::once(name.to_string())
        .chain(args.iter().cloned())
        .collect();
    let code = main(&argv, &mut stdin, &mut writer);
    // Closing the write end is what lets the copier finish.
    drop(writer);

    let drained = done_rx.recv();
    let _ = copier.join();
    let output = match drained {
        Ok(Ok(buf)) => buf,
        Ok(Err(e)) => return CommandOutput::failed(Vec::new(), e.into()),
        Err(_) => {
            return CommandOutput::failed(
                Vec::new(),
                io::Error::other("output copier exited without reporting").into(),
            );
        }
    };
    if code == 0 {
        CommandOutput::ok(output)
    } else {
        let err = ExitCodeError {
            msg: format!("{name} failed"),
            code,
        };
        CommandOutput::failed(output, err.into())
    }
}
