//! Test file execution.
//!
//! Runs the cases of one test file, then either compares their output with the
//! file or writes the output back into it.

use crate::command::Commands;
use crate::error::{BoxError, FileError};
use crate::exec::{ExecOptions, ROOTDIR_VAR, execute_case};
use crate::parser::{COMMAND_MARKER, TestFile};
use crate::replace::ReplacementFile;
use similar::{ChangeTag, TextDiff};
use std::ffi::OsString;
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Called once per test file before its cases run, with the root directory in
/// sequential runs and `None` in parallel runs.
pub type SetupFunc = dyn Fn(Option<&Path>) -> Result<(), BoxError> + Send + Sync;

/// Whether a run checks the output or rewrites the files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Compare,
    Update,
}

impl Mode {
    /// Environment variable that switches [`Mode::from_env`] to update mode.
    pub const UPDATE_VAR: &'static str = "CMDTEST_UPDATE";

    /// Update if `CMDTEST_UPDATE` is set to something other than empty, `0` or `false`.
    pub fn from_env() -> Self {
        match std::env::var(Self::UPDATE_VAR) {
            Ok(v) if !matches!(v.trim(), "" | "0" | "false") => Mode::Update,
            _ => Mode::Compare,
        }
    }
}

/// Everything a file run reads from its suite.
pub struct FileRunner<'a> {
    pub commands: &'a Commands,
    pub setup: Option<&'a SetupFunc>,
    pub keep_root_dirs: bool,
    pub log: bool,
    pub parallel: bool,
}

/// Result of running one test file.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FileReport {
    pub file: PathBuf,
    pub passed: bool,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
    /// Error or diff report for a failed file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

// Current directory and environment belong to the whole process. A sequential
// file run changes both, so it takes this exclusively; parallel runs promise not
// to, and share it.
static PROCESS_STATE: RwLock<()> = RwLock::new(());

/// Holds [`PROCESS_STATE`] for one file run; exactly one field is set.
struct ProcessStateGuard {
    _read: Option<RwLockReadGuard<'static, ()>>,
    _write: Option<RwLockWriteGuard<'static, ()>>,
}

/// Lock the process-wide state for one file run.
fn lock_process_state(parallel: bool) -> ProcessStateGuard {
    // A panicking command poisons the lock, but the state it guards is
    // restored by the guards below on unwind.
    if parallel {
        ProcessStateGuard {
            _read: Some(PROCESS_STATE.read().unwrap_or_else(|e| e.into_inner())),
            _write: None,
        }
    } else {
        ProcessStateGuard {
            _read: None,
            _write: Some(PROCESS_STATE.write().unwrap_or_else(|e| e.into_inner())),
        }
    }
}

/// Restores the current directory when dropped.
struct CwdGuard(PathBuf);

impl Drop for CwdGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.0);
    }
}

/// Restores an environment variable when dropped.
struct EnvGuard {
    name: &'static str,
    previous: Option<OsString>,
}

impl EnvGuard {
    fn set(name: &'static str, value: &Path) -> Self {
        let previous = std::env::var_os(name);
        // SAFETY: callers hold the exclusive process-state lock.
        unsafe { std::env::set_var(name, value) };
        Self { name, previous }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // SAFETY: dropped before the exclusive process-state lock is released.
        unsafe {
            match &self.previous {
                Some(v) => std::env::set_var(self.name, v),
                None => std::env::remove_var(self.name),
            }
        }
    }
}

/// Sibling directory whose files are copied into a test's root directory:
/// `dir/name.ct` → `dir/name_tf`.
pub fn fixtures_dir(test_file: &Path) -> PathBuf {
    let stem = test_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    test_file.with_file_name(format!("{stem}_tf"))
}

/// Copy the regular files of `from` into `to`, following symlinks.
/// Subdirectories are skipped.
fn copy_fixtures(from: &Path, to: &Path) -> io::Result<()> {
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        if std::fs::metadata(entry.path())?.is_file() {
            std::fs::copy(entry.path(), to.join(entry.file_name()))?;
        }
    }
    Ok(())
}

impl FileRunner<'_> {
    /// Run `tf` in `mode`, returning its report.
    pub fn run(&self, tf: &mut TestFile, mode: Mode) -> FileReport {
        let start = Instant::now();
        let _state = lock_process_state(self.parallel);
        let failure = match mode {
            Mode::Compare => self.compare(tf),
            Mode::Update => self.update(tf).err().map(|e| e.to_string()),
        };
        FileReport {
            file: tf.filename.clone(),
            passed: failure.is_none(),
            duration: start.elapsed(),
            failure,
        }
    }

    /// Run every case of `tf`, stopping at the first one that misbehaves.
    ///
    /// Sequential runs happen inside a fresh temporary directory named by
    /// `ROOTDIR`; the previous directory and `ROOTDIR` value come back
    /// afterwards.
    pub fn execute(&self, tf: &mut TestFile) -> Result<(), FileError> {
        let file = tf.filename.clone();
        let root = if self.parallel {
            None
        } else {
            Some(self.enter_root_dir(&file)?)
        };
        let root_dir = root.as_ref().map(|r| r.dir.path());

        if let Some(setup) = self.setup {
            setup(root_dir).map_err(|source| FileError::Setup {
                file: file.clone(),
                source,
            })?;
        }
        let opts = ExecOptions {
            log: self.log,
            scrub_root_dir: !self.parallel,
        };
        for tc in &mut tf.cases {
            execute_case(tc, self.commands, opts).map_err(|source| FileError::Case {
                file: file.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Create the root directory for `file`, fill it from the fixtures
    /// directory, point `ROOTDIR` at it and make it the current directory.
    fn enter_root_dir(&self, file: &Path) -> Result<RootDirGuard, FileError> {
        let io_err = |context: &'static str| {
            move |source: io::Error| FileError::Io {
                file: file.to_path_buf(),
                context,
                source,
            }
        };
        let temp = tempfile::Builder::new()
            .prefix("cmdtest")
            .tempdir()
            .map_err(io_err("creating root directory"))?;
        let cwd = std::env::current_dir().map_err(io_err("getting current directory"))?;
        let fixtures = fixtures_dir(&cwd.join(file));
        if fixtures.is_dir() {
            copy_fixtures(&fixtures, temp.path()).map_err(|source| FileError::Fixtures {
                file: file.to_path_buf(),
                source,
            })?;
        }

        let env = EnvGuard::set(ROOTDIR_VAR, temp.path());
        std::env::set_current_dir(temp.path()).map_err(io_err("entering root directory"))?;
        let dir = if self.keep_root_dirs {
            let kept = temp.keep();
            tracing::info!(file = %file.display(), root = %kept.display(), "keeping test root directory");
            RootDir::Kept(kept)
        } else {
            RootDir::Temp(temp)
        };
        Ok(RootDirGuard {
            _cwd: CwdGuard(cwd),
            _env: env,
            dir,
        })
    }

    /// Execute `tf` and report every case whose output differs from the file.
    ///
    /// Returns `None` when everything matched.
    pub fn compare(&self, tf: &mut TestFile) -> Option<String> {
        if let Err(e) = self.execute(tf) {
            return Some(e.to_string());
        }
        let mut report = String::new();
        for tc in &tf.cases {
            let got = tc.got_output.as_deref().unwrap_or_default();
            if tc.want_output == got {
                continue;
            }
            let _ = writeln!(
                report,
                "{}:{}: want=-, got=+",
                tf.filename.display(),
                tc.start_line
            );
            let mut commands = Vec::new();
            let _ = tc.write_commands(&mut commands);
            report.push_str(&String::from_utf8_lossy(&commands));
            report.push_str(&line_diff(&tc.want_output, got));
        }
        (!report.is_empty()).then_some(report)
    }

    /// Execute `tf` and write it back with the captured output.
    ///
    /// The file is replaced in one step; on any error it is left as it was.
    pub fn update(&self, tf: &mut TestFile) -> Result<(), FileError> {
        let runner = FileRunner {
            log: false,
            ..*self
        };
        runner.execute(tf)?;
        check_output_markers(tf)?;
        write_file(tf).map_err(|source| FileError::Io {
            file: tf.filename.clone(),
            context: "writing updated file",
            source,
        })
    }
}

/// Refuse output that would read back as commands.
///
/// A captured line starting with `$` (such as a scrubbed `${ROOTDIR}/...`)
/// would parse as a new command once written.
fn check_output_markers(tf: &TestFile) -> Result<(), FileError> {
    for tc in &tf.cases {
        let Some(got) = &tc.got_output else { continue };
        if let Some(text) = got.iter().find(|l| l.starts_with(COMMAND_MARKER)) {
            return Err(FileError::OutputLooksLikeCommand {
                file: tf.filename.clone(),
                line: tc.start_line,
                text: text.clone(),
            });
        }
    }
    Ok(())
}

/// Undoes [`FileRunner::enter_root_dir`] when dropped. Fields drop in order:
/// leave the directory, restore `ROOTDIR`, then remove the directory.
struct RootDirGuard {
    _cwd: CwdGuard,
    _env: EnvGuard,
    dir: RootDir,
}

enum RootDir {
    Temp(tempfile::TempDir),
    Kept(PathBuf),
}

impl RootDir {
    fn path(&self) -> &Path {
        match self {
            RootDir::Temp(t) => t.path(),
            RootDir::Kept(p) => p,
        }
    }
}

/// Write `tf` to a temporary file next to it, then swap that in.
fn write_file(tf: &TestFile) -> io::Result<()> {
    replace_file(&tf.filename, |w| tf.write_to(w))
}

/// Replace `target` with whatever `write` produces. A write error is returned
/// as is; failing to remove the temporary file afterwards is only logged.
fn replace_file<F>(target: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut ReplacementFile) -> io::Result<()>,
{
    let mut tmp = ReplacementFile::new(target)?;
    if let Err(e) = write(&mut tmp) {
        let temp_path = tmp.path().to_path_buf();
        if let Err(cleanup) = tmp.cleanup() {
            tracing::warn!(path = %temp_path.display(), error = %cleanup, "removing temporary file");
        }
        return Err(e);
    }
    tmp.close_atomically_replace()
}

/// Line diff of `want` against `got`, one `-`/`+`/` ` prefixed line per entry.
pub fn line_diff(want: &[String], got: &[String]) -> String {
    let want: Vec<&str> = want.iter().map(String::as_str).collect();
    let got: Vec<&str> = got.iter().map(String::as_str).collect();
    let diff = TextDiff::from_slices(&want, &got);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => '-',
            ChangeTag::Insert => '+',
            ChangeTag::Equal => ' ',
        };
        let _ = writeln!(out, "{sign} {}", change.value());
    }
    out
}
