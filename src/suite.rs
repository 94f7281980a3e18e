//! Test suites: every `.ct` file in a directory, plus the commands they may use.

use crate::builtins::builtins;
use crate::command::{CommandFunc, Commands};
use crate::error::{BoxError, LoadError};
use crate::loader::find_test_files;
use crate::parser::TestFile;
use crate::runner::{FileReport, FileRunner, Mode, SetupFunc};
use std::path::Path;
use std::sync::Arc;
use std::thread;

/// A set of test files and the configuration they run with.
///
/// Build one with [`TestSuite::read`], register commands and set flags, then
/// call [`TestSuite::run`]. The commands and the setup hook are only read
/// during a run.
///
/// ```no_run
/// let mut suite = cmdtest::TestSuite::read("testdata").unwrap();
/// suite.register("my-cli", cmdtest::program("target/debug/my-cli").unwrap());
/// suite.run(cmdtest::Mode::from_env(), false).assert_passed();
/// ```
pub struct TestSuite {
    /// Commands that can appear as the first word of a command line.
    /// Starts out with the built-ins.
    pub commands: Commands,
    /// Called for each file before its cases run.
    pub setup: Option<Arc<SetupFunc>>,
    /// Keep each file's root directory and log where it is.
    pub keep_root_dirs: bool,
    /// Don't log commands and their output while comparing.
    pub disable_logging: bool,
    files: Vec<TestFile>,
}

impl TestSuite {
    /// Read every `.ct` file in `dir`.
    pub fn read(dir: impl AsRef<Path>) -> Result<Self, LoadError> {
        let files = find_test_files(dir.as_ref())?
            .iter()
            .map(|path| TestFile::read(path))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_files(files))
    }

    /// A suite over already-parsed files, with the built-in commands.
    pub fn from_files(files: Vec<TestFile>) -> Self {
        Self {
            commands: builtins(),
            setup: None,
            keep_root_dirs: false,
            disable_logging: false,
            files,
        }
    }

    pub fn files(&self) -> &[TestFile] {
        &self.files
    }

    /// Add or replace a command.
    pub fn register(&mut self, name: impl Into<String>, command: CommandFunc) -> &mut Self {
        self.commands.insert(name.into(), command);
        self
    }

    pub fn set_setup<F>(&mut self, setup: F) -> &mut Self
    where
        F: Fn(Option<&Path>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(setup));
        self
    }

    /// Run every file.
    ///
    /// Sequential runs go one file at a time, each in a fresh temporary root
    /// directory named by `ROOTDIR`; occurrences of that directory in output
    /// read as `${ROOTDIR}`. Parallel runs start every file at once in the
    /// current directory without `ROOTDIR`, so their commands must not depend
    /// on or change the directory or environment.
    ///
    /// A failing file never stops the others.
    pub fn run(&mut self, mode: Mode, parallel: bool) -> SuiteReport {
        let runner = FileRunner {
            commands: &self.commands,
            setup: self.setup.as_deref(),
            keep_root_dirs: self.keep_root_dirs,
            log: !self.disable_logging,
            parallel,
        };
        tracing::debug!(files = self.files.len(), ?mode, parallel, "running suite");

        let files = if parallel {
            let runner = &runner;
            thread::scope(|s| {
                let handles: Vec<_> = self
                    .files
                    .iter_mut()
                    .map(|tf| s.spawn(move || runner.run(tf, mode)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                    .collect()
            })
        } else {
            self.files
                .iter_mut()
                .map(|tf| runner.run(tf, mode))
                .collect()
        };
        SuiteReport { files }
    }
}

/// Outcome of [`TestSuite::run`], one entry per file in suite order.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SuiteReport {
    pub files: Vec<FileReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.files.iter().all(|f| f.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| !f.passed)
    }

    /// Panic with every failing file's report. Meant for use inside `#[test]`.
    #[track_caller]
    pub fn assert_passed(&self) {
        let failures: Vec<String> = self
            .failures()
            .filter_map(|f| f.failure.clone())
            .collect();
        if !failures.is_empty() {
            panic!("{}", failures.join("\n"));
        }
    }
}
