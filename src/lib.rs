//! Golden-output tests for command-line interfaces.
//!
//! A test suite is a directory of `.ct` files. Each file holds shell-like
//! command lines and the merged output they are expected to print:
//!
//! ```text
//! # Comments and blank lines may precede a case.
//! $ fecho greeting.txt hello\nworld
//! $ cat greeting.txt
//! hello
//! world
//!
//! $ cd missing --> FAIL 2
//! ```
//!
//! Lines starting with `$` are commands; the lines after them, up to the next
//! blank-or-comment run followed by a `$` line, are their expected output.
//! Words are split on whitespace with no quoting. `${VAR}` in a word expands to
//! an environment variable, and an undefined variable is an error. A final
//! `< FILE` feeds FILE to the command's input. A ` --> FAIL` suffix marks a
//! command that must fail, optionally with a specific non-zero exit code.
//!
//! Files run in order, each in a fresh temporary directory exported as
//! `ROOTDIR`; that directory reads as `${ROOTDIR}` in captured output. A run
//! either compares output with the files or rewrites the files with the new
//! output ([`Mode::Update`]).
//!
//! ```no_run
//! #[test]
//! fn cli() {
//!     let mut suite = cmdtest::TestSuite::read("testdata").unwrap();
//!     suite.register("my-cli", cmdtest::program("target/debug/my-cli").unwrap());
//!     suite.run(cmdtest::Mode::from_env(), false).assert_passed();
//! }
//! ```

pub mod builtins;
pub mod command;
pub mod command_line;
pub mod error;
pub mod exec;
pub mod expand;
pub mod loader;
pub mod parser;
pub mod program;
pub mod replace;
pub mod runner;
pub mod schema;
pub mod suite;

pub use command::{CommandFunc, CommandOutput, Commands, command_fn};
pub use command_line::{CommandLine, parse_command_line};
pub use error::{
    BoxError, CommandError, CommandLineError, ExecError, ExitCodeError, ExpandError, FileError,
    LoadError, ParseError,
};
pub use exec::{ExecOptions, execute_case};
pub use expand::expand_variables;
pub use parser::{TestCase, TestFile};
pub use program::{in_process_program, program};
pub use runner::{FileReport, Mode};
pub use suite::{SuiteReport, TestSuite};
