//! Test file model and parser.
//!
//! A test file is a sequence of cases. Each case is one or more lines starting
//! with `$` (the commands) followed by the lines of their expected output.
//! Blank lines and `#` comments may appear before the first case and between
//! the end of one case's output and the next case's commands:
//!
//! ```text
//! # Prefix comment.
//!
//! $ echo hello
//! hello
//!
//! # Next case.
//! $ cd missing --> FAIL 2
//! ```
//!
//! Trailing blank lines of a case's output cannot be told apart from the blank
//! lines that separate it from the next case, so they are never part of the
//! expected output. Rewriting a file keeps them in the ignorable lines instead.
//!
//! Likewise, an output line starting with `$` always reads as a command, so
//! such output can't be expected. Update mode refuses to write it.

use crate::error::ParseError;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Starts a command line.
pub const COMMAND_MARKER: char = '$';

/// Starts a comment line.
pub const COMMENT_MARKER: char = '#';

/// One parsed `.ct` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFile {
    pub filename: PathBuf,
    pub cases: Vec<TestCase>,
    /// Blank and comment lines after the last case.
    pub suffix: Vec<String>,
}

/// A block of commands and the output they are expected to produce.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestCase {
    /// Blank and comment lines preceding the commands, kept for rewriting.
    pub before: Vec<String>,
    /// 1-based line number of the first command.
    pub start_line: usize,
    /// Command lines with the marker stripped. Never empty.
    pub commands: Vec<String>,
    /// Merged stdout/stderr lines from the file.
    pub want_output: Vec<String>,
    /// Merged stdout/stderr lines from the last run; `None` if nothing was printed.
    pub got_output: Option<Vec<String>>,
}

/// Parser states. The open case travels with the state that owns it.
#[derive(Debug)]
enum State {
    BeforeFirstCommand { prefix: Vec<String> },
    InCommands(TestCase),
    InOutput(TestCase),
}

impl TestFile {
    /// Read and parse the file at `path`.
    pub fn read(path: &Path) -> Result<Self, ParseError> {
        let text = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            file: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    /// Parse `text`; `filename` is only used to name the file in errors.
    pub fn parse(filename: impl Into<PathBuf>, text: &str) -> Result<Self, ParseError> {
        let mut tf = TestFile {
            filename: filename.into(),
            cases: Vec::new(),
            suffix: Vec::new(),
        };
        let mut state = State::BeforeFirstCommand { prefix: Vec::new() };
        for (i, line) in text.lines().enumerate() {
            let lineno = i + 1;
            let is_command = line.starts_with(COMMAND_MARKER);
            state = match state {
                State::BeforeFirstCommand { mut prefix } => {
                    if is_command {
                        State::InCommands(TestCase::start(lineno, prefix, line))
                    } else {
                        let line = line.trim();
                        if !is_ignorable(line) {
                            return Err(ParseError::BadLine {
                                file: tf.filename,
                                line: lineno,
                                text: line.to_string(),
                            });
                        }
                        prefix.push(line.to_string());
                        State::BeforeFirstCommand { prefix }
                    }
                }
                State::InCommands(mut tc) => {
                    if is_command {
                        tc.add_command_line(line);
                        State::InCommands(tc)
                    } else {
                        // End of commands is the start of the output.
                        tc.want_output.push(line.to_string());
                        State::InOutput(tc)
                    }
                }
                State::InOutput(mut tc) => {
                    if is_command {
                        let before = tf.add_case(tc);
                        State::InCommands(TestCase::start(lineno, before, line))
                    } else {
                        tc.want_output.push(line.to_string());
                        State::InOutput(tc)
                    }
                }
            };
        }
        tf.suffix = match state {
            // A file without cases keeps its comments when rewritten.
            State::BeforeFirstCommand { prefix } => prefix,
            State::InCommands(tc) | State::InOutput(tc) => tf.add_case(tc),
        };
        Ok(tf)
    }

    /// Split the trailing blank and comment lines off `tc`'s output, store `tc`,
    /// and return those lines. Output lines are checked untrimmed.
    fn add_case(&mut self, mut tc: TestCase) -> Vec<String> {
        let keep = tc
            .want_output
            .iter()
            .rposition(|l| !is_ignorable(l))
            .map_or(0, |i| i + 1);
        let suffix = tc.want_output.split_off(keep);
        self.cases.push(tc);
        suffix
    }

    /// Write the file back out, using each case's captured output where there is any.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for case in &self.cases {
            case.write_to(w)?;
        }
        write_lines(w, &self.suffix)
    }
}

impl TestCase {
    fn start(line: usize, before: Vec<String>, command_line: &str) -> Self {
        let mut tc = TestCase {
            before,
            start_line: line,
            ..Default::default()
        };
        tc.add_command_line(command_line);
        tc
    }

    fn add_command_line(&mut self, line: &str) {
        self.commands
            .push(line[COMMAND_MARKER.len_utf8()..].trim().to_string());
    }

    /// The output to persist: captured output if any, else the expected output.
    pub fn output(&self) -> &[String] {
        self.got_output.as_deref().unwrap_or(&self.want_output)
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_lines(w, &self.before)?;
        self.write_commands(w)?;
        write_lines(w, self.output())
    }

    pub fn write_commands<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for c in &self.commands {
            writeln!(w, "{COMMAND_MARKER} {c}")?;
        }
        Ok(())
    }
}

fn is_ignorable(line: &str) -> bool {
    line.is_empty() || line.starts_with(COMMENT_MARKER)
}

fn write_lines<W: Write>(w: &mut W, lines: &[String]) -> io::Result<()> {
    for l in lines {
        w.write_all(l.as_bytes())?;
        w.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    const SAMPLE: &str = "# A sample test file.

#   Prefix stuff.

$ command arg1 arg2
$ cmd2
out1
out2

# start of the next case
$ c3

# start of the third

$ c4 --> FAIL
out3

$ c5 --> FAIL 2
out4


# end
";

    #[test]
    fn parse_sample_file() {
        let tf = TestFile::parse("read.ct", SAMPLE).unwrap();
        let want = TestFile {
            filename: PathBuf::from("read.ct"),
            cases: vec![
                TestCase {
                    before: strings(&["# A sample test file.", "", "#   Prefix stuff.", ""]),
                    start_line: 5,
                    commands: strings(&["command arg1 arg2", "cmd2"]),
                    want_output: strings(&["out1", "out2"]),
                    got_output: None,
                },
                TestCase {
                    before: strings(&["", "# start of the next case"]),
                    start_line: 11,
                    commands: strings(&["c3"]),
                    want_output: vec![],
                    got_output: None,
                },
                TestCase {
                    before: strings(&["", "# start of the third", ""]),
                    start_line: 15,
                    commands: strings(&["c4 --> FAIL"]),
                    want_output: strings(&["out3"]),
                    got_output: None,
                },
                TestCase {
                    before: strings(&[""]),
                    start_line: 18,
                    commands: strings(&["c5 --> FAIL 2"]),
                    want_output: strings(&["out4"]),
                    got_output: None,
                },
            ],
            suffix: strings(&["", "", "# end"]),
        };
        assert_eq!(tf, want);
    }

    #[test]
    fn parse_single_case_drops_trailing_blank() {
        let tf = TestFile::parse("t.ct", "$ echo hi\nhi\n\n").unwrap();
        assert_eq!(tf.cases.len(), 1);
        assert_eq!(tf.cases[0].commands, strings(&["echo hi"]));
        assert_eq!(tf.cases[0].want_output, strings(&["hi"]));
        assert_eq!(tf.suffix, strings(&[""]));
    }

    #[test]
    fn parse_blank_and_comment_become_next_before() {
        let tf = TestFile::parse("t.ct", "$ a\nx\n\n# c\n$ b\ny\n").unwrap();
        assert_eq!(tf.cases.len(), 2);
        assert_eq!(tf.cases[1].before, strings(&["", "# c"]));
        assert_eq!(tf.cases[1].start_line, 5);
        assert!(tf.suffix.is_empty());
    }

    #[test]
    fn parse_keeps_comment_lines_inside_output() {
        let tf = TestFile::parse("t.ct", "$ a\n# not a comment\nx\n\n").unwrap();
        assert_eq!(tf.cases[0].want_output, strings(&["# not a comment", "x"]));
    }

    #[test]
    fn parse_rejects_text_before_first_command() {
        let err = TestFile::parse("bad.ct", "# ok\nnot ok\n$ a\n").unwrap_err();
        assert!(matches!(err, ParseError::BadLine { line: 2, .. }));
        assert_eq!(
            err.to_string(),
            "bad.ct:2: bad line \"not ok\" (should begin with '#')"
        );
    }

    #[test]
    fn parse_empty_file() {
        let tf = TestFile::parse("t.ct", "").unwrap();
        assert!(tf.cases.is_empty());
        assert!(tf.suffix.is_empty());
        let tf = TestFile::parse("t.ct", "# only a comment\n").unwrap();
        assert!(tf.cases.is_empty());
        assert_eq!(tf.suffix, strings(&["# only a comment"]));
    }

    #[test]
    fn write_reproduces_file() {
        let tf = TestFile::parse("read.ct", SAMPLE).unwrap();
        let mut out = Vec::new();
        tf.write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), SAMPLE);
    }

    #[test]
    fn write_prefers_captured_output() {
        let mut tf = TestFile::parse("t.ct", "$ a\nold\n\n$ b\nkeep\n").unwrap();
        tf.cases[0].got_output = Some(strings(&["new", "lines"]));
        let mut out = Vec::new();
        tf.write_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "$ a\nnew\nlines\n\n$ b\nkeep\n"
        );
    }
}
