use clap::{Parser, Subcommand, ValueEnum};
use cmdtest::loader::{self, find_test_files};
use cmdtest::schema::{self, SuiteConfig};
use cmdtest::{FileReport, Mode, SuiteReport, TestFile, TestSuite};
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with checkmarks
    #[default]
    Human,
    /// Machine-readable JSON output
    Json,
    /// JUnit XML output for CI systems
    Junit,
}

#[derive(Parser)]
#[command(name = "cmdtest")]
#[command(about = "Golden-output tests for command-line interfaces")]
#[command(version)]
struct Cli {
    /// Log every command and its output
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a suite of .ct files
    Run {
        /// Directory holding the .ct files
        dir: PathBuf,
        /// Rewrite the files with the actual output instead of comparing
        #[arg(short, long)]
        update: bool,
        /// Run files in parallel, without root directories or ROOTDIR
        #[arg(short, long)]
        parallel: bool,
        /// Keep each file's root directory after the run
        #[arg(long)]
        keep_root_dirs: bool,
        /// Don't log commands while comparing
        #[arg(short, long)]
        quiet: bool,
        /// Register an executable as a command (repeatable)
        #[arg(long = "program", value_name = "NAME=PATH", value_parser = parse_program)]
        programs: Vec<(String, PathBuf)>,
        /// Output format
        #[arg(short, long, default_value = "human")]
        output: OutputFormat,
    },
    /// Parse .ct files without running them
    Validate {
        /// Directory holding the .ct files
        dir: PathBuf,
    },
    /// Scaffold a new .ct file
    Init {
        /// Output path for the new test file
        #[arg(default_value = "testdata/example.ct")]
        path: PathBuf,
    },
    /// Output the suite config schema
    Schema,
}

fn parse_program(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got {s:?}")),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run {
            dir,
            update,
            parallel,
            keep_root_dirs,
            quiet,
            programs,
            output,
        } => {
            let config = match loader::load_suite_config(&dir) {
                Ok(config) => config.unwrap_or_default(),
                Err(e) => {
                    eprintln!("Error loading suite config: {e}");
                    std::process::exit(1);
                }
            };

            let mut suite = match TestSuite::read(&dir) {
                Ok(suite) => suite,
                Err(e) => {
                    eprintln!("Error reading suite: {e}");
                    std::process::exit(1);
                }
            };
            if suite.files().is_empty() {
                eprintln!("No .ct files found in: {}", dir.display());
                std::process::exit(1);
            }

            // CLI flags override the suite config
            let parallel = parallel || config.parallel;
            suite.keep_root_dirs = keep_root_dirs || config.keep_root_dirs;
            suite.disable_logging = quiet || config.disable_logging;
            if let Err(e) = register_programs(&mut suite, &config, &dir, programs) {
                eprintln!("Error registering program: {e}");
                std::process::exit(1);
            }

            let mode = if update { Mode::Update } else { Mode::Compare };
            let run_start = std::time::Instant::now();
            let report = suite.run(mode, parallel);
            let total_time = run_start.elapsed();

            match output {
                OutputFormat::Human => print_human(&report, mode),
                OutputFormat::Json => {
                    let output = serde_json::json!({
                        "mode": mode,
                        "passed": report.files.iter().filter(|f| f.passed).count(),
                        "failed": report.failures().count(),
                        "results": report.files,
                    });
                    match serde_json::to_string_pretty(&output) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing results: {e}");
                            std::process::exit(1);
                        }
                    }
                }
                OutputFormat::Junit => {
                    print!("{}", format_junit_xml(&dir, &report.files, total_time));
                }
            }

            if !report.passed() {
                std::process::exit(1);
            }
        }
        Command::Validate { dir } => {
            let files = match find_test_files(&dir) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Error finding test files: {e}");
                    std::process::exit(1);
                }
            };

            if files.is_empty() {
                eprintln!("No .ct files found in: {}", dir.display());
                std::process::exit(1);
            }

            let mut errors = 0;
            for path in &files {
                match TestFile::read(path) {
                    Ok(tf) => {
                        println!("✓ {} ({} cases)", path.display(), tf.cases.len());
                    }
                    Err(e) => {
                        eprintln!("✗ {e}");
                        errors += 1;
                    }
                }
            }

            if errors > 0 {
                eprintln!("\n{errors} file(s) failed validation");
                std::process::exit(1);
            }
            println!("\nAll {} file(s) valid", files.len());
        }
        Command::Init { path } => {
            let template = r#"# Lines starting with '$' are commands; the lines after them are the
# expected output (stdout and stderr merged). Blank lines and comments
# separate cases. Regenerate the output with `cmdtest run --update`.

$ fecho greeting.txt hello\nworld
$ cat greeting.txt
hello
world

# A command expected to fail, with its exit code.
$ cd missing --> FAIL 2
"#;
            if path.exists() {
                eprintln!("Error: file already exists: {}", path.display());
                std::process::exit(1);
            }
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
                && let Err(e) = fs::create_dir_all(parent)
            {
                eprintln!("Error creating directory: {e}");
                std::process::exit(1);
            }
            if let Err(e) = fs::write(&path, template) {
                eprintln!("Error writing file: {e}");
                std::process::exit(1);
            }
            println!("Created: {}", path.display());
        }
        Command::Schema => {
            let schema = schema::generate_schema();
            match serde_json::to_string_pretty(&schema) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing schema: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Register the config's programs, then the ones given on the command line.
fn register_programs(
    suite: &mut TestSuite,
    config: &SuiteConfig,
    dir: &std::path::Path,
    cli_programs: Vec<(String, PathBuf)>,
) -> std::io::Result<()> {
    for (name, path) in config.resolved_programs(dir).into_iter().chain(cli_programs) {
        tracing::debug!(%name, path = %path.display(), "registering program");
        suite.register(name, cmdtest::program(&path)?);
    }
    Ok(())
}

fn print_human(report: &SuiteReport, mode: Mode) {
    for file in &report.files {
        if file.passed {
            let verb = match mode {
                Mode::Compare => "",
                Mode::Update => " updated",
            };
            println!("✓ {}{verb} ({:.2?})", file.file.display(), file.duration);
        } else {
            println!("✗ {} ({:.2?})", file.file.display(), file.duration);
            if let Some(failure) = &file.failure {
                for line in failure.lines() {
                    println!("    {line}");
                }
            }
        }
    }
    let failed = report.failures().count();
    println!("\n{} passed, {failed} failed", report.files.len() - failed);
}

/// Format file results as JUnit XML, one test case per file.
fn format_junit_xml(dir: &std::path::Path, files: &[FileReport], total_time: Duration) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

    let tests = files.len();
    let failures = files.iter().filter(|f| !f.passed).count();
    let _ = writeln!(
        xml,
        "<testsuites tests=\"{tests}\" failures=\"{failures}\" time=\"{:.3}\">",
        total_time.as_secs_f64()
    );
    let _ = writeln!(
        xml,
        "  <testsuite name=\"{}\" tests=\"{tests}\" failures=\"{failures}\" time=\"{:.3}\" timestamp=\"{}\">",
        escape_xml(&dir.display().to_string()),
        total_time.as_secs_f64(),
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S")
    );

    for file in files {
        let name = file
            .file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.file.display().to_string());
        let _ = writeln!(
            xml,
            "    <testcase name=\"{}\" classname=\"{}\" time=\"{:.3}\">",
            escape_xml(&name),
            escape_xml(&file.file.display().to_string()),
            file.duration.as_secs_f64()
        );
        if let Some(failure) = &file.failure {
            let message = failure.lines().next().unwrap_or("Test failed");
            let _ = writeln!(xml, "      <failure message=\"{}\">", escape_xml(message));
            let _ = writeln!(xml, "{}", escape_xml(failure));
            xml.push_str("      </failure>\n");
        }
        xml.push_str("    </testcase>\n");
    }

    xml.push_str("  </testsuite>\n");
    xml.push_str("</testsuites>\n");
    xml
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_program_flag() {
        assert_eq!(
            parse_program("tool=bin/tool").unwrap(),
            ("tool".to_string(), PathBuf::from("bin/tool"))
        );
        assert!(parse_program("tool").is_err());
        assert!(parse_program("=bin/tool").is_err());
    }

    #[test]
    fn junit_escapes_failures() {
        let files = vec![
            FileReport {
                file: PathBuf::from("testdata/ok.ct"),
                passed: true,
                duration: Duration::from_millis(5),
                failure: None,
            },
            FileReport {
                file: PathBuf::from("testdata/bad.ct"),
                passed: false,
                duration: Duration::from_millis(7),
                failure: Some("testdata/bad.ct:1: \"x\" failed with <oops>".to_string()),
            },
        ];
        let xml = format_junit_xml(std::path::Path::new("testdata"), &files, Duration::ZERO);
        assert!(xml.contains("<testsuites tests=\"2\" failures=\"1\""));
        assert!(xml.contains("<testcase name=\"ok\""));
        assert!(xml.contains("&quot;x&quot; failed with &lt;oops&gt;"));
    }
}
