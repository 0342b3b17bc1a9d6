#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Command-line frontend for the mirror tools.
//!
//! The surface is intentionally small:
//!
//! ```text
//! mirror --tool={create-db|verify-dir|merge-dir} --db=PATH SOURCE [DEST]
//!        [--help] [--version]
//! ```
//!
//! `run_with` performs argument parsing, installs the diagnostics
//! subscriber, initializes the locale converter, opens the manifest, and
//! dispatches to the engine operation for the selected tool. Mismatch
//! events surface as diagnostics on the error stream and do not affect
//! the exit status; only fatal errors do. The process exits 0 on success
//! and 1 on any fatal error.

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Arg, ArgMatches, Command};
use manifest::Manifest;
use tracing::info;
use tracing_subscriber::EnvFilter;
use walk::WalkOptions;

/// The tool selected with `--tool`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tool {
    CreateDb,
    VerifyDir,
    MergeDir,
}

impl Tool {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "create-db" => Some(Self::CreateDb),
            "verify-dir" => Some(Self::VerifyDir),
            "merge-dir" => Some(Self::MergeDir),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Engine(#[from] engine::EngineError),
    #[error(transparent)]
    Manifest(#[from] manifest::ManifestError),
}

/// Parses `args` and runs the selected tool.
///
/// Fatal errors are written to `stderr` as a single prefixed line, the
/// way the process entry point expects to surface them.
pub fn run_with<I, S>(args: I, stderr: &mut dyn Write) -> ExitCode
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    init_diagnostics();
    encoding::init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "mirror: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run<I, S>(args: I) -> Result<(), CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let matches = match command().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(error)
            if matches!(
                error.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) =>
        {
            let _ = error.print();
            return Ok(());
        }
        Err(error) => return Err(CliError::Usage(error.to_string())),
    };

    let request = Request::from_matches(&matches)?;
    dispatch(&request)
}

struct Request {
    tool: Tool,
    db: PathBuf,
    source: PathBuf,
    dest: Option<PathBuf>,
}

impl Request {
    fn from_matches(matches: &ArgMatches) -> Result<Self, CliError> {
        let tool = matches
            .get_one::<String>("tool")
            .and_then(|value| Tool::parse(value))
            .ok_or_else(|| CliError::Usage("no tool specified".to_owned()))?;
        let db = matches
            .get_one::<PathBuf>("db")
            .cloned()
            .ok_or_else(|| CliError::Usage("no manifest database specified".to_owned()))?;
        let source = matches
            .get_one::<PathBuf>("source")
            .cloned()
            .ok_or_else(|| CliError::Usage("no SOURCE directory specified".to_owned()))?;
        let dest = matches.get_one::<PathBuf>("dest").cloned();

        match tool {
            Tool::MergeDir if dest.is_none() => {
                return Err(CliError::Usage(
                    "merge-dir requires both SOURCE and DEST directories".to_owned(),
                ));
            }
            Tool::CreateDb | Tool::VerifyDir if dest.is_some() => {
                return Err(CliError::Usage(
                    "only merge-dir accepts a DEST directory".to_owned(),
                ));
            }
            _ => {}
        }

        Ok(Self {
            tool,
            db,
            source,
            dest,
        })
    }
}

fn dispatch(request: &Request) -> Result<(), CliError> {
    let options = WalkOptions::default();

    match request.tool {
        Tool::CreateDb => {
            let manifest = Manifest::open(&request.db, true)?;
            engine::create_manifest(&request.source, &manifest, &options)?;
            manifest.close()?;
            info!("manifest created from '{}'", request.source.display());
        }
        Tool::VerifyDir => {
            let manifest = Manifest::open(&request.db, false)?;
            let mut reporter = engine::VerifyReporter::new();
            engine::verify_tree(&request.source, &manifest, &mut reporter, &options)?;
            manifest.close()?;
            let counts = reporter.counts();
            if counts.is_clean() {
                info!("'{}' matches the manifest", request.source.display());
            } else {
                info!(
                    "'{}' diverges from the manifest: {} missing, {} new, {} mismatched",
                    request.source.display(),
                    counts.missing,
                    counts.unexpected,
                    counts.mismatched
                );
            }
        }
        Tool::MergeDir => {
            let dest = request
                .dest
                .as_deref()
                .ok_or_else(|| CliError::Usage("merge-dir requires DEST".to_owned()))?;
            let manifest = Manifest::open(&request.db, false)?;
            let counts = engine::merge_tree(&request.source, dest, &manifest, &options)?;
            manifest.close()?;
            info!(
                "merged '{}' into '{}': {} entries copied",
                request.source.display(),
                dest.display(),
                counts.missing
            );
        }
    }
    Ok(())
}

fn command() -> Command {
    Command::new("mirror")
        .about("Maintains a manifest of a directory tree and verifies or merges mirrors against it")
        .version(env!("CARGO_PKG_VERSION"))
        .disable_help_subcommand(true)
        .arg(
            Arg::new("tool")
                .long("tool")
                .value_name("TOOL")
                .value_parser(["create-db", "verify-dir", "merge-dir"])
                .required(true)
                .help("Tool to run against the manifest"),
        )
        .arg(
            Arg::new("db")
                .long("db")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .required(true)
                .help("Path of the manifest database"),
        )
        .arg(
            Arg::new("source")
                .value_name("SOURCE")
                .value_parser(clap::value_parser!(PathBuf))
                .required(true)
                .help("Directory to record, verify, or merge from"),
        )
        .arg(
            Arg::new("dest")
                .value_name("DEST")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Destination directory (merge-dir only)"),
        )
}

fn init_diagnostics() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<(), CliError> {
        run(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn missing_tool_is_rejected() {
        let error = parse(&["mirror", "--db", "m.db", "src"]).expect_err("usage error");
        assert!(matches!(error, CliError::Usage(_)));
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let error =
            parse(&["mirror", "--tool=transmogrify", "--db=m.db", "src"]).expect_err("usage error");
        assert!(matches!(error, CliError::Usage(_)));
    }

    #[test]
    fn missing_db_is_rejected() {
        let error = parse(&["mirror", "--tool=create-db", "src"]).expect_err("usage error");
        assert!(matches!(error, CliError::Usage(_)));
    }

    #[test]
    fn missing_source_is_rejected() {
        let error = parse(&["mirror", "--tool=create-db", "--db=m.db"]).expect_err("usage error");
        assert!(matches!(error, CliError::Usage(_)));
    }

    #[test]
    fn merge_without_dest_is_rejected() {
        let error =
            parse(&["mirror", "--tool=merge-dir", "--db=m.db", "src"]).expect_err("usage error");
        assert!(matches!(error, CliError::Usage(_)));
    }

    #[test]
    fn verify_with_dest_is_rejected() {
        let error = parse(&["mirror", "--tool=verify-dir", "--db=m.db", "src", "dest"])
            .expect_err("usage error");
        assert!(matches!(error, CliError::Usage(_)));
    }

    #[test]
    fn verify_against_a_missing_manifest_fails() {
        let temp = tempfile::tempdir().expect("tempdir");
        let db = temp.path().join("missing.db");
        let src = temp.path().join("src");
        std::fs::create_dir(&src).expect("mkdir");

        let error = parse(&[
            "mirror",
            "--tool=verify-dir",
            &format!("--db={}", db.display()),
            &format!("{}", src.display()),
        ])
        .expect_err("missing manifest");
        assert!(matches!(error, CliError::Manifest(_)));
    }

    #[test]
    fn create_and_verify_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let db = temp.path().join("files.db");
        let src = temp.path().join("src");
        std::fs::create_dir(&src).expect("mkdir");
        std::fs::write(src.join("a.txt"), b"payload").expect("write");

        parse(&[
            "mirror",
            "--tool=create-db",
            &format!("--db={}", db.display()),
            &format!("{}", src.display()),
        ])
        .expect("create-db");

        parse(&[
            "mirror",
            "--tool=verify-dir",
            &format!("--db={}", db.display()),
            &format!("{}", src.display()),
        ])
        .expect("verify-dir");
    }

    #[test]
    fn help_and_version_exit_successfully() {
        parse(&["mirror", "--help"]).expect("help");
        parse(&["mirror", "--version"]).expect("version");
    }
}
