use std::ffi::OsStr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use sift_core::ReportType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Aggregate CI test results into pass-rate reports and serve them"
)]
pub struct Cli {
    #[arg(
        long,
        default_value = ".",
        help = "Workspace root holding .sift/config.toml"
    )]
    pub workspace: PathBuf,

    #[arg(
        long,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log output format: human or json"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Regenerate reports periodically and serve them over HTTP.
    Serve(ServeArgs),
    /// Generate reports once and print one of them as JSON.
    Report(ReportArgs),
    /// Print the variants each job name classifies to.
    Classify(ClassifyArgs),
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct SnapshotArgs {
    #[arg(
        long,
        help = "Directory of TestGrid job JSON files (default: .sift/snapshots)"
    )]
    pub snapshots: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub snapshot: SnapshotArgs,

    #[arg(long, help = "Listen address, overrides [server].listen")]
    pub listen: Option<String>,

    #[arg(long, help = "Do not persist test rollups to .sift/rollups.sqlite")]
    pub no_persist: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub snapshot: SnapshotArgs,

    #[arg(
        long = "type",
        default_value = "current",
        value_parser = parse_report_type,
        help = "Report to print: current, previous or two_day"
    )]
    pub report_type: ReportType,

    #[arg(long, help = "Also persist test rollups to .sift/rollups.sqlite")]
    pub persist: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ClassifyArgs {
    #[arg(required = true, help = "Job names to classify")]
    pub jobs: Vec<String>,

    #[arg(long, help = "Release to classify against, overrides [report].release")]
    pub release: Option<String>,
}

pub fn parse_cli() -> Cli {
    parse_cli_from(std::env::args_os())
}

/// Tolerates a leading `--` left behind by wrapper scripts.
pub fn parse_cli_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let mut args = args.into_iter().map(Into::into).collect::<Vec<_>>();
    if args.get(1).map(|arg| arg.as_os_str()) == Some(OsStr::new("--")) {
        args.remove(1);
    }
    Cli::parse_from(args)
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

fn parse_report_type(value: &str) -> Result<ReportType, String> {
    value.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_known_values() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" human ".parse::<LogFormat>(), Ok(LogFormat::Human));
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn leading_double_dash_is_ignored() {
        let cli = parse_cli_from(["siftd", "--", "--log-format", "json", "classify", "e2e-aws"]);
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Command::Classify(args) => assert_eq!(args.jobs, vec!["e2e-aws".to_owned()]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn report_type_defaults_to_current() {
        let cli = parse_cli_from(["siftd", "report", "--snapshots", "snaps"]);
        match cli.command {
            Command::Report(args) => {
                assert_eq!(args.report_type, ReportType::Current);
                assert_eq!(args.snapshot.snapshots, Some(PathBuf::from("snaps")));
                assert!(!args.persist);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
