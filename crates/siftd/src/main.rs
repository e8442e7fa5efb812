use std::path::Path;

use anyhow::{Context, Result};
use sift_config::{SiftConfig, ensure_workspace_config, validate_config};
use sift_variants::variant_manager_from_config;
use siftd::classify::write_classifications;
use siftd::cli::{Cli, ClassifyArgs, Command, ReportArgs, ServeArgs, parse_cli};
use siftd::daemon::{ServeOptions, build_generator, open_store, run_server};
use siftd::logging::init_tracing;
use siftd::report::run_report_once;
use siftd::snapshot::resolve_snapshot_dir;

fn main() -> Result<()> {
    let cli = parse_cli();
    init_tracing(cli.log_format);
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let workspace = cli.workspace.canonicalize().with_context(|| {
        format!(
            "failed to resolve workspace path {}",
            cli.workspace.display()
        )
    })?;

    let config = ensure_workspace_config(&workspace).with_context(|| {
        format!(
            "failed to load or create workspace config at {}",
            sift_config::config_path(&workspace).display()
        )
    })?;
    for warning in validate_config(&config) {
        eprintln!("SIFT config warning [{}]: {}", warning.code, warning.message);
    }

    match cli.command {
        Command::Serve(args) => serve(&workspace, config, args),
        Command::Report(args) => report(&workspace, &config, args),
        Command::Classify(args) => classify(&config, args),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")
}

fn serve(workspace: &Path, config: SiftConfig, args: ServeArgs) -> Result<()> {
    let snapshot_dir = resolve_snapshot_dir(workspace, args.snapshot.snapshots.as_deref());
    let store = if args.no_persist {
        None
    } else {
        Some(open_store(workspace)?)
    };
    let listen = args
        .listen
        .unwrap_or_else(|| config.server.listen.clone());

    runtime()?.block_on(run_server(ServeOptions {
        config,
        snapshot_dir,
        listen,
        store,
    }))
}

fn report(workspace: &Path, config: &SiftConfig, args: ReportArgs) -> Result<()> {
    let snapshot_dir = resolve_snapshot_dir(workspace, args.snapshot.snapshots.as_deref());
    let store = if args.persist {
        Some(open_store(workspace)?)
    } else {
        None
    };
    let generator = build_generator(config);

    let mut out = std::io::stdout().lock();
    runtime()?.block_on(run_report_once(
        &generator,
        &snapshot_dir,
        args.report_type,
        store,
        &mut out,
    ))
}

fn classify(config: &SiftConfig, args: ClassifyArgs) -> Result<()> {
    let manager = variant_manager_from_config(&config.variants);
    let release = args
        .release
        .unwrap_or_else(|| config.report.release.clone());

    let mut out = std::io::stdout().lock();
    write_classifications(manager.as_ref(), &release, &args.jobs, &mut out)
        .context("failed to write classifications")
}
