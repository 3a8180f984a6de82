//! # flexbuild
//!
//! Build FlexBoot ROM images for the supported adapters.
//!
//! ## Usage
//!
//! ```bash
//! flexbuild                                  # debug build of every device, version 3.4.400
//! flexbuild -d 4099 -v 3.4.160 --release     # one release image
//! flexbuild --debug hermon:3,ipoib:1         # debug build with per-file verbosity
//! flexbuild --config flexbuild.json          # override paths, devices, vendor dirs
//! ```
//!
//! Output lands in `build_<version>/`, merged vendor images in
//! `build_<version>/clp/`.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use flexbuild::guard;
use flexbuild::tool::BuildTool;
use flexbuild::{BuildConfig, BuildError, BuildOptions, BuildRequest, MergeOptions, RunSummary};
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "flexbuild",
    about = "Build FlexBoot ROM images for every supported adapter",
    disable_version_flag = true
)]
struct Cli {
    /// Device ID, e.g. 4099, or ALL.
    #[arg(short = 'd', long, default_value = "ALL")]
    device: String,

    /// FlexBoot version, A.B.C (e.g. 3.4.160).
    #[arg(short = 'v', long, default_value = "3.4.400")]
    version: String,

    /// Build release images (no -DMLX_DEBUG).
    #[arg(long)]
    release: bool,

    /// Debug verbosity directives: <file1>:<level>,<file2>:<level>,...
    #[arg(long, default_value = "")]
    debug: String,

    /// Concurrent compilation jobs (default: host CPU count).
    #[arg(long = "j_cpus")]
    j_cpus: Option<usize>,

    /// JSON file overriding the built-in build configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// FlexBoot source tree to build in.
    #[arg(short = 'C', long, default_value = ".")]
    root: PathBuf,

    /// Skip merging vendor CLP blobs into the built images.
    #[arg(long)]
    no_merge: bool,

    /// Where merged images go (default: build_<version>/clp).
    #[arg(long)]
    merge_dir: Option<PathBuf>,
}

impl Cli {
    fn build_options(&self) -> BuildOptions {
        BuildOptions {
            device: self.device.clone(),
            version: self.version.clone(),
            release: self.release,
            debug: self.debug.clone(),
            jobs: self.j_cpus,
        }
    }
}

fn main() {
    init_logging();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    std::process::exit(run(&cli));
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stdout)
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();
}

/// Run and turn the outcome into a process exit code.
fn run(cli: &Cli) -> i32 {
    let config = match load_config(cli) {
        Ok(config) => config,
        Err(e) => return report(&e, flexbuild::UnexpectedErrorPolicy::default()),
    };
    let policy = config.unexpected_error_policy;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| execute(cli, &config)))
        .unwrap_or_else(|payload| Err(anyhow::anyhow!("panic: {}", panic_message(&*payload))));

    match outcome {
        Ok(summary) => {
            print_summary(&summary);
            0
        }
        Err(e) => report(&e, policy),
    }
}

fn load_config(cli: &Cli) -> Result<BuildConfig> {
    let Some(path) = &cli.config else {
        return Ok(BuildConfig::default());
    };
    let config = BuildConfig::load(path)?;
    log::info!("Using configuration {}", path.display());
    Ok(config)
}

fn execute(cli: &Cli, config: &BuildConfig) -> Result<RunSummary> {
    let request = BuildRequest::new(&cli.build_options(), config)?;

    let tool = BuildTool::resolve(&config.build_tool, &cli.root).map_err(|e| {
        BuildError::InvalidOptions(format!("build tool '{}' not found: {e}", config.build_tool))
    })?;

    let merge = MergeOptions {
        skip: cli.no_merge,
        dest: cli.merge_dir.clone(),
    };

    let summary = flexbuild::run(config, &cli.root, tool, &request, &merge, |backup| {
        if let Err(e) = guard::install_interrupt_handler(backup) {
            log::warn!("Ctrl+C handler not installed: {e}");
        }
    })
    .with_context(|| format!("building FlexBoot {}", request.version))?;

    Ok(summary)
}

/// Log a failed run and pick its exit code.
fn report(err: &anyhow::Error, policy: flexbuild::UnexpectedErrorPolicy) -> i32 {
    let Some(build_err) = err.downcast_ref::<BuildError>() else {
        log::error!("Exception during build: {err:#}");
        return policy.exit_code();
    };

    log::error!("{build_err}");
    if matches!(
        build_err,
        BuildError::InvalidOptions(_) | BuildError::InvalidVersionFormat(_)
    ) {
        let _ = Cli::command().print_help();
    }
    build_err.exit_code()
}

fn print_summary(summary: &RunSummary) {
    println!("Output directory: {}", summary.output_dir.display());
    for artifact in &summary.artifacts {
        println!("  {}", artifact.display());
    }
    if let Some(merge) = &summary.merge {
        for merged in &merge.merged {
            println!("  {}", merged.display());
        }
    }
    println!("Done.");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
