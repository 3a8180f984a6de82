//! Multi-device ROM build.
//!
//! For every requested device, in order:
//! 1. `make clean`
//! 2. reset `romprefix.S` from its backup and patch in the device's header
//! 3. `make -j N bin/<Device>.mrom EXTRA_CFLAGS=... [DEBUG=...]`
//! 4. copy the image and its `.tmp`/`.tmp.map` companions to `build_<version>/`
//!
//! A failing build stops the run; nothing else does.

use crate::config::BuildConfig;
use crate::device::Device;
use crate::error::{BuildError, EXIT_SPAWN_FAILED};
use crate::guard::{LifecycleGuard, TemplateBackup};
use crate::header::HeaderRecord;
use crate::merge::{ArtifactMerger, MergeReport};
use crate::patch::{self, Markers};
use crate::request::BuildRequest;
use crate::tool::{self, BuildInvocation, BuildTool};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const COMPANION_SUFFIXES: [&str; 2] = [".tmp", ".tmp.map"];

/// Post-build merge settings.
#[derive(Clone, Debug, Default)]
pub struct MergeOptions {
    pub skip: bool,
    /// Defaults to `<output dir>/clp`.
    pub dest: Option<PathBuf>,
}

#[derive(Debug)]
pub struct RunSummary {
    pub output_dir: PathBuf,
    pub artifacts: Vec<PathBuf>,
    pub merge: Option<MergeReport>,
}

/// `<product>-<version>[_DEBUG]_<device><ext>`.
pub fn artifact_name(config: &BuildConfig, version: &str, release: bool, device: &Device) -> String {
    let debug = if release { "" } else { "_DEBUG" };
    format!(
        "{}-{version}{debug}_{}{}",
        config.product, device.id, config.rom_extension
    )
}

/// Compiler flags for one device build.
pub fn cflags(config: &BuildConfig, device: &Device, release: bool) -> Vec<String> {
    let mut flags = config.base_cflags.clone();
    if !release {
        flags.push("-DMLX_DEBUG".into());
    }
    if device.flash_configuration {
        flags.push("-DFLASH_CONFIGURATION".into());
    }
    flags
}

pub struct DeviceBuildPipeline<'a> {
    config: &'a BuildConfig,
    root: &'a Path,
    tool: BuildTool,
}

impl<'a> DeviceBuildPipeline<'a> {
    pub fn new(config: &'a BuildConfig, root: &'a Path, tool: BuildTool) -> Self {
        Self { config, root, tool }
    }

    pub fn invocation(&self, request: &BuildRequest, device: &Device) -> BuildInvocation {
        BuildInvocation {
            jobs: request.jobs,
            target: self.config.built_image(&device.name),
            cflags: cflags(self.config, device, request.release),
            debug: request.debug.clone(),
        }
    }

    /// The version-stamped header block, end marker included so the patched
    /// template keeps its delimiter.
    pub fn header_block(&self, request: &BuildRequest, device: &Device) -> Result<String, BuildError> {
        let record = HeaderRecord::new(&request.version, device)?;
        Ok(format!("{}{}\n", record.render(), self.config.end_marker))
    }

    /// Remove and recreate `build_<version>`.
    pub fn prepare_output_dir(&self, request: &BuildRequest) -> Result<PathBuf, BuildError> {
        let dir = self.root.join(self.config.output_dir(request.version.as_str()));
        if dir.exists() {
            log::info!("Removing {}", dir.display());
            fs::remove_dir_all(&dir).map_err(|e| BuildError::directory_failed(&dir, e))?;
        }
        log::info!("Creating output directory: {}", dir.display());
        fs::create_dir_all(&dir).map_err(|e| BuildError::directory_failed(&dir, e))?;
        Ok(dir)
    }

    /// Build every requested device; the first build failure ends the loop.
    pub fn build_all(
        &self,
        request: &BuildRequest,
        templates: &TemplateBackup,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, BuildError> {
        let mut artifacts = Vec::with_capacity(request.devices.len());
        for device in &request.devices {
            artifacts.push(self.build_device(request, device, templates, output_dir)?);
        }
        Ok(artifacts)
    }

    pub fn build_device(
        &self,
        request: &BuildRequest,
        device: &Device,
        templates: &TemplateBackup,
        output_dir: &Path,
    ) -> Result<PathBuf, BuildError> {
        let started = Local::now();

        self.clean();

        log::info!(
            "Current build configuration: Device - {} ; FC - {}",
            device.id,
            device.flash_configuration
        );

        let rom_prefix = self.root.join(&self.config.rom_prefix);
        let markers = Markers {
            start: &self.config.start_marker,
            end: &self.config.end_marker,
        };
        templates.patch(&rom_prefix, markers, &self.header_block(request, device)?)?;
        log::info!("Replaced ROM header in {}", rom_prefix.display());

        let invocation = self.invocation(request, device);
        log::info!(
            "Executing build: {} {}",
            self.tool.program().display(),
            invocation.args().join(" ")
        );
        let status = self.tool.build(&invocation).map_err(|e| {
            log::error!("could not run {}: {e}", self.tool.program().display());
            BuildError::BuildFailed {
                device: device.id.clone(),
                code: EXIT_SPAWN_FAILED,
            }
        })?;
        if !status.success() {
            if templates.is_interrupted() || tool::interrupted(status) {
                log::warn!("Build of {} interrupted", device.id);
                return Err(BuildError::InterruptedByUser);
            }
            log::error!("Build failed!");
            return Err(BuildError::BuildFailed {
                device: device.id.clone(),
                code: tool::exit_code(status),
            });
        }

        let name = artifact_name(self.config, request.version.as_str(), request.release, device);
        let artifact = output_dir.join(&name);
        let built = self.root.join(&invocation.target);
        copy_artifact(&built, &artifact);
        for suffix in COMPANION_SUFFIXES {
            copy_artifact(&with_suffix(&built, suffix), &with_suffix(&artifact, suffix));
        }

        let elapsed = Local::now() - started;
        log::info!("Built {name} in {}s", elapsed.num_seconds());
        Ok(artifact)
    }

    fn clean(&self) {
        match self.tool.clean() {
            Ok(status) if status.success() => {}
            Ok(status) => log::warn!("make clean exited with {}", tool::exit_code(status)),
            Err(e) => log::warn!("make clean could not run: {e}"),
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Companion files are optional, so a failed copy is only logged.
fn copy_artifact(from: &Path, to: &Path) {
    if let Err(e) = fs::copy(from, to) {
        log::warn!("failed to copy {} -> {}: {e}", from.display(), to.display());
    }
}

/// Whole run: guard the templates, stamp the version, build, merge.
///
/// `on_guard` sees the template backup as soon as it exists, so the caller
/// can hook it up to an interrupt handler.
pub fn run(
    config: &BuildConfig,
    root: &Path,
    tool: BuildTool,
    request: &BuildRequest,
    merge: &MergeOptions,
    on_guard: impl FnOnce(Arc<TemplateBackup>),
) -> Result<RunSummary, BuildError> {
    let started = Local::now();
    log::info!(
        "FlexBoot {} build started {} ({} device(s), {} mode, -j {})",
        request.version,
        started.format("%Y-%m-%d %H:%M:%S"),
        request.devices.len(),
        if request.release { "release" } else { "debug" },
        request.jobs
    );

    let general_header = root.join(&config.general_header);
    let rom_prefix = root.join(&config.rom_prefix);
    let guard = LifecycleGuard::acquire(
        vec![general_header.clone(), rom_prefix.clone()],
        vec![patch::staging_path(&general_header), patch::staging_path(&rom_prefix)],
    )?;
    on_guard(guard.backup());

    guard
        .backup()
        .stamp(&general_header, &config.version_placeholder, request.version.as_str())?;

    let pipeline = DeviceBuildPipeline::new(config, root, tool);
    let output_dir = pipeline.prepare_output_dir(request)?;
    let artifacts = pipeline.build_all(request, &guard.backup(), &output_dir)?;

    let merge_report = if merge.skip {
        None
    } else {
        let dest = merge.dest.clone().unwrap_or_else(|| output_dir.join("clp"));
        let report = ArtifactMerger::new(config, root).merge_dir(&output_dir, &dest);
        log::info!(
            "Merged {} ROM(s), {} failure(s)",
            report.merged.len(),
            report.failures.len()
        );
        Some(report)
    };

    guard.release()?;

    let elapsed = Local::now() - started;
    log::info!("Done in {}s.", elapsed.num_seconds());
    Ok(RunSummary {
        output_dir,
        artifacts,
        merge: merge_report,
    })
}
