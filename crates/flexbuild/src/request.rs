//! Validated user request for one run.

use crate::config::BuildConfig;
use crate::device::{Device, DeviceSelection};
use crate::error::BuildError;
use crate::version::VersionSpec;

/// Raw options as they come off the command line.
#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub device: String,
    pub version: String,
    pub release: bool,
    pub debug: String,
    pub jobs: Option<usize>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            device: "ALL".into(),
            version: "3.4.400".into(),
            release: false,
            debug: String::new(),
            jobs: None,
        }
    }
}

/// Everything a run needs to know, checked before any file is touched.
#[derive(Clone, Debug)]
pub struct BuildRequest {
    pub devices: Vec<Device>,
    pub version: VersionSpec,
    pub release: bool,
    /// `file:level,...` directives handed to the build as `DEBUG=...`.
    pub debug: Option<String>,
    pub jobs: usize,
}

impl BuildRequest {
    pub fn new(options: &BuildOptions, config: &BuildConfig) -> Result<Self, BuildError> {
        if options.release && !options.debug.is_empty() {
            return Err(BuildError::InvalidOptions(
                "can't build release version with debug flags".into(),
            ));
        }

        let devices = DeviceSelection::parse(&options.device).resolve(&config.devices)?;
        let version: VersionSpec = options.version.parse()?;

        let jobs = match options.jobs {
            Some(0) => return Err(BuildError::InvalidOptions("--j_cpus must be at least 1".into())),
            Some(n) => n,
            None => host_cpus(),
        };

        Ok(Self {
            devices,
            version,
            release: options.release,
            debug: (!options.debug.is_empty()).then(|| options.debug.clone()),
            jobs,
        })
    }
}

fn host_cpus() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}
