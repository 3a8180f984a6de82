//! Build configuration.
//!
//! Every path, marker and table the pipeline uses lives here. The defaults
//! describe a FlexBoot checkout; `--config <file.json>` overrides any subset.

use crate::device::DeviceCatalog;
use crate::error::BuildError;
use crate::merge::MergeRules;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Exit code used when a run fails with an error that has no typed kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnexpectedErrorPolicy {
    /// Log, restore templates, exit 0. Keeps CI green on errors that do not
    /// affect the produced images.
    #[default]
    ExitZero,
    /// Log, restore templates, exit 1.
    ExitFailure,
}

impl UnexpectedErrorPolicy {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::ExitZero => 0,
            Self::ExitFailure => crate::error::EXIT_FAILURE,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Output name prefix, e.g. `FlexBoot-3.4.160_4099.mrom`.
    pub product: String,
    pub rom_extension: String,
    /// Assembly template holding the `driver_version:` block.
    pub rom_prefix: PathBuf,
    /// C header holding the version placeholder.
    pub general_header: PathBuf,
    pub start_marker: String,
    pub end_marker: String,
    pub version_placeholder: String,
    pub build_tool: String,
    pub merge_tool: PathBuf,
    /// Where the build tool leaves its images.
    pub bin_dir: PathBuf,
    pub base_cflags: Vec<String>,
    pub devices: DeviceCatalog,
    pub merge_rules: MergeRules,
    /// Vendor name to the directory holding its `latest_<device>.bin` blobs.
    pub vendor_dirs: BTreeMap<String, PathBuf>,
    pub unexpected_error_policy: UnexpectedErrorPolicy,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            product: "FlexBoot".into(),
            rom_extension: ".mrom".into(),
            rom_prefix: "arch/i386/prefix/romprefix.S".into(),
            general_header: "config/general.h".into(),
            start_marker: crate::header::LABEL.into(),
            end_marker: "/* ROM version added */".into(),
            version_placeholder: "__BLD_VERSION__".into(),
            build_tool: "make".into(),
            merge_tool: "./util/mergerom.pl".into(),
            bin_dir: "bin".into(),
            base_cflags: ["-Imlx_common/include", "--include", "mlx_debug.h", "--include", "mlx_bullseye.h"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            devices: DeviceCatalog::default(),
            merge_rules: MergeRules::default(),
            vendor_dirs: ["dell", "hp", "huawei"]
                .iter()
                .map(|v| ((*v).to_string(), PathBuf::from("clp").join(v)))
                .collect(),
            unexpected_error_policy: UnexpectedErrorPolicy::default(),
        }
    }
}

impl BuildConfig {
    /// Load overrides from a JSON file on top of the defaults.
    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| BuildError::InvalidOptions(format!("reading config {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| BuildError::InvalidOptions(format!("parsing config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        self.devices.validate()?;
        if self.start_marker.is_empty() || self.end_marker.is_empty() {
            return Err(BuildError::InvalidOptions("template markers must not be empty".into()));
        }
        if self.version_placeholder.is_empty() {
            return Err(BuildError::InvalidOptions("version placeholder must not be empty".into()));
        }
        for vendor in self.merge_rules.vendors() {
            if !self.vendor_dirs.contains_key(vendor) {
                return Err(BuildError::InvalidOptions(format!(
                    "merge rules name vendor '{vendor}' but vendor_dirs has no entry for it"
                )));
            }
        }
        Ok(())
    }

    /// Image the build tool produces for a device target name.
    pub fn built_image(&self, target_name: &str) -> PathBuf {
        self.bin_dir.join(format!("{target_name}{}", self.rom_extension))
    }

    /// Output directory of a run: `build_<version>`.
    pub fn output_dir(&self, version: &str) -> PathBuf {
        PathBuf::from(format!("build_{version}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BuildConfig::default();
        config.validate().unwrap();
        assert_eq!(config.built_image("ConnectX3"), PathBuf::from("bin/ConnectX3.mrom"));
        assert_eq!(config.output_dir("3.4.160"), PathBuf::from("build_3.4.160"));
    }

    #[test]
    fn test_partial_json_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flexbuild.json");
        std::fs::write(
            &path,
            r#"{
                "build_tool": "gmake",
                "devices": [{ "id": "4099", "name": "ConnectX3", "flash_configuration": true }],
                "unexpected_error_policy": "exit-failure"
            }"#,
        )
        .unwrap();

        let config = BuildConfig::load(&path).unwrap();

        assert_eq!(config.build_tool, "gmake");
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.unexpected_error_policy.exit_code(), 1);
        assert_eq!(config.product, "FlexBoot");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flexbuild.json");
        std::fs::write(&path, r#"{ "bulid_tool": "make" }"#).unwrap();
        assert!(matches!(BuildConfig::load(&path), Err(BuildError::InvalidOptions(_))));
    }

    #[test]
    fn test_rule_vendor_needs_directory() {
        let mut config = BuildConfig::default();
        config.vendor_dirs.remove("hp");
        assert!(config.validate().is_err());
    }
}
