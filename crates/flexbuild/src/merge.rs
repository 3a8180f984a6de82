//! Vendor CLP merging.
//!
//! Each built ROM is combined with the vendor configuration blobs its device
//! family ships with, producing one merged ROM per vendor. A failed merge is
//! reported and skipped; it never stops the others.

use crate::config::BuildConfig;
use crate::error::{BuildError, MergeError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Device id to the vendors whose blobs get merged into its ROMs.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct MergeRules(BTreeMap<String, Vec<String>>);

impl Default for MergeRules {
    fn default() -> Self {
        let table: [(&str, &[&str]); 3] = [
            ("4099", &["dell", "hp", "huawei"]),
            ("4103", &["hp", "huawei"]),
            ("4113", &["hp"]),
        ];
        Self(
            table
                .iter()
                .map(|(dev, vendors)| {
                    (
                        (*dev).to_string(),
                        vendors.iter().map(ToString::to_string).collect(),
                    )
                })
                .collect(),
        )
    }
}

impl MergeRules {
    pub fn new(rules: BTreeMap<String, Vec<String>>) -> Self {
        Self(rules)
    }

    /// Vendors for a device; empty when the device is not in the table.
    pub fn vendors_for(&self, device: &str) -> &[String] {
        self.0.get(device).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every vendor named anywhere in the table.
    pub fn vendors(&self) -> impl Iterator<Item = &str> {
        self.0.values().flatten().map(String::as_str)
    }
}

/// Device id embedded in an artifact name: the last `_` token before the
/// extension (`FlexBoot-3.4.160_DEBUG_4099.mrom` -> `4099`).
pub fn embedded_device_id<'a>(file_name: &'a str, extension: &str) -> Option<&'a str> {
    let stem = file_name.strip_suffix(extension)?;
    let (_, id) = stem.rsplit_once('_')?;
    (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then_some(id)
}

/// Blob a vendor ships for a device.
pub fn vendor_blob(vendor_dir: &Path, device: &str) -> PathBuf {
    vendor_dir.join(format!("latest_{device}.bin"))
}

#[derive(Debug, Default)]
pub struct MergeReport {
    pub merged: Vec<PathBuf>,
    pub failures: Vec<BuildError>,
}

pub struct ArtifactMerger<'a> {
    rules: &'a MergeRules,
    vendor_dirs: &'a BTreeMap<String, PathBuf>,
    tool: PathBuf,
    root: &'a Path,
    extension: &'a str,
}

impl<'a> ArtifactMerger<'a> {
    pub fn new(config: &'a BuildConfig, root: &'a Path) -> Self {
        Self {
            rules: &config.merge_rules,
            vendor_dirs: &config.vendor_dirs,
            tool: root.join(&config.merge_tool),
            root,
            extension: &config.rom_extension,
        }
    }

    /// Merge every ROM directly inside `src` into `dest`.
    ///
    /// Never fails: a destination or listing error is recorded in the
    /// report like any single merge failure.
    pub fn merge_dir(&self, src: &Path, dest: &Path) -> MergeReport {
        let mut report = MergeReport::default();

        if !src.is_dir() {
            log::warn!("{} is not a directory, nothing to merge", src.display());
            return report;
        }
        let artifacts = match fs::create_dir_all(dest)
            .map_err(|e| BuildError::directory_failed(dest, e))
            .and_then(|()| list_files(src))
        {
            Ok(artifacts) => artifacts,
            Err(e) => {
                log::error!("{e}");
                report.failures.push(e);
                return report;
            }
        };

        log::info!("Creating CLP merged ROMs in {}", dest.display());
        for artifact in artifacts {
            let Some(name) = artifact.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(device) = embedded_device_id(name, self.extension) else {
                continue;
            };
            for vendor in self.rules.vendors_for(device) {
                match self.merge_one(&artifact, name, device, vendor, dest) {
                    Ok(out) => report.merged.push(out),
                    Err(e) => {
                        log::error!("{e}");
                        report.failures.push(e);
                    }
                }
            }
        }

        report
    }

    fn merge_one(
        &self,
        artifact: &Path,
        name: &str,
        device: &str,
        vendor: &str,
        dest: &Path,
    ) -> Result<PathBuf, BuildError> {
        let failed = |source: MergeError| BuildError::MergeFailed {
            artifact: artifact.to_path_buf(),
            vendor: vendor.to_string(),
            source,
        };

        let dir = self
            .vendor_dirs
            .get(vendor)
            .ok_or_else(|| failed(MergeError::NoVendorDir))?;
        let blob = vendor_blob(&self.root.join(dir), device);

        // `latest_*` is a symlink; the merged name carries the real blob's name.
        let resolved = fs::canonicalize(&blob).map_err(|source| {
            failed(MergeError::Blob {
                path: blob.clone(),
                source,
            })
        })?;
        let blob_stem = resolved
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| failed(MergeError::BlobName(resolved.clone())))?;

        let artifact_stem = name.strip_suffix(self.extension).unwrap_or(name);
        let output = dest.join(format!("{artifact_stem}_{blob_stem}{}", self.extension));

        log::info!(
            "{} {} {} > {}",
            self.tool.display(),
            artifact.display(),
            blob.display(),
            output.display()
        );
        if let Err(e) = crate::tool::run_merge(&self.tool, self.root, artifact, &blob, &output) {
            let _ = fs::remove_file(&output);
            return Err(failed(e));
        }
        Ok(output)
    }
}

/// Regular files directly inside `dir`, sorted.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let entries = fs::read_dir(dir).map_err(|e| BuildError::directory_failed(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}
