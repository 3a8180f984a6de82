//! Template patching: marker-region replacement and version stamping.
//!
//! Every write goes to `<file>.new` first and is renamed over the target, so
//! a crash never leaves a half-written template behind.

use crate::error::BuildError;
use std::fs;
use std::path::{Path, PathBuf};

/// Markers delimiting the region replaced in a template.
#[derive(Clone, Copy, Debug)]
pub struct Markers<'a> {
    pub start: &'a str,
    pub end: &'a str,
}

/// Result of patching text in memory.
#[derive(Debug, PartialEq, Eq)]
pub struct Patched {
    pub text: String,
    pub found_start: bool,
    /// False when the start marker was seen but the end marker never was;
    /// everything after the start marker was dropped.
    pub found_end: bool,
}

/// Replace the region from the start-marker line through the end-marker line
/// with `block`. Lines outside the region are copied verbatim.
///
/// The template's end-marker line is consumed with the region, so `block`
/// should carry its own end marker if the output is to be patched again.
pub fn patch_text(input: &str, markers: Markers<'_>, block: &str) -> Patched {
    let mut text = String::with_capacity(input.len() + block.len());
    let mut found_start = false;
    let mut skipping = false;

    for line in input.split_inclusive('\n') {
        if skipping {
            if line.contains(markers.end) {
                skipping = false;
            }
            continue;
        }
        if line.contains(markers.start) {
            found_start = true;
            skipping = true;
            text.push_str(block);
            continue;
        }
        text.push_str(line);
    }

    Patched {
        text,
        found_start,
        found_end: found_start && !skipping,
    }
}

/// Sibling path the patched content is staged in before the rename.
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".new");
    PathBuf::from(name)
}

pub fn read_template(path: &Path) -> Result<String, BuildError> {
    fs::read_to_string(path).map_err(|e| BuildError::read_failed(path, e))
}

/// Write `contents` to `path` through a staging file and a rename.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), BuildError> {
    let staging = staging_path(path);
    fs::write(&staging, contents).map_err(|e| BuildError::write_failed(&staging, e))?;
    fs::rename(&staging, path).map_err(|e| {
        let _ = fs::remove_file(&staging);
        BuildError::write_failed(path, e)
    })
}

/// Patch the template at `path` in place.
pub fn patch_file(path: &Path, markers: Markers<'_>, block: &str) -> Result<Patched, BuildError> {
    let input = read_template(path)?;
    let patched = patch_text(&input, markers, block);

    if !patched.found_start {
        log::warn!(
            "{}: start marker '{}' not found, template left unchanged",
            path.display(),
            markers.start
        );
    } else if !patched.found_end {
        log::warn!(
            "{}: end marker '{}' not found, everything after '{}' was dropped",
            path.display(),
            markers.end,
            markers.start
        );
    }

    write_atomic(path, &patched.text)?;
    Ok(patched)
}

/// Replace every `placeholder` in the file with `__BUILD_VERSION__ "<version>"`.
/// Returns the number of replacements.
pub fn stamp_version(path: &Path, placeholder: &str, version: &str) -> Result<usize, BuildError> {
    let input = read_template(path)?;
    let count = input.matches(placeholder).count();
    if count == 0 {
        log::warn!("{}: no '{placeholder}' to stamp", path.display());
        return Ok(0);
    }

    let stamped = input.replace(placeholder, &format!("__BUILD_VERSION__ \"{version}\""));
    write_atomic(path, &stamped)?;
    Ok(count)
}
