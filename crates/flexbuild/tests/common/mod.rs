//! Scratch FlexBoot checkout for integration tests.
//!
//! `make` and `mergerom.pl` are replaced by small shell scripts: the fake
//! make logs its arguments, copies the patched `romprefix.S` into the image
//! it was asked for, and fails for any target that has a `fail_<target>`
//! marker in the root.

#![allow(dead_code, clippy::unwrap_used)]

use flexbuild::tool::BuildTool;
use flexbuild::BuildConfig;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

pub const GENERAL_H: &str = "#ifndef CONFIG_GENERAL_H\n#define VERSION __BLD_VERSION__\n#endif\n";

pub const ROMPREFIX_S: &str = "\
 .text
romheader:
 .word 0xAA55
driver_version:
 .align 16
 .long 0
 .long 0
/* ROM version added */
prodstr:
 .ascii \"FlexBoot\"
";

const FAKE_MAKE: &str = r#"#!/bin/sh
for a in "$@"; do printf '%s\n' "$a"; done >> make.log
echo --- >> make.log
[ "$1" = "clean" ] && exit 0
target="$3"
[ -e "fail_$(basename "$target")" ] && exit 2
mkdir -p "$(dirname "$target")"
cp arch/i386/prefix/romprefix.S "$target"
echo tmp > "$target.tmp"
echo map > "$target.tmp.map"
"#;

/// Logs like the fake make, then blocks in the build until killed.
const FAKE_SLOW_MAKE: &str = r#"#!/bin/sh
for a in "$@"; do printf '%s\n' "$a"; done >> make.log
echo --- >> make.log
[ "$1" = "clean" ] && exit 0
exec sleep 30
"#;

const FAKE_MERGEROM: &str = "#!/bin/sh\ncat \"$1\" \"$2\"\n";

pub struct TestEnv {
    pub dir: tempfile::TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let env = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        env.write("config/general.h", GENERAL_H);
        env.write("arch/i386/prefix/romprefix.S", ROMPREFIX_S);
        env.script("tools/make", FAKE_MAKE);
        env.script("tools/slow-make", FAKE_SLOW_MAKE);
        env.script("util/mergerom.pl", FAKE_MERGEROM);
        env
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap()
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }

    fn script(&self, rel: &str, body: &str) {
        self.write(rel, body);
        fs::set_permissions(self.path(rel), fs::Permissions::from_mode(0o755)).unwrap();
    }

    pub fn build_tool(&self) -> BuildTool {
        BuildTool::new(self.path("tools/make"), self.root())
    }

    pub fn config(&self) -> BuildConfig {
        BuildConfig {
            merge_tool: PathBuf::from("util/mergerom.pl"),
            ..BuildConfig::default()
        }
    }

    /// Make the build of `bin/<target>.mrom` exit 2.
    pub fn fail_target(&self, target: &str) {
        self.write(&format!("fail_{target}.mrom"), "");
    }

    /// Install `clp/<vendor>/<blob>` and point `latest_<device>.bin` at it.
    pub fn vendor_blob(&self, vendor: &str, device: &str, blob: &str) {
        self.write(&format!("clp/{vendor}/{blob}"), &format!("{vendor}-clp\n"));
        std::os::unix::fs::symlink(blob, self.path(&format!("clp/{vendor}/latest_{device}.bin")))
            .unwrap();
    }

    /// Arguments of every make invocation, in order.
    pub fn make_calls(&self) -> Vec<Vec<String>> {
        if !self.exists("make.log") {
            return Vec::new();
        }
        self.read("make.log")
            .split("---\n")
            .filter(|call| !call.is_empty())
            .map(|call| call.lines().map(ToString::to_string).collect())
            .collect()
    }

    /// Templates are back to their original content and no backup or
    /// staging file is left behind.
    pub fn assert_templates_restored(&self) {
        assert_eq!(self.read("config/general.h"), GENERAL_H);
        assert_eq!(self.read("arch/i386/prefix/romprefix.S"), ROMPREFIX_S);
        for leftover in [
            "config/general.h_",
            "config/general.h.new",
            "arch/i386/prefix/romprefix.S_",
            "arch/i386/prefix/romprefix.S.new",
        ] {
            assert!(!self.exists(leftover), "{leftover} left behind");
        }
    }
}
