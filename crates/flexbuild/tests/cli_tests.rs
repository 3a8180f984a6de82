//! The `flexbuild` binary: option checks and exit codes.

mod common;

use common::TestEnv;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn flexbuild(env: &TestEnv, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_flexbuild"))
        .arg("-C")
        .arg(env.root())
        .args(args)
        .env("RUST_LOG", "info")
        .output()
        .unwrap()
}

/// Config pointing the binary at the fake make inside the scratch tree.
fn write_config(env: &TestEnv) -> String {
    write_config_with_tool(env, "tools/make")
}

fn write_config_with_tool(env: &TestEnv, tool: &str) -> String {
    let path = env.path("flexbuild.json");
    let config = serde_json::json!({
        "build_tool": env.path(tool),
        "merge_tool": "util/mergerom.pl",
    });
    std::fs::write(&path, config.to_string()).unwrap();
    path.display().to_string()
}

#[test]
fn test_release_with_debug_flags_is_rejected() {
    let env = TestEnv::new();

    let out = flexbuild(&env, &["--release", "--debug", "x:1"]);

    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("can't build release version with debug flags"));
    assert!(!env.exists("config/general.h_"));
    assert!(!env.exists("build_3.4.400"));
    env.assert_templates_restored();
}

#[test]
fn test_unknown_device_lists_devices() {
    let env = TestEnv::new();

    let out = flexbuild(&env, &["--device", "9999"]);

    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("ID: 4099 - Device: ConnectX3"));
    assert!(stdout.contains("ID: 4113 - Device: ConnectIB"));
    env.assert_templates_restored();
}

#[test]
fn test_malformed_version_is_rejected() {
    let env = TestEnv::new();

    let out = flexbuild(&env, &["-v", "3.4"]);

    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stdout).contains("invalid version format"));
}

#[test]
fn test_positional_argument_is_rejected() {
    let env = TestEnv::new();

    let out = flexbuild(&env, &["4099"]);

    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Usage"));
}

#[test]
fn test_help_exits_zero() {
    let env = TestEnv::new();

    let out = flexbuild(&env, &["--help"]);

    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains("--j_cpus"));
}

#[test]
fn test_successful_release_run() {
    let env = TestEnv::new();
    let config = write_config(&env);

    let out = flexbuild(
        &env,
        &["--config", &config, "-d", "4099", "-v", "3.4.160", "--release", "--no-merge"],
    );

    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stdout));
    assert!(env.exists("build_3.4.160/FlexBoot-3.4.160_4099.mrom"));
    assert!(String::from_utf8_lossy(&out.stdout).contains("Done."));
    env.assert_templates_restored();
}

#[test]
fn test_build_failure_propagates_exit_code() {
    let env = TestEnv::new();
    let config = write_config(&env);
    env.fail_target("ConnectX3");

    let out = flexbuild(&env, &["--config", &config, "-d", "4099", "-v", "3.4.160"]);

    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stdout).contains("build failed for device 4099"));
    env.assert_templates_restored();
}

#[test]
fn test_missing_build_tool_is_rejected_before_mutation() {
    let env = TestEnv::new();
    let path = env.path("flexbuild.json");
    std::fs::write(&path, r#"{ "build_tool": "no-such-make-anywhere" }"#).unwrap();

    let out = flexbuild(&env, &["--config", path.to_str().unwrap()]);

    assert_eq!(out.status.code(), Some(1));
    assert!(!env.exists("build_3.4.400"));
    env.assert_templates_restored();
}

#[test]
fn test_interrupt_restores_templates() {
    let env = TestEnv::new();
    let config = write_config_with_tool(&env, "tools/slow-make");

    let mut child = Command::new(env!("CARGO_BIN_EXE_flexbuild"))
        .arg("-C")
        .arg(env.root())
        .args(["--config", &config, "-d", "4099", "-v", "3.4.160", "--release"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    // Wait until the build itself (the call after `clean`) is running.
    let deadline = Instant::now() + Duration::from_secs(20);
    while env.make_calls().len() < 2 {
        assert!(Instant::now() < deadline, "build never started");
        thread::sleep(Duration::from_millis(50));
    }
    assert_ne!(env.read("arch/i386/prefix/romprefix.S"), common::ROMPREFIX_S);

    let killed = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(killed.success());
    let status = child.wait().unwrap();

    assert_eq!(status.code(), Some(1));
    env.assert_templates_restored();
    assert!(!env.exists("arch/i386/prefix/romprefix.S.new"));
}
