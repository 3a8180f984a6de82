//! External tools: the build system and the ROM merge script.
//!
//! Everything is spawned with an explicit argument list from the workspace
//! root; nothing goes through a shell.

use crate::error::MergeError;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

/// One `make` invocation for a device image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildInvocation {
    pub jobs: usize,
    /// Make target, e.g. `bin/ConnectX3.mrom`.
    pub target: PathBuf,
    pub cflags: Vec<String>,
    pub debug: Option<String>,
}

impl BuildInvocation {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-j".to_string(),
            self.jobs.to_string(),
            self.target.display().to_string(),
            format!("EXTRA_CFLAGS={}", self.cflags.join(" ")),
        ];
        if let Some(debug) = &self.debug {
            args.push(format!("DEBUG={debug}"));
        }
        args
    }
}

/// The build system, run from the workspace root.
#[derive(Clone, Debug)]
pub struct BuildTool {
    program: PathBuf,
    root: PathBuf,
}

impl BuildTool {
    pub fn new(program: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            root: root.into(),
        }
    }

    /// Locate the program the way the shell would, relative to the root.
    pub fn resolve(program: &str, root: &Path) -> Result<Self, which::Error> {
        let program = which::which_in(program, std::env::var_os("PATH"), root)?;
        Ok(Self::new(program, root))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// `make clean`.
    pub fn clean(&self) -> std::io::Result<ExitStatus> {
        self.command().arg("clean").status()
    }

    pub fn build(&self, invocation: &BuildInvocation) -> std::io::Result<ExitStatus> {
        self.command().args(invocation.args()).status()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.current_dir(&self.root);
        cmd
    }
}

/// `<merge_tool> <artifact> <blob> > <output>`.
pub fn run_merge(
    tool: &Path,
    root: &Path,
    artifact: &Path,
    blob: &Path,
    output: &Path,
) -> Result<(), MergeError> {
    let out = File::create(output).map_err(|source| MergeError::Output {
        path: output.to_path_buf(),
        source,
    })?;

    let status = Command::new(tool)
        .current_dir(root)
        .arg(artifact)
        .arg(blob)
        .stdout(Stdio::from(out))
        .status()
        .map_err(|source| MergeError::Spawn {
            tool: tool.to_path_buf(),
            source,
        })?;

    if !status.success() {
        return Err(MergeError::ToolExit {
            tool: tool.to_path_buf(),
            code: exit_code(status),
        });
    }
    Ok(())
}

/// Exit code of a finished process; death by signal maps to 128 + signal.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    crate::error::EXIT_FAILURE
}

/// True when the process died of SIGINT, or exited with the shell's 130 for it.
pub fn interrupted(status: ExitStatus) -> bool {
    const SIGINT: i32 = 2;
    exit_code(status) == 128 + SIGINT
}
