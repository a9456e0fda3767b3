//! Running filesystem management commands.
//!
//! GPFS and Lustre are administered through their command line tools. The
//! adapters build argument vectors and hand them to a [`CommandRunner`], which
//! tests replace with a recording fake.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Captured result of one command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit status, `-1` when killed by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run.
    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Executes management commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and capture its output.
    ///
    /// A non-zero exit status is not an error at this level.
    async fn run(&self, program: &str, args: &[String]) -> StorageResult<CommandOutput>;
}

/// Runs commands as child processes.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner {
    bin_dir: Option<PathBuf>,
}

impl SystemCommandRunner {
    /// Resolve programs through `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve programs in a fixed directory, e.g. `/usr/lpp/mmfs/bin`.
    #[must_use]
    pub fn with_bin_dir(bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: Some(bin_dir.into()),
        }
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> StorageResult<CommandOutput> {
        let executable = match &self.bin_dir {
            Some(dir) => dir.join(program),
            None => PathBuf::from(program),
        };
        debug!(program = %executable.display(), args = ?args, "Running command");

        let output = tokio::process::Command::new(&executable)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| StorageError::CommandSpawn {
                program: program.to_string(),
                source,
            })?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run a command and turn a non-zero exit status into [`StorageError::CommandFailed`].
pub async fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[String],
) -> StorageResult<CommandOutput> {
    let output = runner.run(program, args).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(StorageError::CommandFailed {
            program: program.to_string(),
            args: args.join(" "),
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        })
    }
}
