//! Pushing generated AUR packages to their upstream git repositories.
//!
//! Each package gets a fresh clone of its AUR repository in a
//! temporary directory; the rendered `PKGBUILD` and `.SRCINFO` are
//! copied in, committed and pushed. A clone whose files come out
//! identical is a no-op, not an error. Authentication goes through an
//! SSH key file handed to git via `GIT_SSH_COMMAND`; the key itself is
//! never read or logged.

use std::path::{Path, PathBuf};
use std::process::Output;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// AUR push failures. One package failing never stops the others.
#[derive(Error, Debug)]
pub enum PushError {
    /// Spawning git or staging files failed.
    #[error("push I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// A git invocation exited non-zero.
    #[error("git {op} failed for '{package}': {stderr}")]
    Git {
        /// The git subcommand that failed.
        op: &'static str,
        /// Package being pushed.
        package: String,
        /// Captured stderr, trimmed.
        stderr: String,
    },
}

/// Pushes rendered package directories to AUR git remotes.
#[derive(Debug, Clone)]
pub struct AurPusher {
    remote_base: String,
    ssh_key: Option<PathBuf>,
}

impl AurPusher {
    /// Remote prefix for the real AUR.
    pub const AUR_REMOTE: &'static str = "ssh://aur@aur.archlinux.org";

    /// Create a pusher for the given remote prefix
    /// (`{remote_base}/{package}.git`).
    pub fn new(remote_base: impl Into<String>, ssh_key: Option<PathBuf>) -> Self {
        Self {
            remote_base: remote_base.into(),
            ssh_key,
        }
    }

    /// Clone, update, commit and push one package.
    ///
    /// `source` is the rendered package directory holding `PKGBUILD`
    /// and `.SRCINFO`. Returns `Ok(false)` when the remote already
    /// matches and nothing was pushed.
    ///
    /// # Errors
    ///
    /// Fails if any git step other than an empty commit fails.
    pub async fn push(
        &self,
        source: &Path,
        package: &str,
        version: &str,
    ) -> Result<bool, PushError> {
        let workdir = tempfile::tempdir()?;
        let checkout = workdir.path().join(package);
        let remote = format!("{}/{package}.git", self.remote_base);

        // Full clone: AUR repos are tiny and shallow pushes have edge
        // cases on some servers.
        self.git("clone", workdir.path(), &["clone", &remote, package], package)
            .await?;

        for name in ["PKGBUILD", ".SRCINFO"] {
            tokio::fs::copy(source.join(name), checkout.join(name)).await?;
        }

        let status = self
            .git("status", &checkout, &["status", "--porcelain"], package)
            .await?;
        if status.stdout.is_empty() {
            debug!(package, "AUR repository already up to date");
            return Ok(false);
        }

        self.git("add", &checkout, &["add", "PKGBUILD", ".SRCINFO"], package)
            .await?;
        let message = format!("Update {package} to version {version}");
        self.git(
            "commit",
            &checkout,
            &[
                "-c",
                "user.name=syndic",
                "-c",
                "user.email=syndic@localhost",
                "commit",
                "-m",
                &message,
            ],
            package,
        )
        .await?;
        self.git("push", &checkout, &["push", "origin", "HEAD:master"], package)
            .await?;

        info!(package, version, "pushed AUR update");
        Ok(true)
    }

    async fn git(
        &self,
        op: &'static str,
        cwd: &Path,
        args: &[&str],
        package: &str,
    ) -> Result<Output, PushError> {
        let mut command = Command::new("git");
        command.args(args).current_dir(cwd);
        if let Some(key) = &self.ssh_key {
            command.env(
                "GIT_SSH_COMMAND",
                format!(
                    "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
                    key.display()
                ),
            );
        }
        let output = command.output().await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(PushError::Git {
                op,
                package: package.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
