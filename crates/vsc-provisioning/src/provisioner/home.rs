//! Baseline content of a new home directory.

use std::path::Path;
use tracing::debug;
use vsc_core::Account;
use vsc_storage::StorageBackend;

use crate::error::ProvisionResult;

/// Mode of `~/.ssh`.
pub const SSH_DIR_MODE: u32 = 0o700;

/// Mode of the files written into a home directory.
pub const HOME_FILE_MODE: u32 = 0o644;

const BASHRC: &str = "\
# .bashrc

# Source global definitions
if [ -f /etc/bashrc ]; then
\t. /etc/bashrc
fi
";

const BASH_PROFILE: &str = "\
# .bash_profile

# Get the aliases and functions
if [ -f ~/.bashrc ]; then
\t. ~/.bashrc
fi
";

/// What [`populate_home`] created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateReport {
    /// Entries newly created.
    pub created: usize,
    /// Entries that were already present and left alone.
    pub existing: usize,
}

impl PopulateReport {
    fn count(&mut self, created: bool) {
        if created {
            self.created += 1;
        } else {
            self.existing += 1;
        }
    }
}

/// Add the baseline files to `home`. Existing entries are never touched.
pub async fn populate_home(
    backend: &dyn StorageBackend,
    home: &Path,
    account: &Account,
    pubkeys: &[String],
) -> ProvisionResult<PopulateReport> {
    let (uid, gid) = (account.uid, account.gid);
    let mut report = PopulateReport::default();

    let ssh = home.join(".ssh");
    report.count(
        backend
            .create_owned_directory(&ssh, SSH_DIR_MODE, uid, gid, false)
            .await?,
    );

    let files = [
        (ssh.join("authorized_keys"), authorized_keys(pubkeys)),
        (home.join(".bashrc"), BASHRC.as_bytes().to_vec()),
        (home.join(".bash_profile"), BASH_PROFILE.as_bytes().to_vec()),
    ];
    for (path, contents) in &files {
        report.count(
            backend
                .create_owned_file(path, contents, HOME_FILE_MODE, uid, gid)
                .await?,
        );
    }

    debug!(
        entity_id = %account.vsc_id,
        created = report.created,
        existing = report.existing,
        "Populated home directory"
    );
    Ok(report)
}

fn authorized_keys(pubkeys: &[String]) -> Vec<u8> {
    let mut contents = String::new();
    for key in pubkeys.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
        contents.push_str(key);
        contents.push('\n');
    }
    contents.into_bytes()
}
