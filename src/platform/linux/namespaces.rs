use nix::sched::CloneFlags;
use tracing::debug;

use crate::core::error::{Error, Result};
use crate::core::model::Stage;
use crate::platform::linux::mounts;

/// Detach the calling process from any mount namespace it may still share
/// and stop mount events propagating back to the host.
///
/// Runs in the freshly cloned child, before it re-executes. A clone-time
/// `CLONE_NEWNS` alone leaves propagation as inherited from the host (often
/// `shared` under systemd), so `/` is remounted recursively private.
pub fn unshare_mount_namespace() -> Result<()> {
    nix::sched::unshare(CloneFlags::CLONE_NEWNS).map_err(|source| Error::Namespace {
        namespaces: "mnt".to_string(),
        source,
    })?;
    mounts::make_mount_private()
}

/// Set the hostname inside the current UTS namespace.
pub fn set_hostname(name: &str) -> Result<()> {
    nix::unistd::sethostname(name).map_err(|source| Error::Setup {
        stage: Stage::HostnameSet,
        source,
    })?;
    debug!(hostname = name, "hostname set");
    Ok(())
}
