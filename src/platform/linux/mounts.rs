use std::fs;
use std::path::Path;

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use tracing::{debug, warn};

use crate::core::error::{Error, Result};
use crate::core::model::Stage;

/// Mount point of the process-information filesystem, relative to the new root.
const PROC_DIR: &str = "/proc";

/// Make the entire mount tree private so our changes do not leak to the host.
pub fn make_mount_private() -> Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(Error::Propagation)
}

/// `chroot` into `rootfs`, then move the working directory into it.
///
/// `chroot` leaves the cwd pointing into the old tree, hence the `chdir`.
pub fn switch_root(rootfs: &Path) -> Result<()> {
    nix::unistd::chroot(rootfs).map_err(|source| Error::Setup {
        stage: Stage::RootSwitched,
        source,
    })?;
    debug!(rootfs = %rootfs.display(), "root switched");

    nix::unistd::chdir("/").map_err(|source| Error::Setup {
        stage: Stage::CwdReset,
        source,
    })?;
    Ok(())
}

/// A mounted `/proc` inside the new root.
///
/// Unmounted by [`ProcMount::release`], or on drop if release was never
/// reached, so every exit path after a successful mount attempts cleanup.
#[derive(Debug)]
pub struct ProcMount {
    mounted: bool,
}

impl ProcMount {
    /// Mount proc at `/proc`. Must be called after [`switch_root`] so the
    /// target resolves under the new root.
    pub fn mount() -> Result<Self> {
        let setup_err = |source: nix::Error| Error::Setup {
            stage: Stage::ProcMounted,
            source,
        };

        if !Path::new(PROC_DIR).is_dir() {
            fs::create_dir_all(PROC_DIR).map_err(|e| setup_err(io_errno(&e)))?;
        }

        mount(
            Some("proc"),
            PROC_DIR,
            Some("proc"),
            MsFlags::empty(),
            None::<&str>,
        )
        .map_err(setup_err)?;
        debug!("proc mounted at {PROC_DIR}");

        Ok(Self { mounted: true })
    }

    /// Unmount `/proc`. Failures are reported to the caller; the mount is
    /// not retried on drop.
    pub fn release(mut self) -> Result<()> {
        self.mounted = false;
        umount2(PROC_DIR, MntFlags::empty()).map_err(Error::Cleanup)?;
        debug!("proc unmounted");
        Ok(())
    }
}

impl Drop for ProcMount {
    fn drop(&mut self) {
        if self.mounted {
            if let Err(e) = umount2(PROC_DIR, MntFlags::empty()) {
                warn!(error = %e, "failed to unmount {PROC_DIR}");
            }
        }
    }
}

fn io_errno(e: &std::io::Error) -> nix::Error {
    e.raw_os_error()
        .map(nix::Error::from_raw)
        .unwrap_or(nix::Error::EIO)
}
