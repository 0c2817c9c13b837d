use std::fmt;
use std::path::PathBuf;

use nix::sched::CloneFlags;

/// Hostname every isolated context gets inside its UTS namespace.
pub const HOSTNAME: &str = "container";

/// The set of namespaces requested when the launcher clones the entry process.
///
/// UTS, PID and mount isolation are always on. User, network and IPC
/// isolation are opt-in and chosen once per invocation on the command line.
///
/// Enabling `user` without an id mapping leaves the entry running as the
/// overflow uid once it re-executes, which strips the capabilities needed
/// for `chroot` and `mount`. It is only useful on hosts where the caller
/// arranges a mapping some other way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamespaceSet {
    pub user: bool,
    pub network: bool,
    pub ipc: bool,
}

impl NamespaceSet {
    /// Flags passed to `clone(2)`.
    pub fn clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::CLONE_NEWUTS | CloneFlags::CLONE_NEWPID | CloneFlags::CLONE_NEWNS;
        if self.user {
            flags |= CloneFlags::CLONE_NEWUSER;
        }
        if self.network {
            flags |= CloneFlags::CLONE_NEWNET;
        }
        if self.ipc {
            flags |= CloneFlags::CLONE_NEWIPC;
        }
        flags
    }

    /// Short names of the enabled namespaces, in `/proc/<pid>/ns` spelling.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = vec!["uts", "pid", "mnt"];
        if self.user {
            names.push("user");
        }
        if self.network {
            names.push("net");
        }
        if self.ipc {
            names.push("ipc");
        }
        names
    }
}

/// Configuration shared by the launcher and the isolated entry.
///
/// The launcher validates it and hands it to the entry through the entry's
/// argument vector, so both processes see the same values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationConfig {
    /// Absolute path of the tree that becomes `/`.
    pub rootfs: PathBuf,
    pub namespaces: NamespaceSet,
}

/// Progress of the isolated entry. Steps only move forward; a failure jumps
/// straight to `Exit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    HostnameSet,
    RootSwitched,
    CwdReset,
    ProcMounted,
    CommandRunning,
    ProcUnmounted,
    Exit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::HostnameSet => write!(f, "set hostname"),
            Self::RootSwitched => write!(f, "switch root"),
            Self::CwdReset => write!(f, "reset working directory"),
            Self::ProcMounted => write!(f, "mount /proc"),
            Self::CommandRunning => write!(f, "run command"),
            Self::ProcUnmounted => write!(f, "unmount /proc"),
            Self::Exit => write!(f, "exit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_is_uts_pid_mount() {
        let flags = NamespaceSet::default().clone_flags();
        assert!(flags.contains(CloneFlags::CLONE_NEWUTS));
        assert!(flags.contains(CloneFlags::CLONE_NEWPID));
        assert!(flags.contains(CloneFlags::CLONE_NEWNS));
        assert!(!flags.intersects(
            CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNET | CloneFlags::CLONE_NEWIPC
        ));
    }

    #[test]
    fn optional_namespaces_are_added() {
        let set = NamespaceSet {
            user: true,
            network: false,
            ipc: true,
        };
        let flags = set.clone_flags();
        assert!(flags.contains(CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWIPC));
        assert!(!flags.contains(CloneFlags::CLONE_NEWNET));
        assert_eq!(set.names(), vec!["uts", "pid", "mnt", "user", "ipc"]);
    }

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Start < Stage::HostnameSet);
        assert!(Stage::RootSwitched < Stage::ProcMounted);
        assert!(Stage::ProcUnmounted < Stage::Exit);
        assert_eq!(Stage::ProcMounted.to_string(), "mount /proc");
    }
}
