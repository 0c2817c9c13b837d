use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::model::Stage;

/// Exit status for any failure of nsbox itself (namespaces, rootfs, setup, wait).
pub const EXIT_INTERNAL: i32 = 125;
/// Exit status when the command exists but cannot be executed.
pub const EXIT_CANNOT_INVOKE: i32 = 126;
/// Exit status when the command cannot be found inside the new root.
pub const EXIT_NOT_FOUND: i32 = 127;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid rootfs {path}: {reason}")]
    InvalidRootfs { path: PathBuf, reason: String },

    #[error("kernel refused namespaces [{namespaces}] (are you root?)")]
    Namespace {
        namespaces: String,
        #[source]
        source: nix::Error,
    },

    #[error("argument contains a NUL byte: {0:?}")]
    NulByte(String),

    #[error("failed to make / private recursively")]
    Propagation(#[source] nix::Error),

    #[error("re-executing /proc/self/exe failed")]
    Exec(#[source] nix::Error),

    #[error("failed to {stage}")]
    Setup {
        stage: Stage,
        #[source]
        source: nix::Error,
    },

    #[error("failed to launch '{program}'")]
    CommandLaunch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for {what}")]
    Wait {
        what: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("failed to unmount /proc")]
    Cleanup(#[source] nix::Error),
}

impl Error {
    /// Process exit status this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CommandLaunch { source, .. } => match source.kind() {
                io::ErrorKind::NotFound => EXIT_NOT_FOUND,
                io::ErrorKind::PermissionDenied => EXIT_CANNOT_INVOKE,
                _ => EXIT_INTERNAL,
            },
            _ => EXIT_INTERNAL,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn launch_error(kind: io::ErrorKind) -> Error {
        Error::CommandLaunch {
            program: "/bin/missing".into(),
            source: io::Error::from(kind),
        }
    }

    #[test]
    fn command_launch_codes_follow_shell_convention() {
        assert_eq!(launch_error(io::ErrorKind::NotFound).exit_code(), 127);
        assert_eq!(launch_error(io::ErrorKind::PermissionDenied).exit_code(), 126);
        assert_eq!(launch_error(io::ErrorKind::Other).exit_code(), 125);
    }

    #[test]
    fn setup_errors_are_internal() {
        let err = Error::Setup {
            stage: Stage::RootSwitched,
            source: nix::Error::ENOENT,
        };
        assert_eq!(err.exit_code(), EXIT_INTERNAL);
        assert_eq!(err.to_string(), "failed to switch root");
    }

    #[test]
    fn namespace_error_names_the_set() {
        let err = Error::Namespace {
            namespaces: "uts,pid,mnt".into(),
            source: nix::Error::EPERM,
        };
        assert!(err.to_string().contains("uts,pid,mnt"));
        assert_eq!(err.exit_code(), EXIT_INTERNAL);
    }
}
