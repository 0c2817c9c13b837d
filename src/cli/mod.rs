pub mod commands;

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::core::model::{IsolationConfig, NamespaceSet};

/// nsbox — run a command in new UTS, PID and mount namespaces under an alternate root.
#[derive(Parser, Debug)]
#[command(name = "nsbox", version, about)]
pub struct Cli {
    /// Log more (-v info, -vv debug). `NSBOX_LOG` overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command inside a new isolated context.
    Run {
        #[command(flatten)]
        isolation: IsolationArgs,

        /// The command (and arguments) to execute inside the new root.
        #[arg(
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true,
            value_parser = clap::value_parser!(OsString)
        )]
        cmd: Vec<OsString>,
    },

    /// Internal: the isolated entry point `run` re-executes itself as.
    ///
    /// Expects to already be inside the new namespaces. Invoked as
    /// `nsbox child --rootfs <PATH> [ns flags] -- <command> [args...]`.
    #[command(hide = true)]
    Child {
        #[command(flatten)]
        isolation: IsolationArgs,

        #[arg(
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true,
            value_parser = clap::value_parser!(OsString)
        )]
        cmd: Vec<OsString>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct IsolationArgs {
    /// Directory that becomes `/` inside the isolated context.
    #[arg(long, env = "NSBOX_ROOTFS", value_name = "PATH")]
    pub rootfs: PathBuf,

    /// Also create a user namespace. Without an id mapping the entry loses
    /// the privileges needed for chroot and mount.
    #[arg(long)]
    pub user_ns: bool,

    /// Also create an (empty) network namespace.
    #[arg(long)]
    pub net_ns: bool,

    /// Also create an IPC namespace.
    #[arg(long)]
    pub ipc_ns: bool,
}

impl From<IsolationArgs> for IsolationConfig {
    fn from(args: IsolationArgs) -> Self {
        Self {
            rootfs: args.rootfs,
            namespaces: NamespaceSet {
                user: args.user_ns,
                network: args.net_ns,
                ipc: args.ipc_ns,
            },
        }
    }
}

/// Argument vector for the isolated entry, program name included.
///
/// The config is passed explicitly so the entry never relies on the
/// environment it inherits. Paths and arguments are forwarded as raw
/// bytes, so the entry sees exactly what the launcher validated.
pub fn child_args(config: &IsolationConfig, cmd: &[OsString], verbose: u8) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["nsbox".into()];
    if verbose > 0 {
        args.push(format!("-{}", "v".repeat(verbose.into())).into());
    }
    args.push("child".into());
    args.push("--rootfs".into());
    args.push(config.rootfs.as_os_str().to_owned());
    if config.namespaces.user {
        args.push("--user-ns".into());
    }
    if config.namespaces.network {
        args.push("--net-ns".into());
    }
    if config.namespaces.ipc {
        args.push("--ipc-ns".into());
    }
    args.push("--".into());
    args.extend(cmd.iter().cloned());
    args
}

/// Parse CLI arguments. Called from `main`.
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    fn parse_from<I: IntoIterator<Item = OsString>>(args: I) -> Cli {
        Cli::try_parse_from(args).expect("valid arguments")
    }

    fn child_of(cli: Cli) -> (IsolationArgs, Vec<OsString>) {
        match cli.command {
            Command::Child { isolation, cmd } => (isolation, cmd),
            other => panic!("expected child, got {other:?}"),
        }
    }

    #[test]
    fn run_collects_command_with_hyphenated_args() {
        let cli = parse_from(os(&["nsbox", "run", "--rootfs", "/srv/root", "ls", "-la", "/"]));
        match cli.command {
            Command::Run { isolation, cmd } => {
                assert_eq!(isolation.rootfs, PathBuf::from("/srv/root"));
                assert_eq!(cmd, os(&["ls", "-la", "/"]));
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn run_accepts_non_utf8_arguments() {
        let arg = OsStr::from_bytes(b"f\xffile").to_owned();
        let mut argv = os(&["nsbox", "run", "--rootfs", "/srv/root", "/bin/cat"]);
        argv.push(arg.clone());

        match parse_from(argv).command {
            Command::Run { cmd, .. } => assert_eq!(cmd, vec![OsString::from("/bin/cat"), arg]),
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn run_requires_a_command() {
        assert!(Cli::try_parse_from(["nsbox", "run", "--rootfs", "/srv/root"]).is_err());
    }

    #[test]
    fn unknown_verb_is_rejected() {
        assert!(Cli::try_parse_from(["nsbox", "foo", "/bin/true"]).is_err());
        assert!(Cli::try_parse_from(["nsbox"]).is_err());
    }

    #[test]
    fn child_args_round_trip() {
        let config = IsolationConfig {
            rootfs: PathBuf::from("/srv/root"),
            namespaces: NamespaceSet {
                user: false,
                network: true,
                ipc: true,
            },
        };
        let cmd = os(&["sh", "-c", "echo --rootfs"]);

        let cli = parse_from(child_args(&config, &cmd, 2));
        assert_eq!(cli.verbose, 2);

        let (isolation, parsed) = child_of(cli);
        assert_eq!(IsolationConfig::from(isolation), config);
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn child_args_keep_non_utf8_bytes() {
        let config = IsolationConfig {
            rootfs: PathBuf::from(OsStr::from_bytes(b"/srv/r\xffoot")),
            namespaces: NamespaceSet::default(),
        };
        let mut cmd = os(&["/bin/cat"]);
        cmd.push(OsStr::from_bytes(b"f\xffile").to_owned());

        let (isolation, parsed) = child_of(parse_from(child_args(&config, &cmd, 0)));
        assert_eq!(isolation.rootfs.as_os_str().as_bytes(), b"/srv/r\xffoot");
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn child_args_keep_command_that_looks_like_a_flag() {
        let config = IsolationConfig {
            rootfs: PathBuf::from("/r"),
            namespaces: NamespaceSet::default(),
        };
        let cmd = os(&["--user-ns"]);
        let (isolation, parsed) = child_of(parse_from(child_args(&config, &cmd, 0)));
        assert!(!isolation.user_ns);
        assert_eq!(parsed, cmd);
    }
}
