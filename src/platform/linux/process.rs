use std::convert::Infallible;
use std::ffi::{CStr, CString, OsStr, OsString};
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::core::error::{Error, Result, EXIT_INTERNAL};
use crate::core::model::{IsolationConfig, Stage, HOSTNAME};
use crate::platform::linux::mounts::{self, ProcMount};
use crate::platform::linux::namespaces;

/// The running binary, independent of cwd and argv[0].
const SELF_EXE: &str = "/proc/self/exe";
/// Stack for the cloned child. It only unshares, remounts and execs.
const STACK_SIZE: usize = 1024 * 1024;

// ─── launcher ───────────────────────────────────────────────────────────────

/// Clone into fresh namespaces, re-execute this binary with `entry_argv`
/// there, and wait for it.
///
/// Returns the entry's exit code (or 128+signal if it was killed).
pub fn launch(config: &IsolationConfig, entry_argv: &[OsString]) -> Result<i32> {
    let flags = config.namespaces.clone_flags();
    let namespaces = config.namespaces.names().join(",");

    // Everything the child touches is allocated up front.
    let exe = to_cstring(OsStr::new(SELF_EXE))?;
    let argv = entry_argv
        .iter()
        .map(|a| to_cstring(a))
        .collect::<Result<Vec<_>>>()?;
    let mut stack = vec![0u8; STACK_SIZE];

    let callback = Box::new(|| match reexec(&exe, &argv) {
        Ok(never) => match never {},
        Err(e) => {
            let code = e.exit_code();
            eprintln!("nsbox: {:#}", anyhow::Error::new(e));
            code as isize
        }
    });

    // SAFETY: nsbox is single-threaded at this point, and the child only
    // calls unshare/mount/execv on memory prepared above.
    let child = unsafe { nix::sched::clone(callback, &mut stack, flags, Some(libc::SIGCHLD)) }
        .map_err(|source| Error::Namespace {
            namespaces: namespaces.clone(),
            source,
        })?;
    info!(pid = %child, %namespaces, "isolated entry started");

    let code = wait_for_child(child, "isolated entry")?;
    debug!(pid = %child, code, "isolated entry exited");
    Ok(code)
}

/// Runs inside the cloned child.
fn reexec(exe: &CStr, argv: &[CString]) -> Result<Infallible> {
    namespaces::unshare_mount_namespace()?;
    nix::unistd::execv(exe, argv).map_err(Error::Exec)
}

/// Wait for a child process and return its exit code.
fn wait_for_child(pid: Pid, what: &'static str) -> Result<i32> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(code),
            Ok(WaitStatus::Signaled(_, sig, _)) => return Ok(128 + sig as i32),
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(source) => return Err(Error::Wait { what, source }),
        }
    }
}

/// Check the rootfs before anything is cloned and return its canonical path.
///
/// Besides existence, this deliberately refuses the host's own `/`: chrooting
/// there isolates nothing and the command would see the host tree.
pub fn validate_rootfs(rootfs: &Path) -> Result<PathBuf> {
    let invalid = |reason: &str| Error::InvalidRootfs {
        path: rootfs.to_path_buf(),
        reason: reason.to_string(),
    };

    if rootfs.as_os_str().is_empty() {
        return Err(invalid("path must not be empty"));
    }

    let canon = fs::canonicalize(rootfs).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => invalid("does not exist"),
        _ => invalid(&e.to_string()),
    })?;

    if !canon.is_dir() {
        return Err(invalid("not a directory"));
    }
    if canon == Path::new("/") {
        return Err(invalid("refusing to use the host root"));
    }

    Ok(canon)
}

// ─── isolated entry ─────────────────────────────────────────────────────────

struct Progress(Stage);

impl Progress {
    fn advance(&mut self, next: Stage) {
        debug_assert!(next > self.0, "stage {next} after {}", self.0);
        debug!(stage = %next, "entry stage reached");
        self.0 = next;
    }
}

/// Finish isolating the current process and run `cmd` inside it.
///
/// Must run in the namespaces created by [`launch`]. Any setup failure
/// aborts before the command starts; once `/proc` is mounted, it is
/// unmounted again whatever happens to the command.
pub fn enter(config: &IsolationConfig, cmd: &[OsString]) -> Result<i32> {
    let mut progress = Progress(Stage::Start);

    namespaces::set_hostname(HOSTNAME)?;
    progress.advance(Stage::HostnameSet);

    mounts::switch_root(&config.rootfs)?;
    progress.advance(Stage::RootSwitched);
    progress.advance(Stage::CwdReset);

    let proc = ProcMount::mount()?;
    progress.advance(Stage::ProcMounted);

    progress.advance(Stage::CommandRunning);
    let outcome = run_command(cmd);

    match proc.release() {
        Ok(()) => progress.advance(Stage::ProcUnmounted),
        Err(e) => warn!(error = %anyhow::Error::new(e), "cleanup failed"),
    }

    progress.advance(Stage::Exit);
    outcome
}

/// Spawn the user command with inherited stdio and wait for it.
fn run_command(cmd: &[OsString]) -> Result<i32> {
    let Some((program, args)) = cmd.split_first() else {
        return Err(Error::CommandLaunch {
            program: String::new(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "no command specified"),
        });
    };

    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|source| Error::CommandLaunch {
            program: program.to_string_lossy().into_owned(),
            source,
        })?;

    let code = exit_code(status);
    debug!(program = %program.to_string_lossy(), code, "command exited");
    Ok(code)
}

/// Map a finished process to a shell-style exit code.
pub fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(EXIT_INTERNAL)
}

fn to_cstring(s: &OsStr) -> Result<CString> {
    CString::new(s.as_bytes()).map_err(|_| Error::NulByte(s.to_string_lossy().into_owned()))
}
