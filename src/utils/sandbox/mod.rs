use crate::config::SandboxConfig;
use std::path::Path;

/// Resolved sandbox rules for a single script execution.
#[derive(Debug, Clone)]
pub struct SandboxRules {
    /// Paths to grant read-only access (interpreter and system libraries).
    pub read_only_paths: Vec<String>,
    /// Paths to grant read-write access (the per-run scratch directory).
    pub read_write_paths: Vec<String>,
    /// Run in a fresh network namespace and deny TCP through Landlock.
    pub block_network: bool,
}

/// Kernel resource limits for a script process and everything it forks.
/// A zero field leaves that limit alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_processes: u64,
    pub max_memory_bytes: u64,
    pub max_cpu_secs: u64,
}

impl From<&SandboxConfig> for ResourceLimits {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            max_processes: config.max_processes,
            max_memory_bytes: config.max_memory_mb.saturating_mul(1024 * 1024),
            max_cpu_secs: config.max_cpu_secs,
        }
    }
}

impl SandboxRules {
    /// Build rules for running an interpreter inside `scratch`.
    ///
    /// Read-only: `/usr`, `/lib`, `/lib64`, `/bin`, `/etc` plus configured extras.
    /// Read-write: the scratch directory only.
    pub fn for_script(scratch: &Path, config: &SandboxConfig) -> Self {
        let mut read_only: Vec<String> = ["/usr", "/lib", "/lib64", "/bin", "/etc"]
            .iter()
            .map(|p| (*p).to_string())
            .collect();
        read_only.extend(config.additional_read_paths.iter().cloned());

        // Rules must match the paths the kernel sees after symlink resolution
        let scratch = scratch
            .canonicalize()
            .unwrap_or_else(|_| scratch.to_path_buf());

        Self {
            read_only_paths: read_only,
            read_write_paths: vec![scratch.to_string_lossy().to_string()],
            block_network: config.block_network,
        }
    }
}

/// Check whether Landlock LSM is enforced on this kernel.
///
/// `restrict_self` only affects the calling thread, so the check runs on a
/// throwaway thread.
#[cfg(target_os = "linux")]
pub fn is_available() -> bool {
    use landlock::{ABI, Access, AccessFs, Ruleset, RulesetAttr, RulesetStatus};

    std::thread::spawn(|| {
        let abi = ABI::V5;
        Ruleset::default()
            .handle_access(AccessFs::from_all(abi))
            .and_then(landlock::Ruleset::create)
            .and_then(landlock::RulesetCreated::restrict_self)
            .is_ok_and(|status| !matches!(status.ruleset, RulesetStatus::NotEnforced))
    })
    .join()
    .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
pub fn is_available() -> bool {
    false
}

/// Check whether this host lets an unprivileged child enter its own user
/// and network namespace.
///
/// `unshare(CLONE_NEWUSER)` refuses multithreaded callers, so the check
/// runs in a forked `/bin/sh`. The answer is cached for the process.
#[cfg(target_os = "linux")]
pub fn network_isolation_available() -> bool {
    use std::os::unix::process::CommandExt;
    use std::sync::OnceLock;

    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        let mut cmd = std::process::Command::new("/bin/sh");
        cmd.arg("-c")
            .arg("exit 0")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        // SAFETY: only the unshare syscall runs between fork and exec
        unsafe {
            cmd.pre_exec(enter_network_namespace);
        }
        cmd.status().is_ok_and(|s| s.success())
    })
}

#[cfg(not(target_os = "linux"))]
pub fn network_isolation_available() -> bool {
    false
}

/// A new user namespace makes `CLONE_NEWNET` legal without privileges. The
/// new network namespace has only a downed loopback, so every TCP and UDP
/// destination is unreachable.
#[cfg(target_os = "linux")]
fn enter_network_namespace() -> std::io::Result<()> {
    // SAFETY: unshare takes flags only and touches no memory of ours
    if unsafe { libc::unshare(libc::CLONE_NEWUSER | libc::CLONE_NEWNET) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Install `limits` in the child through `setrlimit` before exec.
///
/// Works without Landlock, so scripts are capped even with the sandbox off.
#[cfg(unix)]
pub fn apply_limits(cmd: &mut tokio::process::Command, limits: ResourceLimits) {
    // SAFETY: pre_exec runs between fork() and exec() in the child process.
    // setrlimit is async-signal-safe and the closure allocates nothing.
    unsafe {
        cmd.pre_exec(move || {
            set_limit(libc::RLIMIT_NPROC, limits.max_processes)?;
            set_limit(libc::RLIMIT_AS, limits.max_memory_bytes)?;
            set_limit(libc::RLIMIT_CPU, limits.max_cpu_secs)?;
            Ok(())
        });
    }
}

#[cfg(not(unix))]
pub fn apply_limits(_cmd: &mut tokio::process::Command, _limits: ResourceLimits) {}

#[cfg(target_os = "linux")]
type Resource = libc::__rlimit_resource_t;
#[cfg(all(unix, not(target_os = "linux")))]
type Resource = libc::c_int;

#[cfg(unix)]
fn set_limit(resource: Resource, value: u64) -> std::io::Result<()> {
    if value == 0 {
        return Ok(());
    }
    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: rlim is a valid rlimit that outlives both calls
    if unsafe { libc::getrlimit(resource, &mut rlim) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // Raising the hard limit needs privileges, so never ask for more
    let value = (value as libc::rlim_t).min(rlim.rlim_max);
    rlim.rlim_cur = value;
    rlim.rlim_max = value;
    // SAFETY: as above
    if unsafe { libc::setrlimit(resource, &rlim) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// SIGKILL the whole process group led by `pid`.
///
/// Pairs with `process_group(0)` on the command, which makes the script
/// the leader of a group holding every process it forks.
#[cfg(unix)]
pub fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    if pgid <= 1 {
        return;
    }
    // SAFETY: killpg takes plain integers; ESRCH for an empty group is fine
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
pub fn kill_process_group(_pid: u32) {}

/// Apply sandbox rules to a `tokio::process::Command` via `pre_exec`.
#[cfg(target_os = "linux")]
#[allow(clippy::unnecessary_wraps)]
pub fn apply_to_command(
    cmd: &mut tokio::process::Command,
    rules: &SandboxRules,
) -> anyhow::Result<()> {
    use landlock::{
        ABI, Access, AccessFs, AccessNet, PathBeneath, PathFd, Ruleset, RulesetAttr,
        RulesetCreatedAttr,
    };

    let abi = ABI::V5;

    let read_only = rules.read_only_paths.clone();
    let read_write = rules.read_write_paths.clone();
    let block_network = rules.block_network;

    // SAFETY: pre_exec runs between fork() and exec() in the child process.
    // Only unshare and Landlock syscalls are issued here, nothing async.
    unsafe {
        cmd.pre_exec(move || {
            let read_access = AccessFs::from_read(abi);
            let full_access = AccessFs::from_all(abi);

            if block_network {
                enter_network_namespace()?;
            }

            let mut ruleset = Ruleset::default()
                .handle_access(full_access)
                .map_err(|e| std::io::Error::other(e.to_string()))?;

            if block_network {
                ruleset = ruleset
                    .handle_access(AccessNet::from_all(abi))
                    .map_err(|e| std::io::Error::other(e.to_string()))?;
            }

            let mut created = ruleset
                .create()
                .map_err(|e| std::io::Error::other(e.to_string()))?;

            for (paths, access) in [(&read_only, read_access), (&read_write, full_access)] {
                for path_str in paths {
                    let path = std::path::Path::new(path_str);
                    if path.exists()
                        && let Ok(fd) = PathFd::new(path)
                    {
                        created = created
                            .add_rule(PathBeneath::new(fd, access))
                            .map_err(|e| std::io::Error::other(e.to_string()))?;
                    }
                }
            }

            // No port rules: every TCP bind/connect is denied when AccessNet is handled
            created
                .restrict_self()
                .map_err(|e| std::io::Error::other(e.to_string()))?;

            Ok(())
        });
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn apply_to_command(
    _cmd: &mut tokio::process::Command,
    _rules: &SandboxRules,
) -> anyhow::Result<()> {
    anyhow::bail!("script sandbox is only supported on Linux")
}

#[cfg(test)]
mod tests;
