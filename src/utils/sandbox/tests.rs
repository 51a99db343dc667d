use super::*;

#[test]
fn test_script_rules_default() {
    let config = SandboxConfig::default();
    let rules = SandboxRules::for_script(Path::new("/nonexistent/scratch"), &config);

    for p in ["/usr", "/lib", "/etc", "/bin"] {
        assert!(rules.read_only_paths.contains(&p.to_string()), "{p}");
    }
    assert_eq!(rules.read_write_paths, vec!["/nonexistent/scratch".to_string()]);
    assert!(!rules.read_write_paths.contains(&"/tmp".to_string()));
    assert!(rules.block_network);
}

#[test]
fn test_script_rules_extra_read_paths() {
    let config = SandboxConfig {
        additional_read_paths: vec!["/opt/python".to_string()],
        block_network: false,
        ..SandboxConfig::default()
    };
    let rules = SandboxRules::for_script(Path::new("/s"), &config);
    assert!(rules.read_only_paths.contains(&"/opt/python".to_string()));
    assert!(!rules.block_network);
}

#[test]
fn test_resource_limits_from_config() {
    let config = SandboxConfig {
        max_processes: 32,
        max_memory_mb: 256,
        max_cpu_secs: 0,
        ..SandboxConfig::default()
    };
    assert_eq!(
        ResourceLimits::from(&config),
        ResourceLimits {
            max_processes: 32,
            max_memory_bytes: 256 * 1024 * 1024,
            max_cpu_secs: 0,
        }
    );
}

#[test]
fn test_is_available_does_not_restrict_caller() {
    let _ = is_available();
    // The check runs on its own thread; this thread must still write files.
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("check.txt");
    std::fs::write(&path, "ok").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "ok");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_sandboxed_child_cannot_write_outside_scratch() {
    if !is_available() {
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    let rules = SandboxRules::for_script(scratch.path(), &SandboxConfig::default());

    let mut cmd = tokio::process::Command::new("/bin/sh");
    cmd.arg("-c").arg(format!(
        "echo x > {}/inside && echo x > {}/outside",
        scratch.path().display(),
        outside.path().display()
    ));
    apply_to_command(&mut cmd, &rules).unwrap();
    let status = cmd.status().await.unwrap();

    assert!(!status.success());
    assert!(scratch.path().join("inside").exists());
    assert!(!outside.path().join("outside").exists());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_limits_apply_to_child_only() {
    let mut cmd = tokio::process::Command::new("/bin/sh");
    cmd.arg("-c").arg("ulimit -t");
    cmd.stdout(std::process::Stdio::piped());
    apply_limits(
        &mut cmd,
        ResourceLimits {
            max_processes: 0,
            max_memory_bytes: 0,
            max_cpu_secs: 7,
        },
    );
    let out = cmd.output().await.unwrap();
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "7");

    let mut ours = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: valid out-pointer
    assert_eq!(unsafe { libc::getrlimit(libc::RLIMIT_CPU, &mut ours) }, 0);
    assert_ne!(ours.rlim_cur, 7);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_killing_the_group_reaches_background_children() {
    let mut cmd = tokio::process::Command::new("/bin/sh");
    cmd.arg("-c")
        .arg("sleep 4141 & echo $!; wait")
        .stdout(std::process::Stdio::piped())
        .process_group(0);
    let mut child = cmd.spawn().unwrap();
    let pid = child.id().unwrap();

    let mut stdout = tokio::io::BufReader::new(child.stdout.take().unwrap());
    let mut line = String::new();
    tokio::io::AsyncBufReadExt::read_line(&mut stdout, &mut line)
        .await
        .unwrap();
    let sleeper: u32 = line.trim().parse().unwrap();

    kill_process_group(pid);
    let status = tokio::time::timeout(std::time::Duration::from_secs(5), child.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(!status.success());

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while process_is_running(sleeper) {
        assert!(std::time::Instant::now() < deadline, "sleep {sleeper} survived");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}

/// Running means present and not a zombie waiting for its reaper.
#[cfg(target_os = "linux")]
fn process_is_running(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next().map(|s| s != "Z"))
        })
        .unwrap_or(false)
}
