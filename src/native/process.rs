use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::process::Stdio;

/// Spawn `program` in a new session so it outlives the caller's process group.
///
/// The child handle is dropped before returning: ownership of the process passes
/// to the OS and only its pid is kept. Nothing here waits on or observes its exit.
pub fn spawn_detached(
    program: &str,
    args: &[String],
    work_dir: &Path,
    stdout: Stdio,
    stderr: Stdio,
) -> anyhow::Result<u32> {
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .kill_on_drop(false);

    // Safety: setsid is async-signal-safe and touches no parent state.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid().map_err(std::io::Error::from)?;
            Ok(())
        });
    }

    let child = cmd
        .spawn()
        .map_err(|e| anyhow::anyhow!("spawn {} failed: {}", program, e))?;
    let pid = child
        .id()
        .ok_or_else(|| anyhow::anyhow!("{} exited before its pid could be read", program))?;
    drop(child);
    Ok(pid)
}

/// Send `signal` to `pid`. A failed `kill` keeps its [`Errno`] as the error source.
pub fn send_signal(pid: i32, signal: Signal) -> anyhow::Result<()> {
    if pid <= 0 {
        anyhow::bail!("Refusing to signal non-positive pid {}", pid);
    }
    kill(Pid::from_raw(pid), signal)
        .map_err(|e| anyhow::Error::new(e).context(format!("kill({}, {:?}) failed", pid, signal)))
}

/// True if `err` came from signaling a pid with no process behind it.
pub fn is_no_such_process(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<Errno>(), Some(Errno::ESRCH))
}

/// True if `pid` names a running process. Zombies and dead entries count as stopped.
pub fn is_alive(pid: i32) -> bool {
    let Ok(proc) = procfs::process::Process::new(pid) else {
        return false;
    };
    match proc.stat() {
        Ok(stat) => !matches!(stat.state, 'Z' | 'X' | 'x'),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_is_alive_self() {
        assert!(is_alive(std::process::id() as i32));
    }

    #[test]
    fn test_is_alive_rejects_unused_pid() {
        // Above the kernel's pid_max ceiling, so never allocated.
        assert!(!is_alive(i32::MAX));
    }

    #[test]
    fn test_send_signal_rejects_non_positive_pid() {
        assert!(send_signal(0, Signal::SIGTERM).is_err());
        assert!(send_signal(-1, Signal::SIGTERM).is_err());
    }

    #[test]
    fn test_signal_to_missing_pid_is_no_such_process() {
        let err = send_signal(i32::MAX, Signal::SIGTERM).unwrap_err();
        assert!(is_no_such_process(&err));

        let err = send_signal(0, Signal::SIGTERM).unwrap_err();
        assert!(!is_no_such_process(&err));
    }

    #[tokio::test]
    async fn test_spawn_detached_starts_new_session() {
        let tmp = tempfile::tempdir().unwrap();
        let pid = spawn_detached(
            "sleep",
            &["30".to_string()],
            tmp.path(),
            Stdio::null(),
            Stdio::null(),
        )
        .unwrap();

        let stat = procfs::process::Process::new(pid as i32)
            .unwrap()
            .stat()
            .unwrap();
        assert_eq!(stat.session, pid as i32, "Child should lead its own session");

        send_signal(pid as i32, Signal::SIGTERM).unwrap();
        for _ in 0..50 {
            if !is_alive(pid as i32) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!is_alive(pid as i32));
    }

    #[tokio::test]
    async fn test_spawn_detached_missing_program() {
        let tmp = tempfile::tempdir().unwrap();
        let result = spawn_detached(
            "/nonexistent/definitely-not-a-binary",
            &[],
            tmp.path(),
            Stdio::null(),
            Stdio::null(),
        );
        assert!(result.is_err());
    }
}
