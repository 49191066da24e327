//! The execution lock: a per-job, cross-process mutex with "create
//! exclusively or fail" semantics (design doc §4.4.1).
//!
//! Store-level atomicity alone cannot guarantee at-most-one concurrent
//! execution, because the command runs as an OS child process outside any
//! transaction boundary. This is the mechanism that closes that gap.

use std::io;
use std::path::{Path, PathBuf};

/// A held execution lock. Releases on drop, so a panicking or
/// early-returning worker still frees the job for another worker to pick
/// up — normal exit paths release it explicitly via [`ExecutionLock::release`].
pub struct ExecutionLock {
    path: PathBuf,
    released: bool,
}

impl ExecutionLock {
    fn lock_path(lock_dir: &Path, job_id: &str) -> PathBuf {
        lock_dir.join(format!("{job_id}.lock"))
    }

    /// Try to atomically create `<job_id>.lock` in `lock_dir`. Returns
    /// `Ok(None)` if the lock is already held (another worker owns the
    /// job); the caller must relinquish the job without a state change in
    /// that case (§4.4 step 2).
    ///
    /// The file body is `"<worker_id>\n<pid>"` — the owning worker id plus
    /// its OS pid, so a sweep can determine liveness directly from the
    /// file without needing an in-memory pid table (see [`super::manager`]
    /// doc comment for why this is a deliberate improvement on the
    /// worker-id-only body the design doc names).
    pub fn acquire(lock_dir: &Path, job_id: &str, worker_id: &str) -> io::Result<Option<Self>> {
        use std::fs::OpenOptions;
        use std::io::Write;

        let path = Self::lock_path(lock_dir, job_id);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let pid = std::process::id();
                writeln!(file, "{worker_id}\n{pid}")?;
                Ok(Some(ExecutionLock {
                    path,
                    released: false,
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Release the lock on a normal exit path.
    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for ExecutionLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Parse a lock file's contents into `(worker_id, pid)`, tolerating the
/// plain worker-id-only body an older writer might have left behind.
fn parse_lock_body(body: &str) -> (String, Option<u32>) {
    let mut lines = body.lines();
    let worker_id = lines.next().unwrap_or("").to_string();
    let pid = lines.next().and_then(|p| p.trim().parse().ok());
    (worker_id, pid)
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    // Signal 0 performs no-op delivery: it only checks whether the kernel
    // would deliver a signal, i.e. whether the pid exists and is ours to
    // signal. ESRCH means "no such process".
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn process_is_alive(_pid: u32) -> bool {
    true
}

/// Remove every `*.lock` file in `lock_dir` whose recorded pid is no
/// longer alive (or whose body could not be parsed at all). Run at
/// Worker-Manager startup and on a periodic sweep (§4.4.1, §4.5).
pub fn reap_stale_locks(lock_dir: &Path) -> io::Result<usize> {
    if !lock_dir.exists() {
        return Ok(0);
    }
    let mut reaped = 0;
    for entry in std::fs::read_dir(lock_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("lock") {
            continue;
        }
        let stale = match std::fs::read_to_string(&path) {
            Ok(body) => match parse_lock_body(&body) {
                (_, Some(pid)) => !process_is_alive(pid),
                (_, None) => true,
            },
            Err(_) => true,
        };
        if stale {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    reaped += 1;
                    tracing::info!(path = %path.display(), "reaped stale execution lock");
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(reaped)
}

/// Remove every lock file unconditionally, used on `WorkerManager::stop_all`
/// once every supervised worker has exited.
pub fn remove_all_locks(lock_dir: &Path) -> io::Result<usize> {
    if !lock_dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(lock_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("lock")
            && std::fs::remove_file(&path).is_ok()
        {
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_second_attempt_fails() {
        let dir = tempfile::tempdir().unwrap();
        let first = ExecutionLock::acquire(dir.path(), "job1", "worker_a").unwrap();
        assert!(first.is_some());
        let second = ExecutionLock::acquire(dir.path(), "job1", "worker_b").unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn release_frees_the_job_for_reacquisition() {
        let dir = tempfile::tempdir().unwrap();
        let lock = ExecutionLock::acquire(dir.path(), "job1", "worker_a").unwrap().unwrap();
        lock.release().unwrap();
        let again = ExecutionLock::acquire(dir.path(), "job1", "worker_b").unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn drop_without_release_still_frees_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _lock = ExecutionLock::acquire(dir.path(), "job1", "worker_a").unwrap().unwrap();
        }
        let again = ExecutionLock::acquire(dir.path(), "job1", "worker_b").unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn reap_removes_locks_owned_by_dead_pids() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dead.lock"), "worker_x\n999999999").unwrap();
        let reaped = reap_stale_locks(dir.path()).unwrap();
        assert_eq!(reaped, 1);
        assert!(!dir.path().join("dead.lock").exists());
    }

    #[test]
    fn reap_keeps_locks_owned_by_live_pid() {
        let dir = tempfile::tempdir().unwrap();
        let my_pid = std::process::id();
        std::fs::write(dir.path().join("alive.lock"), format!("worker_x\n{my_pid}")).unwrap();
        let reaped = reap_stale_locks(dir.path()).unwrap();
        assert_eq!(reaped, 0);
        assert!(dir.path().join("alive.lock").exists());
    }
}
