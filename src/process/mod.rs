//! Process registry: tracks every running and recently-exited
//! command, mirroring what a real kernel's `/proc` table gives a shell.

pub mod job;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// PID 1 is reserved for the first interactive shell.
pub const INIT_PID: u32 = 1;

/// The signal argument to [`ProcessRegistry::kill`]. Only `Stop`/`Tstp`
/// get special treatment; everything else aborts the process's controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Kill,
    Stop,
    Tstp,
    Cont,
}

impl Default for Signal {
    fn default() -> Self {
        Signal::Term
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Sleeping,
    Stopped,
    Zombie,
}

/// A single tracked process. Cloned out of the registry for callers; the
/// registry itself owns the authoritative copy behind its lock.
#[derive(Debug, Clone)]
pub struct Process {
    pub pid: u32,
    pub ppid: u32,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: String,
    pub env: HashMap<String, String>,
    pub start_time: u64,
    pub status: ProcessStatus,
    pub is_foreground: bool,
    pub job_id: Option<u32>,
    pub exit_code: Option<i32>,
    pub abort: CancellationToken,
}

/// Arguments for registering a freshly spawned process.
pub struct Spawn {
    pub ppid: u32,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: String,
    pub env: HashMap<String, String>,
    pub is_foreground: bool,
    pub job_id: Option<u32>,
}

struct Inner {
    table: HashMap<u32, Process>,
    next_pid: AtomicU32,
}

/// Central table of live and zombie processes.
pub struct ProcessRegistry {
    inner: Mutex<Inner>,
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                table: HashMap::new(),
                next_pid: AtomicU32::new(INIT_PID + 1),
            }),
        }
    }

    pub fn spawn(&self, spec: Spawn) -> Process {
        let mut inner = self.inner.lock().unwrap();
        let pid = inner.next_pid.fetch_add(1, Ordering::SeqCst);
        let process = Process {
            pid,
            ppid: spec.ppid,
            command: spec.command,
            args: spec.args,
            cwd: spec.cwd,
            env: spec.env,
            start_time: crate::vfs::inode::now_millis(),
            status: ProcessStatus::Running,
            is_foreground: spec.is_foreground,
            job_id: spec.job_id,
            exit_code: None,
            abort: CancellationToken::new(),
        };
        inner.table.insert(pid, process.clone());
        process
    }

    /// Reserve PID 1 for the init shell. Called exactly once at boot.
    pub fn spawn_init(&self, command: impl Into<String>, cwd: impl Into<String>) -> Process {
        let mut inner = self.inner.lock().unwrap();
        let process = Process {
            pid: INIT_PID,
            ppid: 0,
            command: command.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: HashMap::new(),
            start_time: crate::vfs::inode::now_millis(),
            status: ProcessStatus::Running,
            is_foreground: true,
            job_id: None,
            exit_code: None,
            abort: CancellationToken::new(),
        };
        inner.table.insert(INIT_PID, process.clone());
        process
    }

    pub fn get(&self, pid: u32) -> Option<Process> {
        self.inner.lock().unwrap().table.get(&pid).cloned()
    }

    pub fn get_by_job_id(&self, job_id: u32) -> Option<Process> {
        self.inner
            .lock()
            .unwrap()
            .table
            .values()
            .find(|p| p.job_id == Some(job_id))
            .cloned()
    }

    pub fn get_all(&self) -> Vec<Process> {
        self.inner.lock().unwrap().table.values().cloned().collect()
    }

    pub fn get_running(&self) -> Vec<Process> {
        self.inner
            .lock()
            .unwrap()
            .table
            .values()
            .filter(|p| matches!(p.status, ProcessStatus::Running | ProcessStatus::Sleeping))
            .cloned()
            .collect()
    }

    pub fn get_background_jobs(&self) -> Vec<Process> {
        self.inner
            .lock()
            .unwrap()
            .table
            .values()
            .filter(|p| !p.is_foreground && p.job_id.is_some() && p.status != ProcessStatus::Zombie)
            .cloned()
            .collect()
    }

    pub fn get_zombies(&self) -> Vec<Process> {
        self.inner
            .lock()
            .unwrap()
            .table
            .values()
            .filter(|p| p.status == ProcessStatus::Zombie)
            .cloned()
            .collect()
    }

    pub fn update_status(&self, pid: u32, status: ProcessStatus) {
        if let Some(p) = self.inner.lock().unwrap().table.get_mut(&pid) {
            p.status = status;
        }
    }

    /// Mark a process exited: moves it to the Zombie state with an exit
    /// code, pending a `reap`. Idempotent.
    pub fn mark_exited(&self, pid: u32, exit_code: i32) {
        if let Some(p) = self.inner.lock().unwrap().table.get_mut(&pid) {
            p.status = ProcessStatus::Zombie;
            p.exit_code = Some(exit_code);
        }
    }

    /// Remove a zombie from the table, returning its final exit code.
    pub fn reap(&self, pid: u32) -> Result<i32> {
        let mut inner = self.inner.lock().unwrap();
        match inner.table.get(&pid) {
            Some(p) if p.status == ProcessStatus::Zombie => {
                let code = p.exit_code.unwrap_or(0);
                inner.table.remove(&pid);
                Ok(code)
            }
            Some(_) => Err(Error::Process(format!("pid {pid} is not a zombie"))),
            None => Err(Error::Process(format!("no such process: {pid}"))),
        }
    }

    /// Reap every zombie in the table and return their (pid, exit_code) pairs.
    pub fn collect_zombies(&self) -> Vec<(u32, i32)> {
        let mut inner = self.inner.lock().unwrap();
        let pids: Vec<u32> = inner
            .table
            .values()
            .filter(|p| p.status == ProcessStatus::Zombie)
            .map(|p| p.pid)
            .collect();
        pids.into_iter()
            .map(|pid| {
                let p = inner.table.remove(&pid).unwrap();
                (pid, p.exit_code.unwrap_or(0))
            })
            .collect()
    }

    /// Signal a process. PID 1 (the init shell) cannot be killed. `Stop`/
    /// `Tstp` only flip status to `Stopped`, leaving the controller live so
    /// a later `fg`/`bg` can resume the job; `Cont` flips a stopped process
    /// back to `Running`. Every other signal aborts the controller.
    pub fn kill(&self, pid: u32, signal: Signal) -> Result<()> {
        if pid == INIT_PID {
            return Err(Error::Process("cannot kill init process".into()));
        }
        let mut inner = self.inner.lock().unwrap();
        let process = inner
            .table
            .get_mut(&pid)
            .ok_or_else(|| Error::Process(format!("no such process: {pid}")))?;
        match signal {
            Signal::Stop | Signal::Tstp => process.status = ProcessStatus::Stopped,
            Signal::Cont => process.status = ProcessStatus::Running,
            Signal::Term | Signal::Kill => process.abort.cancel(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn spec(cmd: &str) -> Spawn {
        Spawn {
            ppid: INIT_PID,
            command: cmd.to_string(),
            args: Vec::new(),
            cwd: "/".to_string(),
            env: HashMap::new(),
            is_foreground: true,
            job_id: None,
        }
    }

    #[test]
    fn pids_allocate_from_two() {
        let reg = ProcessRegistry::new();
        let p1 = reg.spawn(spec("echo"));
        let p2 = reg.spawn(spec("cat"));
        assert_eq!(p1.pid, 2);
        assert_eq!(p2.pid, 3);
    }

    #[test]
    fn init_cannot_be_killed() {
        let reg = ProcessRegistry::new();
        reg.spawn_init("lifo", "/home/user");
        assert!(reg.kill(INIT_PID, Signal::Term).is_err());
    }

    #[test]
    fn stop_signal_flips_status_without_aborting() {
        let reg = ProcessRegistry::new();
        let p = reg.spawn(spec("sleep"));
        reg.kill(p.pid, Signal::Tstp).unwrap();
        let stopped = reg.get(p.pid).unwrap();
        assert_eq!(stopped.status, ProcessStatus::Stopped);
        assert!(!stopped.abort.is_cancelled());

        reg.kill(p.pid, Signal::Cont).unwrap();
        assert_eq!(reg.get(p.pid).unwrap().status, ProcessStatus::Running);
    }

    #[test]
    fn reap_removes_zombie_and_returns_exit_code() {
        let reg = ProcessRegistry::new();
        let p = reg.spawn(spec("false"));
        reg.mark_exited(p.pid, 1);
        assert_eq!(reg.reap(p.pid).unwrap(), 1);
        assert!(reg.get(p.pid).is_none());
    }

    #[test]
    fn collect_zombies_drains_all() {
        let reg = ProcessRegistry::new();
        let p1 = reg.spawn(spec("a"));
        let p2 = reg.spawn(spec("b"));
        reg.mark_exited(p1.pid, 0);
        reg.mark_exited(p2.pid, 2);
        let mut zombies = reg.collect_zombies();
        zombies.sort_by_key(|(pid, _)| *pid);
        assert_eq!(zombies, vec![(p1.pid, 0), (p2.pid, 2)]);
        assert!(reg.get_zombies().is_empty());
    }
}
