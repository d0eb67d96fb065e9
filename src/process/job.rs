//! Job table: the shell's view of background jobs, as
//! distinct from the kernel-wide process table in [`super`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Done,
    Stopped,
}

impl JobStatus {
    fn label(self) -> &'static str {
        match self {
            JobStatus::Running => "Running",
            JobStatus::Done => "Done",
            JobStatus::Stopped => "Stopped",
        }
    }
}

pub struct Job {
    pub id: u32,
    pub pid: u32,
    pub command: String,
    pub status: Mutex<JobStatus>,
    pub exit_code: Mutex<Option<i32>>,
    done: Notify,
}

impl Job {
    pub fn status(&self) -> JobStatus {
        *self.status.lock().unwrap()
    }

    /// Formats the `[n]+ Done cmd` style line `jobs`/completion notices use.
    /// `current` marks the most-recently-backgrounded job with `+`.
    pub fn report_line(&self, current: bool) -> String {
        let marker = if current { "+" } else { "-" };
        format!("[{}]{} {}\t{}", self.id, marker, self.status().label(), self.command)
    }

    /// Resolves once the job's underlying process has exited.
    pub async fn wait(&self) -> Option<i32> {
        loop {
            if self.status() == JobStatus::Done {
                return *self.exit_code.lock().unwrap();
            }
            self.done.notified().await;
        }
    }
}

/// The shell's background job table: 1-based ids, allocated once per shell
/// session (not shared across the whole kernel like PIDs are).
pub struct JobTable {
    jobs: Mutex<HashMap<u32, std::sync::Arc<Job>>>,
    next_id: AtomicU32,
    current: Mutex<Option<u32>>,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            current: Mutex::new(None),
        }
    }

    pub fn add(&self, pid: u32, command: impl Into<String>) -> std::sync::Arc<Job> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let job = std::sync::Arc::new(Job {
            id,
            pid,
            command: command.into(),
            status: Mutex::new(JobStatus::Running),
            exit_code: Mutex::new(None),
            done: Notify::new(),
        });
        self.jobs.lock().unwrap().insert(id, job.clone());
        *self.current.lock().unwrap() = Some(id);
        job
    }

    pub fn get(&self, id: u32) -> Option<std::sync::Arc<Job>> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    pub fn get_by_pid(&self, pid: u32) -> Option<std::sync::Arc<Job>> {
        self.jobs.lock().unwrap().values().find(|j| j.pid == pid).cloned()
    }

    pub fn all(&self) -> Vec<std::sync::Arc<Job>> {
        let mut jobs: Vec<_> = self.jobs.lock().unwrap().values().cloned().collect();
        jobs.sort_by_key(|j| j.id);
        jobs
    }

    /// Mark a job complete and wake any waiters. Returns the formatted
    /// completion report line.
    pub fn complete(&self, id: u32, exit_code: i32) -> Option<String> {
        let job = self.jobs.lock().unwrap().get(&id).cloned()?;
        *job.status.lock().unwrap() = JobStatus::Done;
        *job.exit_code.lock().unwrap() = Some(exit_code);
        job.done.notify_waiters();
        let current = *self.current.lock().unwrap() == Some(id);
        Some(job.report_line(current))
    }

    pub fn stop(&self, id: u32) {
        if let Some(job) = self.jobs.lock().unwrap().get(&id) {
            *job.status.lock().unwrap() = JobStatus::Stopped;
        }
    }

    /// Drop jobs whose completion has already been reported via `jobs -l`.
    pub fn remove_done(&self) {
        self.jobs.lock().unwrap().retain(|_, j| j.status() != JobStatus::Done);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_one_based() {
        let table = JobTable::new();
        let j1 = table.add(10, "sleep 5");
        let j2 = table.add(11, "sleep 6");
        assert_eq!(j1.id, 1);
        assert_eq!(j2.id, 2);
    }

    #[test]
    fn complete_reports_done_line() {
        let table = JobTable::new();
        let j = table.add(10, "sleep 5");
        let line = table.complete(j.id, 0).unwrap();
        assert_eq!(line, "[1]+ Done\tsleep 5");
    }

    #[tokio::test]
    async fn wait_resolves_after_complete() {
        let table = std::sync::Arc::new(JobTable::new());
        let j = table.add(10, "sleep 1");
        let t = table.clone();
        let id = j.id;
        tokio::spawn(async move {
            t.complete(id, 7);
        });
        let code = j.wait().await;
        assert_eq!(code, Some(7));
    }
}
