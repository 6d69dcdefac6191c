//! Asset jobs scheduled by templates.
//!
//! `copy_file` and `process_file` do not touch the filesystem while a page
//! renders; they queue a job for the asset executor. Jobs are keyed by
//! destination, so scheduling the same destination twice is a no-op.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{trace, warn};

/// One scheduled asset operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    /// Site-relative source path.
    pub src: String,
    /// Site-relative destination path.
    pub dest: String,
    /// Transform name for `process_file`; `None` copies verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

impl Job {
    pub fn copy(src: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
            transform: None,
        }
    }

    pub fn process(src: impl Into<String>, dest: impl Into<String>, transform: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
            transform: Some(transform.into()),
        }
    }
}

/// Pending jobs in scheduling order.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Vec<Job>,
    by_dest: HashMap<String, usize>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `job` unless its destination is already scheduled. Returns
    /// whether the job was added.
    pub fn schedule(&mut self, job: Job) -> bool {
        if let Some(&index) = self.by_dest.get(&job.dest) {
            if self.jobs[index] != job {
                warn!(
                    dest = %job.dest,
                    src = %job.src,
                    scheduled = %self.jobs[index].src,
                    "destination already scheduled by another job"
                );
            }
            return false;
        }
        trace!(src = %job.src, dest = %job.dest, "job scheduled");
        self.by_dest.insert(job.dest.clone(), self.jobs.len());
        self.jobs.push(job);
        true
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Hand every pending job to the executor, emptying the queue.
    pub fn take(&mut self) -> Vec<Job> {
        self.by_dest.clear();
        std::mem::take(&mut self.jobs)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_is_idempotent_by_destination() {
        let mut queue = JobQueue::new();
        assert!(queue.schedule(Job::copy("img/a.png", "img/a.png")));
        assert!(!queue.schedule(Job::copy("img/a.png", "img/a.png")));
        assert!(!queue.schedule(Job::process("img/b.png", "img/a.png", "thumb")));
        assert!(queue.schedule(Job::process("css/site.scss", "css/site.css", "sass")));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.jobs()[0].src, "img/a.png");
    }

    #[test]
    fn test_take_empties_the_queue() {
        let mut queue = JobQueue::new();
        queue.schedule(Job::copy("a", "a"));
        let jobs = queue.take();
        assert_eq!(jobs.len(), 1);
        assert!(queue.is_empty());
        assert!(queue.schedule(Job::copy("a", "a")));
    }
}
