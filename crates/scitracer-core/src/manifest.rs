//! Run manifest: structured record of one runner pass over a run plan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RunManifest {
    pub run_id: String,
    pub dataset: String,
    pub started: DateTime<Utc>,
    pub ended: Option<DateTime<Utc>>,
    pub outcome: Outcome,
    pub total_items: usize,
    pub total_wall_ms: u64,
    pub jobs: BTreeMap<String, JobStatus>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pending,
    Success,
    Failure,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobStatus {
    pub func: String,
    pub status: JobState,
    pub items: usize,
    pub completed: usize,
    pub wall_ms: u64,
    pub started: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Success,
    Failed,
}

impl RunManifest {
    pub fn new(run_id: &str, dataset: &str) -> Self {
        Self {
            run_id: run_id.into(),
            dataset: dataset.into(),
            started: Utc::now(),
            ended: None,
            outcome: Outcome::Pending,
            total_items: 0,
            total_wall_ms: 0,
            jobs: BTreeMap::new(),
        }
    }

    pub fn add_job(&mut self, job_id: &str, func: &str, items: usize) {
        self.jobs.insert(
            job_id.into(),
            JobStatus {
                func: func.into(),
                status: JobState::Pending,
                items,
                completed: 0,
                wall_ms: 0,
                started: None,
                ended: None,
            },
        );
    }

    pub fn start_job(&mut self, job_id: &str) {
        if let Some(job) = self.jobs.get_mut(job_id) {
            job.status = JobState::Running;
            job.started = Some(Utc::now());
        }
    }

    pub fn complete_item(&mut self, job_id: &str) {
        if let Some(job) = self.jobs.get_mut(job_id) {
            job.completed += 1;
        }
    }

    pub fn finish_job(&mut self, job_id: &str, state: JobState) {
        if let Some(job) = self.jobs.get_mut(job_id) {
            job.status = state;
            job.ended = Some(Utc::now());
            if let (Some(start), Some(end)) = (job.started, job.ended) {
                job.wall_ms = (end - start).num_milliseconds().max(0) as u64;
            }
        }
    }

    pub fn finalize(&mut self, outcome: Outcome) {
        let ended = Utc::now();
        self.outcome = outcome;
        self.ended = Some(ended);
        self.total_items = self.jobs.values().map(|j| j.completed).sum();
        self.total_wall_ms = (ended - self.started).num_milliseconds().max(0) as u64;
    }

    pub fn to_yaml(&self) -> String {
        serde_yaml::to_string(self).unwrap_or_default()
    }

    pub fn run_log_line(&self) -> String {
        format!(
            "| {} | {} | {} | {} | {} |",
            self.run_id,
            self.dataset,
            self.started.format("%Y-%m-%dT%H:%M:%S"),
            self.total_items,
            self.outcome,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_lifecycle() {
        let mut m = RunManifest::new("run-1", "demo");
        m.add_job("0", "wiener_filter", 2);
        m.add_job("1", "spot_detection", 2);

        m.start_job("0");
        assert_eq!(m.jobs["0"].status, JobState::Running);
        m.complete_item("0");
        m.complete_item("0");
        m.finish_job("0", JobState::Success);
        assert_eq!(m.jobs["0"].completed, 2);
        assert!(m.jobs["0"].ended.is_some());

        m.finalize(Outcome::Success);
        assert_eq!(m.outcome, Outcome::Success);
        assert_eq!(m.total_items, 2);
        assert_eq!(m.jobs["1"].status, JobState::Pending);
    }

    #[test]
    fn manifest_yaml_contains_state() {
        let mut m = RunManifest::new("run-42", "demo");
        m.add_job("0", "f", 1);
        let yaml = m.to_yaml();
        assert!(yaml.contains("run-42"));
        assert!(yaml.contains("pending"));
    }

    #[test]
    fn run_log_line_format() {
        let m = RunManifest::new("run-42", "Demo spots");
        let line = m.run_log_line();
        assert!(line.contains("run-42"));
        assert!(line.contains("Demo spots"));
        assert!(line.ends_with("pending |"));
    }
}
