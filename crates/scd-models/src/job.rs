use std::fmt;
use std::str::FromStr;

use scd_types::{BusinessKey, Column, Entity, Envelope, TableDef};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Lifecycle of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Extended,
    Active,
    Paused,
    Completed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extended => "extended",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extended" => Ok(Self::Extended),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            other => Err(ModelError::UnknownJobStatus(other.to_string())),
        }
    }
}

/// A job posting between a company and a contractor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub status: JobStatus,
    /// Hourly rate.
    pub rate: f64,
    pub title: String,
    pub company_id: String,
    pub contractor_id: String,
}

const JOB_COLUMNS: &[Column] = &[
    Column::text("status"),
    Column::real("rate"),
    Column::text("title"),
    Column::text("company_id"),
    Column::text("contractor_id"),
];

impl Entity for Job {
    const TABLE: TableDef = TableDef::new("jobs", JOB_COLUMNS);

    fn validate(&self) -> Result<(), String> {
        if !self.rate.is_finite() || self.rate < 0.0 {
            return Err(format!("rate must be a non-negative number, got {}", self.rate));
        }
        let title_len = self.title.chars().count();
        if !(1..=200).contains(&title_len) {
            return Err(format!("title must be 1-200 characters, got {title_len}"));
        }
        if self.company_id.trim().is_empty() {
            return Err("company_id is required".into());
        }
        if self.contractor_id.trim().is_empty() {
            return Err("contractor_id is required".into());
        }
        Ok(())
    }
}

impl Job {
    /// A new, active job ready to be created.
    pub fn new(
        key: BusinessKey,
        title: impl Into<String>,
        company_id: impl Into<String>,
        contractor_id: impl Into<String>,
        rate: f64,
    ) -> Self {
        Self {
            envelope: Envelope::draft(key),
            status: JobStatus::Active,
            rate,
            title: title.into(),
            company_id: company_id.into(),
            contractor_id: contractor_id.into(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == JobStatus::Active
    }

    pub fn hourly_rate(&self) -> f64 {
        self.rate
    }

    pub fn update_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    pub fn pause(&mut self) {
        self.status = JobStatus::Paused;
    }

    pub fn resume(&mut self) {
        self.status = JobStatus::Active;
    }

    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scd_types::Versioned;

    fn job() -> Job {
        Job::new(BusinessKey::new("job-1").unwrap(), "Engineer", "co-1", "ct-1", 50.0)
    }

    #[test]
    fn new_job_is_active_draft() {
        let j = job();
        assert!(j.is_active());
        assert!(j.surrogate_key().is_nil());
        assert!(j.validate().is_ok());
    }

    #[test]
    fn status_transitions() {
        let mut j = job();
        j.pause();
        assert_eq!(j.status, JobStatus::Paused);
        j.resume();
        assert!(j.is_active());
        j.complete();
        assert_eq!(j.status.to_string(), "completed");
    }

    #[test]
    fn validation_rules() {
        let mut j = job();
        j.update_rate(-1.0);
        assert!(j.validate().is_err());
        j.update_rate(f64::NAN);
        assert!(j.validate().is_err());

        let mut j = job();
        j.title = String::new();
        assert!(j.validate().is_err());
        j.title = "x".repeat(201);
        assert!(j.validate().is_err());
        j.title = "x".repeat(200);
        assert!(j.validate().is_ok());

        let mut j = job();
        j.company_id = " ".into();
        assert!(j.validate().is_err());
    }

    #[test]
    fn payload_uses_column_names() {
        let payload = job().to_payload().unwrap();
        assert_eq!(payload["status"], "active");
        assert_eq!(payload["rate"], 50.0);
        let names: Vec<_> = Job::TABLE.columns.iter().map(|c| c.name).collect();
        let mut keys: Vec<_> = payload.keys().map(String::as_str).collect();
        keys.sort_unstable();
        let mut expected = names.clone();
        expected.sort_unstable();
        assert_eq!(keys, expected);
    }

    #[test]
    fn status_parses() {
        assert_eq!("extended".parse::<JobStatus>().unwrap(), JobStatus::Extended);
        assert!("archived".parse::<JobStatus>().is_err());
    }
}
