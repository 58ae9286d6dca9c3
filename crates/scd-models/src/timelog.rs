use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use scd_types::{BusinessKey, Column, Entity, Envelope, SurrogateKey, TableDef, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::job::Job;

const MILLIS_PER_MINUTE: i64 = 60 * 1000;
const MILLIS_PER_HOUR: f64 = 60.0 * 60.0 * 1000.0;

/// How a timelog entry came about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelogKind {
    Captured,
    Adjusted,
}

impl TimelogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Captured => "captured",
            Self::Adjusted => "adjusted",
        }
    }
}

impl fmt::Display for TimelogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimelogKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "captured" => Ok(Self::Captured),
            "adjusted" => Ok(Self::Adjusted),
            other => Err(ModelError::UnknownTimelogKind(other.to_string())),
        }
    }
}

/// Time worked against one specific job version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Timelog {
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Milliseconds.
    pub duration: i64,
    /// Unix seconds.
    pub time_start: i64,
    /// Unix seconds.
    pub time_end: i64,
    #[serde(rename = "type")]
    pub kind: TimelogKind,
    pub job_uid: SurrogateKey,
}

const TIMELOG_COLUMNS: &[Column] = &[
    Column::integer("duration"),
    Column::integer("time_start"),
    Column::integer("time_end"),
    Column::text("type"),
    Column::reference("job_uid", "jobs"),
];

impl Entity for Timelog {
    const TABLE: TableDef = TableDef::new("timelogs", TIMELOG_COLUMNS);

    fn validate(&self) -> Result<(), String> {
        if self.duration < 0 {
            return Err(format!("duration must be non-negative, got {}", self.duration));
        }
        if self.time_end <= self.time_start {
            return Err(format!(
                "time_end ({}) must be after time_start ({})",
                self.time_end, self.time_start
            ));
        }
        if self.job_uid.is_nil() {
            return Err("job_uid is required".into());
        }
        Ok(())
    }
}

impl Timelog {
    /// A captured entry for `job_uid` covering `[start, end)`.
    pub fn new(key: BusinessKey, job_uid: SurrogateKey, start: Timestamp, end: Timestamp) -> Self {
        let time_start = start.timestamp();
        let time_end = end.timestamp();
        Self {
            envelope: Envelope::draft(key),
            duration: (time_end - time_start) * 1000,
            time_start,
            time_end,
            kind: TimelogKind::Captured,
            job_uid,
        }
    }

    /// Like [`Timelog::new`] but pinned to `job`'s current version.
    pub fn for_job(key: BusinessKey, job: &Job, start: Timestamp, end: Timestamp) -> Self {
        Self::new(key, job.envelope.surrogate_key, start, end)
    }

    pub fn adjusted(key: BusinessKey, job_uid: SurrogateKey, start: Timestamp, end: Timestamp) -> Self {
        Self {
            kind: TimelogKind::Adjusted,
            ..Self::new(key, job_uid, start, end)
        }
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration as f64 / MILLIS_PER_HOUR
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration / MILLIS_PER_MINUTE
    }

    pub fn start_time(&self) -> Option<Timestamp> {
        DateTime::from_timestamp(self.time_start, 0)
    }

    pub fn end_time(&self) -> Option<Timestamp> {
        DateTime::from_timestamp(self.time_end, 0)
    }

    pub fn is_captured(&self) -> bool {
        self.kind == TimelogKind::Captured
    }

    pub fn is_adjusted(&self) -> bool {
        self.kind == TimelogKind::Adjusted
    }

    /// Set a new duration, moving the end time and marking the entry adjusted.
    pub fn update_duration(&mut self, minutes: i64) {
        self.duration = minutes * MILLIS_PER_MINUTE;
        self.time_end = self.time_start + minutes * 60;
        self.kind = TimelogKind::Adjusted;
    }

    pub fn adjust_times(&mut self, start: Timestamp, end: Timestamp) {
        self.time_start = start.timestamp();
        self.time_end = end.timestamp();
        self.duration = (self.time_end - self.time_start) * 1000;
        self.kind = TimelogKind::Adjusted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn start() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap()
    }

    fn timelog() -> Timelog {
        Timelog::new(
            BusinessKey::new("tl-1").unwrap(),
            SurrogateKey::generate(),
            start(),
            start() + Duration::minutes(90),
        )
    }

    #[test]
    fn durations() {
        let t = timelog();
        assert_eq!(t.duration, 90 * 60 * 1000);
        assert_eq!(t.duration_minutes(), 90);
        assert!((t.duration_hours() - 1.5).abs() < f64::EPSILON);
        assert_eq!(t.start_time(), Some(start()));
        assert!(t.is_captured());
        assert!(t.validate().is_ok());
    }

    #[test]
    fn update_duration_marks_adjusted() {
        let mut t = timelog();
        t.update_duration(30);
        assert_eq!(t.time_end - t.time_start, 1800);
        assert_eq!(t.duration_minutes(), 30);
        assert!(t.is_adjusted());
    }

    #[test]
    fn adjust_times_recomputes_duration() {
        let mut t = timelog();
        t.adjust_times(start() + Duration::hours(1), start() + Duration::hours(3));
        assert_eq!(t.duration, 2 * 60 * 60 * 1000);
        assert!(t.is_adjusted());
    }

    #[test]
    fn end_must_follow_start() {
        let mut t = timelog();
        t.time_end = t.time_start;
        assert!(t.validate().is_err());
    }

    #[test]
    fn kind_serializes_as_type() {
        let payload = timelog().to_payload().unwrap();
        assert_eq!(payload["type"], "captured");
        assert!(payload["job_uid"].is_string());
        let t = Timelog::adjusted(
            BusinessKey::new("tl-2").unwrap(),
            SurrogateKey::generate(),
            start(),
            start() + Duration::minutes(5),
        );
        assert_eq!(t.kind.to_string(), "adjusted");
    }
}
