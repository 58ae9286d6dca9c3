use std::fmt;
use std::str::FromStr;

use scd_types::{BusinessKey, Column, Entity, Envelope, SurrogateKey, TableDef};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::job::Job;
use crate::timelog::Timelog;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentStatus {
    NotPaid,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotPaid => "not-paid",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not-paid" => Ok(Self::NotPaid),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            other => Err(ModelError::UnknownPaymentStatus(other.to_string())),
        }
    }
}

/// An amount owed for one timelog at one job rate.
///
/// Both references pin exact versions, so the amount stays explainable
/// after the job's rate or the timelog's duration changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentLineItem {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub job_uid: SurrogateKey,
    pub timelog_uid: SurrogateKey,
    pub amount: f64,
    pub status: PaymentStatus,
}

const PAYMENT_COLUMNS: &[Column] = &[
    Column::reference("job_uid", "jobs"),
    Column::reference("timelog_uid", "timelogs"),
    Column::real("amount"),
    Column::text("status"),
];

impl Entity for PaymentLineItem {
    const TABLE: TableDef = TableDef::new("payment_line_items", PAYMENT_COLUMNS);

    fn validate(&self) -> Result<(), String> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(format!("amount must be a non-negative number, got {}", self.amount));
        }
        if self.job_uid.is_nil() || self.timelog_uid.is_nil() {
            return Err("job_uid and timelog_uid are required".into());
        }
        Ok(())
    }
}

/// `rate * hours` for the given job and timelog versions.
pub fn calculate_amount(job: &Job, timelog: &Timelog) -> f64 {
    job.rate * timelog.duration_hours()
}

impl PaymentLineItem {
    pub fn new(
        key: BusinessKey,
        job_uid: SurrogateKey,
        timelog_uid: SurrogateKey,
        amount: f64,
    ) -> Self {
        Self {
            envelope: Envelope::draft(key),
            job_uid,
            timelog_uid,
            amount,
            status: PaymentStatus::NotPaid,
        }
    }

    /// A line item whose amount is computed from `job` and `timelog`.
    pub fn calculated(key: BusinessKey, job: &Job, timelog: &Timelog) -> Self {
        Self::new(
            key,
            job.envelope.surrogate_key,
            timelog.envelope.surrogate_key,
            calculate_amount(job, timelog),
        )
    }

    pub fn is_not_paid(&self) -> bool {
        self.status == PaymentStatus::NotPaid
    }

    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }

    pub fn is_failed(&self) -> bool {
        self.status == PaymentStatus::Failed
    }

    pub fn mark_paid(&mut self) {
        self.status = PaymentStatus::Paid;
    }

    pub fn mark_failed(&mut self) {
        self.status = PaymentStatus::Failed;
    }

    pub fn mark_not_paid(&mut self) {
        self.status = PaymentStatus::NotPaid;
    }

    pub fn update_amount(&mut self, amount: f64) {
        self.amount = amount;
    }

    /// Amount in whole cents, rounded half away from zero.
    pub fn amount_cents(&self) -> i64 {
        (self.amount * 100.0).round() as i64
    }

    pub fn formatted_amount(&self) -> String {
        format!("${:.2}", self.amount)
    }
}
