use colored::Colorize;
use scd_models::{Job, PaymentLineItem, Timelog};
use scd_types::{Entity, Envelope, Timestamp, Versioned};

use crate::cli::OutputFormat;

/// One-line, human-readable rendering of an entity's payload.
pub trait Describe: Entity {
    fn describe(&self) -> String;
}

impl Describe for Job {
    fn describe(&self) -> String {
        format!(
            "{} [{}] ${:.2}/h  company={} contractor={}",
            self.title, self.status, self.rate, self.company_id, self.contractor_id
        )
    }
}

impl Describe for Timelog {
    fn describe(&self) -> String {
        format!(
            "{} min ({})  job={}",
            self.duration_minutes(),
            self.kind,
            self.job_uid.short_id()
        )
    }
}

impl Describe for PaymentLineItem {
    fn describe(&self) -> String {
        format!(
            "{} [{}]  job={} timelog={}",
            self.formatted_amount(),
            self.status,
            self.job_uid.short_id(),
            self.timelog_uid.short_id()
        )
    }
}

fn time(t: Timestamp) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn envelope_line(env: &Envelope) -> String {
    let until = match env.valid_to {
        Some(t) => time(t).normal(),
        None => "current".green().bold(),
    };
    format!(
        "{} {:<4} {}  {} -> {}",
        env.business_key.as_str().bold(),
        format!("v{}", env.version).yellow(),
        env.surrogate_key.short_id().dimmed(),
        time(env.valid_from),
        until
    )
}

pub fn print_rows<E: Describe>(rows: &[E], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
        OutputFormat::Text => {
            for row in rows {
                println!("{}", envelope_line(row.envelope()));
                println!("    {}", row.describe());
            }
        }
    }
    Ok(())
}

pub fn print_one<E: Describe>(row: &E, format: OutputFormat) -> anyhow::Result<()> {
    print_rows(std::slice::from_ref(row), format)
}

/// Status lines go to stderr so stdout stays parseable.
pub fn note(format: OutputFormat, message: impl AsRef<str>) {
    if format == OutputFormat::Text {
        eprintln!("{}", message.as_ref());
    }
}
