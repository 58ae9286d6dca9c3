use chrono::Duration;
use rand::Rng;
use scd_engine::{Engine, EngineResult};
use scd_models::{Job, JobStatus, PaymentLineItem, PaymentStatus, Timelog, TimelogKind};
use scd_store::VersionStore;
use scd_types::{BusinessKey, Clock, SurrogateKey, Versioned};
use serde::Serialize;
use tracing::info;

pub const COMPANIES: [&str; 4] = [
    "company-acme",
    "company-tech",
    "company-startup",
    "company-corp",
];

pub const CONTRACTORS: [&str; 4] = [
    "contractor-alice",
    "contractor-bob",
    "contractor-carol",
    "contractor-dave",
];

const TITLES: [&str; 10] = [
    "Software Engineer",
    "Frontend Developer",
    "Backend Developer",
    "DevOps Engineer",
    "Data Scientist",
    "Product Manager",
    "UI/UX Designer",
    "QA Engineer",
    "Tech Lead",
    "Full Stack Developer",
];

const JOB_STATUSES: [JobStatus; 3] = [JobStatus::Active, JobStatus::Paused, JobStatus::Completed];

const PAYMENT_STATUSES: [PaymentStatus; 3] =
    [PaymentStatus::NotPaid, PaymentStatus::Paid, PaymentStatus::Failed];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeedPlan {
    pub jobs: usize,
    pub timelogs: usize,
    pub payments: usize,
}

/// Rows written by [`seed`], counting every version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub jobs: usize,
    pub job_versions: usize,
    pub timelogs: usize,
    pub timelog_versions: usize,
    pub payments: usize,
    pub payment_versions: usize,
}

fn key(prefix: &str, i: usize) -> EngineResult<BusinessKey> {
    Ok(BusinessKey::new(format!("{prefix}-{i}"))?)
}

fn pick<'a, T, R: Rng>(rng: &mut R, items: &'a [T]) -> &'a T {
    &items[rng.gen_range(0..items.len())]
}

/// Write jobs with three versions each, then timelogs and payment line items
/// pinned to random job and timelog versions. A share of timelogs and
/// payments get a second version.
pub fn seed<S: VersionStore, C: Clock, R: Rng>(
    engine: &Engine<S, C>,
    plan: SeedPlan,
    rng: &mut R,
) -> EngineResult<SeedSummary> {
    let mut summary = SeedSummary::default();
    let mut job_uids: Vec<SurrogateKey> = Vec::new();

    for i in 1..=plan.jobs {
        let job_key = key("job", i)?;
        let job = Job::new(
            job_key.clone(),
            TITLES[(i - 1) % TITLES.len()],
            *pick(rng, &COMPANIES),
            *pick(rng, &CONTRACTORS),
            f64::from(rng.gen_range(40u32..100)),
        );
        job_uids.push(engine.create(job)?.surrogate_key());

        let raise = f64::from(rng.gen_range(5u32..20));
        let v2 = engine.update(&job_key, |j: &mut Job| j.update_rate(j.rate + raise))?;
        job_uids.push(v2.surrogate_key());

        let status = *pick(rng, &JOB_STATUSES);
        let nudge = rng
            .gen_bool(0.3)
            .then(|| f64::from(rng.gen_range(-5i32..=5)));
        let v3 = engine.update(&job_key, |j: &mut Job| {
            j.status = status;
            if let Some(delta) = nudge {
                j.update_rate(j.rate + delta);
            }
        })?;
        job_uids.push(v3.surrogate_key());

        summary.jobs += 1;
        summary.job_versions += 3;
        info!(business_key = %job_key, status = %v3.status, rate = v3.rate, "seeded job");
    }

    let mut timelog_uids: Vec<SurrogateKey> = Vec::new();
    if !job_uids.is_empty() {
        let now = engine.clock().now();
        for i in 1..=plan.timelogs {
            let timelog_key = key("timelog", i)?;
            let start = now - Duration::days(rng.gen_range(0..30))
                + Duration::hours(rng.gen_range(0..8));
            let end = start + Duration::hours(rng.gen_range(1..=8));
            let mut timelog = Timelog::new(timelog_key.clone(), *pick(rng, &job_uids), start, end);
            if rng.gen_bool(0.2) {
                timelog.kind = TimelogKind::Adjusted;
            }
            timelog_uids.push(engine.create(timelog)?.surrogate_key());
            summary.timelogs += 1;
            summary.timelog_versions += 1;

            if rng.gen_bool(0.15) {
                let shift = Duration::minutes(rng.gen_range(-30..=30));
                engine.update(&timelog_key, |t: &mut Timelog| {
                    if let (Some(start), Some(end)) = (t.start_time(), t.end_time()) {
                        t.adjust_times(start, end + shift);
                    }
                })?;
                summary.timelog_versions += 1;
            }
        }
    }

    if !timelog_uids.is_empty() {
        for i in 1..=plan.payments {
            let payment_key = key("payment", i)?;
            let amount = f64::from(rng.gen_range(50u32..100)) * (1.0 + rng.gen::<f64>() * 7.0);
            let mut payment = PaymentLineItem::new(
                payment_key.clone(),
                *pick(rng, &job_uids),
                *pick(rng, &timelog_uids),
                (amount * 100.0).round() / 100.0,
            );
            payment.status = match rng.gen::<f32>() {
                r if r < 0.7 => PaymentStatus::Paid,
                r if r < 0.9 => PaymentStatus::NotPaid,
                _ => PaymentStatus::Failed,
            };
            engine.create(payment)?;
            summary.payments += 1;
            summary.payment_versions += 1;

            if rng.gen_bool(0.2) {
                let status = *pick(rng, &PAYMENT_STATUSES);
                engine.update(&payment_key, |p: &mut PaymentLineItem| p.status = status)?;
                summary.payment_versions += 1;
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use scd_models::tables;
    use scd_query::Query;
    use scd_store::InMemoryStore;

    fn engine() -> Engine<InMemoryStore> {
        Engine::new(Arc::new(InMemoryStore::with_schema(&tables())))
    }

    #[test]
    fn seeds_requested_counts_with_clean_history() {
        let engine = engine();
        let plan = SeedPlan {
            jobs: 4,
            timelogs: 12,
            payments: 9,
        };
        let summary = seed(&engine, plan, &mut StdRng::seed_from_u64(7)).unwrap();

        assert_eq!(summary.jobs, 4);
        assert_eq!(summary.job_versions, 12);
        assert_eq!(summary.timelogs, 12);
        assert_eq!(summary.payments, 9);
        assert_eq!(engine.count::<Job>(&Query::new()).unwrap(), 12);
        assert_eq!(
            engine.count::<Timelog>(&Query::new()).unwrap(),
            summary.timelog_versions
        );
        assert_eq!(
            engine.count::<PaymentLineItem>(&Query::new()).unwrap(),
            summary.payment_versions
        );

        for report in engine.audit_tables(&tables()).unwrap() {
            assert!(report.is_valid(), "{}: {:?}", report.table, report.violations);
        }
    }

    #[test]
    fn seeding_twice_collides() {
        let engine = engine();
        let plan = SeedPlan {
            jobs: 1,
            timelogs: 0,
            payments: 0,
        };
        seed(&engine, plan, &mut StdRng::seed_from_u64(1)).unwrap();
        let err = seed(&engine, plan, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert_eq!(err.kind(), scd_engine::ErrorKind::AlreadyExists);
    }

    #[test]
    fn no_jobs_means_no_dependents() {
        let engine = engine();
        let plan = SeedPlan {
            jobs: 0,
            timelogs: 5,
            payments: 5,
        };
        let summary = seed(&engine, plan, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(summary, SeedSummary::default());
    }
}
