use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use scd_engine::{Engine, ErrorKind};
use scd_models::{tables, Job};
use scd_store::InMemoryStore;
use scd_types::{BusinessKey, ManualClock, Versioned};

#[derive(Clone, Debug)]
enum Op {
    Create,
    Update(u16),
    Delete,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => Just(Op::Create),
        6 => (0u16..500).prop_map(Op::Update),
        1 => Just(Op::Delete),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn history_is_contiguous_under_any_op_sequence(ops in prop::collection::vec(op(), 1..40)) {
        let store = Arc::new(InMemoryStore::with_schema(&tables()));
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let engine = Engine::with_clock(store, Arc::new(ManualClock::starting_at(start)));
        let key = BusinessKey::new("job-p").unwrap();

        let mut written = 0usize;
        let mut deleted = false;
        for op in &ops {
            match op {
                Op::Create => {
                    let job = Job::new(key.clone(), "Prop", "c", "k", 1.0);
                    match engine.create(job) {
                        Ok(_) => {
                            prop_assert_eq!(written, 0);
                            written += 1;
                        }
                        Err(err) => prop_assert_eq!(err.kind(), ErrorKind::AlreadyExists),
                    }
                }
                Op::Update(rate) => {
                    match engine.update(&key, |j: &mut Job| j.update_rate(f64::from(*rate))) {
                        Ok(job) => {
                            written += 1;
                            prop_assert_eq!(job.version().get() as usize, written);
                        }
                        Err(err) => {
                            prop_assert_eq!(err.kind(), ErrorKind::NotFound);
                            prop_assert!(written == 0 || deleted);
                        }
                    }
                }
                Op::Delete => match engine.soft_delete::<Job>(&key) {
                    Ok(()) => deleted = true,
                    Err(err) => prop_assert_eq!(err.kind(), ErrorKind::NotFound),
                },
            }
        }

        let history: Vec<Job> = engine.get_all_versions(&key).unwrap();
        prop_assert_eq!(history.len(), written);
        for (i, job) in history.iter().enumerate() {
            prop_assert_eq!(job.version().get() as usize, i + 1);
        }
        let open = history.iter().filter(|j| j.is_latest()).count();
        prop_assert_eq!(open, usize::from(written > 0 && !deleted));
        for pair in history.windows(2) {
            prop_assert_eq!(pair[0].valid_to(), Some(pair[1].valid_from()));
        }
        prop_assert!(engine.audit::<Job>().unwrap().is_valid());
    }
}
