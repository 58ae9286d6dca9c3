use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use rand::rngs::StdRng;
use rand::SeedableRng;
use scd_engine::{Engine, EngineError, ErrorKind};
use scd_models::{tables, EntityKind, Job, ModelError, PaymentLineItem, Timelog};
use scd_query::{scope, Query};
use scd_server::{
    contractor_job_uids, list_query, parse_timestamp, DatabaseConfig, ListFilter, ScdServer,
    ServerConfig, ServerError,
};
use scd_store::{SqliteStore, StoreError, VersionStore};
use scd_types::{BusinessKey, Clock, TypeError, Version};

use crate::cli::*;
use crate::output::{note, print_one, print_rows, Describe};
use crate::seed::{seed, SeedPlan};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let path = cli.database_path();
    match cli.command {
        Command::Serve(args) => cmd_serve(cli.database.as_deref(), args),
        command => dispatch(&open_engine(&path)?, command, cli.format),
    }
}

fn open_engine(path: &Path) -> anyhow::Result<Engine<SqliteStore>> {
    let opened = if path == Path::new(":memory:") {
        SqliteStore::open_in_memory()
    } else {
        SqliteStore::open(path)
    };
    let store = opened.with_context(|| format!("cannot open database {}", path.display()))?;
    Ok(Engine::new(Arc::new(store)))
}

/// Run one command against an open engine.
pub fn dispatch<S: VersionStore, C: Clock>(
    engine: &Engine<S, C>,
    command: Command,
    format: OutputFormat,
) -> anyhow::Result<()> {
    if !matches!(command, Command::Migrate(_)) {
        engine.store().apply_schema(&tables())?;
    }
    match command {
        Command::Migrate(args) => cmd_migrate(engine, args, format),
        Command::Seed(args) => cmd_seed(engine, args, format),
        Command::LatestJobs(args) => cmd_latest_jobs(engine, args, format),
        Command::Payments(args) => cmd_payments(engine, args, format),
        Command::History(args) => match args.kind {
            EntityKind::Job => cmd_history::<Job, _, _>(engine, &args.id, format),
            EntityKind::Timelog => cmd_history::<Timelog, _, _>(engine, &args.id, format),
            EntityKind::Payment => cmd_history::<PaymentLineItem, _, _>(engine, &args.id, format),
        },
        Command::Show(args) => match args.entity.kind {
            EntityKind::Job => cmd_show::<Job, _, _>(engine, &args, format),
            EntityKind::Timelog => cmd_show::<Timelog, _, _>(engine, &args, format),
            EntityKind::Payment => cmd_show::<PaymentLineItem, _, _>(engine, &args, format),
        },
        Command::CreateJob(args) => cmd_create_job(engine, args, format),
        Command::UpdateJob(args) => cmd_update_job(engine, args, format),
        Command::Delete(args) => match args.kind {
            EntityKind::Job => cmd_delete::<Job, _, _>(engine, &args, format),
            EntityKind::Timelog => cmd_delete::<Timelog, _, _>(engine, &args, format),
            EntityKind::Payment => cmd_delete::<PaymentLineItem, _, _>(engine, &args, format),
        },
        Command::Verify => cmd_verify(engine, format),
        Command::Serve(_) => bail!("serve needs a database path, not an open engine"),
    }
}

/// Process exit code for a failed command.
///
/// 2 invalid input or duplicate key, 3 not found, 4 version conflict,
/// 5 storage failure, 1 anything else.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    fn engine_code(kind: ErrorKind) -> u8 {
        match kind {
            ErrorKind::Validation | ErrorKind::AlreadyExists => 2,
            ErrorKind::NotFound => 3,
            ErrorKind::Conflict => 4,
            ErrorKind::Infrastructure => 5,
        }
    }

    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<EngineError>() {
            return engine_code(e.kind());
        }
        if let Some(e) = cause.downcast_ref::<ServerError>() {
            match e {
                ServerError::Engine(inner) => return engine_code(inner.kind()),
                ServerError::BadRequest(_) => return 2,
                _ => {}
            }
        }
        if cause.is::<TypeError>() || cause.is::<ModelError>() {
            return 2;
        }
        if cause.is::<StoreError>() {
            return 5;
        }
    }
    1
}

fn cmd_migrate<S: VersionStore, C: Clock>(
    engine: &Engine<S, C>,
    args: MigrateArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let store = engine.store();
    match args.direction {
        Direction::Up => {
            store.apply_schema(&tables())?;
            note(format, format!("{} migrations applied (up)", "✓".green().bold()));
        }
        Direction::Down => {
            store.drop_schema(&tables())?;
            note(format, format!("{} tables dropped (down)", "✓".green().bold()));
        }
    }
    Ok(())
}

fn cmd_seed<S: VersionStore, C: Clock>(
    engine: &Engine<S, C>,
    args: SeedArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let plan = SeedPlan {
        jobs: args.jobs,
        timelogs: args.timelogs,
        payments: args.payments,
    };
    let summary = seed(engine, plan, &mut rng)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => {
            println!("{} Seeding complete", "✓".green().bold());
            println!("  Jobs: {} ({} versions)", summary.jobs, summary.job_versions);
            println!(
                "  Timelogs: {} ({} versions)",
                summary.timelogs, summary.timelog_versions
            );
            println!(
                "  Payments: {} ({} versions)",
                summary.payments, summary.payment_versions
            );
        }
    }
    Ok(())
}

fn cmd_latest_jobs<S: VersionStore, C: Clock>(
    engine: &Engine<S, C>,
    args: LatestJobsArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let filter = ListFilter {
        company: Some(args.company.clone()),
        status: args.status.map(|s| s.to_string()),
        ..ListFilter::default()
    };
    let jobs: Vec<Job> = engine.find(&list_query::<Job, _, _>(engine, &filter)?)?;
    if jobs.is_empty() {
        note(format, format!("No jobs found for company {}", args.company.bold()));
        return Ok(());
    }
    print_rows(&jobs, format)?;
    let average = jobs.iter().map(|j| j.rate).sum::<f64>() / jobs.len() as f64;
    note(
        format,
        format!("{} latest job(s), average rate ${average:.2}", jobs.len()),
    );
    Ok(())
}

fn cmd_payments<S: VersionStore, C: Clock>(
    engine: &Engine<S, C>,
    args: PaymentsArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    // Payments may pin any version of the contractor's jobs.
    let job_uids = contractor_job_uids(engine, &args.contractor, true)?;
    if job_uids.is_empty() {
        note(format, format!("No jobs found for contractor {}", args.contractor.bold()));
        return Ok(());
    }
    let query = Query::new().scoped([scope::latest(), scope::field_in("job_uid", job_uids)]);
    let payments: Vec<PaymentLineItem> = engine.find(&query)?;
    print_rows(&payments, format)?;
    let total_cents: i64 = payments.iter().map(PaymentLineItem::amount_cents).sum();
    note(
        format,
        format!(
            "{} payment(s), total ${}.{:02}",
            payments.len(),
            total_cents / 100,
            total_cents % 100
        ),
    );
    Ok(())
}

fn cmd_history<E: Describe, S: VersionStore, C: Clock>(
    engine: &Engine<S, C>,
    id: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let key = BusinessKey::new(id)?;
    let rows: Vec<E> = engine.get_all_versions(&key)?;
    if rows.is_empty() {
        return Err(EngineError::NotFound {
            table: E::TABLE.name,
            business_key: key.to_string(),
        }
        .into());
    }
    print_rows(&rows, format)
}

fn cmd_show<E: Describe, S: VersionStore, C: Clock>(
    engine: &Engine<S, C>,
    args: &ShowArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let key = BusinessKey::new(args.entity.id.as_str())?;
    let row: E = match (args.version, &args.as_of) {
        (Some(version), _) => engine.get_version(&key, Version::new(version)?)?,
        (None, Some(raw)) => engine.get_as_of(&key, parse_timestamp(raw)?)?,
        (None, None) => engine.get_latest(&key)?,
    };
    print_one(&row, format)
}

fn cmd_create_job<S: VersionStore, C: Clock>(
    engine: &Engine<S, C>,
    args: CreateJobArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut job = Job::new(
        BusinessKey::new(args.id)?,
        args.title,
        args.company,
        args.contractor,
        args.rate,
    );
    if let Some(status) = args.status {
        job.status = status;
    }
    let created = engine.create(job)?;
    note(format, format!("{} Created job", "✓".green().bold()));
    print_one(&created, format)
}

fn cmd_update_job<S: VersionStore, C: Clock>(
    engine: &Engine<S, C>,
    args: UpdateJobArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let key = BusinessKey::new(args.id)?;
    let updated = engine.update(&key, |job: &mut Job| {
        if let Some(rate) = args.rate {
            job.update_rate(rate);
        }
        if let Some(status) = args.status {
            job.status = status;
        }
        if let Some(title) = &args.title {
            job.title.clone_from(title);
        }
    })?;
    note(format, format!("{} Stored new version", "✓".green().bold()));
    print_one(&updated, format)
}

fn cmd_delete<E: Describe, S: VersionStore, C: Clock>(
    engine: &Engine<S, C>,
    args: &EntityArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let key = BusinessKey::new(args.id.as_str())?;
    engine.soft_delete::<E>(&key)?;
    note(
        format,
        format!(
            "{} Closed latest version of {} {}",
            "✓".green().bold(),
            args.kind,
            key.as_str().yellow()
        ),
    );
    Ok(())
}

fn cmd_verify<S: VersionStore, C: Clock>(
    engine: &Engine<S, C>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let reports = engine.audit_tables(&tables())?;
    let violations: usize = reports.iter().map(|r| r.violations.len()).sum();

    match format {
        OutputFormat::Json => {
            let json: Vec<_> = reports
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "table": r.table,
                        "rows": r.row_count,
                        "business_keys": r.business_keys,
                        "latest_rows": r.latest_rows,
                        "violations": r.violations.iter().map(|v| serde_json::json!({
                            "business_key": v.business_key,
                            "version": v.version.map(|v| v.get()),
                            "kind": v.kind.to_string(),
                            "description": v.description,
                        })).collect::<Vec<_>>(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            for report in &reports {
                let mark = if report.is_valid() {
                    "✓".green().bold()
                } else {
                    "✗".red().bold()
                };
                println!(
                    "{mark} {}: {} rows, {} keys, {} latest",
                    report.table.bold(),
                    report.row_count,
                    report.business_keys,
                    report.latest_rows
                );
                for v in &report.violations {
                    let version = v.version.map(|v| format!(" v{v}")).unwrap_or_default();
                    println!(
                        "    {} {}{}: {}",
                        v.kind.to_string().red(),
                        v.business_key,
                        version,
                        v.description
                    );
                }
            }
        }
    }

    if violations > 0 {
        bail!("{violations} integrity violation(s) found");
    }
    Ok(())
}

fn cmd_serve(database: Option<&Path>, args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.bind_addr = bind
            .parse()
            .map_err(|e| ServerError::BadRequest(format!("invalid bind address '{bind}': {e}")))?;
    }
    if args.memory {
        config.database = DatabaseConfig::Memory;
    } else if let Some(path) = database {
        config.database = DatabaseConfig::Sqlite {
            path: path.to_path_buf(),
        };
    }
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(ScdServer::new(config).serve())?;
    Ok(())
}
