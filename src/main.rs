use std::sync::Arc;

use clap::Parser;
use contents_grapple::{
    Config,
    DataDir,
    HttpSource,
    IndexDb,
    Ingestor,
    Outcome,
    Scheduler,
    Service,
    error::{self, Error},
};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, FindArgs, ListArgs, RefreshArgs};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("CONTENTS_GRAPPLE_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir.config_file());
    let config = Config::load(&config_path)?;
    let db = Arc::new(IndexDb::open(&data_dir.index_db())?);

    match cli.command {
        Command::Refresh(args) => cmd_refresh(db, &config, args)?,
        Command::Watch => cmd_watch(db, &config)?,
        Command::Find(args) => {
            let service = Service::new(db, &config)?;
            cmd_find(&service, &args)?;
        }
        Command::Archives(args) => cmd_archives(&db, &args)?,
        Command::Pools(args) => cmd_pools(&config, &args)?,
        Command::Completions(_) => {}
    }

    Ok(())
}

fn runtime() -> error::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            Error::Config(format!("failed to start tokio runtime: {e}"))
        })
}

fn scheduler(
    db: Arc<IndexDb>,
    config: &Config,
    sources: Vec<String>,
) -> error::Result<Scheduler> {
    let source = Arc::new(HttpSource::new(&config.fetch)?);
    let ingestor = Arc::new(Ingestor::new(db, source, config.ingest.clone()));
    Ok(Scheduler::new(ingestor, sources, config.refresh_interval()))
}

fn cmd_refresh(
    db: Arc<IndexDb>,
    config: &Config,
    args: RefreshArgs,
) -> error::Result<()> {
    let sources = if args.sources.is_empty() {
        config.sources.clone()
    } else {
        args.sources
    };
    if sources.is_empty() {
        eprintln!("No sources configured.");
        return Ok(());
    }

    let scheduler = scheduler(db, config, sources)?;
    let reports = runtime()?.block_on(scheduler.run_once())?;

    for report in &reports {
        let status = match report.outcome {
            Outcome::Unchanged => "unchanged".to_string(),
            Outcome::MissingHeader => "no header, skipped".to_string(),
            Outcome::Ingested { lines, inserted } => {
                format!("{lines} lines, {inserted} new entries")
            }
        };
        println!(
            "{}\t{status}\t{:.1}s",
            report.archive,
            report.elapsed.as_secs_f64()
        );
    }
    Ok(())
}

fn cmd_watch(db: Arc<IndexDb>, config: &Config) -> error::Result<()> {
    let scheduler = scheduler(db, config, config.sources.clone())?;

    let runtime = runtime()?;
    let result = runtime.block_on(async {
        tokio::select! {
            result = scheduler.run() => result,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping");
                Ok(())
            }
        }
    });
    // In-flight refreshes are abandoned; their markers are not committed.
    runtime.shutdown_background();
    result
}

fn cmd_find(service: &Service, args: &FindArgs) -> error::Result<()> {
    let matches = service.find(&args.target, &args.pattern)?;

    if args.json {
        println!("{}", json!(matches));
    } else if matches.is_empty() {
        eprintln!("No paths match '{}' in '{}'", args.pattern, args.target);
    } else {
        for (path, packages) in &matches {
            println!("{path}\t{}", packages.join(","));
        }
    }
    Ok(())
}

fn cmd_archives(db: &IndexDb, args: &ListArgs) -> error::Result<()> {
    let archives = db.list_archives()?;

    if args.json {
        let names: Vec<&str> = archives.iter().map(|a| a.as_str()).collect();
        println!("{}", json!(names));
    } else if archives.is_empty() {
        println!("No archives indexed yet.");
    } else {
        for archive in &archives {
            let marker = db.refresh_marker(archive)?.unwrap_or_default();
            println!("{archive}\t{marker}");
        }
    }
    Ok(())
}

fn cmd_pools(config: &Config, args: &ListArgs) -> error::Result<()> {
    let pools = config.pools()?;

    if args.json {
        let value: serde_json::Map<String, serde_json::Value> = pools
            .iter()
            .map(|(name, members)| {
                let members: Vec<&str> =
                    members.iter().map(|m| m.as_str()).collect();
                (name.clone(), json!(members))
            })
            .collect();
        println!("{}", serde_json::Value::Object(value));
    } else if pools.is_empty() {
        println!("No pools configured.");
    } else {
        for (name, members) in &pools {
            println!("{name}");
            for member in members {
                println!("  {member}");
            }
        }
    }
    Ok(())
}
