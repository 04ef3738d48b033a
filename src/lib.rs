pub mod cli;
pub mod column;
pub mod config;
pub mod error;
pub mod io_utils;
pub mod loader;
pub mod locale;
pub mod results;
pub mod sql;
pub mod table;
pub mod tokenizer;
pub mod transport;

use std::{
    env,
    fs::File,
    io::BufWriter,
    sync::{Arc, OnceLock},
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info, warn};

use crate::{
    cli::{Cli, RunMode},
    config::{ConnectionSettings, Profile},
    loader::{BulkLoader, LoaderOptions},
    locale::LocaleTable,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("bulkload_csv", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    execute(&cli)
}

pub fn execute(cli: &Cli) -> Result<()> {
    let encoding = io_utils::resolve_encoding(cli.encoding.as_deref())?;
    let profile = match &cli.profile {
        Some(path) => Profile::load(path)?,
        None => Profile::default(),
    };
    let mut parameters = profile.parameters();
    parameters.extend(cli.connection_parameters());
    let null_token = cli
        .null_token
        .clone()
        .or_else(|| profile.null_token.clone())
        .unwrap_or_default();

    let locales = locale::initialize_locales();
    let settings = ConnectionSettings::from_parameters(&parameters);
    let backend = loader::select_backend(&settings);
    let mut loader = loader::create_loader(
        backend,
        &cli.file,
        Arc::clone(&locales),
        LoaderOptions {
            encoding,
            null_token,
        },
    );
    loader.set_connection_parameters(parameters);

    let results = loader
        .parse(cli.separator, cli.quote)
        .with_context(|| format!("Scanning {:?}", cli.file))?;
    if let Some(path) = &cli.report {
        let file = File::create(path).with_context(|| format!("Creating report {path:?}"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), results)
            .with_context(|| format!("Writing report {path:?}"))?;
        info!("Scan report written to {path:?}");
    }

    let mode = cli.mode();
    let table = loader.get_table_name(cli.table.as_deref().unwrap_or_default());
    let statements = [
        loader.generate_drop_table_command(&table)?,
        loader.generate_create_table_command(&table)?,
        loader.generate_copy_into_command(&table)?,
    ];
    if mode != RunMode::Execute {
        print_summary(loader.as_ref(), &locales)?;
        for statement in &statements {
            println!("{statement}");
        }
    }
    if mode == RunMode::DryRun {
        info!("Dry run: nothing was loaded into {table}");
        return Ok(());
    }

    let rejected = loader
        .load(&table)
        .with_context(|| format!("Loading {:?} into {table}", cli.file))?;
    let results = loader.parsing_results()?;
    match rejected {
        Some(0) => info!("Loaded {} line(s) into {table}", results.total_records()),
        Some(count) => warn!(
            "Loaded {table}; the server rejected {count} of {} line(s)",
            results.total_records()
        ),
        None => info!(
            "Loaded {table}; rejected rows are not reported by the {} backend",
            loader.backend()
        ),
    }
    Ok(())
}

fn print_summary(loader: &dyn BulkLoader, locales: &LocaleTable) -> Result<()> {
    let results = loader.parsing_results()?;
    println!(
        "-- {} data line(s), {} malformed, {} column(s), {} backend",
        results.total_records(),
        results.num_malformed_lines(),
        results.columns().len(),
        loader.backend()
    );
    let (headers, rows) = table::column_summary(results, locales);
    for line in table::render_table(&headers, &rows).lines() {
        println!("-- {line}");
    }
    Ok(())
}
