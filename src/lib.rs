pub mod archive;
pub mod backend;
pub mod cli;
pub mod config;
pub mod form;
pub mod io_utils;
pub mod naming;
pub mod parser;
pub mod pipeline;
pub mod registry;
pub mod results;
pub mod schema;
pub mod table;
pub mod transcript;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, error, info, warn};

use crate::{
    backend::Backend,
    cli::{Cli, Commands},
    config::PortalConfig,
    io_utils::UploadBytes,
    pipeline::{RegistryStatus, UploadError, UploadRequest, UploadSettings},
    table::TextTable,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("results_portal", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = PortalConfig::resolve(cli.config.as_deref(), cli.state_dir.as_deref())?;
    match cli.command {
        Commands::Init => handle_init(&config),
        Commands::Upload(args) => handle_upload(&config, &args),
        Commands::Tables(args) => handle_tables(&config, &args),
        Commands::Show(args) => handle_show(&config, &args),
        Commands::Edit(args) => handle_edit(&config, &args),
        Commands::Transcript(args) => handle_transcript(&config, &args),
        Commands::Archives => handle_archives(&config),
    }
}

fn connect(config: &PortalConfig) -> Result<Box<dyn Backend>> {
    config.connect().context("Connecting to results backend")
}

fn handle_init(config: &PortalConfig) -> Result<()> {
    let backend = connect(config)?;
    let registry = &config.registry.table;
    registry::ensure_registry(backend.as_ref(), registry)
        .with_context(|| format!("Provisioning registry table '{registry}'"))?;
    info!("Registry table '{registry}' is ready");
    println!("Registry '{registry}' is ready");
    Ok(())
}

fn upload_file_name(input: &Path) -> String {
    if io_utils::is_dash(input) {
        return "upload.csv".to_string();
    }
    input
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| "upload.csv".to_string())
}

fn handle_upload(config: &PortalConfig, args: &cli::UploadArgs) -> Result<()> {
    let form = form::UploadForm::new(args.department, args.level, args.semester, &args.session);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let mut settings = UploadSettings::from(config);
    if args.no_rollback {
        settings.rollback_on_failure = false;
    }
    let bytes = match io_utils::read_upload(&args.input, settings.max_upload_bytes)? {
        UploadBytes::Loaded(bytes) => bytes,
        UploadBytes::TooLarge { size } => {
            return Err(upload_failure(UploadError::TooLarge {
                size,
                max: settings.max_upload_bytes,
            }));
        }
    };
    let request = UploadRequest::new(form, &upload_file_name(&args.input), bytes)
        .with_encoding(encoding)
        .with_delimiter(delimiter);
    info!(
        "Uploading '{}' as {} with delimiter '{}'",
        args.input.display(),
        request.form.caption(),
        printable_delimiter(delimiter)
    );

    if args.dry_run {
        let plan = pipeline::prepare(&request, &settings).map_err(upload_failure)?;
        println!("{}", plan.create_table_sql());
        println!(
            "-- {} row(s) would be inserted into {}",
            plan.parsed.row_count(),
            plan.table.table_name
        );
        return Ok(());
    }

    let backend = connect(config)?;
    let report =
        pipeline::run_upload(backend.as_ref(), settings, &request).map_err(upload_failure)?;

    info!("Upload {} finished for {}", report.upload_id, report.table_name());
    println!(
        "Uploaded {} row(s) into {}",
        report.rows_inserted,
        report.table_name()
    );
    println!(
        "Archived {} ({} bytes, sha256 {})",
        report.archive.public_url, report.archive.size, report.archive.sha256
    );
    match &report.registry {
        RegistryStatus::Recorded(record) => {
            debug!("Registered {} at {}", record.table_name, record.uploaded_at);
        }
        RegistryStatus::Orphaned(err) => {
            eprintln!(
                "warning: table '{}' was created but is not listed in the registry: {err}",
                report.table_name()
            );
        }
    }
    Ok(())
}

fn upload_failure(err: UploadError) -> anyhow::Error {
    let stage = err.stage();
    let message = err.user_message();
    let surviving = err.surviving_table().map(str::to_string);
    let err = anyhow::Error::new(err);
    error!("Upload failed at stage {stage}: {err:#}");
    if let Some(table) = surviving {
        warn!("Table '{table}' was left in place");
    }
    err.context(message)
}

fn handle_tables(config: &PortalConfig, args: &cli::TablesArgs) -> Result<()> {
    let backend = connect(config)?;
    let records = registry::list_tables(backend.as_ref(), &config.registry.table, args.prefix.as_deref())
        .with_context(|| format!("Listing registry '{}'", config.registry.table))?;
    let mut table = TextTable::new(vec![
        "table_name".to_string(),
        "title".to_string(),
        "uploaded_at".to_string(),
    ]);
    for record in &records {
        let title = record
            .title()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.push_row(vec![record.table_name.clone(), title, record.uploaded_at.clone()]);
    }
    print!("{}", table.render());
    info!("Listed {} result table(s)", records.len());
    Ok(())
}

fn handle_show(config: &PortalConfig, args: &cli::ShowArgs) -> Result<()> {
    let backend = connect(config)?;
    let rows = results::fetch_rows(backend.as_ref(), &args.table_name)
        .with_context(|| format!("Fetching rows from '{}'", args.table_name))?;
    let set = results::RowSet::from_rows(&rows);
    if args.as_table {
        print!("{}", set.to_text_table().render());
    } else {
        let delimiter = args.delimiter.unwrap_or(io_utils::DEFAULT_CSV_DELIMITER);
        set.write_csv(args.output.as_deref(), delimiter)
            .with_context(|| format!("Exporting '{}'", args.table_name))?;
    }
    info!("Exported {} row(s) from {}", set.rows.len(), args.table_name);
    Ok(())
}

fn handle_edit(config: &PortalConfig, args: &cli::EditArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let bytes = io_utils::read_upload(&args.input)?;
    let text = io_utils::decode_bytes(&bytes, encoding)
        .with_context(|| format!("Decoding edits {:?}", args.input))?;
    let edits = results::parse_edits(&text, delimiter, config.limits.max_identifier_len)
        .with_context(|| format!("Reading edits from {:?}", args.input))?;
    let backend = connect(config)?;
    let applied = results::apply_edits(backend.as_ref(), &args.table_name, &edits)
        .with_context(|| format!("Applying edits to '{}'", args.table_name))?;
    println!("Applied {applied} edit(s) to {}", args.table_name);
    Ok(())
}

fn handle_transcript(config: &PortalConfig, args: &cli::TranscriptArgs) -> Result<()> {
    let backend = connect(config)?;
    let transcript = transcript::lookup_transcript(
        backend.as_ref(),
        &args.matric,
        args.level,
        args.semester,
        &args.session,
        config.limits.max_identifier_len,
    )
    .with_context(|| format!("Fetching result for {}", args.matric))?;
    print!("{transcript}");
    Ok(())
}

fn handle_archives(config: &PortalConfig) -> Result<()> {
    let backend = connect(config)?;
    let listings = archive::list_archives(
        backend.as_ref(),
        &config.storage.bucket,
        &config.storage.archive_prefix,
    )
    .with_context(|| format!("Listing archives in bucket '{}'", config.storage.bucket))?;
    let mut table = TextTable::new(vec![
        "path".to_string(),
        "size".to_string(),
        "created_at".to_string(),
        "url".to_string(),
    ]);
    for listing in &listings {
        table.push_row(vec![
            listing.path.clone(),
            listing.object.size.to_string(),
            listing.object.created_at.clone().unwrap_or_default(),
            listing.public_url.clone(),
        ]);
    }
    print!("{}", table.render());
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
