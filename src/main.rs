//! scitracer CLI - inspect and initialize provenance catalogs.

use anyhow::Context;
use clap::{Parser, Subcommand};
use scitracer::{create_config, find_data, parse_filters, Workspace};
use scitracer_core::config::CONFIG_FILE_NAME;
use scitracer_core::{Location, Uri};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "scitracer",
    version = env!("CARGO_PKG_VERSION"),
    about = "Provenance-tracking data catalog"
)]
struct Cli {
    /// Config file (default: $SCITRACER_CONFIG, ./config.yml, user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a local-filesystem config rooted at a workspace directory
    InitConfig {
        #[arg(short, long)]
        workspace: PathBuf,
        /// Config template containing ${workspace_dir}
        #[arg(long)]
        template: Option<PathBuf>,
    },
    /// List datasets
    Datasets,
    /// Create a dataset
    NewDataset { name: String },
    /// List locations, optionally filtered by annotations
    Locations {
        dataset: String,
        #[arg(short = 'w', long = "where")]
        filters: Vec<String>,
    },
    /// List data items with their effective annotations
    Data {
        dataset: String,
        #[arg(short = 'w', long = "where")]
        filters: Vec<String>,
        /// Only items at these location ids
        #[arg(short, long = "location")]
        locations: Vec<u64>,
    },
    /// Annotation keys and their values, for locations and data
    Annotations { dataset: String },
    /// Show how a data item was produced
    Lineage { dataset: String, data: String },
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scitracer=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::InitConfig { workspace, template } = &cli.command {
        let template = match template {
            Some(path) => Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("reading template {}", path.display()))?,
            ),
            None => None,
        };
        let path = cli.config.clone().unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        let written = create_config(&path, workspace, template.as_deref())?;
        println!("{}", written.display());
        return Ok(());
    }

    let ws = Workspace::discover(cli.config.as_deref())?;
    let session = &ws.session;

    match cli.command {
        Command::InitConfig { .. } => {}
        Command::Datasets => {
            for ds in session.datasets().await? {
                println!("{}\t{}", ds.uri, ds.name);
            }
        }
        Command::NewDataset { name } => {
            let ds = session.new_dataset(&name).await?;
            println!("{}", ds.uri);
        }
        Command::Locations { dataset, filters } => {
            let ds = session.get_dataset(&Uri::new(dataset)).await?;
            let rows = session
                .queries()
                .view_locations(&ds, &parse_filters(&filters)?)
                .await?;
            print_json(&rows)?;
        }
        Command::Data {
            dataset,
            filters,
            locations,
        } => {
            let ds = session.get_dataset(&Uri::new(dataset)).await?;
            let at: Vec<Location> = locations
                .into_iter()
                .map(|id| Location {
                    dataset: ds.clone(),
                    id,
                })
                .collect();
            let rows = session
                .queries()
                .view_data(&ds, &parse_filters(&filters)?, (!at.is_empty()).then_some(&at[..]))
                .await?;
            print_json(&rows)?;
        }
        Command::Annotations { dataset } => {
            let ds = session.get_dataset(&Uri::new(dataset)).await?;
            let queries = session.queries();
            print_json(&serde_json::json!({
                "locations": queries.location_annotations(&ds).await?,
                "data": queries.data_annotations(&ds).await?,
            }))?;
        }
        Command::Lineage { dataset, data } => {
            let ds = session.get_dataset(&Uri::new(dataset)).await?;
            let item = find_data(session, &ds, &Uri::new(data)).await?;
            match session.lineage(&item).await? {
                Some(lineage) => {
                    println!("func: {}", lineage.record.func);
                    println!("output_id: {}", lineage.record.output_id);
                    for source in &lineage.sources {
                        println!(
                            "  <- {} ({}, location {})",
                            source.uri, source.storage_type, source.location.id
                        );
                    }
                }
                None => println!("{} has no recorded provenance", item.uri),
            }
        }
    }

    Ok(())
}
