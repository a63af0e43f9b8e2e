use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use arrow::util::pretty::pretty_format_batches;
use clap::{Parser, Subcommand};

use socialed_data::data::{export, filter, registry};
use socialed_data::{DatasetLoader, LoaderConfig, TweetTable};

/// Fetch and inspect social-media event-detection datasets.
#[derive(Parser)]
#[command(name = "socialed-data", author, version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Data root directory (overrides SOCIALED_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every supported dataset with its language and local status
    #[command(visible_alias = "ls")]
    List,

    /// Show metadata for one dataset
    Info { name: String },

    /// Clone a dataset and print the path of its array file
    Download { name: String },

    /// Load a dataset (downloading if needed) and print a summary
    Load {
        name: String,

        /// Number of rows to print
        #[arg(long, default_value_t = 5)]
        head: usize,

        /// Keep only these event ids
        #[arg(long = "event")]
        events: Vec<i64>,
    },

    /// Load a dataset and write it to .csv, .json or .parquet
    Export {
        name: String,
        output: PathBuf,

        /// Keep only these event ids
        #[arg(long = "event")]
        events: Vec<i64>,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = LoaderConfig::from_env().context("reading loader configuration")?;

    match cli.command {
        Commands::List => {
            for d in registry::REGISTRY {
                let loader = open(d.name, &cli.data_dir, &config)?;
                let status = if loader.is_downloaded() { "downloaded" } else { "-" };
                println!("{:<16} {:<8} {status}", d.name, d.language);
            }
        }
        Commands::Info { name } => {
            let loader = open(&name, &cli.data_dir, &config)?;
            let language = loader.dataset_language()?;
            println!("name:       {name}");
            println!("language:   {language}");
            println!("source:     {}", loader.repo_url());
            println!("location:   {}", loader.local_path()?.display());
            match loader.find_local()? {
                Some(path) => println!("array file: {}", path.display()),
                None => println!("array file: (not downloaded)"),
            }
        }
        Commands::Download { name } => {
            let loader = open(&name, &cli.data_dir, &config)?;
            let path = loader
                .download()
                .with_context(|| format!("downloading {name}"))?;
            println!("{}", path.display());
        }
        Commands::Load { name, head, events } => {
            let table = load(&name, &cli.data_dir, &config, &events)?;
            let event_count = table.unique_values("event_id").map_or(0, |v| v.len());
            println!("{name}: {} tweets, {event_count} events", table.len());
            if head > 0 && !table.is_empty() {
                let batch = export::to_record_batch(&table.head(head))?;
                println!("{}", pretty_format_batches(&[batch])?);
            }
        }
        Commands::Export {
            name,
            output,
            events,
        } => {
            let table = load(&name, &cli.data_dir, &config, &events)?;
            export::save_file(&table, &output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Wrote {} tweets to {}", table.len(), output.display());
        }
    }
    Ok(())
}

fn open(name: &str, data_dir: &Option<PathBuf>, config: &LoaderConfig) -> Result<DatasetLoader> {
    DatasetLoader::with_config(Some(name), data_dir.as_deref(), config.clone())
        .with_context(|| format!("preparing loader for {name}"))
}

fn load(
    name: &str,
    data_dir: &Option<PathBuf>,
    config: &LoaderConfig,
    events: &[i64],
) -> Result<TweetTable> {
    if registry::descriptor(name).is_none() {
        bail!(
            "Unsupported dataset: {name}. Supported datasets are: {}",
            registry::supported_names().join(", ")
        );
    }
    let loader = open(name, data_dir, config)?;
    let table = loader
        .load_data()
        .with_context(|| format!("loading {name}"))?;
    if events.is_empty() {
        Ok(table)
    } else {
        Ok(filter::select(
            &table,
            &filter::events_filter(events.iter().copied()),
        ))
    }
}
