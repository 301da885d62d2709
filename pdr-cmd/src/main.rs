mod get;
mod info;

use std::io::stderr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pdr::registry::Registry;
use pdr::{Options, Product};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the objects, identifiers and warnings of a product.
    Info {
        /// Data file or label
        input: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: info::Format,

        /// Build every object so decode warnings are reported too.
        #[arg(long, action)]
        load: bool,

        #[command(flatten)]
        open: OpenArgs,
    },
    /// Print the label, or the value of one of its keys.
    Label {
        /// Data file or label
        input: PathBuf,

        /// Print only the first value of this key.
        #[arg(short, long)]
        key: Option<String>,

        /// Use the key most similar to --key when there is no exact match.
        #[arg(long, action)]
        fuzzy: bool,

        #[command(flatten)]
        open: OpenArgs,
    },
    /// Print one data object.
    ///
    /// Tables are written as CSV and headers and text verbatim. Images are summarized
    /// by their shape and the range of unmasked values.
    Get {
        /// Data file or label
        input: PathBuf,

        /// Object name, as listed by `info`.
        object: String,

        #[command(flatten)]
        open: OpenArgs,
    },
}

#[derive(clap::Args)]
struct OpenArgs {
    /// Label to use instead of the one found next to the input.
    #[arg(long, value_name = "path")]
    label: Option<PathBuf>,

    /// Mission alias table to merge with the built-in missions.
    #[arg(long, value_name = "path")]
    missions: Option<PathBuf>,

    /// Do not log decode warnings.
    #[arg(short, long, action)]
    quiet: bool,
}

impl OpenArgs {
    fn open(&self, input: &Path, lazy_load: bool) -> Result<Product> {
        let registry = match &self.missions {
            Some(path) => Registry::with_file(path, true)
                .with_context(|| format!("loading missions from {path:?}"))?,
            None => Registry::default(),
        };
        let options = Options::builder()
            .lazy_load(lazy_load)
            .quiet(self.quiet)
            .registry(registry)
            .build();
        let options = match &self.label {
            Some(label) => Options {
                label_path: Some(label.clone()),
                ..options
            },
            None => options,
        };
        pdr::read(input, options).with_context(|| format!("opening {input:?}"))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("PDR_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Info {
            input,
            format,
            load,
            open,
        } => {
            let product = open.open(input, !load)?;
            info::info(&product, format)
        }
        Commands::Label {
            input,
            key,
            fuzzy,
            open,
        } => {
            let product = open.open(input, true)?;
            let Some(key) = key else {
                println!("{}", product.label_text());
                return Ok(());
            };
            let value = match product.metaget(key) {
                Some(value) => value,
                None if *fuzzy => match product.metaget_fuzzy(key) {
                    Some(value) => value,
                    None => bail!("label has no keys"),
                },
                None => bail!("no key {key} in label; try --fuzzy"),
            };
            println!("{value}");
            Ok(())
        }
        Commands::Get {
            input,
            object,
            open,
        } => {
            let product = open.open(input, true)?;
            get::get(&product, object)
        }
    }
}
