use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod datasets;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Development tasks for warpkit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic paired dataset for smoke-testing training
    SynthDataset {
        /// Output directory; `train/` and `test/` are created inside
        #[arg(short, long, default_value = "data")]
        output: PathBuf,

        /// Number of training pairs
        #[arg(short, long, default_value_t = 8)]
        pairs: usize,

        /// Volume shape as D H W
        #[arg(short, long, num_args = 3, value_names = ["D", "H", "W"], default_values_t = [16, 16, 16])]
        shape: Vec<usize>,

        /// Skip the label folders
        #[arg(long)]
        unlabeled: bool,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Check a dataset directory's layout and report per-split counts
    VerifyDataset {
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::SynthDataset {
            output,
            pairs,
            shape,
            unlabeled,
            seed,
        } => {
            let shape: [usize; 3] = shape
                .try_into()
                .map_err(|s: Vec<usize>| anyhow::anyhow!("--shape takes three sizes, got {:?}", s))?;
            let options = datasets::SynthOptions {
                pairs,
                shape,
                labeled: !unlabeled,
                seed,
            };
            datasets::synth_dataset(&output, &options)?;
        }
        Commands::VerifyDataset { data_dir } => {
            let report = datasets::verify_dataset(&data_dir)?;
            for split in &report {
                println!(
                    "{:<6} {:>5} pairs  shape {:?}  {}",
                    split.name,
                    split.pairs,
                    split.shape,
                    if split.labeled { "labeled" } else { "unlabeled" }
                );
            }
        }
    }

    Ok(())
}
