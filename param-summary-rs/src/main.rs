//! CLI entry point for param-summary-rs.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use param_summary_rs::{load_all, Pipeline, Result, SummaryConfig};

#[derive(Parser)]
#[command(name = "param-summary")]
#[command(about = "Hierarchical parameter statistics for model visualization")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the layer tree and stats table
    Run {
        /// Path to configuration file
        config: String,
        /// Override the capture directory
        #[arg(long)]
        capture_dir: Option<String>,
        /// Override the output directory
        #[arg(long)]
        output_dir: Option<String>,
    },
    /// Validate a configuration file
    Validate {
        /// Path to configuration file
        config: String,
    },
    /// Generate a sample configuration file
    Init {
        /// Output path for config file
        #[arg(default_value = "summary.yaml")]
        output: String,
        /// Preset (bert, bert-kde, vit)
        #[arg(long, default_value = "bert")]
        preset: String,
    },
    /// Print the layer tree derived from the captures
    Tree {
        /// Path to configuration file
        config: String,
        /// Override the capture directory
        #[arg(long)]
        capture_dir: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            capture_dir,
            output_dir,
        } => {
            tracing::info!("Running summary with config: {}", config);
            let mut config = SummaryConfig::from_file(&config)?;
            if let Some(dir) = capture_dir {
                config.capture_dir = dir;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }

            let report = Pipeline::new(config)?.run()?;
            println!("✓ Summary written");
            println!("  Records: {}", report.records);
            println!("  Nodes: {}", report.nodes);
            println!("  Leaves: {}", report.leaves);
            println!("  Rows: {}", report.rows);
            println!("  Tree: {}", report.tree_file.display());
            println!("  Stats: {}", report.stats_file.display());
            if let Some(path) = &report.summary_file {
                println!("  Summary: {}", path.display());
            }
            if let Some(path) = &report.parquet_file {
                println!("  Parquet: {}", path.display());
            }
            for skipped in &report.skipped {
                println!(
                    "  Skipped: {} ({}): {}",
                    skipped.layer, skipped.metric, skipped.reason
                );
            }
        }
        Commands::Validate { config } => {
            tracing::info!("Validating configuration: {}", config);
            let config = SummaryConfig::from_file(&config)?;
            config.validate()?;
            println!("✓ Configuration is valid");
            println!("  Captures: {}", config.capture_dir);
            println!("  Metrics: {}", config.metrics.join(", "));
            println!("  Mode: {:?}", config.reduce.mode);
        }
        Commands::Init { output, preset } => {
            tracing::info!("Generating config for preset: {}", preset);
            let config = SummaryConfig::from_preset(&preset)?;
            config.to_file(&output)?;
            println!("✓ Configuration written to: {output}");
        }
        Commands::Tree {
            config,
            capture_dir,
        } => {
            let mut config = SummaryConfig::from_file(&config)?;
            if let Some(dir) = capture_dir {
                config.capture_dir = dir;
            }
            let pipeline = Pipeline::new(config)?;
            let records = load_all(&pipeline.config().capture_dir)?;
            let (index, _) = pipeline.build_hierarchy(&records)?;
            print!("{}", index.render());
        }
    }

    Ok(())
}
