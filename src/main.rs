use clap::{Parser, Subcommand};
use collision_etl::config::Config;
use collision_etl::logging;
use collision_etl::pipeline::{DatasetSummary, Pipeline};
use collision_etl::types::Dataset;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "collision_etl")]
#[command(about = "NYC Open Data collision ETL: crash, vehicle, and person datasets")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output directory for CSV files (overrides config.toml)
    #[arg(long)]
    output_dir: Option<String>,

    /// Rows per page request (overrides config.toml)
    #[arg(long)]
    limit: Option<u64>,

    /// Delay between page requests in milliseconds (overrides config.toml)
    #[arg(long)]
    delay_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: fetch, reconcile, transform, and join all
    /// three datasets
    Run,
    /// Fetch and reconcile a single dataset, writing its raw CSV only
    Fetch {
        /// Dataset to fetch: crash, vehicle, or person
        #[arg(long)]
        dataset: String,
    },
}

fn print_summary(summary: &DatasetSummary) {
    println!(
        "   {}: {} pages, {} rows, {} duplicates audited",
        summary.dataset, summary.pages, summary.rows, summary.duplicates
    );
    if let Some(err) = &summary.transport_error {
        println!("   {}: fetch ended early: {}", summary.dataset, err);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(output_dir) = cli.output_dir {
        config.output_dir = output_dir;
    }
    if let Some(limit) = cli.limit {
        config.page_limit = limit;
    }
    if let Some(delay_ms) = cli.delay_ms {
        config.delay_ms = delay_ms;
    }

    let pipeline = Pipeline::new(config);
    match cli.command {
        Commands::Run => {
            info!("🎬 Starting collision crash, vehicle, and person ETL pipeline...");
            let result = pipeline.run().await?;
            println!("\n📊 Pipeline results:");
            for summary in &result.datasets {
                print_summary(summary);
            }
            println!(
                "   joined: {} rows -> {}",
                result.joined_rows,
                result.output_file.display()
            );
            info!("✅ Completed collision ETL pipeline.");
        }
        Commands::Fetch { dataset } => {
            let Some(dataset) = Dataset::from_arg(&dataset) else {
                error!("Unknown dataset '{}'", dataset);
                eprintln!("Unknown dataset '{dataset}'. Expected crash, vehicle, or person.");
                std::process::exit(1);
            };
            let summary = pipeline.run_fetch(dataset).await?;
            println!("\n📊 Fetch results:");
            print_summary(&summary);
        }
    }

    Ok(())
}
