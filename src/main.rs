use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use checkroom::build_info;
use checkroom::collector::Collector;
use checkroom::depot::Depot;
use checkroom::error::Result;
use checkroom::name::Tracking;
use checkroom::output::{self, Format, StatusRow};
use checkroom::servant::FsServant;

#[derive(Parser)]
#[command(
    name = "checkroom",
    version,
    long_version = &*build_info::long_version().leak(),
    about = "Claim-check agent: file lifecycles encoded in filenames"
)]
struct Cli {
    /// Depot root directory
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    format: Format,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a depot in the root directory
    Init,
    /// Externalize a message body into the depot
    CheckIn {
        /// Body file to externalize
        body: PathBuf,
        /// Tracking mode for the new data file
        #[arg(long, value_enum, default_value = "check")]
        mode: Tracking,
        /// Mark the data file as a response
        #[arg(long)]
        response: bool,
    },
    /// Run collector passes over the depot
    Collect {
        /// Number of passes to run
        #[arg(long, default_value_t = 1)]
        passes: u32,
    },
    /// Show every data file and its lifecycle state
    Status,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error[{}]: {err}", err.code());
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init => {
            let depot = Depot::init(&cli.root)?;
            println!("initialized checkroom depot in {}", depot.root().display());
        }
        Commands::CheckIn {
            body,
            mode,
            response,
        } => {
            let depot = Depot::open(&cli.root)?;
            let file = depot.check_in(&body, mode, response)?;
            println!("{}", file.name());
        }
        Commands::Collect { passes } => {
            let depot = Depot::open(&cli.root)?;
            let servant = FsServant::new(depot.ledger()?);
            let collector = Collector::new(&depot, &servant);
            for _ in 0..passes {
                let summary = collector.run_pass()?;
                output::print_summary(&summary, cli.format)?;
            }
        }
        Commands::Status => {
            let depot = Depot::open(&cli.root)?;
            let ledger = depot.ledger()?;
            let rows = depot
                .scan()?
                .iter()
                .map(|file| {
                    Ok(StatusRow::from_file(
                        file,
                        ledger.contains(&file.name().token())?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            output::print_rows(&rows, cli.format)?;
        }
    }
    Ok(())
}
