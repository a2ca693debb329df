mod run_list;
mod run_simulate;

use run_list::*;
use run_simulate::*;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "lupin")]
#[command(about = "Variational multi-view, multi-group factor models: simulate, save and inspect")]
struct Cli {
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a Gaussian factor model and save it as a trained model
    Simulate(SimulateArgs),
    /// List the group and dataset tree of a saved model
    List(ListArgs),
    /// Summarise views, groups, options and the training trace
    Summary(SummaryArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    match &cli.commands {
        Commands::Simulate(args) => {
            run_simulate(args)?;
        }
        Commands::List(args) => {
            run_list(args)?;
        }
        Commands::Summary(args) => {
            run_summary(args)?;
        }
    }

    Ok(())
}
