// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use clap::Parser;

use squat_counter::cli::args::{Cli, Commands};
use squat_counter::cli::logging::set_verbose;
use squat_counter::cli::run::run_counter;

fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run(args) => {
            set_verbose(args.verbose);
            run_counter(args);
        }
    }
}
