use std::process::ExitCode;

use clap::Parser;

use filterfe::cli::{self, CliArgs};
use filterfe::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    logger::init(args.verbose);
    log::info!(
        "FilterFE {} on {} threads",
        env!("CARGO_PKG_VERSION"),
        rayon::current_num_threads()
    );
    cli::run(args)
}
