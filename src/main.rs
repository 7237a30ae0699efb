use clap::Parser;
use env_logger::{Builder, Env};
use log::{error, LevelFilter};

use zfs_apt_snapshot::cli::{self, Cli};

fn init_logger(verbose: bool) {
    // RUST_LOG wins unless --verbose; default is info.
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.format_timestamp(None).format_target(false).init();
}

fn main() {
    let args = Cli::parse();
    init_logger(args.verbose);

    if let Err(e) = cli::run(args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
