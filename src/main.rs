use clap::Parser;
use tacvm::driver::{execute, Config};

fn main() {
    let config = Config::parse();
    let level = if config.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_module("tacvm", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();

    if let Err(err) = execute(&config) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
