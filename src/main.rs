use std::env;

use clap::Parser;
use strategy_core::api::{ReportCli, run_http_server, run_report};
use strategy_core::config::{ServeConfig, init_tracing};

const USAGE: &str = "Usage: strategy-core serve [port] [--data-file PATH] [--autosave-ms MS]\n       strategy-core report [--file PATH] [--market-crash PCT] [--interest-hike PCT] [--expanded]";

#[tokio::main]
async fn main() {
    init_tracing();

    let raw_args: Vec<String> = env::args().collect();
    let code = run(&raw_args).await;
    if code != 0 {
        std::process::exit(code);
    }
}

async fn run(raw_args: &[String]) -> i32 {
    match raw_args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            let config = ServeConfig::parse_from(&raw_args[1..]);
            if let Err(e) = config.validate() {
                eprintln!("{e}");
                return 1;
            }
            if let Err(e) = run_http_server(config).await {
                eprintln!("Server error: {e}");
                return 1;
            }
            0
        }
        Some("report") => match run_report(ReportCli::parse_from(&raw_args[1..])) {
            Ok(json) => {
                println!("{json}");
                0
            }
            Err(e) => {
                eprintln!("{e}");
                1
            }
        },
        _ => {
            eprintln!("{USAGE}");
            1
        }
    }
}
