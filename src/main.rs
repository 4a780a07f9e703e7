mod briefs;
mod channels;
mod clock;
mod config;
mod core;
mod daemon;
mod db;
mod instantiator;
mod recurrence;
mod scheduler;
mod state;
mod streaks;
mod traits;

#[cfg(test)]
mod testing;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

pub(crate) const CONFIG_ENV: &str = "HABITD_CONFIG";

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Tracing goes to stderr so `habitd tick` output stays parseable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config_path = std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Handle CLI arguments
    let args: Vec<String> = std::env::args().collect();
    let mut run_tick = false;
    if args.len() > 1 {
        match args[1].as_str() {
            "--version" | "-V" => {
                println!("habitd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "install-service" => {
                return daemon::install_service(&config_path);
            }
            "tick" => run_tick = true,
            other => {
                eprintln!("Unknown command: '{}'\n", other);
                print_help();
                std::process::exit(2);
            }
        }
    }

    let config = config::AppConfig::load_or_default(&config_path)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    if run_tick {
        let report = runtime.block_on(crate::core::run_once(config))?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    runtime.block_on(crate::core::run(config))
}

fn print_help() {
    println!("habitd {}", env!("CARGO_PKG_VERSION"));
    println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
    println!("Usage: habitd [COMMAND]\n");
    println!("Commands:");
    println!("  (none)            Run the daemon: scheduler loop and HTTP server");
    println!("  tick              Run one scheduler tick and exit");
    println!("  install-service   Install as a systemd service");
    println!("\nOptions:");
    println!("  -h, --help       Print help");
    println!("  -V, --version    Print version");
    println!("\nEnvironment:");
    println!("  {}     Config file path (default: config.toml)", CONFIG_ENV);
    println!("  RUST_LOG          Log filter (default: info)");
}
