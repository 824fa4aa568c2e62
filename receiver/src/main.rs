//! Webhook Receiver - Entry Point
//!
//! Listens for signed push notifications and runs the configured deployment
//! script for pushes to the primary branch.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use colored::Colorize;
use webhook_receiver::app::options::AppOptions;
use webhook_receiver::app::run::run;
use webhook_receiver::filesys::dir::Dir;
use webhook_receiver::filesys::file::File;
use webhook_receiver::logs::{init_logging, LogOptions};
use webhook_receiver::storage::settings::Settings;
use webhook_receiver::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{json}"),
            Err(_) => println!("{}", version.version),
        }
        return ExitCode::SUCCESS;
    }

    // Load settings
    let config_file = cli_args.get("config").map(File::new);
    let settings = match Settings::load(config_file.as_ref()).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to load settings: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli_args.contains_key("check-config") {
        return check_config(&settings).await;
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.json_logs,
        log_dir: Some(settings.log_dir.clone()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    let allow_placeholder = cli_args.contains_key("allow-placeholder-secret");
    let options = match AppOptions::from_settings(&settings, allow_placeholder) {
        Ok(options) => options,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Running webhook receiver with settings: {:?}", settings);
    match run(version.version, options, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Webhook receiver stopped with an error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn check_config(settings: &Settings) -> ExitCode {
    let mut ready = true;

    println!("{}", "Webhook receiver configuration".bold());

    if settings.uses_placeholder_secret() {
        ready = false;
        println!("  {} webhook secret is unset or the placeholder", "FAIL".red());
    } else {
        println!("  {} webhook secret is set", "OK".green());
    }

    if File::new(&settings.deploy_script).exists().await {
        println!(
            "  {} deployment script {}",
            "OK".green(),
            settings.deploy_script.display()
        );
    } else {
        ready = false;
        println!(
            "  {} deployment script {} not found",
            "FAIL".red(),
            settings.deploy_script.display()
        );
    }

    match Dir::new(&settings.log_dir).create().await {
        Ok(()) => println!(
            "  {} log directory {}",
            "OK".green(),
            settings.log_dir.display()
        ),
        Err(e) => {
            ready = false;
            println!(
                "  {} log directory {}: {}",
                "FAIL".red(),
                settings.log_dir.display(),
                e
            );
        }
    }

    if let Err(e) = settings.validate() {
        ready = false;
        println!("  {} {}", "FAIL".red(), e);
    }

    println!(
        "  {} listening on {}:{}, deploying {} with a {}s timeout",
        "INFO".cyan(),
        settings.server.host,
        settings.server.port,
        settings.branch_ref,
        settings.deploy_timeout_secs
    );

    if ready {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Unable to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
