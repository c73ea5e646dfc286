/*!
Announces upcoming public assemblies on Mastodon
*/

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use clap::{Arg, ArgAction, Command, value_parser};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::core::{
    config::Settings,
    mastodon::MastodonClient,
    tracker::Announcer,
};

mod core;

/// Environment variable naming the settings file
const CONFIG_ENV: &str = "DOT_ENV";

fn cli() -> Command {
    Command::new("Assembly Announcer")
        .version(clap::crate_version!())
        .about("Posts upcoming public assemblies from the municipal feed to Mastodon")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help(format!("Settings file (YAML), defaults to ${} or env.yaml", CONFIG_ENV))
                .value_name("PATH"),
        )
        .arg(
            Arg::new("show-config")
                .long("show-config")
                .help("Print the effective settings and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("register-app")
                .long("register-app")
                .help("Register an application on the Mastodon server and print its credentials")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("watch")
                .short('w')
                .long("watch")
                .help("Repeat the run every MINUTES until interrupted")
                .value_name("MINUTES")
                .value_parser(value_parser!(u64).range(1..)),
        )
}

fn config_path(explicit: Option<&String>) -> PathBuf {
    explicit
        .cloned()
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("env.yaml"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = cli().get_matches();

    let path = config_path(matches.get_one::<String>("config"));
    let settings = match Settings::load(&path) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };
    info!("Loaded settings from {:?}", path);

    if matches.get_flag("show-config") {
        println!("{}", settings.to_yaml()?);
        return Ok(());
    }

    if matches.get_flag("register-app") {
        let client = MastodonClient::new(&settings.mastodon)?;
        let app = client.register_app(&settings.mastodon).await?;
        println!("client_id: {}", app.client_id);
        println!("client_secret: {}", app.client_secret);
        return Ok(());
    }

    let announcer = Announcer::from_settings(settings)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match matches.get_one::<u64>("watch").copied() {
        Some(minutes) => {
            info!("🚀 Watching the feed every {} minutes", minutes);
            announcer.watch(Duration::from_secs(minutes * 60), shutdown).await;
        }
        None => {
            let run = announcer.run_once(Utc::now());
            tokio::pin!(run);
            let interrupted = tokio::select! {
                result = &mut run => {
                    result?;
                    false
                }
                _ = shutdown => true,
            };
            if interrupted {
                info!("🛑 Shutdown requested, finishing the current run");
                run.await?;
            }
        }
    }

    Ok(())
}
