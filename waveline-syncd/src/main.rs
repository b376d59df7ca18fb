use std::path::PathBuf;

use tracing_subscriber::EnvFilter;
use waveline_syncd::config::SyncConfig;
use waveline_syncd::daemon::{self, DaemonRuntime};

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Run,
    Add(Vec<PathBuf>),
    Remove(Vec<PathBuf>),
    List,
    Connect { server: String, api_key: String },
    Disconnect,
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().skip(1);
    let Some(flag) = args.next() else {
        return Ok(CliMode::Run);
    };
    let rest: Vec<String> = args.collect();
    let mode = match flag.as_str() {
        "--add" | "--remove" => {
            if rest.is_empty() {
                anyhow::bail!("{flag} needs at least one directory");
            }
            let dirs = rest.into_iter().map(PathBuf::from).collect();
            if flag == "--add" {
                CliMode::Add(dirs)
            } else {
                CliMode::Remove(dirs)
            }
        }
        "--connect" => match <[String; 2]>::try_from(rest) {
            Ok([server, api_key]) => CliMode::Connect { server, api_key },
            Err(_) => anyhow::bail!("--connect needs SERVER and KEY"),
        },
        "--list" | "--disconnect" | "--help" | "-h" if !rest.is_empty() => {
            anyhow::bail!("unexpected argument after {flag}: {}", rest[0])
        }
        "--list" => CliMode::List,
        "--disconnect" => CliMode::Disconnect,
        "--help" | "-h" => CliMode::Help,
        other => anyhow::bail!("unknown argument: {other}"),
    };
    Ok(mode)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let mode = parse_cli_mode(std::env::args())?;
    let config = SyncConfig::from_env();
    match mode {
        CliMode::Run => {}
        CliMode::Add(dirs) => {
            for root in daemon::add_roots(&config, &dirs)? {
                println!("{}", root.display());
            }
            return Ok(());
        }
        CliMode::Remove(dirs) => {
            for root in daemon::remove_roots(&config, &dirs) {
                println!("{}", root.display());
            }
            return Ok(());
        }
        CliMode::List => {
            for root in daemon::list_roots(&config) {
                println!("{}", root.display());
            }
            return Ok(());
        }
        CliMode::Connect { server, api_key } => {
            let connection = daemon::connect(&config, &server, &api_key).await?;
            println!("connected to {}", connection.server);
            return Ok(());
        }
        CliMode::Disconnect => {
            daemon::disconnect(&config)?;
            println!("disconnected; watch roots cleared");
            return Ok(());
        }
        CliMode::Help => {
            println!("Usage: waveline-syncd [--add DIR... | --remove DIR... | --list");
            println!("                       | --connect SERVER KEY | --disconnect]");
            println!("  (no flag)              Watch the saved roots and upload new audio files");
            println!("  --add DIR...           Add watch roots");
            println!("  --remove DIR...        Remove watch roots");
            println!("  --list                 Print watch roots");
            println!("  --connect SERVER KEY   Check and save the sync server connection");
            println!("  --disconnect           Forget the API key and all watch roots");
            return Ok(());
        }
    }

    let daemon = DaemonRuntime::bootstrap(config).await?;
    daemon.run().await
}
