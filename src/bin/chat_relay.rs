//! CLI binary for chat-relay.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use chat_relay::config::ProviderKind;
use chat_relay::{ChatClient, ChatServer, ClientError, RelayConfig};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Streamed chat completions with out-of-band notification.
#[derive(Parser)]
#[command(name = "chat-relay", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay server.
    Serve {
        /// Override `server.host`.
        #[arg(long)]
        host: Option<String>,
        /// Override `server.port`.
        #[arg(long)]
        port: Option<u16>,
        /// Override `provider.kind`.
        #[arg(long, value_enum)]
        provider: Option<ProviderArg>,
    },

    /// Chat with a running relay from the terminal.
    Chat {
        /// Chat endpoint URL (defaults to the configured server address).
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Write the default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    Openai,
    Scripted,
}

impl From<ProviderArg> for ProviderKind {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Openai => ProviderKind::OpenAi,
            ProviderArg::Scripted => ProviderKind::Scripted,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so chat output on stdout stays clean.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_relay=info,hyper=warn,reqwest=warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = RelayConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Serve {
            host,
            port,
            provider,
        } => run_serve(config, host, port, provider).await,
        Command::Chat { endpoint } => {
            let endpoint = endpoint.unwrap_or_else(|| {
                format!(
                    "http://{}:{}{}",
                    config.server.host, config.server.port, config.server.chat_path
                )
            });
            run_chat(endpoint).await
        }
        Command::InitConfig { force } => {
            let path = cli
                .config
                .unwrap_or_else(RelayConfig::default_config_path);
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            RelayConfig::default().save_to_file(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

async fn run_serve(
    mut config: RelayConfig,
    host: Option<String>,
    port: Option<u16>,
    provider: Option<ProviderArg>,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(provider) = provider {
        config.provider.kind = provider.into();
    }

    let pipeline = config.build_pipeline().context("building pipeline")?;
    let mut server = ChatServer::start(pipeline, &config.server).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received Ctrl+C, shutting down..."),
        () = server.wait() => {}
    }
    server.shutdown();
    Ok(())
}

async fn run_chat(endpoint: String) -> anyhow::Result<()> {
    println!("chat-relay v{} -> {endpoint}", env!("CARGO_PKG_VERSION"));
    println!("Type a message and press Enter. /retry resends a failed message, Ctrl+D quits.\n");

    let mut client = ChatClient::new(endpoint);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let mut stdout = std::io::stdout();
        let print_chunk = |chunk: &str| {
            let _ = write!(stdout, "{chunk}");
            let _ = stdout.flush();
        };

        let result = if line.trim() == "/retry" {
            client.retry_streaming(print_chunk).await.map(|_| ())
        } else {
            client.send_streaming(&line, print_chunk).await.map(|_| ())
        };

        match result {
            Ok(()) => println!("\n"),
            Err(ClientError::EmptyInput) => {}
            Err(e) => eprintln!("\nerror: {e}"),
        }
    }

    Ok(())
}
