use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "parla")]
#[command(about = "WhatsApp announcement and auto-reply gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the webhook server (verification, auto-reply, /generate-video).
    /// Sends the startup announcement first when contacts are configured.
    Serve {
        /// Config file path (default: PARLA_CONFIG_PATH or ~/.parla/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 5000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Fetch the contact CSV and send the announcement template once, without serving.
    Announce {
        /// Config file path (default: PARLA_CONFIG_PATH or ~/.parla/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Send a single message to one number (template unless --text is given).
    Send {
        /// Config file path (default: PARLA_CONFIG_PATH or ~/.parla/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Destination phone number
        #[arg(long)]
        to: String,

        /// Free-text body; when omitted, the configured template is sent
        #[arg(long)]
        text: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("parla {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Announce { config }) => {
            if let Err(e) = run_announce(config).await {
                log::error!("announce failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Send { config, to, text }) => {
            if let Err(e) = run_send(config, to, text).await {
                log::error!("send failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting webhook server on {}:{}",
        config.gateway.bind,
        config.gateway.port
    );
    lib::gateway::run_gateway(config).await
}

fn whatsapp_channel(config: &lib::config::Config) -> anyhow::Result<lib::channels::WhatsAppChannel> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;
    Ok(lib::channels::WhatsAppChannel::new(
        lib::config::resolve_meta_token(config),
        lib::config::resolve_phone_number_id(config),
        config.whatsapp.api_base.clone(),
        client,
    ))
}

async fn run_announce(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = lib::config::load_config(config_path)?;
    let url = lib::config::resolve_contacts_url(&config)
        .ok_or_else(|| anyhow::anyhow!("no contact source configured (contacts.url or CONTACTS_URL)"))?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;
    let contacts = lib::contacts::fetch_contacts(&client, &url, &config.contacts.column).await?;
    let channel = whatsapp_channel(&config)?;
    lib::contacts::announce(
        &channel,
        &contacts,
        &lib::config::resolve_template_name(&config),
        &lib::config::resolve_template_lang(&config),
    )
    .await;
    Ok(())
}

async fn run_send(
    config_path: Option<PathBuf>,
    to: String,
    text: Option<String>,
) -> anyhow::Result<()> {
    let config = lib::config::load_config(config_path)?;
    let channel = whatsapp_channel(&config)?;
    let result = match text {
        Some(body) => channel.send_text(&to, &body).await,
        None => {
            channel
                .send_template(
                    &to,
                    &lib::config::resolve_template_name(&config),
                    &lib::config::resolve_template_lang(&config),
                )
                .await
        }
    };
    result.map_err(|e| anyhow::anyhow!(e))
}
