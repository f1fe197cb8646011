use clap::Parser;
use converse_bridge::config::{config_search_paths, MIN_RECOMMENDED_KEY_LEN};
use converse_bridge::{build_router, AppState, BedrockConverseClient, GatewayConfig, SharedRequestLog};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "converse-bridge",
    about = "OpenAI- and Anthropic-compatible gateway in front of the Bedrock Converse API",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// AWS region (overrides config)
    #[arg(long)]
    region: Option<String>,

    /// AWS named profile (overrides config)
    #[arg(long)]
    profile: Option<String>,

    /// Backend model used when a requested name is unknown
    #[arg(long)]
    default_model: Option<String>,

    /// Request journal path
    #[arg(long, default_value = "converse-bridge.log")]
    log_file: PathBuf,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "converse_bridge=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = GatewayConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(host) = cli.host {
        config.bind_host = host;
    }
    if let Some(region) = cli.region {
        config.aws.region = region;
    }
    if let Some(profile) = cli.profile {
        config.aws.profile = Some(profile);
    }
    if let Some(model) = cli.default_model {
        config.default_model = model;
    }

    let api_key = config.resolve_proxy_api_key();
    match &api_key {
        None => warn!(
            env = %config.api_key_env,
            "No proxy API key set, authentication is disabled"
        ),
        Some(key) if key.len() < MIN_RECOMMENDED_KEY_LEN => warn!(
            env = %config.api_key_env,
            "Proxy API key is shorter than {} characters",
            MIN_RECOMMENDED_KEY_LEN
        ),
        Some(_) => {}
    }

    let log = SharedRequestLog::open(&cli.log_file)?;
    // drop corrupt lines and records beyond the retained window
    if let Err(e) = log.compact() {
        warn!(error = %e, "Failed to compact request journal");
    }
    let client = BedrockConverseClient::from_config(&config.aws).await;

    info!("converse-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("  Region:        {}", config.aws.region);
    info!("  Profile:       {}", config.aws.profile.as_deref().unwrap_or("(default chain)"));
    info!("  Default model: {}", config.default_model);
    info!("  Aliases:       {} configured", config.aliases.len());
    info!("  Journal:       {}", cli.log_file.display());

    log.info(
        "startup",
        format!(
            "Starting converse-bridge region={} default_model={} bind={}",
            config.aws.region,
            config.default_model,
            config.bind_addr()
        ),
    );

    let bind_addr = config.bind_addr();
    let state = Arc::new(AppState::new(config, Arc::new(client), log, api_key));
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
