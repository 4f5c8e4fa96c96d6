use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use furrow::config::FurrowConfig;
use furrow::oauth::{generate_state, TokenStatus};
use furrow::pagination::PageFetcher;
use furrow::resources::DeereApi;
use furrow::{AccessTokenSource, CredentialStore, TokenManager};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "furrow", version, about = "John Deere Operations Center API client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the authorization URL to open in a browser
    AuthUrl,
    /// Exchange a one-time authorization code for the initial token set
    Bootstrap {
        /// Code delivered to the redirect URI
        code: String,
    },
    /// Show the stored token's state without contacting the server
    Status,
    /// Make sure the stored token is valid, refreshing it if needed
    Refresh,
    /// Fetch every page of a collection and print it as JSON
    Fetch {
        /// Path under the API base URL, or an absolute URL
        endpoint: String,
        /// Extra query parameter, repeatable
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// Items per page (defaults to the configured page size)
        #[arg(long)]
        page_size: Option<u32>,
    },
    /// List organizations that still need the user to grant access
    Connections,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "furrow=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = FurrowConfig::load().context("Failed to load configuration")?;

    info!(
        base_url = %config.api.base_url,
        token_file = %config.storage.token_file.display(),
        "Configuration loaded"
    );

    let http_client = config.api.http_client()?;
    let manager = Arc::new(TokenManager::new(
        CredentialStore::new(&config.storage.token_file),
        config.oauth.clone(),
        http_client.clone(),
    ));

    match cli.command {
        Command::AuthUrl => {
            if config.oauth.client_id.is_empty() {
                return Err(anyhow!("FURROW_CLIENT_ID is not set"));
            }
            let state = generate_state();
            println!("{}", config.oauth.build_auth_url(&state));
            if let Some(port) = config.oauth.redirect_port() {
                info!(port, state = %state, "Callback expected on local redirect port");
            }
        }
        Command::Bootstrap { code } => {
            config.validate()?;
            let credential = manager.bootstrap(&code).await?;
            println!(
                "Authorized; access token valid for {}s, saved to {}",
                credential.expires_in,
                manager.store().path().display()
            );
        }
        Command::Status => match manager.status()? {
            TokenStatus::Missing => println!("No usable token stored; run `furrow bootstrap`"),
            TokenStatus::Valid { remaining } => {
                println!("Valid for {}s", remaining.num_seconds())
            }
            TokenStatus::Expiring { remaining } => println!(
                "Expiring ({}s left); the next request refreshes it",
                remaining.num_seconds()
            ),
        },
        Command::Refresh => {
            config.validate()?;
            let credential = manager.get_valid_credential().await?;
            println!("Valid; expires_in={}s", credential.expires_in);
        }
        Command::Fetch {
            endpoint,
            params,
            page_size,
        } => {
            config.validate()?;
            let fetcher = platform_fetcher(&config, http_client, manager.clone());
            let params: Vec<(&str, &str)> = params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            let collection: furrow::ResourceCollection<serde_json::Value> = fetcher
                .fetch_all(
                    &endpoint,
                    &params,
                    page_size.unwrap_or(config.api.page_size),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&collection)?);
        }
        Command::Connections => {
            config.validate()?;
            let api = DeereApi::from_config(&config.api, http_client, manager.clone());
            let pending = api.pending_connections(&config.oauth.redirect_uri).await?;
            if pending.is_empty() {
                println!("All organizations are connected");
            }
            for (org, url) in pending {
                println!("{} ({}): {}", org.name, org.id, url);
            }
        }
    }

    Ok(())
}

fn platform_fetcher(
    config: &FurrowConfig,
    http_client: reqwest::Client,
    tokens: Arc<dyn AccessTokenSource>,
) -> PageFetcher {
    PageFetcher::new(http_client, config.api.base_url.clone(), tokens)
        .with_page_delay(config.api.page_delay())
        .with_accept(config.api.accept.clone())
}
