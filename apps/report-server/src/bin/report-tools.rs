//! Token bootstrap and offline whiteboard extraction

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use cloud_integrations::dropbox;
use cloud_integrations::mural::{extract_to_files, wait_for_callback, MuralClient};
use cloud_integrations::update_env_file;
use report_server::config::Credentials;
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "report-tools")]
#[command(about = "OAuth token bootstrap and whiteboard extraction for the report server")]
struct Cli {
    /// `.env` file that receives new tokens
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authorize Dropbox offline access and store the refresh token
    DropboxAuth,
    /// Refresh the Dropbox token and show the account it belongs to
    DropboxCheck,
    /// Run the Mural authorization-code flow through a local redirect listener
    MuralAuth {
        /// Seconds to wait for the browser redirect
        #[arg(long, default_value = "120")]
        timeout_secs: u64,
    },
    /// Exchange the stored Mural refresh token for a new access token
    MuralRefresh,
    /// Show the Mural user behind the stored token, refreshing it if rejected
    MuralCheck,
    /// Fetch a board and write the report JSON and Excel workbook
    MuralExtract {
        /// Board id; defaults to MURAL_ID
        #[arg(long)]
        mural_id: Option<String>,

        /// Output directory
        #[arg(long, default_value = "mural_data")]
        out_dir: PathBuf,
    },
}

fn prompt_line(message: &str) -> anyhow::Result<String> {
    print!("{}", message);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn dropbox_auth(credentials: &Credentials, env_file: &Path) -> anyhow::Result<()> {
    let config = &credentials.dropbox;
    if config.app_key.is_empty() || config.app_secret.is_empty() {
        bail!("DROPBOX_APP_KEY and DROPBOX_APP_SECRET must be set");
    }

    let url = dropbox::authorize_url(&config.app_key)?;
    println!("Open this URL, approve access, and paste the code below:\n\n  {}\n", url);
    let code = prompt_line("Authorization code: ")?;
    if code.is_empty() {
        bail!("no authorization code entered");
    }

    let token = dropbox::exchange_code(&config.app_key, &config.app_secret, &code).await?;
    let refresh = token
        .refresh_token
        .clone()
        .context("Dropbox returned no refresh token; was token_access_type=offline honoured?")?;
    update_env_file(
        env_file,
        &[
            ("DROPBOX_REFRESH_TOKEN", refresh.as_str()),
            ("DROPBOX_TOKEN", token.access_token.as_str()),
        ],
    )?;
    info!("Dropbox tokens written to {}", env_file.display());
    Ok(())
}

async fn dropbox_check(credentials: Credentials) -> anyhow::Result<()> {
    let client = dropbox::DropboxClient::new(credentials.dropbox)?;
    let account = client.check_connection().await?;
    println!("Dropbox connection OK");
    println!("  Name:    {}", account.display_name());
    println!("  Email:   {}", account.email.as_deref().unwrap_or("-"));
    println!("  Account: {}", account.account_id);
    Ok(())
}

fn mural_token_updates<'a>(
    access: &'a str,
    refresh: Option<&'a str>,
) -> Vec<(&'static str, &'a str)> {
    let mut updates = vec![("MURAL_ACCESS_TOKEN", access)];
    if let Some(refresh) = refresh {
        updates.push(("MURAL_REFRESH_TOKEN", refresh));
    }
    updates
}

async fn mural_auth(
    credentials: Credentials,
    env_file: &Path,
    timeout: Duration,
) -> anyhow::Result<()> {
    if !credentials.mural.has_client_credentials() {
        bail!("MURAL_CLIENT_ID and MURAL_CLIENT_SECRET must be set");
    }
    let client = MuralClient::new(credentials.mural)?;
    let state = Uuid::new_v4().simple().to_string();
    let url = client.authorize_url(&state)?;
    println!("Open this URL to authorize access:\n\n  {}\n", url);

    let code = wait_for_callback(&client.config().redirect_uri, &state, timeout).await?;
    let token = client.exchange_code(&code).await?;
    update_env_file(
        env_file,
        &mural_token_updates(&token.access_token, token.refresh_token.as_deref()),
    )?;
    info!("Mural tokens written to {}", env_file.display());
    Ok(())
}

async fn mural_refresh(credentials: Credentials, env_file: &Path) -> anyhow::Result<()> {
    let client = MuralClient::new(credentials.mural)?;
    let token = client.refresh().await?;
    update_env_file(
        env_file,
        &mural_token_updates(&token.access_token, token.refresh_token.as_deref()),
    )?;
    info!("Refreshed Mural tokens written to {}", env_file.display());
    Ok(())
}

async fn mural_check(credentials: Credentials, env_file: &Path) -> anyhow::Result<()> {
    let stored = credentials.mural.access_token.clone();
    let client = MuralClient::new(credentials.mural)?;
    let user = client.identity().await?;
    println!("Mural connection OK");
    println!("{}", serde_json::to_string_pretty(&user)?);

    if let Some(current) = client.access_token().await {
        if stored.as_deref() != Some(current.as_str()) {
            update_env_file(env_file, &[("MURAL_ACCESS_TOKEN", current.as_str())])?;
            info!("Refreshed Mural access token written to {}", env_file.display());
        }
    }
    Ok(())
}

async fn mural_extract(
    credentials: Credentials,
    mural_id: Option<String>,
    out_dir: PathBuf,
) -> anyhow::Result<()> {
    let mural_id = mural_id
        .or_else(|| credentials.mural.mural_id.clone())
        .context("pass --mural-id or set MURAL_ID")?;
    let title = credentials.mural.mural_title.clone();
    let client = MuralClient::new(credentials.mural)?;

    let extraction = extract_to_files(&client, &mural_id, &title, &out_dir).await?;
    println!("Notes extracted: {}", extraction.notes_total);
    for (color, count) in extraction.report.counts() {
        println!("  {:<9} {}", color, count);
    }
    println!("JSON:  {}", extraction.json_path.display());
    println!("Excel: {}", extraction.excel_path.display());
    println!("Text:  {}", extraction.text_path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = dotenvy::from_path(&cli.env_file) {
        warn!("Could not load {}: {}", cli.env_file.display(), e);
    }
    let credentials = Credentials::from_env();

    match cli.command {
        Command::DropboxAuth => dropbox_auth(&credentials, &cli.env_file).await,
        Command::DropboxCheck => dropbox_check(credentials).await,
        Command::MuralAuth { timeout_secs } => {
            mural_auth(credentials, &cli.env_file, Duration::from_secs(timeout_secs)).await
        }
        Command::MuralRefresh => mural_refresh(credentials, &cli.env_file).await,
        Command::MuralCheck => mural_check(credentials, &cli.env_file).await,
        Command::MuralExtract { mural_id, out_dir } => {
            mural_extract(credentials, mural_id, out_dir).await
        }
    }
}
