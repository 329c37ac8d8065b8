use api_client::ApiClient;
use clap::{Parser, Subcommand};
use picker::{OutcomeDelegate, PickerController, PickerOutcome, PickerState, Session};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

#[path = "../config.rs"]
mod config;
#[path = "../logging.rs"]
mod logging;

#[derive(Parser)]
#[command(name = "picker_cli", author, version, about = "Instagram picker command line client")]
struct Cli {
    /// Override log level (e.g. info, debug)
    #[arg(long)]
    log_level: Option<String>,
    /// Override the number of media items requested per page
    #[arg(long)]
    page_size: Option<u32>,
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Store the access token in tokens.json under the cache path instead of the system keyring
    #[arg(long)]
    use_file_store: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize with Instagram in the browser and cache the token
    Login,
    /// Forget the cached token
    Logout,
    /// Show whether a token is cached and when it expires
    Status,
    /// List recent media
    List {
        /// Maximum number of items to display
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },
    /// Select media by id without opening a window and print the selection as JSON
    Pick {
        /// Media ids, in the order they should be selected
        #[arg(long = "id", required = true)]
        ids: Vec<String>,
    },
    /// Print the effective configuration
    Config {
        /// Write it back to the config file
        #[arg(long)]
        write: bool,
    },
}

#[cfg_attr(feature = "trace-spans", tracing::instrument)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let overrides = config::AppConfigOverrides {
        log_level: cli.log_level.clone(),
        page_size: cli.page_size,
        thumbnails_preload: None,
        use_file_store: cli.use_file_store,
    };
    let cfg = config::AppConfig::load_from(cli.config.clone()).apply_overrides(&overrides);
    let _guard = logging::init(&cfg.cache_path, &cfg.log_level)?;

    let auth = Arc::new(cfg.authenticator());

    match cli.command {
        Commands::Login => {
            if !cfg.has_client_credentials() {
                return Err("client_id and client_secret must be configured".into());
            }
            let cred = auth.authorize().await?;
            println!("Logged in as user {}", cred.user_id.as_deref().unwrap_or("unknown"));
        }
        Commands::Logout => {
            auth.logout()?;
            println!("Logged out");
        }
        Commands::Status => match auth.cached_credential()? {
            None => println!("Not logged in"),
            Some(cred) => {
                println!("Logged in as user {}", cred.user_id.as_deref().unwrap_or("unknown"));
                match cred.expires_at {
                    Some(exp) if cred.is_expired(chrono::Utc::now()) => println!("Token expired at {}", exp.to_rfc3339()),
                    Some(exp) => println!("Token expires at {}", exp.to_rfc3339()),
                    None => println!("Token expiry unknown"),
                }
            }
        },
        Commands::List { limit } => {
            let cred = auth.ensure_credential().await?;
            let client = ApiClient::with_base_url(cred.access_token, cfg.graph_url.clone());
            let mut after: Option<String> = None;
            let mut shown = 0;
            while shown < limit {
                let page = client.list_media(cfg.page_size, after.as_deref()).await?;
                for item in page.items.iter().take(limit - shown) {
                    let ts = item.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default();
                    let url = item.preview_url().unwrap_or("-");
                    println!("{}  {:?}  {}  {}", item.id, item.media_type, ts, url);
                    shown += 1;
                }
                match page.next_cursor {
                    Some(cursor) => after = Some(cursor),
                    None => break,
                }
            }
            if shown == 0 {
                println!("No media found");
            }
        }
        Commands::Pick { mut ids } => {
            // A repeated id would toggle the item back off.
            let mut seen = HashSet::new();
            ids.retain(|id| seen.insert(id.clone()));

            let session = Session::new(auth).with_page_size(cfg.page_size);
            let (delegate, mut rx) = OutcomeDelegate::channel();
            let mut picker = PickerController::new(session, Arc::new(delegate));

            let step = picker.start();
            picker.drive(step).await;
            // Page until every requested id is loaded or the library is exhausted.
            while picker.state() == &PickerState::Ready
                && picker.has_more()
                && !ids.iter().all(|id| picker.media().iter().any(|m| &m.id == id))
            {
                let step = picker.load_more();
                picker.drive(step).await;
            }

            if picker.state() == &PickerState::Ready {
                for id in &ids {
                    if !picker.toggle(id) {
                        tracing::warn!("Media item {} is not available for picking", id);
                    }
                }
                picker.finish();
            }

            match rx.recv().await {
                Some(PickerOutcome::Finished(items)) => println!("{}", serde_json::to_string_pretty(&items)?),
                Some(PickerOutcome::Failed(e)) => return Err(e.into()),
                Some(PickerOutcome::Cancelled) | None => println!("[]"),
            }
        }
        Commands::Config { write } => {
            let mut shown = cfg.clone();
            if !shown.client_secret.is_empty() {
                shown.client_secret = "********".into();
            }
            print!("{}", toml::to_string(&shown)?);
            if write {
                cfg.save_to(cli.config.clone())?;
                println!("Configuration saved");
            }
        }
    }

    Ok(())
}
