//! Opens the Instagram picker window and prints the chosen media as JSON.

use clap::Parser;
use picker::{OutcomeDelegate, PickerController, PickerOutcome, Session};
use std::path::PathBuf;
use std::sync::Arc;
use ui::PickerFlags;

mod config;
mod logging;

#[derive(Parser)]
#[command(name = "instagram-picker", author, version, about = "Pick images from your Instagram library")]
struct Cli {
    /// Override log level (e.g. info, debug)
    #[arg(long)]
    log_level: Option<String>,
    /// Override number of parallel thumbnail downloads
    #[arg(long)]
    thumbnails_preload: Option<usize>,
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Store the access token in tokens.json under the cache path instead of the system keyring
    #[arg(long)]
    use_file_store: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let overrides = config::AppConfigOverrides {
        log_level: cli.log_level.clone(),
        page_size: None,
        thumbnails_preload: cli.thumbnails_preload,
        use_file_store: cli.use_file_store,
    };
    let cfg = config::AppConfig::load_from(cli.config.clone()).apply_overrides(&overrides);

    if !cfg.has_client_credentials() {
        eprintln!("Error: no Instagram client credentials configured.");
        eprintln!("Register an app at https://developers.facebook.com/apps/ and either set");
        eprintln!("   export INSTAGRAM_CLIENT_ID=your_client_id");
        eprintln!("   export INSTAGRAM_CLIENT_SECRET=your_client_secret");
        eprintln!("or add client_id and client_secret to {}", config::AppConfig::default_path().display());
        return Ok(());
    }

    let _guard = logging::init(&cfg.cache_path, &cfg.log_level)?;
    tracing::info!("Starting Instagram picker");

    let session = Session::new(Arc::new(cfg.authenticator())).with_page_size(cfg.page_size);
    let (delegate, mut outcomes) = OutcomeDelegate::channel();
    let controller = PickerController::new(session, Arc::new(delegate));

    ui::run(PickerFlags {
        controller,
        cache_dir: cfg.cache_path.clone(),
        preload: cfg.thumbnails_preload,
        selection_updates: None,
    })?;

    match outcomes.try_recv() {
        Ok(PickerOutcome::Finished(items)) => println!("{}", serde_json::to_string_pretty(&items)?),
        Ok(PickerOutcome::Failed(e)) => return Err(e.into()),
        Ok(PickerOutcome::Cancelled) | Err(_) => tracing::info!("Picker closed without a selection"),
    }
    Ok(())
}
