use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::info;
use teloxide::Bot;

use linkdrop::commands::AppState;
use linkdrop::config::AppConfig;
use linkdrop::downloader::cache::MetadataCache;
use linkdrop::downloader::extractor::YtDlpExtractor;
use linkdrop::downloader::tool::{CommandRunner, YtDlpRunner};
use linkdrop::downloader::ytdlp::YtDlpDownloader;
use linkdrop::metadata::spotify::SpotifyCatalog;
use linkdrop::metadata::CatalogService;
use linkdrop::search::SearchManager;
use linkdrop::telegram::{self, TelegramTransport};
use linkdrop::utils::ensure_dir_exists;

#[derive(Parser, Debug)]
#[command(name = "linkdrop", version, about = "Telegram bot that downloads media, albums and playlists")]
struct Cli {
    /// Config file; defaults to <config dir>/linkdrop/config.toml when present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `download_dir`
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Overrides `ytdlp_path`
    #[arg(long)]
    ytdlp_path: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("💥 Panic: {}\n{}", panic_info, std::backtrace::Backtrace::force_capture());
    }));

    let cli = Cli::parse();
    info!("Starting linkdrop v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.download_dir {
        config.download_dir = dir;
    }
    if let Some(path) = cli.ytdlp_path {
        config.ytdlp_path = path;
    }
    config.validate()?;
    if config.telegram_bot_token.is_empty() {
        anyhow::bail!("TELEGRAM_BOT_TOKEN is not set");
    }

    ensure_dir_exists(&config.download_dir).await?;
    info!("Downloads go to {:?}", config.download_dir);

    let runner: Arc<dyn CommandRunner> =
        Arc::new(YtDlpRunner::new(config.ytdlp_path.clone()).with_timeout(config.tool_timeout()));
    let resolver = Arc::new(YtDlpExtractor::new(
        runner.clone(),
        MetadataCache::new(config.metadata_cache_ttl()),
    ));
    let search = Arc::new(SearchManager::from_kinds(&config.search_platforms, runner.clone()));
    info!("Search fallback order: {}", search.get_available_sources().join(" -> "));
    let downloader = Arc::new(YtDlpDownloader::new(runner, config.download_dir.clone()));

    let catalog: Option<Arc<dyn CatalogService>> = match config.spotify_credentials() {
        Some((id, secret)) => Some(Arc::new(SpotifyCatalog::new(id, secret)?)),
        None => {
            log::warn!("⚠️ Spotify credentials missing, Spotify links will be refused");
            None
        }
    };

    let bot = Bot::new(config.telegram_bot_token.clone());
    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let state = Arc::new(AppState::new(config, transport, resolver, search, downloader, catalog));

    info!("Bot is running");
    telegram::run_dispatcher(bot, state).await;
    info!("Bot stopped");
    Ok(())
}
