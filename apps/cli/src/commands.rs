//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use livepage_content::{ApiMode, ContentClient};
use livepage_core::{
    LiveUpdate, MapperConfig, PreviewRequest, PreviewSession, map_entry, run_session,
};
use livepage_shared::{AppConfig, EntryId, Locale, PageProps, init_config, load_config};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use url::Url;

/// Live updates read ahead of the session.
const UPDATE_BUFFER: usize = 16;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// livepage: page props from content store entries, with live preview.
#[derive(Parser)]
#[command(
    name = "livepage",
    version,
    about = "Render content store entries as page props and preview live edits.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch an entry and print its page props as JSON.
    Render {
        /// Entry ID to render.
        entry_id: String,

        /// Locale to fetch the entry in.
        #[arg(short, long, default_value = "en-US")]
        locale: Locale,

        /// Environment (defaults to contentful.environment from config).
        #[arg(short, long)]
        env: Option<String>,

        /// Use the preview API (drafts) and apply the locale fallback.
        #[arg(long)]
        preview: bool,
    },

    /// Open a preview session and replay live updates against it.
    Preview {
        /// Entry ID to preview (ignored when --link is given).
        entry_id: Option<String>,

        /// Locale being edited.
        #[arg(short, long)]
        locale: Option<String>,

        /// Environment (defaults to contentful.environment from config).
        #[arg(short, long)]
        env: Option<String>,

        /// Preview link carrying entry_id, env_id and locale.
        #[arg(long)]
        link: Option<Url>,

        /// JSON Lines file of live updates to apply in order.
        #[arg(short, long)]
        updates: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "livepage=info",
        1 => "livepage=debug",
        _ => "livepage=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Render {
            entry_id,
            locale,
            env,
            preview,
        } => cmd_render(&entry_id, locale, env.as_deref(), preview).await,
        Command::Preview {
            entry_id,
            locale,
            env,
            link,
            updates,
        } => {
            cmd_preview(
                entry_id.as_deref(),
                locale.as_deref(),
                env.as_deref(),
                link.as_ref(),
                updates.as_deref(),
            )
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_render(
    entry_id: &str,
    locale: Locale,
    env: Option<&str>,
    preview: bool,
) -> Result<()> {
    let config = load_config()?;
    let environment = env.unwrap_or(&config.contentful.environment);
    let mode = if preview {
        ApiMode::Preview
    } else {
        ApiMode::Delivery
    };
    let client = ContentClient::new(&config.contentful, environment, mode)?;
    let id = EntryId::from(entry_id);

    info!(entry_id, %locale, environment, preview, "rendering entry");

    let spinner = spinner(format!("Fetching {entry_id} ({locale})"))?;
    let props = if preview {
        let fetched = client.fetch_preview_pair(&id, locale).await;
        spinner.finish_and_clear();
        let (entry, shadow) = fetched?;
        PreviewSession::new(entry, Some(shadow), locale, &config).render()?
    } else {
        let fetched = client.get_entry(&id, locale).await;
        spinner.finish_and_clear();
        map_entry(&fetched?, &MapperConfig::from(&config))
    };

    let props = props.ok_or_else(|| eyre!("entry {entry_id} does not map to a page"))?;
    println!("{}", serde_json::to_string_pretty(&props)?);
    Ok(())
}

async fn cmd_preview(
    entry_id: Option<&str>,
    locale: Option<&str>,
    env: Option<&str>,
    link: Option<&Url>,
    updates: Option<&Path>,
) -> Result<()> {
    let config = load_config()?;

    let request = match link {
        Some(url) => PreviewRequest::from_url(url)?,
        None => PreviewRequest::from_parts(
            entry_id,
            Some(env.unwrap_or(&config.contentful.environment)),
            locale,
        )?,
    };

    info!(
        entry_id = %request.entry_id,
        environment = %request.environment,
        locale = %request.locale,
        path = %request.preview_path(),
        "opening preview"
    );

    let client = ContentClient::new(&config.contentful, &request.environment, ApiMode::Preview)?;

    let spinner = spinner(format!(
        "Fetching {} ({})",
        request.entry_id, request.locale
    ))?;
    let fetched = client
        .fetch_preview_pair(&request.entry_id, request.locale)
        .await;
    spinner.finish_and_clear();
    let (entry, shadow) = fetched?;

    let session = PreviewSession::new(entry, Some(shadow), request.locale, &config);

    let Some(path) = updates else {
        let props = session
            .render()?
            .ok_or_else(|| eyre!("entry {} does not map to a page", request.entry_id))?;
        println!("{}", serde_json::to_string_pretty(&props)?);
        return Ok(());
    };

    let applied = replay_updates(session, path, print_render).await?;
    info!(updates = applied, "live updates replayed");
    Ok(())
}

/// Drive `session` with the updates in `path`, calling `emit` with each
/// render the session publishes. Returns the number of updates sent.
async fn replay_updates<F>(session: PreviewSession, path: &Path, mut emit: F) -> Result<usize>
where
    F: FnMut(Option<&PageProps>) -> Result<()>,
{
    let (update_tx, update_rx) = mpsc::channel(UPDATE_BUFFER);
    let (render_tx, mut render_rx) = watch::channel(None);

    let driver = tokio::spawn(run_session(session, update_rx, render_tx));
    let feeder = tokio::spawn(feed_updates(path.to_path_buf(), update_tx));

    // the sender is dropped when the session ends
    while render_rx.changed().await.is_ok() {
        let props = render_rx.borrow_and_update().clone();
        emit(props.as_ref())?;
    }

    driver.await??;
    feeder.await?
}

/// Send each line of a JSON Lines file to the session as one live update.
/// Dropping `updates` on return closes the session.
async fn feed_updates(path: PathBuf, updates: mpsc::Sender<LiveUpdate>) -> Result<usize> {
    let contents = tokio::fs::read_to_string(&path)
        .await
        .wrap_err_with(|| format!("failed to read updates from {}", path.display()))?;

    let mut sent = 0usize;
    for (number, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let update: LiveUpdate = serde_json::from_str(line)
            .wrap_err_with(|| format!("{}:{}: invalid live update", path.display(), number + 1))?;

        if updates.send(update).await.is_err() {
            debug!(line = number + 1, "preview session ended, remaining updates dropped");
            break;
        }
        sent += 1;
    }
    Ok(sent)
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

/// One render per line; `null` when the entry no longer maps to a page.
/// Renders published faster than they are printed collapse to the latest.
fn print_render(props: Option<&PageProps>) -> Result<()> {
    println!("{}", serde_json::to_string(&props)?);
    Ok(())
}

fn spinner(message: String) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    Ok(spinner)
}
