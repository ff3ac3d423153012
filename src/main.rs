use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio::sync::{broadcast, mpsc};

use ev_board::config::loader;
use ev_board::config::types::{AppConfig, ScreenSection};
use ev_board::engine::{BackendClient, HttpQuery, MessageSink, QueryBackend};
use ev_board::notify::NotificationHub;
use ev_board::screen::{self, ConfiguredScreen};
use ev_board::table::{Page, TableEvent};
use ev_board::types::{FilterValue, RawEvent, Record, Sorting};

#[derive(Parser)]
#[command(name = "ev-board", version, about = "EV-charging back-office list screens")]
struct Cli {
    /// Path to config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging to debug.log.
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the configured screens.
    Screens,
    /// Fetch one page of a screen and print its rows as JSON lines.
    List {
        /// Screen title.
        screen: String,
        /// One-based page number.
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long)]
        search: Option<String>,
        /// `field` or `field:desc`.
        #[arg(long)]
        sort: Option<Sorting>,
        /// `key=value`, several values separated by `|`. Repeatable.
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, FilterValue)>,
    },
    /// Mount a screen, keep it live and print every change.
    Watch {
        /// Screen title.
        screen: String,
        /// Read push events (`{"event": "sites"}`) as JSON lines from stdin.
        #[arg(long)]
        events_stdin: bool,
    },
}

fn parse_filter(s: &str) -> Result<(String, FilterValue), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    if key.is_empty() {
        return Err("empty filter key".to_owned());
    }
    let value = if value.contains('|') {
        FilterValue::multiple(value.split('|'))
    } else {
        FilterValue::single(value)
    };
    Ok((key.to_owned(), value))
}

/// Messages go to stderr so stdout stays machine readable.
struct StderrMessages;

impl MessageSink for StderrMessages {
    fn show_error(&self, message: &str) {
        eprintln!("error: {message}");
    }

    fn show_success(&self, message: &str) {
        eprintln!("{message}");
    }

    fn show_info(&self, message: &str) {
        eprintln!("{message}");
    }
}

fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        let msg = format!("{info}\n\n{backtrace}");
        let _ = std::fs::write("panic.log", &msg);
        eprintln!("{msg}");
    }));

    let cli = Cli::parse();

    // Set up tracing.
    if cli.debug {
        let file = std::fs::File::create("debug.log")?;
        tracing_subscriber::fmt()
            .with_writer(file)
            .with_ansi(false)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .init();
    }

    // Load config.
    let config = loader::load_config(cli.config.as_deref())?;

    // reqwest 0.13 / rustls 0.23 no longer install a CryptoProvider on their
    // own. An error here only means one is installed already.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    tracing::info!("ev-board starting");

    match cli.command {
        Commands::Screens => {
            for screen in &config.screens {
                println!("{}\t{}", screen.title, screen.endpoint);
            }
            Ok(())
        }
        Commands::List {
            screen,
            page,
            search,
            sort,
            filters,
        } => {
            let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
            runtime.block_on(list(&config, &screen, page, search, sort, filters))
        }
        Commands::Watch {
            screen,
            events_stdin,
        } => {
            let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
            runtime.block_on(watch(&config, &screen, events_stdin))
        }
    }
}

fn find_screen<'a>(config: &'a AppConfig, title: &str) -> Result<&'a ScreenSection> {
    config.screen(title).ok_or_else(|| {
        let known: Vec<&str> = config.screens.iter().map(|s| s.title.as_str()).collect();
        anyhow!("unknown screen {title:?}; configured: {}", known.join(", "))
    })
}

async fn list(
    config: &AppConfig,
    title: &str,
    page: u64,
    search: Option<String>,
    sort: Option<Sorting>,
    filters: Vec<(String, FilterValue)>,
) -> Result<()> {
    let section = find_screen(config, title)?;
    let client = BackendClient::new(&config.backend)?;

    let mut query = ConfiguredScreen::new(section, None).query_state(&config.defaults)?;
    if let Some(sort) = sort {
        query.set_sort(sort.field, sort.direction);
    }
    if let Some(search) = search {
        query.set_search(search);
    }
    for (key, value) in filters {
        query.set_filter(&key, value);
    }
    query.set_page(page.saturating_sub(1));

    let backend = HttpQuery::<Record>::new(client, section.endpoint.clone());
    let result = backend
        .query(&query.query_params())
        .await
        .with_context(|| format!("querying {}", section.endpoint))?;

    for row in &result.result {
        println!("{}", serde_json::to_string(row)?);
    }
    eprintln!(
        "page {} of {} ({} items)",
        query.page_index() + 1,
        query.page_count(result.count).max(1),
        result.count
    );
    Ok(())
}

async fn watch(config: &AppConfig, title: &str, events_stdin: bool) -> Result<()> {
    let section = find_screen(config, title)?;
    let client = BackendClient::new(&config.backend)?;

    let hub = NotificationHub::default();
    if events_stdin {
        hub.connect(stdin_events());
    }

    let collaborators =
        screen::http_collaborators(section, &client).messages(Arc::new(StderrMessages));
    let handle = screen::data_source(section, &config.defaults, collaborators, Some(client))?
        .with_hub(&hub)
        .mount();
    tracing::info!(screen = %section.title, "watching");

    let mut data = handle.data();
    let mut events = handle.events();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = data.changed() => {
                if changed.is_err() {
                    break;
                }
                let page = Arc::clone(&data.borrow_and_update());
                print_page(&page);
            }
            event = events.recv() => match event {
                Ok(TableEvent::Loaded { .. }) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Ok(event) => eprintln!("{event:?}"),
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = &mut ctrl_c => break,
        }
    }

    handle.teardown();
    hub.disconnect();
    Ok(())
}

fn print_page(page: &Page<Record>) {
    let rows: Vec<&Record> = page.rows.iter().map(|row| &row.data).collect();
    let line = serde_json::json!({
        "generation": page.generation,
        "page": page.page_index + 1,
        "pages": page.page_count(),
        "count": page.count,
        "rows": rows,
    });
    println!("{line}");
}

/// Pump JSON-line events from stdin into a hub transport channel.
fn stdin_events() -> mpsc::Receiver<RawEvent> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawEvent>(&line) {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("ignoring malformed event: {e}"),
            }
        }
    });
    rx
}
