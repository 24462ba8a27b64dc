mod api;
mod cli;

use shop_list::config::{CardConfig, Config};
use shop_list::engine::{EngineState, ShoppingList};
use shop_list::list::{Item, ListView};
use shop_list::store;
use shop_list::utils::paths::{get_config_path, get_logs_dir};

use anyhow::{Result, anyhow, bail};
use api::ApiState;
use clap::Parser;
use cli::{Cli, Commands};
use std::fs;
use std::path::PathBuf;

/// Initialize file-based logging for CLI commands.
///
/// Logs are written to ~/.shop-list/logs/shoplist.log
/// Use `tail -f ~/.shop-list/logs/shoplist.log` to follow logs.
///
/// Log level can be controlled with RUST_LOG env var (default: info).
fn init_file_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let logs_dir = match get_logs_dir() {
        Ok(dir) => dir,
        Err(_) => return None,
    };

    if let Err(e) = fs::create_dir_all(&logs_dir) {
        eprintln!("Warning: Could not create logs directory: {}", e);
        return None;
    }

    // Rolling daily
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "shoplist.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI colors in log files
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    Some(guard)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load()?;

    if let Some(list_id) = cli.list {
        config.card.list_id = list_id;
    }

    match cli.command.unwrap_or(Commands::List { completed: false }) {
        Commands::Init { force } => {
            let path = handle_init(&config, force)?;
            println!("Config written to {}", path.display());
            Ok(())
        }
        Commands::Serve { port } => run_server_foreground(config, port),
        command => {
            // Guard must be kept alive until the command finishes
            let _log_guard = init_file_logging();
            tracing::info!(command = ?command, "shoplist starting");
            run_command(config, command)
        }
    }
}

/// Save `config` as the config file, refusing to replace one unless `force`.
fn handle_init(config: &Config, force: bool) -> Result<PathBuf> {
    let path = get_config_path()?;
    if path.exists() && !force {
        bail!(
            "Config file already exists at {}, use --force to overwrite",
            path.display()
        );
    }
    config.save()?;
    Ok(path)
}

async fn open_list(config: &Config) -> Result<ShoppingList> {
    config.store.validate()?;
    let options = config.card.list_options()?;
    let store = store::open(&config.store)?;

    let list = ShoppingList::new(store, options);
    list.start().await?;
    Ok(list)
}

#[tokio::main]
async fn run_command(config: Config, command: Commands) -> Result<()> {
    let list = open_list(&config).await?;
    if list.state() == EngineState::Uninitialized {
        list.shutdown().await;
        bail!(
            "Could not load list '{}' from the store, see the log for details",
            list.options().list_id
        );
    }

    let result = apply_command(&list, &config.card, command).await;
    list.shutdown().await;
    result
}

fn resolve(list: &ShoppingList, key: &str) -> Result<Item> {
    list.find(key)
        .ok_or_else(|| anyhow!("No item matching '{}'", key))
}

async fn apply_command(list: &ShoppingList, card: &CardConfig, command: Commands) -> Result<()> {
    let mut show_completed = false;

    match command {
        Commands::List { completed } => show_completed = completed,
        Commands::Add { text } => {
            let text = text.join(" ");
            if text.trim().is_empty() {
                bail!("Nothing to add");
            }
            list.add_or_bump(&text).await;
        }
        Commands::Qty { item, quantity } => {
            let item = resolve(list, &item)?;
            list.set_quantity(&item.id, quantity);
        }
        Commands::Inc { item } => {
            let item = resolve(list, &item)?;
            list.increment(&item.id);
        }
        Commands::Dec { item } => {
            let item = resolve(list, &item)?;
            list.decrement(&item.id);
        }
        Commands::Done { item } => {
            let item = resolve(list, &item)?;
            list.toggle_complete(&item.id).await;
            show_completed = true;
        }
        Commands::Rm { item } => {
            let item = resolve(list, &item)?;
            list.remove(&item.id).await;
        }
        Commands::Clear => list.clear_completed().await,
        Commands::Rename { item, name } => {
            if name.trim().is_empty() {
                bail!("New name must not be empty");
            }
            let item = resolve(list, &item)?;
            list.rename(&item.id, &name).await;
        }
        Commands::Note { item, notes } => {
            let item = resolve(list, &item)?;
            list.set_notes(&item.id, &notes).await;
        }
        Commands::Category { item, category } => {
            if !card.show_categories {
                bail!("Categories are disabled (showCategories = false)");
            }
            let item = resolve(list, &item)?;
            list.set_category(&item.id, &category).await;
        }
        Commands::Suggest { query } => {
            let suggestions = list.suggest(&query);
            if suggestions.is_empty() {
                println!("No suggestions for '{}'", query);
            }
            for item in &suggestions {
                println!("{}", format_item(item, card));
            }
            return Ok(());
        }
        Commands::Init { .. } | Commands::Serve { .. } => {
            bail!("this command does not run against a loaded list")
        }
    }

    list.flush().await;
    print_list(card, &list.view(), show_completed);
    Ok(())
}

fn format_item(item: &Item, card: &CardConfig) -> String {
    let mark = if item.is_completed() { "[x]" } else { "[ ]" };
    let mut line = format!("{} {}", mark, item.name);
    if item.quantity > 1 {
        line.push_str(&format!(" x{}", item.quantity));
    }
    if card.show_categories && card.show_category_badges && item.has_category() {
        line.push_str(&format!("  [{}]", item.category));
    }
    if card.show_notes && !item.notes.is_empty() {
        line.push_str(&format!("  // {}", item.notes));
    }
    line
}

fn print_list(card: &CardConfig, view: &ListView, show_completed: bool) {
    println!("\n{}\n", card.display_title());

    if view.is_empty() {
        println!("The list is empty!");
        println!();
        return;
    }

    if card.show_categories && card.show_category_headers {
        for (category, items) in view.category_groups() {
            let header = if category.is_empty() { "Other" } else { category };
            println!("{}", header);
            for item in items {
                println!("  {}", format_item(item, card));
            }
        }
    } else {
        for item in &view.active {
            println!("{}", format_item(item, card));
        }
    }

    if !view.completed.is_empty() {
        if show_completed {
            println!("\nCompleted ({})", view.completed.len());
            for item in &view.completed {
                println!("{}", format_item(item, card));
            }
        } else {
            println!(
                "\n{} completed item(s) hidden, use `list --completed`",
                view.completed.len()
            );
        }
    }

    println!();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not listen for Ctrl-C");
    }
}

#[tokio::main]
async fn run_server_foreground(config: Config, port: u16) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let list = open_list(&config).await?;
    let app = api::create_router(ApiState {
        list: list.clone(),
        card: config.card.clone(),
    });
    let addr = format!("0.0.0.0:{port}");

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    list.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use shop_list::list::{ItemFields, ItemStatus};

    fn item(name: &str, quantity: u32, category: &str, notes: &str) -> Item {
        let fields = ItemFields {
            name: name.to_string(),
            quantity,
            category: category.to_string(),
            notes: notes.to_string(),
        };
        Item::from_fields("1".to_string(), fields, ItemStatus::NeedsAction, String::new())
    }

    #[test]
    #[serial]
    fn test_init_writes_config_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let old_home = std::env::var_os("HOME");
        // SAFETY: serialised with other HOME-dependent tests
        unsafe { std::env::set_var("HOME", dir.path()) };

        let mut config = Config::default();
        config.card.list_id = "todo.weekly".to_string();
        let written = handle_init(&config, false);
        let again = handle_init(&config, false);
        let forced = handle_init(&Config::default(), true);
        let loaded = Config::load();

        match old_home {
            Some(home) => unsafe { std::env::set_var("HOME", home) },
            None => unsafe { std::env::remove_var("HOME") },
        }

        assert!(written.unwrap().ends_with(".shop-list/config.toml"));
        assert!(again.unwrap_err().to_string().contains("--force"));
        assert!(forced.is_ok());
        assert_eq!(loaded.unwrap().card.list_id, "");
    }

    #[test]
    fn test_format_item_shows_enabled_decorations() {
        let card = CardConfig::default();
        assert_eq!(
            format_item(&item("Eggs", 12, "Dairy", "large"), &card),
            "[ ] Eggs x12  [Dairy]  // large"
        );
        assert_eq!(format_item(&item("Milk", 1, "", ""), &card), "[ ] Milk");
    }

    #[test]
    fn test_format_item_respects_card_toggles() {
        let card = CardConfig {
            show_category_badges: false,
            show_notes: false,
            ..CardConfig::default()
        };
        assert_eq!(
            format_item(&item("Eggs", 2, "Dairy", "large"), &card),
            "[ ] Eggs x2"
        );
    }
}
