use anyhow::{Context, Result};
use boardview::config::{self, Config};
use boardview::data::SortDirection;
use boardview::integrations::client::PlatformClient;
use boardview::integrations::retry::RetryPolicies;
use boardview::integrations::HttpTransport;
use boardview::render::render_table;
use boardview::session::{self, HostContext, Notice, Panel, Session};
use boardview::settings::FileKvStore;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "boardview")]
#[command(about = "Aggregated table view across work-management boards")]
#[command(version)]
struct Args {
    /// Initialize configuration
    #[arg(long)]
    init: bool,

    /// Path to config file
    #[arg(long, short)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List boards visible to your account
    Boards,
    /// List the columns of the selected boards
    Columns,
    /// Replace the board and/or column selection
    Select {
        #[arg(long = "board")]
        boards: Vec<String>,
        #[arg(long = "column")]
        columns: Vec<String>,
    },
    /// Print the aggregated table
    Show {
        /// Column filter as COLUMN=VALUE; repeat to select several values
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// Drop all saved filters before applying --filter
        #[arg(long)]
        clear_filters: bool,
        /// Sort key as COLUMN or COLUMN:desc
        #[arg(long)]
        sort: Option<String>,
        /// Only items assigned to you
        #[arg(long)]
        mine: bool,
    },
    /// Rename an item
    Rename { item_id: String, name: String },
    /// Change one column of an item
    Set {
        item_id: String,
        column_id: String,
        value: String,
    },
    /// Show a user and their profile link
    User { user_id: String },
    /// Keep the table refreshed until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("boardview=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    if args.init {
        config::init_wizard().await?;
        return Ok(());
    }

    let config = config::load(args.config.as_deref())?;
    let mut session = build_session(&config)?;

    if !session.start().await {
        let reason = session.error(Panel::Fatal).unwrap_or("unknown error");
        anyhow::bail!("Could not load view settings: {}", reason);
    }

    let command = args.command.unwrap_or(Command::Show {
        filters: Vec::new(),
        clear_filters: false,
        sort: None,
        mine: false,
    });
    let result = run_command(&mut session, command).await;

    session.close().await;
    report_notices(&mut session);
    result
}

fn build_session(config: &Config) -> Result<Session> {
    let transport = HttpTransport::new(&config.api, config.api_token());
    let client = PlatformClient::new(Arc::new(transport), RetryPolicies::from_config(&config.retry));
    let store = FileKvStore::new(config::settings_path(config)?);
    Ok(Session::new(
        client,
        Arc::new(store),
        HostContext::from_config(&config.host),
        config,
    ))
}

async fn run_command(session: &mut Session, command: Command) -> Result<()> {
    match command {
        Command::Boards => {
            let selected = session.state().selected_board_ids.clone();
            let boards = session.load_boards().await.context("Failed to list boards")?;
            for board in boards {
                let marker = if selected.contains(&board.id) { "*" } else { " " };
                println!("{} {:>12}  {}", marker, board.id, board.name);
            }
        }
        Command::Columns => {
            session.settle().await;
            ensure_panel_ok(session, Panel::Columns)?;
            let selected = &session.state().selected_column_ids;
            for board_columns in &session.snapshot().columns_by_board {
                println!("{} ({})", board_columns.board.name, board_columns.board.id);
                for column in &board_columns.columns {
                    let marker = if selected.contains(&column.id) { "*" } else { " " };
                    println!(
                        "  {} {:<24} {:<12} {}",
                        marker,
                        column.id,
                        column.column_type.as_str(),
                        column.title
                    );
                }
            }
        }
        Command::Select { boards, columns } => {
            if !boards.is_empty() {
                session.select_boards(boards);
            }
            if !columns.is_empty() {
                session.select_columns(columns);
            }
            let state = session.state();
            println!("Boards: {}", state.selected_board_ids.join(", "));
            println!("Columns: {}", state.selected_column_ids.join(", "));
        }
        Command::Show {
            filters,
            clear_filters,
            sort,
            mine,
        } => {
            if clear_filters {
                let columns: Vec<String> = session.state().active_filters.keys().cloned().collect();
                for column_id in columns {
                    session.clear_filter(&column_id);
                }
            }
            for (column_id, values) in parse_filters(&filters)? {
                session.set_filter(&column_id, values);
            }
            if let Some(sort) = sort {
                let (column_id, direction) = parse_sort(&sort);
                session.set_sort(column_id, direction);
            }
            if mine != session.state().my_items_only {
                session.set_my_items_only(mine);
            }

            session.settle().await;
            ensure_panel_ok(session, Panel::Columns)?;
            session.load_people().await;
            print_table(session);
        }
        Command::Rename { item_id, name } => {
            session.settle().await;
            session
                .rename_item(&item_id, &name)
                .await
                .with_context(|| format!("Failed to rename item {}", item_id))?;
            session.settle().await;
            println!("Renamed {} to {:?}", item_id, name);
        }
        Command::Set {
            item_id,
            column_id,
            value,
        } => {
            session.settle().await;
            let payload = session.value_payload(&column_id, &value);
            session
                .set_column_value(&item_id, &column_id, &payload)
                .await
                .with_context(|| format!("Failed to update {} on item {}", column_id, item_id))?;
            session.settle().await;
            println!("Updated {} on {}", column_id, item_id);
        }
        Command::User { user_id } => {
            let user = session
                .user(&user_id)
                .await
                .with_context(|| format!("Failed to look up user {}", user_id))?;
            println!("{} ({})", user.name, user.id);
            if let Some(email) = &user.email {
                println!("  {}", email);
            }
            println!("  {}", session.profile_url(&user.id));
        }
        Command::Watch => {
            session.settle().await;
            print_table(session);
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("Failed to listen for ctrl-c: {}", e);
                    std::future::pending::<()>().await;
                }
            };
            session::run_background(session, shutdown, print_table).await;
        }
    }
    Ok(())
}

fn print_table(session: &Session) {
    let rows = session.rows();
    let columns = session.displayed_columns();
    print!("{}", render_table(&rows, &columns));
    println!(
        "{} of {} items, fetched {}",
        rows.len(),
        session.snapshot().items.len(),
        session.snapshot().fetched_at.format("%H:%M:%S")
    );
    for (panel, message) in session.errors() {
        eprintln!("[{:?}] {}", panel, message);
    }
}

fn ensure_panel_ok(session: &Session, panel: Panel) -> Result<()> {
    match session.error(panel) {
        Some(message) => anyhow::bail!("{}", message),
        None => Ok(()),
    }
}

fn parse_filters(raw: &[String]) -> Result<BTreeMap<String, Vec<String>>> {
    let mut filters: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in raw {
        let (column_id, value) = entry
            .split_once('=')
            .with_context(|| format!("Filter {:?} is not COLUMN=VALUE", entry))?;
        filters
            .entry(column_id.trim().to_string())
            .or_default()
            .push(value.to_string());
    }
    Ok(filters)
}

fn parse_sort(raw: &str) -> (&str, SortDirection) {
    match raw.rsplit_once(':') {
        Some((column_id, dir)) if dir.eq_ignore_ascii_case("desc") => (column_id, SortDirection::Desc),
        Some((column_id, dir)) if dir.eq_ignore_ascii_case("asc") => (column_id, SortDirection::Asc),
        _ => (raw, SortDirection::Asc),
    }
}

fn report_notices(session: &mut Session) {
    for notice in session.drain_notices() {
        match notice {
            Notice::SaveFailed(message) => eprintln!("Settings were not saved: {}", message),
            Notice::MutationFailed { item_id, message } => {
                eprintln!("Update of item {} failed: {}", item_id, message)
            }
        }
    }
}
