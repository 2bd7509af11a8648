use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use file_tree_engine::app::App;
use file_tree_engine::config::{AppConfig, LogSection, TreeSection, WatcherSection};
use file_tree_engine::error::AppError;
use file_tree_engine::event::{Event, EventHandler};
use file_tree_engine::fs::cache::TreeCache;
use file_tree_engine::fs::gateway::LocalGateway;
use file_tree_engine::fs::node::Node;
use file_tree_engine::fs::service::TreeService;
use file_tree_engine::fs::watcher::{FsWatcher, WatchOptions};
use file_tree_engine::logging;
use file_tree_engine::notifications::TracingSink;

/// Print a directory tree through the file-tree engine.
#[derive(Parser, Debug)]
#[command(name = "ftree", version, about)]
struct Cli {
    /// Root directory (defaults to the current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Path to a config file (overrides the default locations)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show hidden files
    #[arg(long)]
    show_hidden: bool,

    /// Sort key: name, type, size or modified
    #[arg(long, value_name = "KEY")]
    sort: Option<String>,

    /// Sort in descending order
    #[arg(long)]
    desc: bool,

    /// Directory levels to load below the root
    #[arg(long, value_name = "N")]
    depth: Option<usize>,

    /// Print ranked search hits instead of the tree
    #[arg(long, value_name = "QUERY")]
    search: Option<String>,

    /// Emit JSON
    #[arg(long)]
    json: bool,

    /// Keep running and reprint on filesystem changes
    #[arg(long)]
    watch: bool,

    /// Log level (e.g. info, debug); RUST_LOG wins when set
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    fn overrides(&self) -> AppConfig {
        AppConfig {
            tree: TreeSection {
                show_hidden: self.show_hidden.then_some(true),
                sort_by: self.sort.clone(),
                sort_order: self.desc.then(|| "desc".to_string()),
                max_depth: self.depth,
                auto_expand: self.depth.map(|_| true),
            },
            watcher: WatcherSection {
                enabled: self.watch.then_some(true),
                ..Default::default()
            },
            log: LogSection {
                level: self.log_level.clone(),
            },
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref(), Some(&cli.overrides()));
    logging::init(config.log_level());

    let path = cli.path.canonicalize().map_err(|_| {
        AppError::InvalidPath(format!("{} does not exist", cli.path.display()))
    })?;

    let service = TreeService::new(
        Arc::new(LocalGateway::new()),
        Arc::new(TracingSink),
        TreeCache::with_ttl(config.cache_ttl()),
    )
    .with_success_reports(false);
    let mut app = App::new(Arc::new(service), config.tree_config());
    app.open_root(&path).await?;

    print_view(&app, &cli)?;

    if !cli.watch {
        return Ok(());
    }
    if !config.watcher_enabled() {
        warn!("watcher disabled by config");
        return Ok(());
    }

    let mut events = EventHandler::new();
    let _watcher = FsWatcher::new(&path, WatchOptions::from_config(&config), events.sender())?;
    info!(path = %path.display(), "watching");

    while let Some(event) = events.next().await {
        match event {
            Event::FsChange(paths) => {
                if app.handle_fs_change(&paths).await > 0 {
                    print_view(&app, &cli)?;
                }
            }
            Event::Shutdown => break,
        }
    }
    Ok(())
}

fn print_view(app: &App, cli: &Cli) -> Result<(), AppError> {
    match &cli.search {
        Some(query) => {
            let hits = app.search(query);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                for hit in &hits {
                    println!("{:?}\t{}", hit.rank, hit.node.path.display());
                }
            }
        }
        None => {
            let rows = app.store().visible_nodes();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for node in rows {
                    println!("{}", render_row(node));
                }
            }
        }
    }
    Ok(())
}

fn render_row(node: &Node) -> String {
    let indent = "  ".repeat(node.depth);
    if node.is_dir() {
        format!("{}{}/", indent, node.name)
    } else {
        format!("{}{}", indent, node.name)
    }
}
