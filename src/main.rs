mod app;
mod event;
mod tui;
mod ui;

use crate::app::App;
use crate::event::{Event, EventHandler};
use crate::tui::Tui;
use anyhow::{Context, Result};
use autosync::git::{MirrorOutcome, SyncRepo};
use autosync::{watch, ActivityLog, WatchConfig, WatchService};
use clap::{Parser, Subcommand};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "autosync", version, about = "Keep a project committed and pushed while you work")]
struct Cli {
    /// Settings file (default: <config dir>/autosync/config.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Project directory to watch
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    #[arg(long, global = true)]
    branch: Option<String>,

    /// Remote url for `origin`
    #[arg(long, global = true, value_name = "URL")]
    remote: Option<String>,

    #[arg(long, global = true)]
    no_commit: bool,

    #[arg(long, global = true)]
    no_push: bool,

    /// Quiet period before a batch is committed
    #[arg(long, global = true, value_name = "SECONDS")]
    batch_window: Option<f64>,

    /// Minimum spacing between notifications for one file
    #[arg(long, global = true, value_name = "MS")]
    debounce: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Open the dashboard (default)
    Watch {
        /// Open without starting the watcher
        #[arg(long)]
        paused: bool,
    },
    /// List files that would be synced
    Preview,
    /// List raw download urls for synced files (GitHub remotes)
    Urls,
    /// Snapshot the tree and force-push it to the remote with a lease
    Mirror,
    /// Write the effective settings to the settings file
    Init,
}

impl Cli {
    fn config_path(&self) -> Result<PathBuf> {
        self.config
            .clone()
            .or_else(WatchConfig::default_path)
            .context("No config directory on this platform; pass --config")
    }

    fn apply_overrides(&self, config: &mut WatchConfig) -> Result<()> {
        if let Some(root) = &self.root {
            config.project_path = root.clone();
        } else if config.project_path.as_os_str().is_empty() {
            config.project_path = std::env::current_dir()?;
        }
        if let Some(branch) = &self.branch {
            config.branch = branch.clone();
        }
        if let Some(remote) = &self.remote {
            config.remote_url = remote.clone();
        }
        if self.no_commit {
            config.auto_commit = false;
        }
        if self.no_push {
            config.auto_push = false;
        }
        if let Some(secs) = self.batch_window {
            config.batch_window_sec = secs;
        }
        if let Some(ms) = self.debounce {
            config.debounce_ms = ms;
        }
        Ok(())
    }
}

fn init_tracing(to_file: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autosync=info"));
    if to_file {
        // The dashboard owns the terminal, so logs go to a file.
        let Some(dir) = dirs::cache_dir().map(|d| d.join("autosync")) else {
            return Ok(());
        };
        fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("autosync.log"))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.as_ref().unwrap_or(&Command::Watch { paused: false });
    init_tracing(matches!(command, Command::Watch { .. }))?;

    let config_path = cli.config_path()?;
    let mut config = WatchConfig::load(&config_path)?;
    cli.apply_overrides(&mut config)?;

    match command {
        Command::Watch { paused } => {
            config.validate()?;
            let log = Arc::new(ActivityLog::default());
            run_dashboard(WatchService::new(config, log), !paused)
        }
        Command::Preview => {
            for path in watch::preview(&config)? {
                println!("{path}");
            }
            Ok(())
        }
        Command::Urls => {
            config
                .remote()
                .context("No remote configured; pass --remote or set remote_url")?;
            let urls = watch::raw_urls(&config)?;
            if urls.is_empty() {
                eprintln!("Raw urls are only available for GitHub remotes");
            }
            for url in urls {
                println!("{url}");
            }
            Ok(())
        }
        Command::Mirror => mirror(&config),
        Command::Init => {
            config.save(&config_path)?;
            println!("Wrote {}", config_path.display());
            Ok(())
        }
    }
}

fn mirror(config: &WatchConfig) -> Result<()> {
    config.validate()?;
    let root = config.root().canonicalize()?;
    let repo = SyncRepo::open_or_init(&root)?;
    repo.ensure_branch(&config.branch)?;
    repo.ensure_remote(config.remote())?;
    match repo.mirror_with_lease(&config.branch, "mirror")? {
        MirrorOutcome::Mirrored { branch, snapshot } => {
            if let Some(oid) = snapshot {
                println!("Snapshot {oid:.7}");
            }
            println!("Mirrored {branch} to origin");
        }
        MirrorOutcome::NoRemote => println!("No remote configured, nothing to mirror"),
    }
    Ok(())
}

fn run_dashboard(service: WatchService, start: bool) -> Result<()> {
    let mut app = App::new(service);
    if start {
        app.start();
    }

    let events = EventHandler::new(Duration::from_millis(250));
    let mut tui = Tui::enter()?;

    loop {
        tui.draw(|frame| ui::render(frame, &mut app))?;

        match events.next()? {
            Event::Key(key) => {
                // Skip release/repeat events
                if key.kind != crossterm::event::KeyEventKind::Press {
                    continue;
                }
                app.handle_key(key);
                if app.should_quit {
                    break;
                }
            }
            Event::Tick | Event::Resize(_, _) => {}
        }
    }

    app.service.stop();
    drop(tui);
    Ok(())
}
