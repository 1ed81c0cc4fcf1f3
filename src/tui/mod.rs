//! Terminal user interface for sqtop
//!
//! - Live jobs, nodes and partitions tables fed by the refresh scheduler
//! - Dual-channel event architecture (priority input, droppable data)
//! - Keyboard-driven sort, filter, watch and drill-down
//! - Attach: the terminal is handed to an interactive `srun` shell and
//!   taken back when it exits

pub mod app;
pub mod event;
pub mod runtime;
pub mod theme;
pub mod ui;

use std::io::{self, IsTerminal, stdout};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::FutureExt;
use futures::future::BoxFuture;
use ratatui::prelude::*;
use tracing::info;

use crate::attach::{ActionOrchestrator, TerminalControl};
use crate::config::LoadedConfig;
use crate::refresh::{Poller, spawn_scheduler};
use crate::slurm::SlurmInterface;
use crate::slurm::runner::CommandRunner;
use crate::store::SnapshotStore;
use crate::tui::app::App;
use crate::tui::runtime::{InputReader, LoopContext, TuiRuntime, create_channels, run_event_loop, spawn_tick};

/// Terminal capability requirements for TUI mode
#[derive(Debug)]
pub struct TerminalCapabilities {
    pub is_tty: bool,
    pub term_type: String,
}

impl TerminalCapabilities {
    pub fn detect() -> Self {
        Self {
            is_tty: stdout().is_terminal(),
            term_type: std::env::var("TERM").unwrap_or_default(),
        }
    }

    pub fn supports_alternate_screen(&self) -> bool {
        !matches!(self.term_type.as_str(), "dumb" | "" | "unknown")
    }

    pub fn is_suitable(&self) -> bool {
        self.is_tty && self.supports_alternate_screen()
    }

    pub fn error_message(&self) -> String {
        if !self.is_tty {
            "TUI mode requires an interactive terminal (stdout is not a TTY).\n\
             Hint: Use one-shot commands like 'sqtop jobs' instead."
                .to_string()
        } else {
            format!(
                "Terminal type '{}' may not support TUI mode.\n\
                 Hint: Set TERM to a supported value (e.g., xterm-256color) or use CLI mode.",
                if self.term_type.is_empty() { "(unset)" } else { &self.term_type }
            )
        }
    }
}

type Backend = CrosstermBackend<io::Stdout>;

/// The dashboard's terminal plus its input reader.
///
/// Releasing stops the reader and restores cooked mode so a foreground child
/// has the terminal to itself; reacquiring undoes both and forces a full
/// redraw.
pub struct TuiSession {
    terminal: Terminal<Backend>,
    input: InputReader,
}

impl TuiSession {
    fn new(input: InputReader) -> Result<Self> {
        let terminal = setup_terminal()?;
        let mut session = Self { terminal, input };
        session.input.start();
        Ok(session)
    }

    pub fn draw(&mut self, app: &mut App) -> Result<()> {
        let size = self.terminal.size()?;
        app.set_viewport_height(size.height);
        self.terminal.draw(|frame| ui::render(app, frame))?;
        Ok(())
    }

    async fn close(mut self) -> Result<()> {
        self.input.stop().await;
        restore_terminal(&mut self.terminal)
    }
}

impl TerminalControl for TuiSession {
    fn release(&mut self) -> BoxFuture<'_, io::Result<()>> {
        async move {
            self.input.stop().await;
            restore_terminal(&mut self.terminal).map_err(io::Error::other)
        }
        .boxed()
    }

    fn reacquire(&mut self) -> BoxFuture<'_, io::Result<()>> {
        async move {
            enable_raw_mode()?;
            execute!(self.terminal.backend_mut(), EnterAlternateScreen, EnableMouseCapture)?;
            self.terminal.clear()?;
            self.input.start();
            Ok(())
        }
        .boxed()
    }
}

/// Run the TUI application
pub async fn run_tui(loaded: LoadedConfig) -> Result<()> {
    let capabilities = TerminalCapabilities::detect();
    if !capabilities.is_suitable() {
        bail!("{}", capabilities.error_message());
    }

    let LoadedConfig {
        config,
        layouts,
        warnings,
    } = loaded;

    let runner = CommandRunner::new(config.refresh.command_timeout());
    let slurm = SlurmInterface::with_config(config.system.slurm_bin_path.as_deref(), runner, layouts.clone());
    if slurm.is_unverified_fallback() {
        tracing::warn!(path = %slurm.slurm_bin_path.display(), "sinfo not found; queries will fail");
    }
    info!(path = %slurm.slurm_bin_path.display(), "starting dashboard");

    let store = Arc::new(SnapshotStore::new(config.refresh.stale_after()));
    let (input_tx, input_rx, data_tx, data_rx) = create_channels();
    let mut runtime = TuiRuntime::new();

    let poller = Poller::new(Arc::new(slurm.clone()), Arc::clone(&store), layouts);
    let (refresh, scheduler_task) = spawn_scheduler(
        poller,
        config.refresh.poll_interval(),
        data_tx.clone(),
        runtime.cancel_token(),
    );
    runtime.track(scheduler_task);
    runtime.track(spawn_tick(data_tx.clone(), runtime.cancel_token()));

    let orchestrator = ActionOrchestrator::new(slurm.slurm_bin_path.join("srun"), config.attach.clone())
        .with_history(slurm.runner().history().clone());

    let app = App::new(
        config,
        warnings,
        SlurmInterface::current_user(),
        Arc::clone(&store),
        refresh.clone(),
        orchestrator.clone(),
        slurm.runner().history().clone(),
    );

    let mut session = TuiSession::new(InputReader::new(input_tx, runtime.cancel_token()))
        .context("failed to initialize terminal")?;

    let ctx = LoopContext {
        refresh,
        orchestrator,
        slurm,
        data_tx,
    };
    let result = run_event_loop(app, input_rx, data_rx, &mut session, ctx).await;

    let closed = session.close().await;
    runtime.shutdown().await;

    result.and(closed)
}

fn setup_terminal() -> Result<Terminal<Backend>> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<Backend>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Run the TUI with the tokio runtime (entry point from main)
pub fn run(loaded: LoadedConfig) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_tui(loaded))
}
