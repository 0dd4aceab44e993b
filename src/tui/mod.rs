mod help;
mod state;
mod view;

use crate::api::{HttpLicenseApi, LicenseApi};
use crate::cli::{build_config, terms, Cli};
use crate::coordinator::LIST_ADDRESS;
use crate::model::AppEvent;
use crate::notify::{Notice, NoticeLevel, Notifier};
use crate::orchestrator::{self, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use state::UiState;
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);

    // Unbounded channels avoid backpressure between the UI thread and the controller.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let (notifier, notice_rx) = Notifier::channel();

    let api: Arc<dyn LicenseApi> =
        Arc::new(HttpLicenseApi::new(&cfg, Some(notifier)).context("create license api client")?);
    tracing::info!(base_url = %cfg.base_url, "starting tui");

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let mut ui_state = UiState::new(cfg.page_size, LIST_ADDRESS, terms(&cfg));
    let initial = ui_state.start(args.open.as_deref());
    let ui_handle = std::thread::spawn(move || {
        run_threaded(ui_state, initial, event_rx, notice_rx, cmd_tx)
    });

    let res = orchestrator::run_controller(api, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    mut state: UiState,
    initial: Vec<UiCommand>,
    mut event_rx: UnboundedReceiver<AppEvent>,
    mut notice_rx: UnboundedReceiver<Notice>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let send = |commands: Vec<UiCommand>| {
        for cmd in commands {
            let _ = cmd_tx.send(cmd);
        }
    };
    send(initial);

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut dirty = true;

    let res = loop {
        // Drain without blocking to keep the UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            send(state.apply_event(ev));
            dirty = true;
        }
        while let Ok(notice) = notice_rx.try_recv() {
            state.push_notice(notice);
            dirty = true;
        }

        if dirty || last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| view::draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
            dirty = false;
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                let outcome = state.handle_key(k);
                send(outcome.commands);
                if let Some(key) = outcome.copy {
                    match copy_to_clipboard(&key) {
                        Ok(()) => state.push_notice(Notice {
                            level: NoticeLevel::Success,
                            message: "已复制授权密钥".into(),
                        }),
                        Err(e) => state.push_notice(Notice {
                            level: NoticeLevel::Error,
                            message: format!("Clipboard copy failed: {e:#}"),
                        }),
                    }
                }
                dirty = true;
                if outcome.quit {
                    break Ok(());
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

// Global clipboard manager channel - initialized once on first use
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;

static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Start the clipboard thread on first use. Each copy gets its own clipboard instance,
/// held for a moment so Linux clipboard managers can read it.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                if let Ok(mut clipboard) = Clipboard::new() {
                    if clipboard.set_text(&text).is_ok() {
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Queue `text` for the clipboard thread; returns without waiting.
fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}
