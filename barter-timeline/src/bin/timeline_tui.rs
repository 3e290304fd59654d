/// Operation Timeline TUI
///
/// Streams a trader's operations from the timeline feed and shows them as
/// order cards grouped under day headlines, newest first.
use std::{
    error::Error,
    fs::File,
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use barter_timeline::{
    FeedConfig, FeedStatus, GroupSummary, Highlight, Instrument, OrderGroup, RefreshScheduler,
    RenderNode, RenderSequence, SymbolEquality, Timeline, TimelineError, TimelineFeed,
    TimelineSettings, summary::format_decimal,
};
use chrono::Local;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use parking_lot::Mutex;
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use rustls::crypto::ring::default_provider;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Log to a file so tracing output does not corrupt the terminal
fn init_logging() -> Result<(), Box<dyn Error>> {
    let path = std::env::var("TIMELINE_LOG_FILE").unwrap_or_else(|_| "timeline.log".to_string());
    let file = File::create(&path)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

/// What the draw loop shows
struct ViewState {
    sequence: RenderSequence,
    settings: TimelineSettings,
    selected: Option<Instrument>,
    empty: bool,
    connected: bool,
    /// Index into the visible groups
    cursor: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = default_provider().install_default();
    init_logging()?;

    // Setup panic hook to restore terminal on crash
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(panic_info);
    }));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let activation = TimelineSettings::from_env()
        .map_err(TimelineError::from)
        .and_then(|settings| Timeline::activate(settings, Arc::new(SymbolEquality)));

    let result = match activation {
        Ok(timeline) => run_timeline(&mut terminal, timeline).await,
        Err(e) => {
            error!("Timeline activation failed: {}", e);
            run_blocking_notice(&mut terminal, &e)
        }
    };

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    result
}

type Term = Terminal<CrosstermBackend<io::Stdout>>;

async fn run_timeline(terminal: &mut Term, timeline: Timeline) -> Result<(), Box<dyn Error>> {
    let timeline = Arc::new(Mutex::new(timeline));
    let connected = Arc::new(AtomicBool::new(false));

    let scheduler = RefreshScheduler::new();
    let (sequence_tx, mut sequence_rx) = watch::channel(RenderSequence::default());
    let driver = scheduler.spawn(Arc::clone(&timeline), move |sequence| {
        sequence_tx.send_replace(sequence);
    });

    let feed = TimelineFeed::new(FeedConfig::from_env().with_channel_buffer_size(10_000));
    info!("Subscribing to {}", feed.config().url);
    let (mut operation_rx, mut status_rx) = feed.start();

    {
        let timeline = Arc::clone(&timeline);
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            while let Some(operation) = operation_rx.recv().await {
                let changed = timeline.lock().ingest(operation);
                if changed {
                    scheduler.schedule_recompute();
                }
            }
        });
    }

    {
        let connected_flag = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(status) = status_rx.recv().await {
                match status {
                    FeedStatus::Connected => connected_flag.store(true, Ordering::Relaxed),
                    FeedStatus::Disconnected | FeedStatus::Reconnecting => {
                        connected_flag.store(false, Ordering::Relaxed)
                    }
                }
            }
        });
    }

    let mut cursor = 0usize;
    scheduler.schedule_recompute();

    loop {
        let view = {
            let sequence = sequence_rx.borrow_and_update().clone();
            let guard = timeline.lock();
            cursor = cursor.min(sequence.group_count().saturating_sub(1));
            ViewState {
                sequence,
                settings: guard.settings().clone(),
                selected: guard.selected_instrument().cloned(),
                empty: guard.is_empty(),
                connected: connected.load(Ordering::Relaxed),
                cursor,
            }
        };
        terminal.draw(|f| render_ui(f, &view))?;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        let mut guard = timeline.lock();
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Char('f') => {
                let settings = guard.settings_mut();
                settings.disable_instrument_filtering = !settings.disable_instrument_filtering;
            }
            KeyCode::Char('c') => {
                let settings = guard.settings_mut();
                settings.show_commissions = !settings.show_commissions;
            }
            KeyCode::Char('h') => {
                let settings = guard.settings_mut();
                settings.highlight_trades = !settings.highlight_trades;
            }
            KeyCode::Up => cursor = cursor.saturating_sub(1),
            KeyCode::Down => cursor = cursor.saturating_add(1),
            KeyCode::Enter if guard.settings().disable_instrument_filtering => {
                if let Some(group) = view.sequence.groups().nth(view.cursor) {
                    let instrument = card_instrument(group);
                    info!(symbol = %instrument.symbol, "instrument selected");
                    guard.select_instrument(Some(instrument));
                }
            }
            KeyCode::Backspace => guard.select_instrument(None),
            _ => continue,
        }
        drop(guard);
        scheduler.schedule_recompute();
    }

    feed.unsubscribe();
    scheduler.shutdown();
    let _ = driver.await;
    Ok(())
}

/// Instrument of the card's first operation, or a bare one from its raw symbol
fn card_instrument(group: &OrderGroup) -> Instrument {
    let first = group.first();
    first
        .instrument
        .clone()
        .unwrap_or_else(|| Instrument::from_symbol(first.symbol.clone()))
}

fn run_blocking_notice(terminal: &mut Term, error: &TimelineError) -> Result<(), Box<dyn Error>> {
    let message = match error {
        TimelineError::MissingTrader => {
            "No trader configured for the operation timeline. Set TIMELINE_TRADER_ID.".to_string()
        }
        other => format!("Timeline cannot start: {other}"),
    };

    loop {
        terminal.draw(|f| {
            let block = Block::default()
                .title(" OPERATION TIMELINE ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red));
            let notice = Paragraph::new(vec![
                Line::from(""),
                Line::from(Span::styled(
                    message.as_str(),
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(Span::styled("q: quit", Style::default().fg(Color::DarkGray))),
            ])
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(block);
            f.render_widget(notice, f.area());
        })?;

        if event::poll(Duration::from_millis(250))? {
            if let Event::Key(key) = event::read()? {
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    return Ok(());
                }
            }
        }
    }
}

fn render_ui(f: &mut Frame, view: &ViewState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(1)])
        .split(f.area());

    render_status(f, view, chunks[0]);
    render_cards(f, view, chunks[1]);

    let help = Paragraph::new(Line::from(Span::styled(
        " q quit | f filtering | c commissions | h highlight | ↑↓ move | Enter select | Backspace clear",
        Style::default().fg(Color::DarkGray),
    )));
    f.render_widget(help, chunks[2]);
}

fn render_status(f: &mut Frame, view: &ViewState, area: Rect) {
    let (connection, connection_color) = if view.connected {
        ("CONNECTED", Color::Green)
    } else {
        ("DISCONNECTED", Color::Red)
    };
    let selection = view
        .selected
        .as_ref()
        .map_or_else(|| "all instruments".to_string(), |i| i.display_name().to_string());
    let filtering = if view.settings.disable_instrument_filtering {
        "off"
    } else {
        "on"
    };

    let line = Line::from(vec![
        Span::styled(connection, Style::default().fg(connection_color)),
        Span::raw("  selected: "),
        Span::styled(selection, Style::default().fg(Color::Cyan)),
        Span::raw(format!(
            "  filtering: {filtering}  depth: {}  cards: {}",
            view.settings.depth.get(),
            view.sequence.group_count()
        )),
    ]);
    let block = Block::default()
        .title(" OPERATION TIMELINE ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White));
    f.render_widget(Paragraph::new(line).block(block), area);
}

fn render_cards(f: &mut Frame, view: &ViewState, area: Rect) {
    let block = Block::default().borders(Borders::ALL);

    if view.empty || view.sequence.is_empty() {
        let notice = Paragraph::new(Line::from(Span::styled(
            "No operations yet",
            Style::default().fg(Color::DarkGray),
        )))
        .alignment(Alignment::Center)
        .block(block);
        f.render_widget(notice, area);
        return;
    }

    let mut lines: Vec<Line> = Vec::new();
    let mut cursor_line = 0usize;
    let mut card = 0usize;

    for node in view.sequence.nodes() {
        match node {
            RenderNode::DateHeadline(date) => {
                if !lines.is_empty() {
                    lines.push(Line::from(""));
                }
                lines.push(Line::from(Span::styled(
                    date.date().format("%-d %B %Y").to_string(),
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )));
            }
            RenderNode::VisibleGroup(group) => {
                let is_cursor = card == view.cursor;
                if is_cursor {
                    cursor_line = lines.len();
                }
                lines.extend(card_lines(group, &view.settings, is_cursor));
                card += 1;
            }
        }
    }

    // Keep the cursor card on screen
    let height = usize::from(area.height.saturating_sub(2));
    let scroll = cursor_line.saturating_sub(height.saturating_sub(4));
    let scroll = u16::try_from(scroll).unwrap_or(u16::MAX);

    f.render_widget(Paragraph::new(lines).block(block).scroll((scroll, 0)), area);
}

fn card_lines(group: &OrderGroup, settings: &TimelineSettings, is_cursor: bool) -> Vec<Line<'static>> {
    let summary = GroupSummary::new(group, settings.highlight_trades);

    let title_color = match summary.highlight {
        Some(Highlight::Positive) => Color::Green,
        Some(Highlight::Negative) => Color::Red,
        Some(Highlight::Earth) => Color::LightYellow,
        None => Color::White,
    };
    let marker = if is_cursor { "▶ " } else { "  " };
    let logo = summary
        .logo_fallback
        .map_or_else(|| " ".to_string(), |c| c.to_uppercase().to_string());
    let title = summary
        .title()
        .unwrap_or_else(|| summary.side.as_str().to_string());

    let amount = summary.amount.map_or_else(String::new, |amount| {
        let text = format_decimal(amount, 2);
        if summary.amount_positive {
            format!("+{text}")
        } else {
            text
        }
    });
    let amount_color = if summary.amount_positive {
        Color::Green
    } else {
        Color::White
    };

    let mut title_style = Style::default().fg(title_color);
    if is_cursor {
        title_style = title_style.add_modifier(Modifier::BOLD | Modifier::REVERSED);
    }

    let mut lines = vec![
        Line::from(vec![
            Span::raw(marker),
            Span::styled(format!("[{logo}] "), Style::default().fg(Color::Cyan)),
            Span::styled(title, title_style),
            Span::raw("  "),
            Span::styled(amount, Style::default().fg(amount_color)),
        ]),
        Line::from(vec![
            Span::raw("      "),
            Span::styled(
                summary.description().unwrap_or_default(),
                Style::default().fg(Color::Gray),
            ),
            Span::raw("  "),
            Span::styled(
                summary
                    .effective_time
                    .with_timezone(&Local)
                    .format("%H:%M")
                    .to_string(),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
    ];

    if settings.show_commissions {
        let commission = summary
            .commission
            .map_or_else(|| "-".to_string(), |c| format_decimal(c, 4));
        lines.push(Line::from(vec![
            Span::raw("      "),
            Span::styled(
                format!("Commission {commission}"),
                Style::default().fg(Color::LightYellow),
            ),
        ]));
    }

    lines
}
