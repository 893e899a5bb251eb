mod app;

use std::io;
use std::time::Duration;

use app::{format_open_interest, format_price, format_scan_time, format_zone, truncate, AppState, ConnectionStatus};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:5001".to_string());

    // Scans can take a while on a cold store.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(io::Error::other)?;

    let mut app = AppState::new(base_url);
    app.refresh(&client).await;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut stock_table_state = TableState::default();
    stock_table_state.select(None);

    let result = run_loop(&mut terminal, &mut app, &client, &mut stock_table_state).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    client: &reqwest::Client,
    stock_state: &mut TableState,
) -> io::Result<()> {
    let refresh_interval = Duration::from_secs(2);
    let mut last_tick = std::time::Instant::now();

    loop {
        terminal.draw(|f| render(f, app, stock_state))?;

        let timeout = refresh_interval
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            app.refresh(client).await;
                            last_tick = std::time::Instant::now();
                        }
                        KeyCode::Char('s') | KeyCode::Char('S') => {
                            app.rescan(client).await;
                            last_tick = std::time::Instant::now();
                        }
                        KeyCode::Down | KeyCode::Char('j') => {
                            let max = app.data.all_stocks.len().saturating_sub(1);
                            let next = stock_state.selected().map_or(0, |i| (i + 1).min(max));
                            stock_state.select(Some(next));
                        }
                        KeyCode::Up | KeyCode::Char('k') => {
                            let prev = stock_state.selected().map_or(0, |i| i.saturating_sub(1));
                            stock_state.select(Some(prev));
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= refresh_interval {
            app.refresh(client).await;
            last_tick = std::time::Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, stock_state: &mut TableState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(f.area());

    render_header(f, app, chunks[0]);
    render_body(f, app, stock_state, chunks[1]);
    render_footer(f, chunks[2]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };
    let stats = &app.data.system_stats;

    let spans = vec![
        Span::styled(
            " Spread Screener  ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(
            format!("{}/{} qualified", stats.qualified_stocks, stats.total_stocks_analyzed),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(
            format!("{:.1}% success", stats.success_rate),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(
            format!("{:.2} avg criteria", stats.average_criteria_met),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(
            format!("source: {}", app.data.data_source),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(
            format!("scan {}", format_scan_time(stats.last_scan_time.as_deref())),
            Style::default().fg(Color::DarkGray),
        ),
    ];

    let paragraph = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)));
    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, app: &AppState, stock_state: &mut TableState, area: Rect) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    render_stock_table(f, app, stock_state, halves[0]);
    render_spread_table(f, app, halves[1]);
}

fn header_row(labels: &[&'static str]) -> Row<'static> {
    Row::new(
        labels
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))),
    )
    .height(1)
}

fn titled_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            title,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))
}

fn render_stock_table(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let rows: Vec<Row> = app
        .data
        .all_stocks
        .iter()
        .map(|s| {
            let met_color = match s.criteria_met_count {
                8 => Color::Green,
                6..=7 => Color::Yellow,
                _ => Color::Red,
            };
            let source = if s.fallback_used {
                format!("{}*", truncate(&s.data_source, 9))
            } else {
                truncate(&s.data_source, 10)
            };
            Row::new(vec![
                Cell::from(s.symbol.clone()).style(Style::default().add_modifier(Modifier::BOLD)),
                Cell::from(format_price(s.current_price)),
                Cell::from(format!("{:.3}", s.atr_percentage)),
                Cell::from(format!("{:.1}", s.implied_volatility)),
                Cell::from(format!("{:.0}", s.iv_percentile)),
                Cell::from(format_open_interest(s.open_interest)),
                Cell::from(format!("{:.3}", s.price_stability_30d)),
                Cell::from(format!("{}/8", s.criteria_met_count)).style(Style::default().fg(met_color)),
                Cell::from(source).style(Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Length(5),
            Constraint::Length(4),
            Constraint::Length(7),
            Constraint::Length(6),
            Constraint::Length(4),
            Constraint::Min(6),
        ],
    )
    .header(header_row(&["Sym", "Price", "ATR", "IV", "IVP", "OI", "Stab", "Met", "Source"]))
    .block(titled_block(" STOCKS "))
    .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));

    f.render_stateful_widget(table, area, state);
}

fn render_spread_table(f: &mut Frame, app: &AppState, area: Rect) {
    let rows: Vec<Row> = app
        .data
        .calendar_spreads
        .iter()
        .map(|c| {
            let strategy_color = match c.strategy_type.as_str() {
                "Put Calendar" => Color::Red,
                "Call Calendar" => Color::Green,
                _ => Color::White,
            };
            Row::new(vec![
                Cell::from(c.symbol.clone()),
                Cell::from(c.strategy_type.clone()).style(Style::default().fg(strategy_color)),
                Cell::from(format_price(c.strike_price)),
                Cell::from(format_zone(c.max_profit_zone_low, c.max_profit_zone_high)),
                Cell::from(format!("{:.2}", c.risk_reward_ratio)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(14),
            Constraint::Length(8),
            Constraint::Min(12),
            Constraint::Length(5),
        ],
    )
    .header(header_row(&["Sym", "Strategy", "Strike", "Zone", "R/R"]))
    .block(titled_block(" CALENDAR SPREADS "));

    f.render_widget(table, area);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("refresh  "),
        Span::styled("[s] ", Style::default().fg(Color::Yellow)),
        Span::raw("rescan  "),
        Span::styled("[↑↓ / j k] ", Style::default().fg(Color::Yellow)),
        Span::raw("scroll stocks  "),
        Span::styled("auto-refresh: 2s  * = fallback source", Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(Paragraph::new(line).style(Style::default().fg(Color::White)), area);
}
