mod tui_app;

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame, Terminal,
};
use tui_app::{
    describe_state, format_experience, format_gap, format_rate, truncate, AppState, ConnectionStatus,
    RaceRowResponse, RaceTableResponse, ViewMode,
};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:5000".to_string());
    let session_id = match std::env::var("SESSION_ID").ok().and_then(|s| s.parse::<u64>().ok()) {
        Some(id) => id,
        None => {
            eprintln!("SESSION_ID must be set to a tracking session id");
            std::process::exit(1);
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(io::Error::other)?;

    let mut app = AppState::new(base_url, session_id);

    // Initial fetch before rendering
    app.refresh(&client).await;

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app, &client).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
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
) -> io::Result<()> {
    let poll_interval = Duration::from_secs(2);
    let mut last_tick = std::time::Instant::now();

    loop {
        terminal.draw(|f| render(f, app))?;

        let timeout = poll_interval
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            app.force_refresh(client).await;
                            last_tick = std::time::Instant::now();
                        }
                        KeyCode::Char('v') | KeyCode::Char('V') | KeyCode::Tab => {
                            app.mode = app.mode.next();
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= poll_interval {
            app.refresh(client).await;
            last_tick = std::time::Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState) {
    let area = f.area();

    // Outer vertical split: header | body | footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_body(f, app, chunks[1]);
    render_footer(f, app, chunks[2]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };

    let (league, tracked, state, auto) = match &app.session {
        Some(s) => (
            s.league.clone(),
            s.tracked.clone().unwrap_or_else(|| "—".to_string()),
            describe_state(&s.state),
            if s.auto_refresh { "auto 60s" } else { "manual" },
        ),
        None => ("—".to_string(), "—".to_string(), "—".to_string(), "—"),
    };

    let mut spans = vec![
        Span::styled(
            " Ladder Race  ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(league, Style::default().fg(Color::White)),
        Span::raw("  │  "),
        Span::styled(tracked, Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::raw("  │  "),
        Span::styled(state, Style::default().fg(Color::White)),
        Span::raw("  │  "),
        Span::styled(auto, Style::default().fg(Color::DarkGray)),
    ];
    if let Some(notice) = &app.notice {
        spans.push(Span::raw("  │  "));
        spans.push(Span::styled(truncate(notice, 50), Style::default().fg(Color::Yellow)));
    }

    let paragraph = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );

    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, app: &AppState, area: Rect) {
    let Some(view) = &app.view else {
        let waiting = Paragraph::new("Waiting for the first tracking refresh…")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(waiting, area);
        return;
    };

    match app.mode {
        ViewMode::Both => {
            let halves = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(area);
            render_race_table(f, &view.global, halves[0]);
            render_race_table(f, &view.category, halves[1]);
        }
        ViewMode::Global => render_race_table(f, &view.global, area),
        ViewMode::Category => render_race_table(f, &view.category, area),
    }
}

fn render_race_table(f: &mut Frame, table: &RaceTableResponse, area: Rect) {
    let header_cells = ["", "Name", "Lvl", "Rank", "Experience", "Gap", "Rate"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows = vec![
        race_row("Ahead", table.ahead.as_ref(), false),
        race_row("You", Some(&table.me), true),
        race_row("Behind", table.behind.as_ref(), false),
    ];

    let title = if table.dimension == "category" {
        format!(" {} RACE ", table.me.category.to_uppercase())
    } else {
        " GLOBAL RACE ".to_string()
    };

    let widget = Table::new(
        rows,
        [
            Constraint::Length(7),
            Constraint::Min(12),
            Constraint::Length(4),
            Constraint::Length(7),
            Constraint::Length(16),
            Constraint::Length(14),
            Constraint::Length(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                title,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    );

    f.render_widget(widget, area);
}

fn race_row<'a>(label: &'a str, row: Option<&RaceRowResponse>, is_me: bool) -> Row<'a> {
    let label_cell = Cell::from(label).style(Style::default().fg(Color::DarkGray));
    let Some(r) = row else {
        return Row::new(vec![
            label_cell,
            Cell::from("N/A").style(Style::default().fg(Color::DarkGray)),
        ]);
    };

    let name_style = if r.deceased {
        Style::default().fg(Color::Red).add_modifier(Modifier::CROSSED_OUT)
    } else if is_me {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::White)
    };
    let gap_color = match r.experience_gap {
        g if g > 0 => Color::Red,
        g if g < 0 => Color::Green,
        _ => Color::DarkGray,
    };
    let rate_color = match r.rate_per_hour {
        Some(rate) if rate > 0.0 => Color::Green,
        _ => Color::DarkGray,
    };

    Row::new(vec![
        label_cell,
        Cell::from(truncate(&r.name, 24)).style(name_style),
        Cell::from(r.level.to_string()),
        Cell::from(format!("#{}", r.rank)).style(Style::default().fg(Color::Cyan)),
        Cell::from(format_experience(r.experience)),
        Cell::from(format_gap(r.experience_gap)).style(Style::default().fg(gap_color)),
        Cell::from(format_rate(r.rate_per_hour)).style(Style::default().fg(rate_color)),
    ])
}

fn render_footer(f: &mut Frame, app: &AppState, area: Rect) {
    let age = app
        .view
        .as_ref()
        .map(|v| {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64();
            format!("updated {:.0}s ago", (now - v.refreshed_at).max(0.0))
        })
        .unwrap_or_default();

    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("refresh now  "),
        Span::styled("[v] ", Style::default().fg(Color::Yellow)),
        Span::raw(format!("view: {}  ", app.mode.label())),
        Span::styled(age, Style::default().fg(Color::DarkGray)),
    ]);
    let paragraph = Paragraph::new(line).style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}
