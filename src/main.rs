use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use tracker_terminal::backend::BackendClient;
use tracker_terminal::catalog;
use tracker_terminal::clock::SystemClock;
use tracker_terminal::config::TrackerConfig;
use tracker_terminal::demo_feed;
use tracker_terminal::pending::{PendingQueue, Priority, RecordContext};
use tracker_terminal::record::ChannelSink;
use tracker_terminal::record_worker;
use tracker_terminal::roster::{self, Roster};
use tracker_terminal::session::{apply_delta, Delta, TrackerSession};

type Session = TrackerSession<SystemClock, ChannelSink>;

struct App {
    session: Session,
    match_id: String,
    tracker_id: String,
    should_quit: bool,
    expire_tick: Duration,
    last_expire: Instant,
}

impl App {
    fn new(config: &TrackerConfig, roster: Roster, sink: ChannelSink) -> Self {
        let queue = PendingQueue::new(
            SystemClock,
            sink,
            RecordContext {
                match_id: config.match_id.clone(),
                created_by: config.tracker_id.clone(),
            },
        )
        .with_policy(config.failed_record);
        let session = TrackerSession::new(
            queue,
            roster,
            &config.assigned_event_types,
            config.default_event_type.clone(),
            config.max_pending_secs,
        );
        Self {
            session,
            match_id: config.match_id.clone(),
            tracker_id: config.tracker_id.clone(),
            should_quit: false,
            expire_tick: config.expire_tick,
            last_expire: Instant::now(),
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        if self.session.help_overlay {
            if matches!(key.code, KeyCode::Esc | KeyCode::F(1) | KeyCode::Char('?')) {
                self.session.help_overlay = false;
            }
            return;
        }
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::F(1) | KeyCode::Char('?') => self.session.help_overlay = true,
            KeyCode::F(2) => {
                let online = !self.session.online;
                self.session.set_online(online);
            }
            KeyCode::F(5) => {
                self.session.resolve_all_default();
            }
            KeyCode::F(8) | KeyCode::Delete => {
                self.session.discard_all();
            }
            KeyCode::Backspace => {
                self.session.discard_head();
            }
            KeyCode::Down => self.session.select_next(),
            KeyCode::Up => self.session.select_prev(),
            KeyCode::Enter | KeyCode::Char(' ') => {
                self.session.possession_from_selection();
            }
            KeyCode::Char(_) => {
                self.session.on_key(key);
            }
            _ => {}
        }
    }

    fn maybe_expire(&mut self) {
        if self.last_expire.elapsed() >= self.expire_tick {
            self.session.tick();
            self.last_expire = Instant::now();
        }
    }
}

fn main() -> io::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let config = TrackerConfig::from_env();
    let (roster, roster_note) = load_roster(&config);

    let (tx, rx) = mpsc::channel();
    let (record_tx, record_rx) = mpsc::channel();
    let backend = config.backend.as_ref().map(BackendClient::new);
    record_worker::spawn_record_writer(record_rx, tx.clone(), config.db_path.clone(), backend.clone());
    if let Some(client) = backend {
        spawn_assignment_loader(client, &config, tx.clone());
    }
    if config.demo_feed {
        demo_feed::spawn_demo_ball_tracker(tx.clone(), roster.clone());
    }

    let mut app = App::new(&config, roster, ChannelSink::new(record_tx));
    if let Some(note) = roster_note {
        app.session.push_log(note);
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app, rx);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn load_roster(config: &TrackerConfig) -> (Roster, Option<String>) {
    let Some(path) = config.roster_path.as_ref() else {
        return (
            roster::placeholder_roster(),
            Some("[INFO] Using placeholder roster".to_string()),
        );
    };
    match roster::load_roster(path) {
        Ok(roster) => (roster, None),
        Err(err) => (
            roster::placeholder_roster(),
            Some(format!("[WARN] Roster load failed, using placeholder: {err:#}")),
        ),
    }
}

fn spawn_assignment_loader(client: BackendClient, config: &TrackerConfig, tx: mpsc::Sender<Delta>) {
    let match_id = config.match_id.clone();
    let tracker_id = config.tracker_id.clone();
    thread::spawn(move || {
        match client.fetch_assigned_event_types(&match_id, &tracker_id) {
            Ok(types) if !types.is_empty() => {
                let _ = tx.send(Delta::SetAssignment(types));
            }
            Ok(_) => {
                let _ = tx.send(Delta::Log(
                    "[INFO] No backend assignment; keeping local event types".to_string(),
                ));
            }
            Err(err) => {
                let _ = tx.send(Delta::Log(format!("[WARN] Assignment fetch error: {err:#}")));
                let _ = tx.send(Delta::SetOnline(false));
            }
        }
    });
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: mpsc::Receiver<Delta>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        while let Ok(delta) = rx.try_recv() {
            apply_delta(&mut app.session, delta);
        }

        app.maybe_expire();

        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.on_key(key);
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(7),
            Constraint::Length(2),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(app)).block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(30),
            Constraint::Percentage(40),
            Constraint::Percentage(30),
        ])
        .split(chunks[1]);
    render_roster(frame, body[0], &app.session);
    render_pending(frame, body[1], &app.session);
    render_bindings(frame, body[2], &app.session);
    render_logs(frame, chunks[2], &app.session);

    let footer = Paragraph::new(footer_text()).block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, chunks[3]);

    if app.session.help_overlay {
        render_help_overlay(frame, frame.size(), &app.session);
    }
}

fn header_text(app: &App) -> Vec<Line<'static>> {
    let session = &app.session;
    let status = if session.online {
        Span::styled("ONLINE", Style::default().fg(Color::Green))
    } else {
        Span::styled("OFFLINE", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD))
    };
    let holder = session
        .possession
        .holder()
        .map(|p| format!("{} ({})", p.short_label(), session.roster.team_name(p.side)))
        .unwrap_or_else(|| "-".to_string());
    vec![
        Line::from(vec![
            Span::raw(format!(
                "TRACKER | {} vs {} | match {} | {} | ",
                session.roster.home.name, session.roster.away.name, app.match_id, app.tracker_id
            )),
            status,
        ]),
        Line::from(format!(
            "Ball: {holder} | Pending: {} | Recorded: {}",
            session.queue.len(),
            session.recorded_total()
        )),
    ]
}

fn footer_text() -> String {
    "Keys: bound letter = classify oldest | ↑/↓ Player | Enter Possession | Bksp Skip | F5 All as default | F8 Clear | F2 Online | ? Help | Esc Quit".to_string()
}

fn render_roster(frame: &mut Frame, area: Rect, session: &Session) {
    let block = Block::default().title("Roster").borders(Borders::ALL);
    let inner_height = area.height.saturating_sub(2) as usize;
    let players = session.roster.players();
    let (start, end) = visible_range(session.selected, players.len(), inner_height);
    let holder_id = session.possession.holder().map(|p| p.id.clone());

    let lines = players[start..end]
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let idx = start + i;
            let marker = if holder_id.as_deref() == Some(p.id.as_str()) {
                "●"
            } else {
                " "
            };
            let text = format!("{marker} {:<4} {:>2} {}", p.side.label(), p.number, p.name);
            let style = if idx == session.selected {
                Style::default().fg(Color::White).bg(Color::DarkGray)
            } else {
                Style::default()
            };
            Line::styled(text, style)
        })
        .collect::<Vec<_>>();
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_pending(frame: &mut Frame, area: Rect, session: &Session) {
    let title = format!("Pending ({})", session.queue.len());
    let block = Block::default().title(title).borders(Borders::ALL);
    let now = session.queue.now();
    let rows = session.queue.snapshot(now);
    if rows.is_empty() {
        let empty = Paragraph::new("Nothing to classify")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let lines = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let head = if i == 0 { "▶" } else { " " };
            let text = format!(
                "{head} {:<6} {:>5.1}s  {:<4} {}",
                row.priority.label(),
                row.age_seconds,
                row.event.player.side.label(),
                row.event.player.short_label()
            );
            Line::styled(text, priority_style(row.priority))
        })
        .collect::<Vec<_>>();
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn priority_style(priority: Priority) -> Style {
    match priority {
        Priority::Urgent => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        Priority::Normal => Style::default().fg(Color::Yellow),
        Priority::Old => Style::default().fg(Color::DarkGray),
    }
}

fn render_bindings(frame: &mut Frame, area: Rect, session: &Session) {
    let block = Block::default().title("Keys").borders(Borders::ALL);
    let mut lines = session
        .bindings
        .bindings()
        .iter()
        .map(|(key, event_type)| {
            let count = session.type_counts.get(event_type).copied().unwrap_or(0);
            Line::from(format!(
                "[{key}] {:<18} {count:>3}",
                catalog::label_for(event_type)
            ))
        })
        .collect::<Vec<_>>();
    if session.bindings.is_empty() {
        lines.push(Line::styled(
            "No event types assigned",
            Style::default().fg(Color::DarkGray),
        ));
    }
    for event_type in session.bindings.unreachable() {
        lines.push(Line::styled(
            format!("[ ] {} (no key)", catalog::label_for(event_type)),
            Style::default().fg(Color::Red),
        ));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(format!(
        "F5 marks all as {}",
        catalog::label_for(&session.default_event_type)
    )));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_logs(frame: &mut Frame, area: Rect, session: &Session) {
    let block = Block::default().title("Log").borders(Borders::ALL);
    let visible = area.height.saturating_sub(2) as usize;
    let lines = session
        .logs
        .iter()
        .rev()
        .take(visible)
        .rev()
        .map(|msg| {
            let style = if msg.starts_with("[WARN]") {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };
            Line::styled(msg.clone(), style)
        })
        .collect::<Vec<_>>();
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total == 0 {
        return (0, 0);
    }
    if total <= visible {
        return (0, total);
    }

    let mut start = selected.saturating_sub(visible / 2);
    if start + visible > total {
        start = total - visible;
    }
    (start, start + visible)
}

fn render_help_overlay(frame: &mut Frame, area: Rect, session: &Session) {
    let popup_area = centered_rect(60, 70, area);
    frame.render_widget(Clear, popup_area);

    let mut text = vec![
        "Tracker Terminal - Help".to_string(),
        String::new(),
        "Classify:".to_string(),
        "  letter       Record the OLDEST pending possession as the bound type".to_string(),
        "  F5           Record everything pending as the default type".to_string(),
        "  Backspace    Skip the oldest pending possession".to_string(),
        "  F8 / Del     Clear all pending (nothing recorded)".to_string(),
        String::new(),
        "Ball tracking:".to_string(),
        "  ↑/↓          Select player".to_string(),
        "  Enter/Space  Selected player has the ball".to_string(),
        String::new(),
        "Session:".to_string(),
        "  F2           Toggle online (offline pauses classification)".to_string(),
        "  ? / F1       Toggle help".to_string(),
        "  Esc          Quit".to_string(),
        String::new(),
        format!(
            "Pending slots are URGENT under 5s, NORMAL under 15s, OLD after; dropped after {:.0}s.",
            session.max_pending_secs
        ),
    ];
    if !session.bindings.unreachable().is_empty() {
        text.push(format!(
            "Not on the keyboard: {}",
            session.bindings.unreachable().join(", ")
        ));
    }

    let help = Paragraph::new(text.join("\n"))
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}
