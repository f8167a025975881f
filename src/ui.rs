use crate::{
    city::{
        MAX_TURNS,
        Structure,
    },
    client::AppSnapshot,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        Event,
        EventStream,
        KeyCode,
        KeyEvent,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use futures::StreamExt;
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UserEvent {
    Quit,
    Redraw,
    Connect,
    SubmitPassword(String),
    DismissAlert,
    Refresh,
    StartGame,
    Build(Structure),
}

pub type InputEventReceiver = EventStream;

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    connected: bool,
    has_city: bool,
    can_build: bool,
    alert_open: bool,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
enum Mode {
    #[default]
    Normal,
    Password(PasswordState),
    QuitModal,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct PasswordState {
    wallet: String,
    input: String,
}

impl UiState {
    pub fn sync(&mut self, snap: &AppSnapshot) {
        self.connected = snap.is_connected();
        self.has_city = snap.city.is_some();
        self.can_build = snap.can_build();
        self.alert_open = snap.alert.is_some();
    }

    pub fn prompt_password(&mut self, wallet: &str) {
        self.mode = Mode::Password(PasswordState {
            wallet: wallet.to_string(),
            input: String::new(),
        });
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    state.sync(snap);
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| render(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

pub fn input_event_stream() -> InputEventReceiver {
    EventStream::new()
}

pub async fn next_raw_event(events: &mut InputEventReceiver) -> Result<Event> {
    match events.next().await {
        Some(Ok(event)) => Ok(event),
        Some(Err(e)) => Err(e.into()),
        None => Err(eyre!("terminal input stream closed")),
    }
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => interpret_key(state, key),
        Event::Resize(..) => Some(UserEvent::Redraw),
        _ => None,
    }
}

fn interpret_key(state: &mut UiState, key: KeyEvent) -> Option<UserEvent> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(UserEvent::Quit);
    }
    if state.alert_open {
        state.alert_open = false;
        return Some(UserEvent::DismissAlert);
    }
    match &mut state.mode {
        Mode::Password(ps) => {
            return match key.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter => {
                    let password = std::mem::take(&mut ps.input);
                    state.mode = Mode::Normal;
                    Some(UserEvent::SubmitPassword(password))
                }
                KeyCode::Backspace => {
                    ps.input.pop();
                    Some(UserEvent::Redraw)
                }
                KeyCode::Char(c) => {
                    ps.input.push(c);
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::QuitModal => {
            return match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::Normal => {}
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('c') if !state.connected => Some(UserEvent::Connect),
        KeyCode::Char('r') if state.connected => Some(UserEvent::Refresh),
        KeyCode::Char('s') if state.connected && !state.has_city => {
            Some(UserEvent::StartGame)
        }
        KeyCode::Char(c @ '1'..='3') if state.can_build => {
            let code = c as u8 - b'1';
            Structure::from_code(code).ok().map(UserEvent::Build)
        }
        _ => None,
    }
}

pub fn render(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // network + contract
            Constraint::Length(3), // account
            Constraint::Min(9),    // city
            Constraint::Length(6), // actions
            Constraint::Length(3), // status
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_header(f, chunks[0], snap);
    draw_account(f, chunks[1], snap);
    draw_city(f, chunks[2], snap);
    draw_actions(f, chunks[3], snap);
    draw_status(f, chunks[4], snap);
    draw_help(f, chunks[5], snap);
    draw_modals(f, state, snap);
}

fn draw_header(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let chain = match snap.chain_id {
        Some(id) => format!(" (chain {id})"),
        None => String::new(),
    };
    let lines = vec![
        Line::from(format!("Network: {}{} | RPC: {}", snap.network, chain, snap.rpc_url)),
        Line::from(format!("Contract: {}", snap.contract_address)),
    ];
    let title = Span::styled(
        "Cross-Chain City Manager",
        Style::default().add_modifier(Modifier::BOLD),
    );
    let widget =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(widget, area);
}

fn draw_account(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let line = match &snap.player_short {
        Some(short) => Line::from(format!("Connected: {short}")),
        None => Line::styled(
            format!("Press c to connect wallet ({})", snap.wallet_location),
            Style::default().fg(Color::Yellow),
        ),
    };
    let widget =
        Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Wallet"));
    f.render_widget(widget, area);
}

fn draw_city(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let lines = match (&snap.city, snap.is_connected()) {
        (Some(city), _) => {
            let mut lines = vec![
                Line::from(format!("Turn: {} / {}", city.turn, MAX_TURNS)),
                Line::from(format!("Wood: {}", city.wood)),
                Line::from(format!("Steel: {}", city.steel)),
                Line::from(format!("Energy: {}", city.energy)),
            ];
            lines.extend(
                Structure::ALL
                    .iter()
                    .map(|s| Line::from(format!("{}: {}", s.name(), city.count_of(*s)))),
            );
            lines
        }
        (None, true) => vec![Line::styled(
            "No city loaded. Press r to refresh or s to start a new game.",
            Style::default().fg(Color::DarkGray),
        )],
        (None, false) => vec![Line::styled(
            "Not connected",
            Style::default().fg(Color::DarkGray),
        )],
    };
    let widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Your City Status"),
    );
    f.render_widget(widget, area);
}

fn draw_actions(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let (title, lines) = if snap.can_build() {
        let lines: Vec<Line> = Structure::ALL
            .iter()
            .enumerate()
            .map(|(i, s)| {
                Line::from(format!(
                    "{}  Build {} ({})",
                    i + 1,
                    s.name(),
                    s.cost_label()
                ))
            })
            .collect();
        ("Build Actions", lines)
    } else if snap.is_game_over() {
        let lines = vec![
            Line::styled(
                "Game Over!",
                Style::default()
                    .fg(Color::Magenta)
                    .add_modifier(Modifier::BOLD),
            ),
            Line::from(format!(
                "You completed {MAX_TURNS} turns. Check your final score."
            )),
        ];
        ("Game", lines)
    } else if snap.is_connected() {
        ("Game", vec![Line::from("s  Start New Game")])
    } else {
        ("Game", vec![Line::from("c  Connect Wallet")])
    };
    let widget =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(widget, area);
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let widget = Paragraph::new(format!("Status: {}", snap.status))
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(Style::default().fg(Color::Green));
    f.render_widget(widget, area);
}

fn draw_help(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut keys: Vec<&str> = Vec::new();
    if snap.is_connected() {
        keys.push("r refresh");
        if snap.city.is_none() {
            keys.push("s start game");
        }
        if snap.can_build() {
            keys.push("1/2/3 build");
        }
    } else {
        keys.push("c connect");
    }
    keys.push("q/Esc quit");
    let help = Paragraph::new(keys.join(" | "))
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    if let Some(alert) = &snap.alert {
        let area = centered_rect(60, 25, f.area());
        let block = Block::default().borders(Borders::ALL).title("Alert");
        let p = Paragraph::new(format!("{alert}\n\nPress any key to close"))
            .wrap(Wrap { trim: false });
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(p, block.inner(area));
        return;
    }
    match &state.mode {
        Mode::Password(ps) => {
            let area = centered_rect(50, 25, f.area());
            let block = Block::default()
                .borders(Borders::ALL)
                .title(format!("Unlock wallet '{}'", ps.wallet));
            let masked = "*".repeat(ps.input.chars().count());
            let p = Paragraph::new(format!(
                "Password: {masked}\nEnter=connect Esc=cancel"
            ));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit the game? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}
