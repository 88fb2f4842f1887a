use color_eyre::eyre::{Result, WrapErr, eyre};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use lottery_client::{
    amounts::{TokenAmount, short_address},
    eligibility,
    orchestrator::ManagerSlot,
    snapshot::{Identity, StateSnapshot, UnixMillis},
    store::Notices,
};
use ratatui::{prelude::*, widgets::*};
use std::io::stdout;
use tokio::sync::mpsc;

const MAX_INPUT_LEN: usize = 64;

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Redraw,
    Refresh,
    Login,
    Approve,
    BuyTickets(u64),
    SetManager { slot: ManagerSlot, address: String },
    SetPrice(String),
    Draw,
}

/// Everything one frame needs.
pub struct View {
    pub snapshot: StateSnapshot,
    pub notices: Notices,
    pub now: UnixMillis,
}

#[derive(Debug)]
pub struct UiState {
    mode: Mode,
    ticker: String,
    busy: bool,
    is_owner: bool,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

impl UiState {
    pub fn new(ticker: impl Into<String>) -> Self {
        UiState {
            mode: Mode::Normal,
            ticker: ticker.into(),
            busy: false,
            is_owner: false,
            terminal: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    BuyModal(BuyState),
    ManagerModal(ManagerState),
    PriceModal(String),
    QuitModal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct BuyState {
    count: u64,
}

impl Default for BuyState {
    fn default() -> Self {
        BuyState { count: 1 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ManagerState {
    slot: ManagerSlot,
    input: String,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // Create a single persistent Terminal to preserve buffers across draws
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

/// Terminal input read on a dedicated thread, since `event::read` blocks.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let event = event::read();
            let failed = event.is_err();
            if tx.send(event).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(input_events: &mut InputEventReceiver) -> Result<Event> {
    input_events
        .recv()
        .await
        .ok_or_else(|| eyre!("terminal input closed"))?
        .wrap_err("reading terminal input failed")
}

pub fn draw(state: &mut UiState, view: &View) -> Result<()> {
    // remembered for key handling between frames
    state.busy = view.snapshot.busy;
    state.is_owner = eligibility::is_owner(&view.snapshot);
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, view))?;
        state.terminal = Some(term);
    }
    Ok(())
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let k = match event {
        Event::Key(k) => k,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if k.kind != KeyEventKind::Press {
        return None;
    }
    // Modal handling
    match &mut state.mode {
        Mode::BuyModal(bs) => {
            return match k.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter => {
                    let count = bs.count;
                    state.mode = Mode::Normal;
                    Some(UserEvent::BuyTickets(count))
                }
                KeyCode::Up | KeyCode::Char('k') | KeyCode::Char('+') => {
                    bs.count = bs.count.saturating_add(1);
                    Some(UserEvent::Redraw)
                }
                KeyCode::Down | KeyCode::Char('j') | KeyCode::Char('-') => {
                    bs.count = bs.count.saturating_sub(1).max(1);
                    Some(UserEvent::Redraw)
                }
                KeyCode::Char(c) if c.is_ascii_digit() => {
                    let digit = u64::from(c as u8 - b'0');
                    bs.count = bs
                        .count
                        .checked_mul(10)
                        .and_then(|count| count.checked_add(digit))
                        .unwrap_or(bs.count);
                    Some(UserEvent::Redraw)
                }
                KeyCode::Backspace => {
                    bs.count = (bs.count / 10).max(1);
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::ManagerModal(ms) => {
            return match edit_text(&mut ms.input, k.code) {
                TextEdit::Cancel => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                TextEdit::Submit => {
                    let event = UserEvent::SetManager {
                        slot: ms.slot,
                        address: ms.input.trim().to_string(),
                    };
                    state.mode = Mode::Normal;
                    Some(event)
                }
                TextEdit::Changed => Some(UserEvent::Redraw),
                TextEdit::Ignored => None,
            };
        }
        Mode::PriceModal(input) => {
            return match edit_text(input, k.code) {
                TextEdit::Cancel => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                TextEdit::Submit => {
                    let event = UserEvent::SetPrice(input.trim().to_string());
                    state.mode = Mode::Normal;
                    Some(event)
                }
                TextEdit::Changed => Some(UserEvent::Redraw),
                TextEdit::Ignored => None,
            };
        }
        Mode::QuitModal => {
            return match k.code {
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

    match k.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            return Some(UserEvent::Redraw);
        }
        KeyCode::Char('r') => return Some(UserEvent::Refresh),
        _ => {}
    }
    // everything below starts a transaction
    if state.busy {
        return None;
    }
    match k.code {
        KeyCode::Char('l') => Some(UserEvent::Login),
        KeyCode::Char('a') => Some(UserEvent::Approve),
        KeyCode::Char('d') => Some(UserEvent::Draw),
        KeyCode::Char('b') => {
            state.mode = Mode::BuyModal(BuyState::default());
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('1') | KeyCode::Char('2') if state.is_owner => {
            let slot = if k.code == KeyCode::Char('1') {
                ManagerSlot::First
            } else {
                ManagerSlot::Second
            };
            state.mode = Mode::ManagerModal(ManagerState {
                slot,
                input: String::new(),
            });
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('p') if state.is_owner => {
            state.mode = Mode::PriceModal(String::new());
            Some(UserEvent::Redraw)
        }
        _ => None,
    }
}

enum TextEdit {
    Cancel,
    Submit,
    Changed,
    Ignored,
}

fn edit_text(input: &mut String, code: KeyCode) -> TextEdit {
    match code {
        KeyCode::Esc => TextEdit::Cancel,
        KeyCode::Enter => TextEdit::Submit,
        KeyCode::Backspace => {
            input.pop();
            TextEdit::Changed
        }
        KeyCode::Char(c) if !c.is_control() && input.len() < MAX_INPUT_LEN => {
            input.push(c);
            TextEdit::Changed
        }
        _ => TextEdit::Ignored,
    }
}

fn ui(f: &mut Frame, state: &UiState, view: &View) {
    // Clear the whole frame to avoid leftover fragments
    f.render_widget(Clear, f.area());
    let snap = &view.snapshot;
    let show_manager = eligibility::is_manager(snap);
    let show_owner = eligibility::is_owner(snap);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),                                   // user
            Constraint::Length(5),                                   // enter lottery
            Constraint::Length(if show_manager { 5 } else { 0 }),    // manager
            Constraint::Length(if show_owner { 6 } else { 0 }),      // owner
            Constraint::Min(5),                                      // status/errors
            Constraint::Length(3),                                   // help
        ])
        .split(f.area());

    draw_user_panel(f, chunks[0], state, snap);
    draw_lottery_panel(f, chunks[1], state, snap);
    if show_manager {
        draw_manager_panel(f, chunks[2], view);
    }
    if show_owner {
        draw_owner_panel(f, chunks[3], state, snap);
    }
    draw_bottom(f, chunks[4], chunks[5], &view.notices);
    draw_modals(f, state, snap);
    if snap.busy {
        draw_processing(f, snap);
    }
}

fn amount_text(amount: Option<TokenAmount>, ticker: &str) -> String {
    match amount {
        Some(amount) => format!("{amount} {ticker}"),
        None => String::from("N/A"),
    }
}

fn draw_user_panel(f: &mut Frame, area: Rect, state: &UiState, snap: &StateSnapshot) {
    let lines = match &snap.identity {
        Identity::Disconnected => vec![
            Line::from("Not logged in."),
            Line::from("Press l to log in with your wallet."),
        ],
        Identity::Connected(signer) => {
            let mut first = format!("Address: {}", signer.address);
            if signer.provisional {
                first.push_str(" (confirming...)");
            }
            vec![
                Line::from(first),
                Line::from(format!(
                    "Balance: {}",
                    amount_text(signer.balance, &state.ticker)
                )),
            ]
        }
    };
    let widget =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("User"));
    f.render_widget(widget, area);
}

fn draw_lottery_panel(f: &mut Frame, area: Rect, state: &UiState, snap: &StateSnapshot) {
    let approval = match snap.signer() {
        None => Line::from("Log in to buy tickets."),
        Some(signer) if signer.approved => Line::from(Span::styled(
            "Token spending approved. Press b to buy tickets.",
            Style::default().fg(Color::Green),
        )),
        Some(_) => Line::from(Span::styled(
            "Token spending not approved. Press a to approve, or b to approve and buy.",
            Style::default().fg(Color::Yellow),
        )),
    };
    let lines = vec![
        Line::from(format!(
            "Price pool: {}",
            amount_text(snap.price_pool, &state.ticker)
        )),
        Line::from(format!(
            "Ticket price: {}",
            amount_text(snap.ticket_price, &state.ticker)
        )),
        approval,
    ];
    let widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Enter Lottery"));
    f.render_widget(widget, area);
}

fn draw_manager_panel(f: &mut Frame, area: Rect, view: &View) {
    let snap = &view.snapshot;
    let countdown = match eligibility::seconds_until_draw(snap, view.now) {
        None => String::from("Next draw: unknown"),
        Some(0) => String::from("Next draw: available now"),
        Some(secs) => format!("Next draw: in {}m {:02}s", secs / 60, secs % 60),
    };
    let verdict = match eligibility::draw_blocker(snap, view.now) {
        None => Line::from(Span::styled(
            "Press d to draw the lottery.",
            Style::default().fg(Color::Green),
        )),
        Some(blocker) => Line::from(Span::styled(
            format!("Draw unavailable: {blocker}"),
            Style::default().fg(Color::DarkGray),
        )),
    };
    let pool = if eligibility::pool_is_drawable(snap) {
        "Pool: large enough to draw"
    } else {
        "Pool: needs at least one token"
    };
    let widget = Paragraph::new(vec![Line::from(countdown), Line::from(pool), verdict])
        .block(Block::default().borders(Borders::ALL).title("Manager"));
    f.render_widget(widget, area);
}

fn draw_owner_panel(f: &mut Frame, area: Rect, state: &UiState, snap: &StateSnapshot) {
    let slot = |address: Option<alloy_primitives::Address>| match address {
        Some(address) => short_address(&address),
        None => String::from("unassigned"),
    };
    let lines = vec![
        Line::from(format!("Manager 1: {} (press 1 to change)", slot(snap.manager1))),
        Line::from(format!("Manager 2: {} (press 2 to change)", slot(snap.manager2))),
        Line::from(format!(
            "Ticket price: {} (press p to change)",
            amount_text(snap.ticket_price, &state.ticker)
        )),
        Line::from(format!("Owner: {}", slot(snap.owner))),
    ];
    let widget =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Owner"));
    f.render_widget(widget, area);
}

fn draw_bottom(f: &mut Frame, status_area: Rect, help_area: Rect, notices: &Notices) {
    let status_widget = if notices.errors.is_empty() {
        let mut lines: Vec<Line> = Vec::new();
        if notices.status.trim().is_empty() {
            lines.push(Line::from("Ready"));
        } else {
            for line in notices.status.lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        // newest first
        let lines: Vec<Line> = notices
            .errors
            .iter()
            .rev()
            .map(|e| Line::from(e.clone()))
            .collect();
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Errors"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(status_widget, status_area);

    let help = Paragraph::new(
        "l login | a approve | b buy | 1/2 set manager | p set price | d draw | r refresh | q/Esc quit",
    )
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, help_area);
}

fn draw_modals(f: &mut Frame, state: &UiState, snap: &StateSnapshot) {
    match &state.mode {
        Mode::BuyModal(bs) => {
            let area = centered_rect(50, 30, f.area());
            let cost = snap
                .ticket_price
                .and_then(|price| {
                    price
                        .base_units()
                        .checked_mul(alloy_primitives::U256::from(bs.count))
                        .map(|units| TokenAmount::new(units, price.decimals()))
                })
                .map(|total| format!("{total} {}", state.ticker))
                .unwrap_or_else(|| String::from("N/A"));
            let block = Block::default().borders(Borders::ALL).title("Buy Tickets");
            let lines = vec![
                Line::from(format!("Tickets: {}", bs.count)),
                Line::from(format!("Total: {cost}")),
                Line::from(""),
                Line::from("Up/Down or digits to change, Enter to buy, Esc to cancel"),
            ];
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(Paragraph::new(lines), block.inner(area));
        }
        Mode::ManagerModal(ms) => {
            let title = format!("Set {}", ms.slot);
            draw_input_modal(f, &title, "New manager address (0x...):", &ms.input);
        }
        Mode::PriceModal(input) => {
            let prompt = format!("New ticket price in {}:", state.ticker);
            draw_input_modal(f, "Set Ticket Price", &prompt, input);
        }
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit the lottery client? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
    }
}

fn draw_input_modal(f: &mut Frame, title: &str, prompt: &str, input: &str) {
    let area = centered_rect(60, 25, f.area());
    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    let lines = vec![
        Line::from(prompt.to_string()),
        Line::from(Span::styled(
            format!("> {input}_"),
            Style::default().fg(Color::Cyan),
        )),
        Line::from(""),
        Line::from("Enter to submit, Esc to cancel"),
    ];
    f.render_widget(Clear, area);
    f.render_widget(block.clone(), area);
    f.render_widget(Paragraph::new(lines), block.inner(area));
}

fn draw_processing(f: &mut Frame, snap: &StateSnapshot) {
    let area = centered_rect(50, 20, f.area());
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Processing transaction...")
        .style(Style::default().fg(Color::Yellow));
    let message = if snap.load_message.is_empty() {
        String::from("Waiting for the wallet")
    } else {
        format!("{}...", snap.load_message)
    };
    let p = Paragraph::new(vec![Line::from(message), Line::from("Please wait.")])
        .wrap(Wrap { trim: true });
    f.render_widget(Clear, area);
    f.render_widget(block.clone(), area);
    f.render_widget(p, block.inner(area));
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

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}
