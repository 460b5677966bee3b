use std::{
    io::{self, Stdout},
    time::{Duration, Instant},
};

use color_eyre::Result;
use crossterm::{
    event::{self, Event as CrosstermEvent, KeyEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Gauge, Paragraph, Row, Table, TableState, Tabs, Wrap},
};
use tokio::{sync::mpsc, task};
use tracing::{debug, error};

use crate::{
    account::UpgradeOutcome,
    api::ApiError,
    contracts::{BadgeColor, ContractRow, ContractsSummary},
    protocol::ContractAnalysis,
    results::{Bucket, FindingKind, FindingView, ResultsTab, ResultsView, ScoreTrend},
    workflow::{StageKind, UploadView, WorkflowEvent},
};

#[derive(Debug)]
pub enum Event {
    Input(KeyEvent),
    Tick,
    Resize(u16, u16),
    Workflow(WorkflowEvent),
    ContractsFetched(Result<Vec<ContractAnalysis>, ApiError>),
    ContractFetched(Result<ContractAnalysis, ApiError>),
    ContractDeleted {
        id: String,
        outcome: Result<(), ApiError>,
    },
    Upgrade(Result<UpgradeOutcome, ApiError>),
}

#[derive(Debug, Clone)]
pub struct AppViewModel {
    pub api_url: String,
    pub account_label: String,
    pub premium: bool,
    pub screen: ScreenView,
    pub upload: Option<UploadModalView>,
    pub confirm_delete: Option<String>,
    pub status: Option<StatusLine>,
    pub show_help: bool,
}

#[derive(Debug, Clone)]
pub enum ScreenView {
    Dashboard(DashboardView),
    Results(ResultsScreenView),
}

#[derive(Debug, Clone)]
pub struct DashboardView {
    pub summary: ContractsSummary,
    pub rows: Vec<ContractRow>,
    pub selected: Option<usize>,
    pub loading: bool,
    pub loaded: bool,
}

#[derive(Debug, Clone)]
pub struct ResultsScreenView {
    pub results: ResultsView,
    pub tab: ResultsTab,
    pub scroll: usize,
}

#[derive(Debug, Clone)]
pub struct UploadModalView {
    pub upload: UploadView,
    pub path_input: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusLine {
    pub level: StatusLevel,
    pub text: String,
}

pub struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    pub fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.hide_cursor()?;

        Ok(Self { terminal })
    }

    pub fn draw<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Frame<'_>),
    {
        self.terminal.draw(f)?;
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(err) = disable_raw_mode() {
            error!(?err, "failed to disable raw mode");
        }

        let mut stdout = io::stdout();
        if let Err(err) = execute!(stdout, LeaveAlternateScreen) {
            error!(?err, "failed to leave alternate screen");
        }

        if let Err(err) = self.terminal.show_cursor() {
            error!(?err, "failed to show cursor");
        }
    }
}

pub fn spawn_event_loop(
    tx: mpsc::UnboundedSender<Event>,
    tick_rate: Duration,
) -> task::JoinHandle<()> {
    task::spawn_blocking(move || {
        let mut last_tick = Instant::now();

        loop {
            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_secs(0));

            match event::poll(timeout) {
                Ok(true) => match event::read() {
                    Ok(CrosstermEvent::Key(key)) => {
                        if tx.send(Event::Input(key)).is_err() {
                            break;
                        }
                    }
                    Ok(CrosstermEvent::Resize(w, h)) => {
                        if tx.send(Event::Resize(w, h)).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        error!(?err, "failed to read terminal event");
                        break;
                    }
                },
                Ok(false) => {}
                Err(err) => {
                    error!(?err, "failed to poll terminal events");
                    break;
                }
            }

            if last_tick.elapsed() >= tick_rate {
                if tx.send(Event::Tick).is_err() {
                    break;
                }
                last_tick = Instant::now();
            }
        }

        debug!("terminal event loop terminated");
    })
}

pub fn render_app(frame: &mut Frame<'_>, view_model: &AppViewModel) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(1),
            Constraint::Length(2),
        ])
        .split(frame.size());

    render_header(frame, layout[0], view_model);
    match &view_model.screen {
        ScreenView::Dashboard(dashboard) => render_dashboard(frame, layout[1], dashboard),
        ScreenView::Results(results) => render_results(frame, layout[1], results),
    }
    render_status(frame, layout[2], view_model.status.as_ref());
    render_footer(frame, layout[3], view_model);

    if let Some(upload) = &view_model.upload {
        render_upload_modal(frame, upload);
    }

    if let Some(id) = &view_model.confirm_delete {
        render_delete_dialog(frame, id);
    }

    if view_model.show_help {
        render_help(frame);
    }
}

fn render_header(frame: &mut Frame<'_>, area: Rect, view_model: &AppViewModel) {
    let plan = if view_model.premium { "premium" } else { "free" };
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .title(format!(
            "ClauseLens · {} · {} plan @ {}",
            view_model.account_label, plan, view_model.api_url
        ))
        .style(Style::default().fg(Color::Cyan));

    frame.render_widget(block, area);
}

fn render_dashboard(frame: &mut Frame<'_>, area: Rect, dashboard: &DashboardView) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3)])
        .split(area);

    let cards = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(layout[0]);

    let summary = &dashboard.summary;
    render_card(frame, cards[0], "Total Contracts", summary.total.to_string());
    render_card(
        frame,
        cards[1],
        "Average Score",
        format!("{:.2}", summary.average_score),
    );
    render_card(frame, cards[2], "High Risk Contracts", summary.high_risk.to_string());

    let block = Block::default()
        .title("Your Contracts")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title_style(
            Style::default()
                .fg(Color::LightBlue)
                .add_modifier(Modifier::BOLD),
        );

    if dashboard.rows.is_empty() {
        let message = if dashboard.loading || !dashboard.loaded {
            "Loading contracts…\n\nPress `?` for help."
        } else {
            "No contracts analyzed yet.\n\nPress `u` to upload a PDF contract for analysis."
        };
        let content = Paragraph::new(message)
            .wrap(Wrap { trim: true })
            .style(Style::default().fg(Color::Gray));

        frame.render_widget(block, layout[1]);
        frame.render_widget(content, inner(layout[1]));
        return;
    }

    let rows = dashboard.rows.iter().map(|row| {
        Row::new(vec![
            Cell::from(row.id.clone()),
            Cell::from(row.score_label.clone()).style(
                Style::default()
                    .fg(badge_color(row.tier.color()))
                    .add_modifier(Modifier::BOLD),
            ),
            Cell::from(row.contract_type.clone())
                .style(Style::default().fg(badge_color(row.type_badge))),
        ])
    });

    let header = Row::new(vec!["Contract Id", "Overall Score", "Contract Type"]).style(
        Style::default()
            .fg(Color::LightBlue)
            .add_modifier(Modifier::BOLD),
    );

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(45),
            Constraint::Percentage(20),
            Constraint::Percentage(35),
        ],
    )
    .header(header)
    .block(block)
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("› ");

    let mut state = TableState::default();
    state.select(dashboard.selected);
    frame.render_stateful_widget(table, layout[1], &mut state);
}

fn render_card(frame: &mut Frame<'_>, area: Rect, title: &str, value: String) {
    let paragraph = Paragraph::new(Line::from(Span::styled(
        value,
        Style::default().add_modifier(Modifier::BOLD),
    )))
    .block(
        Block::default()
            .title(title.to_string())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    frame.render_widget(paragraph, area);
}

fn render_results(frame: &mut Frame<'_>, area: Rect, screen: &ResultsScreenView) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(3),
        ])
        .split(area);

    let results = &screen.results;
    let trend_color = match results.trend {
        ScoreTrend::Good => Color::Green,
        ScoreTrend::Average => Color::Yellow,
        ScoreTrend::Bad => Color::Red,
    };
    let percent = results.score.clamp(0.0, 100.0).round() as u16;
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(
                    "{} contract · Overall Contract Score",
                    results.contract_type
                )),
        )
        .gauge_style(Style::default().fg(trend_color))
        .percent(percent)
        .label(format!(
            "{} · {} · risk {}% / opportunities {}%",
            results.score,
            results.trend.label(),
            results.risk_percent,
            results.opportunity_percent
        ));
    frame.render_widget(gauge, layout[0]);

    let titles: Vec<&str> = ResultsTab::ALL.iter().map(|tab| tab.title()).collect();
    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL))
        .select(screen.tab.index())
        .highlight_style(
            Style::default()
                .fg(Color::LightBlue)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, layout[1]);

    let block = Block::default()
        .title(screen.tab.title())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(block, layout[2]);

    let scroll = screen.scroll.min(u16::MAX as usize) as u16;
    let paragraph = Paragraph::new(results_lines(results, screen.tab))
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    frame.render_widget(paragraph, inner(layout[2]));
}

pub fn results_lines(results: &ResultsView, tab: ResultsTab) -> Vec<Line<'static>> {
    match tab {
        ResultsTab::Summary => vec![Line::from(results.summary.clone())],
        ResultsTab::Risks => finding_lines(results, FindingKind::Risk),
        ResultsTab::Opportunities => finding_lines(results, FindingKind::Opportunity),
        ResultsTab::Details => detail_lines(results),
    }
}

fn finding_lines(results: &ResultsView, kind: FindingKind) -> Vec<Line<'static>> {
    let findings = results.findings(kind);
    if findings.is_empty() {
        return vec![Line::from(Span::styled(
            "None identified.",
            Style::default().fg(Color::DarkGray),
        ))];
    }

    let mut lines = Vec::new();
    for finding in findings {
        match finding {
            FindingView::Visible(entry) => {
                lines.push(Line::from(vec![
                    Span::styled(
                        entry.title.clone(),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::raw("  "),
                    Span::styled(
                        format!("{}: {}", kind.level_label(), entry.level),
                        Style::default().fg(bucket_color(entry.bucket)),
                    ),
                ]));
                if !entry.explanation.is_empty() {
                    lines.push(Line::from(Span::styled(
                        format!("  {}", entry.explanation),
                        Style::default().fg(Color::Gray),
                    )));
                }
                lines.push(Line::default());
            }
            FindingView::Locked {
                preview,
                hidden_count,
            } => {
                let veiled = Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::DIM);
                lines.push(Line::from(vec![
                    Span::styled(obscure(&preview.title), veiled),
                    Span::raw("  "),
                    Span::styled(
                        format!("{}: {}", kind.level_label(), obscure(&preview.level)),
                        veiled,
                    ),
                ]));
                lines.push(Line::from(Span::styled(
                    format!("  {}", obscure(&preview.explanation)),
                    veiled,
                )));
                lines.push(Line::from(Span::styled(
                    format!(
                        "🔒 {} more {} hidden · upgrade to premium (press `p` on the dashboard)",
                        hidden_count,
                        match kind {
                            FindingKind::Risk => "risks",
                            FindingKind::Opportunity => "opportunities",
                        }
                    ),
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )));
            }
        }
    }
    lines
}

fn detail_lines(results: &ResultsView) -> Vec<Line<'static>> {
    let details = &results.details;
    let heading = |text: &'static str| {
        Line::from(Span::styled(
            text,
            Style::default()
                .fg(Color::LightBlue)
                .add_modifier(Modifier::BOLD),
        ))
    };

    let mut lines = vec![heading("Key Clauses")];
    lines.extend(details.key_clauses.iter().map(|clause| Line::from(format!("• {}", clause))));
    lines.push(Line::from(Span::styled(
        format!("  {}", details.clause_details),
        Style::default().fg(Color::Gray),
    )));
    lines.push(Line::default());

    lines.push(heading("Legal Compliance"));
    lines.push(Line::from(details.legal_compliance.clone()));
    lines.push(Line::default());

    lines.push(heading("Recommendations"));
    lines.extend(details.recommendations.iter().map(|item| Line::from(format!("• {}", item))));
    lines.push(Line::default());

    lines.push(heading("Negotiation Points"));
    lines.extend(details.negotiation_points.iter().map(|item| Line::from(format!("• {}", item))));
    lines
}

/// Keeps the shape of the text while hiding its content.
fn obscure(text: &str) -> String {
    text.chars()
        .map(|ch| if ch.is_alphanumeric() { '░' } else { ch })
        .collect()
}

fn render_status(frame: &mut Frame<'_>, area: Rect, status: Option<&StatusLine>) {
    let Some(status) = status else {
        return;
    };

    let color = match status.level {
        StatusLevel::Info => Color::Green,
        StatusLevel::Error => Color::Red,
    };
    let paragraph = Paragraph::new(status.text.clone()).style(Style::default().fg(color));
    frame.render_widget(paragraph, area);
}

fn render_footer(frame: &mut Frame<'_>, area: Rect, view_model: &AppViewModel) {
    let keymap = match &view_model.screen {
        ScreenView::Dashboard(_) => {
            "q quit · u upload · ↑/↓ select · Enter open · d delete · r refresh · l latest · p upgrade · ? help"
        }
        ScreenView::Results(_) => "Tab/←/→ switch tab · ↑/↓ scroll · Esc back · ? help",
    };

    let block = Block::default()
        .borders(Borders::TOP)
        .title("Keymap")
        .style(Style::default().fg(Color::DarkGray));
    let content = Paragraph::new(keymap).style(Style::default().fg(Color::DarkGray));

    frame.render_widget(block, area);
    frame.render_widget(content, inner_top(area));
}

fn render_upload_modal(frame: &mut Frame<'_>, modal: &UploadModalView) {
    let area = centered_rect(70, 60, frame.size());
    frame.render_widget(Clear, area);

    let upload = &modal.upload;
    let block = Block::default()
        .title(upload.title.clone())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title_style(
            Style::default()
                .fg(Color::LightBlue)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(block, area);

    let mut lines = vec![
        Line::from(Span::styled(
            upload.description.clone(),
            Style::default().fg(Color::Gray),
        )),
        Line::default(),
    ];

    if let Some(error) = &upload.error {
        lines.push(Line::from(Span::styled(
            format!("⚠ {}", error),
            Style::default().fg(Color::Red),
        )));
        lines.push(Line::default());
    }

    match upload.stage {
        StageKind::Idle => {
            if let Some(file) = &upload.file_label {
                lines.push(Line::from(Span::styled(
                    format!("Selected: {}", file),
                    Style::default().fg(Color::Green),
                )));
            }
            lines.push(Line::from(Span::styled(
                "Note: Only PDF files are accepted.",
                Style::default().fg(Color::Yellow),
            )));
            lines.push(Line::default());
            lines.push(Line::from(vec![
                Span::raw("Path: "),
                Span::styled(
                    format!("{}▏", modal.path_input),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
            ]));
            lines.push(Line::default());
            let hint = if upload.can_analyze {
                "Enter analyze contract with AI · Del remove file · Esc close"
            } else {
                "Type the path to a PDF and press Enter · Esc close"
            };
            lines.push(Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))));
        }
        StageKind::Detecting | StageKind::Processing => {
            lines.push(Line::from(Span::styled(
                "✦ working…",
                Style::default()
                    .fg(Color::LightMagenta)
                    .add_modifier(Modifier::SLOW_BLINK),
            )));
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                "Esc cancel",
                Style::default().fg(Color::DarkGray),
            )));
        }
        StageKind::Confirm => {
            lines.push(Line::from(Span::styled(
                upload.detected_type.clone().unwrap_or_default(),
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from("Would you like to proceed with the analysis?"));
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                "Enter analyze now · b back · Esc close",
                Style::default().fg(Color::DarkGray),
            )));
        }
        StageKind::Done => {
            lines.push(Line::from(Span::styled(
                "v view results · c/Esc close",
                Style::default().fg(Color::DarkGray),
            )));
        }
    }

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, inner(area));
}

fn render_delete_dialog(frame: &mut Frame<'_>, id: &str) {
    let area = centered_rect(60, 35, frame.size());
    frame.render_widget(Clear, area);

    let block = Block::default()
        .title("Are you absolutely sure?")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));
    frame.render_widget(block, area);

    let lines = vec![
        Line::from(format!(
            "This action cannot be undone. This will permanently delete contract {} and remove your data from our servers.",
            id
        )),
        Line::default(),
        Line::from(Span::styled(
            "y continue · n cancel",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner(area));
}

fn render_help(frame: &mut Frame<'_>) {
    let area = centered_rect(60, 70, frame.size());
    frame.render_widget(Clear, area);

    let entries = [
        ("u", "upload a contract for analysis"),
        ("↑/↓ j/k", "select a contract"),
        ("Enter", "open the selected contract"),
        ("l", "open the latest analysis"),
        ("d", "delete the selected contract"),
        ("r", "refresh the contract list"),
        ("p", "upgrade to premium"),
        ("Tab", "switch results tab"),
        ("Esc", "close dialog / go back"),
        ("q", "quit"),
    ];

    let lines: Vec<Line> = entries
        .iter()
        .map(|(key, action)| {
            Line::from(vec![
                Span::styled(
                    format!("{:<10}", key),
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw(*action),
            ])
        })
        .collect();

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .title("Help · Enter/q/? to close")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(paragraph, area);
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

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn inner(area: Rect) -> Rect {
    Rect {
        x: area.x + 1,
        y: area.y + 1,
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(2),
    }
}

fn inner_top(area: Rect) -> Rect {
    Rect {
        x: area.x,
        y: area.y + 1,
        width: area.width,
        height: area.height.saturating_sub(1),
    }
}

fn bucket_color(bucket: Bucket) -> Color {
    match bucket {
        Bucket::High => Color::Red,
        Bucket::Medium => Color::Yellow,
        Bucket::Low => Color::Green,
        Bucket::Unknown => Color::Gray,
    }
}

fn badge_color(badge: BadgeColor) -> Color {
    match badge {
        BadgeColor::Blue => Color::Blue,
        BadgeColor::Green => Color::Green,
        BadgeColor::Yellow => Color::Yellow,
        BadgeColor::Emerald => Color::LightGreen,
        BadgeColor::Pink => Color::LightMagenta,
        BadgeColor::Orange => Color::LightRed,
        BadgeColor::Red => Color::Red,
        BadgeColor::Gray => Color::Gray,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plain(lines: &[Line<'_>]) -> String {
        lines
            .iter()
            .map(|line| {
                line.spans
                    .iter()
                    .map(|span| span.content.as_ref())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn locked_preview_is_obscured() {
        let analysis: ContractAnalysis = serde_json::from_value(json!({
            "_id": "c1",
            "risks": [
                { "risk": "a" }, { "risk": "b" }, { "risk": "c" },
                { "risk": "Hidden clause", "severity": "high", "explanation": "secret" }
            ]
        }))
        .unwrap();
        let results = ResultsView::build(&analysis, false);

        let text = plain(&results_lines(&results, ResultsTab::Risks));
        assert!(!text.contains("Hidden clause"));
        assert!(!text.contains("secret"));
        assert!(text.contains("1 more risks hidden"));
    }

    #[test]
    fn obscure_keeps_spacing() {
        assert_eq!(obscure("Net 30, due"), "░░░ ░░, ░░░");
    }

    #[test]
    fn centered_rect_stays_inside_area() {
        let area = Rect::new(0, 0, 100, 40);
        let modal = centered_rect(70, 60, area);
        assert!(modal.x >= area.x && modal.right() <= area.right());
        assert!(modal.y >= area.y && modal.bottom() <= area.bottom());
    }
}
