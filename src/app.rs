use std::{path::PathBuf, sync::Arc, time::Duration};

use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::{select, sync::mpsc};
use tracing::{debug, info, warn};

use crate::{
    account::{self, AccountContext, UpgradeOutcome},
    api::ApiClient,
    config::Config,
    contracts::{ContractList, ContractStore},
    protocol::ContractAnalysis,
    results::{ResultsTab, ResultsView},
    state::LatestAnalysis,
    tui::{
        self, AppViewModel, DashboardView, Event, ResultsScreenView, ScreenView, StatusLevel,
        StatusLine, TerminalGuard, UploadModalView,
    },
    workflow::{PendingRequest, StageKind, UploadFile, UploadWorkflow, WorkflowEvent},
};

pub struct ClauseLensApp {
    tick_rate: Duration,
    api: Arc<ApiClient>,
    account: AccountContext,
    latest: LatestAnalysis,
    workflow: UploadWorkflow<ApiClient>,
    contracts: ContractList<ApiClient>,
    screen: Screen,
    selected: Option<usize>,
    upload: Option<UploadModal>,
    pending_delete: Option<String>,
    loading_contracts: bool,
    status: Option<StatusLine>,
    show_help: bool,
    events: Option<mpsc::UnboundedSender<Event>>,
}

enum Screen {
    Dashboard,
    Results(ResultsState),
}

struct ResultsState {
    analysis: Arc<ContractAnalysis>,
    tab: ResultsTab,
    scroll: usize,
}

#[derive(Debug, Default)]
struct UploadModal {
    path_input: String,
}

impl ClauseLensApp {
    pub async fn bootstrap(config: Config) -> Result<Self> {
        let api = Arc::new(ApiClient::new(config.api_config())?);
        let account = AccountContext::load(&api).await;

        match &account.user {
            Some(user) => info!(user = %user.label(), "signed in"),
            None => info!(login = %api.login_url(), "no active session"),
        }

        Ok(Self::with_parts(api, account, config.request_timeout()))
    }

    fn with_parts(api: Arc<ApiClient>, account: AccountContext, request_timeout: Duration) -> Self {
        let latest = LatestAnalysis::default();
        Self {
            tick_rate: Duration::from_millis(250),
            workflow: UploadWorkflow::new(Arc::clone(&api), latest.clone(), request_timeout),
            contracts: ContractList::new(Arc::clone(&api)),
            api,
            account,
            latest,
            screen: Screen::Dashboard,
            selected: None,
            upload: None,
            pending_delete: None,
            loading_contracts: false,
            status: None,
            show_help: false,
            events: None,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        info!(api = %self.api.base_url(), "starting ClauseLens dashboard");

        let mut terminal = TerminalGuard::new()?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let event_handle = tui::spawn_event_loop(tx.clone(), self.tick_rate);
        self.events = Some(tx);
        self.request_contracts();

        loop {
            let view_model = self.build_view_model();

            terminal.draw(|frame| tui::render_app(frame, &view_model))?;

            let exit_requested = select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => self.handle_event(event).await,
                        None => true,
                    }
                }
                ctrl_c = tokio::signal::ctrl_c() => {
                    if let Err(err) = ctrl_c {
                        warn!(?err, "failed to listen for ctrl+c");
                    } else {
                        info!("received ctrl+c");
                    }
                    true
                }
            };

            if exit_requested {
                break;
            }
        }

        drop(terminal);
        self.events = None;
        drop(rx);

        if let Err(err) = event_handle.await {
            warn!(?err, "terminal event loop task ended unexpectedly");
        }

        info!("ClauseLens shutting down");
        Ok(())
    }

    fn build_view_model(&mut self) -> AppViewModel {
        let rows = self.contracts.rows();
        self.selected = clamp_selection(self.selected, rows.len());

        let screen = match &self.screen {
            Screen::Dashboard => ScreenView::Dashboard(DashboardView {
                summary: self.contracts.summary(),
                rows,
                selected: self.selected,
                loading: self.loading_contracts,
                loaded: self.contracts.is_loaded(),
            }),
            Screen::Results(state) => ScreenView::Results(ResultsScreenView {
                results: ResultsView::build(&state.analysis, self.is_premium()),
                tab: state.tab,
                scroll: state.scroll,
            }),
        };

        let account_label = match &self.account.user {
            Some(user) => user.label(),
            None => "not signed in".to_string(),
        };

        AppViewModel {
            api_url: self.api.base_url().to_string(),
            account_label,
            premium: self.is_premium(),
            screen,
            upload: self.upload.as_ref().map(|modal| UploadModalView {
                upload: self.workflow.view(),
                path_input: modal.path_input.clone(),
            }),
            confirm_delete: self.pending_delete.clone(),
            status: self.status.clone(),
            show_help: self.show_help,
        }
    }

    fn is_premium(&self) -> bool {
        self.account.subscription().is_active
    }

    async fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::Input(key) => return self.handle_key(key).await,
            Event::Tick => {}
            Event::Resize(width, height) => debug!(width, height, "terminal resized"),
            Event::Workflow(event) => {
                self.dispatch_workflow(event).await;
            }
            Event::ContractsFetched(outcome) => {
                self.loading_contracts = false;
                if let Err(err) = self.contracts.apply_fetch(outcome) {
                    let text = if err.is_unauthorized() {
                        format!("{} · sign in at {}", err, self.api.login_url())
                    } else {
                        err.to_string()
                    };
                    self.set_status(StatusLevel::Error, text);
                }
            }
            Event::ContractFetched(outcome) => match outcome {
                Ok(analysis) => self.open_results(Arc::new(analysis)),
                Err(err) => self.set_status(StatusLevel::Error, err.to_string()),
            },
            Event::ContractDeleted { id, outcome } => {
                match self.contracts.apply_delete(&id, outcome) {
                    Ok(()) => self.set_status(StatusLevel::Info, "Contract deleted successfully"),
                    Err(err) => self.set_status(StatusLevel::Error, err.to_string()),
                }
            }
            Event::Upgrade(outcome) => match outcome {
                Ok(UpgradeOutcome::AlreadyPremium) => {
                    self.set_status(StatusLevel::Info, "You are already a premium member")
                }
                Ok(UpgradeOutcome::Checkout { session_id }) => self.set_status(
                    StatusLevel::Info,
                    format!(
                        "Checkout session {} created · finish payment in your browser",
                        session_id
                    ),
                ),
                Err(err) => self.set_status(StatusLevel::Error, err.to_string()),
            },
        }

        false
    }

    async fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind == KeyEventKind::Release {
            return false;
        }

        if let KeyCode::Char('c') = key.code {
            if key.modifiers.contains(KeyModifiers::CONTROL) {
                return true;
            }
        }

        if self.show_help {
            if matches!(
                key.code,
                KeyCode::Char('q') | KeyCode::Char('?') | KeyCode::Enter | KeyCode::Esc
            ) {
                self.show_help = false;
            }
            return false;
        }

        if self.pending_delete.is_some() {
            self.handle_delete_key(key);
            return false;
        }

        if self.upload.is_some() {
            self.handle_upload_key(key).await;
            return false;
        }

        match self.screen {
            Screen::Dashboard => self.handle_dashboard_key(key).await,
            Screen::Results(_) => {
                self.handle_results_key(key);
                false
            }
        }
    }

    async fn handle_dashboard_key(&mut self, key: KeyEvent) -> bool {
        let len = self.contracts.records().len();

        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => return true,
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Char('u') => {
                self.status = None;
                self.upload = Some(UploadModal::default());
            }
            KeyCode::Char('r') => self.request_contracts(),
            KeyCode::Down | KeyCode::Char('j') => {
                self.selected = clamp_selection(Some(self.selected.map_or(0, |idx| idx + 1)), len);
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected =
                    clamp_selection(Some(self.selected.unwrap_or(0).saturating_sub(1)), len);
            }
            KeyCode::Enter => {
                if let Some(id) = self.selected_id() {
                    self.request_contract(id);
                }
            }
            KeyCode::Char('l') => match self.latest.snapshot().await {
                Some(analysis) => self.open_results(analysis),
                None => self.set_status(StatusLevel::Info, "No analysis in this session yet"),
            },
            KeyCode::Char('d') | KeyCode::Delete => self.pending_delete = self.selected_id(),
            KeyCode::Char('p') => self.request_upgrade(),
            _ => {}
        }

        false
    }

    fn handle_results_key(&mut self, key: KeyEvent) {
        let Screen::Results(state) = &mut self.screen else {
            return;
        };

        match key.code {
            KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') => {
                state.tab = state.tab.next();
                state.scroll = 0;
            }
            KeyCode::BackTab | KeyCode::Left | KeyCode::Char('h') => {
                state.tab = state.tab.previous();
                state.scroll = 0;
            }
            KeyCode::Down | KeyCode::Char('j') => state.scroll = state.scroll.saturating_add(1),
            KeyCode::Up | KeyCode::Char('k') => state.scroll = state.scroll.saturating_sub(1),
            KeyCode::PageDown => state.scroll = state.scroll.saturating_add(10),
            KeyCode::PageUp => state.scroll = state.scroll.saturating_sub(10),
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('q') => {
                self.screen = Screen::Dashboard;
            }
            _ => {}
        }
    }

    fn handle_delete_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                if let Some(id) = self.pending_delete.take() {
                    self.request_delete(id);
                }
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => self.pending_delete = None,
            _ => {}
        }
    }

    async fn handle_upload_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Esc {
            self.close_upload().await;
            return;
        }

        match self.workflow.session().stage().kind() {
            StageKind::Idle => match key.code {
                KeyCode::Enter => self.submit_upload().await,
                KeyCode::Delete => {
                    self.dispatch_workflow(WorkflowEvent::RemoveFile).await;
                }
                KeyCode::Backspace => {
                    if let Some(modal) = self.upload.as_mut() {
                        modal.path_input.pop();
                    }
                }
                KeyCode::Char(ch) => {
                    if let Some(modal) = self.upload.as_mut() {
                        modal.path_input.push(ch);
                    }
                }
                _ => {}
            },
            StageKind::Confirm => match key.code {
                KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('a') => {
                    self.dispatch_workflow(WorkflowEvent::ConfirmAnalysis).await;
                }
                KeyCode::Char('b') | KeyCode::Char('n') | KeyCode::Backspace => {
                    self.dispatch_workflow(WorkflowEvent::RejectType).await;
                }
                _ => {}
            },
            StageKind::Done => match key.code {
                KeyCode::Enter | KeyCode::Char('v') => {
                    if let Some(analysis) = self.latest.snapshot().await {
                        self.open_results(analysis);
                    }
                    self.close_upload().await;
                }
                KeyCode::Char('c') => self.close_upload().await,
                _ => {}
            },
            StageKind::Detecting | StageKind::Processing => {}
        }
    }

    async fn submit_upload(&mut self) {
        let input = self
            .upload
            .as_ref()
            .map(|modal| modal.path_input.trim().to_string())
            .unwrap_or_default();

        if input.is_empty() {
            self.dispatch_workflow(WorkflowEvent::DetectSelected).await;
            return;
        }

        let mut files = Vec::new();
        for path in split_paths(&input) {
            match UploadFile::from_path(&path).await {
                Ok(file) => files.push(file),
                Err(err) => {
                    warn!(%err, path = %path.display(), "failed to read upload");
                    self.set_status(
                        StatusLevel::Error,
                        format!("Could not read {}: {}", path.display(), err),
                    );
                    return;
                }
            }
        }

        if self.dispatch_workflow(WorkflowEvent::SelectFiles(files)).await {
            if let Some(modal) = self.upload.as_mut() {
                modal.path_input.clear();
            }
        }
    }

    async fn close_upload(&mut self) {
        self.dispatch_workflow(WorkflowEvent::Close).await;
        self.upload = None;
    }

    async fn dispatch_workflow(&mut self, event: WorkflowEvent) -> bool {
        let was_done = self.workflow.session().stage().kind() == StageKind::Done;

        let accepted = match self.workflow.dispatch(event).await {
            Ok(requests) => {
                if self.upload.is_some() {
                    self.status = None;
                }
                for request in requests {
                    self.spawn_workflow_request(request);
                }
                true
            }
            Err(err) => {
                debug!(%err, "upload action rejected");
                self.set_status(StatusLevel::Error, err.to_string());
                false
            }
        };

        if !was_done && self.workflow.session().stage().kind() == StageKind::Done {
            self.request_contracts();
        }
        accepted
    }

    fn spawn_workflow_request(&self, request: PendingRequest) {
        let Some(tx) = self.events.clone() else {
            return;
        };

        self.workflow.spawn_request(request, move |completion| {
            let _ = tx.send(Event::Workflow(completion));
        });
    }

    fn request_contracts(&mut self) {
        let Some(tx) = self.events.clone() else {
            return;
        };

        self.loading_contracts = true;
        let store = self.contracts.store();
        tokio::spawn(async move {
            let outcome = store.list().await;
            let _ = tx.send(Event::ContractsFetched(outcome));
        });
    }

    fn request_contract(&mut self, id: String) {
        let Some(tx) = self.events.clone() else {
            return;
        };

        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            let outcome = api.contract(&id).await;
            let _ = tx.send(Event::ContractFetched(outcome));
        });
    }

    fn request_delete(&mut self, id: String) {
        let Some(tx) = self.events.clone() else {
            return;
        };

        let store = self.contracts.store();
        tokio::spawn(async move {
            let outcome = store.delete(&id).await;
            let _ = tx.send(Event::ContractDeleted { id, outcome });
        });
    }

    fn request_upgrade(&mut self) {
        let Some(tx) = self.events.clone() else {
            return;
        };

        let api = Arc::clone(&self.api);
        let account = self.account.clone();
        tokio::spawn(async move {
            let outcome = account::start_upgrade(&api, &account).await;
            let _ = tx.send(Event::Upgrade(outcome));
        });
    }

    fn open_results(&mut self, analysis: Arc<ContractAnalysis>) {
        debug!(contract = %analysis.id, "opening results");
        self.screen = Screen::Results(ResultsState {
            analysis,
            tab: ResultsTab::Summary,
            scroll: 0,
        });
    }

    fn selected_id(&self) -> Option<String> {
        self.selected
            .and_then(|idx| self.contracts.records().get(idx))
            .map(|record| record.id.clone())
    }

    fn set_status(&mut self, level: StatusLevel, text: impl Into<String>) {
        self.status = Some(StatusLine {
            level,
            text: text.into(),
        });
    }
}

fn clamp_selection(selected: Option<usize>, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(selected.unwrap_or(0).min(len - 1))
}

fn split_paths(input: &str) -> Vec<PathBuf> {
    input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiConfig;
    use std::io::Write;

    fn app() -> ClauseLensApp {
        let api = ApiClient::new(ApiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            session_cookie: None,
            timeout: Duration::from_millis(200),
        })
        .unwrap();
        ClauseLensApp::with_parts(Arc::new(api), AccountContext::default(), Duration::from_secs(1))
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    async fn type_text(app: &mut ClauseLensApp, text: &str) {
        for ch in text.chars() {
            app.handle_event(Event::Input(key(KeyCode::Char(ch)))).await;
        }
    }

    #[test]
    fn selection_is_clamped_to_rows() {
        assert_eq!(clamp_selection(Some(5), 3), Some(2));
        assert_eq!(clamp_selection(None, 3), Some(0));
        assert_eq!(clamp_selection(Some(1), 0), None);
    }

    #[test]
    fn split_paths_ignores_blank_entries() {
        let paths = split_paths(" a.pdf, ,b.pdf ,");
        assert_eq!(paths, vec![PathBuf::from("a.pdf"), PathBuf::from("b.pdf")]);
    }

    #[tokio::test]
    async fn upload_modal_captures_path_and_closes_on_escape() {
        let mut app = app();

        app.handle_event(Event::Input(key(KeyCode::Char('u')))).await;
        type_text(&mut app, "quit.pdf").await;
        app.handle_event(Event::Input(key(KeyCode::Backspace))).await;

        let view = app.build_view_model();
        let modal = view.upload.expect("modal open");
        assert_eq!(modal.path_input, "quit.pd");
        assert_eq!(modal.upload.stage, StageKind::Idle);

        let quit = app.handle_event(Event::Input(key(KeyCode::Esc))).await;
        assert!(!quit);
        assert!(app.build_view_model().upload.is_none());
    }

    #[tokio::test]
    async fn non_pdf_upload_is_rejected_without_leaving_idle() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        file.write_all(b"plain text").unwrap();

        let mut app = app();
        app.handle_event(Event::Input(key(KeyCode::Char('u')))).await;
        type_text(&mut app, &file.path().display().to_string()).await;
        app.handle_event(Event::Input(key(KeyCode::Enter))).await;

        let view = app.build_view_model();
        assert_eq!(view.upload.unwrap().upload.stage, StageKind::Idle);
        let status = view.status.expect("validation error shown");
        assert_eq!(status.level, StatusLevel::Error);
        assert!(status.text.ends_with("is not a PDF. Only PDF files are accepted."));
    }

    #[tokio::test]
    async fn first_enter_selects_the_file_and_second_starts_detection() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(b"%PDF-1.7").unwrap();

        let mut app = app();
        app.handle_event(Event::Input(key(KeyCode::Char('u')))).await;
        type_text(&mut app, &file.path().display().to_string()).await;
        app.handle_event(Event::Input(key(KeyCode::Enter))).await;

        let modal = app.build_view_model().upload.unwrap();
        assert_eq!(modal.upload.stage, StageKind::Idle);
        assert!(modal.upload.can_analyze);
        assert!(modal.path_input.is_empty());
        assert!(modal.upload.file_label.unwrap().ends_with(".pdf (0 KB)"));

        app.handle_event(Event::Input(key(KeyCode::Enter))).await;
        let modal = app.build_view_model().upload.unwrap();
        assert_eq!(modal.upload.stage, StageKind::Detecting);
    }

    #[tokio::test]
    async fn enter_without_a_file_reports_validation_error() {
        let mut app = app();
        app.handle_event(Event::Input(key(KeyCode::Char('u')))).await;
        app.handle_event(Event::Input(key(KeyCode::Enter))).await;

        let view = app.build_view_model();
        assert_eq!(view.upload.unwrap().upload.stage, StageKind::Idle);
        assert_eq!(view.status.unwrap().text, "No file selected");
    }

    #[tokio::test]
    async fn resize_and_tick_keep_the_app_running() {
        let mut app = app();
        assert!(!app.handle_event(Event::Resize(120, 40)).await);
        assert!(!app.handle_event(Event::Tick).await);
    }

    #[tokio::test]
    async fn quit_only_from_dashboard() {
        let mut app = app();
        assert!(!app.handle_event(Event::Input(key(KeyCode::Char('?')))).await);
        assert!(app.show_help);
        assert!(!app.handle_event(Event::Input(key(KeyCode::Char('q')))).await);
        assert!(!app.show_help);
        assert!(app.handle_event(Event::Input(key(KeyCode::Char('q')))).await);
    }

    #[tokio::test]
    async fn failed_delete_reports_and_keeps_list() {
        let mut app = app();
        let record: ContractAnalysis =
            serde_json::from_value(serde_json::json!({ "_id": "c1", "overallScore": 70 })).unwrap();
        app.handle_event(Event::ContractsFetched(Ok(vec![record]))).await;

        app.handle_event(Event::ContractDeleted {
            id: "c1".into(),
            outcome: Err(crate::api::ApiError::Server {
                status: 500,
                message: "Failed to delete contract".into(),
            }),
        })
        .await;

        let view = app.build_view_model();
        let ScreenView::Dashboard(dashboard) = view.screen else {
            panic!("expected dashboard");
        };
        assert_eq!(dashboard.rows.len(), 1);
        assert_eq!(view.status.unwrap().text, "Failed to delete contract");
    }
}
