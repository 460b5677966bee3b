use std::{fmt, path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{api::ApiError, protocol::ContractAnalysis, state::LatestAnalysis};

pub const PDF_MEDIA_TYPE: &str = "application/pdf";
const OCTET_STREAM: &str = "application/octet-stream";

#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn detect_type(&self, file: &UploadFile) -> Result<String, ApiError>;

    async fn analyze(
        &self,
        file: &UploadFile,
        contract_type: &str,
    ) -> Result<ContractAnalysis, ApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    name: String,
    media_type: String,
    data: Arc<[u8]>,
}

impl UploadFile {
    pub fn new(
        name: impl Into<String>,
        media_type: impl Into<String>,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "contract".to_string());

        Ok(Self::new(name, media_type_for(path), data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn size_kb(&self) -> u64 {
        (self.data.len() as f64 / 1024.0).round() as u64
    }

    pub fn is_pdf(&self) -> bool {
        self.media_type.eq_ignore_ascii_case(PDF_MEDIA_TYPE)
    }
}

fn media_type_for(path: &Path) -> &'static str {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if is_pdf { PDF_MEDIA_TYPE } else { OCTET_STREAM }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Idle,
    Detecting,
    Confirm {
        detected_type: String,
    },
    Processing {
        detected_type: String,
    },
    Done {
        detected_type: String,
        result: Arc<ContractAnalysis>,
    },
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Idle => StageKind::Idle,
            Stage::Detecting => StageKind::Detecting,
            Stage::Confirm { .. } => StageKind::Confirm,
            Stage::Processing { .. } => StageKind::Processing,
            Stage::Done { .. } => StageKind::Done,
        }
    }

    pub fn detected_type(&self) -> Option<&str> {
        match self {
            Stage::Confirm { detected_type }
            | Stage::Processing { detected_type }
            | Stage::Done { detected_type, .. } => Some(detected_type),
            Stage::Idle | Stage::Detecting => None,
        }
    }

    pub fn analysis_result(&self) -> Option<&Arc<ContractAnalysis>> {
        match self {
            Stage::Done { result, .. } => Some(result),
            _ => None,
        }
    }

    fn request_in_flight(&self) -> bool {
        matches!(self, Stage::Detecting | Stage::Processing { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Idle,
    Detecting,
    Confirm,
    Processing,
    Done,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StageKind::Idle => "idle",
            StageKind::Detecting => "detecting",
            StageKind::Confirm => "confirm",
            StageKind::Processing => "processing",
            StageKind::Done => "done",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct UploadSession {
    id: Uuid,
    generation: u64,
    stage: Stage,
    selected_file: Option<UploadFile>,
    last_error: Option<String>,
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            generation: 0,
            stage: Stage::Idle,
            selected_file: None,
            last_error: None,
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn selected_file(&self) -> Option<&UploadFile> {
        self.selected_file.as_ref()
    }

    pub fn detected_type(&self) -> Option<&str> {
        self.stage.detected_type()
    }

    pub fn analysis_result(&self) -> Option<&Arc<ContractAnalysis>> {
        self.stage.analysis_result()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn reset(&mut self) {
        self.id = Uuid::new_v4();
        self.generation += 1;
        self.stage = Stage::Idle;
        self.selected_file = None;
        self.last_error = None;
    }

    fn request(&self, kind: RequestKind) -> Effect {
        Effect::Request(PendingRequest {
            generation: self.generation,
            session_id: self.id,
            kind,
        })
    }
}

#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    SelectFiles(Vec<UploadFile>),
    RemoveFile,
    BeginDetection {
        files: Vec<UploadFile>,
    },
    DetectSelected,
    DetectionFinished {
        generation: u64,
        outcome: Result<String, ApiError>,
    },
    RejectType,
    ConfirmAnalysis,
    AnalysisFinished {
        generation: u64,
        outcome: Result<Arc<ContractAnalysis>, ApiError>,
    },
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("cannot {action} while the upload is {stage}")]
    InvalidStage {
        action: &'static str,
        stage: StageKind,
    },
    #[error("A request is already in progress for this upload")]
    ConcurrentRequest,
}

#[derive(Debug, Clone)]
pub enum Effect {
    Request(PendingRequest),
    PublishResult(Arc<ContractAnalysis>),
}

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub generation: u64,
    pub session_id: Uuid,
    pub kind: RequestKind,
}

#[derive(Debug, Clone)]
pub enum RequestKind {
    Detect {
        file: UploadFile,
    },
    Analyze {
        file: UploadFile,
        contract_type: String,
    },
}

impl PendingRequest {
    pub async fn run<B>(self, backend: &B, limit: Duration) -> WorkflowEvent
    where
        B: AnalysisBackend + ?Sized,
    {
        let generation = self.generation;
        match self.kind {
            RequestKind::Detect { file } => {
                debug!(
                    session = %self.session_id,
                    generation,
                    file = file.name(),
                    "detecting contract type"
                );
                let outcome = with_timeout(limit, backend.detect_type(&file)).await;
                WorkflowEvent::DetectionFinished {
                    generation,
                    outcome,
                }
            }
            RequestKind::Analyze {
                file,
                contract_type,
            } => {
                debug!(
                    session = %self.session_id,
                    generation,
                    %contract_type,
                    "analyzing contract"
                );
                let outcome = with_timeout(limit, backend.analyze(&file, &contract_type))
                    .await
                    .map(Arc::new);
                WorkflowEvent::AnalysisFinished {
                    generation,
                    outcome,
                }
            }
        }
    }
}

async fn with_timeout<T, F>(limit: Duration, request: F) -> Result<T, ApiError>
where
    F: std::future::Future<Output = Result<T, ApiError>>,
{
    match tokio::time::timeout(limit, request).await {
        Ok(outcome) => outcome,
        Err(_) => Err(ApiError::Timeout),
    }
}

/// Rejected events leave the session untouched.
pub fn reduce(
    session: &mut UploadSession,
    event: WorkflowEvent,
) -> Result<Vec<Effect>, WorkflowError> {
    match event {
        WorkflowEvent::SelectFiles(files) => {
            require_idle(session, "select a file")?;
            let file = single_pdf(files)?;
            session.selected_file = Some(file);
            session.last_error = None;
            Ok(Vec::new())
        }
        WorkflowEvent::RemoveFile => {
            require_idle(session, "remove the file")?;
            session.selected_file = None;
            session.last_error = None;
            Ok(Vec::new())
        }
        WorkflowEvent::BeginDetection { files } => {
            require_request_slot(session)?;
            require_idle(session, "start detection")?;
            let file = single_pdf(files)?;
            Ok(start_detection(session, file))
        }
        WorkflowEvent::DetectSelected => {
            require_request_slot(session)?;
            require_idle(session, "start detection")?;
            let file = session
                .selected_file
                .clone()
                .ok_or_else(|| WorkflowError::Validation("No file selected".to_string()))?;
            Ok(start_detection(session, file))
        }
        WorkflowEvent::DetectionFinished {
            generation,
            outcome,
        } => {
            if generation != session.generation || session.stage != Stage::Detecting {
                debug!(
                    generation,
                    current = session.generation,
                    "dropping stale detection response"
                );
                return Ok(Vec::new());
            }

            match outcome {
                Ok(detected_type) => {
                    info!(session = %session.id, %detected_type, "contract type detected");
                    session.stage = Stage::Confirm { detected_type };
                }
                Err(err) => {
                    warn!(session = %session.id, %err, "contract type detection failed");
                    session.stage = Stage::Idle;
                    session.last_error = Some(err.to_string());
                }
            }
            Ok(Vec::new())
        }
        WorkflowEvent::RejectType => match &session.stage {
            Stage::Confirm { .. } => {
                session.stage = Stage::Idle;
                session.last_error = None;
                Ok(Vec::new())
            }
            other => Err(WorkflowError::InvalidStage {
                action: "go back",
                stage: other.kind(),
            }),
        },
        WorkflowEvent::ConfirmAnalysis => {
            require_request_slot(session)?;
            let detected_type = match &session.stage {
                Stage::Confirm { detected_type } => detected_type.clone(),
                other => {
                    return Err(WorkflowError::InvalidStage {
                        action: "confirm the analysis",
                        stage: other.kind(),
                    });
                }
            };
            let file = session
                .selected_file
                .clone()
                .ok_or_else(|| WorkflowError::Validation("No file selected".to_string()))?;

            session.last_error = None;
            session.stage = Stage::Processing {
                detected_type: detected_type.clone(),
            };
            Ok(vec![session.request(RequestKind::Analyze {
                file,
                contract_type: detected_type,
            })])
        }
        WorkflowEvent::AnalysisFinished {
            generation,
            outcome,
        } => {
            let detected_type = match &session.stage {
                Stage::Processing { detected_type } if generation == session.generation => {
                    detected_type.clone()
                }
                _ => {
                    debug!(
                        generation,
                        current = session.generation,
                        "dropping stale analysis response"
                    );
                    return Ok(Vec::new());
                }
            };

            match outcome {
                Ok(result) => {
                    info!(session = %session.id, contract = %result.id, "analysis completed");
                    session.stage = Stage::Done {
                        detected_type,
                        result: Arc::clone(&result),
                    };
                    Ok(vec![Effect::PublishResult(result)])
                }
                Err(err) => {
                    warn!(session = %session.id, %err, "contract analysis failed");
                    session.stage = Stage::Idle;
                    session.last_error = Some(err.to_string());
                    Ok(Vec::new())
                }
            }
        }
        WorkflowEvent::Close => {
            session.reset();
            Ok(Vec::new())
        }
    }
}

fn start_detection(session: &mut UploadSession, file: UploadFile) -> Vec<Effect> {
    session.selected_file = Some(file.clone());
    session.last_error = None;
    session.stage = Stage::Detecting;
    vec![session.request(RequestKind::Detect { file })]
}

fn require_request_slot(session: &UploadSession) -> Result<(), WorkflowError> {
    if session.stage.request_in_flight() {
        Err(WorkflowError::ConcurrentRequest)
    } else {
        Ok(())
    }
}

fn require_idle(session: &UploadSession, action: &'static str) -> Result<(), WorkflowError> {
    match session.stage {
        Stage::Idle => Ok(()),
        ref other => Err(WorkflowError::InvalidStage {
            action,
            stage: other.kind(),
        }),
    }
}

fn single_pdf(files: Vec<UploadFile>) -> Result<UploadFile, WorkflowError> {
    let mut files = files.into_iter();
    let file = match (files.next(), files.next()) {
        (Some(file), None) => file,
        (None, _) => return Err(WorkflowError::Validation("No file selected".to_string())),
        (Some(_), Some(_)) => {
            return Err(WorkflowError::Validation(
                "Please select a single PDF file".to_string(),
            ));
        }
    };

    if !file.is_pdf() {
        return Err(WorkflowError::Validation(format!(
            "{} is not a PDF. Only PDF files are accepted.",
            file.name()
        )));
    }

    Ok(file)
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadView {
    pub stage: StageKind,
    pub title: String,
    pub description: String,
    pub file_label: Option<String>,
    pub detected_type: Option<String>,
    pub error: Option<String>,
    pub can_analyze: bool,
}

impl UploadView {
    pub fn from_session(session: &UploadSession) -> Self {
        let detected = session.detected_type().unwrap_or_default();
        let (title, description) = match session.stage.kind() {
            StageKind::Idle => (
                "Upload Contract".to_string(),
                "Upload a PDF contract to analyze with AI".to_string(),
            ),
            StageKind::Detecting => (
                "Detecting Contract Type...".to_string(),
                "Our AI is analyzing your document to determine the contract type.".to_string(),
            ),
            StageKind::Confirm => (
                "Contract Type Detected".to_string(),
                "We've detected the following contract type:".to_string(),
            ),
            StageKind::Processing => (
                "Analyzing your contract...".to_string(),
                format!("Our AI is analyzing the details of your {} contract.", detected),
            ),
            StageKind::Done => (
                "Analysis Completed!".to_string(),
                format!(
                    "Your {} contract has been successfully analyzed. You can now view the detailed results.",
                    detected
                ),
            ),
        };

        Self {
            stage: session.stage.kind(),
            title,
            description,
            file_label: session
                .selected_file
                .as_ref()
                .map(|file| format!("{} ({} KB)", file.name(), file.size_kb())),
            detected_type: session.detected_type().map(ToOwned::to_owned),
            error: session.last_error.clone(),
            can_analyze: matches!(session.stage, Stage::Idle) && session.selected_file.is_some(),
        }
    }
}

pub struct UploadWorkflow<B: ?Sized> {
    backend: Arc<B>,
    latest: LatestAnalysis,
    session: UploadSession,
    request_timeout: Duration,
}

impl<B> UploadWorkflow<B>
where
    B: AnalysisBackend + ?Sized + 'static,
{
    pub fn new(backend: Arc<B>, latest: LatestAnalysis, request_timeout: Duration) -> Self {
        Self {
            backend,
            latest,
            session: UploadSession::new(),
            request_timeout,
        }
    }

    pub fn session(&self) -> &UploadSession {
        &self.session
    }

    pub fn view(&self) -> UploadView {
        UploadView::from_session(&self.session)
    }

    pub async fn dispatch(
        &mut self,
        event: WorkflowEvent,
    ) -> Result<Vec<PendingRequest>, WorkflowError> {
        let effects = reduce(&mut self.session, event)?;
        let mut requests = Vec::new();

        for effect in effects {
            match effect {
                Effect::Request(request) => requests.push(request),
                Effect::PublishResult(result) => self.latest.publish(result).await,
            }
        }

        Ok(requests)
    }

    pub async fn dispatch_and_wait(&mut self, event: WorkflowEvent) -> Result<(), WorkflowError> {
        let mut pending = self.dispatch(event).await?;
        while let Some(request) = pending.pop() {
            let completion = request.run(&*self.backend, self.request_timeout).await;
            pending.extend(self.dispatch(completion).await?);
        }
        Ok(())
    }

    pub fn spawn_request<F>(&self, request: PendingRequest, deliver: F)
    where
        F: FnOnce(WorkflowEvent) + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let limit = self.request_timeout;
        tokio::spawn(async move {
            let completion = request.run(&*backend, limit).await;
            deliver(completion);
        });
    }
}
