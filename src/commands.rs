use std::{fmt::Write as _, sync::Arc};

use color_eyre::{
    Result,
    eyre::{WrapErr, eyre},
};
use tracing::info;

use crate::{
    account::{self, AccountContext, UpgradeOutcome},
    api::ApiClient,
    config::{Command, Config},
    contracts::ContractList,
    results::{FindingKind, FindingView, ResultsView},
    state::LatestAnalysis,
    workflow::{StageKind, UploadFile, UploadWorkflow, WorkflowEvent},
};

pub async fn run(command: Command, config: &Config) -> Result<()> {
    let api = Arc::new(ApiClient::new(config.api_config())?);

    match command {
        Command::Analyze { files, detect_only } => analyze(api, config, files, detect_only).await,
        Command::List => list(api).await,
        Command::Show { id } => {
            let account = AccountContext::load(&api).await;
            let analysis = api.contract(&id).await?;
            let view = ResultsView::build(&analysis, account.subscription().is_active);
            print!("{}", format_results(&view));
            Ok(())
        }
        Command::Delete { id, yes } => {
            if !yes {
                return Err(eyre!(
                    "deleting {} cannot be undone; pass --yes to confirm",
                    id
                ));
            }
            let mut contracts = ContractList::new(Arc::clone(&api));
            contracts.delete(&id).await?;
            println!("Deleted contract {}", id);
            Ok(())
        }
        Command::Whoami => {
            let account = AccountContext::load(&api).await;
            match &account.user {
                Some(user) => {
                    let plan = if account.subscription().is_active {
                        "premium"
                    } else {
                        "free"
                    };
                    println!("{} ({})", user.label(), plan);
                }
                None => println!("Not signed in. Visit {} to sign in.", api.login_url()),
            }
            Ok(())
        }
        Command::Upgrade => {
            let account = AccountContext::load(&api).await;
            match account::start_upgrade(&api, &account).await? {
                UpgradeOutcome::AlreadyPremium => println!("You are already a premium member"),
                UpgradeOutcome::Checkout { session_id } => {
                    println!("Checkout session created: {}", session_id);
                    println!("Complete the payment in your browser to unlock premium.");
                }
            }
            Ok(())
        }
        Command::LoginUrl => {
            println!("{}", api.login_url());
            Ok(())
        }
        Command::Logout => {
            api.logout().await?;
            println!("Signed out");
            Ok(())
        }
        Command::DeleteAccount { yes } => {
            if !yes {
                return Err(eyre!(
                    "deleting your account cannot be undone; pass --yes to confirm"
                ));
            }
            api.delete_account().await?;
            println!("Account deleted");
            Ok(())
        }
    }
}

async fn analyze(
    api: Arc<ApiClient>,
    config: &Config,
    paths: Vec<std::path::PathBuf>,
    detect_only: bool,
) -> Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let file = UploadFile::from_path(path)
            .await
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        files.push(file);
    }

    let account = AccountContext::load(&api).await;
    let mut workflow = UploadWorkflow::new(
        Arc::clone(&api),
        LatestAnalysis::default(),
        config.request_timeout(),
    );

    workflow
        .dispatch_and_wait(WorkflowEvent::SelectFiles(files))
        .await?;
    if let Some(file) = workflow.session().selected_file() {
        println!("Uploading {} ({} KB)", file.name(), file.size_kb());
    }

    workflow
        .dispatch_and_wait(WorkflowEvent::DetectSelected)
        .await?;
    let detected = match workflow.session().detected_type() {
        Some(detected) => detected.to_string(),
        None => return Err(stage_failure(&workflow)),
    };
    println!("Detected contract type: {}", detected);

    if detect_only {
        return Ok(());
    }

    workflow
        .dispatch_and_wait(WorkflowEvent::ConfirmAnalysis)
        .await?;
    if workflow.session().stage().kind() != StageKind::Done {
        return Err(stage_failure(&workflow));
    }

    let analysis = workflow
        .session()
        .analysis_result()
        .cloned()
        .ok_or_else(|| eyre!("analysis finished without a result"))?;
    info!(contract = %analysis.id, "analysis stored");

    let view = ResultsView::build(&analysis, account.subscription().is_active);
    print!("{}", format_results(&view));
    Ok(())
}

fn stage_failure(workflow: &UploadWorkflow<ApiClient>) -> color_eyre::eyre::Report {
    let message = workflow
        .session()
        .last_error()
        .unwrap_or("the upload did not complete");
    eyre!("{}", message)
}

async fn list(api: Arc<ApiClient>) -> Result<()> {
    let mut contracts = ContractList::new(api);
    contracts.refresh().await.map_err(|err| {
        if err.is_unauthorized() {
            eyre!("{}; sign in and pass --session-cookie", err)
        } else {
            eyre!(err)
        }
    })?;

    let summary = contracts.summary();
    println!("Total contracts:     {}", summary.total);
    println!("Average score:       {:.2}", summary.average_score);
    println!("High risk contracts: {}", summary.high_risk);
    println!();

    for row in contracts.rows() {
        println!("{:<26} {:>8}  {}", row.id, row.score_label, row.contract_type);
    }

    Ok(())
}

pub fn format_results(view: &ResultsView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} contract ({})", view.contract_type, view.contract_id);
    let _ = writeln!(
        out,
        "Overall score: {} ({}) | risk {}% | opportunities {}%",
        view.score,
        view.trend.label(),
        view.risk_percent,
        view.opportunity_percent
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Summary");
    let _ = writeln!(out, "  {}", view.summary);

    for (heading, kind) in [
        ("Risks", FindingKind::Risk),
        ("Opportunities", FindingKind::Opportunity),
    ] {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", heading);
        let findings = view.findings(kind);
        if findings.is_empty() {
            let _ = writeln!(out, "  none identified");
        }
        for finding in findings {
            match finding {
                FindingView::Visible(entry) => {
                    let _ = writeln!(
                        out,
                        "  - {} [{}: {}]",
                        entry.title,
                        kind.level_label(),
                        entry.level
                    );
                    if !entry.explanation.is_empty() {
                        let _ = writeln!(out, "    {}", entry.explanation);
                    }
                }
                FindingView::Locked { hidden_count, .. } => {
                    let _ = writeln!(
                        out,
                        "  - {} more hidden. Upgrade to premium to see them all.",
                        hidden_count
                    );
                }
            }
        }
    }

    let details = &view.details;
    let _ = writeln!(out);
    let _ = writeln!(out, "Key clauses");
    for clause in &details.key_clauses {
        let _ = writeln!(out, "  - {}", clause);
    }
    let _ = writeln!(out, "Legal compliance");
    let _ = writeln!(out, "  {}", details.legal_compliance);
    let _ = writeln!(out, "Recommendations");
    for item in &details.recommendations {
        let _ = writeln!(out, "  - {}", item);
    }
    let _ = writeln!(out, "Negotiation points");
    for item in &details.negotiation_points {
        let _ = writeln!(out, "  - {}", item);
    }

    out
}
