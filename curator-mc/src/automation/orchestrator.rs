//! Automation run orchestrator
//!
//! Owns the run lifecycle for one entity at a time. All collaborators
//! are injected at construction; nothing global. Cancellation is a
//! token passed down the phases and polled at every suspension point;
//! skip-current-provider is a child token recreated per provider so
//! skipping never outlives the provider it targeted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use curator_common::events::{CuratorEvent, EventBus};

use crate::automation::outcome::ScrapeOutcome;
use crate::automation::session::{AutomationSession, RescrapeOptions, RunState};
use crate::automation::thumbnail;
use crate::client::{HostClient, HostError};
use crate::db::settings;
use crate::detect::StatusTracker;
use crate::history::{HistoryStore, MetadataSummary, RunSummary};
use crate::providers::ProviderConfig;
use crate::ui_adapter::{ApplyChoice, UiAdapter, UiError};

/// Upper bound on creation-affordance clicks per provider
const MAX_CREATION_CLICKS: usize = 20;

/// Errors that abort an automation run
#[derive(Debug, Error)]
pub enum RunError {
    #[error("An automation run is already in progress")]
    AlreadyRunning,

    /// The UI no longer shows the entity the run started with
    #[error("Navigated away from entity {expected}")]
    Navigation { expected: String },

    #[error("UI error: {0}")]
    Ui(#[from] UiError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Status detection failed: {0}")]
    Status(String),
}

/// Final report handed back to the caller and the control API
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub success: bool,
    pub cancelled: bool,
    pub session: AutomationSession,
}

/// Where an execute pass ended up, before finalization
enum ExecuteEnd {
    Completed,
    Cancelled,
}

pub struct AutomationOrchestrator {
    client: HostClient,
    ui: Arc<dyn UiAdapter>,
    tracker: Arc<StatusTracker>,
    history: Arc<HistoryStore>,
    event_bus: EventBus,
    db: SqlitePool,
    http: reqwest::Client,
    in_progress: AtomicBool,
    run_cancel: Mutex<Option<CancellationToken>>,
    skip_current: Mutex<Option<CancellationToken>>,
    last_session: Mutex<Option<AutomationSession>>,
}

impl AutomationOrchestrator {
    pub fn new(
        client: HostClient,
        ui: Arc<dyn UiAdapter>,
        tracker: Arc<StatusTracker>,
        history: Arc<HistoryStore>,
        event_bus: EventBus,
        db: SqlitePool,
    ) -> Self {
        Self {
            client,
            ui,
            tracker,
            history,
            event_bus,
            db,
            http: reqwest::Client::new(),
            in_progress: AtomicBool::new(false),
            run_cancel: Mutex::new(None),
            skip_current: Mutex::new(None),
            last_session: Mutex::new(None),
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Most recent session, live or finished
    pub fn last_session(&self) -> Option<AutomationSession> {
        self.last_session.lock().ok().and_then(|s| s.clone())
    }

    /// Request cancellation of the running automation
    pub fn cancel(&self) -> bool {
        match self.run_cancel.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Request skipping the provider currently being processed
    pub fn skip_current_provider(&self) -> bool {
        match self.skip_current.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Run the full automation for `entity_id`
    ///
    /// A second concurrent call is refused. Finalization always runs,
    /// whatever the outcome: it records history, restores UI controls,
    /// clears caches and re-detects status.
    pub async fn run(
        &self,
        entity_id: &str,
        options: RescrapeOptions,
    ) -> Result<RunReport, RunError> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RunError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        if let Ok(mut guard) = self.run_cancel.lock() {
            *guard = Some(cancel.clone());
        }

        let mut session = AutomationSession::new(entity_id);
        session.retry_count = self.history.attempts_for(entity_id) as u32;
        info!(run_id = %session.run_id, entity_id = entity_id, "Automation run started");
        self.event_bus.emit_lossy(CuratorEvent::AutomationStarted {
            run_id: session.run_id,
            entity_id: entity_id.to_string(),
            timestamp: Utc::now(),
        });

        let result = self.execute(&mut session, &options, &cancel).await;
        let report = self.finalize(session, result).await;

        if let Ok(mut guard) = self.run_cancel.lock() {
            *guard = None;
        }
        if let Ok(mut guard) = self.skip_current.lock() {
            *guard = None;
        }
        self.in_progress.store(false, Ordering::SeqCst);

        Ok(report)
    }

    async fn execute(
        &self,
        session: &mut AutomationSession,
        options: &RescrapeOptions,
        cancel: &CancellationToken,
    ) -> Result<ExecuteEnd, RunError> {
        let auto_apply = settings::auto_apply(&self.db).await;
        let auto_organize = settings::auto_organize(&self.db).await;
        let outcome_timeout =
            Duration::from_millis(settings::scrape_outcome_timeout_ms(&self.db).await);
        let settle_delay = Duration::from_millis(settings::settle_delay_ms(&self.db).await);
        let save_settle = Duration::from_millis(settings::save_settle_timeout_ms(&self.db).await);

        session.transition_to(RunState::OpeningEditContext);
        self.ensure_same_entity(&session.entity_id).await?;
        if !self.ui.is_edit_context_open().await && !self.ui.open_edit_context().await? {
            return Err(RunError::Ui(UiError::Unavailable(
                "edit context could not be opened".to_string(),
            )));
        }
        self.ui.set_controls_enabled(false).await;

        session.transition_to(RunState::CheckingStatus);
        let snapshot = self
            .tracker
            .detect_current_status(&session.entity_id)
            .await
            .map_err(|e| RunError::Status(e.to_string()))?;
        session.organized = snapshot.organized;
        // Served from the snapshot fetch the tracker just made
        if let Ok(entity) = self
            .client
            .entity_cached(&session.entity_id, Duration::from_secs(5))
            .await
        {
            session.entity_name = entity.title.clone();
        }

        let providers = self.tracker.providers();
        let total = providers.len();
        let mut satisfied: Vec<String> = snapshot
            .providers
            .iter()
            .filter(|(_, status)| status.scraped)
            .map(|(id, _)| id.clone())
            .collect();

        for (index, provider) in providers.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(ExecuteEnd::Cancelled);
            }
            self.ensure_same_entity(&session.entity_id).await?;
            session.current_provider = Some(provider.id.clone());

            let already = satisfied.iter().any(|id| id == &provider.id);
            if already && !options.forces(&provider.id) {
                session.record_outcome(&provider.id, "already satisfied, skipped");
                self.progress(session, Some(&provider.id), index + 1, total,
                    "Already satisfied, skipping");
                continue;
            }
            if !provider.auto_scrape && !options.forces(&provider.id) {
                session.record_outcome(&provider.id, "not configured for automatic scraping");
                self.progress(session, Some(&provider.id), index + 1, total,
                    "Not configured for automatic scraping, skipping");
                continue;
            }

            // Fresh skip token per provider, tied to the run token so a
            // cancellation also unblocks any skip wait
            let skip = cancel.child_token();
            if let Ok(mut guard) = self.skip_current.lock() {
                *guard = Some(skip.clone());
            }

            let end = self
                .process_provider(
                    session, provider, &skip, cancel,
                    auto_apply, outcome_timeout, settle_delay,
                    index + 1, total,
                )
                .await?;
            match end {
                ProviderEnd::Applied => satisfied.push(provider.id.clone()),
                ProviderEnd::Skipped | ProviderEnd::NotFound => {}
                ProviderEnd::CancelAll => return Ok(ExecuteEnd::Cancelled),
            }
        }
        session.current_provider = None;

        if cancel.is_cancelled() {
            return Ok(ExecuteEnd::Cancelled);
        }

        session.transition_to(RunState::Saving);
        self.ensure_same_entity(&session.entity_id).await?;
        self.save_and_settle(save_settle).await?;

        // Organize only when every configured provider is satisfied and
        // the entity is not already organized
        let all_satisfied = providers.iter().all(|p| satisfied.iter().any(|id| id == &p.id));
        if auto_organize && all_satisfied && !snapshot.organized {
            if cancel.is_cancelled() {
                return Ok(ExecuteEnd::Cancelled);
            }
            session.transition_to(RunState::Organizing);
            self.ensure_same_entity(&session.entity_id).await?;
            let toggle = self.ui.find_organize_toggle().await?;
            if !toggle.checked {
                self.ui.click_element(&toggle.element).await?;
                session.transition_to(RunState::Saving);
                self.save_and_settle(save_settle).await?;
            }
            session.organized = true;
        }

        Ok(ExecuteEnd::Completed)
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_provider(
        &self,
        session: &mut AutomationSession,
        provider: &ProviderConfig,
        skip: &CancellationToken,
        cancel: &CancellationToken,
        auto_apply: bool,
        outcome_timeout: Duration,
        settle_delay: Duration,
        current: usize,
        total: usize,
    ) -> Result<ProviderEnd, RunError> {
        session.transition_to(RunState::Scraping);
        self.progress(session, Some(&provider.id), current, total, "Scraping");
        self.ui.trigger_scrape(&provider.id).await?;

        let outcome = tokio::select! {
            _ = skip.cancelled() => {
                if cancel.is_cancelled() {
                    return Ok(ProviderEnd::CancelAll);
                }
                ScrapeOutcome::Skipped { reason: "user skipped".to_string() }
            }
            outcome = self.ui.detect_outcome(outcome_timeout) => {
                ScrapeOutcome::classify(&outcome)
            }
        };

        match outcome {
            ScrapeOutcome::Skipped { reason } => {
                info!(provider_id = %provider.id, reason = %reason, "Provider skipped");
                session.record_outcome(&provider.id, reason.as_str());
                self.progress(session, Some(&provider.id), current, total, &reason);
                return Ok(ProviderEnd::Skipped);
            }
            ScrapeOutcome::NotFound { reason } => {
                info!(provider_id = %provider.id, reason = %reason, "No match from provider");
                session.record_outcome(&provider.id, reason.as_str());
                self.progress(session, Some(&provider.id), current, total, &reason);
                return Ok(ProviderEnd::NotFound);
            }
            ScrapeOutcome::Found => {}
        }

        session.transition_to(RunState::CreatingEntities);
        for _ in 0..MAX_CREATION_CLICKS {
            if cancel.is_cancelled() {
                return Ok(ProviderEnd::CancelAll);
            }
            if skip.is_cancelled() {
                session.record_outcome(&provider.id, "user skipped");
                self.progress(session, Some(&provider.id), current, total, "user skipped");
                return Ok(ProviderEnd::Skipped);
            }
            let affordances = self.ui.find_creation_affordances().await;
            let Some(first) = affordances.first() else {
                break;
            };
            self.ui.click_element(first).await?;
            sleep(settle_delay).await;
        }

        session.transition_to(RunState::Applying);
        self.ensure_same_entity(&session.entity_id).await?;
        let summary = self.ui.scraped_summary().await;
        self.reconcile_thumbnail(&session.entity_id, summary.thumbnail_url.as_deref())
            .await;

        let choice = if auto_apply {
            ApplyChoice::Apply
        } else {
            self.ui.confirm_apply(&provider.id, &summary).await
        };
        match choice {
            ApplyChoice::Apply => {
                let Some(apply) = self.ui.find_apply_affordance().await else {
                    return Err(RunError::Ui(UiError::Unavailable(
                        "apply affordance not visible".to_string(),
                    )));
                };
                self.ui.click_element(&apply).await?;
                sleep(settle_delay).await;
                session.record_source(&provider.id);
                session.record_outcome(&provider.id, "applied");
                session.applied_summary = Some(summary);
                Ok(ProviderEnd::Applied)
            }
            ApplyChoice::SkipProvider => {
                session.record_outcome(&provider.id, "user skipped");
                self.progress(session, Some(&provider.id), current, total, "user skipped");
                Ok(ProviderEnd::Skipped)
            }
            ApplyChoice::CancelAll => {
                cancel.cancel();
                Ok(ProviderEnd::CancelAll)
            }
        }
    }

    /// Keep the larger thumbnail: the scraped one must beat the current
    /// area by the hysteresis margin or it is deselected
    async fn reconcile_thumbnail(&self, entity_id: &str, scraped_url: Option<&str>) {
        let Some(scraped_url) = scraped_url else {
            return;
        };
        let current_url = match self.client.find_entity(entity_id).await {
            Ok(entity) => entity.thumbnail_path,
            Err(e) => {
                warn!("Thumbnail comparison skipped, entity fetch failed: {}", e);
                return;
            }
        };
        let current = match current_url.as_deref() {
            Some(url) => thumbnail::fetch_dimensions(&self.http, url).await,
            None => None,
        };
        let scraped = thumbnail::fetch_dimensions(&self.http, scraped_url).await;

        let keep_scraped = thumbnail::should_update(current, scraped);
        if let Err(e) = self.ui.set_thumbnail_selected(keep_scraped).await {
            warn!("Thumbnail selection failed: {}", e);
        }
    }

    /// Click save, then wait for the host's mutation signal with a
    /// bounded fallback instead of a fixed sleep
    async fn save_and_settle(&self, save_settle: Duration) -> Result<(), RunError> {
        let mut rx = self.event_bus.subscribe();

        let Some(save) = self.ui.find_save_affordance().await else {
            return Err(RunError::Ui(UiError::Unavailable(
                "save affordance not visible".to_string(),
            )));
        };
        self.ui.click_element(&save).await?;

        let settle = async {
            loop {
                match rx.recv().await {
                    Ok(CuratorEvent::MutationPerformed { .. }) => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        };
        if tokio::time::timeout(save_settle, settle).await.is_err() {
            info!("No mutation signal within settle window, continuing");
        }
        Ok(())
    }

    /// Always runs: history record, UI restore, cache clear, re-detect,
    /// exactly one terminal event
    async fn finalize(
        &self,
        mut session: AutomationSession,
        result: Result<ExecuteEnd, RunError>,
    ) -> RunReport {
        session.transition_to(RunState::Finalizing);
        session.current_provider = None;

        let (success, cancelled) = match &result {
            Ok(ExecuteEnd::Completed) => (true, false),
            Ok(ExecuteEnd::Cancelled) => (false, true),
            Err(e) => {
                session.record_error(e.to_string());
                (false, false)
            }
        };

        let summary = RunSummary {
            success,
            cancelled,
            entity_name: session.entity_name.clone(),
            retry_count: session.retry_count,
            duration_ms: session.duration_ms(),
            sources_used: session.sources_used.clone(),
            errors: session.errors.clone(),
            organized: session.organized,
            metadata: session.applied_summary.as_ref().map(MetadataSummary::from),
            timings_ms: session.timings_ms.clone(),
            provider_outcomes: session.provider_outcomes.clone(),
        };
        self.history.record(&session.entity_id, summary);

        self.ui.set_controls_enabled(true).await;

        let settle_delay = Duration::from_millis(settings::settle_delay_ms(&self.db).await);
        sleep(settle_delay).await;

        // Truth over optimism: drop caches and re-detect
        self.client.clear();
        self.tracker.invalidate(&session.entity_id);
        if let Err(e) = self.tracker.detect_current_status(&session.entity_id).await {
            warn!("Post-run status refresh failed: {}", e);
        }
        self.tracker
            .update_status(crate::detect::StatusAspect::LastAutomation(Utc::now()));

        let terminal = if success {
            RunState::Completed
        } else if cancelled {
            RunState::Cancelled
        } else {
            RunState::Failed
        };
        session.transition_to(terminal);

        let now = Utc::now();
        let event = if success {
            CuratorEvent::AutomationCompleted {
                run_id: session.run_id,
                entity_id: session.entity_id.clone(),
                sources_used: session.sources_used.clone(),
                duration_ms: session.duration_ms(),
                timestamp: now,
            }
        } else if cancelled {
            CuratorEvent::AutomationCancelled {
                run_id: session.run_id,
                entity_id: session.entity_id.clone(),
                timestamp: now,
            }
        } else {
            CuratorEvent::AutomationFailed {
                run_id: session.run_id,
                entity_id: session.entity_id.clone(),
                error_message: session.errors.last().cloned().unwrap_or_default(),
                timestamp: now,
            }
        };
        self.event_bus.emit_lossy(event);

        info!(
            run_id = %session.run_id,
            success = success,
            cancelled = cancelled,
            duration_ms = session.duration_ms(),
            "Automation run finished"
        );

        if let Ok(mut guard) = self.last_session.lock() {
            *guard = Some(session.clone());
        }

        RunReport { success, cancelled, session }
    }

    /// Abort when the UI navigated to a different entity mid-run
    async fn ensure_same_entity(&self, entity_id: &str) -> Result<(), RunError> {
        match self.ui.current_entity_id().await {
            Some(current) if current == entity_id => Ok(()),
            _ => Err(RunError::Navigation { expected: entity_id.to_string() }),
        }
    }

    fn progress(
        &self,
        session: &AutomationSession,
        provider: Option<&str>,
        current: usize,
        total: usize,
        message: &str,
    ) {
        self.event_bus.emit_lossy(CuratorEvent::AutomationProgress {
            run_id: session.run_id,
            state: session.state.to_string(),
            provider: provider.map(|p| p.to_string()),
            current,
            total,
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Where one provider's processing ended up
enum ProviderEnd {
    Applied,
    Skipped,
    NotFound,
    CancelAll,
}
