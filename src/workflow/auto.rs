// Non-interactive step controller: Idle -> Uploading -> Completed

use std::sync::{Mutex, MutexGuard};

use super::artifact::materialize;
use super::notifications::{Notification, NotificationQueue};
use super::phase::{transition_auto, AutoPhase};
use super::{publish_notifications, publish_phase_change};
use crate::archive::{ArchiveDecoder, ArtifactParts, PreviewRegistry};
use crate::config::{ReportDefinition, WorkflowConfig};
use crate::error::WorkflowError;
use crate::events::{ArtifactReadyPayload, EventBroadcaster, ResetPayload, EVENT_ARTIFACT_READY, EVENT_RESET};
use crate::models::{CandidateRow, SessionData, UploadFile};
use crate::negotiation::{validate_uploads, ArtifactBody, NegotiationApi, NegotiationClient, NegotiationResult};
use crate::shell::{ArtifactFiles, ArtifactView, AutoSnapshot};
use crate::utils::lock_mutex_recover;

/// A negotiation the auto path could not finish on its own
#[derive(Debug, Clone, PartialEq)]
pub struct PendingNegotiation {
    pub report_key: String,
    pub session: SessionData,
    pub rows: Vec<CandidateRow>,
}

/// Result of one auto run
#[derive(Debug, Clone, PartialEq)]
pub enum AutoOutcome {
    /// The artifact is ready
    Completed,
    /// The service needs per-item choices; continue in an interactive workflow
    NegotiationRequired(PendingNegotiation),
    /// A run was already in flight; nothing was sent
    Busy,
    /// The workflow was reset while the run was in flight
    Discarded,
}

#[derive(Debug, Default)]
struct AutoState {
    phase: AutoPhase,
    generation: u64,
    artifact: Option<ArtifactParts>,
    notifications: NotificationQueue,
}

pub struct AutoWorkflow<A: NegotiationApi> {
    api: A,
    report: ReportDefinition,
    decoder: ArchiveDecoder,
    events: Option<EventBroadcaster>,
    state: Mutex<AutoState>,
}

impl AutoWorkflow<NegotiationClient> {
    /// Build a workflow for `report_key` talking to the configured service
    pub fn from_config(config: &WorkflowConfig, report_key: &str) -> Result<Self, WorkflowError> {
        let report = config
            .report(report_key)
            .cloned()
            .ok_or_else(|| WorkflowError::Config(format!("Unknown report '{}'", report_key)))?;
        Ok(Self::new(NegotiationClient::new(config)?, report))
    }
}

impl<A: NegotiationApi> AutoWorkflow<A> {
    pub fn new(api: A, report: ReportDefinition) -> Self {
        Self {
            api,
            report,
            decoder: ArchiveDecoder::default(),
            events: None,
            state: Mutex::new(AutoState::default()),
        }
    }

    pub fn with_decoder(mut self, decoder: ArchiveDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_events(mut self, events: EventBroadcaster) -> Self {
        self.events = Some(events);
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn previews(&self) -> &PreviewRegistry {
        self.decoder.previews()
    }

    fn lock(&self) -> MutexGuard<'_, AutoState> {
        lock_mutex_recover(&self.state)
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.lock().generation != generation
    }

    fn notify_error(&self, state: &mut AutoState, err: &WorkflowError) {
        let pushed = state.notifications.push_error("Report generation failed", err);
        publish_notifications(self.events.as_ref(), &self.report.key, &pushed);
    }

    fn set_phase(&self, state: &mut AutoState, target: AutoPhase, session_id: Option<&str>) {
        match transition_auto(state.phase, target) {
            Ok(phase) => {
                let old = std::mem::replace(&mut state.phase, phase);
                publish_phase_change(
                    self.events.as_ref(),
                    "auto",
                    &self.report.key,
                    old.as_str(),
                    phase.as_str(),
                    session_id,
                );
            }
            Err(err) => log::warn!("[{}] {}", self.report.key, err),
        }
    }

    /// Return to `Idle` after a failure, unless a reset intervened
    fn fail(&self, generation: u64, err: WorkflowError) -> Result<AutoOutcome, WorkflowError> {
        let mut state = self.lock();
        if state.generation != generation {
            log::debug!("[{}] Discarding stale failure: {}", self.report.key, err);
            return Ok(AutoOutcome::Discarded);
        }
        log::error!("[{}] Auto generation failed ({}): {}", self.report.key, err.kind(), err);
        self.set_phase(&mut state, AutoPhase::Idle, None);
        self.notify_error(&mut state, &err);
        Err(err)
    }

    /// Upload and generate in one go.
    ///
    /// When the service asks for per-item choices the workflow returns to
    /// `Idle` and hands the negotiation back to the caller.
    pub async fn run(&self, files: &[UploadFile]) -> Result<AutoOutcome, WorkflowError> {
        if let Err(err) = validate_uploads(&self.report, files) {
            let mut state = self.lock();
            self.notify_error(&mut state, &err);
            return Err(err);
        }

        let generation = {
            let mut state = self.lock();
            if state.phase == AutoPhase::Uploading {
                log::debug!("[{}] run ignored: upload already in flight", self.report.key);
                return Ok(AutoOutcome::Busy);
            }
            if let Some(previous) = state.artifact.take() {
                previous.release();
            }
            self.set_phase(&mut state, AutoPhase::Uploading, None);
            state.generation
        };

        let started = self.api.start(&self.report, files).await;
        let body = match started {
            Ok(NegotiationResult::DirectArtifact(body)) => body,
            Ok(NegotiationResult::Negotiable { session, rows }) if rows.is_empty() => {
                log::info!(
                    "[{}] Nothing to negotiate in session {}, finalizing",
                    self.report.key,
                    session.session_id
                );
                match self.finalize_empty(generation, &session).await {
                    Ok(Some(body)) => body,
                    Ok(None) => return Ok(AutoOutcome::Discarded),
                    Err(err) => return self.fail(generation, err),
                }
            }
            Ok(NegotiationResult::Negotiable { session, rows }) => {
                let mut state = self.lock();
                if state.generation != generation {
                    return Ok(AutoOutcome::Discarded);
                }
                log::info!(
                    "[{}] Session {} needs {} selection(s), handing off",
                    self.report.key,
                    session.session_id,
                    rows.len()
                );
                self.set_phase(&mut state, AutoPhase::Idle, Some(&session.session_id));
                let pushed = state
                    .notifications
                    .push(Notification::info(
                        "Selections required",
                        format!("{} item(s) need a vendor decision before the report can be generated.", rows.len()),
                    ))
                    .clone();
                publish_notifications(self.events.as_ref(), &self.report.key, &[pushed]);
                return Ok(AutoOutcome::NegotiationRequired(PendingNegotiation {
                    report_key: self.report.key.clone(),
                    session,
                    rows,
                }));
            }
            Err(err) => return self.fail(generation, err),
        };

        if self.is_stale(generation) {
            return Ok(AutoOutcome::Discarded);
        }

        let hint = body.hint().map(str::to_string);
        let parts = match materialize(&self.api, &self.decoder, &self.report, body).await {
            Ok(parts) => parts,
            Err(err) => return self.fail(generation, err),
        };

        let mut state = self.lock();
        if state.generation != generation {
            log::debug!("[{}] Discarding stale artifact", self.report.key);
            return Ok(AutoOutcome::Discarded);
        }

        let mut pushed = Vec::new();
        for warning in &parts.warnings {
            pushed.push(state.notifications.push_integrity(warning));
        }
        if let Some(hint) = hint {
            pushed.push(state.notifications.push(Notification::info("Hint", hint)).clone());
        }
        publish_notifications(self.events.as_ref(), &self.report.key, &pushed);

        if let Some(events) = &self.events {
            events.broadcast(
                EVENT_ARTIFACT_READY,
                ArtifactReadyPayload {
                    report_key: self.report.key.clone(),
                    spreadsheet_name: parts.spreadsheet.as_ref().map(|b| b.file_name().to_string()),
                    document_name: parts.document.as_ref().map(|b| b.file_name().to_string()),
                    preview_url: parts.preview_url().map(str::to_string),
                    suspect: parts.is_suspect(),
                },
            );
        }
        state.artifact = Some(parts);
        self.set_phase(&mut state, AutoPhase::Completed, None);
        Ok(AutoOutcome::Completed)
    }

    /// Finalize a session that came back with no rows; `None` when stale
    async fn finalize_empty(
        &self,
        generation: u64,
        session: &SessionData,
    ) -> Result<Option<ArtifactBody>, WorkflowError> {
        if self.is_stale(generation) {
            return Ok(None);
        }
        self.api.finalize(&self.report, session).await.map(Some)
    }

    /// Drop the artifact and return to `Idle`; in-flight results are discarded
    pub fn reset(&self) {
        let mut state = self.lock();
        state.generation += 1;
        if let Some(parts) = state.artifact.take() {
            parts.release();
        }
        if state.phase != AutoPhase::Idle {
            let old = std::mem::replace(&mut state.phase, AutoPhase::Idle);
            publish_phase_change(
                self.events.as_ref(),
                "auto",
                &self.report.key,
                old.as_str(),
                AutoPhase::Idle.as_str(),
                None,
            );
        }
        if let Some(events) = &self.events {
            events.broadcast(
                EVENT_RESET,
                ResetPayload {
                    report_key: self.report.key.clone(),
                    generation: state.generation,
                },
            );
        }
    }

    pub fn phase(&self) -> AutoPhase {
        self.lock().phase
    }

    pub fn artifact(&self) -> Option<ArtifactFiles> {
        self.lock().artifact.as_ref().map(ArtifactFiles::from_parts)
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.to_vec()
    }

    pub fn dismiss_notification(&self, id: &str) -> bool {
        self.lock().notifications.dismiss(id)
    }

    pub fn snapshot(&self) -> AutoSnapshot {
        let state = self.lock();
        AutoSnapshot {
            report_key: self.report.key.clone(),
            phase: state.phase,
            processing: state.phase == AutoPhase::Uploading,
            artifact: state.artifact.as_ref().map(ArtifactView::from_parts),
            notifications: state.notifications.to_vec(),
        }
    }
}
