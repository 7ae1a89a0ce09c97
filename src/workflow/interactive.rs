// Interactive (negotiated) step controller

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::artifact::materialize;
use super::auto::PendingNegotiation;
use super::notifications::{Notification, NotificationQueue};
use super::phase::{transition_phase, InteractivePhase};
use super::{publish_notifications, publish_phase_change, StepOutcome};
use crate::archive::{ArchiveDecoder, ArtifactParts, PreviewRegistry};
use crate::config::{ReportDefinition, WorkflowConfig};
use crate::error::WorkflowError;
use crate::events::{ArtifactReadyPayload, EventBroadcaster, ResetPayload, EVENT_ARTIFACT_READY, EVENT_RESET};
use crate::models::{
    CandidateRow, InteractiveItem, SelectionState, SelectionSummary, SessionData, SubmissionEntry, UploadFile,
};
use crate::negotiation::{validate_uploads, NegotiationApi, NegotiationClient, NegotiationResult};
use crate::selection::SelectionStore;
use crate::shell::{ArtifactFiles, ArtifactView, ItemView, WorkflowSnapshot};
use crate::utils::lock_mutex_recover;
use crate::validation::ValidationLookup;

#[derive(Debug, Default)]
struct InteractiveState {
    phase: InteractivePhase,
    /// Bumped by every reset; async steps compare against their captured value
    generation: u64,
    processing: bool,
    session: Option<SessionData>,
    items: Vec<InteractiveItem>,
    selections: SelectionStore,
    artifact: Option<ArtifactParts>,
    summary: Option<SelectionSummary>,
    notifications: NotificationQueue,
}

impl InteractiveState {
    /// Drop session, items, selections and artifact
    fn clear_negotiation(&mut self) {
        self.session = None;
        self.items.clear();
        self.selections.clear();
        self.summary = None;
        if let Some(parts) = self.artifact.take() {
            parts.release();
        }
    }

    fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }
}

/// Drives `Selecting -> Confirming -> Generating -> Completed` for one report.
///
/// All methods take `&self`; the controller can be shared between the shell
/// and the tasks running its steps.
pub struct InteractiveWorkflow<A: NegotiationApi> {
    api: A,
    report: ReportDefinition,
    decoder: ArchiveDecoder,
    validation: Option<Arc<dyn ValidationLookup>>,
    events: Option<EventBroadcaster>,
    state: Mutex<InteractiveState>,
}

impl InteractiveWorkflow<NegotiationClient> {
    /// Build a workflow for `report_key` talking to the configured service
    pub fn from_config(config: &WorkflowConfig, report_key: &str) -> Result<Self, WorkflowError> {
        let report = config
            .report(report_key)
            .cloned()
            .ok_or_else(|| WorkflowError::Config(format!("Unknown report '{}'", report_key)))?;
        if !report.interactive {
            log::warn!("Report {} is not marked interactive", report.key);
        }
        Ok(Self::new(NegotiationClient::new(config)?, report))
    }
}

impl<A: NegotiationApi> InteractiveWorkflow<A> {
    pub fn new(api: A, report: ReportDefinition) -> Self {
        Self {
            api,
            report,
            decoder: ArchiveDecoder::default(),
            validation: None,
            events: None,
            state: Mutex::new(InteractiveState::default()),
        }
    }

    /// Use a decoder sharing an existing preview registry
    pub fn with_decoder(mut self, decoder: ArchiveDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_validation(mut self, lookup: impl ValidationLookup + 'static) -> Self {
        self.validation = Some(Arc::new(lookup) as Arc<dyn ValidationLookup>);
        self
    }

    pub fn with_events(mut self, events: EventBroadcaster) -> Self {
        self.events = Some(events);
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn report(&self) -> &ReportDefinition {
        &self.report
    }

    /// Registry holding the workflow's preview handle
    pub fn previews(&self) -> &PreviewRegistry {
        self.decoder.previews()
    }

    fn lock(&self) -> MutexGuard<'_, InteractiveState> {
        lock_mutex_recover(&self.state)
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.lock().generation != generation
    }

    fn notify(&self, state: &mut InteractiveState, notification: Notification) {
        let pushed = state.notifications.push(notification).clone();
        publish_notifications(self.events.as_ref(), &self.report.key, &[pushed]);
    }

    fn notify_error(&self, state: &mut InteractiveState, title: &str, err: &WorkflowError) {
        let pushed = state.notifications.push_error(title, err);
        publish_notifications(self.events.as_ref(), &self.report.key, &pushed);
    }

    /// Table-checked transition; an invalid move is logged and ignored
    fn move_to(&self, state: &mut InteractiveState, target: InteractivePhase) -> bool {
        match transition_phase(state.phase, target) {
            Ok(phase) => {
                let old = std::mem::replace(&mut state.phase, phase);
                publish_phase_change(
                    self.events.as_ref(),
                    "interactive",
                    &self.report.key,
                    old.as_str(),
                    phase.as_str(),
                    state.session_id(),
                );
                true
            }
            Err(err) => {
                log::warn!("[{}] {}", self.report.key, err);
                false
            }
        }
    }

    /// Unconditional phase change, used by reset and by (re)loading
    fn force_phase(&self, state: &mut InteractiveState, target: InteractivePhase) {
        if state.phase == target {
            return;
        }
        let old = std::mem::replace(&mut state.phase, target);
        publish_phase_change(
            self.events.as_ref(),
            "interactive",
            &self.report.key,
            old.as_str(),
            target.as_str(),
            state.session_id(),
        );
    }

    /// Install a fresh candidate set, overwriting any previous session
    fn install(&self, state: &mut InteractiveState, session: SessionData, rows: Vec<CandidateRow>) {
        let items: Vec<InteractiveItem> = rows.into_iter().map(InteractiveItem::from_row).collect();
        state.selections.clear();
        state.selections.seed_defaults(&items);

        log::info!(
            "[{}] Session {} loaded with {} item(s), {} needing a choice",
            self.report.key,
            session.session_id,
            items.len(),
            items.iter().filter(|i| i.requires_selection()).count()
        );

        let nothing_to_select = items.is_empty();
        state.items = items;
        state.session = Some(session);

        if nothing_to_select {
            self.notify(
                state,
                Notification::info(
                    "Nothing to select",
                    "No line items need a vendor decision. Continue to generate the report.",
                ),
            );
        }
    }

    /// Take ownership of finished parts, releasing any previous preview first
    fn complete(&self, state: &mut InteractiveState, parts: ArtifactParts, hint: Option<String>) {
        for warning in &parts.warnings {
            let pushed = state.notifications.push_integrity(warning);
            publish_notifications(self.events.as_ref(), &self.report.key, &[pushed]);
        }
        if let Some(hint) = hint {
            self.notify(state, Notification::info("Hint", hint));
        }

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

        if let Some(previous) = state.artifact.take() {
            previous.release();
        }
        state.artifact = Some(parts);
    }

    /// Upload source files and start a new negotiation.
    ///
    /// Any previous session, selections and artifact are discarded first.
    pub async fn load(&self, files: &[UploadFile]) -> Result<StepOutcome, WorkflowError> {
        if let Err(err) = validate_uploads(&self.report, files) {
            let mut state = self.lock();
            self.notify_error(&mut state, "Upload failed", &err);
            return Err(err);
        }

        let generation = {
            let mut state = self.lock();
            if state.processing {
                log::debug!("[{}] load ignored: another step is in flight", self.report.key);
                return Ok(StepOutcome::Busy);
            }
            state.generation += 1;
            state.clear_negotiation();
            self.force_phase(&mut state, InteractivePhase::Selecting);
            state.processing = true;
            state.generation
        };

        let started = self.api.start(&self.report, files).await;

        match started {
            Ok(NegotiationResult::Negotiable { session, rows }) => {
                let mut state = self.lock();
                if state.generation != generation {
                    log::debug!("[{}] Discarding stale start result", self.report.key);
                    return Ok(StepOutcome::Discarded);
                }
                state.processing = false;
                self.install(&mut state, session, rows);
                Ok(StepOutcome::Applied)
            }
            Ok(NegotiationResult::DirectArtifact(body)) => {
                log::info!("[{}] Service returned the artifact without negotiation", self.report.key);
                let hint = body.hint().map(str::to_string);
                let materialized = materialize(&self.api, &self.decoder, &self.report, body).await;

                let mut state = self.lock();
                if state.generation != generation {
                    log::debug!("[{}] Discarding stale direct artifact", self.report.key);
                    return Ok(StepOutcome::Discarded);
                }
                state.processing = false;
                match materialized {
                    Ok(parts) => {
                        self.complete(&mut state, parts, hint);
                        self.force_phase(&mut state, InteractivePhase::Completed);
                        Ok(StepOutcome::Applied)
                    }
                    Err(err) => {
                        log::error!("[{}] Direct artifact could not be decoded: {}", self.report.key, err);
                        self.notify_error(&mut state, "Report generation failed", &err);
                        Err(err)
                    }
                }
            }
            Err(err) => {
                let mut state = self.lock();
                if state.generation != generation {
                    log::debug!("[{}] Discarding stale start failure: {}", self.report.key, err);
                    return Ok(StepOutcome::Discarded);
                }
                state.processing = false;
                log::error!("[{}] start failed ({}): {}", self.report.key, err.kind(), err);
                self.notify_error(&mut state, "Upload failed", &err);
                Err(err)
            }
        }
    }

    /// Continue a negotiation handed off by the auto path, without re-uploading
    pub fn resume(&self, pending: PendingNegotiation) -> Result<StepOutcome, WorkflowError> {
        if pending.report_key != self.report.key {
            return Err(WorkflowError::Validation(format!(
                "Negotiation for '{}' cannot be resumed in '{}'",
                pending.report_key, self.report.key
            )));
        }

        let mut state = self.lock();
        if state.processing {
            return Ok(StepOutcome::Busy);
        }
        state.generation += 1;
        state.clear_negotiation();
        self.force_phase(&mut state, InteractivePhase::Selecting);
        self.install(&mut state, pending.session, pending.rows);
        Ok(StepOutcome::Applied)
    }

    /// Choose option `index` for `item_id`; the index is clamped to the item's options
    pub fn select(&self, item_id: &str, index: usize) -> Result<SelectionState, WorkflowError> {
        let mut state = self.lock();
        if state.processing || state.phase != InteractivePhase::Selecting {
            return Err(WorkflowError::Validation(format!(
                "Selections cannot be changed while {}",
                state.phase.as_str()
            )));
        }

        let label = state
            .items
            .iter()
            .find(|item| item.id == item_id)
            .map(|item| item.label_at(item.clamp_index(index)).unwrap_or_default().to_string())
            .ok_or_else(|| WorkflowError::Validation(format!("Unknown item '{}'", item_id)))?;

        let selection = state.selections.set(item_id, index, &label)?.clone();
        log::debug!(
            "[{}] Item {} set to {} ({})",
            self.report.key,
            item_id,
            selection.index,
            selection.label
        );
        Ok(selection)
    }

    /// Messages for selected labels the validation lookup rejects
    fn invalid_selections(&self, state: &InteractiveState) -> Vec<String> {
        let Some(lookup) = &self.validation else {
            return Vec::new();
        };

        state
            .items
            .iter()
            .filter_map(|item| {
                let selection = state.selections.get(&item.id)?;
                let label = item.label_at(selection.index).unwrap_or(&selection.label);
                let result = lookup.validate(label);
                if result.valid {
                    return None;
                }
                let name = if item.source.item_name.is_empty() {
                    item.id.as_str()
                } else {
                    item.source.item_name.as_str()
                };
                Some(format!(
                    "{}: {}",
                    name,
                    result.message.unwrap_or_else(|| format!("{} is not valid", label))
                ))
            })
            .collect()
    }

    /// Advance to `Confirming`; blocked (with a warning) until every item has a choice
    pub fn confirm(&self) -> StepOutcome {
        let mut state = self.lock();
        if state.processing {
            return StepOutcome::Busy;
        }
        if state.phase != InteractivePhase::Selecting {
            log::warn!("[{}] confirm ignored in phase {}", self.report.key, state.phase.as_str());
            return StepOutcome::Blocked;
        }

        let missing: Vec<String> = state
            .selections
            .missing(&state.items)
            .into_iter()
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            self.notify(
                &mut state,
                Notification::warning(
                    "Selections incomplete",
                    format!(
                        "{} item(s) still need a vendor: {}",
                        missing.len(),
                        missing.join(", ")
                    ),
                ),
            );
            return StepOutcome::Blocked;
        }

        let invalid = self.invalid_selections(&state);
        if !invalid.is_empty() {
            self.notify(
                &mut state,
                Notification::warning("Some selections may be invalid", invalid.join("\n")),
            );
        }

        self.move_to(&mut state, InteractivePhase::Confirming);
        StepOutcome::Applied
    }

    /// Return from `Confirming` to `Selecting`
    pub fn go_back(&self) -> StepOutcome {
        let mut state = self.lock();
        if state.processing {
            return StepOutcome::Busy;
        }
        match state.phase.previous() {
            Some(previous) if self.move_to(&mut state, previous) => StepOutcome::Applied,
            _ => StepOutcome::Blocked,
        }
    }

    /// Roll back to `Confirming` after a failed step, unless a reset intervened
    fn fail_generation(
        &self,
        generation: u64,
        session: &SessionData,
        step: &str,
        err: WorkflowError,
    ) -> Result<StepOutcome, WorkflowError> {
        let mut state = self.lock();
        if state.generation != generation {
            log::debug!("[{}] Discarding stale {} failure: {}", self.report.key, step, err);
            return Ok(StepOutcome::Discarded);
        }

        log::error!(
            "[{}] {} failed in phase {} for session {} ({}): {}",
            self.report.key,
            step,
            state.phase.as_str(),
            session.session_id,
            err.kind(),
            err
        );
        state.processing = false;
        self.move_to(&mut state, InteractivePhase::Confirming);
        self.notify_error(&mut state, "Report generation failed", &err);
        Err(err)
    }

    /// Run apply, finalize and artifact decoding.
    ///
    /// A call while a generation is already in flight dispatches nothing and
    /// returns [`StepOutcome::Busy`]. Any failure returns the workflow to
    /// `Confirming` with selections intact. Once finalize has answered, the
    /// session is spent even if decoding fails, and a retry needs a new `load`.
    pub async fn generate(&self) -> Result<StepOutcome, WorkflowError> {
        let (generation, session, selections): (u64, SessionData, BTreeMap<String, String>) = {
            let mut state = self.lock();
            if state.processing || state.phase == InteractivePhase::Generating {
                log::debug!("[{}] generate ignored: already in flight", self.report.key);
                return Ok(StepOutcome::Busy);
            }
            if state.phase != InteractivePhase::Confirming {
                log::warn!("[{}] generate ignored in phase {}", self.report.key, state.phase.as_str());
                return Ok(StepOutcome::Blocked);
            }
            let Some(session) = state.session.clone() else {
                let err = WorkflowError::NoSession;
                self.notify_error(&mut state, "Cannot generate the report", &err);
                return Err(err);
            };

            let selections = state.selections.to_selection_map(&state.items);
            if let Some(previous) = state.artifact.take() {
                previous.release();
            }
            self.move_to(&mut state, InteractivePhase::Generating);
            state.processing = true;
            (state.generation, session, selections)
        };

        if selections.is_empty() {
            log::info!(
                "[{}] No selections for session {}, skipping apply",
                self.report.key,
                session.session_id
            );
        } else {
            let applied = self.api.apply(&self.report, &session, &selections).await;
            match applied {
                Ok(summary) => {
                    let mut state = self.lock();
                    if state.generation != generation {
                        log::debug!("[{}] Discarding stale apply result", self.report.key);
                        return Ok(StepOutcome::Discarded);
                    }
                    log::info!(
                        "[{}] Applied {} selection(s) for session {}",
                        self.report.key,
                        summary.applied_count().unwrap_or(selections.len()),
                        session.session_id
                    );
                    state.summary = Some(summary);
                }
                Err(err) => return self.fail_generation(generation, &session, "apply", err),
            }
        }

        let finalized = self.api.finalize(&self.report, &session).await;
        let body = match finalized {
            Ok(body) => body,
            Err(err) => return self.fail_generation(generation, &session, "finalize", err),
        };
        {
            let mut state = self.lock();
            if state.generation != generation {
                log::debug!("[{}] Discarding stale finalize result", self.report.key);
                return Ok(StepOutcome::Discarded);
            }
            // Finalize consumed the session; a failed decode needs a fresh upload
            state.session = None;
        }

        let hint = body.hint().map(str::to_string);
        let materialized = materialize(&self.api, &self.decoder, &self.report, body).await;
        let parts = match materialized {
            Ok(parts) => parts,
            Err(err) => return self.fail_generation(generation, &session, "decode", err),
        };

        let mut state = self.lock();
        if state.generation != generation {
            // Dropping the parts releases their preview handle
            log::debug!("[{}] Discarding stale artifact", self.report.key);
            return Ok(StepOutcome::Discarded);
        }
        state.processing = false;
        self.complete(&mut state, parts, hint);
        self.move_to(&mut state, InteractivePhase::Completed);
        Ok(StepOutcome::Applied)
    }

    /// Discard session, selections and artifact and return to `Selecting`.
    ///
    /// Reachable from any phase; results of steps still in flight are dropped
    /// when they arrive.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.processing = false;
        state.clear_negotiation();
        self.force_phase(&mut state, InteractivePhase::Selecting);
        log::info!("[{}] Workflow reset (generation {})", self.report.key, state.generation);

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

    /// Reset and drop all notifications
    pub fn close(&self) {
        self.reset();
        self.lock().notifications.clear();
    }

    pub fn phase(&self) -> InteractivePhase {
        self.lock().phase
    }

    pub fn is_processing(&self) -> bool {
        self.lock().processing
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn session(&self) -> Option<SessionData> {
        self.lock().session.clone()
    }

    pub fn items(&self) -> Vec<InteractiveItem> {
        self.lock().items.clone()
    }

    pub fn selection(&self, item_id: &str) -> Option<SelectionState> {
        self.lock().selections.get(item_id).cloned()
    }

    pub fn is_complete(&self) -> bool {
        let state = self.lock();
        state.selections.is_complete(&state.items)
    }

    pub fn submission_payload(&self) -> Vec<SubmissionEntry> {
        let state = self.lock();
        state.selections.to_submission_payload(&state.items)
    }

    pub fn summary(&self) -> Option<SelectionSummary> {
        self.lock().summary.clone()
    }

    /// Blobs of the finished artifact, for download or print
    pub fn artifact(&self) -> Option<ArtifactFiles> {
        self.lock().artifact.as_ref().map(ArtifactFiles::from_parts)
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.to_vec()
    }

    pub fn dismiss_notification(&self, id: &str) -> bool {
        self.lock().notifications.dismiss(id)
    }

    /// Everything the shell renders, captured under one lock
    pub fn snapshot(&self) -> WorkflowSnapshot {
        let state = self.lock();

        let items = state
            .items
            .iter()
            .map(|item| {
                let selection = state.selections.get(&item.id);
                let validation = match (&self.validation, selection) {
                    (Some(lookup), Some(selection)) => {
                        Some(lookup.validate(item.label_at(selection.index).unwrap_or(&selection.label)))
                    }
                    _ => None,
                };
                ItemView::new(item, selection, validation)
            })
            .collect();

        let idle = !state.processing;
        WorkflowSnapshot {
            report_key: self.report.key.clone(),
            phase: state.phase,
            phase_name: state.phase.display_name().to_string(),
            processing: state.processing,
            can_advance: idle
                && state.phase == InteractivePhase::Selecting
                && state.selections.is_complete(&state.items),
            can_go_back: idle && state.phase == InteractivePhase::Confirming,
            can_generate: idle && state.phase == InteractivePhase::Confirming && state.session.is_some(),
            session_id: state.session_id().map(str::to_string),
            items,
            completion_percentage: state.selections.completion_percentage(&state.items),
            submission: state.selections.to_submission_payload(&state.items),
            artifact: state.artifact.as_ref().map(ArtifactView::from_parts),
            notifications: state.notifications.to_vec(),
            summary: state.summary.clone(),
        }
    }
}
