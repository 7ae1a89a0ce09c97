//! Scenario tests for the step controllers, run against a scripted service

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::sync::Notify;
use zip::write::SimpleFileOptions;

use super::*;
use crate::config::ReportDefinition;
use crate::error::{WorkflowError, NETWORK_RETRY_MESSAGE};
use crate::events::{EventBroadcaster, EVENT_ARTIFACT_READY, EVENT_PHASE_CHANGED, EVENT_RESET};
use crate::models::{ArtifactDescriptor, CandidateRow, SelectionSummary, SessionData, UploadFile, VendorCode};
use crate::negotiation::{ArtifactBody, NegotiationApi, NegotiationResult};
use crate::validation::StaticValidation;

// =============================================================================
// Scripted service
// =============================================================================

#[derive(Default)]
struct FakeApi {
    starts: Mutex<VecDeque<Result<NegotiationResult, WorkflowError>>>,
    applies: Mutex<VecDeque<Result<SelectionSummary, WorkflowError>>>,
    finalizes: Mutex<VecDeque<Result<ArtifactBody, WorkflowError>>>,
    downloads: Mutex<HashMap<String, Vec<u8>>>,
    /// When set, finalize waits for a permit before answering
    finalize_gate: Option<Arc<Notify>>,
    start_calls: AtomicUsize,
    apply_calls: AtomicUsize,
    finalize_calls: AtomicUsize,
    applied: Mutex<Vec<(String, BTreeMap<String, String>)>>,
    finalized: Mutex<Vec<String>>,
}

impl FakeApi {
    fn new() -> Self {
        Self::default()
    }

    fn on_start(self, result: Result<NegotiationResult, WorkflowError>) -> Self {
        self.starts.lock().unwrap().push_back(result);
        self
    }

    fn on_apply(self, result: Result<SelectionSummary, WorkflowError>) -> Self {
        self.applies.lock().unwrap().push_back(result);
        self
    }

    fn on_finalize(self, result: Result<ArtifactBody, WorkflowError>) -> Self {
        self.finalizes.lock().unwrap().push_back(result);
        self
    }

    fn serving(self, url: &str, bytes: &[u8]) -> Self {
        self.downloads
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes.to_vec());
        self
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.finalize_gate = Some(gate);
        self
    }

    fn calls(&self) -> (usize, usize, usize) {
        (
            self.start_calls.load(Ordering::SeqCst),
            self.apply_calls.load(Ordering::SeqCst),
            self.finalize_calls.load(Ordering::SeqCst),
        )
    }
}

fn unscripted(operation: &str) -> WorkflowError {
    WorkflowError::UnexpectedResponse(format!("no scripted {} response", operation))
}

impl NegotiationApi for FakeApi {
    async fn start(
        &self,
        _report: &ReportDefinition,
        _files: &[UploadFile],
    ) -> Result<NegotiationResult, WorkflowError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.starts.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(unscripted("start")))
    }

    async fn apply(
        &self,
        _report: &ReportDefinition,
        session: &SessionData,
        selections: &BTreeMap<String, String>,
    ) -> Result<SelectionSummary, WorkflowError> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        self.applied
            .lock()
            .unwrap()
            .push((session.session_id.clone(), selections.clone()));
        let next = self.applies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(SelectionSummary {
                raw: serde_json::to_value(selections).unwrap_or_default(),
            })
        })
    }

    async fn finalize(
        &self,
        _report: &ReportDefinition,
        session: &SessionData,
    ) -> Result<ArtifactBody, WorkflowError> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        self.finalized
            .lock()
            .unwrap()
            .push(session.session_id.clone());
        if let Some(gate) = &self.finalize_gate {
            gate.notified().await;
        }
        let next = self.finalizes.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(unscripted("finalize")))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, WorkflowError> {
        let found = self.downloads.lock().unwrap().get(url).cloned();
        found.ok_or_else(|| WorkflowError::RemoteRejection {
            status: 404,
            message: format!("{} not found", url),
            hint: None,
        })
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn report() -> ReportDefinition {
    ReportDefinition {
        key: "shipping_ledger".to_string(),
        endpoint: "reports/shipping-ledger".to_string(),
        required_inputs: vec!["shipments".to_string(), "vendors".to_string()],
        interactive: true,
        report_type: None,
    }
}

fn files() -> Vec<UploadFile> {
    vec![
        UploadFile::new("shipments", "shipments.csv", b"id,item\n1,rice".to_vec()),
        UploadFile::new("vendors", "vendors.csv", b"code,name\n10,Yamada".to_vec()),
    ]
}

fn row(id: &str, options: &[&str], initial_index: usize) -> CandidateRow {
    CandidateRow {
        entry_id: id.to_string(),
        vendor_code: VendorCode::Number(10),
        vendor_name: "山田商店".to_string(),
        item_name: format!("item-{}", id),
        detail: None,
        options: options.iter().map(|s| s.to_string()).collect(),
        initial_index,
    }
}

fn negotiable(session_id: &str, rows: Vec<CandidateRow>) -> Result<NegotiationResult, WorkflowError> {
    Ok(NegotiationResult::Negotiable {
        session: SessionData::new(session_id),
        rows,
    })
}

fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn ledger_archive() -> ArtifactBody {
    ArtifactBody::Archive(build_zip(&[
        ("ledger.xlsx", b"sheet"),
        ("ledger.pdf", b"%PDF-1.7 body"),
    ]))
}

fn two_rows() -> Vec<CandidateRow> {
    vec![row("1", &["A", "B"], 0), row("2", &["X", "Y", "Z"], 2)]
}

/// Workflow loaded with `rows` and moved to `Confirming`
async fn confirmed(api: FakeApi, rows: Vec<CandidateRow>) -> InteractiveWorkflow<FakeApi> {
    let wf = InteractiveWorkflow::new(api.on_start(negotiable("sess-1", rows)), report());
    assert_eq!(wf.load(&files()).await.unwrap(), StepOutcome::Applied);
    assert_eq!(wf.confirm(), StepOutcome::Applied);
    wf
}

// =============================================================================
// Loading and selection
// =============================================================================

#[tokio::test]
async fn test_load_seeds_defaults() {
    let api = FakeApi::new().on_start(negotiable(
        "sess-1",
        vec![row("1", &["A", "B"], 1), row("2", &[], 0)],
    ));
    let wf = InteractiveWorkflow::new(api, report());

    assert_eq!(wf.load(&files()).await.unwrap(), StepOutcome::Applied);
    assert_eq!(wf.phase(), InteractivePhase::Selecting);
    assert!(!wf.is_processing());
    assert_eq!(wf.session(), Some(SessionData::new("sess-1")));
    assert_eq!(wf.items().len(), 2);
    assert_eq!(wf.selection("1").unwrap().label, "B");
    assert!(wf.selection("2").is_none());
    assert!(wf.is_complete());
}

#[tokio::test]
async fn test_load_validates_uploads_before_sending() {
    let wf = InteractiveWorkflow::new(FakeApi::new(), report());
    let err = wf.load(&files()[..1]).await.unwrap_err();

    assert!(matches!(err, WorkflowError::Validation(_)));
    assert_eq!(wf.api().calls(), (0, 0, 0));
    assert_eq!(wf.notifications().len(), 1);
}

#[tokio::test]
async fn test_start_failure_surfaces_message_and_hint() {
    let api = FakeApi::new().on_start(Err(WorkflowError::RemoteRejection {
        status: 400,
        message: "ヘッダーが一致しません".to_string(),
        hint: Some("出荷CSVを選択してください".to_string()),
    }));
    let wf = InteractiveWorkflow::new(api, report());

    assert!(wf.load(&files()).await.is_err());
    assert!(!wf.is_processing());
    assert!(wf.session().is_none());

    let notifications = wf.notifications();
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[0].level, NotificationLevel::Error);
    assert_eq!(notifications[0].message, "ヘッダーが一致しません");
    assert_eq!(notifications[1].level, NotificationLevel::Info);
}

#[tokio::test]
async fn test_select_clamps_and_is_phase_gated() {
    let api = FakeApi::new().on_start(negotiable("sess-1", two_rows()));
    let wf = InteractiveWorkflow::new(api, report());
    wf.load(&files()).await.unwrap();

    let selection = wf.select("2", 99).unwrap();
    assert_eq!(selection.index, 2);
    assert_eq!(selection.label, "Z");

    assert!(matches!(
        wf.select("missing", 0),
        Err(WorkflowError::Validation(_))
    ));

    wf.confirm();
    assert!(wf.select("1", 1).is_err());
    assert_eq!(wf.selection("1").unwrap().index, 0);
}

#[tokio::test]
async fn test_go_back_keeps_selections() {
    let wf = confirmed(FakeApi::new(), two_rows()).await;
    assert_eq!(wf.go_back(), StepOutcome::Applied);
    assert_eq!(wf.phase(), InteractivePhase::Selecting);
    assert_eq!(wf.go_back(), StepOutcome::Blocked);

    wf.select("1", 1).unwrap();
    assert_eq!(wf.confirm(), StepOutcome::Applied);
    assert_eq!(wf.selection("1").unwrap().label, "B");
}

#[tokio::test]
async fn test_fresh_start_overwrites_session() {
    let api = FakeApi::new()
        .on_start(negotiable("sess-1", two_rows()))
        .on_start(negotiable("sess-2", vec![row("9", &["Q"], 0)]))
        .on_finalize(Ok(ledger_archive()));
    let wf = InteractiveWorkflow::new(api, report());

    wf.load(&files()).await.unwrap();
    wf.select("1", 1).unwrap();
    wf.load(&files()).await.unwrap();

    assert_eq!(wf.session(), Some(SessionData::new("sess-2")));
    assert!(wf.selection("1").is_none());
    assert_eq!(wf.items().len(), 1);

    wf.confirm();
    wf.generate().await.unwrap();
    let applied = wf.api().applied.lock().unwrap().clone();
    assert_eq!(applied[0].0, "sess-2");
    assert_eq!(wf.api().finalized.lock().unwrap().clone(), vec!["sess-2"]);
}

// =============================================================================
// Generation
// =============================================================================

#[tokio::test]
async fn test_generate_happy_path() {
    let events = EventBroadcaster::new();
    let mut rx = events.subscribe();
    let api = FakeApi::new()
        .on_start(negotiable("sess-1", two_rows()))
        .on_finalize(Ok(ledger_archive()));
    let wf = InteractiveWorkflow::new(api, report()).with_events(events);

    wf.load(&files()).await.unwrap();
    wf.select("1", 1).unwrap();
    wf.confirm();
    assert_eq!(wf.generate().await.unwrap(), StepOutcome::Applied);

    assert_eq!(wf.phase(), InteractivePhase::Completed);
    assert!(!wf.is_processing());
    assert!(wf.session().is_none());
    assert!(wf.summary().is_some());

    let applied = wf.api().applied.lock().unwrap().clone();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].0, "sess-1");
    assert_eq!(applied[0].1.get("1").map(String::as_str), Some("B"));
    assert_eq!(applied[0].1.get("2").map(String::as_str), Some("Z"));

    let files = wf.artifact().unwrap();
    assert_eq!(files.spreadsheet.unwrap().bytes(), b"sheet");
    assert!(files.document.is_some());
    let preview = files.preview_url.unwrap();
    assert!(wf.previews().is_live(&preview));

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.event);
    }
    assert!(names.iter().any(|n| n == EVENT_PHASE_CHANGED));
    assert!(names.iter().any(|n| n == EVENT_ARTIFACT_READY));
}

#[tokio::test]
async fn test_empty_rows_skip_apply() {
    let api = FakeApi::new().on_finalize(Ok(ledger_archive()));
    let wf = confirmed(api, vec![]).await;

    assert!(wf.submission_payload().is_empty());
    assert_eq!(wf.phase(), InteractivePhase::Confirming);
    assert_eq!(wf.generate().await.unwrap(), StepOutcome::Applied);
    assert_eq!(wf.api().calls(), (1, 0, 1));
    assert_eq!(wf.phase(), InteractivePhase::Completed);
}

#[tokio::test]
async fn test_generate_without_session_is_rejected() {
    let wf = InteractiveWorkflow::new(FakeApi::new(), report());
    // No items: trivially complete
    assert_eq!(wf.confirm(), StepOutcome::Applied);

    let err = wf.generate().await.unwrap_err();
    assert_eq!(err, WorkflowError::NoSession);
    assert_eq!(wf.api().calls(), (0, 0, 0));
    assert_eq!(wf.phase(), InteractivePhase::Confirming);
}

#[tokio::test]
async fn test_generate_outside_confirming_is_blocked() {
    let api = FakeApi::new().on_start(negotiable("sess-1", two_rows()));
    let wf = InteractiveWorkflow::new(api, report());
    wf.load(&files()).await.unwrap();

    assert_eq!(wf.generate().await.unwrap(), StepOutcome::Blocked);
    assert_eq!(wf.api().calls(), (1, 0, 0));
}

#[tokio::test]
async fn test_apply_failure_rolls_back_to_confirming() {
    let api = FakeApi::new().on_apply(Err(WorkflowError::RemoteRejection {
        status: 409,
        message: "session expired".to_string(),
        hint: Some("upload again".to_string()),
    }));
    let wf = confirmed(api, two_rows()).await;
    wf.go_back();
    wf.select("1", 1).unwrap();
    wf.confirm();

    assert!(wf.generate().await.is_err());
    assert_eq!(wf.phase(), InteractivePhase::Confirming);
    assert!(!wf.is_processing());
    assert_eq!(wf.selection("1").unwrap().label, "B");
    assert_eq!(wf.session(), Some(SessionData::new("sess-1")));
    assert_eq!(wf.api().calls(), (1, 1, 0));

    let messages: Vec<String> = wf.notifications().into_iter().map(|n| n.message).collect();
    assert!(messages.contains(&"session expired".to_string()));
    assert!(messages.contains(&"upload again".to_string()));
}

#[tokio::test]
async fn test_finalize_failure_rolls_back_and_retry_succeeds() {
    let api = FakeApi::new()
        .on_finalize(Err(WorkflowError::Network("connection reset".to_string())))
        .on_finalize(Ok(ledger_archive()));
    let wf = confirmed(api, two_rows()).await;

    let err = wf.generate().await.unwrap_err();
    assert_eq!(err.user_message(), NETWORK_RETRY_MESSAGE);
    assert_eq!(wf.phase(), InteractivePhase::Confirming);
    assert_eq!(wf.selection("2").unwrap().index, 2);

    assert_eq!(wf.generate().await.unwrap(), StepOutcome::Applied);
    assert_eq!(wf.phase(), InteractivePhase::Completed);
    assert_eq!(wf.api().calls(), (1, 2, 2));
}

#[tokio::test]
async fn test_bad_archive_rolls_back() {
    let api = FakeApi::new().on_finalize(Ok(ArtifactBody::Archive(b"PK\x03\x04 truncated".to_vec())));
    let wf = confirmed(api, two_rows()).await;

    let err = wf.generate().await.unwrap_err();
    assert!(matches!(err, WorkflowError::ArchiveFormat(_)));
    assert_eq!(wf.phase(), InteractivePhase::Confirming);
    assert!(wf.artifact().is_none());
}

#[tokio::test]
async fn test_decode_failure_does_not_reuse_finalized_session() {
    let api = FakeApi::new()
        .on_finalize(Ok(ArtifactBody::Archive(b"PK\x03\x04 truncated".to_vec())))
        .on_finalize(Ok(ledger_archive()));
    let wf = confirmed(api, two_rows()).await;

    assert!(matches!(wf.generate().await.unwrap_err(), WorkflowError::ArchiveFormat(_)));
    assert_eq!(wf.phase(), InteractivePhase::Confirming);
    assert!(wf.session().is_none());
    assert_eq!(wf.selection("2").unwrap().label, "Z");
    assert!(!wf.snapshot().can_generate);

    // A retry must not send the spent session again
    assert_eq!(wf.generate().await.unwrap_err(), WorkflowError::NoSession);
    assert_eq!(wf.api().calls(), (1, 1, 1));
    assert_eq!(wf.api().finalized.lock().unwrap().clone(), vec!["sess-1"]);
    assert_eq!(wf.phase(), InteractivePhase::Confirming);

    let kinds: Vec<Option<String>> = wf.notifications().into_iter().map(|n| n.error_kind).collect();
    assert!(kinds.contains(&Some("archive_format".to_string())));
    assert!(kinds.contains(&Some("no_session".to_string())));
}

#[tokio::test]
async fn test_archive_without_parts_never_completes() {
    let api = FakeApi::new().on_finalize(Ok(ArtifactBody::Archive(build_zip(&[("notes.txt", b"n")]))));
    let wf = confirmed(api, two_rows()).await;

    assert_eq!(wf.generate().await.unwrap_err(), WorkflowError::EmptyArtifact);
    assert_eq!(wf.phase(), InteractivePhase::Confirming);
    assert_eq!(wf.previews().outstanding(), 0);
}

#[tokio::test]
async fn test_suspect_document_is_delivered_with_warning() {
    let api = FakeApi::new().on_finalize(Ok(ArtifactBody::Document(b"<html>error</html>".to_vec())));
    let wf = confirmed(api, two_rows()).await;

    assert_eq!(wf.generate().await.unwrap(), StepOutcome::Applied);
    assert_eq!(wf.phase(), InteractivePhase::Completed);

    let snapshot = wf.snapshot();
    let artifact = snapshot.artifact.unwrap();
    assert!(artifact.suspect);
    assert_eq!(artifact.warnings[0].found, "<htm");
    assert!(wf.artifact().unwrap().document.is_some());
    assert!(wf
        .notifications()
        .iter()
        .any(|n| n.level == NotificationLevel::Warning));
}

#[tokio::test]
async fn test_descriptor_downloads_spreadsheet_and_decodes_document() {
    let descriptor = ArtifactDescriptor {
        spreadsheet_url: Some("/files/ledger.xlsx".to_string()),
        report_key: Some("shipping_ledger".to_string()),
        report_date: Some("20240531".to_string()),
        spreadsheet_base64: None,
        document_base64: Some(STANDARD.encode(b"%PDF-1.4 doc")),
        hint: Some("印刷前に内容を確認してください".to_string()),
    };
    let api = FakeApi::new()
        .serving("/files/ledger.xlsx", b"xlsx-bytes")
        .on_finalize(Ok(ArtifactBody::Descriptor(descriptor)));
    let wf = confirmed(api, two_rows()).await;

    wf.generate().await.unwrap();
    let files = wf.artifact().unwrap();
    let sheet = files.spreadsheet.unwrap();
    assert_eq!(sheet.file_name(), "shipping_ledger_20240531.xlsx");
    assert_eq!(sheet.bytes(), b"xlsx-bytes");
    assert_eq!(files.document.unwrap().file_name(), "shipping_ledger_20240531.pdf");
    assert!(wf
        .notifications()
        .iter()
        .any(|n| n.message == "印刷前に内容を確認してください"));
}

#[tokio::test]
async fn test_failed_download_rolls_back() {
    let descriptor = ArtifactDescriptor {
        spreadsheet_url: Some("/files/missing.xlsx".to_string()),
        ..Default::default()
    };
    let api = FakeApi::new().on_finalize(Ok(ArtifactBody::Descriptor(descriptor)));
    let wf = confirmed(api, two_rows()).await;

    assert!(wf.generate().await.is_err());
    assert_eq!(wf.phase(), InteractivePhase::Confirming);
}

// =============================================================================
// Concurrency and reset
// =============================================================================

#[tokio::test]
async fn test_concurrent_generate_dispatches_once() {
    let gate = Arc::new(Notify::new());
    let api = FakeApi::new()
        .gated(gate.clone())
        .on_finalize(Ok(ledger_archive()));
    let wf = confirmed(api, two_rows()).await;

    let first = wf.generate();
    let second = async {
        tokio::task::yield_now().await;
        let outcome = wf.generate().await;
        gate.notify_one();
        outcome
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap(), StepOutcome::Applied);
    assert_eq!(second.unwrap(), StepOutcome::Busy);
    assert_eq!(wf.api().calls(), (1, 1, 1));
    assert_eq!(wf.phase(), InteractivePhase::Completed);
}

#[tokio::test]
async fn test_reset_during_generating_discards_result() {
    let gate = Arc::new(Notify::new());
    let events = EventBroadcaster::new();
    let mut rx = events.subscribe();
    let api = FakeApi::new()
        .gated(gate.clone())
        .on_finalize(Ok(ledger_archive()));
    let wf = InteractiveWorkflow::new(api.on_start(negotiable("sess-1", two_rows())), report())
        .with_events(events);
    wf.load(&files()).await.unwrap();
    wf.confirm();

    let run = wf.generate();
    let interrupt = async {
        while wf.phase() != InteractivePhase::Generating {
            tokio::task::yield_now().await;
        }
        assert!(wf.is_processing());
        wf.reset();
        gate.notify_one();
    };
    let (outcome, _) = tokio::join!(run, interrupt);

    assert_eq!(outcome.unwrap(), StepOutcome::Discarded);
    assert_eq!(wf.phase(), InteractivePhase::Selecting);
    assert!(!wf.is_processing());
    assert!(wf.session().is_none());
    assert!(wf.items().is_empty());
    assert!(wf.artifact().is_none());
    assert_eq!(wf.previews().outstanding(), 0);

    let mut saw_reset = false;
    while let Ok(event) = rx.try_recv() {
        saw_reset |= event.event == EVENT_RESET;
        assert_ne!(event.event, EVENT_ARTIFACT_READY);
    }
    assert!(saw_reset);
}

#[tokio::test]
async fn test_single_outstanding_preview_handle() {
    let api = FakeApi::new()
        .on_start(negotiable("sess-1", two_rows()))
        .on_start(negotiable("sess-2", two_rows()))
        .on_finalize(Ok(ledger_archive()))
        .on_finalize(Ok(ledger_archive()));
    let wf = InteractiveWorkflow::new(api, report());

    wf.load(&files()).await.unwrap();
    wf.confirm();
    wf.generate().await.unwrap();
    let first = wf.artifact().unwrap().preview_url.unwrap();
    assert_eq!(wf.previews().outstanding(), 1);

    wf.load(&files()).await.unwrap();
    assert!(!wf.previews().is_live(&first));
    wf.confirm();
    wf.generate().await.unwrap();
    assert_eq!(wf.previews().outstanding(), 1);

    wf.close();
    assert_eq!(wf.previews().outstanding(), 0);
    assert!(wf.notifications().is_empty());
}

#[tokio::test]
async fn test_reset_from_every_phase() {
    let api = FakeApi::new()
        .on_start(negotiable("sess-1", two_rows()))
        .on_finalize(Ok(ledger_archive()));
    let wf = InteractiveWorkflow::new(api, report());

    wf.reset();
    assert_eq!(wf.phase(), InteractivePhase::Selecting);

    wf.load(&files()).await.unwrap();
    wf.confirm();
    let before = wf.generation();
    wf.reset();
    assert_eq!(wf.generation(), before + 1);
    assert!(wf.items().is_empty());
}

// =============================================================================
// Hand-off, validation and the shell contract
// =============================================================================

#[tokio::test]
async fn test_direct_artifact_completes_without_negotiation() {
    let api = FakeApi::new().on_start(Ok(NegotiationResult::DirectArtifact(ArtifactBody::Document(
        b"%PDF-1.4".to_vec(),
    ))));
    let wf = InteractiveWorkflow::new(api, report());

    assert_eq!(wf.load(&files()).await.unwrap(), StepOutcome::Applied);
    assert_eq!(wf.phase(), InteractivePhase::Completed);
    assert!(wf.artifact().unwrap().document.is_some());
}

#[tokio::test]
async fn test_validation_warns_but_does_not_block() {
    let api = FakeApi::new().on_start(negotiable("sess-1", vec![row("1", &["廃止便", "ヤマト"], 0)]));
    let wf = InteractiveWorkflow::new(api, report())
        .with_validation(StaticValidation::new().reject("廃止便", "この便は利用できません"));
    wf.load(&files()).await.unwrap();

    let snapshot = wf.snapshot();
    let validation = snapshot.items[0].validation.clone().unwrap();
    assert!(!validation.valid);

    assert_eq!(wf.confirm(), StepOutcome::Applied);
    assert!(wf
        .notifications()
        .iter()
        .any(|n| n.level == NotificationLevel::Warning && n.message.contains("この便は利用できません")));
}

#[tokio::test]
async fn test_snapshot_flags_follow_phase() {
    let api = FakeApi::new().on_start(negotiable("sess-1", two_rows()));
    let wf = InteractiveWorkflow::new(api, report());
    wf.load(&files()).await.unwrap();

    let selecting = wf.snapshot();
    assert!(selecting.can_advance);
    assert!(!selecting.can_go_back);
    assert!(!selecting.can_generate);
    assert_eq!(selecting.completion_percentage, 100);
    assert_eq!(selecting.submission.len(), 2);
    assert_eq!(selecting.session_id.as_deref(), Some("sess-1"));

    wf.confirm();
    let confirming = wf.snapshot();
    assert!(!confirming.can_advance);
    assert!(confirming.can_go_back);
    assert!(confirming.can_generate);

    let json = serde_json::to_value(&confirming).unwrap();
    assert_eq!(json["phase"], "confirming");
    assert_eq!(json["canGenerate"], true);
}

#[tokio::test]
async fn test_dismiss_notification() {
    let wf = InteractiveWorkflow::new(FakeApi::new(), report());
    let _ = wf.load(&[]).await;
    let id = wf.notifications()[0].id.clone();
    assert!(wf.dismiss_notification(&id));
    assert!(wf.notifications().is_empty());
}

#[tokio::test]
async fn test_auto_run_completes_with_archive() {
    let api = FakeApi::new().on_start(Ok(NegotiationResult::DirectArtifact(ledger_archive())));
    let wf = AutoWorkflow::new(api, report());

    assert_eq!(wf.run(&files()).await.unwrap(), AutoOutcome::Completed);
    assert_eq!(wf.phase(), AutoPhase::Completed);
    assert!(wf.artifact().unwrap().spreadsheet.is_some());
    assert_eq!(wf.previews().outstanding(), 1);

    wf.reset();
    assert_eq!(wf.phase(), AutoPhase::Idle);
    assert_eq!(wf.previews().outstanding(), 0);
}

#[tokio::test]
async fn test_auto_failure_returns_to_idle() {
    let api = FakeApi::new().on_start(Err(WorkflowError::Network("timeout".to_string())));
    let wf = AutoWorkflow::new(api, report());

    assert!(wf.run(&files()).await.is_err());
    assert_eq!(wf.phase(), AutoPhase::Idle);
    assert_eq!(wf.snapshot().notifications[0].message, NETWORK_RETRY_MESSAGE);
    assert_eq!(wf.api().calls(), (1, 0, 0));
}

#[tokio::test]
async fn test_auto_empty_negotiation_finalizes() {
    let api = FakeApi::new()
        .on_start(negotiable("sess-9", vec![]))
        .on_finalize(Ok(ledger_archive()));
    let wf = AutoWorkflow::new(api, report());

    assert_eq!(wf.run(&files()).await.unwrap(), AutoOutcome::Completed);
    assert_eq!(wf.api().calls(), (1, 0, 1));
    assert_eq!(wf.api().finalized.lock().unwrap().clone(), vec!["sess-9"]);
}

#[tokio::test]
async fn test_auto_hands_off_to_interactive() {
    let auto = AutoWorkflow::new(
        FakeApi::new().on_start(negotiable("sess-7", two_rows())),
        report(),
    );
    let pending = match auto.run(&files()).await.unwrap() {
        AutoOutcome::NegotiationRequired(pending) => pending,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(auto.phase(), AutoPhase::Idle);

    let interactive = InteractiveWorkflow::new(
        FakeApi::new().on_finalize(Ok(ledger_archive())),
        report(),
    );
    assert_eq!(interactive.resume(pending).unwrap(), StepOutcome::Applied);
    assert_eq!(interactive.session(), Some(SessionData::new("sess-7")));
    assert_eq!(interactive.items().len(), 2);

    interactive.confirm();
    interactive.generate().await.unwrap();
    assert_eq!(interactive.api().calls(), (0, 1, 1));
}

#[test]
fn test_resume_rejects_other_report() {
    let wf = InteractiveWorkflow::new(FakeApi::new(), report());
    let pending = PendingNegotiation {
        report_key: "sales_ledger".to_string(),
        session: SessionData::new("s"),
        rows: vec![],
    };
    assert!(matches!(wf.resume(pending), Err(WorkflowError::Validation(_))));
}
