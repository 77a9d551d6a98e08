//! The six literal end-to-end conversation scenarios, driven through the
//! public agent/state API the way the external interface would.

use std::path::PathBuf;
use std::sync::Arc;

use nwb_conversation_orchestrator::agents::ConversationAgent;
use nwb_conversation_orchestrator::backends::{StubConversionBackend, StubInspectorBackend};
use nwb_conversation_orchestrator::bus::Bus;
use nwb_conversation_orchestrator::diagnostics::LogLevel;
use nwb_conversation_orchestrator::event_bus::EventBus;
use nwb_conversation_orchestrator::llm::MockLlmGateway;
use nwb_conversation_orchestrator::state::{
    ConversationPhase, ConversionStatus, Finding, Severity, ValidationDisposition, ValidationOutcome,
    WorkflowStateHandle,
};

async fn harness(inspector: StubInspectorBackend) -> (ConversationAgent, WorkflowStateHandle) {
    let event_bus = Arc::new(EventBus::default());
    let state = WorkflowStateHandle::new(event_bus.get_emitter());
    let bus = Arc::new(Bus::new());
    ConversationAgent::register_agents(
        &bus,
        state.clone(),
        Arc::new(MockLlmGateway::new()),
        Arc::new(StubConversionBackend),
        Arc::new(inspector),
    )
    .await;
    let agent = ConversationAgent::new(state.clone(), bus, Arc::new(MockLlmGateway::new()));
    (agent, state)
}

async fn stage_spikeglx_pair(dir: &std::path::Path) -> PathBuf {
    let bin = dir.join("Noise4Sam_g0_t0.imec0.ap.bin");
    let meta = dir.join("Noise4Sam_g0_t0.imec0.ap.meta");
    tokio::fs::write(&bin, b"data").await.unwrap();
    tokio::fs::write(&meta, b"meta").await.unwrap();
    bin
}

#[tokio::test]
async fn scenario_1_happy_path_no_issues() {
    let (agent, state) = harness(StubInspectorBackend::new()).await;
    let dir = tempfile::tempdir().unwrap();
    let bin = stage_spikeglx_pair(dir.path()).await;

    state.begin_upload(bin, None).unwrap();
    agent.start_conversion().await.unwrap();
    state.read(|s| assert_eq!(s.conversation_phase, ConversationPhase::MetadataCollection));

    agent
        .chat("Dr. Jane Smith from MIT, male P60 C57BL/6 mouse, subject mouse001, visual cortex recording")
        .await
        .unwrap();

    state.read(|s| {
        assert_eq!(s.status, ConversionStatus::Completed);
        assert_eq!(s.validation_outcome, Some(ValidationOutcome::Passed));
        assert_eq!(s.validation_disposition, Some(ValidationDisposition::Passed));
        assert!(matches!(s.format_detection, Some(nwb_conversation_orchestrator::state::FormatDetection::Identified { ref format, .. }) if format == "SpikeGLX"));

        let effective = s.effective();
        assert_eq!(effective["experimenter"].value, "Smith, Jane");
        assert_eq!(effective["institution"].value, "Massachusetts Institute of Technology");
        assert_eq!(effective["species"].value, "Mus musculus");
        assert_eq!(effective["sex"].value, "M");
        assert_eq!(effective["age"].value, "P60D");
        assert_eq!(effective["subject_id"].value, "mouse001");
    });
}

#[tokio::test]
async fn scenario_2_decline_metadata_then_accept() {
    let finding = Finding {
        severity: Severity::BestPractice,
        message: "lab not specified".into(),
        location: "/general/lab".into(),
        check_name: "check_lab".into(),
    };
    let (agent, state) = harness(StubInspectorBackend::new().with_findings(vec![finding])).await;
    let dir = tempfile::tempdir().unwrap();
    let bin = stage_spikeglx_pair(dir.path()).await;

    state.begin_upload(bin, None).unwrap();
    agent.start_conversion().await.unwrap();
    agent.chat("skip for now").await.unwrap();

    state.read(|s| {
        let warnings: Vec<_> = s.log.iter().filter(|e| e.level == LogLevel::Warning).collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(s.validation_outcome, Some(ValidationOutcome::PassedWithIssues));
        assert_eq!(s.conversation_phase, ConversationPhase::ImprovementDecision);
    });

    agent.chat("accept").await.unwrap();

    state.read(|s| {
        assert_eq!(s.status, ConversionStatus::Completed);
        assert_eq!(s.validation_disposition, Some(ValidationDisposition::PassedAccepted));
    });
}

#[tokio::test]
async fn scenario_3_ambiguous_format_resolved_by_user() {
    let (agent, state) = harness(StubInspectorBackend::new()).await;
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("recording.bin");
    tokio::fs::write(&bin, b"data").await.unwrap();

    state.begin_upload(bin, None).unwrap();
    agent.start_conversion().await.unwrap();
    state.read(|s| assert_eq!(s.conversation_phase, ConversationPhase::FormatSelection));

    agent.chat("SpikeGLX").await.unwrap();
    state.read(|s| assert_eq!(s.conversation_phase, ConversationPhase::MetadataCollection));

    agent
        .chat("Dr. Jane Smith from MIT, male P60 C57BL/6 mouse, subject mouse001, visual cortex recording")
        .await
        .unwrap();

    state.read(|s| {
        assert_eq!(s.status, ConversionStatus::Completed);
        assert_eq!(s.validation_disposition, Some(ValidationDisposition::Passed));
    });
}

#[tokio::test]
async fn scenario_4_retry_with_no_progress_forces_failed_user_declined() {
    let finding = Finding {
        severity: Severity::Error,
        message: "timestamps are not monotonically increasing".into(),
        location: "/acquisition".into(),
        check_name: "check_timestamps".into(),
    };
    let inspector = StubInspectorBackend::new()
        .with_findings(vec![finding.clone()])
        .with_findings(vec![finding.clone()])
        .with_findings(vec![finding]);
    let (agent, state) = harness(inspector).await;
    let dir = tempfile::tempdir().unwrap();
    let bin = stage_spikeglx_pair(dir.path()).await;

    state.begin_upload(bin, None).unwrap();
    agent.start_conversion().await.unwrap();
    agent.chat("skip for now").await.unwrap();
    state.read(|s| assert_eq!(s.status, ConversionStatus::AwaitingRetryApproval));

    agent.decide_retry("approve").await.unwrap();
    state.read(|s| assert_eq!(s.status, ConversionStatus::AwaitingRetryApproval));

    agent.decide_retry("approve").await.unwrap();
    state.read(|s| {
        assert_eq!(s.status, ConversionStatus::Failed);
        assert_eq!(s.validation_disposition, Some(ValidationDisposition::FailedUserDeclined));
    });
}

#[tokio::test]
async fn scenario_5_cancellation_during_metadata_collection() {
    let (agent, state) = harness(StubInspectorBackend::new()).await;
    let dir = tempfile::tempdir().unwrap();
    let bin = stage_spikeglx_pair(dir.path()).await;

    state.begin_upload(bin, None).unwrap();
    agent.start_conversion().await.unwrap();
    agent.chat("cancel").await.unwrap();

    state.read(|s| {
        assert_eq!(s.status, ConversionStatus::Failed);
        assert_eq!(s.validation_disposition, Some(ValidationDisposition::FailedUserAbandoned));
        assert!(s.output_path.is_none());
    });
}

#[tokio::test]
async fn scenario_6_reupload_during_active_conversation() {
    let (agent, state) = harness(StubInspectorBackend::new()).await;
    let dir = tempfile::tempdir().unwrap();
    let bin = stage_spikeglx_pair(dir.path()).await;

    state.begin_upload(bin, None).unwrap();
    agent.start_conversion().await.unwrap();
    state.read(|s| assert_eq!(s.conversation_phase, ConversationPhase::MetadataCollection));
    let history_len_before = state.read(|s| s.history.len());

    let new_dir = tempfile::tempdir().unwrap();
    let new_bin = new_dir.path().join("replacement.bin");
    tokio::fs::write(&new_bin, b"new data").await.unwrap();
    state.begin_upload(new_bin.clone(), None).unwrap();

    state.read(|s| {
        assert_eq!(s.status, ConversionStatus::AwaitingUserInput);
        assert_eq!(s.pending_input_path, Some(new_bin.clone()));
        assert_eq!(s.history.len(), history_len_before);
    });

    agent
        .chat("Dr. Jane Smith from MIT, male P60 C57BL/6 mouse, subject mouse001, visual cortex recording")
        .await
        .unwrap();

    state.read(|s| {
        assert_eq!(s.status, ConversionStatus::Completed);
        assert_eq!(s.input_path, Some(new_bin.clone()));
        assert_eq!(s.pending_input_path, None);
    });
}
