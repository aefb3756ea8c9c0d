//! Batch runs over a template store

use botcheck_common::reference::{reference_defaults, reference_rules};
use botcheck_common::{OutcomeReason, ResponseClassifier, Scenario, TemplateStore, VariableBindings};
use botcheck_harness::runner::RESULTS_FILE;
use botcheck_harness::{
    ConversationDriver, DriverConfig, EventKind, FixedChooser, RunContext, RunOrchestrator,
    ScriptedTransport, SuiteResult,
};

fn orchestrator(output_dir: &std::path::Path) -> RunOrchestrator {
    let classifier = ResponseClassifier::new(reference_rules().unwrap());
    let driver = ConversationDriver::new(classifier, DriverConfig::default())
        .with_chooser(FixedChooser::default());
    let context = RunContext::new(VariableBindings::new(reference_defaults()));
    RunOrchestrator::new(driver, context).with_output_dir(output_dir)
}

fn store() -> TemplateStore {
    TemplateStore::from_scenarios(vec![
        Scenario::new(
            "create_crop",
            vec!["crear cultivo".into(), "registra cultivo {crop_name}".into()],
        ),
        Scenario::new("list_crops", vec!["listar cultivos".into()]),
    ])
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn batch_continues_past_failures() {
    let dir = tempfile::tempdir().unwrap();
    let mut transport = ScriptedTransport::replies([
        vec!["Nombre del cultivo."],
        vec!["Cultivo creado correctamente"],
        vec!["Error: no se pudo guardar el cultivo"],
        vec!["Cultivo: trigo (Chamorro)"],
    ])
    .ignoring(["cancelar"]);

    let mut orchestrator = orchestrator(dir.path());
    let suite = orchestrator.run_all(&mut transport, &store()).await;

    assert_eq!(suite.total, 3);
    assert_eq!(suite.passed, 2);
    assert_eq!(suite.failed, 1);
    assert!(!suite.success());
    assert_eq!(
        suite.failure_lines(),
        vec!["[create_crop] \"registra cultivo trigo\" → ended-error".to_string()]
    );

    let templates: Vec<&str> = suite.results.iter().map(|r| r.template.as_str()).collect();
    assert_eq!(
        templates,
        vec!["crear cultivo", "registra cultivo trigo", "listar cultivos"]
    );

    for result in &suite.results {
        assert_eq!(result.log.events()[0].kind, EventKind::Scenario);
    }
    assert_eq!(suite.results[0].turns, 2);
    assert_eq!(
        suite.results[2].log.texts(EventKind::Received),
        vec!["Cultivo: trigo (Chamorro)"]
    );
}

#[tokio::test(start_paused = true)]
async fn exception_in_one_run_does_not_abort_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    // sends: 0 crear cultivo, 1 trigo, 2 cancelar, 3 registra cultivo trigo
    let mut transport = ScriptedTransport::replies([
        vec!["Nombre del cultivo."],
        vec!["Cultivo creado correctamente"],
        vec!["Cultivo: trigo (Chamorro)"],
    ])
    .ignoring(["cancelar"])
    .failing_send_at(3);

    let mut orchestrator = orchestrator(dir.path());
    let suite = orchestrator.run_all(&mut transport, &store()).await;

    assert_eq!(suite.total, 3);
    assert_eq!(suite.count_reason(OutcomeReason::Exception), 1);
    assert_eq!(suite.passed, 2);
    assert!(suite.results[1].error.is_some());
}

#[tokio::test(start_paused = true)]
async fn results_file_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let mut transport = ScriptedTransport::default().ignoring(["cancelar"]);
    let mut orchestrator = orchestrator(dir.path());

    let single = TemplateStore::from_scenarios(vec![Scenario::new(
        "list_crops",
        vec!["listar cultivos".into()],
    )])
    .unwrap();
    let suite = orchestrator.run_all(&mut transport, &single).await;
    assert_eq!(suite.count_reason(OutcomeReason::NoResponseTimeout), 1);

    let path = orchestrator.write_results(&suite).unwrap();
    assert_eq!(path, dir.path().join(RESULTS_FILE));

    let back: SuiteResult =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(back, suite);
}
