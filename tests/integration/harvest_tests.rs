//! End-to-end runs of the orchestrator against a mocked council website

use crate::common::{
    cancel_after, document_page, html, index_page, listing_page, members_page, open_storage,
    profile_page, run_mode, run_mode_with_cancel, test_config,
};
use council_harvest::state::OperationStatus;
use council_harvest::storage::Storage;
use council_harvest::{HarvestError, Phase, RunMode, RunState};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TWO_MEMBERS: &[(&str, &str, &str, u32)] = &[
    ("Ana Maria Souza", "Ana Souza", "PT", 1),
    ("Bruno Lima", "Bruno Lima", "PL", 2),
];

async fn mount_page(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .mount(server)
        .await;
}

async fn mount_expecting(server: &MockServer, route: &str, body: String, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .expect(times)
        .mount(server)
        .await;
}

/// Index, listing and documents for a single member with three documents
async fn mount_detail_site(server: &MockServer) {
    mount_page(
        server,
        "/Consulta/Vereadores/",
        index_page(&[("Ana Maria Souza - Ana Souza", "/Consulta/1/Detalhadas")]),
    )
    .await;
    mount_page(
        server,
        "/Consulta/1/Detalhadas",
        listing_page("Moção", &["/doc/1", "/doc/2", "/doc/3"]),
    )
    .await;
}

#[tokio::test]
async fn test_full_run_collects_every_phase() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), dir.path());
    config.output.report_path = dir.path().join("report.md").to_string_lossy().into_owned();

    mount_page(&server, "/Vereador", members_page(TWO_MEMBERS, true)).await;
    for id in [1, 2] {
        Mock::given(method("GET"))
            .and(path(format!("/img/vereador{}.jpg", id)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, id as u8]))
            .expect(1)
            .mount(&server)
            .await;
        mount_page(
            &server,
            &format!("/Vereador/{}", id),
            profile_page(&["2023", "2024"], &[("Moção", &["1", "2"]), ("Indicação", &["3", "0"])]),
        )
        .await;
    }
    mount_page(
        &server,
        "/Consulta/Vereadores/",
        index_page(&[
            ("Ana Maria Souza - Ana Souza", "/Consulta/1/Detalhadas"),
            ("Bruno Lima", "/Consulta/2/Detalhadas"),
        ]),
    )
    .await;
    mount_page(&server, "/Consulta/1/Detalhadas", listing_page("Moção", &["/doc/1", "/doc/2"])).await;
    mount_page(&server, "/Consulta/2/Detalhadas", listing_page("Indicação", &["/doc/3"])).await;
    mount_page(&server, "/doc/1", document_page("Aprovado", "05/03/2024")).await;
    mount_page(&server, "/doc/2", document_page("Em tramitação", "10/10/2023")).await;
    mount_page(&server, "/doc/3", document_page("Aprovado", "01/02/2019")).await;

    let (orchestrator, result) = run_mode(&config, RunMode::Full).await;
    let summary = result.unwrap();

    assert_eq!(orchestrator.state(), RunState::Done);
    let phases: Vec<Phase> = summary.outcomes.iter().map(|o| o.phase).collect();
    assert_eq!(
        phases,
        vec![Phase::BasicInfo, Phase::Images, Phase::Summaries, Phase::Detailed, Phase::Report]
    );

    let storage = open_storage(&config);
    assert_eq!(storage.count_entities().unwrap(), 2);
    assert_eq!(storage.count_summaries().unwrap(), 8);
    assert_eq!(storage.count_details().unwrap(), 2);
    // Two stored documents plus the one dated before the minimum year
    assert_eq!(storage.count_processed_links(None).unwrap(), 3);

    let details = storage.load_details("Ana Souza").unwrap();
    assert_eq!(details.len(), 2);
    assert!(details.iter().all(|d| d.category == "Moção"));

    let images = dir.path().join("img");
    assert!(images.join("Ana Souza.jpg").exists());
    assert!(images.join("Bruno Lima.jpg").exists());

    let report = std::fs::read_to_string(dir.path().join("report.md")).unwrap();
    assert!(report.contains("Ana Souza"));

    let metrics_path = summary.metrics_path.unwrap();
    assert!(metrics_path.starts_with(dir.path().join("data")));
    assert!(metrics_path.exists());

    let operations = storage.recent_operations(10).unwrap();
    let names: Vec<&str> = operations.iter().map(|o| o.operation.as_str()).collect();
    assert_eq!(
        names,
        vec!["report", "detailed", "summaries", "images", "basic_info", "run:full"]
    );
    assert!(operations
        .iter()
        .all(|o| o.status == OperationStatus::Completed && o.finished_at.is_some()));

    server.verify().await;
}

#[tokio::test]
async fn test_failed_document_is_retried_on_next_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    mount_detail_site(&server).await;
    mount_page(&server, "/doc/1", document_page("Aprovado", "05/03/2024")).await;
    mount_page(&server, "/doc/2", document_page("Arquivado", "06/03/2024")).await;
    Mock::given(method("GET"))
        .and(path("/doc/3"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (_, first) = run_mode(&config, RunMode::Detailed).await;
    let first = first.unwrap();
    assert_eq!(first.outcomes[0].records, 2);
    assert_eq!(first.outcomes[0].failures, 1);
    {
        let storage = open_storage(&config);
        assert_eq!(storage.count_processed_links(Some("Ana Souza")).unwrap(), 2);
        assert_eq!(storage.count_details().unwrap(), 2);
    }

    server.reset().await;
    mount_detail_site(&server).await;
    mount_expecting(&server, "/doc/1", document_page("Aprovado", "05/03/2024"), 0).await;
    mount_expecting(&server, "/doc/2", document_page("Arquivado", "06/03/2024"), 0).await;
    mount_expecting(&server, "/doc/3", document_page("Aprovado", "07/03/2024"), 1).await;

    let (_, second) = run_mode(&config, RunMode::Detailed).await;
    let second = second.unwrap();
    assert_eq!(second.outcomes[0].records, 1);
    assert_eq!(second.outcomes[0].skipped, 2);

    let storage = open_storage(&config);
    assert_eq!(storage.count_processed_links(Some("Ana Souza")).unwrap(), 3);
    assert_eq!(storage.count_details().unwrap(), 3);

    server.verify().await;
}

#[tokio::test]
async fn test_skipped_documents_are_not_fetched_again() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    mount_detail_site(&server).await;
    mount_page(&server, "/doc/1", document_page("Aprovado", "05/03/2018")).await;
    mount_page(&server, "/doc/2", "<html><body><p>sem dados</p></body></html>".to_string()).await;
    mount_page(&server, "/doc/3", document_page("Aprovado", "05/03/2024")).await;

    let (_, first) = run_mode(&config, RunMode::Detailed).await;
    assert_eq!(first.unwrap().outcomes[0].skipped, 2);

    server.reset().await;
    mount_detail_site(&server).await;
    for doc in ["/doc/1", "/doc/2", "/doc/3"] {
        mount_expecting(&server, doc, document_page("Aprovado", "05/03/2024"), 0).await;
    }

    let (_, second) = run_mode(&config, RunMode::Detailed).await;
    assert_eq!(second.unwrap().outcomes[0].records, 0);

    let storage = open_storage(&config);
    assert_eq!(storage.count_details().unwrap(), 1);
    assert_eq!(storage.count_processed_links(None).unwrap(), 3);

    server.verify().await;
}

#[tokio::test]
async fn test_repeated_link_in_listing_is_fetched_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    mount_page(
        &server,
        "/Consulta/Vereadores/",
        index_page(&[("Ana Souza", "/Consulta/1/Detalhadas")]),
    )
    .await;
    mount_page(&server, "/Consulta/1/Detalhadas", listing_page("Moção", &["/doc/1", "/doc/1"])).await;
    mount_expecting(&server, "/doc/1", document_page("Aprovado", "05/03/2024"), 1).await;

    let (_, result) = run_mode(&config, RunMode::Detailed).await;
    assert_eq!(result.unwrap().outcomes[0].records, 1);

    server.verify().await;
}

#[tokio::test]
async fn test_basic_mode_never_downloads_images() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    mount_expecting(&server, "/Vereador", members_page(TWO_MEMBERS, true), 1).await;
    for id in [1, 2] {
        Mock::given(method("GET"))
            .and(path(format!("/img/vereador{}.jpg", id)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF]))
            .expect(0)
            .mount(&server)
            .await;
    }
    mount_expecting(&server, "/Consulta/Vereadores/", index_page(&[]), 0).await;

    let (orchestrator, result) = run_mode(&config, RunMode::Basic).await;
    let summary = result.unwrap();

    assert_eq!(orchestrator.state(), RunState::Done);
    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(summary.outcomes[0].phase, Phase::BasicInfo);
    assert_eq!(open_storage(&config).count_entities().unwrap(), 2);
    assert!(!dir.path().join("img").exists());

    server.verify().await;
}

#[tokio::test]
async fn test_detailed_mode_never_fetches_members_page() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    mount_expecting(&server, "/Vereador", members_page(TWO_MEMBERS, true), 0).await;
    mount_detail_site(&server).await;
    for doc in ["/doc/1", "/doc/2", "/doc/3"] {
        mount_page(&server, doc, document_page("Aprovado", "05/03/2024")).await;
    }

    let (_, result) = run_mode(&config, RunMode::Detailed).await;
    let summary = result.unwrap();

    let phases: Vec<Phase> = summary.outcomes.iter().map(|o| o.phase).collect();
    assert_eq!(phases, vec![Phase::Detailed, Phase::Report]);
    assert_eq!(summary.outcomes[0].records, 3);

    server.verify().await;
}

#[tokio::test]
async fn test_empty_members_page_fails_and_cleans_up() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    mount_page(&server, "/Vereador", members_page(&[], false)).await;

    let (orchestrator, result) = run_mode(&config, RunMode::Basic).await;

    assert!(matches!(
        result,
        Err(HarvestError::Precondition { phase: Phase::BasicInfo, .. })
    ));
    assert_eq!(orchestrator.state(), RunState::Failed);
    assert!(orchestrator.metrics_path().unwrap().exists());

    let operations = open_storage(&config).recent_operations(10).unwrap();
    assert_eq!(operations.len(), 2);
    assert_eq!(operations[0].operation, "basic_info");
    assert_eq!(operations[0].status, OperationStatus::Failed);
    assert!(operations[0].error_message.is_some());
    assert_eq!(operations[1].operation, "run:basic");
    assert_eq!(operations[1].status, OperationStatus::Failed);
    assert!(operations[1].finished_at.is_some());
}

#[tokio::test]
async fn test_unreachable_members_page_fails_precondition() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    Mock::given(method("GET"))
        .and(path("/Vereador"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let (orchestrator, result) = run_mode(&config, RunMode::Full).await;

    assert!(matches!(result, Err(HarvestError::Precondition { .. })));
    assert_eq!(orchestrator.state(), RunState::Failed);
    assert_eq!(orchestrator.outcomes().len(), 1);

    server.verify().await;
}

#[tokio::test]
async fn test_rerun_overwrites_summary_counts() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());
    let one_member = &[("Ana Maria Souza", "Ana Souza", "PT", 1)];

    // The detail index is left unmounted, so the detailed phase only warns
    mount_page(&server, "/Vereador", members_page(one_member, false)).await;
    mount_page(&server, "/Vereador/1", profile_page(&["2024"], &[("Moção", &["5"])])).await;
    let (_, first) = run_mode(&config, RunMode::Full).await;
    first.unwrap();

    server.reset().await;
    mount_page(&server, "/Vereador", members_page(one_member, false)).await;
    mount_page(&server, "/Vereador/1", profile_page(&["2024"], &[("Moção", &["7"])])).await;
    let (_, second) = run_mode(&config, RunMode::Full).await;
    let second = second.unwrap();

    let detailed = second
        .outcomes
        .iter()
        .find(|o| o.phase == Phase::Detailed)
        .unwrap();
    assert_eq!(detailed.failures, 1);

    let summaries = open_storage(&config).load_summaries("Ana Souza").unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].year, "2024");
    assert_eq!(summaries[0].count, 7);
}

#[tokio::test]
async fn test_interrupt_during_members_page_backoff_is_an_interruption() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), dir.path());
    config.throttle.max_retries = 3;
    config.throttle.retry_delay_ms = 5000;

    Mock::given(method("GET"))
        .and(path("/Vereador"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let started = Instant::now();
    let cancel = cancel_after(Duration::from_millis(300));
    let (orchestrator, result) = run_mode_with_cancel(&config, RunMode::Basic, cancel).await;

    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(matches!(result, Err(HarvestError::Interrupted)), "got {:?}", result);
    assert_eq!(orchestrator.state(), RunState::Failed);
    assert!(orchestrator.metrics_path().unwrap().exists());

    let operations = open_storage(&config).recent_operations(10).unwrap();
    assert_eq!(operations.len(), 2);
    assert_eq!(operations[0].operation, "basic_info");
    assert_eq!(operations[0].status, OperationStatus::Interrupted);
    assert!(operations[0].error_message.is_none());
    assert_eq!(operations[1].operation, "run:basic");
    assert_eq!(operations[1].status, OperationStatus::Interrupted);
}

#[tokio::test]
async fn test_interrupt_between_documents_keeps_finished_work() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), dir.path());
    config.throttle.document_delay_ms = 400;
    config.collection.flush_threshold = 10;

    mount_detail_site(&server).await;
    for doc in ["/doc/1", "/doc/2", "/doc/3"] {
        mount_page(&server, doc, document_page("Aprovado", "05/03/2024")).await;
    }

    // Documents are fetched at about 0 and 400 ms; the token trips in the pause after the second
    let cancel = cancel_after(Duration::from_millis(600));
    let (orchestrator, first) = run_mode_with_cancel(&config, RunMode::Detailed, cancel).await;

    assert!(matches!(first, Err(HarvestError::Interrupted)), "got {:?}", first);
    assert_eq!(orchestrator.state(), RunState::Failed);
    {
        let storage = open_storage(&config);
        assert_eq!(storage.count_processed_links(Some("Ana Souza")).unwrap(), 2);
        assert_eq!(storage.count_details().unwrap(), 2);
        let detailed = storage.recent_operations(1).unwrap();
        assert_eq!(detailed[0].status, OperationStatus::Interrupted);
    }

    server.reset().await;
    config.throttle.document_delay_ms = 0;
    mount_detail_site(&server).await;
    mount_expecting(&server, "/doc/1", document_page("Aprovado", "05/03/2024"), 0).await;
    mount_expecting(&server, "/doc/2", document_page("Aprovado", "05/03/2024"), 0).await;
    mount_expecting(&server, "/doc/3", document_page("Aprovado", "05/03/2024"), 1).await;

    let (_, second) = run_mode(&config, RunMode::Detailed).await;
    let second = second.unwrap();
    assert_eq!(second.outcomes[0].records, 1);
    assert_eq!(second.outcomes[0].skipped, 2);

    let storage = open_storage(&config);
    assert_eq!(storage.count_processed_links(Some("Ana Souza")).unwrap(), 3);
    assert_eq!(storage.count_details().unwrap(), 3);

    server.verify().await;
}
