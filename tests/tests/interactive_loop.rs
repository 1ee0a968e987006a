use application::prompt::PromptTemplate;
use application::rag_service::RagService;
use infrastructure::config::RetrievalConfig;
use presentation::repl::{LoopStats, OutputFormat, Repl, PROMPT};
use tests::{write_docs, FakeLlama};

async fn sky_service(model: FakeLlama) -> RagService<FakeLlama> {
    let dir = tempfile::tempdir().unwrap();
    write_docs(dir.path(), &[("sky.txt", "The sky is blue.")]).unwrap();
    let (service, _) = RagService::build(
        model,
        dir.path(),
        &RetrievalConfig::default(),
        PromptTemplate::default(),
    )
    .await
    .unwrap();
    service
}

#[tokio::test]
async fn failing_question_does_not_end_the_loop() {
    let service = sky_service(FakeLlama::new("Blue.").failing_on("explode")).await;
    let script = "What color is the sky?\n\n   \nplease explode\nIs the sky blue?\nexit\nnever asked\n";

    let mut out = Vec::new();
    let mut err = Vec::new();
    let stats = Repl::new(&mut out, &mut err, OutputFormat::Human)
        .run(script.as_bytes(), &service)
        .await
        .unwrap();

    assert_eq!(stats, LoopStats { answered: 2, failed: 1, skipped: 0 });
    let out = String::from_utf8(out).unwrap();
    let err = String::from_utf8(err).unwrap();
    assert!(out.starts_with(PROMPT));
    assert_eq!(out.matches("Blue.").count(), 2);
    assert!(err.contains("500 Internal Server Error"));

    let prompts = service.into_model().prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts.iter().all(|p| !p.contains("never asked")));
}

#[tokio::test]
async fn json_output_carries_sources() {
    let service = sky_service(FakeLlama::new("Blue.")).await;

    let mut out = Vec::new();
    let stats = Repl::new(&mut out, std::io::sink(), OutputFormat::Json)
        .run("What color is the sky?\n".as_bytes(), &service)
        .await
        .unwrap();
    assert_eq!(stats.answered, 1);

    let out = String::from_utf8(out).unwrap();
    let json = out.trim_start_matches(PROMPT).trim();
    assert!(json.contains("\"text\": \"Blue.\""));
    assert!(json.contains("\"id\": \"sky.txt#0\""));
}
