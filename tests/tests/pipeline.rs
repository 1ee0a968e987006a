use application::prompt::PromptTemplate;
use application::rag_service::RagService;
use infrastructure::config::RetrievalConfig;
use infrastructure::document_loader::DocumentLoader;
use infrastructure::text_splitter::TextSplitter;
use std::collections::HashSet;
use tests::{write_docs, FakeLlama};

fn retrieval(top_k: usize) -> RetrievalConfig {
    RetrievalConfig {
        top_k,
        ..RetrievalConfig::default()
    }
}

#[tokio::test]
async fn sky_is_blue_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_docs(dir.path(), &[("sky.txt", "The sky is blue.")]).unwrap();

    let (service, stats) = RagService::build(
        FakeLlama::new("The sky is blue."),
        dir.path(),
        &RetrievalConfig::default(),
        PromptTemplate::default(),
    )
    .await
    .unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, 1);

    let answer = service.query("What color is the sky?").await.unwrap();
    assert_eq!(answer.source_ids(), vec!["sky.txt#0"]);
    assert_eq!(answer.text, "The sky is blue.");

    let prompts = service.into_model().prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("The sky is blue."));
    assert!(prompts[0].ends_with("Question: What color is the sky?\nHelpful Answer:"));
}

#[tokio::test]
async fn most_similar_document_ranks_first() {
    let dir = tempfile::tempdir().unwrap();
    write_docs(
        dir.path(),
        &[
            ("grass.txt", "The grass is green."),
            ("notes/sky.md", "The sky is blue."),
            ("sea.txt", "Ocean water tastes salty."),
        ],
    )
    .unwrap();

    let (service, _) = RagService::build(
        FakeLlama::new("Blue."),
        dir.path(),
        &retrieval(1),
        PromptTemplate::default(),
    )
    .await
    .unwrap();

    let answer = service.query("What color is the sky?").await.unwrap();
    assert_eq!(answer.source_ids(), vec!["notes/sky.md#0"]);
    let prompt = &service.into_model().prompts()[0];
    assert!(!prompt.contains("grass"));
    assert!(!prompt.contains("salty"));
}

#[tokio::test]
async fn empty_directory_answers_with_empty_context() {
    let dir = tempfile::tempdir().unwrap();

    let (service, stats) = RagService::build(
        FakeLlama::new("I don't know."),
        dir.path(),
        &RetrievalConfig::default(),
        PromptTemplate::default(),
    )
    .await
    .unwrap();
    assert_eq!(stats.documents, 0);
    assert!(service.store().is_empty());

    let answer = service.query("What color is the sky?").await.unwrap();
    assert!(answer.sources.is_empty());
    assert_eq!(answer.text, "I don't know.");
    assert_eq!(service.into_model().prompts().len(), 1);
}

#[tokio::test]
async fn missing_directory_is_a_startup_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = RagService::build(
        FakeLlama::new("unused"),
        &dir.path().join("missing"),
        &RetrievalConfig::default(),
        PromptTemplate::default(),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn repeated_query_retrieves_same_chunks() {
    let dir = tempfile::tempdir().unwrap();
    write_docs(
        dir.path(),
        &[
            ("a.txt", "The sky is blue.\n\nClouds are white."),
            ("b.txt", "The grass is green."),
            ("c.txt", "Roses are red and the sky at dusk is orange."),
        ],
    )
    .unwrap();

    let (service, _) = RagService::build(
        FakeLlama::new("Blue."),
        dir.path(),
        &retrieval(2),
        PromptTemplate::default(),
    )
    .await
    .unwrap();

    let first = service.query("What color is the sky?").await.unwrap();
    let second = service.query("What color is the sky?").await.unwrap();
    assert_eq!(first.source_ids(), second.source_ids());
    assert_eq!(first.sources, second.sources);
}

#[tokio::test]
async fn top_k_returns_exactly_k_ranked_unique_results() {
    let dir = tempfile::tempdir().unwrap();
    let paragraphs = (0..12)
        .map(|i| format!("Paragraph {i} mentions the sky {i} times."))
        .collect::<Vec<_>>()
        .join("\n\n");
    write_docs(dir.path(), &[("long.txt", &paragraphs)]).unwrap();

    let config = RetrievalConfig {
        chunk_size: 60,
        chunk_overlap: 0,
        top_k: 5,
        ..RetrievalConfig::default()
    };
    let (service, stats) = RagService::build(
        FakeLlama::new("ok"),
        dir.path(),
        &config,
        PromptTemplate::default(),
    )
    .await
    .unwrap();
    assert!(stats.chunks >= 5);

    let answer = service.query("How often is the sky mentioned?").await.unwrap();
    assert_eq!(answer.sources.len(), 5);
    let ids: HashSet<&str> = answer.source_ids().into_iter().collect();
    assert_eq!(ids.len(), 5);
    assert!(answer
        .sources
        .windows(2)
        .all(|pair| pair[0].score >= pair[1].score));
}

#[test]
fn chunks_always_reference_a_loaded_document() {
    let dir = tempfile::tempdir().unwrap();
    write_docs(
        dir.path(),
        &[
            ("one.md", "# Title\n\nFirst paragraph of text.\n\nSecond paragraph."),
            ("nested/two.txt", &"word ".repeat(400)),
            ("image.png", "not text"),
        ],
    )
    .unwrap();

    let documents = DocumentLoader::new(dir.path()).load().unwrap();
    assert_eq!(documents.len(), 2);
    let chunks = TextSplitter::new(100, 20).unwrap().split_documents(&documents);
    assert!(chunks.len() > 2);

    let document_ids: HashSet<&str> = documents.iter().map(|d| d.id.as_str()).collect();
    for chunk in &chunks {
        assert!(document_ids.contains(chunk.document_id.as_str()));
        assert!(chunk.text.chars().count() <= 100);
    }
}
