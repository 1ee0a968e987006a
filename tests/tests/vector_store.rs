use domain::error::RagError;
use domain::language_model::EmbeddingModel;
use domain::models::{Chunk, EmbeddedChunk};
use infrastructure::embedder::Embedder;
use infrastructure::vector_store::MemoryVectorStore;
use tests::HashEmbedder;

fn chunk(id: &str, text: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        document_id: "doc.txt".to_string(),
        source: "doc.txt".to_string(),
        index: 0,
        text: text.to_string(),
        line_from: 1,
        line_to: 1,
    }
}

#[tokio::test]
async fn store_keeps_one_dimension() {
    let model = HashEmbedder::new(64);
    let embedded = Embedder::new(&model)
        .with_batch_size(2)
        .generate_embeddings(vec![
            chunk("doc.txt#0", "The sky is blue."),
            chunk("doc.txt#1", "The grass is green."),
            chunk("doc.txt#2", "Snow is white."),
        ])
        .await
        .unwrap();

    let mut store = MemoryVectorStore::from_entries(embedded).unwrap();
    assert_eq!(store.dimension(), Some(64));

    let wider = EmbeddedChunk {
        chunk: chunk("doc.txt#3", "Coal is black."),
        vector: HashEmbedder::new(128).embed("Coal is black."),
    };
    let err = store.add(vec![wider]).unwrap_err();
    assert_eq!(
        err.downcast_ref::<RagError>(),
        Some(&RagError::DimensionMismatch {
            expected: 64,
            actual: 128
        })
    );
    assert_eq!(store.len(), 3);
    assert!(store.entries().iter().all(|e| e.vector.len() == 64));
}

#[tokio::test]
async fn query_with_other_dimension_is_rejected() {
    let model = HashEmbedder::new(32);
    let store = MemoryVectorStore::from_entries(vec![EmbeddedChunk {
        chunk: chunk("doc.txt#0", "The sky is blue."),
        vector: model.embed("The sky is blue."),
    }])
    .unwrap();

    let query = HashEmbedder::new(16).embed_query("sky").await.unwrap();
    assert!(store.similarity_search(&query, 1).is_err());
}

#[test]
fn k_larger_than_store_returns_everything_once() {
    let model = HashEmbedder::default();
    let entries = ["alpha beta", "beta gamma", "gamma delta"]
        .iter()
        .enumerate()
        .map(|(i, text)| EmbeddedChunk {
            chunk: chunk(&format!("doc.txt#{i}"), text),
            vector: model.embed(text),
        })
        .collect();
    let store = MemoryVectorStore::from_entries(entries).unwrap();

    let results = store.similarity_search(&model.embed("beta"), 10).unwrap();
    assert_eq!(results.len(), 3);
    let mut ids: Vec<_> = results.iter().map(|r| r.chunk.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}
