//! End-to-end tests of the RAG service with mock providers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use esg_rag::mock::{EchoGenerationProvider, FailingGenerationProvider, HashingEmbeddingProvider};
use esg_rag::{
    DocumentRecord, DocumentSource, ErrorKind, FeedbackRecord, GenerationProvider, InMemoryFeedbackSink,
    QueryRequest, RagConfig, RagError, RagService, Result, StaticSource,
};

/// A source whose contents can be swapped between refreshes.
#[derive(Default)]
struct SwappableSource {
    records: Mutex<Vec<DocumentRecord>>,
    unreachable: AtomicBool,
}

impl SwappableSource {
    fn new(records: Vec<DocumentRecord>) -> Self {
        Self { records: Mutex::new(records), unreachable: AtomicBool::new(false) }
    }

    fn set(&self, records: Vec<DocumentRecord>) {
        *self.records.lock().unwrap() = records;
    }
}

#[async_trait]
impl DocumentSource for SwappableSource {
    async fn fetch(&self) -> Result<Vec<DocumentRecord>> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RagError::DataSource { source_name: "swappable".into(), message: "connection refused".into() });
        }
        Ok(self.records.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        "swappable"
    }
}

/// Alternates between two generations of records on every fetch.
#[derive(Default)]
struct AlternatingSource {
    fetches: AtomicUsize,
}

impl AlternatingSource {
    const SIZES: [usize; 2] = [4, 7];
}

#[async_trait]
impl DocumentSource for AlternatingSource {
    async fn fetch(&self) -> Result<Vec<DocumentRecord>> {
        let generation = self.fetches.fetch_add(1, Ordering::SeqCst) % 2;
        Ok((0..Self::SIZES[generation])
            .map(|i| DocumentRecord::new(format!("generation{generation} emissions record {i}")))
            .collect())
    }

    fn name(&self) -> &str {
        "alternating"
    }
}

fn esg_corpus() -> Vec<DocumentRecord> {
    vec![
        DocumentRecord::new("Scope 1 emissions fell 10%").with_metadata("doc", "A"),
        DocumentRecord::new("Renewable electricity share grew to 55%").with_metadata("doc", "B"),
        DocumentRecord::new("Board gender diversity reached 40%").with_metadata("doc", "C"),
    ]
}

fn service_with(source: Arc<dyn DocumentSource>, generator: Arc<dyn GenerationProvider>) -> RagService {
    let config = RagConfig::builder().upload_dir(std::env::temp_dir().join("esg-rag-tests")).build().unwrap();
    RagService::builder()
        .config(config)
        .source(source)
        .embedding_provider(Arc::new(HashingEmbeddingProvider::new(256)))
        .generation_provider(generator)
        .build()
        .unwrap()
}

#[tokio::test]
async fn scope_one_question_is_answered_from_the_matching_record() {
    let generator = Arc::new(EchoGenerationProvider::new());
    let service = service_with(
        Arc::new(StaticSource::new(vec![DocumentRecord::new("Scope 1 emissions fell 10%").with_metadata("doc", "A")])),
        generator.clone(),
    );
    assert!(service.load().await);

    let response =
        service.answer(&QueryRequest::new("What happened to Scope 1 emissions?").with_top_k(1)).await.unwrap();

    let sources = response.sources.unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].content, "Scope 1 emissions fell 10%");
    assert!(sources[0].score > 0.0);

    let calls = generator.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].prompt.contains("Scope 1 emissions fell 10%"));
    assert!(calls[0].prompt.contains("What happened to Scope 1 emissions?"));
    assert_eq!(calls[0].model, service.config().generation_model);
}

#[tokio::test]
async fn empty_source_leaves_the_service_unavailable() {
    let service = service_with(Arc::new(StaticSource::default()), Arc::new(EchoGenerationProvider::new()));

    assert!(!service.load().await);
    let health = service.health().await;
    assert!(!health.index_loaded);
    assert_eq!(health.document_count, 0);

    let err = service.similar_documents(&QueryRequest::new("emissions")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    let err = service.answer(&QueryRequest::new("emissions")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);

    let err = service.refresh().await.unwrap_err();
    assert!(matches!(err, RagError::EmptyCorpus));
}

#[tokio::test]
async fn failed_refresh_keeps_the_previous_index() {
    let source = Arc::new(SwappableSource::new(esg_corpus()));
    let service = service_with(source.clone(), Arc::new(EchoGenerationProvider::new()));
    assert_eq!(service.refresh().await.unwrap().document_count, 3);

    source.unreachable.store(true, Ordering::SeqCst);
    let err = service.refresh().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataSource);
    assert_eq!(service.health().await.document_count, 3);

    source.unreachable.store(false, Ordering::SeqCst);
    source.set(Vec::new());
    assert!(matches!(service.refresh().await, Err(RagError::EmptyCorpus)));
    assert_eq!(service.health().await.document_count, 3);

    let mut grown = esg_corpus();
    grown.push(DocumentRecord::new("Water withdrawal decreased 5%"));
    source.set(grown);
    assert_eq!(service.refresh().await.unwrap().document_count, 4);
    assert_eq!(service.health().await.document_count, 4);
}

#[tokio::test]
async fn response_language_changes_the_prompt_but_not_retrieval() {
    let generator = Arc::new(EchoGenerationProvider::new());
    let service = service_with(Arc::new(StaticSource::new(esg_corpus())), generator.clone());
    service.load().await;

    let question = "How much renewable electricity is used?";
    let plain = service.similar_documents(&QueryRequest::new(question)).await.unwrap();
    let french = service.answer(&QueryRequest::new(question).with_language("french")).await.unwrap();
    let arabic = service.answer(&QueryRequest::new(question).with_language("arabic")).await.unwrap();

    assert_eq!(french.sources.as_ref(), Some(&plain));
    assert_eq!(arabic.sources.as_ref(), Some(&plain));

    let calls = generator.calls();
    assert!(calls[0].prompt.contains("Réponds toujours en français"));
    assert!(calls[1].prompt.contains("باللغة العربية"));
    assert!(calls.iter().all(|c| c.prompt.contains(question)));
}

#[tokio::test]
async fn invalid_queries_are_rejected_before_any_provider_call() {
    let generator = Arc::new(EchoGenerationProvider::new());
    let service = service_with(Arc::new(StaticSource::new(esg_corpus())), generator.clone());
    service.load().await;

    for request in [
        QueryRequest::new("emissions").with_top_k(0),
        QueryRequest::new("emissions").with_top_k(-3),
        QueryRequest::new("   "),
        QueryRequest::new("emissions").with_language("klingon"),
    ] {
        let err = service.answer(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{request:?}");
    }
    assert!(generator.calls().is_empty());
}

#[tokio::test]
async fn generation_failure_is_reported_and_index_survives() {
    let service = service_with(Arc::new(StaticSource::new(esg_corpus())), Arc::new(FailingGenerationProvider));
    service.load().await;

    let err = service.answer(&QueryRequest::new("emissions")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Generation);
    assert!(service.health().await.index_loaded);
    assert_eq!(service.similar_documents(&QueryRequest::new("emissions")).await.unwrap().len(), 3);
}

#[tokio::test]
async fn uploads_are_removed_after_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let config = RagConfig::builder().upload_dir(dir.path().join("uploads")).build().unwrap();
    let service = RagService::builder()
        .config(config)
        .source(Arc::new(StaticSource::default()))
        .embedding_provider(Arc::new(HashingEmbeddingProvider::new(32)))
        .generation_provider(Arc::new(EchoGenerationProvider::new()))
        .build()
        .unwrap();

    // Image insights do not need an index.
    let insights = service.analyze_upload("emissions-chart.png", &[0x89, 0x50, 0x4e, 0x47]).await.unwrap();
    assert!(insights.contains("image/png"));

    let err = service.analyze_upload("notes.txt", b"not an image").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert_eq!(std::fs::read_dir(service.upload_dir()).unwrap().count(), 0);
}

#[tokio::test]
async fn feedback_is_appended_and_validated() {
    let sink = Arc::new(InMemoryFeedbackSink::new());
    let service = RagService::builder()
        .config(RagConfig::default())
        .source(Arc::new(StaticSource::default()))
        .embedding_provider(Arc::new(HashingEmbeddingProvider::new(32)))
        .generation_provider(Arc::new(EchoGenerationProvider::new()))
        .feedback_sink(sink.clone())
        .build()
        .unwrap();

    let record = FeedbackRecord::new("Scope 1?", "It fell 10%.", 4.0, Some("clear".into()));
    service.submit_feedback(record.clone()).await.unwrap();
    service.submit_feedback(record).await.unwrap();

    let err = service.submit_feedback(FeedbackRecord::new("q", "a", 7.0, None)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert_eq!(sink.records().await.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_observe_a_partially_rebuilt_index() {
    let service = Arc::new(service_with(Arc::new(AlternatingSource::default()), Arc::new(EchoGenerationProvider::new())));
    assert!(service.load().await);

    let refresher = {
        let service = service.clone();
        tokio::spawn(async move {
            for _ in 0..20 {
                service.refresh().await.unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let service = service.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..50 {
                let snapshot = service.index().current().await.unwrap();
                let generation = if snapshot.chunks()[0].record.content.starts_with("generation0") { 0 } else { 1 };
                let prefix = format!("generation{generation}");

                assert_eq!(snapshot.len(), AlternatingSource::SIZES[generation]);
                assert!(snapshot.chunks().iter().all(|c| c.record.content.starts_with(&prefix)));

                let results = service.similar_documents(&QueryRequest::new("emissions record").with_top_k(10)).await.unwrap();
                let first = &results[0].content[..11];
                assert!(results.iter().all(|r| r.content.starts_with(first)));
                tokio::task::yield_now().await;
            }
        }));
    }

    refresher.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}
