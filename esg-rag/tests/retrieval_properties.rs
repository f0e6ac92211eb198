//! Property tests for nearest-neighbor ordering and retrieval over a built index.

use std::collections::BTreeSet;
use std::sync::Arc;

use esg_rag::mock::{HashingEmbeddingProvider, StubEmbeddingProvider};
use esg_rag::{DocumentRecord, Retriever, VectorIndex};
use proptest::prelude::*;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-8 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

/// Generate a short sentence of lowercase words.
fn arb_sentence() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-z]{3,9}", 2..7).prop_map(|words| words.join(" "))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

mod prop_nearest_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Results are bounded by `top_k` and the corpus size, best first.
        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            embeddings in proptest::collection::vec(arb_normalized_embedding(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let count = embeddings.len();
            let records: Vec<DocumentRecord> =
                (0..count).map(|i| DocumentRecord::new(format!("record {i}"))).collect();
            let embedder = StubEmbeddingProvider::new(embeddings);

            let index = runtime().block_on(VectorIndex::build(records, &embedder, 4)).unwrap();
            let results = index.nearest(&query, top_k);

            prop_assert_eq!(results.len(), top_k.min(count));
            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
            for result in &results {
                prop_assert!((-1.0001..=1.0001).contains(&result.score));
            }
        }

        /// Records with identical embeddings come back in insertion order.
        #[test]
        fn ties_keep_insertion_order(
            embedding in arb_normalized_embedding(DIM),
            count in 2usize..12,
        ) {
            let records: Vec<DocumentRecord> =
                (0..count).map(|i| DocumentRecord::new(format!("record {i}"))).collect();
            let embedder = StubEmbeddingProvider::new(vec![embedding.clone(); count]);

            let index = runtime().block_on(VectorIndex::build(records, &embedder, 3)).unwrap();
            let results = index.nearest(&embedding, count);

            let contents: Vec<String> = results.into_iter().map(|r| r.content).collect();
            let expected: Vec<String> = (0..count).map(|i| format!("record {i}")).collect();
            prop_assert_eq!(contents, expected);
        }
    }
}

mod prop_exact_content_match {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Querying with a record's exact content scores that record at the top.
        #[test]
        fn exact_content_scores_highest(
            sentences in proptest::collection::vec(arb_sentence(), 1..12),
            pick in any::<prop::sample::Index>(),
        ) {
            let unique: Vec<String> = sentences
                .into_iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let target = unique[pick.index(unique.len())].clone();
            let records: Vec<DocumentRecord> = unique.iter().map(DocumentRecord::new).collect();
            let embedder = Arc::new(HashingEmbeddingProvider::new(512));

            let results = runtime().block_on(async {
                let index = VectorIndex::build(records, embedder.as_ref(), 8).await.unwrap();
                Retriever::new(embedder.clone()).retrieve(&index, &target, unique.len()).await.unwrap()
            });

            let best = results[0].score;
            prop_assert!(best > 0.999, "top score {} is not a self-match", best);
            let hit = results.iter().find(|r| r.content == target).unwrap();
            prop_assert!((best - hit.score).abs() < 1e-5);
        }
    }
}
