// End-to-end tests for the segx segment
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use segx::prelude::*;
use segx::Segment;

const DIM: usize = 16;

fn deterministic_vector(seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..DIM).map(|_| rng.random::<f32>() * 2.0 - 1.0).collect()
}

fn test_segment(dir: &std::path::Path) -> Segment {
    build_segment(dir, &SegmentConfig::new(DIM)).unwrap()
}

#[test]
fn test_payload_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let segment = test_segment(dir.path());

    for i in 0..20u64 {
        segment.index(i, &deterministic_vector(i)).unwrap();
        segment
            .set_full_payload_json(
                i,
                serde_json::json!({ "id": i.to_string(), "text": format!("I am document {i}") }),
            )
            .unwrap();
    }

    for i in 0..20u64 {
        let payload = segment.get_full_payload(i).unwrap();
        assert_eq!(
            payload_to_json(&payload),
            serde_json::json!({ "id": i.to_string(), "text": format!("I am document {i}") })
        );
    }
}

#[test]
fn test_last_payload_write_wins() {
    let dir = tempfile::tempdir().unwrap();
    let segment = test_segment(dir.path());

    segment.index(1, &deterministic_vector(1)).unwrap();
    segment
        .set_full_payload_json(1, serde_json::json!({"rev": 1}))
        .unwrap();
    segment
        .set_full_payload_json(1, serde_json::json!({"rev": 2}))
        .unwrap();

    let payload = segment.get_full_payload(1).unwrap();
    assert_eq!(payload_to_json(&payload), serde_json::json!({"rev": 2}));

    // the field index follows the replacement
    let stale = Filter::new_should(vec![match_integer("rev", 1)]);
    assert!(segment
        .search(&deterministic_vector(1), Some(&stale), 10)
        .unwrap()
        .is_empty());
}

#[test]
fn test_dimension_invariant() {
    let dir = tempfile::tempdir().unwrap();
    let segment = test_segment(dir.path());

    let wrong = vec![0.5; DIM + 1];
    match segment.index(1, &wrong) {
        Err(SegmentError::DimensionMismatch { expected, actual }) => {
            assert_eq!((expected, actual), (DIM, DIM + 1));
        }
        other => panic!("expected DimensionMismatch, got {:?}", other.map(|_| ())),
    }
    // no partial state
    assert!(!segment.has_point(1));
    assert_eq!(segment.point_count(), 0);

    // queries are held to the same contract
    assert!(matches!(
        segment.search(&wrong, None, 10),
        Err(SegmentError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_search_cardinality_and_ordering() {
    let dir = tempfile::tempdir().unwrap();
    let segment = test_segment(dir.path());

    for i in 0..25u64 {
        segment.index(i, &deterministic_vector(i)).unwrap();
    }

    let query = deterministic_vector(1000);
    for k in [1, 10, 25, 100] {
        let hits = segment.search(&query, None, k).unwrap();
        assert_eq!(hits.len(), k.min(25));
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }

        let (ids, scores) = unzip_scored(hits);
        assert_eq!(ids.len(), scores.len());
    }
}

#[test]
fn test_delete_completeness() {
    let dir = tempfile::tempdir().unwrap();
    let segment = test_segment(dir.path());

    for i in 0..30u64 {
        segment.index(i, &deterministic_vector(i)).unwrap();
        segment
            .set_full_payload_json(i, serde_json::json!({"n": i}))
            .unwrap();
    }

    assert!(segment.delete(13).unwrap());
    assert!(matches!(
        segment.get_full_payload(13),
        Err(SegmentError::NotFound(13))
    ));

    for k in [1, 10, 30, 1000] {
        let hits = segment
            .search(&deterministic_vector(13), None, k)
            .unwrap();
        assert!(hits.iter().all(|p| p.id != 13));
    }

    // repeated delete/re-search cycles leave no trace
    for i in (0..30u64).step_by(3) {
        segment.delete(i).unwrap();
        let hits = segment.search(&deterministic_vector(7), None, 30).unwrap();
        assert!(hits.iter().all(|p| p.id % 3 != 0 || p.id > i));
    }
}

#[test]
fn test_idempotent_delete() {
    let dir = tempfile::tempdir().unwrap();
    let segment = test_segment(dir.path());

    segment.index(5, &deterministic_vector(5)).unwrap();
    assert!(segment.delete(5).unwrap());

    let count = segment.point_count();
    assert!(!segment.delete(5).unwrap());
    assert_eq!(segment.point_count(), count);

    // deleting an id that never existed is also a quiet no-op
    assert!(!segment.delete(9999).unwrap());
}

#[test]
fn test_filter_correctness_granularity() {
    let dir = tempfile::tempdir().unwrap();
    let segment = test_segment(dir.path());

    for i in 0..1000u64 {
        segment.index(i, &deterministic_vector(i)).unwrap();
        let granularity = if i == 500 { 4 } else { 5 };
        segment
            .set_full_payload_json(i, serde_json::json!({"granularity": granularity}))
            .unwrap();
    }

    let filter = Filter::new_should(vec![match_integer("granularity", 4)]);
    let hits = segment
        .search(&deterministic_vector(2000), Some(&filter), 10)
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 500);
}

#[test]
fn test_filter_or_and_semantics() {
    let dir = tempfile::tempdir().unwrap();
    let segment = test_segment(dir.path());

    // ids 0..10 match hello=world; id 0 alone also has inner_float=2005
    for i in 0..10u64 {
        segment.index(i, &deterministic_vector(i)).unwrap();
        let mut payload = serde_json::json!({"hello": "world"});
        if i == 0 {
            payload["inner_float"] = serde_json::json!(2005);
        }
        segment.set_full_payload_json(i, payload).unwrap();
    }
    // noise points matching neither clause
    for i in 10..20u64 {
        segment.index(i, &deterministic_vector(i)).unwrap();
        segment
            .set_full_payload_json(i, serde_json::json!({"hello": "mars"}))
            .unwrap();
    }

    let clauses = vec![
        match_keyword("hello", "world"),
        match_integer("inner_float", 2005),
    ];
    let query = deterministic_vector(3000);

    let union = segment
        .search(&query, Some(&Filter::new_should(clauses.clone())), 1000)
        .unwrap();
    assert_eq!(union.len(), 10);
    assert!(union.iter().all(|p| p.id < 10));

    let intersection = segment
        .search(&query, Some(&Filter::new_must(clauses)), 1000)
        .unwrap();
    assert_eq!(intersection.len(), 1);
    assert_eq!(intersection[0].id, 0);
}

#[test]
fn test_empty_filter_is_unrestricted() {
    let dir = tempfile::tempdir().unwrap();
    let segment = test_segment(dir.path());

    for i in 0..5u64 {
        segment.index(i, &deterministic_vector(i)).unwrap();
    }
    // no payloads at all: an empty filter must still match every point

    let query = deterministic_vector(42);
    let unrestricted = segment.search(&query, None, 10).unwrap();
    let empty_filter = segment
        .search(&query, Some(&Filter::default()), 10)
        .unwrap();
    assert_eq!(unrestricted, empty_filter);
    assert_eq!(unrestricted.len(), 5);
}

#[test]
fn test_filter_matching_nothing_returns_empty() {
    let dir = tempfile::tempdir().unwrap();
    let segment = test_segment(dir.path());

    for i in 0..5u64 {
        segment.index(i, &deterministic_vector(i)).unwrap();
        segment
            .set_full_payload_json(i, serde_json::json!({"kind": "a"}))
            .unwrap();
    }

    let filter = Filter::new_should(vec![match_keyword("kind", "b")]);
    let hits = segment
        .search(&deterministic_vector(0), Some(&filter), 10)
        .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn test_vector_without_payload_is_searchable() {
    let dir = tempfile::tempdir().unwrap();
    let segment = test_segment(dir.path());

    segment.index(1, &deterministic_vector(1)).unwrap();

    // vector-only points surface in unrestricted search...
    let hits = segment.search(&deterministic_vector(1), None, 10).unwrap();
    assert_eq!(hits.len(), 1);
    // ...but have no payload to fetch
    assert!(matches!(
        segment.get_full_payload(1),
        Err(SegmentError::NotFound(1))
    ));
    // ...and never match a non-empty filter
    let filter = Filter::new_should(vec![match_keyword("any", "x")]);
    assert!(segment
        .search(&deterministic_vector(1), Some(&filter), 10)
        .unwrap()
        .is_empty());
}

#[test]
fn test_opaque_payload_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let segment = test_segment(dir.path());

    for i in 0..6u64 {
        segment.index(i, &deterministic_vector(i)).unwrap();
        let doc = serde_json::json!({ "modality": if i < 3 { "text" } else { "image" } });
        let blob = serde_json::to_vec(&doc).unwrap();
        segment
            .set_full_payload_opaque(i, "json", blob.into())
            .unwrap();
    }

    // indexable fields are extracted from the blob
    let filter = Filter::new_should(vec![match_keyword("modality", "image")]);
    let hits = segment
        .search(&deterministic_vector(0), Some(&filter), 10)
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|p| p.id >= 3));

    // and the payload decodes on the way out
    let payload = segment.get_full_payload(0).unwrap();
    assert_eq!(
        payload_to_json(&payload),
        serde_json::json!({"modality": "text"})
    );

    // unknown encodings are rejected up front
    assert!(matches!(
        segment.set_full_payload_opaque(0, "protobuf", vec![1u8, 2, 3].into()),
        Err(SegmentError::UnknownEncoding(_))
    ));
}

#[test]
fn test_reopen_fidelity() {
    let dir = tempfile::tempdir().unwrap();
    let query = deterministic_vector(777);

    let before = {
        let segment = test_segment(dir.path());
        for i in 0..50u64 {
            segment.index(i, &deterministic_vector(i)).unwrap();
            segment
                .set_full_payload_json(i, serde_json::json!({"n": i, "text": format!("doc {i}")}))
                .unwrap();
        }
        let hits = segment.search(&query, None, 10).unwrap();
        segment.close().unwrap();
        hits
    };

    let segment = Segment::open(dir.path()).unwrap();
    assert_eq!(segment.point_count(), 50);

    for i in 0..50u64 {
        let payload = segment.get_full_payload(i).unwrap();
        assert_eq!(
            payload_to_json(&payload),
            serde_json::json!({"n": i, "text": format!("doc {i}")})
        );
    }

    let after = segment.search(&query, None, 10).unwrap();
    assert_eq!(before, after);

    // filters keep working against the reopened payload index
    let filter = Filter::new_should(vec![match_integer("n", 17)]);
    let hits = segment.search(&query, Some(&filter), 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 17);
}

#[test]
fn test_reopen_fidelity_append_only() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SegmentConfig::new(DIM);
    config.storage = StorageVariant::AppendOnly;
    let query = deterministic_vector(888);

    let before = {
        let segment = build_segment(dir.path(), &config).unwrap();
        for i in 0..30u64 {
            segment.index(i, &deterministic_vector(i)).unwrap();
            segment
                .set_full_payload_json(i, serde_json::json!({"n": i}))
                .unwrap();
        }
        segment.delete(3).unwrap();
        let hits = segment.search(&query, None, 10).unwrap();
        segment.close().unwrap();
        hits
    };

    let segment = build_segment(dir.path(), &config).unwrap();
    assert_eq!(segment.point_count(), 29);
    assert!(!segment.has_point(3));
    assert_eq!(segment.search(&query, None, 10).unwrap(), before);
}

#[test]
fn test_euclid_metric_orders_by_proximity() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SegmentConfig::new(DIM);
    config.distance = Distance::Euclid;
    config.vector_index = VectorIndexVariant::Plain;
    let segment = build_segment(dir.path(), &config).unwrap();

    let base = deterministic_vector(1);
    for i in 0..5u64 {
        // points progressively further from `base`
        let v: Vec<f32> = base.iter().map(|x| x + i as f32 * 0.1).collect();
        segment.index(i, &v).unwrap();
    }

    let hits = segment.search(&base, None, 5).unwrap();
    let ids: Vec<_> = hits.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    // best match is an exact hit: negated distance 0
    assert!(hits[0].score.abs() < 1e-5);
}

#[test]
fn test_index_leaves_payload_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let segment = test_segment(dir.path());

    segment.index(1, &deterministic_vector(1)).unwrap();
    segment
        .set_full_payload_json(1, serde_json::json!({"keep": "me"}))
        .unwrap();

    // replacing the vector does not disturb the payload
    segment.index(1, &deterministic_vector(2)).unwrap();
    let payload = segment.get_full_payload(1).unwrap();
    assert_eq!(payload_to_json(&payload), serde_json::json!({"keep": "me"}));
}
