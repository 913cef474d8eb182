mod helpers;

use gre_mentor::index::{mapping, SearchHit, VectorIndex};
use gre_mentor::{ErrorKind, MentorError};
use helpers::{test_db, test_embedding, DIM};

#[test]
fn add_then_search_returns_exact_match() {
    let conn = test_db();
    let mut index = VectorIndex::new(DIM);
    let v = test_embedding(3);

    let id = index.add_vector(&conn, &v, "x", "word").unwrap();
    assert_eq!(id, 0);

    let hits = index.search(&conn, &v, 1, None).unwrap();
    assert_eq!(
        hits,
        vec![SearchHit {
            external_id: "x".into(),
            category: "word".into(),
            distance: 0.0
        }]
    );
}

#[test]
fn sequential_ids_survive_deletes() {
    let conn = test_db();
    let mut index = VectorIndex::new(DIM);

    let mut ids = Vec::new();
    for i in 0..6 {
        let id = index
            .add_vector(&conn, &test_embedding(i), &format!("e{i}"), "word")
            .unwrap();
        ids.push(id);
        if i % 2 == 1 {
            index.delete_vector(&conn, id).unwrap();
        }
    }
    assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(mapping::high_water(&conn).unwrap(), 6);
}

#[test]
fn category_filter_never_leaks_other_categories() {
    let conn = test_db();
    let mut index = VectorIndex::new(DIM);
    for i in 0..DIM {
        let category = if i % 3 == 0 { "word" } else { "question" };
        index
            .add_vector(&conn, &test_embedding(i), &format!("e{i}"), category)
            .unwrap();
    }

    for seed in 0..DIM {
        let hits = index
            .search(&conn, &test_embedding(seed), DIM, Some("word"))
            .unwrap();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.category == "word"));
    }
}

#[test]
fn distances_are_non_decreasing() {
    let conn = test_db();
    let mut index = VectorIndex::new(DIM);
    for i in 0..10 {
        let mut v = test_embedding(0);
        v[1] = i as f32 * 0.5;
        index.add_vector(&conn, &v, &format!("e{i}"), "word").unwrap();
    }

    let hits = index.search(&conn, &test_embedding(0), 10, None).unwrap();
    assert_eq!(hits.len(), 10);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    assert_eq!(hits[0].external_id, "e0");
}

#[test]
fn deleted_id_is_not_found_and_omitted() {
    let conn = test_db();
    let mut index = VectorIndex::new(DIM);
    let v = test_embedding(7);
    let id = index.add_vector(&conn, &v, "gone", "word").unwrap();

    assert!(index.delete_vector(&conn, id).unwrap());

    let err = index.mapping(&conn, id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(index.search(&conn, &v, 5, None).unwrap().is_empty());
    // the stored vector is kept until rebuild
    assert_eq!(index.len(), 1);
}

#[test]
fn dimension_mismatch_is_reported() {
    let conn = test_db();
    let mut index = VectorIndex::new(DIM);

    let err = index.add_vector(&conn, &[1.0; 5], "x", "word").unwrap_err();
    assert!(matches!(
        err,
        MentorError::DimensionMismatch { expected, actual } if expected == DIM && actual == 5
    ));
    assert_eq!(mapping::count(&conn).unwrap(), 0);
}

#[test]
fn rebuild_drops_holes_and_keeps_results() {
    let mut conn = test_db();
    let mut index = VectorIndex::new(DIM);
    for i in 0..5 {
        index
            .add_vector(&conn, &test_embedding(i), &format!("e{i}"), "word")
            .unwrap();
    }
    index.delete_vector(&conn, 1).unwrap();
    index.delete_vector(&conn, 3).unwrap();

    let before: Vec<String> = index
        .search(&conn, &test_embedding(4), 5, None)
        .unwrap()
        .into_iter()
        .map(|h| h.external_id)
        .collect();

    let report = index.rebuild(&mut conn).unwrap();
    assert_eq!(report.vectors_after, 3);
    assert_eq!(index.len(), 3);

    let after: Vec<String> = index
        .search(&conn, &test_embedding(4), 5, None)
        .unwrap()
        .into_iter()
        .map(|h| h.external_id)
        .collect();
    assert_eq!(before, after);

    let reconcile = index.reconcile(&conn).unwrap();
    assert!(reconcile.orphans.is_empty());
    assert!(reconcile.is_consistent());
}

#[test]
fn search_with_k_zero_is_empty() {
    let conn = test_db();
    let mut index = VectorIndex::new(DIM);
    index.add_vector(&conn, &test_embedding(0), "a", "word").unwrap();
    assert!(index.search(&conn, &test_embedding(0), 0, None).unwrap().is_empty());
}
