use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use immich_slideshow::config::SelectionOptions;
use immich_slideshow::engine::SelectionEngine;
use immich_slideshow::events::{Category, PhotoRecord, Selection};
use immich_slideshow::library::InMemoryLibrary;
use immich_slideshow::random::StdRandom;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
}

fn recent(id: &str, width: u32, height: u32) -> PhotoRecord {
    let taken = NaiveDate::from_ymd_opt(2026, 9, 20)
        .unwrap()
        .and_hms_opt(15, 0, 0)
        .unwrap();
    PhotoRecord::new(id, taken, Category::Recent).with_dimensions(width, height)
}

fn memory(id: &str, year: i32, width: u32, height: u32) -> PhotoRecord {
    let taken = NaiveDate::from_ymd_opt(year, 10, 16)
        .unwrap()
        .and_hms_opt(15, 0, 0)
        .unwrap();
    PhotoRecord::new(id, taken, Category::Memory)
        .with_dimensions(width, height)
        .with_memory_year(year)
}

fn engine(library: &Arc<InMemoryLibrary>, mix_ratio: u8, seed: u64) -> SelectionEngine {
    engine_with_attempts(library, mix_ratio, 5, seed)
}

fn engine_with_attempts(
    library: &Arc<InMemoryLibrary>,
    mix_ratio: u8,
    pairing_attempts: usize,
    seed: u64,
) -> SelectionEngine {
    let options = SelectionOptions {
        mix_ratio,
        dual_portrait: true,
        pairing_attempts,
        ..SelectionOptions::default()
    };
    SelectionEngine::new(
        library.clone(),
        &options,
        Tz::UTC,
        Box::new(StdRandom::seeded(seed)),
    )
    .unwrap()
}

#[tokio::test]
async fn lone_portrait_stays_single() {
    let library = Arc::new(InMemoryLibrary::new(
        vec![recent("p", 3000, 4000), recent("l", 4000, 3000)],
        vec![],
    ));
    let mut engine = engine(&library, 0, 1);
    for _ in 0..6 {
        let selection = engine.advance(now()).await.unwrap();
        assert!(!selection.is_dual());
    }
}

#[tokio::test]
async fn landscapes_only_never_pair() {
    let library = Arc::new(InMemoryLibrary::new(
        (0..8).map(|i| recent(&format!("l{i}"), 4000, 3000)).collect(),
        (0..8)
            .map(|i| memory(&format!("m{i}"), 2000 + i, 4000, 3000))
            .collect(),
    ));
    let mut engine = engine(&library, 50, 2);
    for _ in 0..20 {
        assert!(matches!(
            engine.advance(now()).await.unwrap(),
            Selection::Single(_)
        ));
    }
}

#[tokio::test]
async fn square_photo_is_never_a_base() {
    let library = Arc::new(InMemoryLibrary::new(
        vec![recent("sq", 3000, 3000), recent("p", 3000, 4000)],
        vec![],
    ));
    let mut engine = engine(&library, 0, 3);
    for _ in 0..10 {
        let selection = engine.advance(now()).await.unwrap();
        if selection.first().id == "sq" {
            assert!(!selection.is_dual());
        }
        if let Some(second) = selection.second() {
            assert_ne!(second.id, "sq");
        }
    }
}

#[tokio::test]
async fn two_portraits_pair_up() {
    let library = Arc::new(InMemoryLibrary::new(
        vec![recent("p1", 3000, 4000), recent("p2", 2000, 3000)],
        vec![],
    ));
    let mut engine = engine(&library, 0, 4);
    let selection = engine.advance(now()).await.unwrap();
    assert!(selection.is_dual());
    let mut ids = selection.ids();
    ids.sort_unstable();
    assert_eq!(ids, vec!["p1", "p2"]);
}

#[tokio::test]
async fn partner_comes_from_other_category_when_needed() {
    let library = Arc::new(InMemoryLibrary::new(
        vec![recent("rp", 3000, 4000)],
        vec![memory("mp", 2019, 3000, 4000)],
    ));
    let mut engine = engine(&library, 0, 5);
    let selection = engine.advance(now()).await.unwrap();
    match selection {
        Selection::Dual(first, second) => {
            assert_eq!(first.id, "rp");
            assert_eq!(first.category, Category::Recent);
            assert_eq!(second.id, "mp");
            assert_eq!(second.category, Category::Memory);
        }
        other => panic!("expected a dual selection, got {other:?}"),
    }
}

#[tokio::test]
async fn rotated_landscape_counts_as_portrait() {
    let mut rotated = recent("rot", 4000, 3000);
    rotated.orientation = Some(6);
    let library = Arc::new(InMemoryLibrary::new(
        vec![rotated, recent("p", 3000, 4000)],
        vec![],
    ));
    let mut engine = engine(&library, 0, 6);
    assert!(engine.advance(now()).await.unwrap().is_dual());
}

#[tokio::test]
async fn fallback_happens_before_pairing() {
    let library = Arc::new(InMemoryLibrary::new(
        vec![recent("p1", 3000, 4000), recent("p2", 2000, 3000)],
        vec![],
    ));
    let mut engine = engine(&library, 100, 7);
    match engine.advance(now()).await.unwrap() {
        Selection::Dual(first, second) => {
            assert_eq!(first.category, Category::Recent);
            assert_eq!(second.category, Category::Recent);
            assert_ne!(first.id, second.id);
        }
        other => panic!("expected a dual selection, got {other:?}"),
    }
    assert_eq!(library.memory_fetches(), 1);
}

#[tokio::test]
async fn partner_comes_from_first_records_category() {
    let library = Arc::new(InMemoryLibrary::new(
        vec![recent("rp1", 3000, 4000), recent("rp2", 3000, 4000)],
        vec![
            memory("mp1", 2019, 3000, 4000),
            memory("mp2", 2015, 3000, 4000),
        ],
    ));
    for (mix_ratio, expected) in [(100, Category::Memory), (0, Category::Recent)] {
        let mut engine = engine(&library, mix_ratio, 8);
        let selection = engine.advance(now()).await.unwrap();
        let second = selection.second().expect("dual selection");
        assert_eq!(selection.first().category, expected, "ratio {mix_ratio}");
        assert_eq!(second.category, expected, "ratio {mix_ratio}");
    }
}

#[tokio::test]
async fn huge_pairing_window_is_clamped_to_the_pool() {
    let library = Arc::new(InMemoryLibrary::new(
        vec![recent("p1", 3000, 4000), recent("p2", 2000, 3000)],
        vec![],
    ));
    let mut engine = engine_with_attempts(&library, 0, usize::MAX, 9);
    assert!(engine.advance(now()).await.unwrap().is_dual());
}
