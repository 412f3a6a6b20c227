use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use immich_slideshow::config::{Configuration, FavoritesFilter};
use immich_slideshow::processing::layout::Resolution;

const MINIMAL: &str = r#"
library:
  url: "http://immich.local:2283"
  api-key: "secret"
"#;

fn parse(yaml: &str) -> Configuration {
    serde_yaml::from_str(yaml).unwrap()
}

#[test]
fn minimal_config_uses_defaults() {
    let cfg = parse(MINIMAL).validated().unwrap();
    assert_eq!(cfg.library.max_retries, 3);
    assert_eq!(cfg.library.enrich_concurrency, 5);
    assert_eq!(cfg.selection.mix_ratio, 0);
    assert_eq!(cfg.selection.recent_days, 90);
    assert_eq!(cfg.selection.memory_years, 0);
    assert_eq!(cfg.selection.favorites, FavoritesFilter::All);
    assert!(cfg.selection.dual_portrait);
    assert_eq!(cfg.refresh_interval, Duration::from_secs(30));
    assert_eq!(cfg.resolutions, vec![Resolution::new(1920, 1080)]);
    assert_eq!(cfg.timezone(), chrono_tz::Tz::UTC);
    assert!(!cfg.output.write_files);
    assert_eq!(cfg.output.directory, PathBuf::from("backgrounds"));
    assert_eq!(cfg.output.keep, 100);
    assert_eq!(cfg.output.jpeg_quality, 85);
}

#[test]
fn parses_full_config() {
    let yaml = r#"
library:
  url: "https://photos.example.org"
  api-key: "k"
  request-timeout: 5s
  max-retries: 2
  retry-backoff: 250ms
selection:
  mix-ratio: 40
  recent-days: 0
  memory-years: 3
  favorites: only
  dual-portrait: false
  pairing-attempts: 8
  recent-refresh: 1h
  empty-retry: 30s
refresh-interval: 2m
resolutions: "1920x1080, 2048x1536"
timezone: "Europe/Paris"
seed: 7
output:
  write-files: true
  directory: "/tmp/frames"
  keep: 10
  jpeg-quality: 90
"#;
    let cfg = parse(yaml).validated().unwrap();
    assert_eq!(cfg.library.request_timeout, Duration::from_secs(5));
    assert_eq!(cfg.library.retry_backoff, Duration::from_millis(250));
    assert_eq!(cfg.selection.mix_ratio, 40);
    assert_eq!(cfg.selection.recent_days, 0);
    assert_eq!(cfg.selection.memory_years, 3);
    assert_eq!(cfg.selection.favorites, FavoritesFilter::Only);
    assert!(!cfg.selection.dual_portrait);
    assert_eq!(cfg.selection.recent_refresh, Some(Duration::from_secs(3600)));
    assert_eq!(cfg.selection.empty_retry, Duration::from_secs(30));
    assert_eq!(cfg.refresh_interval, Duration::from_secs(120));
    assert_eq!(
        cfg.resolutions,
        vec![Resolution::new(1920, 1080), Resolution::new(2048, 1536)]
    );
    assert_eq!(cfg.timezone(), chrono_tz::Europe::Paris);
    assert_eq!(cfg.seed, Some(7));
    assert!(cfg.output.write_files);
    assert_eq!(cfg.output.keep, 10);
}

#[test]
fn resolutions_accept_a_list() {
    let yaml = format!("{MINIMAL}resolutions: [\"800x480\", \"1024X600\"]\n");
    let cfg = parse(&yaml);
    assert_eq!(
        cfg.resolutions,
        vec![Resolution::new(800, 480), Resolution::new(1024, 600)]
    );
}

#[test]
fn malformed_resolution_string_entries_are_skipped() {
    let yaml = format!("{MINIMAL}resolutions: \"1920x1080, bogus, 0x10\"\n");
    let cfg = parse(&yaml);
    assert_eq!(cfg.resolutions, vec![Resolution::new(1920, 1080)]);
}

#[test]
fn rejects_unknown_fields() {
    let yaml = format!("{MINIMAL}selection:\n  mix_ratio: 10\n");
    assert!(serde_yaml::from_str::<Configuration>(&yaml).is_err());
}

#[test]
fn rejects_out_of_range_mix_ratio() {
    let yaml = format!("{MINIMAL}selection:\n  mix-ratio: 101\n");
    let err = parse(&yaml).validated().unwrap_err();
    assert!(format!("{err:#}").contains("mix-ratio"));
}

#[test]
fn rejects_missing_api_key() {
    let yaml = r#"
library:
  url: "http://immich.local"
"#;
    assert!(parse(yaml).validated().is_err());
}

#[test]
fn rejects_empty_resolutions() {
    let yaml = format!("{MINIMAL}resolutions: \"garbage\"\n");
    assert!(parse(&yaml).validated().is_err());
}

#[test]
fn rejects_zero_pairing_attempts() {
    let yaml = format!("{MINIMAL}selection:\n  pairing-attempts: 0\n");
    assert!(parse(&yaml).validated().is_err());
}

#[test]
fn rejects_unbounded_pairing_attempts() {
    let yaml = format!("{MINIMAL}selection:\n  pairing-attempts: 18446744073709551615\n");
    assert!(parse(&yaml).validated().is_err());
    let yaml = format!("{MINIMAL}selection:\n  pairing-attempts: 101\n");
    assert!(parse(&yaml).validated().is_err());
    let yaml = format!("{MINIMAL}selection:\n  pairing-attempts: 100\n");
    assert!(parse(&yaml).validated().is_ok());
}

#[test]
fn timezone_sets_the_local_day() {
    let yaml = format!("{MINIMAL}timezone: \"Asia/Tokyo\"\n");
    let cfg = parse(&yaml);
    let now: DateTime<Utc> = "2026-10-16T20:00:00Z".parse().unwrap();
    assert_eq!(
        now.with_timezone(&cfg.timezone())
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        "2026-10-17 05:00"
    );
}

#[test]
fn loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, MINIMAL).unwrap();
    let cfg = Configuration::from_yaml_file(&path).unwrap();
    assert_eq!(cfg.library.url, "http://immich.local:2283");
    assert!(Configuration::from_yaml_file(dir.path().join("missing.yaml")).is_err());
}
