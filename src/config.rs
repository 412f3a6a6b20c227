use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use chrono_tz::Tz;
use serde::Deserialize;
use serde::de::{self, Deserializer, SeqAccess, Visitor};

use crate::processing::layout::{Resolution, parse_resolutions};

/// Upper bound for `selection.pairing-attempts`.
pub const MAX_PAIRING_ATTEMPTS: usize = 100;

/// Favorite-flag restriction applied to both categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FavoritesFilter {
    #[default]
    All,
    Only,
    Exclude,
}

impl FavoritesFilter {
    pub fn accepts(self, favorite: bool) -> bool {
        match self {
            Self::All => true,
            Self::Only => favorite,
            Self::Exclude => !favorite,
        }
    }

    /// Value for the library's `isFavorite` search field, if any.
    pub fn as_query(self) -> Option<bool> {
        match self {
            Self::All => None,
            Self::Only => Some(true),
            Self::Exclude => Some(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct LibraryOptions {
    /// Base URL of the Immich server, e.g. `http://immich.local:2283`.
    pub url: String,
    pub api_key: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Attempts per request, including the first.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt.
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
    /// Concurrent metadata lookups while enriching a fetched batch.
    pub enrich_concurrency: usize,
}

impl Default for LibraryOptions {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
            enrich_concurrency: 5,
        }
    }
}

impl LibraryOptions {
    fn validate(&self) -> Result<()> {
        ensure!(!self.url.trim().is_empty(), "library.url must be set");
        ensure!(
            self.url.starts_with("http://") || self.url.starts_with("https://"),
            "library.url must start with http:// or https://"
        );
        ensure!(!self.api_key.is_empty(), "library.api-key must be set");
        ensure!(self.max_retries >= 1, "library.max-retries must be >= 1");
        ensure!(
            self.enrich_concurrency >= 1,
            "library.enrich-concurrency must be >= 1"
        );
        Ok(())
    }
}

/// Options that shape which photos are drawn each tick.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SelectionOptions {
    /// Percentage of ticks that draw from the memory pool (0..=100).
    pub mix_ratio: u8,
    /// Recency window in days; 0 looks back without limit.
    pub recent_days: u32,
    /// How many years back memories may come from; 0 means no limit.
    pub memory_years: u32,
    pub favorites: FavoritesFilter,
    /// Combine two portrait photos into one landscape frame.
    pub dual_portrait: bool,
    /// Records inspected per category when looking for a second portrait.
    pub pairing_attempts: usize,
    /// How many random recent assets to request per pool rebuild.
    pub recent_fetch_count: usize,
    #[serde(with = "humantime_serde")]
    pub recent_refresh: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub memory_refresh: Option<Duration>,
    /// Minimum wait before re-fetching a category that came back empty.
    #[serde(with = "humantime_serde")]
    pub empty_retry: Duration,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            mix_ratio: 0,
            recent_days: 90,
            memory_years: 0,
            favorites: FavoritesFilter::All,
            dual_portrait: true,
            pairing_attempts: 5,
            recent_fetch_count: 100,
            recent_refresh: Some(Duration::from_secs(6 * 60 * 60)),
            memory_refresh: Some(Duration::from_secs(6 * 60 * 60)),
            empty_retry: Duration::from_secs(5 * 60),
        }
    }
}

impl SelectionOptions {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.mix_ratio <= 100,
            "selection.mix-ratio must be between 0 and 100"
        );
        ensure!(
            (1..=MAX_PAIRING_ATTEMPTS).contains(&self.pairing_attempts),
            "selection.pairing-attempts must be between 1 and {MAX_PAIRING_ATTEMPTS}"
        );
        ensure!(
            self.recent_fetch_count >= 1,
            "selection.recent-fetch-count must be >= 1"
        );
        for (name, refresh) in [
            ("recent-refresh", self.recent_refresh),
            ("memory-refresh", self.memory_refresh),
        ] {
            if let Some(period) = refresh {
                ensure!(!period.is_zero(), "selection.{name} must be positive");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct OutputOptions {
    /// Write every rendered frame into `directory`.
    pub write_files: bool,
    pub directory: PathBuf,
    /// Number of frames kept per resolution; older files are pruned.
    pub keep: usize,
    pub jpeg_quality: u8,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            write_files: false,
            directory: PathBuf::from("backgrounds"),
            keep: 100,
            jpeg_quality: 85,
        }
    }
}

impl OutputOptions {
    fn validate(&self) -> Result<()> {
        ensure!(
            (1..=100).contains(&self.jpeg_quality),
            "output.jpeg-quality must be between 1 and 100"
        );
        if self.write_files {
            ensure!(
                !self.directory.as_os_str().is_empty(),
                "output.directory must be set when write-files is enabled"
            );
            ensure!(self.keep >= 1, "output.keep must be >= 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Connection settings for the Immich server.
    pub library: LibraryOptions,
    /// Mix, window and pairing behaviour of the selection engine.
    pub selection: SelectionOptions,
    /// Time between slideshow ticks.
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
    /// Output sizes; the first one is the primary frame.
    #[serde(deserialize_with = "deserialize_resolutions")]
    pub resolutions: Vec<Resolution>,
    /// Timezone used to decide what "today" and "recent" mean.
    pub timezone: Option<Tz>,
    /// Optional deterministic seed for shuffles and mix draws.
    pub seed: Option<u64>,
    pub output: OutputOptions,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            library: LibraryOptions::default(),
            selection: SelectionOptions::default(),
            refresh_interval: Duration::from_secs(30),
            resolutions: vec![Resolution::new(1920, 1080)],
            timezone: None,
            seed: None,
            output: OutputOptions::default(),
        }
    }
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        self.library
            .validate()
            .context("invalid library configuration")?;
        self.selection
            .validate()
            .context("invalid selection configuration")?;
        self.output
            .validate()
            .context("invalid output configuration")?;
        ensure!(
            self.refresh_interval >= Duration::from_secs(1),
            "refresh-interval must be at least one second"
        );
        ensure!(
            !self.resolutions.is_empty(),
            "resolutions must contain at least one WIDTHxHEIGHT entry"
        );
        Ok(self)
    }

    pub fn timezone(&self) -> Tz {
        self.timezone.unwrap_or(Tz::UTC)
    }
}

/// Accepts either `"1920x1080, 2048x1536"` or a YAML list of such strings.
fn deserialize_resolutions<'de, D>(deserializer: D) -> Result<Vec<Resolution>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ResolutionsVisitor;

    impl<'de> Visitor<'de> for ResolutionsVisitor {
        type Value = Vec<Resolution>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a comma-separated WIDTHxHEIGHT string or a list of them")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            Ok(parse_resolutions(value))
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::new();
            while let Some(entry) = seq.next_element::<String>()? {
                let parsed: Resolution = entry.parse().map_err(de::Error::custom)?;
                out.push(parsed);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(ResolutionsVisitor)
}
