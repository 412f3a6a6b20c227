use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use crate::processing::layout::Resolution;

/// Which rotation pool a photo was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Recent,
    Memory,
}

impl Category {
    pub fn other(self) -> Self {
        match self {
            Self::Recent => Self::Memory,
            Self::Memory => Self::Recent,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recent => "recent",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for one library asset, as supplied by the fetcher.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRecord {
    pub id: String,
    /// Local wall-clock time the photo was taken.
    pub taken_at: NaiveDateTime,
    pub width: u32,
    pub height: u32,
    /// EXIF orientation tag (1-8) when the library reports one.
    pub orientation: Option<u16>,
    pub file_name: Option<String>,
    pub description: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub people: BTreeSet<String>,
    pub favorite: bool,
    pub category: Category,
    /// Year of the "on this day" memory; only set for `Category::Memory`.
    pub memory_year: Option<i32>,
}

impl PhotoRecord {
    /// Minimal record used by fetchers before metadata enrichment.
    pub fn new(id: impl Into<String>, taken_at: NaiveDateTime, category: Category) -> Self {
        Self {
            id: id.into(),
            taken_at,
            width: 0,
            height: 0,
            orientation: None,
            file_name: None,
            description: None,
            city: None,
            country: None,
            people: BTreeSet::new(),
            favorite: false,
            category,
            memory_year: None,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_favorite(mut self, favorite: bool) -> Self {
        self.favorite = favorite;
        self
    }

    pub fn with_memory_year(mut self, year: i32) -> Self {
        self.memory_year = Some(year);
        self
    }

    /// Width and height as displayed, i.e. after applying the EXIF orientation.
    pub fn display_dimensions(&self) -> (u32, u32) {
        match self.orientation {
            Some(5..=8) => (self.height, self.width),
            _ => (self.width, self.height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    pub fn index(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }
}

/// Output of one tick: a single photo or two paired portraits.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Single(PhotoRecord),
    Dual(PhotoRecord, PhotoRecord),
}

impl Selection {
    pub fn is_dual(&self) -> bool {
        matches!(self, Self::Dual(..))
    }

    pub fn first(&self) -> &PhotoRecord {
        match self {
            Self::Single(first) | Self::Dual(first, _) => first,
        }
    }

    pub fn second(&self) -> Option<&PhotoRecord> {
        match self {
            Self::Single(_) => None,
            Self::Dual(_, second) => Some(second),
        }
    }

    pub fn slots(&self) -> impl Iterator<Item = (Slot, &PhotoRecord)> {
        std::iter::once((Slot::First, self.first()))
            .chain(self.second().map(|second| (Slot::Second, second)))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.slots().map(|(_, record)| record.id.as_str()).collect()
    }
}

/// One encoded JPEG at a configured output resolution.
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub resolution: Resolution,
    pub jpeg: Arc<Vec<u8>>,
}

/// A fully rendered tick, published to the presentation layer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub selection: Selection,
    pub images: Vec<RenderedImage>,
    pub attributes: Map<String, Value>,
    pub rendered_at: Instant,
}

impl Frame {
    pub fn image_for(&self, resolution: Resolution) -> Option<&RenderedImage> {
        self.images.iter().find(|img| img.resolution == resolution)
    }
}

/// Commands accepted by the slideshow task while it runs.
#[derive(Debug, Clone)]
pub enum SlideshowCommand {
    /// Tear down pools and renderer and rebuild them from new settings.
    Reconfigure(Box<crate::config::Configuration>),
    /// Force both pools to re-fetch on their next draw.
    RefreshPools,
}
