use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime};
use futures::stream::{self, StreamExt};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{AssetSource, MemoryQuery, PhotoFetcher, RecentQuery};
use crate::config::LibraryOptions;
use crate::error::FetchError;
use crate::events::{Category, PhotoRecord};
use crate::filter::years_ago;

/// HTTP client for the Immich REST API.
#[derive(Debug, Clone)]
pub struct ImmichClient {
    http: Client,
    host: String,
    max_retries: u32,
    retry_backoff: Duration,
    enrich_concurrency: usize,
}

impl ImmichClient {
    pub fn new(options: &LibraryOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut key =
            HeaderValue::from_str(&options.api_key).context("api-key is not a valid header")?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        let http = Client::builder()
            .default_headers(headers)
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            host: options.url.trim_end_matches('/').to_string(),
            max_retries: options.max_retries.max(1),
            retry_backoff: options.retry_backoff,
            enrich_concurrency: options.enrich_concurrency.max(1),
        })
    }

    /// Checks the API key against the server.
    pub async fn authenticate(&self) -> Result<bool, FetchError> {
        let url = format!("{}/api/auth/validateToken", self.host);
        let response = self.http.post(&url).send().await?;
        if response.status() != StatusCode::OK {
            debug!(status = response.status().as_u16(), "token validation refused");
            return Ok(false);
        }
        let body: Value = response.json().await?;
        Ok(body
            .get("authStatus")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    async fn send(
        &self,
        url: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<Response, FetchError> {
        let mut last_err = None;
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                sleep(self.retry_backoff * 2u32.saturating_pow(attempt - 1)).await;
            }
            match build().send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                        return Err(FetchError::Unauthorized);
                    }
                    let err = FetchError::Status {
                        status: status.as_u16(),
                        url: url.to_string(),
                    };
                    if status == StatusCode::NOT_FOUND {
                        return Err(err);
                    }
                    warn!(
                        url,
                        status = status.as_u16(),
                        attempt = attempt + 1,
                        max = self.max_retries,
                        "library request failed"
                    );
                    last_err = Some(err);
                }
                Err(err) => {
                    warn!(
                        url,
                        attempt = attempt + 1,
                        max = self.max_retries,
                        "library request error: {err}"
                    );
                    last_err = Some(FetchError::Http(err));
                }
            }
        }
        Err(last_err.unwrap_or_else(|| FetchError::Status {
            status: 0,
            url: url.to_string(),
        }))
    }

    async fn asset_info(&self, id: &str) -> Result<AssetDto, FetchError> {
        let url = format!("{}/api/assets/{id}", self.host);
        let response = self.send(&url, || self.http.get(&url)).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Replaces each search hit with the full asset record; hits whose
    /// lookup fails are dropped.
    async fn enrich(&self, assets: Vec<AssetDto>) -> Vec<AssetDto> {
        stream::iter(assets)
            .map(|asset| async move {
                match self.asset_info(&asset.id).await {
                    Ok(full) => Some(full),
                    Err(err) => {
                        warn!(id = %asset.id, "dropping asset without metadata: {err}");
                        None
                    }
                }
            })
            .buffer_unordered(self.enrich_concurrency)
            .filter_map(|asset| async move { asset })
            .collect()
            .await
    }
}

#[async_trait]
impl PhotoFetcher for ImmichClient {
    async fn fetch_recent(&self, query: &RecentQuery) -> Result<Vec<PhotoRecord>, FetchError> {
        let url = format!("{}/api/search/random", self.host);
        let mut body = json!({
            "type": "IMAGE",
            "count": query.count,
        });
        body["takenBefore"] = Value::String(query.until.to_rfc3339());
        if query.days > 0 {
            let taken_after = query.until - ChronoDuration::days(i64::from(query.days));
            body["takenAfter"] = Value::String(taken_after.to_rfc3339());
        }
        if let Some(favorite) = query.favorites.as_query() {
            body["isFavorite"] = Value::Bool(favorite);
        }

        let response = self.send(&url, || self.http.post(&url).json(&body)).await?;
        let hits: Vec<AssetDto> = serde_json::from_slice(&response.bytes().await?)?;
        debug!(hits = hits.len(), days = query.days, "random search returned");

        let records = self
            .enrich(hits)
            .await
            .into_iter()
            .filter_map(|asset| asset.into_record(Category::Recent, None))
            .collect();
        Ok(records)
    }

    async fn fetch_memories(&self, query: &MemoryQuery) -> Result<Vec<PhotoRecord>, FetchError> {
        let url = format!("{}/api/memories", self.host);
        let day = query.on.format("%Y-%m-%d").to_string();
        let response = self
            .send(&url, || {
                self.http
                    .get(&url)
                    .query(&[("type", "on_this_day"), ("for", day.as_str())])
            })
            .await?;
        let memories: Vec<MemoryDto> = serde_json::from_slice(&response.bytes().await?)?;

        let mut tagged: Vec<(AssetDto, i32)> = Vec::new();
        for memory in memories {
            let Some(year) = memory.data.year else {
                continue;
            };
            if query.years > 0 && years_ago(year, query.on) > i64::from(query.years) {
                continue;
            }
            tagged.extend(
                memory
                    .assets
                    .into_iter()
                    .filter(AssetDto::is_image)
                    .filter(|asset| query.favorites.accepts(asset.is_favorite.unwrap_or(false)))
                    .map(|asset| (asset, year)),
            );
        }
        debug!(assets = tagged.len(), day = %day, "memories returned");

        let years: std::collections::HashMap<String, i32> = tagged
            .iter()
            .map(|(asset, year)| (asset.id.clone(), *year))
            .collect();
        let assets = tagged.into_iter().map(|(asset, _)| asset).collect();
        let records = self
            .enrich(assets)
            .await
            .into_iter()
            .filter_map(|asset| {
                let year = years.get(&asset.id).copied();
                asset.into_record(Category::Memory, year)
            })
            .collect();
        Ok(records)
    }
}

#[async_trait]
impl AssetSource for ImmichClient {
    async fn download(&self, id: &str) -> Result<Bytes, FetchError> {
        let url = format!("{}/api/assets/{id}/original", self.host);
        let response = self.send(&url, || self.http.get(&url)).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.contains("image") {
            return Err(FetchError::NotAnImage {
                id: id.to_string(),
                content_type,
            });
        }
        Ok(response.bytes().await?)
    }

    fn asset_url(&self, id: &str) -> Option<String> {
        Some(format!("{}/photos/{id}", self.host))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemoryDto {
    #[serde(default)]
    data: MemoryDataDto,
    #[serde(default)]
    assets: Vec<AssetDto>,
}

#[derive(Debug, Default, Deserialize)]
struct MemoryDataDto {
    year: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetDto {
    id: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    original_file_name: Option<String>,
    local_date_time: Option<String>,
    file_created_at: Option<String>,
    is_favorite: Option<bool>,
    exif_info: Option<ExifDto>,
    #[serde(default)]
    people: Vec<PersonDto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExifDto {
    exif_image_width: Option<u32>,
    exif_image_height: Option<u32>,
    /// Immich reports this as either a string or a number.
    orientation: Option<Value>,
    date_time_original: Option<String>,
    description: Option<String>,
    city: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PersonDto {
    name: Option<String>,
}

impl AssetDto {
    fn is_image(&self) -> bool {
        self.kind.as_deref() == Some("IMAGE")
    }

    fn into_record(self, category: Category, memory_year: Option<i32>) -> Option<PhotoRecord> {
        let exif = self.exif_info.unwrap_or_default();
        let taken_at = [
            self.local_date_time.as_deref(),
            exif.date_time_original.as_deref(),
            self.file_created_at.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find_map(parse_wall_clock);
        let Some(taken_at) = taken_at else {
            warn!(id = %self.id, "skipping asset without a usable timestamp");
            return None;
        };

        let mut record = PhotoRecord::new(self.id, taken_at, category)
            .with_dimensions(
                exif.exif_image_width.unwrap_or(0),
                exif.exif_image_height.unwrap_or(0),
            )
            .with_favorite(self.is_favorite.unwrap_or(false));
        record.orientation = exif.orientation.as_ref().and_then(parse_orientation);
        record.file_name = self.original_file_name;
        record.description = exif.description.filter(|d| !d.is_empty());
        record.city = exif.city;
        record.country = exif.country;
        record.people = self
            .people
            .into_iter()
            .filter_map(|p| p.name)
            .filter(|name| !name.is_empty())
            .collect();
        if category == Category::Memory {
            record.memory_year = memory_year;
        }
        Some(record)
    }
}

/// Wall-clock digits of an RFC 3339 timestamp, ignoring its offset.
fn parse_wall_clock(raw: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_local())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok())
}

fn parse_orientation(raw: &Value) -> Option<u16> {
    match raw {
        Value::Number(n) => n.as_u64().and_then(|v| u16::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
