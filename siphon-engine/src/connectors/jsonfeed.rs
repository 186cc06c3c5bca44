//! JSON Feed connector
//!
//! Variety connector reading any JSON Feed (1.0 or 1.1) document given by
//! `params.url`. Records are ordered by `date_published`; items without a
//! publication date cannot be placed on the timeline and are skipped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use siphon_core::domain::article::ArticleRecord;
use siphon_core::domain::connector::ConnectorDescriptor;
use siphon_core::domain::source::SourceMeta;
use siphon_core::{CrawlError, Result};
use std::time::Duration;
use tracing::debug;

use crate::connector::{Connector, ConnectorInstance, RecordStream, required_param};
use crate::context::CrawlContext;

#[derive(Debug, Deserialize)]
struct Feed {
    title: String,
    #[serde(default)]
    home_page_url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    items: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    content_html: Option<String>,
    #[serde(default)]
    content_text: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    date_published: Option<DateTime<Utc>>,
}

pub struct JsonFeedConnector {
    descriptor: ConnectorDescriptor,
}

impl JsonFeedConnector {
    pub const ID: &'static str = "jsonfeed";

    pub fn new() -> Self {
        Self {
            descriptor: ConnectorDescriptor::new(Self::ID)
                .variety()
                .with_interval(Duration::from_secs(1800))
                .with_max_wait(Duration::from_secs(60)),
        }
    }
}

impl Default for JsonFeedConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for JsonFeedConnector {
    fn descriptor(&self) -> &ConnectorDescriptor {
        &self.descriptor
    }

    async fn create(
        &self,
        ctx: &CrawlContext,
        params: &Value,
    ) -> Result<Box<dyn ConnectorInstance>> {
        let url = required_param(params, "url")?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(CrawlError::InvalidParameters(format!(
                "url must be http(s): {}",
                url
            )));
        }

        debug!(url, "fetching JSON feed");
        let response = ctx
            .http
            .get(url)
            .send()
            .await
            .map_err(CrawlError::request_failed)?;
        if !response.status().is_success() {
            return Err(CrawlError::RequestFailed(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        let feed: Feed = response.json().await.map_err(CrawlError::request_failed)?;

        Ok(Box::new(JsonFeedInstance::from_feed(url, feed)))
    }
}

struct JsonFeedInstance {
    meta: SourceMeta,
    /// Newest first
    records: Vec<ArticleRecord>,
}

impl JsonFeedInstance {
    fn from_feed(url: &str, feed: Feed) -> Self {
        let mut meta = SourceMeta::new(
            feed.title,
            feed.home_page_url.unwrap_or_else(|| url.to_string()),
            "date_published",
        );
        meta.description = feed.description.unwrap_or_default();
        if let Some(language) = feed.language {
            meta.language = language;
        }

        let mut records: Vec<ArticleRecord> = feed
            .items
            .into_iter()
            .filter_map(|item| {
                let published = item.date_published?;
                let link = item.url.unwrap_or(item.id);
                let mut record = ArticleRecord::new(
                    item.title.unwrap_or_else(|| link.clone()),
                    item.summary.unwrap_or_default(),
                    link,
                    published,
                )
                .with_published(published);
                record.image = item.image;
                record.content = item.content_html.or(item.content_text);
                Some(record)
            })
            .collect();
        records.sort_by(|a, b| b.published.cmp(&a.published));

        Self { meta, records }
    }
}

#[async_trait]
impl ConnectorInstance for JsonFeedInstance {
    fn describe(&self) -> SourceMeta {
        self.meta.clone()
    }

    fn new_to_old(&self) -> RecordStream<'_> {
        stream::iter(self.records.iter().cloned().map(Ok)).boxed()
    }
}
