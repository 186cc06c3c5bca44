//! Incremental sync protocol
//!
//! Adapts a connector's native enumeration order to the order the caller
//! needs, given the resume flags:
//!
//! - `amount` set: the first N natively enumerated records, preference ignored
//! - marker, new2old requested: records while `key > marker`
//! - marker, old2new requested, native old2new: the connector's own stream
//! - marker, old2new requested, no native old2new: buffer the new2old records
//!   above the marker, then replay them oldest first
//! - no marker at all: nothing, unless the connector can walk old2new from the
//!   beginning
//!
//! Old2new output lets the caller persist in increasing key order, so an
//! interrupted run leaves a consistent prefix behind.

use futures::future;
use futures::stream::{self, StreamExt, TryStreamExt};
use siphon_core::CrawlError;
use siphon_core::domain::article::{ArticleRecord, SortValue};
use siphon_core::domain::connector::ConnectorDescriptor;
use siphon_core::domain::locate::{LocateInfo, SequencePreference};
use tracing::{debug, warn};

use crate::connector::{ConnectorInstance, RecordStream};

/// Records of `instance` after the resume point, in the requested order
pub fn fetch<'a, I>(
    instance: &'a I,
    descriptor: &'a ConnectorDescriptor,
    flags: &'a LocateInfo,
    preference: SequencePreference,
) -> RecordStream<'a>
where
    I: ConnectorInstance + ?Sized,
{
    if let Some(amount) = flags.amount {
        debug!(connector = %descriptor.id, amount, "bootstrap fetch");
        return instance.new_to_old().take(amount).boxed();
    }

    match flags.marker() {
        None => {
            if preference.is_old2new() && descriptor.supports_old2new {
                instance.old_to_new(None)
            } else {
                warn!(
                    connector = %descriptor.id,
                    ?preference,
                    "no resume marker and no native old2new enumeration, skipping fetch"
                );
                stream::empty().boxed()
            }
        }
        Some(marker) if !preference.is_old2new() => newer_than(instance.new_to_old(), marker),
        Some(marker) if descriptor.supports_old2new => instance
            .old_to_new(Some(marker))
            .try_filter(move |record| future::ready(record.sort_key > *marker))
            .boxed(),
        Some(marker) => {
            debug!(connector = %descriptor.id, %marker, "forcing old2new over a new2old source");
            buffered_old2new(instance.new_to_old(), marker)
        }
    }
}

/// Records of a new2old stream while their key is above `marker`
fn newer_than<'a>(records: RecordStream<'a>, marker: &'a SortValue) -> RecordStream<'a> {
    records
        .try_take_while(move |record| future::ready(Ok::<bool, CrawlError>(record.sort_key > *marker)))
        .boxed()
}

/// Buffers a new2old stream down to `marker` and replays it oldest first
///
/// Memory is bounded by the number of records produced since the last
/// successful sync.
fn buffered_old2new<'a>(mut records: RecordStream<'a>, marker: &'a SortValue) -> RecordStream<'a> {
    let collect = async move {
        let mut buffer: Vec<ArticleRecord> = Vec::new();
        while let Some(record) = records.try_next().await? {
            if record.sort_key > *marker {
                buffer.push(record);
            } else {
                break;
            }
        }
        debug!(buffered = buffer.len(), "replaying buffered records oldest first");
        Ok::<_, CrawlError>(stream::iter(
            buffer.into_iter().rev().map(Ok::<ArticleRecord, CrawlError>),
        ))
    };

    stream::once(collect).try_flatten().boxed()
}
