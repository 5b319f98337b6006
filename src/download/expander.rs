//! Collection expansion into the final scheduling order.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::job::{JobError, JobErrorKind};
use crate::fetch::{FetchContext, FetchEngine};
use crate::parser::{
    CollectionReference, Reference, ReferenceKind, VideoReference, canonical_video_id,
    validate_url,
};
use crate::proxy::{ProxyLease, ProxyPool};

/// One slot in the scheduling order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduledItem {
    /// A video to process.
    Video(VideoReference),
    /// A collection that could not be listed; occupies one failed slot.
    FailedCollection {
        /// The collection.
        collection: CollectionReference,
        /// Why listing failed.
        error: JobError,
    },
}

/// Expanded scheduling order.
#[derive(Debug, Default)]
pub struct Expansion {
    /// Slots in emission order.
    pub items: Vec<ScheduledItem>,
    /// Video references dropped because their canonical id was already scheduled.
    pub duplicates: usize,
    /// Collections left unlisted because the run was cancelled.
    pub unexpanded: usize,
}

/// Expands collections in place and de-duplicates by canonical id.
///
/// Members are inserted at the position of their parent collection in host
/// order, bounded by the collection's `max_items`. Each collection is listed
/// at most once. A listing failure becomes a single
/// [`ScheduledItem::FailedCollection`] slot and expansion continues. Once
/// `cancel` fires, remaining collections are counted in
/// [`Expansion::unexpanded`] instead of listed.
#[instrument(skip_all, fields(references = references.len()))]
pub async fn expand_references(
    references: &[Reference],
    engine: &dyn FetchEngine,
    ctx: &FetchContext<'_>,
    proxies: &ProxyPool,
    cancel: &CancellationToken,
) -> Expansion {
    let mut expansion = Expansion::default();
    let mut scheduled: HashSet<String> = HashSet::new();
    let mut expanded: HashSet<String> = HashSet::new();

    for reference in references {
        match reference {
            Reference::Video(video) => {
                push_video(&mut expansion, &mut scheduled, video.clone());
            }
            Reference::Collection(collection) => {
                if !expanded.insert(collection.canonical_url.clone()) {
                    debug!(url = %collection.url, "collection already expanded");
                    continue;
                }
                if cancel.is_cancelled() {
                    expansion.unexpanded += 1;
                    continue;
                }

                let lease = proxies.lease();
                let ctx = FetchContext {
                    proxy: lease.as_ref().map(ProxyLease::url),
                    ..*ctx
                };
                let listed = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        expansion.unexpanded += 1;
                        continue;
                    }
                    listed = engine.list_collection(collection, &ctx) => listed,
                };

                match listed {
                    Ok(urls) => {
                        let members = members_of(collection, urls);
                        info!(
                            url = %collection.url,
                            members = members.len(),
                            max_items = collection.max_items,
                            "expanded collection"
                        );
                        for member in members {
                            push_video(&mut expansion, &mut scheduled, member);
                        }
                    }
                    Err(e) => {
                        warn!(
                            url = %collection.url,
                            error_kind = %JobErrorKind::CollectionUnavailable,
                            error = %e,
                            "collection unavailable"
                        );
                        expansion.items.push(ScheduledItem::FailedCollection {
                            collection: collection.clone(),
                            error: JobError::new(JobErrorKind::CollectionUnavailable, e.to_string()),
                        });
                    }
                }
            }
        }
    }

    expansion
}

fn push_video(expansion: &mut Expansion, scheduled: &mut HashSet<String>, video: VideoReference) {
    if scheduled.insert(video.canonical_id.clone()) {
        expansion.items.push(ScheduledItem::Video(video));
    } else {
        debug!(url = %video.url, id = %video.canonical_id, "dropping duplicate video");
        expansion.duplicates += 1;
    }
}

/// Turns listed URLs into member references, truncated to the bound.
fn members_of(collection: &CollectionReference, urls: Vec<String>) -> Vec<VideoReference> {
    let limit = if collection.max_items == 0 {
        usize::MAX
    } else {
        collection.max_items
    };

    urls.into_iter()
        .filter_map(|raw| match validate_url(&raw) {
            Ok(url) => Some(VideoReference {
                canonical_id: canonical_video_id(&url),
                url: url.to_string(),
                raw_url: raw,
                kind: ReferenceKind::CollectionMember {
                    collection_url: collection.canonical_url.clone(),
                },
            }),
            Err(e) => {
                warn!(collection = %collection.url, error = %e, "skipping unusable member URL");
                None
            }
        })
        .take(limit)
        .collect()
}
