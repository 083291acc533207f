use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::scholar::{PageRequest, ScholarlyGraph, FIRST_CURSOR};
use crate::types::{CitingWork, ResolvedReference};

/// Per-reference pagination limits.
#[derive(Debug, Clone, Copy)]
pub struct ExpandLimits {
    pub page_size: u32,
    pub max_pages: u32,
    /// Sleep between consecutive pages of the same reference
    pub page_delay: Duration,
    /// References paginated at once
    pub concurrency: usize,
}

/// Why pagination stopped for one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ExpectedTotalReached,
    Exhausted,
    PageCap,
    /// A page request failed; items gathered so far are kept
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub items: Vec<CitingWork>,
    pub pages: u32,
    pub stop: StopReason,
}

/// Page through forward citations of one canonical work.
///
/// After every page: stop when the expected total is reached, then when the
/// cursor runs out, then at the page cap. A cap stop is a truncation, not a failure.
pub async fn fetch_citing_works(
    graph: &dyn ScholarlyGraph,
    canonical_id: &str,
    endpoint: Option<&str>,
    known_total: Option<u64>,
    limits: ExpandLimits,
) -> Expansion {
    let mut items: Vec<CitingWork> = Vec::new();
    let mut cursor = FIRST_CURSOR.to_string();
    let mut expected_total = known_total.filter(|&t| t > 0);
    let mut pages = 0u32;

    loop {
        let request = PageRequest {
            canonical_id,
            endpoint,
            cursor: &cursor,
            per_page: limits.page_size,
        };
        let page = match graph.citing_page(request).await {
            Ok(page) => page,
            Err(e) => {
                warn!(canonical_id, pages, collected = items.len(), "Citation page failed: {:#}", e);
                return Expansion {
                    items,
                    pages,
                    stop: StopReason::Error,
                };
            }
        };
        pages += 1;
        if pages == 1 {
            if let Some(total) = page.expected_total.filter(|&t| t > 0) {
                expected_total = Some(total);
            }
        }
        items.extend(page.items);
        debug!(canonical_id, pages, collected = items.len(), ?expected_total, "citation page");

        if expected_total.is_some_and(|total| items.len() as u64 >= total) {
            return Expansion {
                items,
                pages,
                stop: StopReason::ExpectedTotalReached,
            };
        }
        let Some(next) = page.next_cursor else {
            return Expansion {
                items,
                pages,
                stop: StopReason::Exhausted,
            };
        };
        if pages >= limits.max_pages {
            warn!(
                canonical_id,
                max_pages = limits.max_pages,
                collected = items.len(),
                "Citation page cap reached, truncating"
            );
            return Expansion {
                items,
                pages,
                stop: StopReason::PageCap,
            };
        }
        cursor = next;
        tokio::time::sleep(limits.page_delay).await;
    }
}

/// Attach forward citations to every reference with a canonical id.
///
/// References are paginated concurrently; each keeps its own delay and cap.
pub async fn expand_references(
    graph: &dyn ScholarlyGraph,
    references: Vec<ResolvedReference>,
    limits: ExpandLimits,
) -> Vec<ResolvedReference> {
    let total = references.len();
    let expanded: Vec<ResolvedReference> = futures::stream::iter(references.into_iter().enumerate())
        .map(|(idx, mut reference)| async move {
            let Some(canonical_id) = reference.work.canonical_id.clone().filter(|id| !id.is_empty()) else {
                debug!(idx, citation = %reference.citation, "no canonical id, skipping citation graph");
                return reference;
            };
            let expansion = fetch_citing_works(
                graph,
                &canonical_id,
                reference.work.citation_list_endpoint.as_deref(),
                reference.work.citation_count,
                limits,
            )
            .await;
            info!(
                reference = idx + 1,
                total,
                canonical_id = %canonical_id,
                expected = reference.work.citation_count.unwrap_or(0),
                got = expansion.items.len(),
                pages = expansion.pages,
                stop = ?expansion.stop,
                "Citing works fetched"
            );
            reference.citing_works = expansion.items;
            reference
        })
        .buffered(limits.concurrency.max(1))
        .collect()
        .await;
    expanded
}
