//! Canonical identity for selected citations, and the three-level
//! deduplication rule every later stage relies on.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::biblio::RecordCache;
use crate::ranking::Selection;
use crate::scholar::{normalize_canonical_id, normalize_identifier, ScholarlyGraph};
use crate::types::{CanonicalWork, ResolvedReference, SelectionLabel};

/// Lowercase, trim and collapse internal whitespace.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// The fields identity is decided on, already normalised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityView {
    pub canonical_id: Option<String>,
    pub identifier: Option<String>,
    pub title: String,
    pub year: Option<i32>,
}

impl IdentityView {
    pub fn of(reference: &ResolvedReference) -> Self {
        let canonical_id = reference
            .work
            .canonical_id
            .as_deref()
            .map(normalize_canonical_id)
            .filter(|id| !id.is_empty())
            .map(|id| id.to_lowercase());
        let identifier = reference
            .identifier()
            .map(normalize_identifier)
            .filter(|id| !id.is_empty())
            .map(|id| id.to_lowercase());
        // Bibliographic title first; the raw citation keeps unresolved references apart.
        let title = [
            reference.record.title.as_str(),
            reference.work.title.as_str(),
            reference.citation.as_str(),
        ]
        .into_iter()
        .map(normalize_title)
        .find(|t| !t.is_empty())
        .unwrap_or_default();

        Self {
            canonical_id,
            identifier,
            title,
            year: reference.work.year,
        }
    }

    /// Same entity iff the first level present on BOTH sides agrees:
    /// canonical id, then identifier, then title+year.
    pub fn same_entity(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (&self.canonical_id, &other.canonical_id) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.identifier, &other.identifier) {
            return a == b;
        }
        self.title == other.title && self.year == other.year
    }
}

pub fn same_entity(a: &ResolvedReference, b: &ResolvedReference) -> bool {
    IdentityView::of(a).same_entity(&IdentityView::of(b))
}

/// Keep the first occurrence of each entity, in input order.
pub fn dedup(references: Vec<ResolvedReference>) -> Vec<ResolvedReference> {
    let mut kept: Vec<(IdentityView, ResolvedReference)> = Vec::with_capacity(references.len());
    for reference in references {
        let view = IdentityView::of(&reference);
        if let Some((_, first)) = kept.iter().find(|(seen, _)| seen.same_entity(&view)) {
            debug!(
                dropped = %reference.citation,
                kept = %first.citation,
                "duplicate reference collapsed"
            );
            continue;
        }
        kept.push((view, reference));
    }
    kept.into_iter().map(|(_, r)| r).collect()
}

/// Resolve each selected citation to a canonical work, then deduplicate.
///
/// Identifier lookups go out as one batch; anything without an identifier hit
/// falls back to a title search. Lookup errors degrade to an empty work.
pub async fn resolve_selection(
    graph: &dyn ScholarlyGraph,
    cache: &RecordCache,
    selection: &Selection,
) -> (Vec<ResolvedReference>, usize) {
    let selected: Vec<(SelectionLabel, &String)> = selection
        .baseline
        .iter()
        .map(|c| (SelectionLabel::Baseline, c))
        .chain(selection.innovation.iter().map(|c| (SelectionLabel::Innovation, c)))
        .collect();

    let identifiers: Vec<String> = selected
        .iter()
        .filter_map(|(_, c)| cache.get(c).identifier)
        .collect();

    let mut by_identifier: HashMap<String, CanonicalWork> = HashMap::new();
    if !identifiers.is_empty() {
        match graph.by_identifiers(&identifiers).await {
            Ok(works) => {
                for work in works {
                    if let Some(id) = &work.identifier {
                        by_identifier
                            .entry(normalize_identifier(id).to_lowercase())
                            .or_insert_with(|| work.clone());
                    }
                }
            }
            Err(e) => warn!("Identifier lookup failed, falling back to title search: {:#}", e),
        }
    }

    let mut resolved = Vec::with_capacity(selected.len());
    for (label, citation) in selected {
        let record = cache.get(citation);
        let by_id = record
            .identifier
            .as_deref()
            .and_then(|id| by_identifier.get(&normalize_identifier(id).to_lowercase()))
            .cloned();

        let work = match by_id {
            Some(work) => work,
            None => {
                let query = if record.title.trim().is_empty() {
                    citation.as_str()
                } else {
                    record.title.as_str()
                };
                match graph.by_title(query).await {
                    Ok(hit) => hit.unwrap_or_default(),
                    Err(e) => {
                        warn!(citation = %citation, "Title search failed: {:#}", e);
                        CanonicalWork::default()
                    }
                }
            }
        };

        debug!(
            %label,
            canonical_id = ?work.canonical_id,
            year = ?work.year,
            "reference resolved"
        );
        resolved.push(ResolvedReference {
            label,
            citation: citation.clone(),
            record,
            work,
            citing_works: Vec::new(),
        });
    }

    let canonical_resolved = resolved.iter().filter(|r| !r.work.is_empty()).count();
    let before = resolved.len();
    let unique = dedup(resolved);
    info!(
        canonical_resolved,
        before,
        after = unique.len(),
        "References resolved and deduplicated"
    );
    (unique, canonical_resolved)
}
