//! Product matching across channels.
//!
//! Given a channel's item listing and the tenant's catalog, propose mappings.
//! Match passes in priority order:
//!
//! 1. Existing manual mappings are untouchable.
//! 2. SKU, exact (case-insensitive).
//! 3. Barcode, exact.
//! 4. Fuzzy name: normalized Levenshtein similarity at or above the
//!    threshold, best candidate wins.

use log::debug;
use stockclerk_channels::ChannelItem;
use strsim::normalized_levenshtein;

use crate::products::Product;

/// Minimum similarity for a fuzzy name match to be proposed.
pub const DEFAULT_NAME_SIMILARITY_THRESHOLD: f64 = 0.85;

/// How a proposed match was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    Sku,
    Barcode,
    FuzzyName,
}

/// A proposed product-item association.
#[derive(Debug, Clone)]
pub struct MatchProposal<'a> {
    pub product: &'a Product,
    pub item: &'a ChannelItem,
    pub source: MatchSource,
    /// 1.0 for exact passes, the similarity score for fuzzy matches.
    pub confidence: f64,
}

/// Matcher configuration.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    pub name_similarity_threshold: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            name_similarity_threshold: DEFAULT_NAME_SIMILARITY_THRESHOLD,
        }
    }
}

/// Propose mappings between catalog products and channel items.
///
/// `already_mapped_external_ids` are skipped entirely (covers manual
/// mappings and previous runs); each product and each item is used at most
/// once, earlier passes winning.
pub fn propose_matches<'a>(
    products: &'a [Product],
    items: &'a [ChannelItem],
    already_mapped_external_ids: &[String],
    config: &MatcherConfig,
) -> Vec<MatchProposal<'a>> {
    let mut proposals: Vec<MatchProposal<'a>> = Vec::new();
    let mut used_products: Vec<&str> = Vec::new();
    let mut used_items: Vec<&str> = Vec::new();

    let candidates: Vec<&ChannelItem> = items
        .iter()
        .filter(|item| !already_mapped_external_ids.contains(&item.external_id))
        .collect();

    // Pass 1: exact SKU.
    for item in &candidates {
        let Some(ref item_sku) = item.sku else {
            continue;
        };
        if used_items.contains(&item.external_id.as_str()) {
            continue;
        }
        if let Some(product) = products.iter().find(|p| {
            !used_products.contains(&p.id.as_str()) && p.sku.eq_ignore_ascii_case(item_sku)
        }) {
            used_products.push(&product.id);
            used_items.push(&item.external_id);
            proposals.push(MatchProposal {
                product,
                item,
                source: MatchSource::Sku,
                confidence: 1.0,
            });
        }
    }

    // Pass 2: exact barcode against the vendor SKU field (several vendors
    // put EAN/UPC codes there).
    for item in &candidates {
        let Some(ref item_sku) = item.sku else {
            continue;
        };
        if used_items.contains(&item.external_id.as_str()) {
            continue;
        }
        if let Some(product) = products.iter().find(|p| {
            !used_products.contains(&p.id.as_str())
                && p.barcode.as_deref().is_some_and(|b| b == item_sku)
        }) {
            used_products.push(&product.id);
            used_items.push(&item.external_id);
            proposals.push(MatchProposal {
                product,
                item,
                source: MatchSource::Barcode,
                confidence: 1.0,
            });
        }
    }

    // Pass 3: fuzzy name, best candidate above threshold.
    for item in &candidates {
        if used_items.contains(&item.external_id.as_str()) {
            continue;
        }

        let mut best: Option<(&Product, f64)> = None;
        for product in products {
            if used_products.contains(&product.id.as_str()) {
                continue;
            }
            let score = name_similarity(&product.name, &item.name);
            if score >= config.name_similarity_threshold
                && best.map(|(_, s)| score > s).unwrap_or(true)
            {
                best = Some((product, score));
            }
        }

        if let Some((product, score)) = best {
            debug!(
                "Fuzzy match '{}' -> '{}' (score {:.2})",
                item.name, product.name, score
            );
            used_products.push(&product.id);
            used_items.push(&item.external_id);
            proposals.push(MatchProposal {
                product,
                item,
                source: MatchSource::FuzzyName,
                confidence: score,
            });
        }
    }

    proposals
}

fn name_similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(
        a.trim().to_lowercase().as_str(),
        b.trim().to_lowercase().as_str(),
    )
}
