// Per-item deduplication: merge lots judged to depict the same physical
// item. Dedup is an optimization, never required for correctness; a failed
// or empty collaborator response is a pass-through.

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::core::types::{ImageRef, Lot, SubMode};
use crate::services::LotAnalysisProvider;

pub async fn dedup_per_item_lots(
    provider: &dyn LotAnalysisProvider,
    images: &[ImageRef],
    lots: Vec<Lot>,
) -> Vec<Lot> {
    let candidate_ids: Vec<&str> = lots
        .iter()
        .filter(|l| l.sub_mode == Some(SubMode::PerItem))
        .map(|l| l.lot_id.as_str())
        .collect();
    if candidate_ids.len() < 2 {
        return lots;
    }

    let candidates: Vec<Lot> = lots
        .iter()
        .filter(|l| l.sub_mode == Some(SubMode::PerItem))
        .cloned()
        .collect();

    let groups = match provider.dedup_lots(images, &candidates).await {
        Ok(groups) => groups,
        Err(e) => {
            warn!("dedup collaborator failed, keeping all lots: {}", e);
            return lots;
        }
    };
    if groups.is_empty() {
        return lots;
    }

    let known: HashSet<&str> = candidate_ids.into_iter().collect();

    // base lot id -> ids merged into it; merged id -> base id
    let mut absorbed_by: HashMap<String, String> = HashMap::new();
    for group in &groups {
        let members: Vec<&String> = group
            .lot_ids
            .iter()
            .filter(|id| known.contains(id.as_str()))
            .collect();
        if members.len() < 2 {
            continue;
        }
        // First member in detection order is the base
        let mut ordered: Vec<&String> = Vec::new();
        for lot in &lots {
            if members.iter().any(|m| **m == lot.lot_id) {
                ordered.push(&lot.lot_id);
            }
        }
        let base = ordered[0].clone();
        for id in ordered.into_iter().skip(1) {
            absorbed_by.insert(id.clone(), base.clone());
        }
    }

    if absorbed_by.is_empty() {
        return lots;
    }

    // Collect the absorbed lots, then rebuild the list in order
    let mut absorbed: HashMap<String, Vec<Lot>> = HashMap::new();
    let mut survivors: Vec<Lot> = Vec::with_capacity(lots.len());
    for lot in lots {
        if let Some(base_id) = absorbed_by.get(&lot.lot_id) {
            absorbed.entry(base_id.clone()).or_default().push(lot);
        } else {
            survivors.push(lot);
        }
    }

    let merged_away: usize = absorbed.values().map(|v| v.len()).sum();
    for survivor in survivors.iter_mut() {
        let Some(duplicates) = absorbed.remove(&survivor.lot_id) else {
            continue;
        };
        for duplicate in duplicates {
            merge_into(survivor, duplicate);
        }
    }

    debug!("dedup merged {} lots away", merged_away);
    survivors
}

/// Merge a duplicate into its base: the richer description wins, resolved
/// images union under the per-item single-image cap, tags union.
fn merge_into(base: &mut Lot, duplicate: Lot) {
    if duplicate.description.len() > base.description.len() {
        base.description = duplicate.description;
    }
    if base.title.is_empty() {
        base.title = duplicate.title;
    }
    if base.estimated_value.is_empty() {
        base.estimated_value = duplicate.estimated_value;
    }

    for (index, url) in duplicate
        .image_indexes
        .into_iter()
        .zip(duplicate.image_urls.into_iter())
    {
        if !base.image_indexes.contains(&index) {
            base.image_indexes.push(index);
            base.image_urls.push(url);
        }
    }
    base.image_indexes.truncate(1);
    base.image_urls.truncate(1);

    if base.cover_url.is_none() {
        base.cover_url = duplicate.cover_url;
    }

    for tag in duplicate.tags {
        if !base.tags.contains(&tag) {
            base.tags.push(tag);
        }
    }
}
