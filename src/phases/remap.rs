// Index remapping: reconcile the three index spaces per lot.
//
// (a) AI-local indices translate through the segment's local->global table,
// dropping unmapped entries; (b) a direct URL reverse-resolves to a global
// index and is unioned in; (c) a per-photo lot with zero indices defaults to
// the index implied by its position; (d) per-item lots keep only the first
// resolved index; (e) image URLs are set from resolved indices; (f) the
// cover preference is direct URL > first resolved index > segment cover.
// Reconciliation never guesses beyond these rules.

use std::collections::HashMap;
use tracing::debug;

use crate::core::types::{ImageRef, Lot, LotItem, SegmentLots, SubMode};
use crate::phases::numbering::parse_lot_number;

pub fn remap_segment_lots(images: &[ImageRef], segment_lots: Vec<SegmentLots>) -> Vec<Lot> {
    // Reverse-resolution table for direct URLs; first occurrence wins
    let mut url_to_global: HashMap<&str, usize> = HashMap::with_capacity(images.len());
    for (i, image) in images.iter().enumerate() {
        url_to_global.entry(image.url.as_str()).or_insert(i);
    }

    let mut lots = Vec::new();

    for SegmentLots {
        segment,
        local_to_global,
        lots: raw_lots,
    } in segment_lots
    {
        let first_lot_index = lots.len();

        for (position, raw) in raw_lots.into_iter().enumerate() {
            let mut resolved: Vec<usize> = Vec::new();

            // (a) local -> global, dropping unmapped entries
            for local in &raw.image_indexes {
                if *local >= 0 {
                    if let Some(&global) = local_to_global.get(*local as usize) {
                        if !resolved.contains(&global) {
                            resolved.push(global);
                        }
                    }
                }
            }

            // (b) direct URL reverse-resolves and unions in
            if let Some(ref url) = raw.image_url {
                if let Some(&global) = url_to_global.get(url.as_str()) {
                    if !resolved.contains(&global) {
                        resolved.push(global);
                    }
                }
            }

            // (c) per-photo default: the index implied by the lot's position
            if resolved.is_empty() && segment.sub_mode == SubMode::PerPhoto {
                let implied = segment.base_offset + position;
                if segment.main_range().contains(&implied) && implied < images.len() {
                    resolved.push(implied);
                }
            }

            // (d) per-item cardinality: first resolved index only
            if segment.sub_mode.single_image() {
                resolved.truncate(1);
            }

            // (e) URLs from resolved indices
            let image_urls: Vec<String> =
                resolved.iter().map(|&i| images[i].url.clone()).collect();

            // (f) cover preference: direct URL > first resolved > segment cover
            let cover_url = raw
                .image_url
                .clone()
                .or_else(|| resolved.first().map(|&i| images[i].url.clone()))
                .or_else(|| images.get(segment.cover_index).map(|img| img.url.clone()));

            let items = raw
                .items
                .into_iter()
                .map(|item| {
                    let image_index = item
                        .image_index
                        .filter(|&i| i >= 0)
                        .and_then(|i| local_to_global.get(i as usize).copied());
                    let image_url = item
                        .image_url
                        .or_else(|| image_index.map(|i| images[i].url.clone()));
                    LotItem {
                        title: item.title,
                        description: item.description,
                        condition: item.condition,
                        estimated_value: item.estimated_value,
                        image_index,
                        image_url,
                    }
                })
                .collect();

            let mut lot = Lot::with_id();
            lot.lot_number = parse_lot_number(raw.lot_number.as_ref());
            lot.title = raw.title;
            lot.description = raw.description;
            lot.condition = raw.condition;
            lot.estimated_value = raw.estimated_value;
            lot.image_indexes = resolved;
            lot.image_urls = image_urls;
            lot.cover_url = cover_url;
            lot.items = items;
            lot.sub_mode = Some(segment.sub_mode);
            lot.tags = raw.tags;
            lots.push(lot);
        }

        // The segment's extra range rides with its first lot
        if segment.extra_count > 0 {
            if let Some(first) = lots.get_mut(first_lot_index) {
                first.extra_image_indexes =
                    segment.extra_range().filter(|&i| i < images.len()).collect();
                first.extra_image_urls = first
                    .extra_image_indexes
                    .iter()
                    .map(|&i| images[i].url.clone())
                    .collect();
            }
        }
    }

    debug!("remapped {} lots", lots.len());
    lots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AnalyzedItem, AnalyzedLot, Segment};
    use serde_json::json;

    fn images(n: usize) -> Vec<ImageRef> {
        (0..n)
            .map(|i| ImageRef {
                url: format!("http://store/img-{}.jpg", i),
                name: format!("img-{}.jpg", i),
            })
            .collect()
    }

    fn segment(offset: usize, main: usize, extra: usize, sub_mode: SubMode) -> Segment {
        Segment {
            base_offset: offset,
            main_count: main,
            extra_count: extra,
            cover_index: offset,
            sub_mode,
        }
    }

    fn raw(indexes: Vec<i64>) -> AnalyzedLot {
        AnalyzedLot {
            image_indexes: indexes,
            ..Default::default()
        }
    }

    #[test]
    fn test_local_indices_translate_and_unmapped_drop() {
        let images = images(10);
        let seg = segment(4, 4, 0, SubMode::SingleLot);
        let lots = remap_segment_lots(
            &images,
            vec![SegmentLots {
                segment: seg,
                local_to_global: vec![4, 5, 6, 7],
                // 9 and -1 are unmapped in local space and must drop
                lots: vec![raw(vec![0, 2, 9, -1, 2])],
            }],
        );

        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].image_indexes, vec![4, 6]);
        assert_eq!(
            lots[0].image_urls,
            vec!["http://store/img-4.jpg", "http://store/img-6.jpg"]
        );
        assert_eq!(lots[0].image_urls.len(), lots[0].image_indexes.len());
    }

    #[test]
    fn test_direct_url_unions_in() {
        let images = images(6);
        let seg = segment(0, 3, 0, SubMode::SingleLot);
        let mut lot = raw(vec![0]);
        lot.image_url = Some("http://store/img-5.jpg".to_string());

        let lots = remap_segment_lots(
            &images,
            vec![SegmentLots {
                segment: seg,
                local_to_global: vec![0, 1, 2],
                lots: vec![lot],
            }],
        );

        assert_eq!(lots[0].image_indexes, vec![0, 5]);
        // Direct URL wins the cover preference
        assert_eq!(lots[0].cover_url.as_deref(), Some("http://store/img-5.jpg"));
    }

    #[test]
    fn test_per_photo_position_default() {
        let images = images(12);
        let seg = segment(5, 7, 0, SubMode::PerPhoto);
        let lots = remap_segment_lots(
            &images,
            vec![SegmentLots {
                segment: seg,
                local_to_global: (5..12).collect(),
                lots: (0..7).map(|_| raw(Vec::new())).collect(),
            }],
        );

        // One-to-one with [5..11] when the collaborator returns no indices
        assert_eq!(lots.len(), 7);
        for (i, lot) in lots.iter().enumerate() {
            assert_eq!(lot.image_indexes, vec![5 + i]);
        }
    }

    #[test]
    fn test_per_photo_position_out_of_range_stays_empty() {
        let images = images(4);
        let seg = segment(0, 4, 0, SubMode::PerPhoto);
        let lots = remap_segment_lots(
            &images,
            vec![SegmentLots {
                segment: seg,
                local_to_global: vec![0, 1, 2, 3],
                lots: (0..6).map(|_| raw(Vec::new())).collect(),
            }],
        );

        assert_eq!(lots[3].image_indexes, vec![3]);
        assert!(lots[4].image_indexes.is_empty());
        assert!(lots[5].image_indexes.is_empty());
    }

    #[test]
    fn test_per_item_keeps_first_resolved_only() {
        let images = images(5);
        let seg = segment(0, 5, 0, SubMode::PerItem);
        let lots = remap_segment_lots(
            &images,
            vec![SegmentLots {
                segment: seg,
                local_to_global: vec![0, 1, 2, 3, 4],
                lots: vec![raw(vec![2, 0, 1])],
            }],
        );

        assert_eq!(lots[0].image_indexes, vec![2]);
        assert_eq!(lots[0].image_urls.len(), 1);
    }

    #[test]
    fn test_cover_falls_back_to_segment_cover() {
        let images = images(4);
        let mut seg = segment(0, 4, 0, SubMode::SingleLot);
        seg.cover_index = 2;
        let lots = remap_segment_lots(
            &images,
            vec![SegmentLots {
                segment: seg,
                local_to_global: vec![0, 1, 2, 3],
                lots: vec![raw(Vec::new())],
            }],
        );

        assert!(lots[0].image_indexes.is_empty());
        assert_eq!(lots[0].cover_url.as_deref(), Some("http://store/img-2.jpg"));
    }

    #[test]
    fn test_extras_attach_to_first_lot() {
        let images = images(8);
        let seg = segment(0, 5, 3, SubMode::SingleLot);
        let lots = remap_segment_lots(
            &images,
            vec![SegmentLots {
                segment: seg,
                local_to_global: vec![0, 1, 2, 3, 4],
                lots: vec![raw(vec![0]), raw(vec![1])],
            }],
        );

        assert_eq!(lots[0].extra_image_indexes, vec![5, 6, 7]);
        assert_eq!(lots[0].extra_image_urls.len(), 3);
        assert!(lots[1].extra_image_indexes.is_empty());
    }

    #[test]
    fn test_catalogue_items_single_image() {
        let images = images(6);
        let seg = segment(0, 6, 0, SubMode::Catalogue);
        let mut lot = raw(vec![0, 1, 2]);
        lot.lot_number = Some(json!("Lot 12"));
        lot.items = vec![
            AnalyzedItem {
                title: "chair".into(),
                image_index: Some(1),
                ..Default::default()
            },
            AnalyzedItem {
                title: "ghost".into(),
                image_index: Some(99),
                ..Default::default()
            },
        ];

        let lots = remap_segment_lots(
            &images,
            vec![SegmentLots {
                segment: seg,
                local_to_global: vec![0, 1, 2, 3, 4, 5],
                lots: vec![lot],
            }],
        );

        assert_eq!(lots[0].lot_number, Some(12));
        assert_eq!(lots[0].items[0].image_index, Some(1));
        assert_eq!(
            lots[0].items[0].image_url.as_deref(),
            Some("http://store/img-1.jpg")
        );
        // Unmapped item index drops rather than guessing
        assert_eq!(lots[0].items[1].image_index, None);
        assert_eq!(lots[0].items[1].image_url, None);
    }

    #[test]
    fn test_output_indices_in_range_and_unique() {
        let images = images(9);
        let segs = vec![
            SegmentLots {
                segment: segment(0, 4, 0, SubMode::SingleLot),
                local_to_global: vec![0, 1, 2, 3],
                lots: vec![raw(vec![3, 3, 1, 50])],
            },
            SegmentLots {
                segment: segment(4, 5, 0, SubMode::PerItem),
                local_to_global: vec![4, 5, 6, 7, 8],
                lots: vec![raw(vec![0, 1]), raw(vec![1])],
            },
        ];

        for lot in remap_segment_lots(&images, segs) {
            let mut seen = std::collections::HashSet::new();
            for &i in &lot.image_indexes {
                assert!(i < images.len());
                assert!(seen.insert(i), "duplicate index {} in lot", i);
            }
            assert_eq!(lot.image_urls.len(), lot.image_indexes.len());
            if lot.sub_mode == Some(SubMode::PerItem) {
                assert!(lot.image_indexes.len() <= 1);
            }
        }
    }
}
