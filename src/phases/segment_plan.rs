// Segment planning: turn per-mode declarations into ordered, non-overlapping
// segments over the image array.
//
// Counts are clamped against the images still unassigned so cumulative
// consumption never exceeds N; an undershoot is absorbed by the last
// segment's main range so no image is silently dropped.

use tracing::debug;

use crate::core::types::{GroupingDeclaration, Segment, SubMode};

pub fn plan_segments(image_count: usize, declarations: &[GroupingDeclaration]) -> Vec<Segment> {
    if image_count == 0 || declarations.is_empty() {
        return Vec::new();
    }

    let mut segments: Vec<Segment> = Vec::with_capacity(declarations.len());
    let mut offset = 0usize;

    for decl in declarations {
        let remaining = image_count - offset;
        if remaining == 0 {
            // Overshoot: everything from this declaration on is trimmed
            break;
        }

        let main_count = decl.count.min(remaining);
        let extra_count = decl.extra_count.min(remaining - main_count);

        // Cover clamps into the main range and resolves to a global index
        let cover_local = if main_count == 0 {
            0
        } else {
            decl.cover_index.min(main_count - 1)
        };

        segments.push(Segment {
            base_offset: offset,
            main_count,
            extra_count,
            cover_index: offset + cover_local,
            sub_mode: decl.sub_mode,
        });

        offset += main_count + extra_count;
    }

    // Undershoot: the last segment's main count absorbs the shortfall
    if offset < image_count {
        if let Some(last) = segments.last_mut() {
            last.main_count += image_count - offset;
        }
    }

    debug!(
        "planned {} segments over {} images",
        segments.len(),
        image_count
    );
    segments
}

/// Fallback when the caller declared nothing: one single-lot segment
/// spanning the whole image array
pub fn default_segment(image_count: usize) -> Segment {
    Segment {
        base_offset: 0,
        main_count: image_count,
        extra_count: 0,
        cover_index: 0,
        sub_mode: SubMode::SingleLot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(sub_mode: SubMode, count: usize, extra: usize, cover: usize) -> GroupingDeclaration {
        GroupingDeclaration {
            sub_mode,
            count,
            extra_count: extra,
            cover_index: cover,
        }
    }

    fn assert_disjoint_within(segments: &[Segment], n: usize) {
        let mut seen = vec![false; n];
        for segment in segments {
            for i in segment.main_range().chain(segment.extra_range()) {
                assert!(i < n, "index {} out of range {}", i, n);
                assert!(!seen[i], "index {} claimed twice", i);
                seen[i] = true;
            }
        }
    }

    #[test]
    fn test_two_declarations_exact_fit() {
        let segments = plan_segments(
            12,
            &[decl(SubMode::PerItem, 5, 0, 0), decl(SubMode::PerPhoto, 7, 0, 0)],
        );
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].base_offset, 0);
        assert_eq!(segments[0].main_count, 5);
        assert_eq!(segments[1].base_offset, 5);
        assert_eq!(segments[1].main_count, 7);
        assert_disjoint_within(&segments, 12);
    }

    #[test]
    fn test_undershoot_absorbed_by_last_segment() {
        let segments = plan_segments(
            10,
            &[decl(SubMode::SingleLot, 3, 0, 0), decl(SubMode::Catalogue, 4, 0, 0)],
        );
        assert_eq!(segments.len(), 2);
        // 3 + 4 declared, shortfall of 3 lands in the last main range
        assert_eq!(segments[1].main_count, 7);
        assert_disjoint_within(&segments, 10);
        let consumed: usize = segments.iter().map(|s| s.total()).sum();
        assert_eq!(consumed, 10);
    }

    #[test]
    fn test_overshoot_trims_from_last_backward() {
        let segments = plan_segments(
            6,
            &[
                decl(SubMode::PerItem, 4, 0, 0),
                decl(SubMode::PerPhoto, 4, 0, 0),
                decl(SubMode::SingleLot, 4, 0, 0),
            ],
        );
        // Third declaration is trimmed away entirely, second is clamped to 2
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].main_count, 4);
        assert_eq!(segments[1].main_count, 2);
        assert_disjoint_within(&segments, 6);
    }

    #[test]
    fn test_extra_count_clamped() {
        let segments = plan_segments(5, &[decl(SubMode::SingleLot, 4, 3, 0)]);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].main_count, 4);
        assert_eq!(segments[0].extra_count, 1);
        assert_eq!(segments[0].extra_range(), 4..5);
    }

    #[test]
    fn test_cover_index_clamped_and_global() {
        let segments = plan_segments(
            8,
            &[decl(SubMode::SingleLot, 4, 0, 99), decl(SubMode::SingleLot, 4, 0, 2)],
        );
        assert_eq!(segments[0].cover_index, 3);
        assert_eq!(segments[1].cover_index, 6);
    }

    #[test]
    fn test_zero_declarations_or_images() {
        assert!(plan_segments(10, &[]).is_empty());
        assert!(plan_segments(0, &[decl(SubMode::SingleLot, 3, 0, 0)]).is_empty());
    }

    #[test]
    fn test_default_segment_spans_everything() {
        let segment = default_segment(9);
        assert_eq!(segment.main_range(), 0..9);
        assert_eq!(segment.extra_count, 0);
        assert_eq!(segment.sub_mode, SubMode::SingleLot);
    }

    #[test]
    fn test_never_overlapping_for_varied_inputs() {
        for n in [1usize, 2, 5, 13, 40] {
            for counts in [[1usize, 1, 1], [7, 0, 3], [20, 20, 20], [0, 5, 0]] {
                let declarations: Vec<_> = counts
                    .iter()
                    .map(|&c| decl(SubMode::PerPhoto, c, 0, 0))
                    .collect();
                let segments = plan_segments(n, &declarations);
                assert_disjoint_within(&segments, n);
            }
        }
    }
}
