//! Geometric application of per-plane drift offsets.

use image::Luma;

use crate::error::OutOfRangeWarning;
use crate::stack::{GrayPlane, GrayStack};

use super::table::AlignmentRecord;

/// Translate each recorded plane by the negated offset, zero-filling pixels
/// shifted in from outside the original bounds.
///
/// The output starts as a plane-for-plane copy of the input; a record whose
/// plane index falls outside `[0, len)` is skipped with a warning and the
/// copy is kept, so one bad record never aborts the run. Offsets are rounded
/// to the nearest integer before resampling.
pub fn apply_alignment(
    stack: &GrayStack,
    records: &[AlignmentRecord],
) -> (GrayStack, Vec<OutOfRangeWarning>) {
    let mut planes: Vec<GrayPlane> = stack.planes().to_vec();
    let mut warnings = Vec::new();

    for record in records {
        let index = usize::try_from(record.plane)
            .ok()
            .filter(|&i| i < stack.len());
        let Some(index) = index else {
            tracing::warn!(
                "skip plane {}: outside stack of {} plane(s)",
                record.plane,
                stack.len()
            );
            warnings.push(OutOfRangeWarning::AlignmentPlane {
                plane: record.plane,
                stack_len: stack.len(),
            });
            continue;
        };

        let dx = -record.x.round() as i64;
        let dy = -record.y.round() as i64;
        planes[index] = translate_plane(stack.plane(index), dx, dy);
    }

    (
        GrayStack::from_planes_unchecked(planes, stack.width(), stack.height()),
        warnings,
    )
}

/// Shift plane content by `(dx, dy)`, nearest-neighbor, zero-filled.
fn translate_plane(plane: &GrayPlane, dx: i64, dy: i64) -> GrayPlane {
    let (w, h) = plane.dimensions();
    GrayPlane::from_fn(w, h, |x, y| {
        let sx = i64::from(x) - dx;
        let sy = i64::from(y) - dy;
        if sx >= 0 && sx < i64::from(w) && sy >= 0 && sy < i64::from(h) {
            *plane.get_pixel(sx as u32, sy as u32)
        } else {
            Luma([0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Stack;

    fn gradient_plane(w: u32, h: u32, seed: u8) -> GrayPlane {
        GrayPlane::from_fn(w, h, |x, y| {
            Luma([seed.wrapping_add((x * 7 + y * 13) as u8)])
        })
    }

    fn gradient_stack(n: usize, w: u32, h: u32) -> GrayStack {
        let planes = (0..n).map(|i| gradient_plane(w, h, i as u8 * 31)).collect();
        Stack::from_planes(planes).expect("valid planes")
    }

    #[test]
    fn zero_offsets_are_identity() {
        let stack = gradient_stack(3, 20, 20);
        let records = vec![
            AlignmentRecord::new(0, 0.0, 0.0),
            AlignmentRecord::new(1, 0.0, 0.0),
            AlignmentRecord::new(2, 0.0, 0.0),
        ];
        let (out, warnings) = apply_alignment(&stack, &records);
        assert!(warnings.is_empty());
        assert_eq!(out, stack);
    }

    #[test]
    fn offsets_shift_by_their_negation() {
        let stack = gradient_stack(3, 100, 100);
        let records = vec![
            AlignmentRecord::new(0, 0.0, 0.0),
            AlignmentRecord::new(1, 5.0, -3.0),
            AlignmentRecord::new(2, -2.0, 2.0),
        ];
        let (out, warnings) = apply_alignment(&stack, &records);

        assert!(warnings.is_empty());
        assert_eq!(out.len(), 3);
        assert_eq!((out.width(), out.height()), (100, 100));

        // Plane 1 shifts by (-5, +3): content at (50, 50) lands at (45, 53).
        assert_eq!(
            out.plane(1).get_pixel(45, 53),
            stack.plane(1).get_pixel(50, 50)
        );
        // Plane 2 shifts by (+2, -2).
        assert_eq!(
            out.plane(2).get_pixel(52, 48),
            stack.plane(2).get_pixel(50, 50)
        );
        // Zero-fill where content moved away from the border.
        assert_eq!(out.plane(1).get_pixel(99, 0)[0], 0);
    }

    #[test]
    fn fractional_offsets_round_to_nearest() {
        let stack = gradient_stack(1, 20, 20);
        let records = vec![AlignmentRecord::new(0, 1.6, -0.4)];
        let (out, _) = apply_alignment(&stack, &records);
        // Rounds to (2, 0), so the shift is (-2, 0).
        assert_eq!(out.plane(0).get_pixel(8, 10), stack.plane(0).get_pixel(10, 10));
    }

    #[test]
    fn out_of_range_record_is_skipped_with_warning() {
        let stack = gradient_stack(3, 10, 10);
        let records = vec![AlignmentRecord::new(9, 4.0, 4.0)];
        let (out, warnings) = apply_alignment(&stack, &records);

        assert_eq!(out.len(), 3);
        assert_eq!(out, stack);
        assert_eq!(
            warnings,
            vec![OutOfRangeWarning::AlignmentPlane {
                plane: 9,
                stack_len: 3
            }]
        );
    }

    #[test]
    fn negative_plane_index_is_skipped_with_warning() {
        let stack = gradient_stack(2, 10, 10);
        let (out, warnings) = apply_alignment(&stack, &[AlignmentRecord::new(-1, 1.0, 1.0)]);
        assert_eq!(out, stack);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn plane_without_record_copies_through() {
        let stack = gradient_stack(3, 10, 10);
        let (out, warnings) = apply_alignment(&stack, &[AlignmentRecord::new(1, 3.0, 0.0)]);
        assert!(warnings.is_empty());
        assert_eq!(out.plane(0), stack.plane(0));
        assert_eq!(out.plane(2), stack.plane(2));
        assert_ne!(out.plane(1), stack.plane(1));
    }

    #[test]
    fn negated_offsets_restore_interior_pixels() {
        let stack = gradient_stack(2, 40, 40);
        let forward = vec![
            AlignmentRecord::new(0, 4.0, -2.0),
            AlignmentRecord::new(1, -3.0, 5.0),
        ];
        let backward: Vec<_> = forward
            .iter()
            .map(|r| AlignmentRecord::new(r.plane, -r.x, -r.y))
            .collect();

        let (shifted, _) = apply_alignment(&stack, &forward);
        let (restored, _) = apply_alignment(&shifted, &backward);

        for p in 0..stack.len() {
            for y in 10..30 {
                for x in 10..30 {
                    assert_eq!(
                        restored.plane(p).get_pixel(x, y),
                        stack.plane(p).get_pixel(x, y),
                        "plane {p} pixel ({x}, {y})"
                    );
                }
            }
        }
    }
}
