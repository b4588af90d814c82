//! 8-bit intensity normalization and color expansion.
//!
//! Downstream consumers (the external alignment engine, the overlay
//! renderer) only operate on 8-bit data. The rescale uses one affine map per
//! stack, derived from the stack-wide observed range, so relative intensity
//! differences between planes survive. Target and reference stacks are each
//! normalized against their own range.

use image::{Luma, Rgb};

use crate::stack::{ColorPlane, ColorStack, GrayPlane, GrayStack, RawStack};

/// Normalization options, fixed for the whole run.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeConfig {
    /// Invert the LUT after rescaling (`255 - v`), for bright-field data.
    pub invert: bool,
}

/// Rescale every sample from the stack-wide `[min, max]` onto `[0, 255]`.
///
/// A degenerate range (`max == min`) maps every sample to 0.
pub fn normalize_stack(stack: &RawStack, config: &NormalizeConfig) -> GrayStack {
    let mut min = u16::MAX;
    let mut max = u16::MIN;
    for plane in stack.planes() {
        for &v in plane.as_raw() {
            min = min.min(v);
            max = max.max(v);
        }
    }

    let scale = if max > min {
        255.0 / f64::from(max - min)
    } else {
        0.0
    };

    let planes = stack
        .planes()
        .iter()
        .map(|plane| {
            GrayPlane::from_fn(plane.width(), plane.height(), |x, y| {
                let v = plane.get_pixel(x, y)[0];
                let scaled = (f64::from(v - min) * scale).round() as u8;
                Luma([if config.invert { 255 - scaled } else { scaled }])
            })
        })
        .collect();

    GrayStack::from_planes_unchecked(planes, stack.width(), stack.height())
}

/// Expand an 8-bit grayscale stack to RGB for annotation.
pub fn to_color(stack: &GrayStack) -> ColorStack {
    let planes = stack
        .planes()
        .iter()
        .map(|plane| {
            ColorPlane::from_fn(plane.width(), plane.height(), |x, y| {
                let v = plane.get_pixel(x, y)[0];
                Rgb([v, v, v])
            })
        })
        .collect();

    ColorStack::from_planes_unchecked(planes, stack.width(), stack.height())
}
