//! # Resize Plans
//!
//! Fit an upsampled resolution to a desired output resolution,
//! by zero-padding the axes which are too small and cropping those too large.

use crate::layers::resize::crop::crop;
use crate::layers::resize::zero_pad::zero_pad;
use burn::prelude::{Backend, Tensor};

/// A per-axis padding / cropping plan.
///
/// Either side is `None` when it would be all zeros.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResizePlan {
    /// ``(before, after)`` zero padding per spatial axis.
    pub padding: Option<Vec<[usize; 2]>>,

    /// ``(before, after)`` cropping per spatial axis.
    pub cropping: Option<Vec<[usize; 2]>>,
}

/// Split an amount across two sides, with the odd element last.
#[inline(always)]
fn split_evenly(amount: usize) -> [usize; 2] {
    let before = amount / 2;
    [before, before + amount % 2]
}

/// Plan the padding and cropping taking `source` to `target`.
///
/// For each axis, with ``diff = target - source``:
/// * ``diff > 0``: pad ``(diff / 2, diff / 2 + diff % 2)``;
/// * ``diff < 0``: crop ``(-diff / 2, -diff / 2 + -diff % 2)``;
/// * ``diff == 0``: leave the axis alone.
///
/// # Arguments
///
/// - `source`: the resolution to be resized.
/// - `target`: the desired resolution.
///
/// # Returns
///
/// A [`ResizePlan`].
pub fn infer_resize_plan(
    source: &[usize],
    target: &[usize],
) -> ResizePlan {
    assert_eq!(
        source.len(),
        target.len(),
        "source {source:?} and target {target:?} must have the same rank"
    );

    let padding: Vec<[usize; 2]> = source
        .iter()
        .zip(target)
        .map(|(&s, &t)| split_evenly(t.saturating_sub(s)))
        .collect();
    let cropping: Vec<[usize; 2]> = source
        .iter()
        .zip(target)
        .map(|(&s, &t)| split_evenly(s.saturating_sub(t)))
        .collect();

    let non_zero = |plan: Vec<[usize; 2]>| {
        if plan.iter().all(|p| *p == [0, 0]) {
            None
        } else {
            Some(plan)
        }
    };

    let plan = ResizePlan {
        padding: non_zero(padding),
        cropping: non_zero(cropping),
    };
    tracing::debug!(?source, ?target, ?plan, "inferred resize plan");
    plan
}

impl ResizePlan {
    /// Is this plan a no-op?
    pub fn is_identity(&self) -> bool {
        self.padding.is_none() && self.cropping.is_none()
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// Padding is applied before cropping.
    pub fn output_resolution(
        &self,
        input_resolution: &[usize],
    ) -> Vec<usize> {
        let mut resolution = input_resolution.to_vec();
        if let Some(padding) = &self.padding {
            for (size, [before, after]) in resolution.iter_mut().zip(padding) {
                *size += before + after;
            }
        }
        if let Some(cropping) = &self.cropping {
            for (size, [before, after]) in resolution.iter_mut().zip(cropping) {
                *size -= before + after;
            }
        }
        resolution
    }

    /// Apply the plan to a channels-first tensor.
    pub fn apply<B: Backend, const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        let x = match &self.padding {
            Some(padding) => zero_pad(input, padding),
            None => input,
        };
        match &self.cropping {
            Some(cropping) => crop(x, cropping),
            None => x,
        }
    }
}
