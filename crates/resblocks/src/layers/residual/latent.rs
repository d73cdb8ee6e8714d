//! # Latent Width Heuristics
//!
//! The width of the right (convolution) branch of residual blocks.
//!
//! For `ResNeXt` blocks, the unset half of ``(groups, filters)`` is chosen
//! so that the grouped latent branch has roughly the parameter count of a
//! plain residual branch of width ``in_channels / 2``.

use serde::{Deserialize, Serialize};

/// The default group count when neither groups nor filters are given.
pub const DEFAULT_RESNEXT_GROUPS: usize = 32;

/// The default latent width of a residual block: ``max(1, in_channels / 2)``.
pub fn default_latent_channels(in_channels: usize) -> usize {
    (in_channels / 2).max(1)
}

/// Resolved `ResNeXt` latent sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResnextLatent {
    /// Number of latent groups.
    pub groups: usize,

    /// Number of filters per group.
    pub filters: usize,
}

impl ResnextLatent {
    /// The total latent width, ``groups * filters``.
    pub fn channels(&self) -> usize {
        self.groups * self.filters
    }
}

/// Solve for the per-group filter count, given a group count.
///
/// With ``d = depth - 2``, ``K = prod(kernel_size)`` and ``h = in_channels / 2``,
/// this is the positive root of ``a*F^2 + b*F + c = 0`` where
/// ``a = d*K*G``, ``b = (in+out)*G`` and ``c = -h*(in + out + d*K*h)``.
pub fn resnext_latent_filters(
    in_channels: usize,
    out_channels: usize,
    depth: usize,
    kernel_volume: usize,
    groups: usize,
) -> usize {
    let (io, dk, half) = heuristic_terms(in_channels, out_channels, depth, kernel_volume);
    let g = groups as f64;

    let a = dk * g;
    let b = io * g;
    let c = -half * (io + dk * half);

    let root = if a == 0.0 {
        -c / b
    } else {
        ((b * b - 4.0 * a * c).sqrt() - b) / (2.0 * a)
    };
    (root.round_ties_even() as usize).max(1)
}

/// Solve for the group count, given a per-group filter count.
///
/// ``G = (h / F) * (d*K*h + in + out) / (d*K*F + in + out)``.
pub fn resnext_latent_groups(
    in_channels: usize,
    out_channels: usize,
    depth: usize,
    kernel_volume: usize,
    filters: usize,
) -> usize {
    let (io, dk, half) = heuristic_terms(in_channels, out_channels, depth, kernel_volume);
    let f = filters as f64;

    let groups = (half / f) * (dk * half + io) / (dk * f + io);
    (groups.round_ties_even() as usize).max(1)
}

/// ``(in + out, (depth - 2) * K, in / 2)``.
fn heuristic_terms(
    in_channels: usize,
    out_channels: usize,
    depth: usize,
    kernel_volume: usize,
) -> (f64, f64, f64) {
    let middle = depth.saturating_sub(2) as f64;
    (
        (in_channels + out_channels) as f64,
        middle * kernel_volume as f64,
        in_channels as f64 / 2.0,
    )
}

/// Resolve the `ResNeXt` latent sizes.
///
/// * neither given: ``groups = 32``, and filters are inferred;
/// * only groups given: filters are inferred;
/// * only filters given: groups are inferred;
/// * both given: used as-is.
///
/// # Arguments
///
/// - `in_channels`: block input channels.
/// - `out_channels`: block output channels.
/// - `depth`: block depth, including the two pointwise units.
/// - `kernel_volume`: the product of the block kernel size.
/// - `groups`: the latent groups, if given.
/// - `filters`: the per-group latent filters, if given.
pub fn infer_resnext_latent(
    in_channels: usize,
    out_channels: usize,
    depth: usize,
    kernel_volume: usize,
    groups: Option<usize>,
    filters: Option<usize>,
) -> ResnextLatent {
    let latent = match (groups, filters) {
        (Some(groups), Some(filters)) => return ResnextLatent { groups, filters },
        (None, Some(filters)) => ResnextLatent {
            groups: resnext_latent_groups(
                in_channels,
                out_channels,
                depth,
                kernel_volume,
                filters,
            ),
            filters,
        },
        (groups, None) => {
            let groups = groups.unwrap_or(DEFAULT_RESNEXT_GROUPS);
            ResnextLatent {
                groups,
                filters: resnext_latent_filters(
                    in_channels,
                    out_channels,
                    depth,
                    kernel_volume,
                    groups,
                ),
            }
        }
    };
    tracing::debug!(
        in_channels,
        out_channels,
        depth,
        kernel_volume,
        groups = latent.groups,
        filters = latent.filters,
        "inferred ResNeXt latent sizes"
    );
    latent
}

/// The latent (right branch) width policy of a residual block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatentWidth {
    /// A plain residual branch; defaults to ``max(1, in_channels / 2)`` channels.
    Residual {
        /// Latent channels.
        channels: Option<usize>,
    },

    /// A grouped `ResNeXt` branch; unset sizes are inferred.
    Resnext {
        /// Latent groups.
        groups: Option<usize>,

        /// Filters per latent group.
        filters: Option<usize>,
    },
}

impl Default for LatentWidth {
    fn default() -> Self {
        Self::residual()
    }
}

impl LatentWidth {
    /// A residual branch of default width.
    pub fn residual() -> Self {
        Self::Residual { channels: None }
    }

    /// A `ResNeXt` branch with inferred sizes.
    pub fn resnext() -> Self {
        Self::Resnext {
            groups: None,
            filters: None,
        }
    }

    /// Is this a `ResNeXt` branch?
    pub fn is_resnext(&self) -> bool {
        matches!(self, Self::Resnext { .. })
    }

    /// Resolve the latent sizes for a block.
    ///
    /// A residual branch resolves to a single group.
    pub fn resolve(
        &self,
        in_channels: usize,
        out_channels: usize,
        depth: usize,
        kernel_volume: usize,
    ) -> ResnextLatent {
        match *self {
            Self::Residual { channels } => ResnextLatent {
                groups: 1,
                filters: channels.unwrap_or_else(|| default_latent_channels(in_channels)),
            },
            Self::Resnext { groups, filters } => infer_resnext_latent(
                in_channels,
                out_channels,
                depth,
                kernel_volume,
                groups,
                filters,
            ),
        }
    }
}
