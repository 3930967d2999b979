//! Spatial matching of text fragments against a native-space region.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::transform::NativeRect;
use crate::models::config::MatchConfig;
use crate::pdf::TextFragment;

/// Which matching tier produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Fragment centroid inside the region.
    Centroid,
    /// Bounding box overlap within the horizontal slack band.
    Overlap,
    /// Centroid inside the expanded region.
    Expanded,
}

impl std::fmt::Display for MatchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MatchTier::Centroid => "centroid",
            MatchTier::Overlap => "overlap",
            MatchTier::Expanded => "expanded",
        };
        f.write_str(name)
    }
}

/// Fragments selected for a region, in reading order.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome<'a> {
    pub fragments: Vec<&'a TextFragment>,
    /// `None` when no tier matched anything.
    pub tier: Option<MatchTier>,
}

impl MatchOutcome<'_> {
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Fragment strings in order.
    pub fn texts(&self) -> Vec<&str> {
        self.fragments.iter().map(|f| f.text.as_str()).collect()
    }
}

/// Tiered spatial matcher.
#[derive(Debug, Clone, Default)]
pub struct SpatialMatcher {
    config: MatchConfig,
}

impl SpatialMatcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Select the fragments belonging to `rect`.
    ///
    /// Tiers run in order and the first one with a match wins. Finding
    /// nothing is not an error.
    pub fn find<'a>(&self, rect: &NativeRect, fragments: &'a [TextFragment]) -> MatchOutcome<'a> {
        let candidates: Vec<&TextFragment> = fragments
            .iter()
            .filter(|f| !f.text.trim().is_empty())
            .collect();

        let mut tier = MatchTier::Centroid;
        let mut matched = self.by_centroid(rect, &candidates);

        if matched.is_empty() {
            tier = MatchTier::Overlap;
            matched = self.by_overlap(rect, &candidates);
        }

        if matched.is_empty() {
            tier = MatchTier::Expanded;
            let margin = (rect.width() * self.config.fallback_ratio)
                .max(rect.height() * self.config.fallback_ratio)
                .max(self.config.fallback_min);
            matched = self.by_centroid(&rect.expand(margin), &candidates);
        }

        if matched.is_empty() {
            trace!("no fragments matched region {:?}", rect);
            return MatchOutcome::default();
        }

        trace!("{} fragments matched by {} tier", matched.len(), tier);

        let mut fragments = self.dedupe(matched);
        self.sort_reading_order(rect, &mut fragments);

        MatchOutcome {
            fragments,
            tier: Some(tier),
        }
    }

    fn by_centroid<'a>(&self, rect: &NativeRect, candidates: &[&'a TextFragment]) -> Vec<&'a TextFragment> {
        candidates
            .iter()
            .copied()
            .filter(|f| {
                let (x, y) = f.centroid();
                rect.contains(x, y)
            })
            .collect()
    }

    fn by_overlap<'a>(&self, rect: &NativeRect, candidates: &[&'a TextFragment]) -> Vec<&'a TextFragment> {
        let band_min = rect.x_min * (1.0 - self.config.overlap_slack);
        let band_max = rect.x_max * (1.0 + self.config.overlap_slack);

        candidates
            .iter()
            .copied()
            .filter(|f| {
                let bounds = f.bounds();
                rect.intersects(bounds) && bounds.0 >= band_min && bounds.2 <= band_max
            })
            .collect()
    }

    /// Drop repeated text at (nearly) the same position, keeping the first.
    fn dedupe<'a>(&self, matched: Vec<&'a TextFragment>) -> Vec<&'a TextFragment> {
        let mut kept: Vec<&TextFragment> = Vec::with_capacity(matched.len());

        for fragment in matched {
            let (x, y) = fragment.centroid();
            let duplicate = kept.iter().any(|k| {
                let (kx, ky) = k.centroid();
                k.text.trim() == fragment.text.trim()
                    && (kx - x).hypot(ky - y) < self.config.duplicate_distance
            });
            if !duplicate {
                kept.push(fragment);
            }
        }

        kept
    }

    /// Nearest to the region center first. Neighbours whose distances are
    /// within `order_tie` of each other form a run that reads top to bottom,
    /// then left to right.
    fn sort_reading_order<'a>(&self, rect: &NativeRect, fragments: &mut [&'a TextFragment]) {
        let (cx, cy) = rect.center();
        let tie = self.config.order_tie.max(0.0);

        let mut keyed: Vec<(f32, &'a TextFragment)> = fragments
            .iter()
            .map(|f| {
                let (x, y) = f.centroid();
                ((x - cx).hypot(y - cy), *f)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut start = 0;
        for end in 1..=keyed.len() {
            if end == keyed.len() || keyed[end].0 - keyed[end - 1].0 > tie {
                keyed[start..end].sort_by(|a, b| {
                    b.1.native_y
                        .total_cmp(&a.1.native_y)
                        .then_with(|| a.1.native_x.total_cmp(&b.1.native_x))
                });
                start = end;
            }
        }

        for (slot, (_, fragment)) in fragments.iter_mut().zip(keyed) {
            *slot = fragment;
        }
    }
}
