//! The deltification engine's base-selection policy: skip-delta with a
//! linear tail, bounded by a walk limit and a shared-representation chain
//! bound (spec.md §4.6).
//!
//! This module makes no I/O decisions itself — it answers "how many
//! predecessors back should the delta base be, or should we abandon delta
//! entirely" given the predecessor count and the configured tuning knobs.
//! The commit pipeline walks that many predecessors and supplies the
//! resulting ancestor's representation.

/// Deltification tuning knobs, read from `fsfs.conf`'s `[deltification]`
/// section (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltifyConfig {
    /// Below this many predecessors-back, use a fully linear chain instead
    /// of jumping to the skip-delta target (smaller on-disk size for
    /// recently-edited nodes). Must be a power of two.
    pub max_linear_deltification: u64,
    /// Walks further back than this abandon delta entirely and emit PLAIN,
    /// bounding commit time on long histories. Must be a power of two
    /// minus one.
    pub max_deltification_walk: u64,
}

impl Default for DeltifyConfig {
    fn default() -> Self {
        DeltifyConfig {
            max_linear_deltification: 16,
            max_deltification_walk: 1023,
        }
    }
}

/// The outcome of the base-selection decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaBaseChoice {
    /// No predecessor exists; nothing to delta against.
    NoPredecessor,
    /// Delta against the ancestor `distance` predecessors back.
    Base {
        /// How many predecessors back the base lives.
        distance: u64,
    },
    /// Abandon delta for this write; emit PLAIN instead.
    Abandon,
}

/// Clear the lowest set bit of `count` — the skip-delta target distance
/// from the current predecessor count.
fn skip_delta_target(count: u64) -> u64 {
    count & (count - 1)
}

/// Decide how far back a new representation's delta base should be, given
/// the predecessor count of the node-revision it is replacing.
///
/// `count` is `predecessor_count`: the number of prior node-revisions in
/// this node's line (i.e. the 1-based position of the *previous* version;
/// the representation being written now is for predecessor count `count`,
/// replacing content whose own predecessor count was `count - 1`... in
/// practice this function is called with the *new* node-revision's
/// `predecessor_count`, which is what spec.md §4.6 calls `count`).
pub fn choose_base(count: u64, config: &DeltifyConfig) -> DeltaBaseChoice {
    if count == 0 {
        return DeltaBaseChoice::NoPredecessor;
    }
    let target = skip_delta_target(count);
    let skip_distance = count - target;
    let distance = if skip_distance < config.max_linear_deltification {
        1
    } else {
        skip_distance
    };

    if distance > config.max_deltification_walk {
        return DeltaBaseChoice::Abandon;
    }
    DeltaBaseChoice::Base { distance }
}

/// Bound the resulting chain length when an intermediate ancestor's
/// representation turns out to be *shared* (its owning revision is newer
/// than the node-revision that owns it, because rep-sharing pointed
/// multiple node-revisions at the same bytes). If walking through it would
/// make the effective chain longer than `2 * max_linear_deltification + 2`,
/// the caller should abandon delta rather than let reconstruction depth
/// grow unbounded (spec.md §4.6).
pub fn chain_length_exceeds_bound(chain_len: u64, config: &DeltifyConfig) -> bool {
    chain_len > 2 * config.max_linear_deltification + 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_predecessor_means_no_base() {
        assert_eq!(choose_base(0, &DeltifyConfig::default()), DeltaBaseChoice::NoPredecessor);
    }

    #[test]
    fn small_counts_stay_linear() {
        let cfg = DeltifyConfig::default();
        // count=16 itself is the first skip-delta case (skip_distance=16 is
        // not < max_linear_deltification=16); see seventeenth_commit_skips_to_sixteen.
        for count in 1..16 {
            assert_eq!(choose_base(count, &cfg), DeltaBaseChoice::Base { distance: 1 });
        }
    }

    #[test]
    fn sixteenth_commit_is_the_first_skip_delta() {
        let cfg = DeltifyConfig::default();
        // count=16 -> target = 16 & 15 = 0, skip_distance = 16, not < max_linear(16) -> skip to the origin.
        assert_eq!(choose_base(16, &cfg), DeltaBaseChoice::Base { distance: 16 });
    }

    #[test]
    fn seventeenth_commit_skips_to_sixteen() {
        let cfg = DeltifyConfig::default();
        // count=17 -> target=16, skip_distance=1 < max_linear(16) -> stays linear.
        assert_eq!(choose_base(17, &cfg), DeltaBaseChoice::Base { distance: 1 });
        // count=32 -> target = 32 & 31 = 0, skip_distance = 32 >= 16 -> skip-delta to origin.
        assert_eq!(choose_base(32, &cfg), DeltaBaseChoice::Base { distance: 32 });
    }

    #[test]
    fn skip_delta_for_power_of_two_boundary() {
        let cfg = DeltifyConfig::default();
        // count=20 -> target = 20 & 19 = 16, skip_distance = 4 < 16 -> linear.
        assert_eq!(choose_base(20, &cfg), DeltaBaseChoice::Base { distance: 1 });
        // count=48 -> target = 48 & 47 = 32, skip_distance = 16, not < 16 -> skip.
        assert_eq!(choose_base(48, &cfg), DeltaBaseChoice::Base { distance: 16 });
    }

    #[test]
    fn abandons_beyond_walk_limit() {
        let cfg = DeltifyConfig {
            max_linear_deltification: 16,
            max_deltification_walk: 1023,
        };
        // A count whose skip distance exceeds 1023 should abandon.
        let count = 1 << 20;
        assert_eq!(choose_base(count, &cfg), DeltaBaseChoice::Abandon);
    }

    #[test]
    fn chain_bound_detects_excess() {
        let cfg = DeltifyConfig::default();
        assert!(!chain_length_exceeds_bound(34, &cfg));
        assert!(chain_length_exceeds_bound(35, &cfg));
    }
}
