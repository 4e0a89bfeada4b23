use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use tracing::debug;

use super::types::{ActionProposal, FusedAction, GameStateSnapshot};

const THREAT_THRESHOLD: f32 = 0.7;
const OPPORTUNITY_THRESHOLD: f32 = 0.6;

/// Proposals gathered from the competing agents for one frame. Any agent
/// may have failed for this frame, hence the options.
#[derive(Debug, Clone, Default)]
pub struct ProposalSet {
    pub value_based: Option<ActionProposal>,
    pub policy_gradient: Option<ActionProposal>,
    pub rule_based: Option<ActionProposal>,
}

/// Arbitration between the three decision sources.
///
/// Deterministic except for the exploration branch, which picks uniformly
/// between the two learning agents; the RNG is injected so tests can seed it.
pub struct FusionPolicy {
    rng: Mutex<StdRng>,
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl FusionPolicy {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Never returns an absent action: if the designated proposal is missing
    /// the result degrades to a low-confidence Wait.
    pub fn fuse(&self, snapshot: &GameStateSnapshot, proposals: &ProposalSet) -> FusedAction {
        // Safety first: a frame can be both threatening and rewarding, and
        // the threat check wins.
        let chosen = if snapshot.threat_level > THREAT_THRESHOLD {
            debug!(
                "frame {}: threat {:.2}, taking rule-based proposal",
                snapshot.frame_id, snapshot.threat_level
            );
            proposals.rule_based.as_ref()
        } else if snapshot.opportunity_level > OPPORTUNITY_THRESHOLD {
            let take_value = {
                let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                rng.random_bool(0.5)
            };
            debug!(
                "frame {}: opportunity {:.2}, exploring with {}",
                snapshot.frame_id,
                snapshot.opportunity_level,
                if take_value { "value-based" } else { "policy-gradient" }
            );
            if take_value {
                proposals
                    .value_based
                    .as_ref()
                    .or(proposals.policy_gradient.as_ref())
            } else {
                proposals
                    .policy_gradient
                    .as_ref()
                    .or(proposals.value_based.as_ref())
            }
        } else {
            proposals.rule_based.as_ref()
        };

        match chosen {
            Some(proposal) => FusedAction::from_proposal(proposal, snapshot),
            None => FusedAction::wait_fallback(snapshot),
        }
    }
}
