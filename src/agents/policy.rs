use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::debug;

use super::Agent;
use crate::error::PipelineError;
use crate::pipeline::types::{ActionKind, ActionProposal, GameStateSnapshot, ProposalSource};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PolicyWeights {
    // Unnormalized action preferences (logits), one per action kind.
    action_logits: Vec<f32>,
}

impl PolicyWeights {
    fn new_default() -> Self {
        Self {
            action_logits: vec![0.0; ActionKind::ALL.len()],
        }
    }

    fn to_probabilities(&self) -> Vec<f32> {
        let count = self.action_logits.len();
        if count == 0 {
            return Vec::new();
        }
        // Softmax with the peak logit subtracted so the exponents stay
        // bounded even at the +-5 clamp.
        let peak = self
            .action_logits
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = self
            .action_logits
            .iter()
            .map(|&logit| (logit - peak).exp())
            .collect();
        let total: f32 = exps.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            // Degenerate logits give every action an even chance.
            return vec![1.0 / count as f32; count];
        }
        exps.into_iter().map(|e| e / total).collect()
    }
}

struct PolicyState {
    weights: PolicyWeights,
    rng: StdRng,
    last_action: Option<usize>,
    last_probability: f32,
}

/// Policy-gradient decision source: softmax preferences over action kinds
/// with small clamped online updates and best-effort JSON persistence.
pub struct PolicyGradientAgent {
    state: Mutex<PolicyState>,
    path: String,
}

impl PolicyGradientAgent {
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_seed(path, rand::random())
    }

    pub fn with_seed(path: impl Into<String>, seed: u64) -> Self {
        let path = path.into();
        // Best-effort load from disk
        let weights = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<PolicyWeights>(&bytes)
                .unwrap_or_else(|_| PolicyWeights::new_default()),
            Err(_) => PolicyWeights::new_default(),
        };
        Self {
            state: Mutex::new(PolicyState {
                weights,
                rng: StdRng::seed_from_u64(seed),
                last_action: None,
                last_probability: 0.0,
            }),
            path,
        }
    }

    pub fn save_now_blocking(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Ok(bytes) = serde_json::to_vec_pretty(&state.weights) {
            let _ = std::fs::write(&self.path, bytes);
        }
    }

    // Nudge the last sampled action's logit by a clamped step. A stand-in
    // for a full policy-gradient update, matching the online-update shape.
    fn nudge(state: &mut PolicyState, advantage: f32) {
        let Some(index) = state.last_action else {
            return;
        };
        if index >= state.weights.action_logits.len() {
            return;
        }
        let step_size = 0.01f32;
        let capped = advantage.clamp(-1.0, 1.0);
        state.weights.action_logits[index] =
            (state.weights.action_logits[index] + step_size * capped).clamp(-5.0, 5.0);
    }
}

impl Agent for PolicyGradientAgent {
    fn name(&self) -> &'static str {
        "policy_gradient"
    }

    fn propose_action(&self, snapshot: &GameStateSnapshot) -> Result<ActionProposal, PipelineError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let probs = state.weights.to_probabilities();
        let dist = WeightedIndex::new(&probs)
            .map_err(|e| PipelineError::Agent("policy_gradient", e.to_string()))?;
        let index = dist.sample(&mut state.rng);
        state.last_action = Some(index);
        state.last_probability = probs[index];

        let kind = ActionKind::ALL[index];
        debug!(
            "frame {}: policy proposes {} (p={:.3})",
            snapshot.frame_id,
            kind.name(),
            probs[index]
        );
        Ok(ActionProposal::new(
            kind,
            None,
            probs[index],
            ProposalSource::PolicyGradient,
        ))
    }

    fn train_step(&self, reward: f32) -> f32 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let probability = state.last_probability.max(1e-6);
        Self::nudge(&mut state, reward);
        // REINFORCE-style surrogate loss for the single sampled action.
        -reward * probability.ln()
    }
}
