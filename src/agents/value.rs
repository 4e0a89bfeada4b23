use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::trace;

use super::Agent;
use crate::error::PipelineError;
use crate::pipeline::types::{ActionKind, ActionProposal, GameStateSnapshot, ProposalSource};

type StateBucket = (u8, u8, u8);

struct ValueState {
    q_table: HashMap<StateBucket, [f32; ActionKind::ALL.len()]>,
    rng: StdRng,
    last: Option<(StateBucket, usize)>,
}

/// Value-based decision source: a coarse state-bucketed action-value table
/// with epsilon-greedy proposals and incremental value updates.
pub struct ValueAgent {
    state: Mutex<ValueState>,
    epsilon: f32,
    learning_rate: f32,
}

impl ValueAgent {
    pub fn new() -> Self {
        Self::with_seed(rand::random())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Mutex::new(ValueState {
                q_table: HashMap::new(),
                rng: StdRng::seed_from_u64(seed),
                last: None,
            }),
            epsilon: 0.1,
            learning_rate: 0.1,
        }
    }

    fn bucket(snapshot: &GameStateSnapshot) -> StateBucket {
        let band = |level: f32| ((level.clamp(0.0, 1.0) * 3.0) as u8).min(2);
        (
            band(snapshot.threat_level),
            band(snapshot.opportunity_level),
            band(snapshot.health_level),
        )
    }
}

impl Default for ValueAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Agent for ValueAgent {
    fn name(&self) -> &'static str {
        "value_based"
    }

    fn propose_action(&self, snapshot: &GameStateSnapshot) -> Result<ActionProposal, PipelineError> {
        let bucket = Self::bucket(snapshot);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let explore = state.rng.random::<f32>() < self.epsilon;
        let values = *state.q_table.entry(bucket).or_insert([0.0; ActionKind::ALL.len()]);
        let index = if explore {
            state.rng.random_range(0..ActionKind::ALL.len())
        } else {
            values
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap_or(0)
        };
        state.last = Some((bucket, index));

        let kind = ActionKind::ALL[index];
        // Confidence reflects how much this value stands out in its bucket.
        let spread = values[index] - values.iter().cloned().fold(f32::INFINITY, f32::min);
        let confidence = (0.4 + spread).clamp(0.1, 0.95);
        trace!(
            "frame {}: value agent proposes {} (q={:.3}, explore={})",
            snapshot.frame_id,
            kind.name(),
            values[index],
            explore
        );
        Ok(ActionProposal::new(
            kind,
            None,
            confidence,
            ProposalSource::ValueBased,
        ))
    }

    fn train_step(&self, reward: f32) -> f32 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some((bucket, index)) = state.last else {
            return 0.0;
        };
        let entry = state.q_table.entry(bucket).or_insert([0.0; ActionKind::ALL.len()]);
        let td_error = reward - entry[index];
        entry[index] += self.learning_rate * td_error;
        td_error * td_error
    }
}
