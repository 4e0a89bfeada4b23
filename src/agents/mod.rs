pub mod policy;
pub mod rule_based;
pub mod value;

use std::sync::Arc;

use crate::error::PipelineError;
use crate::pipeline::types::{ActionProposal, GameStateSnapshot};

pub use policy::PolicyGradientAgent;
pub use rule_based::RuleBasedAgent;
pub use value::ValueAgent;

/// A decision source competing for the current frame.
pub trait Agent: Send + Sync {
    fn name(&self) -> &'static str;

    /// Propose an action for the snapshot. An error here drops this agent's
    /// proposal for the frame, never the frame itself.
    fn propose_action(&self, snapshot: &GameStateSnapshot) -> Result<ActionProposal, PipelineError>;

    /// Feed back the reward for the agent's most recent proposal. Returns
    /// the training loss (0.0 for non-learning agents).
    fn train_step(&self, reward: f32) -> f32;
}

/// The rule-based agent additionally exposes a strategy-update hook that the
/// execution stage calls with every reward.
pub trait StrategyAgent: Agent {
    fn update_strategy(&self, reward: f32);
}

/// The three decision sources the fusion policy arbitrates between.
#[derive(Clone)]
pub struct AgentSet {
    pub value_based: Arc<dyn Agent>,
    pub policy_gradient: Arc<dyn Agent>,
    pub rule_based: Arc<dyn StrategyAgent>,
}

impl AgentSet {
    pub fn all(&self) -> [&dyn Agent; 3] {
        [
            self.value_based.as_ref(),
            self.policy_gradient.as_ref(),
            self.rule_based.as_ref() as &dyn Agent,
        ]
    }
}
