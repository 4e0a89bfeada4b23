use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

use super::{Agent, StrategyAgent};
use crate::error::PipelineError;
use crate::pipeline::types::{ActionKind, ActionProposal, GameStateSnapshot, ProposalSource};

const HISTORY_CAPACITY: usize = 200;

pub struct ActionRule {
    pub condition: Box<dyn Fn(&GameStateSnapshot) -> bool + Send + Sync>,
    pub kind: ActionKind,
    pub priority: u8,
    pub confidence: f32,
    pub description: &'static str,
}

#[derive(Debug, Clone)]
pub struct StrategyStats {
    pub total_rewards: usize,
    pub positive_rewards: usize,
    pub success_rate: f32,
    pub caution: f32,
}

struct RuleState {
    // Raises with sustained negative reward; a cautious strategy prefers
    // defensive rules over opportunistic ones.
    caution: f32,
    reward_history: VecDeque<f32>,
}

/// Deterministic strategy agent: a priority-ordered rule table over the
/// snapshot, plus a bounded reward history that tunes one caution knob.
pub struct RuleBasedAgent {
    rules: Vec<ActionRule>,
    state: Mutex<RuleState>,
}

impl Default for RuleBasedAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleBasedAgent {
    pub fn new() -> Self {
        Self::with_rules(Self::default_rules())
    }

    pub fn with_rules(rules: Vec<ActionRule>) -> Self {
        Self {
            rules,
            state: Mutex::new(RuleState {
                caution: 0.5,
                reward_history: VecDeque::new(),
            }),
        }
    }

    fn default_rules() -> Vec<ActionRule> {
        vec![
            ActionRule {
                condition: Box::new(|s| s.health_level < 0.2),
                kind: ActionKind::Back,
                priority: 100,
                confidence: 0.95,
                description: "retreat when health is critical",
            },
            ActionRule {
                condition: Box::new(|s| s.threat_level > 0.7),
                kind: ActionKind::Swipe,
                priority: 90,
                confidence: 0.9,
                description: "evade under high threat",
            },
            ActionRule {
                condition: Box::new(|s| s.opportunity_level > 0.6),
                kind: ActionKind::Tap,
                priority: 60,
                confidence: 0.8,
                description: "collect a visible reward",
            },
            ActionRule {
                condition: Box::new(|s| s.object_count == 0),
                kind: ActionKind::Wait,
                priority: 10,
                confidence: 0.6,
                description: "nothing on screen, hold position",
            },
            ActionRule {
                condition: Box::new(|_| true),
                kind: ActionKind::Tap,
                priority: 1,
                confidence: 0.5,
                description: "default probe",
            },
        ]
    }

    pub fn strategy_stats(&self) -> StrategyStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let total = state.reward_history.len();
        let positive = state.reward_history.iter().filter(|r| **r > 0.0).count();
        StrategyStats {
            total_rewards: total,
            positive_rewards: positive,
            success_rate: if total > 0 {
                positive as f32 / total as f32
            } else {
                0.0
            },
            caution: state.caution,
        }
    }
}

impl Agent for RuleBasedAgent {
    fn name(&self) -> &'static str {
        "rule_based"
    }

    fn propose_action(&self, snapshot: &GameStateSnapshot) -> Result<ActionProposal, PipelineError> {
        let caution = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.caution
        };

        let matching = || self.rules.iter().filter(|rule| (rule.condition)(snapshot));
        // A cautious strategy ignores low-priority probing rules, unless
        // they are all that matched.
        let rule = matching()
            .filter(|rule| rule.priority >= 50 || caution < 0.8)
            .max_by_key(|rule| rule.priority)
            .or_else(|| matching().max_by_key(|rule| rule.priority))
            .ok_or_else(|| {
                PipelineError::Agent("rule_based", "no rule matched".to_string())
            })?;

        debug!("frame {}: rule fired: {}", snapshot.frame_id, rule.description);
        Ok(ActionProposal::new(
            rule.kind,
            None,
            rule.confidence,
            ProposalSource::RuleBased,
        ))
    }

    fn train_step(&self, _reward: f32) -> f32 {
        // Rules do not learn through gradients.
        0.0
    }
}

impl StrategyAgent for RuleBasedAgent {
    fn update_strategy(&self, reward: f32) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.reward_history.len() == HISTORY_CAPACITY {
            state.reward_history.pop_front();
        }
        state.reward_history.push_back(reward);

        // Sustained punishment makes the strategy defensive, sustained
        // success relaxes it.
        let delta = if reward < 0.0 { 0.05 } else { -0.01 };
        state.caution = (state.caution + delta).clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::Frame;

    fn snapshot(threat: f32, opportunity: f32, health: f32, objects: usize) -> GameStateSnapshot {
        let frame = Frame::new(1, 1, 1, vec![0]);
        GameStateSnapshot {
            frame_id: frame.id,
            object_count: objects,
            threat_level: threat,
            opportunity_level: opportunity,
            health_level: health,
            captured_at: frame.captured_at,
        }
    }

    #[test]
    fn critical_health_outranks_threat() {
        let agent = RuleBasedAgent::new();
        let proposal = agent
            .propose_action(&snapshot(0.9, 0.0, 0.1, 3))
            .expect("proposal failed");
        assert_eq!(proposal.kind, ActionKind::Back);
    }

    #[test]
    fn high_threat_evades() {
        let agent = RuleBasedAgent::new();
        let proposal = agent
            .propose_action(&snapshot(0.8, 0.0, 0.9, 3))
            .expect("proposal failed");
        assert_eq!(proposal.kind, ActionKind::Swipe);
    }

    #[test]
    fn empty_screen_waits() {
        let agent = RuleBasedAgent::new();
        let proposal = agent
            .propose_action(&snapshot(0.0, 0.0, 1.0, 0))
            .expect("proposal failed");
        assert_eq!(proposal.kind, ActionKind::Wait);
    }

    #[test]
    fn always_produces_a_proposal() {
        let agent = RuleBasedAgent::new();
        let proposal = agent
            .propose_action(&snapshot(0.2, 0.2, 0.9, 5))
            .expect("proposal failed");
        assert_eq!(proposal.source, ProposalSource::RuleBased);
    }

    #[test]
    fn negative_rewards_raise_caution() {
        let agent = RuleBasedAgent::new();
        let before = agent.strategy_stats().caution;
        for _ in 0..5 {
            agent.update_strategy(-0.5);
        }
        let stats = agent.strategy_stats();
        assert!(stats.caution > before);
        assert_eq!(stats.total_rewards, 5);
        assert_eq!(stats.positive_rewards, 0);
    }
}
