use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::frame::Point;
use super::snapshot::GameStateSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Tap,
    Swipe,
    LongPress,
    Back,
    Wait,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Tap,
        ActionKind::Swipe,
        ActionKind::LongPress,
        ActionKind::Back,
        ActionKind::Wait,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Tap => "tap",
            ActionKind::Swipe => "swipe",
            ActionKind::LongPress => "long_press",
            ActionKind::Back => "back",
            ActionKind::Wait => "wait",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalSource {
    ValueBased,
    PolicyGradient,
    RuleBased,
    Fallback,
}

/// One agent's suggestion for the current frame.
#[derive(Debug, Clone)]
pub struct ActionProposal {
    pub kind: ActionKind,
    pub target: Option<Point>,
    pub confidence: f32,
    pub source: ProposalSource,
}

impl ActionProposal {
    pub fn new(kind: ActionKind, target: Option<Point>, confidence: f32, source: ProposalSource) -> Self {
        Self {
            kind,
            target,
            confidence,
            source,
        }
    }
}

/// The proposal the fusion policy selected, stamped with the originating
/// frame so execution can measure end-to-end latency.
#[derive(Debug, Clone)]
pub struct FusedAction {
    pub kind: ActionKind,
    pub target: Option<Point>,
    pub confidence: f32,
    pub source: ProposalSource,
    pub frame_id: u64,
    pub captured_at: Instant,
}

impl FusedAction {
    pub fn from_proposal(proposal: &ActionProposal, snapshot: &GameStateSnapshot) -> Self {
        Self {
            kind: proposal.kind,
            target: proposal.target,
            confidence: proposal.confidence,
            source: proposal.source,
            frame_id: snapshot.frame_id,
            captured_at: snapshot.captured_at,
        }
    }

    /// Fusion never yields nothing; this is the worst-case output.
    pub fn wait_fallback(snapshot: &GameStateSnapshot) -> Self {
        Self {
            kind: ActionKind::Wait,
            target: None,
            confidence: 0.1,
            source: ProposalSource::Fallback,
            frame_id: snapshot.frame_id,
            captured_at: snapshot.captured_at,
        }
    }
}
