pub mod action;
pub mod frame;
pub mod snapshot;

pub use action::{ActionKind, ActionProposal, FusedAction, ProposalSource};
pub use frame::{BoundingBox, DetectedObject, Frame, Point};
pub use snapshot::GameStateSnapshot;
