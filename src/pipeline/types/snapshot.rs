use std::time::Instant;

use super::frame::{DetectedObject, Frame};

/// Per-frame view of the game derived from the detection output.
///
/// Read by every agent call within one inference job, so it is strictly
/// replace-not-mutate: built once, shared behind `Arc`, no `&mut` API.
#[derive(Debug, Clone)]
pub struct GameStateSnapshot {
    pub frame_id: u64,
    pub object_count: usize,
    pub threat_level: f32,
    pub opportunity_level: f32,
    pub health_level: f32,
    pub captured_at: Instant,
}

impl GameStateSnapshot {
    pub fn from_detections(frame: &Frame, objects: &[DetectedObject]) -> Self {
        let mut threat = 0.0f32;
        let mut opportunity = 0.0f32;
        let mut health = 1.0f32;

        for object in objects {
            let confidence = object.confidence.clamp(0.0, 1.0);
            match object.label.as_str() {
                "enemy" | "boss" | "trap" | "projectile" => threat = threat.max(confidence),
                "item" | "coin" | "chest" | "exit" | "powerup" => {
                    opportunity = opportunity.max(confidence)
                }
                // The health bar detector reports fill ratio as confidence.
                "health_bar" => health = confidence,
                _ => {}
            }
        }

        Self {
            frame_id: frame.id,
            object_count: objects.len(),
            threat_level: threat,
            opportunity_level: opportunity,
            health_level: health,
            captured_at: frame.captured_at,
        }
    }

    /// Flattened feature vector handed to the agents and the stack backends.
    pub fn to_state_vector(&self) -> Vec<f32> {
        vec![
            self.object_count as f32,
            self.threat_level,
            self.opportunity_level,
            self.health_level,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::frame::BoundingBox;

    fn object(label: &str, confidence: f32) -> DetectedObject {
        DetectedObject {
            label: label.to_string(),
            confidence,
            bounds: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
        }
    }

    #[test]
    fn derives_levels_from_labels() {
        let frame = Frame::new(7, 1, 1, vec![0]);
        let objects = vec![
            object("enemy", 0.9),
            object("coin", 0.4),
            object("health_bar", 0.5),
            object("scenery", 1.0),
        ];
        let snapshot = GameStateSnapshot::from_detections(&frame, &objects);
        assert_eq!(snapshot.frame_id, 7);
        assert_eq!(snapshot.object_count, 4);
        assert!((snapshot.threat_level - 0.9).abs() < f32::EPSILON);
        assert!((snapshot.opportunity_level - 0.4).abs() < f32::EPSILON);
        assert!((snapshot.health_level - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_detections_read_as_calm() {
        let frame = Frame::new(1, 1, 1, vec![0]);
        let snapshot = GameStateSnapshot::from_detections(&frame, &[]);
        assert_eq!(snapshot.object_count, 0);
        assert_eq!(snapshot.threat_level, 0.0);
        assert_eq!(snapshot.health_level, 1.0);
    }
}
