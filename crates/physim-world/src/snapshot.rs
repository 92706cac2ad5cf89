//! Observable world state for external collaborators.

use crate::Result;
use physim_engine::{BodyId, PhysicsEngine, ShapeId};
use physim_math::{Pose, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Motion state of one body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodySnapshot {
    pub id: BodyId,
    pub name: String,
    /// Link pose in the world frame.
    pub pose: Pose,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
}

/// Latest readings of one ray fan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RayFanSnapshot {
    pub shape: ShapeId,
    pub name: String,
    pub ranges: Vec<f64>,
    pub retros: Vec<f64>,
    pub fiducials: Vec<i32>,
}

/// Everything observable after a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub world: String,
    pub iteration: u64,
    pub sim_time: f64,
    pub bodies: Vec<BodySnapshot>,
    pub ray_fans: Vec<RayFanSnapshot>,
}

impl WorldSnapshot {
    /// Capture the current state of `engine`. Bodies and fans are listed in
    /// identifier order.
    pub fn capture(world: &str, engine: &PhysicsEngine) -> Self {
        let bodies = engine
            .bodies()
            .map(|b| BodySnapshot {
                id: b.id(),
                name: b.name().to_string(),
                pose: *b.world_pose(),
                linear_velocity: b.linear_velocity(),
                angular_velocity: b.angular_velocity(),
            })
            .collect();
        let ray_fans = engine
            .shapes()
            .filter_map(|s| {
                let fan = s.ray_fan()?;
                let readings = fan.readings();
                Some(RayFanSnapshot {
                    shape: s.id(),
                    name: s.name().to_string(),
                    ranges: readings.iter().map(|r| r.length).collect(),
                    retros: readings.iter().map(|r| r.retro).collect(),
                    fiducials: readings.iter().map(|r| r.fiducial).collect(),
                })
            })
            .collect();
        Self {
            world: world.to_string(),
            iteration: engine.iterations(),
            sim_time: engine.sim_time(),
            bodies,
            ray_fans,
        }
    }

    pub fn body(&self, name: &str) -> Option<&BodySnapshot> {
        self.bodies.iter().find(|b| b.name == name)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Accumulates snapshots over a run.
#[derive(Debug, Clone, Default)]
pub struct SnapshotRecorder {
    pub snapshots: Vec<WorldSnapshot>,
}

impl SnapshotRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, snapshot: WorldSnapshot) {
        self.snapshots.push(snapshot);
    }

    /// Number of snapshots recorded.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshots)?)
    }

    /// Flatten into per-series columns for analysis tools.
    ///
    /// Keys: `time` (one value per snapshot), `<body>.position` and
    /// `<body>.linear_velocity` (three per snapshot in which the body exists).
    pub fn to_flat_dict(&self) -> HashMap<String, Vec<f64>> {
        let mut dict: HashMap<String, Vec<f64>> = HashMap::new();
        dict.insert(
            "time".to_string(),
            self.snapshots.iter().map(|s| s.sim_time).collect(),
        );
        for snapshot in &self.snapshots {
            for body in &snapshot.bodies {
                let p = body.pose.translation.vector;
                dict.entry(format!("{}.position", body.name))
                    .or_default()
                    .extend(p.iter());
                dict.entry(format!("{}.linear_velocity", body.name))
                    .or_default()
                    .extend(body.linear_velocity.iter());
            }
        }
        dict
    }

    pub fn stats(&self) -> RecordingStats {
        let (Some(first), Some(last)) = (self.snapshots.first(), self.snapshots.last()) else {
            return RecordingStats::default();
        };
        RecordingStats {
            nsnapshots: self.snapshots.len(),
            nbodies: last.bodies.len(),
            nray_fans: last.ray_fans.len(),
            duration: last.sim_time - first.sim_time,
        }
    }
}

/// Statistics about a recording.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingStats {
    pub nsnapshots: usize,
    /// Bodies in the latest snapshot.
    pub nbodies: usize,
    pub nray_fans: usize,
    /// Simulated time covered (s).
    pub duration: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use physim_engine::{BackendKind, EngineConfig};
    use physim_scene::Element;

    fn engine_with_body() -> (PhysicsEngine, BodyId) {
        let mut engine =
            PhysicsEngine::new(EngineConfig::with_backend(BackendKind::SequentialImpulse)).unwrap();
        let body = engine.create_body("ball").unwrap();
        let link = Element::new("link")
            .with_child(Element::new("inertial").with_value("mass", 1.0));
        engine.body_mut(body).unwrap().load(&link).unwrap();
        (engine, body)
    }

    fn recording(steps: usize) -> SnapshotRecorder {
        let (mut engine, _) = engine_with_body();
        let mut recorder = SnapshotRecorder::new();
        recorder.record(WorldSnapshot::capture("w", &engine));
        for _ in 0..steps {
            engine.step(0.01).unwrap();
            recorder.record(WorldSnapshot::capture("w", &engine));
        }
        recorder
    }

    #[test]
    fn test_capture() {
        let (mut engine, body) = engine_with_body();
        engine.step(0.01).unwrap();
        let snapshot = WorldSnapshot::capture("w", &engine);
        assert_eq!(snapshot.iteration, 1);
        assert_eq!(snapshot.bodies.len(), 1);
        let ball = snapshot.body("ball").unwrap();
        assert_eq!(ball.id, body);
        assert!(ball.linear_velocity.z < 0.0);
        assert!(snapshot.ray_fans.is_empty());
    }

    #[test]
    fn test_snapshot_json() {
        let (engine, _) = engine_with_body();
        let json = WorldSnapshot::capture("w", &engine).to_json().unwrap();
        assert!(json.contains("\"ball\""));
        let back: WorldSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bodies[0].name, "ball");
    }

    #[test]
    fn test_recorder_stats() {
        let recorder = recording(4);
        assert_eq!(recorder.len(), 5);
        let stats = recorder.stats();
        assert_eq!(stats.nsnapshots, 5);
        assert_eq!(stats.nbodies, 1);
        assert!((stats.duration - 0.04).abs() < 1e-12);
        assert_eq!(SnapshotRecorder::new().stats(), RecordingStats::default());
    }

    #[test]
    fn test_recorder_flat_dict() {
        let recorder = recording(2);
        let dict = recorder.to_flat_dict();
        assert_eq!(dict["time"].len(), 3);
        assert_eq!(dict["ball.position"].len(), 9);
        assert_eq!(dict["ball.linear_velocity"].len(), 9);
    }

    #[test]
    fn test_recorder_clear() {
        let mut recorder = recording(1);
        assert!(recorder.to_json().unwrap().starts_with('['));
        recorder.clear();
        assert!(recorder.is_empty());
    }
}
