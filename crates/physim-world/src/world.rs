//! The world: one engine, one event bus and the fixed-step loop.

use crate::event::{ConnectionId, EntityRef, Event, EventBus, EventKind};
use crate::loader::{self, Created};
use crate::snapshot::WorldSnapshot;
use crate::{Result, WorldError};
use physim_engine::{BodyId, EngineConfig, JointId, PhysicsEngine, ShapeId, StepReport};
use physim_scene::Element;
use std::path::Path;

/// A simulated world.
///
/// Lifecycle: [`World::load`] (or [`World::new`] plus `add_*`), then
/// [`World::init`], then any number of [`World::step`]s, then
/// [`World::fini`]. Every step runs the solver, publishes pose changes and
/// recasts sensors, bracketed by `WorldStepStart`/`WorldStepEnd` events.
#[derive(Debug)]
pub struct World {
    name: String,
    engine: PhysicsEngine,
    bus: EventBus,
    initialized: bool,
    paused: bool,
    stopped: bool,
}

impl World {
    /// Empty world with its own engine.
    pub fn new(name: &str, config: EngineConfig) -> Result<Self> {
        let engine = PhysicsEngine::new(config)?;
        tracing::debug!("Created world {} on {}", name, engine.id());
        Ok(Self {
            name: name.to_string(),
            engine,
            bus: EventBus::new(),
            initialized: false,
            paused: false,
            stopped: false,
        })
    }

    /// Build a world from a `<world>` element. Any failure aborts the load;
    /// nothing has been stepped yet.
    pub fn load(el: &Element) -> Result<Self> {
        let (name, config) = loader::read_header(el)?;
        let mut world = Self::new(&name, config)?;
        for link in el.children_named("link") {
            world.add_link(link)?;
        }
        for joint in el.children_named("joint") {
            world.add_joint(joint)?;
        }
        tracing::debug!(
            "Loaded world {}: {} bodies, {} joints, {} shapes",
            world.name,
            world.engine.body_count(),
            world.engine.joint_count(),
            world.engine.shape_count()
        );
        Ok(world)
    }

    pub fn from_xml_str(xml: &str) -> Result<Self> {
        Self::load(&Element::from_xml_str(xml)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(&Element::from_file(path)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine(&self) -> &PhysicsEngine {
        &self.engine
    }

    /// Direct engine access for entity-level operations. Pose changes made
    /// here are published on the next step.
    pub fn engine_mut(&mut self) -> &mut PhysicsEngine {
        &mut self.engine
    }

    pub fn sim_time(&self) -> f64 {
        self.engine.sim_time()
    }

    pub fn iterations(&self) -> u64 {
        self.engine.iterations()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn subscribe<F>(&mut self, kind: EventKind, callback: F) -> ConnectionId
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.bus.subscribe(kind, callback)
    }

    pub fn subscribe_all<F>(&mut self, callback: F) -> ConnectionId
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.bus.subscribe_all(callback)
    }

    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        self.bus.disconnect(id)
    }

    fn check_running(&self, operation: &str) -> Result<()> {
        if self.stopped || self.engine.is_finalized() {
            return Err(WorldError::InvalidState(format!(
                "{operation} on stopped world {}",
                self.name
            )));
        }
        Ok(())
    }

    fn announce(&mut self, created: Vec<Created>) -> Result<()> {
        for (entity, name) in created {
            if let (EntityRef::Shape(id), true) = (entity, self.initialized) {
                self.engine.shape_mut(id)?.init()?;
            }
            self.bus.publish(&Event::EntityCreated { entity, name });
        }
        Ok(())
    }

    /// Add a `<link>` with its collisions. Shapes added after
    /// [`World::init`] are initialized immediately.
    pub fn add_link(&mut self, el: &Element) -> Result<BodyId> {
        self.check_running("add_link")?;
        let created = loader::load_link(&mut self.engine, el)?;
        let body = match created.first() {
            Some((EntityRef::Body(id), _)) => *id,
            _ => {
                return Err(WorldError::InvalidState(
                    "link load created no body".to_string(),
                ))
            }
        };
        self.announce(created)?;
        Ok(body)
    }

    /// Add and attach a `<joint>`; its links must already exist.
    pub fn add_joint(&mut self, el: &Element) -> Result<JointId> {
        self.check_running("add_joint")?;
        let (id, name) = loader::load_joint(&mut self.engine, el)?;
        self.announce(vec![(EntityRef::Joint(id), name)])?;
        Ok(id)
    }

    /// Remove a body with its shapes and incident joints.
    pub fn remove_body(&mut self, id: BodyId) -> Result<()> {
        let body = self.engine.body(id)?;
        let mut deleted: Vec<Created> = Vec::new();
        for joint in body.joints() {
            deleted.push((EntityRef::Joint(joint), self.engine.joint(joint)?.name().to_string()));
        }
        for shape in body.shapes() {
            deleted.push((EntityRef::Shape(*shape), self.engine.shape(*shape)?.name().to_string()));
        }
        deleted.push((EntityRef::Body(id), body.name().to_string()));
        self.engine.destroy_body(id)?;
        self.publish_deleted(deleted);
        Ok(())
    }

    pub fn remove_joint(&mut self, id: JointId) -> Result<()> {
        let name = self.engine.joint(id)?.name().to_string();
        self.engine.destroy_joint(id)?;
        self.publish_deleted(vec![(EntityRef::Joint(id), name)]);
        Ok(())
    }

    pub fn remove_shape(&mut self, id: ShapeId) -> Result<()> {
        let name = self.engine.shape(id)?.name().to_string();
        self.engine.destroy_shape(id)?;
        self.publish_deleted(vec![(EntityRef::Shape(id), name)]);
        Ok(())
    }

    fn publish_deleted(&mut self, deleted: Vec<Created>) {
        for (entity, name) in deleted {
            self.bus.publish(&Event::EntityDeleted { entity, name });
        }
    }

    /// Initialize every shape (ray fans generate their rays) and take the
    /// first sensor readings. Announces the world to subscribers.
    pub fn init(&mut self) -> Result<()> {
        self.check_running("init")?;
        if self.initialized {
            return Ok(());
        }
        let pending: Vec<ShapeId> = self
            .engine
            .shapes()
            .filter(|s| !s.is_initialized())
            .map(|s| s.id())
            .collect();
        for id in pending {
            self.engine.shape_mut(id)?.init()?;
        }
        self.engine.update_sensors()?;
        self.initialized = true;
        self.bus.publish(&Event::WorldCreated {
            name: self.name.clone(),
        });
        Ok(())
    }

    /// Advance one fixed step of `max_step_size`. Returns `None` while paused.
    ///
    /// On solver divergence the step fails after `WorldStepStart` and no
    /// `WorldStepEnd` is published; the caller decides whether to continue.
    pub fn step(&mut self) -> Result<Option<StepReport>> {
        self.check_steppable()?;
        if self.paused {
            return Ok(None);
        }
        self.advance().map(Some)
    }

    /// Advance exactly one step, even while paused, and announce it with
    /// `Stepped` after `WorldStepEnd`.
    pub fn step_once(&mut self) -> Result<StepReport> {
        self.check_steppable()?;
        let report = self.advance()?;
        tracing::debug!("World {} single-stepped to {}", self.name, report.iteration);
        self.bus.publish(&Event::Stepped {
            iteration: report.iteration,
            sim_time: report.sim_time,
        });
        Ok(report)
    }

    fn check_steppable(&self) -> Result<()> {
        self.check_running("step")?;
        if !self.initialized {
            return Err(WorldError::InvalidState(format!(
                "world {} is not initialized",
                self.name
            )));
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<StepReport> {
        self.bus.publish(&Event::WorldStepStart {
            iteration: self.engine.iterations() + 1,
            sim_time: self.engine.sim_time(),
        });

        let dt = self.engine.config().max_step_size;
        let report = self.engine.step(dt)?;
        for &body in &report.moved {
            let pose = self.engine.world_pose(body)?;
            self.bus.publish(&Event::PoseChanged { body, pose });
        }
        self.engine.update_sensors()?;

        self.bus.publish(&Event::WorldStepEnd {
            iteration: report.iteration,
            sim_time: report.sim_time,
        });
        Ok(report)
    }

    /// Step up to `steps` times. Returns the number of steps taken, which is
    /// lower when the world is paused.
    pub fn run(&mut self, steps: u64) -> Result<u64> {
        for taken in 0..steps {
            if self.step()?.is_none() {
                return Ok(taken);
            }
        }
        Ok(steps)
    }

    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            self.paused = paused;
            tracing::debug!("World {} paused={}", self.name, paused);
            self.bus.publish(&Event::Paused { paused });
        }
    }

    /// Stop the loop for good. Further steps fail.
    pub fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.bus.publish(&Event::Stopped);
        }
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot::capture(&self.name, &self.engine)
    }

    /// Serialize the current scene: physics config, links with their
    /// collisions, then joints.
    pub fn to_element(&self) -> Result<Element> {
        let mut el = Element::new("world")
            .with_attr("name", self.name.as_str())
            .with_child(self.engine.config().to_element());
        for body in self.engine.bodies() {
            let mut link = body.to_element();
            for shape in body.shapes() {
                link = link.with_child(self.engine.shape(*shape)?.to_element());
            }
            el = el.with_child(link);
        }
        for joint in self.engine.joints() {
            el = el.with_child(joint.to_element());
        }
        Ok(el)
    }

    /// Tear down: publishes a deletion for every entity, then releases the
    /// engine (joints, shapes, bodies, native world). Idempotent.
    pub fn fini(&mut self) {
        if self.engine.is_finalized() {
            return;
        }
        let mut deleted: Vec<Created> = Vec::new();
        deleted.extend(
            self.engine
                .joints()
                .map(|j| (EntityRef::Joint(j.id()), j.name().to_string())),
        );
        deleted.extend(
            self.engine
                .shapes()
                .map(|s| (EntityRef::Shape(s.id()), s.name().to_string())),
        );
        deleted.extend(
            self.engine
                .bodies()
                .map(|b| (EntityRef::Body(b.id()), b.name().to_string())),
        );
        self.engine.fini();
        self.publish_deleted(deleted);
        self.stop();
        tracing::debug!("Finalized world {}", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use physim_engine::PhysicsError;
    use std::sync::{Arc, Mutex};

    const SCENE: &str = r#"
        <world name="lab">
          <physics type="sequential_impulse">
            <max_step_size>0.01</max_step_size>
          </physics>
          <link name="ground">
            <collision name="floor"><geometry><plane><normal>0 0 1</normal></plane></geometry></collision>
          </link>
          <link name="ball">
            <pose>0 0 2 0 0 0</pose>
            <inertial><mass>1</mass></inertial>
            <collision name="shell"><geometry><sphere><radius>0.1</radius></sphere></geometry></collision>
          </link>
          <link name="mast">
            <pose>-3 0 2 0 0 0</pose>
            <collision name="lidar">
              <geometry><ray>
                <scan><horizontal><samples>3</samples><min_angle>-0.1</min_angle><max_angle>0.1</max_angle></horizontal></scan>
                <range><min>0.05</min><max>10</max></range>
              </ray></geometry>
            </collision>
          </link>
          <joint name="pin" type="fixed"><parent>world</parent><child>mast</child></joint>
        </world>"#;

    fn recorded(world: &mut World) -> Arc<Mutex<Vec<Event>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        world.subscribe_all(move |e| sink.lock().unwrap().push(e.clone()));
        log
    }

    #[test]
    fn test_load_scene() {
        let world = World::from_xml_str(SCENE).unwrap();
        assert_eq!(world.name(), "lab");
        assert_eq!(world.engine().body_count(), 3);
        assert_eq!(world.engine().shape_count(), 3);
        assert_eq!(world.engine().joint_count(), 1);
        assert!(!world.is_initialized());
    }

    #[test]
    fn test_load_rejects_bad_backend() {
        let xml = r#"<world><physics type="quantum"/></world>"#;
        assert!(matches!(
            World::from_xml_str(xml),
            Err(WorldError::Physics(PhysicsError::BackendInit(_)))
        ));
    }

    #[test]
    fn test_step_requires_init() {
        let mut world = World::from_xml_str(SCENE).unwrap();
        assert!(matches!(world.step(), Err(WorldError::InvalidState(_))));
        world.init().unwrap();
        assert!(world.step().unwrap().is_some());
    }

    #[test]
    fn test_step_events_bracket_pose_changes() {
        let mut world = World::from_xml_str(SCENE).unwrap();
        world.init().unwrap();
        let log = recorded(&mut world);
        world.step().unwrap();

        let events = log.lock().unwrap();
        let kinds: Vec<EventKind> = events.iter().map(Event::kind).collect();
        assert_eq!(kinds.first(), Some(&EventKind::WorldStepStart));
        assert_eq!(kinds.last(), Some(&EventKind::WorldStepEnd));
        let ball = world.engine().body_by_name("ball").unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::PoseChanged { body, .. } if *body == ball)));
        match (&events[0], &events[events.len() - 1]) {
            (
                Event::WorldStepStart { iteration: a, sim_time: t0 },
                Event::WorldStepEnd { iteration: b, sim_time: t1 },
            ) => {
                assert_eq!((*a, *b), (1, 1));
                assert_eq!(*t0, 0.0);
                assert_relative_eq!(*t1, 0.01);
            }
            other => panic!("unexpected bracket {other:?}"),
        }
    }

    #[test]
    fn test_pause_and_stop() {
        let mut world = World::from_xml_str(SCENE).unwrap();
        world.init().unwrap();
        let log = recorded(&mut world);

        world.set_paused(true);
        world.set_paused(true);
        assert_eq!(world.run(10).unwrap(), 0);
        assert_eq!(world.iterations(), 0);
        world.set_paused(false);
        assert_eq!(world.run(3).unwrap(), 3);

        world.stop();
        assert!(matches!(world.step(), Err(WorldError::InvalidState(_))));
        let kinds: Vec<EventKind> = log.lock().unwrap().iter().map(Event::kind).collect();
        assert_eq!(kinds.iter().filter(|k| **k == EventKind::Paused).count(), 2);
        assert_eq!(kinds.last(), Some(&EventKind::Stopped));
    }

    #[test]
    fn test_single_step_while_paused() {
        let mut world = World::from_xml_str(SCENE).unwrap();
        assert!(matches!(world.step_once(), Err(WorldError::InvalidState(_))));
        world.init().unwrap();
        world.set_paused(true);
        let log = recorded(&mut world);

        let report = world.step_once().unwrap();
        assert_eq!(report.iteration, 1);
        assert_eq!(world.iterations(), 1);
        assert!(world.is_paused());
        assert!(world.step().unwrap().is_none());

        let events = log.lock().unwrap();
        let kinds: Vec<EventKind> = events.iter().map(Event::kind).collect();
        assert_eq!(kinds.first(), Some(&EventKind::WorldStepStart));
        assert_eq!(
            &kinds[kinds.len() - 2..],
            &[EventKind::WorldStepEnd, EventKind::Stepped]
        );
        match events.last() {
            Some(Event::Stepped { iteration, sim_time }) => {
                assert_eq!(*iteration, 1);
                assert_relative_eq!(*sim_time, 0.01);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_negative_damping_rejected_at_load() {
        let xml = r#"<world><link name="b"><damping><linear>-1000</linear></damping></link></world>"#;
        assert!(matches!(
            World::from_xml_str(xml),
            Err(WorldError::Physics(PhysicsError::Configuration(_)))
        ));
    }

    #[test]
    fn test_sensor_sees_ball() {
        let mut world = World::from_xml_str(SCENE).unwrap();
        world.init().unwrap();
        let snapshot = world.snapshot();
        let lidar = &snapshot.ray_fans[0];
        assert_eq!(lidar.name, "lidar");
        // Middle ray points at the ball 3 m away; radius 0.1.
        assert_relative_eq!(lidar.ranges[1], 2.9, epsilon = 1e-6);

        world.run(5).unwrap();
        let snapshot = world.snapshot();
        assert_eq!(snapshot.iteration, 5);
        assert!(snapshot.body("ball").unwrap().pose.translation.z < 2.0);
    }

    #[test]
    fn test_runtime_add_and_remove() {
        let mut world = World::from_xml_str(SCENE).unwrap();
        world.init().unwrap();
        let log = recorded(&mut world);

        let el = Element::from_xml_str(
            r#"<link name="crate"><collision name="box"><geometry><box><size>1 1 1</size></box></geometry></collision></link>"#,
        )
        .unwrap();
        let id = world.add_link(&el).unwrap();
        let shape = world.engine().body(id).unwrap().shapes()[0];
        assert!(world.engine().shape(shape).unwrap().is_initialized());

        world.remove_body(id).unwrap();
        let events = log.lock().unwrap();
        assert_eq!(
            events.iter().map(Event::kind).collect::<Vec<_>>(),
            vec![
                EventKind::EntityCreated,
                EventKind::EntityCreated,
                EventKind::EntityDeleted,
                EventKind::EntityDeleted,
            ]
        );
        assert!(matches!(
            &events[3],
            Event::EntityDeleted { entity: EntityRef::Body(b), .. } if *b == id
        ));
    }

    #[test]
    fn test_scene_round_trip() {
        let world = World::from_xml_str(SCENE).unwrap();
        let xml = world.to_element().unwrap().to_xml_string().unwrap();
        let again = World::from_xml_str(&xml).unwrap();
        assert_eq!(again.name(), "lab");
        assert_eq!(again.engine().body_count(), 3);
        assert_eq!(again.engine().shape_count(), 3);
        assert_eq!(again.engine().joint_count(), 1);
        assert_eq!(again.engine().config(), world.engine().config());
    }

    #[test]
    fn test_fini_releases_and_announces() {
        let mut world = World::from_xml_str(SCENE).unwrap();
        world.init().unwrap();
        let log = recorded(&mut world);
        world.fini();
        world.fini();

        assert_eq!(world.engine().native_counts(), (0, 0, 0));
        let deleted = log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == EventKind::EntityDeleted)
            .count();
        assert_eq!(deleted, 7);
        assert!(world.is_stopped());
    }
}
