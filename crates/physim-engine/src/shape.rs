//! Collision and sensing shapes.
//!
//! A shape is created unloaded for a fixed [`ShapeKind`], configured from a
//! `<collision>` element, attached to exactly one body and then initialized.
//! Solid and plane shapes get a native record in the back end so they take
//! part in contacts and ray casts; ray fans are sensors only.

use crate::backend::{Backend, NativeShape};
use crate::error::{PhysicsError, Result};
use crate::id::{BodyId, ShapeId};
use crate::ray_shape::RayFan;
use nalgebra::Translation3;
use physim_collision::{AABB, Geometry, RangeSpec, RayFanSpec, ScanAxis};
use physim_math::{MassProperties, Pose, Vec3};
use physim_scene::{Element, SceneError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Shape variant, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Plane,
    Box,
    Sphere,
    Cylinder,
    Compound,
    Ray,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 6] = [
        ShapeKind::Plane,
        ShapeKind::Box,
        ShapeKind::Sphere,
        ShapeKind::Cylinder,
        ShapeKind::Compound,
        ShapeKind::Ray,
    ];

    /// Geometry tag in the scene description.
    pub fn name(&self) -> &'static str {
        match self {
            ShapeKind::Plane => "plane",
            ShapeKind::Box => "box",
            ShapeKind::Sphere => "sphere",
            ShapeKind::Cylinder => "cylinder",
            ShapeKind::Compound => "compound",
            ShapeKind::Ray => "ray",
        }
    }

    /// Operation name reported when a back end cannot simulate this kind.
    pub fn creation(&self) -> &'static str {
        match self {
            ShapeKind::Plane => "plane shapes",
            ShapeKind::Box => "box shapes",
            ShapeKind::Sphere => "sphere shapes",
            ShapeKind::Cylinder => "cylinder shapes",
            ShapeKind::Compound => "compound shapes",
            ShapeKind::Ray => "ray shapes",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShapeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ShapeKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| format!("unknown shape '{s}'"))
    }
}

/// Kind-specific parameters.
#[derive(Debug, Clone, PartialEq)]
enum Params {
    Unloaded,
    Geometry(Geometry),
    Ray(RayFan),
}

/// One shape attached (or about to be attached) to a body.
#[derive(Debug, Clone)]
pub struct Shape {
    id: ShapeId,
    kind: ShapeKind,
    name: String,
    /// Pose relative to the owning link.
    pose: Pose,
    mass: f64,
    /// Plane offset along its normal.
    altitude: f64,
    laser_retro: f64,
    fiducial: i32,
    params: Params,
    pub(crate) body: Option<BodyId>,
    initialized: bool,
    world_pose: Pose,
    bounds: AABB,
    dirty: bool,
}

impl Shape {
    pub(crate) fn new(id: ShapeId, kind: ShapeKind) -> Self {
        Self {
            id,
            kind,
            name: id.to_string(),
            pose: Pose::identity(),
            mass: 0.0,
            altitude: 0.0,
            laser_retro: 0.0,
            fiducial: -1,
            params: Params::Unloaded,
            body: None,
            initialized: false,
            world_pose: Pose::identity(),
            bounds: AABB::empty(),
            dirty: false,
        }
    }

    pub fn id(&self) -> ShapeId {
        self.id
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_loaded(&self) -> bool {
        self.params != Params::Unloaded
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Owning body, if attached.
    pub fn body(&self) -> Option<BodyId> {
        self.body
    }

    /// Pose relative to the owning link.
    pub fn relative_pose(&self) -> &Pose {
        &self.pose
    }

    pub fn world_pose(&self) -> &Pose {
        &self.world_pose
    }

    /// World-axis bounds as of the last pose propagation.
    pub fn bounding_box(&self) -> &AABB {
        &self.bounds
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn laser_retro(&self) -> f64 {
        self.laser_retro
    }

    pub fn fiducial_id(&self) -> i32 {
        self.fiducial
    }

    /// Set by a sensor update, cleared by [`Shape::take_dirty`].
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Collision geometry; `None` for ray fans and unloaded shapes.
    pub fn geometry(&self) -> Option<&Geometry> {
        match &self.params {
            Params::Geometry(g) => Some(g),
            _ => None,
        }
    }

    pub fn ray_fan(&self) -> Option<&RayFan> {
        match &self.params {
            Params::Ray(fan) => Some(fan),
            _ => None,
        }
    }

    fn fan(&self) -> Result<&RayFan> {
        self.ray_fan().ok_or_else(|| {
            PhysicsError::InvalidState(format!("{} is a {} shape, not a ray fan", self.name, self.kind))
        })
    }

    /// Plane normal in the shape frame.
    pub fn normal(&self) -> Result<Vec3> {
        match &self.params {
            Params::Geometry(Geometry::Plane { normal }) => Ok(*normal),
            _ => Err(PhysicsError::InvalidState(format!("{} is not a loaded plane", self.name))),
        }
    }

    /// Plane offset along its normal in the shape frame.
    pub fn altitude(&self) -> Result<f64> {
        self.normal()?;
        Ok(self.altitude)
    }

    /// Shape frame, shifted along the normal by the altitude for planes.
    fn collision_frame(&self) -> Pose {
        match &self.params {
            Params::Geometry(Geometry::Plane { normal }) => {
                self.pose * Translation3::from(normal * self.altitude)
            }
            _ => self.pose,
        }
    }

    /// Mass properties about the link origin, in link coordinates.
    pub fn mass_properties(&self) -> MassProperties {
        match &self.params {
            Params::Geometry(g) => g.mass_properties(self.mass).transformed(&self.pose),
            _ => MassProperties::zero(),
        }
    }

    /// Reading of ray `index`, measured from the sensor origin.
    pub fn range(&self, index: usize) -> Result<f64> {
        self.fan()?.range(index)
    }

    pub fn retro(&self, index: usize) -> Result<f64> {
        self.fan()?.retro(index)
    }

    pub fn fiducial(&self, index: usize) -> Result<i32> {
        self.fan()?.fiducial(index)
    }

    /// Number of rays, zero for other shapes.
    pub fn ray_count(&self) -> usize {
        self.ray_fan().map_or(0, RayFan::ray_count)
    }

    /// Parse a `<collision>` element into a new shape value.
    fn parse(&self, el: &Element) -> Result<Shape> {
        let mut next = self.clone();
        if let Some(name) = el.parse_attr::<String>("name")? {
            next.name = name;
        }
        next.pose = el.value_or("pose", Pose::identity())?;
        next.mass = el.value_or("mass", 0.0)?;
        next.laser_retro = el.value_or("laser_retro", 0.0)?;
        next.fiducial = el.value_or("fiducial", -1)?;
        if next.mass < 0.0 {
            return Err(invalid("mass", next.mass, "non-negative mass"));
        }

        let geometry = el.required_child("geometry")?;
        let body = geometry.required_child(self.kind.name())?;
        next.params = match self.kind {
            ShapeKind::Ray => Params::Ray(RayFan::new(parse_fan(body)?)),
            ShapeKind::Compound => {
                let mut parts = Vec::new();
                for part in body.children_named("part") {
                    let pose = part.value_or("pose", Pose::identity())?;
                    parts.push((pose, parse_solid(part)?));
                }
                if parts.is_empty() {
                    return Err(SceneError::MissingElement {
                        parent: "compound".into(),
                        tag: "part".into(),
                    }
                    .into());
                }
                Params::Geometry(Geometry::Compound { parts })
            }
            kind => Params::Geometry(parse_geometry(kind, body)?),
        };
        next.altitude = match self.kind {
            ShapeKind::Plane => body.value_or("altitude", 0.0)?,
            _ => 0.0,
        };
        if !next.altitude.is_finite() {
            return Err(invalid("altitude", next.altitude, "finite altitude"));
        }
        Ok(next)
    }

    /// Serialize the configured parameters as a `<collision>` element.
    pub fn to_element(&self) -> Element {
        let el = Element::new("collision")
            .with_attr("name", self.name.as_str())
            .with_value("pose", self.pose)
            .with_value("mass", self.mass)
            .with_value("laser_retro", self.laser_retro)
            .with_value("fiducial", self.fiducial);
        let geometry = match &self.params {
            Params::Unloaded => return el,
            Params::Geometry(g @ Geometry::Plane { .. }) => {
                geometry_element(g).with_value("altitude", self.altitude)
            }
            Params::Geometry(g) => geometry_element(g),
            Params::Ray(fan) => fan_element(fan.spec()),
        };
        el.with_child(Element::new("geometry").with_child(geometry))
    }

    /// Recompute the cached world pose and bounds from the link pose.
    pub(crate) fn set_link_pose(&mut self, link: &Pose) {
        self.world_pose = link * self.pose;
        self.bounds = match &self.params {
            Params::Geometry(g) => AABB::from_geometry(g, &self.world_pose),
            Params::Ray(fan) if fan.is_initialized() => fan
                .local_segments()
                .iter()
                .map(|s| s.transformed(link))
                .fold(AABB::empty(), |b, s| b.including(&s.start).including(&s.end)),
            _ => AABB::new(
                self.world_pose.translation.vector,
                self.world_pose.translation.vector,
            ),
        };
    }

    /// Native record for collidable, loaded shapes attached to a body.
    pub(crate) fn native(&self, cog: &Vec3) -> Option<NativeShape> {
        let body = self.body?;
        let geometry = self.geometry()?.clone();
        Some(NativeShape {
            body,
            local: Translation3::from(-cog) * self.collision_frame(),
            geometry,
            laser_retro: self.laser_retro,
            fiducial: self.fiducial,
        })
    }

    pub(crate) fn fan_mut(&mut self) -> Option<&mut RayFan> {
        match &mut self.params {
            Params::Ray(fan) => Some(fan),
            _ => None,
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

fn invalid(element: &str, value: impl fmt::Display, expected: &'static str) -> PhysicsError {
    PhysicsError::Configuration(SceneError::InvalidValue {
        element: element.to_string(),
        value: value.to_string(),
        expected,
    })
}

fn positive(element: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(invalid(element, value, "positive number"))
    }
}

fn parse_geometry(kind: ShapeKind, el: &Element) -> Result<Geometry> {
    Ok(match kind {
        ShapeKind::Plane => Geometry::plane(el.value_or("normal", Vec3::z())?),
        ShapeKind::Box => {
            let size: Vec3 = el.required_value("size")?;
            if size.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
                return Err(invalid("size", format!("{} {} {}", size.x, size.y, size.z), "positive size"));
            }
            Geometry::cuboid(size)
        }
        ShapeKind::Sphere => Geometry::Sphere {
            radius: positive("radius", el.required_value("radius")?)?,
        },
        ShapeKind::Cylinder => Geometry::Cylinder {
            radius: positive("radius", el.required_value("radius")?)?,
            length: positive("length", el.required_value("length")?)?,
        },
        ShapeKind::Compound | ShapeKind::Ray => {
            return Err(invalid(el.tag.as_str(), kind, "solid geometry"));
        }
    })
}

/// First solid geometry child of a compound `<part>`.
fn parse_solid(part: &Element) -> Result<Geometry> {
    for kind in [ShapeKind::Box, ShapeKind::Sphere, ShapeKind::Cylinder] {
        if let Some(el) = part.child(kind.name()) {
            return parse_geometry(kind, el);
        }
    }
    Err(SceneError::MissingElement {
        parent: "part".into(),
        tag: "box|sphere|cylinder".into(),
    }
    .into())
}

fn parse_axis(el: &Element) -> Result<ScanAxis> {
    let d = ScanAxis::default();
    let axis = ScanAxis {
        samples: el.value_or("samples", d.samples)?,
        resolution: el.value_or("resolution", d.resolution)?,
        min_angle: el.value_or("min_angle", d.min_angle)?,
        max_angle: el.value_or("max_angle", d.max_angle)?,
    };
    if axis.samples == 0 {
        return Err(invalid("samples", 0, "at least one sample"));
    }
    Ok(axis)
}

fn parse_fan(el: &Element) -> Result<RayFanSpec> {
    let scan = el.required_child("scan")?;
    let horizontal = parse_axis(scan.required_child("horizontal")?)?;
    let vertical = match scan.child("vertical") {
        Some(v) => parse_axis(v)?,
        None => ScanAxis::default(),
    };
    let range = el.required_child("range")?;
    let min: f64 = range.required_value("min")?;
    let max: f64 = range.required_value("max")?;
    if !(min.is_finite() && min >= 0.0) {
        return Err(invalid("min", min, "non-negative range"));
    }
    if !(max.is_finite() && max > min) {
        return Err(invalid("max", max, "range above min"));
    }
    Ok(RayFanSpec {
        horizontal,
        vertical,
        range: RangeSpec {
            min,
            max,
            resolution: range.value_or("resolution", 0.0)?,
        },
    })
}

fn geometry_element(g: &Geometry) -> Element {
    match g {
        Geometry::Plane { normal } => Element::new("plane").with_value("normal", *normal),
        Geometry::Box { half_extents } => {
            Element::new("box").with_value("size", half_extents * 2.0)
        }
        Geometry::Sphere { radius } => Element::new("sphere").with_value("radius", *radius),
        Geometry::Cylinder { radius, length } => Element::new("cylinder")
            .with_value("radius", *radius)
            .with_value("length", *length),
        Geometry::Compound { parts } => parts.iter().fold(Element::new("compound"), |el, (pose, g)| {
            el.with_child(
                Element::new("part")
                    .with_value("pose", *pose)
                    .with_child(geometry_element(g)),
            )
        }),
    }
}

fn axis_element(tag: &str, axis: &ScanAxis) -> Element {
    Element::new(tag)
        .with_value("samples", axis.samples)
        .with_value("resolution", axis.resolution)
        .with_value("min_angle", axis.min_angle)
        .with_value("max_angle", axis.max_angle)
}

fn fan_element(spec: &RayFanSpec) -> Element {
    Element::new("ray")
        .with_child(
            Element::new("scan")
                .with_child(axis_element("horizontal", &spec.horizontal))
                .with_child(axis_element("vertical", &spec.vertical)),
        )
        .with_child(
            Element::new("range")
                .with_value("min", spec.range.min)
                .with_value("max", spec.range.max)
                .with_value("resolution", spec.range.resolution),
        )
}

/// Mutable access to a shape and the back end.
pub struct ShapeMut<'a> {
    pub(crate) shape: &'a mut Shape,
    pub(crate) backend: &'a mut dyn Backend,
}

impl std::ops::Deref for ShapeMut<'_> {
    type Target = Shape;

    fn deref(&self) -> &Shape {
        self.shape
    }
}

impl ShapeMut<'_> {
    /// Configure from a `<collision>` element. On error the shape keeps its
    /// previous configuration. Shapes cannot be reconfigured once attached.
    pub fn load(&mut self, el: &Element) -> Result<()> {
        if self.shape.body.is_some() || self.shape.initialized {
            return Err(PhysicsError::InvalidState(format!(
                "{} is already attached",
                self.shape.name
            )));
        }
        *self.shape = self.shape.parse(el)?;
        Ok(())
    }

    /// Materialize the geometry: generate ray-fan rays, or register the
    /// native shape with the back end.
    pub fn init(&mut self) -> Result<()> {
        if !self.shape.is_loaded() {
            return Err(PhysicsError::InvalidState(format!("{} is not loaded", self.shape.name)));
        }
        let offset = self.shape.pose.translation.vector;
        if let Some(fan) = self.shape.fan_mut() {
            fan.init(&offset);
        }
        if let Some(body) = self.shape.body {
            let world = self.backend.world_mut();
            let native = world.body(body)?;
            let (cog, link) = (native.cog, native.link_pose());
            if let Some(native) = self.shape.native(&cog) {
                world.insert_shape(self.shape.id, native);
            }
            self.shape.set_link_pose(&link);
        }
        self.shape.initialized = true;
        tracing::debug!("Initialized {} shape {}", self.shape.kind, self.shape.name);
        Ok(())
    }

    /// Refresh world pose and bounds; ray fans additionally recast every ray.
    pub fn update(&mut self) -> Result<()> {
        let body = self.shape.body.ok_or_else(|| {
            PhysicsError::InvalidState(format!("{} is not attached to a body", self.shape.name))
        })?;
        let link = self.backend.world().body(body)?.link_pose();
        self.shape.set_link_pose(&link);
        let world = self.backend.world();
        if let Some(fan) = self.shape.fan_mut() {
            if fan.is_initialized() {
                fan.update(world, &link, body);
                self.shape.mark_dirty();
            }
        }
        Ok(())
    }

    /// Change a plane's normal. The altitude is kept along the new normal.
    pub fn set_normal(&mut self, normal: Vec3) -> Result<()> {
        self.shape.normal()?;
        self.shape.params = Params::Geometry(Geometry::plane(normal));
        self.refresh_native()
    }

    /// Move a plane along its normal.
    pub fn set_altitude(&mut self, altitude: f64) -> Result<()> {
        self.shape.normal()?;
        if !altitude.is_finite() {
            return Err(invalid("altitude", altitude, "finite altitude"));
        }
        self.shape.altitude = altitude;
        self.refresh_native()
    }

    /// Rebuild the registered native record after a parameter change.
    fn refresh_native(&mut self) -> Result<()> {
        let Some(body) = self.shape.body else {
            return Ok(());
        };
        let world = self.backend.world_mut();
        if world.shape_mut(self.shape.id).is_none() {
            return Ok(());
        }
        let cog = world.body(body)?.cog;
        if let Some(native) = self.shape.native(&cog) {
            world.insert_shape(self.shape.id, native);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::create_backend;
    use crate::config::EngineConfig;
    use crate::id::EngineId;
    use approx::assert_relative_eq;

    const LIDAR: &str = r#"
        <collision name="lidar">
          <pose>0.1 0 0.2 0 0 0</pose>
          <geometry>
            <ray>
              <scan>
                <horizontal>
                  <samples>5</samples>
                  <min_angle>-1</min_angle>
                  <max_angle>1</max_angle>
                </horizontal>
              </scan>
              <range><min>0.05</min><max>8</max></range>
            </ray>
          </geometry>
        </collision>"#;

    fn shape(kind: ShapeKind) -> Shape {
        Shape::new(ShapeId::new(EngineId::next(), 0), kind)
    }

    fn parse(kind: ShapeKind, xml: &str) -> Result<Shape> {
        shape(kind).parse(&Element::from_xml_str(xml).unwrap())
    }

    #[test]
    fn test_ray_defaults() {
        let s = parse(ShapeKind::Ray, LIDAR).unwrap();
        let fan = s.ray_fan().unwrap();
        assert_eq!(fan.horizontal_samples(), 5);
        assert_eq!(fan.horizontal_resolution(), 1.0);
        assert_eq!(fan.vertical_samples(), 1);
        assert_eq!(fan.vertical_min_angle(), 0.0);
        assert_eq!(fan.range_resolution(), 0.0);
        assert_eq!(s.ray_count(), 5);
    }

    #[test]
    fn test_missing_range_is_configuration_error() {
        let err = parse(
            ShapeKind::Ray,
            r#"<collision><geometry><ray><scan><horizontal/></scan></ray></geometry></collision>"#,
        )
        .unwrap_err();
        assert!(matches!(err, PhysicsError::Configuration(SceneError::MissingElement { .. })));
    }

    #[test]
    fn test_geometry_must_match_kind() {
        let xml = r#"<collision><geometry><sphere><radius>1</radius></sphere></geometry></collision>"#;
        assert!(parse(ShapeKind::Sphere, xml).is_ok());
        assert!(parse(ShapeKind::Box, xml).is_err());
        assert!(parse(
            ShapeKind::Sphere,
            r#"<collision><geometry><sphere><radius>-1</radius></sphere></geometry></collision>"#
        )
        .is_err());
    }

    #[test]
    fn test_plane_normal_defaults_to_z() {
        let s = parse(
            ShapeKind::Plane,
            r#"<collision><geometry><plane/></geometry></collision>"#,
        )
        .unwrap();
        assert_eq!(s.normal().unwrap(), Vec3::z());
        assert!(parse(ShapeKind::Sphere, LIDAR).is_err());
    }

    #[test]
    fn test_compound_parts() {
        let s = parse(
            ShapeKind::Compound,
            r#"<collision><mass>2</mass><geometry><compound>
                 <part><pose>0 0 1 0 0 0</pose><sphere><radius>0.5</radius></sphere></part>
                 <part><pose>0 0 -1 0 0 0</pose><sphere><radius>0.5</radius></sphere></part>
               </compound></geometry></collision>"#,
        )
        .unwrap();
        let mp = s.mass_properties();
        assert_relative_eq!(mp.mass, 2.0, epsilon = 1e-12);
        assert_relative_eq!(mp.cog, Vec3::zeros(), epsilon = 1e-12);
        assert!(parse(
            ShapeKind::Compound,
            r#"<collision><geometry><compound/></geometry></collision>"#
        )
        .is_err());
    }

    #[test]
    fn test_element_round_trip_keeps_ray_geometry() {
        let source = parse(ShapeKind::Ray, LIDAR).unwrap();
        let reloaded = shape(ShapeKind::Ray).parse(&source.to_element()).unwrap();

        let mut a = source.ray_fan().unwrap().clone();
        let mut b = reloaded.ray_fan().unwrap().clone();
        a.init(&source.relative_pose().translation.vector);
        b.init(&reloaded.relative_pose().translation.vector);
        assert_eq!(a.local_segments(), b.local_segments());
        assert_eq!(reloaded.name(), "lidar");
    }

    #[test]
    fn test_mass_properties_follow_pose() {
        let s = parse(
            ShapeKind::Box,
            r#"<collision><pose>0 0 0.5 0 0 0</pose><mass>3</mass>
                 <geometry><box><size>1 1 1</size></box></geometry></collision>"#,
        )
        .unwrap();
        let mp = s.mass_properties();
        assert_eq!(mp.mass, 3.0);
        assert_relative_eq!(mp.cog, Vec3::new(0.0, 0.0, 0.5), epsilon = 1e-12);
    }

    #[test]
    fn test_results_require_ray_fan() {
        let s = parse(
            ShapeKind::Sphere,
            r#"<collision><geometry><sphere><radius>1</radius></sphere></geometry></collision>"#,
        )
        .unwrap();
        assert!(matches!(s.range(0), Err(PhysicsError::InvalidState(_))));
        assert_eq!(s.ray_count(), 0);
    }

    #[test]
    fn test_ray_results_need_init() {
        let mut backend = create_backend(&EngineConfig::default()).unwrap();
        let mut s = parse(ShapeKind::Ray, LIDAR).unwrap();
        assert_eq!(s.ray_count(), 5);
        assert!(matches!(s.range(0), Err(PhysicsError::InvalidState(_))));
        assert!(matches!(s.fiducial(4), Err(PhysicsError::InvalidState(_))));

        ShapeMut {
            shape: &mut s,
            backend: backend.as_mut(),
        }
        .init()
        .unwrap();
        assert_eq!(s.range(0).unwrap(), 8.0);
        assert!(matches!(
            s.range(5),
            Err(PhysicsError::IndexOutOfRange { index: 5, len: 5 })
        ));
    }

    #[test]
    fn test_plane_altitude() {
        let xml = r#"<collision><geometry><plane><altitude>0.5</altitude></plane></geometry></collision>"#;
        let mut s = parse(ShapeKind::Plane, xml).unwrap();
        assert_eq!(s.altitude().unwrap(), 0.5);
        let reloaded = shape(ShapeKind::Plane).parse(&s.to_element()).unwrap();
        assert_eq!(reloaded.altitude().unwrap(), 0.5);

        let mut backend = create_backend(&EngineConfig::default()).unwrap();
        let mut plane = ShapeMut {
            shape: &mut s,
            backend: backend.as_mut(),
        };
        plane.set_altitude(-2.0).unwrap();
        assert!(plane.set_altitude(f64::NAN).is_err());
        plane.set_normal(Vec3::new(0.0, 0.0, 3.0)).unwrap();
        assert_eq!(plane.altitude().unwrap(), -2.0);
        assert_relative_eq!(
            plane.collision_frame().translation.vector,
            Vec3::new(0.0, 0.0, -2.0),
            epsilon = 1e-12
        );
        let sphere = parse(
            ShapeKind::Sphere,
            r#"<collision><geometry><sphere><radius>1</radius></sphere></geometry></collision>"#,
        )
        .unwrap();
        assert!(matches!(sphere.altitude(), Err(PhysicsError::InvalidState(_))));
    }

    #[test]
    fn test_creation_names_kind() {
        assert_eq!(ShapeKind::Compound.creation(), "compound shapes");
        assert!(ShapeKind::ALL.iter().all(|k| k.creation().starts_with(k.name())));
    }
}
