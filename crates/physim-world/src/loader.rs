//! Building engine entities from a scene description.
//!
//! Layout: `<world name>` holding an optional `<physics type>`, then
//! `<link>` elements (each with zero or more `<collision>` children), then
//! `<joint>` elements naming their parent and child links.

use crate::event::EntityRef;
use crate::Result;
use physim_engine::{
    BodyId, EngineConfig, JointId, JointKind, PhysicsEngine, ShapeId, ShapeKind,
};
use physim_scene::{Element, SceneError};

/// An entity created while loading, with its scene name.
pub type Created = (EntityRef, String);

/// Name and physics configuration of a `<world>` element.
pub fn read_header(el: &Element) -> Result<(String, EngineConfig)> {
    if el.tag != "world" {
        return Err(SceneError::InvalidScene(format!("expected <world>, found <{}>", el.tag)).into());
    }
    let name = el
        .parse_attr::<String>("name")?
        .unwrap_or_else(|| "default".to_string());
    let config = match el.child("physics") {
        Some(physics) => EngineConfig::from_element(physics)?,
        None => EngineConfig::default(),
    };
    Ok((name, config))
}

/// Shape kind named by the geometry inside a `<collision>`.
pub fn collision_kind(el: &Element) -> Result<ShapeKind> {
    let geometry = el.required_child("geometry")?;
    let body = geometry
        .children
        .first()
        .ok_or_else(|| SceneError::MissingElement {
            parent: "geometry".into(),
            tag: "plane|box|sphere|cylinder|compound|ray".into(),
        })?;
    body.tag.parse().map_err(|_| {
        SceneError::InvalidValue {
            element: "geometry".into(),
            value: body.tag.clone(),
            expected: "geometry kind",
        }
        .into()
    })
}

/// Create a body from `<link>` and a shape for every `<collision>` in it.
///
/// On failure everything created for the link is destroyed again.
pub fn load_link(engine: &mut PhysicsEngine, el: &Element) -> Result<Vec<Created>> {
    let name: String = el.required_attr("name")?;
    let body = engine.create_body(&name)?;
    match build_link(engine, body, el) {
        Ok(mut shapes) => {
            shapes.insert(0, (EntityRef::Body(body), name));
            Ok(shapes)
        }
        Err(e) => {
            if let Err(cleanup) = engine.destroy_body(body) {
                tracing::warn!("Failed to release link {}: {}", name, cleanup);
            }
            Err(e)
        }
    }
}

fn build_link(engine: &mut PhysicsEngine, body: BodyId, el: &Element) -> Result<Vec<Created>> {
    engine.body_mut(body)?.load(el)?;
    let mut created = Vec::new();
    for collision in el.children_named("collision") {
        let kind = collision_kind(collision)?;
        let shape = engine.create_shape(kind)?;
        if let Err(e) = attach_collision(engine, body, shape, collision) {
            if engine.shape(shape).is_ok_and(|s| s.body().is_none()) {
                engine.destroy_shape(shape)?;
            }
            return Err(e);
        }
        created.push((EntityRef::Shape(shape), engine.shape(shape)?.name().to_string()));
    }
    Ok(created)
}

fn attach_collision(
    engine: &mut PhysicsEngine,
    body: BodyId,
    shape: ShapeId,
    el: &Element,
) -> Result<()> {
    engine.shape_mut(shape)?.load(el)?;
    engine.body_mut(body)?.attach_shape(shape)?;
    Ok(())
}

/// Create, configure and attach a joint from `<joint>`.
///
/// Parent and child are resolved by link name; `world` (or an absent
/// element) stands for the static world.
pub fn load_joint(engine: &mut PhysicsEngine, el: &Element) -> Result<(JointId, String)> {
    let ty: String = el.required_attr("type")?;
    let kind: JointKind = ty.parse().map_err(|_| SceneError::InvalidValue {
        element: "joint@type".into(),
        value: ty.clone(),
        expected: "revolute, prismatic, ball or fixed",
    })?;
    let name: String = el.required_attr("name")?;

    let id = engine.create_joint(kind)?;
    let result = (|| -> Result<()> {
        engine.joint_mut(id)?.load(el)?;
        let joint = engine.joint(id)?;
        let (parent, child) = (joint.parent_name(), joint.child_name());
        let parent = resolve(engine, &name, parent)?;
        let child = resolve(engine, &name, child)?;
        engine.joint_mut(id)?.attach(parent, child)?;
        Ok(())
    })();
    if let Err(e) = result {
        if let Err(cleanup) = engine.destroy_joint(id) {
            tracing::warn!("Failed to release joint {}: {}", name, cleanup);
        }
        return Err(e);
    }
    Ok((id, name))
}

fn resolve(engine: &PhysicsEngine, joint: &str, link: Option<&str>) -> Result<Option<BodyId>> {
    let Some(link) = link else {
        return Ok(None);
    };
    engine.body_by_name(link).map(Some).ok_or_else(|| {
        SceneError::InvalidScene(format!("joint {joint} refers to unknown link {link}")).into()
    })
}
