use glam::{EulerRot, Quat, Vec3};
use rand::Rng;

use crate::mesh::GeometryData;
use crate::renderer::forward_pass::DirectionalLight;
use crate::renderer::renderable::RenderableProperties;

pub const DEMO_ROWS: usize = 300;
const ROW_SPACING: f32 = 15.0;
const FIRST_ROW_Z: f32 = -50.0;
const GROUND_HEIGHT: f32 = -15.0;
const GROUND_SCALE: f32 = 10_000.0;
const PILLAR_OFFSET_X: f32 = 20.0;
const PILLAR_HEIGHT: f32 = 20.0;
const TORUS_SPREAD_X: f32 = 10.0;

/// Shared geometry a scene object draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshKind {
    Plane,
    Cube,
    Torus,
}

impl MeshKind {
    pub fn geometry(self) -> GeometryData {
        match self {
            MeshKind::Plane => GeometryData::plane(1.0),
            MeshKind::Cube => GeometryData::cube(1.0),
            MeshKind::Torus => GeometryData::torus(3.0, 1.0, 20, 20),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MeshKind::Plane => "plane",
            MeshKind::Cube => "cube",
            MeshKind::Torus => "torus",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: &'static str,
    pub mesh: MeshKind,
    pub properties: RenderableProperties,
}

#[derive(Debug, Clone)]
pub struct SceneDescription {
    pub objects: Vec<SceneObject>,
    pub light: DirectionalLight,
}

pub fn demo_light() -> DirectionalLight {
    DirectionalLight {
        direction: Vec3::new(0.5, -0.2, -1.0).normalize(),
        color: Vec3::ONE,
        ambient_intensity: 0.05,
    }
}

fn random_material(rng: &mut impl Rng, properties: &mut RenderableProperties) {
    properties.set_color(Vec3::new(rng.gen(), rng.gen(), rng.gen()));
    properties.set_shininess(rng.gen_range(22.0..32.0));
    properties.set_specular_intensity(rng.gen_range(0.0..0.7));
}

/// Ground plane and `rows` rows receding along -Z, each a pair of pillars flanking a
/// randomly rotated torus.
pub fn demo_scene(rng: &mut impl Rng, rows: usize) -> SceneDescription {
    let mut objects = Vec::with_capacity(1 + rows * 3);

    let mut ground = RenderableProperties::default();
    ground.set_color(Vec3::new(0.0, 0.6, 0.148));
    ground.set_specular_intensity(0.2);
    ground.set_position(Vec3::new(0.0, GROUND_HEIGHT, 0.0));
    ground.set_scale(Vec3::splat(GROUND_SCALE));
    objects.push(SceneObject { name: "ground", mesh: MeshKind::Plane, properties: ground });

    let mut z = FIRST_ROW_Z;
    for _ in 0..rows {
        for (name, x) in [("pillar_left", -PILLAR_OFFSET_X), ("pillar_right", PILLAR_OFFSET_X)] {
            let mut pillar = RenderableProperties::default();
            random_material(rng, &mut pillar);
            pillar.set_position(Vec3::new(x, 0.0, z));
            pillar.set_scale(Vec3::new(1.0, PILLAR_HEIGHT, 1.0));
            objects.push(SceneObject { name, mesh: MeshKind::Cube, properties: pillar });
        }

        let mut torus = RenderableProperties::default();
        random_material(rng, &mut torus);
        let tau = std::f32::consts::TAU;
        torus.set_rotation(Quat::from_euler(
            EulerRot::XYZ,
            rng.gen_range(0.0..tau),
            rng.gen_range(0.0..tau),
            rng.gen_range(0.0..tau),
        ));
        torus.set_position(Vec3::new(rng.gen_range(-TORUS_SPREAD_X..TORUS_SPREAD_X), 0.0, z));
        objects.push(SceneObject { name: "torus", mesh: MeshKind::Torus, properties: torus });

        z -= ROW_SPACING;
    }

    SceneDescription { objects, light: demo_light() }
}
