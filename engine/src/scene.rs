use {
    ahash::AHasher,
    ordered_float::OrderedFloat,
    serde::{Deserialize, Serialize},
    std::hash::{Hash, Hasher as _},
};

/// Analytic surface kinds the tracer understands.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Surface {
    Sphere { center: [f32; 3], radius: f32 },
    Plane { point: [f32; 3], normal: [f32; 3] },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SceneNode {
    pub name: String,
    pub surface: Surface,
    /// Index into the snapshot's material set.
    pub material: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Albedo at 550 nm.
    pub reflectance: f32,
    /// Linear tilt of the albedo per micrometer of wavelength.
    pub spectral_slope: f32,
    pub roughness: f32,
    /// Thermal emission strength; zero for cold surfaces.
    pub emission_scale: f32,
    pub temperature_k: f32,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            reflectance: 0.5,
            spectral_slope: 0.0,
            roughness: 0.3,
            emission_scale: 0.0,
            temperature_k: 293.15,
        }
    }
}

impl Material {
    pub fn reflectance_at(&self, nm: f32) -> f32 {
        let tilted = self.reflectance + self.spectral_slope * (nm - 550.0) * 1e-3;
        tilted.max(0.0).min(1.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightingParams {
    /// Direction the sunlight travels, world space.
    pub sun_direction: [f32; 3],
    pub sun_irradiance: f32,
    pub sky_radiance: f32,
    pub ambient: f32,
}

impl Default for LightingParams {
    fn default() -> Self {
        LightingParams {
            sun_direction: [-0.3, -1.0, -0.2],
            sun_irradiance: 3.0,
            sky_radiance: 0.2,
            ambient: 0.05,
        }
    }
}

/// Read-only view of the scene the engine consumes. Owned and mutated by the
/// editing collaborators; the engine only hashes and traces it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub nodes: Vec<SceneNode>,
    pub materials: Vec<Material>,
    #[serde(default)]
    pub lighting: LightingParams,
}

impl SceneSnapshot {
    pub fn material(&self, index: u32) -> Material {
        self.materials
            .get(index as usize)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_material(&mut self, index: usize, material: Material) -> bool {
        match self.materials.get_mut(index) {
            Some(slot) => {
                *slot = material;
                true
            }
            None => false,
        }
    }

    /// Digest of geometry and node structure. Stable across sessions so a
    /// warm shader cache keys the same scene the same way.
    pub fn topology_hash(&self) -> u64 {
        let mut hasher = AHasher::new_with_keys(0x243f_6a88_85a3_08d3, 0x1319_8a2e_0370_7344);
        self.nodes.len().hash(&mut hasher);
        for node in &self.nodes {
            node.name.hash(&mut hasher);
            node.material.hash(&mut hasher);
            hash_surface(&node.surface, &mut hasher);
        }
        hasher.finish()
    }

    /// Digest of the material set's shape. Parameter edits on an existing
    /// material keep the hash; adding or removing slots changes it.
    pub fn material_hash(&self) -> u64 {
        let mut hasher = AHasher::new_with_keys(0xa409_3822_299f_31d0, 0x082e_fa98_ec4e_6c89);
        self.materials.len().hash(&mut hasher);
        hasher.finish()
    }
}

fn hash_surface(surface: &Surface, hasher: &mut AHasher) {
    match surface {
        Surface::Sphere { center, radius } => {
            0u8.hash(hasher);
            hash_floats(center, hasher);
            OrderedFloat(*radius).hash(hasher);
        }
        Surface::Plane { point, normal } => {
            1u8.hash(hasher);
            hash_floats(point, hasher);
            hash_floats(normal, hasher);
        }
    }
}

fn hash_floats(values: &[f32], hasher: &mut AHasher) {
    for &value in values {
        OrderedFloat(value).hash(hasher);
    }
}
