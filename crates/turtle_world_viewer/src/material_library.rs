use bevy::asset::LoadState;
use bevy::prelude::*;
use std::collections::BTreeMap;
use turtle_world::material_texture_path;

const NEUTRAL_FACE_TINT: (f32, f32, f32) = (0.62, 0.62, 0.64);
const FACE_ROUGHNESS: f32 = 0.9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum AssetReadiness {
    Pending,
    Ready,
    Failed,
}

pub(super) fn asset_readiness(state: Option<LoadState>) -> AssetReadiness {
    match state {
        Some(LoadState::Loaded) => AssetReadiness::Ready,
        Some(LoadState::Failed(_)) => AssetReadiness::Failed,
        _ => AssetReadiness::Pending,
    }
}

#[derive(Clone, Debug)]
struct FaceMaterialEntry {
    material: Handle<StandardMaterial>,
    texture: Handle<Image>,
    opacity: f32,
    readiness: AssetReadiness,
}

/// One material per block type name, shared by every face of that type.
#[derive(Resource, Clone, Debug, Default)]
pub(super) struct FaceMaterialLibrary {
    by_key: BTreeMap<String, FaceMaterialEntry>,
}

impl FaceMaterialLibrary {
    pub(super) fn handle_for(
        &mut self,
        material_key: &str,
        texture_root: &str,
        opacity: f32,
        asset_server: &AssetServer,
        materials: &mut Assets<StandardMaterial>,
    ) -> Handle<StandardMaterial> {
        if let Some(entry) = self.by_key.get(material_key) {
            return entry.material.clone();
        }
        let texture: Handle<Image> =
            asset_server.load(material_texture_path(texture_root, material_key));
        let material = materials.add(textured_face_material(texture.clone(), opacity));
        self.by_key.insert(
            material_key.to_string(),
            FaceMaterialEntry {
                material: material.clone(),
                texture,
                opacity,
                readiness: AssetReadiness::Pending,
            },
        );
        material
    }

    pub(super) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(super) fn pending_keys(&self) -> impl Iterator<Item = &str> {
        self.by_key
            .iter()
            .filter(|(_, entry)| entry.readiness == AssetReadiness::Pending)
            .map(|(key, _)| key.as_str())
    }

    /// Applies texture load results; failed textures swap to the neutral tint.
    fn settle<F>(&mut self, mut state_of: F, materials: &mut Assets<StandardMaterial>) -> Vec<String>
    where
        F: FnMut(&Handle<Image>) -> Option<LoadState>,
    {
        let mut failed = Vec::new();
        for (key, entry) in self.by_key.iter_mut() {
            if entry.readiness != AssetReadiness::Pending {
                continue;
            }
            entry.readiness = asset_readiness(state_of(&entry.texture));
            if entry.readiness == AssetReadiness::Failed {
                write_material(
                    materials,
                    &entry.material,
                    neutral_face_material(entry.opacity),
                );
                failed.push(key.clone());
            }
        }
        failed
    }
}

pub(super) fn textured_face_material(texture: Handle<Image>, opacity: f32) -> StandardMaterial {
    StandardMaterial {
        base_color: Color::srgba(1.0, 1.0, 1.0, opacity),
        base_color_texture: Some(texture),
        perceptual_roughness: FACE_ROUGHNESS,
        alpha_mode: AlphaMode::Blend,
        double_sided: true,
        cull_mode: None,
        ..default()
    }
}

pub(super) fn neutral_face_material(opacity: f32) -> StandardMaterial {
    let (r, g, b) = NEUTRAL_FACE_TINT;
    StandardMaterial {
        base_color: Color::srgba(r, g, b, opacity),
        perceptual_roughness: FACE_ROUGHNESS,
        alpha_mode: AlphaMode::Blend,
        double_sided: true,
        cull_mode: None,
        ..default()
    }
}

fn write_material(
    materials: &mut Assets<StandardMaterial>,
    handle: &Handle<StandardMaterial>,
    template: StandardMaterial,
) {
    if let Some(material) = materials.get_mut(handle) {
        *material = template;
    }
}

pub(super) fn resolve_face_textures(
    asset_server: Res<AssetServer>,
    mut library: ResMut<FaceMaterialLibrary>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    if library.pending_keys().next().is_none() {
        return;
    }
    let failed = library.settle(
        |texture| asset_server.get_load_state(texture.id()),
        &mut materials,
    );
    for key in failed {
        warn!("texture for block `{key}` failed to load; using neutral face material");
    }
}
