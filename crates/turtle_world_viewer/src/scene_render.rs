use bevy::prelude::*;
use turtle_world::{
    map_snapshot, place_agent, AgentState, DeferredSlot, FaceRotation, RenderableFace,
    WorldSnapshot,
};

use crate::interaction::{dismiss_popup, PickableFace, PopupState};
use crate::material_library::{asset_readiness, AssetReadiness, FaceMaterialLibrary};
use crate::viewer_config::ViewerConfig;
use crate::{Viewer3dAssets, Viewer3dScene, ViewerState};

const BEACON_OFFSET: f32 = 1.1;
const MODEL_LOAD_TIMEOUT_SECS: f32 = 10.0;

#[derive(Component)]
pub(super) struct AgentMarker {
    pub label: String,
}

#[derive(Component)]
pub(super) struct ActiveBeacon;

/// Agents wait here until the agent model resolves; only the latest set is kept.
#[derive(Resource, Default)]
pub(super) struct AgentModel {
    pub scene: Handle<Scene>,
    pub slot: DeferredSlot<Vec<AgentState>>,
    pub fallback: bool,
    pub waited_secs: f32,
}

impl AgentModel {
    pub(super) fn loading(scene: Handle<Scene>) -> Self {
        Self {
            scene,
            ..default()
        }
    }
}

pub(super) fn face_rotation_quat(rotation: FaceRotation) -> Quat {
    Quat::from_rotation_y(rotation.y) * Quat::from_rotation_x(rotation.x)
}

pub(super) fn update_3d_scene(
    mut commands: Commands,
    config: Res<ViewerConfig>,
    assets: Res<Viewer3dAssets>,
    asset_server: Res<AssetServer>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut library: ResMut<FaceMaterialLibrary>,
    mut model: ResMut<AgentModel>,
    mut scene: ResMut<Viewer3dScene>,
    mut popup: ResMut<PopupState>,
    state: Res<ViewerState>,
) {
    let Some(snapshot) = state.snapshot.as_ref() else {
        return;
    };
    if scene.rendered_revision == Some(state.snapshot_revision) {
        return;
    }

    dismiss_popup(&mut commands, &mut popup);
    rebuild_scene_from_snapshot(
        &mut commands,
        &assets,
        &mut scene,
        &mut model,
        snapshot,
        |material_key| {
            library.handle_for(
                material_key,
                &config.texture_root,
                config.face_opacity,
                &asset_server,
                &mut materials,
            )
        },
    );
    scene.rendered_revision = Some(state.snapshot_revision);
}

/// Clears every tracked object before drawing the snapshot.
pub(super) fn rebuild_scene_from_snapshot<F>(
    commands: &mut Commands,
    assets: &Viewer3dAssets,
    scene: &mut Viewer3dScene,
    model: &mut AgentModel,
    snapshot: &WorldSnapshot,
    mut material_for: F,
) where
    F: FnMut(&str) -> Handle<StandardMaterial>,
{
    for entity in scene.state.clear() {
        commands.entity(entity).despawn();
    }

    for face in map_snapshot(&snapshot.blocks) {
        let material = material_for(&face.material_key);
        spawn_face_entity(commands, assets, scene, &face, material);
    }

    if let Some(agents) = model.slot.submit(snapshot.agents.clone()) {
        spawn_agent_entities(commands, assets, scene, model, &agents);
    }
}

fn spawn_face_entity(
    commands: &mut Commands,
    assets: &Viewer3dAssets,
    scene: &mut Viewer3dScene,
    face: &RenderableFace,
    material: Handle<StandardMaterial>,
) {
    let [x, y, z] = face.center();
    let center = Vec3::new(x, y, z);
    let [nx, ny, nz] = face.direction.normal();
    let normal = Vec3::new(nx as f32, ny as f32, nz as f32);

    let entity = commands
        .spawn((
            Mesh3d(assets.face_mesh.clone()),
            MeshMaterial3d(material),
            Transform::from_translation(center).with_rotation(face_rotation_quat(face.rotation())),
            Name::new(format!("face:{}:{:?}", face.source, face.direction)),
            PickableFace { center, normal },
        ))
        .id();
    scene.state.track(entity, face.source);
}

fn spawn_agent_entities(
    commands: &mut Commands,
    assets: &Viewer3dAssets,
    scene: &mut Viewer3dScene,
    model: &AgentModel,
    agents: &[AgentState],
) {
    for agent in agents {
        let placement = place_agent(agent.position, agent.facing);
        let [x, y, z] = placement.translation;
        let transform =
            Transform::from_xyz(x, y, z).with_rotation(Quat::from_rotation_y(placement.yaw));
        let marker = AgentMarker {
            label: agent.label.clone(),
        };
        let name = Name::new(format!("agent:{}", agent.label));

        let mut entity = if model.fallback {
            commands.spawn((
                Mesh3d(assets.agent_mesh.clone()),
                MeshMaterial3d(assets.agent_material.clone()),
                transform,
                name,
                marker,
            ))
        } else {
            commands.spawn((SceneRoot(model.scene.clone()), transform, name, marker))
        };
        if agent.is_active {
            entity.with_children(|parent| {
                parent.spawn((
                    Mesh3d(assets.beacon_mesh.clone()),
                    MeshMaterial3d(assets.beacon_material.clone()),
                    Transform::from_xyz(0.0, BEACON_OFFSET, 0.0),
                    ActiveBeacon,
                ));
            });
        }
        let entity = entity.id();
        scene.state.track_unpicked(entity);
    }
}

/// Spawns whatever agents were parked while the model loaded. Runs once.
pub(super) fn release_parked_agents(
    commands: &mut Commands,
    assets: &Viewer3dAssets,
    scene: &mut Viewer3dScene,
    model: &mut AgentModel,
) {
    if let Some(agents) = model.slot.mark_ready() {
        spawn_agent_entities(commands, assets, scene, model, &agents);
    }
}

pub(super) fn watch_agent_model(
    mut commands: Commands,
    time: Res<Time>,
    asset_server: Res<AssetServer>,
    assets: Res<Viewer3dAssets>,
    mut model: ResMut<AgentModel>,
    mut scene: ResMut<Viewer3dScene>,
) {
    if model.slot.is_ready() {
        return;
    }
    let readiness = asset_readiness(asset_server.get_load_state(model.scene.id()));
    settle_agent_model(
        &mut commands,
        &assets,
        &mut scene,
        &mut model,
        readiness,
        time.delta_secs(),
    );
}

/// Failed or timed-out models switch agents to the fallback cuboid.
fn settle_agent_model(
    commands: &mut Commands,
    assets: &Viewer3dAssets,
    scene: &mut Viewer3dScene,
    model: &mut AgentModel,
    readiness: AssetReadiness,
    delta_secs: f32,
) {
    if model.slot.is_ready() {
        return;
    }
    model.waited_secs += delta_secs;
    match readiness {
        AssetReadiness::Ready => info!("agent model loaded"),
        AssetReadiness::Failed => {
            warn!("agent model failed to load; drawing agents as plain markers");
            model.fallback = true;
        }
        AssetReadiness::Pending if model.waited_secs >= MODEL_LOAD_TIMEOUT_SECS => {
            warn!("agent model still loading after {MODEL_LOAD_TIMEOUT_SECS}s; drawing agents as plain markers");
            model.fallback = true;
        }
        AssetReadiness::Pending => return,
    }
    release_parked_agents(commands, assets, scene, model);
}
