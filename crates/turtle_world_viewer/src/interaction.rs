use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use turtle_world::{Coordinate, WorldSnapshot, FACE_HALF_EXTENT};

use crate::{Viewer3dCamera, Viewer3dScene, ViewerState, UI_PANEL_WIDTH};

pub(super) const PICK_BUTTON: MouseButton = MouseButton::Right;
const PICK_EDGE_TOLERANCE: f32 = 1e-4;
const POPUP_OFFSET: Vec2 = Vec2::new(12.0, 12.0);

/// Unit quad in world space, used for ray picking.
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub(super) struct PickableFace {
    pub center: Vec3,
    pub normal: Vec3,
}

#[derive(Component)]
pub(super) struct BlockPopup;

#[derive(Resource, Default, Debug)]
pub(super) struct PopupState {
    pub current: Option<PopupInfo>,
}

#[derive(Clone, Debug, PartialEq)]
pub(super) struct PopupInfo {
    pub entity: Entity,
    pub coordinate: Coordinate,
}

pub(super) fn ray_face_distance(ray: Ray3d, face: &PickableFace) -> Option<f32> {
    let direction = ray.direction.as_vec3();
    let denom = direction.dot(face.normal);
    if denom.abs() < f32::EPSILON {
        return None;
    }
    let t = (face.center - ray.origin).dot(face.normal) / denom;
    if t < 0.0 {
        return None;
    }
    let local = ray.origin + direction * t - face.center;
    let limit = FACE_HALF_EXTENT + PICK_EDGE_TOLERANCE;
    if local.x.abs() > limit || local.y.abs() > limit || local.z.abs() > limit {
        return None;
    }
    Some(t)
}

pub(super) fn nearest_face_hit<'a, I>(ray: Ray3d, faces: I) -> Option<(Entity, f32)>
where
    I: IntoIterator<Item = (Entity, &'a PickableFace)>,
{
    let mut best: Option<(Entity, f32)> = None;
    for (entity, face) in faces {
        if let Some(distance) = ray_face_distance(ray, face) {
            if best
                .as_ref()
                .map(|(_, best_dist)| distance < *best_dist)
                .unwrap_or(true)
            {
                best = Some((entity, distance));
            }
        }
    }
    best
}

pub(super) fn popup_text(coordinate: Coordinate, snapshot: Option<&WorldSnapshot>) -> String {
    let type_name = snapshot
        .and_then(|snapshot| snapshot.blocks.get(&coordinate))
        .and_then(|entry| entry.descriptor())
        .map(|descriptor| descriptor.type_name.as_str());
    match type_name {
        Some(name) => format!("Block: {coordinate}\n{name}"),
        None => format!("Block: {coordinate}"),
    }
}

pub(super) fn dismiss_popup(commands: &mut Commands, popup: &mut PopupState) {
    if let Some(current) = popup.current.take() {
        commands.entity(current.entity).despawn();
    }
}

fn show_popup(
    commands: &mut Commands,
    popup: &mut PopupState,
    coordinate: Coordinate,
    text: String,
    cursor: Vec2,
) {
    dismiss_popup(commands, popup);
    let anchor = cursor + POPUP_OFFSET;
    let entity = commands
        .spawn((
            Node {
                position_type: PositionType::Absolute,
                left: Val::Px(anchor.x),
                top: Val::Px(anchor.y),
                padding: UiRect::all(Val::Px(8.0)),
                ..default()
            },
            BackgroundColor(Color::srgba(0.05, 0.05, 0.07, 0.9)),
            BlockPopup,
        ))
        .with_children(|parent| {
            parent.spawn((
                Text::new(text),
                TextFont {
                    font_size: 13.0,
                    ..default()
                },
                TextColor(Color::WHITE),
            ));
        })
        .id();
    popup.current = Some(PopupInfo { entity, coordinate });
}

/// Right click names the nearest block face under the cursor; any other press
/// dismisses the popup.
pub(super) fn handle_pointer_pick(
    mut commands: Commands,
    buttons: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    camera_query: Query<(&Camera, &GlobalTransform), With<Viewer3dCamera>>,
    faces: Query<(Entity, &PickableFace)>,
    scene: Res<Viewer3dScene>,
    state: Res<ViewerState>,
    mut popup: ResMut<PopupState>,
) {
    if buttons.get_just_pressed().next().is_none() {
        return;
    }
    if !buttons.just_pressed(PICK_BUTTON) {
        dismiss_popup(&mut commands, &mut popup);
        return;
    }

    let hit = pick_block(&windows, &camera_query, &faces, &scene);
    match hit {
        Some((coordinate, cursor)) => {
            let text = popup_text(coordinate, state.snapshot.as_ref());
            show_popup(&mut commands, &mut popup, coordinate, text, cursor);
        }
        None => dismiss_popup(&mut commands, &mut popup),
    }
}

fn pick_block(
    windows: &Query<&Window, With<PrimaryWindow>>,
    camera_query: &Query<(&Camera, &GlobalTransform), With<Viewer3dCamera>>,
    faces: &Query<(Entity, &PickableFace)>,
    scene: &Viewer3dScene,
) -> Option<(Coordinate, Vec2)> {
    let window = windows.single().ok()?;
    let cursor_position = window.cursor_position()?;
    if cursor_position.x > (window.width() - UI_PANEL_WIDTH) {
        return None;
    }
    let (camera, camera_transform) = camera_query.single().ok()?;
    let ray = camera
        .viewport_to_world(camera_transform, cursor_position)
        .ok()?;
    let (entity, _) = nearest_face_hit(ray, faces.iter())?;
    let coordinate = scene.state.resolve(&entity)?;
    Some((coordinate, cursor_position))
}
