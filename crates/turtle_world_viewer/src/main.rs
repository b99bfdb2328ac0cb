use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::thread;

use bevy::camera::Viewport;
use bevy::ecs::message::MessageReader;
use bevy::input::mouse::{MouseMotion, MouseWheel};
use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use turtle_world::{
    block_center, place_agent, CommandGeneration, SceneState, WorldSnapshot,
    COMMAND_ERROR_MESSAGE,
};

mod headless;
mod interaction;
mod main_connection;
mod material_library;
mod scene_render;
mod viewer_config;

use headless::{headless_auto_command_once, headless_report, HeadlessStatus};
use interaction::{handle_pointer_pick, PopupState};
use main_connection::{poll_sync_events, setup_startup_state, SyncRequest};
use material_library::{resolve_face_textures, FaceMaterialLibrary};
use scene_render::{update_3d_scene, watch_agent_model, AgentModel};
use viewer_config::{resolve_viewer_config, ViewerConfig};

const AGENT_MARKER_SIZE: f32 = 0.8;
const BEACON_RADIUS: f32 = 0.15;
const GRID_HALF_CELLS: i32 = 10;
const GRID_LINE_WIDTH: f32 = 0.02;
const ORBIT_ROTATE_SENSITIVITY: f32 = 0.005;
const ORBIT_PAN_SENSITIVITY: f32 = 0.002;
const ORBIT_ZOOM_SENSITIVITY: f32 = 0.2;
const ORBIT_MIN_RADIUS: f32 = 2.0;
const ORBIT_MAX_RADIUS: f32 = 300.0;
const UI_PANEL_WIDTH: f32 = 320.0;
const WORLD_CAMERA_ORDER: isize = 0;
const UI_CAMERA_ORDER: isize = 1;

const COMMAND_BUTTONS: [(&str, &str); 7] = [
    ("Forward", "/move/forward"),
    ("Back", "/move/back"),
    ("Up", "/move/up"),
    ("Down", "/move/down"),
    ("Left", "/turn/left"),
    ("Right", "/turn/right"),
    ("Stop", "/stop"),
];

fn main() {
    let (config, config_error) = resolve_viewer_config();
    if let Some(err) = config_error {
        eprintln!("turtle world viewer: {err}; using environment configuration");
    }

    if config.headless {
        run_headless(config);
    } else {
        run_ui(config);
    }
}

fn run_ui(config: ViewerConfig) {
    App::new()
        .insert_resource(config)
        .insert_resource(Viewer3dScene::default())
        .insert_resource(FaceMaterialLibrary::default())
        .insert_resource(PopupState::default())
        .add_plugins(
            DefaultPlugins.set(WindowPlugin {
                primary_window: Some(Window {
                    title: "Turtle World Viewer".to_string(),
                    resolution: (1200, 800).into(),
                    ..default()
                }),
                ..default()
            }),
        )
        .add_systems(Startup, (setup_startup_state, setup_3d_scene, setup_ui))
        .add_systems(
            Update,
            (
                poll_sync_events,
                update_ui,
                update_alert_overlay,
                sync_turtle_buttons,
                update_3d_scene,
                watch_agent_model,
                resolve_face_textures,
                focus_camera_on_snapshot,
                orbit_camera_controls,
                update_3d_viewport,
                handle_command_buttons,
                handle_turtle_buttons,
                handle_alert_dismiss,
            ),
        )
        .add_systems(
            PostUpdate,
            handle_pointer_pick.after(TransformSystems::Propagate),
        )
        .run();
}

fn run_headless(config: ViewerConfig) {
    App::new()
        .insert_resource(config)
        .insert_resource(HeadlessStatus::default())
        .add_plugins(MinimalPlugins)
        .add_systems(Startup, setup_startup_state)
        .add_systems(
            Update,
            (poll_sync_events, headless_auto_command_once, headless_report),
        )
        .run();
}

#[derive(Resource)]
struct ViewerClient {
    tx: Sender<SyncRequest>,
    rx: Mutex<Receiver<turtle_world::SyncEvent>>,
    generation: CommandGeneration,
}

#[derive(Resource)]
struct ViewerState {
    status_line: String,
    snapshot: Option<WorldSnapshot>,
    snapshot_revision: u64,
    alert: Option<String>,
    worker_stopped: bool,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self {
            status_line: "Waiting for turtle server...".to_string(),
            snapshot: None,
            snapshot_revision: 0,
            alert: None,
            worker_stopped: false,
        }
    }
}

#[derive(Resource, Default)]
struct Viewer3dScene {
    state: SceneState<Entity>,
    rendered_revision: Option<u64>,
}

#[derive(Resource)]
struct Viewer3dAssets {
    face_mesh: Handle<Mesh>,
    agent_mesh: Handle<Mesh>,
    agent_material: Handle<StandardMaterial>,
    beacon_mesh: Handle<Mesh>,
    beacon_material: Handle<StandardMaterial>,
}

#[derive(Component)]
struct Viewer3dCamera;

#[derive(Component)]
struct OrbitCamera {
    focus: Vec3,
    radius: f32,
    yaw: f32,
    pitch: f32,
}

impl OrbitCamera {
    fn from_transform(transform: &Transform, focus: Vec3) -> Self {
        let offset = transform.translation - focus;
        let radius = offset.length().max(0.1);
        let yaw = offset.x.atan2(offset.z);
        let pitch = offset.y.atan2((offset.x * offset.x + offset.z * offset.z).sqrt());
        Self {
            focus,
            radius,
            yaw,
            pitch,
        }
    }

    fn apply_to_transform(&self, transform: &mut Transform) {
        let rotation = Quat::from_axis_angle(Vec3::Y, self.yaw)
            * Quat::from_axis_angle(Vec3::X, -self.pitch);
        let offset = rotation * Vec3::new(0.0, 0.0, self.radius);
        transform.translation = self.focus + offset;
        transform.look_at(self.focus, Vec3::Y);
    }
}

/// Block-aligned floor grid, recentered under the first focus point.
#[derive(Component)]
struct GroundGrid;

#[derive(Component)]
struct StatusText;

#[derive(Component)]
struct SummaryText;

#[derive(Component)]
struct TurtleListRoot;

#[derive(Component)]
struct AlertOverlay;

#[derive(Component)]
struct AlertText;

#[derive(Component)]
struct AlertDismissButton;

#[derive(Component, Clone)]
struct CommandButton {
    endpoint: &'static str,
}

#[derive(Component, Clone)]
struct TurtleSelectButton {
    label: String,
}

fn setup_3d_scene(
    mut commands: Commands,
    config: Res<ViewerConfig>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    asset_server: Res<AssetServer>,
) {
    let face_mesh = meshes.add(Rectangle::new(1.0, 1.0));
    let agent_mesh = meshes.add(Cuboid::new(
        AGENT_MARKER_SIZE,
        AGENT_MARKER_SIZE,
        AGENT_MARKER_SIZE,
    ));
    let beacon_mesh = meshes.add(Sphere::new(BEACON_RADIUS));
    let agent_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.85, 0.78, 0.35),
        perceptual_roughness: 0.6,
        ..default()
    });
    let beacon_material = materials.add(StandardMaterial {
        base_color: Color::srgb(1.0, 0.35, 0.2),
        unlit: true,
        ..default()
    });

    commands.insert_resource(Viewer3dAssets {
        face_mesh,
        agent_mesh,
        agent_material,
        beacon_mesh,
        beacon_material,
    });
    commands.insert_resource(AgentModel::loading(
        asset_server.load(config.model_path.clone()),
    ));

    spawn_ground_grid(&mut commands, &mut meshes, &mut materials);

    spawn_world_camera(&mut commands, Vec3::ZERO);

    commands.spawn((
        DirectionalLight {
            illuminance: 8_000.0,
            ..default()
        },
        Transform::from_xyz(4.0, 10.0, 6.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}

fn spawn_ground_grid(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
) {
    let span = (GRID_HALF_CELLS * 2 + 1) as f32;
    let line_mesh = meshes.add(Cuboid::new(span, GRID_LINE_WIDTH, GRID_LINE_WIDTH));
    let line_material = materials.add(StandardMaterial {
        base_color: Color::srgba(0.55, 0.55, 0.6, 0.5),
        alpha_mode: AlphaMode::Blend,
        unlit: true,
        ..default()
    });

    commands
        .spawn((
            Transform::default(),
            Visibility::default(),
            Name::new("ground_grid"),
            GroundGrid,
        ))
        .with_children(|grid| {
            // block edges sit half a unit off integer coordinates
            for index in -GRID_HALF_CELLS - 1..=GRID_HALF_CELLS {
                let offset = index as f32 + 0.5;
                grid.spawn((
                    Mesh3d(line_mesh.clone()),
                    MeshMaterial3d(line_material.clone()),
                    Transform::from_xyz(0.0, 0.0, offset),
                ));
                grid.spawn((
                    Mesh3d(line_mesh.clone()),
                    MeshMaterial3d(line_material.clone()),
                    Transform::from_xyz(offset, 0.0, 0.0)
                        .with_rotation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2)),
                ));
            }
        });
}

fn spawn_button<C: Component>(
    parent: &mut bevy::ecs::hierarchy::ChildSpawnerCommands,
    label: &str,
    marker: C,
) {
    parent
        .spawn((
            Button,
            Node {
                padding: UiRect::horizontal(Val::Px(10.0)),
                height: Val::Px(28.0),
                align_items: AlignItems::Center,
                justify_content: JustifyContent::Center,
                ..default()
            },
            BackgroundColor(Color::srgb(0.2, 0.2, 0.24)),
            marker,
        ))
        .with_children(|button| {
            button.spawn((
                Text::new(label),
                TextFont {
                    font_size: 14.0,
                    ..default()
                },
                TextColor(Color::WHITE),
            ));
        });
}

fn spawn_world_camera(commands: &mut Commands, focus: Vec3) {
    let transform = Transform::from_xyz(5.0, 8.0, 10.0).looking_at(focus, Vec3::Y);
    let orbit = OrbitCamera::from_transform(&transform, focus);
    commands.spawn((
        Camera3d::default(),
        Camera {
            order: WORLD_CAMERA_ORDER,
            ..default()
        },
        transform,
        Viewer3dCamera,
        orbit,
    ));
}

fn setup_ui(mut commands: Commands) {
    commands.spawn((
        Camera2d,
        Camera {
            order: UI_CAMERA_ORDER,
            ..default()
        },
        IsDefaultUiCamera,
    ));

    commands
        .spawn((
            Node {
                width: Val::Px(UI_PANEL_WIDTH),
                height: Val::Percent(100.0),
                position_type: PositionType::Absolute,
                right: Val::Px(0.0),
                top: Val::Px(0.0),
                flex_direction: FlexDirection::Column,
                row_gap: Val::Px(10.0),
                padding: UiRect::all(Val::Px(12.0)),
                ..default()
            },
            BackgroundColor(Color::srgb(0.1, 0.11, 0.13)),
        ))
        .with_children(|root| {
            root.spawn(Node {
                width: Val::Percent(100.0),
                flex_direction: FlexDirection::Row,
                flex_wrap: FlexWrap::Wrap,
                column_gap: Val::Px(6.0),
                row_gap: Val::Px(6.0),
                ..default()
            })
            .with_children(|controls| {
                for (label, endpoint) in COMMAND_BUTTONS {
                    spawn_button(controls, label, CommandButton { endpoint });
                }
            });

            root.spawn((
                Text::new("Waiting for turtle server..."),
                TextFont {
                    font_size: 15.0,
                    ..default()
                },
                TextColor(Color::WHITE),
                StatusText,
            ));

            root.spawn((
                Node {
                    width: Val::Percent(100.0),
                    flex_direction: FlexDirection::Row,
                    flex_wrap: FlexWrap::Wrap,
                    column_gap: Val::Px(6.0),
                    row_gap: Val::Px(6.0),
                    ..default()
                },
                TurtleListRoot,
            ));

            root.spawn((
                Text::new("World: (no snapshot)"),
                TextFont {
                    font_size: 14.0,
                    ..default()
                },
                TextColor(Color::srgb(0.85, 0.85, 0.85)),
                SummaryText,
            ));
        });

    commands
        .spawn((
            Node {
                display: Display::None,
                position_type: PositionType::Absolute,
                left: Val::Percent(30.0),
                top: Val::Percent(35.0),
                width: Val::Px(360.0),
                flex_direction: FlexDirection::Column,
                row_gap: Val::Px(12.0),
                padding: UiRect::all(Val::Px(16.0)),
                ..default()
            },
            BackgroundColor(Color::srgb(0.3, 0.1, 0.1)),
            AlertOverlay,
        ))
        .with_children(|overlay| {
            overlay.spawn((
                Text::new(""),
                TextFont {
                    font_size: 15.0,
                    ..default()
                },
                TextColor(Color::WHITE),
                AlertText,
            ));
            spawn_button(overlay, "OK", AlertDismissButton);
        });
}

fn update_ui(
    state: Res<ViewerState>,
    scene: Option<Res<Viewer3dScene>>,
    library: Option<Res<FaceMaterialLibrary>>,
    mut queries: ParamSet<(
        Query<&mut Text, With<StatusText>>,
        Query<&mut Text, With<SummaryText>>,
    )>,
) {
    let scene_changed = scene.as_ref().is_some_and(|scene| scene.is_changed());
    if !state.is_changed() && !scene_changed {
        return;
    }

    if let Ok(mut text) = queries.p0().single_mut() {
        text.0 = state.status_line.clone();
    }

    if let Ok(mut text) = queries.p1().single_mut() {
        let mut summary = world_summary(state.snapshot.as_ref());
        if let Some(scene) = scene.as_ref() {
            summary.push_str(&format!("\nscene objects: {}", scene.state.len()));
        }
        if let Some(library) = library.as_ref() {
            summary.push_str(&format!("\nmaterials: {}", library.len()));
        }
        text.0 = summary;
    }
}

fn world_summary(snapshot: Option<&WorldSnapshot>) -> String {
    let Some(snapshot) = snapshot else {
        return "World: (no snapshot)".to_string();
    };
    let active = snapshot
        .active_agent()
        .map(|agent| match agent.facing {
            Some(facing) => format!("#{} at {} facing {facing:?}", agent.label, agent.position),
            None => format!("#{} at {}", agent.label, agent.position),
        })
        .unwrap_or_else(|| "(none)".to_string());

    let mut lines = vec![
        "World:".to_string(),
        format!("turtles: {}", snapshot.agents.len()),
        format!("active: {active}"),
        format!(
            "blocks: {} ({} inspected)",
            snapshot.known_block_count(),
            snapshot.blocks.len()
        ),
    ];
    if snapshot.skipped_keys > 0 {
        lines.push(format!("skipped keys: {}", snapshot.skipped_keys));
    }
    lines.join("\n")
}

fn update_alert_overlay(
    state: Res<ViewerState>,
    mut overlays: Query<&mut Node, With<AlertOverlay>>,
    mut texts: Query<&mut Text, With<AlertText>>,
) {
    if !state.is_changed() {
        return;
    }
    if let Ok(mut node) = overlays.single_mut() {
        node.display = if state.alert.is_some() {
            Display::Flex
        } else {
            Display::None
        };
    }
    if let Ok(mut text) = texts.single_mut() {
        text.0 = state.alert.clone().unwrap_or_default();
    }
}

/// Rebuilds the selector only when the set of turtle labels changes.
fn sync_turtle_buttons(
    mut commands: Commands,
    state: Res<ViewerState>,
    roots: Query<Entity, With<TurtleListRoot>>,
    buttons: Query<Entity, With<TurtleSelectButton>>,
    mut shown: Local<Option<Vec<(String, bool)>>>,
) {
    if !state.is_changed() {
        return;
    }
    let Some(snapshot) = state.snapshot.as_ref() else {
        return;
    };
    let labels: Vec<(String, bool)> = snapshot
        .agents
        .iter()
        .map(|agent| (agent.label.clone(), agent.is_active))
        .collect();
    if shown.as_ref() == Some(&labels) {
        return;
    }
    let Ok(root) = roots.single() else {
        return;
    };

    for entity in buttons.iter() {
        commands.entity(entity).despawn();
    }
    commands.entity(root).with_children(|list| {
        for (label, is_active) in &labels {
            let text = if *is_active {
                format!("#{label} *")
            } else {
                format!("#{label}")
            };
            spawn_button(
                list,
                &text,
                TurtleSelectButton {
                    label: label.clone(),
                },
            );
        }
    });
    *shown = Some(labels);
}

fn handle_command_buttons(
    interactions: Query<(&Interaction, &CommandButton), (Changed<Interaction>, With<Button>)>,
    client: Option<Res<ViewerClient>>,
    mut state: ResMut<ViewerState>,
) {
    for (interaction, button) in &interactions {
        if *interaction != Interaction::Pressed {
            continue;
        }
        match client.as_ref() {
            Some(client) => {
                if !client.send_command(button.endpoint) {
                    state.status_line = COMMAND_ERROR_MESSAGE.to_string();
                }
            }
            None => state.status_line = "Commands are disabled offline.".to_string(),
        }
    }
}

fn handle_turtle_buttons(
    interactions: Query<(&Interaction, &TurtleSelectButton), (Changed<Interaction>, With<Button>)>,
    client: Option<Res<ViewerClient>>,
    mut state: ResMut<ViewerState>,
) {
    for (interaction, button) in &interactions {
        if *interaction != Interaction::Pressed {
            continue;
        }
        let sent = client
            .as_ref()
            .is_some_and(|client| client.select_turtle(&button.label));
        if !sent {
            state.alert = Some(turtle_world::SELECT_TURTLE_FALLBACK_ERROR.to_string());
        }
    }
}

fn handle_alert_dismiss(
    interactions: Query<&Interaction, (Changed<Interaction>, With<AlertDismissButton>)>,
    mut state: ResMut<ViewerState>,
) {
    if interactions
        .iter()
        .any(|interaction| *interaction == Interaction::Pressed)
    {
        state.alert = None;
    }
}

fn focus_camera_on_snapshot(
    state: Res<ViewerState>,
    mut cameras: Query<(&mut OrbitCamera, &mut Transform), With<Viewer3dCamera>>,
    mut grids: Query<&mut Transform, (With<GroundGrid>, Without<Viewer3dCamera>)>,
    mut focused: Local<bool>,
) {
    if *focused {
        return;
    }
    let Some(snapshot) = state.snapshot.as_ref() else {
        return;
    };
    let target = snapshot
        .active_agent()
        .map(|agent| place_agent(agent.position, agent.facing).translation)
        .or_else(|| snapshot.blocks.keys().next().map(|key| block_center(*key)));
    let Some([x, y, z]) = target else {
        return;
    };
    let Ok((mut orbit, mut transform)) = cameras.single_mut() else {
        return;
    };
    orbit.focus = Vec3::new(x, y, z);
    orbit.apply_to_transform(&mut transform);
    if let Ok(mut grid) = grids.single_mut() {
        grid.translation = Vec3::new(x.round(), y - 0.5, z.round());
    }
    *focused = true;
}

fn update_3d_viewport(
    windows: Query<&Window, With<PrimaryWindow>>,
    mut cameras: Query<&mut Camera, With<Viewer3dCamera>>,
) {
    let Ok(window) = windows.single() else {
        return;
    };
    let Ok(mut camera) = cameras.single_mut() else {
        return;
    };

    let panel_width_physical = (UI_PANEL_WIDTH * window.scale_factor()).round() as u32;
    let window_width = window.physical_width();
    let window_height = window.physical_height().max(1);
    let render_width = window_width.saturating_sub(panel_width_physical).max(1);

    camera.viewport = Some(Viewport {
        physical_position: UVec2::ZERO,
        physical_size: UVec2::new(render_width, window_height),
        depth: 0.0..1.0,
    });
}

/// Left drag orbits, middle drag pans, the wheel zooms. Right click is kept
/// free for block inspection.
fn orbit_camera_controls(
    mut mouse_motion: MessageReader<MouseMotion>,
    mut mouse_wheel: MessageReader<MouseWheel>,
    buttons: Res<ButtonInput<MouseButton>>,
    mut query: Query<(&mut OrbitCamera, &mut Transform), With<Viewer3dCamera>>,
) {
    let mut delta = Vec2::ZERO;
    for event in mouse_motion.read() {
        delta += event.delta;
    }

    let mut scroll = 0.0;
    for event in mouse_wheel.read() {
        scroll += event.y;
    }

    if delta == Vec2::ZERO && scroll == 0.0 {
        return;
    }

    let Ok((mut orbit, mut transform)) = query.single_mut() else {
        return;
    };

    let mut changed = false;

    if buttons.pressed(MouseButton::Left) && delta != Vec2::ZERO {
        orbit.yaw -= delta.x * ORBIT_ROTATE_SENSITIVITY;
        orbit.pitch = (orbit.pitch + delta.y * ORBIT_ROTATE_SENSITIVITY).clamp(-1.54, 1.54);
        changed = true;
    } else if buttons.pressed(MouseButton::Middle) && delta != Vec2::ZERO {
        let rotation = Quat::from_axis_angle(Vec3::Y, orbit.yaw)
            * Quat::from_axis_angle(Vec3::X, -orbit.pitch);
        let right = rotation * Vec3::X;
        let up = rotation * Vec3::Y;
        let pan_scale = orbit.radius * ORBIT_PAN_SENSITIVITY;
        orbit.focus += (-delta.x * pan_scale) * right + (delta.y * pan_scale) * up;
        changed = true;
    }

    if scroll != 0.0 {
        orbit.radius = (orbit.radius * (1.0 - scroll * ORBIT_ZOOM_SENSITIVITY))
            .clamp(ORBIT_MIN_RADIUS, ORBIT_MAX_RADIUS);
        changed = true;
    }

    if changed {
        orbit.apply_to_transform(&mut transform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turtle_world::{StatusResponse, SyncEvent};

    fn snapshot_from(json: &str) -> WorldSnapshot {
        let status: StatusResponse = serde_json::from_str(json).expect("decode status");
        WorldSnapshot::from_status(&status)
    }

    fn client_pair() -> (ViewerClient, Receiver<SyncRequest>) {
        let (tx, rx) = mpsc::channel::<SyncRequest>();
        let client = ViewerClient {
            tx,
            rx: Mutex::new(mpsc::channel::<SyncEvent>().1),
            generation: CommandGeneration::default(),
        };
        (client, rx)
    }

    const TWO_TURTLES: &str = r#"{
        "current_turtle": {"x": 1, "y": 64, "z": -3, "direction": 3},
        "turtles": {"7": {"x": 1, "y": 64, "z": -3, "direction": 3},
                    "8": {"x": 9, "y": 60, "z": 0}},
        "block_stats": {"(1, 63, -3)": {"name": "minecraft:grass_block"},
                        "(2, 64, -3)": "No block to inspect",
                        "bogus": {"name": "minecraft:stone"}}
    }"#;

    #[test]
    fn update_ui_sets_status_and_summary() {
        let mut app = App::new();
        app.add_systems(Update, update_ui);

        app.world_mut().spawn((Text::new(""), StatusText));
        app.world_mut().spawn((Text::new(""), SummaryText));
        app.world_mut().insert_resource(ViewerState {
            status_line: "Moved forward".to_string(),
            snapshot: Some(snapshot_from(TWO_TURTLES)),
            snapshot_revision: 1,
            alert: None,
            worker_stopped: false,
        });

        app.update();

        let world = app.world_mut();
        let mut status = world.query::<(&Text, &StatusText)>();
        let (status_text, _) = status.single(world).expect("status text");
        assert_eq!(status_text.0, "Moved forward");

        let mut summary = world.query::<(&Text, &SummaryText)>();
        let (summary_text, _) = summary.single(world).expect("summary text");
        assert!(summary_text.0.contains("turtles: 2"));
        assert!(summary_text.0.contains("active: #7 at (1, 64, -3) facing South"));
        assert!(summary_text.0.contains("blocks: 1 (2 inspected)"));
        assert!(summary_text.0.contains("skipped keys: 1"));
    }

    #[test]
    fn world_summary_without_snapshot() {
        assert_eq!(world_summary(None), "World: (no snapshot)");
    }

    #[test]
    fn command_buttons_send_expected_endpoints() {
        let mut app = App::new();
        app.add_systems(Update, handle_command_buttons);
        let (client, rx) = client_pair();
        app.world_mut().insert_resource(client);
        app.world_mut().insert_resource(ViewerState::default());

        for (_, endpoint) in COMMAND_BUTTONS {
            app.world_mut()
                .spawn((Button, Interaction::Pressed, CommandButton { endpoint }));
        }

        app.update();

        let mut seen: Vec<String> = rx
            .try_iter()
            .filter_map(|request| match request {
                SyncRequest::Command { endpoint, .. } => Some(endpoint),
                _ => None,
            })
            .collect();
        seen.sort();
        let mut expected: Vec<String> = COMMAND_BUTTONS
            .iter()
            .map(|(_, endpoint)| endpoint.to_string())
            .collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn command_buttons_offline_report_disabled() {
        let mut app = App::new();
        app.add_systems(Update, handle_command_buttons);
        app.world_mut().insert_resource(ViewerState::default());
        app.world_mut().spawn((
            Button,
            Interaction::Pressed,
            CommandButton {
                endpoint: "/stop",
            },
        ));

        app.update();

        assert_eq!(
            app.world().resource::<ViewerState>().status_line,
            "Commands are disabled offline."
        );
    }

    #[test]
    fn turtle_button_sends_selection_request() {
        let mut app = App::new();
        app.add_systems(Update, handle_turtle_buttons);
        let (client, rx) = client_pair();
        app.world_mut().insert_resource(client);
        app.world_mut().insert_resource(ViewerState::default());
        app.world_mut().spawn((
            Button,
            Interaction::Pressed,
            TurtleSelectButton {
                label: "8".to_string(),
            },
        ));

        app.update();

        match rx.try_recv().expect("request sent") {
            SyncRequest::SelectTurtle { label } => assert_eq!(label, "8"),
            other => panic!("unexpected request: {other:?}"),
        }
        assert!(app.world().resource::<ViewerState>().alert.is_none());
    }

    #[test]
    fn alert_overlay_shows_and_dismisses() {
        let mut app = App::new();
        app.add_systems(Update, (handle_alert_dismiss, update_alert_overlay).chain());
        app.world_mut().spawn((
            Node {
                display: Display::None,
                ..default()
            },
            AlertOverlay,
        ));
        app.world_mut().spawn((Text::new(""), AlertText));
        app.world_mut().insert_resource(ViewerState {
            alert: Some("Turtle 8 is busy".to_string()),
            ..ViewerState::default()
        });

        app.update();
        {
            let world = app.world_mut();
            let mut overlay = world.query::<(&Node, &AlertOverlay)>();
            let (node, _) = overlay.single(world).expect("overlay");
            assert_eq!(node.display, Display::Flex);
            let mut text = world.query::<(&Text, &AlertText)>();
            let (text, _) = text.single(world).expect("alert text");
            assert_eq!(text.0, "Turtle 8 is busy");
        }

        app.world_mut()
            .spawn((Button, Interaction::Pressed, AlertDismissButton));
        app.update();

        assert!(app.world().resource::<ViewerState>().alert.is_none());
        let world = app.world_mut();
        let mut overlay = world.query::<(&Node, &AlertOverlay)>();
        let (node, _) = overlay.single(world).expect("overlay");
        assert_eq!(node.display, Display::None);
    }

    #[test]
    fn turtle_selector_lists_every_turtle_and_marks_active() {
        let mut app = App::new();
        app.add_systems(Update, sync_turtle_buttons);
        app.world_mut().spawn((Node::default(), TurtleListRoot));
        app.world_mut().insert_resource(ViewerState {
            snapshot: Some(snapshot_from(TWO_TURTLES)),
            snapshot_revision: 1,
            ..ViewerState::default()
        });

        app.update();

        let world = app.world_mut();
        let mut buttons = world.query::<&TurtleSelectButton>();
        let mut labels: Vec<String> = buttons
            .iter(world)
            .map(|button| button.label.clone())
            .collect();
        labels.sort();
        assert_eq!(labels, vec!["7".to_string(), "8".to_string()]);

        let mut texts = world.query::<&Text>();
        assert!(texts.iter(world).any(|text| text.0 == "#7 *"));
        assert!(texts.iter(world).any(|text| text.0 == "#8"));

        // an identical label set does not respawn the selector
        app.world_mut().resource_mut::<ViewerState>().snapshot_revision = 2;
        app.update();
        let world = app.world_mut();
        let mut buttons = world.query::<&TurtleSelectButton>();
        assert_eq!(buttons.iter(world).count(), 2);
    }

    #[test]
    fn first_snapshot_focuses_camera_on_active_turtle() {
        let mut app = App::new();
        app.add_systems(Update, focus_camera_on_snapshot);
        let transform = Transform::from_xyz(5.0, 8.0, 10.0).looking_at(Vec3::ZERO, Vec3::Y);
        let orbit = OrbitCamera::from_transform(&transform, Vec3::ZERO);
        app.world_mut().spawn((transform, orbit, Viewer3dCamera));
        app.world_mut().spawn((Transform::default(), GroundGrid));
        app.world_mut().insert_resource(ViewerState {
            snapshot: Some(snapshot_from(TWO_TURTLES)),
            snapshot_revision: 1,
            ..ViewerState::default()
        });

        app.update();

        let world = app.world_mut();
        let mut cameras = world.query::<(&OrbitCamera, &Transform)>();
        let (orbit, transform) = cameras.single(world).expect("camera");
        assert_eq!(orbit.focus, Vec3::new(1.0, 64.5, -3.0));
        assert!((transform.translation.distance(orbit.focus) - orbit.radius).abs() < 1e-3);

        let mut grids = world.query::<(&Transform, &GroundGrid)>();
        let (grid, _) = grids.single(world).expect("grid");
        assert_eq!(grid.translation, Vec3::new(1.0, 64.0, -3.0));
    }

    #[test]
    fn ui_camera_draws_after_the_world_camera() {
        let mut app = App::new();
        app.add_systems(
            Startup,
            (setup_ui, |mut commands: Commands| {
                spawn_world_camera(&mut commands, Vec3::ZERO)
            }),
        );
        app.update();

        let mut world_cameras = app
            .world_mut()
            .query_filtered::<&Camera, With<Viewer3dCamera>>();
        let world_order = world_cameras.single(app.world()).expect("world camera").order;
        let mut ui_cameras = app
            .world_mut()
            .query_filtered::<&Camera, With<IsDefaultUiCamera>>();
        let ui_order = ui_cameras.single(app.world()).expect("ui camera").order;

        assert_eq!(world_order, WORLD_CAMERA_ORDER);
        assert!(ui_order > world_order);
    }

    #[test]
    fn orbit_camera_round_trips_its_transform() {
        let transform = Transform::from_xyz(5.0, 8.0, 10.0).looking_at(Vec3::ZERO, Vec3::Y);
        let orbit = OrbitCamera::from_transform(&transform, Vec3::ZERO);
        let mut applied = Transform::default();
        orbit.apply_to_transform(&mut applied);
        assert!(applied.translation.distance(transform.translation) < 1e-3);
    }
}
