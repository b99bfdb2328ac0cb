//! Block map to visible faces, and agent pose to model transform.
//!
//! A block at `(x, y, z)` occupies the unit cell centered on
//! `(x, y + 0.5, z)`. Faces are unit quads whose rest orientation faces +Z.

use std::collections::BTreeMap;
use std::f32::consts::{FRAC_PI_2, PI};

use crate::coordinate::Coordinate;
use crate::snapshot::Facing;
use crate::status::BlockEntry;

pub const BLOCK_NAMESPACE_PREFIX: &str = "minecraft:";
pub const FACE_HALF_EXTENT: f32 = 0.5;
pub const DEFAULT_FACE_OPACITY: f32 = 0.85;
/// Turns the agent model's forward axis onto the turtle's +X heading.
pub const MODEL_YAW_OFFSET: f32 = FRAC_PI_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FaceDirection {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

/// Euler angles (radians) applied X then Y to a +Z facing quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRotation {
    pub x: f32,
    pub y: f32,
}

struct FacePlacement {
    direction: FaceDirection,
    normal: [i64; 3],
    rotation: FaceRotation,
}

const FACE_TABLE: [FacePlacement; 6] = [
    FacePlacement {
        direction: FaceDirection::PosX,
        normal: [1, 0, 0],
        rotation: FaceRotation { x: 0.0, y: FRAC_PI_2 },
    },
    FacePlacement {
        direction: FaceDirection::NegX,
        normal: [-1, 0, 0],
        rotation: FaceRotation { x: 0.0, y: -FRAC_PI_2 },
    },
    FacePlacement {
        direction: FaceDirection::PosY,
        normal: [0, 1, 0],
        rotation: FaceRotation { x: -FRAC_PI_2, y: 0.0 },
    },
    FacePlacement {
        direction: FaceDirection::NegY,
        normal: [0, -1, 0],
        rotation: FaceRotation { x: FRAC_PI_2, y: 0.0 },
    },
    FacePlacement {
        direction: FaceDirection::PosZ,
        normal: [0, 0, 1],
        rotation: FaceRotation { x: 0.0, y: 0.0 },
    },
    FacePlacement {
        direction: FaceDirection::NegZ,
        normal: [0, 0, -1],
        rotation: FaceRotation { x: 0.0, y: PI },
    },
];

impl FaceDirection {
    pub const ALL: [FaceDirection; 6] = [
        FaceDirection::PosX,
        FaceDirection::NegX,
        FaceDirection::PosY,
        FaceDirection::NegY,
        FaceDirection::PosZ,
        FaceDirection::NegZ,
    ];

    fn placement(self) -> &'static FacePlacement {
        &FACE_TABLE[self as usize]
    }

    pub fn normal(self) -> [i64; 3] {
        self.placement().normal
    }

    pub fn rotation(self) -> FaceRotation {
        self.placement().rotation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderableFace {
    pub source: Coordinate,
    pub direction: FaceDirection,
    pub material_key: String,
}

impl RenderableFace {
    pub fn center(&self) -> [f32; 3] {
        let block = block_center(self.source);
        let normal = self.direction.normal();
        [
            block[0] + normal[0] as f32 * FACE_HALF_EXTENT,
            block[1] + normal[1] as f32 * FACE_HALF_EXTENT,
            block[2] + normal[2] as f32 * FACE_HALF_EXTENT,
        ]
    }

    pub fn rotation(&self) -> FaceRotation {
        self.direction.rotation()
    }
}

pub fn block_center(coordinate: Coordinate) -> [f32; 3] {
    [
        coordinate.x as f32,
        coordinate.y as f32 + 0.5,
        coordinate.z as f32,
    ]
}

/// Emits one face per side whose neighbor is absent, unknown, or of another type.
pub fn map_snapshot(blocks: &BTreeMap<Coordinate, BlockEntry>) -> Vec<RenderableFace> {
    let mut faces = Vec::new();
    for (coordinate, entry) in blocks {
        let Some(descriptor) = entry.descriptor() else {
            continue;
        };
        for direction in FaceDirection::ALL {
            let neighbor = coordinate
                .offset(direction.normal())
                .and_then(|position| blocks.get(&position))
                .and_then(BlockEntry::descriptor);
            let hidden = neighbor.is_some_and(|other| other.type_name == descriptor.type_name);
            if !hidden {
                faces.push(RenderableFace {
                    source: *coordinate,
                    direction,
                    material_key: descriptor.type_name.clone(),
                });
            }
        }
    }
    faces
}

/// `minecraft:oak_log` -> `oak_log`; other namespaces are kept verbatim.
pub fn material_texture_name(type_name: &str) -> &str {
    type_name
        .strip_prefix(BLOCK_NAMESPACE_PREFIX)
        .unwrap_or(type_name)
}

pub fn material_texture_path(texture_root: &str, type_name: &str) -> String {
    let root = texture_root.trim_end_matches('/');
    let name = material_texture_name(type_name);
    if root.is_empty() {
        format!("{name}.png")
    } else {
        format!("{root}/{name}.png")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentTransform {
    pub translation: [f32; 3],
    pub yaw: f32,
}

pub fn place_agent(position: Coordinate, facing: Option<Facing>) -> AgentTransform {
    AgentTransform {
        translation: block_center(position),
        yaw: facing.map(Facing::yaw).unwrap_or(0.0) + MODEL_YAW_OFFSET,
    }
}
