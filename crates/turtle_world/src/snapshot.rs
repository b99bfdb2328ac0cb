use std::collections::BTreeMap;
use std::f32::consts::{FRAC_PI_2, PI};

use crate::coordinate::Coordinate;
use crate::status::{BlockEntry, StatusResponse, TurtleRecord};

/// Cardinal heading as reported in the turtle's `direction` field (1..=4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facing {
    North,
    East,
    South,
    West,
}

/// Yaw per facing, indexed by `Facing as usize`.
const FACING_YAW: [f32; 4] = [0.0, FRAC_PI_2, PI, -FRAC_PI_2];

impl Facing {
    pub fn from_wire(direction: i64) -> Option<Self> {
        match direction {
            1 => Some(Facing::North),
            2 => Some(Facing::East),
            3 => Some(Facing::South),
            4 => Some(Facing::West),
            _ => None,
        }
    }

    pub fn yaw(self) -> f32 {
        FACING_YAW[self as usize]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentState {
    pub label: String,
    pub position: Coordinate,
    pub facing: Option<Facing>,
    pub is_active: bool,
}

impl AgentState {
    fn from_record(label: String, record: &TurtleRecord, is_active: bool) -> Self {
        Self {
            label,
            position: record.position(),
            facing: record.direction.and_then(Facing::from_wire),
            is_active,
        }
    }
}

/// One decoded `/status` response. Replaced wholesale on every poll.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorldSnapshot {
    pub agents: Vec<AgentState>,
    pub blocks: BTreeMap<Coordinate, BlockEntry>,
    pub skipped_keys: usize,
}

impl WorldSnapshot {
    pub fn from_status(status: &StatusResponse) -> Self {
        let mut blocks = BTreeMap::new();
        let mut skipped_keys = 0;
        for (key, entry) in &status.block_stats {
            match Coordinate::parse_key(key) {
                Ok(coordinate) => {
                    blocks.insert(coordinate, entry.clone());
                }
                Err(_) => skipped_keys += 1,
            }
        }

        Self {
            agents: collect_agents(status),
            blocks,
            skipped_keys,
        }
    }

    pub fn active_agent(&self) -> Option<&AgentState> {
        self.agents.iter().find(|agent| agent.is_active)
    }

    pub fn known_block_count(&self) -> usize {
        self.blocks
            .values()
            .filter(|entry| entry.descriptor().is_some())
            .count()
    }
}

// The status payload names the current turtle by value, not by label, so the
// first record equal to it is the active one.
fn collect_agents(status: &StatusResponse) -> Vec<AgentState> {
    let current = status.current_turtle;
    let mut active_assigned = false;
    let mut agents = Vec::new();

    if let Some(turtles) = status.turtles.as_ref() {
        for (label, record) in turtles.labeled() {
            let is_active = !active_assigned && current == Some(record);
            active_assigned |= is_active;
            agents.push(AgentState::from_record(label, &record, is_active));
        }
    }

    if let (Some(record), false) = (current, active_assigned) {
        agents.push(AgentState::from_record("current".to_string(), &record, true));
    }

    agents
}
