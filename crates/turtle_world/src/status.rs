//! Wire types for the turtle server's HTTP surface.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::coordinate::Coordinate;

pub const COMMAND_SENT_FALLBACK: &str = "Command sent.";
pub const SELECT_TURTLE_FALLBACK_ERROR: &str = "Failed to select turtle.";

/// Body of `GET /status`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub current_turtle: Option<TurtleRecord>,
    #[serde(default)]
    pub turtles: Option<TurtleCollection>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub block_stats: BTreeMap<String, BlockEntry>,
}

impl StatusResponse {
    /// Observable state used to decide whether a command took effect.
    pub fn current_pose(&self) -> Option<AgentPose> {
        self.current_turtle.as_ref().map(TurtleRecord::pose)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TurtleRecord {
    pub x: i64,
    pub y: i64,
    pub z: i64,
    #[serde(default)]
    pub direction: Option<i64>,
}

impl TurtleRecord {
    pub fn position(&self) -> Coordinate {
        Coordinate::new(self.x, self.y, self.z)
    }

    pub fn pose(&self) -> AgentPose {
        AgentPose {
            position: self.position(),
            direction: self.direction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentPose {
    pub position: Coordinate,
    pub direction: Option<i64>,
}

/// The server keys turtles by label; older builds sent a bare list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TurtleCollection {
    Map(BTreeMap<String, TurtleRecord>),
    List(Vec<TurtleRecord>),
}

impl TurtleCollection {
    pub fn labeled(&self) -> Vec<(String, TurtleRecord)> {
        match self {
            TurtleCollection::Map(records) => records
                .iter()
                .map(|(label, record)| (label.clone(), *record))
                .collect(),
            TurtleCollection::List(records) => records
                .iter()
                .enumerate()
                .map(|(index, record)| (index.to_string(), *record))
                .collect(),
        }
    }
}

/// One `block_stats` value. Inspect results arrive as objects with a `name`;
/// failed inspections arrive as bare strings or `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockEntry {
    Known(BlockDescriptor),
    Unknown,
}

impl BlockEntry {
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut fields) = value else {
            return BlockEntry::Unknown;
        };
        match fields.remove("name") {
            Some(Value::String(type_name)) => BlockEntry::Known(BlockDescriptor {
                type_name,
                properties: fields.into_iter().collect(),
            }),
            _ => BlockEntry::Unknown,
        }
    }

    pub fn known(type_name: impl Into<String>) -> Self {
        BlockEntry::Known(BlockDescriptor::new(type_name))
    }

    pub fn descriptor(&self) -> Option<&BlockDescriptor> {
        match self {
            BlockEntry::Known(descriptor) => Some(descriptor),
            BlockEntry::Unknown => None,
        }
    }
}

impl<'de> Deserialize<'de> for BlockEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(BlockEntry::from_value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockDescriptor {
    pub type_name: String,
    pub properties: BTreeMap<String, Value>,
}

impl BlockDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: BTreeMap::new(),
        }
    }
}

/// Body of any `POST /<command>` call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn display_message(&self) -> String {
        non_empty(self.message.as_deref())
            .unwrap_or(COMMAND_SENT_FALLBACK)
            .to_string()
    }
}

/// Body of `POST /set_turtle`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct SetTurtleResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl SetTurtleResponse {
    pub fn failure_detail(&self) -> String {
        non_empty(self.error.as_deref())
            .or_else(|| non_empty(self.message.as_deref()))
            .unwrap_or(SELECT_TURTLE_FALLBACK_ERROR)
            .to_string()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
