use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer block position as reported by the turtle server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl Coordinate {
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// `None` when a component would leave the `i64` range.
    pub fn offset(self, delta: [i64; 3]) -> Option<Self> {
        Some(Self {
            x: self.x.checked_add(delta[0])?,
            y: self.y.checked_add(delta[1])?,
            z: self.z.checked_add(delta[2])?,
        })
    }

    /// Parses a `block_stats` key. The server writes Python tuple reprs, so the
    /// accepted form is exactly `(<int>, <int>, <int>)` with one space after each
    /// comma; anything else is rejected.
    pub fn parse_key(key: &str) -> Result<Self, CoordinateParseError> {
        let inner = key
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| CoordinateParseError::MissingParens {
                key: key.to_string(),
            })?;

        let parts: Vec<&str> = inner.split(", ").collect();
        if parts.len() != 3 {
            return Err(CoordinateParseError::ComponentCount {
                key: key.to_string(),
                found: parts.len(),
            });
        }

        let mut values = [0_i64; 3];
        for (slot, part) in values.iter_mut().zip(parts) {
            *slot = parse_component(key, part)?;
        }
        Ok(Self::new(values[0], values[1], values[2]))
    }

    pub fn to_key(self) -> String {
        self.to_string()
    }
}

fn parse_component(key: &str, part: &str) -> Result<i64, CoordinateParseError> {
    let digits = part.strip_prefix('-').unwrap_or(part);
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(CoordinateParseError::InvalidComponent {
            key: key.to_string(),
            component: part.to_string(),
        });
    }
    part.parse::<i64>()
        .map_err(|_| CoordinateParseError::InvalidComponent {
            key: key.to_string(),
            component: part.to_string(),
        })
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinateParseError {
    MissingParens { key: String },
    ComponentCount { key: String, found: usize },
    InvalidComponent { key: String, component: String },
}

impl fmt::Display for CoordinateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateParseError::MissingParens { key } => {
                write!(f, "coordinate key is not parenthesized: {key}")
            }
            CoordinateParseError::ComponentCount { key, found } => {
                write!(f, "coordinate key has {found} components, expected 3: {key}")
            }
            CoordinateParseError::InvalidComponent { key, component } => {
                write!(f, "invalid coordinate component {component:?} in {key}")
            }
        }
    }
}

impl Error for CoordinateParseError {}
