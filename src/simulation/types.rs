//! Core types for the traffic simulation
//!
//! Plain value types shared by the engine, the spawner and the player.

/// A unique identifier for simulation entities
/// This is a simple wrapper around a usize for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimId(pub usize);

/// A wrapper type for traffic agent IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub SimId);

/// Paint color of a traffic vehicle. Cosmetic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleColor {
    Red,
    Blue,
    Green,
    Yellow,
    White,
    Black,
}

impl VehicleColor {
    pub const ALL: [VehicleColor; 6] = [
        VehicleColor::Red,
        VehicleColor::Blue,
        VehicleColor::Green,
        VehicleColor::Yellow,
        VehicleColor::White,
        VehicleColor::Black,
    ];

    /// Single character used by the terminal map
    pub fn glyph(&self) -> char {
        match self {
            VehicleColor::Red => 'r',
            VehicleColor::Blue => 'b',
            VehicleColor::Green => 'g',
            VehicleColor::Yellow => 'y',
            VehicleColor::White => 'w',
            VehicleColor::Black => 'k',
        }
    }
}

/// A 2D position in world coordinates.
///
/// `y` decreases in the direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Lane reserved for the player. Traffic never occupies it.
pub const PLAYER_HOME_LANE: usize = 0;

/// Visual sprite size of every vehicle, in world units
pub const SPRITE_WIDTH: f32 = 40.0;
pub const SPRITE_LENGTH: f32 = 80.0;
