//! Highway Traffic Simulation Library
//!
//! The traffic core of a top-down highway driving game: autonomous agents
//! sharing a multi-lane road with the player, updated by a fixed-rate tick
//! and readable from other threads.

pub mod simulation;
