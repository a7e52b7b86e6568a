//! The player's vehicle
//!
//! Driven by human input rather than by the traffic engine. Traffic only
//! ever sees it through a [`PlayerSnapshot`].

use super::kinematics::{approach_speed, SpeedScale};
use super::types::Position;

/// Mass the handling figures of a [`CarSpec`] are quoted against
pub const REFERENCE_MASS: f32 = 1200.0;
/// Speed lost per tick when coasting, in units/tick
pub const COAST_DRAG: f32 = 0.01;
/// Lateral units per tick at full steering lock
pub const MAX_LATERAL_SPEED: f32 = 4.0;

/// Handling and fuel figures of a car
#[derive(Debug, Clone, PartialEq)]
pub struct CarSpec {
    pub name: String,
    /// kg
    pub mass: f32,
    /// Speed gained per tick at full throttle for a reference-mass car
    pub acceleration: f32,
    /// Speed shed per tick at full brake for a reference-mass car
    pub braking: f32,
    pub top_speed_mph: f32,
    pub fuel_capacity: f32,
    /// Fuel used per tick at full throttle
    pub fuel_burn: f32,
}

impl Default for CarSpec {
    fn default() -> Self {
        Self {
            name: "Hatchback".to_string(),
            mass: REFERENCE_MASS,
            acceleration: 0.06,
            braking: 0.25,
            top_speed_mph: 110.0,
            fuel_capacity: 100.0,
            fuel_burn: 0.002,
        }
    }
}

/// Driver controls for one tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerInput {
    /// 0..=1
    pub throttle: f32,
    /// 0..=1
    pub brake: f32,
    /// -1 (left) ..= 1 (right)
    pub steer: f32,
}

impl PlayerInput {
    /// Autopilot: hold `target` units/tick and steer toward `lane_x`.
    pub fn hold_speed(player: &PlayerVehicle, target: f32, lane_x: f32) -> Self {
        let error = target - player.velocity_y;
        let (throttle, brake) = if error > 0.0 {
            ((error * 4.0).min(1.0), 0.0)
        } else {
            (0.0, (-error * 4.0).min(1.0))
        };
        let steer = ((lane_x - player.position.x) / 50.0).clamp(-1.0, 1.0);
        Self {
            throttle,
            brake,
            steer,
        }
    }
}

/// Read-only view of the player handed to the traffic engine each tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerSnapshot {
    pub position: Position,
    /// Forward speed in units/tick
    pub speed: f32,
}

/// The player's car
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerVehicle {
    pub position: Position,
    pub velocity_x: f32,
    /// Forward speed in units/tick, never negative
    pub velocity_y: f32,
    /// -1..=1
    pub steering_angle: f32,
    pub spec: CarSpec,
    pub fuel: f32,
}

impl PlayerVehicle {
    pub fn new(spec: CarSpec, position: Position) -> Self {
        let fuel = spec.fuel_capacity;
        Self {
            position,
            velocity_x: 0.0,
            velocity_y: 0.0,
            steering_angle: 0.0,
            spec,
            fuel,
        }
    }

    pub fn is_out_of_fuel(&self) -> bool {
        self.fuel <= 0.0
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            position: self.position,
            speed: self.velocity_y,
        }
    }

    /// Advance one tick.
    pub fn update(&mut self, input: &PlayerInput, scale: &SpeedScale) {
        let mass_factor = REFERENCE_MASS / self.spec.mass.max(1.0);
        let throttle = if self.is_out_of_fuel() {
            0.0
        } else {
            input.throttle.clamp(0.0, 1.0)
        };
        let brake = input.brake.clamp(0.0, 1.0);
        let top_speed = scale.to_units(self.spec.top_speed_mph);

        let acceleration = self.spec.acceleration * mass_factor * throttle;
        let deceleration = self.spec.braking * mass_factor * brake + COAST_DRAG;
        let target = if throttle > 0.0 { top_speed } else { 0.0 };
        self.velocity_y = approach_speed(self.velocity_y, target, acceleration, deceleration);

        self.steering_angle = input.steer.clamp(-1.0, 1.0);
        // Steering only bites while moving
        let grip = (self.velocity_y / top_speed.max(f32::EPSILON)).min(1.0).sqrt();
        self.velocity_x = self.steering_angle * MAX_LATERAL_SPEED * grip;

        self.position.x += self.velocity_x;
        self.position.y -= self.velocity_y;

        self.fuel = (self.fuel - self.spec.fuel_burn * throttle).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_throttle_without_fuel() {
        let scale = SpeedScale::new(6.0, 60);
        let mut player = PlayerVehicle::new(CarSpec::default(), Position::new(50.0, 0.0));
        player.fuel = 0.0;
        let input = PlayerInput {
            throttle: 1.0,
            ..Default::default()
        };
        player.update(&input, &scale);
        assert_eq!(player.velocity_y, 0.0);
        assert_eq!(player.position.y, 0.0);
    }

    #[test]
    fn heavier_cars_accelerate_slower() {
        let scale = SpeedScale::new(6.0, 60);
        let light = CarSpec::default();
        let heavy = CarSpec {
            mass: light.mass * 2.0,
            ..light.clone()
        };
        let mut a = PlayerVehicle::new(light, Position::default());
        let mut b = PlayerVehicle::new(heavy, Position::default());
        let input = PlayerInput {
            throttle: 1.0,
            ..Default::default()
        };
        for _ in 0..10 {
            a.update(&input, &scale);
            b.update(&input, &scale);
        }
        assert!(a.velocity_y > b.velocity_y);
        assert!(a.fuel < a.spec.fuel_capacity);
    }
}
