// components.rs - Demo component types
//
// Rust components are declared with `define_component!`; `Health` is only
// known to the world as a raw byte layout and is accessed through bytemuck.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use weft_core::define_component;
use weft_core::ecs::ComponentId;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position(pub Vec3);
define_component!(Position, 1, "Position", copy);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Velocity(pub Vec3);
define_component!(Velocity, 2, "Velocity", copy);

/// Tag added once a particle has come to rest on the floor.
#[derive(Clone, Copy, Debug, Default)]
pub struct Grounded;
define_component!(Grounded, 3, "Grounded", copy);

#[derive(Clone, Debug, PartialEq)]
pub struct Label(pub String);
define_component!(Label, 4, "Label");

pub const HEALTH_ID: ComponentId = 100;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn full(max: f32) -> Self {
        Self { current: max, max }
    }
}
