//! Loaded-player state replicated between server and clients.

use glam::{Vec2, Vec3};

/// Kinematic state of one connected player.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlayerState {
    /// Connection-assigned client id.
    pub client_id: u32,
    /// World position in blocks.
    pub position: Vec3,
    /// Velocity in blocks per second.
    pub velocity: Vec3,
    /// Acceleration in blocks per second squared.
    pub acceleration: Vec3,
    /// Yaw and pitch in radians.
    pub rotation: Vec2,
    /// Movement flags (on ground, sneaking, ...).
    pub flags: u8,
}

impl PlayerState {
    /// A player at the origin with no motion.
    pub fn new(client_id: u32) -> Self {
        Self {
            client_id,
            ..Default::default()
        }
    }

    /// Chunk column the player currently stands in.
    pub fn column(&self) -> (i32, i32) {
        (
            (self.position.x.floor() as i32) >> 4,
            (self.position.z.floor() as i32) >> 4,
        )
    }
}
