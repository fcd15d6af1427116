use glam::Vec2;

use crate::config::PulseConfig;

/// Index of a node inside the animator's arena.
pub type NodeId = usize;

/// Expanding ring state of one node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pulse {
    pub active: bool,
    pub radius: f32,
    pub opacity: f32,
    /// Radius growth per frame.
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub position: Vec2,
    pub radius: f32,
    /// Outgoing edges, nearest first.
    pub connections: Vec<NodeId>,
    pub pulse: Pulse,
}

impl Node {
    pub fn new(position: Vec2, radius: f32, pulse_speed: f32) -> Self {
        Self {
            position,
            radius,
            connections: Vec::new(),
            pulse: Pulse { active: false, radius: 0.0, opacity: 0.0, speed: pulse_speed },
        }
    }

    pub fn distance_to(&self, point: Vec2) -> f32 {
        self.position.distance(point)
    }

    /// Starts a pulse unless one is already running. Returns whether it started.
    pub fn start_pulse(&mut self, config: &PulseConfig) -> bool {
        if self.pulse.active {
            return false;
        }
        self.pulse.active = true;
        self.pulse.radius = self.radius;
        self.pulse.opacity = config.initial_opacity;
        true
    }

    /// One frame of ring growth and fade. Called after the ring was drawn.
    pub fn advance_pulse(&mut self, config: &PulseConfig) {
        if !self.pulse.active {
            return;
        }
        self.pulse.radius += self.pulse.speed;
        self.pulse.opacity -= config.fade_per_frame;

        if self.pulse.opacity <= 0.0 {
            self.pulse.active = false;
            self.pulse.radius = 0.0;
            self.pulse.opacity = config.initial_opacity;
        }
    }
}
