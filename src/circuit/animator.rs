use std::time::Duration;

use glam::Vec2;
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::canvas::Canvas;
use super::graph;
use super::node::{Node, NodeId};
use super::scheduler::{TimerQueue, TimerTask};
use crate::config::AnimatorConfig;

/// Where a pulse came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseSource {
    Ambient,
    Pointer,
    Propagation { hop: u32 },
    Manual,
}

/// Running counters, mostly for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnimatorStats {
    pub frames: u64,
    pub ambient_ticks: u64,
    pub pulses_started: u64,
    pub ambient_pulses: u64,
    pub pointer_pulses: u64,
    /// Edges a propagating pulse was offered to.
    pub edges_offered: u64,
    /// Edges the pulse actually crossed.
    pub edges_taken: u64,
    pub deepest_hop: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PointerSample {
    position: Vec2,
    at: Duration,
}

/// Owns the whole circuit animation: node arena, pending timers, pointer
/// state and randomness. Created by [`CircuitAnimator::mount`], dead after
/// [`CircuitAnimator::teardown`].
///
/// Time is passed in explicitly as the elapsed time since some fixed host
/// epoch, so the animator never reads a clock on its own.
#[derive(Debug)]
pub struct CircuitAnimator {
    config: AnimatorConfig,
    nodes: Vec<Node>,
    timers: TimerQueue,
    rng: StdRng,
    pointer: Option<PointerSample>,
    mounted: bool,
    stats: AnimatorStats,
}

impl CircuitAnimator {
    /// Builds a random layout for a `size` viewport (logical pixels).
    ///
    /// Returns `None` and does nothing else when the viewport has no drawable
    /// area or the config is invalid.
    pub fn mount(size: Vec2, now: Duration, config: AnimatorConfig) -> Option<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::mount_with_rng(size, now, config, rng)
    }

    pub fn mount_with_rng(size: Vec2, now: Duration, config: AnimatorConfig, mut rng: StdRng) -> Option<Self> {
        if !has_area(size) {
            log::warn!("Drawing surface unavailable ({}x{}), circuit animator not mounted.", size.x, size.y);
            return None;
        }

        let mut nodes = graph::scatter_nodes(size, &config.graph, &config.pulse, &mut rng);
        graph::connect_nearest(&mut nodes, &config.graph, &mut rng);

        Self::with_nodes(nodes, size, now, config, rng)
    }

    /// Mounts over a prepared node arena. Connections are taken as given.
    ///
    /// Returns `None` for a viewport without area, a dangling connection, or
    /// a config that fails [`AnimatorConfig::validate`].
    pub fn with_nodes(
        nodes: Vec<Node>,
        size: Vec2,
        now: Duration,
        config: AnimatorConfig,
        rng: StdRng,
    ) -> Option<Self> {
        if !has_area(size) {
            log::warn!("Drawing surface unavailable ({}x{}), circuit animator not mounted.", size.x, size.y);
            return None;
        }
        if let Err(err) = config.validate() {
            log::warn!("Invalid animator config, circuit animator not mounted: {}", err);
            return None;
        }
        if let Some(bad) = nodes.iter().flat_map(|n| n.connections.iter()).find(|&&c| c >= nodes.len()) {
            log::warn!("Connection to unknown node {} dropped the layout.", bad);
            return None;
        }

        let mut timers = TimerQueue::new();
        if config.timing.ambient_enabled && !nodes.is_empty() {
            // The first ambient pulse fires right away
            timers.schedule(now, TimerTask::AmbientPulse);
        }

        log::info!(
            "Circuit animator mounted: {} nodes, {} edges, viewport {}x{}.",
            nodes.len(),
            nodes.iter().map(|n| n.connections.len()).sum::<usize>(),
            size.x,
            size.y
        );

        Some(Self {
            config,
            nodes,
            timers,
            rng,
            pointer: None,
            mounted: true,
            stats: AnimatorStats::default(),
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn stats(&self) -> AnimatorStats {
        self.stats
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Starts a pulse on `node` and arms its propagation timer. Returns
    /// `false` when the node is unknown, already pulsing, or the animator is
    /// torn down.
    pub fn trigger_pulse(&mut self, node: NodeId, now: Duration) -> bool {
        self.start_pulse(node, now, PulseSource::Manual)
    }

    /// Records the pointer and pulses the nearest node if it is close enough.
    pub fn pointer_moved(&mut self, position: Vec2, now: Duration) -> Option<NodeId> {
        if !self.mounted {
            return None;
        }
        self.pointer = Some(PointerSample { position, at: now });

        let (nearest, distance) = graph::nearest_node(&self.nodes, position)?;
        if distance < self.config.timing.pointer_trigger_distance
            && self.start_pulse(nearest, now, PulseSource::Pointer)
        {
            return Some(nearest);
        }
        None
    }

    /// Fires every timer due at `now`. Timers armed while firing are only run
    /// by a later call. Returns the number of tasks fired.
    pub fn advance(&mut self, now: Duration) -> usize {
        if !self.mounted {
            return 0;
        }

        let mut due = Vec::new();
        while let Some((_, task)) = self.timers.pop_due(now) {
            due.push(task);
        }

        for task in &due {
            match *task {
                TimerTask::AmbientPulse => self.ambient_tick(now),
                TimerTask::Propagate { node, hop } => self.propagate(node, hop, now),
            }
        }
        due.len()
    }

    /// Draws one frame and steps every running pulse by one frame.
    pub fn draw<C: Canvas + ?Sized>(&mut self, now: Duration, canvas: &mut C) {
        if !self.mounted {
            return;
        }
        self.stats.frames += 1;

        let palette = &self.config.palette;
        canvas.clear();

        for index in 0..self.nodes.len() {
            let node = &mut self.nodes[index];
            canvas.fill_circle(node.position, node.radius, palette.node);

            if node.pulse.active {
                canvas.stroke_circle(
                    node.position,
                    node.pulse.radius,
                    self.config.pulse.stroke_width,
                    palette.pulse.with_alpha(node.pulse.opacity),
                );
                node.advance_pulse(&self.config.pulse);
            }

            let node = &self.nodes[index];
            for &target in &node.connections {
                canvas.line(node.position, self.nodes[target].position, palette.connection);
            }
        }

        let halo_window = self.config.timing.pointer_halo();
        if let Some(pointer) = self.pointer.filter(|p| now.saturating_sub(p.at) < halo_window) {
            canvas.stroke_circle(
                pointer.position,
                palette.halo_ring_radius,
                self.config.pulse.stroke_width,
                palette.halo_ring,
            );
            canvas.fill_circle(pointer.position, palette.halo_core_radius, palette.halo_core);
        }
    }

    /// Cancels every timer and drops the node set. All later calls are no-ops.
    pub fn teardown(&mut self) {
        if !self.mounted {
            return;
        }
        let cancelled = self.timers.len();
        self.timers.clear();
        self.nodes.clear();
        self.pointer = None;
        self.mounted = false;
        log::info!(
            "Circuit animator torn down after {} frames ({} pulses, {} timers cancelled).",
            self.stats.frames,
            self.stats.pulses_started,
            cancelled
        );
    }

    fn ambient_tick(&mut self, now: Duration) {
        self.stats.ambient_ticks += 1;
        if !self.nodes.is_empty() {
            let node = self.rng.gen_range(0..self.nodes.len());
            self.start_pulse(node, now, PulseSource::Ambient);
        }
        let delay = self.config.timing.ambient_interval_ms.sample_millis(&mut self.rng);
        self.timers.schedule(now.saturating_add(delay), TimerTask::AmbientPulse);
    }

    fn propagate(&mut self, node: NodeId, hop: u32, now: Duration) {
        let probability = self.config.timing.propagation_probability.clamp(0.0, 1.0);
        for edge in 0..self.nodes[node].connections.len() {
            let target = self.nodes[node].connections[edge];
            self.stats.edges_offered += 1;
            if self.rng.gen_bool(probability) {
                self.stats.edges_taken += 1;
                self.start_pulse(target, now, PulseSource::Propagation { hop: hop + 1 });
            }
        }
    }

    fn start_pulse(&mut self, node: NodeId, now: Duration, source: PulseSource) -> bool {
        if !self.mounted {
            return false;
        }
        let Some(target) = self.nodes.get_mut(node) else {
            log::debug!("Pulse requested for unknown node {}.", node);
            return false;
        };
        if !target.start_pulse(&self.config.pulse) {
            return false;
        }

        let hop = match source {
            PulseSource::Propagation { hop } => hop,
            _ => 0,
        };
        match source {
            PulseSource::Ambient => self.stats.ambient_pulses += 1,
            PulseSource::Pointer => self.stats.pointer_pulses += 1,
            _ => {}
        }
        self.stats.pulses_started += 1;
        self.stats.deepest_hop = self.stats.deepest_hop.max(hop);
        log::trace!("Pulse on node {} ({:?}).", node, source);

        let delay = self.config.timing.propagation_delay_ms.sample_millis(&mut self.rng);
        self.timers.schedule(now.saturating_add(delay), TimerTask::Propagate { node, hop });
        true
    }
}

impl Drop for CircuitAnimator {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn has_area(size: Vec2) -> bool {
    size.x.is_finite() && size.y.is_finite() && size.x > 0.0 && size.y > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::canvas::{DrawCommand, Recorder};
    use crate::config::{Span, MAX_DELAY_MS};

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn quiet_config() -> AnimatorConfig {
        let mut config = AnimatorConfig::default();
        config.timing.ambient_enabled = false;
        config
    }

    /// a -> b -> c, c -> a
    fn triangle(config: AnimatorConfig) -> CircuitAnimator {
        let mut nodes = vec![
            Node::new(Vec2::new(10.0, 10.0), 2.0, 1.0),
            Node::new(Vec2::new(50.0, 10.0), 2.0, 1.0),
            Node::new(Vec2::new(30.0, 40.0), 2.0, 1.0),
        ];
        nodes[0].connections = vec![1];
        nodes[1].connections = vec![2];
        nodes[2].connections = vec![0];
        CircuitAnimator::with_nodes(nodes, Vec2::new(100.0, 100.0), ms(0), config, StdRng::seed_from_u64(1)).unwrap()
    }

    #[test]
    fn zero_area_viewport_is_a_no_op() {
        assert!(CircuitAnimator::mount(Vec2::new(0.0, 600.0), ms(0), AnimatorConfig::default()).is_none());
        assert!(CircuitAnimator::mount(Vec2::new(800.0, f32::NAN), ms(0), AnimatorConfig::default()).is_none());
    }

    #[test]
    fn dangling_connection_is_rejected() {
        let mut node = Node::new(Vec2::ZERO, 1.0, 1.0);
        node.connections = vec![4];
        let mounted = CircuitAnimator::with_nodes(
            vec![node],
            Vec2::new(10.0, 10.0),
            ms(0),
            quiet_config(),
            StdRng::seed_from_u64(0),
        );
        assert!(mounted.is_none());
    }

    #[test]
    fn invalid_config_is_not_mounted() {
        let mut config = quiet_config();
        config.timing.propagation_probability = f64::NAN;
        assert!(CircuitAnimator::mount(Vec2::new(800.0, 600.0), ms(0), config.clone()).is_none());

        let nodes = vec![Node::new(Vec2::ZERO, 1.0, 1.0)];
        let mounted = CircuitAnimator::with_nodes(nodes, Vec2::new(10.0, 10.0), ms(0), config, StdRng::seed_from_u64(0));
        assert!(mounted.is_none());

        let mut config = AnimatorConfig::default();
        config.timing.pointer_halo_ms = 1e300;
        assert!(CircuitAnimator::mount(Vec2::new(800.0, 600.0), ms(0), config).is_none());
    }

    #[test]
    fn longest_allowed_delays_keep_running() {
        let mut config = AnimatorConfig { seed: Some(4), ..Default::default() };
        config.timing.ambient_interval_ms = Span::new(MAX_DELAY_MS, MAX_DELAY_MS);
        config.timing.propagation_delay_ms = Span::new(MAX_DELAY_MS, MAX_DELAY_MS);
        config.timing.pointer_halo_ms = MAX_DELAY_MS;
        let mut animator = CircuitAnimator::mount(Vec2::new(800.0, 600.0), ms(0), config).unwrap();

        assert_eq!(animator.advance(ms(0)), 1);
        animator.pointer_moved(Vec2::new(400.0, 300.0), ms(5));
        let mut canvas = Recorder::new();
        animator.draw(Duration::MAX, &mut canvas);
        assert!(!canvas.commands.is_empty());
        // everything pending is far out but still ordered
        assert_eq!(animator.advance(ms(1_000)), 0);
        assert!(animator.advance(Duration::MAX) >= 2);
    }

    #[test]
    fn first_ambient_pulse_fires_on_first_tick() {
        let mut config = AnimatorConfig::default();
        config.seed = Some(5);
        let mut animator = CircuitAnimator::mount(Vec2::new(1024.0, 768.0), ms(0), config).unwrap();
        assert_eq!(animator.pending_timers(), 1);

        assert_eq!(animator.advance(ms(0)), 1);
        assert_eq!(animator.stats().ambient_pulses, 1);
        assert_eq!(animator.nodes().iter().filter(|n| n.pulse.active).count(), 1);

        // next ambient tick plus the propagation timer of the pulsed node
        assert_eq!(animator.pending_timers(), 2);
        let ambient_due = animator
            .timers
            .iter()
            .find(|(_, task)| *task == TimerTask::AmbientPulse)
            .map(|(due, _)| due)
            .unwrap();
        assert!(ambient_due >= ms(1000) && ambient_due < ms(3000));
    }

    #[test]
    fn propagation_waits_for_delay_window() {
        let mut config = quiet_config();
        config.timing.propagation_probability = 1.0;
        let mut animator = triangle(config);

        assert!(animator.trigger_pulse(0, ms(0)));
        animator.advance(ms(99));
        assert!(!animator.nodes()[1].pulse.active);

        animator.advance(ms(400));
        assert!(animator.nodes()[1].pulse.active);
        assert!(!animator.nodes()[2].pulse.active);

        animator.advance(ms(800));
        assert!(animator.nodes()[2].pulse.active);
        assert_eq!(animator.stats().deepest_hop, 2);
    }

    #[test]
    fn propagation_stops_at_pulsing_nodes() {
        let mut config = quiet_config();
        config.timing.propagation_probability = 1.0;
        let mut animator = triangle(config);

        animator.trigger_pulse(0, ms(0));
        for step in 1..=4 {
            animator.advance(ms(400 * step));
        }
        // c -> a was offered while a still pulses, so it ended there
        assert_eq!(animator.stats().pulses_started, 3);
        assert_eq!(animator.pending_timers(), 0);
    }

    #[test]
    fn zero_probability_never_propagates() {
        let mut config = quiet_config();
        config.timing.propagation_probability = 0.0;
        let mut animator = triangle(config);

        animator.trigger_pulse(0, ms(0));
        animator.advance(ms(1000));
        assert_eq!(animator.stats().edges_offered, 1);
        assert_eq!(animator.stats().edges_taken, 0);
        assert!(!animator.nodes()[1].pulse.active);
    }

    #[test]
    fn draw_emits_nodes_rings_and_edges() {
        let mut animator = triangle(quiet_config());
        animator.trigger_pulse(1, ms(0));

        let mut canvas = Recorder::new();
        animator.draw(ms(0), &mut canvas);

        assert_eq!(canvas.commands[0], DrawCommand::Clear);
        assert_eq!(canvas.count(|c| matches!(c, DrawCommand::FillCircle { .. })), 3);
        assert_eq!(canvas.count(|c| matches!(c, DrawCommand::Line { .. })), 3);
        let ring = canvas
            .commands
            .iter()
            .find_map(|c| match c {
                DrawCommand::StrokeCircle { center, radius, color, .. } => Some((*center, *radius, color.alpha())),
                _ => None,
            })
            .unwrap();
        assert_eq!(ring, (Vec2::new(50.0, 10.0), 2.0, 0.5));

        // ring grew by the node speed and faded once
        let pulse = animator.nodes()[1].pulse;
        assert_eq!(pulse.radius, 3.0);
        assert!((pulse.opacity - 0.49).abs() < 1e-6);
    }

    #[test]
    fn halo_lasts_for_configured_window() {
        let mut animator = triangle(quiet_config());
        animator.pointer_moved(Vec2::new(500.0, 500.0), ms(1000));

        let mut canvas = Recorder::new();
        animator.draw(ms(1050), &mut canvas);
        let halo = |c: &DrawCommand| match c {
            DrawCommand::FillCircle { center, .. } | DrawCommand::StrokeCircle { center, .. } => {
                *center == Vec2::new(500.0, 500.0)
            }
            _ => false,
        };
        assert_eq!(canvas.count(halo), 2);

        let mut canvas = Recorder::new();
        animator.draw(ms(1100), &mut canvas);
        assert_eq!(canvas.count(halo), 0);
    }

    #[test]
    fn far_pointer_does_not_trigger() {
        let mut animator = triangle(quiet_config());
        assert_eq!(animator.pointer_moved(Vec2::new(200.0, 200.0), ms(0)), None);
        assert!(animator.nodes().iter().all(|n| !n.pulse.active));
    }

    #[test]
    fn pointer_on_pulsing_node_reports_nothing() {
        let mut animator = triangle(quiet_config());
        assert_eq!(animator.pointer_moved(Vec2::new(10.0, 10.0), ms(0)), Some(0));
        assert_eq!(animator.pointer_moved(Vec2::new(10.0, 11.0), ms(5)), None);
        assert_eq!(animator.stats().pointer_pulses, 1);
    }

    #[test]
    fn unknown_node_is_ignored() {
        let mut animator = triangle(quiet_config());
        assert!(!animator.trigger_pulse(17, ms(0)));
        assert_eq!(animator.pending_timers(), 0);
    }

    #[test]
    fn teardown_cancels_everything() {
        let mut animator = CircuitAnimator::mount(
            Vec2::new(800.0, 600.0),
            ms(0),
            AnimatorConfig { seed: Some(2), ..Default::default() },
        )
        .unwrap();
        animator.advance(ms(0));
        animator.teardown();

        assert!(!animator.is_mounted());
        assert_eq!(animator.pending_timers(), 0);
        assert!(animator.nodes().is_empty());
        assert!(!animator.trigger_pulse(0, ms(10)));
        assert_eq!(animator.pointer_moved(Vec2::ZERO, ms(10)), None);
    }
}
