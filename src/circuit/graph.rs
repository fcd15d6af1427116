// Layout and wiring of the circuit graph.
use glam::Vec2;
use rand::Rng;

use super::node::{Node, NodeId};
use crate::config::{GraphConfig, PulseConfig};

/// Fewer nodes on narrow (mobile) viewports.
pub fn node_count(viewport_width: f32, config: &GraphConfig) -> usize {
    if viewport_width < config.mobile_breakpoint {
        config.narrow_node_count
    } else {
        config.wide_node_count
    }
}

/// Scatters nodes uniformly over `[0, size.x) x [0, size.y)`.
pub fn scatter_nodes<R: Rng + ?Sized>(
    size: Vec2,
    graph: &GraphConfig,
    pulse: &PulseConfig,
    rng: &mut R,
) -> Vec<Node> {
    (0..node_count(size.x, graph))
        .map(|_| {
            let position = Vec2::new(rng.gen_range(0.0..size.x), rng.gen_range(0.0..size.y));
            let radius = graph.node_radius.sample(rng);
            Node::new(position, radius, pulse.speed.sample(rng))
        })
        .collect()
}

/// Gives every node between `min_connections` and `max_connections`
/// outgoing edges to its nearest neighbours.
pub fn connect_nearest<R: Rng + ?Sized>(nodes: &mut [Node], config: &GraphConfig, rng: &mut R) {
    for index in 0..nodes.len() {
        let fan_out = if config.max_connections > config.min_connections {
            rng.gen_range(config.min_connections..=config.max_connections)
        } else {
            config.min_connections
        };
        let origin = nodes[index].position;

        let mut candidates: Vec<(NodeId, f32)> = nodes
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != index)
            .map(|(other, node)| (other, node.distance_to(origin)))
            .collect();
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

        nodes[index].connections = candidates.into_iter().take(fan_out).map(|(other, _)| other).collect();
    }
}

/// Closest node to `point` and its distance. First one wins on ties.
pub fn nearest_node(nodes: &[Node], point: Vec2) -> Option<(NodeId, f32)> {
    nodes
        .iter()
        .enumerate()
        .map(|(index, node)| (index, node.distance_to(point)))
        .fold(None, |best, candidate| match best {
            Some((_, best_distance)) if best_distance <= candidate.1 => best,
            _ => Some(candidate),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use rstest::rstest;

    #[rstest]
    #[case(320.0, 15)]
    #[case(767.9, 15)]
    #[case(768.0, 30)]
    #[case(1920.0, 30)]
    fn count_follows_breakpoint(#[case] width: f32, #[case] expected: usize) {
        assert_eq!(node_count(width, &GraphConfig::default()), expected);
    }

    #[test]
    fn scattered_nodes_stay_inside_viewport() {
        let mut rng = StdRng::seed_from_u64(7);
        let size = Vec2::new(800.0, 600.0);
        let nodes = scatter_nodes(size, &GraphConfig::default(), &PulseConfig::default(), &mut rng);
        assert_eq!(nodes.len(), 30);
        for node in &nodes {
            assert!((0.0..800.0).contains(&node.position.x));
            assert!((0.0..600.0).contains(&node.position.y));
            assert!((1.0..3.0).contains(&node.radius));
            assert!((0.5..1.0).contains(&node.pulse.speed));
            assert!(!node.pulse.active);
        }
    }

    #[test]
    fn connects_to_nearest_on_a_line() {
        let mut nodes: Vec<Node> = [0.0, 1.0, 3.0, 7.0, 15.0]
            .into_iter()
            .map(|x| Node::new(Vec2::new(x, 0.0), 1.0, 0.5))
            .collect();
        let config = GraphConfig { min_connections: 2, max_connections: 2, ..Default::default() };
        connect_nearest(&mut nodes, &config, &mut StdRng::seed_from_u64(0));

        assert_eq!(nodes[0].connections, vec![1, 2]);
        assert_eq!(nodes[2].connections, vec![1, 0]);
        assert_eq!(nodes[4].connections, vec![3, 2]);
    }

    #[test]
    fn fan_out_is_capped_by_available_nodes() {
        let mut nodes = vec![
            Node::new(Vec2::ZERO, 1.0, 0.5),
            Node::new(Vec2::new(5.0, 5.0), 1.0, 0.5),
        ];
        let config = GraphConfig { min_connections: 3, max_connections: 3, ..Default::default() };
        connect_nearest(&mut nodes, &config, &mut StdRng::seed_from_u64(0));
        assert_eq!(nodes[0].connections, vec![1]);
        assert_eq!(nodes[1].connections, vec![0]);
    }

    #[test]
    fn never_connects_to_self() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut nodes =
            scatter_nodes(Vec2::new(1024.0, 768.0), &GraphConfig::default(), &PulseConfig::default(), &mut rng);
        connect_nearest(&mut nodes, &GraphConfig::default(), &mut rng);
        for (index, node) in nodes.iter().enumerate() {
            assert!(!node.connections.contains(&index));
            assert!((1..=3).contains(&node.connections.len()));
        }
    }

    #[test]
    fn nearest_node_picks_minimum() {
        let nodes = vec![
            Node::new(Vec2::new(0.0, 0.0), 1.0, 0.5),
            Node::new(Vec2::new(10.0, 0.0), 1.0, 0.5),
            Node::new(Vec2::new(4.0, 3.0), 1.0, 0.5),
        ];
        let (id, distance) = nearest_node(&nodes, Vec2::new(4.0, 4.0)).unwrap();
        assert_eq!(id, 2);
        assert!((distance - 1.0).abs() < 1e-6);
        assert_eq!(nearest_node(&[], Vec2::ZERO), None);
    }
}
