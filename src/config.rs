// src/config.rs
// Tuning constants for the circuit animator. Defaults reproduce the look of the
// original visiting card page.
use std::{path::Path, time::Duration};

use rand::{distributions::uniform::SampleUniform, Rng};
use serde::{Deserialize, Serialize};

use crate::color::Color;

/// Environment variable naming an optional JSON config file (native only).
pub const CONFIG_ENV_VAR: &str = "CIRCUITVIEW_CONFIG";

/// Upper bound for every millisecond setting, a little over eleven days.
pub const MAX_DELAY_MS: f64 = 1e9;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{name} must be a probability in [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error("{name} has max {max} below min {min}")]
    InvalidSpan { name: &'static str, min: f64, max: f64 },
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("{name} must be within [0, {max}], got {value}")]
    OutOfRange { name: &'static str, value: f64, max: f64 },
}

/// Half-open sampling window `[min, max)`. A window with `max == min`
/// always yields `min`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Span<T> {
    pub min: T,
    pub max: T,
}

impl<T> Span<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: SampleUniform + PartialOrd + Copy> Span<T> {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        if self.max > self.min {
            rng.gen_range(self.min..self.max)
        } else {
            self.min
        }
    }

    pub fn contains(&self, value: T) -> bool {
        value >= self.min && (value < self.max || self.max <= self.min)
    }
}

impl Span<f64> {
    /// Samples a delay, interpreting the window as milliseconds. Values too
    /// large for a `Duration` saturate.
    pub fn sample_millis<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        millis(self.sample(rng))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Logical viewport width below which the narrow node count applies.
    pub mobile_breakpoint: f32,
    pub narrow_node_count: usize,
    pub wide_node_count: usize,
    pub node_radius: Span<f32>,
    pub min_connections: usize,
    pub max_connections: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            mobile_breakpoint: 768.0,
            narrow_node_count: 15,
            wide_node_count: 30,
            node_radius: Span::new(1.0, 3.0),
            min_connections: 1,
            max_connections: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub initial_opacity: f32,
    pub fade_per_frame: f32,
    /// Ring growth per frame, drawn once per node at creation.
    pub speed: Span<f32>,
    pub stroke_width: f32,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            initial_opacity: 0.5,
            fade_per_frame: 0.01,
            speed: Span::new(0.5, 1.0),
            stroke_width: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub ambient_enabled: bool,
    pub ambient_interval_ms: Span<f64>,
    pub propagation_delay_ms: Span<f64>,
    pub propagation_probability: f64,
    pub pointer_trigger_distance: f32,
    pub pointer_halo_ms: f64,
}

impl TimingConfig {
    pub fn pointer_halo(&self) -> Duration {
        millis(self.pointer_halo_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ambient_enabled: true,
            ambient_interval_ms: Span::new(1000.0, 3000.0),
            propagation_delay_ms: Span::new(100.0, 400.0),
            propagation_probability: 0.7,
            pointer_trigger_distance: 100.0,
            pointer_halo_ms: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaletteConfig {
    pub background: Color,
    pub node: Color,
    /// Ring colour; its alpha is replaced by the pulse opacity.
    pub pulse: Color,
    pub connection: Color,
    pub halo_ring: Color,
    pub halo_core: Color,
    pub halo_ring_radius: f32,
    pub halo_core_radius: f32,
    /// Alpha multiplier for everything the animator draws.
    pub layer_opacity: f32,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        let accent = Color::rgb_u8(0xFF, 0x4D, 0x4D);
        Self {
            background: Color::rgb_u8(0x0A, 0x1D, 0x37),
            node: accent.with_alpha(0.5),
            pulse: accent,
            connection: Color::WHITE.with_alpha(0.15),
            halo_ring: accent.with_alpha(0.1),
            halo_core: accent.with_alpha(0.2),
            halo_ring_radius: 50.0,
            halo_core_radius: 10.0,
            layer_opacity: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimatorConfig {
    pub graph: GraphConfig,
    pub pulse: PulseConfig,
    pub timing: TimingConfig,
    pub palette: PaletteConfig,
    /// Rebuild the node layout whenever the viewport is resized.
    pub restart_on_resize: bool,
    /// Fixed seed for reproducible layouts and pulse sequences.
    pub seed: Option<u64>,
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self {
            graph: GraphConfig::default(),
            pulse: PulseConfig::default(),
            timing: TimingConfig::default(),
            palette: PaletteConfig::default(),
            restart_on_resize: true,
            seed: None,
        }
    }
}

impl AnimatorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: AnimatorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Loads the file named by [`CONFIG_ENV_VAR`], or the defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => {
                log::info!("Loading animator config from {:?}", path);
                Self::load(path)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let graph = &self.graph;
        positive("graph.narrow_node_count", graph.narrow_node_count as f64)?;
        positive("graph.wide_node_count", graph.wide_node_count as f64)?;
        positive("graph.min_connections", graph.min_connections as f64)?;
        span(
            "graph.connections",
            graph.min_connections as f64,
            graph.max_connections as f64,
        )?;
        span("graph.node_radius", graph.node_radius.min as f64, graph.node_radius.max as f64)?;

        positive("pulse.initial_opacity", self.pulse.initial_opacity as f64)?;
        positive("pulse.fade_per_frame", self.pulse.fade_per_frame as f64)?;
        span("pulse.speed", self.pulse.speed.min as f64, self.pulse.speed.max as f64)?;

        let timing = &self.timing;
        delay_window("timing.ambient_interval_ms", &timing.ambient_interval_ms)?;
        delay_window("timing.propagation_delay_ms", &timing.propagation_delay_ms)?;
        within_delay_limit("timing.pointer_halo_ms", timing.pointer_halo_ms)?;
        let p = timing.propagation_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::InvalidProbability { name: "timing.propagation_probability", value: p });
        }
        let opacity = self.palette.layer_opacity as f64;
        if !(0.0..=1.0).contains(&opacity) {
            return Err(ConfigError::InvalidProbability { name: "palette.layer_opacity", value: opacity });
        }
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

fn span(name: &'static str, min: f64, max: f64) -> Result<(), ConfigError> {
    // NaN fails both comparisons and lands here too
    if min >= 0.0 && max >= min {
        Ok(())
    } else {
        Err(ConfigError::InvalidSpan { name, min, max })
    }
}

fn delay_window(name: &'static str, window: &Span<f64>) -> Result<(), ConfigError> {
    span(name, window.min, window.max)?;
    within_delay_limit(name, window.max)
}

fn within_delay_limit(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=MAX_DELAY_MS).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, value, max: MAX_DELAY_MS })
    }
}

// NaN and negatives map to zero
fn millis(ms: f64) -> Duration {
    Duration::try_from_secs_f64(ms.max(0.0) / 1000.0).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn defaults_match_original_page() {
        let config = AnimatorConfig::default();
        assert_eq!(config.graph.mobile_breakpoint, 768.0);
        assert_eq!((config.graph.narrow_node_count, config.graph.wide_node_count), (15, 30));
        assert_eq!(config.timing.propagation_probability, 0.7);
        assert_eq!(config.timing.propagation_delay_ms, Span::new(100.0, 400.0));
        assert_eq!(config.timing.ambient_interval_ms, Span::new(1000.0, 3000.0));
        assert_eq!(config.pulse.fade_per_frame, 0.01);
        assert_eq!(config.palette.node, Color::hex("#FF4D4D").unwrap().with_alpha(0.5));
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = AnimatorConfig::from_json(
            r##"{ "timing": { "propagation_probability": 0.25 }, "palette": { "background": "#000000" }, "seed": 9 }"##,
        )
        .unwrap();
        assert_eq!(config.timing.propagation_probability, 0.25);
        assert_eq!(config.timing.pointer_trigger_distance, 100.0);
        assert_eq!(config.palette.background, Color::rgb_u8(0, 0, 0));
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.graph, GraphConfig::default());
    }

    #[test]
    fn json_round_trip() {
        let config = AnimatorConfig { seed: Some(3), ..Default::default() };
        let json = serde_json::to_string(&config).unwrap();
        let back = AnimatorConfig::from_json(&json).unwrap();
        assert_eq!(back.seed, Some(3));
        assert_eq!(back.timing, config.timing);
        assert_eq!(back.palette.background, config.palette.background);
    }

    #[test]
    fn rejects_bad_probability() {
        let err = AnimatorConfig::from_json(r#"{ "timing": { "propagation_probability": 1.5 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProbability { .. }));
    }

    #[test]
    fn rejects_inverted_span_and_connection_bounds() {
        let err = AnimatorConfig::from_json(
            r#"{ "timing": { "propagation_delay_ms": { "min": 400.0, "max": 100.0 } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSpan { name: "timing.propagation_delay_ms", .. }));

        let err =
            AnimatorConfig::from_json(r#"{ "graph": { "min_connections": 4, "max_connections": 2 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSpan { name: "graph.connections", .. }));
    }

    #[test]
    fn rejects_zero_fade() {
        let err = AnimatorConfig::from_json(r#"{ "pulse": { "fade_per_frame": 0.0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::NonPositive { .. }));
    }

    #[test]
    fn rejects_delays_beyond_limit() {
        let err = AnimatorConfig::from_json(r#"{ "timing": { "pointer_halo_ms": 1e300 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { name: "timing.pointer_halo_ms", .. }));

        let err = AnimatorConfig::from_json(r#"{ "timing": { "ambient_interval_ms": { "min": 1e300, "max": 1e300 } } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { name: "timing.ambient_interval_ms", .. }));

        let err = AnimatorConfig::from_json(r#"{ "timing": { "propagation_delay_ms": { "min": 0, "max": 2e9 } } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { name: "timing.propagation_delay_ms", .. }));

        let mut config = AnimatorConfig::default();
        config.timing.pointer_halo_ms = f64::INFINITY;
        assert!(config.validate().is_err());
        config.timing.pointer_halo_ms = MAX_DELAY_MS;
        config.validate().unwrap();
    }

    #[test]
    fn oversized_delays_saturate_instead_of_panicking() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(Span::new(1e300, 1e300).sample_millis(&mut rng), Duration::MAX);
        assert_eq!(Span::new(f64::NAN, f64::NAN).sample_millis(&mut rng), Duration::ZERO);

        let timing = TimingConfig { pointer_halo_ms: f64::INFINITY, ..Default::default() };
        assert_eq!(timing.pointer_halo(), Duration::MAX);
        let timing = TimingConfig { pointer_halo_ms: -5.0, ..Default::default() };
        assert_eq!(timing.pointer_halo(), Duration::ZERO);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = AnimatorConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn span_sampling_stays_in_window() {
        let mut rng = StdRng::seed_from_u64(1);
        let window = Span::new(100.0, 400.0);
        for _ in 0..1000 {
            let ms = window.sample(&mut rng);
            assert!(window.contains(ms), "{ms} outside window");
        }
        assert_eq!(Span::new(5.0, 5.0).sample(&mut rng), 5.0);
        let delay = Span::new(250.0, 250.0).sample_millis(&mut rng);
        assert_eq!(delay, Duration::from_millis(250));
    }
}
