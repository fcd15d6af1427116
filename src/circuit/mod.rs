//! The circuit background: randomly scattered nodes wired to their nearest
//! neighbours, with pulse rings that hop along the edges.
//!
//! Everything in here is host independent. A host mounts a
//! [`CircuitAnimator`], feeds it pointer moves and a monotonic clock, calls
//! [`CircuitAnimator::advance`] and [`CircuitAnimator::draw`] once per display
//! frame, and tears it down when the surface goes away.

pub mod animator;
pub mod canvas;
pub mod graph;
pub mod node;
pub mod scheduler;

pub use animator::{AnimatorStats, CircuitAnimator, PulseSource};
pub use canvas::{Canvas, DrawCommand, Recorder};
pub use node::{Node, NodeId, Pulse};
pub use scheduler::{TimerQueue, TimerTask};
