//! Core primitives: pulse windows and circular similarity kernels.

mod similarity;
mod window;

pub use similarity::circular_similarity;
pub use window::PulseWindow;
