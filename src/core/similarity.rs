//! Circular cosine similarity over pulse windows at an arbitrary phase offset.
//!
//! The circular offset is pre-normalized with a single modulo outside the hot
//! loop, so the inner loop stays a linear scan with one wrap branch and no
//! division, regardless of how extreme the requested lead/lag is.

use super::window::PulseWindow;

/// Cosine similarity between two equally-sized circular windows, with `b`
/// shifted by `offset` ticks relative to `a`.
///
/// `offset = 0` compares the same ticks (synchronous), `offset = +1` aligns
/// `a`'s pulse at tick `t` with `b`'s pulse at tick `t + 1` (`a` leads, `b`
/// follows), `offset = -1` the reverse. The windows' write heads are folded
/// into the alignment, so two buffers that advanced in lock-step compare
/// tick-for-tick even when their physical layouts differ.
///
/// Returns 0.0 when either window has no pulses (orthogonal/idle).
pub fn circular_similarity(a: &PulseWindow, b: &PulseWindow, offset: i32) -> f32 {
    let len = a.len();
    debug_assert_eq!(len, b.len(), "windows must share a length");
    if len == 0 {
        return 0.0;
    }

    let base = (b.head() as i64 - a.head() as i64 + offset as i64).rem_euclid(len as i64) as usize;

    let slots_a = a.slots();
    let slots_b = b.slots();

    let mut dot = 0u32;
    let mut mag_a = 0u32;
    let mut mag_b = 0u32;

    for i in 0..len {
        let va = slots_a[i] as u32;

        let mut j = i + base;
        if j >= len {
            j -= len;
        }
        let vb = slots_b[j] as u32;

        dot += va * vb;
        mag_a += va * va;
        mag_b += vb * vb;
    }

    // Divide-by-zero guard: an idle window correlates with nothing.
    if mag_a == 0 || mag_b == 0 {
        return 0.0;
    }

    dot as f32 / ((mag_a as f32).sqrt() * (mag_b as f32).sqrt())
}
