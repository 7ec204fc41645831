//! Fixed-length circular bit window with incremental density.

/// Windowed pulse history for one signal.
///
/// Each slot holds 1 if the signal pulsed that tick, else 0. `head` is the
/// next slot to write (wraps mod the window length). `density` is maintained
/// incrementally on every overwrite so reading it never costs a rescan.
///
/// Invariant: `density` always equals the true popcount of the slots.
#[derive(Clone, Debug)]
pub struct PulseWindow {
    slots: Box<[u8]>,
    head: usize,
    density: u32,
}

impl PulseWindow {
    /// Allocate a zeroed window of `len` ticks.
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![0u8; len].into_boxed_slice(),
            head: 0,
            density: 0,
        }
    }

    /// Write the next tick's pulse bit and advance the head.
    ///
    /// Density is adjusted by the delta between the overwritten slot and the
    /// new value.
    pub fn push(&mut self, pulsed: bool) {
        let new = pulsed as u8;
        let old = self.slots[self.head];
        self.density = self.density + new as u32 - old as u32;
        self.slots[self.head] = new;
        self.head = (self.head + 1) % self.slots.len();
        debug_assert_eq!(
            self.density,
            self.slots.iter().map(|&s| s as u32).sum::<u32>(),
            "density drifted from true popcount"
        );
    }

    /// Number of set bits currently in the window.
    #[inline]
    pub fn density(&self) -> u32 {
        self.density
    }

    /// Index of the next slot to write.
    #[inline]
    pub fn head(&self) -> usize {
        self.head
    }

    /// Window length in ticks.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Raw slot access for the similarity kernels.
    #[inline]
    pub fn slots(&self) -> &[u8] {
        &self.slots
    }
}
