/// Rolling window of frame durations, in milliseconds.
///
/// Durations go into a ring buffer of `capacity` slots; the average covers
/// however many frames are stored so far.
#[derive(Clone, Debug)]
pub struct FrameTimes {
    ring: Vec<f32>,        // ring buffer of frame durations
    index: usize,          // next slot in ring buffer
    stored: usize,         // how many frames stored so far
    total_frames: u64,
}

impl FrameTimes {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: vec![0.0; capacity.max(1)],
            index: 0,
            stored: 0,
            total_frames: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.stored
    }

    pub fn is_empty(&self) -> bool {
        self.stored == 0
    }

    /// Frames pushed since creation, including ones that fell out of the window.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn push(&mut self, millis: f32) {
        self.ring[self.index] = millis;
        self.index = (self.index + 1) % self.ring.len();
        if self.stored < self.ring.len() {
            self.stored += 1;
        }
        self.total_frames += 1;
    }

    pub fn average_ms(&self) -> f32 {
        if self.stored == 0 {
            return 0.0;
        }
        self.history().sum::<f32>() / self.stored as f32
    }

    pub fn fps(&self) -> f32 {
        let avg = self.average_ms();
        if avg > 0.0 { 1000.0 / avg } else { 0.0 }
    }

    /// Stored durations, oldest first.
    pub fn history(&self) -> impl Iterator<Item = f32> + '_ {
        let start = if self.stored < self.ring.len() { 0 } else { self.index };
        (0..self.stored).map(move |i| self.ring[(start + i) % self.ring.len()])
    }
}

impl Default for FrameTimes {
    fn default() -> Self {
        Self::new(240)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window() {
        let t = FrameTimes::new(4);
        assert!(t.is_empty());
        assert_eq!(t.average_ms(), 0.0);
        assert_eq!(t.fps(), 0.0);
    }

    #[test]
    fn averages_the_last_frames_only() {
        let mut t = FrameTimes::new(3);
        for ms in [10.0, 20.0, 30.0, 40.0] {
            t.push(ms);
        }
        assert_eq!(t.len(), 3);
        assert_eq!(t.total_frames(), 4);
        assert_eq!(t.history().collect::<Vec<_>>(), vec![20.0, 30.0, 40.0]);
        assert_eq!(t.average_ms(), 30.0);
        assert!((t.fps() - 33.333).abs() < 0.01);
    }

    #[test]
    fn partial_window_is_in_order() {
        let mut t = FrameTimes::new(5);
        t.push(1.0);
        t.push(2.0);
        assert_eq!(t.history().collect::<Vec<_>>(), vec![1.0, 2.0]);
        assert_eq!(t.average_ms(), 1.5);
    }
}
