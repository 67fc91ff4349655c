//! Sliding-window replay protection for received counters.

/// Replay window size in frames (matching WireGuard).
pub const REPLAY_WINDOW_SIZE: usize = 2048;

const WORDS: usize = REPLAY_WINDOW_SIZE / 64;

/// Tracks which counters in the last [`REPLAY_WINDOW_SIZE`] have been seen.
///
/// `check` is read-only so a frame can be authenticated before its counter
/// is committed with `accept`; a forged frame never moves the window.
#[derive(Clone, Debug)]
pub struct ReplayWindow {
    highest: u64,
    bitmap: [u64; WORDS],
    seen_any: bool,
}

impl ReplayWindow {
    pub fn new() -> Self {
        Self {
            highest: 0,
            bitmap: [0; WORDS],
            seen_any: false,
        }
    }

    /// A window that treats every counter up to and including `highest` as
    /// already seen.
    pub fn after(highest: u64) -> Self {
        Self {
            highest,
            bitmap: [u64::MAX; WORDS],
            seen_any: true,
        }
    }

    /// Whether `counter` is new and inside the window.
    pub fn check(&self, counter: u64) -> bool {
        if !self.seen_any || counter > self.highest {
            return true;
        }
        if self.highest - counter >= REPLAY_WINDOW_SIZE as u64 {
            return false;
        }
        !self.is_set(counter)
    }

    /// Record `counter` as seen. Call only after a successful `check` and
    /// authentication.
    pub fn accept(&mut self, counter: u64) {
        if !self.seen_any {
            self.seen_any = true;
            self.highest = counter;
        } else if counter > self.highest {
            let advance = counter - self.highest;
            if advance >= REPLAY_WINDOW_SIZE as u64 {
                self.bitmap = [0; WORDS];
            } else {
                for skipped in self.highest + 1..counter {
                    self.clear(skipped);
                }
            }
            self.highest = counter;
        }
        self.set(counter);
    }

    /// Highest counter accepted so far.
    pub fn highest(&self) -> Option<u64> {
        self.seen_any.then_some(self.highest)
    }

    fn position(counter: u64) -> (usize, u64) {
        let bit = (counter % REPLAY_WINDOW_SIZE as u64) as usize;
        (bit / 64, 1u64 << (bit % 64))
    }

    fn is_set(&self, counter: u64) -> bool {
        let (word, mask) = Self::position(counter);
        self.bitmap[word] & mask != 0
    }

    fn set(&mut self, counter: u64) {
        let (word, mask) = Self::position(counter);
        self.bitmap[word] |= mask;
    }

    fn clear(&mut self, counter: u64) {
        let (word, mask) = Self::position(counter);
        self.bitmap[word] &= !mask;
    }
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self::new()
    }
}
