/// Fixed-capacity ring of equally sized `f64` vectors stored in one arena.
///
/// Slots are addressed two ways:
///
/// - `get_array(k)`: relative offset, `k = 0` is the most recent insertion.
/// - `get_sym(i, j)`: absolute window indices, `0` is the oldest retained
///   insertion and `len() - 1` the newest. Row `i` is read as the lagged
///   quantities recorded when `i` was inserted, so `get_sym(i, j)` returns
///   column `|i - j|` of the later row.
///
/// Both lookups return `None` for entries that were never written (or were
/// overwritten) instead of handing back stale storage.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    capacity: usize,
    width: usize,
    start: usize,
    len: usize,
    data: Vec<f64>,
}

impl HistoryBuffer {
    pub fn new(capacity: usize, width: usize) -> Self {
        assert!(capacity > 0, "history buffer needs at least one slot");
        Self {
            capacity,
            width,
            start: 0,
            len: 0,
            data: vec![0.0; capacity * width],
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copies `values` into the next slot, overwriting the oldest one once the
    /// buffer is full.
    ///
    /// # Panics
    ///
    /// Panics if `values.len()` differs from the buffer width.
    pub fn insert(&mut self, values: &[f64]) {
        assert_eq!(
            values.len(),
            self.width,
            "history entries must have exactly {} elements",
            self.width
        );
        let slot = (self.start + self.len) % self.capacity;
        self.slot_mut(slot).copy_from_slice(values);

        if self.len == self.capacity {
            self.start = (self.start + 1) % self.capacity;
        } else {
            self.len += 1;
        }
    }

    pub fn get_array(&self, k: usize) -> Option<&[f64]> {
        if k >= self.len {
            return None;
        }
        Some(self.slot(self.slot_of_absolute(self.len - 1 - k)))
    }

    pub fn get_sym(&self, i: usize, j: usize) -> Option<f64> {
        let (later, earlier) = if i >= j { (i, j) } else { (j, i) };
        if later >= self.len {
            return None;
        }
        let lag = later - earlier;
        if lag >= self.width {
            return None;
        }
        Some(self.slot(self.slot_of_absolute(later))[lag])
    }

    /// Forgets every entry. Storage is kept for reuse.
    pub fn reset(&mut self) {
        self.start = 0;
        self.len = 0;
    }

    #[inline]
    fn slot_of_absolute(&self, index: usize) -> usize {
        (self.start + index) % self.capacity
    }

    #[inline]
    fn slot(&self, slot: usize) -> &[f64] {
        &self.data[slot * self.width..(slot + 1) * self.width]
    }

    #[inline]
    fn slot_mut(&mut self, slot: usize) -> &mut [f64] {
        &mut self.data[slot * self.width..(slot + 1) * self.width]
    }
}
