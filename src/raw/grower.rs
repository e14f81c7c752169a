// The default size degree of a new table, 256 cells.
pub const DEFAULT_DEGREE: u8 = 8;

// The smallest table we allocate, 4 cells.
pub const MIN_DEGREE: u8 = 2;

// Above this degree the table grows by doubling instead of quadrupling,
// limiting memory amplification for very large tables.
const CROSSOVER_DEGREE: u8 = 23;

// The largest degree whose capacity still fits in an `isize`.
const MAX_DEGREE: u8 = (usize::BITS - 2) as u8;

// The sizing policy of a table.
//
// The entire state is the size degree: the table holds `2^degree` cells and
// is considered full at half capacity. Power-of-two sizes let placement and
// probing use a mask instead of a modulo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grower {
    size_degree: u8,
}

impl Default for Grower {
    fn default() -> Grower {
        Grower::new(DEFAULT_DEGREE)
    }
}

impl Grower {
    // Create a grower for a table of `2^size_degree` cells.
    #[inline]
    pub fn new(size_degree: u8) -> Grower {
        assert!(
            (MIN_DEGREE..=MAX_DEGREE).contains(&size_degree),
            "size degree {size_degree} out of range"
        );

        Grower { size_degree }
    }

    // Returns the smallest grower that can hold `entries` entries without overflowing.
    pub fn for_entries(entries: usize) -> Grower {
        let mut degree = MIN_DEGREE;
        while degree < MAX_DEGREE && Grower::new(degree).overflow(entries) {
            degree += 1;
        }

        Grower::new(degree)
    }

    // Returns the size degree.
    #[inline]
    pub fn size_degree(&self) -> u8 {
        self.size_degree
    }

    // Returns the number of cells in the table.
    #[inline]
    pub fn capacity(&self) -> usize {
        1 << self.size_degree
    }

    // Returns the fill threshold, half of the capacity.
    #[inline]
    pub fn max_fill(&self) -> usize {
        1 << (self.size_degree - 1)
    }

    #[inline]
    pub fn mask(&self) -> usize {
        self.capacity() - 1
    }

    // Returns the home cell for a hash.
    #[inline]
    pub fn place(&self, hash: u64) -> usize {
        (hash as usize) & self.mask()
    }

    // Returns the cell after `pos` in the probe chain.
    #[inline]
    pub fn next(&self, pos: usize) -> usize {
        (pos + 1) & self.mask()
    }

    // Returns `true` if a table holding `count` entries must grow.
    #[inline]
    pub fn overflow(&self, count: usize) -> bool {
        count >= self.max_fill()
    }

    // Returns the grower for the next table size.
    pub fn grow(&self) -> Grower {
        let step = if self.size_degree >= CROSSOVER_DEGREE { 1 } else { 2 };
        let size_degree = self.size_degree.saturating_add(step);

        assert!(size_degree <= MAX_DEGREE, "`HashMap` exceeded maximum capacity");
        Grower { size_degree }
    }
}

// A linear probe sequence.
//
// Visits every cell of the table exactly once, starting at the home cell
// of the hash.
pub struct Probe {
    // The current index in the probe sequence.
    pub i: usize,
    // The number of cells visited so far.
    pub len: usize,
    grower: Grower,
}

impl Probe {
    // Initialize the probe sequence for a hash.
    #[inline]
    pub fn start(hash: u64, grower: Grower) -> Probe {
        Probe {
            i: grower.place(hash),
            len: 0,
            grower,
        }
    }

    // Advance to the next cell, returning `false` once every cell has been visited.
    #[inline]
    pub fn next(&mut self) -> bool {
        self.len += 1;
        self.i = self.grower.next(self.i);
        self.len < self.grower.capacity()
    }
}
