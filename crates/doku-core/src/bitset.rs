//! Fixed-width bitsets backing label populations and adjacency matrices.
//!
//! Populations are sets of interned word ids; adjacency relations are
//! square bit matrices over the final label ordering. Everything the inner
//! search loop does (intersection, subset test, neighbor counting) is a
//! word-wide AND plus popcount here.

const WORD_BITS: usize = 64;

/// A fixed-capacity set of small integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitSet {
    words: Vec<u64>,
    bits: usize,
}

impl BitSet {
    /// Create an empty set with capacity for `bits` elements.
    pub fn new(bits: usize) -> Self {
        Self {
            words: vec![0; bits.div_ceil(WORD_BITS)],
            bits,
        }
    }

    pub fn capacity(&self) -> usize {
        self.bits
    }

    pub fn insert(&mut self, index: usize) {
        debug_assert!(index < self.bits);
        self.words[index / WORD_BITS] |= 1 << (index % WORD_BITS);
    }

    pub fn remove(&mut self, index: usize) {
        debug_assert!(index < self.bits);
        self.words[index / WORD_BITS] &= !(1 << (index % WORD_BITS));
    }

    pub fn contains(&self, index: usize) -> bool {
        debug_assert!(index < self.bits);
        self.words[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Number of elements shared with `other`.
    pub fn intersection_len(&self, other: &BitSet) -> usize {
        self.words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| (a & b).count_ones() as usize)
            .sum()
    }

    pub fn intersects(&self, other: &BitSet) -> bool {
        self.words.iter().zip(&other.words).any(|(a, b)| a & b != 0)
    }

    /// True iff every element of `self` is also in `other`.
    pub fn is_subset_of(&self, other: &BitSet) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .all(|(a, b)| a & !b == 0)
    }

    pub fn union_with(&mut self, other: &BitSet) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
    }

    pub fn intersect_with(&mut self, other: &BitSet) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= b;
        }
    }

    /// Remove every element of `other` from `self`.
    pub fn subtract(&mut self, other: &BitSet) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= !b;
        }
    }

    /// Iterate set elements in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(wi * WORD_BITS + bit)
            })
        })
    }
}

/// A symmetric boolean relation over `n` labels, one `BitSet` row per
/// label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitMatrix {
    rows: Vec<BitSet>,
    n: usize,
}

impl BitMatrix {
    pub fn new(n: usize) -> Self {
        Self {
            rows: (0..n).map(|_| BitSet::new(n)).collect(),
            n,
        }
    }

    /// Assemble a matrix from prebuilt rows, one per label.
    pub fn from_rows(rows: Vec<BitSet>) -> Self {
        let n = rows.len();
        debug_assert!(rows.iter().all(|r| r.capacity() == n));
        Self { rows, n }
    }

    pub fn size(&self) -> usize {
        self.n
    }

    /// Set both (a,b) and (b,a).
    pub fn set_pair(&mut self, a: usize, b: usize) {
        self.rows[a].insert(b);
        self.rows[b].insert(a);
    }

    pub fn contains(&self, a: usize, b: usize) -> bool {
        self.rows[a].contains(b)
    }

    pub fn row(&self, a: usize) -> &BitSet {
        &self.rows[a]
    }

    /// Number of neighbors of `a`.
    pub fn degree(&self, a: usize) -> usize {
        self.rows[a].len()
    }

    /// Number of labels adjacent to both `a` and `b`.
    pub fn shared_neighbors(&self, a: usize, b: usize) -> usize {
        self.rows[a].intersection_len(&self.rows[b])
    }
}
