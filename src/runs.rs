//! Run-length tables over global base positions
//!
//! Both the exception table (non-canonical symbols) and the case mask (soft-masked
//! canonical bases) are sparse in practice but arrive in long stretches: N-gaps and
//! repeat annotations. They are stored as sorted, non-overlapping runs and queried
//! by binary search.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// A stretch of consecutive positions sharing one value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run<V> {
    pub start: u64,
    pub len: u64,
    pub value: V,
}
impl<V> Run<V> {
    /// One past the last position covered by the run
    #[must_use]
    pub fn end(&self) -> u64 {
        self.start + self.len
    }
}

/// Sorted run-length table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTable<V> {
    runs: Vec<Run<V>>,
}

/// Positional overrides for symbols outside of the canonical alphabet
pub type ExceptionTable = RunTable<u8>;

/// Positions of canonical bases that were lowercase in the source
pub type CaseMask = RunTable<()>;

impl<V> Default for RunTable<V> {
    fn default() -> Self {
        Self { runs: Vec::new() }
    }
}

impl<V: Copy + Eq> RunTable<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` at `position`
    ///
    /// Positions must be pushed in increasing order. A position directly following
    /// the last run with the same value extends that run.
    pub fn push(&mut self, position: u64, value: V) {
        if let Some(last) = self.runs.last_mut() {
            debug_assert!(position >= last.end(), "positions must be pushed in order");
            if last.end() == position && last.value == value {
                last.len += 1;
                return;
            }
        }
        self.runs.push(Run {
            start: position,
            len: 1,
            value,
        });
    }

    /// Appends a whole run, coalescing it with the last run when contiguous
    pub fn push_run(&mut self, run: Run<V>) {
        if run.len == 0 {
            return;
        }
        if let Some(last) = self.runs.last_mut() {
            if last.end() == run.start && last.value == run.value {
                last.len += run.len;
                return;
            }
        }
        self.runs.push(run);
    }

    /// Value recorded at `position`, if any
    #[must_use]
    pub fn get(&self, position: u64) -> Option<V> {
        let idx = self.runs.partition_point(|run| run.start <= position);
        let run = self.runs.get(idx.checked_sub(1)?)?;
        (position < run.end()).then_some(run.value)
    }

    /// Whether any run covers `position`
    #[must_use]
    pub fn contains(&self, position: u64) -> bool {
        self.get(position).is_some()
    }

    /// Iterates over all runs intersecting `start..end`
    pub fn overlapping(&self, start: u64, end: u64) -> impl Iterator<Item = &Run<V>> {
        let first = self.runs.partition_point(|run| run.end() <= start);
        self.runs[first..]
            .iter()
            .take_while(move |run| run.start < end)
    }

    /// Returns the runs intersecting `start..end`, clipped and rebased to `start`
    #[must_use]
    pub fn slice(&self, start: u64, end: u64) -> Self {
        let runs = self
            .overlapping(start, end)
            .map(|run| {
                let lo = run.start.max(start);
                let hi = run.end().min(end);
                Run {
                    start: lo - start,
                    len: hi - lo,
                    value: run.value,
                }
            })
            .collect();
        Self { runs }
    }

    #[must_use]
    pub fn runs(&self) -> &[Run<V>] {
        &self.runs
    }

    /// Number of runs in the table
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Total number of positions covered
    #[must_use]
    pub fn covered(&self) -> u64 {
        self.runs.iter().map(|run| run.len).sum()
    }

    /// Checks that runs are non-empty, sorted, non-overlapping and below `total`
    pub fn validate(&self, total: u64) -> std::result::Result<(), String> {
        let mut cursor = 0;
        for (i, run) in self.runs.iter().enumerate() {
            if run.len == 0 {
                return Err(format!("run {i} is empty"));
            }
            if run.start < cursor {
                return Err(format!("run {i} at {} overlaps its predecessor", run.start));
            }
            let Some(end) = run.start.checked_add(run.len) else {
                return Err(format!("run {i} overflows"));
            };
            if end > total {
                return Err(format!("run {i} ends at {end}, beyond {total} bases"));
            }
            cursor = end;
        }
        Ok(())
    }
}

impl ExceptionTable {
    /// Serializes each run as `start: u64, len: u64, symbol: u8`
    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for run in &self.runs {
            writer.write_u64::<LittleEndian>(run.start)?;
            writer.write_u64::<LittleEndian>(run.len)?;
            writer.write_u8(run.value)?;
        }
        Ok(())
    }

    /// Reads `count` runs written by [`ExceptionTable::write_bytes`]
    pub fn read_bytes<R: Read>(reader: &mut R, count: u64) -> std::io::Result<Self> {
        let mut runs = Vec::new();
        for _ in 0..count {
            let start = reader.read_u64::<LittleEndian>()?;
            let len = reader.read_u64::<LittleEndian>()?;
            let value = reader.read_u8()?;
            runs.push(Run { start, len, value });
        }
        Ok(Self { runs })
    }
}

impl CaseMask {
    /// Serializes each run as `start: u64, len: u64`
    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for run in &self.runs {
            writer.write_u64::<LittleEndian>(run.start)?;
            writer.write_u64::<LittleEndian>(run.len)?;
        }
        Ok(())
    }

    /// Reads `count` runs written by [`CaseMask::write_bytes`]
    pub fn read_bytes<R: Read>(reader: &mut R, count: u64) -> std::io::Result<Self> {
        let mut runs = Vec::new();
        for _ in 0..count {
            let start = reader.read_u64::<LittleEndian>()?;
            let len = reader.read_u64::<LittleEndian>()?;
            runs.push(Run {
                start,
                len,
                value: (),
            });
        }
        Ok(Self { runs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(positions: &[(u64, u8)]) -> ExceptionTable {
        let mut table = ExceptionTable::new();
        for &(pos, sym) in positions {
            table.push(pos, sym);
        }
        table
    }

    fn run(start: u64, len: u64, value: u8) -> Run<u8> {
        Run { start, len, value }
    }

    #[test]
    fn adjacent_equal_symbols_coalesce() {
        let t = table(&[(3, b'N'), (4, b'N'), (5, b'N'), (6, b'R'), (9, b'N')]);
        assert_eq!(t.len(), 3);
        assert_eq!(t.covered(), 5);
        assert_eq!(t.runs()[0], run(3, 3, b'N'));
    }

    #[test]
    fn get_respects_run_bounds() {
        let t = table(&[(3, b'N'), (4, b'N'), (10, b'-')]);
        assert_eq!(t.get(2), None);
        assert_eq!(t.get(3), Some(b'N'));
        assert_eq!(t.get(4), Some(b'N'));
        assert_eq!(t.get(5), None);
        assert_eq!(t.get(10), Some(b'-'));
        assert_eq!(t.get(11), None);
        assert_eq!(ExceptionTable::new().get(0), None);
    }

    #[test]
    fn overlapping_and_slice() {
        let t = table(&[(0, b'N'), (1, b'N'), (5, b'R'), (8, b'N'), (9, b'N')]);
        let hits: Vec<u64> = t.overlapping(1, 9).map(|r| r.start).collect();
        assert_eq!(hits, vec![0, 5, 8]);

        let sliced = t.slice(1, 9);
        assert_eq!(sliced.runs(), &[run(0, 1, b'N'), run(4, 1, b'R'), run(7, 1, b'N')]);
    }

    #[test]
    fn validate_rejects_overlap_and_overflow() {
        let t = table(&[(0, b'N'), (4, b'N')]);
        assert!(t.validate(5).is_ok());
        assert!(t.validate(4).is_err());

        let overlapping = ExceptionTable {
            runs: vec![run(0, 4, b'N'), run(2, 1, b'R')],
        };
        assert!(overlapping.validate(10).is_err());
    }

    #[test]
    fn serialization_preserves_runs() {
        let t = table(&[(7, b'N'), (8, b'N'), (20, b'y')]);
        let mut buf = Vec::new();
        t.write_bytes(&mut buf).unwrap();
        let back = ExceptionTable::read_bytes(&mut buf.as_slice(), t.len() as u64).unwrap();
        assert_eq!(back, t);

        let mut mask = CaseMask::new();
        mask.push_run(Run {
            start: 2,
            len: 10,
            value: (),
        });
        let mut buf = Vec::new();
        mask.write_bytes(&mut buf).unwrap();
        assert_eq!(CaseMask::read_bytes(&mut buf.as_slice(), 1).unwrap(), mask);
    }
}
