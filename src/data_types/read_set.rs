
use std::collections::BTreeMap;

/// Allele observed at a variant position.
/// Reads only ever carry the first three values, `Undetermined` is reserved for super reads.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, strum_macros::FromRepr)]
pub enum Allele {
    Reference=0,
    Alternate=1,
    /// observed, but the read could not be assigned to either allele; carries no cost
    Unphaseable=2,
    /// super read sentinel for an allele the phasing did not determine
    Undetermined=3
}

impl Allele {
    /// Returns true if this is a 0 or 1 allele
    pub fn is_phaseable(&self) -> bool {
        *self < Allele::Unphaseable
    }

    /// Converts a 0/1 bit into an allele
    pub fn from_bit(bit: usize) -> Allele {
        if bit == 0 { Allele::Reference } else { Allele::Alternate }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ReadSetError {
    #[error("read {read_name:?} has no variant observations")]
    EmptyRead { read_name: String },
    #[error("read {read_name:?} is not sorted by position at {position}")]
    UnsortedRead { read_name: String, position: u64 },
    #[error("read set must be sorted before per-variant iteration")]
    NotSorted
}

/// A single allele observation tied to a variant position.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct VariantObservation {
    /// The coordinate of the variant, 0-based
    pub position: u64,
    /// The observed allele
    pub allele: Allele,
    /// Cost of flipping this observation to the other allele, usually a phred-scaled quality
    pub confidence: u32
}

impl VariantObservation {
    pub fn new(position: u64, allele: Allele, confidence: u32) -> VariantObservation {
        VariantObservation {
            position,
            allele,
            confidence
        }
    }
}

/// A read that has been converted into a series of variant observations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Read {
    /// the read name
    name: String,
    /// the input file the read was loaded from
    source_id: u32,
    /// the numeric id of the sample that owns this read
    sample_id: u32,
    /// the observations, strictly increasing by position
    variants: Vec<VariantObservation>
}

impl Read {
    /// Creates a new read from a list of observations.
    /// # Arguments
    /// * `name` - the read name
    /// * `source_id` - index of the input the read came from
    /// * `sample_id` - numeric id of the owning sample
    /// * `variants` - the observations, must be strictly increasing by position
    /// # Errors
    /// * if `variants` is empty
    /// * if positions are not strictly increasing
    pub fn new(name: String, source_id: u32, sample_id: u32, variants: Vec<VariantObservation>) -> Result<Read, ReadSetError> {
        if variants.is_empty() {
            return Err(ReadSetError::EmptyRead { read_name: name });
        }
        for pair in variants.windows(2) {
            if pair[0].position >= pair[1].position {
                return Err(ReadSetError::UnsortedRead { read_name: name, position: pair[1].position });
            }
        }
        Ok(Read {
            name,
            source_id,
            sample_id,
            variants
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_id(&self) -> u32 {
        self.source_id
    }

    pub fn sample_id(&self) -> u32 {
        self.sample_id
    }

    pub fn variants(&self) -> &[VariantObservation] {
        &self.variants
    }

    /// Returns the number of observations in the read
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Position of the first observation
    pub fn first_position(&self) -> u64 {
        self.variants[0].position
    }

    /// Position of the last observation
    pub fn last_position(&self) -> u64 {
        self.variants[self.variants.len() - 1].position
    }

    /// Sum of all observation confidences
    pub fn total_confidence(&self) -> u64 {
        self.variants.iter()
            .map(|v| v.confidence as u64)
            .sum()
    }
}

/// An insertion-ordered collection of reads with position and coverage indices.
#[derive(Clone, Debug, Default)]
pub struct ReadSet {
    /// all reads in the set
    reads: Vec<Read>,
    /// number of reads observing each position
    coverage: BTreeMap<u64, u32>,
    /// set once `sort()` has been called, cleared on `add()`
    sorted: bool
}

impl ReadSet {
    pub fn new() -> ReadSet {
        Default::default()
    }

    /// Appends a read to the set, this invalidates sorting.
    pub fn add(&mut self, read: Read) {
        for v in read.variants() {
            *self.coverage.entry(v.position).or_insert(0) += 1;
        }
        self.reads.push(read);
        self.sorted = false;
    }

    /// Deterministically orders the reads by (first position, sample id).
    /// The sort is stable, so reads with identical keys keep their insertion order.
    pub fn sort(&mut self) {
        self.reads.sort_by_key(|r| (r.first_position(), r.sample_id()));
        self.sorted = true;
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Creates a new read set from the reads at the given indices.
    /// Relative order from the original is preserved regardless of the order of `indices`.
    /// # Arguments
    /// * `indices` - the read indices to keep
    /// # Panics
    /// * if any index is out of bounds
    pub fn subset(&self, indices: &[usize]) -> ReadSet {
        let mut ordered: Vec<usize> = indices.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut ret = ReadSet::new();
        for &i in ordered.iter() {
            ret.add(self.reads[i].clone());
        }
        ret.sorted = self.sorted;
        ret
    }

    /// Returns the sorted, distinct positions covered by any read
    pub fn get_positions(&self) -> Vec<u64> {
        self.coverage.keys().cloned().collect()
    }

    /// Returns the number of reads observing each position, sorted by position
    pub fn coverage(&self) -> &BTreeMap<u64, u32> {
        &self.coverage
    }

    /// Returns the reads in insertion order; no ordering guarantees
    pub fn reads(&self) -> &[Read] {
        &self.reads
    }

    /// Returns the reads in their deterministic sorted order.
    /// # Errors
    /// * if `sort()` was not called after the last `add()`
    pub fn sorted_reads(&self) -> Result<&[Read], ReadSetError> {
        if self.sorted {
            Ok(&self.reads)
        } else {
            Err(ReadSetError::NotSorted)
        }
    }

    pub fn len(&self) -> usize {
        self.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Read> {
        self.reads.iter()
    }
}

impl<'a> IntoIterator for &'a ReadSet {
    type Item = &'a Read;
    type IntoIter = std::slice::Iter<'a, Read>;

    fn into_iter(self) -> Self::IntoIter {
        self.reads.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Creates a read with quality 10 observations at the given (position, allele) pairs
    pub fn build_read(name: &str, sample_id: u32, observations: &[(u64, u8)]) -> Read {
        let variants = observations.iter()
            .map(|&(p, a)| VariantObservation::new(p, Allele::from_repr(a).unwrap(), 10))
            .collect();
        Read::new(name.to_string(), 0, sample_id, variants).unwrap()
    }

    #[test]
    fn test_read_constructor() {
        let read = build_read("r1", 0, &[(10, 0), (20, 1), (35, 2)]);
        assert_eq!(read.len(), 3);
        assert_eq!(read.first_position(), 10);
        assert_eq!(read.last_position(), 35);
        assert_eq!(read.total_confidence(), 30);

        // out of order positions are rejected immediately
        let bad = Read::new("bad".to_string(), 0, 0, vec![
            VariantObservation::new(20, Allele::Reference, 1),
            VariantObservation::new(10, Allele::Alternate, 1)
        ]);
        assert_eq!(bad, Err(ReadSetError::UnsortedRead { read_name: "bad".to_string(), position: 10 }));

        // so are duplicates
        let dup = Read::new("dup".to_string(), 0, 0, vec![
            VariantObservation::new(20, Allele::Reference, 1),
            VariantObservation::new(20, Allele::Alternate, 1)
        ]);
        assert!(dup.is_err());

        let empty = Read::new("empty".to_string(), 0, 0, vec![]);
        assert_eq!(empty, Err(ReadSetError::EmptyRead { read_name: "empty".to_string() }));
    }

    #[test]
    fn test_sort_and_positions() {
        let mut read_set = ReadSet::new();
        read_set.add(build_read("r1", 1, &[(30, 0), (40, 1)]));
        read_set.add(build_read("r2", 0, &[(10, 0), (30, 1)]));
        read_set.add(build_read("r3", 0, &[(30, 1), (50, 1)]));
        assert!(!read_set.is_sorted());
        assert_eq!(read_set.sorted_reads(), Err(ReadSetError::NotSorted));

        read_set.sort();
        let names: Vec<&str> = read_set.sorted_reads().unwrap().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["r2", "r3", "r1"]);
        assert_eq!(read_set.get_positions(), vec![10, 30, 40, 50]);
        assert_eq!(read_set.coverage().get(&30), Some(&3));

        // adding clears the sorted flag
        read_set.add(build_read("r4", 0, &[(5, 0), (6, 1)]));
        assert!(!read_set.is_sorted());
    }

    #[test]
    fn test_subset() {
        let mut read_set = ReadSet::new();
        read_set.add(build_read("r1", 0, &[(10, 0), (20, 1)]));
        read_set.add(build_read("r2", 0, &[(20, 0), (30, 1)]));
        read_set.add(build_read("r3", 0, &[(40, 1), (50, 1)]));
        read_set.sort();

        let sub = read_set.subset(&[2, 0]);
        assert!(sub.is_sorted());
        let names: Vec<&str> = sub.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["r1", "r3"]);
        assert_eq!(sub.get_positions(), vec![10, 20, 40, 50]);

        // the original is untouched
        assert_eq!(read_set.len(), 3);
    }
}
