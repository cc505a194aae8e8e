
use crate::data_types::read_set::Read;

use log::debug;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::collections::BTreeMap;

/// Union-find over genomic positions.
/// Every component is represented externally by the smallest position it contains.
#[derive(Clone, Debug)]
pub struct ComponentFinder {
    /// position to dense index
    index_of: HashMap<u64, usize>,
    /// parent pointer per index, roots point to themselves
    parent: Vec<usize>,
    /// upper bound on tree height per root
    rank: Vec<u8>,
    /// smallest position in the component, valid for roots
    min_position: Vec<u64>
}

impl ComponentFinder {
    /// Creates a finder where every position is its own component
    pub fn new(positions: &[u64]) -> ComponentFinder {
        let mut index_of: HashMap<u64, usize> = Default::default();
        let mut min_position = Vec::with_capacity(positions.len());
        for &p in positions.iter() {
            if !index_of.contains_key(&p) {
                index_of.insert(p, min_position.len());
                min_position.push(p);
            }
        }
        let n = min_position.len();
        ComponentFinder {
            index_of,
            parent: (0..n).collect(),
            rank: vec![0; n],
            min_position
        }
    }

    fn find_root(&mut self, index: usize) -> usize {
        let mut root = index;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // path compression
        let mut current = index;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    /// Merges the components containing two positions, unknown positions are ignored
    pub fn merge(&mut self, position1: u64, position2: u64) {
        let (i1, i2) = match (self.index_of.get(&position1), self.index_of.get(&position2)) {
            (Some(&i1), Some(&i2)) => (i1, i2),
            _ => return
        };
        let r1 = self.find_root(i1);
        let r2 = self.find_root(i2);
        if r1 == r2 {
            return;
        }

        let (high, low) = if self.rank[r1] >= self.rank[r2] { (r1, r2) } else { (r2, r1) };
        self.parent[low] = high;
        if self.rank[high] == self.rank[low] {
            self.rank[high] += 1;
        }
        self.min_position[high] = self.min_position[high].min(self.min_position[low]);
    }

    /// Returns the smallest position in the component of `position`, or None if the position is unknown
    pub fn find(&mut self, position: u64) -> Option<u64> {
        let index = *self.index_of.get(&position)?;
        let root = self.find_root(index);
        Some(self.min_position[root])
    }
}

/// Maps each position to its block id; positions are connected if a read observes both.
/// # Arguments
/// * `positions` - the sorted positions that were phased
/// * `reads` - the reads providing connectivity
/// * `master_block` - if provided, all of these positions are forced into one block
/// * `heterozygous_positions` - if provided, a read only connects positions that are heterozygous in its sample
/// # Panics
/// * if `positions` is not sorted
pub fn find_components<'a, I>(
    positions: &[u64], reads: I, master_block: Option<&[u64]>,
    heterozygous_positions: Option<&HashMap<u32, HashSet<u64>>>
) -> HashMap<u64, u64> where I: IntoIterator<Item = &'a Read> {
    debug!("Finding connected components...");
    assert!(positions.windows(2).all(|w| w[0] <= w[1]), "positions must be sorted");

    let mut component_finder = ComponentFinder::new(positions);
    let phased_positions: HashSet<u64> = positions.iter().cloned().collect();
    let empty: HashSet<u64> = Default::default();
    for read in reads {
        let allowed: Option<&HashSet<u64>> = heterozygous_positions
            .map(|h| h.get(&read.sample_id()).unwrap_or(&empty));
        let mut first: Option<u64> = None;
        for variant in read.variants() {
            let p = variant.position;
            if !phased_positions.contains(&p) || allowed.map(|a| !a.contains(&p)).unwrap_or(false) {
                continue;
            }
            match first {
                Some(f) => component_finder.merge(f, p),
                None => first = Some(p)
            };
        }
    }

    if let Some(master_block) = master_block {
        let mut known = master_block.iter().filter(|p| phased_positions.contains(p));
        if let Some(&anchor) = known.next() {
            for &p in known {
                component_finder.merge(anchor, p);
            }
        }
    }

    positions.iter()
        .map(|&p| (p, component_finder.find(p).unwrap_or(p)))
        .collect()
}

/// Returns the sorted positions of the largest block; ties go to the block with the smallest id
pub fn find_largest_component(components: &HashMap<u64, u64>) -> Vec<u64> {
    let mut blocks: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for (&position, &block_id) in components.iter() {
        blocks.entry(block_id).or_default().push(position);
    }

    let mut largest: Vec<u64> = vec![];
    for block in blocks.into_values() {
        if block.len() > largest.len() {
            largest = block;
        }
    }
    largest.sort_unstable();
    largest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::read_set::{Allele, VariantObservation};

    fn build_read(sample_id: u32, positions: &[u64]) -> Read {
        let variants = positions.iter()
            .map(|&p| VariantObservation::new(p, Allele::Reference, 10))
            .collect();
        Read::new(format!("read_{sample_id}_{}", positions[0]), 0, sample_id, variants).unwrap()
    }

    #[test]
    fn test_component_finder() {
        let mut finder = ComponentFinder::new(&[1, 2, 3, 4, 5]);
        finder.merge(4, 2);
        finder.merge(5, 4);
        assert_eq!(finder.find(5), Some(2));
        assert_eq!(finder.find(1), Some(1));
        finder.merge(3, 1);
        finder.merge(5, 3);
        for p in 1..6 {
            assert_eq!(finder.find(p), Some(1));
        }
        assert_eq!(finder.find(6), None);
        // unknown positions are ignored
        finder.merge(6, 1);
    }

    #[test]
    fn test_find_components() {
        let positions = [10, 20, 30, 40, 50, 60];
        let reads = [
            build_read(0, &[10, 20]),
            build_read(0, &[20, 30]),
            build_read(1, &[50, 60, 70])
        ];
        let components = find_components(&positions, reads.iter(), None, None);
        let expected: HashMap<u64, u64> = [(10, 10), (20, 10), (30, 10), (40, 40), (50, 50), (60, 50)].into_iter().collect();
        assert_eq!(components, expected);
        assert_eq!(find_largest_component(&components), vec![10, 20, 30]);
    }

    #[test]
    fn test_heterozygous_filter_and_master_block() {
        let positions = [10, 20, 30, 40, 50, 60];
        let reads = [
            build_read(0, &[10, 20]),
            build_read(0, &[20, 30]),
            build_read(1, &[10, 30, 50])
        ];

        // 20 is homozygous in sample 0 so it no longer bridges 10 and 30, sample 1 has no het sites
        let mut hets: HashMap<u32, HashSet<u64>> = Default::default();
        hets.insert(0, [10, 30, 50, 60].into_iter().collect());
        let components = find_components(&positions, reads.iter(), None, Some(&hets));
        for p in positions {
            assert_eq!(components[&p], p);
        }

        // forced merge, including a position that is not phased
        let master_block = [60, 30, 99];
        let components = find_components(&positions, reads.iter(), Some(&master_block), Some(&hets));
        assert_eq!(components[&60], 30);
        assert_eq!(components[&30], 30);
        assert_eq!(components[&10], 10);
        assert_eq!(find_largest_component(&components), vec![30, 60]);
    }

    #[test]
    fn test_largest_component_tie() {
        let components: HashMap<u64, u64> = [(5, 5), (6, 5), (1, 1), (2, 1)].into_iter().collect();
        assert_eq!(find_largest_component(&components), vec![1, 2]);
        assert!(find_largest_component(&Default::default()).is_empty());
    }
}
