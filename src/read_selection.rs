
use crate::data_types::read_set::ReadSet;

use bit_vec::BitVec;
use log::debug;
use priority_queue::PriorityQueue;
use rustc_hash::FxHashMap as HashMap;
use std::cmp::Reverse;

/// Read ranking: more observations first, then higher total confidence, then lower index
type ReadPriority = (usize, u64, Reverse<usize>);

/// Tracks how many selected reads span each column.
struct CoverageMonitor {
    coverage: Vec<u32>
}

impl CoverageMonitor {
    fn new(num_columns: usize) -> CoverageMonitor {
        CoverageMonitor {
            coverage: vec![0; num_columns]
        }
    }

    /// Maximum coverage over the inclusive column range
    fn max_coverage_in_range(&self, first: usize, last: usize) -> u32 {
        self.coverage[first..=last].iter().cloned().max().unwrap_or(0)
    }

    fn add_read(&mut self, first: usize, last: usize) {
        for c in self.coverage[first..=last].iter_mut() {
            *c += 1;
        }
    }
}

/// Greedily selects a subset of reads such that no column is spanned by more than `max_coverage` reads.
/// Reads are taken in slices of non-overlapping reads, each slice picking reads in ranked order.
/// Returns the sorted indices of the selected reads.
/// # Arguments
/// * `read_set` - the reads to select from, indices refer to `read_set.reads()`
/// * `max_coverage` - the maximum number of selected reads spanning any column
/// * `min_read_variants` - reads with fewer observations are never selected
pub fn readselection(read_set: &ReadSet, max_coverage: u32, min_read_variants: usize) -> Vec<usize> {
    let positions = read_set.get_positions();
    let column_of: HashMap<u64, usize> = positions.iter().enumerate()
        .map(|(i, &p)| (p, i))
        .collect();

    let mut queue: PriorityQueue<usize, ReadPriority> = PriorityQueue::new();
    let mut spans: Vec<(usize, usize)> = Vec::with_capacity(read_set.len());
    let mut uninformative: usize = 0;
    for (index, read) in read_set.reads().iter().enumerate() {
        spans.push((column_of[&read.first_position()], column_of[&read.last_position()]));
        if read.len() < min_read_variants {
            uninformative += 1;
        } else {
            queue.push(index, (read.len(), read.total_confidence(), Reverse(index)));
        }
    }

    let mut coverage_monitor = CoverageMonitor::new(positions.len());
    let mut selected: Vec<usize> = vec![];
    let mut discarded: usize = 0;
    let mut num_slices: usize = 0;
    while !queue.is_empty() {
        num_slices += 1;
        let mut occupied: BitVec = BitVec::from_elem(positions.len(), false);
        let mut deferred: Vec<(usize, ReadPriority)> = vec![];
        while let Some((index, priority)) = queue.pop() {
            let (first, last) = spans[index];
            if (first..=last).any(|c| occupied[c]) {
                // already something in this slice here, try again in the next one
                deferred.push((index, priority));
            } else if coverage_monitor.max_coverage_in_range(first, last) < max_coverage {
                coverage_monitor.add_read(first, last);
                for c in first..=last {
                    occupied.set(c, true);
                }
                selected.push(index);
            } else {
                discarded += 1;
            }
        }
        queue.extend(deferred);
    }

    debug!("Read selection: {} selected, {} discarded, {} uninformative in {} slices", selected.len(), discarded, uninformative, num_slices);
    selected.sort_unstable();
    selected
}
