
use crate::data_types::pedigree::Trio;

use rustc_hash::FxHashMap as HashMap;

/// Genetic distances below this (in cM) are treated as this value
pub const MIN_DISTANCE_CM: f64 = 1e-10;
/// Cost charged between two positions with no genetic distance; phred of `MIN_DISTANCE_CM`
pub const ZERO_DISTANCE_COST: u32 = 120;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum GeneticMapError {
    #[error("genetic map has no anchors")]
    Empty,
    #[error("genetic map positions must be strictly increasing, found {position} out of order")]
    UnsortedPosition { position: u64 },
    #[error("genetic map distance decreases at position {position}")]
    DecreasingDistance { position: u64 },
    #[error("genetic map distance at position {position} is not finite")]
    InvalidDistance { position: u64 }
}

/// A sparse genetic map of (position, cumulative centimorgans) anchors for one chromosome.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneticMap {
    /// anchor coordinates, strictly increasing
    positions: Vec<u64>,
    /// cumulative genetic distance at each anchor, non-decreasing
    centimorgans: Vec<f64>
}

impl GeneticMap {
    /// Creates a genetic map from anchors.
    /// # Arguments
    /// * `anchors` - (position, cumulative cM) pairs, must be sorted by position
    /// # Errors
    /// * if there are no anchors
    /// * if positions are not strictly increasing or distances decrease
    pub fn new(anchors: Vec<(u64, f64)>) -> Result<GeneticMap, GeneticMapError> {
        if anchors.is_empty() {
            return Err(GeneticMapError::Empty);
        }
        for &(position, cm) in anchors.iter() {
            if !cm.is_finite() {
                return Err(GeneticMapError::InvalidDistance { position });
            }
        }
        for pair in anchors.windows(2) {
            if pair[0].0 >= pair[1].0 {
                return Err(GeneticMapError::UnsortedPosition { position: pair[1].0 });
            }
            if pair[0].1 > pair[1].1 {
                return Err(GeneticMapError::DecreasingDistance { position: pair[1].0 });
            }
        }

        let (positions, centimorgans) = anchors.into_iter().unzip();
        Ok(GeneticMap {
            positions,
            centimorgans
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Returns the cumulative genetic distance at a position.
    /// Interpolates linearly between anchors, outside the anchors the nearest interval's rate is extended.
    /// A map with a single anchor is treated as a constant rate from position 0.
    pub fn centimorgans_at(&self, position: u64) -> f64 {
        let n = self.positions.len();
        if n == 1 {
            let (p0, c0) = (self.positions[0], self.centimorgans[0]);
            return if p0 == 0 { c0 } else { c0 / p0 as f64 * position as f64 };
        }

        let upper = self.positions.partition_point(|&p| p <= position);
        let left = if upper == 0 {
            0
        } else if upper == n {
            n - 2
        } else {
            upper - 1
        };
        let (p_a, c_a) = (self.positions[left] as f64, self.centimorgans[left]);
        let (p_b, c_b) = (self.positions[left + 1] as f64, self.centimorgans[left + 1]);
        c_a + (position as f64 - p_a) * (c_b - c_a) / (p_b - p_a)
    }
}

/// Converts a genetic distance in cM into a phred-scaled recombination cost.
/// Uses Haldane's map function; distances below `MIN_DISTANCE_CM` are raised to it.
pub fn centimorgan_to_phred(distance: f64) -> f64 {
    let distance = distance.max(MIN_DISTANCE_CM);
    // haldane: p = (1 - e^(-2d)) / 2 with d in Morgans
    let probability = -(-2.0 * distance / 100.0).exp_m1() / 2.0;
    -10.0 * probability.log10()
}

fn phred_to_cost(phred: f64) -> u32 {
    phred.round().min(u32::MAX as f64) as u32
}

/// Calculates recombination costs from a genetic map.
/// Element 0 is 0, element `i` is the cost of a recombination between positions `i-1` and `i`.
/// # Arguments
/// * `genetic_map` - the map for the chromosome containing `positions`
/// * `positions` - the sorted positions being phased
pub fn recombination_cost_map(genetic_map: &GeneticMap, positions: &[u64]) -> Vec<u32> {
    let centimorgans: Vec<f64> = positions.iter()
        .map(|&p| genetic_map.centimorgans_at(p))
        .collect();
    let mut costs = Vec::with_capacity(positions.len());
    for (i, &cm) in centimorgans.iter().enumerate() {
        if i == 0 {
            costs.push(0);
        } else {
            costs.push(phred_to_cost(centimorgan_to_phred(cm - centimorgans[i - 1])));
        }
    }
    costs
}

/// Calculates recombination costs assuming a constant rate.
/// # Arguments
/// * `recombination_rate` - the rate in cM per Mb
/// * `positions` - the sorted positions being phased
pub fn uniform_recombination_map(recombination_rate: f64, positions: &[u64]) -> Vec<u32> {
    let mut costs = Vec::with_capacity(positions.len());
    for (i, &position) in positions.iter().enumerate() {
        if i == 0 {
            costs.push(0);
        } else {
            let distance_bp = position.saturating_sub(positions[i - 1]) as f64;
            let distance_cm = distance_bp * 1e-6 * recombination_rate;
            costs.push(phred_to_cost(centimorgan_to_phred(distance_cm)));
        }
    }
    costs
}

/// How recombination costs are derived for a chromosome
#[derive(Clone, Debug, PartialEq)]
pub enum RecombinationModel {
    /// constant rate in cM/Mb
    Uniform(f64),
    /// interpolated from a genetic map
    GeneticMap(GeneticMap)
}

impl RecombinationModel {
    /// Returns one cost per position, see `recombination_cost_map()`
    pub fn costs(&self, positions: &[u64]) -> Vec<u32> {
        match self {
            RecombinationModel::Uniform(rate) => uniform_recombination_map(*rate, positions),
            RecombinationModel::GeneticMap(genetic_map) => recombination_cost_map(genetic_map, positions)
        }
    }
}

/// Unpacks the (maternal, paternal) haplotypes transmitted in one trio from a packed transmission value.
/// Trio `k` occupies bits `2k` (from the mother) and `2k+1` (from the father).
pub fn trio_transmission(transmission_value: u32, trio_index: usize) -> (u8, u8) {
    let shift = 2 * trio_index;
    (((transmission_value >> shift) & 1) as u8, ((transmission_value >> (shift + 1)) & 1) as u8)
}

/// A change in transmitted haplotypes between two adjacent positions of a child's block
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecombinationEvent {
    /// numeric sample id of the child
    pub child_id: u32,
    /// last position before the change
    pub position1: u64,
    /// first position after the change
    pub position2: u64,
    /// haplotype transmitted by the mother at `position1`
    pub transmitted_hap_mother1: u8,
    /// haplotype transmitted by the mother at `position2`
    pub transmitted_hap_mother2: u8,
    /// haplotype transmitted by the father at `position1`
    pub transmitted_hap_father1: u8,
    /// haplotype transmitted by the father at `position2`
    pub transmitted_hap_father2: u8,
    /// cost the phasing paid for this change
    pub recombination_cost: u64
}

/// Scans a transmission vector for recombination events.
/// Transmissions are compared between consecutive positions of the same child block, positions outside the child's blocks are skipped.
/// The reported cost is what the phasing paid for the changes of this trio between the two positions.
/// # Arguments
/// * `trios` - the trios, in the same order used to pack `transmission_vector`
/// * `transmission_vector` - one packed transmission value per position
/// * `positions` - the phased positions
/// * `recombination_costs` - one cost per position, see `recombination_cost_map()`
/// * `components` - per sample id, a map from position to block id
/// # Panics
/// * if `transmission_vector`, `positions`, and `recombination_costs` differ in length
pub fn find_recombination(
    trios: &[Trio], transmission_vector: &[u32], positions: &[u64], recombination_costs: &[u32],
    components: &HashMap<u32, HashMap<u64, u64>>
) -> Vec<RecombinationEvent> {
    assert_eq!(transmission_vector.len(), positions.len());
    assert_eq!(recombination_costs.len(), positions.len());

    let mut events = vec![];
    for (trio_index, trio) in trios.iter().enumerate() {
        let child_components = match components.get(&trio.child) {
            Some(c) => c,
            None => continue
        };
        // (index, block) of the last position seen in a child block
        let mut previous: Option<(usize, u64)> = None;
        for (i, position) in positions.iter().enumerate() {
            let block = match child_components.get(position) {
                Some(&b) => b,
                None => continue
            };
            if let Some((j, previous_block)) = previous {
                let (mother1, father1) = trio_transmission(transmission_vector[j], trio_index);
                let (mother2, father2) = trio_transmission(transmission_vector[i], trio_index);
                if previous_block == block && (mother1 != mother2 || father1 != father2) {
                    let recombination_cost: u64 = (j + 1..=i)
                        .map(|k| {
                            let (m1, f1) = trio_transmission(transmission_vector[k - 1], trio_index);
                            let (m2, f2) = trio_transmission(transmission_vector[k], trio_index);
                            ((m1 != m2) as u64 + (f1 != f2) as u64) * recombination_costs[k] as u64
                        })
                        .sum();
                    events.push(RecombinationEvent {
                        child_id: trio.child,
                        position1: positions[j],
                        position2: *position,
                        transmitted_hap_mother1: mother1,
                        transmitted_hap_mother2: mother2,
                        transmitted_hap_father1: father1,
                        transmitted_hap_father2: father2,
                        recombination_cost
                    });
                }
            }
            previous = Some((i, block));
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centimorgan_to_phred() {
        assert_eq!(phred_to_cost(centimorgan_to_phred(1.0)), 20);
        assert_eq!(phred_to_cost(centimorgan_to_phred(0.25)), 26);
        assert_eq!(phred_to_cost(centimorgan_to_phred(MIN_DISTANCE_CM)), ZERO_DISTANCE_COST);
        assert_eq!(phred_to_cost(centimorgan_to_phred(0.0)), ZERO_DISTANCE_COST);
        // far apart loci are unlinked, p = 0.5
        assert_eq!(phred_to_cost(centimorgan_to_phred(10000.0)), 3);
    }

    #[test]
    fn test_genetic_map() {
        let genetic_map = GeneticMap::new(vec![(1000, 0.0), (2000, 1.0), (4000, 2.0)]).unwrap();
        assert!((genetic_map.centimorgans_at(1500) - 0.5).abs() < 1e-9);
        assert!((genetic_map.centimorgans_at(2000) - 1.0).abs() < 1e-9);
        assert!((genetic_map.centimorgans_at(3000) - 1.5).abs() < 1e-9);
        // extrapolation uses the nearest interval
        assert!((genetic_map.centimorgans_at(5000) - 2.5).abs() < 1e-9);
        assert!((genetic_map.centimorgans_at(0) + 1.0).abs() < 1e-9);

        let single = GeneticMap::new(vec![(2000, 1.0)]).unwrap();
        assert!((single.centimorgans_at(4000) - 2.0).abs() < 1e-9);

        assert_eq!(GeneticMap::new(vec![]), Err(GeneticMapError::Empty));
        assert_eq!(
            GeneticMap::new(vec![(10, 0.0), (10, 1.0)]),
            Err(GeneticMapError::UnsortedPosition { position: 10 })
        );
        assert_eq!(
            GeneticMap::new(vec![(10, 1.0), (20, 0.5)]),
            Err(GeneticMapError::DecreasingDistance { position: 20 })
        );
    }

    #[test]
    fn test_recombination_cost_map() {
        let genetic_map = GeneticMap::new(vec![(1000, 0.0), (2000, 1.0), (4000, 2.0)]).unwrap();
        assert_eq!(recombination_cost_map(&genetic_map, &[1000, 2000, 2500]), vec![0, 20, 26]);
        assert!(recombination_cost_map(&genetic_map, &[]).is_empty());

        // flat stretches of the map still get a finite cost
        let flat = GeneticMap::new(vec![(1000, 0.0), (2000, 0.0)]).unwrap();
        assert_eq!(recombination_cost_map(&flat, &[1200, 1800]), vec![0, ZERO_DISTANCE_COST]);
    }

    #[test]
    fn test_uniform_monotonicity() {
        let positions = [100, 1100, 2100, 50000];
        let mut previous: Option<Vec<u32>> = None;
        for rate in [1e-7, 1e-3, 1.0, 100.0, 1e6] {
            let costs = uniform_recombination_map(rate, &positions);
            assert_eq!(costs.len(), positions.len());
            assert_eq!(costs[0], 0);
            if let Some(prev) = previous.as_ref() {
                for i in 1..positions.len() {
                    assert!(costs[i] <= prev[i]);
                }
            }
            previous = Some(costs);
        }

        assert_eq!(uniform_recombination_map(1e-7, &positions)[1], ZERO_DISTANCE_COST);
        assert_eq!(uniform_recombination_map(1e6, &positions)[1], 3);

        let model = RecombinationModel::Uniform(1.0);
        assert_eq!(model.costs(&positions), uniform_recombination_map(1.0, &positions));
    }

    #[test]
    fn test_find_recombination() {
        let trios = [Trio { mother: 0, father: 1, child: 2 }];
        let positions = [100, 200, 300, 400];
        let costs = [0, 5, 6, 7];
        // the mother switches haplotype between 200 and 300
        let transmission = [0, 0, 1, 1];

        let mut components: HashMap<u32, HashMap<u64, u64>> = Default::default();
        components.insert(2, positions.iter().map(|&p| (p, 100)).collect());
        let events = find_recombination(&trios, &transmission, &positions, &costs, &components);
        assert_eq!(events, vec![RecombinationEvent {
            child_id: 2,
            position1: 200,
            position2: 300,
            transmitted_hap_mother1: 0,
            transmitted_hap_mother2: 1,
            transmitted_hap_father1: 0,
            transmitted_hap_father2: 0,
            recombination_cost: 6
        }]);

        // a change across blocks is not a recombination
        let split: HashMap<u64, u64> = [(100, 100), (200, 100), (300, 300), (400, 300)].into_iter().collect();
        components.insert(2, split);
        assert!(find_recombination(&trios, &transmission, &positions, &costs, &components).is_empty());

        // positions outside the child's blocks are skipped over
        let sparse: HashMap<u64, u64> = [(100, 100), (400, 100)].into_iter().collect();
        components.insert(2, sparse);
        let events = find_recombination(&trios, &transmission, &positions, &costs, &components);
        assert_eq!(events.len(), 1);
        assert_eq!((events[0].position1, events[0].position2, events[0].recombination_cost), (100, 400, 6));

        assert_eq!(trio_transmission(0b0110, 0), (0, 1));
        assert_eq!(trio_transmission(0b0110, 1), (1, 0));
    }
}
