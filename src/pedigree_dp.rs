
use crate::data_types::pedigree::{Genotype, Individual, Pedigree, PedigreeError, mendelian_conflict};
use crate::data_types::read_set::{Allele, ReadSet, ReadSetError, VariantObservation};

use log::{debug, trace};

/// Sentinel for impossible states, all additions saturate
const INFINITE_COST: u64 = u64::MAX;
/// Default limit on the number of bits in a column state
pub const DEFAULT_MAX_STATE_BITS: u32 = 24;
/// Backtracking pointers are packed into 32 bits, so no column state can use more
pub const MAX_SUPPORTED_STATE_BITS: u32 = 32;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PhaseError {
    #[error("invalid read set: {0}")]
    ReadSet(#[from] ReadSetError),
    #[error("invalid pedigree: {0}")]
    Pedigree(#[from] PedigreeError),
    #[error("Mendelian conflict at position {position} between mother {mother:?}, father {father:?}, and child {child:?}")]
    MendelianConflict { position: u64, mother: String, father: String, child: String },
    #[error("no genotype combination at position {position} is consistent with the pedigree")]
    InfeasibleColumn { position: u64 },
    #[error("state space exceeded at position {position}: {active_reads} active reads need {state_bits} state bits, limit is {max_state_bits}")]
    StateSpaceExceeded { position: u64, active_reads: usize, state_bits: u32, max_state_bits: u32 },
    #[error("individual {sample:?} has {found} genotypes but {expected} positions are phased")]
    GenotypeLengthMismatch { sample: String, expected: usize, found: usize },
    #[error("expected {expected} recombination costs, found {found}")]
    RecombinationLengthMismatch { expected: usize, found: usize },
    #[error("read {read_name:?} belongs to sample id {sample_id} which is not in the pedigree")]
    UnknownReadSample { read_name: String, sample_id: u32 }
}

/// Controls for the pedigree DP
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DpConfig {
    /// if true, individuals with genotype likelihoods may deviate from their genotype at a cost
    pub distrust_genotypes: bool,
    /// maximum of (active reads + 2 * trios) at any column, also bounds 2 * (trios + founders)
    pub max_state_bits: u32
}

impl Default for DpConfig {
    fn default() -> Self {
        Self {
            distrust_genotypes: false,
            max_state_bits: DEFAULT_MAX_STATE_BITS
        }
    }
}

/// The two inferred haplotypes of one individual, one observation per phased position.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SuperReadPair {
    /// numeric id of the individual
    pub sample_id: u32,
    /// haplotype 0 is maternal and haplotype 1 is paternal for children of a trio
    pub haplotypes: [Vec<VariantObservation>; 2]
}

impl SuperReadPair {
    fn new(sample_id: u32, capacity: usize) -> SuperReadPair {
        SuperReadPair {
            sample_id,
            haplotypes: [Vec::with_capacity(capacity), Vec::with_capacity(capacity)]
        }
    }

    pub fn len(&self) -> usize {
        self.haplotypes[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.haplotypes[0].is_empty()
    }

    /// Returns the inferred genotype at an index, or None if either allele is undetermined
    pub fn genotype_at(&self, index: usize) -> Option<Genotype> {
        let a0 = self.haplotypes[0][index].allele;
        let a1 = self.haplotypes[1][index].allele;
        if a0.is_phaseable() && a1.is_phaseable() {
            Genotype::from_alt_count(a0 as usize + a1 as usize)
        } else {
            None
        }
    }

    /// True if both alleles are determined and they differ
    pub fn is_heterozygous(&self, index: usize) -> bool {
        self.genotype_at(index).map(|g| g.is_heterozygous()).unwrap_or(false)
    }
}

/// Solver counters, mostly for diagnostics
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DpStatistics {
    /// number of phased positions
    pub num_columns: usize,
    /// most reads active at a single column
    pub max_active_reads: usize,
    /// largest state width used, in bits
    pub max_state_bits: u32,
    /// total number of (bipartition, transmission) states scored
    pub states_evaluated: u64
}

/// Output of `pedigree_dp_solver()`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PedigreeDpResult {
    /// one pair per individual, in pedigree order
    pub super_reads: Vec<SuperReadPair>,
    /// packed transmission value per position, see `recombination::trio_transmission()`
    pub transmission_vector: Vec<u32>,
    /// haplotype of each read, indexed like `ReadSet::sorted_reads()`
    pub partitioning: Vec<u8>,
    /// total cost of the optimal solution
    pub optimal_cost: u64,
    /// counters from the run
    pub statistics: DpStatistics
}

/// For every transmission value and founder assignment, the alleles each individual carries.
/// Each founder contributes two free haplotype variables; children copy one haplotype from each parent as chosen by the transmission value.
struct InheritanceTable {
    num_individuals: usize,
    num_assignments: usize,
    /// flattened (tv, assignment, individual); bit 0 is the allele on haplotype 0, bit 1 on haplotype 1
    codes: Vec<u8>
}

impl InheritanceTable {
    /// # Arguments
    /// * `num_individuals` - pedigree size
    /// * `order` - individual indices with parents before children
    /// * `trios` - [mother, father, child] indices, trio `k` owns transmission bits `2k` and `2k+1`
    fn new(num_individuals: usize, order: &[usize], trios: &[[usize; 3]]) -> InheritanceTable {
        let mut parent_trio: Vec<Option<usize>> = vec![None; num_individuals];
        for (k, trio) in trios.iter().enumerate() {
            parent_trio[trio[2]] = Some(k);
        }
        let mut founder_slot: Vec<usize> = vec![0; num_individuals];
        let mut num_founders = 0;
        for &i in order.iter() {
            if parent_trio[i].is_none() {
                founder_slot[i] = num_founders;
                num_founders += 1;
            }
        }

        let num_tv = 1_usize << (2 * trios.len());
        let num_assignments = 1_usize << (2 * num_founders);
        let mut codes = vec![0; num_tv * num_assignments * num_individuals];
        let mut alleles: Vec<[u8; 2]> = vec![[0, 0]; num_individuals];
        for tv in 0..num_tv {
            for assignment in 0..num_assignments {
                for &i in order.iter() {
                    alleles[i] = match parent_trio[i] {
                        None => {
                            let shift = 2 * founder_slot[i];
                            [((assignment >> shift) & 1) as u8, ((assignment >> (shift + 1)) & 1) as u8]
                        },
                        Some(k) => {
                            let maternal = (tv >> (2 * k)) & 1;
                            let paternal = (tv >> (2 * k + 1)) & 1;
                            [alleles[trios[k][0]][maternal], alleles[trios[k][1]][paternal]]
                        }
                    };
                }
                let offset = (tv * num_assignments + assignment) * num_individuals;
                for (i, a) in alleles.iter().enumerate() {
                    codes[offset + i] = a[0] | (a[1] << 1);
                }
            }
        }

        InheritanceTable {
            num_individuals,
            num_assignments,
            codes
        }
    }

    fn codes(&self, tv: usize, assignment: usize) -> &[u8] {
        let offset = (tv * self.num_assignments + assignment) * self.num_individuals;
        &self.codes[offset..offset + self.num_individuals]
    }

    /// Total cost of an assignment given per-individual costs for each allele code
    fn assignment_cost(&self, tv: usize, assignment: usize, individual_costs: &[[u64; 4]]) -> u64 {
        self.codes(tv, assignment).iter()
            .zip(individual_costs.iter())
            .fold(0, |acc, (&code, costs)| acc.saturating_add(costs[code as usize]))
    }

    /// Cheapest assignment for a transmission value, ties go to the first assignment
    fn best_assignment(&self, tv: usize, individual_costs: &[[u64; 4]]) -> (usize, u64) {
        let mut best = (0, INFINITE_COST);
        for assignment in 0..self.num_assignments {
            let cost = self.assignment_cost(tv, assignment, individual_costs);
            if cost < best.1 {
                best = (assignment, cost);
            }
        }
        best
    }
}

/// Everything the DP needs to score one position.
struct ColumnData {
    /// (active bit, individual index, allele, confidence) for each phaseable observation
    observations: Vec<(usize, usize, usize, u64)>,
    /// per individual, the cost of carrying 0, 1, or 2 alternate alleles
    genotype_costs: Vec<[u64; 3]>
}

impl ColumnData {
    /// Per individual, the cost of each allele code under the read bipartition `state`
    fn individual_costs(&self, state: usize) -> Vec<[u64; 4]> {
        let mut mismatch: Vec<[[u64; 2]; 2]> = vec![[[0; 2]; 2]; self.genotype_costs.len()];
        for &(bit, individual, allele, confidence) in self.observations.iter() {
            let haplotype = (state >> bit) & 1;
            // the read pays if its haplotype carries the other allele
            mismatch[individual][haplotype][1 - allele] += confidence;
        }

        mismatch.iter().zip(self.genotype_costs.iter())
            .map(|(m, g)| {
                let mut costs = [0; 4];
                for (code, cost) in costs.iter_mut().enumerate() {
                    let (a0, a1) = (code & 1, code >> 1);
                    *cost = m[0][a0].saturating_add(m[1][a1]).saturating_add(g[a0 + a1]);
                }
                costs
            })
            .collect()
    }
}

/// Cost of each genotype for an individual at a column
fn genotype_costs(individual: &Individual, column: usize, distrust_genotypes: bool) -> [u64; 3] {
    match individual.likelihoods()[column] {
        Some(likelihoods) if distrust_genotypes => likelihoods.phred_costs().map(|c| c as u64),
        _ => {
            let mut costs = [INFINITE_COST; 3];
            costs[individual.genotypes()[column].alt_count()] = 0;
            costs
        }
    }
}

/// Finds the first trio whose allowed genotypes cannot be reconciled at a column
fn find_conflict(pedigree: &Pedigree, trios: &[[usize; 3]], column: &ColumnData, position: u64) -> PhaseError {
    let allowed = |i: usize| -> Vec<Genotype> {
        (0..3).filter(|&g| column.genotype_costs[i][g] != INFINITE_COST)
            .filter_map(Genotype::from_alt_count)
            .collect()
    };
    for trio in trios.iter() {
        let (mothers, fathers, children) = (allowed(trio[0]), allowed(trio[1]), allowed(trio[2]));
        let consistent = mothers.iter().any(|&m| {
            fathers.iter().any(|&f| children.iter().any(|&c| !mendelian_conflict(m, f, c)))
        });
        if !consistent {
            let individuals = pedigree.individuals();
            return PhaseError::MendelianConflict {
                position,
                mother: individuals[trio[0]].name().to_string(),
                father: individuals[trio[1]].name().to_string(),
                child: individuals[trio[2]].name().to_string()
            };
        }
    }
    PhaseError::InfeasibleColumn { position }
}

/// Two state bits per trio or founder, saturating for absurd pedigrees
fn pedigree_bits(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX).saturating_mul(2)
}

/// Gathers the bits at `bits` in `state` into a dense index
fn project(state: usize, bits: &[usize]) -> usize {
    bits.iter().enumerate()
        .fold(0, |acc, (k, &b)| acc | (((state >> b) & 1) << k))
}

/// Runs the pedigree-aware phasing DP on a sorted read set.
/// Every position observed by a read is a column; the state at a column is the bipartition of the reads active there plus one transmission value per trio.
/// The result minimizes read mismatch cost, plus recombination cost per changed transmission bit, plus genotype cost in distrust mode.
/// # Arguments
/// * `read_set` - the reads to phase, must be sorted
/// * `recombination_costs` - one cost per position of `read_set.get_positions()`, element 0 is ignored
/// * `pedigree` - the individuals, with genotypes aligned to `read_set.get_positions()`
/// * `config` - solver controls
/// # Errors
/// * if the read set is not sorted, or a read belongs to a sample outside the pedigree
/// * if genotype or recombination vectors do not match the number of positions
/// * if the genotypes are not Mendelian consistent where they are trusted
/// * if a column state, or the transmission and founder enumeration of the pedigree, would be wider than `config.max_state_bits`
pub fn pedigree_dp_solver(
    read_set: &ReadSet, recombination_costs: &[u32], pedigree: &Pedigree, config: &DpConfig
) -> Result<PedigreeDpResult, PhaseError> {
    let reads = read_set.sorted_reads()?;
    let positions = read_set.get_positions();
    let num_columns = positions.len();
    let num_individuals = pedigree.len();

    if num_columns == 0 {
        return Ok(PedigreeDpResult {
            super_reads: pedigree.individuals().iter().map(|ind| SuperReadPair::new(ind.id(), 0)).collect(),
            ..Default::default()
        });
    }

    if recombination_costs.len() != num_columns {
        return Err(PhaseError::RecombinationLengthMismatch { expected: num_columns, found: recombination_costs.len() });
    }
    for individual in pedigree.individuals().iter() {
        if individual.genotypes().len() != num_columns {
            return Err(PhaseError::GenotypeLengthMismatch {
                sample: individual.name().to_string(),
                expected: num_columns,
                found: individual.genotypes().len()
            });
        }
    }

    let order = pedigree.topological_order()?;
    let trios = pedigree.trio_indices();
    let max_state_bits = config.max_state_bits.min(MAX_SUPPORTED_STATE_BITS);

    // transmission values and founder haplotypes are enumerated for every column, so bound them before allocating anything
    let mut is_child: Vec<bool> = vec![false; num_individuals];
    for trio in trios.iter() {
        is_child[trio[2]] = true;
    }
    let num_founders = is_child.iter().filter(|&&c| !c).count();
    let trio_bits = pedigree_bits(trios.len());
    let founder_bits = pedigree_bits(num_founders);
    let num_tv = match 1_usize.checked_shl(trio_bits) {
        Some(n) if trio_bits.saturating_add(founder_bits) <= max_state_bits => n,
        _ => {
            return Err(PhaseError::StateSpaceExceeded {
                position: positions[0],
                active_reads: 0,
                state_bits: trio_bits.saturating_add(founder_bits),
                max_state_bits
            });
        }
    };
    debug!("Pedigree DP: {} reads, {} positions, {} individuals, {} trios", reads.len(), num_columns, num_individuals, trios.len());

    // lay out the reads by column
    let column_of = |p: u64| positions.partition_point(|&x| x < p);
    let mut read_spans: Vec<(usize, usize)> = Vec::with_capacity(reads.len());
    let mut starts: Vec<Vec<usize>> = vec![vec![]; num_columns];
    let mut raw_observations: Vec<Vec<(usize, usize, usize, u64)>> = vec![vec![]; num_columns];
    for (r, read) in reads.iter().enumerate() {
        let individual = pedigree.index_of(read.sample_id())
            .ok_or_else(|| PhaseError::UnknownReadSample { read_name: read.name().to_string(), sample_id: read.sample_id() })?;
        let span = (column_of(read.first_position()), column_of(read.last_position()));
        starts[span.0].push(r);
        read_spans.push(span);
        for v in read.variants().iter().filter(|v| v.allele.is_phaseable()) {
            raw_observations[column_of(v.position)].push((r, individual, v.allele as usize, v.confidence as u64));
        }
    }

    // active reads stay sorted by index because reads are sorted by start
    let mut active_by_column: Vec<Vec<usize>> = Vec::with_capacity(num_columns);
    let mut active: Vec<usize> = vec![];
    for (c, column_starts) in starts.iter().enumerate() {
        active.retain(|&r| read_spans[r].1 >= c);
        active.extend(column_starts.iter().cloned());
        active_by_column.push(active.clone());
    }

    let mut columns: Vec<ColumnData> = Vec::with_capacity(num_columns);
    for (c, raw) in raw_observations.into_iter().enumerate() {
        let active = &active_by_column[c];
        let observations = raw.into_iter()
            .map(|(r, individual, allele, confidence)| {
                // every observing read is active here
                let bit = active.binary_search(&r).unwrap_or_default();
                (bit, individual, allele, confidence)
            })
            .collect();
        let genotype_costs = pedigree.individuals().iter()
            .map(|ind| genotype_costs(ind, c, config.distrust_genotypes))
            .collect();
        columns.push(ColumnData { observations, genotype_costs });
    }

    let inheritance = InheritanceTable::new(num_individuals, &order, &trios);

    // infeasible columns are independent of the reads, so report them before doing any real work
    for (c, column) in columns.iter().enumerate() {
        let individual_costs = column.individual_costs(0);
        let feasible = (0..num_tv).any(|tv| inheritance.best_assignment(tv, &individual_costs).1 != INFINITE_COST);
        if !feasible {
            return Err(find_conflict(pedigree, &trios, column, positions[c]));
        }
    }

    let mut statistics = DpStatistics {
        num_columns,
        ..Default::default()
    };

    // forward pass
    // shared_bits[c] are the bits in column c of reads also active in column c-1
    // pointers[c] is indexed by (projection onto shared_bits[c], tv) and packs (previous state, previous tv)
    let mut shared_bits: Vec<Vec<usize>> = Vec::with_capacity(num_columns);
    let mut pointers: Vec<Vec<u32>> = Vec::with_capacity(num_columns);
    let mut previous_costs: Vec<u64> = vec![];
    for c in 0..num_columns {
        let active = &active_by_column[c];
        let state_bits = active.len() as u32 + trio_bits;
        if state_bits > max_state_bits {
            return Err(PhaseError::StateSpaceExceeded {
                position: positions[c],
                active_reads: active.len(),
                state_bits,
                max_state_bits
            });
        }
        statistics.max_active_reads = statistics.max_active_reads.max(active.len());
        statistics.max_state_bits = statistics.max_state_bits.max(state_bits);
        let num_states = 1_usize << active.len();

        let (next_bits, transition, column_pointers) = if c == 0 {
            (vec![], vec![0; num_tv], vec![])
        } else {
            let previous_active = &active_by_column[c - 1];
            let mut prev_bits: Vec<usize> = vec![];
            let mut next_bits: Vec<usize> = vec![];
            for (bit, r) in active.iter().enumerate() {
                if let Ok(prev_bit) = previous_active.binary_search(r) {
                    prev_bits.push(prev_bit);
                    next_bits.push(bit);
                }
            }

            // best previous state for each (projection, previous tv)
            let num_projections = 1_usize << prev_bits.len();
            let mut best_previous: Vec<u64> = vec![INFINITE_COST; num_projections * num_tv];
            let mut best_previous_state: Vec<usize> = vec![0; num_projections * num_tv];
            for previous_state in 0..(1_usize << previous_active.len()) {
                let slot_base = project(previous_state, &prev_bits) * num_tv;
                for tv in 0..num_tv {
                    let cost = previous_costs[previous_state * num_tv + tv];
                    if cost < best_previous[slot_base + tv] {
                        best_previous[slot_base + tv] = cost;
                        best_previous_state[slot_base + tv] = previous_state;
                    }
                }
            }

            // then add the recombination cost for each change in transmission
            let recombination = recombination_costs[c] as u64;
            let mut transition: Vec<u64> = vec![INFINITE_COST; num_projections * num_tv];
            let mut column_pointers: Vec<u32> = vec![0; num_projections * num_tv];
            for projection in 0..num_projections {
                let slot_base = projection * num_tv;
                for tv in 0..num_tv {
                    for previous_tv in 0..num_tv {
                        let base = best_previous[slot_base + previous_tv];
                        if base == INFINITE_COST {
                            continue;
                        }
                        let changes = (tv ^ previous_tv).count_ones() as u64;
                        let cost = base.saturating_add(recombination.saturating_mul(changes));
                        if cost < transition[slot_base + tv] {
                            transition[slot_base + tv] = cost;
                            column_pointers[slot_base + tv] = (best_previous_state[slot_base + previous_tv] * num_tv + previous_tv) as u32;
                        }
                    }
                }
            }
            (next_bits, transition, column_pointers)
        };

        let column = &columns[c];
        let mut costs: Vec<u64> = vec![INFINITE_COST; num_states * num_tv];
        for state in 0..num_states {
            let slot_base = project(state, &next_bits) * num_tv;
            let individual_costs = column.individual_costs(state);
            for tv in 0..num_tv {
                let incoming = transition[slot_base + tv];
                if incoming == INFINITE_COST {
                    continue;
                }
                let (_, column_cost) = inheritance.best_assignment(tv, &individual_costs);
                costs[state * num_tv + tv] = incoming.saturating_add(column_cost);
            }
        }
        statistics.states_evaluated += (num_states * num_tv) as u64;
        trace!("Column {} at {}: {} active reads, {} shared", c, positions[c], active.len(), next_bits.len());

        shared_bits.push(next_bits);
        pointers.push(column_pointers);
        previous_costs = costs;
    }

    // pick the best final state, first one wins ties
    let mut best_index = 0;
    for (index, &cost) in previous_costs.iter().enumerate() {
        if cost < previous_costs[best_index] {
            best_index = index;
        }
    }
    let optimal_cost = previous_costs[best_index];
    if optimal_cost == INFINITE_COST {
        return Err(PhaseError::InfeasibleColumn { position: positions[num_columns - 1] });
    }

    // backtrack
    let mut path: Vec<(usize, usize)> = vec![(0, 0); num_columns];
    let (mut state, mut tv) = (best_index / num_tv, best_index % num_tv);
    for c in (0..num_columns).rev() {
        path[c] = (state, tv);
        if c > 0 {
            let pointer = pointers[c][project(state, &shared_bits[c]) * num_tv + tv] as usize;
            state = pointer / num_tv;
            tv = pointer % num_tv;
        }
    }

    // super reads from the best assignment along the path
    let mut super_reads: Vec<SuperReadPair> = pedigree.individuals().iter()
        .map(|ind| SuperReadPair::new(ind.id(), num_columns))
        .collect();
    for (c, &(state, tv)) in path.iter().enumerate() {
        let individual_costs = columns[c].individual_costs(state);
        let assignment_costs: Vec<u64> = (0..inheritance.num_assignments)
            .map(|a| inheritance.assignment_cost(tv, a, &individual_costs))
            .collect();
        let (best_assignment, best_cost) = inheritance.best_assignment(tv, &individual_costs);
        let best_codes = inheritance.codes(tv, best_assignment);

        for (i, super_read) in super_reads.iter_mut().enumerate() {
            for (haplotype, observations) in super_read.haplotypes.iter_mut().enumerate() {
                let allele_bit = ((best_codes[i] >> haplotype) & 1) as usize;
                // cheapest way to put the other allele on this haplotype
                let alternative = assignment_costs.iter().enumerate()
                    .filter(|&(a, _)| ((inheritance.codes(tv, a)[i] >> haplotype) & 1) as usize != allele_bit)
                    .map(|(_, &cost)| cost)
                    .min()
                    .unwrap_or(INFINITE_COST);
                let observation = if alternative == best_cost {
                    VariantObservation::new(positions[c], Allele::Undetermined, 0)
                } else {
                    let quality = (alternative - best_cost).min(u32::MAX as u64) as u32;
                    VariantObservation::new(positions[c], Allele::from_bit(allele_bit), quality)
                };
                observations.push(observation);
            }
        }
    }

    let transmission_vector: Vec<u32> = path.iter().map(|&(_, tv)| tv as u32).collect();
    let partitioning: Vec<u8> = (0..reads.len())
        .map(|r| {
            let first_column = read_spans[r].0;
            let (state, _) = path[first_column];
            let bit = active_by_column[first_column].binary_search(&r).unwrap_or_default();
            ((state >> bit) & 1) as u8
        })
        .collect();

    debug!("Pedigree DP finished with cost {}, {} states evaluated", optimal_cost, statistics.states_evaluated);
    Ok(PedigreeDpResult {
        super_reads,
        transmission_vector,
        partitioning,
        optimal_cost,
        statistics
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::pedigree::GenotypeLikelihoods;
    use crate::data_types::read_set::Read;
    use crate::data_types::sample_ids::NumericSampleIds;
    use crate::recombination::{trio_transmission, uniform_recombination_map};

    fn build_read(name: &str, sample_id: u32, observations: &[(u64, u8)]) -> Read {
        let variants = observations.iter()
            .map(|&(p, a)| VariantObservation::new(p, Allele::from_repr(a).unwrap(), 10))
            .collect();
        Read::new(name.to_string(), 0, sample_id, variants).unwrap()
    }

    fn build_read_set(reads: Vec<Read>) -> ReadSet {
        let mut read_set = ReadSet::new();
        for read in reads.into_iter() {
            read_set.add(read);
        }
        read_set.sort();
        read_set
    }

    fn trusted(genotypes: &[usize]) -> (Vec<Genotype>, Vec<Option<GenotypeLikelihoods>>) {
        (
            genotypes.iter().map(|&g| Genotype::from_alt_count(g).unwrap()).collect(),
            vec![None; genotypes.len()]
        )
    }

    /// mother, father, child with ids 0, 1, 2
    fn build_trio(mother: &[usize], father: &[usize], child: &[usize]) -> Pedigree {
        let mut ids = NumericSampleIds::new();
        let mut pedigree = Pedigree::new();
        for (name, genotypes) in [("mother", mother), ("father", father), ("child", child)] {
            let (g, l) = trusted(genotypes);
            pedigree.add_individual(&mut ids, name, g, l).unwrap();
        }
        pedigree.add_relationship(&ids, "mother", "father", "child").unwrap();
        pedigree
    }

    fn alleles(observations: &[VariantObservation]) -> Vec<Allele> {
        observations.iter().map(|v| v.allele).collect()
    }

    #[test]
    fn test_single_individual() {
        let mut ids = NumericSampleIds::new();
        let mut pedigree = Pedigree::new();
        let (g, l) = trusted(&[1, 1, 1]);
        pedigree.add_individual(&mut ids, "sample", g, l).unwrap();

        let read_set = build_read_set(vec![
            build_read("r1", 0, &[(100, 0), (200, 1)]),
            build_read("r3", 0, &[(100, 1), (200, 0)]),
            build_read("r2", 0, &[(200, 1), (300, 0)])
        ]);
        let costs = vec![0; 3];
        let result = pedigree_dp_solver(&read_set, &costs, &pedigree, &DpConfig::default()).unwrap();
        assert_eq!(result.optimal_cost, 0);
        assert!(result.transmission_vector.iter().all(|&tv| tv == 0));

        // sorted order is r1, r3, r2
        let p = &result.partitioning;
        assert_eq!(p.len(), 3);
        assert_eq!(p[0], p[2]);
        assert_ne!(p[0], p[1]);

        let r1_hap = &result.super_reads[0].haplotypes[p[0] as usize];
        assert_eq!(alleles(r1_hap), vec![Allele::Reference, Allele::Alternate, Allele::Reference]);
        for i in 0..3 {
            assert!(result.super_reads[0].is_heterozygous(i));
        }
        // the single read at 300 is worth 10
        assert_eq!(r1_hap[2].confidence, 10);

        assert_eq!(result.statistics.num_columns, 3);
        assert_eq!(result.statistics.max_active_reads, 3);
    }

    #[test]
    fn test_empty_read_set() {
        let pedigree = build_trio(&[], &[], &[]);
        let result = pedigree_dp_solver(&build_read_set(vec![]), &[], &pedigree, &DpConfig::default()).unwrap();
        assert_eq!(result.super_reads.len(), 3);
        assert!(result.super_reads.iter().all(|s| s.is_empty()));
        assert!(result.transmission_vector.is_empty());
        assert_eq!(result.optimal_cost, 0);
    }

    #[test]
    fn test_input_errors() {
        let pedigree = build_trio(&[1, 1], &[0, 0], &[1, 0]);
        let read_set = build_read_set(vec![build_read("m1", 0, &[(100, 0), (200, 1)])]);
        assert_eq!(
            pedigree_dp_solver(&read_set, &[0], &pedigree, &DpConfig::default()),
            Err(PhaseError::RecombinationLengthMismatch { expected: 2, found: 1 })
        );

        let mut unsorted = ReadSet::new();
        unsorted.add(build_read("m1", 0, &[(100, 0), (200, 1)]));
        assert_eq!(
            pedigree_dp_solver(&unsorted, &[0, 0], &pedigree, &DpConfig::default()),
            Err(PhaseError::ReadSet(ReadSetError::NotSorted))
        );

        let stranger = build_read_set(vec![build_read("s1", 7, &[(100, 0), (200, 1)])]);
        assert_eq!(
            pedigree_dp_solver(&stranger, &[0, 0], &pedigree, &DpConfig::default()),
            Err(PhaseError::UnknownReadSample { read_name: "s1".to_string(), sample_id: 7 })
        );

        let short = build_trio(&[1], &[0], &[1]);
        assert_eq!(
            pedigree_dp_solver(&read_set, &[0, 0], &short, &DpConfig::default()),
            Err(PhaseError::GenotypeLengthMismatch { sample: "mother".to_string(), expected: 2, found: 1 })
        );
    }

    #[test]
    fn test_trusted_trio() {
        let pedigree = build_trio(&[1, 1], &[0, 0], &[1, 0]);
        let read_set = build_read_set(vec![
            build_read("m1", 0, &[(100, 0), (200, 1)]),
            build_read("m2", 0, &[(100, 1), (200, 0)]),
            build_read("c1", 2, &[(100, 1), (200, 0)]),
            build_read("c2", 2, &[(100, 0), (200, 0)])
        ]);
        let costs = uniform_recombination_map(1.0, &read_set.get_positions());
        let result = pedigree_dp_solver(&read_set, &costs, &pedigree, &DpConfig::default()).unwrap();
        assert_eq!(result.optimal_cost, 0);
        assert_eq!(result.transmission_vector[0], result.transmission_vector[1]);

        // the child got the mother's 1-0 haplotype and the father's reference
        let (maternal, _) = trio_transmission(result.transmission_vector[0], 0);
        let mother = &result.super_reads[0];
        let father = &result.super_reads[1];
        let child = &result.super_reads[2];
        assert_eq!(alleles(&mother.haplotypes[maternal as usize]), vec![Allele::Alternate, Allele::Reference]);
        assert_eq!(alleles(&child.haplotypes[0]), vec![Allele::Alternate, Allele::Reference]);
        assert_eq!(alleles(&child.haplotypes[1]), vec![Allele::Reference, Allele::Reference]);
        assert_eq!(alleles(&father.haplotypes[0]), vec![Allele::Reference, Allele::Reference]);
        assert_eq!(child.genotype_at(0), Some(Genotype::Heterozygous));
        assert_eq!(child.genotype_at(1), Some(Genotype::HomozygousReference));
    }

    #[test]
    fn test_mendelian_conflict() {
        let pedigree = build_trio(&[0, 0], &[0, 0], &[0, 1]);
        let read_set = build_read_set(vec![build_read("c1", 2, &[(100, 0), (200, 1)])]);
        let costs = vec![0, 10];

        // trusted genotypes cannot be reconciled
        assert_eq!(
            pedigree_dp_solver(&read_set, &costs, &pedigree, &DpConfig::default()),
            Err(PhaseError::MendelianConflict {
                position: 200,
                mother: "mother".to_string(),
                father: "father".to_string(),
                child: "child".to_string()
            })
        );

        // distrust without any likelihoods is still trusted
        let distrust = DpConfig { distrust_genotypes: true, ..Default::default() };
        assert!(matches!(
            pedigree_dp_solver(&read_set, &costs, &pedigree, &distrust),
            Err(PhaseError::MendelianConflict { position: 200, .. })
        ));

        // with likelihoods for the child, the het call is overruled at a cost
        let mut ids = NumericSampleIds::new();
        let mut soft = Pedigree::new();
        for name in ["mother", "father"] {
            let (g, l) = trusted(&[0, 0]);
            soft.add_individual(&mut ids, name, g, l).unwrap();
        }
        let child_likelihoods = vec![None, Some(GenotypeLikelihoods::from_phred(30.0, 0.0, 60.0))];
        soft.add_individual(&mut ids, "child", trusted(&[0, 1]).0, child_likelihoods).unwrap();
        soft.add_relationship(&ids, "mother", "father", "child").unwrap();

        let result = pedigree_dp_solver(&read_set, &costs, &soft, &distrust).unwrap();
        // 30 for the genotype, 10 for the read carrying the alternate allele
        assert_eq!(result.optimal_cost, 40);
        assert_eq!(result.super_reads[2].genotype_at(1), Some(Genotype::HomozygousReference));

        // trusted mode ignores the likelihoods
        assert!(pedigree_dp_solver(&read_set, &costs, &soft, &DpConfig::default()).is_err());
    }

    #[test]
    fn test_idempotent_and_subset() {
        let mut ids = NumericSampleIds::new();
        let mut pedigree = Pedigree::new();
        let (g, l) = trusted(&[1, 1, 1]);
        pedigree.add_individual(&mut ids, "sample", g, l).unwrap();

        let read_set = build_read_set(vec![
            build_read("r1", 0, &[(100, 0), (200, 1), (300, 0)]),
            build_read("r2", 0, &[(100, 1), (200, 0), (300, 1)]),
            build_read("r3", 0, &[(100, 0), (200, 0)])
        ]);
        let costs = vec![0; 3];
        let full = pedigree_dp_solver(&read_set, &costs, &pedigree, &DpConfig::default()).unwrap();
        assert_eq!(full.optimal_cost, 10);
        assert_eq!(full, pedigree_dp_solver(&read_set, &costs, &pedigree, &DpConfig::default()).unwrap());

        // dropping the erroneous read can only lower the cost
        let subset = read_set.subset(&[0, 1]);
        assert_eq!(subset.get_positions(), read_set.get_positions());
        let partial = pedigree_dp_solver(&subset, &costs, &pedigree, &DpConfig::default()).unwrap();
        assert!(partial.optimal_cost <= full.optimal_cost);
        assert_eq!(partial.optimal_cost, 0);
    }

    #[test]
    fn test_recombination_rate() {
        let pedigree = build_trio(&[1, 1, 1, 1], &[0, 0, 0, 0], &[1, 1, 1, 1]);
        let read_set = build_read_set(vec![
            build_read("m1", 0, &[(100, 0), (200, 0), (300, 1), (400, 1)]),
            build_read("m2", 0, &[(100, 1), (200, 1), (300, 0), (400, 0)])
        ]);
        let positions = read_set.get_positions();

        // recombination is too expensive, the mother's reads pay instead
        let costs = uniform_recombination_map(1e-7, &positions);
        let result = pedigree_dp_solver(&read_set, &costs, &pedigree, &DpConfig::default()).unwrap();
        assert_eq!(result.optimal_cost, 40);
        assert!(result.transmission_vector.windows(2).all(|w| w[0] == w[1]));

        // recombination is cheap, the maternal haplotype switches between 200 and 300
        let costs = uniform_recombination_map(1e6, &positions);
        let result = pedigree_dp_solver(&read_set, &costs, &pedigree, &DpConfig::default()).unwrap();
        assert_eq!(result.optimal_cost, costs[2] as u64);
        let transmitted: Vec<(u8, u8)> = result.transmission_vector.iter()
            .map(|&tv| trio_transmission(tv, 0))
            .collect();
        assert_eq!(transmitted[0], transmitted[1]);
        assert_ne!(transmitted[1].0, transmitted[2].0);
        assert_eq!(transmitted[1].1, transmitted[2].1);
        assert_eq!(transmitted[2], transmitted[3]);
    }

    #[test]
    fn test_state_space_exceeded() {
        let mut ids = NumericSampleIds::new();
        let mut pedigree = Pedigree::new();
        let (g, l) = trusted(&[1, 1]);
        pedigree.add_individual(&mut ids, "sample", g, l).unwrap();

        let reads = (0..4).map(|i| build_read(&format!("r{i}"), 0, &[(100, 0), (200, 1)])).collect();
        let read_set = build_read_set(reads);
        let config = DpConfig { max_state_bits: 3, ..Default::default() };
        assert_eq!(
            pedigree_dp_solver(&read_set, &[0, 0], &pedigree, &config),
            Err(PhaseError::StateSpaceExceeded { position: 100, active_reads: 4, state_bits: 4, max_state_bits: 3 })
        );
        assert!(pedigree_dp_solver(&read_set, &[0, 0], &pedigree, &DpConfig::default()).is_ok());
    }

    #[test]
    fn test_large_family_state_space() {
        // 13 trios and 2 founders need 30 bits before any read is placed
        let mut ids = NumericSampleIds::new();
        let mut pedigree = Pedigree::new();
        let names: Vec<String> = ["mother", "father"].iter().map(|s| s.to_string())
            .chain((0..13).map(|i| format!("child_{i}")))
            .collect();
        for name in names.iter() {
            let (g, l) = trusted(&[1, 1]);
            pedigree.add_individual(&mut ids, name, g, l).unwrap();
        }
        for child in names.iter().skip(2) {
            pedigree.add_relationship(&ids, "mother", "father", child).unwrap();
        }

        let read_set = build_read_set(vec![build_read("m1", 0, &[(100, 0), (200, 1)])]);
        assert_eq!(
            pedigree_dp_solver(&read_set, &[0, 0], &pedigree, &DpConfig::default()),
            Err(PhaseError::StateSpaceExceeded { position: 100, active_reads: 0, state_bits: 30, max_state_bits: 24 })
        );

        // the bit count saturates instead of overflowing
        assert_eq!(pedigree_bits(3), 6);
        assert_eq!(pedigree_bits(usize::MAX), u32::MAX);
    }
}
