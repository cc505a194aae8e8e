
use crate::block_gen::PhaseRegion;
use crate::components::{find_components, find_largest_component};
use crate::data_types::pedigree::{Genotype, GenotypeCall, GenotypeLikelihoods, Pedigree};
use crate::data_types::read_set::{Allele, Read, ReadSet};
use crate::data_types::sample_ids::NumericSampleIds;
use crate::pedigree_dp::{DEFAULT_MAX_STATE_BITS, DpConfig, PedigreeDpResult, PhaseError, pedigree_dp_solver};
use crate::read_selection::readselection;
use crate::recombination::{RecombinationEvent, RecombinationModel, find_recombination};
use crate::writers::phase_stats::{PhaseStats, ReadStats};

use log::{debug, trace, warn};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Phred-scaled quality assumed for calls without likelihoods when genotypes are distrusted
pub const DEFAULT_GENOTYPE_QUALITY: f64 = 30.0;
/// Blocks with fewer phased positions than this are reported unphased
pub const MIN_BLOCK_SIZE: usize = 2;

/// Controls for phasing a single region
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseConfig {
    /// maximum number of selected reads covering a position, applied per sample
    pub max_coverage: u32,
    /// reads with fewer observations are never selected
    pub min_read_variants: usize,
    /// if true, genotypes may be changed by the phasing at a cost
    pub distrust_genotypes: bool,
    /// quality given to calls without likelihoods when `distrust_genotypes` is set
    pub default_genotype_quality: f64,
    /// if true, homozygous positions are also placed into blocks
    pub include_homozygous: bool,
    /// if true, blocks are connected across the family wherever it has trios
    pub genetic_haplotyping: bool,
    /// state space limit handed to the DP
    pub max_state_bits: u32
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            max_coverage: 15,
            min_read_variants: 2,
            distrust_genotypes: false,
            default_genotype_quality: DEFAULT_GENOTYPE_QUALITY,
            include_homozygous: false,
            genetic_haplotyping: false,
            max_state_bits: DEFAULT_MAX_STATE_BITS
        }
    }
}

/// Everything needed to phase one family over one region
#[derive(Clone, Debug)]
pub struct PhaseProblem {
    /// the job being solved
    pub region: PhaseRegion,
    /// registry containing every member of the family
    pub sample_ids: NumericSampleIds,
    /// family member names, in pedigree order
    pub members: Vec<String>,
    /// (mother, father, child) names
    pub trios: Vec<(String, String, String)>,
    /// the family's reads inside the region
    pub reads: Vec<Read>,
    /// position -> sample id -> call; a sample without a call is homozygous reference
    pub genotype_calls: BTreeMap<u64, HashMap<u32, GenotypeCall>>,
    /// recombination model for the chromosome
    pub recombination: Arc<RecombinationModel>
}

/// Phasing output for one individual over the positions of a `PhaseResult`
#[derive(Clone, Debug, PartialEq)]
pub struct SamplePhase {
    pub sample_id: u32,
    pub sample_name: String,
    /// allele pair per position, in haplotype order where phased
    pub alleles: Vec<[Allele; 2]>,
    /// block id per position, None when unphased
    pub phase_sets: Vec<Option<u64>>
}

impl SamplePhase {
    /// The number of positions assigned to a block
    pub fn num_phased(&self) -> usize {
        self.phase_sets.iter().filter(|ps| ps.is_some()).count()
    }

    /// Returns the map from phased position to block id
    /// # Arguments
    /// * `positions` - the positions the phase sets are indexed by
    pub fn block_map(&self, positions: &[u64]) -> HashMap<u64, u64> {
        positions.iter().zip(self.phase_sets.iter())
            .filter_map(|(&p, ps)| ps.map(|b| (p, b)))
            .collect()
    }
}

/// Contains all the phasing results from a single region
pub struct PhaseResult {
    /// The region that was solved
    pub region: PhaseRegion,
    /// Every position observed by a read in the region
    pub positions: Vec<u64>,
    /// One entry per family member
    pub samples: Vec<SamplePhase>,
    /// Transmission changes inside child blocks
    pub recombination_events: Vec<RecombinationEvent>,
    /// Statistics on the reads
    pub read_statistics: Option<ReadStats>,
    /// Statistics from the solver
    pub statistics: Option<PhaseStats>
}

/// The block and haplotype assignment of a single read
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadTag {
    pub read_name: String,
    /// index of the input file the read came from
    pub source_id: u32,
    pub sample_id: u32,
    /// block the read was tagged in, None if untagged
    pub block_id: Option<u64>,
    /// haplotype 0 or 1 within the block, None if untagged
    pub haplotype: Option<u8>,
    pub num_variants: usize,
    pub first_position: u64,
    pub last_position: u64,
    /// true if the read was used by the phasing
    pub selected: bool
}

impl ReadTag {
    fn untagged(read: &Read, selected: bool) -> ReadTag {
        ReadTag {
            read_name: read.name().to_string(),
            source_id: read.source_id(),
            sample_id: read.sample_id(),
            block_id: None,
            haplotype: None,
            num_variants: read.len(),
            first_position: read.first_position(),
            last_position: read.last_position(),
            selected
        }
    }
}

/// Contains all the read tags for a region
pub struct HaplotagResult {
    /// The region that was solved
    pub region: PhaseRegion,
    /// Names of the family members by sample id
    pub sample_names: HashMap<u32, String>,
    /// One tag per read, in sorted read order
    pub reads: Vec<ReadTag>
}

/// Returns the allele pair of an unphased genotype
fn genotype_alleles(genotype: Genotype) -> [Allele; 2] {
    match genotype {
        Genotype::HomozygousReference => [Allele::Reference, Allele::Reference],
        Genotype::Heterozygous => [Allele::Reference, Allele::Alternate],
        Genotype::HomozygousAlternate => [Allele::Alternate, Allele::Alternate]
    }
}

/// Looks up the input call for a sample at a position
fn lookup_call(problem: &PhaseProblem, position: u64, sample_id: u32) -> Option<&GenotypeCall> {
    problem.genotype_calls.get(&position).and_then(|calls| calls.get(&sample_id))
}

/// The input genotype for a sample at a position, defaulting to homozygous reference
fn input_genotype(problem: &PhaseProblem, position: u64, sample_id: u32) -> Genotype {
    lookup_call(problem, position, sample_id)
        .map(|c| c.genotype)
        .unwrap_or(Genotype::HomozygousReference)
}

/// Sorted distinct positions observed by any of the reads
fn observed_positions(reads: &[Read]) -> Vec<u64> {
    let positions: BTreeSet<u64> = reads.iter()
        .flat_map(|r| r.variants().iter().map(|v| v.position))
        .collect();
    positions.into_iter().collect()
}

/// Builds the family pedigree with genotypes at the given positions.
/// # Arguments
/// * `problem` - the region problem, supplies members, trios, and calls
/// * `positions` - the positions the DP will phase
/// * `config` - controls the priors for calls without likelihoods
fn build_pedigree(problem: &PhaseProblem, positions: &[u64], config: &PhaseConfig) -> Result<Pedigree, PhaseError> {
    let mut sample_ids = problem.sample_ids.clone();
    let mut pedigree = Pedigree::new();
    for name in problem.members.iter() {
        let sample_id = sample_ids.id_of(name);
        let mut genotypes = Vec::with_capacity(positions.len());
        let mut likelihoods = Vec::with_capacity(positions.len());
        for &position in positions.iter() {
            let call = lookup_call(problem, position, sample_id);
            let genotype = call.map(|c| c.genotype).unwrap_or(Genotype::HomozygousReference);
            let likelihood = match call.and_then(|c| c.likelihoods) {
                Some(gl) => Some(gl),
                None if config.distrust_genotypes => Some(GenotypeLikelihoods::from_genotype_quality(genotype, config.default_genotype_quality)),
                None => None
            };
            genotypes.push(genotype);
            likelihoods.push(likelihood);
        }
        pedigree.add_individual(&mut sample_ids, name, genotypes, likelihoods)?;
    }

    for (mother, father, child) in problem.trios.iter() {
        pedigree.add_relationship(&sample_ids, mother, father, child)?;
    }
    Ok(pedigree)
}

/// Selects reads independently for each sample and returns the merged, sorted indices.
/// # Arguments
/// * `read_set` - all reads of the region, sorted
/// * `config` - supplies the coverage cap and minimum read length
fn select_reads(read_set: &ReadSet, config: &PhaseConfig) -> Vec<usize> {
    let mut by_sample: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (index, read) in read_set.reads().iter().enumerate() {
        by_sample.entry(read.sample_id()).or_default().push(index);
    }

    let mut selected: Vec<usize> = vec![];
    for (sample_id, indices) in by_sample.iter() {
        let sample_reads = read_set.subset(indices);
        let sample_selected = readselection(&sample_reads, config.max_coverage, config.min_read_variants);
        trace!("Sample {} selected {} / {} reads", sample_id, sample_selected.len(), indices.len());
        selected.extend(sample_selected.into_iter().map(|i| indices[i]));
    }
    selected.sort_unstable();
    selected
}

/// Builds the per-sample output from the DP solution.
/// Returns the samples and the number of genotypes the solution changed.
/// # Arguments
/// * `problem` - the region problem
/// * `config` - phasing controls
/// * `pedigree` - the pedigree the DP was run on
/// * `dp_positions` - the positions the DP phased
/// * `selected_set` - the reads the DP used
/// * `dp_result` - the DP solution
/// * `all_positions` - every position observed in the region, the output is indexed by these
fn assemble_samples(
    problem: &PhaseProblem, config: &PhaseConfig, pedigree: &Pedigree, dp_positions: &[u64],
    selected_set: &ReadSet, dp_result: &PedigreeDpResult, all_positions: &[u64]
) -> (Vec<SamplePhase>, u64) {
    // collect the zygosity of every super read
    let mut heterozygous_positions: HashMap<u32, HashSet<u64>> = Default::default();
    let mut homozygous_positions: BTreeSet<u64> = BTreeSet::new();
    for super_read in dp_result.super_reads.iter() {
        let het_set = heterozygous_positions.entry(super_read.sample_id).or_default();
        for (column, &position) in dp_positions.iter().enumerate() {
            match super_read.genotype_at(column) {
                Some(g) if g.is_heterozygous() => { het_set.insert(position); },
                Some(_) => { homozygous_positions.insert(position); },
                None => {}
            };
        }
    }

    // homozygous positions do not disconnect anything when genotypes may change
    let master_block: Option<Vec<u64>> = if config.distrust_genotypes && !homozygous_positions.is_empty() {
        Some(homozygous_positions.into_iter().collect())
    } else {
        None
    };
    let het_filter = if config.include_homozygous { None } else { Some(&heterozygous_positions) };

    let family_components: Option<HashMap<u64, u64>> = if config.genetic_haplotyping && !pedigree.trios().is_empty() {
        Some(find_components(dp_positions, selected_set.iter(), master_block.as_deref(), het_filter))
    } else {
        None
    };

    let dp_columns: HashMap<u64, usize> = dp_positions.iter().enumerate()
        .map(|(i, &p)| (p, i))
        .collect();
    let mut genotype_changes: u64 = 0;
    let mut samples: Vec<SamplePhase> = Vec::with_capacity(pedigree.len());
    for (index, individual) in pedigree.individuals().iter().enumerate() {
        let sample_id = individual.id();
        let super_read = &dp_result.super_reads[index];
        let components: HashMap<u64, u64> = match family_components.as_ref() {
            Some(c) => c.clone(),
            None => find_components(
                dp_positions,
                selected_set.iter().filter(|r| r.sample_id() == sample_id),
                master_block.as_deref(),
                het_filter
            )
        };

        // candidate positions and how many of them fall in each block
        let mut candidates: HashMap<usize, u64> = Default::default();
        let mut block_sizes: HashMap<u64, usize> = Default::default();
        for (column, position) in dp_positions.iter().enumerate() {
            let is_candidate = if config.include_homozygous {
                super_read.genotype_at(column).is_some()
            } else {
                super_read.is_heterozygous(column)
            };
            if is_candidate {
                let block = components[position];
                candidates.insert(column, block);
                *block_sizes.entry(block).or_insert(0) += 1;
            }
        }

        let mut alleles: Vec<[Allele; 2]> = Vec::with_capacity(all_positions.len());
        let mut phase_sets: Vec<Option<u64>> = Vec::with_capacity(all_positions.len());
        for &position in all_positions.iter() {
            match dp_columns.get(&position) {
                Some(&column) => {
                    let phase_set = candidates.get(&column)
                        .filter(|block| block_sizes[*block] >= MIN_BLOCK_SIZE)
                        .cloned();
                    let input = individual.genotypes()[column];
                    let solved = super_read.genotype_at(column);
                    if solved.map(|g| g != input).unwrap_or(false) {
                        genotype_changes += 1;
                    }
                    if phase_set.is_some() {
                        alleles.push([super_read.haplotypes[0][column].allele, super_read.haplotypes[1][column].allele]);
                    } else {
                        alleles.push(genotype_alleles(solved.unwrap_or(input)));
                    }
                    phase_sets.push(phase_set);
                },
                None => {
                    alleles.push(genotype_alleles(input_genotype(problem, position, sample_id)));
                    phase_sets.push(None);
                }
            };
        }

        samples.push(SamplePhase {
            sample_id,
            sample_name: individual.name().to_string(),
            alleles,
            phase_sets
        });
    }
    (samples, genotype_changes)
}

/// Solves the phasing problem for one family over one region.
/// Reads are selected per sample, the pedigree DP phases the selected reads, and every read is tagged against the result.
/// # Arguments
/// * `problem` - the family, reads, and genotypes of the region
/// * `config` - phasing controls
/// # Errors
/// * any `PhaseError` from building the pedigree or running the DP, including `MendelianConflict` and `StateSpaceExceeded`
pub fn solve_region(problem: &PhaseProblem, config: &PhaseConfig) -> Result<(PhaseResult, HaplotagResult), PhaseError> {
    debug!("Solving region: {:?}", problem.region);
    let job_cpu_time = cpu_time::ThreadTime::now();

    let mut read_set = ReadSet::new();
    for read in problem.reads.iter() {
        read_set.add(read.clone());
    }
    read_set.sort();
    let reads: &[Read] = read_set.sorted_reads()?;
    let all_positions: Vec<u64> = observed_positions(reads);

    let selected: Vec<usize> = select_reads(&read_set, config);
    let selected_set: ReadSet = read_set.subset(&selected);
    let dp_positions: Vec<u64> = selected_set.get_positions();
    debug!("Region {}: {} / {} reads selected over {} positions", problem.region.region_index(), selected.len(), reads.len(), dp_positions.len());

    let pedigree = build_pedigree(problem, &dp_positions, config)?;
    let recombination_costs: Vec<u32> = problem.recombination.costs(&dp_positions);
    let dp_config = DpConfig {
        distrust_genotypes: config.distrust_genotypes,
        max_state_bits: config.max_state_bits
    };
    let dp_result = pedigree_dp_solver(&selected_set, &recombination_costs, &pedigree, &dp_config)?;
    trace!("Region {} DP cost: {}", problem.region.region_index(), dp_result.optimal_cost);

    let (samples, genotype_changes) = assemble_samples(
        problem, config, &pedigree, &dp_positions, &selected_set, &dp_result, &all_positions
    );

    // breakpoints are only reported inside the blocks of each child
    let child_blocks: HashMap<u32, HashMap<u64, u64>> = samples.iter()
        .map(|s| (s.sample_id, s.block_map(&all_positions)))
        .collect();
    let recombination_events = find_recombination(
        pedigree.trios(), &dp_result.transmission_vector, &dp_positions, &recombination_costs, &child_blocks
    );

    let tags = haplotag_reads(reads, &selected, &dp_result.partitioning, &all_positions, &samples);

    // summarize everything
    let num_blocks: usize = samples.iter()
        .map(|s| s.phase_sets.iter().flatten().collect::<HashSet<_>>().len())
        .sum();
    let largest_block: usize = child_blocks.values()
        .map(|blocks| find_largest_component(blocks).len())
        .max()
        .unwrap_or(0);
    let read_statistics = ReadStats::new(
        reads.len() as u64,
        reads.iter().filter(|r| r.len() < config.min_read_variants).count() as u64,
        selected.len() as u64,
        tags.iter().filter(|t| t.haplotype.is_some()).count() as u64
    );
    let statistics = PhaseStats::dp_new(
        dp_result.optimal_cost,
        samples.iter().map(|s| s.num_phased() as u64).sum(),
        genotype_changes,
        num_blocks as u64,
        largest_block as u64,
        recombination_events.len() as u64,
        &dp_result.statistics,
        config.max_coverage,
        job_cpu_time.elapsed().as_secs_f32()
    );

    let phase_result = PhaseResult {
        region: problem.region.clone(),
        positions: all_positions,
        samples,
        recombination_events,
        read_statistics: Some(read_statistics),
        statistics: Some(statistics)
    };
    let haplotag_result = HaplotagResult {
        region: problem.region.clone(),
        sample_names: phase_result.samples.iter().map(|s| (s.sample_id, s.sample_name.clone())).collect(),
        reads: tags
    };
    Ok((phase_result, haplotag_result))
}

/// Creates a result where every position keeps its input genotype unphased and every read is untagged.
/// # Arguments
/// * `problem` - the region that is not getting phased
pub fn create_unphased_result(problem: &PhaseProblem) -> (PhaseResult, HaplotagResult) {
    let mut sample_ids = problem.sample_ids.clone();
    let mut reads: Vec<&Read> = problem.reads.iter().collect();
    reads.sort_by_key(|r| (r.first_position(), r.sample_id()));
    let positions: Vec<u64> = observed_positions(&problem.reads);

    let samples: Vec<SamplePhase> = problem.members.iter()
        .map(|name| {
            let sample_id = sample_ids.id_of(name);
            SamplePhase {
                sample_id,
                sample_name: name.clone(),
                alleles: positions.iter().map(|&p| genotype_alleles(input_genotype(problem, p, sample_id))).collect(),
                phase_sets: vec![None; positions.len()]
            }
        })
        .collect();

    let phase_result = PhaseResult {
        region: problem.region.clone(),
        positions,
        samples,
        recombination_events: vec![],
        read_statistics: None,
        statistics: None
    };
    let haplotag_result = HaplotagResult {
        region: problem.region.clone(),
        sample_names: phase_result.samples.iter().map(|s| (s.sample_id, s.sample_name.clone())).collect(),
        reads: reads.into_iter().map(|r| ReadTag::untagged(r, false)).collect()
    };
    (phase_result, haplotag_result)
}

/// Smallest coverage cap tried before a region is given up on
pub const MIN_RETRY_COVERAGE: u32 = 2;

/// Phases a region, recovering from the errors that only affect this region.
/// If the reads exceed the state space, the coverage cap is halved (down to `MIN_RETRY_COVERAGE`) and the region is solved again.
/// Regions with Mendelian conflicts, infeasible columns, a pedigree too large for the state space, or reads that cannot be reduced enough are reported unphased.
/// # Arguments
/// * `problem` - the family, reads, and genotypes of the region
/// * `config` - phasing controls, the coverage cap is the starting point for retries
/// # Errors
/// * any other `PhaseError`, these indicate invalid input rather than a hard region
pub fn phase_region(problem: &PhaseProblem, config: &PhaseConfig) -> Result<(PhaseResult, HaplotagResult), PhaseError> {
    let mut current_config: PhaseConfig = config.clone();
    loop {
        match solve_region(problem, &current_config) {
            Ok(results) => return Ok(results),
            // with no active reads the pedigree alone is too large, fewer reads will not help
            Err(PhaseError::StateSpaceExceeded { position, active_reads, state_bits, .. }) if active_reads > 0 && current_config.max_coverage > MIN_RETRY_COVERAGE => {
                let reduced: u32 = (current_config.max_coverage / 2).max(MIN_RETRY_COVERAGE);
                warn!("{:?}: {} state bits needed at position {}, retrying with max coverage {}", problem.region, state_bits, position, reduced);
                current_config.max_coverage = reduced;
            },
            Err(e @ PhaseError::StateSpaceExceeded { .. }) |
            Err(e @ PhaseError::MendelianConflict { .. }) |
            Err(e @ PhaseError::InfeasibleColumn { .. }) => {
                warn!("{:?}: {}, leaving region unphased", problem.region, e);
                return Ok(create_unphased_result(problem));
            },
            Err(e) => return Err(e)
        };
    }
}

/// Assigns every read to a block and haplotype.
/// The block comes from the first phased heterozygous position the read observes.
/// Selected reads take the haplotype the DP gave them, all others are scored by confidence-weighted mismatches against the two haplotypes of that block; ties are left untagged.
/// # Arguments
/// * `reads` - all reads of the region
/// * `selected` - sorted indices of the reads the DP used
/// * `partitioning` - the DP haplotype of each selected read, aligned with `selected`
/// * `positions` - the positions the sample phases are indexed by
/// * `samples` - the phasing of each sample
/// # Panics
/// * if `selected` and `partitioning` differ in length
pub fn haplotag_reads(
    reads: &[Read], selected: &[usize], partitioning: &[u8], positions: &[u64], samples: &[SamplePhase]
) -> Vec<ReadTag> {
    assert_eq!(selected.len(), partitioning.len());
    let sample_lookup: HashMap<u32, &SamplePhase> = samples.iter()
        .map(|s| (s.sample_id, s))
        .collect();
    let column_of: HashMap<u64, usize> = positions.iter().enumerate()
        .map(|(i, &p)| (p, i))
        .collect();

    let mut tags: Vec<ReadTag> = Vec::with_capacity(reads.len());
    for (read_index, read) in reads.iter().enumerate() {
        let selection_index: Option<usize> = selected.binary_search(&read_index).ok();
        let mut tag = ReadTag::untagged(read, selection_index.is_some());
        if let Some(sample) = sample_lookup.get(&read.sample_id()) {
            let mut block_id: Option<u64> = None;
            let mut scores: [u64; 2] = [0, 0];
            for variant in read.variants().iter().filter(|v| v.allele.is_phaseable()) {
                let column = match column_of.get(&variant.position) {
                    Some(&c) => c,
                    None => continue
                };
                let (phase_set, alleles) = match sample.phase_sets[column] {
                    Some(ps) => (ps, sample.alleles[column]),
                    None => continue
                };
                if alleles[0] == alleles[1] || block_id.map(|b| b != phase_set).unwrap_or(false) {
                    continue;
                }
                block_id = Some(phase_set);
                for (score, allele) in scores.iter_mut().zip(alleles.iter()) {
                    if variant.allele != *allele {
                        *score += variant.confidence as u64;
                    }
                }
            }

            if block_id.is_some() {
                let haplotype = match selection_index {
                    Some(k) => Some(partitioning[k]),
                    None => match scores[0].cmp(&scores[1]) {
                        Ordering::Less => Some(0),
                        Ordering::Greater => Some(1),
                        Ordering::Equal => None
                    }
                };
                if haplotype.is_some() {
                    tag.block_id = block_id;
                    tag.haplotype = haplotype;
                }
            }
        }
        tags.push(tag);
    }
    tags
}
