
use pedphase::block_gen::{Family, build_families, generate_chromosome_regions};
use pedphase::cli::{Settings, check_settings, get_raw_settings};
use pedphase::data_types::pedigree::GenotypeCall;
use pedphase::data_types::read_set::Read;
use pedphase::data_types::sample_ids::NumericSampleIds;
use pedphase::phaser::{HaplotagResult, PhaseConfig, PhaseProblem, PhaseResult, phase_region};
use pedphase::read_parsing::{GenotypeTable, ReadSource, load_genetic_map, load_genotypes, load_ped, load_reads, merge_read_sources, ped_trios};
use pedphase::recombination::{GeneticMap, RecombinationModel};
use pedphase::writers::ordered_block_writer::OrderedBlockWriter;
use pedphase::writers::phase_stats::{ReadStats, StatsWriter};
use pedphase::writers::read_list_writer::ReadListWriter;

use log::{LevelFilter, debug, error, info, warn};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::collections::BTreeMap;
use std::sync::{Arc, mpsc};
use std::time::Instant;
use threadpool::ThreadPool;

fn main() {
    // get the settings
    let settings: Settings = get_raw_settings();
    let filter_level: LevelFilter = match settings.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };

    // immediately setup logging first
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();

    // okay, now we can check all the other settings
    let cli_settings: Settings = check_settings(settings);
    let phase_config: PhaseConfig = cli_settings.phase_config();
    let mut sample_ids: NumericSampleIds = NumericSampleIds::new();

    // the pedigree comes first so that its individuals keep their file order
    let mut individuals: Vec<String> = vec![];
    let trios: Vec<(String, String, String)> = match cli_settings.ped_filename.as_ref() {
        Some(filename) => {
            let records = match load_ped(filename) {
                Ok(r) => r,
                Err(e) => {
                    error!("Error while loading pedigree file: {}", e);
                    std::process::exit(exitcode::IOERR);
                }
            };
            individuals.extend(records.iter().map(|r| r.individual.clone()));
            let trios = ped_trios(&records);
            info!("Loaded {} individuals and {} trios from {:?}", records.len(), trios.len(), filename);
            trios
        },
        None => vec![]
    };

    // parents that are only named as parents still belong in the pedigree
    for (mother, father, _child) in trios.iter() {
        individuals.push(mother.clone());
        individuals.push(father.clone());
    }

    let mut read_sources: Vec<ReadSource> = vec![];
    for (source_id, filename) in cli_settings.read_filenames.iter().enumerate() {
        match load_reads(filename, source_id as u32, &mut sample_ids) {
            Ok(source) => {
                info!("Loaded {} reads on {} chromosomes from {:?}", source.num_reads(), source.chromosomes().len(), filename);
                read_sources.push(source);
            },
            Err(e) => {
                error!("Error while loading read file {:?}: {}", filename, e);
                std::process::exit(exitcode::IOERR);
            }
        };
    }

    let genotype_table: GenotypeTable = match load_genotypes(&cli_settings.genotype_filename, &mut sample_ids) {
        Ok(gt) => gt,
        Err(e) => {
            error!("Error while loading genotype file: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };

    let genetic_maps: HashMap<String, GeneticMap> = match cli_settings.genmap_filename.as_ref() {
        Some(filename) => match load_genetic_map(filename) {
            Ok(gm) => {
                info!("Loaded genetic maps for {} chromosomes from {:?}", gm.len(), filename);
                gm
            },
            Err(e) => {
                error!("Error while loading genetic map file: {}", e);
                std::process::exit(exitcode::IOERR);
            }
        },
        None => Default::default()
    };

    // every sample seen in the reads or genotypes gets phased, with or without a pedigree entry
    let num_ped_individuals: usize = individuals.len();
    for sample_id in 0..sample_ids.len() as u32 {
        if let Some(name) = sample_ids.name_of(sample_id) {
            individuals.push(name.to_string());
        }
    }
    if num_ped_individuals > 0 && individuals.len() > num_ped_individuals {
        let ped_names: HashSet<&str> = individuals[..num_ped_individuals].iter().map(|s| s.as_str()).collect();
        for name in individuals[num_ped_individuals..].iter().filter(|n| !ped_names.contains(n.as_str())) {
            warn!("Sample {:?} is not in the pedigree file, it will be phased on its own", name);
        }
    }

    let families: Vec<Family> = match build_families(&mut sample_ids, &individuals, &trios) {
        Ok(f) => f,
        Err(e) => {
            error!("Error while building pedigree: {}", e);
            std::process::exit(exitcode::DATAERR);
        }
    };
    info!("Phasing {} individuals in {} families", sample_ids.len(), families.len());
    for (family_index, family) in families.iter().enumerate() {
        debug!("Family {}: {:?}, {} trios", family_index, family.members, family.trios.len());
    }

    // chromosomes in order of first appearance across all read files
    let mut chromosomes: Vec<String> = vec![];
    let mut seen_chromosomes: HashSet<String> = Default::default();
    for source in read_sources.iter() {
        for chrom in source.chromosomes().iter() {
            if seen_chromosomes.insert(chrom.clone()) {
                chromosomes.push(chrom.clone());
            }
        }
    }
    if chromosomes.is_empty() {
        warn!("No reads were loaded, output files will be empty");
    }

    // this writer will write "in-order" provided we correctly pass the ordering of data to it
    let mut block_writer: OrderedBlockWriter = match OrderedBlockWriter::new(
        &cli_settings.blocks_filename,
        cli_settings.recombination_filename.as_deref()
    ) {
        Ok(bw) => bw,
        Err(e) => {
            error!("Error during block writer creation: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };

    // create our stats file also
    let mut stats_writer: Option<StatsWriter> = match cli_settings.stats_filename {
        Some(ref filename) => {
            match StatsWriter::new(filename) {
                Ok(sw) => Some(sw),
                Err(e) => {
                    error!("Error during statistics writer creation: {}", e);
                    std::process::exit(exitcode::IOERR);
                }
            }
        },
        None => None
    };

    // create our read list if necessary
    let mut read_list_writer: Option<ReadListWriter> = match cli_settings.read_list_filename {
        Some(ref filename) => {
            match ReadListWriter::new(filename) {
                Ok(rw) => Some(rw),
                Err(e) => {
                    error!("Error during read list writer creation: {}", e);
                    std::process::exit(exitcode::IOERR);
                }
            }
        },
        None => None
    };

    // regions are generated lazily, one chromosome at a time
    let family_lookup: HashMap<u32, usize> = families.iter().enumerate()
        .flat_map(|(family_index, family)| family.member_ids.iter().map(move |&id| (id, family_index)))
        .collect();
    let mut next_region_index: usize = 0;
    let problem_iterator = chromosomes.iter().enumerate().flat_map(|(chrom_index, chrom)| {
        let sources: Vec<Vec<Read>> = read_sources.iter_mut().map(|s| s.take_reads(chrom)).collect();
        let recombination: Arc<RecombinationModel> = Arc::new(match genetic_maps.get(chrom) {
            Some(gm) => RecombinationModel::GeneticMap(gm.clone()),
            None => RecombinationModel::Uniform(cli_settings.recombination_rate)
        });
        let problems = build_chromosome_problems(
            next_region_index, chrom_index, chrom, merge_read_sources(sources),
            &families, &family_lookup, &sample_ids, genotype_table.get(chrom), recombination,
            !cli_settings.disable_region_split
        );
        next_region_index += problems.len();
        problems
    });

    //process the regions (eventually in parallel)
    let start_time: Instant = Instant::now();
    let mut total_positions: u64 = 0;
    let mut results_received: u64 = 0;
    let mut read_totals: ReadStats = Default::default();

    // values related to printing
    const UPDATE_SPEED: u64 = 100;
    info!("Region generation starting...");

    if cli_settings.threads <= 1 {
        for problem in problem_iterator {
            debug!("region {:?} {}", problem.region, problem.region.bp_len());
            let (phase_result, haplotag_result): (PhaseResult, HaplotagResult) = run_problem(&problem, &phase_config);

            // this is only for printing
            total_positions += phase_result.positions.len() as u64;
            results_received += 1;

            process_results(
                phase_result, haplotag_result,
                &mut stats_writer, &mut read_list_writer, &mut block_writer, &mut read_totals
            );

            if results_received % UPDATE_SPEED == 0 {
                let time_so_far: f64 = start_time.elapsed().as_secs_f64();
                let regions_per_sec: f64 = results_received as f64 / time_so_far;
                let positions_per_sec: f64 = total_positions as f64 / time_so_far;
                info!("Received results for {} regions: {:.4} regions/sec, {:.4} positions/sec, writer waiting on region {}", results_received, regions_per_sec, positions_per_sec, block_writer.get_wait_block());
            }
        }
    } else {
        //set up job configuration
        info!("Starting job pool with {} threads...", cli_settings.threads);
        let job_slots: u64 = 40 * cli_settings.threads as u64;
        let mut jobs_queued: u64 = 0;

        //we need to set up the multiprocessing components now
        let pool = ThreadPool::new(cli_settings.threads);
        let (tx, rx) = mpsc::channel();
        let arc_phase_config: Arc<PhaseConfig> = Arc::new(phase_config.clone());

        for problem in problem_iterator {
            // make sure no panics encountered so far
            if pool.panic_count() > 0 {
                error!("Panic detected in ThreadPool, check above for details.");
                std::process::exit(exitcode::SOFTWARE);
            }

            if jobs_queued - results_received >= job_slots {
                let (phase_result, haplotag_result): (PhaseResult, HaplotagResult) = receive_result(&rx);

                // this is only for printing
                total_positions += phase_result.positions.len() as u64;
                results_received += 1;

                process_results(
                    phase_result, haplotag_result,
                    &mut stats_writer, &mut read_list_writer, &mut block_writer, &mut read_totals
                );

                if results_received % UPDATE_SPEED == 0 {
                    let time_so_far: f64 = start_time.elapsed().as_secs_f64();
                    let regions_per_sec: f64 = results_received as f64 / time_so_far;
                    let positions_per_sec: f64 = total_positions as f64 / time_so_far;
                    info!("Received results for {} regions: {:.4} regions/sec, {:.4} positions/sec, writer waiting on region {}", results_received, regions_per_sec, positions_per_sec, block_writer.get_wait_block());
                }
            }

            debug!("region {:?} {}", problem.region, problem.region.bp_len());
            jobs_queued += 1;
            if jobs_queued % UPDATE_SPEED == 0 {
                info!("Generated {} regions, latest region: {:?}", jobs_queued, problem.region);
            }

            let tx = tx.clone();
            let arc_phase_config = arc_phase_config.clone();
            pool.execute(move|| {
                // dynamic errors cannot be sent via mpsc, so errors are handled in the worker
                let all_results = run_problem(&problem, &arc_phase_config);
                if tx.send(all_results).is_err() {
                    error!("Result channel closed while processing {:?}", problem.region);
                }
            });
        }

        while results_received < jobs_queued {
            // make sure no panics encountered so far
            if pool.panic_count() > 0 {
                error!("Panic detected in ThreadPool, check above for details.");
                std::process::exit(exitcode::SOFTWARE);
            }

            let (phase_result, haplotag_result): (PhaseResult, HaplotagResult) = receive_result(&rx);

            // this is only for printing
            total_positions += phase_result.positions.len() as u64;
            results_received += 1;

            process_results(
                phase_result, haplotag_result,
                &mut stats_writer, &mut read_list_writer, &mut block_writer, &mut read_totals
            );

            // do an update if we're on the mod of our speed OR it's the last one for a thread
            if results_received % UPDATE_SPEED == 0 || (jobs_queued - results_received) < cli_settings.threads as u64 {
                let time_so_far: f64 = start_time.elapsed().as_secs_f64();
                let regions_per_sec: f64 = results_received as f64 / time_so_far;
                let positions_per_sec: f64 = total_positions as f64 / time_so_far;
                info!("Received results for {} / {} regions: {:.4} regions/sec, {:.4} positions/sec, writer waiting on region {}", results_received, jobs_queued, regions_per_sec, positions_per_sec, block_writer.get_wait_block());
            }
        }
    }

    info!("All regions analyzed, finalizing output files...");
    if block_writer.pending_results() > 0 {
        error!("Block writer finished with {} results still waiting on region {}", block_writer.pending_results(), block_writer.get_wait_block());
        std::process::exit(exitcode::SOFTWARE);
    }

    info!("Reads: {} loaded, {} uninformative, {} selected, {} tagged", read_totals.num_reads(), read_totals.uninformative_reads(), read_totals.selected_reads(), read_totals.tagged_reads());
    info!("All {} regions finished successfully after {} seconds.", results_received, start_time.elapsed().as_secs_f64());
}

/// Builds the phasing problems for every family on one chromosome.
/// # Arguments
/// * `first_index` - region index assigned to the first generated problem
/// * `chrom_index` - index of the chromosome, for ordering
/// * `chrom` - the chromosome name
/// * `reads` - all reads on the chromosome, sorted
/// * `families` - the families being phased
/// * `family_lookup` - sample id to index into `families`
/// * `sample_ids` - the full sample registry
/// * `chrom_calls` - the genotype calls on this chromosome, if any
/// * `recombination` - the recombination model for this chromosome
/// * `split_disjoint` - if true, families are split where no read connects two positions
#[allow(clippy::too_many_arguments)]
fn build_chromosome_problems(
    first_index: usize, chrom_index: usize, chrom: &str, reads: Vec<Read>,
    families: &[Family], family_lookup: &HashMap<u32, usize>, sample_ids: &NumericSampleIds,
    chrom_calls: Option<&BTreeMap<u64, HashMap<u32, GenotypeCall>>>, recombination: Arc<RecombinationModel>,
    split_disjoint: bool
) -> Vec<PhaseProblem> {
    let family_ids: Vec<Vec<u32>> = families.iter().map(|f| f.member_ids.clone()).collect();
    let regions = generate_chromosome_regions(first_index, chrom_index, chrom, &reads, &family_ids, split_disjoint);

    // split the reads by family, each family's regions then consume them in order
    let mut family_reads: Vec<Vec<Read>> = vec![vec![]; families.len()];
    for read in reads.into_iter() {
        match family_lookup.get(&read.sample_id()) {
            Some(&family_index) => family_reads[family_index].push(read),
            None => warn!("Read {:?} belongs to a sample outside every family, ignoring it", read.name())
        };
    }
    let mut family_iters: Vec<_> = family_reads.into_iter().map(|r| r.into_iter().peekable()).collect();

    let mut problems: Vec<PhaseProblem> = Vec::with_capacity(regions.len());
    for region in regions.into_iter() {
        let family: &Family = &families[region.family_index()];
        let read_iter = &mut family_iters[region.family_index()];
        let mut region_reads: Vec<Read> = Vec::with_capacity(region.num_reads());
        while let Some(read) = read_iter.next_if(|r| region.contains_start(r.first_position())) {
            region_reads.push(read);
        }

        let member_set: HashSet<u32> = family.member_ids.iter().cloned().collect();
        let genotype_calls: BTreeMap<u64, HashMap<u32, GenotypeCall>> = match chrom_calls {
            Some(calls) => calls.range(region.start()..=region.end())
                .filter_map(|(&position, site)| {
                    let family_site: HashMap<u32, GenotypeCall> = site.iter()
                        .filter(|(id, _)| member_set.contains(*id))
                        .map(|(&id, &call)| (id, call))
                        .collect();
                    if family_site.is_empty() { None } else { Some((position, family_site)) }
                })
                .collect(),
            None => Default::default()
        };

        problems.push(PhaseProblem {
            region,
            sample_ids: sample_ids.clone(),
            members: family.members.clone(),
            trios: family.trios.clone(),
            reads: region_reads,
            genotype_calls,
            recombination: recombination.clone()
        });
    }
    problems
}

/// Phases one problem, exiting on errors that indicate invalid input
/// # Arguments
/// * `problem` - the region to solve
/// * `phase_config` - phasing controls
fn run_problem(problem: &PhaseProblem, phase_config: &PhaseConfig) -> (PhaseResult, HaplotagResult) {
    match phase_region(problem, phase_config) {
        Ok(r) => r,
        Err(e) => {
            error!("Error while processing {:?}:", problem.region);
            error!("  {}", e);
            std::process::exit(exitcode::SOFTWARE);
        }
    }
}

/// Waits on the next result from the worker pool
fn receive_result(rx: &mpsc::Receiver<(PhaseResult, HaplotagResult)>) -> (PhaseResult, HaplotagResult) {
    match rx.recv() {
        Ok(r) => r,
        Err(e) => {
            error!("Error while receiving results from the worker pool: {}", e);
            std::process::exit(exitcode::SOFTWARE);
        }
    }
}

/// Sub-routine to make sure we are always consistently processing results in an identical manner
/// # Argument
/// * `phase_result` - the phasing result from our algorithm
/// * `haplotag_result` - the read assignments, does nothing if we are not writing a read list
/// * `opt_stats_writer` - mutable, optional reference to our algorithm stats writer
/// * `opt_read_list_writer` - mutable, optional reference to our read list writer
/// * `block_writer` - mutable reference to our ordered block writer
/// * `read_totals` - running read counts over all phased regions
fn process_results(
    phase_result: PhaseResult, haplotag_result: HaplotagResult,
    opt_stats_writer: &mut Option<StatsWriter>, opt_read_list_writer: &mut Option<ReadListWriter>,
    block_writer: &mut OrderedBlockWriter, read_totals: &mut ReadStats
) {
    debug!("region {} phased {} samples over {} positions", phase_result.region.region_index(), phase_result.samples.len(), phase_result.positions.len());
    if let Some(read_statistics) = phase_result.read_statistics.as_ref() {
        *read_totals += read_statistics.clone();
    }

    // write the stats if we have both a writer and a stats block
    if let Some(stats_writer) = opt_stats_writer.as_mut() {
        match stats_writer.write_stats(&phase_result) {
            Ok(()) => {},
            Err(e) => {
                error!("Error while writing statistics file: {}", e);
                std::process::exit(exitcode::IOERR);
            }
        }
    };

    if let Some(read_list_writer) = opt_read_list_writer.as_mut() {
        match read_list_writer.write_block(&haplotag_result) {
            Ok(()) => {},
            Err(e) => {
                error!("Error while writing read list file: {}", e);
                std::process::exit(exitcode::IOERR);
            }
        };
    }

    match block_writer.write_phase_block(phase_result) {
        Ok(()) => {},
        Err(e) => {
            error!("Error while saving phased region: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };
}
