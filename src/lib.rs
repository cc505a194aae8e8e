
/// Splits the pedigree into families and generates the region jobs for each chromosome
pub mod block_gen;
/// CLI functionality and checks
pub mod cli;
/// Union-find over positions, used to assemble phased blocks
pub mod components;
/// Contains the read, sample, and pedigree data types
pub mod data_types;
/// The pedigree-constrained dynamic program
pub mod pedigree_dp;
/// Organizes the workflow for a single region: read selection, the DP, block assembly, and read tagging
pub mod phaser;
/// Loaders for the read, genotype, pedigree, and genetic map tables
pub mod read_parsing;
/// Coverage-capped read selection
pub mod read_selection;
/// Recombination costs and breakpoint detection
pub mod recombination;
/// Contains all the various output writer functionality
pub mod writers;
