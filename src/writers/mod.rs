
/// Contains the ordered writer for phased blocks and recombination events
pub mod ordered_block_writer;
/// Contains writer for phasing statistics for underlying algorithms
pub mod phase_stats;
/// Contains the writer for per-read assignments
pub mod read_list_writer;
