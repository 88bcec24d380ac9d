
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{info, debug};

use crate::{Database, Itemset, MiningConfig};
use crate::miner::UncertainMiner;
use crate::put::Put;

pub mod partition;
pub mod topk;
pub mod convergence;
pub mod profile;

pub use partition::SearchPartition;
pub use topk::GlobalTopK;
pub use convergence::{ConvergenceMonitor, Criteria};
pub use profile::{UncertaintyProfile, UtilityStats};

/// Atomically assignable f64 cell, bit-cast through an atomic word.
pub struct AtomicF64( AtomicU64 );

impl AtomicF64 {

    pub fn new( value: f64 ) -> AtomicF64 {
	AtomicF64( AtomicU64::new( value.to_bits() ))
    }

    pub fn load( &self ) -> f64 {
	f64::from_bits( self.0.load( Ordering::SeqCst ))
    }

    pub fn store( &self, value: f64 ) {
	self.0.store( value.to_bits(), Ordering::SeqCst );
    }
}

impl fmt::Debug for AtomicF64 {
    fn fmt( &self, formatter: &mut fmt::Formatter ) -> fmt::Result {
	write!( formatter, "{}", self.load() )
    }
}

/// Coordinator of the parallel mining run: builds the shared tensor,
/// carves the item universe into per-worker partitions, launches the
/// workers, polls the convergence monitor, rebalances stragglers, and
/// extracts the final top-k.
pub struct Phantom<'a> {
    database: &'a Database,
    k: usize,
    processors: usize,
    config: MiningConfig,
}

impl <'a> Phantom<'a> {

    pub fn new( database: &'a Database, k: usize, processors: usize, config: MiningConfig ) -> Phantom<'a> {
	Phantom {
	    database,
	    k,
	    processors: processors.max( 1 ),
	    config,
	}
    }

    pub fn mine( &self ) -> Vec<Itemset> {
	if self.k == 0 || self.database.is_empty() || self.database.item_count() == 0 {
	    return Vec::new();
	}

	info!( "building utility tensor for {} transactions", self.database.len() );
	let put = Put::new( self.database, &self.config );

	let profile = UncertaintyProfile::analyze( self.database );
	let stats = UtilityStats::compute( &put, self.database );
	info!(
	    "database: {} transactions, {} items, average uncertainty {:.3}, negative ratio {:.3}",
	    self.database.len(), self.database.item_count(),
	    profile.average_uncertainty(), stats.negative_ratio()
	);

	let partitions = self.partition_items( &put );
	info!( "mining with {} workers, k = {}", partitions.len(), self.k );

	let topk = GlobalTopK::new( self.k, &self.config );
	let monitor = ConvergenceMonitor::new( self.k, &self.config );

	thread::scope( |scope| {
	    let worker_count = partitions.len();
	    let handles: Vec<_> = partitions.iter().enumerate()
		.map( |(index, partition)| {
		    let put = &put;
		    let topk = &topk;
		    let config = &self.config;
		    let slice = self.database.partition( index, worker_count );
		    scope.spawn( move || {
			debug!(
			    "worker {} starting: {} items, {} local transactions",
			    partition.id(), partition.assigned_items(), slice.len()
			);
			UncertainMiner::new( partition, put, topk, config ).mine();
		    })
		})
		.collect();

	    loop {
		thread::sleep( Duration::from_millis( self.config.poll_interval_ms ));
		if partitions.iter().all( |partition| partition.is_exhausted() ) {
		    debug!( "all partitions exhausted" );
		    break;
		}
		if monitor.has_converged( &topk, &partitions ) {
		    info!( "convergence reached" );
		    break;
		}
		self.rebalance( &partitions );
	    }

	    for partition in &partitions {
		partition.signal_termination();
	    }
	    for handle in handles {
		handle.join().expect( "mining workers do not panic" );
	    }
	});

	topk.extract()
    }

    /// Contiguous chunks of the universe sorted by single-item utility,
    /// one partition per worker while items last.
    fn partition_items( &self, put: &Put ) -> Vec<SearchPartition> {
	let mut items = self.database.universe();
	items.sort_by( |left, right| put.single_eu( *right ).total_cmp( &put.single_eu( *left )));

	let chunk_size = (items.len() + self.processors - 1) / self.processors;
	items.chunks( chunk_size )
	    .enumerate()
	    .map( |(id, chunk)| SearchPartition::new( id, chunk.to_vec() ))
	    .collect()
    }

    /// Pairs overloaded with underloaded partitions and moves half of the
    /// donor's unexplored items across.
    fn rebalance( &self, partitions: &[SearchPartition] ) {
	if partitions.len() < 2 {
	    return;
	}
	let mean = partitions.iter().map( |p| p.processed() as f64 ).sum::<f64>()
	    / partitions.len() as f64;
	if mean <= 0.0 {
	    return;
	}

	let tolerance = self.config.rebalance_tolerance;
	let overloaded: Vec<&SearchPartition> = partitions.iter()
	    .filter( |p| p.processed() as f64 > mean * (1.0 + tolerance) )
	    .collect();
	let underloaded: Vec<&SearchPartition> = partitions.iter()
	    .filter( |p| (p.processed() as f64) < mean * (1.0 - tolerance) )
	    .collect();

	for (donor, recipient) in overloaded.iter().zip( underloaded.iter() ) {
	    let spare = donor.unexplored_len();
	    if spare == 0 {
		continue;
	    }
	    let moved = donor.take_unexplored( (spare + 1) / 2 );
	    if !moved.is_empty() {
		debug!(
		    "transferring {} items from partition {} to {}",
		    moved.len(), donor.id(), recipient.id()
		);
		recipient.grant( moved );
	    }
	}
    }
}

#[cfg(test)]
mod test {

    use std::fs;

    use rand::prelude::*;

    use super::*;
    use crate::{Itemvec, Transaction, io};
    use crate::utility::ExpectedUtility;

    /// Short poll interval so small runs finish quickly.
    fn fast( mut config: MiningConfig ) -> MiningConfig {
	config.poll_interval_ms = 10;
	config
    }

    fn three_item_database() -> Database {
	let mut db = Database::new();
	let a = db.intern( "a" );
	let b = db.intern( "b" );
	let c = db.intern( "c" );
	let mut t1 = Transaction::new( "T1", 1.0 );
	t1.add_item( a, 1.0, 10.0 );
	t1.add_item( b, 1.0, 20.0 );
	let mut t2 = Transaction::new( "T2", 1.0 );
	t2.add_item( a, 1.0, 10.0 );
	t2.add_item( c, 1.0, 30.0 );
	db.add_transaction( t1 );
	db.add_transaction( t2 );
	db
    }

    #[test]
    fn mines_the_best_positive_pairs_in_order() {
	let db = three_item_database();
	let result = Phantom::new( &db, 2, 1, fast( MiningConfig::strict() )).mine();

	assert_eq!( result.len(), 2 );
	assert_eq!( result[ 0 ].key(), vec!( 0, 2 ));
	assert!( (result[ 0 ].eu() - 40.0).abs() < 1e-12 );
	assert_eq!( result[ 1 ].key(), vec!( 0, 1 ));
	assert!( (result[ 1 ].eu() - 30.0).abs() < 1e-12 );
	// every returned itemset carries its computed bound
	assert!( result.iter().all( |itemset| itemset.upper_bound().is_finite() ));
    }

    #[test]
    fn existence_and_occurrence_probabilities_discount_utility() {
	let mut db = Database::new();
	let a = db.intern( "a" );
	let mut t = Transaction::new( "T1", 0.5 );
	t.add_item( a, 0.5, 10.0 );
	db.add_transaction( t );

	let result = Phantom::new( &db, 1, 1, fast( MiningConfig::strict() )).mine();
	assert_eq!( result.len(), 1 );
	assert!( (result[ 0 ].eu() - 2.5).abs() < 1e-12 );
    }

    #[test]
    fn negative_itemsets_are_pruned_not_returned() {
	let mut db = Database::new();
	let a = db.intern( "a" );
	let b = db.intern( "b" );
	let mut t1 = Transaction::new( "T1", 1.0 );
	t1.add_item( a, 1.0, 100.0 );
	t1.add_item( b, 1.0, -80.0 );
	let mut t2 = Transaction::new( "T2", 1.0 );
	t2.add_item( a, 1.0, 100.0 );
	db.add_transaction( t1 );
	db.add_transaction( t2 );

	let mut config = fast( MiningConfig::default() );
	config.alpha = 0.0;
	let result = Phantom::new( &db, 1, 1, config ).mine();

	assert_eq!( result.len(), 1 );
	assert_eq!( result[ 0 ].key(), vec!( a ));
	assert!( (result[ 0 ].eu() - 200.0).abs() < 1e-12 );
    }

    #[test]
    fn concurrent_workers_cannot_duplicate_an_itemset() {
	let topk = GlobalTopK::new( 4, &MiningConfig::default() );
	thread::scope( |scope| {
	    for _ in 0 .. 2 {
		scope.spawn( || {
		    for _ in 0 .. 25 {
			let mut candidate = Itemset::from_items( &[ 1, 2 ] );
			candidate.set_eu( 17.0 );
			topk.update( vec!( candidate ));
		    }
		});
	    }
	});

	let result = topk.extract();
	assert_eq!( result.len(), 1 );
	assert_eq!( result[ 0 ].eu(), 17.0 );
    }

    #[test]
    fn late_leader_raises_the_bar_for_everyone() {
	let topk = GlobalTopK::new( 1, &MiningConfig::default() );

	let mut modest = Itemset::single( 1 );
	modest.set_eu( 4.0 );
	topk.update( vec!( modest ));

	let mut leader = Itemset::single( 2 );
	leader.set_eu( 90.0 );
	topk.update( vec!( leader ));
	assert_eq!( topk.threshold(), 90.0 );

	let version = topk.version();
	for eu in [ 89.0, 50.0, 10.0 ] {
	    let mut straggler = Itemset::single( eu as usize );
	    straggler.set_eu( eu );
	    topk.update( vec!( straggler ));
	}
	assert_eq!( topk.version(), version );
	assert_eq!( topk.extract()[ 0 ].key(), vec!( 2 ));
    }

    #[test]
    fn exhausted_search_space_returns_every_itemset() {
	let mut db = Database::new();
	let a = db.intern( "a" );
	let b = db.intern( "b" );
	let c = db.intern( "c" );
	let mut t = Transaction::new( "T1", 1.0 );
	t.add_item( a, 1.0, 1.0 );
	t.add_item( b, 1.0, 2.0 );
	t.add_item( c, 1.0, 4.0 );
	db.add_transaction( t );

	// only 2^3 - 1 itemsets exist, far fewer than k
	let result = Phantom::new( &db, 10, 1, fast( MiningConfig::strict() )).mine();
	assert_eq!( result.len(), 7 );
	assert!( (result[ 0 ].eu() - 7.0).abs() < 1e-12 );
    }

    #[test]
    fn empty_databases_yield_empty_results() {
	let db = Database::new();
	let result = Phantom::new( &db, 5, 4, fast( MiningConfig::default() )).mine();
	assert!( result.is_empty() );
    }

    /// Transactions with a single item each: itemset utilities are the
    /// same for every worker count, so the parallel runs must agree with
    /// the sequential one.
    #[test]
    fn worker_counts_agree_on_the_result_set() {
	let mut db = Database::new();
	for j in 0 .. 6 {
	    let item = db.intern( &format!( "i{j}" ));
	    for r in 0 .. (j % 2) + 1 {
		let mut t = Transaction::new( &format!( "T{j}_{r}" ), 1.0 );
		t.add_item( item, 0.9, 3.0 + 1.37 * j as f64 );
		db.add_transaction( t );
	    }
	}

	let reference: Vec<Itemvec> = Phantom::new( &db, 3, 1, fast( MiningConfig::default() )).mine()
	    .iter().map( |itemset| itemset.key() ).collect();
	assert_eq!( reference.len(), 3 );

	for processors in 2 ..= 4 {
	    let parallel: Vec<Itemvec> = Phantom::new( &db, 3, processors, fast( MiningConfig::default() )).mine()
		.iter().map( |itemset| itemset.key() ).collect();
	    assert_eq!( parallel, reference, "{processors} workers disagree" );
	}
    }

    fn brute_force_topk( db: &Database, k: usize, config: &MiningConfig ) -> Vec<(Itemvec, f64)> {
	let put = Put::new( db, config );
	let calculator = ExpectedUtility::new( &put, config );
	let universe = db.universe();

	let mut all: Vec<(Itemvec, f64)> = (1u32 .. 1u32 << universe.len())
	    .map( |mask| {
		let members: Vec<usize> = universe.iter()
		    .filter( |item| mask & (1u32 << **item as u32) != 0 )
		    .copied()
		    .collect();
		let itemset = Itemset::from_items( &members );
		(itemset.key(), calculator.compute( &itemset ))
	    })
	    .collect();
	all.sort_by( |left, right| right.1.total_cmp( &left.1 ));
	all.truncate( k );
	all
    }

    /// A single worker with exact bounds must reproduce the brute-force
    /// ranking on databases where the bound is provably admissible.
    #[test]
    fn single_worker_matches_brute_force() {
	let mut rng = StdRng::seed_from_u64( 1203 );

	for round in 0 .. 10 {
	    let mut db = Database::new();
	    let mut next_item = 0;
	    for tid in 0 .. 3 {
		let mut t = Transaction::new( &format!( "T{tid}" ), 0.5 + 0.5 * rng.gen::<f64>() );
		for _ in 0 .. 2 {
		    let item = db.intern( &format!( "i{next_item}" ));
		    next_item += 1;
		    t.add_item( item, 0.5 + 0.5 * rng.gen::<f64>(), 1.0 + 19.0 * rng.gen::<f64>() );
		}
		db.add_transaction( t );
	    }

	    let config = fast( MiningConfig::strict() );
	    let expected = brute_force_topk( &db, 4, &config );
	    let mined = Phantom::new( &db, 4, 1, config.clone() ).mine();

	    assert_eq!( mined.len(), expected.len(), "round {round}" );
	    for (found, (key, eu)) in mined.iter().zip( &expected ) {
		assert_eq!( &found.key(), key, "round {round}" );
		assert!( (found.eu() - eu).abs() < 1e-9, "round {round}" );
	    }
	}
    }

    #[test]
    fn input_and_output_files_round_trip() {
	let dir = tempfile::tempdir().expect( "temp dir" );
	let input = dir.path().join( "input.txt" );
	fs::write(
	    &input,
	    "# sample uncertain database\n\
	     T1 1.0 a:1.0:10.0 b:1.0:20.0\n\
	     T2 1.0 a:1.0:10.0 c:1.0:30.0\n",
	).expect( "write input" );

	let db = io::read_database( input.to_str().unwrap() ).expect( "parse" );
	let result = Phantom::new( &db, 2, 1, fast( MiningConfig::strict() )).mine();

	let output = dir.path().join( "results" ).join( "output.txt" );
	io::write_results( output.to_str().unwrap(), &result, &db, Duration::from_millis( 7 ))
	    .expect( "write results" );

	let content = fs::read_to_string( &output ).expect( "read results" );
	let lines: Vec<&str> = content.lines().collect();
	assert_eq!( lines[ 0 ], "# PHANTOM Mining Results" );
	assert_eq!( lines[ 1 ], "# Execution Time: 7 ms" );
	assert_eq!( lines[ 4 ], "1,{a, c},40.000000,40.000000,false" );
	assert_eq!( lines[ 5 ], "2,{a, b},30.000000,30.000000,false" );
    }
}
