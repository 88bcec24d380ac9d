
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use crate::{Item, Itemset, Itemvec, MiningConfig};
use crate::bounds::PolarBounds;
use crate::parallel::{GlobalTopK, SearchPartition};
use crate::put::Put;
use crate::utility::ExpectedUtility;

/// One worker's level-wise search over its partition: singleton seeding,
/// deduplicated pairwise joins, bound-gated pruning, speculative
/// extension of promising candidates, and periodic merges into the
/// shared top-k. Termination is cooperative via the partition flag.
pub struct UncertainMiner<'a> {
    partition: &'a SearchPartition,
    put: &'a Put<'a>,
    topk: &'a GlobalTopK,
    config: &'a MiningConfig,
    calculator: ExpectedUtility<'a>,
    bounds: PolarBounds<'a>,
    /// items claimed from the partition so far
    universe: Vec<Item>,
    buffer: Vec<Itemset>,
    since_sync: u64,
}

impl <'a> UncertainMiner<'a> {

    pub fn new(
	partition: &'a SearchPartition,
	put: &'a Put<'a>,
	topk: &'a GlobalTopK,
	config: &'a MiningConfig,
    ) -> UncertainMiner<'a> {
	UncertainMiner {
	    partition,
	    put,
	    topk,
	    config,
	    calculator: ExpectedUtility::new( put, config ),
	    bounds: PolarBounds::new( put, config ),
	    universe: Vec::new(),
	    buffer: Vec::new(),
	    since_sync: 0,
	}
    }

    pub fn mine( &mut self ) {
	let mut level = self.seed_singletons();
	self.publish_bound( &level );
	self.flush();

	let mut size = 1;
	while !level.is_empty()
	    && size < self.config.max_itemset_size
	    && !self.partition.should_terminate()
	    && self.partition.processed() < self.candidate_budget()
	{
	    let candidates = self.join_level( &level );
	    level = self.evaluate_level( candidates );
	    self.publish_bound( &level );
	    self.flush();
	    self.absorb_granted();
	    size += 1;
	}

	self.flush();
	self.partition.set_upper_bound( f64::NEG_INFINITY );
	self.partition.mark_exhausted();
	debug!(
	    "worker {} done: {} candidates processed",
	    self.partition.id(), self.partition.processed()
	);
    }

    /// Claims the partition's items, then evaluates them against the full
    /// item set, descending by utility.
    fn seed_singletons( &mut self ) -> Vec<Itemset> {
	while let Some( item ) = self.partition.claim_next() {
	    self.universe.push( item );
	}

	let mut level = Vec::new();
	for item in self.universe.clone() {
	    if self.partition.should_terminate() {
		break;
	    }
	    if let Some( single ) = self.evaluate_single( item ) {
		level.push( single );
	    }
	    self.maybe_flush();
	}
	level.sort_by( |left, right| right.eu().total_cmp( &left.eu() ));
	level
    }

    fn evaluate_single( &mut self, item: Item ) -> Option<Itemset> {
	let mut single = Itemset::single( item );
	single.set_has_negative( self.put.has_negative_utility( item ));
	if self.evaluate( &mut single ) {
	    Some( single )
	} else {
	    None
	}
    }

    /// Pairwise join of same-size itemsets sharing all but one member,
    /// generating each union once.
    fn join_level( &self, level: &[Itemset] ) -> Vec<Itemset> {
	let mut seen: FxHashSet<Itemvec> = FxHashSet::default();
	let mut candidates = Vec::new();
	for i in 0 .. level.len() {
	    for j in i + 1 .. level.len() {
		let (left, right) = (&level[ i ], &level[ j ]);
		if left.len() != right.len() || left.shared_members( right ) != left.len() - 1 {
		    continue;
		}
		let joined = left.union( right );
		if seen.insert( joined.key() ) {
		    candidates.push( joined );
		}
	    }
	}
	candidates
    }

    fn evaluate_level( &mut self, candidates: Vec<Itemset> ) -> Vec<Itemset> {
	let mut survivors = Vec::new();
	for mut candidate in candidates {
	    if self.partition.should_terminate()
		|| self.partition.processed() >= self.candidate_budget()
	    {
		break;
	    }
	    if self.evaluate( &mut candidate ) {
		survivors.push( candidate );
	    }
	    self.maybe_flush();
	}
	survivors
    }

    /// Computes the candidate's utility and bounds. Returns whether it
    /// stays expandable: supersets are ruled out only when the upper
    /// bound falls below the threshold. Emission into the buffer
    /// additionally requires the utility itself to meet the threshold.
    fn evaluate( &mut self, candidate: &mut Itemset ) -> bool {
	let eu = self.calculator.compute( candidate );
	candidate.set_eu( eu );

	let threshold = self.topk.threshold();
	let upper = if candidate.has_negative() {
	    candidate.set_lower_bound( self.bounds.lower_bound( candidate, eu ));
	    self.bounds.upper_bound( candidate, eu )
	} else {
	    self.positive_upper_bound( candidate )
	};
	candidate.set_upper_bound( upper );

	self.partition.increment_processed();
	self.since_sync += 1;

	if upper < threshold {
	    trace!( "pruned {:?}: bound {} below threshold {}", candidate.key(), upper, threshold );
	    return false;
	}
	if eu >= threshold {
	    self.buffer.push( candidate.clone() );
	}
	if eu >= threshold * self.config.speculation_factor
	    && candidate.len() < self.config.max_itemset_size / 2
	{
	    self.speculate( candidate );
	}
	true
    }

    /// Upper bound for purely positive candidates: each remaining positive
    /// partition item adds at most its best co-occurring contribution.
    fn positive_upper_bound( &self, candidate: &Itemset ) -> f64 {
	let transactions = self.put.transactions_for( candidate );
	let mut additional = 0.0;
	for item in &self.universe {
	    if candidate.contains( *item ) || self.put.has_negative_utility( *item ) {
		continue;
	    }
	    let mut best = 0.0;
	    for transaction in &transactions {
		if !transaction.contains( *item ) {
		    continue;
		}
		let contribution = transaction.existence_probability()
		    * transaction.item_probability( *item )
		    * transaction.item_utility( *item );
		best = f64::max( best, contribution );
	    }
	    additional += best;
	}
	candidate.eu() + additional
    }

    /// Extends a promising candidate by single partition items; any
    /// extension meeting the threshold goes straight to the buffer.
    fn speculate( &mut self, base: &Itemset ) {
	let extensions: Vec<Item> = self.universe.iter()
	    .filter( |item| !base.contains( **item ))
	    .take( self.config.max_speculation )
	    .copied()
	    .collect();

	for item in extensions {
	    let mut superset = base.with_item( item );
	    superset.set_has_negative(
		superset.has_negative() || self.put.has_negative_utility( item )
	    );
	    let eu = self.calculator.compute( &superset );
	    superset.set_eu( eu );
	    let upper = if superset.has_negative() {
		superset.set_lower_bound( self.bounds.lower_bound( &superset, eu ));
		self.bounds.upper_bound( &superset, eu )
	    } else {
		self.positive_upper_bound( &superset )
	    };
	    superset.set_upper_bound( upper );
	    if eu >= self.topk.threshold() {
		self.buffer.push( superset );
	    }
	}
    }

    /// Items granted by rebalancing enter as singletons with a chance to
    /// grow speculatively; in-flight levels are never restarted.
    fn absorb_granted( &mut self ) {
	for item in self.partition.drain_pending() {
	    self.universe.push( item );
	    let _ = self.evaluate_single( item );
	    self.maybe_flush();
	}
    }

    fn publish_bound( &self, level: &[Itemset] ) {
	let bound = level.iter()
	    .map( |itemset| itemset.upper_bound() )
	    .fold( f64::NEG_INFINITY, f64::max );
	self.partition.set_upper_bound( bound );
    }

    fn candidate_budget( &self ) -> u64 {
	self.partition.search_space().min( self.config.max_partition_candidates )
    }

    fn maybe_flush( &mut self ) {
	if self.since_sync >= self.config.sync_interval
	    || self.buffer.len() > self.config.buffer_limit
	{
	    self.flush();
	}
    }

    fn flush( &mut self ) {
	self.since_sync = 0;
	if !self.buffer.is_empty() {
	    self.topk.update( std::mem::take( &mut self.buffer ));
	}
    }
}
