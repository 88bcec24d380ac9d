
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as MemoryOrdering};
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rand::Rng;
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::{Itemset, Itemvec, MiningConfig};
use super::AtomicF64;

/// Min-order on expected utility for the bounded heap.
#[derive( Clone )]
struct ByUtility( Itemset );

impl PartialEq for ByUtility {
    fn eq( &self, other: &ByUtility ) -> bool {
	self.0.eu().total_cmp( &other.0.eu() ) == Ordering::Equal
    }
}

impl Eq for ByUtility {}

impl PartialOrd for ByUtility {
    fn partial_cmp( &self, other: &ByUtility ) -> Option<Ordering> {
	Some( self.cmp( other ))
    }
}

impl Ord for ByUtility {
    fn cmp( &self, other: &ByUtility ) -> Ordering {
	self.0.eu().total_cmp( &other.0.eu() )
    }
}

/// Immutable value swapped under the writer lock, so readers always see a
/// consistent snapshot.
#[derive( Clone )]
struct TopKState {
    heap: BinaryHeap<Reverse<ByUtility>>,
    members: FxHashSet<Itemvec>,
}

impl TopKState {

    fn new() -> TopKState {
	TopKState {
	    heap: BinaryHeap::new(),
	    members: FxHashSet::default(),
	}
    }

    fn len( &self ) -> usize {
	self.heap.len()
    }

    fn min_eu( &self ) -> f64 {
	self.heap.peek().map_or( f64::NEG_INFINITY, |Reverse( entry )| entry.0.eu() )
    }
}

/// Shared bounded top-k collection: an at-most-k min-heap behind a
/// version-stamped snapshot. Readers are wait-free; writers serialize on
/// an exclusive section guarding the swap and the version increment.
/// Candidates that keep losing the version race are dropped after bounded
/// backoff; the rising threshold makes that safe.
pub struct GlobalTopK {
    k: usize,
    state: RwLock<Arc<TopKState>>,
    version: AtomicU64,
    updates: AtomicUsize,
    consolidation_threshold: usize,
    max_retries: u32,
    writer: Mutex<()>,
    threshold: AtomicF64,
}

impl GlobalTopK {

    pub fn new( k: usize, config: &MiningConfig ) -> GlobalTopK {
	GlobalTopK {
	    k,
	    state: RwLock::new( Arc::new( TopKState::new() )),
	    version: AtomicU64::new( 0 ),
	    updates: AtomicUsize::new( 0 ),
	    consolidation_threshold: config.consolidation_threshold,
	    max_retries: config.max_update_retries,
	    writer: Mutex::new( () ),
	    threshold: AtomicF64::new( f64::NEG_INFINITY ),
	}
    }

    /// Merges a batch of candidates. Heaviest first; once one cannot reach
    /// the current minimum, the lighter rest is skipped.
    pub fn update( &self, mut candidates: Vec<Itemset> ) {
	candidates.sort_by( |left, right| right.eu().total_cmp( &left.eu() ));

	let mut rng = rand::thread_rng();
	'candidates: for candidate in candidates {
	    let mut retries = 0;
	    loop {
		let snapshot = self.snapshot();
		if snapshot.len() >= self.k && candidate.eu() < snapshot.min_eu() {
		    break 'candidates;
		}

		let expected = self.version.load( MemoryOrdering::SeqCst );
		if self.try_commit( &candidate, expected ) {
		    break;
		}

		retries += 1;
		if retries >= self.max_retries {
		    trace!( "dropping contended candidate {:?}", candidate.key() );
		    break;
		}
		let backoff = rng.gen_range( 0 .. (1u64 << retries.min( 10 )));
		thread::sleep( Duration::from_millis( backoff ));
	    }
	}

	if self.updates.fetch_add( 1, MemoryOrdering::SeqCst ) + 1 >= self.consolidation_threshold {
	    self.consolidate();
	}
    }

    /// One optimistic attempt: fails when the version moved since the
    /// caller's read. A candidate already present is a no-op success.
    fn try_commit( &self, candidate: &Itemset, expected: u64 ) -> bool {
	let _guard = self.writer.lock();
	if self.version.load( MemoryOrdering::SeqCst ) != expected {
	    return false;
	}

	let current = self.snapshot();
	if current.members.contains( &candidate.key() ) {
	    return true;
	}

	let mut next = TopKState::clone( &current );
	if next.len() < self.k {
	    next.heap.push( Reverse( ByUtility( candidate.clone() )));
	    next.members.insert( candidate.key() );
	} else if candidate.eu() >= next.min_eu() {
	    if let Some( Reverse( evicted )) = next.heap.pop() {
		next.members.remove( &evicted.0.key() );
	    }
	    next.heap.push( Reverse( ByUtility( candidate.clone() )));
	    next.members.insert( candidate.key() );
	}

	let reached_capacity = next.len() == self.k;
	let minimum = next.min_eu();
	*self.state.write() = Arc::new( next );
	self.version.fetch_add( 1, MemoryOrdering::SeqCst );

	if reached_capacity {
	    self.threshold.store( minimum );
	}
	true
    }

    /// Re-heapifies and trims so the heap and the membership set agree.
    fn consolidate( &self ) {
	let _guard = self.writer.lock();
	let current = self.snapshot();

	let mut entries: Vec<Itemset> = current.heap.iter()
	    .map( |Reverse( entry )| entry.0.clone() )
	    .collect();
	entries.sort_by( |left, right| right.eu().total_cmp( &left.eu() ));
	entries.truncate( self.k );

	let mut next = TopKState::new();
	for itemset in entries {
	    next.members.insert( itemset.key() );
	    next.heap.push( Reverse( ByUtility( itemset )));
	}

	*self.state.write() = Arc::new( next );
	self.version.fetch_add( 1, MemoryOrdering::SeqCst );
	self.updates.store( 0, MemoryOrdering::SeqCst );
    }

    /// Published pruning threshold: the k-th utility once k candidates are
    /// held, negative infinity before that.
    pub fn threshold( &self ) -> f64 {
	self.threshold.load()
    }

    pub fn len( &self ) -> usize {
	self.snapshot().len()
    }

    pub fn version( &self ) -> u64 {
	self.version.load( MemoryOrdering::SeqCst )
    }

    /// Current contents, descending by utility, at most k entries.
    pub fn extract( &self ) -> Vec<Itemset> {
	let snapshot = self.snapshot();
	let mut result: Vec<Itemset> = snapshot.heap.iter()
	    .map( |Reverse( entry )| entry.0.clone() )
	    .collect();
	result.sort_by( |left, right| right.eu().total_cmp( &left.eu() ));
	result.truncate( self.k );
	result
    }

    fn snapshot( &self ) -> Arc<TopKState> {
	Arc::clone( &self.state.read() )
    }
}
