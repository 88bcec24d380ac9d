
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::Item;
use super::AtomicF64;

/// A worker's slice of the item universe plus its progress state. Items
/// not yet claimed by the owner can move to another partition; granted
/// items from elsewhere arrive in a side queue that the worker drains at
/// level boundaries.
pub struct SearchPartition {
    id: usize,
    queue: Mutex<VecDeque<Item>>,
    pending: Mutex<Vec<Item>>,
    assigned: AtomicUsize,
    processed: AtomicU64,
    terminate: AtomicBool,
    exhausted: AtomicBool,
    upper_bound: AtomicF64,
}

impl SearchPartition {

    pub fn new( id: usize, items: Vec<Item> ) -> SearchPartition {
	let assigned = items.len();
	SearchPartition {
	    id,
	    queue: Mutex::new( items.into_iter().collect() ),
	    pending: Mutex::new( Vec::new() ),
	    assigned: AtomicUsize::new( assigned ),
	    processed: AtomicU64::new( 0 ),
	    terminate: AtomicBool::new( false ),
	    exhausted: AtomicBool::new( false ),
	    upper_bound: AtomicF64::new( f64::INFINITY ),
	}
    }

    pub fn id( &self ) -> usize {
	self.id
    }

    /// Claims the next unexplored item; claimed items can no longer move.
    pub fn claim_next( &self ) -> Option<Item> {
	self.queue.lock().pop_front()
    }

    pub fn unexplored_len( &self ) -> usize {
	self.queue.lock().len()
    }

    /// Removes up to `count` items from the unexplored tail for transfer.
    pub fn take_unexplored( &self, count: usize ) -> Vec<Item> {
	let mut queue = self.queue.lock();
	let take = count.min( queue.len() );
	let taken: Vec<Item> = (0 .. take).filter_map( |_| queue.pop_back() ).collect();
	self.assigned.fetch_sub( taken.len(), Ordering::SeqCst );
	taken
    }

    /// Accepts transferred items; the owner absorbs them between levels.
    pub fn grant( &self, items: Vec<Item> ) {
	if items.is_empty() {
	    return;
	}
	self.assigned.fetch_add( items.len(), Ordering::SeqCst );
	self.pending.lock().extend( items );
    }

    pub fn drain_pending( &self ) -> Vec<Item> {
	std::mem::take( &mut *self.pending.lock() )
    }

    pub fn assigned_items( &self ) -> usize {
	self.assigned.load( Ordering::SeqCst )
    }

    /// Size of the partition's candidate space, 2^n - 1 saturating.
    pub fn search_space( &self ) -> u64 {
	let n = self.assigned_items();
	if n >= 63 {
	    u64::MAX
	} else {
	    (1u64 << n) - 1
	}
    }

    pub fn processed( &self ) -> u64 {
	self.processed.load( Ordering::Relaxed )
    }

    pub fn increment_processed( &self ) {
	self.processed.fetch_add( 1, Ordering::Relaxed );
    }

    pub fn should_terminate( &self ) -> bool {
	self.terminate.load( Ordering::SeqCst )
    }

    pub fn signal_termination( &self ) {
	self.terminate.store( true, Ordering::SeqCst );
    }

    pub fn is_exhausted( &self ) -> bool {
	self.exhausted.load( Ordering::SeqCst )
    }

    pub fn mark_exhausted( &self ) {
	self.exhausted.store( true, Ordering::SeqCst );
    }

    /// Upper bound on anything still reachable from this partition, read
    /// by the convergence monitor.
    pub fn upper_bound( &self ) -> f64 {
	self.upper_bound.load()
    }

    pub fn set_upper_bound( &self, bound: f64 ) {
	self.upper_bound.store( bound );
    }
}
