
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{Item, Itemvec, Database, Itemset, MiningConfig};
use crate::data::Transaction;
use crate::utility::ExpectedUtility;

/// Probabilistic Utility Tensor: inverted item index, precomputed
/// single-item expected utilities, per-item sign statistics and the
/// memoized itemset-EU cache. Built once before mining; the cache is the
/// only mutable part and its writes are idempotent.
pub struct Put<'a> {
    database: &'a Database,
    /// item -> ascending transaction indices
    index: Vec<Vec<usize>>,
    single_eu: Vec<f64>,
    mean_utility: Vec<f64>,
    negative: Vec<bool>,
    memo: RwLock<FxHashMap<Itemvec, f64>>,
    scans: AtomicU64,
}

impl <'a> Put<'a> {

    pub fn new( database: &'a Database, config: &MiningConfig ) -> Put<'a> {
	let n = database.item_count();
	let mut index = vec!( Vec::new(); n );
	for (tid, transaction) in database.transactions().iter().enumerate() {
	    for item in transaction.items() {
		index[ item ].push( tid );
	    }
	}

	let mut mean_utility = vec!( 0.0; n );
	let mut negative = vec!( false; n );
	for item in 0 .. n {
	    let tids = &index[ item ];
	    let mut total = 0.0;
	    for tid in tids {
		let utility = database.transactions()[ *tid ].item_utility( item );
		total += utility;
		if utility < 0.0 {
		    negative[ item ] = true;
		}
	    }
	    if !tids.is_empty() {
		mean_utility[ item ] = total / tids.len() as f64;
	    }
	}

	let mut put = Put {
	    database,
	    index,
	    single_eu: vec!( 0.0; n ),
	    mean_utility,
	    negative,
	    memo: RwLock::new( FxHashMap::default() ),
	    scans: AtomicU64::new( 0 ),
	};

	// single-item utilities go through the full formula so the tensor
	// and the cache agree to the last bit
	let single_eu: Vec<f64> = {
	    let calculator = ExpectedUtility::new( &put, config );
	    (0 .. n).into_par_iter()
		.map( |item| calculator.compute( &Itemset::single( item )))
		.collect()
	};
	put.single_eu = single_eu;
	debug!( "tensor built: {} items, {} transactions", n, database.len() );
	put
    }

    pub fn database( &self ) -> &'a Database {
	self.database
    }

    pub fn single_eu( &self, item: Item ) -> f64 {
	self.single_eu.get( item ).copied().unwrap_or( 0.0 )
    }

    /// Mean per-transaction utility of the item over its occurrences.
    pub fn mean_utility( &self, item: Item ) -> f64 {
	self.mean_utility.get( item ).copied().unwrap_or( 0.0 )
    }

    /// Whether the item carries negative utility in any transaction.
    pub fn has_negative_utility( &self, item: Item ) -> bool {
	self.negative.get( item ).copied().unwrap_or( false )
    }

    /// Candidate-positive means the item occurs and gains on average.
    pub fn is_candidate_positive( &self, item: Item ) -> bool {
	self.item_support( item ) > 0 && self.mean_utility( item ) > 0.0
    }

    pub fn item_tids( &self, item: Item ) -> &[usize] {
	self.index.get( item ).map_or( &[], |tids| tids.as_slice() )
    }

    pub fn item_support( &self, item: Item ) -> usize {
	self.item_tids( item ).len()
    }

    /// Transactions containing every member of the itemset, in database
    /// order: walk the least frequent member's list and filter.
    pub fn transactions_for( &self, itemset: &Itemset ) -> Vec<&'a Transaction> {
	if itemset.is_empty() {
	    return Vec::new();
	}
	self.scans.fetch_add( 1, Ordering::Relaxed );

	let rarest = itemset.items()
	    .min_by_key( |item| self.item_support( *item ))
	    .expect( "checked non-empty" );

	self.item_tids( rarest ).iter()
	    .map( |tid| &self.database.transactions()[ *tid ] )
	    .filter( |t| itemset.items().all( |item| t.contains( item )))
	    .collect()
    }

    pub fn cached_eu( &self, itemset: &Itemset ) -> Option<f64> {
	self.memo.read().get( &itemset.key() ).copied()
    }

    /// Idempotent: the formula is deterministic, so racing writers agree.
    pub fn cache_eu( &self, itemset: &Itemset, eu: f64 ) {
	self.memo.write().insert( itemset.key(), eu );
    }

    pub fn cache_len( &self ) -> usize {
	self.memo.read().len()
    }

    /// Number of transaction scans performed so far; cache hits avoid them.
    pub fn scan_count( &self ) -> u64 {
	self.scans.load( Ordering::Relaxed )
    }
}
