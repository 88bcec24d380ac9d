
use std::hash::{Hash, Hasher};

use bit_set::BitSet;
use rustc_hash::FxHashMap;

use crate::Itemvec;

/// Internal item representation. External string identifiers are interned
/// by the database and only translated back for output.
pub type Item = usize;

/// An uncertain transaction: an existence probability plus per-item
/// occurrence probabilities and signed utilities. An item appears at most
/// once; only items with a recorded pair count as present.
#[derive( Debug, Clone )]
pub struct Transaction {
    tid: String,
    existence: f64,
    items: FxHashMap<Item, (f64, f64)>,
}

impl Transaction {

    pub fn new( tid: &str, existence: f64 ) -> Transaction {
	Transaction {
	    tid: tid.to_string(),
	    existence,
	    items: FxHashMap::default(),
	}
    }

    pub fn add_item( &mut self, item: Item, probability: f64, utility: f64 ) {
	self.items.insert( item, (probability, utility) );
    }

    pub fn tid( &self ) -> &str {
	&self.tid
    }

    pub fn existence_probability( &self ) -> f64 {
	self.existence
    }

    pub fn item_probability( &self, item: Item ) -> f64 {
	self.items.get( &item ).map_or( 0.0, |(p, _)| *p )
    }

    pub fn item_utility( &self, item: Item ) -> f64 {
	self.items.get( &item ).map_or( 0.0, |(_, u)| *u )
    }

    pub fn contains( &self, item: Item ) -> bool {
	self.items.contains_key( &item )
    }

    pub fn items( &self ) -> impl Iterator<Item = Item> + '_ {
	self.items.keys().copied()
    }

    pub fn len( &self ) -> usize {
	self.items.len()
    }
}

/// The uncertain database: an ordered transaction sequence plus the
/// interner for item identifiers. Immutable once loaded.
#[derive( Debug, Clone, Default )]
pub struct Database {
    transactions: Vec<Transaction>,
    item_names: Vec<String>,
    name_to_item: FxHashMap<String, Item>,
}

impl Database {

    pub fn new() -> Database {
	Database::default()
    }

    /// Maps an external identifier to its dense internal id, assigning one on first sight.
    pub fn intern( &mut self, name: &str ) -> Item {
	if let Some( item ) = self.name_to_item.get( name ) {
	    return *item;
	}
	let item = self.item_names.len();
	self.item_names.push( name.to_string() );
	self.name_to_item.insert( name.to_string(), item );
	item
    }

    pub fn item( &self, name: &str ) -> Option<Item> {
	self.name_to_item.get( name ).copied()
    }

    pub fn item_name( &self, item: Item ) -> &str {
	&self.item_names[ item ]
    }

    pub fn add_transaction( &mut self, transaction: Transaction ) {
	self.transactions.push( transaction );
    }

    pub fn transactions( &self ) -> &[Transaction] {
	&self.transactions
    }

    pub fn universe( &self ) -> Vec<Item> {
	(0 .. self.item_names.len()).collect()
    }

    pub fn item_count( &self ) -> usize {
	self.item_names.len()
    }

    pub fn len( &self ) -> usize {
	self.transactions.len()
    }

    pub fn is_empty( &self ) -> bool {
	self.transactions.is_empty()
    }

    /// Round-robin transaction subset for one processor. Subsets over all
    /// processor indices are disjoint and their union is the database.
    pub fn partition( &self, processor: usize, processors: usize ) -> Database {
	let transactions = self.transactions.iter()
	    .skip( processor )
	    .step_by( processors )
	    .cloned()
	    .collect();
	Database {
	    transactions,
	    item_names: self.item_names.clone(),
	    name_to_item: self.name_to_item.clone(),
	}
    }
}

/// An itemset with its utility metadata. Equality and hashing consider the
/// member set only; the utility fields are mutable annotations.
#[derive( Debug, Clone )]
pub struct Itemset {
    items: BitSet,
    eu: f64,
    upper_bound: f64,
    lower_bound: f64,
    has_negative: bool,
}

impl Itemset {

    pub fn new() -> Itemset {
	Itemset {
	    items: BitSet::new(),
	    eu: 0.0,
	    upper_bound: f64::INFINITY,
	    lower_bound: f64::NEG_INFINITY,
	    has_negative: false,
	}
    }

    pub fn single( item: Item ) -> Itemset {
	let mut itemset = Itemset::new();
	itemset.insert( item );
	itemset
    }

    pub fn from_items( items: &[Item] ) -> Itemset {
	let mut itemset = Itemset::new();
	for item in items {
	    itemset.insert( *item );
	}
	itemset
    }

    pub fn insert( &mut self, item: Item ) {
	self.items.insert( item );
    }

    pub fn contains( &self, item: Item ) -> bool {
	self.items.contains( item )
    }

    pub fn contains_all( &self, other: &Itemset ) -> bool {
	other.items.is_subset( &self.items )
    }

    /// Member union with fresh utility metadata; the negative flag is
    /// inherited from either operand.
    pub fn union( &self, other: &Itemset ) -> Itemset {
	let mut items = self.items.clone();
	items.union_with( &other.items );
	Itemset {
	    items,
	    eu: 0.0,
	    upper_bound: f64::INFINITY,
	    lower_bound: f64::NEG_INFINITY,
	    has_negative: self.has_negative || other.has_negative,
	}
    }

    /// Deep copy extended by one item, keeping the negative flag.
    pub fn with_item( &self, item: Item ) -> Itemset {
	let mut extended = self.clone();
	extended.insert( item );
	extended.eu = 0.0;
	extended.upper_bound = f64::INFINITY;
	extended.lower_bound = f64::NEG_INFINITY;
	extended
    }

    pub fn shared_members( &self, other: &Itemset ) -> usize {
	self.items.intersection( &other.items ).count()
    }

    pub fn items( &self ) -> impl Iterator<Item = Item> + '_ {
	self.items.iter()
    }

    /// Members in ascending order, the canonical cache key.
    pub fn key( &self ) -> Itemvec {
	self.items.iter().collect()
    }

    pub fn len( &self ) -> usize {
	self.items.len()
    }

    pub fn is_empty( &self ) -> bool {
	self.items.is_empty()
    }

    pub fn eu( &self ) -> f64 {
	self.eu
    }

    pub fn set_eu( &mut self, eu: f64 ) {
	self.eu = eu;
    }

    pub fn upper_bound( &self ) -> f64 {
	self.upper_bound
    }

    pub fn set_upper_bound( &mut self, bound: f64 ) {
	self.upper_bound = bound;
    }

    pub fn lower_bound( &self ) -> f64 {
	self.lower_bound
    }

    pub fn set_lower_bound( &mut self, bound: f64 ) {
	self.lower_bound = bound;
    }

    pub fn has_negative( &self ) -> bool {
	self.has_negative
    }

    pub fn set_has_negative( &mut self, has_negative: bool ) {
	self.has_negative = has_negative;
    }
}

impl Default for Itemset {
    fn default() -> Itemset {
	Itemset::new()
    }
}

impl PartialEq for Itemset {
    fn eq( &self, other: &Itemset ) -> bool {
	self.items == other.items
    }
}

impl Eq for Itemset {}

impl Hash for Itemset {
    fn hash <H: Hasher> ( &self, state: &mut H ) {
	for item in self.items.iter() {
	    item.hash( state );
	}
    }
}
