
use crate::{Item, Itemset, MiningConfig};
use crate::data::Transaction;
use crate::put::Put;

/// Occurrence products below this are treated as zero.
const PROBABILITY_FLOOR: f64 = 1e-10;

/// Caller-supplied utility dependencies: fixed bonuses granted to every
/// itemset containing the keyed member combination. An empty table
/// disables the extension and yields the pure formula.
#[derive( Debug, Clone, Default )]
pub struct SynergyTable {
    bonuses: Vec<(Vec<Item>, f64)>,
}

impl SynergyTable {

    pub fn empty() -> SynergyTable {
	SynergyTable { bonuses: Vec::new() }
    }

    pub fn add( &mut self, items: &[Item], bonus: f64 ) {
	self.bonuses.push( (items.to_vec(), bonus) );
    }

    pub fn is_empty( &self ) -> bool {
	self.bonuses.is_empty()
    }

    pub fn len( &self ) -> usize {
	self.bonuses.len()
    }

    /// Total bonus of every keyed combination contained in the itemset.
    pub fn bonus_for( &self, itemset: &Itemset ) -> f64 {
	self.bonuses.iter()
	    .filter( |(items, _)| items.iter().all( |item| itemset.contains( *item )))
	    .map( |(_, bonus)| *bonus )
	    .sum()
    }
}

/// Computes the expected utility of an itemset: the probability-weighted
/// per-transaction utility sum, discounted by the weighted coefficient of
/// variation. Results are memoized in the tensor.
pub struct ExpectedUtility<'a> {
    put: &'a Put<'a>,
    config: &'a MiningConfig,
}

impl <'a> ExpectedUtility<'a> {

    pub fn new( put: &'a Put<'a>, config: &'a MiningConfig ) -> ExpectedUtility<'a> {
	ExpectedUtility { put, config }
    }

    pub fn compute( &self, itemset: &Itemset ) -> f64 {
	if let Some( eu ) = self.put.cached_eu( itemset ) {
	    return eu;
	}

	let transactions = self.put.transactions_for( itemset );

	let mut eu = 0.0;
	for transaction in &transactions {
	    let contribution = transaction.existence_probability()
		* self.membership_probability( transaction, itemset )
		* self.transaction_utility( transaction, itemset );
	    eu += contribution;
	}

	let variance = self.utility_variance( itemset, &transactions );
	eu *= 1.0 / (1.0 + self.config.alpha * variance);

	self.put.cache_eu( itemset, eu );
	eu
    }

    /// Probability that every member occurs, assuming independence.
    fn membership_probability( &self, transaction: &Transaction, itemset: &Itemset ) -> f64 {
	let mut probability = 1.0;
	for item in itemset.items() {
	    probability *= transaction.item_probability( item );
	    if probability < PROBABILITY_FLOOR {
		return 0.0;
	    }
	}
	probability
    }

    /// Member utility sum plus any synergy bonuses.
    fn transaction_utility( &self, transaction: &Transaction, itemset: &Itemset ) -> f64 {
	let base: f64 = itemset.items()
	    .map( |item| transaction.item_utility( item ))
	    .sum();
	base + self.config.synergies.bonus_for( itemset )
    }

    /// Weighted coefficient of variation of the per-transaction utility
    /// under weights P(T) * prod p_i(T). Zero on degenerate inputs.
    fn utility_variance( &self, itemset: &Itemset, transactions: &[&Transaction] ) -> f64 {
	if transactions.len() < 2 {
	    return 0.0;
	}

	let mut weighted_sum = 0.0;
	let mut weight_sum = 0.0;
	for transaction in transactions {
	    let weight = transaction.existence_probability()
		* self.membership_probability( transaction, itemset );
	    weighted_sum += weight * self.transaction_utility( transaction, itemset );
	    weight_sum += weight;
	}
	if weight_sum <= 0.0 {
	    return 0.0;
	}
	let mean = weighted_sum / weight_sum;

	let mut variance_sum = 0.0;
	for transaction in transactions {
	    let weight = transaction.existence_probability()
		* self.membership_probability( transaction, itemset );
	    let deviation = self.transaction_utility( transaction, itemset ) - mean;
	    variance_sum += weight * deviation * deviation;
	}
	let variance = variance_sum / weight_sum;

	if mean.abs() > PROBABILITY_FLOOR {
	    variance / (mean * mean)
	} else {
	    variance
	}
    }
}
