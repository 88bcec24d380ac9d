
use crate::{Item, Itemset, MiningConfig};
use crate::data::Transaction;
use crate::put::Put;

/// Bounds on the utility of any superset of an itemset, treating
/// candidate-positive and candidate-negative items asymmetrically. The
/// optimistic gain is scaled down by the optimism factor and weighted by
/// co-occurrence; the guaranteed loss comes from negative items that
/// actually co-occur with the itemset.
pub struct PolarBounds<'a> {
    put: &'a Put<'a>,
    config: &'a MiningConfig,
}

impl <'a> PolarBounds<'a> {

    pub fn new( put: &'a Put<'a>, config: &'a MiningConfig ) -> PolarBounds<'a> {
	PolarBounds { put, config }
    }

    /// UB(X) = EU(X) + omega * G+(X) + L-(X). Empty transaction sets
    /// contribute nothing, so the bound degenerates to the utility itself.
    pub fn upper_bound( &self, itemset: &Itemset, eu: f64 ) -> f64 {
	let (positive, negative) = self.classify_remaining( itemset );
	let transactions = self.put.transactions_for( itemset );

	let gain = self.optimistic_gain( itemset, &transactions, &positive );
	let loss = self.pessimistic_loss( &transactions, &negative );

	eu + self.config.omega * gain + loss
    }

    /// LB(X): the worst case where every co-occurring negative item joins
    /// with its maximum impact.
    pub fn lower_bound( &self, itemset: &Itemset, eu: f64 ) -> f64 {
	let (_, negative) = self.classify_remaining( itemset );
	let transactions = self.put.transactions_for( itemset );

	let loss: f64 = negative.iter()
	    .map( |item| self.worst_negative_impact( &transactions, *item ))
	    .sum();
	eu + loss
    }

    /// Splits the items outside the itemset by the sign of their mean
    /// per-transaction utility.
    fn classify_remaining( &self, itemset: &Itemset ) -> (Vec<Item>, Vec<Item>) {
	let mut positive = Vec::new();
	let mut negative = Vec::new();
	for item in self.put.database().universe() {
	    if itemset.contains( item ) {
		continue;
	    }
	    if self.put.is_candidate_positive( item ) {
		positive.push( item );
	    } else {
		negative.push( item );
	    }
	}
	(positive, negative)
    }

    /// Best single-transaction contribution of each positive item that
    /// co-occurs with the itemset, weighted by its co-occurrence estimate.
    fn optimistic_gain( &self, itemset: &Itemset, transactions: &[&Transaction], positive: &[Item] ) -> f64 {
	let mut gain = 0.0;
	for item in positive {
	    let correlation = self.correlation( itemset, *item );
	    let mut best = 0.0;
	    for transaction in transactions {
		if !transaction.contains( *item ) {
		    continue;
		}
		let contribution = transaction.existence_probability()
		    * transaction.item_probability( *item )
		    * transaction.item_utility( *item )
		    * correlation;
		best = f64::max( best, contribution );
	    }
	    gain += best;
	}
	gain
    }

    /// Guaranteed loss from negative items: the strongest co-occurring
    /// impact, scaled by the negative-confidence factor. Non-positive.
    fn pessimistic_loss( &self, transactions: &[&Transaction], negative: &[Item] ) -> f64 {
	let mut loss = 0.0;
	for item in negative {
	    let mut worst = 0.0;
	    for transaction in transactions {
		if !transaction.contains( *item ) {
		    continue;
		}
		let impact = -self.config.neg_confidence
		    * transaction.existence_probability()
		    * transaction.item_probability( *item )
		    * transaction.item_utility( *item ).abs();
		worst = f64::min( worst, impact );
	    }
	    loss += worst;
	}
	loss
    }

    /// -max over co-occurring transactions of P * p * |u|, or zero when the
    /// item never appears with the itemset.
    fn worst_negative_impact( &self, transactions: &[&Transaction], item: Item ) -> f64 {
	let mut worst = 0.0;
	for transaction in transactions {
	    if !transaction.contains( item ) {
		continue;
	    }
	    let impact = transaction.existence_probability()
		* transaction.item_probability( item )
		* transaction.item_utility( item ).abs();
	    worst = f64::max( worst, impact );
	}
	-worst
    }

    /// Support-based conditional probability that the item joins the
    /// itemset: co-occurrences over the item's occurrences.
    fn correlation( &self, itemset: &Itemset, item: Item ) -> f64 {
	let occurrences = self.put.item_support( item );
	if occurrences == 0 {
	    return 0.0;
	}
	let transactions = self.put.database().transactions();
	let co_occurrences = self.put.item_tids( item ).iter()
	    .filter( |tid| itemset.items().all( |member| transactions[ **tid ].contains( member )))
	    .count();
	co_occurrences as f64 / occurrences as f64
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use rand::prelude::*;
    use crate::Database;
    use crate::utility::ExpectedUtility;

    /// One transaction holds a strong positive and a negative item, a
    /// second holds the positive item alone.
    fn mixed_database() -> Database {
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
	db
    }

    #[test]
    fn negative_singleton_cannot_reach_the_leader() {
	let mut config = MiningConfig::default();
	config.alpha = 0.0;
	let db = mixed_database();
	let put = Put::new( &db, &config );
	let bounds = PolarBounds::new( &put, &config );

	let b = Itemset::single( db.item( "b" ).unwrap() );
	let eu_b = put.single_eu( db.item( "b" ).unwrap() );
	assert!( (eu_b - (-80.0)).abs() < 1e-12 );

	// best case for supersets of {b}: gain a in T1 with correlation 1/2
	let ub = bounds.upper_bound( &b, eu_b );
	assert!( (ub - (-80.0 + 0.9 * 50.0)).abs() < 1e-9 );
	assert!( ub < 200.0 );
    }

    #[test]
    fn leader_bounds_account_for_the_negative_joiner() {
	let mut config = MiningConfig::default();
	config.alpha = 0.0;
	let db = mixed_database();
	let put = Put::new( &db, &config );
	let bounds = PolarBounds::new( &put, &config );

	let a = Itemset::single( db.item( "a" ).unwrap() );
	let eu_a = put.single_eu( db.item( "a" ).unwrap() );
	assert!( (eu_a - 200.0).abs() < 1e-12 );

	// guaranteed loss: 0.8 * 80 from the co-occurring negative item
	let ub = bounds.upper_bound( &a, eu_a );
	assert!( (ub - (200.0 - 64.0)).abs() < 1e-9 );

	// worst case: the negative item joins at full strength
	let lb = bounds.lower_bound( &a, eu_a );
	assert!( (lb - 120.0).abs() < 1e-9 );
    }

    #[test]
    fn empty_transaction_set_returns_the_utility() {
	let config = MiningConfig::strict();
	let db = mixed_database();
	let put = Put::new( &db, &config );
	let bounds = PolarBounds::new( &put, &config );

	// members never co-occur, so no gain or loss applies
	let pair = Itemset::from_items( &[ 0, 99 ] );
	assert_eq!( bounds.upper_bound( &pair, 0.0 ), 0.0 );
	assert_eq!( bounds.lower_bound( &pair, 0.0 ), 0.0 );
    }

    /// Random databases with pairwise-disjoint transactions and positive
    /// utilities: under the strict preset the bound provably dominates
    /// every superset's utility, so the generator hunts for violations.
    #[test]
    fn strict_bound_admits_all_supersets_on_disjoint_databases() {
	let mut rng = StdRng::seed_from_u64( 97 );

	for _ in 0 .. 25 {
	    let mut db = Database::new();
	    let mut next_item = 0;
	    let transaction_count = rng.gen_range( 2 ..= 3 );
	    for tid in 0 .. transaction_count {
		let mut t = Transaction::new( &format!( "T{tid}" ), 0.5 + 0.5 * rng.gen::<f64>() );
		for _ in 0 .. 2 {
		    let name = format!( "i{next_item}" );
		    next_item += 1;
		    t.add_item( db.intern( &name ), 0.5 + 0.5 * rng.gen::<f64>(), 1.0 + 19.0 * rng.gen::<f64>() );
		}
		db.add_transaction( t );
	    }

	    let config = MiningConfig::strict();
	    let put = Put::new( &db, &config );
	    let calculator = ExpectedUtility::new( &put, &config );
	    let bounds = PolarBounds::new( &put, &config );

	    let universe = db.universe();
	    let subsets: Vec<Itemset> = (1u32 .. 1 << universe.len())
		.map( |mask| {
		    let members: Vec<_> = universe.iter()
			.filter( |item| mask & (1 << **item as u32) != 0 )
			.copied()
			.collect();
		    Itemset::from_items( &members )
		})
		.collect();

	    for smaller in &subsets {
		let ub = bounds.upper_bound( smaller, calculator.compute( smaller ));
		for larger in &subsets {
		    if larger.len() > smaller.len() && larger.contains_all( smaller ) {
			assert!( calculator.compute( larger ) <= ub + 1e-6,
				 "superset beats the bound: {:?} over {:?}", larger.key(), smaller.key() );
		    }
		}
	    }
	}
    }
}
