
use crate::Database;
use crate::put::Put;

/// Uncertainty characteristics of a database, reported before mining.
#[derive( Debug, Clone, Copy )]
pub struct UncertaintyProfile {
    average_existence: f64,
    average_item_probability: f64,
}

impl UncertaintyProfile {

    pub fn analyze( database: &Database ) -> UncertaintyProfile {
	let mut existence_total = 0.0;
	let mut probability_total = 0.0;
	let mut item_count = 0usize;

	for transaction in database.transactions() {
	    existence_total += transaction.existence_probability();
	    for item in transaction.items() {
		probability_total += transaction.item_probability( item );
		item_count += 1;
	    }
	}

	let transactions = database.len();
	UncertaintyProfile {
	    average_existence: if transactions > 0 { existence_total / transactions as f64 } else { 0.0 },
	    average_item_probability: if item_count > 0 { probability_total / item_count as f64 } else { 0.0 },
	}
    }

    pub fn average_existence( &self ) -> f64 {
	self.average_existence
    }

    pub fn average_item_probability( &self ) -> f64 {
	self.average_item_probability
    }

    /// Combined metric used in the startup report.
    pub fn average_uncertainty( &self ) -> f64 {
	(self.average_existence + self.average_item_probability) / 2.0
    }
}

/// Sign distribution of single-item utilities, used for the startup
/// report alongside the partition ordering.
#[derive( Debug, Clone, Copy )]
pub struct UtilityStats {
    positive_count: usize,
    negative_count: usize,
    total_positive: f64,
    total_negative: f64,
}

impl UtilityStats {

    pub fn compute( put: &Put, database: &Database ) -> UtilityStats {
	let mut stats = UtilityStats {
	    positive_count: 0,
	    negative_count: 0,
	    total_positive: 0.0,
	    total_negative: 0.0,
	};
	for item in database.universe() {
	    let eu = put.single_eu( item );
	    if eu > 0.0 {
		stats.positive_count += 1;
		stats.total_positive += eu;
	    } else if eu < 0.0 {
		stats.negative_count += 1;
		stats.total_negative += eu.abs();
	    }
	}
	stats
    }

    pub fn negative_ratio( &self ) -> f64 {
	let total = self.positive_count + self.negative_count;
	if total > 0 {
	    self.negative_count as f64 / total as f64
	} else {
	    0.0
	}
    }

    pub fn average_positive( &self ) -> f64 {
	if self.positive_count > 0 {
	    self.total_positive / self.positive_count as f64
	} else {
	    0.0
	}
    }

    pub fn average_negative( &self ) -> f64 {
	if self.negative_count > 0 {
	    self.total_negative / self.negative_count as f64
	} else {
	    0.0
	}
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::{MiningConfig, Transaction};

    fn mixed_database() -> Database {
	let mut db = Database::new();
	let gain = db.intern( "gain" );
	let loss = db.intern( "loss" );
	let mut t1 = Transaction::new( "T1", 0.8 );
	t1.add_item( gain, 0.5, 10.0 );
	t1.add_item( loss, 1.0, -4.0 );
	let mut t2 = Transaction::new( "T2", 0.4 );
	t2.add_item( gain, 0.9, 10.0 );
	db.add_transaction( t1 );
	db.add_transaction( t2 );
	db
    }

    #[test]
    fn profile_averages_probabilities() {
	let profile = UncertaintyProfile::analyze( &mixed_database() );
	assert!( (profile.average_existence() - 0.6).abs() < 1e-12 );
	assert!( (profile.average_item_probability() - 0.8).abs() < 1e-12 );
	assert!( (profile.average_uncertainty() - 0.7).abs() < 1e-12 );
    }

    #[test]
    fn stats_split_by_sign() {
	let config = MiningConfig::strict();
	let db = mixed_database();
	let put = Put::new( &db, &config );
	let stats = UtilityStats::compute( &put, &db );
	assert!( (stats.negative_ratio() - 0.5).abs() < 1e-12 );
	assert!( stats.average_positive() > 0.0 );
	assert!( stats.average_negative() > 0.0 );
    }
}
