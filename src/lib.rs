
pub mod config;
pub mod data;
pub mod put;
pub mod utility;
pub mod bounds;
pub mod miner;
pub mod parallel;
pub mod io;

pub use config::MiningConfig;
pub use data::{Item, Transaction, Database, Itemset};
pub use put::Put;
pub use parallel::Phantom;

/// Canonical order-independent representation of an itemset's members
pub type Itemvec = Vec<Item>;

/// Mines the top-k expected-utility itemsets with the default configuration.
pub fn mine( database: &Database, k: usize, processors: usize ) -> Vec<Itemset> {
    Phantom::new( database, k, processors, MiningConfig::default() ).mine()
}
