
use crate::utility::SynergyTable;

/// Tunable knobs of the mining engine. The defaults match the reference
/// parameterization; `strict` is the preset used for correctness testing.
#[derive( Debug, Clone )]
pub struct MiningConfig {
    /// uncertainty discount factor for high-variance itemsets
    pub alpha: f64,
    /// optimism factor scaling the positive superset gain
    pub omega: f64,
    /// confidence factor applied to guaranteed losses from negative items
    pub neg_confidence: f64,
    /// speculation kicks in at eu >= threshold * speculation_factor
    pub speculation_factor: f64,
    /// extension items tried per speculative exploration
    pub max_speculation: usize,
    pub max_itemset_size: usize,
    /// candidates processed between forced buffer flushes
    pub sync_interval: u64,
    /// local buffer size that triggers an immediate flush
    pub buffer_limit: usize,
    /// per-partition candidate ceiling, capping 2^n - 1
    pub max_partition_candidates: u64,
    /// top-k updates between heap consolidations
    pub consolidation_threshold: usize,
    /// optimistic update attempts before a candidate is dropped
    pub max_update_retries: u32,
    /// identical convergence polls before the top-k counts as stable
    pub stability_threshold: usize,
    /// bound convergence requires max bound < kth utility * (1 + epsilon)
    pub convergence_epsilon: f64,
    pub required_confidence: f64,
    /// unexplored fraction below which work counts as exhausted
    pub work_exhaustion_threshold: f64,
    /// tolerated relative deviation from the mean processed count
    pub rebalance_tolerance: f64,
    pub poll_interval_ms: u64,
    /// caller-supplied utility dependencies; empty disables the extension
    pub synergies: SynergyTable,
}

impl Default for MiningConfig {
    fn default() -> MiningConfig {
	MiningConfig {
	    alpha: 0.1,
	    omega: 0.9,
	    neg_confidence: 0.8,
	    speculation_factor: 1.2,
	    max_speculation: 10,
	    max_itemset_size: 20,
	    sync_interval: 1000,
	    buffer_limit: 100,
	    max_partition_candidates: 1_000_000,
	    consolidation_threshold: 100,
	    max_update_retries: 10,
	    stability_threshold: 10,
	    convergence_epsilon: 0.01,
	    required_confidence: 0.95,
	    work_exhaustion_threshold: 0.01,
	    rebalance_tolerance: 0.2,
	    poll_interval_ms: 100,
	    synergies: SynergyTable::empty(),
	}
    }
}

impl MiningConfig {

    /// Exact-bound preset: no variance discount, no optimism haircut, no synergies.
    pub fn strict() -> MiningConfig {
	MiningConfig {
	    alpha: 0.0,
	    omega: 1.0,
	    ..MiningConfig::default()
	}
    }
}
