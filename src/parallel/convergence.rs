
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use crate::{Itemvec, MiningConfig};
use super::{GlobalTopK, SearchPartition};

/// Outcome of one convergence poll.
#[derive( Debug, Clone, Copy )]
pub struct Criteria {
    pub stability: bool,
    pub bounds: bool,
    pub exhaustion: bool,
    pub confidence: bool,
}

impl Criteria {
    pub fn converged( &self ) -> bool {
	(self.stability && self.bounds) || self.exhaustion || self.confidence
    }
}

struct MonitorState {
    previous: Option<Vec<Itemvec>>,
    stable_polls: usize,
    last_change: Instant,
    last_poll: Option<Instant>,
    last_version: u64,
    last_processed: u64,
    discovery_rate: f64,
    processing_rate: f64,
}

/// Periodic four-criterion termination test: result stability, bound
/// tightness against the k-th utility, work exhaustion, and a weighted
/// confidence score. Converged when stability and bounds hold together,
/// or either of the other two fires.
pub struct ConvergenceMonitor {
    k: usize,
    epsilon: f64,
    required_confidence: f64,
    stability_threshold: usize,
    exhaustion_threshold: f64,
    started: Instant,
    state: Mutex<MonitorState>,
}

impl ConvergenceMonitor {

    pub fn new( k: usize, config: &MiningConfig ) -> ConvergenceMonitor {
	let now = Instant::now();
	ConvergenceMonitor {
	    k,
	    epsilon: config.convergence_epsilon,
	    required_confidence: config.required_confidence,
	    stability_threshold: config.stability_threshold,
	    exhaustion_threshold: config.work_exhaustion_threshold,
	    started: now,
	    state: Mutex::new( MonitorState {
		previous: None,
		stable_polls: 0,
		last_change: now,
		last_poll: None,
		last_version: 0,
		last_processed: 0,
		discovery_rate: 0.0,
		processing_rate: 0.0,
	    }),
	}
    }

    pub fn has_converged( &self, topk: &GlobalTopK, partitions: &[SearchPartition] ) -> bool {
	let criteria = self.evaluate( topk, partitions );
	debug!(
	    "convergence poll: stability {} bounds {} exhaustion {} confidence {}",
	    criteria.stability, criteria.bounds, criteria.exhaustion, criteria.confidence
	);
	criteria.converged()
    }

    pub fn evaluate( &self, topk: &GlobalTopK, partitions: &[SearchPartition] ) -> Criteria {
	let mut state = self.state.lock();
	let now = Instant::now();

	let snapshot = topk.extract();
	let keys: Vec<Itemvec> = snapshot.iter().map( |itemset| itemset.key() ).collect();
	let version = topk.version();
	let processed: u64 = partitions.iter().map( |p| p.processed() ).sum();

	// discovery and processing rates from poll-to-poll deltas
	let had_previous_poll = state.last_poll.is_some();
	if let Some( last ) = state.last_poll {
	    let elapsed = now.duration_since( last ).as_secs_f64().max( 1e-3 );
	    state.discovery_rate = (version - state.last_version) as f64 / elapsed;
	    state.processing_rate = (processed - state.last_processed) as f64 / elapsed;
	}
	state.last_poll = Some( now );
	state.last_version = version;
	state.last_processed = processed;

	// criterion 1: the ordered result sequence has stopped moving
	let unchanged = state.previous.as_ref() == Some( &keys );
	if unchanged {
	    state.stable_polls += 1;
	} else {
	    state.stable_polls = 0;
	    state.last_change = now;
	}
	state.previous = Some( keys );
	let stability = state.stable_polls >= self.stability_threshold;

	// criterion 2: no partition can still reach past the k-th utility
	let kth = topk.threshold();
	let bounds = if snapshot.len() >= self.k && kth > f64::NEG_INFINITY {
	    let reachable = partitions.iter()
		.map( |p| p.upper_bound() )
		.fold( f64::NEG_INFINITY, f64::max );
	    reachable < kth * (1.0 + self.epsilon)
	} else {
	    false
	};

	// criterion 3: the search space is explored, or progress has stalled
	let space: u64 = partitions.iter()
	    .map( |p| p.search_space() )
	    .fold( 0, u64::saturating_add );
	let explored = space == 0
	    || processed as f64 / space as f64 > 1.0 - self.exhaustion_threshold;
	let warmed_up = now.duration_since( self.started ).as_secs_f64() >= 1.0;
	let stalled = warmed_up && had_previous_poll && state.processing_rate < 1.0;
	let exhaustion = explored || stalled;

	// criterion 4: weighted confidence in the current result
	let minutes_since_change = now.duration_since( state.last_change ).as_secs_f64() / 60.0;
	let stability_score = 1.0 / (1.0 + (-0.5 * (minutes_since_change - 5.0)).exp());
	let coverage_score = 1.0 - f64::min( 1.0, state.discovery_rate / 10.0 );
	let tightness = if snapshot.is_empty() {
	    0.0
	} else {
	    snapshot.iter()
		.map( |itemset| if itemset.upper_bound() > 0.0 {
		    itemset.eu() / itemset.upper_bound()
		} else {
		    0.0
		})
		.sum::<f64>() / snapshot.len() as f64
	};
	let score = 0.4 * stability_score + 0.3 * coverage_score + 0.3 * tightness;
	let confidence = score >= self.required_confidence;

	Criteria { stability, bounds, exhaustion, confidence }
    }
}
