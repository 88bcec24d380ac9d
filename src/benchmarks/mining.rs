
use std::time::Instant;

use tracing::info;
use tracing_subscriber;

use phantom::{mine, io};

fn main() {
    prepare_logging();

    let database = io::sample_database( 42 );
    info!(
	"benchmark database: {} transactions, {} items",
	database.len(), database.item_count()
    );

    for processors in [ 1, 2, 4, 8 ] {
	let start = Instant::now();
	let results = mine( &database, 10, processors );
	let elapsed = Instant::now().duration_since( start );
	info!(
	    "{processors} workers: {} results in {}ms, best eu {:.2}",
	    results.len(),
	    elapsed.as_millis(),
	    results.first().map_or( 0.0, |itemset| itemset.eu() )
	);
    }
}

fn prepare_logging() {
    let tracer = tracing_subscriber::fmt::fmt()
	.with_max_level( tracing_subscriber::filter::LevelFilter::DEBUG )
	.finish();
    tracing::subscriber::set_global_default( tracer ).unwrap();
}
