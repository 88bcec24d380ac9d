
use std::time::Instant;

use clap::{self, Parser};
use tracing::info;

use phantom::*;

#[derive( Parser )]
#[command( name = "phantom", about = "Parallel top-k high-utility itemset mining on uncertain databases" )]
struct Arguments {
    /// Number of top itemsets to find
    #[arg( short = 'k', long = "topk", default_value_t = 10 )]
    topk: usize,
    /// Number of parallel processors
    #[arg( short = 'p', long = "processors", default_value_t = 4 )]
    processors: usize,
    /// Input file path; a generated sample database is mined when absent
    #[arg( short = 'i', long = "input" )]
    input: Option<String>,
    /// Output file path
    #[arg( short = 'o', long = "output", default_value = "results/output.txt" )]
    output: String,
    /// JSON file with synergy bonuses
    #[arg( long )]
    synergy: Option<String>,
    /// Run with debug logging
    #[arg( long, default_value_t = false )]
    debug: bool,
}

fn setup_logging( args: &Arguments ) -> Result<(), String> {
    let tracer = tracing_subscriber::fmt::fmt();
    let tracer = if args.debug {
	tracer.with_max_level( tracing_subscriber::filter::LevelFilter::TRACE )
    } else {
	tracer.with_max_level( tracing_subscriber::filter::LevelFilter::INFO )
    };
    let tracer = tracer.finish();
    tracing::subscriber::set_global_default( tracer ).map_err( |err| err.to_string() )
}

fn load_database( args: &Arguments ) -> Result<Database, String> {
    match &args.input {
	Some( path ) => {
	    info!( "loading database from {path}" );
	    io::read_database( path ).map_err( |err| err.to_string() )
	},
	None => {
	    info!( "no input file, generating the sample database" );
	    Result::Ok( io::sample_database( 42 ))
	},
    }
}

fn configure( args: &Arguments, database: &Database ) -> Result<MiningConfig, String> {
    let mut config = MiningConfig::default();
    if let Some( path ) = &args.synergy {
	config.synergies = io::read_synergies( path, database ).map_err( |err| err.to_string() )?;
	info!( "loaded {} synergy entries", config.synergies.len() );
    }
    Result::Ok( config )
}

fn display_results( results: &[Itemset], database: &Database, k: usize ) {
    println!( "=== Top-{k} High-Utility Itemsets ===" );
    for (rank, itemset) in results.iter().enumerate() {
	println!( "{}. {}", rank + 1, io::format_members( itemset, database ));
	println!( "   Expected Utility: {:.2}", itemset.eu() );
	println!( "   Upper Bound: {:.2}", itemset.upper_bound() );
	if itemset.has_negative() {
	    println!( "   Contains negative utility items" );
	}
    }
}

fn main() -> Result<(), String> {
    let args = Arguments::parse();
    setup_logging( &args )?;

    let database = load_database( &args )?;
    let config = configure( &args, &database )?;
    info!(
	"starting: k = {}, processors = {}, {} transactions, {} items",
	args.topk, args.processors, database.len(), database.item_count()
    );

    let start = Instant::now();
    let results = Phantom::new( &database, args.topk, args.processors, config ).mine();
    let elapsed = start.elapsed();

    display_results( &results, &database, args.topk );
    io::write_results( &args.output, &results, &database, elapsed )
	.map_err( |err| err.to_string() )?;
    info!( "results saved to {}", args.output );
    info!( "total execution time: {:.3}s", elapsed.as_secs_f64() );
    Result::Ok( () )
}
