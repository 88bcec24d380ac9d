
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::time::Duration;

use chrono::Local;
use rand::prelude::*;
use statrs::distribution::DiscreteUniform;
use thiserror::Error;
use tracing::warn;

use crate::{Database, Itemset, Transaction};
use crate::utility::SynergyTable;

/// Recoverable input and output failures. Mining never starts on a
/// malformed database.
#[derive( Debug, Error )]
pub enum DataError {
    #[error( "io: {0}" )]
    Io( #[from] std::io::Error ),
    #[error( "line {line}: {reason}" )]
    Malformed { line: usize, reason: String },
    #[error( "line {line}: probability {value} outside [0, 1]" )]
    ProbabilityRange { line: usize, value: f64 },
    #[error( "line {line}: non-finite number {token}" )]
    NonFinite { line: usize, token: String },
    #[error( "synergy file: {0}" )]
    Synergy( String ),
}

/// Reads a transaction database: one transaction per line as
/// `tid existence_prob item:prob:utility ...`; `#` lines and blank lines
/// are skipped. Out-of-range probabilities, non-finite numbers and
/// duplicate items reject the file.
pub fn read_database( path: &str ) -> Result<Database, DataError> {
    let file = File::open( Path::new( path ))?;
    let reader = BufReader::new( file );
    let mut database = Database::new();

    for (index, line) in reader.lines().enumerate() {
	let line = line?;
	let number = index + 1;
	let trimmed = line.trim();
	if trimmed.is_empty() || trimmed.starts_with( '#' ) {
	    continue;
	}

	let mut fields = trimmed.split_whitespace();
	let tid = fields.next().expect( "checked non-blank" );
	let existence_token = fields.next().ok_or_else( || DataError::Malformed {
	    line: number,
	    reason: "missing existence probability".to_string(),
	})?;
	let existence = parse_probability( existence_token, number )?;

	let mut transaction = Transaction::new( tid, existence );
	for field in fields {
	    let parts: Vec<&str> = field.split( ':' ).collect();
	    if parts.len() != 3 {
		return Err( DataError::Malformed {
		    line: number,
		    reason: format!( "expected item:probability:utility, got '{field}'" ),
		});
	    }
	    let probability = parse_probability( parts[ 1 ], number )?;
	    let utility = parse_number( parts[ 2 ], number )?;

	    let item = database.intern( parts[ 0 ] );
	    if transaction.contains( item ) {
		return Err( DataError::Malformed {
		    line: number,
		    reason: format!( "duplicate item '{}'", parts[ 0 ] ),
		});
	    }
	    transaction.add_item( item, probability, utility );
	}
	database.add_transaction( transaction );
    }
    Ok( database )
}

fn parse_number( token: &str, line: usize ) -> Result<f64, DataError> {
    let value: f64 = token.parse().map_err( |_| DataError::Malformed {
	line,
	reason: format!( "unparsable number '{token}'" ),
    })?;
    if !value.is_finite() {
	return Err( DataError::NonFinite { line, token: token.to_string() });
    }
    Ok( value )
}

fn parse_probability( token: &str, line: usize ) -> Result<f64, DataError> {
    let value = parse_number( token, line )?;
    if !(0.0 ..= 1.0).contains( &value ) {
	return Err( DataError::ProbabilityRange { line, value });
    }
    Ok( value )
}

/// Writes the ranked results: a comment header followed by one
/// `rank,{items},eu,ub,has_negative` line per itemset, item names
/// lexicographically sorted, six fractional digits.
pub fn write_results(
    path: &str,
    results: &[Itemset],
    database: &Database,
    elapsed: Duration,
) -> Result<(), DataError> {
    let path = Path::new( path );
    if let Some( parent ) = path.parent() {
	if !parent.as_os_str().is_empty() {
	    fs::create_dir_all( parent )?;
	}
    }

    let mut file = File::create( path )?;
    writeln!( file, "# PHANTOM Mining Results" )?;
    writeln!( file, "# Execution Time: {} ms", elapsed.as_millis() )?;
    writeln!( file, "# Timestamp: {}", Local::now().format( "%Y-%m-%d %H:%M:%S" ))?;
    writeln!( file )?;

    for (rank, itemset) in results.iter().enumerate() {
	writeln!(
	    file,
	    "{},{},{:.6},{:.6},{}",
	    rank + 1,
	    format_members( itemset, database ),
	    itemset.eu(),
	    itemset.upper_bound(),
	    itemset.has_negative()
	)?;
    }
    Ok( () )
}

pub fn format_members( itemset: &Itemset, database: &Database ) -> String {
    let mut names: Vec<&str> = itemset.items()
	.map( |item| database.item_name( item ))
	.collect();
    names.sort_unstable();
    format!( "{{{}}}", names.join( ", " ))
}

/// JSON schema of a synergy file:
/// `{ "synergies": [ { "items": ["printer", "ink"], "bonus": 5.0 } ] }`
#[derive( Debug, serde::Deserialize )]
struct SynergyFile {
    synergies: Vec<SynergyEntry>,
}

#[derive( Debug, serde::Deserialize )]
struct SynergyEntry {
    items: Vec<String>,
    bonus: f64,
}

/// Loads a synergy table against an already-loaded database. Entries
/// naming unknown items are skipped with a warning.
pub fn read_synergies( path: &str, database: &Database ) -> Result<SynergyTable, DataError> {
    let content = fs::read_to_string( path )?;
    let parsed: SynergyFile = serde_json::from_str( &content )
	.map_err( |err| DataError::Synergy( err.to_string() ))?;

    let mut table = SynergyTable::empty();
    for entry in parsed.synergies {
	if !entry.bonus.is_finite() {
	    return Err( DataError::Synergy( format!( "non-finite bonus for {:?}", entry.items )));
	}
	let mut items = Vec::with_capacity( entry.items.len() );
	let mut known = true;
	for name in &entry.items {
	    match database.item( name ) {
		Some( item ) => items.push( item ),
		None => {
		    warn!( "synergy entry names unknown item '{name}', skipping" );
		    known = false;
		    break;
		}
	    }
	}
	if known && !items.is_empty() {
	    table.add( &items, entry.bonus );
	}
    }
    Ok( table )
}

/// Items of the generated retail database with their base utilities;
/// warranties, coupons, insurance and expedited shipping cost money.
const SAMPLE_ITEMS: [(&str, f64); 13] = [
    ("laptop", 500.0),
    ("mouse", 20.0),
    ("keyboard", 50.0),
    ("monitor", 300.0),
    ("hdmi_cable", 15.0),
    ("warranty", -50.0),
    ("software", 100.0),
    ("bag", 40.0),
    ("webcam", 80.0),
    ("headphones", 60.0),
    ("discount_coupon", -100.0),
    ("insurance", -30.0),
    ("express_shipping", -20.0),
];

/// Deterministic synthetic database: 1000 transactions of 3-8 items with
/// jittered utilities and mixed signs. Used when no input file is given.
pub fn sample_database( seed: u64 ) -> Database {
    let mut database = Database::new();
    let ids: Vec<_> = SAMPLE_ITEMS.iter().map( |(name, _)| database.intern( name )).collect();

    let mut rng = StdRng::seed_from_u64( seed );
    let item_picker = DiscreteUniform::new( 0, SAMPLE_ITEMS.len() as i64 - 1 )
	.expect( "non-empty item range" );

    for i in 0 .. 1000 {
	let existence = 0.7 + 0.3 * rng.gen::<f64>();
	let mut transaction = Transaction::new( &format!( "T{i}" ), existence );

	let count = 3 + rng.gen_range( 0 .. 6 );
	while transaction.len() < count {
	    let index = item_picker.sample( &mut rng ) as usize;
	    if transaction.contains( ids[ index ] ) {
		continue;
	    }
	    let probability = 0.6 + 0.4 * rng.gen::<f64>();
	    let utility = SAMPLE_ITEMS[ index ].1 * (0.9 + 0.2 * rng.gen::<f64>());
	    transaction.add_item( ids[ index ], probability, utility );
	}
	database.add_transaction( transaction );
    }
    database
}

#[cfg(test)]
mod test {

    use super::*;

    fn write_temp( content: &str ) -> (tempfile::TempDir, String) {
	let dir = tempfile::tempdir().expect( "temp dir" );
	let path = dir.path().join( "db.txt" );
	fs::write( &path, content ).expect( "write input" );
	let path = path.to_str().expect( "utf8 path" ).to_string();
	(dir, path)
    }

    #[test]
    fn reads_the_documented_format() {
	let (_dir, path) = write_temp(
	    "# comment\n\
	     \n\
	     T1 1.0 a:1.0:10.0 b:1.0:20.0\n\
	     T2 0.5 a:0.5:10.0\n",
	);
	let db = read_database( &path ).expect( "well-formed input" );
	assert_eq!( db.len(), 2 );
	assert_eq!( db.item_count(), 2 );
	let t2 = &db.transactions()[ 1 ];
	assert_eq!( t2.tid(), "T2" );
	assert_eq!( t2.existence_probability(), 0.5 );
	assert_eq!( t2.item_probability( db.item( "a" ).unwrap() ), 0.5 );
    }

    #[test]
    fn rejects_ill_shaped_triplets() {
	let (_dir, path) = write_temp( "T1 1.0 a:1.0\n" );
	assert!( matches!( read_database( &path ), Err( DataError::Malformed { line: 1, .. } )));
    }

    #[test]
    fn rejects_out_of_range_probabilities() {
	let (_dir, path) = write_temp( "T1 1.0 a:1.5:10.0\n" );
	assert!( matches!(
	    read_database( &path ),
	    Err( DataError::ProbabilityRange { line: 1, .. } )
	));
    }

    #[test]
    fn rejects_non_finite_utilities() {
	let (_dir, path) = write_temp( "T1 1.0 a:1.0:nan\n" );
	assert!( matches!( read_database( &path ), Err( DataError::NonFinite { line: 1, .. } )));
    }

    #[test]
    fn rejects_duplicate_items() {
	let (_dir, path) = write_temp( "T1 1.0 a:1.0:10.0 a:0.5:5.0\n" );
	assert!( matches!( read_database( &path ), Err( DataError::Malformed { line: 1, .. } )));
    }

    #[test]
    fn writes_header_and_sorted_member_rows() {
	let mut db = Database::new();
	let zebra = db.intern( "zebra" );
	let apple = db.intern( "apple" );

	let mut itemset = Itemset::from_items( &[ zebra, apple ] );
	itemset.set_eu( 12.5 );
	itemset.set_upper_bound( 20.0 );
	itemset.set_has_negative( true );

	let dir = tempfile::tempdir().expect( "temp dir" );
	let path = dir.path().join( "out" ).join( "results.txt" );
	let path = path.to_str().expect( "utf8 path" ).to_string();
	write_results( &path, &[ itemset ], &db, Duration::from_millis( 42 )).expect( "write" );

	let content = fs::read_to_string( &path ).expect( "read back" );
	let lines: Vec<&str> = content.lines().collect();
	assert_eq!( lines[ 0 ], "# PHANTOM Mining Results" );
	assert_eq!( lines[ 1 ], "# Execution Time: 42 ms" );
	assert!( lines[ 2 ].starts_with( "# Timestamp: " ));
	assert_eq!( lines[ 3 ], "" );
	assert_eq!( lines[ 4 ], "1,{apple, zebra},12.500000,20.000000,true" );
    }

    #[test]
    fn synergy_files_resolve_item_names() {
	let mut db = Database::new();
	let printer = db.intern( "printer" );
	let ink = db.intern( "ink" );

	let dir = tempfile::tempdir().expect( "temp dir" );
	let path = dir.path().join( "synergies.json" );
	fs::write(
	    &path,
	    r#"{ "synergies": [
		{ "items": ["printer", "ink"], "bonus": 5.0 },
		{ "items": ["printer", "unknown"], "bonus": 9.0 }
	    ] }"#,
	).expect( "write synergies" );

	let table = read_synergies( path.to_str().unwrap(), &db ).expect( "load" );
	assert_eq!( table.len(), 1 );
	assert_eq!( table.bonus_for( &Itemset::from_items( &[ printer, ink ] )), 5.0 );
    }

    #[test]
    fn sample_database_is_deterministic() {
	let first = sample_database( 42 );
	let second = sample_database( 42 );
	assert_eq!( first.len(), 1000 );
	assert_eq!( first.item_count(), 13 );
	for (left, right) in first.transactions().iter().zip( second.transactions() ) {
	    assert_eq!( left.existence_probability(), right.existence_probability() );
	    assert_eq!( left.len(), right.len() );
	}
	for transaction in first.transactions() {
	    assert!( (3 ..= 8).contains( &transaction.len() ));
	}
    }
}
