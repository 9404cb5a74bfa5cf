use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use argh::FromArgs;

use dpt::error::Error;

/// Strip AOL-style query logs down to one query per line: every record loses
/// its leading user-id column and the three trailing click columns.
#[derive(FromArgs)]
struct Args {
    /// the tab-separated query log
    #[argh(positional)]
    log: PathBuf,

    /// where the cleaned queries are written
    #[argh(option, short = 'o', default = "PathBuf::from(\"aol_prepared.txt\")")]
    output: PathBuf,
}

fn main() {
    let args: Args = argh::from_env();
    if let Err(error) = run(&args) {
        eprintln!("{error}");
        std::process::exit(-1);
    }
}

fn run(args: &Args) -> dpt::Result<()> {
    let log = File::open(&args.log).map_err(|source| Error::io(&args.log, source))?;
    let out = File::create(&args.output).map_err(|source| Error::io(&args.output, source))?;
    let mut writer = BufWriter::new(out);

    for line in BufReader::new(log).lines() {
        let line = line.map_err(|source| Error::io(&args.log, source))?;
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() > 4 {
            let query = columns[1..columns.len() - 3].join(" ");
            writeln!(writer, "{query}").map_err(|source| Error::io(&args.output, source))?;
        }
    }
    writer.flush().map_err(|source| Error::io(&args.output, source))?;
    Ok(())
}
