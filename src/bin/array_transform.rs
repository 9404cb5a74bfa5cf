use std::path::PathBuf;

use argh::FromArgs;

use dpt::comm::{self, Communicator};
use dpt::index::Uint40;
use dpt::io::{distribute_index_file, write_shared};

/// Transform 64 bit arrays to 40 bit arrays.
#[derive(FromArgs)]
struct Args {
    /// the file containing the array
    #[argh(positional)]
    file: PathBuf,

    /// number of processing elements (worker threads)
    #[argh(option, short = 'p', default = "1")]
    pes: usize,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args: Args = argh::from_env();
    if args.pes == 0 {
        eprintln!("-p, --pes must be at least 1");
        std::process::exit(-1);
    }
    let results = comm::execute(args.pes, |comm| worker(comm, &args));
    if let Err(error) = results.into_iter().collect::<dpt::Result<Vec<()>>>() {
        eprintln!("{error}");
        std::process::exit(-1);
    }
}

fn worker(comm: Communicator, args: &Args) -> dpt::Result<()> {
    let slice = distribute_index_file::<u64>(&comm, &args.file)?;
    let narrow: Vec<Uint40> = slice.local().iter().map(|value| Uint40::new(*value)).collect();

    let mut name = args.file.clone().into_os_string();
    name.push("_40bit");
    write_shared(&comm, &narrow, &PathBuf::from(name))
}
