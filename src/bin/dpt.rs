use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use argh::FromArgs;

use dpt::comm::{self, Communicator};
use dpt::error::Error;
use dpt::facade::DistributedPatriciaTrie;
use dpt::index::{IndexType, Uint40};
use dpt::io::distribute_linewise;
use dpt::query::QueryBatch;
use dpt::request::Strategy;

const QUERY_SEPARATOR: u8 = 0;

#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
enum QueryMode {
    #[default]
    Existential,
    Counting,
    Enumeration,
}

impl FromStr for QueryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ex" => Ok(Self::Existential),
            "co" => Ok(Self::Counting),
            "en" => Ok(Self::Enumeration),
            _ => Err(format!("unknown query type: '{s}', valid types: 'ex', 'co', 'en'")),
        }
    }
}

/// dpt: distributed Patricia tries.
#[derive(FromArgs)]
struct Args {
    /// the suffix array
    #[argh(positional)]
    sa_file: PathBuf,

    /// the LCP array
    #[argh(positional)]
    lcp_file: PathBuf,

    /// the input text
    #[argh(positional)]
    text_file: PathBuf,

    /// the queries, one per line
    #[argh(option, short = 'q')]
    queries: Option<PathBuf>,

    /// initially have batches of size N queries at each PE
    #[argh(option, short = 'n')]
    number_of_queries_per_pe: Option<u64>,

    /// the type of query: [ex]istential queries (default), [co]unting
    /// queries, or [en]umeration queries
    #[argh(option, short = 't', default = "QueryMode::Existential")]
    query_type: QueryMode,

    /// number of processing elements (worker threads)
    #[argh(option, short = 'p', default = "1")]
    pes: usize,

    /// maximum query length in characters
    #[argh(option, short = 'm', default = "30")]
    max_query_length: u64,

    /// answer text requests with one-sided window reads instead of
    /// collective exchanges
    #[argh(switch)]
    one_sided: bool,

    /// use 64-bit array entries instead of the 40-bit default
    #[argh(switch)]
    wide: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args: Args = argh::from_env();
    let outcome = if args.wide { run::<u64>(&args) } else { run::<Uint40>(&args) };
    if let Err(error) = outcome {
        eprintln!("{error}");
        std::process::exit(-1);
    }
}

fn run<G: IndexType>(args: &Args) -> dpt::Result<()> {
    if args.pes == 0 {
        return Err(Error::InvalidArguments("-p, --pes must be at least 1".into()));
    }
    let results = comm::execute(args.pes, |comm| worker::<G>(comm, args));
    results.into_iter().collect::<dpt::Result<Vec<()>>>()?;
    Ok(())
}

fn worker<G: IndexType>(comm: Communicator, args: &Args) -> dpt::Result<()> {
    let strategy = if args.one_sided { Strategy::OneSided } else { Strategy::Collective };
    let mut trie = DistributedPatriciaTrie::<G>::new(
        &comm,
        &args.text_file,
        &args.sa_file,
        &args.lcp_file,
        args.max_query_length,
        strategy,
    )?;

    let start = Instant::now();
    trie.construct(&comm)?;
    if comm.is_root() {
        println!("CONSTRUCTION TIME: {}", start.elapsed().as_secs_f64());
    }

    if let Some(query_file) = &args.queries {
        let lines_per_pe = args.number_of_queries_per_pe.ok_or_else(|| {
            Error::InvalidArguments("-n, --number_of_queries_per_pe is required".into())
        })?;
        let lines = distribute_linewise(
            &comm,
            query_file,
            lines_per_pe,
            args.max_query_length as usize,
            QUERY_SEPARATOR,
        )?;
        let queries =
            QueryBatch::from_separated(&lines, QUERY_SEPARATOR, args.max_query_length as usize);

        let start = Instant::now();
        match args.query_type {
            QueryMode::Existential => {
                trie.existential_batched(&comm, &queries)?;
            }
            QueryMode::Counting => {
                trie.counting_batched(&comm, &queries)?;
            }
            QueryMode::Enumeration => {
                trie.enumeration_batched(&comm, &queries)?;
            }
        }
        if comm.is_root() {
            println!("QUERY TIME: {}", start.elapsed().as_secs_f64());
        }
    }
    Ok(())
}
