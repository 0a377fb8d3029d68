extern crate clap;
#[macro_use] extern crate derive_more;
extern crate arin_country_db;
extern crate tracing_subscriber;

use clap::App;
use clap::Arg;
use clap::SubCommand;
use tracing_subscriber::EnvFilter;
use arin_country_db::report::build::{self, BuildOpts, BuildReport};
use arin_country_db::report::lookup::{self, LookupOpts, LookupReport};


fn main() {
    init_logging();

    match Options::create() {
        Err(e) => {
            eprintln!("{}", e);
            ::std::process::exit(1);
        },
        Ok(option) => {
            let res = match option {
                Options::Build(opts) => {
                    BuildReport::execute(&opts)
                        .map(|_| ())
                        .map_err(Error::BuildError)
                }
                Options::Lookup(opts) => {
                    LookupReport::execute(&opts)
                        .map(|_| ())
                        .map_err(Error::LookupError)
                }
            };
            match res {
                Ok(()) => {},
                Err(e) => {
                    eprintln!("{}", e);
                    ::std::process::exit(1);
                }
            }
        }
    }
}

/// Logs go to stderr, at info unless RUST_LOG says otherwise.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(::std::io::stderr)
        .init();
}

enum Options {
    Build(BuildOpts),
    Lookup(LookupOpts)
}

impl Options {
    pub fn create() -> Result<Self, Error> {
        let matches = App::new("ARIN country database")
            .version(env!("CARGO_PKG_VERSION"))
            .subcommand(SubCommand::with_name("build")
                .about("Build an IP to organization country database from ARIN bulk WHOIS")
                .arg(Arg::with_name("input")
                    .short("i")
                    .long("input")
                    .value_name("FILE")
                    .help("Bulk WHOIS XML export, may be gzipped (.gz).")
                    .required(true))
                .arg(Arg::with_name("output")
                    .short("o")
                    .long("output")
                    .value_name("FILE")
                    .help("Database file to write.")
                    .required(true))
                .arg(Arg::with_name("type")
                    .short("t")
                    .long("type")
                    .value_name("NAME")
                    .help("Database type recorded in the output, defaults to arin-whois")
                    .required(false))
            )
            .subcommand(SubCommand::with_name("lookup")
                .about("Look up addresses in a database")
                .arg(Arg::with_name("database")
                    .short("d")
                    .long("database")
                    .value_name("FILE")
                    .help("Database file written by build.")
                    .required(true))
                .arg(Arg::with_name("address")
                    .short("a")
                    .long("address")
                    .value_name("comma separated addresses")
                    .help("Addresses to look up.")
                    .required(true))
                .arg(Arg::with_name("format")
                    .short("f")
                    .long("format")
                    .value_name("json | text")
                    .help("Specify output format, defaults to json")
                    .required(false))
            )
            .get_matches();

        if let Some(opts) = matches.subcommand_matches("build") {
            Ok(Options::Build(BuildOpts::parse(opts)?))
        } else if let Some(opts) = matches.subcommand_matches("lookup") {
            Ok(Options::Lookup(LookupOpts::parse(opts)?))
        } else {
            Err(Error::msg("No sub-command given. See --help for options."))
        }
    }
}


//------------ Error --------------------------------------------------------

#[derive(Debug, Display)]
pub enum Error {
    #[display(fmt = "{}", _0)]
    WithMessage(String),

    #[display(fmt="{}", _0)]
    BuildError(build::Error),

    #[display(fmt="{}", _0)]
    LookupError(lookup::Error),
}

impl Error {
    pub fn msg(s: &str) -> Self {
        Error::WithMessage(s.to_string())
    }
}

impl From<build::Error> for Error {
    fn from(e: build::Error) -> Self { Error::BuildError(e) }
}

impl From<lookup::Error> for Error {
    fn from(e: lookup::Error) -> Self { Error::LookupError(e) }
}
