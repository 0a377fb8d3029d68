//! Build a lookup database from a bulk WHOIS export.
use std::fmt;
use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use clap::ArgMatches;
use crate::db::{EncodeError, Encoder, RangeDb};
use crate::nets;
use crate::nets::{IngestStats, NetIngest};
use crate::orgs;
use crate::orgs::OrgRegistry;
use crate::stream::RecordSource;

pub const DEFAULT_DATABASE_TYPE: &str = "arin-whois";


//------------ BuildOpts ----------------------------------------------------

/// Options for the BuildReport
pub struct BuildOpts {
    input: PathBuf,
    output: PathBuf,
    database_type: String
}

impl BuildOpts {
    pub fn new(input: &Path, output: &Path, database_type: &str) -> Self {
        BuildOpts {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            database_type: database_type.to_string()
        }
    }

    pub fn parse(matches: &ArgMatches) -> Result<Self, Error> {
        let input = matches.value_of("input")
            .ok_or_else(|| Error::msg("No input file given"))?;

        let output = matches.value_of("output")
            .ok_or_else(|| Error::msg("No output file given"))?;

        let database_type = matches.value_of("type").unwrap_or(DEFAULT_DATABASE_TYPE);

        Ok(BuildOpts::new(Path::new(input), Path::new(output), database_type))
    }
}


//------------ BuildResult --------------------------------------------------

#[derive(Clone, Debug, Serialize)]
pub struct BuildResult {
    orgs: usize,
    networks: usize,
    ingest: IngestStats
}

impl BuildResult {
    pub fn orgs(&self) -> usize { self.orgs }

    /// Number of disjoint ranges in the database.
    pub fn networks(&self) -> usize { self.networks }

    pub fn ingest(&self) -> &IngestStats { &self.ingest }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Orgs: {}, Ranges: {}, {}", self.orgs, self.networks, self.ingest)
    }
}


//------------ BuildReport --------------------------------------------------

/// Runs both passes over the input, then writes the database. The output
/// is written next to its final location and moved there once complete,
/// so a failed run leaves no partial database behind.
pub struct BuildReport;

impl BuildReport {
    pub fn execute(options: &BuildOpts) -> Result<BuildResult, Error> {
        let source = RecordSource::new(&options.input);

        info!(input = %options.input.display(), "pass 1: reading organizations");
        let registry = OrgRegistry::from_source(&source)?;

        info!(input = %options.input.display(), "pass 2: reading networks");
        let mut db = RangeDb::new(options.database_type.as_str());
        let ingest = NetIngest::run(&registry, &mut db, &source)?;

        Self::write(&db, &options.output)?;

        let res = BuildResult { orgs: registry.len(), networks: db.len(), ingest };
        info!(output = %options.output.display(), "{}", res);
        Ok(res)
    }

    fn write(db: &RangeDb, output: &Path) -> Result<(), Error> {
        let mut tmp = output.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let file = File::create(&tmp).map_err(|e| Error::write_error(&tmp, e))?;
        let mut writer = BufWriter::new(file);
        if let Err(e) = db.serialize(&mut writer) {
            drop(writer);
            let _ = fs::remove_file(&tmp);
            return Err(Error::EncodeError(e))
        }
        drop(writer);

        fs::rename(&tmp, output).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::write_error(output, e)
        })
    }
}


//------------ Error --------------------------------------------------------

#[derive(Debug, Display)]
pub enum Error {
    #[display(fmt = "{}", _0)]
    WithMessage(String),

    #[display(fmt = "Cannot write file: {}", _0)]
    CannotWrite(String),

    #[display(fmt = "{}", _0)]
    OrgsError(orgs::Error),

    #[display(fmt = "{}", _0)]
    NetsError(nets::Error),

    #[display(fmt = "{}", _0)]
    EncodeError(EncodeError),
}

impl Error {
    pub fn msg(s: &str) -> Self {
        Error::WithMessage(s.to_string())
    }

    fn write_error(path: &Path, e: impl fmt::Display) -> Self {
        Error::CannotWrite(format!("{}: {}", path.to_string_lossy(), e))
    }
}

impl From<orgs::Error> for Error {
    fn from(e: orgs::Error) -> Self { Error::OrgsError(e) }
}

impl From<nets::Error> for Error {
    fn from(e: nets::Error) -> Self { Error::NetsError(e) }
}

impl From<EncodeError> for Error {
    fn from(e: EncodeError) -> Self { Error::EncodeError(e) }
}


//------------ Tests --------------------------------------------------------
