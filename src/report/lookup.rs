use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use clap::ArgMatches;
use crate::db::{EncodeError, LookupDb, OrgCountryCodes};


//------------ LookupOpts ---------------------------------------------------

pub struct LookupOpts {
    database: PathBuf,
    addresses: Vec<IpAddr>,
    format: ReportFormat
}

impl LookupOpts {
    pub fn new(database: &Path, addresses: Vec<IpAddr>, format: ReportFormat) -> Self {
        LookupOpts { database: database.to_path_buf(), addresses, format }
    }

    pub fn parse(matches: &ArgMatches) -> Result<Self, Error> {
        let database = matches.value_of("database")
            .ok_or_else(|| Error::msg("No database file given"))?;

        let addresses = matches.value_of("address")
            .ok_or_else(|| Error::msg("No address given"))?;
        let addresses = Self::parse_addresses(addresses)?;

        let format = {
            if let Some(format) = matches.value_of("format") {
                match format {
                    "json" => ReportFormat::Json,
                    "text" => ReportFormat::Text,
                    f => return Err(Error::WithMessage(
                        format!("Unsupported format: {}. Supported are: json|text", f)))
                }
            } else {
                ReportFormat::Json
            }
        };

        Ok(LookupOpts::new(Path::new(database), addresses, format))
    }

    /// Expects comma separated addresses, whitespace is ignored.
    fn parse_addresses(s: &str) -> Result<Vec<IpAddr>, Error> {
        let line = s.replace(" ", "");
        line.split(',')
            .filter(|el| !el.is_empty())
            .map(|el| IpAddr::from_str(el)
                .map_err(|_| Error::WithMessage(format!("Not an IP address: {}", el))))
            .collect()
    }
}

pub enum ReportFormat {
    Json,
    Text
}


//------------ LookupResult -------------------------------------------------

#[derive(Clone, Debug, Serialize)]
pub struct LookupResult {
    address: IpAddr,
    data: Option<OrgCountryCodes>
}

impl LookupResult {
    pub fn address(&self) -> IpAddr { self.address }
    pub fn data(&self) -> Option<&OrgCountryCodes> { self.data.as_ref() }
}

impl fmt::Display for LookupResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.data {
            Some(data) => {
                write!(f, "{}: [{}]", self.address, data.chain().codes().join(", "))
            }
            None => write!(f, "{}: not found", self.address)
        }
    }
}


//------------ LookupReport -------------------------------------------------

pub struct LookupReport;

impl LookupReport {
    pub fn execute(options: &LookupOpts) -> Result<Vec<LookupResult>, Error> {
        let db = LookupDb::from_file(&options.database)?;

        let res: Vec<LookupResult> = options.addresses.iter().map(|addr| {
            LookupResult { address: *addr, data: db.lookup(*addr).cloned() }
        }).collect();

        match options.format {
            ReportFormat::Json => {
                println!("{}", serde_json::to_string(&res)?);
            },
            ReportFormat::Text => {
                for r in &res {
                    println!("{}", r);
                }
            }
        }

        Ok(res)
    }
}


//------------ Error --------------------------------------------------------

#[derive(Debug, Display)]
pub enum Error {
    #[display(fmt = "{}", _0)]
    WithMessage(String),

    #[display(fmt = "{}", _0)]
    EncodeError(EncodeError),

    #[display(fmt = "{}", _0)]
    JsonError(serde_json::Error),
}

impl Error {
    pub fn msg(s: &str) -> Self {
        Error::WithMessage(s.to_string())
    }
}

impl From<EncodeError> for Error {
    fn from(e: EncodeError) -> Self { Error::EncodeError(e) }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self { Error::JsonError(e) }
}


//------------ Tests --------------------------------------------------------
