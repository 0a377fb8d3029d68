//! Organizations from the bulk WHOIS export, keyed by handle.
use std::collections::HashMap;
use std::convert::TryFrom;
use std::iter::FromIterator;
use crate::stream;
use crate::stream::Element;
use crate::stream::RecordSource;

pub const CONTAINER: &str = "bulkwhois";
pub const ORG_RECORD: &str = "org";


//------------ OrgRecord ----------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrgRecord {
    handle: String,
    parent: String,
    cc: String
}

impl OrgRecord {
    pub fn new(
        handle: impl Into<String>,
        parent: impl Into<String>,
        cc: impl Into<String>
    ) -> Self {
        OrgRecord { handle: handle.into(), parent: parent.into(), cc: cc.into() }
    }

    pub fn handle(&self) -> &str { &self.handle }

    /// The parent organization's handle, `None` for a top-most one.
    pub fn parent(&self) -> Option<&str> {
        match self.parent.is_empty() {
            true => None,
            false => Some(&self.parent)
        }
    }

    /// Two letter country code as found in the export, may be empty.
    pub fn cc(&self) -> &str { &self.cc }
}

impl TryFrom<&Element> for OrgRecord {
    type Error = Error;

    /// Expects an `<org>` element, with `handle`, `parentOrgHandle` and
    /// `iso3166-1/code2` children. Only the handle is required.
    fn try_from(el: &Element) -> Result<Self, Self::Error> {
        let handle = el.child_text("handle").unwrap_or("");
        if handle.is_empty() {
            return Err(Error::MissingHandle)
        }
        let parent = el.child_text("parentOrgHandle").unwrap_or("");
        let cc = el.child_text("iso3166-1/code2").unwrap_or("");
        Ok(OrgRecord::new(handle, parent, cc))
    }
}


//------------ OrgRegistry --------------------------------------------------

/// All organizations of one export. Built once from the first pass over
/// the input and only read after that.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OrgRegistry {
    orgs: HashMap<String, OrgRecord>
}

impl OrgRegistry {
    pub fn empty() -> Self {
        OrgRegistry::default()
    }

    /// Reads every `<org>` record in the source. Any record that cannot
    /// be decoded fails the whole pass.
    pub fn from_source(source: &RecordSource) -> Result<Self, Error> {
        let mut reader = source.open()?;
        let mut registry = OrgRegistry::empty();

        let matched = reader.for_each(CONTAINER, ORG_RECORD, |el| {
            registry.insert(OrgRecord::try_from(&el)?);
            Ok::<(), Error>(())
        })?;

        info!(
            records = reader.scanned(),
            orgs = matched,
            handles = registry.len(),
            "organization registry complete"
        );
        Ok(registry)
    }

    /// Adds a record, replacing an earlier one with the same handle.
    pub fn insert(&mut self, org: OrgRecord) {
        self.orgs.insert(org.handle.clone(), org);
    }

    pub fn get(&self, handle: &str) -> Option<&OrgRecord> {
        self.orgs.get(handle)
    }

    pub fn len(&self) -> usize { self.orgs.len() }
    pub fn is_empty(&self) -> bool { self.orgs.is_empty() }
}

impl FromIterator<OrgRecord> for OrgRegistry {
    fn from_iter<I: IntoIterator<Item=OrgRecord>>(iter: I) -> Self {
        let mut registry = OrgRegistry::empty();
        for org in iter {
            registry.insert(org);
        }
        registry
    }
}


//------------ Error --------------------------------------------------------

#[derive(Debug, Display)]
pub enum Error {
    #[display(fmt = "{}", _0)]
    StreamError(stream::Error),

    #[display(fmt = "Organization record without handle")]
    MissingHandle,
}

impl From<stream::Error> for Error {
    fn from(e: stream::Error) -> Self { Error::StreamError(e) }
}


//------------ Tests --------------------------------------------------------
