//! Resolve the chain of country codes along an organization's ancestry.
use std::collections::HashSet;
use crate::orgs::OrgRegistry;


//------------ CountryChain -------------------------------------------------

/// Lowercase country codes from the top-most parent organization down to
/// the organization that holds a network. Organizations without a country
/// code contribute an empty string, so the length is the depth of the
/// ancestry that could be resolved.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountryChain(Vec<String>);

impl CountryChain {
    /// Walks up from `handle` until an organization has no parent or the
    /// parent is not known. An unknown `handle` gives an empty chain.
    ///
    /// The ancestry is expected to be acyclic. Should a handle show up a
    /// second time the walk stops there.
    pub fn resolve(registry: &OrgRegistry, handle: &str) -> Self {
        let mut codes = vec![];
        let mut visited = HashSet::new();
        let mut cursor = Some(handle);

        while let Some(current) = cursor {
            if !visited.insert(current) {
                warn!(handle, cycle_at = current, "cycle in parent organizations");
                break
            }
            let org = match registry.get(current) {
                Some(org) => org,
                None => break
            };
            codes.push(org.cc().to_lowercase());
            cursor = org.parent();
        }

        codes.reverse();
        CountryChain(codes)
    }

    pub fn codes(&self) -> &[String] { &self.0 }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl From<Vec<String>> for CountryChain {
    fn from(codes: Vec<String>) -> Self { CountryChain(codes) }
}


//------------ Tests --------------------------------------------------------
