//! The lookup database: writing it while networks come in, and reading
//! it back for queries.
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs::File;
use std::io;
use std::io::{BufReader, Read, Write};
use std::iter::FromIterator;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use intervaltree::{Element, IntervalTree};
use ipnet::IpNet;
use crate::hierarchy::CountryChain;
use crate::ip::{IpAddress, IpRange, IpRangeError};


//------------ OrgCountryCodes ----------------------------------------------

/// The data stored for every network.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct OrgCountryCodes {
    org_country_codes: CountryChain
}

impl OrgCountryCodes {
    pub fn new(chain: CountryChain) -> Self {
        OrgCountryCodes { org_country_codes: chain }
    }

    pub fn chain(&self) -> &CountryChain { &self.org_country_codes }
}


//------------ Encoder ------------------------------------------------------

/// Receives networks and their data, and writes the final database.
pub trait Encoder {
    /// Stores `data` for all of `net`. Data previously stored for any part
    /// of `net` is replaced, not merged.
    fn insert(&mut self, net: IpNet, data: OrgCountryCodes) -> Result<(), EncodeError>;

    fn serialize(&self, target: &mut dyn Write) -> Result<(), EncodeError>;
}


//------------ RangeDb ------------------------------------------------------

/// An encoder that keeps disjoint address ranges, IPv4 aliased into the
/// IPv6 space as ::ffff:a.b.c.d.
#[derive(Debug)]
pub struct RangeDb {
    database_type: String,
    entries: BTreeMap<u128, (IpRange, Arc<OrgCountryCodes>)>
}

impl RangeDb {
    pub fn new(database_type: impl Into<String>) -> Self {
        RangeDb { database_type: database_type.into(), entries: BTreeMap::new() }
    }

    pub fn database_type(&self) -> &str { &self.database_type }

    /// Number of disjoint ranges currently held.
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Returns the data stored for the address, if any.
    pub fn get(&self, addr: IpAddr) -> Option<&OrgCountryCodes> {
        let addr = IpAddress::from(addr);
        self.entries
            .range(..=addr.value())
            .next_back()
            .filter(|(_, (range, _))| range.contains(addr))
            .map(|(_, (_, data))| data.as_ref())
    }

    fn overlapping(&self, range: &IpRange) -> Vec<u128> {
        self.entries
            .range(..=range.max().value())
            .rev()
            .take_while(|(_, (existing, _))| existing.overlaps(range))
            .map(|(key, _)| *key)
            .collect()
    }

    fn put(&mut self, range: IpRange, data: Arc<OrgCountryCodes>) {
        self.entries.insert(range.min().value(), (range, data));
    }
}

impl Encoder for RangeDb {
    fn insert(&mut self, net: IpNet, data: OrgCountryCodes) -> Result<(), EncodeError> {
        let range = IpRange::from(&net);
        if let IpNet::V6(_) = net {
            if range.overlaps(&IpRange::ipv4_alias()) {
                return Err(EncodeError::AliasedNetwork(net.to_string()))
            }
        }

        for key in self.overlapping(&range) {
            if let Some((existing, old)) = self.entries.remove(&key) {
                let (before, after) = existing.remainders(&range);
                if let Some(before) = before {
                    self.put(before, old.clone());
                }
                if let Some(after) = after {
                    self.put(after, old);
                }
            }
        }

        self.put(range, Arc::new(data));
        Ok(())
    }

    fn serialize(&self, target: &mut dyn Write) -> Result<(), EncodeError> {
        let mut entries = vec![];
        for (range, data) in self.entries.values() {
            for network in range.prefixes()? {
                entries.push(DbEntry { network, data: data.clone() });
            }
        }

        let file = DbFile {
            database_type: self.database_type.clone(),
            entries
        };
        serde_json::to_writer(&mut *target, &file)?;
        target.flush()?;

        debug!(
            database_type = %self.database_type,
            networks = file.entries.len(),
            "database serialized"
        );
        Ok(())
    }
}


//------------ DbFile -------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct DbFile {
    database_type: String,
    entries: Vec<DbEntry>
}

#[derive(Debug, Serialize, Deserialize)]
struct DbEntry {
    network: IpNet,
    data: Arc<OrgCountryCodes>
}


//------------ LookupDb -----------------------------------------------------

/// Interval end points. `Top` is one past the highest address, which does
/// not fit in a u128.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum Key {
    Addr(u128),
    Top
}

/// A serialized database loaded for queries.
pub struct LookupDb {
    database_type: String,
    tree: IntervalTree<Key, (IpNet, Arc<OrgCountryCodes>)>,
    len: usize
}

impl LookupDb {
    pub fn from_file(path: &Path) -> Result<Self, EncodeError> {
        let file = File::open(path).map_err(|e| EncodeError::read_error(path, e))?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, EncodeError> {
        let file: DbFile = serde_json::from_reader(reader)?;
        let len = file.entries.len();

        let elements = file.entries.into_iter().map(|entry| {
            let range = IpRange::from(&entry.network);
            let end = match range.max().value().checked_add(1) {
                Some(value) => Key::Addr(value),
                None => Key::Top
            };
            Element {
                range: Key::Addr(range.min().value())..end,
                value: (entry.network, entry.data)
            }
        });

        Ok(LookupDb {
            database_type: file.database_type,
            tree: IntervalTree::from_iter(elements),
            len
        })
    }

    pub fn database_type(&self) -> &str { &self.database_type }

    /// Number of networks in the database.
    pub fn len(&self) -> usize { self.len }
    pub fn is_empty(&self) -> bool { self.len == 0 }

    /// Returns the data of the most specific network holding `addr`.
    pub fn lookup(&self, addr: IpAddr) -> Option<&OrgCountryCodes> {
        let key = Key::Addr(IpAddress::from(addr).value());
        self.tree
            .query_point(key)
            .min_by_key(|el| {
                let (net, _) = &el.value;
                net.max_prefix_len() - net.prefix_len()
            })
            .map(|el| el.value.1.as_ref())
    }
}


//------------ EncodeError --------------------------------------------------

#[derive(Debug, Display)]
pub enum EncodeError {
    #[display(fmt = "Cannot insert into aliased network: {}", _0)]
    AliasedNetwork(String),

    #[display(fmt = "Cannot read file: {}", _0)]
    CannotRead(String),

    #[display(fmt = "{}", _0)]
    IoError(io::Error),

    #[display(fmt = "{}", _0)]
    JsonError(serde_json::Error),

    #[display(fmt = "{}", _0)]
    RangeError(IpRangeError),
}

impl EncodeError {
    fn read_error(path: &Path, e: impl Display) -> Self {
        EncodeError::CannotRead(format!("{}: {}", path.to_string_lossy(), e))
    }
}

impl From<io::Error> for EncodeError {
    fn from(e: io::Error) -> Self { EncodeError::IoError(e) }
}

impl From<serde_json::Error> for EncodeError {
    fn from(e: serde_json::Error) -> Self { EncodeError::JsonError(e) }
}

impl From<IpRangeError> for EncodeError {
    fn from(e: IpRangeError) -> Self { EncodeError::RangeError(e) }
}


//------------ Tests --------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn data(codes: &[&str]) -> OrgCountryCodes {
        let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
        OrgCountryCodes::new(CountryChain::from(codes))
    }

    fn net(s: &str) -> IpNet { IpNet::from_str(s).unwrap() }
    fn addr(s: &str) -> IpAddr { IpAddr::from_str(s).unwrap() }

    fn round_trip(db: &RangeDb) -> LookupDb {
        let mut out = vec![];
        db.serialize(&mut out).unwrap();
        LookupDb::from_reader(out.as_slice()).unwrap()
    }

    #[test]
    fn should_replace_overlapping_data() {
        let mut db = RangeDb::new("test");
        db.insert(net("10.0.0.0/8"), data(&["us"])).unwrap();
        db.insert(net("10.1.0.0/16"), data(&["us", "ca"])).unwrap();

        assert_eq!(Some(&data(&["us", "ca"])), db.get(addr("10.1.2.3")));
        assert_eq!(Some(&data(&["us"])), db.get(addr("10.0.0.1")));
        assert_eq!(Some(&data(&["us"])), db.get(addr("10.2.0.1")));
        assert_eq!(None, db.get(addr("11.0.0.1")));
        assert_eq!(3, db.len());

        // a covering network replaces everything it covers
        db.insert(net("10.0.0.0/8"), data(&["mx"])).unwrap();
        assert_eq!(1, db.len());
        assert_eq!(Some(&data(&["mx"])), db.get(addr("10.1.2.3")));
    }

    #[test]
    fn should_keep_families_apart() {
        let mut db = RangeDb::new("test");
        db.insert(net("0.0.0.0/0"), data(&["v4"])).unwrap();
        db.insert(net("2001:db8::/32"), data(&["v6"])).unwrap();

        assert_eq!(Some(&data(&["v4"])), db.get(addr("1.2.3.4")));
        assert_eq!(Some(&data(&["v6"])), db.get(addr("2001:db8::1")));
        assert_eq!(None, db.get(addr("2001:db9::1")));
    }

    #[test]
    fn should_reject_aliased_network() {
        let mut db = RangeDb::new("test");
        assert!(db.insert(net("::ffff:10.0.0.0/104"), data(&[])).is_err());
        assert!(db.insert(net("::/0"), data(&[])).is_err());
        assert!(db.is_empty());
    }

    #[test]
    fn should_serialize_prefixes() {
        let mut db = RangeDb::new("arin-whois");
        db.insert(net("10.0.0.0/8"), data(&["us"])).unwrap();
        db.insert(net("10.128.0.0/9"), data(&["ca"])).unwrap();
        db.insert(net("10.0.0.0/9"), data(&["us", ""])).unwrap();

        let mut out = vec![];
        db.serialize(&mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!("arin-whois", json["database_type"]);
        let entries = json["entries"].as_array().unwrap();
        assert_eq!(2, entries.len());
        assert_eq!("10.0.0.0/9", entries[0]["network"]);
        assert_eq!(
            serde_json::json!({"org_country_codes": ["us", ""]}),
            entries[0]["data"]
        );
        assert_eq!("10.128.0.0/9", entries[1]["network"]);
    }

    #[test]
    fn should_split_remainders_into_prefixes() {
        let mut db = RangeDb::new("test");
        db.insert(net("10.0.0.0/24"), data(&["us"])).unwrap();
        db.insert(net("10.0.0.64/26"), data(&["ca"])).unwrap();

        let lookup = round_trip(&db);
        // 10.0.0.0/26, 10.0.0.64/26, 10.0.0.128/25
        assert_eq!(3, lookup.len());
        assert_eq!(Some(&data(&["us"])), lookup.lookup(addr("10.0.0.1")));
        assert_eq!(Some(&data(&["ca"])), lookup.lookup(addr("10.0.0.100")));
        assert_eq!(Some(&data(&["us"])), lookup.lookup(addr("10.0.0.200")));
        assert_eq!(None, lookup.lookup(addr("10.0.1.0")));
    }

    #[test]
    fn should_lookup_top_of_address_space() {
        let mut db = RangeDb::new("test");
        db.insert(net("ff00::/8"), data(&["zz"])).unwrap();
        let lookup = round_trip(&db);
        assert_eq!(
            Some(&data(&["zz"])),
            lookup.lookup(addr("ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff"))
        );
    }

    #[test]
    fn should_prefer_most_specific_on_load() {
        let json = r#"{"database_type": "hand-made", "entries": [
            {"network": "10.0.0.0/8", "data": {"org_country_codes": ["us"]}},
            {"network": "10.1.0.0/16", "data": {"org_country_codes": ["ca"]}}
        ]}"#;
        let lookup = LookupDb::from_reader(json.as_bytes()).unwrap();
        assert_eq!("hand-made", lookup.database_type());
        assert_eq!(Some(&data(&["ca"])), lookup.lookup(addr("10.1.0.1")));
        assert_eq!(Some(&data(&["us"])), lookup.lookup(addr("10.2.0.1")));
    }

    #[test]
    fn should_fail_on_bad_database() {
        assert!(LookupDb::from_reader(&b"{\"entries\": 1}"[..]).is_err());
        assert!(LookupDb::from_file(Path::new("test/missing.json")).is_err());
    }
}
