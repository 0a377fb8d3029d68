//! Networks from the bulk WHOIS export, and loading them into the lookup
//! database.
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;
use ipnet::IpNet;
use crate::address;
use crate::db::{Encoder, OrgCountryCodes};
use crate::hierarchy::CountryChain;
use crate::orgs::{OrgRegistry, CONTAINER};
use crate::stream;
use crate::stream::Element;
use crate::stream::RecordSource;

pub const NET_RECORD: &str = "net";


//------------ NetBlock -----------------------------------------------------

/// One block of a network, as found in the export. Nothing is parsed
/// yet, a bad block is only noticed when its CIDR is formed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetBlock {
    start: String,
    length: String
}

impl NetBlock {
    pub fn new(start: &str, length: &str) -> Self {
        NetBlock { start: start.to_string(), length: length.to_string() }
    }

    pub fn start(&self) -> &str { &self.start }
    pub fn length(&self) -> &str { &self.length }

    /// Returns the block as a network, with host bits cleared, e.g.
    /// 192.168.1.1/24 gives 192.168.1.0/24.
    pub fn to_net(&self) -> Result<IpNet, BlockError> {
        let cidr = format!("{}/{}", address::normalize(&self.start), self.length.trim());
        IpNet::from_str(&cidr)
            .map(|net| net.trunc())
            .map_err(|_| BlockError(cidr))
    }
}

impl From<&Element> for NetBlock {
    /// ARIN calls the prefix length `cidrLenth`, `cidrLength` is accepted
    /// as well.
    fn from(el: &Element) -> Self {
        let start = el.child_text("startAddress").unwrap_or("").to_string();
        let length = el.child_text("cidrLenth")
            .or_else(|| el.child_text("cidrLength"))
            .unwrap_or("")
            .to_string();
        NetBlock { start, length }
    }
}


//------------ NetRecord ----------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetRecord {
    org_handle: String,
    blocks: Vec<NetBlock>
}

impl NetRecord {
    pub fn new(org_handle: &str, blocks: Vec<NetBlock>) -> Self {
        NetRecord { org_handle: org_handle.to_string(), blocks }
    }

    pub fn org_handle(&self) -> &str { &self.org_handle }
    pub fn blocks(&self) -> &[NetBlock] { &self.blocks }
}

impl TryFrom<&Element> for NetRecord {
    type Error = Error;

    /// Expects a `<net>` element with `orgHandle` and
    /// `netBlocks/netBlock` children. A net without an owner is kept, it
    /// just resolves to no countries.
    fn try_from(el: &Element) -> Result<Self, Self::Error> {
        let org_handle = el.child_text("orgHandle").unwrap_or("");
        let blocks = match el.child("netBlocks") {
            Some(list) => list.children("netBlock").map(NetBlock::from).collect(),
            None => vec![]
        };
        Ok(NetRecord::new(org_handle, blocks))
    }
}


//------------ IngestStats --------------------------------------------------

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct IngestStats {
    nets: usize,
    inserted: usize,
    skipped: usize,
    failed: usize
}

impl IngestStats {
    /// Networks read.
    pub fn nets(&self) -> usize { self.nets }

    /// Blocks handed to the encoder successfully.
    pub fn inserted(&self) -> usize { self.inserted }

    /// Blocks that did not form a valid CIDR.
    pub fn skipped(&self) -> usize { self.skipped }

    /// Blocks the encoder refused.
    pub fn failed(&self) -> usize { self.failed }
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Nets: {}, Inserted: {}, Skipped: {}, Failed: {}",
            self.nets,
            self.inserted,
            self.skipped,
            self.failed
        )
    }
}


//------------ NetIngest ----------------------------------------------------

/// Second pass: feeds every network block to an encoder, with the
/// countries of its owning organization's ancestry.
pub struct NetIngest<'a, E: Encoder> {
    registry: &'a OrgRegistry,
    encoder: &'a mut E,
    stats: IngestStats
}

impl<'a, E: Encoder> NetIngest<'a, E> {
    pub fn new(registry: &'a OrgRegistry, encoder: &'a mut E) -> Self {
        NetIngest { registry, encoder, stats: IngestStats::default() }
    }

    pub fn stats(&self) -> &IngestStats { &self.stats }

    /// Reads all `<net>` records from a fresh read of the source.
    pub fn run(
        registry: &'a OrgRegistry,
        encoder: &'a mut E,
        source: &RecordSource
    ) -> Result<IngestStats, Error> {
        let mut ingest = NetIngest::new(registry, encoder);
        let mut reader = source.open()?;

        reader.for_each(CONTAINER, NET_RECORD, |el| {
            ingest.add_net(&NetRecord::try_from(&el)?);
            Ok::<(), Error>(())
        })?;

        info!(records = reader.scanned(), stats = %ingest.stats, "networks loaded");
        Ok(ingest.stats)
    }

    /// Inserts all blocks of the net. Blocks that cannot be inserted are
    /// logged and counted, they never stop the run.
    pub fn add_net(&mut self, net: &NetRecord) {
        self.stats.nets += 1;
        let chain = CountryChain::resolve(self.registry, net.org_handle());

        for block in net.blocks() {
            let ipnet = match block.to_net() {
                Ok(ipnet) => ipnet,
                Err(e) => {
                    warn!(org = net.org_handle(), "Invalid net block, skipping: {}", e);
                    self.stats.skipped += 1;
                    continue
                }
            };

            let data = OrgCountryCodes::new(chain.clone());
            match self.encoder.insert(ipnet, data) {
                Ok(()) => self.stats.inserted += 1,
                Err(e) => {
                    warn!(org = net.org_handle(), net = %ipnet, "Failed to insert, skipping: {}", e);
                    self.stats.failed += 1;
                }
            }
        }
    }
}


//------------ Error --------------------------------------------------------

/// A block that does not make a valid CIDR, holds the CIDR as formed.
#[derive(Debug, Display)]
#[display(fmt = "invalid cidr: {}", _0)]
pub struct BlockError(String);

#[derive(Debug, Display)]
pub enum Error {
    #[display(fmt = "{}", _0)]
    StreamError(stream::Error),
}

impl From<stream::Error> for Error {
    fn from(e: stream::Error) -> Self { Error::StreamError(e) }
}


//------------ Tests --------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;
    use crate::db::RangeDb;
    use crate::orgs::OrgRecord;

    fn registry() -> OrgRegistry {
        vec![
            OrgRecord::new("A", "", "US"),
            OrgRecord::new("B", "A", ""),
            OrgRecord::new("C", "B", "CA"),
        ].into_iter().collect()
    }

    fn codes(db: &RangeDb, addr: &str) -> Option<Vec<String>> {
        db.get(IpAddr::from_str(addr).unwrap())
            .map(|data| data.chain().codes().to_vec())
    }

    fn strings(codes: &[&str]) -> Option<Vec<String>> {
        Some(codes.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn should_form_cidr() {
        let block = NetBlock::new("192.168.001.001", "24");
        assert_eq!("192.168.1.0/24", block.to_net().unwrap().to_string());

        let block = NetBlock::new("2001:0DB8:0000:0000:0000:0000:0000:0000", "32");
        assert_eq!("2001:db8::/32", block.to_net().unwrap().to_string());

        assert!(NetBlock::new("10.0.0.0", "40").to_net().is_err());
        assert!(NetBlock::new("2001:db8::", "129").to_net().is_err());
        assert!(NetBlock::new("10.0.0.0", "").to_net().is_err());
        assert!(NetBlock::new("2001:db8::0", "32").to_net().is_err());
    }

    #[test]
    fn should_decode_net_element() {
        let mut el = None;
        let doc = "<bulkwhois><net>\
            <orgHandle>C</orgHandle>\
            <netBlocks>\
              <netBlock><cidrLenth>24</cidrLenth><startAddress>192.168.001.000</startAddress>\
                <endAddress>192.168.001.255</endAddress></netBlock>\
              <netBlock><cidrLength>16</cidrLength><startAddress>10.0.0.0</startAddress></netBlock>\
            </netBlocks>\
          </net></bulkwhois>";
        stream::RecordReader::from_reader(doc.as_bytes())
            .for_each(CONTAINER, NET_RECORD, |e| { el = Some(e); Ok::<(), stream::Error>(()) })
            .unwrap();

        let net = NetRecord::try_from(&el.unwrap()).unwrap();
        assert_eq!("C", net.org_handle());
        assert_eq!(2, net.blocks().len());
        assert_eq!("192.168.001.000", net.blocks()[0].start());
        assert_eq!("24", net.blocks()[0].length());
        assert_eq!("16", net.blocks()[1].length());
    }

    #[test]
    fn should_attach_country_chain() {
        let registry = registry();
        let mut db = RangeDb::new("test");
        let mut ingest = NetIngest::new(&registry, &mut db);

        ingest.add_net(&NetRecord::new("C", vec![NetBlock::new("192.168.1.1", "24")]));
        ingest.add_net(&NetRecord::new("UNKNOWN", vec![NetBlock::new("10.0.0.0", "8")]));
        assert_eq!(2, ingest.stats().inserted());

        assert_eq!(strings(&["us", "", "ca"]), codes(&db, "192.168.1.0"));
        assert_eq!(strings(&["us", "", "ca"]), codes(&db, "192.168.1.255"));
        assert_eq!(strings(&[]), codes(&db, "10.1.1.1"));
        assert_eq!(None, codes(&db, "192.168.2.0"));
    }

    #[test]
    fn should_skip_bad_blocks_and_continue() {
        let registry = registry();
        let mut db = RangeDb::new("test");
        let mut ingest = NetIngest::new(&registry, &mut db);

        ingest.add_net(&NetRecord::new("A", vec![
            NetBlock::new("10.0.0.0", "40"),
            NetBlock::new("::ffff:10.0.0.0", "104"),
            NetBlock::new("10.0.0.0", "8"),
        ]));
        ingest.add_net(&NetRecord::new("B", vec![NetBlock::new("11.0.0.0", "8")]));

        let stats = ingest.stats().clone();
        assert_eq!(2, stats.nets());
        assert_eq!(2, stats.inserted());
        assert_eq!(1, stats.skipped());
        assert_eq!(1, stats.failed());
        assert_eq!(strings(&["us"]), codes(&db, "10.0.0.1"));
        assert_eq!(strings(&["us", ""]), codes(&db, "11.0.0.1"));
    }

    #[test]
    fn should_skip_out_of_range_octets() {
        let registry = registry();
        let mut db = RangeDb::new("test");
        let mut ingest = NetIngest::new(&registry, &mut db);

        ingest.add_net(&NetRecord::new("A", vec![NetBlock::new("000.001.002.000", "24")]));
        ingest.add_net(&NetRecord::new("C", vec![NetBlock::new("300.001.002.000", "24")]));

        let stats = ingest.stats().clone();
        assert_eq!(2, stats.nets());
        assert_eq!(1, stats.inserted());
        assert_eq!(1, stats.skipped());
        assert_eq!(strings(&["us"]), codes(&db, "0.1.2.5"));
    }

    #[test]
    fn should_replace_earlier_blocks() {
        let registry = registry();
        let mut db = RangeDb::new("test");
        let mut ingest = NetIngest::new(&registry, &mut db);

        ingest.add_net(&NetRecord::new("A", vec![NetBlock::new("10.0.0.0", "8")]));
        ingest.add_net(&NetRecord::new("C", vec![NetBlock::new("10.1.0.0", "16")]));

        assert_eq!(strings(&["us", "", "ca"]), codes(&db, "10.1.0.1"));
        assert_eq!(strings(&["us"]), codes(&db, "10.2.0.1"));
    }

    #[test]
    fn should_read_from_file() {
        let source = RecordSource::new("test/bulkwhois.xml");
        let registry = OrgRegistry::from_source(&source).unwrap();
        let mut db = RangeDb::new("test");

        let stats = NetIngest::run(&registry, &mut db, &source).unwrap();
        assert_eq!(5, stats.nets());
        assert_eq!(5, stats.inserted());
        assert_eq!(1, stats.skipped());
        assert_eq!(0, stats.failed());

        assert_eq!(strings(&["us", "", "ca"]), codes(&db, "192.168.1.77"));
        assert_eq!(strings(&["mx"]), codes(&db, "2001:db8::1"));
        assert_eq!(strings(&[]), codes(&db, "203.0.113.9"));
        assert_eq!(strings(&["us"]), codes(&db, "198.51.100.1"));
    }
}
