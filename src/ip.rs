//! IP addresses and ranges in a single 128 bit space.
//!
//! IPv4 addresses are kept as IPv4-mapped IPv6 addresses, so that one
//! ordered structure can hold both families.
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use ipnet::{IpNet, Ipv4Net, Ipv6Net, PrefixLenError};

// Idea inspired by the IP implementation in Golang
const IPV4_IN_IPV6: u128 = 0xffff_0000_0000;
const IPV4_MASK: u128 = 0xffff_ffff_ffff_ffff_ffff_ffff_0000_0000;


//------------ IpAddress ----------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct IpAddress {
    value: u128
}

impl IpAddress {
    pub fn from_ipv4(addr: Ipv4Addr) -> Self {
        IpAddress { value: IPV4_IN_IPV6 | u32::from(addr) as u128 }
    }

    pub fn from_ipv6(addr: Ipv6Addr) -> Self {
        IpAddress { value: u128::from(addr) }
    }

    pub fn value(&self) -> u128 { self.value }
}

impl From<IpAddr> for IpAddress {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => IpAddress::from_ipv4(v4),
            IpAddr::V6(v6) => IpAddress::from_ipv6(v6)
        }
    }
}


//------------ IpRange ------------------------------------------------------

/// An inclusive range of addresses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IpRange {
    min: IpAddress,
    max: IpAddress,
}

impl IpRange {
    fn from_values(min: u128, max: u128) -> Self {
        IpRange { min: IpAddress { value: min }, max: IpAddress { value: max } }
    }

    pub fn min(&self) -> IpAddress { self.min }
    pub fn max(&self) -> IpAddress { self.max }

    /// The range of the IPv4 alias block, ::ffff:0:0/96.
    pub fn ipv4_alias() -> Self {
        IpRange::from_values(IPV4_IN_IPV6, IPV4_IN_IPV6 | u32::MAX as u128)
    }

    pub fn contains(&self, addr: IpAddress) -> bool {
        self.min.value <= addr.value && addr.value <= self.max.value
    }

    pub fn overlaps(&self, other: &IpRange) -> bool {
        self.min.value <= other.max.value && other.min.value <= self.max.value
    }

    /// Returns the range before `other` and the range after it, where
    /// these are non-empty parts of self.
    pub fn remainders(&self, other: &IpRange) -> (Option<IpRange>, Option<IpRange>) {
        let before = if self.min.value < other.min.value {
            Some(IpRange::from_values(self.min.value, other.min.value - 1))
        } else {
            None
        };
        let after = if self.max.value > other.max.value {
            Some(IpRange::from_values(other.max.value + 1, self.max.value))
        } else {
            None
        };
        (before, after)
    }

    /// Splits the range into the smallest list of prefixes covering it,
    /// in address order.
    pub fn prefixes(&self) -> Result<Vec<IpNet>, IpRangeError> {
        let mut res = vec![];
        let max = self.max.value;
        let mut cur = self.min.value;
        loop {
            let mut host_bits = if cur == 0 { 128 } else { cur.trailing_zeros() };
            while host_bits > 0 && cur | host_mask(host_bits) > max {
                host_bits -= 1;
            }
            res.push(to_net(cur, (128 - host_bits) as u8)?);

            let end = cur | host_mask(host_bits);
            if end >= max {
                break
            }
            cur = end + 1;
        }
        Ok(res)
    }
}

impl From<&IpNet> for IpRange {
    fn from(net: &IpNet) -> Self {
        match net {
            IpNet::V4(v4) => IpRange {
                min: IpAddress::from_ipv4(v4.network()),
                max: IpAddress::from_ipv4(v4.broadcast())
            },
            IpNet::V6(v6) => IpRange {
                min: IpAddress::from_ipv6(v6.network()),
                max: IpAddress::from_ipv6(v6.broadcast())
            }
        }
    }
}

fn host_mask(host_bits: u32) -> u128 {
    match host_bits {
        0 => 0,
        128 => ::std::u128::MAX,
        bits => (1u128 << bits) - 1
    }
}

/// Converts a prefix in the 128 bit space back to its own family.
fn to_net(value: u128, len: u8) -> Result<IpNet, PrefixLenError> {
    if value & IPV4_MASK == IPV4_IN_IPV6 && len >= 96 {
        Ipv4Net::new(Ipv4Addr::from(value as u32), len - 96).map(IpNet::V4)
    } else {
        Ipv6Net::new(Ipv6Addr::from(value), len).map(IpNet::V6)
    }
}


//------------ Error --------------------------------------------------------

#[derive(Debug, Display)]
pub enum IpRangeError {
    #[display(fmt = "Invalid prefix length")]
    PrefixLen,
}

impl From<PrefixLenError> for IpRangeError {
    fn from(_: PrefixLenError) -> Self { IpRangeError::PrefixLen }
}


//------------ Tests --------------------------------------------------------
