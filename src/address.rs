//! Clean up start addresses as they appear in the bulk WHOIS export.
//!
//! ARIN writes IPv4 addresses zero padded (`010.000.000.000`) and IPv6
//! addresses fully expanded (`2001:0DB8:0000:0000:0000:0000:0000:0000`).
//! Neither is accepted by a strict CIDR parser, so addresses are rewritten
//! here first. Normalization never fails: whatever comes out is checked
//! when the CIDR is parsed.
use std::sync::OnceLock;
use regex::Regex;


/// Returns the canonical textual form for a raw start address.
pub fn normalize(raw: &str) -> String {
    if raw.contains(':') {
        normalize_ipv6(raw)
    } else {
        normalize_ipv4(raw)
    }
}

/// Reads up to four dot separated decimal fields and writes them back
/// without leading zeros. Reading stops at the first field that does not
/// start with a digit, that field and all after it become 0. Values are
/// kept as read, so an out of range field such as `300` is left for the
/// CIDR parser to reject.
fn normalize_ipv4(raw: &str) -> String {
    let mut fields = [0u64; 4];
    for (value, field) in fields.iter_mut().zip(raw.trim().split('.')) {
        let digits = field.find(|c: char| !c.is_ascii_digit()).unwrap_or(field.len());
        match field[..digits].parse::<u64>() {
            Ok(parsed) => *value = parsed,
            Err(_) => break
        }
        if digits < field.len() {
            break
        }
    }
    format!("{}.{}.{}.{}", fields[0], fields[1], fields[2], fields[3])
}

/// Collapses a trailing run of zero groups into `::`. Zero runs elsewhere
/// are left for the CIDR parser, which accepts one `::` anywhere.
fn normalize_ipv6(raw: &str) -> String {
    static TRAILING_ZEROS: OnceLock<Regex> = OnceLock::new();
    let re = TRAILING_ZEROS.get_or_init(|| {
        // The pattern is a literal, compiling it cannot fail.
        Regex::new(r"(?::0+)+$").unwrap()
    });
    re.replace(raw.trim(), "::").into_owned()
}


//------------ Tests --------------------------------------------------------
