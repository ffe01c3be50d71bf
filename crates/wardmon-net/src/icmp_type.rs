//! ICMP type registry
//!
//! Immutable sparse table mapping the ICMP type byte to a display name
//! and, where RFC 792 defines them, per-code descriptions. Used by the
//! generic reply parser when a datagram carries a type the probe did not
//! ask for.

/// Display information for one ICMP type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpTypeInfo {
    pub name: &'static str,
    pub codes: &'static [&'static str],
}

const TYPES: [Option<IcmpTypeInfo>; 17] = [
    // 0
    Some(IcmpTypeInfo {
        name: "Echo Reply",
        codes: &[],
    }),
    None,
    None,
    // 3
    Some(IcmpTypeInfo {
        name: "Destination Unreachable",
        codes: &[
            "net unreachable",
            "host unreachable",
            "protocol unreachable",
            "port unreachable",
            "fragmentation needed and DF set",
            "source route failed",
        ],
    }),
    // 4
    Some(IcmpTypeInfo {
        name: "Source Quench",
        codes: &[],
    }),
    // 5
    Some(IcmpTypeInfo {
        name: "Redirect",
        codes: &[
            "redirect datagrams for the network",
            "redirect datagrams for the host",
            "redirect datagrams for the type of service and network",
            "redirect datagrams for the type of service and host",
        ],
    }),
    None,
    None,
    // 8
    Some(IcmpTypeInfo {
        name: "Echo",
        codes: &[],
    }),
    None,
    None,
    // 11
    Some(IcmpTypeInfo {
        name: "Time Exceeded",
        codes: &[
            "time to live exceeded in transit",
            "fragment reassembly time exceeded",
        ],
    }),
    // 12
    Some(IcmpTypeInfo {
        name: "Parameter Problem",
        codes: &[],
    }),
    // 13
    Some(IcmpTypeInfo {
        name: "Timestamp",
        codes: &[],
    }),
    // 14
    Some(IcmpTypeInfo {
        name: "Timestamp Reply",
        codes: &[],
    }),
    // 15
    Some(IcmpTypeInfo {
        name: "Information Request",
        codes: &[],
    }),
    // 16
    Some(IcmpTypeInfo {
        name: "Information Reply",
        codes: &[],
    }),
];

/// Table entry for an ICMP type byte, if one is registered
pub fn lookup(icmp_type: u8) -> Option<&'static IcmpTypeInfo> {
    TYPES.get(usize::from(icmp_type))?.as_ref()
}

/// Human-readable name and code description for any type/code pair
///
/// Unknown types and out-of-range codes fall back to generic
/// descriptors rather than failing.
pub fn describe(icmp_type: u8, code: u8) -> (String, String) {
    match lookup(icmp_type) {
        Some(info) => {
            let code_description = info
                .codes
                .get(usize::from(code))
                .map(|d| (*d).to_string())
                .unwrap_or_else(|| format!("code {}", code));
            (info.name.to_string(), code_description)
        }
        None => (format!("type {}", icmp_type), format!("code {}", code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_types() {
        assert_eq!(lookup(0).unwrap().name, "Echo Reply");
        assert_eq!(lookup(8).unwrap().name, "Echo");
        assert_eq!(lookup(13).unwrap().name, "Timestamp");
        assert_eq!(lookup(14).unwrap().name, "Timestamp Reply");
    }

    #[test]
    fn test_sparse_gaps() {
        assert!(lookup(1).is_none());
        assert!(lookup(2).is_none());
        assert!(lookup(6).is_none());
        assert!(lookup(9).is_none());
    }

    #[test]
    fn test_code_descriptions() {
        let (name, code) = describe(3, 1);
        assert_eq!(name, "Destination Unreachable");
        assert_eq!(code, "host unreachable");

        let (name, code) = describe(11, 0);
        assert_eq!(name, "Time Exceeded");
        assert_eq!(code, "time to live exceeded in transit");
    }

    #[test]
    fn test_generic_descriptors() {
        let (name, code) = describe(200, 7);
        assert_eq!(name, "type 200");
        assert_eq!(code, "code 7");

        // Known type, out-of-range code.
        let (name, code) = describe(3, 42);
        assert_eq!(name, "Destination Unreachable");
        assert_eq!(code, "code 42");
    }
}
