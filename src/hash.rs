//! Client address hashing.
//!
//! Every address is widened to its 16-byte IPv6 form before mixing, so an IPv4
//! client and its IPv4-mapped IPv6 spelling land on the same value. The low
//! 64-bit half is run through the MurmurHash3 finalizer, folded into the high
//! half and mixed again, which spreads adjacent addresses (10.0.0.1,
//! 10.0.0.2, ...) across the whole output range.

use std::net::IpAddr;

const FMIX_C1: u64 = 0xff51_afd7_ed55_8ccd;
const FMIX_C2: u64 = 0xc4ce_b9fe_1a85_ec53;

const fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(FMIX_C1);
    k ^= k >> 33;
    k = k.wrapping_mul(FMIX_C2);
    k ^= k >> 33;
    k
}

/// Stable 64-bit hash of an IP address, independent of process and platform.
#[must_use]
pub fn address_hash(address: IpAddr) -> u64 {
    let octets = match address.to_canonical() {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    };
    let bits = u128::from_be_bytes(octets);
    let hi = (bits >> 64) as u64;
    let lo = bits as u64;
    fmix64(hi ^ fmix64(lo))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn known_values() {
        assert_eq!(address_hash(ip("203.0.113.7")), 0xb99c_fa44_d679_59bd);
        assert_eq!(address_hash(ip("127.0.0.1")), 0xcbf2_31a4_50a1_9c97);
        assert_eq!(address_hash(ip("::1")), 0x7d6e_4ac3_8b2b_1be2);
    }

    #[test]
    fn mapped_and_native_ipv4_agree() {
        assert_eq!(
            address_hash(ip("198.51.100.23")),
            address_hash(ip("::ffff:198.51.100.23"))
        );
    }

    #[test]
    fn unspecified_address_still_hashes() {
        assert_eq!(address_hash(ip("0.0.0.0")), 0x7047_15a7_a5f7_4b93);
        assert_ne!(address_hash(ip("0.0.0.0")), address_hash(ip("::")));
    }

    #[test]
    fn adjacent_addresses_differ_in_low_bits() {
        let a = address_hash(ip("10.0.0.1"));
        let b = address_hash(ip("10.0.0.2"));
        assert_ne!(a & 0xff, b & 0xff);
    }
}
