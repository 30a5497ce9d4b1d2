//! # Subscriber identity.
//!
//! A [`SubscriberId`] is a 32-bit hash of the subscriber's declared name. It is
//! stable across restarts and hosts, so an external subscriber can compute its own
//! id and present it in a handshake.
//!
//! The hash is Bob Jenkins' lookup3 mixing over a fixed 32-byte block: the name is
//! zero-padded (or truncated) to 32 bytes and read as eight little-endian words.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Names longer than this are truncated before hashing.
pub const NAME_BLOCK: usize = 32;

/// Hashed subscriber identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(u32);

impl SubscriberId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Derives the id from a subscriber name.
    pub fn from_name(name: &str) -> Self {
        let mut block = [0u8; NAME_BLOCK];
        let bytes = name.as_bytes();
        let n = bytes.len().min(NAME_BLOCK);
        block[..n].copy_from_slice(&bytes[..n]);
        Self(hash_block(&block))
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SubscriberId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

#[inline]
fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(4);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(6);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(8);
    *b = b.wrapping_add(*a);
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(16);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(19);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(4);
    *b = b.wrapping_add(*a);
}

#[inline]
fn finish(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(14));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(11));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(25));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(16));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(4));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(14));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(24));
}

fn hash_block(block: &[u8; NAME_BLOCK]) -> u32 {
    let mut w = [0u32; NAME_BLOCK / 4];
    for (word, chunk) in w.iter_mut().zip(block.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    let init = 0xdead_beef_u32.wrapping_add(NAME_BLOCK as u32);
    let (mut a, mut b, mut c) = (init, init, init);

    a = a.wrapping_add(w[0]);
    b = b.wrapping_add(w[1]);
    c = c.wrapping_add(w[2]);
    mix(&mut a, &mut b, &mut c);

    a = a.wrapping_add(w[3]);
    b = b.wrapping_add(w[4]);
    c = c.wrapping_add(w[5]);
    mix(&mut a, &mut b, &mut c);

    // last two words; the third lane is empty
    b = b.wrapping_add(w[7]);
    a = a.wrapping_add(w[6]);
    finish(&mut a, &mut b, &mut c);

    c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_component_ids() {
        let known = [
            ("cac", 1_316_219_185u32),
            ("conn", 1_651_030_346),
            ("log", 3_234_321_643),
            ("switch_mgmt", 893_048_714),
            ("topo_mgmt", 3_034_593_885),
            ("host_mgmt", 367_856_965),
            ("ofp10", 2_846_342_287),
            ("l2_learning", 153_576_300),
            ("rbac", 3_896_669_476),
        ];
        for (name, id) in known {
            assert_eq!(SubscriberId::from_name(name).get(), id, "{name}");
        }
    }

    #[test]
    fn test_names_past_block_are_truncated() {
        let base = "a".repeat(NAME_BLOCK);
        let longer = format!("{base}tail");
        assert_eq!(SubscriberId::from_name(&base), SubscriberId::from_name(&longer));
    }
}
