//! Hash functions used for bucketing.
//!
//! Results must be identical to those of every other Split SDK, so both functions reproduce the
//! reference integer overflow behaviour exactly.

/// Legacy hash: Java's `String.hashCode` over UTF-16 code units, xor-ed with the seed.
pub fn legacy_hash(key: &str, seed: i32) -> i32 {
    let hash = key
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
    hash ^ seed
}

/// MurmurHash3, x86 32-bit variant, over the UTF-8 bytes of `key`.
pub fn murmur3_32(key: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h1 = seed;

    let mut blocks = key.chunks_exact(4);
    for block in &mut blocks {
        let k1 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h1 ^= mix_k1(k1, C1, C2);
        h1 = h1.rotate_left(13);
        h1 = h1.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let k1 = tail
            .iter()
            .enumerate()
            .fold(0u32, |k1, (i, byte)| k1 ^ (u32::from(*byte) << (8 * i)));
        h1 ^= mix_k1(k1, C1, C2);
    }

    // Length is mixed in modulo 2^32, same as the reference implementation.
    h1 ^= key.len() as u32;
    fmix32(h1)
}

fn mix_k1(k1: u32, c1: u32, c2: u32) -> u32 {
    k1.wrapping_mul(c1).rotate_left(15).wrapping_mul(c2)
}

fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}
