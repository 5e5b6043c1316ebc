//! Static table of candidate bucket counts.
//!
//! Each entry is prime and roughly twice its predecessor, so a lower-bound
//! search lands on a size with no small divisor shared with common key
//! strides. The table is read-only; searches never mutate it.

/// Candidate bucket counts in strictly ascending order.
///
/// The first 31 entries cover the 32-bit range. Entries above `u32::MAX`
/// are only reachable on 64-bit targets; `usable()` filters them out
/// elsewhere.
pub const PRIME_LIST: [u64; 63] = [
    5,
    11,
    23,
    47,
    97,
    193,
    389,
    769,
    1543,
    3079,
    6151,
    12289,
    24593,
    49157,
    98317,
    196613,
    393241,
    786433,
    1572869,
    3145739,
    6291469,
    12582917,
    25165843,
    50331653,
    100663319,
    201326611,
    402653189,
    805306457,
    1610612741,
    3221225473,
    4294967291,
    8589934583,
    17179869209,
    34359738421,
    68719476851,
    137438953711,
    274877907427,
    549755814877,
    1099511629763,
    2199023259539,
    4398046519099,
    8796093038219,
    17592186076453,
    35184372152927,
    70368744305869,
    140737488611767,
    281474977223537,
    562949954447077,
    1125899908894247,
    2251799817788497,
    4503599635576997,
    9007199271154031,
    18014398542308123,
    36028797084616247,
    72057594169232513,
    144115188338465081,
    288230376676930183,
    576460753353860693,
    1152921506707721417,
    2305843013415442889,
    4611686026830885791,
    9223372053661771597,
    18446744073709551557,
];

/// Prefix of `PRIME_LIST` whose entries fit in `usize`.
fn usable() -> &'static [u64] {
    let end = PRIME_LIST.partition_point(|&p| p <= usize::MAX as u64);
    &PRIME_LIST[..end]
}

/// Smallest tabulated prime `>= n`, or `None` if `n` is above the largest
/// entry representable on this target.
pub fn prime_at_least(n: usize) -> Option<usize> {
    let table = usable();
    let i = table.partition_point(|&p| p < n as u64);
    table.get(i).map(|&p| p as usize)
}

/// Largest bucket count the table can hand out on this target.
pub fn largest_prime() -> usize {
    // usable() always contains the 32-bit prefix.
    usable()[usable().len() - 1] as usize
}
