//! Shared numeric helpers: deterministic seeding and isolation-tree
//! path-length normalization.

/// Euler-Mascheroni constant, used by the harmonic-number approximation.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// FNV-1a hash for deterministic seed generation.
pub fn fnv1a_hash(data: &[u8]) -> u64 {
    let mut hash: u64 = 14695981039346656037;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

/// Derive an independent, reproducible seed for the `index`-th member of a
/// seeded ensemble. The derived seed depends only on `(base, index)`, so
/// ensembles built in parallel match ensembles built sequentially.
pub fn mix_seed(base: u64, index: usize) -> u64 {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&base.to_le_bytes());
    bytes[8..].copy_from_slice(&(index as u64).to_le_bytes());
    fnv1a_hash(&bytes)
}

/// Approximate harmonic number H(i) = ln(i) + gamma.
fn harmonic(i: f64) -> f64 {
    i.ln() + EULER_GAMMA
}

/// Average path length of an unsuccessful binary-search-tree lookup over
/// `n` points, `c(n)` in the isolation forest paper. Normalizes tree depths
/// and accounts for the unbuilt subtree below a size-limited leaf.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * harmonic(n - 1.0) - 2.0 * (n - 1.0) / n
        }
    }
}
