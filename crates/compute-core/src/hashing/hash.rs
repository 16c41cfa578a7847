//! Hash helpers: abstracción para poder cambiar de algoritmo sin tocar el resto
//! del core.

use blake3::Hasher;

use crate::constants::IDENTITY_BYTES;

/// Digest de 128 bits (blake3 en modo XOF truncado).
pub fn digest_128(input: &[u8]) -> [u8; IDENTITY_BYTES] {
    let mut h = Hasher::new();
    h.update(input);
    let mut out = [0u8; IDENTITY_BYTES];
    h.finalize_xof().fill(&mut out);
    out
}
