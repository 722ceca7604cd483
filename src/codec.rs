//! Base codec
//!
//! Maps nucleotide symbols onto a dense two-bit code and packs those codes into
//! `u64` words of 32 bases each. Symbols outside of the canonical alphabet are not
//! errors: [`encode`] routes them to the exception path and the packed slot holds
//! [`FILLER_CODE`].
//!
//! Packing and unpacking of whole words is delegated to [`bitnuc`], so the bit order
//! within a word is whatever `bitnuc` defines and is never interpreted here.

use crate::{error::Result, policy::CasePolicy};

/// Number of bits used per packed base
pub const BITS_PER_BASE: u8 = 2;

/// Number of bases held by one payload word
pub const BASES_PER_WORD: usize = 32;

/// Code stored in the packed slot of an exception position
pub const FILLER_CODE: u8 = 0;

/// Canonical alphabet, indexed by code
const ALPHABET: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Result of encoding a single source symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoded {
    /// A canonical base; `lowercase` is only ever set under [`CasePolicy::Preserve`]
    Canonical { code: u8, lowercase: bool },
    /// Any other symbol, to be kept verbatim in the exception table
    Exception(u8),
}

/// Encodes a single source symbol under the given case policy
#[must_use]
pub fn encode(symbol: u8, policy: CasePolicy) -> Encoded {
    let symbol = policy.apply(symbol);
    let code = match symbol.to_ascii_uppercase() {
        b'A' => 0,
        b'C' => 1,
        b'G' => 2,
        b'T' => 3,
        _ => return Encoded::Exception(symbol),
    };
    Encoded::Canonical {
        code,
        lowercase: symbol.is_ascii_lowercase(),
    }
}

/// Decodes a packed code back into its uppercase canonical base
///
/// Only the two low bits of `code` are considered.
#[must_use]
pub fn decode(code: u8) -> u8 {
    ALPHABET[(code & 0b11) as usize]
}

/// Complements a canonical base (A↔T, C↔G), preserving case.
///
/// Every other symbol is returned unchanged.
#[must_use]
pub fn complement(symbol: u8) -> u8 {
    match symbol {
        b'A' => b'T',
        b'T' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        b'a' => b't',
        b't' => b'a',
        b'c' => b'g',
        b'g' => b'c',
        other => other,
    }
}

/// Number of payload words required to hold `n_bases`
#[must_use]
pub fn words_for(n_bases: u64) -> u64 {
    n_bases.div_ceil(BASES_PER_WORD as u64)
}

/// Unpacks the first `n_bases` bases of a payload word into `buffer`
///
/// The buffer is cleared first.
pub fn unpack_word(word: u64, n_bases: usize, buffer: &mut Vec<u8>) -> Result<()> {
    buffer.clear();
    bitnuc::from_2bit(word, n_bases, buffer)?;
    Ok(())
}

/// Accumulates two-bit codes into payload words
///
/// Codes are staged as canonical bases until a full word is available, at which
/// point the word is packed with [`bitnuc::as_2bit`].
#[derive(Debug, Default, Clone)]
pub struct Packer {
    words: Vec<u64>,
    pending: Vec<u8>,
    len: u64,
}
impl Packer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            pending: Vec::with_capacity(BASES_PER_WORD),
            len: 0,
        }
    }

    /// Number of bases pushed so far
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends a single code
    pub fn push_code(&mut self, code: u8) -> Result<()> {
        self.pending.push(decode(code));
        self.len += 1;
        if self.pending.len() == BASES_PER_WORD {
            self.flush_pending()?;
        }
        Ok(())
    }

    /// Appends `n_bases` bases that are already packed into `words`
    ///
    /// Whole words are copied through when the packer is word aligned; otherwise
    /// each word is unpacked and its codes re-staged.
    pub fn extend_words(&mut self, words: &[u64], n_bases: u64) -> Result<()> {
        let mut remaining = n_bases;
        let mut scratch = Vec::with_capacity(BASES_PER_WORD);
        for &word in words {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(BASES_PER_WORD as u64) as usize;
            if self.pending.is_empty() && take == BASES_PER_WORD {
                self.words.push(word);
                self.len += BASES_PER_WORD as u64;
            } else {
                unpack_word(word, take, &mut scratch)?;
                for &base in &scratch {
                    self.pending.push(base);
                    self.len += 1;
                    if self.pending.len() == BASES_PER_WORD {
                        self.flush_pending()?;
                    }
                }
            }
            remaining -= take as u64;
        }
        Ok(())
    }

    /// Completes the final partial word and returns the payload with its base count
    pub fn finish(mut self) -> Result<(Vec<u64>, u64)> {
        if !self.pending.is_empty() {
            self.flush_pending()?;
        }
        Ok((self.words, self.len))
    }

    fn flush_pending(&mut self) -> Result<()> {
        let word = bitnuc::as_2bit(&self.pending)?;
        self.words.push(word);
        self.pending.clear();
        Ok(())
    }
}

/// Packs a slice of canonical codes into fresh words
pub fn pack_codes(codes: &[u8]) -> Result<Vec<u64>> {
    let mut packer = Packer::new();
    for &code in codes {
        packer.push_code(code)?;
    }
    packer.finish().map(|(words, _)| words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn canonical_symbols_encode_case_folded() {
        for (i, &base) in ALPHABET.iter().enumerate() {
            let expected = Encoded::Canonical {
                code: i as u8,
                lowercase: false,
            };
            assert_eq!(encode(base, CasePolicy::Fold), expected);
            assert_eq!(encode(base.to_ascii_lowercase(), CasePolicy::Fold), expected);
        }
    }

    #[test]
    fn preserve_flags_lowercase_canonical() {
        assert_eq!(
            encode(b'g', CasePolicy::Preserve),
            Encoded::Canonical {
                code: 2,
                lowercase: true
            }
        );
        assert_eq!(encode(b'n', CasePolicy::Preserve), Encoded::Exception(b'n'));
        assert_eq!(encode(b'n', CasePolicy::Fold), Encoded::Exception(b'N'));
    }

    #[test]
    fn other_symbols_are_exceptions() {
        for &symbol in b"NRYKMSWBDHV-.*" {
            assert_eq!(encode(symbol, CasePolicy::Fold), Encoded::Exception(symbol));
        }
    }

    #[test]
    fn complement_is_an_involution() {
        for &symbol in b"ACGTacgtN-R" {
            assert_eq!(complement(complement(symbol)), symbol);
        }
        assert_eq!(complement(b'N'), b'N');
        assert_eq!(complement(b'c'), b'g');
    }

    #[test]
    fn packer_spans_word_boundaries() -> Result<()> {
        let sequence = b"ACGTTGCAACGTTGCAACGTTGCAACGTTGCAGGA";
        let codes: Vec<u8> = sequence
            .iter()
            .map(|&b| match encode(b, CasePolicy::Fold) {
                Encoded::Canonical { code, .. } => code,
                Encoded::Exception(_) => unreachable!(),
            })
            .collect();
        let words = pack_codes(&codes)?;
        assert_eq!(words.len(), 2);

        let mut out = Vec::new();
        let mut buf = Vec::new();
        unpack_word(words[0], 32, &mut buf)?;
        out.extend_from_slice(&buf);
        unpack_word(words[1], 3, &mut buf)?;
        out.extend_from_slice(&buf);
        assert_eq!(out, sequence);
        Ok(())
    }

    #[test]
    fn extend_words_realigns_unaligned_input() -> Result<()> {
        let source: Vec<u8> = (0..70u8).map(|i| i % 4).collect();
        let words = pack_codes(&source)?;

        let mut packer = Packer::new();
        packer.push_code(3)?;
        packer.extend_words(&words, 70)?;
        let (packed, len) = packer.finish()?;
        assert_eq!(len, 71);

        let mut expected = vec![3u8];
        expected.extend_from_slice(&source);
        assert_eq!(packed, pack_codes(&expected)?);
        Ok(())
    }

    #[test]
    fn extend_words_copies_aligned_words() -> Result<()> {
        let source: Vec<u8> = (0..64u8).map(|i| (i / 3) % 4).collect();
        let words = pack_codes(&source)?;
        let mut packer = Packer::new();
        packer.extend_words(&words, 64)?;
        let (packed, len) = packer.finish()?;
        assert_eq!(len, 64);
        assert_eq!(packed, words);
        Ok(())
    }

    #[test]
    fn words_for_rounds_up() {
        assert_eq!(words_for(0), 0);
        assert_eq!(words_for(1), 1);
        assert_eq!(words_for(32), 1);
        assert_eq!(words_for(33), 2);
    }
}
