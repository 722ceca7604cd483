use crate::error::{HeaderError, Result};

/// Policy for handling lowercase (soft-masked) symbols in a sequence source
///
/// Soft-masked genomes mark repeats with lowercase bases. Folding discards that
/// information and keeps the store at two bits per base; preserving records the
/// lowercase stretches as runs alongside the packed payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CasePolicy {
    /// Uppercase every symbol before encoding
    #[default]
    Fold,
    /// Keep lowercase canonical bases in the case mask and lowercase
    /// non-canonical symbols verbatim in the exception table
    Preserve,
}
impl CasePolicy {
    /// Applies the policy to a raw source symbol
    ///
    /// Returns the symbol as it should be stored: uppercased under [`CasePolicy::Fold`],
    /// unchanged under [`CasePolicy::Preserve`].
    #[must_use]
    pub fn apply(self, symbol: u8) -> u8 {
        match self {
            Self::Fold => symbol.to_ascii_uppercase(),
            Self::Preserve => symbol,
        }
    }

    /// Whether the store keeps a case mask under this policy
    #[must_use]
    pub fn tracks_case(self) -> bool {
        matches!(self, Self::Preserve)
    }

    pub(crate) fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Fold),
            1 => Ok(Self::Preserve),
            x => Err(HeaderError::InvalidCasePolicy(x).into()),
        }
    }

    pub(crate) fn as_byte(self) -> u8 {
        match self {
            Self::Fold => 0,
            Self::Preserve => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_uppercases_everything() {
        assert_eq!(CasePolicy::Fold.apply(b'a'), b'A');
        assert_eq!(CasePolicy::Fold.apply(b'n'), b'N');
        assert_eq!(CasePolicy::Fold.apply(b'-'), b'-');
    }

    #[test]
    fn preserve_is_identity() {
        assert_eq!(CasePolicy::Preserve.apply(b'a'), b'a');
        assert_eq!(CasePolicy::Preserve.apply(b'G'), b'G');
    }

    #[test]
    fn byte_roundtrip_rejects_unknown() {
        for policy in [CasePolicy::Fold, CasePolicy::Preserve] {
            assert_eq!(CasePolicy::from_byte(policy.as_byte()).unwrap(), policy);
        }
        assert!(CasePolicy::from_byte(7).is_err());
    }
}
