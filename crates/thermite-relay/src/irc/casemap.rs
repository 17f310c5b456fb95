//! Nickname/channel casefolding per the network's `CASEMAPPING`.

/// Casefolding rules advertised through ISUPPORT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseMapping {
    Ascii,
    /// `[]\~` are the uppercase forms of `{}|^`.
    #[default]
    Rfc1459,
    /// Like rfc1459 without the `~`/`^` pair.
    StrictRfc1459,
}

impl CaseMapping {
    /// Parse an ISUPPORT `CASEMAPPING` value. Unknown mappings fall back to
    /// ascii, which is a subset of every other mapping.
    pub fn from_token(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "rfc1459" => Self::Rfc1459,
            "strict-rfc1459" => Self::StrictRfc1459,
            _ => Self::Ascii,
        }
    }

    pub fn fold(self, s: &str) -> String {
        s.chars().map(|c| self.fold_char(c)).collect()
    }

    pub fn equals(self, a: &str, b: &str) -> bool {
        a.len() == b.len() && self.fold(a) == self.fold(b)
    }

    const fn fold_char(self, c: char) -> char {
        match (self, c) {
            (Self::Rfc1459 | Self::StrictRfc1459, '[') => '{',
            (Self::Rfc1459 | Self::StrictRfc1459, ']') => '}',
            (Self::Rfc1459 | Self::StrictRfc1459, '\\') => '|',
            (Self::Rfc1459, '~') => '^',
            _ => c.to_ascii_lowercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc1459_folds_brackets() {
        let cm = CaseMapping::Rfc1459;
        assert_eq!(cm.fold("#Chan[Ops]\\~"), "#chan{ops}|^");
        assert!(cm.equals("Nick[a]", "nick{A}"));
    }

    #[test]
    fn strict_keeps_tilde() {
        assert_eq!(CaseMapping::StrictRfc1459.fold("A~["), "a~{");
    }

    #[test]
    fn ascii_only_lowers_letters() {
        assert_eq!(CaseMapping::Ascii.fold("#Foo[]"), "#foo[]");
    }

    #[test]
    fn parses_isupport_token() {
        assert_eq!(CaseMapping::from_token("RFC1459"), CaseMapping::Rfc1459);
        assert_eq!(
            CaseMapping::from_token("strict-rfc1459"),
            CaseMapping::StrictRfc1459
        );
        assert_eq!(CaseMapping::from_token("rfc7613"), CaseMapping::Ascii);
    }
}
