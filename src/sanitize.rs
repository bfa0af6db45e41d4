//! Text → matrix-renderable ASCII approximation.
//!
//! The matrix font only covers ASCII. Letters with a well-known base letter
//! are mapped directly (dotless ı has no decomposition, so NFD alone would
//! leave it untouched); everything else is decomposed and its combining
//! marks dropped.

use unicode_normalization::UnicodeNormalization;

/// Letters mapped before normalisation.
const DIRECT_MAP: &[(char, char)] = &[
    ('ç', 'c'),
    ('Ç', 'C'),
    ('ğ', 'g'),
    ('Ğ', 'G'),
    ('ı', 'i'),
    ('İ', 'I'),
    ('ö', 'o'),
    ('Ö', 'O'),
    ('ş', 's'),
    ('Ş', 'S'),
    ('ü', 'u'),
    ('Ü', 'U'),
    ('â', 'a'),
    ('Â', 'A'),
    ('î', 'i'),
    ('Î', 'I'),
    ('û', 'u'),
    ('Û', 'U'),
];

fn map_direct(c: char) -> char {
    DIRECT_MAP
        .iter()
        .find(|(from, _)| *from == c)
        .map_or(c, |(_, to)| *to)
}

/// Combining Diacritical Marks block (U+0300..=U+036F).
fn is_combining_diacritic(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

/// Approximate `input` with plain ASCII letters where possible.
///
/// Idempotent; empty input comes back empty.
pub fn sanitize(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    input
        .chars()
        .map(map_direct)
        .nfd()
        .filter(|c| !is_combining_diacritic(*c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn turkish_sentence_becomes_ascii() {
        let out = sanitize("İstanbul çok güzel");
        assert_eq!(out, "Istanbul cok guzel");
        assert!(out.is_ascii());
    }

    #[rstest]
    #[case("Beyoncé", "Beyonce")]
    #[case("Sigur Rós", "Sigur Ros")]
    #[case("Mötley Crüe", "Motley Crue")]
    #[case("Işık Ağaç Şarkı", "Isik Agac Sarki")]
    #[case("Kâğıt Îlan Ûmit", "Kagit Ilan Umit")]
    #[case("Ñandú", "Nandu")]
    #[case("plain ascii - 123", "plain ascii - 123")]
    fn strips_diacritics(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize(input), expected);
    }

    #[rstest]
    #[case("İstanbul çok güzel")]
    #[case("Ã̃ double marks")]
    #[case("日本語 stays")]
    #[case("")]
    fn is_idempotent(#[case] input: &str) {
        let once = sanitize(input);
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn non_latin_text_is_kept() {
        assert_eq!(sanitize("日本語"), "日本語");
    }
}
