//! Placeholder substitution that keeps addresses, facility names and curated
//! place names out of the translation engine's hands.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tabi_core::{LangCode, PlaceNameEquivalent};

pub const MAX_RESTORE_PASSES: usize = 5;

static ADDRESS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"〒\d{3}-\d{4}[^、\n]*",
        r"日本、[^、\n]*",
        r"(?:東京都|北海道|京都府|大阪府|\p{Han}{2,3}県)\p{Han}{1,6}?[市区町村郡][\p{Han}\p{Katakana}ー0-9０-９\-−丁目番地号]*",
        r"[都道府県市区町村]\d+[丁目番地号][\d\-−]*",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid address regex"))
    .collect()
});

static FACILITY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[\p{Han}\p{Katakana}ー・]{1,20}(?:公園|タワー|城|寺|神社|美術館|博物館|センター|ビル|モール|空港|駅|温泉|ホテル|旅館)",
    )
    .expect("valid facility regex")
});

static PLACEHOLDER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"§\s*§\s*(LOC|ADR|FAC)\s*(\d+)\s*§\s*§").expect("valid placeholder regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    Address,
    Facility,
    Place,
}

impl TermKind {
    fn tag(self) -> &'static str {
        match self {
            Self::Address => "ADR",
            Self::Facility => "FAC",
            Self::Place => "LOC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedTerm {
    pub kind: TermKind,
    pub index: usize,
    pub original: String,
    /// What goes back in: the literal for addresses and facilities, the
    /// target-language equivalent for place names.
    pub replacement: String,
}

impl ProtectedTerm {
    pub fn token(&self) -> String {
        format!("§§{}{}§§", self.kind.tag(), self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedText {
    pub text: String,
    pub terms: Vec<ProtectedTerm>,
}

impl ProtectedText {
    pub fn unprotected(text: &str) -> Self {
        Self {
            text: text.to_string(),
            terms: Vec::new(),
        }
    }

    pub fn is_protected(&self) -> bool {
        !self.terms.is_empty()
    }

    /// Puts every placeholder back, tolerating whitespace the engine may have
    /// inserted inside a token. Bounded to [`MAX_RESTORE_PASSES`].
    pub fn restore(&self, translated: &str) -> String {
        if self.terms.is_empty() {
            return translated.to_string();
        }
        let mut current = translated.to_string();
        for _ in 0..MAX_RESTORE_PASSES {
            let next = PLACEHOLDER_PATTERN.replace_all(&current, |caps: &Captures| {
                let tag = &caps[1];
                let index = caps[2].parse::<usize>().ok();
                self.terms
                    .iter()
                    .find(|term| Some(term.index) == index && term.kind.tag() == tag)
                    .map(|term| term.replacement.clone())
                    .unwrap_or_else(|| caps[0].to_string())
            });
            match next {
                Cow::Borrowed(_) => break,
                Cow::Owned(replaced) => {
                    if replaced == current {
                        break;
                    }
                    current = replaced;
                }
            }
        }
        current
    }
}

pub struct TermProtector {
    places: Vec<PlaceNameEquivalent>,
}

impl TermProtector {
    pub fn new(places: &[PlaceNameEquivalent]) -> Self {
        let mut places = places.to_vec();
        // longer names first so 湯布院 is not split by a shorter entry
        places.sort_by(|a, b| b.ja.chars().count().cmp(&a.ja.chars().count()));
        Self { places }
    }

    /// Addresses first, then facilities, then curated place names, so a place
    /// name inside an address stays literal.
    pub fn protect(&self, text: &str, target: LangCode) -> ProtectedText {
        let mut terms = Vec::new();
        let mut current = text.to_string();

        for pattern in ADDRESS_PATTERNS.iter() {
            current = substitute(pattern, &current, TermKind::Address, &mut terms);
        }
        current = substitute(&FACILITY_PATTERN, &current, TermKind::Facility, &mut terms);

        for place in &self.places {
            if place.ja.is_empty() || !current.contains(place.ja.as_str()) {
                continue;
            }
            let term = ProtectedTerm {
                kind: TermKind::Place,
                index: terms.len(),
                original: place.ja.clone(),
                replacement: place.in_language(target).to_string(),
            };
            current = current.replace(place.ja.as_str(), &term.token());
            terms.push(term);
        }

        ProtectedText {
            text: current,
            terms,
        }
    }
}

fn substitute(
    pattern: &Regex,
    text: &str,
    kind: TermKind,
    terms: &mut Vec<ProtectedTerm>,
) -> String {
    pattern
        .replace_all(text, |caps: &Captures| {
            let literal = caps[0].to_string();
            let term = ProtectedTerm {
                kind,
                index: terms.len(),
                original: literal.clone(),
                replacement: literal,
            };
            let token = term.token();
            terms.push(term);
            token
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabi_core::Lexicon;

    fn protector() -> TermProtector {
        TermProtector::new(&Lexicon::bundled().unwrap().place_names)
    }

    #[test]
    fn address_and_facility_round_trip() {
        let text = "住所は〒874-0000 大分県別府市北浜1-2-3、別府駅から徒歩5分、近くに海地獄温泉があります。";
        let protected = protector().protect(text, LangCode::En);
        assert!(protected
            .terms
            .iter()
            .any(|term| term.kind == TermKind::Address));
        assert!(protected
            .terms
            .iter()
            .any(|term| term.kind == TermKind::Facility && term.original == "別府駅"));
        assert!(!protected.text.contains("別府駅"));
        assert_eq!(protected.restore(&protected.text), text);
    }

    #[test]
    fn prefecture_address_keeps_place_name_literal() {
        let text = "東京都新宿区西新宿2-8-1へどうぞ";
        let protected = protector().protect(text, LangCode::En);
        assert_eq!(protected.terms.len(), 1);
        assert_eq!(protected.terms[0].kind, TermKind::Address);
        let restored = protected.restore(&protected.text.replace("へどうぞ", " please"));
        assert_eq!(restored, "東京都新宿区西新宿2-8-1 please");
    }

    #[test]
    fn place_names_restore_to_target_equivalent() {
        let protected = protector().protect("東京と大阪の観光", LangCode::Ko);
        let translated = protected
            .text
            .replace("と", " 및 ")
            .replace("の観光", " 관광");
        assert_eq!(protected.restore(&translated), "도쿄 및 오사카 관광");
    }

    #[test]
    fn tolerates_whitespace_inside_tokens() {
        let protected = protector().protect("京都の情報", LangCode::En);
        let mangled = protected.text.replace("§§LOC0§§", "§ § LOC 0 § §");
        assert!(protected.restore(&mangled).starts_with("Kyoto"));
    }

    #[test]
    fn unknown_tokens_are_left_alone() {
        let protected = protector().protect("京都の情報", LangCode::En);
        assert_eq!(protected.restore("§§FAC9§§ info"), "§§FAC9§§ info");
    }
}
