//! Unicode script inspection used by detection, the quality gate and the
//! back-translation decision.

/// Traditional glyphs that everyday Japanese never writes. Shared forms such
/// as 時 間 東 車 門 are left out so kanji-only Japanese never counts here.
pub const TAIWAN_MARKERS: &str = "觀廳訊歷傳營價們麼說與對覽歡樂嗎這灣臺應讓從氣點廣碼裡";

/// Simplified glyphs that everyday Japanese never writes.
pub const MAINLAND_MARKERS: &str = "观厅资讯风历传营时间价优质评荐环这们么说开车线为对饭馆览饮门东华欢乐吗钟过还让应从广气码";

/// Shinjitai forms that neither Chinese standard uses.
pub const JAPANESE_ONLY_KANJI: &str = "観駅様円広沢気県込辺図歩売読楽薬変関発鉄転払実単営浜桜恵渓庁伝歴覧対価歓";

pub fn is_hiragana(ch: char) -> bool {
    matches!(ch as u32, 0x3041..=0x3096 | 0x309D..=0x309F)
}

pub fn is_katakana(ch: char) -> bool {
    matches!(ch as u32, 0x30A1..=0x30FA | 0x30FC..=0x30FF | 0x31F0..=0x31FF | 0xFF66..=0xFF9D)
}

pub fn is_kana(ch: char) -> bool {
    is_hiragana(ch) || is_katakana(ch)
}

pub fn is_hangul(ch: char) -> bool {
    matches!(
        ch as u32,
        0xAC00..=0xD7A3 | 0x1100..=0x11FF | 0x3130..=0x318F
    )
}

pub fn is_han(ch: char) -> bool {
    matches!(ch as u32, 0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF)
}

pub fn has_kana(text: &str) -> bool {
    text.chars().any(is_kana)
}

pub fn has_hangul(text: &str) -> bool {
    text.chars().any(is_hangul)
}

pub fn has_han(text: &str) -> bool {
    text.chars().any(is_han)
}

pub fn count_in_set(text: &str, set: &str) -> usize {
    text.chars().filter(|ch| set.contains(*ch)).count()
}

pub fn traditional_glyphs(text: &str) -> usize {
    count_in_set(text, TAIWAN_MARKERS)
}

pub fn simplified_glyphs(text: &str) -> usize {
    count_in_set(text, MAINLAND_MARKERS)
}

/// Per-script character counts for one piece of text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptProfile {
    pub total: usize,
    pub hiragana: usize,
    pub katakana: usize,
    pub hangul: usize,
    pub han: usize,
    pub latin: usize,
    pub whitespace: usize,
    pub other: usize,
}

impl ScriptProfile {
    pub fn of(text: &str) -> Self {
        let mut profile = Self::default();
        for ch in text.chars() {
            profile.total += 1;
            if is_hiragana(ch) {
                profile.hiragana += 1;
            } else if is_katakana(ch) {
                profile.katakana += 1;
            } else if is_hangul(ch) {
                profile.hangul += 1;
            } else if is_han(ch) {
                profile.han += 1;
            } else if ch.is_ascii_alphabetic() {
                profile.latin += 1;
            } else if ch.is_whitespace() {
                profile.whitespace += 1;
            } else {
                profile.other += 1;
            }
        }
        profile
    }

    pub fn kana(&self) -> usize {
        self.hiragana + self.katakana
    }

    pub fn has_cjk(&self) -> bool {
        self.kana() + self.hangul + self.han > 0
    }

    /// Letters of any tracked script; whitespace and punctuation excluded.
    pub fn letters(&self) -> usize {
        self.kana() + self.hangul + self.han + self.latin
    }

    pub fn ratio(&self, count: usize) -> f32 {
        let denominator = self.total.saturating_sub(self.whitespace);
        if denominator == 0 {
            0.0
        } else {
            count as f32 / denominator as f32
        }
    }
}

/// True when the text is made only of ASCII letters, spaces and ASCII punctuation,
/// with at least one letter.
pub fn is_ascii_wordlike(text: &str) -> bool {
    let mut letters = 0usize;
    for ch in text.chars() {
        if ch.is_ascii_alphabetic() {
            letters += 1;
        } else if !(ch == ' ' || ch.is_ascii_punctuation()) {
            return false;
        }
    }
    letters > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chinese_markers_are_disjoint_from_each_other_and_japanese() {
        for ch in TAIWAN_MARKERS.chars() {
            assert!(!MAINLAND_MARKERS.contains(ch), "{ch} in both marker sets");
            assert!(!JAPANESE_ONLY_KANJI.contains(ch), "{ch} is Japanese");
        }
        for ch in MAINLAND_MARKERS.chars() {
            assert!(!JAPANESE_ONLY_KANJI.contains(ch), "{ch} is Japanese");
        }
    }

    #[test]
    fn everyday_japanese_kanji_carry_no_chinese_markers() {
        for text in ["営業時間", "駐車場", "朝食時間", "東京駅", "正門", "品質評価", "風呂", "旅館"] {
            assert_eq!(traditional_glyphs(text), 0, "{text}");
            assert_eq!(simplified_glyphs(text), 0, "{text}");
        }
    }

    #[test]
    fn profiles_mixed_text() {
        let profile = ScriptProfile::of("東京タワーへ go");
        assert_eq!(profile.han, 2);
        assert_eq!(profile.katakana, 3);
        assert_eq!(profile.hiragana, 1);
        assert_eq!(profile.latin, 2);
        assert_eq!(profile.whitespace, 1);
        assert!(profile.has_cjk());
    }

    #[test]
    fn counts_traditional_and_simplified() {
        assert_eq!(traditional_glyphs("餐廳資訊"), 2);
        assert_eq!(simplified_glyphs("餐厅资讯"), 3);
    }

    #[test]
    fn ascii_wordlike_requires_letters() {
        assert!(is_ascii_wordlike("Hi!"));
        assert!(!is_ascii_wordlike("123"));
        assert!(!is_ascii_wordlike("café"));
    }
}
