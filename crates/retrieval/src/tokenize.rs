use once_cell::sync::Lazy;
use regex::Regex;
use tabi_core::script::{is_hangul, is_han, is_hiragana, is_kana};

static WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{Latin}\p{Nd}]+").expect("valid tokenizer regex"));

/// Latin words longer than one character plus CJK bigrams. Runs made only
/// of hiragana keep their bigrams; inside mixed runs, hiragana-only pairs
/// (particles, copulas) are dropped.
pub fn tokenize(input: &str) -> Vec<String> {
    let lowered = input.to_lowercase();
    let mut tokens = WORD
        .find_iter(&lowered)
        .map(|word| word.as_str())
        .filter(|word| word.chars().count() > 1)
        .map(str::to_string)
        .collect::<Vec<_>>();

    for run in cjk_runs(&lowered) {
        if run.len() == 1 {
            tokens.push(run[0].to_string());
            continue;
        }
        let all_hiragana = run.iter().all(|ch| is_hiragana(*ch));
        for pair in run.windows(2) {
            if !all_hiragana && is_hiragana(pair[0]) && is_hiragana(pair[1]) {
                continue;
            }
            tokens.push(pair.iter().collect());
        }
    }
    tokens
}

fn cjk_runs(text: &str) -> Vec<Vec<char>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for ch in text.chars() {
        if is_kana(ch) || is_han(ch) || is_hangul(ch) {
            current.push(ch);
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}
