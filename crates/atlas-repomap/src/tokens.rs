//! Character-based token estimation.
//!
//! No tokenizer is involved: a token is taken to be four characters. Long
//! texts are estimated from a sample of roughly 100 evenly spaced lines.

/// Texts shorter than this many characters are estimated directly.
const SAMPLE_THRESHOLD: usize = 200;

/// Approximate number of lines sampled from long texts.
const SAMPLE_LINES: usize = 100;

/// Characters per token.
const CHARS_PER_TOKEN: f64 = 4.0;

fn char_estimate(text: &str) -> f64 {
    text.chars().count() as f64 / CHARS_PER_TOKEN
}

/// Estimate the number of tokens in `text`.
///
/// Short texts use `chars / 4`. Longer texts take every `lines / 100`-th
/// line (keeping line endings), measure the sample's tokens per character
/// and scale that ratio to the full length.
///
/// # Examples
///
/// ```
/// use atlas_repomap::tokens::estimate_tokens;
///
/// assert_eq!(estimate_tokens(""), 0.0);
/// assert_eq!(estimate_tokens("abcdefgh"), 2.0);
///
/// let long = "fn main() {}\n".repeat(500);
/// let estimate = estimate_tokens(&long);
/// assert!((estimate - long.len() as f64 / 4.0).abs() < 1.0);
/// ```
pub fn estimate_tokens(text: &str) -> f64 {
    let total_chars = text.chars().count();
    if total_chars < SAMPLE_THRESHOLD {
        return char_estimate(text);
    }

    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let step = (lines.len() / SAMPLE_LINES).max(1);
    let sample: String = lines.iter().step_by(step).copied().collect();

    let sample_chars = sample.chars().count();
    if sample_chars == 0 {
        return char_estimate(text);
    }
    char_estimate(&sample) / sample_chars as f64 * total_chars as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_chars_over_four() {
        assert_eq!(estimate_tokens("abc"), 0.75);
        assert_eq!(estimate_tokens(&"x".repeat(199)), 49.75);
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(estimate_tokens("ééééé"), 1.25);
    }

    #[test]
    fn long_text_scales_sample_ratio_to_full_length() {
        let text = "│def handler(request):\n".repeat(1000);
        let expected = text.chars().count() as f64 / 4.0;
        let estimate = estimate_tokens(&text);
        assert!((estimate - expected).abs() < 1e-6, "{estimate} vs {expected}");
    }

    #[test]
    fn single_long_line_is_estimated() {
        let text = "a".repeat(1000);
        assert!((estimate_tokens(&text) - 250.0).abs() < 1e-9);
    }

    #[test]
    fn estimate_grows_with_text() {
        let small = "line of code\n".repeat(50);
        let large = "line of code\n".repeat(5000);
        assert!(estimate_tokens(&large) > estimate_tokens(&small));
    }
}
