//! Brand-string pattern matching
//!
//! Patterns are a tiny glob language:
//! - `#` matches one ASCII digit
//! - `.` matches any character
//! - `[abc]` matches one of the enclosed characters
//! - anything else matches itself, ignoring ASCII case
//!
//! Matching tries every start position from the left and consumes one subject
//! character per pattern token. There is no backtracking.

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    Digit,
    Any,
    Class(Vec<char>),
}

impl Token {
    fn matches(&self, c: char) -> bool {
        match self {
            Token::Literal(l) => l.eq_ignore_ascii_case(&c),
            Token::Digit => c.is_ascii_digit(),
            Token::Any => true,
            Token::Class(set) => set.iter().any(|l| l.eq_ignore_ascii_case(&c)),
        }
    }
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '#' => tokens.push(Token::Digit),
            '.' => tokens.push(Token::Any),
            '[' => {
                // An unterminated class is taken literally
                match chars[i + 1..].iter().position(|c| *c == ']') {
                    Some(len) => {
                        tokens.push(Token::Class(chars[i + 1..i + 1 + len].to_vec()));
                        i += len + 1;
                    }
                    None => tokens.push(Token::Literal('[')),
                }
            }
            c => tokens.push(Token::Literal(c)),
        }
        i += 1;
    }
    tokens
}

/// Find `pattern` in `subject`.
///
/// Returns the 1-based position of the first match, or 0 when the pattern
/// does not occur. An empty pattern never matches.
pub fn match_pattern(subject: &str, pattern: &str) -> usize {
    let tokens = tokenize(pattern);
    if tokens.is_empty() {
        return 0;
    }
    let chars: Vec<char> = subject.chars().collect();
    if chars.len() < tokens.len() {
        return 0;
    }

    for start in 0..=chars.len() - tokens.len() {
        let matched = tokens
            .iter()
            .zip(&chars[start..])
            .all(|(token, c)| token.matches(*c));
        if matched {
            return start + 1;
        }
    }
    0
}

/// Normalize a brand string before matching: drop every `CPU` substring and
/// collapse whitespace runs into single spaces.
pub fn clean_brand(brand: &str) -> String {
    brand
        .replace("CPU", "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_wildcards() {
        assert!(match_pattern("Ryzen 7 3700X", "Ryzen 7 3###") > 0);
        assert_eq!(match_pattern("Ryzen 5 3600", "Ryzen 7 3###"), 0);
    }

    #[test]
    fn test_match_position_is_one_based() {
        assert_eq!(match_pattern("AMD Ryzen 7 1700X", "Ryzen"), 5);
        assert_eq!(match_pattern("Ryzen", "Ryzen"), 1);
    }

    #[test]
    fn test_character_class() {
        assert!(match_pattern("Cortex-X3", "Cortex-X[012356789]") > 0);
        assert_eq!(match_pattern("Cortex-X4", "Cortex-X[012356789]"), 0);
        assert!(match_pattern("Cortex-A76", "Cortex-A[67][012356789]") > 0);
    }

    #[test]
    fn test_case_insensitive_literals() {
        assert!(match_pattern("intel(r) core(tm) i7-8700k", "Core(TM) i7-8###K") > 0);
    }

    #[test]
    fn test_any_character() {
        assert!(match_pattern("Xeon E5-2690 v4", "E5-2... v4") > 0);
        assert_eq!(match_pattern("Xeon E5-2690 v3", "E5-2... v4"), 0);
    }

    #[test]
    fn test_empty_and_oversized_patterns() {
        assert_eq!(match_pattern("anything", ""), 0);
        assert_eq!(match_pattern("", "a"), 0);
        assert_eq!(match_pattern("ab", "abc"), 0);
    }

    #[test]
    fn test_unterminated_class_is_literal() {
        assert!(match_pattern("a[b", "a[b") > 0);
    }

    #[test]
    fn test_clean_brand() {
        assert_eq!(
            clean_brand("Intel(R) Core(TM) i7-8700K CPU @ 3.70GHz"),
            "Intel(R) Core(TM) i7-8700K @ 3.70GHz"
        );
        assert_eq!(clean_brand("  AMD   Athlon(tm)  "), "AMD Athlon(tm)");
    }
}
