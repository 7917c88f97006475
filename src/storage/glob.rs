//! Glob-style key matching for `KEYS`.
//!
//! Supported syntax:
//! - `*` matches any sequence, including the empty one
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]`, `[^a]` match one character from (or outside) a class
//! - `\x` matches `x` literally
//!
//! Everything else is a literal. A character is a UTF-8 sequence where the
//! bytes form one, and a single byte otherwise, so binary keys still match.

/// A compiled `KEYS` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    pattern: Vec<u8>,
}

impl GlobPattern {
    pub fn new(pattern: impl Into<Vec<u8>>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    /// True for the plain `*` pattern, which every key matches.
    pub fn matches_everything(&self) -> bool {
        self.pattern == b"*"
    }

    /// Tests `text` against the pattern.
    ///
    /// Backtracks to the most recent `*` on a mismatch, so the cost is
    /// bounded by `pattern.len() * text.len()`.
    pub fn matches(&self, text: &[u8]) -> bool {
        let pattern = &self.pattern[..];
        let (mut p, mut t) = (0, 0);
        // Position after the last `*` seen, and the text index it resumes from.
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            if p < pattern.len() && pattern[p] == b'*' {
                p += 1;
                backtrack = Some((p, t));
                continue;
            }
            let (c, width) = unit_at(text, t);
            if p < pattern.len() {
                if let Some(next) = match_one(pattern, p, c) {
                    p = next;
                    t += width;
                    continue;
                }
            }
            match backtrack {
                Some((star_p, star_t)) => {
                    let resume = star_t + unit_at(text, star_t).1;
                    p = star_p;
                    t = resume;
                    backtrack = Some((star_p, resume));
                }
                None => return false,
            }
        }

        pattern[p..].iter().all(|&b| b == b'*')
    }
}

/// Bytes that do not start a valid UTF-8 sequence are numbered from here,
/// so they never compare equal to a decoded character.
const INVALID_BYTE_BASE: u32 = char::MAX as u32 + 1;

/// Decodes the unit at `i`: one UTF-8 character, or a single byte when the
/// bytes there are not valid UTF-8. Returns its value and width.
fn unit_at(buf: &[u8], i: usize) -> (u32, usize) {
    let first = buf[i];
    let width = match first {
        0x00..=0x7F => return (u32::from(first), 1),
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return (INVALID_BYTE_BASE + u32::from(first), 1),
    };
    buf.get(i..i + width)
        .and_then(|seq| std::str::from_utf8(seq).ok())
        .and_then(|s| s.chars().next())
        .map_or((INVALID_BYTE_BASE + u32::from(first), 1), |ch| {
            (u32::from(ch), width)
        })
}

/// Matches one text unit against the pattern token at `p`, returning the
/// index of the next token.
fn match_one(pattern: &[u8], p: usize, c: u32) -> Option<usize> {
    match pattern[p] {
        b'?' => Some(p + 1),
        b'[' => match match_class(pattern, p, c) {
            Some((true, next)) => Some(next),
            Some((false, _)) => None,
            // Unterminated class: the bracket is a literal.
            None => (c == u32::from(b'[')).then_some(p + 1),
        },
        b'\\' if p + 1 < pattern.len() => {
            let (literal, width) = unit_at(pattern, p + 1);
            (literal == c).then_some(p + 1 + width)
        }
        _ => {
            let (literal, width) = unit_at(pattern, p);
            (literal == c).then_some(p + width)
        }
    }
}

/// Evaluates the class opening at `start`. Returns whether `c` is accepted
/// and the index past the closing `]`, or `None` if the class never closes.
fn match_class(pattern: &[u8], start: usize, c: u32) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < pattern.len() {
        if pattern[i] == b']' {
            return Some((matched != negate, i + 1));
        }
        if pattern[i] == b'\\' && i + 1 < pattern.len() {
            let (literal, width) = unit_at(pattern, i + 1);
            matched |= literal == c;
            i += 1 + width;
            continue;
        }
        let (lo, width) = unit_at(pattern, i);
        let dash = i + width;
        if dash + 1 < pattern.len() && pattern[dash] == b'-' && pattern[dash + 1] != b']' {
            let (hi, hi_width) = unit_at(pattern, dash + 1);
            matched |= (lo.min(hi)..=lo.max(hi)).contains(&c);
            i = dash + 1 + hi_width;
            continue;
        }
        matched |= lo == c;
        i += width;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob(p: &str) -> GlobPattern {
        GlobPattern::new(p)
    }

    #[test]
    fn test_star() {
        assert!(glob("*").matches(b""));
        assert!(glob("*").matches(b"anything"));
        assert!(glob("*").matches_everything());
        assert!(glob("user:*").matches(b"user:101"));
        assert!(!glob("user:*").matches(b"session:1"));
        assert!(glob("h*llo").matches(b"hllo"));
        assert!(glob("h*llo").matches(b"heeeello"));
        assert!(glob("*a*b*").matches(b"xxaxxbxx"));
        assert!(!glob("*a*b").matches(b"xxbxxa"));
    }

    #[test]
    fn test_question_mark() {
        assert!(glob("h?llo").matches(b"hello"));
        assert!(glob("h?llo").matches(b"hallo"));
        assert!(!glob("h?llo").matches(b"hllo"));
        assert!(!glob("h?llo").matches(b"heello"));
        assert!(glob("h?llo").matches("héllo".as_bytes()));
        assert!(glob("?").matches("日".as_bytes()));
        assert!(glob("??").matches(b"\xff\xfe"));
        assert!(glob("?").matches(b"\xc3"));
        assert!(!glob("??").matches("é".as_bytes()));
    }

    #[test]
    fn test_classes_with_multibyte_characters() {
        assert!(glob("h[éè]llo").matches("héllo".as_bytes()));
        assert!(!glob("h[éè]llo").matches("hêllo".as_bytes()));
        assert!(glob("h[à-ê]llo").matches("hêllo".as_bytes()));
        assert!(glob("h[^e]llo").matches("héllo".as_bytes()));
        assert!(glob("*é").matches("café".as_bytes()));
        assert!(!glob("*é").matches(b"cafe"));
        assert!(glob("*é*").matches("cafété".as_bytes()));
    }

    #[test]
    fn test_literal() {
        assert!(glob("foo").matches(b"foo"));
        assert!(!glob("foo").matches(b"foobar"));
        assert!(!glob("foo").matches(b"fo"));
    }

    #[test]
    fn test_classes() {
        assert!(glob("h[ae]llo").matches(b"hello"));
        assert!(glob("h[ae]llo").matches(b"hallo"));
        assert!(!glob("h[ae]llo").matches(b"hillo"));
        assert!(glob("key[0-9]").matches(b"key7"));
        assert!(!glob("key[0-9]").matches(b"keyx"));
        assert!(glob("h[^e]llo").matches(b"hallo"));
        assert!(!glob("h[^e]llo").matches(b"hello"));
    }

    #[test]
    fn test_escape_and_unterminated_class() {
        assert!(glob(r"a\*b").matches(b"a*b"));
        assert!(!glob(r"a\*b").matches(b"axb"));
        assert!(glob("a[b").matches(b"a[b"));
    }

    #[test]
    fn test_binary_keys() {
        assert!(GlobPattern::new(&b"\xff*"[..]).matches(b"\xff\x00\x01"));
    }
}
