//! Lexical analysis for the shell's line grammar.
//!
//! The unit of work is a [`Token`]: literal text plus a parallel per-character
//! escape flag. Escape characters are consumed at construction time, so all
//! later stages ask "is this character escaped?" instead of re-scanning for
//! backslashes. Splitting a token produces sub-tokens that carry the matching
//! slice of the escape flags, which is what keeps quoting decisions stable
//! across the whole expansion pipeline.

/// How a token was quoted when the top-level splitter produced it.
///
/// Only [`Token::split_command`] assigns tags other than `Plain`; sub-tokens
/// derived by further splitting are always `Plain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quote {
    /// Not quoted.
    #[default]
    Plain,
    /// The content of a `"…"` region.
    Double,
    /// The content of a `'…'` region. Every character inside is force-marked
    /// escaped on close, which disables all later expansion.
    Single,
    /// The content of a `$(…)` region, to be evaluated as a command line.
    Substitution,
}

/// A parsed unit of a command line.
///
/// Invariant: `escaped.len()` equals the number of characters in `text`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Token {
    text: String,
    escaped: Vec<bool>,
    quote: Quote,
}

impl Token {
    /// Build a token from raw input, consuming `\` escape sequences.
    pub fn new(text: &str) -> Self {
        Self::with_escape(text, '\\')
    }

    /// Build a token from raw input with an explicit escape character.
    ///
    /// Each `escape` character is removed and the character after it is kept
    /// with its escape flag set. A trailing escape character (nothing follows
    /// it) is kept literally.
    pub fn with_escape(text: &str, escape: char) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::new();
        let mut escaped = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            if chars[i] == escape && i != chars.len() - 1 {
                i += 1;
                out.push(chars[i]);
                escaped.push(true);
            } else {
                out.push(chars[i]);
                escaped.push(false);
            }
            i += 1;
        }
        Token {
            text: out,
            escaped,
            quote: Quote::Plain,
        }
    }

    /// Build a token whose characters are all unescaped, with no escape
    /// processing. Used for text produced by the interpreter itself
    /// (variable values, expanded file names).
    pub fn raw(text: impl Into<String>) -> Self {
        let text = text.into();
        let escaped = vec![false; text.chars().count()];
        Token {
            text,
            escaped,
            quote: Quote::Plain,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn quote(&self) -> Quote {
        self.quote
    }

    /// Number of characters (not bytes) in the token.
    pub fn len(&self) -> usize {
        self.escaped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.escaped.is_empty()
    }

    /// Whether the character at `i` came from an escape sequence.
    /// Out-of-range positions read as unescaped.
    pub fn is_escaped(&self, i: usize) -> bool {
        self.escaped.get(i).copied().unwrap_or(false)
    }

    /// Position of the first occurrence of `c` that is not escaped.
    pub fn find_entering(&self, c: char) -> Option<usize> {
        self.text
            .chars()
            .zip(&self.escaped)
            .position(|(ch, &esc)| ch == c && !esc)
    }

    /// Whether `c` occurs anywhere unescaped.
    pub fn includes_entering(&self, c: char) -> bool {
        self.find_entering(c).is_some()
    }

    /// Half-open character slice `[start, end)`, clamped to the token's
    /// bounds, carrying the matching escape flags. The result is untagged.
    pub fn sub_part(&self, start: usize, end: usize) -> Token {
        let len = self.len();
        let start = start.min(len);
        let end = end.min(len).max(start);
        let text: String = self.text.chars().skip(start).take(end - start).collect();
        Token {
            text,
            escaped: self.escaped[start..end].to_vec(),
            quote: Quote::Plain,
        }
    }

    /// Split on every unescaped occurrence of `c`, dropping empty runs.
    pub fn split_entering(&self, c: char) -> Vec<Token> {
        let chars: Vec<char> = self.text.chars().collect();
        let mut result = Vec::new();
        let mut start = 0;
        for i in 0..=chars.len() {
            if i == chars.len() || (chars[i] == c && !self.escaped[i]) {
                if i > start {
                    result.push(self.sub_part(start, i));
                }
                start = i + 1;
            }
        }
        result
    }

    /// The full tokenizer: split on unescaped `separator` outside quoted
    /// regions, recognizing `"…"`, `'…'` and `$(…)` regions.
    ///
    /// A region's content becomes a single token tagged with its [`Quote`]
    /// kind; closing a single-quoted region force-marks every character
    /// inside as escaped. Regions of the same kind do not nest, and an
    /// unterminated region runs silently to the end of the string — the
    /// trailing run is emitted untagged. This is documented behavior, not an
    /// error.
    pub fn split_command(&self, separator: char) -> Vec<Token> {
        let chars: Vec<char> = self.text.chars().collect();
        let mut result = Vec::new();
        let mut start = 0usize;
        let mut region: Option<char> = None;
        let mut i = 0usize;
        while i <= chars.len() {
            if i != chars.len() && self.escaped[i] {
                i += 1;
                continue;
            }
            if i == chars.len() || (region.is_none() && chars[i] == separator) {
                if i > start {
                    result.push(self.sub_part(start, i));
                }
                start = i + 1;
            } else if chars[i] == '"'
                || chars[i] == '\''
                || (chars[i] == '$' && i + 1 < chars.len() && chars[i + 1] == '(')
                || (region == Some('$') && chars[i] == ')')
            {
                let closes = region == Some(chars[i]) || (region == Some('$') && chars[i] == ')');
                if closes {
                    let mut sub = self.sub_part(start, i);
                    sub.quote = match region {
                        Some('"') => Quote::Double,
                        Some('\'') => Quote::Single,
                        _ => Quote::Substitution,
                    };
                    if chars[i] == '\'' {
                        for esc in &mut sub.escaped {
                            *esc = true;
                        }
                    }
                    result.push(sub);
                    region = None;
                    start = i + 1;
                } else if region.is_none() {
                    if i > start {
                        result.push(self.sub_part(start, i));
                    }
                    region = Some(chars[i]);
                    start = i + if chars[i] == '$' { 2 } else { 1 };
                }
                // a different quote character inside an open region is
                // ordinary content
            }
            i += 1;
        }
        result
    }

    /// Split around the first unescaped `c`: `(before, after)`, the separator
    /// itself excluded. With no occurrence the whole token is `before` and
    /// `after` is empty.
    pub fn split_first_entering(&self, c: char) -> (Token, Token) {
        match self.find_entering(c) {
            Some(i) => (self.sub_part(0, i), self.sub_part(i + 1, self.len())),
            None => (self.sub_part(0, self.len()), Token::default()),
        }
    }

    /// Concatenate tokens with `separator` between them, merging escape
    /// flags positionally. The inserted separators are never escaped.
    pub fn join(parts: &[Token], separator: char) -> Token {
        let mut text = String::new();
        let mut escaped = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                text.push(separator);
                escaped.push(false);
            }
            text.push_str(&part.text);
            escaped.extend_from_slice(&part.escaped);
        }
        Token {
            text,
            escaped,
            quote: Quote::Plain,
        }
    }
}

/// Literal equality: text only, independent of quoting and escape state.
/// This is how operators (`|`, `&`, `=`) and flags are recognized.
impl PartialEq<&str> for Token {
    fn eq(&self, other: &&str) -> bool {
        self.text == *other
    }
}

impl PartialEq<str> for Token {
    fn eq(&self, other: &str) -> bool {
        self.text == other
    }
}
