//! Recognition and decoding of redirect tokens.
//!
//! A redirect token has the shape `digits? ('<'|'>') ('&' digits)?` at its
//! start. Leading digits name the source descriptor; a `&digits` tail names
//! an explicit target descriptor. Without a target the next token on the
//! line is the file name, which is why `> out.txt` needs the space: the
//! grammar never reads a file name out of the redirect token itself.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::ShellError;
use crate::lexer::Token;

/// Data direction of a redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// A decoded redirect token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redirect {
    /// The descriptor being redirected.
    pub fd: i32,
    pub direction: Direction,
    /// Explicit target descriptor; `None` means the caller must consume the
    /// next token as a file name.
    pub target: Option<i32>,
}

fn shape() -> &'static Regex {
    static SHAPE: OnceLock<Regex> = OnceLock::new();
    // after the direction character, a '&' is only legal when digits follow
    SHAPE.get_or_init(|| Regex::new(r"(?s)^[0-9]*[<>](?:[^&].*|&[0-9].*)?$").unwrap())
}

fn fields() -> &'static Regex {
    static FIELDS: OnceLock<Regex> = OnceLock::new();
    FIELDS.get_or_init(|| Regex::new(r"^([0-9]*)([<>])&?([0-9]*)").unwrap())
}

/// Whether the token reads as a redirect.
pub fn is_redirect(part: &Token) -> bool {
    shape().is_match(part.text())
}

/// Decode a redirect token.
///
/// Missing leading digits default to `default_in` for `<` and `default_out`
/// for `>`. The `&` before the target digits is optional when decoding.
pub fn parse(part: &Token, default_out: i32, default_in: i32) -> Result<Redirect, ShellError> {
    let caps = fields()
        .captures(part.text())
        .ok_or_else(|| ShellError::Parse(format!("Bad redirect: {}", part.text())))?;

    let direction = match &caps[2] {
        "<" => Direction::Input,
        _ => Direction::Output,
    };
    let fd = match &caps[1] {
        "" => match direction {
            Direction::Input => default_in,
            Direction::Output => default_out,
        },
        digits => digits
            .parse()
            .map_err(|_| ShellError::Parse(format!("Bad redirect: {}", part.text())))?,
    };
    let target = match &caps[3] {
        "" => None,
        digits => Some(
            digits
                .parse()
                .map_err(|_| ShellError::Parse(format!("Bad redirect: {}", part.text())))?,
        ),
    };

    Ok(Redirect {
        fd,
        direction,
        target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(s: &str) -> Redirect {
        parse(&Token::new(s), 1, 0).unwrap()
    }

    #[test]
    fn recognizes_redirect_tokens() {
        assert!(is_redirect(&Token::new(">")));
        assert!(is_redirect(&Token::new("<")));
        assert!(is_redirect(&Token::new("2>")));
        assert!(is_redirect(&Token::new(">&2")));
        assert!(is_redirect(&Token::new("10<&3")));
    }

    #[test]
    fn rejects_non_redirect_tokens() {
        assert!(!is_redirect(&Token::new("abc")));
        assert!(!is_redirect(&Token::new("2")));
        assert!(!is_redirect(&Token::new("a>b")));
        // a '&' after the direction needs digits
        assert!(!is_redirect(&Token::new(">&")));
        assert!(!is_redirect(&Token::new("2>&x")));
    }

    #[test]
    fn source_defaults_follow_direction() {
        assert_eq!(
            decode(">"),
            Redirect {
                fd: 1,
                direction: Direction::Output,
                target: None
            }
        );
        assert_eq!(
            decode("<"),
            Redirect {
                fd: 0,
                direction: Direction::Input,
                target: None
            }
        );
    }

    #[test]
    fn explicit_source_descriptor() {
        assert_eq!(
            decode("2>"),
            Redirect {
                fd: 2,
                direction: Direction::Output,
                target: None
            }
        );
    }

    #[test]
    fn explicit_target_descriptor() {
        assert_eq!(
            decode(">&2"),
            Redirect {
                fd: 1,
                direction: Direction::Output,
                target: Some(2)
            }
        );
        assert_eq!(
            decode("0<&4"),
            Redirect {
                fd: 0,
                direction: Direction::Input,
                target: Some(4)
            }
        );
    }
}
