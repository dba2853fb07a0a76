//! File-name pattern matching and directory-scoped expansion.
//!
//! Patterns are [`Token`]s so that escaping carries through: an escaped `*`
//! matches a literal asterisk, while an unescaped one matches any run of
//! characters.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ShellError;
use crate::lexer::Token;

/// Whether the token contains an unescaped glob metacharacter.
pub fn is_glob(part: &Token) -> bool {
    part.includes_entering('*') || part.includes_entering('?') || part.includes_entering('[')
}

/// Match `name` against `pattern`, consuming both in lockstep.
///
/// `?` matches exactly one character; `[…]` matches one character listed
/// between the brackets (an unclosed class is a parse error); `*` matches
/// zero or more characters, trying every split point. Both the name and the
/// pattern must be fully consumed for a match.
pub fn matches(name: &str, pattern: &Token) -> Result<bool, ShellError> {
    let name: Vec<char> = name.chars().collect();
    let pat: Vec<char> = pattern.text().chars().collect();
    let esc: Vec<bool> = (0..pat.len()).map(|i| pattern.is_escaped(i)).collect();
    match_from(&name, &pat, &esc, 0, 0)
}

fn match_from(
    name: &[char],
    pat: &[char],
    esc: &[bool],
    mut ni: usize,
    mut pi: usize,
) -> Result<bool, ShellError> {
    while ni < name.len() && pi < pat.len() {
        if esc[pi] {
            if name[ni] != pat[pi] {
                return Ok(false);
            }
        } else if pat[pi] == '[' {
            let close = (pi + 1..pat.len())
                .find(|&j| pat[j] == ']' && !esc[j])
                .ok_or_else(|| {
                    ShellError::Parse(r#"Wild card starting with "[" has no closing bracket"#.into())
                })?;
            if !pat[pi + 1..close].contains(&name[ni]) {
                return Ok(false);
            }
            pi = close;
        } else if pat[pi] == '*' {
            for split in ni..=name.len() {
                if match_from(name, pat, esc, split, pi + 1)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        } else if pat[pi] != '?' && name[ni] != pat[pi] {
            return Ok(false);
        }
        ni += 1;
        pi += 1;
    }
    // trailing stars match the empty remainder
    while pi < pat.len() && pat[pi] == '*' && !esc[pi] {
        pi += 1;
    }
    Ok(ni == name.len() && pi == pat.len())
}

/// Expand a glob token against the file system.
///
/// The token is split at its last unescaped `/`; the directory part must not
/// itself contain glob metacharacters. Regular files in that directory (one
/// level, no dot-file filtering) whose names match the remainder are
/// returned, sorted. An empty result set is an error — the pattern is never
/// passed through literally. Relative directories resolve against `base`,
/// the interpreter's working directory.
pub fn expand(part: &Token, base: &Path) -> Result<Vec<String>, ShellError> {
    let slash = (0..part.len())
        .rev()
        .find(|&i| part.text().chars().nth(i) == Some('/') && !part.is_escaped(i));

    let (dir, pattern) = match slash {
        Some(i) => (part.sub_part(0, i), part.sub_part(i + 1, part.len())),
        None => (Token::default(), part.sub_part(0, part.len())),
    };
    if is_glob(&dir) {
        return Err(ShellError::Unsupported(format!(
            "Wild card is not supported for directories ({})",
            dir.text()
        )));
    }

    let search = match slash {
        None => base.to_path_buf(),
        // a pattern like /x* has an empty directory part meaning the root
        Some(_) if dir.is_empty() => PathBuf::from("/"),
        Some(_) if Path::new(dir.text()).is_absolute() => PathBuf::from(dir.text()),
        Some(_) => base.join(dir.text()),
    };

    let mut found = Vec::new();
    for entry in fs::read_dir(&search)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if matches(&file_name, &pattern)? {
            found.push(match slash {
                None => file_name,
                Some(_) => format!("{}/{}", dir.text(), file_name),
            });
        }
    }

    if found.is_empty() {
        return Err(ShellError::NoMatch(format!(
            "Wild card {} could not be extended.",
            part.text()
        )));
    }
    found.sort();
    Ok(found)
}
