//! Tokenizer
//!
//! Shell-style split/quote of raw input, plus classification of a single
//! already-split token into the shapes the parser cares about (§4.1).

/// The classification of a single already-split argv token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// The `--` end-of-flags marker.
    EndOfFlags,
    /// `--long` or `--long=value`.
    LongFlag { name: String, inline_value: Option<String> },
    /// `-x`, `-xyz` (boolean cluster), or `-sValue` (first char is the flag,
    /// remainder is its value). The parser decides which interpretation
    /// applies once it knows the flag types; the tokenizer only reports the
    /// raw cluster.
    ShortCluster { chars: Vec<char>, inline_value: Option<String> },
    /// A positional value, subcommand name, or value continuation.
    Bareword(String),
}

/// Classify one already-split argv element. Does not consume neighboring
/// tokens; the parser is responsible for value consumption per ArgCounter.
pub fn classify(raw: &str) -> Token {
    if raw == "--" {
        return Token::EndOfFlags;
    }
    if let Some(rest) = raw.strip_prefix("--") {
        if rest.is_empty() {
            return Token::EndOfFlags;
        }
        return match rest.split_once('=') {
            Some((name, value)) => Token::LongFlag {
                name: name.to_string(),
                inline_value: Some(value.to_string()),
            },
            None => Token::LongFlag { name: rest.to_string(), inline_value: None },
        };
    }
    if let Some(rest) = raw.strip_prefix('-') {
        if rest.is_empty() {
            // A bare "-" is conventionally stdin/stdout, treated as a bareword.
            return Token::Bareword(raw.to_string());
        }
        if rest.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            // `-1`, `-2.5`: looks like a negative number, not a flag cluster.
            return Token::Bareword(raw.to_string());
        }
        let mut chars = Vec::new();
        let mut rest_chars = rest.chars();
        for c in rest_chars.by_ref() {
            chars.push(c);
        }
        return Token::ShortCluster { chars, inline_value: None };
    }
    Token::Bareword(raw.to_string())
}

/// Split a single string into shell-style words: whitespace-separated,
/// honoring single quotes (no escapes), double quotes (`\` escapes `\`, `"`,
/// `$`, and newline), and backslash escapes outside quotes.
pub fn shell_split(input: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut has_current = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if has_current {
                    words.push(std::mem::take(&mut current));
                    has_current = false;
                }
            }
            '\'' => {
                has_current = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err("unterminated single quote".to_string()),
                    }
                }
            }
            '"' => {
                has_current = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('\\' | '"' | '$' | '\n')) => current.push(c),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => return Err("unterminated double quote".to_string()),
                        },
                        Some(c) => current.push(c),
                        None => return Err("unterminated double quote".to_string()),
                    }
                }
            }
            '\\' => {
                has_current = true;
                match chars.next() {
                    Some(c) => current.push(c),
                    None => return Err("trailing backslash".to_string()),
                }
            }
            c => {
                has_current = true;
                current.push(c);
            }
        }
    }

    if has_current {
        words.push(current);
    }

    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_long_flag_with_inline_value() {
        assert_eq!(
            classify("--name=foo"),
            Token::LongFlag { name: "name".to_string(), inline_value: Some("foo".to_string()) }
        );
    }

    #[test]
    fn classifies_long_flag_without_value() {
        assert_eq!(classify("--verbose"), Token::LongFlag { name: "verbose".to_string(), inline_value: None });
    }

    #[test]
    fn classifies_end_of_flags() {
        assert_eq!(classify("--"), Token::EndOfFlags);
    }

    #[test]
    fn classifies_short_cluster() {
        assert_eq!(classify("-xyz"), Token::ShortCluster { chars: vec!['x', 'y', 'z'], inline_value: None });
    }

    #[test]
    fn negative_number_is_bareword() {
        assert_eq!(classify("-1"), Token::Bareword("-1".to_string()));
    }

    #[test]
    fn bareword_passes_through() {
        assert_eq!(classify("file.txt"), Token::Bareword("file.txt".to_string()));
    }

    #[test]
    fn shell_split_handles_quotes_and_escapes() {
        let words = shell_split(r#"one 'two three' "four\"five" six\ seven"#).unwrap();
        assert_eq!(words, vec!["one", "two three", "four\"five", "six seven"]);
    }

    #[test]
    fn shell_split_rejects_unterminated_quote() {
        assert!(shell_split("'unterminated").is_err());
    }
}
