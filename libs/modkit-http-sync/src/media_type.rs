//! `Content-Type` parsing per RFC 2045/2046.
//!
//! Grammar accepted by [`MediaType::parse`]:
//!
//! ```text
//! media-type = token "/" token *( *WS ";" *WS token "=" value *WS )
//! value      = token / DQUOTE *( any char except DQUOTE, CR, LF ) DQUOTE
//! token      = 1*( US-ASCII except CTLs, SP and tspecials )
//! tspecials  = ( ) < > @ , ; : \ " / [ ] ? =
//! ```
//!
//! Nothing may appear between or after parameter clauses other than
//! whitespace. Type, subtype and parameter names are lowercased; parameter
//! values are kept verbatim (minus one pair of surrounding quotes).

use crate::case_insensitive::CaseInsensitiveMap;
use crate::error::MediaTypeError;
use encoding_rs::Encoding;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

const TSPECIALS: &[u8] = b"()<>@,;:\\\"/[]?=";

const EXPECTED_FORMAT: &str = "does not match 'type/subtype; parameter=value' format";
const WILDCARD_TYPE: &str = "cannot have a declared subtype with a wildcard type";
const EXPECTED_PARAMETER: &str = "parameter does not match '; parameter=value' format";

fn is_token_byte(b: u8) -> bool {
    b.is_ascii() && !b.is_ascii_control() && b != b' ' && !TSPECIALS.contains(&b)
}

/// `true` if `s` is a non-empty RFC 2045 token and may appear unquoted.
pub fn is_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_token_byte)
}

/// Whitespace accepted around parameter clauses: SP, HT, LF, VT, FF, CR.
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

/// Charset names are alphanumerics plus `-+:_.`, never starting with punctuation.
fn is_legal_charset_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    bytes.next().is_some_and(|b| b.is_ascii_alphanumeric())
        && bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'+' | b':' | b'_' | b'.'))
}

fn resolve_charset(name: &str) -> Option<&'static Encoding> {
    if is_legal_charset_name(name) {
        Encoding::for_label_no_replacement(name.as_bytes())
    } else {
        None
    }
}

/// Byte-level cursor over the content type being parsed.
struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_space(&mut self) {
        while self.peek().is_some_and(is_space) {
            self.pos += 1;
        }
    }

    fn token(&mut self) -> Option<&'a str> {
        let start = self.pos;
        while self.peek().is_some_and(is_token_byte) {
            self.pos += 1;
        }
        let input = self.input;
        let end = self.pos;
        // token bytes are ASCII, so both ends sit on char boundaries
        (end > start).then(|| &input[start..end])
    }

    fn quoted(&mut self) -> Option<&'a str> {
        let start = self.pos;
        if !self.eat(b'"') {
            return None;
        }
        let input = self.input;
        let body = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b'"' => {
                    let end = self.pos;
                    self.pos += 1;
                    return Some(&input[body..end]);
                }
                b'\r' | b'\n' => break,
                _ => self.pos += 1,
            }
        }
        self.pos = start;
        None
    }
}

/// Parsed `Content-Type` value.
///
/// `type` and `subtype` are lowercase; parameter names are lowercase and kept
/// in declaration order, values verbatim. [`charset`](Self::charset) is only
/// set when the `charset` parameter names an encoding this crate can decode;
/// an unknown or malformed name leaves it `None` while the raw parameter stays
/// available through [`parameter`](Self::parameter).
///
/// # Example
///
/// ```ignore
/// let mt = MediaType::parse("Text/HTML; Charset=UTF-8; q=\"a b\"")?;
/// assert_eq!(mt.type_(), "text");
/// assert_eq!(mt.charset(), Some(encoding_rs::UTF_8));
/// assert_eq!(mt.to_string(), "text/html; charset=utf-8; q=\"a b\"");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaType {
    type_: String,
    subtype: String,
    charset: Option<&'static Encoding>,
    parameters: CaseInsensitiveMap<String>,
}

impl MediaType {
    /// Parse a content type string.
    ///
    /// # Errors
    ///
    /// Returns [`MediaTypeError`] when the type or subtype is missing or
    /// contains reserved characters, when `*` is paired with a concrete
    /// subtype, or when any text after the subtype is not a well-formed
    /// `; name=value` clause.
    pub fn parse(input: &str) -> Result<Self, MediaTypeError> {
        let mut scanner = Scanner { input, pos: 0 };

        let type_ = scanner
            .token()
            .ok_or_else(|| MediaTypeError::new(input, 0, EXPECTED_FORMAT))?;
        if !scanner.eat(b'/') {
            return Err(MediaTypeError::new(input, scanner.pos, EXPECTED_FORMAT));
        }
        let subtype = scanner
            .token()
            .ok_or_else(|| MediaTypeError::new(input, scanner.pos, EXPECTED_FORMAT))?;
        if type_ == "*" && subtype != "*" {
            return Err(MediaTypeError::new(input, 0, WILDCARD_TYPE));
        }

        let mut parameters = CaseInsensitiveMap::new();
        let mut charset = None;

        while !scanner.at_end() {
            let clause = scanner.pos;
            let invalid = || MediaTypeError::new(input, clause, EXPECTED_PARAMETER);

            scanner.skip_space();
            if !scanner.eat(b';') {
                return Err(invalid());
            }
            scanner.skip_space();
            let name = scanner.token().ok_or_else(invalid)?;
            if !scanner.eat(b'=') {
                return Err(invalid());
            }
            let value = scanner
                .token()
                .or_else(|| scanner.quoted())
                .ok_or_else(invalid)?;
            scanner.skip_space();

            let name = name.to_ascii_lowercase();
            if name == "charset" {
                charset = resolve_charset(value);
                let stored = match charset {
                    Some(_) => value.to_ascii_lowercase(),
                    None => value.to_owned(),
                };
                parameters.insert(&name, stored);
            } else {
                parameters.insert(&name, value.to_owned());
            }
        }

        Ok(Self {
            type_: type_.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            charset,
            parameters,
        })
    }

    /// Parse a content type, returning `None` instead of an error
    #[must_use]
    pub fn try_parse(input: &str) -> Option<Self> {
        Self::parse(input).ok()
    }

    /// Top-level type, e.g. `text`
    #[must_use]
    pub fn type_(&self) -> &str {
        &self.type_
    }

    /// Subtype, e.g. `plain`
    #[must_use]
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// `type/subtype` without parameters
    #[must_use]
    pub fn essence(&self) -> String {
        format!("{}/{}", self.type_, self.subtype)
    }

    /// `true` for `*/*` and `type/*`
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.subtype == "*"
    }

    /// Encoding named by a recognized `charset` parameter
    #[must_use]
    pub fn charset(&self) -> Option<&'static Encoding> {
        self.charset
    }

    /// Raw value of parameter `name` (case-insensitive)
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// All parameters in declaration order
    #[must_use]
    pub fn parameters(&self) -> &CaseInsensitiveMap<String> {
        &self.parameters
    }
}

impl Hash for MediaType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_.hash(state);
        self.subtype.hash(state);
    }
}

impl FromStr for MediaType {
    type Err = MediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Writes `type/subtype; name=value...`, quoting values that are not tokens.
///
/// Embedded double quotes are written as-is, so a value containing `"`
/// does not survive a second parse unchanged.
impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)?;
        for (name, value) in self.parameters.iter() {
            let name = name.unwrap_or_default();
            if is_token(value) {
                write!(f, "; {name}={value}")?;
            } else {
                write!(f, "; {name}=\"{value}\"")?;
            }
        }
        Ok(())
    }
}
