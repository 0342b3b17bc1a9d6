#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Filename conversion between the OS locale charset and UTF-8.
//!
//! The manifest persists names as UTF-8 regardless of the locale the
//! process runs under, so every name crossing the store boundary passes
//! through this crate. The locale charset is detected once, from `LC_ALL`,
//! `LC_CTYPE`, and `LANG` in that order, and cached for the lifetime of
//! the process; after initialization the converter is immutable and safe
//! to read concurrently.
//!
//! When the resolved charset is UTF-8 both directions validate and borrow
//! instead of allocating, which keeps the common case zero-copy. Other
//! charsets transcode through `encoding_rs` without BOM handling, and any
//! sequence invalid under the source charset fails with
//! [`EncodingError`] rather than being replaced silently.
//!
//! # Examples
//!
//! ```
//! use std::borrow::Cow;
//!
//! // On a UTF-8 locale the conversion is the identity and borrows.
//! let name = encoding::to_utf8(b"notes.txt").unwrap();
//! assert_eq!(name.as_ref(), "notes.txt");
//! assert!(matches!(name, Cow::Borrowed(_)));
//! ```

use std::borrow::Cow;
use std::env;
use std::sync::OnceLock;

use encoding_rs::Encoding;

static SYSTEM_ENCODING: OnceLock<&'static Encoding> = OnceLock::new();

/// Error raised when a name cannot round-trip through the locale charset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    /// The input contains sequences invalid under the source charset.
    #[error("name {name:?} is not valid {charset}")]
    Undecodable {
        /// Charset the input was expected to be encoded in.
        charset: &'static str,
        /// Lossy rendition of the offending name, for diagnostics.
        name: String,
    },
    /// The input cannot be expressed in the target charset.
    #[error("name {name:?} cannot be represented in {charset}")]
    Unrepresentable {
        /// Charset the output was supposed to use.
        charset: &'static str,
        /// The name that failed to encode.
        name: String,
    },
}

/// Detects and caches the locale charset.
///
/// Calling this is optional; the first conversion initializes the cache
/// from the environment if nothing did so earlier. Tools call it during
/// startup so detection happens before any filesystem work.
pub fn init() {
    let _ = SYSTEM_ENCODING.set(detect());
}

/// Name of the charset conversions are performed against.
#[must_use]
pub fn system_charset() -> &'static str {
    system_encoding().name()
}

/// Converts a name from the locale charset to UTF-8.
///
/// On a UTF-8 locale the input is validated and borrowed; no allocation
/// takes place for well-formed names.
pub fn to_utf8(name: &[u8]) -> Result<Cow<'_, str>, EncodingError> {
    decode_with(system_encoding(), name)
}

/// Converts a UTF-8 name back to the locale charset.
pub fn from_utf8(name: &str) -> Result<Cow<'_, [u8]>, EncodingError> {
    encode_with(system_encoding(), name)
}

fn system_encoding() -> &'static Encoding {
    SYSTEM_ENCODING.get_or_init(detect)
}

fn detect() -> &'static Encoding {
    for variable in ["LC_ALL", "LC_CTYPE", "LANG"] {
        match env::var(variable) {
            Ok(value) if !value.is_empty() => return charset_of(&value),
            _ => {}
        }
    }
    encoding_rs::UTF_8
}

/// Resolves a locale name such as `be_BY.UTF-8@latin` to its codeset.
///
/// Locales without a codeset suffix (`C`, `POSIX`) and unknown labels
/// resolve to UTF-8, which accepts every ASCII name those locales can
/// produce.
fn charset_of(locale: &str) -> &'static Encoding {
    let codeset = locale
        .split('.')
        .nth(1)
        .map(|suffix| suffix.split('@').next().unwrap_or(suffix));
    match codeset {
        Some(label) => Encoding::for_label(label.as_bytes()).unwrap_or(encoding_rs::UTF_8),
        None => encoding_rs::UTF_8,
    }
}

fn decode_with<'a>(
    encoding: &'static Encoding,
    name: &'a [u8],
) -> Result<Cow<'a, str>, EncodingError> {
    if encoding == encoding_rs::UTF_8 {
        return match std::str::from_utf8(name) {
            Ok(valid) => Ok(Cow::Borrowed(valid)),
            Err(_) => Err(EncodingError::Undecodable {
                charset: encoding.name(),
                name: String::from_utf8_lossy(name).into_owned(),
            }),
        };
    }

    let (decoded, had_errors) = encoding.decode_without_bom_handling(name);
    if had_errors {
        return Err(EncodingError::Undecodable {
            charset: encoding.name(),
            name: String::from_utf8_lossy(name).into_owned(),
        });
    }
    Ok(decoded)
}

fn encode_with<'a>(
    encoding: &'static Encoding,
    name: &'a str,
) -> Result<Cow<'a, [u8]>, EncodingError> {
    if encoding == encoding_rs::UTF_8 {
        return Ok(Cow::Borrowed(name.as_bytes()));
    }

    let (encoded, _, had_errors) = encoding.encode(name);
    if had_errors {
        return Err(EncodingError::Unrepresentable {
            charset: encoding.name(),
            name: name.to_owned(),
        });
    }
    Ok(encoded)
}
