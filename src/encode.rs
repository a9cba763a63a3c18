use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Text encoding applied to records before they reach the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// UTF-8, the default. Every record is representable.
    #[default]
    Utf8,
    /// ISO-8859-1. Code points above U+00FF are unmappable.
    Latin1,
    /// 7-bit ASCII. Code points above U+007F are unmappable.
    Ascii,
}

impl Encoding {
    /// Conventional name of the encoding, used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "latin-1",
            Encoding::Ascii => "ascii",
        }
    }
}

/// How characters outside the target encoding are handled.
///
/// The default is `Ignore`: unmappable characters are silently dropped
/// rather than failing the emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnicodePolicy {
    /// Fail the emit with [`Error::Encoding`]. The record is not written.
    Strict,
    /// Drop the unmappable character.
    #[default]
    Ignore,
    /// Substitute `?` for the unmappable character.
    Replace,
}

/// Encode a record into the target encoding under the given policy.
pub(crate) fn encode_record<'a>(
    record: &'a str,
    encoding: Encoding,
    policy: UnicodePolicy,
) -> Result<Cow<'a, [u8]>> {
    let max = match encoding {
        Encoding::Utf8 => return Ok(Cow::Borrowed(record.as_bytes())),
        Encoding::Latin1 => 0xFF,
        Encoding::Ascii => 0x7F,
    };
    if record.is_ascii() {
        return Ok(Cow::Borrowed(record.as_bytes()));
    }

    let mut out = Vec::with_capacity(record.len());
    for ch in record.chars() {
        let cp = ch as u32;
        if cp <= max {
            out.push(cp as u8);
        } else {
            match policy {
                UnicodePolicy::Strict => {
                    return Err(Error::Encoding {
                        encoding: encoding.name(),
                        ch,
                    });
                }
                UnicodePolicy::Ignore => {}
                UnicodePolicy::Replace => out.push(b'?'),
            }
        }
    }
    Ok(Cow::Owned(out))
}
