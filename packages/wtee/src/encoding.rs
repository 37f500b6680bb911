//! Input text encodings and their lossy decoders.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Encoding of the bytes arriving on stdin.
///
/// Decoding never fails: malformed input is replaced with U+FFFD.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum InputEncoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    #[value(name = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    #[value(name = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
    #[serde(rename = "ascii", alias = "us-ascii")]
    #[value(name = "ascii", alias = "us-ascii")]
    Ascii,
}

impl InputEncoding {
    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "latin-1",
            Self::Ascii => "ascii",
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Cow<'_, str> {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes),
            Self::Latin1 => Cow::Owned(bytes.iter().map(|&b| b as char).collect()),
            Self::Ascii => {
                if bytes.is_ascii() {
                    String::from_utf8_lossy(bytes)
                } else {
                    Cow::Owned(
                        bytes
                            .iter()
                            .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                            .collect(),
                    )
                }
            }
        }
    }

    /// Number of trailing bytes that start a character not yet complete.
    ///
    /// Only UTF-8 has multi-byte characters; the single-byte encodings
    /// always return 0.
    pub fn incomplete_suffix(self, bytes: &[u8]) -> usize {
        match self {
            Self::Utf8 => incomplete_utf8_suffix(bytes),
            Self::Latin1 | Self::Ascii => 0,
        }
    }
}

impl fmt::Display for InputEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scans back over at most three bytes looking for a lead byte whose
/// continuation bytes have not all arrived yet.
///
/// Lead bytes are never continuation bytes, so cutting in front of one keeps
/// lossy decoding identical to decoding the whole stream at once.
fn incomplete_utf8_suffix(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let byte = bytes[len - back];
        let width = match byte {
            0x00..=0x7F => return 0,
            0x80..=0xBF => continue,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return 0,
        };
        return if width > back { back } else { 0 };
    }
    0
}
