//! Catalog of well-known charset names.
//!
//! The system library decides which names it accepts; this catalog only
//! gives the common ones a canonical spelling, a few properties and a set of
//! aliases. Anything not listed here can still be passed to
//! [`ConversionContext::open`](crate::ConversionContext::open) verbatim.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Commonly available charsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[allow(non_camel_case_types)]
pub enum Charset {
    // Unicode encodings
    /// UTF-8 Unicode encoding (variable length, 1-4 bytes)
    UTF8,
    /// UTF-16LE Unicode encoding (little endian)
    UTF16LE,
    /// UTF-16BE Unicode encoding (big endian)
    UTF16BE,
    /// UTF-32LE Unicode encoding (little endian)
    UTF32LE,
    /// UTF-32BE Unicode encoding (big endian)
    UTF32BE,

    // ASCII and Latin encodings
    /// ASCII (7-bit, 0-127)
    ASCII,
    /// ISO-8859-1 (Latin-1) - Western European
    ISO_8859_1,
    /// ISO-8859-15 (Latin-9) - Western European with Euro
    ISO_8859_15,

    // Windows code pages
    /// Windows-1250 (Central/Eastern European)
    WINDOWS_1250,
    /// Windows-1252 (Western European)
    WINDOWS_1252,

    // IBM code pages
    /// DOS Code Page 437 (US OEM)
    CP_437,
    /// IBM EBCDIC Code Page 037 (US/Canada)
    EBCDIC_037,

    // Mac encodings
    /// Macintosh Roman
    MAC_ROMAN,

    // Asian encodings
    /// Shift-JIS (Japanese)
    SHIFT_JIS,
    /// EUC-JP (Japanese)
    EUC_JP,
    /// ISO-2022-JP (Japanese, stateful)
    ISO_2022_JP,
    /// GB2312 (Simplified Chinese)
    GB2312,
    /// Big5 (Traditional Chinese)
    BIG5,
    /// EUC-KR (Korean)
    EUC_KR,
}

impl Charset {
    /// Every cataloged charset, in display order
    pub const ALL: [Charset; 19] = [
        Charset::UTF8,
        Charset::UTF16LE,
        Charset::UTF16BE,
        Charset::UTF32LE,
        Charset::UTF32BE,
        Charset::ASCII,
        Charset::ISO_8859_1,
        Charset::ISO_8859_15,
        Charset::WINDOWS_1250,
        Charset::WINDOWS_1252,
        Charset::CP_437,
        Charset::EBCDIC_037,
        Charset::MAC_ROMAN,
        Charset::SHIFT_JIS,
        Charset::EUC_JP,
        Charset::ISO_2022_JP,
        Charset::GB2312,
        Charset::BIG5,
        Charset::EUC_KR,
    ];

    /// Name in the spelling the system library expects
    pub fn name(self) -> &'static str {
        match self {
            Charset::UTF8 => "UTF-8",
            Charset::UTF16LE => "UTF-16LE",
            Charset::UTF16BE => "UTF-16BE",
            Charset::UTF32LE => "UTF-32LE",
            Charset::UTF32BE => "UTF-32BE",
            Charset::ASCII => "US-ASCII",
            Charset::ISO_8859_1 => "ISO-8859-1",
            Charset::ISO_8859_15 => "ISO-8859-15",
            Charset::WINDOWS_1250 => "WINDOWS-1250",
            Charset::WINDOWS_1252 => "WINDOWS-1252",
            Charset::CP_437 => "CP437",
            Charset::EBCDIC_037 => "IBM037",
            Charset::MAC_ROMAN => "MACINTOSH",
            Charset::SHIFT_JIS => "SHIFT_JIS",
            Charset::EUC_JP => "EUC-JP",
            Charset::ISO_2022_JP => "ISO-2022-JP",
            Charset::GB2312 => "GB2312",
            Charset::BIG5 => "BIG5",
            Charset::EUC_KR => "EUC-KR",
        }
    }

    /// Grouping used by the `list` command
    pub fn category(self) -> &'static str {
        match self {
            Charset::UTF8
            | Charset::UTF16LE
            | Charset::UTF16BE
            | Charset::UTF32LE
            | Charset::UTF32BE => "unicode",
            Charset::ASCII => "ascii",
            Charset::ISO_8859_1 | Charset::ISO_8859_15 => "iso",
            Charset::WINDOWS_1250 | Charset::WINDOWS_1252 => "windows",
            Charset::CP_437 => "dos",
            Charset::EBCDIC_037 => "ebcdic",
            Charset::MAC_ROMAN => "mac",
            Charset::SHIFT_JIS
            | Charset::EUC_JP
            | Charset::ISO_2022_JP
            | Charset::GB2312
            | Charset::BIG5
            | Charset::EUC_KR => "asian",
        }
    }

    /// One-line description
    pub fn description(self) -> &'static str {
        match self {
            Charset::UTF8 => "Unicode Transformation Format 8-bit, variable-length encoding",
            Charset::UTF16LE => "Unicode Transformation Format 16-bit, little-endian",
            Charset::UTF16BE => "Unicode Transformation Format 16-bit, big-endian",
            Charset::UTF32LE => "Unicode Transformation Format 32-bit, little-endian",
            Charset::UTF32BE => "Unicode Transformation Format 32-bit, big-endian",
            Charset::ASCII => "American Standard Code for Information Interchange (7-bit)",
            Charset::ISO_8859_1 => "Latin alphabet No. 1, Western European",
            Charset::ISO_8859_15 => "Latin alphabet No. 9, Western European with Euro symbol",
            Charset::WINDOWS_1250 => "Windows code page for Central and Eastern European languages",
            Charset::WINDOWS_1252 => "Windows code page for Western European languages",
            Charset::CP_437 => "Original IBM PC character set with box-drawing characters",
            Charset::EBCDIC_037 => "IBM Extended Binary Coded Decimal Interchange Code (US/Canada)",
            Charset::MAC_ROMAN => "Classic Macintosh Roman character encoding",
            Charset::SHIFT_JIS => "Japanese multi-byte encoding used on Windows",
            Charset::EUC_JP => "Extended Unix Code for Japanese",
            Charset::ISO_2022_JP => "7-bit Japanese encoding switched by escape sequences",
            Charset::GB2312 => "Simplified Chinese national standard",
            Charset::BIG5 => "Traditional Chinese encoding",
            Charset::EUC_KR => "Extended Unix Code for Korean",
        }
    }

    /// Check if this charset uses variable-length character representation
    pub fn is_multibyte(self) -> bool {
        matches!(self.category(), "unicode" | "asian")
    }

    /// Whether the encoder carries shift state that must be flushed on close
    pub fn is_stateful(self) -> bool {
        matches!(self, Charset::ISO_2022_JP)
    }

    /// Get the byte order mark (BOM) for this charset if it has one
    pub fn bom(self) -> Option<&'static [u8]> {
        match self {
            Charset::UTF8 => Some(&[0xEF, 0xBB, 0xBF]),
            Charset::UTF16LE => Some(&[0xFF, 0xFE]),
            Charset::UTF16BE => Some(&[0xFE, 0xFF]),
            Charset::UTF32LE => Some(&[0xFF, 0xFE, 0x00, 0x00]),
            Charset::UTF32BE => Some(&[0x00, 0x00, 0xFE, 0xFF]),
            _ => None,
        }
    }

    /// Detect a byte order mark at the start of `data`.
    ///
    /// Returns the charset and the BOM length. UTF-32LE is checked before
    /// UTF-16LE since their marks share a prefix.
    pub fn sniff_bom(data: &[u8]) -> Option<(Charset, usize)> {
        [
            Charset::UTF32LE,
            Charset::UTF32BE,
            Charset::UTF8,
            Charset::UTF16LE,
            Charset::UTF16BE,
        ]
        .into_iter()
        .find_map(|charset| {
            let bom = charset.bom()?;
            data.starts_with(bom).then_some((charset, bom.len()))
        })
    }

    /// Canonical library name for `name`: the cataloged spelling when the
    /// name is a known alias, otherwise `name` unchanged.
    pub fn canonical_name(name: &str) -> &str {
        match name.parse::<Charset>() {
            Ok(charset) => charset.name(),
            Err(_) => name,
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a name is not in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCharset(pub String);

impl fmt::Display for UnknownCharset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown charset: {}", self.0)
    }
}

impl std::error::Error for UnknownCharset {}

impl FromStr for Charset {
    type Err = UnknownCharset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let charset = match s.to_ascii_uppercase().as_str() {
            "UTF8" | "UTF-8" => Charset::UTF8,
            "UTF16LE" | "UTF-16LE" => Charset::UTF16LE,
            "UTF16BE" | "UTF-16BE" => Charset::UTF16BE,
            "UTF32LE" | "UTF-32LE" => Charset::UTF32LE,
            "UTF32BE" | "UTF-32BE" => Charset::UTF32BE,
            "ASCII" | "US-ASCII" => Charset::ASCII,

            "ISO88591" | "ISO-8859-1" | "LATIN1" => Charset::ISO_8859_1,
            "ISO885915" | "ISO-8859-15" | "LATIN9" => Charset::ISO_8859_15,

            "WINDOWS1250" | "WINDOWS-1250" | "WIN1250" | "CP1250" => Charset::WINDOWS_1250,
            "WINDOWS1252" | "WINDOWS-1252" | "WIN1252" | "CP1252" => Charset::WINDOWS_1252,

            "CP437" | "DOS437" | "IBM437" => Charset::CP_437,
            "EBCDIC037" | "IBM037" | "CP037" => Charset::EBCDIC_037,

            "MACROMAN" | "MAC-ROMAN" | "MACINTOSH" | "MAC" => Charset::MAC_ROMAN,

            "SHIFTJIS" | "SHIFT-JIS" | "SHIFT_JIS" | "SJIS" => Charset::SHIFT_JIS,
            "EUCJP" | "EUC-JP" | "EUC_JP" => Charset::EUC_JP,
            "ISO2022JP" | "ISO-2022-JP" => Charset::ISO_2022_JP,
            "GB2312" => Charset::GB2312,
            "BIG5" | "BIG-5" => Charset::BIG5,
            "EUCKR" | "EUC-KR" | "EUC_KR" => Charset::EUC_KR,

            _ => return Err(UnknownCharset(s.to_string())),
        };

        Ok(charset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConversionContext;

    #[test]
    fn test_alias_parsing() {
        assert_eq!("utf8".parse::<Charset>().unwrap(), Charset::UTF8);
        assert_eq!("latin1".parse::<Charset>().unwrap(), Charset::ISO_8859_1);
        assert_eq!("cp1252".parse::<Charset>().unwrap(), Charset::WINDOWS_1252);
        assert_eq!("sjis".parse::<Charset>().unwrap(), Charset::SHIFT_JIS);
        assert!("KLINGON".parse::<Charset>().is_err());
    }

    #[test]
    fn test_canonical_name_passes_unknown_through() {
        assert_eq!(Charset::canonical_name("latin1"), "ISO-8859-1");
        assert_eq!(Charset::canonical_name("KOI8-R"), "KOI8-R");
    }

    #[test]
    fn test_every_name_parses_back() {
        for charset in Charset::ALL {
            assert_eq!(charset.name().parse::<Charset>().unwrap(), charset);
        }
    }

    #[test]
    fn test_sniff_bom() {
        assert_eq!(
            Charset::sniff_bom(&[0xEF, 0xBB, 0xBF, b'H']),
            Some((Charset::UTF8, 3))
        );
        assert_eq!(
            Charset::sniff_bom(&[0xFF, 0xFE, b'H', 0x00]),
            Some((Charset::UTF16LE, 2))
        );
        assert_eq!(
            Charset::sniff_bom(&[0xFF, 0xFE, 0x00, 0x00, b'H']),
            Some((Charset::UTF32LE, 4))
        );
        assert_eq!(Charset::sniff_bom(b"plain"), None);
    }

    #[test]
    fn test_properties() {
        assert!(Charset::UTF8.is_multibyte());
        assert!(!Charset::WINDOWS_1252.is_multibyte());
        assert!(Charset::ISO_2022_JP.is_stateful());
        assert_eq!(Charset::WINDOWS_1252.bom(), None);
        assert_eq!(Charset::EBCDIC_037.category(), "ebcdic");
    }

    #[test]
    fn test_core_names_open() {
        for charset in [
            Charset::UTF8,
            Charset::UTF16LE,
            Charset::UTF16BE,
            Charset::UTF32LE,
            Charset::UTF32BE,
            Charset::ASCII,
            Charset::ISO_8859_1,
        ] {
            let mut context = ConversionContext::open(charset.name(), "UTF-8").unwrap();
            context.close().unwrap();
        }
    }
}
