//! Text encoding used by the string convenience sends.

use serde::Deserialize;

/// Encoding applied when a `&str` is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// 7-bit ASCII; other characters become `?`.
    Ascii,
    /// ISO-8859-1; characters above U+00FF become `?`.
    Latin1,
}

impl TextEncoding {
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }

    /// Decodes received bytes, replacing anything invalid.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                .collect(),
            TextEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_passes_through() {
        assert_eq!(TextEncoding::Utf8.encode("héllo"), "héllo".as_bytes());
        assert_eq!(TextEncoding::Utf8.decode("héllo".as_bytes()), "héllo");
    }

    #[test]
    fn ascii_replaces_non_ascii() {
        assert_eq!(TextEncoding::Ascii.encode("héllo"), b"h?llo");
        assert_eq!(TextEncoding::Ascii.decode(&[b'o', 0xE9, b'k']), "o\u{FFFD}k");
    }

    #[test]
    fn latin1_maps_single_bytes() {
        assert_eq!(TextEncoding::Latin1.encode("é€"), vec![0xE9, b'?']);
        assert_eq!(TextEncoding::Latin1.decode(&[0xE9]), "é");
    }
}
