//! Catalog encoding detection.
//!
//! Catalogs written by older tools may be UTF-16 (either byte order) or
//! UTF-8 with a BOM. quick-xml only reads UTF-8, so the bytes are decoded
//! with encoding_rs first.

use anyhow::{bail, Context, Result};

/// UTF-16 LE BOM bytes
const UTF16_LE_BOM: [u8; 2] = [0xFF, 0xFE];
/// UTF-16 BE BOM bytes
const UTF16_BE_BOM: [u8; 2] = [0xFE, 0xFF];
/// UTF-8 BOM bytes
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlEncoding {
    Utf16Le,
    Utf16Be,
    Utf8Bom,
    Utf8,
}

/// Detect the encoding of XML content by its BOM.
pub fn detect_encoding(bytes: &[u8]) -> XmlEncoding {
    if bytes.starts_with(&UTF16_LE_BOM) {
        XmlEncoding::Utf16Le
    } else if bytes.starts_with(&UTF16_BE_BOM) {
        XmlEncoding::Utf16Be
    } else if bytes.starts_with(&UTF8_BOM) {
        XmlEncoding::Utf8Bom
    } else {
        XmlEncoding::Utf8
    }
}

/// Decode catalog bytes to a UTF-8 string.
pub fn decode_xml_bytes(bytes: &[u8]) -> Result<String> {
    match detect_encoding(bytes) {
        XmlEncoding::Utf16Le => decode_utf16(encoding_rs::UTF_16LE, &bytes[2..]),
        XmlEncoding::Utf16Be => decode_utf16(encoding_rs::UTF_16BE, &bytes[2..]),
        XmlEncoding::Utf8Bom => {
            String::from_utf8(bytes[3..].to_vec()).context("Invalid UTF-8 after BOM")
        }
        XmlEncoding::Utf8 => String::from_utf8(bytes.to_vec()).context("Invalid UTF-8 encoding"),
    }
}

fn decode_utf16(encoding: &'static encoding_rs::Encoding, bytes: &[u8]) -> Result<String> {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        bail!("{} decoding error", encoding.name());
    }
    Ok(text.into_owned())
}
