//! Reading and writing the exchange file in Jw_cad's native encoding

use std::io::BufRead;
use std::path::Path;

use encoding_rs::SHIFT_JIS;

use super::ExchangeDocument;
use crate::error::{BridgeError, Result};

/// Read and decode the exchange file. Undecodable bytes are replaced, never
/// fatal; only a missing or unreadable file is an error.
pub fn read_exchange_file(path: &Path) -> Result<ExchangeDocument> {
    let bytes = std::fs::read(path).map_err(|e| BridgeError::read(path, e))?;
    let (text, had_errors) = SHIFT_JIS.decode_without_bom_handling(&bytes);
    if had_errors {
        log::warn!(
            "{} contains bytes that are not valid Shift_JIS; they were replaced",
            path.display()
        );
    }
    Ok(ExchangeDocument::parse(&text))
}

/// Encode `text` and replace the exchange file in one step
pub fn write_exchange_file(path: &Path, text: &str) -> Result<()> {
    let (bytes, _, had_errors) = SHIFT_JIS.encode(text);
    if had_errors {
        log::warn!(
            "some characters written to {} have no Shift_JIS form",
            path.display()
        );
    }
    crate::fsio::replace_contents(path, &bytes).map_err(|e| BridgeError::write(path, e))
}

/// First line of a file, trimmed. Only reads up to the first newline.
pub fn read_first_line(path: &Path) -> std::io::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let mut buf = Vec::new();
    reader.read_until(b'\n', &mut buf)?;
    let (text, _) = SHIFT_JIS.decode_without_bom_handling(&buf);
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Modifications;

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("JWC_TEMP.TXT");
        assert!(matches!(
            read_exchange_file(&path),
            Err(BridgeError::MissingFile(p)) if p == path
        ));
    }

    #[test]
    fn test_shift_jis_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("JWC_TEMP.TXT");
        let (bytes, _, _) = SHIFT_JIS.encode("hq\nch 0 0 1 0 和室\n0 0 1 1\n");
        std::fs::write(&path, &bytes).unwrap();

        let doc = read_exchange_file(&path).unwrap();
        assert_eq!(doc.texts().next().unwrap().fields.last().unwrap(), "和室");
        assert_eq!(read_first_line(&path).unwrap(), "hq");

        write_exchange_file(&path, &doc.serialize(&Modifications::default())).unwrap();
        let (expected, _, _) = SHIFT_JIS.encode("ch 0 0 1 0 和室\n0 0 1 1\n");
        assert_eq!(std::fs::read(&path).unwrap(), expected.into_owned());
    }
}
