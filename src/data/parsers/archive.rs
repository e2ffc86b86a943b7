//! In-memory zip helpers shared by the KMZ and shapefile codecs.

use std::io::{Cursor, Read};
use zip::result::ZipError;
use zip::ZipArchive;

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// Starts with a local file header signature
pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(&ZIP_MAGIC)
}

/// Names of all entries in the archive, in central-directory order
pub fn entry_names(bytes: &[u8]) -> Result<Vec<String>, ZipError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    (0..archive.len())
        .map(|index| archive.by_index(index).map(|file| file.name().to_owned()))
        .collect()
}

/// First entry whose name ends with `suffix`, case-insensitively.
/// macOS resource-fork entries are ignored.
pub fn find_entry<'a>(names: &'a [String], suffix: &str) -> Option<&'a str> {
    let suffix = suffix.to_ascii_lowercase();
    names
        .iter()
        .filter(|name| !name.starts_with("__MACOSX/"))
        .find(|name| name.to_ascii_lowercase().ends_with(&suffix))
        .map(String::as_str)
}

/// Reads a whole entry into memory
pub fn read_entry(bytes: &[u8], name: &str) -> Result<Vec<u8>, ZipError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut file = archive.by_name(name)?;
    let mut buffer = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut buffer)?;
    Ok(buffer)
}


#[cfg(test)]
mod tests {
    use super::test_support::build_zip;
    use super::*;

    #[test]
    fn test_entries_and_lookup() {
        let bytes = build_zip(&[
            ("__MACOSX/._doc.kml", b"junk"),
            ("nested/deeper/other.KML", b"<kml/>"),
            ("doc.kml", b"<kml></kml>"),
        ]);
        assert!(is_zip(&bytes));

        let names = entry_names(&bytes).unwrap();
        assert_eq!(
            names,
            vec!["__MACOSX/._doc.kml", "nested/deeper/other.KML", "doc.kml"]
        );
        assert_eq!(find_entry(&names, ".kml"), Some("nested/deeper/other.KML"));
        assert_eq!(read_entry(&bytes, "doc.kml").unwrap(), b"<kml></kml>");
        assert!(find_entry(&names, ".shp").is_none());
    }

    #[test]
    fn test_not_a_zip() {
        assert!(!is_zip(b"{}"));
        assert!(entry_names(b"definitely not a zip").is_err());
    }
}
