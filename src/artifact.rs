use crate::canvas::Document;
use crate::error::ReportError;
use crate::metrics::DocumentMetrics;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Stem used when the work item id sanitizes to nothing.
pub const FALLBACK_FILE_STEM: &str = "Test_Evidence_Report";

const FORBIDDEN_FILE_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|', '#', '%', '&', '{', '}'];

/// Derives the download name from a work item id: trimmed, whitespace runs
/// collapsed to `_`, characters unsafe in common file systems removed.
pub fn file_name_for(work_item_id: &str) -> String {
    let collapsed = work_item_id.split_whitespace().collect::<Vec<_>>().join("_");
    let stem: String = collapsed
        .chars()
        .filter(|ch| !FORBIDDEN_FILE_CHARS.contains(ch))
        .collect();
    if stem.is_empty() {
        format!("{FALLBACK_FILE_STEM}.pdf")
    } else {
        format!("{stem}.pdf")
    }
}

/// A finished report, ready to hand to the host for download or storage.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub metrics: DocumentMetrics,
    /// Laid-out pages, kept only when the engine is asked to retain them.
    pub document: Option<Document>,
}

impl Artifact {
    /// Lowercase hex SHA-256 of the PDF bytes.
    pub fn fingerprint(&self) -> String {
        sha256_hex(&self.bytes)
    }

    /// Writes the PDF as `dir/file_name`, creating `dir` if needed.
    pub fn save_to_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf, ReportError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(bytes: &[u8]) -> Artifact {
        Artifact {
            file_name: file_name_for("REL-9"),
            bytes: bytes.to_vec(),
            page_count: 1,
            metrics: DocumentMetrics::default(),
            document: None,
        }
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(file_name_for("  PBI 123 #456  "), "PBI_123_456.pdf");
        assert_eq!(file_name_for("REL-9"), "REL-9.pdf");
        assert_eq!(file_name_for("a\t\n b"), "a_b.pdf");
        assert_eq!(file_name_for("x/y\\z:{1}"), "xyz1.pdf");
    }

    #[test]
    fn empty_file_names_fall_back() {
        assert_eq!(file_name_for("???"), "Test_Evidence_Report.pdf");
        assert_eq!(file_name_for(""), "Test_Evidence_Report.pdf");
        assert_eq!(file_name_for("   "), "Test_Evidence_Report.pdf");
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        assert_eq!(
            artifact(b"abc").fingerprint(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn save_to_dir_writes_named_file() {
        let dir = std::env::temp_dir().join(format!(
            "evidence_report_artifact_{}",
            std::process::id()
        ));
        let saved = artifact(b"%PDF-1.7").save_to_dir(&dir).expect("save");
        assert_eq!(saved.file_name().and_then(|n| n.to_str()), Some("REL-9.pdf"));
        assert_eq!(std::fs::read(&saved).expect("read back"), b"%PDF-1.7");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
