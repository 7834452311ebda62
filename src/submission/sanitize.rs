//! Storage-safe file names.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::util::random_hex_id;

pub const MAX_FILENAME_CHARS: usize = 100;
pub const FALLBACK_FILENAME: &str = "document.pdf";
/// Hex digits in the per-request storage prefix.
pub const PREFIX_LEN: usize = 8;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Reduce an uploaded file name to alphanumerics, `_`, `-` and `.`, at most
/// 100 characters, never empty. Applying it twice changes nothing.
pub fn sanitize_filename(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let kept: String = base
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '_' | '-' | '.'))
        .collect();
    let name = WHITESPACE_RUN.replace_all(&kept, "_").into_owned();

    let name = truncate_keeping_extension(name);
    if name.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        name
    }
}

fn truncate_keeping_extension(name: String) -> String {
    if name.chars().count() <= MAX_FILENAME_CHARS {
        return name;
    }
    if let Some(dot) = name.rfind('.').filter(|&dot| dot > 0) {
        let ext = &name[dot..];
        let ext_chars = ext.chars().count();
        if ext_chars < MAX_FILENAME_CHARS {
            let stem: String = name[..dot]
                .chars()
                .take(MAX_FILENAME_CHARS - ext_chars)
                .collect();
            return stem + ext;
        }
    }
    name.chars().take(MAX_FILENAME_CHARS).collect()
}

/// `<prefix>_<sanitized>`.
pub fn storage_name(prefix: &str, sanitized: &str) -> String {
    format!("{}_{}", prefix, sanitized)
}

/// A storage name with a fresh random prefix, so concurrent uploads of the
/// same file never share a path.
pub fn unique_storage_name(sanitized: &str) -> String {
    storage_name(&random_hex_id(PREFIX_LEN), sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "paper.pdf",
        "My Thesis (final) v2.pdf",
        "../../etc/passwd",
        "C:\\Users\\ada\\Desktop\\draft\tcopy.pdf",
        "résumé – 2024.pdf",
        "  leading and trailing  .pdf",
        "<script>alert(1)</script>.pdf",
        "",
        "!!!***",
        "/",
        "no_extension",
        ".hidden.pdf",
        "a\u{3000}b\u{00a0}c.pdf",
    ];

    fn allowed(c: char) -> bool {
        c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
    }

    #[test]
    fn output_charset_length_and_non_empty() {
        let long = format!("{}.pdf", "x".repeat(300));
        let long_spaces = "word ".repeat(60);
        let mut inputs: Vec<&str> = SAMPLES.to_vec();
        inputs.push(&long);
        inputs.push(&long_spaces);
        for input in inputs {
            let out = sanitize_filename(input);
            assert!(!out.is_empty(), "{input:?}");
            assert!(out.chars().count() <= MAX_FILENAME_CHARS, "{input:?}");
            assert!(out.chars().all(allowed), "{input:?} -> {out:?}");
        }
    }

    #[test]
    fn sanitizing_is_idempotent() {
        let long = format!("{} name.pdf", "é".repeat(150));
        let mut inputs: Vec<&str> = SAMPLES.to_vec();
        inputs.push(&long);
        for input in inputs {
            let once = sanitize_filename(input);
            assert_eq!(sanitize_filename(&once), once, "{input:?}");
        }
    }

    #[test]
    fn strips_directories_and_collapses_whitespace() {
        assert_eq!(sanitize_filename("../../secret report.pdf"), "secret_report.pdf");
        assert_eq!(sanitize_filename("C:\\tmp\\a  b\t c.pdf"), "a_b_c.pdf");
        assert_eq!(sanitize_filename("My Thesis (final).pdf"), "My_Thesis_final.pdf");
    }

    #[test]
    fn falls_back_when_nothing_survives() {
        assert_eq!(sanitize_filename(""), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("***"), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("dir/"), FALLBACK_FILENAME);
    }

    #[test]
    fn truncation_preserves_extension() {
        let out = sanitize_filename(&format!("{}.pdf", "a".repeat(250)));
        assert_eq!(out.chars().count(), MAX_FILENAME_CHARS);
        assert!(out.ends_with(".pdf"));
        assert!(out.starts_with("aaaa"));
    }

    #[test]
    fn oversized_extension_is_cut_with_the_name() {
        let out = sanitize_filename(&format!("a.{}", "b".repeat(200)));
        assert_eq!(out.chars().count(), MAX_FILENAME_CHARS);
    }

    #[test]
    fn identical_names_get_distinct_storage_names() {
        let sanitized = sanitize_filename("paper.pdf");
        assert_ne!(
            storage_name("0000aaaa", &sanitized),
            storage_name("0000bbbb", &sanitized)
        );
        let a = unique_storage_name(&sanitized);
        let b = unique_storage_name(&sanitized);
        assert_ne!(a, b);
        assert!(a.ends_with("_paper.pdf"));
        assert_eq!(a.len(), PREFIX_LEN + 1 + sanitized.len());
    }
}
