//! Document number formatting.
//!
//! Number *allocation* (the atomic per-account counter) lives in the
//! infrastructure layer; this module only owns the kinds and the display
//! format: `{prefix}-{year}-{zero-padded sequence}`.

use serde::{Deserialize, Serialize};

/// Width of the zero-padded sequence part.
const SEQUENCE_PAD: usize = 4;

/// The kinds of numbered documents, one counter per kind per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Quote,
    Invoice,
}

impl DocumentKind {
    /// Number prefix: DEV for quotes (devis), FAC for invoices (factures).
    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::Quote => "DEV",
            DocumentKind::Invoice => "FAC",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Quote => "quote",
            DocumentKind::Invoice => "invoice",
        }
    }
}

/// Format a document number from its allocated sequence value.
pub fn format_document_number(kind: DocumentKind, year: i32, sequence: u64) -> String {
    format!(
        "{}-{}-{:0>width$}",
        kind.prefix(),
        year,
        sequence,
        width = SEQUENCE_PAD
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_zero_padding() {
        assert_eq!(
            format_document_number(DocumentKind::Quote, 2026, 7),
            "DEV-2026-0007"
        );
        assert_eq!(
            format_document_number(DocumentKind::Invoice, 2026, 42),
            "FAC-2026-0042"
        );
    }

    #[test]
    fn padding_does_not_truncate_large_sequences() {
        assert_eq!(
            format_document_number(DocumentKind::Invoice, 2026, 123456),
            "FAC-2026-123456"
        );
    }
}
