// crates/certledger-cli/src/tests/i18n.rs
// ============================================================================
// Module: CLI Catalog Tests
// Description: Unit tests for catalog integrity and placeholder substitution.
// Purpose: Ensure CLI messages stay well-formed.
// Dependencies: certledger-cli i18n module
// ============================================================================

//! ## Overview
//! Verifies the message catalog has unique keys, substitutes placeholders, and
//! falls back to the key for unknown messages.

use std::collections::BTreeSet;

use proptest::prelude::*;

use crate::i18n::CATALOG_ITEMS;
use crate::i18n::MessageArg;
use crate::i18n::catalog;
use crate::i18n::translate;

#[test]
fn catalog_keys_are_unique() {
    let keys: BTreeSet<&str> = CATALOG_ITEMS.iter().map(|(key, _)| *key).collect();
    assert_eq!(keys.len(), CATALOG_ITEMS.len(), "duplicate catalog key");
    assert_eq!(catalog().len(), CATALOG_ITEMS.len());
}

#[test]
fn translate_substitutes_placeholders() {
    let output = translate(
        "error.line",
        vec![
            MessageArg::new("kind", "invalid_transition"),
            MessageArg::new("message", "request 7: complete -> rejected"),
        ],
    );
    assert_eq!(output, "invalid_transition: request 7: complete -> rejected");
}

#[test]
fn translate_falls_back_to_key() {
    assert_eq!(translate("missing.key", Vec::new()), "missing.key");
}

#[test]
fn macro_formats_named_arguments() {
    let output = crate::t!("arg.unknown_counter", counter = "crlNumber");
    assert!(output.starts_with("Unknown counter crlNumber;"));
}

proptest! {
    #[test]
    fn translate_never_drops_argument_values(value in "[a-z0-9_]{1,24}") {
        let output = translate("error.line", vec![
            MessageArg::new("kind", value.clone()),
            MessageArg::new("message", "x"),
        ]);
        prop_assert!(output.starts_with(&value));
        prop_assert!(!output.contains("{kind}"), "output still contains the {{kind}} placeholder");
    }
}
