//! Deterministic fingerprinting: `"v1|" + stage + "|" + model_id + "|" +
//! prompt_version + "|" + term + "|" + kind`, with stage 2 appending a
//! canonical (sorted-keys) serialization of the stage-1 output.

use crate::data::{Fingerprint, Stage1Output, VocabularyEntry};
use sha2::{Digest, Sha256};

pub(crate) fn stage1(entry: &VocabularyEntry, model_id: &str, prompt_version: &str) -> Fingerprint {
    hash(&base_input(1, entry, model_id, prompt_version))
}

pub(crate) fn stage2(
    entry: &VocabularyEntry,
    model_id: &str,
    prompt_version: &str,
    stage1_output: &Stage1Output,
) -> Fingerprint {
    let mut input = base_input(2, entry, model_id, prompt_version);
    input.push('|');
    input.push_str(&canonical_json(stage1_output));
    hash(&input)
}

fn base_input(stage: u8, entry: &VocabularyEntry, model_id: &str, prompt_version: &str) -> String {
    format!(
        "v1|{stage}|{model_id}|{prompt_version}|{}|{}",
        entry.term, entry.kind
    )
}

/// `serde_json::Map` is a `BTreeMap` by default (the `preserve_order` feature
/// is off), so `to_string` already emits keys in sorted order.
fn canonical_json(value: &Stage1Output) -> String {
    let as_value = serde_json::to_value(value).expect("Stage1Output is always representable as JSON");
    serde_json::to_string(&as_value).expect("serde_json::Value always serializes")
}

fn hash(input: &str) -> Fingerprint {
    let digest = Sha256::digest(input.as_bytes());
    Fingerprint::from_hex(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{byte:02x}").unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> VocabularyEntry {
        VocabularyEntry {
            position: 1,
            term: "안녕".to_string(),
            kind: "i".to_string(),
        }
    }

    #[test]
    fn stage1_is_deterministic() {
        let a = stage1(&entry(), "gpt", "v1");
        let b = stage1(&entry(), "gpt", "v1");
        assert_eq!(a, b);
        assert_eq!(a.as_hex().len(), 64);
        assert!(a.as_hex().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn stage1_differs_by_term() {
        let other = VocabularyEntry {
            term: "감사".to_string(),
            ..entry()
        };
        assert_ne!(stage1(&entry(), "gpt", "v1"), stage1(&other, "gpt", "v1"));
    }

    #[test]
    fn stage2_depends_on_stage1_output() {
        let out_a = Stage1Output {
            text: "a".to_string(),
            token_usage: 10,
        };
        let out_b = Stage1Output {
            text: "b".to_string(),
            token_usage: 10,
        };
        assert_ne!(
            stage2(&entry(), "gpt", "v1", &out_a),
            stage2(&entry(), "gpt", "v1", &out_b)
        );
    }

    #[test]
    fn stage2_is_deterministic_regardless_of_field_order_in_source() {
        let out = Stage1Output {
            text: "same".to_string(),
            token_usage: 5,
        };
        assert_eq!(
            stage2(&entry(), "gpt", "v1", &out),
            stage2(&entry(), "gpt", "v1", &out)
        );
    }
}
