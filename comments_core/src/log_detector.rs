//! Recognizes pasted diagnostic logs so they can be bounced to a paste
//! service instead of flooding a comment thread.

use regex::Regex;
use std::sync::LazyLock;

static LOG_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // [Error: ...], [Warning: ...], [Info: ...]
        r"(?i)\[\s*(error|warn|warning|info|debug|trace|fatal|critical|verbose|log)\s*:[^\]]*\]",
        // 2024-01-02 13:14:15 / 2024-01-02T13:14:15 at the start of a line
        r"(?m)^\s*\[?\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}",
        // [13:14:15] or [13:14:15.123] line prefixes
        r"(?m)^\s*\[\d{2}:\d{2}:\d{2}(\.\d+)?\]",
        // ISO timestamp followed by an IPv4 address on the same line
        r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?[^\n]*\b\d{1,3}(\.\d{1,3}){3}\b",
        // IPv4:port
        r"\b\d{1,3}(\.\d{1,3}){3}:\d{2,5}\b",
        // document store ids
        r#"(?i)"?_id"?\s*[:=]\s*["']?[0-9a-f]{24}\b"#,
        r#"ObjectId\(\s*["'][0-9a-fA-F]{24}["']\s*\)"#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("log pattern must compile"))
    .collect()
});

/// Whether `text` structurally resembles a pasted log.
pub fn looks_like_log(text: &str) -> bool {
    LOG_PATTERNS.iter().any(|pattern| pattern.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_tags_are_logs() {
        assert!(looks_like_log("[Error: Database connection failed]"));
        assert!(looks_like_log("got this: [warning: texture missing] help"));
        assert!(looks_like_log("[INFO : loaded 3 plugins]"));
    }

    #[test]
    fn test_timestamped_lines_are_logs() {
        assert!(looks_like_log(
            "2024-03-01 12:00:01 Loading assets\n2024-03-01 12:00:02 Done"
        ));
        assert!(looks_like_log("some text\n[12:00:01] Game started"));
    }

    #[test]
    fn test_timestamp_with_ip_is_log() {
        assert!(looks_like_log(
            "request at 2024-03-01T12:00:01Z from 192.168.1.20 failed"
        ));
        assert!(looks_like_log("connecting to 10.0.0.5:27015 ..."));
    }

    #[test]
    fn test_document_ids_are_logs() {
        assert!(looks_like_log(r#"{"_id": "5f8d0d55b54764421b7156c9", "name": "x"}"#));
        assert!(looks_like_log(r#"ObjectId("5f8d0d55b54764421b7156c9")"#));
    }

    #[test]
    fn test_prose_is_not_a_log() {
        assert!(!looks_like_log("This is a normal comment without log content."));
        assert!(!looks_like_log("Great mod! Works with version 1.2.3 [tested]"));
        assert!(!looks_like_log("I played it on 2024-03-01 and loved it."));
        assert!(!looks_like_log("Note: error handling could be better."));
    }

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(LOG_PATTERNS.len(), 7);
    }

    #[test]
    fn test_every_pattern_fires_on_its_sample() {
        let samples = [
            "[Error: boom]",
            "2024-03-01 12:00:01 start",
            "[12:00:01] start",
            "2024-03-01T12:00:01Z from 192.168.1.20",
            "10.0.0.5:27015",
            r#""_id": "507f1f77bcf86cd799439011""#,
            r#"ObjectId("507f1f77bcf86cd799439011")"#,
        ];

        for (pattern, sample) in LOG_PATTERNS.iter().zip(samples) {
            assert!(pattern.is_match(sample), "{} missed {sample:?}", pattern.as_str());
        }
    }
}
