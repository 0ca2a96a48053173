//! Static safety screen for plugin source.
//!
//! A line-oriented denylist scan. Blank and comment lines are skipped; a
//! pattern matches when the trimmed line starts with it or it is preceded by
//! a space, tab, comma or semicolon.

use std::collections::BTreeMap;

/// Denylisted patterns and the message reported for each.
pub const DENYLIST: &[(&str, &str)] = &[
    ("import ", "Imports are not allowed in plugin code"),
    ("extern crate", "Imports are not allowed in plugin code"),
    ("globals", "Global vars access is not allowed in plugin code"),
    ("locals", "Local vars dict access is not allowed in plugin code"),
    ("memoryview", "Pointer handling is unsafe in plugin code"),
    ("std::ptr", "Pointer handling is unsafe in plugin code"),
    ("unsafe", "Unsafe blocks are not allowed in plugin code"),
    (
        "self.log.",
        "Logger object cannot be used directly in plugin code - please use API",
    ),
    (
        "tracing::",
        "Logger object cannot be used directly in plugin code - please use API",
    ),
    ("vars(", "Usage of `vars(obj)` not allowed in plugin code"),
    ("dir(", "Usage of `dir(obj)` not allowed in plugin code"),
];

const PRECEDING: [char; 4] = [' ', '\t', ',', ';'];

/// Violations grouped by message, each with 1-based line numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenReport {
    pub violations: BTreeMap<String, Vec<usize>>,
}

impl ScreenReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Total flagged (message, line) pairs.
    pub fn violation_count(&self) -> usize {
        self.violations.values().map(Vec::len).sum()
    }

    pub fn render(&self) -> String {
        self.violations
            .iter()
            .map(|(msg, lines)| format!("  *** {} at line(s): {:?}", msg, lines))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with("//")
}

fn line_matches(line: &str, pattern: &str) -> bool {
    line.starts_with(pattern)
        || PRECEDING
            .iter()
            .any(|c| line.contains(&format!("{}{}", c, pattern)))
}

/// Scan `source` against the denylist.
pub fn check_source(source: &str) -> ScreenReport {
    let mut report = ScreenReport::default();

    for (idx, raw) in source.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || is_comment(line) {
            continue;
        }
        for (pattern, message) in DENYLIST {
            if line_matches(line, pattern) {
                let lines = report.violations.entry(message.to_string()).or_default();
                if lines.last() != Some(&(idx + 1)) {
                    lines.push(idx + 1);
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_import_flags_exactly_one_line() {
        let report = check_source("x = 1\nimport os\ny = 2\n");
        assert_eq!(report.violation_count(), 1);
        assert_eq!(
            report.violations["Imports are not allowed in plugin code"],
            vec![2]
        );
    }

    #[test]
    fn test_clean_source() {
        let report = check_source("fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n");
        assert!(report.is_clean());
        assert_eq!(report.render(), "");
    }

    #[rstest]
    #[case("# import os", true)]
    #[case("// unsafe { }", true)]
    #[case("   ", true)]
    #[case("let x = read_dir(p);", true)]
    #[case("let x = dir(obj)", false)]
    #[case("a,globals()", false)]
    #[case("a;locals()", false)]
    #[case("\tmemoryview(b)", false)]
    #[case("let p = unsafe { *ptr };", false)]
    #[case("tracing::info!(\"x\");", false)]
    fn test_line_rules(#[case] source: &str, #[case] clean: bool) {
        assert_eq!(check_source(source).is_clean(), clean, "source: {}", source);
    }

    #[test]
    fn test_groups_by_message() {
        let src = "import a\nok = 1\nimport b\nvars(x)\n";
        let report = check_source(src);
        assert_eq!(report.violations.len(), 2);
        assert_eq!(
            report.violations["Imports are not allowed in plugin code"],
            vec![1, 3]
        );
        assert_eq!(report.violation_count(), 3);
        assert!(report.render().contains("at line(s): [1, 3]"));
    }
}
