//! Batch source filtering: one command per line, comments stripped.
//!
//! Only the line filtering lives here; remaining lines parse under the same
//! command grammar as interactive use, and the caller decides whether a
//! failing line halts or is skipped. Each line's transition stays atomic
//! either way.

/// Behavior when one batch line fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    Halt,
    Continue,
}

/// Commands with their 1-based line numbers. Blank lines and lines whose
/// trimmed form starts with `#` are filtered out.
pub fn batch_lines(text: &str) -> Vec<(usize, &str)> {
    text.lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                None
            } else {
                Some((index + 1, trimmed))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_blanks_and_comments() {
        let text = "\n# header comment\nenable corp.telemetry\n   \n  # indented comment\ndisable corp.telemetry\n";
        let lines = batch_lines(text);
        assert_eq!(
            lines,
            vec![(3, "enable corp.telemetry"), (6, "disable corp.telemetry")]
        );
    }

    #[test]
    fn empty_input_yields_no_commands() {
        assert!(batch_lines("").is_empty());
        assert!(batch_lines("\n\n# only comments\n").is_empty());
    }

    #[test]
    fn hash_inside_a_command_is_not_a_comment() {
        let lines = batch_lines("enable corp.tag --set label=#1\n");
        assert_eq!(lines.len(), 1);
    }
}
