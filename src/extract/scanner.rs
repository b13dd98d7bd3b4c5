use std::ops::Range;

/// Options controlling how the scanner recovers from broken objects.
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Treat a `{` in column 0 as the start of a new top-level object even if
    /// the previous object never closed. Off by default: a nested object in
    /// a multi-line record can legitimately open in column 0.
    pub resync_on_line_start: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            resync_on_line_start: false,
        }
    }
}

/// A byte span believed to delimit one top-level JSON object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub range: Range<usize>,
    /// False when the span was cut short (EOF, resync, or a raw newline
    /// inside a string literal).
    pub terminated: bool,
}

impl Candidate {
    pub fn bytes<'a>(&self, input: &'a [u8]) -> &'a [u8] {
        &input[self.range.clone()]
    }
}

/// Split a blob of concatenated JSON objects into candidate ranges.
///
/// Single left-to-right pass tracking brace depth, whether the cursor sits
/// inside a string literal, and whether the next byte is escaped. Nothing is
/// assumed about the separators between objects: newlines, arbitrary text, or
/// nothing at all.
///
/// String state is only tracked inside an object. Quotes in the noise between
/// objects are ignored.
pub fn scan(input: &[u8], options: ScanOptions) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut start: Option<usize> = None;

    for (i, &byte) in input.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
                continue;
            }
            match byte {
                b'\\' => escaped = true,
                b'"' => in_string = false,
                b'\n' => {
                    // JSON strings cannot hold a raw newline, so the open
                    // object was truncated somewhere on this line.
                    if let Some(s) = start.take() {
                        candidates.push(Candidate {
                            range: s..i,
                            terminated: false,
                        });
                    }
                    depth = 0;
                    in_string = false;
                }
                _ => {}
            }
            continue;
        }

        match byte {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                } else if options.resync_on_line_start && i > 0 && input[i - 1] == b'\n' {
                    if let Some(s) = start.replace(i) {
                        candidates.push(Candidate {
                            range: s..i,
                            terminated: false,
                        });
                    }
                    depth = 0;
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        candidates.push(Candidate {
                            range: s..i + 1,
                            terminated: true,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(s) = start {
        candidates.push(Candidate {
            range: s..input.len(),
            terminated: false,
        });
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(input: &str) -> Vec<&str> {
        scan(input.as_bytes(), ScanOptions::default())
            .iter()
            .map(|c| &input[c.range.clone()])
            .collect()
    }

    #[test]
    fn test_concatenated_without_separator() {
        assert_eq!(spans(r#"{"a":1}{"b":2}{"c":3}"#), vec![
            r#"{"a":1}"#,
            r#"{"b":2}"#,
            r#"{"c":3}"#
        ]);
    }

    #[test]
    fn test_multiline_pretty_printed() {
        let input = "{\n  \"a\": {\n    \"b\": 1\n  }\n}\n{\n  \"c\": 2\n}\n";
        let found = spans(input);
        assert_eq!(found.len(), 2);
        assert!(found[0].starts_with('{') && found[0].ends_with('}'));
        assert!(found[0].contains("\"b\": 1"));
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        let input = r#"{"msg":"{not} a }} brace {"}{"x":"\"}"}"#;
        let found = spans(input);
        assert_eq!(found, vec![r#"{"msg":"{not} a }} brace {"}"#, r#"{"x":"\"}"}"#]);
    }

    #[test]
    fn test_escaped_backslash_before_quote() {
        // "\\" is a complete string; the quote after it closes the literal
        let input = r#"{"p":"C:\\"}{"q":1}"#;
        assert_eq!(spans(input).len(), 2);
    }

    #[test]
    fn test_noise_between_objects() {
        let input = "garbage \"quoted noise\n{\"a\":1} trailing } text {\"b\":2}";
        assert_eq!(spans(input), vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_unterminated_at_eof() {
        let candidates = scan(br#"{"a":1}{"b":"#, ScanOptions::default());
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].terminated);
        assert!(!candidates[1].terminated);
        assert_eq!(candidates[1].range, 7..12);
    }

    #[test]
    fn test_newline_inside_string_breaks_candidate() {
        let input = "{\"a\":\"trunc\n{\"b\":2}\n";
        let candidates = scan(input.as_bytes(), ScanOptions::default());
        assert_eq!(candidates.len(), 2);
        assert!(!candidates[0].terminated);
        assert!(candidates[1].terminated);
        assert_eq!(&input[candidates[1].range.clone()], "{\"b\":2}");
    }

    #[test]
    fn test_line_start_resync() {
        let input = "{\"a\":{\"x\":1}\n{\"b\":2}\n";
        let candidates = scan(
            input.as_bytes(),
            ScanOptions {
                resync_on_line_start: true,
            },
        );
        assert_eq!(candidates.len(), 2);
        assert!(!candidates[0].terminated);
        assert_eq!(&input[candidates[1].range.clone()], "{\"b\":2}");

        // Without resync the broken object swallows the next one
        let strict = scan(input.as_bytes(), ScanOptions::default());
        assert_eq!(strict.len(), 1);
        assert!(!strict[0].terminated);
    }

    #[test]
    fn test_nested_object_in_column_zero() {
        let first = "{\"@message\":\"{\\\"a\\\":1}\",\"meta\":[\n{\"k\":1}\n]}";
        let input = format!("{}\n{{\"@message\":\"{{\\\"b\\\":2}}\"}}", first);
        let candidates = scan(input.as_bytes(), ScanOptions::default());
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.terminated));
        assert_eq!(&input[candidates[0].range.clone()], first);
    }

    #[test]
    fn test_stray_closing_brace_ignored() {
        assert_eq!(spans("}}{\"a\":1}}"), vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(scan(b"", ScanOptions::default()).is_empty());
        assert!(scan(b"   \n\n", ScanOptions::default()).is_empty());
    }
}
