// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MarkdownV2 escaping for the Telegram Bot API.
//!
//! Operator replies are mostly prose with the occasional emphasis span
//! or inline code. Paired `*bold*`, `_italic_`, and `` `code` `` markers
//! are kept as markup; everything else that MarkdownV2 treats as special
//! is escaped. A send that still fails to parse falls back to plain text
//! at the adapter level.

/// Characters MarkdownV2 reserves outside of entities.
const SPECIAL_CHARS: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Escapes text for Telegram MarkdownV2 parse mode, preserving simple
/// emphasis and inline-code spans.
pub fn escape_markdown_v2(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + text.len() / 4);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '`' => {
                // Inline code passes through untouched, closing tick included.
                if let Some(end) = chars[i + 1..].iter().position(|&x| x == '`') {
                    let end = i + 1 + end;
                    out.extend(&chars[i..=end]);
                    i = end + 1;
                } else {
                    out.push('\\');
                    out.push('`');
                    i += 1;
                }
            }
            '*' | '_' => {
                if let Some(end) = span_end(&chars, i, c) {
                    out.push(c);
                    escape_into(&mut out, &chars[i + 1..end]);
                    out.push(c);
                    i = end + 1;
                } else {
                    out.push('\\');
                    out.push(c);
                    i += 1;
                }
            }
            _ => {
                if SPECIAL_CHARS.contains(&c) {
                    out.push('\\');
                }
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Finds the closing delimiter of an emphasis span starting at `start`.
///
/// A span must be non-empty, stay on one line, and hug its content:
/// `*Done!*` is a span, `2 * 3 * 4` is arithmetic.
fn span_end(chars: &[char], start: usize, delim: char) -> Option<usize> {
    if chars.get(start + 1).is_none_or(|c| c.is_whitespace()) {
        return None;
    }
    for (offset, &c) in chars[start + 1..].iter().enumerate() {
        let j = start + 1 + offset;
        if c == '\n' {
            return None;
        }
        if c == delim && j > start + 1 && !chars[j - 1].is_whitespace() {
            return Some(j);
        }
    }
    None
}

fn escape_into(out: &mut String, chars: &[char]) {
    for &c in chars {
        if SPECIAL_CHARS.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string() {
        assert_eq!(escape_markdown_v2(""), "");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(escape_markdown_v2("Hello world"), "Hello world");
    }

    #[test]
    fn escapes_punctuation() {
        assert_eq!(
            escape_markdown_v2("Thanks for waiting. Done!"),
            "Thanks for waiting\\. Done\\!"
        );
    }

    #[test]
    fn keeps_bold_span_and_escapes_inside_it() {
        assert_eq!(
            escape_markdown_v2("*Done!* Refund issued."),
            "*Done\\!* Refund issued\\."
        );
    }

    #[test]
    fn keeps_italic_span() {
        assert_eq!(
            escape_markdown_v2("Your parcel ships _tomorrow_."),
            "Your parcel ships _tomorrow_\\."
        );
    }

    #[test]
    fn keeps_inline_code_untouched() {
        assert_eq!(
            escape_markdown_v2("Quote `ORD-1234.5` on the form."),
            "Quote `ORD-1234.5` on the form\\."
        );
    }

    #[test]
    fn arithmetic_asterisks_are_escaped() {
        assert_eq!(escape_markdown_v2("2 * 3 = 6"), "2 \\* 3 \\= 6");
    }

    #[test]
    fn unpaired_delimiters_are_escaped() {
        assert_eq!(escape_markdown_v2("5* discount"), "5\\* discount");
        assert_eq!(escape_markdown_v2("file_name"), "file\\_name");
    }

    #[test]
    fn unclosed_backtick_is_escaped() {
        assert_eq!(escape_markdown_v2("`oops"), "\\`oops");
    }

    #[test]
    fn span_does_not_cross_lines() {
        assert_eq!(escape_markdown_v2("*a\nb*"), "\\*a\nb\\*");
    }

    #[test]
    fn escapes_urls() {
        assert_eq!(
            escape_markdown_v2("https://example.com/track?id=1"),
            "https://example\\.com/track?id\\=1"
        );
    }

    #[test]
    fn escapes_brackets_and_braces() {
        assert_eq!(escape_markdown_v2("[a](b) {c}"), "\\[a\\]\\(b\\) \\{c\\}");
    }
}
