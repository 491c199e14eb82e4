use std::borrow::Cow;

const ESC: char = '\x1b';
const BEL: char = '\x07';

fn is_stripped_control(c: char) -> bool {
    c == '\x7f' || (c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r'))
}

/// SEC-001: Strip control characters and ANSI escape sequences from feed text.
///
/// Article titles end up in logs, terminals and downstream prompts, so
/// attacker-controlled feeds must not be able to smuggle escape sequences
/// through them.
///
/// Removes C0 controls and DEL (keeping tab, newline and carriage return),
/// CSI sequences (`ESC [` up to a final byte in `0x40..=0x7e`), OSC sequences
/// (`ESC ]` up to BEL or `ESC \`), and any bare ESC.
///
/// Returns `Cow::Borrowed` when there is nothing to strip.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == ESC {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    for c in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&c) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == BEL {
                            break;
                        }
                        if c == ESC && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            }
        } else if !is_stripped_control(c) {
            out.push(c);
        }
    }

    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_returns_borrowed() {
        let input = "line1\nline2\ttabbed\r\nwindows";
        let result = strip_control_chars(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_removes_c0_controls_and_del() {
        assert_eq!(strip_control_chars("he\x00ll\x07o\x08 w\x0bor\x0cld\x7f!"), "hello world!");
    }

    #[test]
    fn test_removes_csi_sequences() {
        assert_eq!(strip_control_chars("\x1b[31mRed\x1b[0m text"), "Red text");
        assert_eq!(strip_control_chars("before\x1b[2Aafter"), "beforeafter");
    }

    #[test]
    fn test_removes_osc_sequences() {
        assert_eq!(strip_control_chars("\x1b]0;title\x07safe"), "safe");
        assert_eq!(strip_control_chars("\x1b]0;title\x1b\\safe"), "safe");
    }

    #[test]
    fn test_removes_bare_esc() {
        assert_eq!(strip_control_chars("before\x1bafter"), "beforeafter");
    }

    #[test]
    fn test_unicode_preserved() {
        assert_eq!(strip_control_chars("日本語 \x1b[1m太字\x1b[0m"), "日本語 太字");
    }
}
