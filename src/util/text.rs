use std::borrow::Cow;

/// Maximum length of a channel or folder title after sanitizing.
pub const MAX_TITLE_LENGTH: usize = 256;

fn is_stripped(c: char) -> bool {
    c == '\u{7f}' || (c.is_ascii_control() && c != '\t' && c != '\n' && c != '\r')
}

/// Strip terminal control characters and ANSI escape sequences from feed text.
///
/// Feed titles come from remote XML and end up printed by the CLI, so CSI
/// (`ESC [ ... final`) and OSC (`ESC ] ... BEL|ST`) sequences are removed
/// along with bare C0 controls and DEL. Tab, newline and CR are preserved.
///
/// Returns `Cow::Borrowed` when nothing needs stripping.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' {
            if !is_stripped(c) {
                out.push(c);
            }
            continue;
        }

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
                    if c == '\x07' {
                        break;
                    }
                    if c == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    Cow::Owned(out)
}

/// Clean a user- or feed-supplied title: strip controls, collapse to one line,
/// trim, and cap at [`MAX_TITLE_LENGTH`] characters. Returns `None` when
/// nothing printable is left.
pub fn sanitize_title(raw: &str) -> Option<String> {
    let stripped = strip_control_chars(raw);
    let single_line: String = stripped
        .split(['\n', '\r', '\t'])
        .filter(|part| !part.trim().is_empty())
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(" ");

    if single_line.is_empty() {
        return None;
    }

    Some(single_line.chars().take(MAX_TITLE_LENGTH).collect())
}
