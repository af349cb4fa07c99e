use std::borrow::Cow;

/// Remove control characters and ANSI escape sequences.
///
/// Tab and newline survive. Returns `Cow::Borrowed` when nothing needs
/// stripping.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let needs_work = s
        .chars()
        .any(|c| c.is_control() && c != '\t' && c != '\n');
    if !needs_work {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.peek() {
                // CSI: ESC [ ... final byte in 0x40..=0x7E
                Some('[') => {
                    chars.next();
                    for c in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&c) {
                            break;
                        }
                    }
                }
                // OSC: ESC ] ... BEL or ESC \
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
            },
            '\t' | '\n' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Truncate to `max` characters, ending with `...` when shortened.
pub fn truncate_chars(s: &str, max: usize) -> Cow<'_, str> {
    if s.chars().count() <= max {
        return Cow::Borrowed(s);
    }
    if max <= 3 {
        return Cow::Owned(s.chars().take(max).collect());
    }
    let mut out: String = s.chars().take(max - 3).collect();
    out.push_str("...");
    Cow::Owned(out)
}
