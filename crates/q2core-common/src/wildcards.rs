// wildcards.rs: shell-style pattern matching for the listing commands
//
// Supports: * (any run), ? (single char), [...] (char sets, ranges), [!...] (negation)

/// Test if `wildcard` pattern matches the whole of `test`.
pub fn wildcardfit(wildcard: &str, test: &str) -> bool {
    fit(wildcard.as_bytes(), test.as_bytes())
}

fn fit(w: &[u8], t: &[u8]) -> bool {
    match w.first() {
        None => t.is_empty(),
        Some(b'*') => {
            let rest = &w[1..];
            (0..=t.len()).any(|skip| fit(rest, &t[skip..]))
        }
        Some(b'?') => !t.is_empty() && fit(&w[1..], &t[1..]),
        Some(b'[') => match (t.first(), set_end(w)) {
            (Some(&c), Some(end)) => set_contains(&w[1..end], c) && fit(&w[end + 1..], &t[1..]),
            // an unterminated set matches the bracket literally
            (Some(&c), None) => c == b'[' && fit(&w[1..], &t[1..]),
            (None, _) => false,
        },
        Some(&c) => t.first() == Some(&c) && fit(&w[1..], &t[1..]),
    }
}

/// Index of the `]` closing the set that starts at `w[0]`. A `]` right
/// after the opening bracket (or after `!`) is a member, not the end.
fn set_end(w: &[u8]) -> Option<usize> {
    let mut i = 1;
    if w.get(i) == Some(&b'!') {
        i += 1;
    }
    if w.get(i) == Some(&b']') {
        i += 1;
    }
    w[i..].iter().position(|&b| b == b']').map(|p| p + i)
}

fn set_contains(set: &[u8], c: u8) -> bool {
    let (negate, set) = match set.split_first() {
        Some((b'!', rest)) => (true, rest),
        _ => (false, set),
    };

    let mut found = false;
    let mut i = 0;
    while i < set.len() {
        if i + 2 < set.len() && set[i + 1] == b'-' {
            if set[i] <= c && c <= set[i + 2] {
                found = true;
            }
            i += 3;
        } else {
            if set[i] == c {
                found = true;
            }
            i += 1;
        }
    }
    found != negate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_star() {
        assert!(wildcardfit("*", ""));
        assert!(wildcardfit("*", "anything"));
        assert!(wildcardfit("gl_*", "gl_modulate"));
        assert!(!wildcardfit("gl_*", "r_speeds"));
        assert!(wildcardfit("*mode", "gl_texturemode"));
        assert!(wildcardfit("r_*_x", "r_foo_bar_x"));
        assert!(!wildcardfit("exact", "exactly"));
    }

    #[test]
    fn test_question_mark() {
        assert!(wildcardfit("r_?peeds", "r_speeds"));
        assert!(!wildcardfit("r_?", "r_"));
    }

    #[test]
    fn test_sets() {
        assert!(wildcardfit("vid_[gm]*", "vid_gamma"));
        assert!(wildcardfit("adr[0-9]", "adr7"));
        assert!(!wildcardfit("adr[0-9]", "adrx"));
        assert!(wildcardfit("adr[!0-9]", "adrx"));
        assert!(wildcardfit("[]]x", "]x"));
        assert!(wildcardfit("a[b", "a[b"));
    }
}
