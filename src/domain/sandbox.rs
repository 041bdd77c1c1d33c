//! The platform's sandbox preamble: a pure, deterministic string transform
//! wrapped around an assembled program body.
//!
//! Kept as its own module so the transform is swappable without touching
//! the lowering logic, and independently testable for injectivity.

const PREAMBLE: &str = "# --- sandboxed entrypoint (generated) ---\ndef write_file(name, content):\n    with open(name, \"w\") as f:\n        f.write(str(content))\n    return name\n\n";
const POSTAMBLE: &str = "\n\nif __name__ == \"__main__\":\n    print(__result__)\n";

/// Wrap an assembled program body with the sandbox preamble/postamble.
pub fn wrap(body: &str) -> String {
    format!("{PREAMBLE}{body}{POSTAMBLE}")
}

/// Recover the body that was passed to [`wrap`]. Used by tests that need to
/// assert the transform is injective modulo whitespace.
pub fn unwrap(wrapped: &str) -> Option<&str> {
    wrapped
        .strip_prefix(PREAMBLE)
        .and_then(|rest| rest.strip_suffix(POSTAMBLE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_is_injective() {
        let body = "x = 1\ny = 2";
        let wrapped = wrap(body);
        assert_eq!(unwrap(&wrapped), Some(body));
    }

    #[test]
    fn wrap_is_deterministic() {
        let body = "x = 1";
        assert_eq!(wrap(body), wrap(body));
    }
}
