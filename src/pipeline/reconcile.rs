//! 增量/全量合并：将未知形态的流式片段合并为单调不缩短的输出
//!
//! Token reconciliation. Vendors stream either deltas ("lo") or cumulative
//! snapshots ("Hello"), and some switch between the two within one response.
//! [`reconcile`] merges each fragment into the current output so that the
//! result never shrinks and never repeats already-seen text.

/// What [`reconcile`] did with a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Output was empty; the fragment became the output.
    Adopted,
    /// Fragment extends the output (cumulative snapshot); it replaced the output.
    Replaced,
    /// Fragment is a prefix of (or equal to) the output, or empty.
    Ignored,
    /// Fragment is new text (delta); it was appended.
    Appended,
}

impl Reconciled {
    pub fn changed(&self) -> bool {
        !matches!(self, Reconciled::Ignored)
    }
}

/// Merge `fragment` into `current`.
pub fn reconcile(current: &mut String, fragment: &str) -> Reconciled {
    if fragment.is_empty() {
        return Reconciled::Ignored;
    }
    if current.is_empty() {
        current.push_str(fragment);
        return Reconciled::Adopted;
    }
    if fragment.starts_with(current.as_str()) {
        if fragment.len() == current.len() {
            return Reconciled::Ignored;
        }
        current.clear();
        current.push_str(fragment);
        return Reconciled::Replaced;
    }
    if current.starts_with(fragment) {
        return Reconciled::Ignored;
    }
    current.push_str(fragment);
    Reconciled::Appended
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(fragments: &[&str]) -> String {
        let mut out = String::new();
        for f in fragments {
            reconcile(&mut out, f);
        }
        out
    }

    #[test]
    fn test_delta_stream() {
        assert_eq!(run(&["Hel", "lo", " world"]), "Hello world");
    }

    #[test]
    fn test_cumulative_stream() {
        assert_eq!(run(&["Hel", "Hello", "Hello world"]), "Hello world");
    }

    #[test]
    fn test_mixed_stream() {
        assert_eq!(run(&["Hel", "lo", "Hello", " there"]), "Hello there");
    }

    #[test]
    fn test_cases_in_order() {
        let mut out = String::new();
        assert_eq!(reconcile(&mut out, ""), Reconciled::Ignored);
        assert_eq!(reconcile(&mut out, "Hi"), Reconciled::Adopted);
        assert_eq!(reconcile(&mut out, "Hi there"), Reconciled::Replaced);
        assert_eq!(reconcile(&mut out, "Hi"), Reconciled::Ignored);
        assert_eq!(reconcile(&mut out, "!"), Reconciled::Appended);
        assert_eq!(out, "Hi there!");
    }

    #[test]
    fn test_same_fragment_twice_is_idempotent() {
        let mut out = String::new();
        reconcile(&mut out, "abc");
        let before = out.clone();
        assert!(!reconcile(&mut out, "abc").changed());
        assert_eq!(out, before);
    }

    #[test]
    fn test_output_never_shrinks() {
        let fragments = ["a", "ab", "a", "", "xyz", "abxyz", "ab", "q"];
        let mut out = String::new();
        let mut last_len = 0;
        for f in fragments {
            reconcile(&mut out, f);
            assert!(out.len() >= last_len);
            last_len = out.len();
        }
        assert_eq!(out, "abxyzq");
    }
}
