//! Knobs for the in-crate property tests.

/// Case count for property tests, overridable with `PROPTEST_CASES`.
pub fn proptest_cases(default: u32) -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|cases| cases.parse().ok())
        .unwrap_or(default)
}
