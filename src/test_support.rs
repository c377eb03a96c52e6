//! Shared configuration for property-based tests.
//!
//! Centralizes the proptest case counts so every test module behaves the
//! same, and keeps runs under Miri short enough to finish.
//!
//! # Usage
//!
//! ```ignore
//! use netproctor::test_support::miri_case_count;
//!
//! proptest! {
//!     #![proptest_config(ProptestConfig {
//!         cases: miri_case_count(),
//!         ..ProptestConfig::default()
//!     })]
//!     #[test]
//!     fn delivery_conserves_bytes(chunks in chunk_strategy()) {
//!         // test body
//!     }
//! }
//! ```

/// Returns the number of cases to run for property-based tests.
///
/// Under Miri a reduced count (5) keeps interpretation time reasonable;
/// otherwise the standard 256 provides thorough coverage.
#[must_use]
pub const fn miri_case_count() -> u32 {
    if cfg!(miri) {
        5
    } else {
        256
    }
}
