//! # carve_policy
//!
//! Turns validator output into structured errors and decides whether a
//! migration may be released.
//!
//! This crate provides:
//! - **Error model**: `ValidationError`, `Severity`, `ValidationReport`
//! - **Extraction**: JSON, markdown tables, "Error Report" sections and summary lines
//! - **Counting**: per-validator counts with in-report ID deduplication
//! - **Release gate**: zero-error gate and its consumer-facing decision
//!
//! ## Example
//!
//! ```rust
//! use carve_policy::{ErrorCounter, RawReport, ReleaseGate};
//!
//! let reports = vec![
//!     RawReport::new("unit", "| UT-API-001 | HIGH | API | accounts/Api.java | 500 on POST |"),
//!     RawReport::new("e2e", "All scenarios passed.\n\nTotal Errors: 0"),
//! ];
//!
//! let count = ErrorCounter::new().count_total_errors(&reports);
//! assert_eq!(count.total_errors, 1);
//! assert!(!ReleaseGate::decide(&count, false).is_open());
//! ```

pub mod counter;
pub mod error;
pub mod extract;
pub mod gate;
pub mod model;
pub mod report;

pub use counter::{calculate_errors_fixed, CountedError, ErrorCount, ErrorCounter, DEFAULT_ERROR_ID_PATTERN};
pub use error::{PolicyError, PolicyResult};
pub use extract::{critical_issues, has_critical_issues, summary_by_severity, ErrorExtractor};
pub use gate::{GateDecision, GateDetail, GateResult, ReleaseGate};
pub use model::{
    tail_chars, RawReport, ReportStatus, Severity, ValidationError, ValidationReport,
    DEFAULT_LOG_EXCERPT_CHARS, INFRASTRUCTURE_SERVICE,
};
pub use report::render_markdown;
