#![forbid(unsafe_code)]

//! Case matrices for regression suites.
//!
//! A suite declares one or more [`AxisSpec`]s, expands each with
//! [`make_test_cases`], accumulates them into a single [`CaseTree`] with
//! [`merge_test_cases`], and drives a callback over every leaf with
//! [`run_cases`]. The results mirror the shape of the tree.

pub mod matrix;
pub mod runner;
pub mod tree;

pub use matrix::{Axis, AxisSpec, axis_key, make_test_cases};
pub use runner::{
    CaseInvocation, CaseRunRecord, RunOutcome, collect_invocations, error_leaf, is_error_leaf,
    run_cases, run_cases_parallel,
};
pub use tree::{CaseEntry, CaseLeaf, CaseTree, MergePolicy, merge_test_cases};

use thiserror::Error;

pub const TEST_PARS_KEY: &str = "TestPars";
pub const ERROR_KEY: &str = "ERROR";
pub const REFERENCE_KEY: &str = "Reference";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaseError {
    #[error("axis specification must be a mapping of axis name to values")]
    SpecNotMapping,
    #[error("axis `{0}` must be a sequence of values")]
    AxisNotSequence(String),
    #[error("axis specification declares no axes")]
    NoAxes,
    #[error("axis `{0}` has no values")]
    EmptyAxis(String),
    #[error("axis `{0}` is declared more than once")]
    DuplicateAxis(String),
    #[error("`{0}` is reserved and cannot be used as an axis name or case key")]
    ReservedKey(String),
    #[error("TestPars must be a mapping, got {0}")]
    TestParsNotMapping(String),
    #[error("axis `{axis}` value {value} cannot be used as a case key")]
    InvalidAxisValue { axis: String, value: String },
    #[error("axis `{axis}` produces case key `{key}` more than once")]
    DuplicateAxisValue { axis: String, key: String },
    #[error("case `{path}` is already defined with different content")]
    Collision { path: String },
    #[error("branch `{path}` is keyed by axis `{existing}` but the merge supplies `{incoming}`")]
    AxisConflict {
        path: String,
        existing: String,
        incoming: String,
    },
    #[error("`{path}` is not a branch")]
    NotABranch { path: String },
}

pub(crate) fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.join("/")
    }
}

pub(crate) fn is_reserved(key: &str) -> bool {
    key == TEST_PARS_KEY || key == ERROR_KEY
}
