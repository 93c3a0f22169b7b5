use crate::tree::{CaseEntry, CaseTree};
use crate::{ERROR_KEY, display_path};
use rayon::prelude::*;
use serde_json::{Map, Value};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Arguments handed to a per-case callback.
///
/// `test_pars` holds the static parameters, inherited notes (nearest
/// wins) and the axis values of the case path keyed by axis name, in that
/// precedence order. `test_case` is the leaf's own `TestPars` copy.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseInvocation {
    pub test_pars: Map<String, Value>,
    pub test_case: Map<String, Value>,
    pub path: Vec<String>,
}

impl CaseInvocation {
    /// Path keys joined with `_`. Each key is percent-encoded so that
    /// distinct paths give distinct names and the name is a single path
    /// component: only ASCII alphanumerics, `-` and `.` pass through, and the
    /// keys `.` and `..` are encoded in full.
    #[must_use]
    pub fn case_name(&self) -> String {
        self.path
            .iter()
            .map(|key| encode_key(key))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Case-unique scratch folder directly below `root`.
    #[must_use]
    pub fn output_dir(&self, root: &Path) -> PathBuf {
        root.join(self.case_name())
    }

    /// Looks in `test_case` first, then `test_pars`.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.test_case.get(key).or_else(|| self.test_pars.get(key))
    }

    #[must_use]
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(Value::as_str)
    }

    /// Numeric parameter; axis values arrive as strings and are parsed.
    #[must_use]
    pub fn f64_param(&self, key: &str) -> Option<f64> {
        match self.param(key)? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

fn encode_key(key: &str) -> String {
    if key.is_empty() {
        return "%".to_string();
    }
    let dots_only = key == "." || key == "..";
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        let plain = byte.is_ascii_alphanumeric() || byte == b'-' || (byte == b'.' && !dots_only);
        if plain {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseRunRecord {
    pub path: Vec<String>,
    pub case_name: String,
    pub error: Option<String>,
    pub elapsed_ms: f64,
}

impl CaseRunRecord {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Same shape as the case tree; leaves hold callback results or
    /// `{"ERROR": "<path>: <message>"}`.
    pub results: Value,
    pub records: Vec<CaseRunRecord>,
}

impl RunOutcome {
    #[must_use]
    pub fn case_count(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.records.iter().filter(|record| !record.passed()).count()
    }
}

#[must_use]
pub fn error_leaf(message: &str) -> Value {
    let mut leaf = Map::new();
    leaf.insert(ERROR_KEY.to_string(), Value::String(message.to_string()));
    Value::Object(leaf)
}

#[must_use]
pub fn is_error_leaf(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.len() == 1 && map.contains_key(ERROR_KEY))
}

/// Every leaf of `cases` as an invocation, in depth-first order.
#[must_use]
pub fn collect_invocations(
    cases: &CaseTree,
    static_pars: &Map<String, Value>,
) -> Vec<CaseInvocation> {
    let mut out = Vec::with_capacity(cases.leaf_count());
    collect_level(
        cases,
        static_pars,
        &mut Vec::new(),
        &mut Vec::new(),
        &mut out,
    );
    out
}

fn collect_level(
    tree: &CaseTree,
    static_pars: &Map<String, Value>,
    path: &mut Vec<(Option<String>, String)>,
    notes: &mut Vec<(String, Value)>,
    out: &mut Vec<CaseInvocation>,
) {
    let inherited = notes.len();
    for (key, entry) in tree.iter() {
        if let CaseEntry::Note(value) = entry {
            notes.push((key.clone(), value.clone()));
        }
    }

    for (key, entry) in tree.iter() {
        match entry {
            CaseEntry::Branch { axis, children } => {
                path.push((axis.clone(), key.clone()));
                collect_level(children, static_pars, path, notes, out);
                path.pop();
            }
            CaseEntry::Leaf(leaf) => {
                let mut test_pars = static_pars.clone();
                for (name, value) in notes.iter() {
                    test_pars.insert(name.clone(), value.clone());
                }
                for (axis, value) in path.iter() {
                    if let Some(axis) = axis {
                        test_pars.insert(axis.clone(), Value::String(value.clone()));
                    }
                }
                test_pars.insert(leaf.axis.clone(), Value::String(key.clone()));

                let mut keys: Vec<String> = path.iter().map(|(_, value)| value.clone()).collect();
                keys.push(key.clone());
                out.push(CaseInvocation {
                    test_pars,
                    test_case: leaf.test_pars.clone(),
                    path: keys,
                });
            }
            CaseEntry::Note(_) => {}
        }
    }

    notes.truncate(inherited);
}

fn execute<G, E>(invocation: &CaseInvocation, callback: G) -> (Value, CaseRunRecord)
where
    G: FnOnce(&CaseInvocation) -> Result<Value, E>,
    E: Display,
{
    let started = Instant::now();
    let outcome = callback(invocation);
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    let mut record = CaseRunRecord {
        path: invocation.path.clone(),
        case_name: invocation.case_name(),
        error: None,
        elapsed_ms,
    };
    match outcome {
        Ok(value) => (value, record),
        Err(err) => {
            let message = format!("{}: {err}", display_path(&invocation.path));
            let leaf = error_leaf(&message);
            record.error = Some(message);
            (leaf, record)
        }
    }
}

/// Runs `callback` once per leaf, sequentially and in depth-first order. A
/// failing case becomes an `ERROR` leaf; the walk always continues.
pub fn run_cases<F, E>(
    cases: &CaseTree,
    static_pars: &Map<String, Value>,
    mut callback: F,
) -> RunOutcome
where
    F: FnMut(&CaseInvocation) -> Result<Value, E>,
    E: Display,
{
    let executed = collect_invocations(cases, static_pars)
        .iter()
        .map(|invocation| execute(invocation, &mut callback))
        .collect();
    assemble(cases, executed)
}

/// Same contract as [`run_cases`] with leaves executed on the rayon pool.
/// Results are assembled in depth-first order afterwards, so the outcome
/// matches a sequential run of a deterministic callback.
pub fn run_cases_parallel<F, E>(
    cases: &CaseTree,
    static_pars: &Map<String, Value>,
    callback: F,
) -> RunOutcome
where
    F: Fn(&CaseInvocation) -> Result<Value, E> + Sync,
    E: Display,
{
    let invocations = collect_invocations(cases, static_pars);
    let executed = invocations
        .par_iter()
        .map(|invocation| execute(invocation, &callback))
        .collect();
    assemble(cases, executed)
}

fn assemble(cases: &CaseTree, executed: Vec<(Value, CaseRunRecord)>) -> RunOutcome {
    let (values, records): (Vec<Value>, Vec<CaseRunRecord>) = executed.into_iter().unzip();
    let mut values = values.into_iter();
    let results = assemble_level(cases, &mut values);
    RunOutcome { results, records }
}

fn assemble_level(tree: &CaseTree, values: &mut impl Iterator<Item = Value>) -> Value {
    let mut out = Map::new();
    for (key, entry) in tree.iter() {
        let value = match entry {
            CaseEntry::Branch { children, .. } => assemble_level(children, values),
            CaseEntry::Leaf(_) => values.next().unwrap_or(Value::Null),
            CaseEntry::Note(value) => value.clone(),
        };
        out.insert(key.clone(), value);
    }
    Value::Object(out)
}
