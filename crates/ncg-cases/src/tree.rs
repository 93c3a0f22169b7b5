use crate::{CaseError, TEST_PARS_KEY, display_path, is_reserved};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Precedence when two merges supply different non-branch entries at the
/// same key path. Identical entries never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    #[default]
    LastWriterWins,
    FirstWriterWins,
    Reject,
}

impl MergePolicy {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim() {
            "last_writer_wins" => Ok(Self::LastWriterWins),
            "first_writer_wins" => Ok(Self::FirstWriterWins),
            "reject" => Ok(Self::Reject),
            bad => Err(format!("unknown merge policy {bad}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseLeaf {
    pub axis: String,
    pub test_pars: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaseEntry {
    /// `axis` is `None` for branches declared by hand (e.g. to hold a
    /// `Reference` note) until a generated subtree is merged into them.
    Branch {
        axis: Option<String>,
        children: CaseTree,
    },
    Leaf(CaseLeaf),
    Note(Value),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseTree {
    entries: IndexMap<String, CaseEntry>,
}

impl CaseTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CaseEntry)> {
        self.entries.iter()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CaseEntry> {
        self.entries.get(key)
    }

    pub(crate) fn insert_entry(&mut self, key: String, entry: CaseEntry) {
        self.entries.insert(key, entry);
    }

    #[must_use]
    pub fn leaf(&self, path: &[&str]) -> Option<&CaseLeaf> {
        let (last, parents) = path.split_last()?;
        let mut tree = self;
        for key in parents {
            match tree.entries.get(*key)? {
                CaseEntry::Branch { children, .. } => tree = children,
                _ => return None,
            }
        }
        match tree.entries.get(*last)? {
            CaseEntry::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn leaf_mut(&mut self, path: &[&str]) -> Option<&mut CaseLeaf> {
        let (last, parents) = path.split_last()?;
        let mut tree = self;
        for key in parents {
            match tree.entries.get_mut(*key)? {
                CaseEntry::Branch { children, .. } => tree = children,
                _ => return None,
            }
        }
        match tree.entries.get_mut(*last)? {
            CaseEntry::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.entries
            .values()
            .map(|entry| match entry {
                CaseEntry::Branch { children, .. } => children.leaf_count(),
                CaseEntry::Leaf(_) => 1,
                CaseEntry::Note(_) => 0,
            })
            .sum()
    }

    /// Key paths of every leaf in depth-first order.
    #[must_use]
    pub fn leaf_paths(&self) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        self.collect_leaf_paths(&mut Vec::new(), &mut out);
        out
    }

    fn collect_leaf_paths(&self, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
        for (key, entry) in &self.entries {
            prefix.push(key.clone());
            match entry {
                CaseEntry::Branch { children, .. } => children.collect_leaf_paths(prefix, out),
                CaseEntry::Leaf(_) => out.push(prefix.clone()),
                CaseEntry::Note(_) => {}
            }
            prefix.pop();
        }
    }

    /// Attaches a note such as `Reference` to the branch at `path`, creating
    /// axis-less branches for missing keys. Notes apply to every leaf below
    /// that branch.
    pub fn annotate(
        &mut self,
        path: &[&str],
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), CaseError> {
        let key = key.into();
        if is_reserved(&key) {
            return Err(CaseError::ReservedKey(key));
        }
        let mut tree = self;
        let mut walked = Vec::with_capacity(path.len());
        for segment in path {
            walked.push((*segment).to_string());
            let entry = tree
                .entries
                .entry((*segment).to_string())
                .or_insert_with(|| CaseEntry::Branch {
                    axis: None,
                    children: CaseTree::new(),
                });
            match entry {
                CaseEntry::Branch { children, .. } => tree = children,
                _ => {
                    return Err(CaseError::NotABranch {
                        path: display_path(&walked),
                    });
                }
            }
        }
        tree.entries.insert(key, CaseEntry::Note(value));
        Ok(())
    }

    /// Merges `other` into this tree. On error the tree is left untouched.
    pub fn merge(&mut self, other: CaseTree, policy: MergePolicy) -> Result<(), CaseError> {
        let mut merged = self.clone();
        merged.merge_at(other, policy, &mut Vec::new())?;
        *self = merged;
        Ok(())
    }

    fn merge_at(
        &mut self,
        other: CaseTree,
        policy: MergePolicy,
        path: &mut Vec<String>,
    ) -> Result<(), CaseError> {
        for (key, incoming) in other.entries {
            path.push(key.clone());
            match self.entries.get_mut(&key) {
                None => {
                    self.entries.insert(key, incoming);
                }
                Some(existing) => merge_entry(existing, incoming, policy, path)?,
            }
            path.pop();
        }
        Ok(())
    }

    /// JSON view: branches as objects, leaves as `{"TestPars": {...}}`, notes
    /// as their value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        for (key, entry) in &self.entries {
            let value = match entry {
                CaseEntry::Branch { children, .. } => children.to_json(),
                CaseEntry::Leaf(leaf) => {
                    let mut record = Map::new();
                    record.insert(
                        TEST_PARS_KEY.to_string(),
                        Value::Object(leaf.test_pars.clone()),
                    );
                    Value::Object(record)
                }
                CaseEntry::Note(value) => value.clone(),
            };
            out.insert(key.clone(), value);
        }
        Value::Object(out)
    }
}

fn merge_entry(
    existing: &mut CaseEntry,
    incoming: CaseEntry,
    policy: MergePolicy,
    path: &mut Vec<String>,
) -> Result<(), CaseError> {
    match (existing, incoming) {
        (
            CaseEntry::Branch { axis, children },
            CaseEntry::Branch {
                axis: incoming_axis,
                children: incoming_children,
            },
        ) => {
            if let (Some(current), Some(next)) = (axis.as_deref(), incoming_axis.as_deref()) {
                if current != next {
                    return Err(CaseError::AxisConflict {
                        path: display_path(path),
                        existing: current.to_string(),
                        incoming: next.to_string(),
                    });
                }
            }
            if axis.is_none() {
                *axis = incoming_axis;
            }
            children.merge_at(incoming_children, policy, path)
        }
        (existing, incoming) => {
            if *existing == incoming {
                return Ok(());
            }
            match policy {
                MergePolicy::LastWriterWins => {
                    *existing = incoming;
                    Ok(())
                }
                MergePolicy::FirstWriterWins => Ok(()),
                MergePolicy::Reject => Err(CaseError::Collision {
                    path: display_path(path),
                }),
            }
        }
    }
}

/// Merges freshly generated cases into an accumulator.
pub fn merge_test_cases(
    accumulator: &mut CaseTree,
    new_cases: CaseTree,
    policy: MergePolicy,
) -> Result<(), CaseError> {
    accumulator.merge(new_cases, policy)
}

#[cfg(test)]
mod tests {
    use super::{CaseEntry, CaseTree, MergePolicy, merge_test_cases};
    use crate::{AxisSpec, CaseError, REFERENCE_KEY, make_test_cases};
    use serde_json::json;

    fn chiller_cases(case_label: &str, capacity_kw: u64) -> CaseTree {
        let spec = AxisSpec::new()
            .axis("Vintage", ["NECB2011", "NECB2020"])
            .axis("ChillerType", ["Scroll", "Centrifugal"])
            .axis("TestCase", [case_label])
            .test_pars(json!({"tested_capacity_kW": capacity_kw}));
        make_test_cases(&spec).expect("spec should expand")
    }

    #[test]
    fn merge_into_empty_equals_generated_tree() {
        let generated = chiller_cases("small", 132);
        let mut accumulator = CaseTree::new();
        merge_test_cases(&mut accumulator, generated.clone(), MergePolicy::default())
            .expect("merge");
        assert_eq!(accumulator, generated);
        assert_eq!(accumulator.to_json(), generated.to_json());
    }

    #[test]
    fn merging_twice_is_idempotent_under_every_policy() {
        for policy in [
            MergePolicy::LastWriterWins,
            MergePolicy::FirstWriterWins,
            MergePolicy::Reject,
        ] {
            let generated = chiller_cases("small", 132);
            let mut once = CaseTree::new();
            once.merge(generated.clone(), policy).expect("first merge");
            let mut twice = once.clone();
            twice.merge(generated, policy).expect("second merge");
            assert_eq!(once, twice, "policy {policy:?}");
            assert_eq!(once.leaf_paths(), twice.leaf_paths());
        }
    }

    #[test]
    fn reference_notes_survive_per_case_merges() {
        let mut cases = CaseTree::new();
        cases
            .annotate(&["NECB2011"], REFERENCE_KEY, json!("NECB 2011 p3 Table 5.2.12.1"))
            .expect("annotate");
        cases
            .annotate(&["NECB2020"], REFERENCE_KEY, json!("NECB 2020 p1 Table 5.2.12.1.-K"))
            .expect("annotate");

        cases
            .merge(chiller_cases("small", 132), MergePolicy::default())
            .expect("merge small");
        cases
            .merge(chiller_cases("large", 791), MergePolicy::default())
            .expect("merge large");

        assert_eq!(cases.leaf_count(), 8);
        let view = cases.to_json();
        assert_eq!(view["NECB2011"][REFERENCE_KEY], json!("NECB 2011 p3 Table 5.2.12.1"));
        assert_eq!(
            view["NECB2020"]["Centrifugal"]["large"],
            json!({"TestPars": {"tested_capacity_kW": 791}})
        );
        assert_eq!(
            view["NECB2011"]["Scroll"]["small"],
            json!({"TestPars": {"tested_capacity_kW": 132}})
        );

        match cases.get("NECB2011") {
            Some(CaseEntry::Branch { axis, .. }) => assert_eq!(axis.as_deref(), Some("Vintage")),
            other => panic!("expected branch, got {other:?}"),
        }
    }

    #[test]
    fn disjoint_merges_commute() {
        let small = chiller_cases("small", 132);
        let large = chiller_cases("large", 791);

        let mut forward = CaseTree::new();
        forward.merge(small.clone(), MergePolicy::Reject).expect("merge");
        forward.merge(large.clone(), MergePolicy::Reject).expect("merge");

        let mut backward = CaseTree::new();
        backward.merge(large, MergePolicy::Reject).expect("merge");
        backward.merge(small, MergePolicy::Reject).expect("merge");

        assert_eq!(forward, backward);
        assert_eq!(forward.leaf_count(), 8);
    }

    #[test]
    fn leaf_collisions_follow_the_policy() {
        let first = chiller_cases("small", 132);
        let second = chiller_cases("small", 150);

        let mut last = first.clone();
        last.merge(second.clone(), MergePolicy::LastWriterWins)
            .expect("last writer wins");
        assert_eq!(
            last.leaf(&["NECB2011", "Scroll", "small"])
                .map(|leaf| leaf.test_pars["tested_capacity_kW"].clone()),
            Some(json!(150))
        );

        let mut kept = first.clone();
        kept.merge(second.clone(), MergePolicy::FirstWriterWins)
            .expect("first writer wins");
        assert_eq!(kept, first);

        let mut strict = first;
        let err = strict
            .merge(second, MergePolicy::Reject)
            .expect_err("conflicting leaves must be rejected");
        assert_eq!(
            err,
            CaseError::Collision {
                path: "NECB2011/Scroll/small".to_string()
            }
        );
    }

    #[test]
    fn leaf_replacing_branch_under_last_writer_wins() {
        let mut cases = chiller_cases("small", 132);
        let flat = make_test_cases(
            &AxisSpec::new()
                .axis("Vintage", ["NECB2011"])
                .test_pars(json!({"flat": true})),
        )
        .expect("flat spec");

        cases.merge(flat, MergePolicy::LastWriterWins).expect("merge");
        assert_eq!(cases.to_json()["NECB2011"], json!({"TestPars": {"flat": true}}));
        assert_eq!(cases.leaf_count(), 3);
    }

    #[test]
    fn conflicting_axis_names_are_rejected() {
        let mut cases = chiller_cases("small", 132);
        let other = make_test_cases(
            &AxisSpec::new()
                .axis("Template", ["NECB2011"])
                .axis("TestCase", ["x"]),
        )
        .expect("other spec");

        let err = cases
            .merge(other, MergePolicy::LastWriterWins)
            .expect_err("axis conflict");
        assert!(matches!(err, CaseError::AxisConflict { .. }), "{err}");
    }

    #[test]
    fn annotate_refuses_to_descend_through_leaves() {
        let mut cases = chiller_cases("small", 132);
        let err = cases
            .annotate(&["NECB2011", "Scroll", "small"], REFERENCE_KEY, json!("x"))
            .expect_err("leaf is not a branch");
        assert_eq!(
            err,
            CaseError::NotABranch {
                path: "NECB2011/Scroll/small".to_string()
            }
        );
    }

    #[test]
    fn annotate_rejects_reserved_note_keys() {
        let mut cases = chiller_cases("small", 132);
        let before = cases.clone();
        for key in ["TestPars", "ERROR"] {
            let err = cases
                .annotate(&["NECB2011"], key, json!({"cop": 1.0}))
                .expect_err("reserved key");
            assert_eq!(err, CaseError::ReservedKey(key.to_string()));
        }
        assert_eq!(cases, before);
    }

    #[test]
    fn rejected_merge_leaves_the_accumulator_untouched() {
        let mut accumulator = chiller_cases("small", 132);
        let before = accumulator.clone();

        // The new "large" leaves are visited before the colliding "small" ones.
        let mut incoming = chiller_cases("large", 791);
        incoming
            .merge(chiller_cases("small", 150), MergePolicy::LastWriterWins)
            .expect("build incoming");

        let err = accumulator
            .merge(incoming, MergePolicy::Reject)
            .expect_err("collision");
        assert!(matches!(err, CaseError::Collision { .. }), "{err}");
        assert_eq!(accumulator, before);
        assert!(accumulator.leaf(&["NECB2011", "Scroll", "large"]).is_none());
    }

    #[test]
    fn merge_policy_parses_snake_case_names() {
        assert_eq!(MergePolicy::parse("reject"), Ok(MergePolicy::Reject));
        assert_eq!(
            MergePolicy::parse(" first_writer_wins "),
            Ok(MergePolicy::FirstWriterWins)
        );
        assert!(MergePolicy::parse("newest").is_err());
    }
}
