//! Soft-constraint ledger: which indicator literal excuses which step.

use serde::Serialize;

use crate::variables::indicator_var;

/// Boolean unknown bound to one step of one rule. True means the step is
/// excused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoftIndicator {
    pub rule: usize,
    /// Index of the run in the trace.
    pub run: usize,
    /// 1-based step index within the run.
    pub step: usize,
    pub literal: String,
    /// Whether the recorded action is one of the rule's target actions.
    pub target: bool,
}

/// Indicators of one rule, in trace order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SoftLedger {
    rule: usize,
    entries: Vec<SoftIndicator>,
}

impl SoftLedger {
    pub fn new(rule: usize) -> Self {
        Self {
            rule,
            entries: Vec::new(),
        }
    }

    pub fn rule(&self) -> usize {
        self.rule
    }

    /// Register the indicator for `(run, step)` and return it.
    pub fn push(&mut self, run: usize, step: usize, target: bool) -> &SoftIndicator {
        let index = self.entries.len();
        self.entries.push(SoftIndicator {
            rule: self.rule,
            run,
            step,
            literal: indicator_var(self.rule, run, step),
            target,
        });
        &self.entries[index]
    }

    pub fn entries(&self) -> &[SoftIndicator] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&SoftIndicator> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn literals(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.literal.clone()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SoftIndicator> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a SoftLedger {
    type Item = &'a SoftIndicator;
    type IntoIter = std::slice::Iter<'a, SoftIndicator>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
