//! Operator tree produced by the optimizer and consumed by the executor.

use super::cost::Estimate;
use super::grouping::Group;
use crate::core::SourceId;
use crate::parsing::FilterCondition;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// One remote sub-query dispatched to every source of the group.
    Leaf(Group),
    /// Bound join on `shared`; a cross product when `shared` is empty.
    Join { left: Box<PlanNode>, right: Box<PlanNode>, shared: BTreeSet<String> },
    /// Local row-by-row filter.
    Filter { child: Box<PlanNode>, condition: FilterCondition },
    Union { left: Box<PlanNode>, right: Box<PlanNode> },
    /// Provably empty result; nothing is dispatched.
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub estimate: Estimate,
    pub op: Operator,
}

impl PlanNode {
    pub fn empty() -> Self {
        Self { estimate: Estimate::default(), op: Operator::Empty }
    }

    pub fn leaf(group: Group, estimate: Estimate) -> Self {
        Self { estimate, op: Operator::Leaf(group) }
    }

    pub fn join(
        left: PlanNode,
        right: PlanNode,
        shared: BTreeSet<String>,
        estimate: Estimate,
    ) -> Self {
        let op = Operator::Join { left: Box::new(left), right: Box::new(right), shared };
        Self { estimate, op }
    }

    pub fn filter(child: PlanNode, condition: FilterCondition) -> Self {
        let estimate = child.estimate;
        Self { estimate, op: Operator::Filter { child: Box::new(child), condition } }
    }

    pub fn union(left: PlanNode, right: PlanNode, estimate: Estimate) -> Self {
        Self { estimate, op: Operator::Union { left: Box::new(left), right: Box::new(right) } }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.op, Operator::Empty)
    }

    /// Variables bound by every row this node produces.
    pub fn variables(&self) -> BTreeSet<String> {
        match &self.op {
            Operator::Leaf(group) => group.variables(),
            Operator::Join { left, right, .. } => {
                left.variables().union(&right.variables()).cloned().collect()
            }
            Operator::Filter { child, .. } => child.variables(),
            Operator::Union { left, right } => {
                left.variables().intersection(&right.variables()).cloned().collect()
            }
            Operator::Empty => BTreeSet::new(),
        }
    }

    /// Leaves in evaluation order.
    pub fn leaves(&self) -> Vec<&Group> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Group>) {
        match &self.op {
            Operator::Leaf(group) => out.push(group),
            Operator::Join { left, right, .. } | Operator::Union { left, right } => {
                left.collect_leaves(out);
                right.collect_leaves(out);
            }
            Operator::Filter { child, .. } => child.collect_leaves(out),
            Operator::Empty => {}
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        let estimate =
            format!("card={:.1} cost={:.1}", self.estimate.cardinality, self.estimate.cost);
        match &self.op {
            Operator::Leaf(group) => {
                let sources: Vec<&str> = group.sources.iter().map(SourceId::as_str).collect();
                writeln!(f, "{}Leaf @ [{}] ({})", indent, sources.join(", "), estimate)?;
                for pattern in group.patterns() {
                    writeln!(f, "{}  {}", indent, pattern)?;
                }
                for filter in &group.filters {
                    writeln!(f, "{}  FILTER {}", indent, filter)?;
                }
                Ok(())
            }
            Operator::Join { left, right, shared } => {
                if shared.is_empty() {
                    writeln!(f, "{}CrossProduct ({})", indent, estimate)?;
                } else {
                    let vars: Vec<String> = shared.iter().map(|v| format!("?{}", v)).collect();
                    writeln!(f, "{}Join on {} ({})", indent, vars.join(" "), estimate)?;
                }
                left.write_indented(f, depth + 1)?;
                right.write_indented(f, depth + 1)
            }
            Operator::Filter { child, condition } => {
                writeln!(f, "{}Filter {} ({})", indent, condition, estimate)?;
                child.write_indented(f, depth + 1)
            }
            Operator::Union { left, right } => {
                writeln!(f, "{}Union ({})", indent, estimate)?;
                left.write_indented(f, depth + 1)?;
                right.write_indented(f, depth + 1)
            }
            Operator::Empty => writeln!(f, "{}Empty", indent),
        }
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}
