//! Greedy cost-based join ordering and filter placement.

use super::cost::{group_relation, CostModel, Relation};
use super::grouping::{group_fragments, Group};
use super::plan::PlanNode;
use crate::error::{FederationError, Result};
use crate::execution::filter_eval::is_supported;
use crate::parsing::FilterCondition;
use crate::selection::MappedFragment;
use crate::subquery::SubQueryBuilder;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

/// A filter that could not be pushed into a sub-query, with the variables
/// that must be bound before it can be evaluated.
struct PendingFilter {
    condition: FilterCondition,
    needed: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptimizer {
    builder: SubQueryBuilder,
    cost_model: CostModel,
}

impl QueryOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cost_model(cost_model: CostModel) -> Self {
        Self { builder: SubQueryBuilder::new(), cost_model }
    }

    /// Groups fragments by identical source set.
    pub fn group(&self, mapped: &[MappedFragment]) -> Vec<Group> {
        group_fragments(mapped)
    }

    /// Builds the operator tree of one conjunctive branch.
    pub fn optimize(
        &self,
        mapped: &[MappedFragment],
        filters: &[FilterCondition],
    ) -> Result<PlanNode> {
        if mapped.is_empty() {
            return Ok(PlanNode::empty());
        }
        if let Some(fragment) = mapped.iter().find(|f| f.is_unsatisfiable()) {
            debug!("No source advertises {}, short-circuiting to an empty plan", fragment.pattern);
            return Ok(PlanNode::empty());
        }

        let mut groups = self.group(mapped);
        let mut pending = self.place_filters(&mut groups, filters)?;
        let relations: Vec<Relation> =
            groups.iter().map(|g| group_relation(&g.fragments)).collect();

        let mut slots: Vec<Option<Group>> = groups.into_iter().map(Some).collect();
        let mut remaining: Vec<usize> = (0..slots.len()).collect();

        let Some(start) = cheapest(remaining.iter().map(|&i| (i, relations[i].cardinality))) else {
            return Ok(PlanNode::empty());
        };
        remaining.retain(|&i| i != start);

        let mut relation = relations[start].clone();
        let mut plan = self.leaf(take(&mut slots, start)?, &relations[start], &mut pending);

        while !remaining.is_empty() {
            let joinable = remaining
                .iter()
                .filter(|&&i| !relation.shared_variables(&relations[i]).is_empty())
                .map(|&i| (i, relation.join_cardinality(&relations[i])));
            let (next, cross_product) = match cheapest(joinable) {
                Some(i) => (i, false),
                None => {
                    let i = cheapest(remaining.iter().map(|&i| (i, relations[i].cardinality)))
                        .ok_or_else(|| {
                            FederationError::Evaluation("No group left to join".to_string())
                        })?;
                    (i, true)
                }
            };
            remaining.retain(|&i| i != next);

            let shared = relation.shared_variables(&relations[next]);
            let right = self.leaf(take(&mut slots, next)?, &relations[next], &mut pending);
            let joined = relation.join(&relations[next]);
            let estimate = self.cost_model.join(
                plan.estimate,
                right.estimate,
                joined.cardinality,
                cross_product,
            );
            if cross_product {
                debug!("No group shares a variable with the plan, adding a cross product");
            }

            plan = PlanNode::join(plan, right, shared, estimate);
            relation = joined;
            plan = attach_ready(plan, &mut pending, &relation.variables());
        }

        for filter in pending {
            plan = PlanNode::filter(plan, filter.condition);
        }
        Ok(plan)
    }

    /// Optimizes every union branch independently; empty branches disappear.
    pub fn optimize_union(
        &self,
        branches: &[(Vec<MappedFragment>, Vec<FilterCondition>)],
    ) -> Result<PlanNode> {
        let mut plan: Option<PlanNode> = None;
        for (mapped, filters) in branches {
            let branch = self.optimize(mapped, filters)?;
            if branch.is_empty() {
                continue;
            }
            plan = Some(match plan {
                Some(acc) => {
                    let estimate = self.cost_model.union(acc.estimate, branch.estimate);
                    PlanNode::union(acc, branch, estimate)
                }
                None => branch,
            });
        }
        Ok(plan.unwrap_or_else(PlanNode::empty))
    }

    /// Pushes renderable filters whose variables are local to one group into
    /// that group and returns the rest. Filters carrying `EXISTS` travel only
    /// to the single source that answers every pattern inside it; filters left
    /// for local evaluation must only use locally supported functions.
    fn place_filters(
        &self,
        groups: &mut [Group],
        filters: &[FilterCondition],
    ) -> Result<Vec<PendingFilter>> {
        let bound: BTreeSet<String> = groups.iter().flat_map(Group::variables).collect();
        let mut pending = Vec::new();

        for filter in filters {
            let needed: BTreeSet<String> = filter.variables.intersection(&bound).cloned().collect();
            let target = if needed.is_empty() {
                None
            } else {
                groups.iter().position(|g| needed.is_subset(&g.variables()))
            };

            let pushable = target.is_some_and(|index| {
                self.builder.can_render(filter)
                    && (!filter.has_exists() || filter.exists_local_to(&groups[index].sources))
            });
            match target {
                Some(index) if pushable => {
                    debug!("Pushing FILTER {} into group {}", filter, index);
                    groups[index].filters.push(filter.clone());
                }
                _ if filter.has_exists() => {
                    return Err(FederationError::UnsupportedFragment(format!(
                        "EXISTS filter that cannot be sent to a single source: {}",
                        filter
                    )));
                }
                _ if !is_supported(&filter.expression) => {
                    return Err(FederationError::UnsupportedFragment(format!(
                        "FILTER spanning several sources uses a function that cannot be \
                         evaluated locally: {}",
                        filter
                    )));
                }
                _ => pending.push(PendingFilter { condition: filter.clone(), needed }),
            }
        }
        Ok(pending)
    }

    fn leaf(
        &self,
        group: Group,
        relation: &Relation,
        pending: &mut Vec<PendingFilter>,
    ) -> PlanNode {
        let variables = group.variables();
        let node = PlanNode::leaf(group, self.cost_model.leaf(relation));
        attach_ready(node, pending, &variables)
    }
}

/// Wraps `plan` with every pending filter whose variables are now bound.
fn attach_ready(
    mut plan: PlanNode,
    pending: &mut Vec<PendingFilter>,
    bound: &BTreeSet<String>,
) -> PlanNode {
    let mut index = 0;
    while index < pending.len() {
        let filter = &pending[index];
        if !filter.needed.is_empty() && filter.needed.is_subset(bound) {
            let filter = pending.remove(index);
            plan = PlanNode::filter(plan, filter.condition);
        } else {
            index += 1;
        }
    }
    plan
}

/// Lowest estimate wins; ties go to the earlier group.
fn cheapest(candidates: impl Iterator<Item = (usize, f64)>) -> Option<usize> {
    candidates
        .min_by(|(ia, ca), (ib, cb)| ca.partial_cmp(cb).unwrap_or(Ordering::Equal).then(ia.cmp(ib)))
        .map(|(i, _)| i)
}

fn take(slots: &mut [Option<Group>], index: usize) -> Result<Group> {
    slots
        .get_mut(index)
        .and_then(Option::take)
        .ok_or_else(|| FederationError::Evaluation(format!("Group {} planned twice", index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Slot, SourceId, TriplePattern};
    use crate::optimizer::Operator;
    use std::collections::BTreeMap;

    fn mapped(s: &str, p: &str, o: &str, source: &str, cardinality: f64) -> MappedFragment {
        let pattern = TriplePattern::new(Slot::var(s), Slot::iri(p), Slot::var(o));
        let distinct: BTreeMap<String, f64> =
            pattern.variables().into_iter().map(|v| (v, cardinality)).collect();
        MappedFragment {
            pattern,
            sources: [SourceId::new(source)].into_iter().collect(),
            cardinality,
            unselective: false,
            distinct,
        }
    }

    #[test]
    fn test_ties_keep_original_order() {
        let fragments = vec![
            mapped("a", "http://ex/p", "b", "A", 5.0),
            mapped("c", "http://ex/q", "d", "B", 5.0),
        ];
        let plan = QueryOptimizer::new().optimize(&fragments, &[]).unwrap();
        let leaves = plan.leaves();
        assert!(leaves[0].sources.contains(&SourceId::new("A")));
        assert!(leaves[1].sources.contains(&SourceId::new("B")));
    }

    #[test]
    fn test_joins_preferred_over_cross_products() {
        let fragments = vec![
            mapped("x", "http://ex/p", "y", "A", 10.0),
            mapped("u", "http://ex/q", "v", "B", 20.0),
            mapped("y", "http://ex/r", "z", "C", 500.0),
        ];
        let plan = QueryOptimizer::new().optimize(&fragments, &[]).unwrap();
        let order: Vec<&str> =
            plan.leaves().iter().map(|g| g.sources.iter().next().unwrap().as_str()).collect();
        assert_eq!(order, vec!["A", "C", "B"]);

        match &plan.op {
            Operator::Join { shared, left, .. } => {
                assert!(shared.is_empty());
                assert!(matches!(&left.op, Operator::Join { shared, .. } if shared.contains("y")));
            }
            other => panic!("unexpected root {:?}", other),
        }
    }
}
