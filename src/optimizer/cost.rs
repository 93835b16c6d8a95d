//! Cardinality and cost estimation.

use crate::selection::MappedFragment;
use std::collections::{BTreeMap, BTreeSet};

/// Cost multiplier applied to cross products.
pub const DEFAULT_CROSS_PRODUCT_PENALTY: f64 = 1000.0;

/// Estimated result size and accumulated cost of a plan node.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Estimate {
    pub cardinality: f64,
    pub cost: f64,
}

/// Statistical profile of an intermediate result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relation {
    pub cardinality: f64,
    /// Distinct values per bound variable.
    pub distinct: BTreeMap<String, f64>,
}

impl Relation {
    pub fn of_fragment(fragment: &MappedFragment) -> Self {
        let distinct = fragment
            .pattern
            .variables()
            .into_iter()
            .map(|v| {
                let d = fragment.distinct_values(&v);
                (v, d)
            })
            .collect();
        Self { cardinality: fragment.cardinality.max(0.0), distinct }
    }

    pub fn variables(&self) -> BTreeSet<String> {
        self.distinct.keys().cloned().collect()
    }

    pub fn shared_variables(&self, other: &Relation) -> BTreeSet<String> {
        self.distinct.keys().filter(|v| other.distinct.contains_key(*v)).cloned().collect()
    }

    fn distinct_of(&self, variable: &str) -> f64 {
        self.distinct.get(variable).copied().unwrap_or(self.cardinality).max(1.0)
    }

    /// Estimated size of joining with `other`.
    ///
    /// For each shared variable `v` the estimate is `|L| * |R| / max(d_L(v), d_R(v))`;
    /// the most selective variable wins. Without shared variables the result
    /// is the cross product.
    pub fn join_cardinality(&self, other: &Relation) -> f64 {
        let product = self.cardinality * other.cardinality;
        self.shared_variables(other)
            .iter()
            .map(|v| product / self.distinct_of(v).max(other.distinct_of(v)))
            .fold(product, f64::min)
    }

    pub fn join(&self, other: &Relation) -> Relation {
        let cardinality = self.join_cardinality(other);
        let mut distinct = BTreeMap::new();
        for (variable, &d) in self.distinct.iter().chain(other.distinct.iter()) {
            let d = d.min(cardinality);
            distinct
                .entry(variable.clone())
                .and_modify(|existing: &mut f64| *existing = existing.min(d))
                .or_insert(d);
        }
        Relation { cardinality, distinct }
    }
}

/// Folds a group's fragments in original order into one profile.
pub fn group_relation<'a>(fragments: impl IntoIterator<Item = &'a MappedFragment>) -> Relation {
    let mut fragments = fragments.into_iter();
    let Some(first) = fragments.next() else {
        return Relation::default();
    };
    fragments.fold(Relation::of_fragment(first), |acc, f| acc.join(&Relation::of_fragment(f)))
}

#[derive(Debug, Clone, Copy)]
pub struct CostModel {
    pub cross_product_penalty: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self { cross_product_penalty: DEFAULT_CROSS_PRODUCT_PENALTY }
    }
}

impl CostModel {
    /// A leaf costs what it transfers.
    pub fn leaf(&self, relation: &Relation) -> Estimate {
        Estimate { cardinality: relation.cardinality, cost: relation.cardinality }
    }

    pub fn join(
        &self,
        left: Estimate,
        right: Estimate,
        cardinality: f64,
        cross_product: bool,
    ) -> Estimate {
        let mut step = cardinality;
        if cross_product {
            step *= self.cross_product_penalty;
        }
        Estimate { cardinality, cost: left.cost + right.cost + step }
    }

    pub fn union(&self, left: Estimate, right: Estimate) -> Estimate {
        Estimate { cardinality: left.cardinality + right.cardinality, cost: left.cost + right.cost }
    }
}
