use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};
use std::f64::consts::PI;
use std::sync::Arc;

use crate::model::ProverModel;
use crate::mtype::Name;
use crate::transform::Transformation;

pub trait FitnessFunction {
    /// A score in `[0, 1]`, or `-1` when the transformation must not be used.
    fn fitness(&self, t: &dyn Transformation) -> f64;
}

fn consequent_symbols(model: &ProverModel) -> BTreeSet<Name> {
    model.consequents().iter().flat_map(|c| c.symbol_names()).collect()
}

/// `i` rewritten into something still containing `i`, like `i + 0`.
fn is_identity_expansion(t: &dyn Transformation) -> bool {
    match (t.pattern(), t.replacement()) {
        (Some(pattern), Some(replacement)) => {
            pattern.is_variable() && replacement != pattern && replacement.quantified_variables().contains(pattern)
        }
        _ => false,
    }
}

fn score(t: &dyn Transformation, consequent_symbols: &BTreeSet<Name>) -> f64 {
    let pattern_symbols = t.pattern_symbol_names();
    let introduced = t
        .replacement_symbol_names()
        .iter()
        .filter(|n| !pattern_symbols.contains(*n) && !consequent_symbols.contains(*n))
        .count();
    let novelty = 0.5f64.powi(introduced as i32);
    let simplification = 0.5 - (t.function_application_count_delta() as f64).atan() / PI;
    (novelty * simplification).min(1.0)
}

/// Scores consequent rewrites for the goal-directed search.
pub struct MainProofFitness {
    consequent_symbols: BTreeSet<Name>,
    reject_identity_expansion: bool,
}

impl MainProofFitness {
    pub fn new(consequent_symbols: BTreeSet<Name>, reject_identity_expansion: bool) -> MainProofFitness {
        MainProofFitness {
            consequent_symbols,
            reject_identity_expansion,
        }
    }

    pub fn for_model(model: &ProverModel, reject_identity_expansion: bool) -> MainProofFitness {
        MainProofFitness::new(consequent_symbols(model), reject_identity_expansion)
    }
}

impl FitnessFunction for MainProofFitness {
    fn fitness(&self, t: &dyn Transformation) -> f64 {
        if t.could_affect_antecedent() || (self.reject_identity_expansion && is_identity_expansion(t)) {
            return -1.0;
        }
        score(t, &self.consequent_symbols)
    }
}

/// Scores antecedent developments. They may not touch the goals nor bring in
/// unbound variables.
pub struct DevelopmentFitness {
    consequent_symbols: BTreeSet<Name>,
    reject_identity_expansion: bool,
}

impl DevelopmentFitness {
    pub fn new(consequent_symbols: BTreeSet<Name>, reject_identity_expansion: bool) -> DevelopmentFitness {
        DevelopmentFitness {
            consequent_symbols,
            reject_identity_expansion,
        }
    }

    pub fn for_model(model: &ProverModel, reject_identity_expansion: bool) -> DevelopmentFitness {
        DevelopmentFitness::new(consequent_symbols(model), reject_identity_expansion)
    }
}

impl FitnessFunction for DevelopmentFitness {
    fn fitness(&self, t: &dyn Transformation) -> f64 {
        if t.could_affect_consequent()
            || t.introduces_quantified_variables()
            || (self.reject_identity_expansion && is_identity_expansion(t))
        {
            return -1.0;
        }
        score(t, &self.consequent_symbols)
    }
}

#[derive(Clone)]
pub struct Ranked {
    pub fitness: f64,
    pub transformation: Arc<dyn Transformation>,
    key: String,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Higher fitness first, then smaller key.
impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fitness
            .total_cmp(&other.fitness)
            .then_with(|| other.key.cmp(&self.key))
    }
}

/// Transformations with a non-negative score, best first.
pub fn rank(transformations: &[Arc<dyn Transformation>], fitness: &dyn FitnessFunction) -> Vec<Ranked> {
    let mut heap: BinaryHeap<Ranked> = transformations
        .iter()
        .map(|t| Ranked {
            fitness: fitness.fitness(t.as_ref()),
            transformation: t.clone(),
            key: t.key(),
        })
        .collect();
    let mut ranked = Vec::with_capacity(heap.len());
    while let Some(r) = heap.pop() {
        if r.fitness < 0.0 {
            log::trace!("rejected {}", r.key);
            continue;
        }
        log::debug!("{:.4} {}", r.fitness, r.key);
        ranked.push(r);
    }
    ranked
}
