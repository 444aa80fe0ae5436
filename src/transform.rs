//! Rewrites derived from theorems, and the applications they produce
//! against a model.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Display;

use crate::env::Quantification;
use crate::model::{Application, Binder, Conjunct, Edit, ProverModel, SiteSource};
use crate::mtype::Name;
use crate::pexp::PExp;
use crate::theorem::{Justification, LocalTheorem, Theorem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equivalence {
    Equivalent,
    /// The result implies what it replaces, but not the other way round.
    Stronger,
}

pub trait Transformation: Display + Send + Sync {
    /// Every way this transformation currently applies to `model`.
    fn applications(&self, model: &ProverModel) -> Vec<Application>;

    fn could_affect_antecedent(&self) -> bool;

    fn could_affect_consequent(&self) -> bool;

    /// Function applications added (positive) or removed (negative).
    fn function_application_count_delta(&self) -> i64;

    fn introduces_quantified_variables(&self) -> bool;

    fn pattern_symbol_names(&self) -> BTreeSet<Name>;

    fn replacement_symbol_names(&self) -> BTreeSet<Name>;

    fn equivalence(&self) -> Equivalence;

    fn key(&self) -> String {
        self.to_string()
    }

    fn pattern(&self) -> Option<&PExp> {
        None
    }

    fn replacement(&self) -> Option<&PExp> {
        None
    }
}

fn application_count(exps: &[PExp]) -> i64 {
    exps.iter().map(|e| e.function_applications().len() as i64).sum()
}

fn symbol_names(exps: &[PExp]) -> BTreeSet<Name> {
    exps.iter().flat_map(PExp::symbol_names).collect()
}

fn introduces(patterns: &[PExp], replacements: &[PExp]) -> bool {
    let bound: HashSet<PExp> = patterns.iter().flat_map(PExp::quantified_variables).collect();
    replacements
        .iter()
        .flat_map(PExp::quantified_variables)
        .any(|v| !bound.contains(&v))
}

fn derived(by: &dyn Display, assertion: PExp) -> LocalTheorem {
    LocalTheorem {
        assertion,
        justification: Justification::Derived(by.to_string()),
        trying_to_prove: false,
    }
}

/// `pattern` rewritten into `replacement` wherever it occurs on one side.
struct Rewrite {
    theorem: Theorem,
    pattern: PExp,
    replacement: PExp,
}

impl Rewrite {
    fn applications(&self, model: &ProverModel, source: SiteSource, this: &dyn Display) -> Vec<Application> {
        let in_consequent = source == SiteSource::InductiveConsequents;
        model
            .bind(&[Binder::new(self.pattern.clone(), source)])
            .into_iter()
            .filter_map(|binding| {
                let site = binding.sites.first()?;
                let mut value = self.replacement.substitute(&binding.bindings);
                if !value.quantified_variables().is_empty() {
                    // Unbound variables in a goal are only required to exist.
                    if !in_consequent {
                        return None;
                    }
                    value = value.flip_quantifiers();
                }
                if value == site.exp {
                    return None;
                }
                let description = format!("{this}: {} becomes {value}", site.exp);
                Some(Application::new(
                    description,
                    vec![Edit::AlterSite {
                        conjunct: site.conjunct,
                        path: site.path.clone(),
                        value,
                    }],
                ))
            })
            .collect()
    }

    fn delta(&self) -> i64 {
        application_count(std::slice::from_ref(&self.replacement)) - application_count(std::slice::from_ref(&self.pattern))
    }

    fn introduces(&self) -> bool {
        introduces(std::slice::from_ref(&self.pattern), std::slice::from_ref(&self.replacement))
    }
}

pub struct SubstituteInPlaceInConsequent(Rewrite);

impl SubstituteInPlaceInConsequent {
    pub fn new(theorem: Theorem, pattern: PExp, replacement: PExp) -> SubstituteInPlaceInConsequent {
        SubstituteInPlaceInConsequent(Rewrite {
            theorem,
            pattern,
            replacement,
        })
    }
}

impl Display for SubstituteInPlaceInConsequent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Substitute in consequent {} → {} (by {})",
            self.0.pattern, self.0.replacement, self.0.theorem
        )
    }
}

impl Transformation for SubstituteInPlaceInConsequent {
    fn applications(&self, model: &ProverModel) -> Vec<Application> {
        self.0.applications(model, SiteSource::InductiveConsequents, self)
    }

    fn could_affect_antecedent(&self) -> bool {
        false
    }

    fn could_affect_consequent(&self) -> bool {
        true
    }

    fn function_application_count_delta(&self) -> i64 {
        self.0.delta()
    }

    fn introduces_quantified_variables(&self) -> bool {
        self.0.introduces()
    }

    fn pattern_symbol_names(&self) -> BTreeSet<Name> {
        self.0.pattern.symbol_names()
    }

    fn replacement_symbol_names(&self) -> BTreeSet<Name> {
        self.0.replacement.symbol_names()
    }

    fn equivalence(&self) -> Equivalence {
        Equivalence::Equivalent
    }

    fn pattern(&self) -> Option<&PExp> {
        Some(&self.0.pattern)
    }

    fn replacement(&self) -> Option<&PExp> {
        Some(&self.0.replacement)
    }
}

pub struct SubstituteInPlaceInAntecedent(Rewrite);

impl SubstituteInPlaceInAntecedent {
    pub fn new(theorem: Theorem, pattern: PExp, replacement: PExp) -> SubstituteInPlaceInAntecedent {
        SubstituteInPlaceInAntecedent(Rewrite {
            theorem,
            pattern,
            replacement,
        })
    }
}

impl Display for SubstituteInPlaceInAntecedent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Substitute in antecedent {} → {} (by {})",
            self.0.pattern, self.0.replacement, self.0.theorem
        )
    }
}

impl Transformation for SubstituteInPlaceInAntecedent {
    fn applications(&self, model: &ProverModel) -> Vec<Application> {
        self.0.applications(model, SiteSource::InductiveAntecedents, self)
    }

    fn could_affect_antecedent(&self) -> bool {
        true
    }

    fn could_affect_consequent(&self) -> bool {
        false
    }

    fn function_application_count_delta(&self) -> i64 {
        self.0.delta()
    }

    fn introduces_quantified_variables(&self) -> bool {
        self.0.introduces()
    }

    fn pattern_symbol_names(&self) -> BTreeSet<Name> {
        self.0.pattern.symbol_names()
    }

    fn replacement_symbol_names(&self) -> BTreeSet<Name> {
        self.0.replacement.symbol_names()
    }

    fn equivalence(&self) -> Equivalence {
        Equivalence::Equivalent
    }

    fn pattern(&self) -> Option<&PExp> {
        Some(&self.0.pattern)
    }

    fn replacement(&self) -> Option<&PExp> {
        Some(&self.0.replacement)
    }
}

/// Replaces a goal matching `consequent` by the goals `antecedents`. With no
/// antecedents the goal is simply discharged.
pub struct StrengthenConsequent {
    theorem: Theorem,
    antecedents: Vec<PExp>,
    consequent: PExp,
}

impl StrengthenConsequent {
    pub fn new(theorem: Theorem, antecedents: Vec<PExp>, consequent: PExp) -> StrengthenConsequent {
        StrengthenConsequent {
            theorem,
            antecedents,
            consequent,
        }
    }
}

impl Display for StrengthenConsequent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.antecedents.is_empty() {
            write!(f, "Discharge by {}", self.theorem)
        } else {
            write!(f, "Strengthen by {}", self.theorem)
        }
    }
}

impl Transformation for StrengthenConsequent {
    fn applications(&self, model: &ProverModel) -> Vec<Application> {
        model
            .bind(&[Binder::new(self.consequent.clone(), SiteSource::TopLevelConsequents)])
            .into_iter()
            .filter_map(|binding| {
                let site = binding.sites.first()?;
                let Conjunct::Consequent(index) = site.conjunct else {
                    return None;
                };
                let mut edits = vec![Edit::RemoveConsequent(index)];
                edits.extend(self.antecedents.iter().enumerate().map(|(k, a)| Edit::InsertConsequent {
                    index: index + k,
                    value: a.substitute(&binding.bindings).flip_quantifiers(),
                }));
                Some(Application::new(format!("{self}: {}", site.exp), edits))
            })
            .collect()
    }

    fn could_affect_antecedent(&self) -> bool {
        false
    }

    fn could_affect_consequent(&self) -> bool {
        true
    }

    fn function_application_count_delta(&self) -> i64 {
        application_count(&self.antecedents) - application_count(std::slice::from_ref(&self.consequent))
    }

    fn introduces_quantified_variables(&self) -> bool {
        introduces(std::slice::from_ref(&self.consequent), &self.antecedents)
    }

    fn pattern_symbol_names(&self) -> BTreeSet<Name> {
        self.consequent.symbol_names()
    }

    fn replacement_symbol_names(&self) -> BTreeSet<Name> {
        symbol_names(&self.antecedents)
    }

    fn equivalence(&self) -> Equivalence {
        if self.antecedents.is_empty() {
            Equivalence::Equivalent
        } else {
            Equivalence::Stronger
        }
    }

    fn pattern(&self) -> Option<&PExp> {
        Some(&self.consequent)
    }
}

/// Adds the instantiated `consequent` once every antecedent is known.
pub struct ExpandAntecedentByImplication {
    theorem: Theorem,
    antecedents: Vec<PExp>,
    consequent: PExp,
}

impl ExpandAntecedentByImplication {
    pub fn new(theorem: Theorem, antecedents: Vec<PExp>, consequent: PExp) -> ExpandAntecedentByImplication {
        ExpandAntecedentByImplication {
            theorem,
            antecedents,
            consequent,
        }
    }
}

impl Display for ExpandAntecedentByImplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Develop antecedent by {}", self.theorem)
    }
}

impl Transformation for ExpandAntecedentByImplication {
    fn applications(&self, model: &ProverModel) -> Vec<Application> {
        let binders: Vec<Binder> = self
            .antecedents
            .iter()
            .map(|a| Binder::new(a.clone(), SiteSource::TopLevelAntecedentsAndLibrary))
            .collect();
        let mut seen = HashSet::new();
        model
            .bind(&binders)
            .into_iter()
            .filter_map(|binding| {
                let value = self.consequent.substitute(&binding.bindings);
                if !value.quantified_variables().is_empty()
                    || model.contains_local_theorem(&value)
                    || !seen.insert(value.clone())
                {
                    return None;
                }
                Some(Application::new(
                    format!("{self}: {value}"),
                    vec![Edit::AddAntecedent(derived(self, value))],
                ))
            })
            .collect()
    }

    fn could_affect_antecedent(&self) -> bool {
        true
    }

    fn could_affect_consequent(&self) -> bool {
        false
    }

    fn function_application_count_delta(&self) -> i64 {
        application_count(std::slice::from_ref(&self.consequent)) - application_count(&self.antecedents)
    }

    fn introduces_quantified_variables(&self) -> bool {
        introduces(&self.antecedents, std::slice::from_ref(&self.consequent))
    }

    fn pattern_symbol_names(&self) -> BTreeSet<Name> {
        symbol_names(&self.antecedents)
    }

    fn replacement_symbol_names(&self) -> BTreeSet<Name> {
        self.consequent.symbol_names()
    }

    fn equivalence(&self) -> Equivalence {
        Equivalence::Equivalent
    }

    fn replacement(&self) -> Option<&PExp> {
        Some(&self.consequent)
    }
}

/// Adds a copy of an antecedent with one occurrence of `pattern` replaced by
/// `template`.
pub struct ExpandAntecedentBySubstitution {
    theorem: Theorem,
    pattern: PExp,
    template: PExp,
}

impl ExpandAntecedentBySubstitution {
    pub fn new(theorem: Theorem, pattern: PExp, template: PExp) -> ExpandAntecedentBySubstitution {
        ExpandAntecedentBySubstitution {
            theorem,
            pattern,
            template,
        }
    }
}

impl Display for ExpandAntecedentBySubstitution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Develop antecedent {} → {} (by {})",
            self.pattern, self.template, self.theorem
        )
    }
}

impl Transformation for ExpandAntecedentBySubstitution {
    fn applications(&self, model: &ProverModel) -> Vec<Application> {
        let mut seen = HashSet::new();
        model
            .bind(&[Binder::new(self.pattern.clone(), SiteSource::InductiveAntecedents)])
            .into_iter()
            .filter_map(|binding| {
                let site = binding.sites.first()?;
                let Conjunct::Antecedent(index) = site.conjunct else {
                    return None;
                };
                let root = &model.local_theorems().get(index)?.assertion;
                if *root == self.theorem.assertion {
                    return None;
                }
                let replacement = self.template.substitute(&binding.bindings);
                let value = root.with_site_altered(&site.path, replacement).ok()?;
                if value == *root
                    || !value.quantified_variables().is_empty()
                    || model.contains_local_theorem(&value)
                    || !seen.insert(value.clone())
                {
                    return None;
                }
                Some(Application::new(
                    format!("{self}: {value}"),
                    vec![Edit::AddAntecedent(derived(self, value))],
                ))
            })
            .collect()
    }

    fn could_affect_antecedent(&self) -> bool {
        true
    }

    fn could_affect_consequent(&self) -> bool {
        false
    }

    fn function_application_count_delta(&self) -> i64 {
        application_count(std::slice::from_ref(&self.template)) - application_count(std::slice::from_ref(&self.pattern))
    }

    fn introduces_quantified_variables(&self) -> bool {
        introduces(std::slice::from_ref(&self.pattern), std::slice::from_ref(&self.template))
    }

    fn pattern_symbol_names(&self) -> BTreeSet<Name> {
        self.pattern.symbol_names()
    }

    fn replacement_symbol_names(&self) -> BTreeSet<Name> {
        self.template.symbol_names()
    }

    fn equivalence(&self) -> Equivalence {
        Equivalence::Equivalent
    }

    fn pattern(&self) -> Option<&PExp> {
        Some(&self.pattern)
    }

    fn replacement(&self) -> Option<&PExp> {
        Some(&self.template)
    }
}

/// A discharged goal loses its relation and the witnessed application.
pub const EXISTENTIAL_INSTANTIATION_DELTA: i64 = -2;

/// Proves a goal with existential variables by finding witnesses among the
/// antecedents and library, then commits the other goals to those witnesses.
pub struct ExistentialInstantiation;

impl Display for ExistentialInstantiation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Existential instantiation")
    }
}

impl Transformation for ExistentialInstantiation {
    fn applications(&self, model: &ProverModel) -> Vec<Application> {
        let mut result = vec![];
        for (index, goal) in model.consequents().iter().enumerate() {
            if !goal.contains_existential() {
                continue;
            }
            let pattern = goal.flip_quantifiers();
            for binding in model.bind(&[Binder::new(pattern, SiteSource::TopLevelAntecedentsAndLibrary)]) {
                let witnesses: HashMap<PExp, PExp> = binding
                    .bindings
                    .into_iter()
                    .map(|(var, value)| (var.with_quantification(Quantification::Existential), value))
                    .collect();
                let mut edits = vec![];
                for (other, consequent) in model.consequents().iter().enumerate() {
                    if other == index {
                        continue;
                    }
                    let value = consequent.substitute(&witnesses);
                    if value != *consequent {
                        edits.push(Edit::AlterSite {
                            conjunct: Conjunct::Consequent(other),
                            path: vec![],
                            value,
                        });
                    }
                }
                edits.push(Edit::RemoveConsequent(index));
                result.push(Application::new(format!("{self}: {goal}"), edits));
            }
        }
        result
    }

    fn could_affect_antecedent(&self) -> bool {
        false
    }

    fn could_affect_consequent(&self) -> bool {
        true
    }

    fn function_application_count_delta(&self) -> i64 {
        EXISTENTIAL_INSTANTIATION_DELTA
    }

    fn introduces_quantified_variables(&self) -> bool {
        false
    }

    fn pattern_symbol_names(&self) -> BTreeSet<Name> {
        BTreeSet::new()
    }

    fn replacement_symbol_names(&self) -> BTreeSet<Name> {
        BTreeSet::new()
    }

    fn equivalence(&self) -> Equivalence {
        Equivalence::Stronger
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graph::TypeGraph;

    struct Fixture {
        g: Arc<TypeGraph>,
    }

    impl Fixture {
        fn new() -> Fixture {
            Fixture {
                g: Arc::new(TypeGraph::new()),
            }
        }

        fn int(&self, name: &str) -> PExp {
            PExp::symbol(name, self.g.z.clone())
        }

        fn var(&self, name: &str) -> PExp {
            PExp::variable(name, self.g.z.clone(), Quantification::Universal)
        }

        fn plus(&self, a: PExp, b: PExp) -> PExp {
            PExp::new("+", vec![a, b], self.g.z.clone())
        }

        fn eq(&self, a: PExp, b: PExp) -> PExp {
            PExp::equals(&self.g, a, b)
        }

        fn pred(&self, name: &str, a: PExp) -> PExp {
            PExp::new(name, vec![a], self.g.boolean.clone())
        }

        fn model(&self, antecedents: Vec<PExp>, consequents: Vec<PExp>) -> ProverModel {
            ProverModel::new("vc", antecedents, consequents, Vec::new().into(), self.g.clone())
        }

        fn additive_identity(&self) -> Theorem {
            let i = self.var("i");
            Theorem::new(self.eq(self.plus(i.clone(), self.int("0")), i), Justification::Library)
        }
    }

    #[test]
    fn substitution_rewrites_goals_in_place() {
        let f = Fixture::new();
        let t = f.additive_identity();
        let rewrite = SubstituteInPlaceInConsequent::new(t.clone(), t.assertion.args()[0].clone(), t.assertion.args()[1].clone());
        let goal = f.eq(f.plus(f.int("x"), f.int("0")), f.int("y"));
        let mut m = f.model(vec![], vec![goal]);
        let applications = rewrite.applications(&m);
        assert_eq!(applications.len(), 1);
        m.apply(&applications[0]).unwrap();
        insta::assert_snapshot!(m.consequents()[0], @"x = y");
        assert_eq!(rewrite.function_application_count_delta(), -1);
        assert!(!rewrite.introduces_quantified_variables());
    }

    #[test]
    fn reverse_substitution_introduces_nothing_new() {
        let f = Fixture::new();
        let t = f.additive_identity();
        let reverse = SubstituteInPlaceInConsequent::new(t.clone(), t.assertion.args()[1].clone(), t.assertion.args()[0].clone());
        assert_eq!(reverse.function_application_count_delta(), 1);
        assert!(!reverse.introduces_quantified_variables());
        assert!(reverse.pattern().is_some_and(PExp::is_variable));
    }

    #[test]
    fn strengthening_replaces_goal_with_premises() {
        let f = Fixture::new();
        let n = f.var("n");
        let theorem = Theorem::new(
            PExp::implies(&f.g, f.pred("Even", n.clone()), f.pred("Integral", n.clone())),
            Justification::Axiom,
        );
        let strengthen = StrengthenConsequent::new(
            theorem.clone(),
            vec![f.pred("Even", n.clone())],
            f.pred("Integral", n),
        );
        let mut m = f.model(vec![], vec![f.pred("Integral", f.int("k")), f.pred("Other", f.int("k"))]);
        let applications = strengthen.applications(&m);
        assert_eq!(applications.len(), 1);
        m.apply(&applications[0]).unwrap();
        assert_eq!(m.consequents(), &[f.pred("Even", f.int("k")), f.pred("Other", f.int("k"))]);
        assert_eq!(strengthen.equivalence(), Equivalence::Stronger);
    }

    #[test]
    fn implication_expands_known_antecedents_once() {
        let f = Fixture::new();
        let n = f.var("n");
        let theorem = Theorem::new(
            PExp::implies(&f.g, f.pred("Even", n.clone()), f.pred("Integral", n.clone())),
            Justification::Axiom,
        );
        let expand = ExpandAntecedentByImplication::new(theorem, vec![f.pred("Even", n.clone())], f.pred("Integral", n));
        let mut m = f.model(vec![f.pred("Even", f.int("k"))], vec![f.pred("Q", f.int("k"))]);
        let applications = expand.applications(&m);
        assert_eq!(applications.len(), 1);
        m.apply(&applications[0]).unwrap();
        assert!(m.contains_local_theorem(&f.pred("Integral", f.int("k"))));
        assert!(expand.applications(&m).is_empty());
    }

    #[test]
    fn substitution_expansion_adds_rewritten_copy() {
        let f = Fixture::new();
        let t = f.additive_identity();
        let expand = ExpandAntecedentBySubstitution::new(t.clone(), t.assertion.args()[0].clone(), t.assertion.args()[1].clone());
        let fact = f.pred("P", f.plus(f.int("a"), f.int("0")));
        let mut m = f.model(vec![fact.clone()], vec![f.pred("P", f.int("a"))]);
        let applications = expand.applications(&m);
        assert_eq!(applications.len(), 1);
        m.apply(&applications[0]).unwrap();
        assert!(m.contains_local_theorem(&fact));
        assert!(m.contains_local_theorem(&f.pred("P", f.int("a"))));
    }

    #[test]
    fn existential_goals_take_witnesses() {
        let f = Fixture::new();
        let e = PExp::variable("e", f.g.z.clone(), Quantification::Existential);
        let mut m = f.model(
            vec![f.pred("P", f.int("w"))],
            vec![f.pred("P", e.clone()), f.eq(e, f.int("w"))],
        );
        let applications = ExistentialInstantiation.applications(&m);
        assert_eq!(applications.len(), 1);
        m.apply(&applications[0]).unwrap();
        assert_eq!(m.consequents(), &[f.eq(f.int("w"), f.int("w"))]);
    }
}
