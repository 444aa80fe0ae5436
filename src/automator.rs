use std::collections::{HashSet, VecDeque};
use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{Application, Conjunct, Edit, ProverModel};
use crate::mtype::Name;
use crate::pexp::PExp;
use crate::transform::{Equivalence, Transformation};

/// What an automator asks of the scheduler after one step.
#[derive(Default)]
pub struct Control {
    pushed: Vec<Box<dyn Automator>>,
    finished: bool,
    pause: bool,
}

impl Control {
    /// Runs `automator` before resuming the current one. Of several pushed
    /// automators the last runs first.
    pub fn push(&mut self, automator: impl Automator + 'static) {
        self.pushed.push(Box::new(automator));
    }

    pub fn push_boxed(&mut self, automator: Box<dyn Automator>) {
        self.pushed.push(automator);
    }

    /// Removes the current automator from the stack.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Stops the prover after this step without waiting for it.
    pub fn mark_to_pause(&mut self) {
        self.pause = true;
    }

    pub(crate) fn into_parts(self) -> (Vec<Box<dyn Automator>>, bool, bool) {
        (self.pushed, self.finished, self.pause)
    }
}

pub trait Automator: Send {
    fn step(&mut self, control: &mut Control, model: &mut ProverModel);
}

fn apply(model: &mut ProverModel, application: &Application) -> bool {
    match model.apply(application) {
        Ok(()) => true,
        Err(err) => {
            log::warn!("could not apply {}: {err}", application.description);
            false
        }
    }
}

/// Runs each automator to completion, in order.
pub struct PushSequence {
    steps: VecDeque<Box<dyn Automator>>,
}

impl PushSequence {
    pub fn new(steps: Vec<Box<dyn Automator>>) -> PushSequence {
        PushSequence { steps: steps.into() }
    }
}

impl Automator for PushSequence {
    fn step(&mut self, control: &mut Control, _model: &mut ProverModel) {
        match self.steps.pop_front() {
            Some(next) => control.push_boxed(next),
            None => control.finish(),
        }
    }
}

/// Applies the first application of a transformation, up to `n` times.
pub struct ApplyN {
    transformation: Arc<dyn Transformation>,
    remaining: usize,
}

impl ApplyN {
    pub fn new(transformation: Arc<dyn Transformation>, n: usize) -> ApplyN {
        ApplyN {
            transformation,
            remaining: n,
        }
    }
}

impl Automator for ApplyN {
    fn step(&mut self, control: &mut Control, model: &mut ProverModel) {
        let Some(application) = self
            .transformation
            .applications(model)
            .into_iter()
            .next()
            .filter(|_| self.remaining > 0)
        else {
            control.finish();
            return;
        };
        if application.label {
            log::info!("{}", application.description);
        }
        if !apply(model, &application) {
            control.finish();
            return;
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            control.finish();
        }
    }
}

/// Records a marker in the proof without changing the model.
pub struct NoOpLabel {
    text: String,
}

impl NoOpLabel {
    pub fn new(text: impl Into<String>) -> NoOpLabel {
        NoOpLabel { text: text.into() }
    }

    /// The label as a one-shot automator.
    pub fn once(text: impl Into<String>) -> ApplyN {
        ApplyN::new(Arc::new(NoOpLabel::new(text)), 1)
    }
}

impl Display for NoOpLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl Transformation for NoOpLabel {
    fn applications(&self, _model: &ProverModel) -> Vec<Application> {
        vec![Application::label(self.text.clone())]
    }

    fn could_affect_antecedent(&self) -> bool {
        false
    }

    fn could_affect_consequent(&self) -> bool {
        false
    }

    fn function_application_count_delta(&self) -> i64 {
        0
    }

    fn introduces_quantified_variables(&self) -> bool {
        false
    }

    fn pattern_symbol_names(&self) -> std::collections::BTreeSet<Name> {
        Default::default()
    }

    fn replacement_symbol_names(&self) -> std::collections::BTreeSet<Name> {
        Default::default()
    }

    fn equivalence(&self) -> Equivalence {
        Equivalence::Equivalent
    }
}

static PROGRAM_VARIABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_']*$").unwrap());

/// Replaces a variable by its value everywhere once an antecedent `x = e`
/// pins it down. Between two variables the later name is replaced by the
/// earlier one.
pub struct VariablePropagator;

impl VariablePropagator {
    fn is_program_variable(e: &PExp) -> bool {
        e.args().is_empty()
            && !e.is_quantified()
            && !matches!(e.name().as_str(), "true" | "false")
            && PROGRAM_VARIABLE.is_match(e.name().as_str())
    }

    fn propagatable(variable: &PExp, value: &PExp) -> bool {
        if !Self::is_program_variable(variable) || value.symbol_names().contains(variable.name()) {
            return false;
        }
        !Self::is_program_variable(value) || variable.name() > value.name()
    }

    fn find(model: &ProverModel) -> Option<Application> {
        for (index, antecedent) in model.antecedents().enumerate() {
            if !antecedent.is_equality() {
                continue;
            }
            let (l, r) = (&antecedent.args()[0], &antecedent.args()[1]);
            let (variable, value) = if Self::propagatable(l, r) {
                (l, r)
            } else if Self::propagatable(r, l) {
                (r, l)
            } else {
                continue;
            };
            let substitution = [(variable.clone(), value.clone())].into_iter().collect();
            let mut edits = vec![];
            for (i, other) in model.antecedents().enumerate() {
                let replaced = other.substitute(&substitution);
                if i != index && replaced != *other {
                    edits.push(Edit::AlterSite {
                        conjunct: Conjunct::Antecedent(i),
                        path: vec![],
                        value: replaced,
                    });
                }
            }
            for (i, goal) in model.consequents().iter().enumerate() {
                let replaced = goal.substitute(&substitution);
                if replaced != *goal {
                    edits.push(Edit::AlterSite {
                        conjunct: Conjunct::Consequent(i),
                        path: vec![],
                        value: replaced,
                    });
                }
            }
            if !edits.is_empty() {
                return Some(Application::new(format!("Propagate {variable} := {value}"), edits));
            }
        }
        None
    }
}

impl Automator for VariablePropagator {
    fn step(&mut self, control: &mut Control, model: &mut ProverModel) {
        match Self::find(model) {
            Some(application) if apply(model, &application) => {}
            _ => control.finish(),
        }
    }
}

/// Adds up to `budget` new antecedents using the given transformations,
/// best first.
pub struct AntecedentDeveloper {
    transformations: Arc<[Arc<dyn Transformation>]>,
    budget: usize,
}

impl AntecedentDeveloper {
    pub fn new(transformations: Arc<[Arc<dyn Transformation>]>, budget: usize) -> AntecedentDeveloper {
        AntecedentDeveloper {
            transformations,
            budget,
        }
    }
}

impl Automator for AntecedentDeveloper {
    fn step(&mut self, control: &mut Control, model: &mut ProverModel) {
        if self.budget == 0 {
            control.finish();
            return;
        }
        let next = self.transformations.iter().find_map(|t| {
            t.applications(model).into_iter().find(|a| {
                a.edits
                    .iter()
                    .any(|e| matches!(e, Edit::AddAntecedent(added) if !model.contains_local_theorem(&added.assertion)))
            })
        });
        match next {
            Some(application) if apply(model, &application) => self.budget -= 1,
            _ => control.finish(),
        }
    }
}

fn rewrites_in_place(application: &Application) -> bool {
    !application.edits.is_empty() && application.edits.iter().all(|e| matches!(e, Edit::AlterSite { .. }))
}

fn first_rewrite(transformations: &[Arc<dyn Transformation>], model: &ProverModel) -> Option<Application> {
    transformations
        .iter()
        .find_map(|t| t.applications(model).into_iter().find(rewrites_in_place))
}

/// Simplifies antecedents with shrinking rewrites, then drops those that are
/// trivially true or repeated, for at most `rounds` rounds.
pub struct AntecedentMinimizer {
    transformations: Arc<[Arc<dyn Transformation>]>,
    rounds: usize,
}

impl AntecedentMinimizer {
    pub fn new(transformations: Arc<[Arc<dyn Transformation>]>, rounds: usize) -> AntecedentMinimizer {
        AntecedentMinimizer { transformations, rounds }
    }
}

impl Automator for AntecedentMinimizer {
    fn step(&mut self, control: &mut Control, model: &mut ProverModel) {
        if self.rounds == 0 {
            control.finish();
            return;
        }
        if let Some(application) = first_rewrite(&self.transformations, model) {
            if apply(model, &application) {
                return;
            }
        }
        self.rounds -= 1;
        let mut seen = HashSet::new();
        let redundant: Vec<usize> = model
            .antecedents()
            .enumerate()
            .filter(|(_, a)| a.is_obviously_true() || !seen.insert((*a).clone()))
            .map(|(i, _)| i)
            .collect();
        if redundant.is_empty() {
            control.finish();
            return;
        }
        let edits = redundant.into_iter().rev().map(Edit::RemoveAntecedent).collect();
        if !apply(model, &Application::new("Remove redundant antecedents", edits)) {
            control.finish();
        }
    }
}

/// Simplifies consequents with shrinking rewrites until none applies.
pub struct Minimizer {
    transformations: Arc<[Arc<dyn Transformation>]>,
}

impl Minimizer {
    pub fn new(transformations: Arc<[Arc<dyn Transformation>]>) -> Minimizer {
        Minimizer { transformations }
    }
}

impl Automator for Minimizer {
    fn step(&mut self, control: &mut Control, model: &mut ProverModel) {
        match first_rewrite(&self.transformations, model) {
            Some(application) if apply(model, &application) => {}
            _ => control.finish(),
        }
    }
}

/// Drops consequents that are trivially true or already given.
pub struct Simplify;

impl Automator for Simplify {
    fn step(&mut self, control: &mut Control, model: &mut ProverModel) {
        let established: Vec<usize> = model
            .consequents()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_obviously_true() || model.contains_local_theorem(c))
            .map(|(i, _)| i)
            .collect();
        control.finish();
        if established.is_empty() {
            return;
        }
        let edits = established.into_iter().rev().map(Edit::RemoveConsequent).collect();
        apply(model, &Application::new("Simplify", edits));
    }
}

/// One level of the goal-directed depth-first search. Each candidate
/// application is tried in turn and explored `depth - 1` levels further,
/// undoing everything before the next candidate. States already seen
/// anywhere in the search are skipped.
pub struct MainProofLevel {
    depth: usize,
    transformations: Arc<[Arc<dyn Transformation>]>,
    visited: Arc<Mutex<HashSet<u64>>>,
    state: Option<Level>,
}

struct Level {
    mark: usize,
    candidates: VecDeque<Application>,
    applied: bool,
}

impl MainProofLevel {
    pub fn new(depth: usize, transformations: Arc<[Arc<dyn Transformation>]>) -> MainProofLevel {
        MainProofLevel {
            depth,
            transformations,
            visited: Default::default(),
            state: None,
        }
    }

    fn child(&self) -> MainProofLevel {
        MainProofLevel {
            depth: self.depth - 1,
            transformations: self.transformations.clone(),
            visited: self.visited.clone(),
            state: None,
        }
    }

    fn visit(&self, hash: u64) -> bool {
        self.visited.lock().unwrap_or_else(PoisonError::into_inner).insert(hash)
    }
}

impl Automator for MainProofLevel {
    fn step(&mut self, control: &mut Control, model: &mut ProverModel) {
        if self.state.is_none() {
            self.visit(model.implication_hash());
            let candidates = self.transformations.iter().flat_map(|t| t.applications(model)).collect();
            self.state = Some(Level {
                mark: model.proof_len(),
                candidates,
                applied: false,
            });
        }
        let Some(mut level) = self.state.take() else {
            return;
        };
        if level.applied {
            model.undo_to(level.mark);
            level.applied = false;
        }
        while let Some(application) = level.candidates.pop_front() {
            if !apply(model, &application) {
                continue;
            }
            if model.no_consequents() {
                break;
            }
            if !self.visit(model.implication_hash()) {
                model.undo_to(level.mark);
                continue;
            }
            level.applied = true;
            if self.depth > 1 {
                control.push(self.child());
            }
            control.push(Simplify);
            self.state = Some(level);
            return;
        }
        if !model.no_consequents() {
            control.finish();
        }
        self.state = Some(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Quantification;
    use crate::graph::TypeGraph;
    use crate::theorem::{Justification, Theorem};
    use crate::transform::SubstituteInPlaceInConsequent;

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

        fn eq(&self, a: PExp, b: PExp) -> PExp {
            PExp::equals(&self.g, a, b)
        }

        fn model(&self, antecedents: Vec<PExp>, consequents: Vec<PExp>) -> ProverModel {
            ProverModel::new("vc", antecedents, consequents, Vec::new().into(), self.g.clone())
        }
    }

    /// Steps `automator` like the scheduler would, until it finishes.
    fn run(automator: impl Automator + 'static, model: &mut ProverModel) {
        let mut stack: Vec<Box<dyn Automator>> = vec![Box::new(automator)];
        while let Some(mut top) = stack.pop() {
            let mut control = Control::default();
            top.step(&mut control, model);
            let (pushed, finished, _) = control.into_parts();
            if !finished {
                stack.push(top);
            }
            stack.extend(pushed);
            if model.no_consequents() {
                break;
            }
        }
    }

    #[test]
    fn propagation_replaces_variables() {
        let f = Fixture::new();
        let sum = PExp::new("+", vec![f.int("a"), f.int("b")], f.g.z.clone());
        let mut m = f.model(
            vec![f.eq(f.int("x"), sum.clone()), f.eq(f.int("y"), f.int("x"))],
            vec![f.eq(f.int("y"), sum)],
        );
        run(VariablePropagator, &mut m);
        insta::assert_snapshot!(m.string_representation(), @r"
        x = (a + b) and
        y = (a + b)
          -->
        (a + b) = (a + b)
        ");
    }

    #[test]
    fn propagation_between_variables_terminates() {
        let f = Fixture::new();
        let mut m = f.model(
            vec![f.eq(f.int("x"), f.int("y")), f.eq(f.int("y"), f.int("x"))],
            vec![f.eq(f.int("y"), f.int("z"))],
        );
        run(VariablePropagator, &mut m);
        insta::assert_snapshot!(m.string_representation(), @r"
        x = y and
        x = x
          -->
        x = z
        ");
    }

    #[test]
    fn simplify_drops_established_goals() {
        let f = Fixture::new();
        let known = f.eq(f.int("a"), f.int("b"));
        let mut m = f.model(
            vec![known.clone()],
            vec![f.eq(f.int("c"), f.int("c")), known, f.eq(f.int("c"), f.int("d"))],
        );
        run(Simplify, &mut m);
        assert_eq!(m.consequents(), &[f.eq(f.int("c"), f.int("d"))]);
        assert_eq!(m.proof_len(), 1);
    }

    #[test]
    fn minimizer_removes_redundant_antecedents() {
        let f = Fixture::new();
        let fact = f.eq(f.int("a"), f.int("b"));
        let mut m = f.model(
            vec![fact.clone(), PExp::true_exp(&f.g), fact.clone()],
            vec![f.eq(f.int("c"), f.int("d"))],
        );
        run(AntecedentMinimizer::new(Vec::new().into(), 3), &mut m);
        assert_eq!(m.antecedents().cloned().collect::<Vec<_>>(), vec![fact]);
    }

    #[test]
    fn labels_record_productive_nothing() {
        let f = Fixture::new();
        let mut m = f.model(vec![], vec![f.int("goal")]);
        run(
            PushSequence::new(vec![
                Box::new(NoOpLabel::once("--- first ---")),
                Box::new(NoOpLabel::once("--- second ---")),
            ]),
            &mut m,
        );
        assert_eq!(m.proof_len(), 2);
        assert!(m.productive_proof_steps().is_empty());
        insta::assert_snapshot!(m.proof_steps()[1], @"--- second ---");
    }

    #[test]
    fn main_proof_level_finds_a_rewrite_chain() {
        let f = Fixture::new();
        let i = PExp::variable("i", f.g.z.clone(), Quantification::Universal);
        let plus_zero = PExp::new("+", vec![i.clone(), f.int("0")], f.g.z.clone());
        let theorem = Theorem::new(f.eq(plus_zero.clone(), i.clone()), Justification::Library);
        let transformations: Arc<[Arc<dyn Transformation>]> =
            vec![Arc::new(SubstituteInPlaceInConsequent::new(theorem, plus_zero, i)) as Arc<dyn Transformation>].into();
        let x_plus_zero = PExp::new("+", vec![f.int("x"), f.int("0")], f.g.z.clone());
        let nested = PExp::new("+", vec![x_plus_zero, f.int("0")], f.g.z.clone());
        let mut m = f.model(vec![], vec![f.eq(nested, f.int("x"))]);
        run(MainProofLevel::new(3, transformations), &mut m);
        assert!(m.no_consequents());
        assert_eq!(m.productive_proof_steps().len(), 3);
    }

    #[test]
    fn exhausted_search_restores_the_model() {
        let f = Fixture::new();
        let goal = f.eq(f.int("x"), f.int("y"));
        let mut m = f.model(vec![], vec![goal.clone()]);
        run(MainProofLevel::new(3, Vec::new().into()), &mut m);
        assert_eq!(m.consequents(), &[goal]);
        assert_eq!(m.proof_len(), 0);
    }
}
