//! The mutable proof state of one verification condition.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use thiserror::Error;

use crate::graph::TypeGraph;
use crate::mtype::IndexOutOfBounds;
use crate::pexp::PExp;
use crate::theorem::{ConjunctsExt, LocalTheorem, Theorem, Vc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeEventMode {
    #[default]
    Always,
    /// Only every n-th change is reported.
    Intermittent,
}

/// Where change notifications go while a prover owns the model.
pub(crate) trait ChangeSink: Send + Sync {
    fn is_running(&self) -> bool;
    fn request_ui_update(&self);
}

pub type ChangeListener = Box<dyn FnMut(&ProverModel) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conjunct {
    Antecedent(usize),
    Consequent(usize),
    Library(usize),
}

/// A sub-expression of a conjunct, addressed by its argument path.
#[derive(Debug, Clone)]
pub struct Site {
    pub conjunct: Conjunct,
    pub path: Vec<usize>,
    pub exp: PExp,
}

impl Site {
    fn same_place(&self, other: &Site) -> bool {
        self.conjunct == other.conjunct && self.path == other.path
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteSource {
    TopLevelAntecedents,
    TopLevelConsequents,
    InductiveAntecedents,
    InductiveConsequents,
    TopLevelAntecedentsAndLibrary,
}

#[derive(Debug, Clone)]
pub struct Binder {
    pub pattern: PExp,
    pub source: SiteSource,
}

impl Binder {
    pub fn new(pattern: PExp, source: SiteSource) -> Binder {
        Binder { pattern, source }
    }
}

/// One way of matching every binder: the site chosen for each binder, in
/// binder order, and the resulting variable assignment.
#[derive(Debug, Clone)]
pub struct Binding {
    pub sites: Vec<Site>,
    pub bindings: HashMap<PExp, PExp>,
}

#[derive(Debug, Clone)]
pub enum Edit {
    AddAntecedent(LocalTheorem),
    RemoveAntecedent(usize),
    AlterSite { conjunct: Conjunct, path: Vec<usize>, value: PExp },
    InsertConsequent { index: usize, value: PExp },
    RemoveConsequent(usize),
}

/// A concrete change to the model, recorded as one proof step.
#[derive(Debug, Clone)]
pub struct Application {
    pub description: String,
    pub edits: Vec<Edit>,
    /// Marks a phase boundary rather than a change.
    pub label: bool,
}

impl Application {
    pub fn new(description: impl Into<String>, edits: Vec<Edit>) -> Application {
        Application {
            description: description.into(),
            edits,
            label: false,
        }
    }

    pub fn label(description: impl Into<String>) -> Application {
        Application {
            description: description.into(),
            edits: vec![],
            label: true,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error(transparent)]
    Index(#[from] IndexOutOfBounds),
    #[error("library theorems cannot be edited")]
    ReadOnly,
}

#[derive(Debug, Clone)]
enum Undo {
    RemoveLocalTheorem(usize),
    InsertLocalTheorem(usize, LocalTheorem),
    SetLocalTheorem(usize, PExp),
    RemoveConsequent(usize),
    InsertConsequent(usize, PExp),
    SetConsequent(usize, PExp),
}

#[derive(Debug, Clone)]
pub struct ProofStep {
    pub description: String,
    pub label: bool,
    antecedents: Vec<PExp>,
    consequents: Vec<PExp>,
    undo: Vec<Undo>,
}

impl ProofStep {
    /// The model as it stood right after this step.
    pub fn snapshot(&self) -> String {
        render(&self.antecedents, &self.consequents)
    }
}

fn render(antecedents: &[PExp], consequents: &[PExp]) -> String {
    format!("{}\n  -->\n{}", antecedents.joined(" and\n"), consequents.joined(" and\n"))
}

impl Display for ProofStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description)
    }
}

pub struct ProverModel {
    name: String,
    graph: Arc<TypeGraph>,
    library: Arc<[Theorem]>,
    local_theorems: Vec<LocalTheorem>,
    // Multiset view of `local_theorems`.
    antecedent_counts: HashMap<PExp, usize>,
    consequents: Vec<PExp>,
    proof: Vec<ProofStep>,
    local_hash: u64,
    consequent_hash: u64,
    listeners: Vec<ChangeListener>,
    change_event_mode: ChangeEventMode,
    intermittent_period: usize,
    change_count: usize,
    sink: Option<Arc<dyn ChangeSink>>,
}

impl ProverModel {
    pub fn new(
        name: impl Into<String>,
        antecedents: Vec<PExp>,
        consequents: Vec<PExp>,
        library: Arc<[Theorem]>,
        graph: Arc<TypeGraph>,
    ) -> ProverModel {
        let mut model = ProverModel {
            name: name.into(),
            graph,
            library,
            local_theorems: vec![],
            antecedent_counts: HashMap::new(),
            consequents: vec![],
            proof: vec![],
            local_hash: 0,
            consequent_hash: 0,
            listeners: vec![],
            change_event_mode: ChangeEventMode::Always,
            intermittent_period: 300,
            change_count: 0,
            sink: None,
        };
        for assertion in antecedents {
            let index = model.local_theorems.len();
            model.insert_local_theorem(index, LocalTheorem::given(assertion));
        }
        for consequent in consequents {
            let index = model.consequents.len();
            model.insert_consequent(index, consequent);
        }
        model
    }

    pub fn from_vc(vc: &Vc, library: Arc<[Theorem]>, graph: Arc<TypeGraph>) -> ProverModel {
        ProverModel::new(
            vc.name.clone(),
            vc.antecedent.clone(),
            vc.consequent.clone(),
            library,
            graph,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &Arc<TypeGraph> {
        &self.graph
    }

    pub fn library(&self) -> &[Theorem] {
        &self.library
    }

    pub fn local_theorems(&self) -> &[LocalTheorem] {
        &self.local_theorems
    }

    pub fn antecedents(&self) -> impl Iterator<Item = &PExp> {
        self.local_theorems.iter().map(|t| &t.assertion)
    }

    pub fn consequents(&self) -> &[PExp] {
        &self.consequents
    }

    pub fn no_consequents(&self) -> bool {
        self.consequents.is_empty()
    }

    pub fn contains_local_theorem(&self, assertion: &PExp) -> bool {
        self.antecedent_counts.contains_key(assertion)
    }

    pub fn proof_steps(&self) -> &[ProofStep] {
        &self.proof
    }

    pub fn proof_len(&self) -> usize {
        self.proof.len()
    }

    pub fn productive_proof_steps(&self) -> Vec<&ProofStep> {
        self.proof.iter().filter(|s| !s.label).collect()
    }

    pub fn add_local_theorem(&mut self, theorem: LocalTheorem) {
        let index = self.local_theorems.len();
        self.insert_local_theorem(index, theorem);
        self.changed();
    }

    pub fn add_consequent(&mut self, consequent: PExp) {
        let index = self.consequents.len();
        self.insert_consequent(index, consequent);
        self.changed();
    }

    pub fn string_representation(&self) -> String {
        let antecedents: Vec<PExp> = self.antecedents().cloned().collect();
        render(&antecedents, &self.consequents)
    }

    /// Identifies the implication currently being proved, independent of
    /// conjunct order.
    pub fn implication_hash(&self) -> u64 {
        self.local_hash.wrapping_add(self.consequent_hash.wrapping_mul(51))
    }

    pub fn set_change_event_mode(&mut self, mode: ChangeEventMode, period: usize) {
        self.change_event_mode = mode;
        self.intermittent_period = period.max(1);
    }

    pub fn add_change_listener(&mut self, listener: impl FnMut(&ProverModel) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub(crate) fn attach(&mut self, sink: Arc<dyn ChangeSink>) {
        self.sink = Some(sink);
    }

    pub(crate) fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    pub(crate) fn notify_listeners(&mut self) {
        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in &mut listeners {
            listener(self);
        }
        self.listeners = listeners;
    }

    fn changed(&mut self) {
        self.change_count += 1;
        let report = match self.change_event_mode {
            ChangeEventMode::Always => true,
            ChangeEventMode::Intermittent => self.change_count % self.intermittent_period == 0,
        };
        if !report || self.listeners.is_empty() {
            return;
        }
        match &self.sink {
            Some(sink) if sink.is_running() => sink.request_ui_update(),
            _ => self.notify_listeners(),
        }
    }

    pub fn sites(&self, source: SiteSource) -> Vec<Site> {
        let top = |conjunct, exp: &PExp| Site {
            conjunct,
            path: vec![],
            exp: exp.clone(),
        };
        let inductive = |conjunct, exp: &PExp| {
            exp.sub_expressions()
                .into_iter()
                .map(move |(path, exp)| Site { conjunct, path, exp })
                .collect::<Vec<_>>()
        };
        let antecedents = self.antecedents().enumerate();
        let consequents = self.consequents.iter().enumerate();
        match source {
            SiteSource::TopLevelAntecedents => antecedents.map(|(i, e)| top(Conjunct::Antecedent(i), e)).collect(),
            SiteSource::TopLevelConsequents => consequents.map(|(i, e)| top(Conjunct::Consequent(i), e)).collect(),
            SiteSource::InductiveAntecedents => antecedents
                .flat_map(|(i, e)| inductive(Conjunct::Antecedent(i), e))
                .collect(),
            SiteSource::InductiveConsequents => consequents
                .flat_map(|(i, e)| inductive(Conjunct::Consequent(i), e))
                .collect(),
            SiteSource::TopLevelAntecedentsAndLibrary => antecedents
                .map(|(i, e)| top(Conjunct::Antecedent(i), e))
                .chain(
                    self.library
                        .iter()
                        .enumerate()
                        .map(|(i, t)| top(Conjunct::Library(i), &t.assertion)),
                )
                .collect(),
        }
    }

    /// Every consistent way of matching all `binders` against distinct
    /// sites. Each binder's pattern sees the variables bound by the binders
    /// before it.
    pub fn bind(&self, binders: &[Binder]) -> Vec<Binding> {
        let mut results = vec![];
        self.bind_from(binders, &HashMap::new(), &mut vec![], &mut results);
        results
    }

    fn bind_from(
        &self,
        binders: &[Binder],
        assumed: &HashMap<PExp, PExp>,
        chosen: &mut Vec<Site>,
        results: &mut Vec<Binding>,
    ) {
        let Some((first, rest)) = binders.split_first() else {
            results.push(Binding {
                sites: chosen.clone(),
                bindings: assumed.clone(),
            });
            return;
        };
        let pattern = first.pattern.substitute(assumed);
        for site in self.sites(first.source) {
            if chosen.iter().any(|c| c.same_place(&site)) {
                continue;
            }
            if matches!(site.conjunct, Conjunct::Library(_)) && !site.exp.quantified_variables().is_empty() {
                continue;
            }
            if !pattern.is_quantified() && pattern.name() != site.exp.name() {
                continue;
            }
            let mut acc = assumed.clone();
            if pattern.bind_to(&site.exp, &self.graph, &mut acc).is_err() {
                continue;
            }
            chosen.push(site);
            self.bind_from(rest, &acc, chosen, results);
            chosen.pop();
        }
    }

    /// Performs every edit of `application` and records it as a proof step.
    /// Nothing changes if any edit fails.
    pub fn apply(&mut self, application: &Application) -> Result<(), ModelError> {
        let mut undo = vec![];
        for edit in &application.edits {
            match self.perform(edit) {
                Ok(inverse) => undo.push(inverse),
                Err(err) => {
                    self.revert(undo);
                    return Err(err);
                }
            }
        }
        log::debug!("{}: {}", self.name, application.description);
        self.proof.push(ProofStep {
            description: application.description.clone(),
            label: application.label,
            antecedents: self.antecedents().cloned().collect(),
            consequents: self.consequents.clone(),
            undo,
        });
        self.changed();
        Ok(())
    }

    pub fn undo_last_proof_step(&mut self) -> Option<ProofStep> {
        let mut step = self.proof.pop()?;
        log::trace!("undoing {}", step.description);
        self.revert(std::mem::take(&mut step.undo));
        self.changed();
        Some(step)
    }

    /// Undoes proof steps until only `len` remain.
    pub fn undo_to(&mut self, len: usize) {
        while self.proof.len() > len {
            self.undo_last_proof_step();
        }
    }

    fn perform(&mut self, edit: &Edit) -> Result<Undo, ModelError> {
        match edit {
            Edit::AddAntecedent(theorem) => {
                let index = self.local_theorems.len();
                self.insert_local_theorem(index, theorem.clone());
                Ok(Undo::RemoveLocalTheorem(index))
            }
            Edit::RemoveAntecedent(index) => {
                let theorem = self.remove_local_theorem(*index)?;
                Ok(Undo::InsertLocalTheorem(*index, theorem))
            }
            Edit::AlterSite { conjunct, path, value } => match *conjunct {
                Conjunct::Antecedent(index) => {
                    let current = self.local_theorem(index)?.assertion.clone();
                    let altered = current.with_site_altered(path, value.clone())?;
                    let old = self.set_local_theorem(index, altered)?;
                    Ok(Undo::SetLocalTheorem(index, old))
                }
                Conjunct::Consequent(index) => {
                    let current = self.consequent(index)?.clone();
                    let altered = current.with_site_altered(path, value.clone())?;
                    let old = self.set_consequent(index, altered)?;
                    Ok(Undo::SetConsequent(index, old))
                }
                Conjunct::Library(_) => Err(ModelError::ReadOnly),
            },
            Edit::InsertConsequent { index, value } => {
                if *index > self.consequents.len() {
                    return Err(IndexOutOfBounds {
                        index: *index,
                        arity: self.consequents.len(),
                    }
                    .into());
                }
                self.insert_consequent(*index, value.clone());
                Ok(Undo::RemoveConsequent(*index))
            }
            Edit::RemoveConsequent(index) => {
                let old = self.remove_consequent(*index)?;
                Ok(Undo::InsertConsequent(*index, old))
            }
        }
    }

    fn revert(&mut self, undo: Vec<Undo>) {
        for u in undo.into_iter().rev() {
            let result = match u {
                Undo::RemoveLocalTheorem(index) => self.remove_local_theorem(index).map(drop),
                Undo::InsertLocalTheorem(index, theorem) => {
                    self.insert_local_theorem(index, theorem);
                    Ok(())
                }
                Undo::SetLocalTheorem(index, assertion) => self.set_local_theorem(index, assertion).map(drop),
                Undo::RemoveConsequent(index) => self.remove_consequent(index).map(drop),
                Undo::InsertConsequent(index, value) => {
                    self.insert_consequent(index, value);
                    Ok(())
                }
                Undo::SetConsequent(index, value) => self.set_consequent(index, value).map(drop),
            };
            if let Err(err) = result {
                log::warn!("{}: failed to undo an edit: {err}", self.name);
            }
        }
    }

    fn local_theorem(&self, index: usize) -> Result<&LocalTheorem, IndexOutOfBounds> {
        self.local_theorems.get(index).ok_or(IndexOutOfBounds {
            index,
            arity: self.local_theorems.len(),
        })
    }

    fn consequent(&self, index: usize) -> Result<&PExp, IndexOutOfBounds> {
        self.consequents.get(index).ok_or(IndexOutOfBounds {
            index,
            arity: self.consequents.len(),
        })
    }

    fn count(&mut self, assertion: &PExp) {
        *self.antecedent_counts.entry(assertion.clone()).or_default() += 1;
        self.local_hash = self.local_hash.wrapping_add(assertion.hash_value());
    }

    fn uncount(&mut self, assertion: &PExp) {
        if let Some(n) = self.antecedent_counts.get_mut(assertion) {
            *n -= 1;
            if *n == 0 {
                self.antecedent_counts.remove(assertion);
            }
        }
        self.local_hash = self.local_hash.wrapping_sub(assertion.hash_value());
    }

    fn insert_local_theorem(&mut self, index: usize, theorem: LocalTheorem) {
        self.count(&theorem.assertion);
        let index = index.min(self.local_theorems.len());
        self.local_theorems.insert(index, theorem);
    }

    fn remove_local_theorem(&mut self, index: usize) -> Result<LocalTheorem, IndexOutOfBounds> {
        self.local_theorem(index)?;
        let theorem = self.local_theorems.remove(index);
        self.uncount(&theorem.assertion);
        Ok(theorem)
    }

    fn set_local_theorem(&mut self, index: usize, assertion: PExp) -> Result<PExp, IndexOutOfBounds> {
        self.local_theorem(index)?;
        self.count(&assertion);
        let old = std::mem::replace(&mut self.local_theorems[index].assertion, assertion);
        self.uncount(&old);
        Ok(old)
    }

    fn insert_consequent(&mut self, index: usize, value: PExp) {
        self.consequent_hash = self.consequent_hash.wrapping_add(value.hash_value());
        let index = index.min(self.consequents.len());
        self.consequents.insert(index, value);
    }

    fn remove_consequent(&mut self, index: usize) -> Result<PExp, IndexOutOfBounds> {
        self.consequent(index)?;
        let old = self.consequents.remove(index);
        self.consequent_hash = self.consequent_hash.wrapping_sub(old.hash_value());
        Ok(old)
    }

    fn set_consequent(&mut self, index: usize, value: PExp) -> Result<PExp, IndexOutOfBounds> {
        self.consequent(index)?;
        self.consequent_hash = self.consequent_hash.wrapping_add(value.hash_value());
        let old = std::mem::replace(&mut self.consequents[index], value);
        self.consequent_hash = self.consequent_hash.wrapping_sub(old.hash_value());
        Ok(old)
    }
}

impl Display for ProverModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.string_representation())
    }
}
