use std::fmt::Display;
use std::sync::Arc;

use anyhow::ensure;

mod alpha;
pub mod automator;
pub mod bind;
pub mod canonical;
pub mod config;
pub mod env;
pub mod fitness;
pub mod graph;
pub mod model;
pub mod mtype;
pub mod pexp;
pub mod prover;
pub mod subtype;
pub mod theorem;
pub mod transform;
pub mod visit;

pub use bind::BindingError;
pub use canonical::{Canonical, Canonicalizer, TypeRelationship};
pub use config::ProverConfig;
pub use env::{MapEnvironment, Quantification, SymbolEnvironment};
pub use graph::TypeGraph;
pub use model::{ChangeEventMode, ProofStep, ProverModel};
pub use mtype::{IndexOutOfBounds, MathType, Name};
pub use pexp::PExp;
pub use prover::{AutomatedProver, ProverHandle, ProverStatus};
pub use subtype::{NoSolution, SubtypeError};
pub use theorem::{Justification, LocalTheorem, Theorem, Vc};

/// The outcome of proving one verification condition.
#[derive(Debug, Clone)]
pub struct ProofReport {
    pub name: String,
    pub status: ProverStatus,
    pub steps: Vec<ProofStep>,
}

impl ProofReport {
    pub fn proved(&self) -> bool {
        self.status == ProverStatus::Proved
    }
}

impl Display for ProofReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}: {}", self.name, self.status)?;
        let mut n = 0;
        for step in &self.steps {
            if step.label {
                writeln!(f, "{step}")?;
            } else {
                n += 1;
                writeln!(f, "{n}. {step}")?;
            }
        }
        Ok(())
    }
}

pub fn prove(vc: &Vc, library: Arc<[Theorem]>, graph: Arc<TypeGraph>, config: ProverConfig) -> anyhow::Result<ProofReport> {
    for conjunct in vc.antecedent.iter().chain(&vc.consequent) {
        ensure!(
            graph.is_subtype(conjunct.math_type(), &graph.boolean),
            "{conjunct} is not a proposition"
        );
    }
    log::debug!("proving {}", vc.name);
    let model = ProverModel::from_vc(vc, library, graph);
    let mut prover = AutomatedProver::new(model, config);
    let status = prover.start();
    let model = prover.into_model();
    if log::log_enabled!(log::Level::Debug) {
        log::debug!("{} ended {status}:\n{}", vc.name, model.string_representation());
    }
    Ok(ProofReport {
        name: vc.name.clone(),
        status,
        steps: model.proof_steps().to_vec(),
    })
}
