//! The automated prover: runs a stack of automators against one model.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::automator::{
    AntecedentDeveloper, AntecedentMinimizer, Automator, Control, MainProofLevel, Minimizer, NoOpLabel,
    PushSequence, Simplify, VariablePropagator,
};
use crate::config::ProverConfig;
use crate::fitness::{rank, DevelopmentFitness, MainProofFitness};
use crate::model::{ChangeSink, ProverModel};
use crate::theorem::Theorem;
use crate::transform::{ExistentialInstantiation, Transformation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProverStatus {
    Proved,
    /// Every automator finished with goals remaining.
    Exhausted,
    TimedOut,
    Paused,
}

impl Display for ProverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProverStatus::Proved => write!(f, "proved"),
            ProverStatus::Exhausted => write!(f, "proof space exhausted"),
            ProverStatus::TimedOut => write!(f, "timed out"),
            ProverStatus::Paused => write!(f, "paused"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum UiUpdate {
    #[default]
    Idle,
    /// Listeners are notified at the next safe point. With `hold` the worker
    /// then waits for `ui_update_finished`.
    Requested { hold: bool },
    Holding,
}

#[derive(Debug, Default)]
struct Handshake {
    worker_active: bool,
    /// A pause that arrived while no worker loop was running.
    pause_pending: bool,
    ui_update: UiUpdate,
}

#[derive(Debug, Default)]
struct Shared {
    running: AtomicBool,
    state: Mutex<Handshake>,
    signal: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Handshake> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.signal.notify_all();
    }

    fn stop_from_outside(&self) -> MutexGuard<'_, Handshake> {
        let mut state = self.lock();
        if !state.worker_active {
            state.pause_pending = true;
        }
        self.stop();
        state
    }
}

impl ChangeSink for Shared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn request_ui_update(&self) {
        let mut state = self.lock();
        if state.ui_update == UiUpdate::Idle {
            state.ui_update = UiUpdate::Requested { hold: false };
        }
    }
}

/// Controls a prover running on another thread.
#[derive(Debug, Clone)]
pub struct ProverHandle(Arc<Shared>);

impl ProverHandle {
    /// Stops the prover and blocks until its worker loop has exited.
    pub fn pause(&self) {
        let mut state = self.0.stop_from_outside();
        while state.worker_active {
            state = self.0.signal.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stops the prover at its next safe point without waiting.
    pub fn mark_to_pause(&self) {
        drop(self.0.stop_from_outside());
    }

    pub fn is_running(&self) -> bool {
        self.0.is_running()
    }

    /// Asks the worker to notify the model's listeners at its next safe point
    /// and then wait for [`ui_update_finished`](ProverHandle::ui_update_finished).
    pub fn request_ui_update(&self) {
        self.0.lock().ui_update = UiUpdate::Requested { hold: true };
    }

    pub fn ui_update_finished(&self) {
        self.0.lock().ui_update = UiUpdate::Idle;
        self.0.signal.notify_all();
    }
}

pub struct AutomatedProver {
    model: ProverModel,
    automators: Vec<Box<dyn Automator>>,
    config: ProverConfig,
    shared: Arc<Shared>,
}

/// Every transformation the library licenses, plus existential
/// instantiation.
pub fn library_transformations(library: &[Theorem]) -> Vec<Arc<dyn Transformation>> {
    let mut transformations: Vec<Arc<dyn Transformation>> =
        library.iter().flat_map(Theorem::transformations).collect();
    transformations.push(Arc::new(ExistentialInstantiation));
    transformations
}

fn default_pipeline(model: &ProverModel, config: &ProverConfig) -> Box<dyn Automator> {
    let all = library_transformations(model.library());

    log::debug!("ranking antecedent developments");
    let development: Arc<[Arc<dyn Transformation>]> =
        rank(&all, &DevelopmentFitness::for_model(model, config.reject_identity_expansion))
            .into_iter()
            .map(|r| r.transformation)
            .collect();
    log::debug!("ranking consequent transformations");
    let main: Arc<[Arc<dyn Transformation>]> =
        rank(&all, &MainProofFitness::for_model(model, config.reject_identity_expansion))
            .into_iter()
            .map(|r| r.transformation)
            .collect();
    let shrinking = |side: fn(&dyn Transformation) -> bool| -> Arc<[Arc<dyn Transformation>]> {
        all.iter()
            .filter(|t| side(t.as_ref()) && t.function_application_count_delta() < 0 && !t.introduces_quantified_variables())
            .cloned()
            .collect()
    };
    let antecedent_rewrites = shrinking(|t| t.could_affect_antecedent());
    let consequent_rewrites = shrinking(|t| t.could_affect_consequent());

    let mut steps: Vec<Box<dyn Automator>> = vec![];
    for _ in 0..config.development_rounds {
        steps.push(Box::new(VariablePropagator));
        steps.push(Box::new(AntecedentDeveloper::new(
            development.clone(),
            config.development_depth,
        )));
    }
    steps.push(Box::new(VariablePropagator));
    steps.push(Box::new(NoOpLabel::once("--- Done Developing Antecedent ---")));
    steps.push(Box::new(AntecedentMinimizer::new(antecedent_rewrites, config.simplify_rounds)));
    steps.push(Box::new(Minimizer::new(consequent_rewrites)));
    steps.push(Box::new(NoOpLabel::once("--- Done Minimizing Consequent ---")));
    steps.push(Box::new(Simplify));
    steps.push(Box::new(MainProofLevel::new(config.main_proof_depth, main)));
    Box::new(PushSequence::new(steps))
}

impl AutomatedProver {
    /// A prover running the default strategy against `model`.
    pub fn new(model: ProverModel, config: ProverConfig) -> AutomatedProver {
        let pipeline = default_pipeline(&model, &config);
        AutomatedProver::with_automators(model, config, vec![pipeline])
    }

    /// A prover with a custom automator stack; the last automator runs first.
    pub fn with_automators(
        mut model: ProverModel,
        config: ProverConfig,
        automators: Vec<Box<dyn Automator>>,
    ) -> AutomatedProver {
        let shared = Arc::new(Shared::default());
        model.set_change_event_mode(config.change_event_mode, config.intermittent_period);
        model.attach(shared.clone());
        AutomatedProver {
            model,
            automators,
            config,
            shared,
        }
    }

    pub fn handle(&self) -> ProverHandle {
        ProverHandle(self.shared.clone())
    }

    pub fn model(&self) -> &ProverModel {
        &self.model
    }

    pub fn into_model(self) -> ProverModel {
        self.model
    }

    pub fn is_proved(&self) -> bool {
        self.model.no_consequents()
    }

    pub fn done_searching(&self) -> bool {
        self.is_proved() || self.automators.is_empty()
    }

    pub fn automator_stack_len(&self) -> usize {
        self.automators.len()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Steps until the proof is done, the search is exhausted, the timeout
    /// elapses or someone pauses the prover. A timeout abandons the search.
    /// A pause requested before the call makes it return at once.
    pub fn start(&mut self) -> ProverStatus {
        {
            let mut state = self.shared.lock();
            if std::mem::take(&mut state.pause_pending) {
                log::debug!("pause requested before start");
                return self.status(false);
            }
            state.worker_active = true;
            self.shared.running.store(true, Ordering::SeqCst);
        }
        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        let mut timed_out = false;
        while self.shared.is_running() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                log::info!("Timed out.");
                self.automators.clear();
                self.shared.stop();
                timed_out = true;
                break;
            }
            self.step();
        }
        self.shared.lock().worker_active = false;
        self.shared.signal.notify_all();
        self.status(timed_out)
    }

    fn status(&self, timed_out: bool) -> ProverStatus {
        if self.is_proved() {
            ProverStatus::Proved
        } else if timed_out {
            ProverStatus::TimedOut
        } else if self.automators.is_empty() {
            ProverStatus::Exhausted
        } else {
            ProverStatus::Paused
        }
    }

    /// Runs automators from the top of the stack until one records a proof
    /// step, the goals are gone or the stack is empty.
    pub fn step(&mut self) {
        self.ui_safe_point();
        let original = self.model.proof_len();
        while self.model.proof_len() == original && !self.model.no_consequents() {
            let Some(mut automator) = self.automators.pop() else {
                break;
            };
            let mut control = Control::default();
            automator.step(&mut control, &mut self.model);
            let (pushed, finished, pause) = control.into_parts();
            if !finished {
                self.automators.push(automator);
            }
            self.automators.extend(pushed);
            if pause {
                self.shared.stop();
                break;
            }
        }
        if self.model.no_consequents() {
            log::info!("Proved.");
            self.shared.stop();
        } else if self.automators.is_empty() {
            log::info!("Proof space exhausted.");
            self.shared.stop();
        }
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("{}", self.model.string_representation());
        }
    }

    fn ui_safe_point(&mut self) {
        let requested = {
            let mut state = self.shared.lock();
            match state.ui_update {
                UiUpdate::Requested { hold } => {
                    state.ui_update = if hold { UiUpdate::Holding } else { UiUpdate::Idle };
                    true
                }
                _ => false,
            }
        };
        if requested && self.model.has_listeners() {
            self.model.notify_listeners();
        }
        let mut state = self.shared.lock();
        while state.ui_update == UiUpdate::Holding && self.shared.is_running() {
            state = self.shared.signal.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::graph::TypeGraph;
    use crate::pexp::PExp;

    fn model(consequents: Vec<PExp>) -> ProverModel {
        let g = Arc::new(TypeGraph::new());
        ProverModel::new("vc", vec![], consequents, Vec::new().into(), g)
    }

    fn goal() -> PExp {
        PExp::symbol("goal", TypeGraph::new().boolean.clone())
    }

    struct Forever;

    impl Automator for Forever {
        fn step(&mut self, _control: &mut Control, model: &mut ProverModel) {
            let _ = model.apply(&crate::model::Application::label("tick"));
        }
    }

    struct PauseAfter(usize);

    impl Automator for PauseAfter {
        fn step(&mut self, control: &mut Control, model: &mut ProverModel) {
            let _ = model.apply(&crate::model::Application::label("tick"));
            self.0 -= 1;
            if self.0 == 0 {
                control.mark_to_pause();
            }
        }
    }

    #[test]
    fn empty_goals_are_proved_without_steps() {
        let mut prover = AutomatedProver::with_automators(model(vec![]), ProverConfig::default(), vec![Box::new(Forever)]);
        assert_eq!(prover.start(), ProverStatus::Proved);
        assert_eq!(prover.model().proof_len(), 0);
        assert!(!prover.is_running());
    }

    #[test]
    fn empty_stack_exhausts() {
        let mut prover = AutomatedProver::with_automators(model(vec![goal()]), ProverConfig::default(), vec![]);
        assert_eq!(prover.start(), ProverStatus::Exhausted);
        assert!(prover.done_searching());
        assert!(!prover.is_running());
    }

    #[test]
    fn timeout_clears_the_stack() {
        let config = ProverConfig::default().with_timeout(Some(Duration::from_millis(20)));
        let mut prover = AutomatedProver::with_automators(model(vec![goal()]), config, vec![Box::new(Forever)]);
        assert_eq!(prover.start(), ProverStatus::TimedOut);
        assert_eq!(prover.automator_stack_len(), 0);
        assert!(!prover.is_running());
    }

    #[test]
    fn automators_can_pause_themselves() {
        let config = ProverConfig::default().with_timeout(None);
        let mut prover = AutomatedProver::with_automators(model(vec![goal()]), config, vec![Box::new(PauseAfter(3))]);
        assert_eq!(prover.start(), ProverStatus::Paused);
        assert_eq!(prover.model().proof_len(), 3);
        assert_eq!(prover.automator_stack_len(), 1);
    }

    #[test]
    fn changes_while_running_are_delivered_at_safe_points() {
        let config = ProverConfig::default().with_timeout(None);
        let mut m = model(vec![goal()]);
        let heard = Arc::new(AtomicUsize::new(0));
        let counter = heard.clone();
        m.add_change_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut prover = AutomatedProver::with_automators(m, config, vec![Box::new(PauseAfter(3))]);
        prover.start();
        // The third change lands after the last safe point.
        assert_eq!(heard.load(Ordering::SeqCst), 2);
    }
}
