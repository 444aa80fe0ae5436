use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use mtreason::automator::{Automator, Control};
use mtreason::model::Application;
use mtreason::{
    prove, AutomatedProver, Justification, PExp, ProverConfig, ProverModel, ProverStatus, Quantification,
    Theorem, TypeGraph, Vc,
};

#[ctor::ctor]
fn init() {
    let _ = pretty_env_logger::try_init();
}

fn format_error(err: &anyhow::Error) -> String {
    let mut lines = vec!["error chain:".to_string()];
    for cause in err.chain() {
        lines.push(format!("  - {cause}"));
    }
    lines.join("\n")
}

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

    fn implies(&self, a: PExp, b: PExp) -> PExp {
        PExp::implies(&self.g, a, b)
    }

    fn prove(&self, vc: &Vc, library: Vec<Theorem>, config: ProverConfig) -> mtreason::ProofReport {
        match prove(vc, library.into(), self.g.clone(), config) {
            Ok(report) => report,
            Err(err) => panic!("{}", format_error(&err)),
        }
    }
}

struct Forever;

impl Automator for Forever {
    fn step(&mut self, _control: &mut Control, model: &mut ProverModel) {
        let _ = model.apply(&Application::label("tick"));
    }
}

/// Publishes the proof length after every step it takes.
struct Ticking(Arc<AtomicUsize>);

impl Automator for Ticking {
    fn step(&mut self, _control: &mut Control, model: &mut ProverModel) {
        let _ = model.apply(&Application::label("tick"));
        self.0.store(model.proof_len(), Ordering::SeqCst);
    }
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "gave up waiting until {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn reflexive_goal_is_proved() {
    let f = Fixture::new();
    let vc = Vc::new("vc_0", &[], &[f.eq(f.int("x"), f.int("x"))]);
    let report = f.prove(&vc, vec![], ProverConfig::default());
    insta::assert_snapshot!(report, @r"
    vc_0: proved
    --- Done Developing Antecedent ---
    --- Done Minimizing Consequent ---
    1. Simplify
    ");
}

#[test]
fn given_goal_is_proved() {
    let f = Fixture::new();
    let fact = f.pred("P", f.int("k"));
    let vc = Vc::new("vc_1", &[fact.clone()], &[fact]);
    let report = f.prove(&vc, vec![], ProverConfig::default());
    assert!(report.proved());
    assert_eq!(report.steps.iter().filter(|s| !s.label).count(), 1);
}

#[test]
fn additive_identity_minimizes_the_goal() {
    let f = Fixture::new();
    let i = f.var("i");
    let identity = Theorem::new(f.eq(f.plus(i.clone(), f.int("0")), i), Justification::Library);
    let vc = Vc::new("vc_2", &[], &[f.eq(f.plus(f.int("x"), f.int("0")), f.int("x"))]);
    let report = f.prove(&vc, vec![identity], ProverConfig::default());
    insta::assert_snapshot!(report, @r"
    vc_2: proved
    --- Done Developing Antecedent ---
    1. Substitute in consequent i + 0 → i (by (i + 0) = i): x + 0 becomes x
    --- Done Minimizing Consequent ---
    2. Simplify
    ");
}

#[test]
fn implication_develops_the_antecedent() {
    let f = Fixture::new();
    let n = f.var("n");
    let rule = Theorem::new(
        f.implies(f.pred("P", n.clone()), f.pred("Q", n)),
        Justification::Axiom,
    );
    let vc = Vc::new("vc_3", &[f.pred("P", f.int("k"))], &[f.pred("Q", f.int("k"))]);
    let report = f.prove(&vc, vec![rule], ProverConfig::default());
    insta::assert_snapshot!(report, @r"
    vc_3: proved
    1. Develop antecedent by P(n) implies Q(n): Q(k)
    --- Done Developing Antecedent ---
    --- Done Minimizing Consequent ---
    2. Simplify
    ");
}

#[test]
fn main_search_strengthens_the_goal() {
    let f = Fixture::new();
    let n = f.var("n");
    let rule = Theorem::new(
        f.implies(f.pred("Q", n.clone()), f.pred("P", n)),
        Justification::Axiom,
    );
    let vc = Vc::new("vc_4", &[f.pred("Q", f.int("k"))], &[f.pred("P", f.int("k"))]);
    let config = ProverConfig::default().with_development_rounds(0);
    let report = f.prove(&vc, vec![rule], config);
    insta::assert_snapshot!(report, @r"
    vc_4: proved
    --- Done Developing Antecedent ---
    --- Done Minimizing Consequent ---
    1. Strengthen by Q(n) implies P(n): P(k)
    2. Simplify
    ");
}

#[test]
fn unprovable_goal_exhausts_the_search() {
    let f = Fixture::new();
    let vc = Vc::new("vc_5", &[], &[f.eq(f.int("x"), f.int("y"))]);
    let report = f.prove(&vc, vec![], ProverConfig::default());
    assert_eq!(report.status, ProverStatus::Exhausted);
    assert!(!report.proved());
}

#[test]
fn non_propositions_are_rejected() {
    let f = Fixture::new();
    let vc = Vc::new("vc_6", &[], &[f.int("x")]);
    let err = prove(&vc, Vec::new().into(), f.g.clone(), ProverConfig::default()).unwrap_err();
    insta::assert_snapshot!(format_error(&err), @r"
    error chain:
      - x is not a proposition
    ");
}

#[test]
fn timeout_abandons_the_search() {
    let f = Fixture::new();
    let model = ProverModel::new("vc_7", vec![], vec![f.pred("P", f.int("k"))], Vec::new().into(), f.g.clone());
    let config = ProverConfig::default().with_timeout(Some(Duration::from_millis(50)));
    let mut prover = AutomatedProver::with_automators(model, config, vec![Box::new(Forever)]);
    assert_eq!(prover.start(), ProverStatus::TimedOut);
    assert_eq!(prover.automator_stack_len(), 0);
    assert!(!prover.is_running());
    assert!(prover.done_searching());
}

#[test]
fn pause_from_another_thread_waits_for_the_worker() {
    let f = Fixture::new();
    let model = ProverModel::new("vc_8", vec![], vec![f.pred("P", f.int("k"))], Vec::new().into(), f.g.clone());
    let config = ProverConfig::default().with_timeout(None);
    let mut prover = AutomatedProver::with_automators(model, config, vec![Box::new(Forever)]);
    let handle = prover.handle();
    let worker = thread::spawn(move || {
        let status = prover.start();
        (status, prover)
    });
    while !handle.is_running() {
        thread::sleep(Duration::from_millis(1));
    }
    handle.pause();
    assert!(!handle.is_running());
    let (status, prover) = worker.join().unwrap();
    assert_eq!(status, ProverStatus::Paused);
    assert_eq!(prover.automator_stack_len(), 1);
    assert!(!prover.done_searching());
}

#[test]
fn pause_before_start_is_honoured() {
    let f = Fixture::new();
    let model = ProverModel::new("vc_9", vec![], vec![f.pred("P", f.int("k"))], Vec::new().into(), f.g.clone());
    let config = ProverConfig::default().with_timeout(None);
    let mut prover = AutomatedProver::with_automators(model, config, vec![Box::new(Forever)]);
    prover.handle().pause();
    assert_eq!(prover.start(), ProverStatus::Paused);
    assert_eq!(prover.model().proof_len(), 0);

    let handle = prover.handle();
    handle.mark_to_pause();
    assert_eq!(prover.start(), ProverStatus::Paused);
    assert_eq!(prover.model().proof_len(), 0);
}

#[test]
fn ui_update_holds_the_worker_until_finished() {
    let f = Fixture::new();
    let mut model = ProverModel::new("vc_10", vec![], vec![f.pred("P", f.int("k"))], Vec::new().into(), f.g.clone());
    let heard = Arc::new(AtomicUsize::new(usize::MAX));
    let listener = heard.clone();
    model.add_change_listener(move |m| listener.store(m.proof_len(), Ordering::SeqCst));
    let progress = Arc::new(AtomicUsize::new(0));
    let config = ProverConfig::default().with_timeout(None);
    let mut prover = AutomatedProver::with_automators(model, config, vec![Box::new(Ticking(progress.clone()))]);
    let handle = prover.handle();
    let worker = thread::spawn(move || {
        let status = prover.start();
        (status, prover)
    });
    wait_until("the worker has stepped", || progress.load(Ordering::SeqCst) >= 3);

    handle.request_ui_update();
    thread::sleep(Duration::from_millis(50));
    let held = progress.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(progress.load(Ordering::SeqCst), held);
    assert_eq!(heard.load(Ordering::SeqCst), held);
    assert!(handle.is_running());

    handle.ui_update_finished();
    wait_until("stepping resumes", || progress.load(Ordering::SeqCst) > held);

    handle.pause();
    let (status, prover) = worker.join().unwrap();
    assert_eq!(status, ProverStatus::Paused);
    assert!(prover.model().proof_len() > held);
}
