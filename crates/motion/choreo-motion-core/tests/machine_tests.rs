use std::cell::{Cell, RefCell};
use std::rc::Rc;

use choreo_animation_core::{AnimationPlan, Step, Tween, Value, Wait};
use choreo_motion_core::{
    MachineError, MotionAnimation, MotionMachine, MotionPhase, MotionStateDef, StateAnimations,
    TransitionDef,
};
use choreo_signal_core::Signal;

type TraceLog = Rc<RefCell<Vec<(String, Option<String>)>>>;

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

/// A 100ms animation that records `label` and the machine's committed state
/// at the moment it finishes.
fn marker(log: &TraceLog, label: &str, current: &Signal<Option<String>>) -> MotionAnimation {
    let log = Rc::clone(log);
    let label = label.to_string();
    let current = current.clone();
    MotionAnimation::new(AnimationPlan::new(vec![
        Wait::new(100.0).into(),
        Step::new(move |_| log.borrow_mut().push((label.clone(), current.get()))).into(),
    ]))
}

fn state(
    id: &str,
    transitions: Vec<TransitionDef>,
    log: &TraceLog,
    current: &Signal<Option<String>>,
) -> MotionStateDef {
    MotionStateDef::new(id)
        .with_transitions(transitions)
        .with_animations(StateAnimations {
            enter: vec![marker(log, &format!("enter {id}"), current)],
            active: Vec::new(),
            exit: vec![marker(log, &format!("exit {id}"), current)],
        })
}

fn hierarchy_machine(log: &TraceLog) -> MotionMachine {
    let mut machine = MotionMachine::new();
    let current = machine.fsm().current();
    machine
        .add_state(state("a", vec![TransitionDef::new("show", "b.x")], log, &current))
        .unwrap();
    machine.add_state(state("b", Vec::new(), log, &current)).unwrap();
    machine.add_state(state("b.x", Vec::new(), log, &current)).unwrap();
    machine.add_state(state("b.y", Vec::new(), log, &current)).unwrap();
    machine
}

fn entries(log: &TraceLog) -> Vec<String> {
    log.borrow().iter().map(|(label, _)| label.clone()).collect()
}

/// it should exit the source, enter each level down to the goal in order,
/// and only commit the state at the goal hop
#[test]
fn full_hierarchy_transition_orders_exit_then_enters() {
    let log: TraceLog = Rc::new(RefCell::new(Vec::new()));
    let mut machine = hierarchy_machine(&log);

    // Settle the initial entering phase for "a".
    machine.update(1000.0).unwrap();
    assert_eq!(entries(&log), vec!["enter a"]);
    assert_eq!(machine.phase(), MotionPhase::Active);

    machine.set_state("b.x", None).unwrap();
    assert_eq!(machine.phase(), MotionPhase::Exiting);
    machine.update(1000.0).unwrap();

    assert_eq!(entries(&log), vec!["enter a", "exit a", "enter b", "enter b.x"]);
    // The committed state seen by each marker: still "a" through the exit and
    // the intermediate enter, flipped to "b.x" only during the goal hop.
    let seen: Vec<_> = log.borrow().iter().map(|(_, s)| s.clone()).collect();
    assert_eq!(
        seen,
        vec![
            Some("a".to_string()),
            Some("a".to_string()),
            Some("a".to_string()),
            Some("b.x".to_string()),
        ]
    );
    assert_eq!(machine.current_state().as_deref(), Some("b.x"));
    assert_eq!(machine.phase(), MotionPhase::Active);
}

/// it should not replay a shared ancestor's animations when only a
/// descendant changes
#[test]
fn sibling_transition_spares_shared_ancestor() {
    let log: TraceLog = Rc::new(RefCell::new(Vec::new()));
    let mut machine = hierarchy_machine(&log);
    machine.update(1000.0).unwrap();
    machine.set_state("b.x", None).unwrap();
    machine.update(1000.0).unwrap();
    log.borrow_mut().clear();

    machine.set_state("b.y", None).unwrap();
    machine.update(1000.0).unwrap();

    assert_eq!(entries(&log), vec!["exit b.x", "enter b.y"]);
    assert_eq!(machine.current_state().as_deref(), Some("b.y"));
}

/// it should defer a transition requested mid-flight and reach the first
/// goal before the second one applies
#[test]
fn deferred_transition_applies_after_the_first_resolves() {
    let log: TraceLog = Rc::new(RefCell::new(Vec::new()));
    let mut machine = hierarchy_machine(&log);
    machine.update(1000.0).unwrap();
    machine.set_state("b.x", None).unwrap();
    machine.update(1000.0).unwrap();
    log.borrow_mut().clear();

    machine.set_state("b.y", None).unwrap();
    // Mid-flight: the exit from b.x is still running.
    machine.update(50.0).unwrap();
    machine.set_state("a", None).unwrap();
    assert!(machine.is_transitioning());

    machine.update(10_000.0).unwrap();

    assert_eq!(
        entries(&log),
        vec!["exit b.x", "enter b.y", "exit b.y", "exit b", "enter a"]
    );
    // b.y was committed before a: the first transition fully resolved.
    let seen: Vec<_> = log.borrow().iter().map(|(_, s)| s.clone()).collect();
    assert_eq!(seen[1].as_deref(), Some("b.y"));
    assert_eq!(machine.current_state().as_deref(), Some("a"));
}

/// it should keep only the last of several transitions queued mid-flight
#[test]
fn queued_transitions_are_last_request_wins() {
    let log: TraceLog = Rc::new(RefCell::new(Vec::new()));
    let mut machine = hierarchy_machine(&log);
    machine.update(1000.0).unwrap();
    machine.set_state("b.x", None).unwrap();
    machine.update(50.0).unwrap();

    machine.set_state("b.y", None).unwrap();
    machine.set_state("a", None).unwrap();
    machine.update(10_000.0).unwrap();

    assert_eq!(machine.current_state().as_deref(), Some("a"));
    // b.y never became current.
    assert!(log.borrow().iter().all(|(_, s)| s.as_deref() != Some("b.y")));
}

/// it should resolve a transition to a strict ancestor with exits only,
/// without replaying the ancestor's enter set
#[test]
fn ancestor_goal_exits_without_reentering() {
    let log: TraceLog = Rc::new(RefCell::new(Vec::new()));
    let mut machine = hierarchy_machine(&log);
    machine.update(1000.0).unwrap();
    machine.set_state("b.x", None).unwrap();
    machine.update(1000.0).unwrap();
    log.borrow_mut().clear();

    machine.set_state("b", None).unwrap();
    machine.update(1000.0).unwrap();

    assert_eq!(entries(&log), vec!["exit b.x"]);
    assert_eq!(machine.current_state().as_deref(), Some("b"));
    assert_eq!(machine.phase(), MotionPhase::Active);
}

/// it should replay the enter set on a self-transition
#[test]
fn self_transition_replays_enter() {
    let log: TraceLog = Rc::new(RefCell::new(Vec::new()));
    let mut machine = hierarchy_machine(&log);
    machine.update(1000.0).unwrap();
    log.borrow_mut().clear();

    machine.set_state("a", None).unwrap();
    machine.update(1000.0).unwrap();

    assert_eq!(entries(&log), vec!["enter a"]);
    assert_eq!(machine.current_state().as_deref(), Some("a"));
}

/// it should restart a looped active animation each cycle and let a queued
/// transition break the loop at the cycle boundary
#[test]
fn looped_active_set_cycles_and_yields_to_queued_transition() {
    let count = Rc::new(Cell::new(0u32));
    let fired = Rc::clone(&count);
    let mut machine = MotionMachine::new();
    machine
        .add_state(
            MotionStateDef::new("pulse").with_animations(StateAnimations {
                enter: Vec::new(),
                active: vec![MotionAnimation::looped(AnimationPlan::new(vec![
                    Wait::new(100.0).into(),
                    Step::new(move |_| fired.set(fired.get() + 1)).into(),
                ]))],
                exit: Vec::new(),
            }),
        )
        .unwrap();
    machine.add_state(MotionStateDef::new("done")).unwrap();

    machine.update(350.0).unwrap();
    assert_eq!(count.get(), 3);
    assert_eq!(machine.current_state().as_deref(), Some("pulse"));

    // Mid-cycle request defers to the cycle boundary.
    machine.set_state("done", None).unwrap();
    assert_eq!(machine.current_state().as_deref(), Some("pulse"));
    machine.update(1000.0).unwrap();
    assert_eq!(count.get(), 4);
    assert_eq!(machine.current_state().as_deref(), Some("done"));
}

/// it should interrupt an infinite ambient animation immediately on a new
/// transition
#[test]
fn infinite_ambient_does_not_block_transitions() {
    let sig = Signal::new(Value::f(0.0));
    let mut machine = MotionMachine::new();
    machine
        .add_state(
            MotionStateDef::new("idle").with_animations(StateAnimations {
                enter: Vec::new(),
                active: vec![MotionAnimation::new(AnimationPlan::new(vec![
                    choreo_animation_core::Repeat::new(
                        choreo_animation_core::RepeatCount::Infinite,
                        vec![Tween::new(sig.clone(), 1.0, 500.0)
                            .with_from(Value::f(0.0))
                            .into()],
                    )
                    .unwrap()
                    .into(),
                ]))],
                exit: Vec::new(),
            }),
        )
        .unwrap();
    machine.add_state(MotionStateDef::new("gone")).unwrap();

    machine.update(1250.0).unwrap();
    machine.set_state("gone", None).unwrap();
    // Both hops have empty sets; a zero-budget tick walks straight through.
    machine.update(0.0).unwrap();
    assert_eq!(machine.current_state().as_deref(), Some("gone"));
}

/// it should apply a queued transition once the finite animations settle,
/// even while an infinite ambient keeps playing
#[test]
fn queued_transition_is_not_blocked_by_infinite_sibling() {
    let sig = Signal::new(Value::f(0.0));
    let mut machine = MotionMachine::new();
    machine
        .add_state(
            MotionStateDef::new("idle").with_animations(StateAnimations {
                enter: Vec::new(),
                active: vec![
                    MotionAnimation::new(AnimationPlan::new(vec![
                        choreo_animation_core::Repeat::new(
                            choreo_animation_core::RepeatCount::Infinite,
                            vec![Tween::new(sig.clone(), 1.0, 500.0)
                                .with_from(Value::f(0.0))
                                .into()],
                        )
                        .unwrap()
                        .into(),
                    ])),
                    MotionAnimation::new(AnimationPlan::new(vec![Wait::new(300.0).into()])),
                ],
                exit: Vec::new(),
            }),
        )
        .unwrap();
    machine.add_state(MotionStateDef::new("gone")).unwrap();

    machine.update(100.0).unwrap();
    machine.set_state("gone", None).unwrap();
    // Queued: the 300ms sibling is still mid-flight.
    assert_eq!(machine.current_state().as_deref(), Some("idle"));

    machine.update(500.0).unwrap();
    assert_eq!(machine.current_state().as_deref(), Some("gone"));
}

/// it should fail with the iteration cap when a looped zero-duration
/// animation never reports completion
#[test]
fn iteration_cap_is_fatal() {
    let mut machine = MotionMachine::new();
    machine
        .add_state(
            MotionStateDef::new("broken").with_animations(StateAnimations {
                enter: Vec::new(),
                active: vec![MotionAnimation::looped(AnimationPlan::new(Vec::new()))],
                exit: Vec::new(),
            }),
        )
        .unwrap();

    let err = machine.update(16.0).unwrap_err();
    assert_eq!(err, MachineError::IterationCapExceeded { cap: 1000 });
}

/// it should scrub the current set to an absolute progress and complete it
/// at progress 1
#[test]
fn set_progress_scrubs_and_completes() {
    let sig = Signal::new(Value::f(0.0));
    let mut machine = MotionMachine::new();
    machine
        .add_state(
            MotionStateDef::new("shown").with_animations(StateAnimations {
                enter: vec![MotionAnimation::new(AnimationPlan::new(vec![Tween::new(
                    sig.clone(),
                    100.0,
                    1000.0,
                )
                .with_from(Value::f(0.0))
                .into()]))],
                active: Vec::new(),
                exit: Vec::new(),
            }),
        )
        .unwrap();
    assert_eq!(machine.phase(), MotionPhase::Entering);

    machine.set_progress(0.5).unwrap();
    match sig.get() {
        Value::Float(v) => approx(v, 50.0, 1e-4),
        _ => panic!(),
    }

    machine.set_progress(1.0).unwrap();
    match sig.get() {
        Value::Float(v) => approx(v, 100.0, 1e-4),
        _ => panic!(),
    }
    assert_eq!(machine.phase(), MotionPhase::Active);
}

/// it should route matched events through the animated path and report
/// unmatched ones as a normal false
#[test]
fn transition_routes_through_animated_path() {
    let log: TraceLog = Rc::new(RefCell::new(Vec::new()));
    let mut machine = hierarchy_machine(&log);
    machine.update(1000.0).unwrap();

    assert!(!machine.transition("unknown").unwrap());
    assert!(machine.transition("show").unwrap());
    assert_eq!(machine.phase(), MotionPhase::Exiting);
    assert!(machine.is_transitioning());

    machine.update(10_000.0).unwrap();
    assert_eq!(machine.current_state().as_deref(), Some("b.x"));
    assert_eq!(machine.fsm().last_event().get().as_deref(), Some("show"));
}

/// it should reject duplicate and unknown states with configuration errors
#[test]
fn configuration_errors() {
    let mut machine = MotionMachine::new();
    machine.add_state(MotionStateDef::new("A")).unwrap();
    let err = machine.add_state(MotionStateDef::new("A")).unwrap_err();
    assert_eq!(err.to_string(), "State A already exists");

    let err = machine.set_state("missing", None).unwrap_err();
    assert_eq!(err, MachineError::UnknownState("missing".into()));
}

/// it should round-trip phase and task records through serde
#[test]
fn phase_and_task_serde_roundtrip() {
    let phase = MotionPhase::Exiting;
    let s = serde_json::to_string(&phase).unwrap();
    let back: MotionPhase = serde_json::from_str(&s).unwrap();
    assert_eq!(phase, back);

    let task = choreo_motion_core::AnimationTask {
        state: "b.x".to_string(),
        phase: MotionPhase::Entering,
        goal: true,
    };
    let s = serde_json::to_string(&task).unwrap();
    let back: choreo_motion_core::AnimationTask = serde_json::from_str(&s).unwrap();
    assert_eq!(task, back);
}

/// it should replay a state's enter set from scratch on every visit
#[test]
fn revisits_replay_deterministically() {
    let log: TraceLog = Rc::new(RefCell::new(Vec::new()));
    let mut machine = hierarchy_machine(&log);
    machine.update(1000.0).unwrap();

    for _ in 0..2 {
        machine.set_state("b.x", None).unwrap();
        machine.update(10_000.0).unwrap();
        machine.set_state("a", None).unwrap();
        machine.update(10_000.0).unwrap();
    }

    let enters = entries(&log)
        .iter()
        .filter(|l| l.as_str() == "enter b.x")
        .count();
    assert_eq!(enters, 2);
}
