use super::*;
use crate::port::{ByteSink, NoInput};

use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec as StdVec;

fn at(x: Value, y: Value) -> Coord {
    Coord::from_slice(&[x, y]).unwrap()
}

fn simulation(programs: &[(&str, &[&str])]) -> Simulation {
    let mut sim = Simulation::new(SimulationConfig::default()).unwrap();
    for (name, lines) in programs {
        sim.compile(name, lines.iter().copied()).unwrap();
    }
    sim
}

struct SharedSink(Rc<RefCell<StdVec<u8>>>);

impl ByteSink for SharedSink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        self.0.borrow_mut().extend_from_slice(bytes);
        Ok(())
    }
}

#[test]
fn test_put_add_across_ticks() -> Result<(), SimulationError> {
    let mut sim = simulation(&[("adder", &["put 5 r0", "add r0 3 r0", "jmp hold", "hold: nop", "jmp hold"])]);
    let id = sim.register_bot("adder", at(0, 0))?;
    assert_eq!(sim.tick(), TickReport::Running);
    assert_eq!(sim.bot(id).map(|bot| bot.registers()[0]), Some(5));
    assert_eq!(sim.tick(), TickReport::Running);
    assert_eq!(sim.bot(id).map(|bot| bot.registers()[0]), Some(8));
    Ok(())
}

#[test]
fn test_divide_by_zero_frees_the_cell() -> Result<(), SimulationError> {
    let mut sim = simulation(&[("bad", &["div 5 0 r0"]), ("idle", &["nop"])]);
    let bad = sim.register_bot("bad", at(0, 0))?;
    let idle = sim.register_bot("idle", at(3, 0))?;
    assert_eq!(sim.tick(), TickReport::Running);
    assert!(sim.bot(bad).is_none());
    assert!(sim.bot_at(&at(0, 0)).is_none());
    assert!(sim.bot(idle).is_some());
    assert!(matches!(
        sim.recent_deaths(),
        [(id, DeathCause::Fault(BotFault::DivideByZero))] if *id == bad
    ));
    assert_eq!(sim.live_count("bad"), 0);
    Ok(())
}

#[test]
fn test_spawn_crushes_occupant() -> Result<(), SimulationError> {
    let mut sim = simulation(&[
        ("parent", &["spawn child X+", "jmp wait", "wait: nop", "jmp wait"]),
        ("child", &["add r0 1 r0", "nop"]),
        ("victim", &["nop"]),
    ]);
    sim.register_bot("parent", at(0, 0))?;
    let victim = sim.register_bot("victim", at(1, 0))?;
    sim.tick();
    let occupant = sim.bot_at(&at(1, 0)).map(|bot| bot.name().to_string());
    assert_eq!(occupant.as_deref(), Some("child"));
    assert_eq!(sim.recently_deceased().collect::<StdVec<_>>(), vec![victim]);
    assert_eq!(sim.live_count("child"), 1);
    assert_eq!(sim.live_count("victim"), 0);
    // The newborn does not act until the next tick.
    let child = sim.bot_at(&at(1, 0)).unwrap();
    assert_eq!((child.registers()[0], child.instr_ptr()), (0, 0));
    sim.tick();
    assert_eq!(sim.bot_at(&at(1, 0)).map(|bot| bot.registers()[0]), Some(1));
    Ok(())
}

#[test]
fn test_crushed_bot_loses_its_turn() -> Result<(), SimulationError> {
    let mut sim = simulation(&[
        ("mover", &["move", "die"]),
        ("crusher", &["spawn rock X+", "die"]),
        ("rock", &["nop"]),
        ("emitter", &["put 1 Y+", "die"]),
    ]);
    sim.register_bot("mover", at(0, 5))?;
    sim.register_bot("crusher", at(0, 0))?;
    let moved_onto = sim.register_bot("emitter", at(1, 5))?;
    let spawned_onto = sim.register_bot("emitter", at(1, 0))?;
    sim.tick();
    assert!(sim.bot(moved_onto).is_none());
    assert!(sim.bot(spawned_onto).is_none());
    assert_eq!(sim.live_count("emitter"), 0);
    assert!(sim.messages().is_empty());
    Ok(())
}

#[test]
fn test_register_on_occupied_cell_crushes() -> Result<(), SimulationError> {
    let mut sim = simulation(&[("idle", &["nop"])]);
    let first = sim.register_bot("idle", at(0, 0))?;
    let second = sim.register_bot("idle", at(0, 0))?;
    assert!(sim.bot(first).is_none());
    assert_eq!(sim.bot_at(&at(0, 0)).map(Bot::id), Some(second));
    assert_eq!(sim.live_count("idle"), 1);
    Ok(())
}

#[test]
fn test_message_moves_when_undelivered() -> Result<(), SimulationError> {
    let mut sim = simulation(&[("idle", &["nop"])]);
    sim.register_bot("idle", at(0, 5))?;
    sim.launch_message(at(0, 0), at(1, 0), Payload::Value(1))?;
    sim.tick();
    assert_eq!(sim.messages().len(), 1);
    assert_eq!(sim.messages()[0].position, at(1, 0));
    Ok(())
}

#[test]
fn test_message_delivered_before_and_after_moving() -> Result<(), SimulationError> {
    let mut sim = simulation(&[("sink", &["put Q r0", "put Q r1"])]);
    let sink = sim.register_bot("sink", at(1, 0))?;
    // Lands on the sink after moving.
    sim.launch_message(at(0, 0), at(1, 0), Payload::Value(11))?;
    // Already on the sink's cell.
    sim.launch_message(at(1, 0), at(0, 1), Payload::Value(22))?;
    sim.tick();
    assert!(sim.messages().is_empty());
    assert_eq!(sim.bot(sink).map(|bot| bot.registers()[0]), Some(11));
    sim.tick();
    assert_eq!(sim.bot(sink).map(|bot| bot.registers()[1]), Some(22));
    Ok(())
}

#[test]
fn test_blocked_bot_resumes_in_arrival_order() -> Result<(), SimulationError> {
    let mut sim = simulation(&[("waiter", &["sub Q Q r0", "jmp done", "done: nop", "jmp done"])]);
    let waiter = sim.register_bot("waiter", at(0, 0))?;

    sim.tick();
    let bot = sim.bot(waiter).unwrap();
    assert_eq!(bot.state(), BotState::AwaitingMessage { remaining: 2 });
    assert_eq!(bot.instr_ptr(), 0);

    sim.launch_message(at(-1, 0), at(1, 0), Payload::Value(50))?;
    sim.tick();
    sim.tick();
    assert_eq!(sim.bot(waiter).map(Bot::instr_ptr), Some(0));

    sim.launch_message(at(0, 3), at(0, -1), Payload::Value(8))?;
    sim.tick();
    sim.tick();
    assert_eq!(sim.bot(waiter).map(Bot::instr_ptr), Some(0));
    sim.tick();
    let bot = sim.bot(waiter).unwrap();
    assert_eq!(bot.registers()[0], 42);
    assert_eq!(bot.state(), BotState::Ready);
    Ok(())
}

#[test]
fn test_kill_message_removes_recipient() -> Result<(), SimulationError> {
    let mut sim = simulation(&[
        ("assassin", &["kill X+", "die"]),
        ("target", &["nop"]),
    ]);
    sim.register_bot("assassin", at(0, 0))?;
    let target = sim.register_bot("target", at(2, 0))?;
    sim.tick();
    assert!(sim.bot(target).is_some());
    sim.tick();
    assert!(sim.bot(target).is_none());
    assert!(sim
        .recent_deaths()
        .iter()
        .any(|(id, cause)| *id == target && *cause == DeathCause::Killed));
    Ok(())
}

#[test]
fn test_move_crushes_and_keeps_cell() -> Result<(), SimulationError> {
    let mut sim = simulation(&[("mover", &["move", "die"]), ("rock", &["nop"])]);
    let mover = sim.register_bot("mover", at(0, 0))?;
    let rock = sim.register_bot("rock", at(1, 0))?;
    sim.tick();
    assert!(sim.bot(rock).is_none());
    assert_eq!(sim.bot_at(&at(1, 0)).map(Bot::id), Some(mover));
    assert!(sim.bot_at(&at(0, 0)).is_none());
    Ok(())
}

#[test]
fn test_exec_replaces_in_place() -> Result<(), SimulationError> {
    let mut sim = simulation(&[
        ("larva", &["face Y-", "exec moth"]),
        ("moth", &["add r0 1 r0", "nop"]),
    ]);
    let larva = sim.register_bot("larva", at(4, 4))?;
    sim.tick();
    sim.tick();
    assert!(sim.bot(larva).is_none());
    let moth = sim.bot_at(&at(4, 4)).unwrap();
    assert_eq!(moth.name(), "moth");
    assert_eq!(moth.heading(), &at(0, -1));
    assert_eq!(moth.registers()[0], 0);
    assert_eq!(sim.live_count("larva"), 0);
    sim.tick();
    assert_eq!(sim.bot_at(&at(4, 4)).map(|bot| bot.registers()[0]), Some(1));
    Ok(())
}

#[test]
fn test_fork_clones_next_to_parent() -> Result<(), SimulationError> {
    let mut sim = simulation(&[("cell", &["@put 3 r1", "@fork Y+", "nop"])]);
    let parent = sim.register_bot("cell", at(0, 0))?;
    sim.tick();
    sim.tick();
    let child = sim.bot_at(&at(0, 1)).unwrap();
    assert_ne!(child.id(), parent);
    assert_eq!(child.registers(), &[0, 3]);
    assert_eq!(child.heading(), &at(0, 1));
    assert_eq!(sim.live_count("cell"), 2);
    // The child inherits the init history and never forks again.
    for _ in 0..4 {
        sim.tick();
    }
    assert_eq!(sim.live_count("cell"), 2);
    Ok(())
}

#[test]
fn test_fork_child_waits_for_next_tick() -> Result<(), SimulationError> {
    let mut sim = simulation(&[("counter", &["@fork X+", "loop: add r0 1 r0", "jmp loop"])]);
    let parent = sim.register_bot("counter", at(0, 0))?;
    sim.tick();
    let child = sim.bot_at(&at(1, 0)).unwrap().id();
    assert_eq!(sim.bot(child).map(|bot| bot.registers()[0]), Some(0));
    assert_eq!(sim.bot(parent).map(|bot| bot.registers()[0]), Some(0));
    sim.tick();
    assert_eq!(sim.bot(child).map(|bot| bot.registers()[0]), Some(1));
    assert_eq!(sim.bot(parent).map(|bot| bot.registers()[0]), Some(1));
    Ok(())
}

#[test]
fn test_new_messages_wait_for_next_tick() -> Result<(), SimulationError> {
    let mut sim = simulation(&[
        ("first", &["put 1 X+", "die"]),
        ("second", &["put Q r0", "die"]),
    ]);
    sim.register_bot("first", at(0, 0))?;
    let second = sim.register_bot("second", at(1, 0))?;
    sim.tick();
    // The message appears this tick but is only delivered on the next one.
    assert_eq!(sim.bot(second).map(|bot| bot.state()), Some(BotState::AwaitingMessage { remaining: 1 }));
    sim.tick();
    assert_eq!(sim.bot(second).map(|bot| bot.registers()[0]), Some(1));
    Ok(())
}

#[test]
fn test_count_sees_live_tally() -> Result<(), SimulationError> {
    let mut sim = simulation(&[("census", &["count census r0", "jmp stay", "stay: nop", "jmp stay"])]);
    let a = sim.register_bot("census", at(0, 0))?;
    sim.register_bot("census", at(5, 5))?;
    sim.tick();
    assert_eq!(sim.bot(a).map(|bot| bot.registers()[0]), Some(2));
    Ok(())
}

#[test]
fn test_unknown_program_at_runtime_is_a_fault() -> Result<(), SimulationError> {
    let mut sim = simulation(&[("lost", &["exec nowhere"])]);
    let lost = sim.register_bot("lost", at(0, 0))?;
    assert_eq!(sim.tick(), TickReport::Extinct);
    assert!(sim.bot(lost).is_none());
    Ok(())
}

#[test]
fn test_run_until_extinct() -> Result<(), SimulationError> {
    let mut sim = simulation(&[("brief", &["nop", "die"])]);
    sim.register_bot("brief", at(0, 0))?;
    assert_eq!(sim.run(None), RunOutcome::Extinct { ticks: 2 });
    assert!(sim.is_extinct());
    Ok(())
}

#[test]
fn test_run_stops_at_tick_limit() -> Result<(), SimulationError> {
    let mut sim = simulation(&[("spin", &["nop"])]);
    sim.register_bot("spin", at(0, 0))?;
    assert_eq!(sim.run(Some(10)), RunOutcome::TickLimit { ticks: 10 });
    assert_eq!(sim.time(), 10);
    Ok(())
}

#[test]
fn test_system_bot_writes_and_exits() -> Result<(), SimulationError> {
    let out = Rc::new(RefCell::new(StdVec::new()));
    let mut sim = simulation(&[("hello", &["putb 104", "putb 105", "exit 3"])]);
    sim.register_system_bot(
        "hello",
        at(0, 0),
        SystemPort::new(Box::new(NoInput), Box::new(SharedSink(out.clone()))),
    )?;
    assert_eq!(sim.run(None), RunOutcome::Exited { code: 3, ticks: 3 });
    assert_eq!(out.borrow().as_slice(), b"hi");
    Ok(())
}

#[test]
fn test_plain_bot_cannot_use_system_opcodes() -> Result<(), SimulationError> {
    let mut sim = simulation(&[("sneaky", &["exit 1"])]);
    let sneaky = sim.register_bot("sneaky", at(0, 0))?;
    assert_eq!(sim.tick(), TickReport::Extinct);
    assert!(matches!(
        sim.recent_deaths(),
        [(id, DeathCause::Fault(BotFault::NotSystemBot(Opcode::Exit)))] if *id == sneaky
    ));
    Ok(())
}

#[test]
fn test_same_setup_same_trace() -> Result<(), SimulationError> {
    let programs: &[(&str, &[&str])] = &[
        ("walker", &["move", "put 1 DIR", "rccw X+ Y+", "jmpr 0"]),
        ("spore", &["@spawn walker DIR", "rcw X+ Y+"]),
    ];
    let trace = |sim: &mut Simulation| {
        let mut out = StdVec::new();
        for _ in 0..12 {
            sim.tick();
            for bot in sim.bots() {
                out.push((bot.id(), bot.position().clone(), bot.instr_ptr()));
            }
        }
        out
    };
    let mut a = simulation(programs);
    let mut b = simulation(programs);
    for sim in [&mut a, &mut b] {
        sim.register_bot("spore", at(0, 0))?;
        sim.register_bot("walker", at(3, 3))?;
    }
    assert_eq!(trace(&mut a), trace(&mut b));
    Ok(())
}

#[test]
fn test_bad_configuration_is_rejected() {
    let config = SimulationConfig {
        dimensions: 0,
        ..SimulationConfig::default()
    };
    assert!(matches!(
        Simulation::new(config),
        Err(SimulationError::Config(ConfigError::Dimensions { .. }))
    ));
}

#[test]
fn test_wrong_dimensions_are_rejected() {
    let mut sim = simulation(&[("idle", &["nop"])]);
    let err = sim
        .register_bot("idle", Coord::from_slice(&[1, 2, 3]).unwrap())
        .unwrap_err();
    assert!(matches!(err, SimulationError::Geometry(_)));
    assert!(matches!(
        sim.register_bot("missing", at(0, 0)),
        Err(SimulationError::UnknownProgram(_))
    ));
}

#[test]
fn test_coord_math() {
    let p = at(2, -3);
    assert_eq!(p.offset(&at(1, 1)).unwrap(), at(3, -2));
    assert_eq!(p.negated(), at(-2, 3));
    assert_eq!(p.dot(&at(1, 2)).unwrap(), -4);
    assert_eq!(p.to_string(), "(2, -3)");
    assert!(p.offset(&Coord::origin(3).unwrap()).is_err());
    assert_eq!(Axis::new(1, true).to_string(), "D1-");
}
