use super::*;
use crate::assembler::assemble;
use crate::port::{NoOutput, ReadSource};
use crate::Axis;

use std::io::Cursor;

struct FakeWorld {
    programs: StdVec<&'static str>,
    port: Option<SystemPort>,
}

impl FakeWorld {
    fn new() -> Self {
        Self {
            programs: vec!["seed"],
            port: None,
        }
    }
}

impl World for FakeWorld {
    fn dimensions(&self) -> usize {
        2
    }

    fn knows_program(&self, name: &str) -> bool {
        self.programs.iter().any(|known| *known == name)
    }

    fn live_count(&self, name: &str) -> usize {
        if self.knows_program(name) { 3 } else { 0 }
    }

    fn port(&mut self) -> Option<&mut SystemPort> {
        self.port.as_mut()
    }
}

fn at(x: Value, y: Value) -> Coord {
    Coord::from_slice(&[x, y]).unwrap()
}

fn east() -> Coord {
    Axis::new(0, false).unit(2).unwrap()
}

fn bot(lines: &[&str]) -> Bot {
    let config = SimulationConfig::default();
    let program = assemble("t", lines.iter().copied(), config.assembler_options()).unwrap();
    Bot::new(BotId(7), Arc::new(program), at(0, 0), east(), &config)
}

fn run(bot: &mut Bot, world: &mut FakeWorld, steps: usize) -> StdVec<Effect> {
    let mut all = StdVec::new();
    for _ in 0..steps {
        if let Step::Executed(effects) = bot.step(world).unwrap() {
            all.extend(effects);
        }
    }
    all
}

#[test]
fn put_then_add() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["put 5 r0", "add r0 3 r0", "nop"]);
    run(&mut bot, &mut world, 2);
    assert_eq!(bot.registers(), &[8, 0]);
    assert_eq!(bot.instr_ptr(), 2);
}

#[test]
fn pointer_wraps_to_start() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["add r0 1 r0", "nop"]);
    run(&mut bot, &mut world, 3);
    assert_eq!(bot.registers()[0], 2);
    assert_eq!(bot.instr_ptr(), 1);
}

#[test]
fn divide_by_zero_is_a_fault() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["div 5 0 r0"]);
    assert_eq!(bot.step(&mut world), Err(BotFault::DivideByZero));
    let mut bot = self::bot(&["mod 5 0 r0"]);
    assert_eq!(bot.step(&mut world), Err(BotFault::DivideByZero));
}

#[test]
fn division_is_floored() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["sub 0 7 r0", "div r0 2 r0 r1", "nop"]);
    run(&mut bot, &mut world, 2);
    assert_eq!(bot.registers(), &[-4, 1]);
    assert_eq!(floored_div(7, -2), Ok((-4, -1)));
    assert_eq!(floored_div(Value::MIN, -1), Err(BotFault::Overflow));
}

#[test]
fn comparison_gates_polarity() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["tgt 3 2", "+put 1 r0", "-put 2 r1", "jmp end", "end:"]);
    run(&mut bot, &mut world, 3);
    assert_eq!(bot.registers(), &[1, 0]);
    assert!(bot.flag());
}

#[test]
fn ineligible_first_instruction_is_skipped_at_start() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["+put 9 r0", "put 1 r1", "nop"]);
    run(&mut bot, &mut world, 1);
    assert_eq!(bot.registers(), &[0, 1]);
}

#[test]
fn init_only_runs_once_per_instance() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["@add r0 1 r0", "add r1 1 r1"]);
    run(&mut bot, &mut world, 5);
    assert_eq!(bot.registers(), &[1, 4]);
}

#[test]
fn nothing_eligible_is_deadlock() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["@nop"]);
    let effects = run(&mut bot, &mut world, 1);
    assert_eq!(effects, vec![Effect::Die(DeathCause::Deadlock)]);
}

#[test]
fn blocks_until_queue_is_filled() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["sub Q Q r0", "nop"]);
    assert_eq!(bot.step(&mut world), Ok(Step::Blocked));
    assert_eq!(bot.state(), BotState::AwaitingMessage { remaining: 2 });
    assert_eq!(bot.instr_ptr(), 0);

    assert_eq!(bot.receive(Payload::Value(10)), Reception::Resolved);
    assert_eq!(bot.step(&mut world), Ok(Step::Blocked));
    assert_eq!(bot.receive(Payload::Value(4)), Reception::Resolved);
    assert_eq!(bot.state(), BotState::Ready);

    run(&mut bot, &mut world, 1);
    assert_eq!(bot.registers()[0], 6);
    assert_eq!(bot.instr_ptr(), 1);
}

#[test]
fn partial_queue_is_drained_into_pending() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["sub Q Q r0"]);
    assert_eq!(bot.receive(Payload::Value(1)), Reception::Enqueued);
    assert_eq!(bot.step(&mut world), Ok(Step::Blocked));
    assert_eq!(bot.queue_len(), 0);
    assert_eq!(bot.receive(Payload::Value(5)), Reception::Resolved);
    run(&mut bot, &mut world, 1);
    assert_eq!(bot.registers()[0], -4);
}

#[test]
fn queue_is_fifo_and_bounded() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["put Q r0", "put Q r1"]);
    for value in 1..=4 {
        assert_eq!(bot.receive(Payload::Value(value)), Reception::Enqueued);
    }
    assert_eq!(bot.receive(Payload::Value(5)), Reception::Dropped);
    assert_eq!(bot.receive(Payload::Kill), Reception::Killed);
    run(&mut bot, &mut world, 2);
    assert_eq!(bot.registers(), &[1, 2]);
    assert_eq!(bot.queue().copied().collect::<StdVec<_>>(), vec![3, 4]);
}

#[test]
fn qmax_and_ttl_change_limits() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["qmax 1", "ttl 3", "put 9 Y+", "nop"]);
    let effects = run(&mut bot, &mut world, 3);
    assert_eq!(bot.queue_capacity(), 1);
    assert_eq!(bot.receive(Payload::Value(1)), Reception::Enqueued);
    assert_eq!(bot.receive(Payload::Value(2)), Reception::Dropped);
    assert_eq!(
        effects,
        vec![Effect::Emit {
            at: at(0, 1),
            velocity: at(0, 1),
            payload: Payload::Value(9),
            ttl: 3,
        }]
    );
}

#[test]
fn writing_to_a_direction_emits() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["div 7 2 DIR X-", "kill Y-"]);
    let effects = run(&mut bot, &mut world, 2);
    assert_eq!(effects.len(), 3);
    assert_eq!(
        effects[0],
        Effect::Emit {
            at: at(1, 0),
            velocity: at(1, 0),
            payload: Payload::Value(3),
            ttl: MESSAGE_TTL_MAX,
        }
    );
    assert!(matches!(
        &effects[1],
        Effect::Emit { payload: Payload::Value(1), at, .. } if *at == self::at(-1, 0)
    ));
    assert!(matches!(
        &effects[2],
        Effect::Emit { payload: Payload::Kill, .. }
    ));
}

#[test]
fn jumps_do_not_advance() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["jmp here", "put 1 r0", "here: add r1 1 r1", "jmpr 2"]);
    run(&mut bot, &mut world, 3);
    // jmpr 2 from the last instruction wraps to index 1.
    assert_eq!(bot.instr_ptr(), 1);
    assert_eq!(bot.registers(), &[0, 1]);
}

#[test]
fn heading_changes() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["flip", "face Y+", "rccw X+ Y+", "rcw X+ Y+", "move"]);
    run(&mut bot, &mut world, 1);
    assert_eq!(bot.heading(), &at(-1, 0));
    run(&mut bot, &mut world, 1);
    assert_eq!(bot.heading(), &at(0, 1));
    run(&mut bot, &mut world, 1);
    assert_eq!(bot.heading(), &at(-1, 0));
    run(&mut bot, &mut world, 1);
    assert_eq!(bot.heading(), &at(0, 1));
    let effects = run(&mut bot, &mut world, 1);
    assert_eq!(effects, vec![Effect::Move { to: at(0, 1) }]);
}

#[test]
fn rotation_needs_perpendicular_axes() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["rcw X+ X-"]);
    assert_eq!(bot.step(&mut world), Err(BotFault::DegenerateRotation));
}

#[test]
fn lifecycle_effects() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["count seed r0", "spawn seed Y-", "fork DIR", "id r1", "exec seed"]);
    let effects = run(&mut bot, &mut world, 5);
    assert_eq!(bot.registers(), &[3, 7]);
    assert_eq!(
        effects,
        vec![
            Effect::Spawn {
                program: crate::to_name("seed").unwrap(),
                at: at(0, -1),
                heading: at(0, -1),
            },
            Effect::Fork {
                at: at(1, 0),
                heading: at(1, 0),
            },
            Effect::Exec {
                program: crate::to_name("seed").unwrap(),
            },
        ]
    );
}

#[test]
fn unknown_program_is_a_fault() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["spawn ghost X+"]);
    assert!(matches!(
        bot.step(&mut world),
        Err(BotFault::UnknownProgram(_))
    ));
}

#[test]
fn die_halts() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["die", "nop"]);
    let effects = run(&mut bot, &mut world, 1);
    assert_eq!(effects, vec![Effect::Die(DeathCause::Died)]);
}

#[test]
fn not_flips_truthiness() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["not r0", "put 5 r1", "not r1", "nop"]);
    run(&mut bot, &mut world, 3);
    assert_eq!(bot.registers(), &[1, 0]);
}

#[test]
fn system_opcodes_need_a_system_bot() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["putb 65"]);
    assert_eq!(
        bot.step(&mut world),
        Err(BotFault::NotSystemBot(Opcode::Putb))
    );
}

#[test]
fn system_bot_reads_bytes() {
    let mut world = FakeWorld::new();
    world.port = Some(SystemPort::new(
        Box::new(ReadSource(Cursor::new(b"hi".to_vec()))),
        Box::new(NoOutput),
    ));
    let mut bot = bot(&["avail 8 r0", "getb r1", "getb r1", "getb r1"]);
    bot.set_system(true);
    run(&mut bot, &mut world, 2);
    assert_eq!(bot.registers(), &[2, Value::from(b'h')]);
    run(&mut bot, &mut world, 1);
    assert_eq!(bot.registers()[1], Value::from(b'i'));
    assert_eq!(bot.step(&mut world), Err(BotFault::EmptyReadWindow));
}

#[test]
fn exit_is_clamped() {
    let mut world = FakeWorld::new();
    let mut bot = bot(&["exit 3", "put 4294967296 r0", "exit r0"]);
    bot.set_system(true);
    let effects = run(&mut bot, &mut world, 3);
    assert_eq!(effects, vec![Effect::Exit(3), Effect::Exit(i32::MAX)]);
}

#[test]
fn fork_copies_state_but_not_queue() {
    let mut world = FakeWorld::new();
    let mut parent = bot(&["put 4 r0", "nop"]);
    run(&mut parent, &mut world, 1);
    parent.receive(Payload::Value(1));
    let child = parent.fork(BotId(8), at(1, 0), east());
    assert_eq!(child.id(), BotId(8));
    assert_eq!(child.registers(), parent.registers());
    assert_eq!(child.instr_ptr(), parent.instr_ptr());
    assert_eq!(child.queue_len(), 0);
}
