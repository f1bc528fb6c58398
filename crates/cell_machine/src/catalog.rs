//! The instruction catalog.
//!
//! For every opcode the catalog lists its operands in order, whether each
//! one is read (a source) or written (a destination), and which operand
//! kinds may fill it. The assembler validates source text against this
//! table and the VM walks the same table to tell sources from
//! destinations, so the two can never disagree about an instruction's
//! shape.

use core::fmt;

use variant_count::VariantCount;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// `r<digits>`
    Register,
    /// `<digits>`
    Immediate,
    /// `Q`, one value taken from the bot's queue.
    Queue,
    /// `D<n>+`, `X-`, ... or `DIR` for the current heading.
    Direction,
    /// Any bare token, resolved against the label table after parsing.
    Label,
    /// Any bare token, resolved against the known programs at run time.
    BotName,
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperandKind::Register => "register",
            OperandKind::Immediate => "immediate",
            OperandKind::Queue => "queue read",
            OperandKind::Direction => "direction",
            OperandKind::Label => "label",
            OperandKind::BotName => "bot name",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Source,
    Destination,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperandSlot {
    pub role: Role,
    pub kinds: &'static [OperandKind],
    /// Only trailing slots may be optional.
    pub optional: bool,
}

impl OperandSlot {
    const fn source(kinds: &'static [OperandKind]) -> Self {
        Self {
            role: Role::Source,
            kinds,
            optional: false,
        }
    }

    const fn destination(kinds: &'static [OperandKind]) -> Self {
        Self {
            role: Role::Destination,
            kinds,
            optional: false,
        }
    }

    const fn optional_destination(kinds: &'static [OperandKind]) -> Self {
        Self {
            role: Role::Destination,
            kinds,
            optional: true,
        }
    }

    pub fn permits(&self, kind: OperandKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// Formats a kind list as "register, immediate or queue read".
pub struct KindList(pub &'static [OperandKind]);

impl fmt::Display for KindList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds = self.0.iter().peekable();
        let mut first = true;
        while let Some(kind) = kinds.next() {
            if !first {
                let joiner = if kinds.peek().is_some() { ", " } else { " or " };
                f.write_str(joiner)?;
            }
            first = false;
            write!(f, "{kind}")?;
        }
        Ok(())
    }
}

use OperandKind::{BotName, Direction, Immediate, Label, Queue, Register};

const VALUE: &[OperandKind] = &[Register, Immediate, Queue];
const SINK: &[OperandKind] = &[Register, Direction];
const REGISTER: &[OperandKind] = &[Register];
const DIRECTION: &[OperandKind] = &[Direction];
const LABEL: &[OperandKind] = &[Label];
const BOT: &[OperandKind] = &[BotName];

const NO_OPERANDS: &[OperandSlot] = &[];
const UNARY_VALUE: &[OperandSlot] = &[OperandSlot::source(VALUE)];
const MOVE_VALUE: &[OperandSlot] = &[OperandSlot::source(VALUE), OperandSlot::destination(SINK)];
const BINARY_VALUE: &[OperandSlot] = &[
    OperandSlot::source(VALUE),
    OperandSlot::source(VALUE),
    OperandSlot::destination(SINK),
];
const DIVIDE: &[OperandSlot] = &[
    OperandSlot::source(VALUE),
    OperandSlot::source(VALUE),
    OperandSlot::destination(SINK),
    OperandSlot::optional_destination(SINK),
];
const COMPARE: &[OperandSlot] = &[OperandSlot::source(VALUE), OperandSlot::source(VALUE)];
const WRITE_ONLY: &[OperandSlot] = &[OperandSlot::destination(SINK)];
const REGISTER_ONLY: &[OperandSlot] = &[OperandSlot::destination(REGISTER)];
const JUMP: &[OperandSlot] = &[OperandSlot::source(LABEL)];
const COUNT: &[OperandSlot] = &[OperandSlot::source(BOT), OperandSlot::destination(SINK)];
const SPAWN: &[OperandSlot] = &[OperandSlot::source(BOT), OperandSlot::source(DIRECTION)];
const EXEC: &[OperandSlot] = &[OperandSlot::source(BOT)];
const ONE_DIRECTION: &[OperandSlot] = &[OperandSlot::source(DIRECTION)];
const PLANE: &[OperandSlot] = &[
    OperandSlot::source(DIRECTION),
    OperandSlot::source(DIRECTION),
];

#[derive(VariantCount, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop,
    Put,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Not,
    Tgt,
    Tlt,
    Teq,
    Jmp,
    Jmpr,
    Id,
    Count,
    Spawn,
    Exec,
    Fork,
    Kill,
    Die,
    Move,
    Flip,
    Face,
    Rcw,
    Rccw,
    Qmax,
    Ttl,
    Avail,
    Getb,
    Putb,
    Exit,
}

impl Opcode {
    /// Every opcode, in declaration order. The array length is tied to the
    /// variant count so a new opcode cannot be left out of the table.
    pub const ALL: [Opcode; Opcode::VARIANT_COUNT] = [
        Opcode::Nop,
        Opcode::Put,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Not,
        Opcode::Tgt,
        Opcode::Tlt,
        Opcode::Teq,
        Opcode::Jmp,
        Opcode::Jmpr,
        Opcode::Id,
        Opcode::Count,
        Opcode::Spawn,
        Opcode::Exec,
        Opcode::Fork,
        Opcode::Kill,
        Opcode::Die,
        Opcode::Move,
        Opcode::Flip,
        Opcode::Face,
        Opcode::Rcw,
        Opcode::Rccw,
        Opcode::Qmax,
        Opcode::Ttl,
        Opcode::Avail,
        Opcode::Getb,
        Opcode::Putb,
        Opcode::Exit,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Put => "put",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::Not => "not",
            Opcode::Tgt => "tgt",
            Opcode::Tlt => "tlt",
            Opcode::Teq => "teq",
            Opcode::Jmp => "jmp",
            Opcode::Jmpr => "jmpr",
            Opcode::Id => "id",
            Opcode::Count => "count",
            Opcode::Spawn => "spawn",
            Opcode::Exec => "exec",
            Opcode::Fork => "fork",
            Opcode::Kill => "kill",
            Opcode::Die => "die",
            Opcode::Move => "move",
            Opcode::Flip => "flip",
            Opcode::Face => "face",
            Opcode::Rcw => "rcw",
            Opcode::Rccw => "rccw",
            Opcode::Qmax => "qmax",
            Opcode::Ttl => "ttl",
            Opcode::Avail => "avail",
            Opcode::Getb => "getb",
            Opcode::Putb => "putb",
            Opcode::Exit => "exit",
        }
    }

    pub fn from_mnemonic(token: &str) -> Option<Opcode> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|opcode| opcode.mnemonic() == token)
    }

    /// Ordered operand slots for this opcode.
    pub fn schema(self) -> &'static [OperandSlot] {
        match self {
            Opcode::Nop | Opcode::Die | Opcode::Move | Opcode::Flip => NO_OPERANDS,
            Opcode::Put => MOVE_VALUE,
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Mod => BINARY_VALUE,
            Opcode::Div => DIVIDE,
            Opcode::Not => REGISTER_ONLY,
            Opcode::Tgt | Opcode::Tlt | Opcode::Teq => COMPARE,
            Opcode::Jmp => JUMP,
            Opcode::Jmpr | Opcode::Qmax | Opcode::Ttl | Opcode::Putb | Opcode::Exit => {
                UNARY_VALUE
            }
            Opcode::Id | Opcode::Getb => WRITE_ONLY,
            Opcode::Count => COUNT,
            Opcode::Spawn => SPAWN,
            Opcode::Exec => EXEC,
            Opcode::Fork | Opcode::Kill | Opcode::Face => ONE_DIRECTION,
            Opcode::Rcw | Opcode::Rccw => PLANE,
            Opcode::Avail => MOVE_VALUE,
        }
    }

    pub fn required_operands(self) -> usize {
        self.schema().iter().filter(|slot| !slot.optional).count()
    }

    /// Jumps set the instruction pointer themselves and skip the advance.
    pub fn is_jump(self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::Jmpr)
    }

    /// Only bots bound to a host byte stream may run these.
    pub fn is_system(self) -> bool {
        matches!(
            self,
            Opcode::Avail | Opcode::Getb | Opcode::Putb | Opcode::Exit
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics_round_trip() {
        for opcode in Opcode::ALL {
            assert_eq!(Opcode::from_mnemonic(opcode.mnemonic()), Some(opcode));
        }
        assert_eq!(Opcode::from_mnemonic("ADD"), None);
        assert_eq!(Opcode::from_mnemonic("look"), None);
    }

    #[test]
    fn optional_slots_are_trailing() {
        for opcode in Opcode::ALL {
            let schema = opcode.schema();
            let first_optional = schema.iter().position(|slot| slot.optional);
            if let Some(first) = first_optional {
                assert!(schema[first..].iter().all(|slot| slot.optional), "{opcode}");
            }
        }
    }

    #[test]
    fn queue_reads_are_sources_only() {
        for opcode in Opcode::ALL {
            for slot in opcode.schema() {
                if slot.role == Role::Destination {
                    assert!(!slot.permits(OperandKind::Queue), "{opcode}");
                    assert!(!slot.permits(OperandKind::Immediate), "{opcode}");
                }
            }
        }
    }

    #[test]
    fn kind_list_reads_naturally() {
        assert_eq!(
            KindList(VALUE).to_string(),
            "register, immediate or queue read"
        );
        assert_eq!(KindList(LABEL).to_string(), "label");
    }
}
