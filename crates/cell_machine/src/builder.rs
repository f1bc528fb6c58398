use std::collections::BTreeMap;
use std::vec::Vec as StdVec;

use core::fmt;

use heapless::Vec;
use thiserror_no_std::Error;

use crate::catalog::{Opcode, OperandKind, OperandSlot, Role};
use crate::{Axis, Name, Value, MAX_OPERANDS};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgramBuilderError {
    #[error("label `{name}` is defined twice")]
    DuplicateLabel { name: Name, line: usize },
    #[error("label `{name}` was never defined")]
    UnknownLabel { name: Name, line: usize },
}

impl ProgramBuilderError {
    /// Source line the error belongs to.
    pub fn line(&self) -> usize {
        match self {
            ProgramBuilderError::DuplicateLabel { line, .. }
            | ProgramBuilderError::UnknownLabel { line, .. } => *line,
        }
    }
}

/// A jump target. `target` is meaningless until the builder has resolved
/// the label table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelRef {
    pub name: Name,
    pub target: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Register(usize),
    Immediate(Value),
    Queue,
    Axis(Axis),
    /// `DIR`, the executing bot's heading.
    Heading,
    Label(LabelRef),
    BotName(Name),
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::Register(_) => OperandKind::Register,
            Operand::Immediate(_) => OperandKind::Immediate,
            Operand::Queue => OperandKind::Queue,
            Operand::Axis(_) | Operand::Heading => OperandKind::Direction,
            Operand::Label(_) => OperandKind::Label,
            Operand::BotName(_) => OperandKind::BotName,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(index) => write!(f, "r{index}"),
            Operand::Immediate(value) => write!(f, "{value}"),
            Operand::Queue => f.write_str("Q"),
            Operand::Axis(axis) => write!(f, "{axis}"),
            Operand::Heading => f.write_str("DIR"),
            Operand::Label(label) => f.write_str(&label.name),
            Operand::BotName(name) => f.write_str(name),
        }
    }
}

pub type Operands = Vec<Operand, MAX_OPERANDS>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Operands,
    /// `Some(flag)` runs only while the bot's comparison flag equals `flag`.
    pub polarity: Option<bool>,
    /// Runs at most once per bot instance.
    pub init_only: bool,
    /// 0-based source line.
    pub line: usize,
}

impl Instruction {
    pub fn new(opcode: Opcode, line: usize) -> Self {
        Self {
            opcode,
            operands: Vec::new(),
            polarity: None,
            init_only: false,
            line,
        }
    }

    /// Operands paired with the catalog slot they fill.
    pub fn slots(&self) -> impl Iterator<Item = (&OperandSlot, &Operand)> {
        self.opcode.schema().iter().zip(self.operands.iter())
    }

    pub fn sources(&self) -> impl Iterator<Item = &Operand> {
        self.slots()
            .filter(|(slot, _)| slot.role == Role::Source)
            .map(|(_, operand)| operand)
    }

    pub fn destinations(&self) -> impl Iterator<Item = &Operand> {
        self.slots()
            .filter(|(slot, _)| slot.role == Role::Destination)
            .map(|(_, operand)| operand)
    }

    /// How many values this instruction takes from the queue.
    pub fn queue_demand(&self) -> usize {
        self.sources()
            .filter(|operand| matches!(operand, Operand::Queue))
            .count()
    }

    pub fn admits(&self, flag: bool) -> bool {
        self.polarity.is_none_or(|polarity| polarity == flag)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.init_only {
            f.write_str("@")?;
        }
        match self.polarity {
            Some(true) => f.write_str("+")?,
            Some(false) => f.write_str("-")?,
            None => {}
        }
        write!(f, "{}", self.opcode)?;
        for operand in self.operands.iter() {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

/// A compiled program: instructions plus the resolved label table.
/// Immutable once built and shared by every bot running it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    name: Name,
    instructions: StdVec<Instruction>,
    labels: BTreeMap<Name, usize>,
}

impl Program {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels
            .iter()
            .find(|(label, _)| label.as_str() == name)
            .map(|(_, index)| *index)
    }

    pub fn labels(&self) -> impl Iterator<Item = (&str, usize)> {
        self.labels.iter().map(|(name, index)| (name.as_str(), *index))
    }

    /// Index after `index`, wrapping to the start.
    pub fn next_index(&self, index: usize) -> usize {
        match index.checked_add(1) {
            Some(next) if next < self.instructions.len() => next,
            _ => 0,
        }
    }
}

struct PendingLabel {
    name: Name,
    line: usize,
}

struct Fixup {
    instruction: usize,
    operand: usize,
}

/// Collects instructions and labels and resolves jump targets once the
/// whole source has been seen.
pub struct ProgramBuilder {
    name: Name,
    instructions: StdVec<Instruction>,
    labels: StdVec<PendingLabel>,
    fixups: StdVec<Fixup>,
}

impl ProgramBuilder {
    pub fn new(name: Name) -> Self {
        Self {
            name,
            instructions: StdVec::new(),
            labels: StdVec::new(),
            fixups: StdVec::new(),
        }
    }

    pub fn add_label(&mut self, name: Name, line: usize) -> Result<(), ProgramBuilderError> {
        if self.labels.iter().any(|label| label.name == name) {
            return Err(ProgramBuilderError::DuplicateLabel { name, line });
        }
        self.labels.push(PendingLabel { name, line });
        Ok(())
    }

    pub fn add_instruction(&mut self, instruction: Instruction) {
        let index = self.instructions.len();
        for (operand, candidate) in instruction.operands.iter().enumerate() {
            if matches!(candidate, Operand::Label(_)) {
                self.fixups.push(Fixup {
                    instruction: index,
                    operand,
                });
            }
        }
        self.instructions.push(instruction);
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    pub fn finish(mut self) -> Result<Program, ProgramBuilderError> {
        // A label points at the first instruction at or after its line;
        // a trailing label wraps to the start.
        let mut labels = BTreeMap::new();
        for label in self.labels.drain(..) {
            let target = self
                .instructions
                .iter()
                .position(|instruction| instruction.line >= label.line)
                .unwrap_or(0);
            labels.insert(label.name, target);
        }

        for fixup in self.fixups.drain(..) {
            let Some(instruction) = self.instructions.get_mut(fixup.instruction) else {
                continue;
            };
            let line = instruction.line;
            if let Some(Operand::Label(label)) = instruction.operands.get_mut(fixup.operand) {
                label.target = *labels
                    .get(&label.name)
                    .ok_or_else(|| ProgramBuilderError::UnknownLabel {
                        name: label.name.clone(),
                        line,
                    })?;
            }
        }

        Ok(Program {
            name: self.name,
            instructions: self.instructions,
            labels,
        })
    }
}
