// Line oriented assembler for cell bot programs.
//
// A line is, in order: an optional `label:`, an optional `@` (init-only),
// an optional `+`/`-` (polarity gate), the mnemonic and exactly the
// operands the catalog lists for it. `#` starts a comment anywhere a new
// token could start. Jump labels are patched by the builder once the whole
// file has been read.

use std::vec::Vec as StdVec;

use core::str::SplitWhitespace;

use serde::Serialize;
use thiserror_no_std::Error;
use tracing::debug;

use crate::builder::{
    Instruction, LabelRef, Operand, Operands, Program, ProgramBuilder, ProgramBuilderError,
};
use crate::catalog::{KindList, Opcode, OperandKind, OperandSlot};
use crate::{to_name, Axis, Name, Value, MAX_DIMENSIONS};

const COMMENT: char = '#';

/// Limits the assembler checks operands against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssemblerOptions {
    pub register_count: usize,
    pub dimensions: usize,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            register_count: 2,
            dimensions: 2,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblerError {
    #[error("{0}")]
    Kind(AssemblerErrorKind),
    #[error("line {line}: {kind}")]
    WithLine {
        line: usize,
        text: String,
        kind: AssemblerErrorKind,
    },
}

impl AssemblerError {
    fn with_line(self, line: usize, text: &str) -> Self {
        match self {
            AssemblerError::WithLine { .. } => self,
            AssemblerError::Kind(kind) => AssemblerError::WithLine {
                line,
                text: text.to_string(),
                kind,
            },
        }
    }

    pub fn line_number(&self) -> Option<usize> {
        match self {
            Self::Kind(_) => None,
            Self::WithLine { line, .. } => Some(*line),
        }
    }

    pub fn error_kind(&self) -> &AssemblerErrorKind {
        match self {
            Self::Kind(kind) => kind,
            Self::WithLine { kind, .. } => kind,
        }
    }

    pub fn diagnostic(&self) -> Diagnostic {
        match self {
            Self::Kind(kind) => Diagnostic {
                line: None,
                text: String::new(),
                message: kind.to_string(),
            },
            Self::WithLine { line, text, kind } => Diagnostic {
                line: Some(*line),
                text: text.clone(),
                message: kind.to_string(),
            },
        }
    }
}

impl From<AssemblerErrorKind> for AssemblerError {
    fn from(kind: AssemblerErrorKind) -> Self {
        AssemblerError::Kind(kind)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblerErrorKind {
    #[error("expected an instruction after the prefix")]
    MissingOpcode,
    #[error("unimplemented instruction `{0}`")]
    UnknownOpcode(String),
    #[error("label has no name")]
    EmptyLabel,
    #[error("name `{0}` is too long")]
    NameTooLong(String),
    #[error("2nd definition of label `{0}`")]
    DuplicateLabel(String),
    #[error("label `{0}` was never defined")]
    UnknownLabel(String),
    #[error("instruction `{opcode}` expects {expected} operands, but only {found} were given")]
    TooFewOperands {
        opcode: Opcode,
        expected: usize,
        found: usize,
    },
    #[error("instruction `{opcode}` expects operand {position} to be a {expected}, found `{token}`")]
    InvalidOperand {
        opcode: Opcode,
        position: usize,
        token: String,
        expected: ExpectedKinds,
    },
    #[error("instruction `{opcode}` takes no more operands, found `{token}`")]
    TrailingTokens { opcode: Opcode, token: String },
    #[error("register r{register} does not exist, bots have {count}")]
    RegisterOutOfRange { register: usize, count: usize },
    #[error("axis D{axis} does not exist in a {dimensions} dimensional grid")]
    AxisOutOfRange { axis: u8, dimensions: usize },
}

impl From<ProgramBuilderError> for AssemblerError {
    fn from(err: ProgramBuilderError) -> Self {
        let kind = match &err {
            ProgramBuilderError::DuplicateLabel { name, .. } => {
                AssemblerErrorKind::DuplicateLabel(name.as_str().to_string())
            }
            ProgramBuilderError::UnknownLabel { name, .. } => {
                AssemblerErrorKind::UnknownLabel(name.as_str().to_string())
            }
        };
        AssemblerError::Kind(kind)
    }
}

/// Catalog kinds wrapped so they can sit in an error and print nicely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedKinds(pub &'static [OperandKind]);

impl core::fmt::Display for ExpectedKinds {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", KindList(self.0))
    }
}

/// A flattened compile error for hosts to print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// 0-based line, absent for errors that belong to no single line.
    pub line: Option<usize>,
    pub text: String,
    pub message: String,
}

impl core::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.line {
            Some(line) => {
                writeln!(f, "Error on line {line}:")?;
                writeln!(f, "\"{}\"", self.text.trim())?;
                write!(f, "{}", self.message)
            }
            None => write!(f, "{}", self.message),
        }
    }
}

/// Splits a line into tokens, with room to push back the remainder of a
/// `label:rest` token.
struct Tokens<'l> {
    pending: Option<&'l str>,
    rest: SplitWhitespace<'l>,
}

impl<'l> Tokens<'l> {
    fn new(line: &'l str) -> Self {
        Self {
            pending: None,
            rest: line.split_whitespace(),
        }
    }

    fn push_front(&mut self, token: &'l str) {
        self.pending = Some(token);
    }
}

impl<'l> Iterator for Tokens<'l> {
    type Item = &'l str;

    fn next(&mut self) -> Option<&'l str> {
        self.pending.take().or_else(|| self.rest.next())
    }
}

pub struct Assembler {
    options: AssemblerOptions,
    builder: ProgramBuilder,
    lines: StdVec<String>,
    line_number: usize,
}

impl Assembler {
    pub fn new(name: &str, options: AssemblerOptions) -> Result<Self, AssemblerError> {
        let name = to_name(name)
            .ok_or_else(|| AssemblerErrorKind::NameTooLong(name.to_string()))?;
        Ok(Self {
            options,
            builder: ProgramBuilder::new(name),
            lines: StdVec::new(),
            line_number: 0,
        })
    }

    /// Assembles one source line. Line numbers count from 0 and include
    /// blank and comment lines.
    pub fn add_line(&mut self, line: &str) -> Result<(), AssemblerError> {
        let line_number = self.line_number;
        self.line_number = self.line_number.saturating_add(1);
        self.lines.push(line.to_string());
        self.parse_line(line, line_number)
            .map_err(|err| err.with_line(line_number, line))
    }

    pub fn finish(self) -> Result<Program, AssemblerError> {
        let lines = self.lines;
        let program = self.builder.finish().map_err(|err| {
            let line = err.line();
            let text = lines.get(line).map(String::as_str).unwrap_or_default();
            AssemblerError::from(err).with_line(line, text)
        })?;
        debug!(
            program = program.name(),
            instructions = program.len(),
            "program assembled"
        );
        Ok(program)
    }

    fn parse_line(&mut self, line: &str, line_number: usize) -> Result<(), AssemblerError> {
        let mut tokens = Tokens::new(line);
        let Some(mut token) = tokens.next() else {
            return Ok(());
        };
        if token.starts_with(COMMENT) {
            return Ok(());
        }

        if let Some((label, rest)) = token.split_once(':') {
            if label.is_empty() {
                return Err(AssemblerErrorKind::EmptyLabel.into());
            }
            let name = to_name(label)
                .ok_or_else(|| AssemblerErrorKind::NameTooLong(label.to_string()))?;
            self.builder.add_label(name, line_number)?;
            if !rest.is_empty() {
                tokens.push_front(rest);
            }
            token = match tokens.next() {
                None => return Ok(()),
                Some(next) if next.starts_with(COMMENT) => return Ok(()),
                Some(next) => next,
            };
        }

        let mut init_only = false;
        if let Some(rest) = token.strip_prefix('@') {
            init_only = true;
            token = next_or_rest(rest, &mut tokens)?;
        }

        let mut polarity = None;
        if let Some(rest) = token.strip_prefix('+') {
            polarity = Some(true);
            token = next_or_rest(rest, &mut tokens)?;
        } else if let Some(rest) = token.strip_prefix('-') {
            polarity = Some(false);
            token = next_or_rest(rest, &mut tokens)?;
        }

        let opcode = Opcode::from_mnemonic(token)
            .ok_or_else(|| AssemblerErrorKind::UnknownOpcode(token.to_string()))?;

        let mut instruction = Instruction::new(opcode, line_number);
        instruction.init_only = init_only;
        instruction.polarity = polarity;
        let comment_started = self.parse_operands(opcode, &mut tokens, &mut instruction.operands)?;

        if !comment_started {
            if let Some(extra) = tokens.next() {
                if !extra.starts_with(COMMENT) {
                    return Err(AssemblerErrorKind::TrailingTokens {
                        opcode,
                        token: extra.to_string(),
                    }
                    .into());
                }
            }
        }

        self.builder.add_instruction(instruction);
        Ok(())
    }

    /// Fills `operands` from the catalog schema. Returns true when a
    /// comment cut the operand list short in an optional slot.
    fn parse_operands(
        &self,
        opcode: Opcode,
        tokens: &mut Tokens<'_>,
        operands: &mut Operands,
    ) -> Result<bool, AssemblerError> {
        let schema = opcode.schema();
        for (index, slot) in schema.iter().enumerate() {
            let token = match tokens.next() {
                Some(token) if !token.starts_with(COMMENT) => token,
                end => {
                    if slot.optional {
                        return Ok(end.is_some());
                    }
                    return Err(AssemblerErrorKind::TooFewOperands {
                        opcode,
                        expected: opcode.required_operands(),
                        found: index,
                    }
                    .into());
                }
            };
            let operand = self.parse_operand(token, slot)?.ok_or_else(|| {
                AssemblerErrorKind::InvalidOperand {
                    opcode,
                    position: index.saturating_add(1),
                    token: token.to_string(),
                    expected: ExpectedKinds(slot.kinds),
                }
            })?;
            // The catalog never lists more than MAX_OPERANDS slots.
            if operands.push(operand).is_err() {
                return Err(AssemblerErrorKind::TrailingTokens {
                    opcode,
                    token: token.to_string(),
                }
                .into());
            }
        }
        Ok(false)
    }

    /// Tries each permitted kind in catalog order.
    fn parse_operand(
        &self,
        token: &str,
        slot: &OperandSlot,
    ) -> Result<Option<Operand>, AssemblerError> {
        for kind in slot.kinds {
            let operand = match kind {
                OperandKind::Register => self.parse_register(token)?,
                OperandKind::Immediate => parse_immediate(token).map(Operand::Immediate),
                OperandKind::Queue => (token == "Q").then_some(Operand::Queue),
                OperandKind::Direction => self.parse_direction(token)?,
                OperandKind::Label => Some(Operand::Label(LabelRef {
                    name: to_name_or_err(token)?,
                    target: 0,
                })),
                OperandKind::BotName => Some(Operand::BotName(to_name_or_err(token)?)),
            };
            if operand.is_some() {
                return Ok(operand);
            }
        }
        Ok(None)
    }

    fn parse_register(&self, token: &str) -> Result<Option<Operand>, AssemblerError> {
        let Some(digits) = token.strip_prefix('r') else {
            return Ok(None);
        };
        if !is_digits(digits) {
            return Ok(None);
        }
        let Ok(register) = digits.parse::<usize>() else {
            return Ok(None);
        };
        if register >= self.options.register_count {
            return Err(AssemblerErrorKind::RegisterOutOfRange {
                register,
                count: self.options.register_count,
            }
            .into());
        }
        Ok(Some(Operand::Register(register)))
    }

    fn parse_direction(&self, token: &str) -> Result<Option<Operand>, AssemblerError> {
        if token == "DIR" {
            return Ok(Some(Operand::Heading));
        }
        let Some(axis) = parse_axis(token) else {
            return Ok(None);
        };
        if usize::from(axis.dimension) >= self.options.dimensions {
            return Err(AssemblerErrorKind::AxisOutOfRange {
                axis: axis.dimension,
                dimensions: self.options.dimensions,
            }
            .into());
        }
        Ok(Some(Operand::Axis(axis)))
    }
}

/// Assembles a whole source, stopping at the first error.
pub fn assemble<'l, I>(
    name: &str,
    lines: I,
    options: AssemblerOptions,
) -> Result<Program, AssemblerError>
where
    I: IntoIterator<Item = &'l str>,
{
    let mut assembler = Assembler::new(name, options)?;
    for line in lines {
        assembler.add_line(line)?;
    }
    assembler.finish()
}

/// Text glued to a prefix (`@add`) is the next token; otherwise read on.
fn next_or_rest<'l>(rest: &'l str, tokens: &mut Tokens<'l>) -> Result<&'l str, AssemblerError> {
    if !rest.is_empty() {
        return Ok(rest);
    }
    match tokens.next() {
        Some(token) if !token.starts_with(COMMENT) => Ok(token),
        _ => Err(AssemblerErrorKind::MissingOpcode.into()),
    }
}

fn is_digits(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|byte| byte.is_ascii_digit())
}

fn parse_immediate(token: &str) -> Option<Value> {
    if !is_digits(token) {
        return None;
    }
    token.parse::<Value>().ok()
}

/// `D<digit><sign>` or `X`/`Y`/`Z` followed by a sign.
fn parse_axis(token: &str) -> Option<Axis> {
    let mut chars = token.chars();
    let dimension = match chars.next()? {
        'D' => {
            let digit = chars.next()?.to_digit(10)?;
            u8::try_from(digit).ok()?
        }
        'X' => 0,
        'Y' => 1,
        'Z' => 2,
        _ => return None,
    };
    let negative = match chars.next()? {
        '+' => false,
        '-' => true,
        _ => return None,
    };
    if chars.next().is_some() || usize::from(dimension) >= MAX_DIMENSIONS {
        return None;
    }
    Some(Axis::new(dimension, negative))
}

fn to_name_or_err(token: &str) -> Result<Name, AssemblerError> {
    to_name(token).ok_or_else(|| AssemblerErrorKind::NameTooLong(token.to_string()).into())
}
