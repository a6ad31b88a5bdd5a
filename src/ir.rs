//! Representación intermedia.
//!
//! La generación de código reduce el árbol resuelto a un flujo lineal de
//! instrucciones ([`Stream`]). Los destinos de salto son índices dentro
//! del mismo flujo ([`Address`]), por lo cual el flujo es autocontenido:
//! puede ejecutarse directamente en [`crate::machine`] o traducirse a
//! ensamblador en [`crate::target`].

use std::fmt::{self, Display};
use thiserror::Error;

use crate::lex::Identifier;

pub use crate::lex::Comparison;

/// Identidad de una etiqueta (`perch`) resuelta.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

/// Índice de una instrucción dentro de un [`Stream`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address(pub usize);

/// Una celda de la cinta, vista desde el código generado.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    /// Desplazamiento hacia la derecha desde el puntero.
    ///
    /// `Relative(0)` es la celda bajo el puntero (`bowl`).
    Relative(u32),

    /// Índice absoluto de celda.
    Absolute(u32),
}

impl Slot {
    /// Celda bajo el puntero.
    pub const BOWL: Slot = Slot::Relative(0);

    /// Resuelve el índice absoluto de la celda dado el puntero actual.
    ///
    /// Retorna `None` si el índice no es representable.
    pub fn resolve(self, pointer: usize) -> Option<usize> {
        match self {
            Slot::Relative(offset) => pointer.checked_add(offset as usize),
            Slot::Absolute(index) => Some(index as usize),
        }
    }

    /// La celda `count` posiciones a la derecha de esta.
    pub fn offset(self, count: u32) -> Option<Slot> {
        match self {
            Slot::Relative(offset) => offset.checked_add(count).map(Slot::Relative),
            Slot::Absolute(index) => index.checked_add(count).map(Slot::Absolute),
        }
    }
}

/// Estómago con nombre: un búfer fijo fuera de la cinta.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Region(pub u32);

/// Origen o destino de una cadena terminada en 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Buffer {
    Tape(Slot),
    Stomach(Region),
}

/// Operando de una instrucción.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Cell(Slot),
    Const(u8),
}

/// Operación aritmética sobre celdas.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    /// Aplica la operación con aritmética módulo 256.
    ///
    /// La división es entera sin signo. Dividir entre cero es un
    /// [`Fault::DivisionByZero`].
    pub fn apply(self, left: u8, right: u8) -> Result<u8, Fault> {
        use ArithOp::*;

        match self {
            Add => Ok(left.wrapping_add(right)),
            Sub => Ok(left.wrapping_sub(right)),
            Mul => Ok(left.wrapping_mul(right)),
            Div => left.checked_div(right).ok_or(Fault::DivisionByZero),
        }
    }

    /// Determina si la operación emite la celda resultante.
    pub fn squawks(self) -> bool {
        matches!(self, ArithOp::Mul | ArithOp::Div)
    }
}

impl Display for ArithOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ArithOp::*;

        let string = match self {
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
        };

        fmt.write_str(string)
    }
}

/// Marcadores de región. No tienen efecto en ejecución.
#[derive(Clone, Debug, PartialEq)]
pub enum Marker {
    LoopHead(u32),
    LoopExit(u32),
    Perch { label: Label, name: Identifier },
    PerchEnd(Label),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Mark(Marker),
    MoveRight,
    MoveLeft,
    ResetPointer,
    Arith {
        op: ArithOp,
        into: Slot,
        with: Operand,
    },
    Store(Slot, Operand),
    Input(Slot),
    Output(Slot),
    OutputByte(u8),
    ReadLine(Buffer),
    PrintString(Buffer),
    StoreStomach {
        region: Region,
        offset: u32,
        byte: u8,
    },
    /// Reserva celdas de la cinta. La cinta ya es direccionable en
    /// cualquier posición, así que no altera su contenido.
    Reserve(u32),
    Jump(Address),
    Branch {
        left: Operand,
        op: Comparison,
        right: Operand,
        to: Address,
    },
    Sleep(u32),
    Halt,
}

/// Flujo lineal de instrucciones con direcciones ya resueltas.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stream {
    instructions: Vec<Instruction>,
    stomachs: Vec<u32>,
}

impl Stream {
    pub(crate) fn new(instructions: Vec<Instruction>) -> Self {
        Stream {
            instructions,
            stomachs: Vec::new(),
        }
    }

    pub(crate) fn with_stomachs(self, stomachs: Vec<u32>) -> Self {
        Stream { stomachs, ..self }
    }

    /// Tamaño en bytes de cada estómago con nombre, indexado por [`Region`].
    pub fn stomachs(&self) -> &[u32] {
        &self.stomachs
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn get(&self, Address(address): Address) -> Option<&Instruction> {
        self.instructions.get(address)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Falla en tiempo de ejecución de un programa generado.
///
/// Los códigos de [`Fault::code()`] son parte del ABI con `libruntime`.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    #[error("Pointer moved left of cell 0")]
    IndexUnderflow,

    #[error("Division by zero")]
    DivisionByZero,
}

impl Fault {
    pub fn code(self) -> u32 {
        match self {
            Fault::IndexUnderflow => 1,
            Fault::DivisionByZero => 2,
        }
    }
}

impl Display for Slot {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Relative(offset) => write!(fmt, "[ptr+{}]", offset),
            Slot::Absolute(index) => write!(fmt, "[#{}]", index),
        }
    }
}

impl Display for Region {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "stomach.{}", self.0)
    }
}

impl Display for Buffer {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Buffer::Tape(slot) => write!(fmt, "{}", slot),
            Buffer::Stomach(region) => write!(fmt, "{}", region),
        }
    }
}

impl Display for Operand {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Cell(slot) => write!(fmt, "{}", slot),
            Operand::Const(value) => write!(fmt, "{}", value),
        }
    }
}

impl Display for Address {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "@{:04}", self.0)
    }
}

impl Display for Marker {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::LoopHead(index) => write!(fmt, "loop.{}", index),
            Marker::LoopExit(index) => write!(fmt, "end.loop.{}", index),
            Marker::Perch { label, name } => write!(fmt, "perch.{} ({})", label.0, name),
            Marker::PerchEnd(label) => write!(fmt, "end.perch.{}", label.0),
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        match self {
            Mark(marker) => write!(fmt, "{}:", marker),
            MoveRight => write!(fmt, "\tright"),
            MoveLeft => write!(fmt, "\tleft"),
            ResetPointer => write!(fmt, "\treset"),
            Arith { op, into, with } => write!(fmt, "\t{} {}, {}", op, into, with),
            Store(slot, value) => write!(fmt, "\tstore {}, {}", slot, value),
            Input(slot) => write!(fmt, "\tinput {}", slot),
            Output(slot) => write!(fmt, "\toutput {}", slot),
            OutputByte(byte) => write!(fmt, "\temit {:#04x}", byte),
            ReadLine(buffer) => write!(fmt, "\treadline {}", buffer),
            PrintString(buffer) => write!(fmt, "\tprint {}", buffer),
            StoreStomach {
                region,
                offset,
                byte,
            } => write!(fmt, "\tstore {}[{}], {:#04x}", region, offset, byte),
            Reserve(size) => write!(fmt, "\treserve {}", size),
            Jump(to) => write!(fmt, "\tjump {}", to),
            Branch { left, op, right, to } => {
                write!(fmt, "\tbranch {} {} {}, {}", left, op, right, to)
            }
            Sleep(seconds) => write!(fmt, "\tsleep {}", seconds),
            Halt => write!(fmt, "\thalt"),
        }
    }
}

impl Display for Stream {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, size) in self.stomachs.iter().enumerate() {
            writeln!(fmt, "{}  {} bytes", Region(index as u32), size)?;
        }

        for (address, instruction) in self.instructions.iter().enumerate() {
            writeln!(fmt, "{:04}  {}", address, instruction)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_wraps() {
        assert_eq!(ArithOp::Add.apply(255, 1), Ok(0));
        assert_eq!(ArithOp::Sub.apply(0, 1), Ok(255));
        assert_eq!(ArithOp::Mul.apply(16, 17), Ok(16));
        assert_eq!(ArithOp::Div.apply(7, 2), Ok(3));
        assert_eq!(ArithOp::Div.apply(7, 0), Err(Fault::DivisionByZero));
    }

    #[test]
    fn only_mul_and_div_squawk() {
        assert!(!ArithOp::Add.squawks());
        assert!(!ArithOp::Sub.squawks());
        assert!(ArithOp::Mul.squawks());
        assert!(ArithOp::Div.squawks());
    }

    #[test]
    fn slots_resolve_against_pointer() {
        assert_eq!(Slot::BOWL.resolve(7), Some(7));
        assert_eq!(Slot::Relative(3).resolve(7), Some(10));
        assert_eq!(Slot::Absolute(2).resolve(7), Some(2));
        assert_eq!(Slot::Absolute(u32::MAX).offset(1), None);
    }

    #[test]
    fn listing() {
        let stream = Stream::new(vec![
            Instruction::Mark(Marker::LoopHead(0)),
            Instruction::Arith {
                op: ArithOp::Add,
                into: Slot::BOWL,
                with: Operand::Const(1),
            },
            Instruction::Branch {
                left: Operand::Cell(Slot::Absolute(3)),
                op: Comparison::GreaterOrEqual,
                right: Operand::Const(10),
                to: Address(0),
            },
            Instruction::Halt,
        ]);

        let listing = stream.to_string();
        assert_eq!(
            listing,
            "0000  loop.0:\n\
             0001  \tadd [ptr+0], 1\n\
             0002  \tbranch [#3] >= 10, @0000\n\
             0003  \thalt\n"
        );
    }

    #[test]
    fn listing_names_stomachs() {
        let stream = Stream::new(vec![
            Instruction::StoreStomach {
                region: Region(0),
                offset: 1,
                byte: b'i',
            },
            Instruction::PrintString(Buffer::Stomach(Region(0))),
            Instruction::ReadLine(Buffer::Tape(Slot::BOWL)),
        ])
        .with_stomachs(vec![4]);

        assert_eq!(stream.stomachs(), &[4]);
        assert_eq!(
            stream.to_string(),
            "stomach.0  4 bytes\n\
             0000  \tstore stomach.0[1], 0x69\n\
             0001  \tprint stomach.0\n\
             0002  \treadline [ptr+0]\n"
        );
    }
}
