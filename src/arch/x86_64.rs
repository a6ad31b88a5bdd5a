use crate::{
    codegen::Context,
    ir::{ArithOp, Comparison, Fault, Operand, Region, Slot},
};

use super::{Builtin, StomachBuiltin};
use std::io;

// Destinos de fallas en tiempo de ejecución
const UNDERFLOW: &str = ".Lprrt.underflow";
const DIVISION_BY_ZERO: &str = ".Lprrt.divzero";

/* Registros:
 * - %rbx: puntero de datos (índice de celda)
 * - %r12: operando derecho de aritmética y comparaciones
 * - %rdi, %rsi: argumentos hacia libruntime
 * - %eax: valor de trabajo
 *
 * %rbx y %r12 son callee-saved según la ABI System V, por lo cual
 * sobreviven a las llamadas hacia libruntime.
 */
pub struct Emitter<'a> {
    cx: Context<'a>,
}

impl<'a> super::Emitter<'a> for Emitter<'a> {
    fn new(mut cx: Context<'a>) -> io::Result<Self> {
        writeln!(cx.output(), ".text")?;
        writeln!(cx.output(), ".globl main")?;
        writeln!(cx.output(), ".type main, @function")?;
        writeln!(cx.output(), "main:")?;

        // Prólogo; tras los tres push la pila queda alineada a 16 bytes
        emit!(cx, "push", "%rbp")?;
        emit!(cx, "mov", "%rsp, %rbp")?;
        emit!(cx, "push", "%rbx")?;
        emit!(cx, "push", "%r12")?;
        emit!(cx, "xor", "%ebx, %ebx")?;

        Ok(Emitter { cx })
    }

    fn epilogue(mut self) -> io::Result<()> {
        for (label, fault) in [
            (UNDERFLOW, Fault::IndexUnderflow),
            (DIVISION_BY_ZERO, Fault::DivisionByZero),
        ] {
            writeln!(self.cx.output(), "{}:", label)?;
            emit!(self.cx, "mov", "${}, %edi", fault.code())?;
            self.call("parrot_fault")?;
        }

        writeln!(self.cx.output(), ".size main, .-main")?;

        let stomachs = self.cx.stomachs().to_vec();
        if !stomachs.is_empty() {
            writeln!(self.cx.output(), ".bss")?;
        }

        for (index, size) in stomachs.into_iter().enumerate() {
            let symbol = self.cx.stomach(Region(index as u32));
            writeln!(self.cx.output(), "{}:", symbol)?;
            emit!(self.cx, ".zero", "{}", size)?;
        }

        writeln!(self.cx.output(), ".section .note.GNU-stack,\"\",@progbits")
    }

    fn cx(&mut self) -> &mut Context<'a> {
        &mut self.cx
    }

    fn move_right(&mut self) -> io::Result<()> {
        emit!(self.cx, "inc", "%rbx")
    }

    fn move_left(&mut self) -> io::Result<()> {
        emit!(self.cx, "test", "%rbx, %rbx")?;
        emit!(self.cx, "jz", "{}", UNDERFLOW)?;
        emit!(self.cx, "dec", "%rbx")
    }

    fn reset_pointer(&mut self) -> io::Result<()> {
        emit!(self.cx, "xor", "%ebx, %ebx")
    }

    fn arith(&mut self, op: ArithOp, into: Slot, with: Operand) -> io::Result<()> {
        self.load(with)?;
        emit!(self.cx, "mov", "%eax, %r12d")?;
        self.load(Operand::Cell(into))?;

        match op {
            ArithOp::Add => emit!(self.cx, "add", "%r12d, %eax")?,
            ArithOp::Sub => emit!(self.cx, "sub", "%r12d, %eax")?,
            ArithOp::Mul => emit!(self.cx, "imul", "%r12d, %eax")?,
            ArithOp::Div => {
                emit!(self.cx, "test", "%r12d, %r12d")?;
                emit!(self.cx, "jz", "{}", DIVISION_BY_ZERO)?;
                emit!(self.cx, "xor", "%edx, %edx")?;
                emit!(self.cx, "div", "%r12d")?;
            }
        }

        // Solo el byte bajo se almacena, de ahí la aritmética módulo 256
        emit!(self.cx, "movzbl", "%al, %esi")?;
        self.slot_address(into)?;
        self.call("parrot_store")
    }

    fn store(&mut self, slot: Slot, value: Operand) -> io::Result<()> {
        self.load(value)?;
        emit!(self.cx, "mov", "%eax, %esi")?;
        self.slot_address(slot)?;
        self.call("parrot_store")
    }

    fn call_builtin(&mut self, builtin: Builtin, slot: Slot) -> io::Result<()> {
        self.slot_address(slot)?;
        self.call(builtin.symbol())
    }

    fn emit_byte(&mut self, byte: u8) -> io::Result<()> {
        emit!(self.cx, "mov", "${}, %edi", byte)?;
        self.call("parrot_emit")
    }

    fn call_stomach(&mut self, builtin: StomachBuiltin, region: Region) -> io::Result<()> {
        let size = self.cx.stomach_size(region)?;
        let symbol = self.cx.stomach(region);

        emit!(self.cx, "lea", "{}(%rip), %rdi", symbol)?;
        emit!(self.cx, "mov", "${}, %esi", size)?;
        self.call(builtin.symbol())
    }

    fn store_stomach(&mut self, region: Region, offset: u32, byte: u8) -> io::Result<()> {
        let symbol = self.cx.stomach(region);
        emit!(self.cx, "movb", "${}, {}+{}(%rip)", byte, symbol, offset)
    }

    fn jump(&mut self, label: &str) -> io::Result<()> {
        emit!(self.cx, "jmp", "{}", label)
    }

    fn branch(&mut self, left: Operand, op: Comparison, right: Operand, label: &str) -> io::Result<()> {
        self.load(right)?;
        emit!(self.cx, "mov", "%eax, %r12d")?;
        self.load(left)?;
        emit!(self.cx, "cmp", "%r12d, %eax")?;

        // Las celdas no tienen signo: below/above en vez de less/greater
        let jump = match op {
            Comparison::Equal => "je",
            Comparison::NotEqual => "jne",
            Comparison::Less => "jb",
            Comparison::LessOrEqual => "jbe",
            Comparison::Greater => "ja",
            Comparison::GreaterOrEqual => "jae",
        };

        emit!(self.cx, jump, "{}", label)
    }

    fn sleep(&mut self, seconds: u32) -> io::Result<()> {
        emit!(self.cx, "mov", "${}, %edi", seconds)?;
        self.call("parrot_bob")
    }

    fn halt(&mut self) -> io::Result<()> {
        self.call("parrot_perish")
    }
}

impl Emitter<'_> {
    /// Coloca el índice absoluto de una celda en `%rdi`.
    fn slot_address(&mut self, slot: Slot) -> io::Result<()> {
        match slot {
            Slot::Relative(0) => emit!(self.cx, "mov", "%rbx, %rdi"),
            Slot::Relative(offset) => {
                emit!(self.cx, "mov", "${}, %edi", offset)?;
                emit!(self.cx, "add", "%rbx, %rdi")
            }

            // Un mov a un registro de 32 bits extiende con ceros
            Slot::Absolute(index) => emit!(self.cx, "mov", "${}, %edi", index),
        }
    }

    /// Carga un operando en `%eax`.
    fn load(&mut self, operand: Operand) -> io::Result<()> {
        match operand {
            Operand::Const(value) => emit!(self.cx, "mov", "${}, %eax", value),
            Operand::Cell(slot) => {
                self.slot_address(slot)?;
                self.call("parrot_load")?;
                emit!(self.cx, "movzbl", "%al, %eax")
            }
        }
    }

    fn call(&mut self, symbol: &str) -> io::Result<()> {
        emit!(self.cx, "call", "{}@PLT", symbol)
    }
}
