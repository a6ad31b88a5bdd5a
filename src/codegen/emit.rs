//! Traducción de un flujo de instrucciones a ensamblador.

use std::{
    collections::HashSet,
    io::{self, Write},
};

use crate::{
    arch::{Arch, Builtin, Emitter, StomachBuiltin},
    ir::{Address, Buffer, Instruction, Region, Stream},
};

/// Estado compartido de emisión.
pub struct Context<'a> {
    output: &'a mut dyn Write,
    targets: HashSet<Address>,
    stomachs: Vec<u32>,
}

impl<'a> Context<'a> {
    /// Flujo de salida de ensamblador.
    pub fn output(&mut self) -> &mut dyn Write {
        &mut *self.output
    }

    /// Símbolo local para una dirección del flujo.
    pub fn label(&self, Address(address): Address) -> String {
        format!(".Lprrt.{}", address)
    }

    /// Tamaños de los estómagos con nombre, indexados por región.
    pub fn stomachs(&self) -> &[u32] {
        &self.stomachs
    }

    /// Símbolo local para el almacenamiento de un estómago.
    pub fn stomach(&self, Region(region): Region) -> String {
        format!(".Lprrt.stomach.{}", region)
    }

    /// Tamaño de un estómago, que debe estar declarado en el flujo.
    pub fn stomach_size(&self, region: Region) -> io::Result<u32> {
        self.stomachs.get(region.0 as usize).copied().ok_or_else(|| {
            let message = format!("{} is not declared by the stream", region);
            io::Error::new(io::ErrorKind::InvalidInput, message)
        })
    }
}

/// Emite ensamblador para un flujo completo.
///
/// El código resultante define `main` y solo invoca símbolos de
/// `libruntime`, contra la cual debe enlazarse.
pub fn emit(stream: &Stream, arch: Arch, output: &mut dyn Write) -> io::Result<()> {
    // Solo se emiten etiquetas para direcciones que son destino de salto
    let targets = stream
        .instructions()
        .iter()
        .filter_map(|instruction| match instruction {
            Instruction::Jump(to) | Instruction::Branch { to, .. } => Some(*to),
            _ => None,
        })
        .collect();

    let cx = Context {
        output,
        targets,
        stomachs: stream.stomachs().to_vec(),
    };

    dispatch_arch!(Target: arch => {
        let mut emitter = Target::new(cx)?;
        for (address, instruction) in stream.instructions().iter().enumerate() {
            put_instruction(&mut emitter, Address(address), instruction)?;
        }

        emitter.epilogue()
    })
}

fn put_instruction<'a, E: Emitter<'a>>(
    emitter: &mut E,
    address: Address,
    instruction: &Instruction,
) -> io::Result<()> {
    use Instruction::*;

    let cx = emitter.cx();
    if cx.targets.contains(&address) {
        let label = cx.label(address);
        writeln!(cx.output(), "{}:", label)?;
    }

    match instruction {
        Mark(marker) => writeln!(emitter.cx().output(), "\t# {}", marker),
        MoveRight => emitter.move_right(),
        MoveLeft => emitter.move_left(),
        ResetPointer => emitter.reset_pointer(),
        Arith { op, into, with } => emitter.arith(*op, *into, *with),
        Store(slot, value) => emitter.store(*slot, *value),
        Input(slot) => emitter.call_builtin(Builtin::Gulp, *slot),
        Output(slot) => emitter.call_builtin(Builtin::Squawk, *slot),
        OutputByte(byte) => emitter.emit_byte(*byte),
        ReadLine(Buffer::Tape(slot)) => emitter.call_builtin(Builtin::Devour, *slot),
        ReadLine(Buffer::Stomach(region)) => emitter.call_stomach(StomachBuiltin::Devour, *region),
        PrintString(Buffer::Tape(slot)) => emitter.call_builtin(Builtin::Regurgitate, *slot),
        PrintString(Buffer::Stomach(region)) => {
            emitter.call_stomach(StomachBuiltin::Regurgitate, *region)
        }

        StoreStomach {
            region,
            offset,
            byte,
        } => emitter.store_stomach(*region, *offset, *byte),

        // La cinta de libruntime crece a demanda
        Reserve(size) => writeln!(emitter.cx().output(), "\t# reserve {}", size),

        Jump(to) => {
            let label = emitter.cx().label(*to);
            emitter.jump(&label)
        }

        Branch {
            left,
            op,
            right,
            to,
        } => {
            let label = emitter.cx().label(*to);
            emitter.branch(*left, *op, *right, &label)
        }

        Sleep(seconds) => emitter.sleep(*seconds),
        Halt => emitter.halt(),
    }
}
