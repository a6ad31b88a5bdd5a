//! Máquina de referencia.
//!
//! Intérprete directo de un [`Stream`]. Implementa exactamente el mismo
//! contrato de cinta que `libruntime`:
//!
//! - La cinta es un arreglo de bytes sin límite a la derecha, inicialmente
//!   en cero, con el puntero en la celda 0.
//! - Cada estómago con nombre es un búfer propio de tamaño fijo, fuera
//!   de la cinta e inicialmente en cero.
//! - La lectura es de un byte y el fin de la entrada se lee como 0.
//! - Mover el puntero a la izquierda de la celda 0 y dividir entre cero
//!   son fallas que terminan el programa.
//!
//! Esta máquina se utiliza en pruebas y en el modo `--run` del driver.

use std::{
    io::{self, Read, Write},
    thread,
    time::Duration,
};

use log::debug;
use thiserror::Error;

use crate::ir::{Address, Buffer, Fault, Instruction, Operand, Region, Slot, Stream};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum MachineError {
    /// Falla del programa en ejecución.
    #[error("Runtime fault: {0}")]
    Fault(#[from] Fault),

    /// Error de E/S en los flujos de la máquina.
    #[error("I/O error")]
    Io(#[from] io::Error),

    /// Se agotó el límite de instrucciones de [`Machine::with_fuel()`].
    #[error("Execution limit of {0} instructions exhausted")]
    OutOfFuel(u64),
}

/// Intérprete de flujos de instrucciones.
pub struct Machine<R, W> {
    tape: Vec<u8>,
    pointer: usize,
    stomachs: Vec<Vec<u8>>,
    input: R,
    output: W,
    sleeper: Box<dyn FnMut(Duration)>,
    fuel: Option<u64>,
}

impl<R: Read, W: Write> Machine<R, W> {
    /// Crea una máquina con cinta vacía sobre los flujos dados.
    pub fn new(input: R, output: W) -> Self {
        Machine {
            tape: Vec::new(),
            pointer: 0,
            stomachs: Vec::new(),
            input,
            output,
            sleeper: Box::new(thread::sleep),
            fuel: None,
        }
    }

    /// Reemplaza la forma en que se suspende la ejecución en `bob`.
    pub fn with_sleeper<F>(self, sleeper: F) -> Self
    where
        F: FnMut(Duration) + 'static,
    {
        Machine {
            sleeper: Box::new(sleeper),
            ..self
        }
    }

    /// Limita la cantidad de instrucciones a ejecutar.
    pub fn with_fuel(self, steps: u64) -> Self {
        Machine {
            fuel: Some(steps),
            ..self
        }
    }

    /// Contenido actual de la cinta.
    ///
    /// Las celdas más allá del final nunca se han escrito y valen 0.
    pub fn tape(&self) -> &[u8] {
        &self.tape
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    /// Contenido escrito de un estómago con nombre.
    ///
    /// Igual que en la cinta, los bytes más allá del final valen 0.
    pub fn stomach(&self, Region(region): Region) -> &[u8] {
        self.stomachs.get(region as usize).map_or(&[][..], Vec::as_slice)
    }

    /// Descarta la máquina y recupera el flujo de salida.
    pub fn into_output(self) -> W {
        self.output
    }

    /// Ejecuta un flujo hasta `Halt`, una falla o el final del flujo.
    pub fn run(&mut self, stream: &Stream) -> Result<(), MachineError> {
        let result = self.execute(stream);
        self.output.flush()?;

        result
    }

    fn execute(&mut self, stream: &Stream) -> Result<(), MachineError> {
        use Instruction::*;

        let mut next = 0;
        let mut steps = 0u64;

        // Los estómagos crecen a demanda, nunca más allá de su tamaño declarado
        let sizes = stream.stomachs();
        self.stomachs.resize(sizes.len(), Vec::new());
        let size_of = |Region(region): Region| sizes.get(region as usize).copied().unwrap_or(0);

        while let Some(instruction) = stream.get(Address(next)) {
            if let Some(limit) = self.fuel {
                if steps == limit {
                    return Err(MachineError::OutOfFuel(limit));
                }
            }

            steps += 1;
            next += 1;

            match instruction {
                Mark(_) => (),

                MoveRight => self.pointer += 1,
                MoveLeft => {
                    self.pointer = self.pointer.checked_sub(1).ok_or(Fault::IndexUnderflow)?;
                }

                ResetPointer => self.pointer = 0,

                Arith { op, into, with } => {
                    let right = self.value(*with);
                    let left = self.load(*into);
                    let result = op.apply(left, right)?;
                    self.store(*into, result);
                }

                Store(slot, value) => {
                    let value = self.value(*value);
                    self.store(*slot, value);
                }

                Input(slot) => {
                    let byte = self.read_byte()?.unwrap_or(0);
                    self.store(*slot, byte);
                }

                Output(slot) => {
                    let byte = self.load(*slot);
                    self.output.write_all(&[byte])?;
                }

                OutputByte(byte) => self.output.write_all(&[*byte])?,

                ReadLine(Buffer::Tape(slot)) => self.read_line(*slot)?,
                ReadLine(Buffer::Stomach(region)) => self.devour_stomach(*region, size_of(*region))?,

                PrintString(Buffer::Tape(slot)) => {
                    let start = self.index(*slot);
                    let bytes = string_at(&self.tape, start);
                    self.output.write_all(bytes)?;
                    self.output.write_all(b"\n")?;
                }

                PrintString(Buffer::Stomach(Region(region))) => {
                    let stomach = self.stomachs.get(*region as usize).map_or(&[][..], Vec::as_slice);
                    let bytes = string_at(stomach, 0);
                    self.output.write_all(bytes)?;
                    self.output.write_all(b"\n")?;
                }

                StoreStomach {
                    region,
                    offset,
                    byte,
                } => {
                    if *offset < size_of(*region) {
                        store_at(self.stomach_mut(*region), *offset as usize, *byte);
                    }
                }

                // La cinta ya es direccionable en cualquier celda
                Reserve(_) => (),

                Jump(Address(to)) => next = *to,

                Branch { left, op, right, to } => {
                    if op.holds(self.value(*left), self.value(*right)) {
                        next = to.0;
                    }
                }

                Sleep(seconds) => {
                    self.output.flush()?;
                    (self.sleeper)(Duration::from_secs(u64::from(*seconds)));
                }

                Halt => break,
            }
        }

        debug!("Machine stopped after {} instructions", steps);
        Ok(())
    }

    fn index(&self, slot: Slot) -> usize {
        // Un desbordamiento de usize no es alcanzable con celdas u32
        slot.resolve(self.pointer).unwrap_or(usize::MAX)
    }

    fn load(&self, slot: Slot) -> u8 {
        self.tape.get(self.index(slot)).copied().unwrap_or(0)
    }

    fn store(&mut self, slot: Slot, value: u8) {
        let index = self.index(slot);
        store_at(&mut self.tape, index, value);
    }

    fn stomach_mut(&mut self, Region(region): Region) -> &mut Vec<u8> {
        let region = region as usize;
        if region >= self.stomachs.len() {
            self.stomachs.resize(region + 1, Vec::new());
        }

        &mut self.stomachs[region]
    }

    fn value(&self, operand: Operand) -> u8 {
        match operand {
            Operand::Cell(slot) => self.load(slot),
            Operand::Const(value) => value,
        }
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        self.output.flush()?;

        let mut byte = [0];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            }
        }
    }

    /// Lee hasta fin de línea o de entrada y agrega un centinela 0.
    fn read_line(&mut self, slot: Slot) -> io::Result<()> {
        let mut offset = 0;
        while let Some(byte) = self.read_byte()? {
            if byte == b'\n' {
                break;
            }

            self.store(offset_slot(slot, offset), byte);
            offset += 1;
        }

        self.store(offset_slot(slot, offset), 0);
        Ok(())
    }

    /// Lee una línea a un estómago de `size` bytes.
    ///
    /// Se conservan a lo sumo `size - 1` bytes seguidos del centinela; el
    /// resto de la línea se consume y se descarta.
    fn devour_stomach(&mut self, region: Region, size: u32) -> io::Result<()> {
        let capacity = size.saturating_sub(1) as usize;

        let mut line = Vec::new();
        while let Some(byte) = self.read_byte()? {
            if byte == b'\n' {
                break;
            } else if line.len() < capacity {
                line.push(byte);
            }
        }

        if size > 0 {
            let stomach = self.stomach_mut(region);
            let end = line.len();

            for (offset, byte) in line.into_iter().enumerate() {
                store_at(stomach, offset, byte);
            }

            store_at(stomach, end, 0);
        }

        Ok(())
    }
}

fn offset_slot(slot: Slot, offset: u32) -> Slot {
    slot.offset(offset).unwrap_or(slot)
}

fn store_at(bytes: &mut Vec<u8>, index: usize, value: u8) {
    if index >= bytes.len() {
        bytes.resize(index + 1, 0);
    }

    bytes[index] = value;
}

/// Bytes desde `start` hasta el primer 0 o el final de lo escrito.
fn string_at(bytes: &[u8], start: usize) -> &[u8] {
    let tail = bytes.get(start..).unwrap_or(&[]);
    let length = tail.iter().position(|&byte| byte == 0).unwrap_or(tail.len());

    &tail[..length]
}
