//! Detalles específicos para cada arquitectura objetivo.
//!
//! Este módulo expone interfaces de generación de código
//! que son implementadas por sus propios submódulos. En general,
//! debe utilizarse la macro `dispatch_arch!()` para acceder a estas
//! implementaciones.

use crate::{
    codegen::Context,
    ir::{ArithOp, Comparison, Operand, Region, Slot},
};

use std::io;

/// Arquitectura de procesador (ISA).
#[derive(Copy, Clone, Debug)]
pub enum Arch {
    X86_64,
}

mod x86_64;

pub use x86_64::Emitter as X86_64;

/// Funciones de `libruntime` que reciben una celda como único argumento.
#[derive(Copy, Clone, Debug)]
pub enum Builtin {
    Gulp,
    Squawk,
    Devour,
    Regurgitate,
}

impl Builtin {
    /// Símbolo exportado por `libruntime`.
    pub fn symbol(self) -> &'static str {
        match self {
            Builtin::Gulp => "parrot_gulp",
            Builtin::Squawk => "parrot_squawk",
            Builtin::Devour => "parrot_devour",
            Builtin::Regurgitate => "parrot_regurgitate",
        }
    }
}

/// Funciones de `libruntime` que operan sobre un estómago con nombre.
///
/// Reciben la dirección del estómago y su tamaño en bytes.
#[derive(Copy, Clone, Debug)]
pub enum StomachBuiltin {
    Devour,
    Regurgitate,
}

impl StomachBuiltin {
    pub fn symbol(self) -> &'static str {
        match self {
            StomachBuiltin::Devour => "parrot_devour_stomach",
            StomachBuiltin::Regurgitate => "parrot_regurgitate_stomach",
        }
    }
}

/// Emisión de código ensamblador para un programa.
///
/// Los tipos que implementa ese trait traducen instrucciones del
/// lenguaje intermedio a código máquina para la arquitectura objetivo.
/// El puntero de datos vive en un registro que debe sobrevivir a las
/// llamadas a `libruntime`.
pub trait Emitter<'a>: Sized {
    /// Construir a partir de un contexto de emisión.
    ///
    /// Además de construirse, el prólogo del punto de entrada debe
    /// emitirse aquí, inicializando el puntero en la celda 0.
    fn new(cx: Context<'a>) -> io::Result<Self>;

    /// Emite el epílogo, terminando el listado de código.
    fn epilogue(self) -> io::Result<()>;

    /// Obtiene el contexto de emisión.
    ///
    /// Implicado aquí que todo `Emitter` debe guardar as-is el [`Context`]
    /// que se le otorga en [`Emitter::new()`].
    fn cx(&mut self) -> &mut Context<'a>;

    /// Mueve el puntero una celda a la derecha.
    fn move_right(&mut self) -> io::Result<()>;

    /// Mueve el puntero una celda a la izquierda, fallando en la celda 0.
    fn move_left(&mut self) -> io::Result<()>;

    /// Regresa el puntero a la celda 0.
    fn reset_pointer(&mut self) -> io::Result<()>;

    /// `into = into <op> with`, módulo 256.
    fn arith(&mut self, op: ArithOp, into: Slot, with: Operand) -> io::Result<()>;

    /// Copia un operando a una celda.
    fn store(&mut self, slot: Slot, value: Operand) -> io::Result<()>;

    /// Invoca a una función de `libruntime` con la dirección de una celda.
    fn call_builtin(&mut self, builtin: Builtin, slot: Slot) -> io::Result<()>;

    /// Invoca a una función de `libruntime` sobre un estómago.
    fn call_stomach(&mut self, builtin: StomachBuiltin, region: Region) -> io::Result<()>;

    /// Escribe un byte constante en un estómago.
    fn store_stomach(&mut self, region: Region, offset: u32, byte: u8) -> io::Result<()>;

    /// Escribe un byte constante a la salida.
    fn emit_byte(&mut self, byte: u8) -> io::Result<()>;

    /// Saltar incondicionalmente a una etiqueta.
    fn jump(&mut self, label: &str) -> io::Result<()>;

    /// Saltar a una etiqueta si se cumple una comparación sin signo.
    fn branch(&mut self, left: Operand, op: Comparison, right: Operand, label: &str) -> io::Result<()>;

    /// Suspende la ejecución por una cantidad de segundos.
    fn sleep(&mut self, seconds: u32) -> io::Result<()>;

    /// Termina el programa exitosamente.
    fn halt(&mut self) -> io::Result<()>;
}
