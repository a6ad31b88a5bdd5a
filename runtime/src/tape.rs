//! La cinta de datos.

use std::sync::{Mutex, PoisonError};

use lazy_static::lazy_static;

lazy_static! {
    static ref TAPE: Mutex<Tape> = Mutex::new(Tape::default());
}

/// Ejecuta `callback` con acceso exclusivo a la cinta del programa.
pub fn with_tape<F, R>(callback: F) -> R
where
    F: FnOnce(&mut Tape) -> R,
{
    // Una falla ya terminó el proceso, así que un mutex envenenado no es relevante
    let mut tape = TAPE.lock().unwrap_or_else(PoisonError::into_inner);
    callback(&mut tape)
}

/// Arreglo de bytes que crece bajo demanda.
///
/// Las celdas que nunca se han escrito no ocupan memoria y se leen
/// como 0.
#[derive(Default)]
pub struct Tape {
    cells: Vec<u8>,
}

impl Tape {
    pub fn get(&self, index: usize) -> u8 {
        self.cells.get(index).copied().unwrap_or(0)
    }

    pub fn set(&mut self, index: usize, value: u8) {
        if index >= self.cells.len() {
            self.cells.resize(index + 1, 0);
        }

        self.cells[index] = value;
    }

    /// Bytes a partir de `from` y hasta antes del primer 0.
    pub fn string(&self, from: usize) -> &[u8] {
        string(&self.cells, from)
    }
}

/// Cadena terminada en 0 dentro de `bytes`, o hasta su final.
pub fn string(bytes: &[u8], from: usize) -> &[u8] {
    let tail = bytes.get(from..).unwrap_or(&[]);
    let length = tail.iter().position(|&byte| byte == 0).unwrap_or(tail.len());

    &tail[..length]
}

/// Llena `stomach` con una línea, truncada para dejar lugar al 0 final.
///
/// El resto de una línea demasiado larga se consume y se descarta. El
/// fin de línea no se almacena.
pub fn fill_line<I>(stomach: &mut [u8], bytes: I)
where
    I: IntoIterator<Item = u8>,
{
    let capacity = stomach.len().saturating_sub(1);

    let mut length = 0;
    for byte in bytes.into_iter().take_while(|&byte| byte != b'\n') {
        if length < capacity {
            stomach[length] = byte;
            length += 1;
        }
    }

    if let Some(end) = stomach.get_mut(length) {
        *end = 0;
    }
}
