//! Interfaz pública.
//!
//! Las funciones en este módulo están diseñadas para ser
//! invocadas en la forma descrita en la documentación
//! top-level de este crate. Es necesario que todas sean
//! tanto `#[no_mangle]` como `extern "C"`.
//!
//! Los índices de celda son absolutos: el código generado
//! suma el puntero de datos antes de invocar estas funciones.

use std::slice;

use crate::{
    sys,
    tape::{self, with_tape},
};

/// Código de falla para un puntero a la izquierda de la celda 0.
pub const FAULT_INDEX_UNDERFLOW: u32 = 1;

/// Código de falla para una división entre cero.
pub const FAULT_DIVISION_BY_ZERO: u32 = 2;

#[no_mangle]
pub extern "C" fn parrot_load(index: usize) -> u8 {
    with_tape(|tape| tape.get(index))
}

#[no_mangle]
pub extern "C" fn parrot_store(index: usize, value: u8) {
    with_tape(|tape| tape.set(index, value));
}

/// Lee un byte a una celda. El final de la entrada se lee como 0.
#[no_mangle]
pub extern "C" fn parrot_gulp(index: usize) {
    let byte = sys::read_byte().unwrap_or(0);
    parrot_store(index, byte);
}

/// Escribe una celda como un byte crudo.
#[no_mangle]
pub extern "C" fn parrot_squawk(index: usize) {
    sys::write(&[parrot_load(index)]);
}

#[no_mangle]
pub extern "C" fn parrot_emit(byte: u8) {
    sys::write(&[byte]);
}

/// Lee una línea a partir de una celda, terminada con un 0.
///
/// El fin de línea no se almacena.
#[no_mangle]
pub extern "C" fn parrot_devour(index: usize) {
    let mut offset = 0;
    while let Some(byte) = sys::read_byte() {
        if byte == b'\n' {
            break;
        }

        parrot_store(index + offset, byte);
        offset += 1;
    }

    parrot_store(index + offset, 0);
}

/// Escribe bytes a partir de una celda hasta el primer 0, y un fin de línea.
#[no_mangle]
pub extern "C" fn parrot_regurgitate(index: usize) {
    with_tape(|tape| sys::write(tape.string(index)));
    sys::write(b"\n");
}

/// Lee una línea a un estómago con nombre de `size` bytes.
///
/// `stomach` apunta al almacenamiento estático que reserva el código
/// generado para ese estómago.
#[no_mangle]
pub extern "C" fn parrot_devour_stomach(stomach: *mut u8, size: u32) {
    let stomach = unsafe { slice::from_raw_parts_mut(stomach, size as usize) };
    tape::fill_line(stomach, std::iter::from_fn(sys::read_byte));
}

/// Escribe el contenido de un estómago con nombre hasta el primer 0, y
/// un fin de línea.
#[no_mangle]
pub extern "C" fn parrot_regurgitate_stomach(stomach: *const u8, size: u32) {
    let stomach = unsafe { slice::from_raw_parts(stomach, size as usize) };
    sys::write(tape::string(stomach, 0));
    sys::write(b"\n");
}

#[no_mangle]
pub extern "C" fn parrot_bob(seconds: u32) {
    sys::sleep(seconds);
}

/// Termina el programa exitosamente.
#[no_mangle]
pub extern "C" fn parrot_perish() -> ! {
    sys::exit(0)
}

/// Termina el programa por una falla en tiempo de ejecución.
///
/// El estado de salida es el mismo código de falla.
#[no_mangle]
pub extern "C" fn parrot_fault(code: u32) -> ! {
    let message = match code {
        FAULT_INDEX_UNDERFLOW => "Pointer moved left of cell 0",
        FAULT_DIVISION_BY_ZERO => "Division by zero",
        _ => "Unknown fault",
    };

    sys::report(&format!("Runtime fault: {}", message));
    sys::exit(code as i32)
}
