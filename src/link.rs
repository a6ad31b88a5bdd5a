//! Construcción de ejecutables.
//!
//! Una vez que se ha emitido código ensamblador, este debe ser
//! ensamblado y enlazado contra `libruntime` para producir un binario
//! ejecutable.

use std::{
    io::{self, BufWriter},
    path::Path,
    process::{Child, ChildStdin, Command, ExitStatus, Stdio},
};

use bitflags::bitflags;
use log::debug;
use thiserror::Error;

bitflags! {
    /// Opciones a aplicar durante el enlazado.
    pub struct LinkOptions: u32 {
        /// Remover símbolos de depuración del ejecutable final.
        const STRIP = 0x01;
    }
}

/// Un error de ensamblado o enlazado.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LinkerError {
    /// Ocurrió un evento de error de E/S durante la invocación
    /// de comandos externos.
    #[error("I/O error")]
    Io(#[from] io::Error),

    /// El enlazador inició su ejecución, pero falló en enlazar.
    #[error("Linker exited with status code {0:?}")]
    Failed(ExitStatus),
}

/// Comando de ensamblado y enlazado.
const LINKER: &str = "gcc";

// rustc usa libpthread para hilos, libdl para enlazado lazy
// en tiempo de ejecución y libm para floats
const SYSTEM_LIBS: &[&str] = &["-pthread", "-ldl", "-lm"];

/// Instancia del enlazador para un ejecutable definido.
///
/// Las operaciones de ensamblado y enlazado se delegan a `gcc`, que
/// a su vez invoca a `as` y `ld` de `binutils`.
pub struct Linker {
    child: Child,
    stdin: BufWriter<ChildStdin>,
}

impl Linker {
    /// Inicia una instancia del enlazador.
    ///
    /// El enlazador tratará de emitir un ejecutable y escribirlo a
    /// la ruta indicada por `output`. `libruntime.a` se busca en
    /// `runtime_dir`.
    pub fn spawn<O, L>(output: &O, runtime_dir: &L, opts: LinkOptions) -> Result<Self, LinkerError>
    where
        O: AsRef<Path> + ?Sized,
        L: AsRef<Path> + ?Sized,
    {
        // El código generado se envía por pipe al stdin del linker
        let mut command = Command::new(LINKER);
        command
            .arg("-L")
            .arg(runtime_dir.as_ref())
            .arg("-o")
            .arg(output.as_ref())
            // Se descarta código muerto, se asume entrada en asm y se enlaza
            // contra la biblioteca de soporte libruntime
            .args(&["-Wl,--gc-sections", "-xassembler", "-", "-lruntime"])
            .args(SYSTEM_LIBS)
            .stdin(Stdio::piped());

        if opts.contains(LinkOptions::STRIP) {
            command.arg("-s");
        }

        debug!("Spawning linker: {:?}", command);

        let mut child = command.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "linker has no stdin"))?;

        Ok(Linker {
            child,
            stdin: BufWriter::new(stdin),
        })
    }

    /// Obtiene la entrada estándar del proceso que espera recibir ensamblador.
    ///
    /// Luego de crear una instancia con [`Linker::spawn()`], se debe escribir
    /// código ensamblador en la forma exacta en que fue emitido por
    /// [`crate::target::emit()`].
    pub fn stdin(&mut self) -> &mut BufWriter<ChildStdin> {
        &mut self.stdin
    }

    /// Indica el fin del flujo de código y finaliza el enlazado.
    pub fn finish(mut self) -> Result<(), LinkerError> {
        // Cerrar stdin es lo que indica EOF al ensamblador
        self.stdin.into_inner().map_err(|error| error.into_error())?;

        let status = self.child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(LinkerError::Failed(status))
        }
    }
}
