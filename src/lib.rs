//! Compilador para el lenguaje de cinta Parrot.
//!
//! # Front end
//! Cada programa deriva de un único archivo de código fuente.
//! Este archivo se somete primero a análisis léxico en [`lex`], de
//! lo cual se obtiene un flujo de tokens que incluye indentación.
//! El flujo de tokens se dispone en un árbol de bloques por medio de
//! análisis sintáctico en [`parse`]. El árbol es procesado por análisis
//! semántico en [`semantic`], donde se expanden macros y se resuelven
//! etiquetas. Finalmente se genera un flujo de instrucciones descrito
//! en [`ir`], con lo cual concluyen las fases delanteras del compilador.
//! La función [`compile()`] ejecuta todas estas fases en orden.
//!
//! # Back end
//! En esta sección el compilador deja de ser agnóstico al sistema
//! objetivo. Es en este segmento donde ocurre generación de código
//! ensamblador en [`target`], concluyendo con ensamblado, enlazado
//! contra `libruntime` y emisión del ejecutable final en [`link`].
//! Alternativamente, [`machine`] interpreta el flujo directamente.

#[macro_use]
mod macros;

pub mod error;
pub mod ir;
pub mod lex;
pub mod link;
pub mod machine;
pub mod parse;
pub mod semantic;
pub mod source;

mod arch;
mod codegen;

use std::io::BufRead;

use log::{debug, info};

use error::Diagnostics;
use ir::Stream;

pub use codegen::{CodegenError, CodegenWarning};

/// Emisión de código.
///
/// Este módulo reexporta suficientes ítems internos relacionados a generación de código para
/// traducir IR a alguna arquitectura en específico.
pub mod target {
    pub use crate::arch::Arch;
    pub use crate::codegen::emit;
}

/// Resultado de una compilación exitosa.
pub struct Compilation {
    /// Flujo de instrucciones del programa.
    pub stream: Stream,

    /// Advertencias producidas durante la compilación.
    pub warnings: Diagnostics,
}

/// Compila un programa completo hasta su flujo de instrucciones.
///
/// `name` es el nombre con el que se reportan ubicaciones. El primer
/// error de cualquier fase aborta la compilación.
pub fn compile<R: BufRead>(reader: R, name: &str) -> Result<Compilation, Diagnostics> {
    let (start, stream) = source::consume(reader, name);

    let tokens = lex::Lexer::new(start.clone(), stream)
        .collect_tokens()
        .map_err(|error| Diagnostics::from(error).kind("Lexical error"))?;

    debug!("{}: {} tokens", name, tokens.len());

    let program = parse::parse(tokens.iter(), start)
        .map_err(|error| Diagnostics::from(error).kind("Syntax error"))?;

    debug!(
        "{}: {} top-level statements, {} labels",
        name,
        program.body().statements().len(),
        program.symbols().label_count()
    );

    let program = program
        .resolve()
        .map_err(|error| Diagnostics::from(error).kind("Semantic error"))?;

    let generated = codegen::generate(&program)
        .map_err(|error| Diagnostics::from(error).kind("Code generation error"))?;

    info!("{}: generated {} instructions", name, generated.stream.len());

    Ok(Compilation {
        stream: generated.stream,
        warnings: Diagnostics::from(generated.warnings).kind("Warning").warning(),
    })
}
