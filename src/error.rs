//! Reporte de errores y advertencias con ubicación.
//!
//! Cada fase produce errores [`Located`]. Para mostrarlos al usuario
//! se agregan en [`Diagnostics`], que imprime la línea de código
//! fuente involucrada y subraya el rango exacto.

use crate::source::{Located, Location};
use std::{
    error::Error,
    fmt::{self, Display},
};

mod sealed {
    pub trait Sealed {}
}

/// Un error o advertencia con ubicación, con tipo borrado.
pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &dyn Error;
    fn location(&self) -> &Location;
}

/// Gravedad de un grupo de diagnósticos.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    /// La compilación se abortó.
    Error,

    /// La compilación continuó.
    Warning,
}

pub struct Diagnostics {
    kind: &'static str,
    severity: Severity,
    errors: Vec<Box<dyn 'static + LocatedError>>,
}

impl Diagnostics {
    /// Etiqueta con la que se antecede cada mensaje.
    pub fn kind(self, kind: &'static str) -> Self {
        Diagnostics { kind, ..self }
    }

    /// Marca estos diagnósticos como advertencias.
    pub fn warning(self) -> Self {
        Diagnostics {
            severity: Severity::Warning,
            ..self
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Itera sobre los diagnósticos individuales.
    pub fn iter(&self) -> impl Iterator<Item = &dyn LocatedError> {
        self.errors.iter().map(|error| &**error)
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Diagnostics {
            kind: "error",
            severity: Severity::Error,
            errors: Default::default(),
        }
    }
}

impl<E: 'static + LocatedError> From<E> for Diagnostics {
    fn from(error: E) -> Self {
        Diagnostics {
            errors: vec![Box::new(error)],
            ..Default::default()
        }
    }
}

impl<E: 'static + LocatedError> From<Vec<E>> for Diagnostics {
    fn from(errors: Vec<E>) -> Self {
        let errors = errors
            .into_iter()
            .map(|error| {
                let error: Box<dyn LocatedError> = Box::new(error);
                error
            })
            .collect();

        Diagnostics {
            errors,
            ..Default::default()
        }
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Diagnostics")
            .field("kind", &self.kind)
            .field("severity", &self.severity)
            .field("count", &self.errors.len())
            .finish()
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostics {
            kind,
            severity,
            errors,
        } = self;

        if errors.is_empty() {
            return match severity {
                Severity::Error => writeln!(fmt, "No errors were reported"),
                Severity::Warning => Ok(()),
            };
        }

        for error in errors {
            writeln!(fmt, "{}: {}", kind, error.source())?;

            let location = error.location();
            writeln!(fmt, " --> {}", location)?;

            let digits = location.end().line().to_string().len();
            writeln!(fmt, "{:digits$} |", "", digits = digits)?;

            for line_number in location.start().line()..=location.end().line() {
                location.source().with_line(line_number, |line| {
                    writeln!(fmt, "{:>digits$} | {}", line_number, line, digits = digits)
                })?
            }

            // Un rango que termina al inicio de una línea aún subraya una columna
            let from = location.start().column();
            let to = location.end().column().saturating_sub(1).max(1);
            let min = from.min(to);
            let max = from.max(to);

            let skip = (min - 1) as usize;
            let highlight = (max - min + 1) as usize;

            writeln!(
                fmt,
                "{:digits$} | {:skip$}{:^<highlight$}",
                "",
                "",
                "",
                digits = digits,
                skip = skip,
                highlight = highlight
            )?;

            writeln!(fmt)?;
        }

        let count = errors.len();
        match severity {
            Severity::Error => {
                let error_or_errors = if count == 1 { "error" } else { "errors" };
                writeln!(fmt, "Build failed with {} {}", count, error_or_errors)
            }

            Severity::Warning => {
                let warning_or_warnings = if count == 1 { "warning" } else { "warnings" };
                writeln!(fmt, "Build produced {} {}", count, warning_or_warnings)
            }
        }
    }
}

impl<E: Error> sealed::Sealed for Located<E> {}

impl<E: Error> LocatedError for Located<E> {
    fn source(&self) -> &dyn Error {
        self.val()
    }

    fn location(&self) -> &Location {
        Located::location(self)
    }
}
