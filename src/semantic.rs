//! Análisis semántico.
//!
//! La resolución de un [`Program`] ocurre en tres etapas:
//!
//! 1. Expansión de macros. Cada invocación se sustituye por una copia
//!    del cuerpo ya expandido de la macro. Las definiciones de macro
//!    desaparecen del árbol, pero permanecen expandidas en la tabla
//!    de símbolos. Todas las macros se expanden, se usen o no.
//! 2. Enlazado de nombres. Cada `flyto` y `flap` se anota con la
//!    [`Label`](crate::ir::Label) de su destino, y cada estómago con
//!    nombre usado por `devour` o `regurgitate` con su región.
//! 3. Plegado de `bowl`. Donde el puntero es conocido estáticamente en
//!    todo camino que alcanza una sentencia, `bowl` se reescribe como un
//!    índice absoluto de celda.
//!
//! La resolución es idempotente.

use log::debug;
use thiserror::Error;

use std::{collections::HashMap, rc::Rc};

use crate::{
    lex::Identifier,
    parse::{Block, Cell, Operand, Program, Statement, SymbolTable, Target},
    source::{Located, Location},
};

pub type Semantic<T> = Result<T, Located<SemanticError>>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Macro `{0}` invokes itself")]
    MacroRecursion(Identifier),

    #[error("Macro `{0}` is undefined")]
    UndefinedMacro(Identifier),

    #[error("Label `{0}` is undefined")]
    UnresolvedLabel(Identifier),

    #[error("Stomach `{0}` is undefined")]
    UndefinedStomach(Identifier),
}

/// Estado estático del puntero de datos.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Pointer {
    /// El puntero tiene este valor en todo camino.
    Known(u32),

    /// El puntero depende del camino tomado.
    Unknown,

    /// Ningún camino alcanza este punto.
    Unreachable,
}

impl Pointer {
    /// Estado al inicio del programa.
    pub(crate) const START: Pointer = Pointer::Known(0);

    /// Estado luego de una sentencia.
    ///
    /// Los cuerpos de etiqueta los recorre quien llama, ya que su
    /// estado final depende del recorrido del cuerpo.
    pub(crate) fn after(self, statement: &Statement) -> Pointer {
        use Pointer::*;

        match (self, statement) {
            (Unreachable, _) => Unreachable,

            (_, Statement::Jump { .. }) | (_, Statement::End) | (_, Statement::Loop(_)) => {
                Unreachable
            }

            (_, Statement::ResetPointer) => Known(0),
            (_, Statement::MacroCall(_)) => Unknown,

            (Known(index), Statement::MoveRight) => index.checked_add(1).map_or(Unknown, Known),
            (Known(0), Statement::MoveLeft) => Unreachable,
            (Known(index), Statement::MoveLeft) => Known(index - 1),

            (pointer, _) => pointer,
        }
    }

    fn fold(self, cell: Cell) -> Cell {
        match (self, cell) {
            (Pointer::Known(index), Cell::Bowl) => Cell::At(index),
            (_, cell) => cell,
        }
    }

    fn fold_target(self, target: &mut Option<Target>) {
        if let Some(Target::Cell(cell)) = target {
            *cell = self.fold(*cell);
        }
    }

    fn fold_operand(self, operand: Operand) -> Operand {
        match operand {
            Operand::Cell(cell) => Operand::Cell(self.fold(cell)),
            value => value,
        }
    }
}

impl Program {
    /// Resuelve macros, etiquetas y operandos `bowl`.
    pub fn resolve(self) -> Semantic<Program> {
        let Program { body, mut symbols } = self;

        let (mut body, expanded) = {
            let mut expander = Expander {
                symbols: &symbols,
                expanded: HashMap::new(),
                visiting: Vec::new(),
            };

            let mut definitions: Vec<_> = symbols.macro_definitions().collect();
            definitions.sort_by_key(|(_, location)| (location.start().line(), location.start().column()));

            for (name, location) in definitions {
                expander.expand_macro(name, location)?;
            }

            (expander.expand_block(&body)?, expander.expanded)
        };

        for (name, body) in expanded {
            let mut body = Block::clone(&body);
            link(&mut body, &symbols)?;
            symbols.replace_macro(&name, Rc::new(body));
        }

        link(&mut body, &symbols)?;
        fold(&mut body, Pointer::START);

        debug!(
            "Resolved program with {} top-level statements and {} labels",
            body.0.len(),
            symbols.label_count()
        );

        Ok(Program { body, symbols })
    }
}

struct Expander<'a> {
    symbols: &'a SymbolTable,
    expanded: HashMap<Identifier, Rc<Block>>,
    visiting: Vec<Identifier>,
}

impl Expander<'_> {
    fn expand_macro(&mut self, name: &Identifier, at: &Location) -> Semantic<Rc<Block>> {
        if let Some(body) = self.expanded.get(name) {
            return Ok(Rc::clone(body));
        }

        if self.visiting.contains(name) {
            let error = SemanticError::MacroRecursion(name.clone());
            return Err(Located::at(error, at.clone()));
        }

        let body = match self.symbols.macro_body(name) {
            Some(body) => Rc::clone(body),
            None => {
                let error = SemanticError::UndefinedMacro(name.clone());
                return Err(Located::at(error, at.clone()));
            }
        };

        self.visiting.push(name.clone());
        let expanded = self.expand_block(&body);
        self.visiting.pop();

        let expanded = Rc::new(expanded?);
        debug!(
            "Expanded macro `{}` into {} statements",
            name,
            expanded.statements().len()
        );

        self.expanded.insert(name.clone(), Rc::clone(&expanded));
        Ok(expanded)
    }

    fn expand_block(&mut self, block: &Block) -> Semantic<Block> {
        let mut statements = Vec::with_capacity(block.statements().len());

        for statement in block.statements() {
            let location = statement.location().clone();
            let expanded = match statement.val() {
                Statement::MacroCall(name) => {
                    let body = self.expand_macro(name.val(), name.location())?;
                    statements.extend(body.statements().iter().cloned());
                    continue;
                }

                Statement::MacroDef { .. } => continue,

                Statement::Loop(body) => Statement::Loop(self.expand_block(body)?),

                Statement::LabelDef { name, label, body } => Statement::LabelDef {
                    name: name.clone(),
                    label: *label,
                    body: self.expand_block(body)?,
                },

                other => other.clone(),
            };

            statements.push(Located::at(expanded, location));
        }

        Ok(Block(statements))
    }
}

fn link(block: &mut Block, symbols: &SymbolTable) -> Semantic<()> {
    for statement in &mut block.0 {
        let location = statement.location().clone();

        match statement.value_mut() {
            Statement::Jump { target, label } | Statement::ConditionalJump { target, label, .. } => {
                match symbols.label(target.val()) {
                    Some(resolved) => *label = Some(resolved),
                    None => {
                        let error = SemanticError::UnresolvedLabel(target.val().clone());
                        return Err(Located::at(error, location));
                    }
                }
            }

            Statement::ReadString {
                into: Some(Target::Stomach { name, region }),
                ..
            }
            | Statement::PrintDevoured(Some(Target::Stomach { name, region })) => {
                match symbols.stomach(name.val()) {
                    Some(resolved) => *region = Some(resolved),
                    None => {
                        let error = SemanticError::UndefinedStomach(name.val().clone());
                        return Err(Located::at(error, name.location().clone()));
                    }
                }
            }

            Statement::Loop(body) | Statement::LabelDef { body, .. } => link(body, symbols)?,

            _ => (),
        }
    }

    Ok(())
}

fn fold(block: &mut Block, mut pointer: Pointer) -> Pointer {
    for statement in &mut block.0 {
        match statement.value_mut() {
            Statement::Loop(body) => {
                fold(body, Pointer::Unknown);
            }

            Statement::LabelDef { body, .. } => {
                pointer = fold(body, Pointer::Unknown);
                continue;
            }

            Statement::ReadString { into, .. } => pointer.fold_target(into),
            Statement::PrintDevoured(target) => pointer.fold_target(target),

            Statement::Arithmetic { cell, operand, .. } => {
                *cell = pointer.fold(*cell);
                *operand = pointer.fold_operand(*operand);
            }

            Statement::ConditionalJump { left, right, .. } => {
                *left = pointer.fold_operand(*left);
                *right = pointer.fold_operand(*right);
            }

            _ => (),
        }

        pointer = pointer.after(statement.val());
    }

    pointer
}
