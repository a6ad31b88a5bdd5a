//! Generación de código.
//!
//! Recorre en orden el árbol ya resuelto y lo reduce a un [`Stream`] de
//! instrucciones. Los saltos hacia etiquetas se emiten con un destino
//! provisional y se corrigen una vez que se conoce la dirección de cada
//! marcador `perch`, ya que un salto puede preceder a su etiqueta.
//!
//! La traducción del flujo a ensamblador ocurre en [`emit()`].

use std::{collections::HashMap, convert::TryFrom, iter};

use log::debug;
use thiserror::Error;

use crate::{
    ir::{self, Address, Instruction, Label, Marker, Slot, Stream},
    lex::Identifier,
    parse::{Block, Cell, Operand, Program, Statement, Target},
    semantic::Pointer,
    source::{Located, Location},
};

mod emit;

pub use emit::{emit, Context};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("Jump target `{0}` has no address")]
    UnresolvedAddress(Identifier),

    #[error("Invocation of macro `{0}` was not expanded")]
    UnexpandedMacro(Identifier),

    #[error("Value {0} does not fit in a cell, valid range is [0, 255]")]
    OperandRange(u32),

    #[error("Cell index overflow while laying out text")]
    CellOverflow,

    #[error("Stomach `{0}` was not linked to a region")]
    UnresolvedStomach(Identifier),

    #[error("Text needs {needed} bytes including its terminator, but the stomach holds {size}")]
    StomachOverflow { needed: usize, size: u32 },

    #[error("Pointer is always at cell 0 here, moving left underflows")]
    IndexUnderflow,
}

/// Advertencias no fatales de generación de código.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CodegenWarning {
    #[error("Unreachable code")]
    Unreachable,
}

/// Resultado de generación de código.
#[derive(Debug)]
pub struct Generated {
    pub stream: Stream,
    pub warnings: Vec<Located<CodegenWarning>>,
}

/// Reduce un programa resuelto a un flujo de instrucciones.
pub fn generate(program: &Program) -> Result<Generated, Located<CodegenError>> {
    let mut generator = Generator {
        instructions: Vec::new(),
        perches: HashMap::new(),
        fixups: Vec::new(),
        loops: 0,
        warnings: Vec::new(),
        stomachs: program.symbols().stomach_sizes().to_vec(),
    };

    generator.block(program.body(), Pointer::START)?;
    generator.push(Instruction::Halt);

    let Generator {
        mut instructions,
        perches,
        fixups,
        warnings,
        stomachs,
        ..
    } = generator;

    for fixup in fixups {
        let address = fixup
            .label
            .and_then(|label| perches.get(&label))
            .copied()
            .ok_or_else(|| {
                let error = CodegenError::UnresolvedAddress(fixup.target.clone());
                Located::at(error, fixup.location.clone())
            })?;

        match instructions.get_mut(fixup.index) {
            Some(Instruction::Jump(to)) | Some(Instruction::Branch { to, .. }) => *to = address,
            _ => unreachable!("fixup does not point to a jump"),
        }
    }

    debug!(
        "Generated {} instructions with {} warnings",
        instructions.len(),
        warnings.len()
    );

    Ok(Generated {
        stream: Stream::new(instructions).with_stomachs(stomachs),
        warnings,
    })
}

type Codegen<T> = Result<T, Located<CodegenError>>;

struct Generator {
    instructions: Vec<Instruction>,
    perches: HashMap<Label, Address>,
    fixups: Vec<Fixup>,
    loops: u32,
    warnings: Vec<Located<CodegenWarning>>,
    stomachs: Vec<u32>,
}

/// Salto cuyo destino se desconoce hasta terminar la generación.
struct Fixup {
    index: usize,
    label: Option<Label>,
    target: Identifier,
    location: Location,
}

impl Generator {
    fn block(&mut self, block: &Block, mut pointer: Pointer) -> Codegen<Pointer> {
        // Verdadero luego de `perish` o `flyto`, hasta la siguiente etiqueta
        let mut dead = false;
        let mut warned = false;

        for statement in block.statements() {
            match statement.val() {
                Statement::MacroDef { .. } | Statement::DeclareStomach { .. } => continue,
                Statement::LabelDef { .. } => dead = false,

                _ if dead && !warned => {
                    let warning = Located::at(CodegenWarning::Unreachable, statement.location().clone());
                    self.warnings.push(warning);
                    warned = true;
                }

                _ => (),
            }

            pointer = self.statement(statement, pointer)?;

            if let Statement::Jump { .. } | Statement::End = statement.val() {
                dead = true;
                warned = false;
            }
        }

        Ok(pointer)
    }

    fn statement(&mut self, statement: &Located<Statement>, pointer: Pointer) -> Codegen<Pointer> {
        use Statement::*;

        let location = statement.location();
        match statement.val() {
            Increment => self.push(Instruction::Arith {
                op: ir::ArithOp::Add,
                into: Slot::BOWL,
                with: ir::Operand::Const(1),
            }),

            Decrement => self.push(Instruction::Arith {
                op: ir::ArithOp::Sub,
                into: Slot::BOWL,
                with: ir::Operand::Const(1),
            }),

            MoveRight => self.push(Instruction::MoveRight),

            MoveLeft => {
                if pointer == Pointer::Known(0) {
                    return Err(Located::at(CodegenError::IndexUnderflow, location.clone()));
                }

                self.push(Instruction::MoveLeft)
            }

            ReadInput(None) => self.push(Instruction::Input(Slot::BOWL)),
            ReadInput(Some(byte)) => {
                let byte = byte_of(*byte.val(), byte.location())?;
                self.push(Instruction::Store(Slot::BOWL, ir::Operand::Const(byte)))
            }

            PrintCell => self.push(Instruction::Output(Slot::BOWL)),
            DeclareArray(size) => self.push(Instruction::Reserve(*size.val())),

            DeclareStomach { .. } => return Ok(pointer),

            ReadString { into, content } => {
                match (buffer_of(into.as_ref(), location)?, content) {
                    (buffer, None) => self.push(Instruction::ReadLine(buffer)),
                    (ir::Buffer::Stomach(region), Some(text)) => self.fill_stomach(region, text, location)?,
                    (ir::Buffer::Tape(slot), Some(text)) => {
                        // El texto termina con un centinela cero
                        for (offset, byte) in text.bytes().chain(iter::once(0)).enumerate() {
                            let cell = u32::try_from(offset)
                                .ok()
                                .and_then(|offset| slot.offset(offset))
                                .ok_or_else(|| Located::at(CodegenError::CellOverflow, location.clone()))?;

                            self.push(Instruction::Store(cell, ir::Operand::Const(byte)));
                        }
                    }
                }
            }

            PrintDevoured(target) => {
                let buffer = buffer_of(target.as_ref(), location)?;
                self.push(Instruction::PrintString(buffer))
            }

            Loop(body) => {
                let index = self.loops;
                self.loops += 1;

                let head = self.here();
                self.push(Instruction::Mark(Marker::LoopHead(index)));
                self.block(body, Pointer::Unknown)?;
                self.push(Instruction::Jump(head));
                self.push(Instruction::Mark(Marker::LoopExit(index)));
            }

            PrintLiteral(text) => {
                for byte in text.bytes().chain(iter::once(b'\n')) {
                    self.push(Instruction::OutputByte(byte));
                }
            }

            ResetPointer => self.push(Instruction::ResetPointer),
            ClearCell => self.push(Instruction::Store(Slot::BOWL, ir::Operand::Const(0))),

            LabelDef { name, label, body } => {
                let address = self.here();
                self.perches.insert(*label, address);

                self.push(Instruction::Mark(Marker::Perch {
                    label: *label,
                    name: name.val().clone(),
                }));

                let pointer = self.block(body, Pointer::Unknown)?;
                self.push(Instruction::Mark(Marker::PerchEnd(*label)));

                return Ok(pointer);
            }

            MacroDef { .. } => return Ok(pointer),

            MacroCall(name) => {
                let error = CodegenError::UnexpandedMacro(name.val().clone());
                return Err(Located::at(error, location.clone()));
            }

            Jump { target, label } => {
                self.fixup(target, *label, location);
                self.push(Instruction::Jump(Address(usize::MAX)));
            }

            ConditionalJump {
                target,
                label,
                left,
                op,
                right,
            } => {
                let left = operand_of(*left, location)?;
                let right = operand_of(*right, location)?;

                self.fixup(target, *label, location);
                self.push(Instruction::Branch {
                    left,
                    op: *op,
                    right,
                    to: Address(usize::MAX),
                });
            }

            Arithmetic { op, cell, operand } => {
                let into = slot_of(*cell);
                let with = operand_of(*operand, location)?;

                self.push(Instruction::Arith { op: *op, into, with });
                if op.squawks() {
                    self.push(Instruction::Output(into));
                }
            }

            Delay(seconds) => self.push(Instruction::Sleep(*seconds.val())),
            End => self.push(Instruction::Halt),
        }

        Ok(pointer.after(statement.val()))
    }

    fn fill_stomach(&mut self, region: ir::Region, text: &str, location: &Location) -> Codegen<()> {
        let size = self.stomachs.get(region.0 as usize).copied().unwrap_or(0);
        let needed = text.len() + 1;

        if needed > size as usize {
            let error = CodegenError::StomachOverflow { needed, size };
            return Err(Located::at(error, location.clone()));
        }

        for (offset, byte) in text.bytes().chain(iter::once(0)).enumerate() {
            self.push(Instruction::StoreStomach {
                region,
                offset: offset as u32,
                byte,
            });
        }

        Ok(())
    }

    fn fixup(&mut self, target: &Located<Identifier>, label: Option<Label>, location: &Location) {
        self.fixups.push(Fixup {
            index: self.instructions.len(),
            label,
            target: target.val().clone(),
            location: location.clone(),
        });
    }

    fn here(&self) -> Address {
        Address(self.instructions.len())
    }

    fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }
}

fn slot_of(cell: Cell) -> Slot {
    match cell {
        Cell::Bowl => Slot::BOWL,
        Cell::At(index) => Slot::Absolute(index),
    }
}

fn buffer_of(target: Option<&Target>, location: &Location) -> Codegen<ir::Buffer> {
    match target {
        None => Ok(ir::Buffer::Tape(Slot::BOWL)),
        Some(Target::Cell(cell)) => Ok(ir::Buffer::Tape(slot_of(*cell))),
        Some(Target::Stomach {
            region: Some(region), ..
        }) => Ok(ir::Buffer::Stomach(*region)),

        Some(Target::Stomach { name, region: None }) => {
            let error = CodegenError::UnresolvedStomach(name.val().clone());
            Err(Located::at(error, location.clone()))
        }
    }
}

fn operand_of(operand: Operand, location: &Location) -> Codegen<ir::Operand> {
    match operand {
        Operand::Cell(cell) => Ok(ir::Operand::Cell(slot_of(cell))),
        Operand::Value(value) => byte_of(value, location).map(ir::Operand::Const),
    }
}

fn byte_of(value: u32, location: &Location) -> Codegen<u8> {
    u8::try_from(value).map_err(|_| Located::at(CodegenError::OperandRange(value), location.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{ArithOp, Comparison, Operand::Const},
        lex::Lexer,
        parse, source,
    };

    fn generate_str(text: &str) -> Result<Generated, Located<CodegenError>> {
        let (start, stream) = source::consume(text.as_bytes(), "test.prrt");
        let tokens = Lexer::new(start.clone(), stream).collect_tokens().unwrap();
        let program = parse::parse(tokens.iter(), start).unwrap().resolve().unwrap();

        generate(&program)
    }

    fn instructions(text: &str) -> Vec<Instruction> {
        generate_str(text).unwrap().stream.instructions().to_vec()
    }

    #[test]
    fn increments_and_output() {
        use Instruction::*;

        let add = Arith {
            op: ArithOp::Add,
            into: Slot::BOWL,
            with: Const(1),
        };

        assert_eq!(
            instructions("peck peck squawk\n"),
            vec![add.clone(), add, Output(Slot::BOWL), Halt]
        );
    }

    #[test]
    fn mul_and_div_squawk_but_add_and_sub_do_not() {
        use Instruction::*;

        let stream = instructions("add #1 2\nsub #1 1\nmul #1 3\ndiv #1 0\n");
        let outputs: Vec<_> = stream
            .iter()
            .filter(|instruction| matches!(instruction, Output(_)))
            .collect();

        assert_eq!(outputs, vec![&Output(Slot::Absolute(1)), &Output(Slot::Absolute(1))]);
        assert_eq!(
            stream[4],
            Arith {
                op: ArithOp::Div,
                into: Slot::Absolute(1),
                with: Const(0),
            }
        );
    }

    #[test]
    fn loops_jump_back_to_their_head() {
        use Instruction::*;

        let stream = instructions("hop\ncircle:\n  peck\n  squawk\n");
        assert_eq!(stream[1], Mark(Marker::LoopHead(0)));
        assert_eq!(stream[4], Jump(Address(1)));
        assert_eq!(stream[5], Mark(Marker::LoopExit(0)));
        assert_eq!(stream[6], Halt);
    }

    #[test]
    fn forward_and_backward_jumps_are_fixed_up() {
        use Instruction::*;

        let stream = instructions("flyto skip\nperch back:\n  peck\nperch skip:\n  flap back bowl < 3\n");
        let skip = stream
            .iter()
            .position(|instruction| matches!(instruction, Mark(Marker::Perch { label: Label(1), .. })))
            .unwrap();

        assert_eq!(stream[0], Jump(Address(skip)));
        assert!(matches!(
            stream[skip + 1],
            Branch {
                op: Comparison::Less,
                right: Const(3),
                to: Address(1),
                ..
            }
        ));
    }

    #[test]
    fn mimic_appends_newline() {
        use Instruction::*;

        assert_eq!(
            instructions("mimic \"hi\"\n"),
            vec![OutputByte(b'h'), OutputByte(b'i'), OutputByte(b'\n'), Halt]
        );
    }

    #[test]
    fn devoured_text_ends_with_sentinel() {
        use Instruction::*;

        assert_eq!(
            instructions("devour into #4 \"ok\"\n"),
            vec![
                Store(Slot::Absolute(4), Const(b'o')),
                Store(Slot::Absolute(5), Const(b'k')),
                Store(Slot::Absolute(6), Const(0)),
                Halt,
            ]
        );
    }

    #[test]
    fn named_stomachs_live_outside_the_tape() {
        use Instruction::*;

        let generated = generate_str("stomach 4 buf\nperish\nstomach 2 spare\n").unwrap();
        assert!(generated.warnings.is_empty());
        assert_eq!(generated.stream.stomachs(), &[4, 2]);

        let region = ir::Region(0);
        assert_eq!(
            instructions("stomach 4 buf\ndevour into buf \"hi\"\nregurgitate buf\ndevour into buf\n"),
            vec![
                StoreStomach { region, offset: 0, byte: b'h' },
                StoreStomach { region, offset: 1, byte: b'i' },
                StoreStomach { region, offset: 2, byte: 0 },
                PrintString(ir::Buffer::Stomach(region)),
                ReadLine(ir::Buffer::Stomach(region)),
                Halt,
            ]
        );
    }

    #[test]
    fn anonymous_stomach_keeps_the_pointer() {
        use Instruction::*;

        assert_eq!(
            instructions("stomach 3\nregurgitate\n"),
            vec![Reserve(3), PrintString(ir::Buffer::Tape(Slot::BOWL)), Halt]
        );
    }

    #[test]
    fn text_must_fit_in_its_stomach() {
        let error = generate_str("stomach 2 buf\ndevour into buf \"hi\"\n").unwrap_err();
        assert!(matches!(
            error.val(),
            CodegenError::StomachOverflow { needed: 3, size: 2 }
        ));
        assert_eq!(error.location().start().line(), 2);
    }

    #[test]
    fn static_underflow_is_an_error() {
        let error = generate_str("peck\nhopback\n").unwrap_err();
        assert!(matches!(error.val(), CodegenError::IndexUnderflow));
        assert_eq!(error.location().start().line(), 2);

        // Dentro de una etiqueta el puntero es desconocido
        assert!(generate_str("perch l:\n  hopback\n").is_ok());
        assert!(generate_str("hop hopback\n").is_ok());
    }

    #[test]
    fn immediates_must_fit_in_a_cell() {
        let error = generate_str("add bowl 256\n").unwrap_err();
        assert!(matches!(error.val(), CodegenError::OperandRange(256)));

        let error = generate_str("gulp 300\n").unwrap_err();
        assert!(matches!(error.val(), CodegenError::OperandRange(300)));
    }

    #[test]
    fn unreachable_code_warns_once_per_run() {
        let generated = generate_str("perish\npeck\nsquawk\nperch l:\n  peck\n  flyto l\n  hop\n").unwrap();
        let lines: Vec<_> = generated
            .warnings
            .iter()
            .map(|warning| warning.location().start().line())
            .collect();

        assert_eq!(lines, vec![2, 7]);
    }

    #[test]
    fn unlinked_jump_has_no_address() {
        // Sin pasar por el resolvedor, el salto no tiene etiqueta
        let (start, stream) = source::consume("perch l:\n  peck\nflyto l\n".as_bytes(), "t.prrt");
        let tokens = Lexer::new(start.clone(), stream).collect_tokens().unwrap();
        let program = parse::parse(tokens.iter(), start).unwrap();

        let error = generate(&program).unwrap_err();
        assert!(matches!(error.val(), CodegenError::UnresolvedAddress(_)));
    }
}
