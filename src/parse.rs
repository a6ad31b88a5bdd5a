//! Análisis sintáctico.
//!
//! El parser es de descenso recursivo sobre el flujo de tokens. Los
//! bloques (`circle`, `perch`, `chirp`) se reconocen por la secuencia
//! `:` `Newline` `Indent` ... `Dedent` que sintetiza el lexer. Los
//! `Newline` separan sentencias y no tienen otro significado, por lo
//! cual varias sentencias pueden compartir una línea.
//!
//! Mientras se encuentran definiciones de etiquetas y macros, estas se
//! registran en la [`SymbolTable`] del programa. Los cuerpos de macro se
//! almacenan tal cual; su expansión es asunto de [`crate::semantic`].

use std::{collections::HashMap, iter::Peekable, marker::PhantomData, rc::Rc};

use log::debug;
use thiserror::Error;

use crate::{
    ir::{ArithOp, Comparison, Label, Region},
    lex::{Identifier, Keyword, Token},
    source::{Located, Location},
};

/// Un programa completo.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub(crate) body: Block,
    pub(crate) symbols: SymbolTable,
}

impl Program {
    /// Bloque de nivel superior.
    pub fn body(&self) -> &Block {
        &self.body
    }

    /// Etiquetas y macros definidas en el programa.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }
}

/// Secuencia ordenada de sentencias.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block(pub(crate) Vec<Located<Statement>>);

impl Block {
    pub fn statements(&self) -> &[Located<Statement>] {
        &self.0
    }
}

/// Celda destino de una operación.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cell {
    /// La celda bajo el puntero.
    Bowl,

    /// Índice literal de celda.
    At(u32),
}

/// Origen o destino de una cadena: una celda o un estómago con nombre.
#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    Cell(Cell),

    /// La región se resuelve durante análisis semántico si el estómago
    /// se declara más adelante.
    Stomach {
        name: Located<Identifier>,
        region: Option<Region>,
    },
}

/// Operando fuente de una operación.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Cell(Cell),

    /// Valor inmediato. Su rango se valida durante generación de código.
    Value(u32),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    /// `peck`
    Increment,

    /// `scratch`
    Decrement,

    /// `hop`
    MoveRight,

    /// `hopback`
    MoveLeft,

    /// `gulp`, opcionalmente con un byte preestablecido.
    ReadInput(Option<Located<u32>>),

    /// `squawk`
    PrintCell,

    /// `stomach` anónimo, sobre la cinta.
    DeclareArray(Located<u32>),

    /// `stomach` con nombre.
    DeclareStomach {
        name: Located<Identifier>,
        region: Region,
        size: Located<u32>,
    },

    /// `devour`, ya sea leyendo una línea o almacenando texto literal.
    ReadString {
        into: Option<Target>,
        content: Option<Rc<str>>,
    },

    /// `regurgitate`
    PrintDevoured(Option<Target>),

    /// `circle`
    Loop(Block),

    /// `mimic`
    PrintLiteral(Rc<str>),

    /// `preen`
    ResetPointer,

    /// `poop`
    ClearCell,

    /// `perch`
    LabelDef {
        name: Located<Identifier>,
        label: Label,
        body: Block,
    },

    /// `chirp`
    MacroDef {
        name: Located<Identifier>,
        body: Rc<Block>,
    },

    /// Invocación de macro por nombre.
    MacroCall(Located<Identifier>),

    /// `flyto`
    Jump {
        target: Located<Identifier>,
        label: Option<Label>,
    },

    /// `flap`
    ConditionalJump {
        target: Located<Identifier>,
        label: Option<Label>,
        left: Operand,
        op: Comparison,
        right: Operand,
    },

    /// `add`, `sub`, `mul`, `div`
    Arithmetic {
        op: ArithOp,
        cell: Cell,
        operand: Operand,
    },

    /// `bob`
    Delay(Located<u32>),

    /// `perish`
    End,
}

/// Tamaño de un estómago con nombre que no indica uno.
pub const DEFAULT_STOMACH_SIZE: u32 = 1024;

/// Tabla de símbolos de un programa.
///
/// Los nombres de etiqueta son únicos entre etiquetas, los nombres de
/// macro son únicos entre macros y lo mismo ocurre con los estómagos.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SymbolTable {
    labels: HashMap<Identifier, Located<Label>>,
    macros: HashMap<Identifier, Located<Rc<Block>>>,
    stomachs: HashMap<Identifier, Located<Region>>,
    stomach_sizes: Vec<u32>,
}

impl SymbolTable {
    /// Busca una etiqueta por nombre.
    pub fn label(&self, name: &Identifier) -> Option<Label> {
        self.labels.get(name).map(|label| *label.val())
    }

    /// Cantidad de etiquetas definidas.
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Busca el cuerpo de una macro por nombre.
    pub fn macro_body(&self, name: &Identifier) -> Option<&Rc<Block>> {
        self.macros.get(name).map(Located::val)
    }

    /// Nombres de macro junto a la ubicación de su definición.
    pub fn macro_definitions(&self) -> impl Iterator<Item = (&Identifier, &Location)> {
        self.macros
            .iter()
            .map(|(name, body)| (name, body.location()))
    }

    /// Busca un estómago con nombre.
    pub fn stomach(&self, name: &Identifier) -> Option<Region> {
        self.stomachs.get(name).map(|region| *region.val())
    }

    /// Tamaños de los estómagos con nombre, indexados por región.
    pub fn stomach_sizes(&self) -> &[u32] {
        &self.stomach_sizes
    }

    pub(crate) fn replace_macro(&mut self, name: &Identifier, body: Rc<Block>) {
        if let Some(entry) = self.macros.get_mut(name) {
            *entry = Located::at(body, entry.location().clone());
        }
    }

    fn define_label(&mut self, name: &Located<Identifier>) -> Result<Label, ParserError> {
        if self.labels.contains_key(name.val()) {
            return Err(ParserError::Redefinition("label", name.val().clone()));
        }

        let label = Label(self.labels.len() as u32);
        let entry = Located::at(label, name.location().clone());
        self.labels.insert(name.val().clone(), entry);

        Ok(label)
    }

    fn define_macro(&mut self, name: &Located<Identifier>, body: Rc<Block>) -> Result<(), ParserError> {
        // Una macro anidada con el mismo nombre ya pudo haberse definido en `body`
        if self.macros.contains_key(name.val()) {
            return Err(ParserError::Redefinition("macro", name.val().clone()));
        }

        let entry = Located::at(body, name.location().clone());
        self.macros.insert(name.val().clone(), entry);

        Ok(())
    }

    fn define_stomach(&mut self, name: &Located<Identifier>, size: u32) -> Result<Region, ParserError> {
        if self.stomachs.contains_key(name.val()) {
            return Err(ParserError::Redefinition("stomach", name.val().clone()));
        } else if size == 0 {
            return Err(ParserError::EmptyStomach(name.val().clone()));
        }

        let region = Region(self.stomach_sizes.len() as u32);
        self.stomach_sizes.push(size);
        self.stomachs
            .insert(name.val().clone(), Located::at(region, name.location().clone()));

        Ok(region)
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected an indented block after `:`")]
    EmptyBlock,

    #[error("Unexpected indentation, no block was opened here")]
    UnexpectedIndent,

    #[error("Dedent closes more blocks than are open")]
    UnbalancedDedent,

    #[error("`{statement}` takes {expected} operands, found {found}")]
    Arity {
        statement: String,
        expected: &'static str,
        found: usize,
    },

    #[error("Redefinition of {0} `{1}`")]
    Redefinition(&'static str, Identifier),

    #[error("Stomach `{0}` must hold at least one byte")]
    EmptyStomach(Identifier),

    #[error("Label `{0}` cannot be defined inside a macro body")]
    LabelInMacro(Identifier),

    #[error("Expected a cell (`bowl`, `#N` or a number), found {0} instead")]
    ExpectedCell(Token),

    #[error("Expected a value (`bowl`, `#N`, a number or `empty`), found {0} instead")]
    ExpectedValue(Token),

    #[error("Expected a number, found {0} instead")]
    ExpectedInteger(Token),

    #[error("Expected a string, found {0} instead")]
    ExpectedString(Token),

    #[error("Expected a comparison operator, found {0} instead")]
    ExpectedComparison(Token),

    #[error("Expected {0}, found {1} instead")]
    UnexpectedToken(Token, Token),

    #[error("Expected {0}, none was found instead")]
    MissingToken(Token),

    #[error("Expected identifier")]
    ExpectedId,

    #[error("Expected a statement, found {0} instead")]
    ExpectedStatement(Token),

    #[error("Abrupt end of program")]
    UnexpectedEof,
}

/// Flujo de tokens clonable, para lookahead arbitrario.
pub trait TokenStream<'a>: Iterator<Item = &'a Located<Token>> + Clone {}

impl<'a, I> TokenStream<'a> for I where I: Iterator<Item = &'a Located<Token>> + Clone {}

/// Construye un [`Program`] a partir de un flujo de tokens.
///
/// `start` es la ubicación que se reporta para errores que ocurren antes
/// del primer token.
pub fn parse<'a>(tokens: impl TokenStream<'a>, start: Location) -> Result<Program, Located<ParserError>> {
    let mut parser = Parser {
        tokens: tokens.peekable(),
        last_known: start,
        symbols: SymbolTable::default(),
        macro_depth: 0,
        lifetime_hack: PhantomData,
    };

    let program = parser.program().map_err(Failure::coerce)?;
    debug!(
        "Parsed {} top-level statements, {} labels, {} macros",
        program.body.0.len(),
        program.symbols.labels.len(),
        program.symbols.macros.len()
    );

    Ok(program)
}

struct Parser<'a, I: TokenStream<'a>> {
    tokens: Peekable<I>,
    last_known: Location,
    symbols: SymbolTable,
    macro_depth: u32,
    lifetime_hack: PhantomData<&'a ()>,
}

enum Failure {
    Weak(Located<ParserError>),
    Strict(Located<ParserError>),
}

impl Failure {
    fn coerce(self) -> Located<ParserError> {
        match self {
            Failure::Weak(error) => error,
            Failure::Strict(error) => error,
        }
    }
}

type Parse<T> = Result<T, Failure>;

impl<'a, I: TokenStream<'a>> Parser<'a, I> {
    fn program(&mut self) -> Parse<Program> {
        let body = self.statements(false)?;

        Ok(Program {
            body,
            symbols: std::mem::take(&mut self.symbols),
        })
    }

    /// Sentencias hasta el fin de entrada o, si `nested`, hasta el
    /// `Dedent` que cierra el bloque actual.
    fn statements(&mut self, nested: bool) -> Parse<Block> {
        let mut statements = Vec::new();
        loop {
            match self.peek() {
                None if nested => return self.fail(ParserError::UnexpectedEof),
                None => break,

                Some(Token::Newline) => {
                    self.next()?;
                }

                Some(Token::Dedent) if nested => {
                    self.next()?;
                    break;
                }

                Some(_) => statements.push(self.statement()?),
            }
        }

        if nested && statements.is_empty() {
            return self.fail(ParserError::EmptyBlock);
        }

        Ok(Block(statements))
    }

    fn statement(&mut self) -> Parse<Located<Statement>> {
        let (location, token) = self.next()?.split();
        let statement = match token {
            Token::Keyword(keyword) => self.keyword_statement(keyword)?,

            Token::Id(name) => {
                self.no_more_operands(&name, "no", 0)?;
                Statement::MacroCall(Located::at(name, location.clone()))
            }

            Token::Indent => return self.fail(ParserError::UnexpectedIndent),
            Token::Dedent => return self.fail(ParserError::UnbalancedDedent),
            token => return self.fail(ParserError::ExpectedStatement(token)),
        };

        Ok(Located::at(statement, location))
    }

    fn keyword_statement(&mut self, keyword: Keyword) -> Parse<Statement> {
        use Keyword::*;

        let statement = match keyword {
            Peck => self.bare(keyword, Statement::Increment)?,
            Scratch => self.bare(keyword, Statement::Decrement)?,
            Hop => self.bare(keyword, Statement::MoveRight)?,
            Hopback => self.bare(keyword, Statement::MoveLeft)?,
            Squawk => self.bare(keyword, Statement::PrintCell)?,
            Preen => self.bare(keyword, Statement::ResetPointer)?,
            Poop => self.bare(keyword, Statement::ClearCell)?,
            Perish => self.bare(keyword, Statement::End)?,

            Gulp => {
                let preset = self.optional(Parser::preset)?;
                self.no_more_operands(&keyword, "at most 1", preset.is_some() as usize)?;

                Statement::ReadInput(preset)
            }

            Stomach => {
                let location = self.last_known.clone();
                let (size, found) = match self.peek() {
                    Some(Token::Id(_)) => (Located::at(DEFAULT_STOMACH_SIZE, location), 0),
                    _ => (self.required(keyword, "1 or 2", 0, Parser::integer)?, 1),
                };

                let name = match self.peek() {
                    Some(Token::Id(_)) => Some(self.id()?),
                    _ => None,
                };

                self.no_more_operands(&keyword, "1 or 2", found + name.is_some() as usize)?;
                match name {
                    None => Statement::DeclareArray(size),
                    Some(name) => {
                        let region = self
                            .symbols
                            .define_stomach(&name, *size.val())
                            .map_err(|error| Failure::Strict(Located::at(error, name.location().clone())))?;

                        Statement::DeclareStomach { name, region, size }
                    }
                }
            }

            Devour => {
                let into = match self.peek() {
                    Some(Token::Keyword(Into)) => {
                        self.next()?;
                        Some(self.target()?)
                    }

                    _ => None,
                };

                let content = self.optional(Parser::string)?.map(Located::into_inner);
                let found = into.is_some() as usize + content.is_some() as usize;
                self.no_more_operands(&keyword, "at most 2", found)?;

                Statement::ReadString { into, content }
            }

            Regurgitate => {
                let target = self.optional(Parser::target)?;
                self.no_more_operands(&keyword, "at most 1", target.is_some() as usize)?;

                Statement::PrintDevoured(target)
            }

            Mimic => {
                let text = self.required(keyword, "1", 0, Parser::string)?;
                self.no_more_operands(&keyword, "1", 1)?;

                Statement::PrintLiteral(text.into_inner())
            }

            Bob => {
                let location = self.last_known.clone();
                let seconds = self.optional(Parser::integer)?;
                let found = seconds.is_some() as usize;
                self.no_more_operands(&keyword, "at most 1", found)?;

                Statement::Delay(seconds.unwrap_or_else(|| Located::at(1, location)))
            }

            Flyto => {
                let target = self.id()?;
                self.no_more_operands(&keyword, "no", 0)?;

                Statement::Jump {
                    target,
                    label: None,
                }
            }

            Flap => {
                let target = self.id()?;
                let left = self.required(keyword, "2", 0, Parser::value)?;
                let op = self.comparison()?;
                let right = self.required(keyword, "2", 1, Parser::value)?;
                self.no_more_operands(&keyword, "2", 2)?;

                Statement::ConditionalJump {
                    target,
                    label: None,
                    left,
                    op,
                    right,
                }
            }

            Add | Sub | Mul | Div => {
                let op = match keyword {
                    Add => ArithOp::Add,
                    Sub => ArithOp::Sub,
                    Mul => ArithOp::Mul,
                    _ => ArithOp::Div,
                };

                let cell = self.required(keyword, "2", 0, Parser::cell)?;
                let operand = self.required(keyword, "2", 1, Parser::value)?;
                self.no_more_operands(&keyword, "2", 2)?;

                Statement::Arithmetic { op, cell, operand }
            }

            Circle => Statement::Loop(self.block()?),

            Perch => {
                let name = self.id()?;
                if self.macro_depth > 0 {
                    let error = ParserError::LabelInMacro(name.val().clone());
                    return Err(Failure::Strict(Located::at(error, name.location().clone())));
                }

                let label = self
                    .symbols
                    .define_label(&name)
                    .map_err(|error| Failure::Strict(Located::at(error, name.location().clone())))?;

                let body = self.block()?;
                Statement::LabelDef { name, label, body }
            }

            Chirp => {
                let name = self.id()?;
                if self.symbols.macro_body(name.val()).is_some() {
                    let error = ParserError::Redefinition("macro", name.val().clone());
                    return Err(Failure::Strict(Located::at(error, name.location().clone())));
                }

                self.macro_depth += 1;
                let body = self.block();
                self.macro_depth -= 1;

                let body = Rc::new(body?);
                self.symbols
                    .define_macro(&name, Rc::clone(&body))
                    .map_err(|error| Failure::Strict(Located::at(error, name.location().clone())))?;

                Statement::MacroDef { name, body }
            }

            Bowl | Into | Empty => {
                return self.fail(ParserError::ExpectedStatement(Token::Keyword(keyword)))
            }
        };

        Ok(statement)
    }

    fn bare(&mut self, keyword: Keyword, statement: Statement) -> Parse<Statement> {
        self.no_more_operands(&keyword, "no", 0)?;
        Ok(statement)
    }

    fn block(&mut self) -> Parse<Block> {
        self.expect(Token::Colon)?;
        self.expect(Token::Newline)?;

        match self.next().map(Located::into_inner) {
            Ok(Token::Indent) => self.statements(true),
            _ => self.fail(ParserError::EmptyBlock),
        }
    }

    /// Operando obligatorio. La ausencia de operandos es un error de
    /// aridad; un operando de clase incorrecta es un error de la regla.
    fn required<T, F>(&mut self, keyword: Keyword, expected: &'static str, found: usize, rule: F) -> Parse<T>
    where
        F: FnOnce(&mut Self) -> Parse<T>,
    {
        match self.peek() {
            Some(token) if is_operand(token) => rule(self),
            _ => {
                let error = ParserError::Arity {
                    statement: keyword.to_string(),
                    expected,
                    found,
                };

                self.fail(error)
            }
        }
    }

    /// Falla si quedan operandos sobrantes después de una sentencia.
    fn no_more_operands<S>(&mut self, statement: &S, expected: &'static str, found: usize) -> Parse<()>
    where
        S: ToString + ?Sized,
    {
        let mut lookahead = self.tokens.clone();
        let first = match lookahead.peek() {
            Some(token) if is_operand(token.val()) => token.location().clone(),
            _ => return Ok(()),
        };

        let extra = lookahead.take_while(|token| is_operand(token.val())).count();
        let error = ParserError::Arity {
            statement: statement.to_string(),
            expected,
            found: found + extra,
        };

        Err(Failure::Strict(Located::at(error, first)))
    }

    fn preset(&mut self) -> Parse<Located<u32>> {
        let (location, token) = self.next()?.split();
        match token {
            Token::IntLiteral(integer) => Ok(Located::at(integer, location)),
            Token::StrLiteral(string) => {
                let byte = string.bytes().next().unwrap_or(0);
                Ok(Located::at(byte as u32, location))
            }

            token if is_operand(&token) => self.fail(ParserError::ExpectedInteger(token)),
            token => self.weak(ParserError::ExpectedInteger(token)),
        }
    }

    fn integer(&mut self) -> Parse<Located<u32>> {
        let (location, token) = self.next()?.split();
        match token {
            Token::IntLiteral(integer) => Ok(Located::at(integer, location)),
            token if is_operand(&token) => self.fail(ParserError::ExpectedInteger(token)),
            token => self.weak(ParserError::ExpectedInteger(token)),
        }
    }

    fn string(&mut self) -> Parse<Located<Rc<str>>> {
        let (location, token) = self.next()?.split();
        match token {
            Token::StrLiteral(string) => Ok(Located::at(string, location)),
            token if is_operand(&token) => self.fail(ParserError::ExpectedString(token)),
            token => self.weak(ParserError::ExpectedString(token)),
        }
    }

    fn cell(&mut self) -> Parse<Cell> {
        match self.next()?.into_inner() {
            Token::Keyword(Keyword::Bowl) => Ok(Cell::Bowl),
            Token::CellRef(index) | Token::IntLiteral(index) => Ok(Cell::At(index)),
            token if is_operand(&token) => self.fail(ParserError::ExpectedCell(token)),
            token => self.weak(ParserError::ExpectedCell(token)),
        }
    }

    fn target(&mut self) -> Parse<Target> {
        match self.peek() {
            Some(Token::Id(_)) => Ok(Target::Stomach {
                name: self.id()?,
                region: None,
            }),

            _ => self.cell().map(Target::Cell),
        }
    }

    fn value(&mut self) -> Parse<Operand> {
        match self.next()?.into_inner() {
            Token::Keyword(Keyword::Bowl) => Ok(Operand::Cell(Cell::Bowl)),
            Token::Keyword(Keyword::Empty) => Ok(Operand::Value(0)),
            Token::CellRef(index) => Ok(Operand::Cell(Cell::At(index))),
            Token::IntLiteral(value) => Ok(Operand::Value(value)),
            token if is_operand(&token) => self.fail(ParserError::ExpectedValue(token)),
            token => self.weak(ParserError::ExpectedValue(token)),
        }
    }

    fn comparison(&mut self) -> Parse<Comparison> {
        match self.next()?.into_inner() {
            Token::Op(op) => Ok(op),
            token => self.fail(ParserError::ExpectedComparison(token)),
        }
    }

    fn optional<T, F>(&mut self, rule: F) -> Parse<Option<T>>
    where
        F: FnOnce(&mut Self) -> Parse<T>,
    {
        match self.attempt(rule) {
            Err(Failure::Weak(_)) => Ok(None),
            result => Ok(Some(result?)),
        }
    }

    /// Aplica una regla, retrocediendo el cursor si falla.
    ///
    /// Solo se restaura la posición en el flujo; las reglas que se
    /// intentan de esta forma no definen símbolos.
    fn attempt<T, F>(&mut self, rule: F) -> Parse<T>
    where
        F: FnOnce(&mut Self) -> Parse<T>,
    {
        let tokens = self.tokens.clone();
        let last_known = self.last_known.clone();

        let result = rule(self);
        if result.is_err() {
            self.tokens = tokens;
            self.last_known = last_known;
        }

        result
    }

    fn id(&mut self) -> Parse<Located<Identifier>> {
        let (location, token) = self.next()?.split();
        match token {
            Token::Id(id) => Ok(Located::at(id, location)),
            _ => self.fail(ParserError::ExpectedId),
        }
    }

    fn expect(&mut self, token: Token) -> Parse<()> {
        match self.next().map(Located::into_inner) {
            Ok(found) if found == token => Ok(()),
            Ok(found) => self.fail(ParserError::UnexpectedToken(token, found)),
            Err(_) => self.fail(ParserError::MissingToken(token)),
        }
    }

    fn peek(&mut self) -> Option<&'a Token> {
        self.tokens.peek().copied().map(Located::val)
    }

    fn next(&mut self) -> Parse<Located<Token>> {
        match self.tokens.next() {
            Some(token) => {
                self.last_known = token.location().clone();
                Ok(token.clone())
            }

            None => self.fail(ParserError::UnexpectedEof),
        }
    }

    fn fail<T>(&self, error: ParserError) -> Parse<T> {
        Err(Failure::Strict(Located::at(error, self.last_known.clone())))
    }

    fn weak<T>(&self, error: ParserError) -> Parse<T> {
        Err(Failure::Weak(Located::at(error, self.last_known.clone())))
    }
}

/// Tokens que pueden aparecer como operandos de una sentencia.
fn is_operand(token: &Token) -> bool {
    matches!(
        token,
        Token::IntLiteral(_)
            | Token::CellRef(_)
            | Token::StrLiteral(_)
            | Token::Keyword(Keyword::Bowl)
            | Token::Keyword(Keyword::Empty)
            | Token::Keyword(Keyword::Into)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex::Lexer, source};

    fn parse_str(text: &str) -> Result<Program, ParserError> {
        let (start, stream) = source::consume(text.as_bytes(), "test.prrt");
        let tokens = Lexer::new(start.clone(), stream).collect_tokens().unwrap();

        parse(tokens.iter(), start).map_err(Located::into_inner)
    }

    fn statements(program: &Program) -> Vec<Statement> {
        program
            .body()
            .statements()
            .iter()
            .map(|statement| statement.val().clone())
            .collect()
    }

    #[test]
    fn several_statements_per_line() {
        let program = parse_str("peck peck squawk\nhop preen\n").unwrap();
        assert_eq!(
            statements(&program),
            vec![
                Statement::Increment,
                Statement::Increment,
                Statement::PrintCell,
                Statement::MoveRight,
                Statement::ResetPointer,
            ]
        );
    }

    #[test]
    fn arithmetic_operands() {
        let program = parse_str("add bowl #3\nsub 2 empty\nmul #1 7\ndiv 0 bowl\n").unwrap();
        assert_eq!(
            statements(&program),
            vec![
                Statement::Arithmetic {
                    op: ArithOp::Add,
                    cell: Cell::Bowl,
                    operand: Operand::Cell(Cell::At(3)),
                },
                Statement::Arithmetic {
                    op: ArithOp::Sub,
                    cell: Cell::At(2),
                    operand: Operand::Value(0),
                },
                Statement::Arithmetic {
                    op: ArithOp::Mul,
                    cell: Cell::At(1),
                    operand: Operand::Value(7),
                },
                Statement::Arithmetic {
                    op: ArithOp::Div,
                    cell: Cell::At(0),
                    operand: Operand::Cell(Cell::Bowl),
                },
            ]
        );
    }

    #[test]
    fn nested_loops() {
        let program = parse_str("circle:\n    circle:\n        peck\n    hop\nsquawk\n").unwrap();
        let body = program.body().statements();
        assert_eq!(body.len(), 2);

        let outer = match body[0].val() {
            Statement::Loop(outer) => outer.statements(),
            other => panic!("expected loop, found {:?}", other),
        };

        assert_eq!(outer.len(), 2);
        assert!(matches!(outer[0].val(), Statement::Loop(inner) if inner.statements().len() == 1));
        assert_eq!(*outer[1].val(), Statement::MoveRight);
        assert_eq!(*body[1].val(), Statement::PrintCell);
    }

    #[test]
    fn labels_and_jumps() {
        let program = parse_str("perch top:\n  peck\n  flap top bowl < 10\nflyto top\n").unwrap();
        let top = Identifier::new("TOP");

        assert_eq!(program.symbols().label(&top), Some(Label(0)));
        assert_eq!(program.symbols().label_count(), 1);

        let body = match program.body().statements()[0].val() {
            Statement::LabelDef { body, label, .. } => {
                assert_eq!(*label, Label(0));
                body.statements().to_vec()
            }

            other => panic!("expected label, found {:?}", other),
        };

        assert!(matches!(
            body[1].val(),
            Statement::ConditionalJump {
                label: None,
                left: Operand::Cell(Cell::Bowl),
                op: Comparison::Less,
                right: Operand::Value(10),
                ..
            }
        ));

        assert!(matches!(
            program.body().statements()[1].val(),
            Statement::Jump { label: None, .. }
        ));
    }

    #[test]
    fn macros_are_stored_not_expanded() {
        let program = parse_str("chirp double:\n  peck peck\ndouble\nsquawk\n").unwrap();
        let name = Identifier::new("double");

        let body = program.symbols().macro_body(&name).unwrap();
        assert_eq!(body.statements().len(), 2);
        assert!(matches!(
            program.body().statements()[1].val(),
            Statement::MacroCall(call) if *call.val() == name
        ));
    }

    #[test]
    fn optional_operands() {
        let program =
            parse_str("gulp\ngulp 65\ngulp \"B\"\nbob\nbob 3\nregurgitate\nregurgitate #4\n").unwrap();
        let statements = statements(&program);

        assert!(matches!(&statements[0], Statement::ReadInput(None)));
        assert!(matches!(&statements[1], Statement::ReadInput(Some(byte)) if *byte.val() == 65));
        assert!(matches!(&statements[2], Statement::ReadInput(Some(byte)) if *byte.val() == 66));
        assert!(matches!(&statements[3], Statement::Delay(seconds) if *seconds.val() == 1));
        assert!(matches!(&statements[4], Statement::Delay(seconds) if *seconds.val() == 3));
        assert_eq!(statements[5], Statement::PrintDevoured(None));
        assert_eq!(statements[6], Statement::PrintDevoured(Some(Target::Cell(Cell::At(4)))));
    }

    #[test]
    fn devour_forms() {
        let program = parse_str("devour\ndevour into #8\ndevour \"hi\"\ndevour into bowl \"yo\"\n").unwrap();
        let statements = statements(&program);

        assert_eq!(
            statements[0],
            Statement::ReadString {
                into: None,
                content: None
            }
        );
        assert_eq!(
            statements[1],
            Statement::ReadString {
                into: Some(Target::Cell(Cell::At(8))),
                content: None
            }
        );
        assert_eq!(
            statements[2],
            Statement::ReadString {
                into: None,
                content: Some(Rc::from("hi"))
            }
        );
        assert_eq!(
            statements[3],
            Statement::ReadString {
                into: Some(Target::Cell(Cell::Bowl)),
                content: Some(Rc::from("yo"))
            }
        );
    }

    #[test]
    fn named_stomachs() {
        let program = parse_str("stomach 4 buf\nstomach line\nstomach 3\ndevour into buf \"hi\"\nregurgitate line\n").unwrap();
        let statements = statements(&program);
        let symbols = program.symbols();

        let buf = Identifier::new("buf");
        assert_eq!(symbols.stomach(&buf), Some(Region(0)));
        assert_eq!(symbols.stomach(&Identifier::new("line")), Some(Region(1)));
        assert_eq!(symbols.stomach_sizes(), &[4, DEFAULT_STOMACH_SIZE]);

        assert!(matches!(
            &statements[0],
            Statement::DeclareStomach { region: Region(0), size, .. } if *size.val() == 4
        ));
        assert!(matches!(&statements[2], Statement::DeclareArray(size) if *size.val() == 3));
        assert!(matches!(
            &statements[3],
            Statement::ReadString {
                into: Some(Target::Stomach { name, region: None }),
                content: Some(_),
            } if *name.val() == buf
        ));
        assert!(matches!(
            &statements[4],
            Statement::PrintDevoured(Some(Target::Stomach { .. }))
        ));
    }

    #[test]
    fn empty_stomach_is_rejected() {
        assert!(matches!(
            parse_str("stomach 0 nothing\n").unwrap_err(),
            ParserError::EmptyStomach(_)
        ));

        assert!(matches!(
            parse_str("stomach 2 a 3\n").unwrap_err(),
            ParserError::Arity { found: 3, .. }
        ));
    }

    #[test]
    fn arity_errors() {
        assert!(matches!(
            parse_str("add #1\n").unwrap_err(),
            ParserError::Arity { found: 1, .. }
        ));

        assert!(matches!(
            parse_str("peck 3\n").unwrap_err(),
            ParserError::Arity { found: 1, .. }
        ));

        assert!(matches!(
            parse_str("chirp m:\n  peck\nm 1 2\n").unwrap_err(),
            ParserError::Arity { found: 2, .. }
        ));

        assert!(matches!(
            parse_str("sub #1 2 3\n").unwrap_err(),
            ParserError::Arity { found: 3, .. }
        ));

        assert!(matches!(
            parse_str("mimic\n").unwrap_err(),
            ParserError::Arity { found: 0, .. }
        ));
    }

    #[test]
    fn operand_kind_errors() {
        assert!(matches!(
            parse_str("add \"x\" 1\n").unwrap_err(),
            ParserError::ExpectedCell(Token::StrLiteral(_))
        ));

        assert!(matches!(
            parse_str("add bowl \"x\"\n").unwrap_err(),
            ParserError::ExpectedValue(Token::StrLiteral(_))
        ));

        assert!(matches!(
            parse_str("stomach bowl\n").unwrap_err(),
            ParserError::ExpectedInteger(_)
        ));

        assert!(matches!(
            parse_str("perch a:\n  peck\nflap a bowl 3\n").unwrap_err(),
            ParserError::ExpectedComparison(_)
        ));
    }

    #[test]
    fn redefinitions() {
        assert!(matches!(
            parse_str("perch a:\n  peck\nperch A:\n  hop\n").unwrap_err(),
            ParserError::Redefinition("label", _)
        ));

        assert!(matches!(
            parse_str("chirp m:\n  peck\nchirp m:\n  hop\n").unwrap_err(),
            ParserError::Redefinition("macro", _)
        ));

        assert!(matches!(
            parse_str("chirp m:\n    chirp m:\n        peck\n    hop\nm squawk\n").unwrap_err(),
            ParserError::Redefinition("macro", _)
        ));

        assert!(matches!(
            parse_str("stomach 4 buf\nstomach 8 BUF\n").unwrap_err(),
            ParserError::Redefinition("stomach", _)
        ));

        // Etiquetas, macros y estómagos viven en espacios de nombres distintos
        assert!(parse_str("perch x:\n  peck\nchirp x:\n  hop\nstomach x\n").is_ok());
    }

    #[test]
    fn labels_are_rejected_inside_macros() {
        assert!(matches!(
            parse_str("chirp m:\n  perch inner:\n    peck\n").unwrap_err(),
            ParserError::LabelInMacro(_)
        ));
    }

    #[test]
    fn block_shape_errors() {
        assert!(matches!(
            parse_str("circle:\npeck\n").unwrap_err(),
            ParserError::EmptyBlock
        ));

        assert!(matches!(
            parse_str("circle:\n").unwrap_err(),
            ParserError::EmptyBlock
        ));

        assert!(matches!(
            parse_str("circle\n  peck\n").unwrap_err(),
            ParserError::UnexpectedToken(Token::Colon, Token::Newline)
        ));

        assert!(matches!(
            parse_str("peck\n  hop\n").unwrap_err(),
            ParserError::UnexpectedIndent
        ));

        assert!(matches!(
            parse_str("perch\n").unwrap_err(),
            ParserError::ExpectedId
        ));
    }

    #[test]
    fn statements_are_located_at_their_keyword() {
        let (start, stream) = source::consume("peck\n   squawk\n".as_bytes(), "at.prrt");
        let tokens = Lexer::new(start.clone(), stream).collect_tokens();

        // La indentación sin bloque se rechaza, pero el error apunta a la línea 2
        let error = parse(tokens.unwrap().iter(), start).unwrap_err();
        assert_eq!(error.location().start().line(), 2);
    }
}
