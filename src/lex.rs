//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone un [`InputStream`]
//! (flujo de caracteres) en unidades léxicas denominadas tokens. Los espacios
//! en blanco y los comentarios se descartan durante esta operación. Cada
//! token emitido esta asociado a una ubicación en el código fuente original,
//! lo cual permite rastrear errores en tanto los mismos como constructos
//! más elevados de fases posteriores.
//!
//! # Indentación
//! Los bloques se delimitan por indentación. El lexer sintetiza tokens
//! [`Token::Indent`] y [`Token::Dedent`] a partir de una pila explícita de
//! anchos de indentación. La indentación de una línea es la columna de su
//! primer token real, por lo cual las líneas vacías o con solo comentarios
//! no la afectan. La unidad de indentación se fija con la primera línea
//! indentada del programa y toda indentación posterior debe ser múltiplo
//! de esa unidad.
//!
//! # Reglas importantes del lenguaje
//! - `:>` inicia un comentario de línea.
//! - `(:` inicia un comentario de bloque que termina en `:)` y que puede
//!   abarcar varias líneas.
//! - Las palabras clave y los identificadores son case-insensitive,
//!   por lo cual tanto `squawk` como `SQUAWK` y `SqUaWk` resultan
//!   en la palabra clave [`Keyword::Squawk`].
//!
//! # Errores
//! El lexer se detiene en el primer error. Luego de emitirlo, el
//! iterador no produce más elementos.

use crate::source::{InputStream, Located, Location};
use std::{
    collections::VecDeque,
    fmt::{self, Display},
    rc::Rc,
    str::FromStr,
};

use log::{debug, trace};
use thiserror::Error;

// Case-insensitive
pub use unicase::Ascii as NoCase;

/// Literal entero máximo.
const INT_MAX: u32 = u32::MAX;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Error de E/S originado por el [`InputStream`].
    #[error("I/O error")]
    Input(#[from] std::io::Error),

    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Bad character {0:?} in input stream")]
    BadChar(char),

    /// Se esperaba un carácter específico en esta posición.
    #[error("Expected {0:?}")]
    Expected(char),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer literal overflow, valid range is [0, {INT_MAX}]")]
    IntOverflow,

    /// `#` debe ir seguido del número de celda.
    #[error("Expected a cell number after `#`")]
    EmptyCellRef,

    /// La línea terminó antes de cerrar un literal de string.
    #[error("Unterminated string literal")]
    UnterminatedString,

    /// La entrada terminó dentro de un comentario de bloque.
    #[error("Unterminated block comment, expected `:)`")]
    UnterminatedComment,

    /// Secuencia de escape desconocida.
    #[error("Unknown escape sequence `\\{0}`")]
    BadEscape(char),

    /// `:)` fuera de un comentario de bloque.
    #[error("Stray `:)` outside of a block comment")]
    StrayCommentEnd,

    /// La indentación no es múltiplo de la unidad establecida.
    #[error("Indentation of {width} columns is not a multiple of the indentation unit ({unit})")]
    Misaligned { width: u32, unit: u32 },

    /// Se redujo la indentación a un nivel que nunca se abrió.
    #[error("Dedent to {0} columns does not match any enclosing indentation level")]
    BadDedent(u32),
}

/// Un identificador.
///
/// Dos identificadores son iguales si difieren solamente en mayúsculas.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Rc<NoCase<String>>);

impl Identifier {
    /// Construye un identificador a partir de su lexema.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Identifier(Rc::new(NoCase::new(name.into())))
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        let name: &String = &self.0;
        name
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_ref())
    }
}

/// Operador de comparación para saltos condicionales.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Comparison {
    /// Evalúa la comparación sobre dos valores de celda sin signo.
    pub fn holds(self, left: u8, right: u8) -> bool {
        use Comparison::*;

        match self {
            Equal => left == right,
            NotEqual => left != right,
            Less => left < right,
            LessOrEqual => left <= right,
            Greater => left > right,
            GreaterOrEqual => left >= right,
        }
    }
}

impl Display for Comparison {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Comparison::*;

        let string = match self {
            Equal => "==",
            NotEqual => "!=",
            Less => "<",
            LessOrEqual => "<=",
            Greater => ">",
            GreaterOrEqual => ">=",
        };

        fmt.write_str(string)
    }
}

/// Objeto resultante del análisis léxico.
///
/// Un token contiene suficiente información para describir completamente
/// a una entidad léxica en el programa fuente.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identificador.
    Id(Identifier),

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal de entero.
    IntLiteral(u32),

    /// Referencia literal a una celda, `#N`.
    CellRef(u32),

    /// Literal de string, con escapes ya resueltos.
    StrLiteral(Rc<str>),

    /// Operador de comparación.
    Op(Comparison),

    /// `:`
    Colon,

    /// Fin de una línea que contenía tokens.
    Newline,

    /// Aumento de un nivel de indentación.
    Indent,

    /// Cierre de un nivel de indentación.
    Dedent,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            IntLiteral(integer) => write!(fmt, "literal `{}`", integer),
            CellRef(cell) => write!(fmt, "cell `#{}`", cell),
            StrLiteral(string) => write!(fmt, "string {:?}", string),
            Op(op) => write!(fmt, "`{}`", op),
            Colon => fmt.write_str("`:`"),
            Newline => fmt.write_str("end of line"),
            Indent => fmt.write_str("indentation"),
            Dedent => fmt.write_str("end of block"),
        }
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Peck,
    Scratch,
    Hop,
    Hopback,
    Gulp,
    Squawk,
    Stomach,
    Devour,
    Regurgitate,
    Bowl,
    Mimic,
    Preen,
    Poop,
    Perch,
    Chirp,
    Flyto,
    Flap,
    Add,
    Sub,
    Mul,
    Div,
    Bob,
    Perish,
    Into,
    Empty,
    Circle,
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("peck",        Keyword::Peck),
    ("scratch",     Keyword::Scratch),
    ("hop",         Keyword::Hop),
    ("hopback",     Keyword::Hopback),
    ("gulp",        Keyword::Gulp),
    ("squawk",      Keyword::Squawk),
    ("stomach",     Keyword::Stomach),
    ("devour",      Keyword::Devour),
    ("regurgitate", Keyword::Regurgitate),
    ("bowl",        Keyword::Bowl),
    ("mimic",       Keyword::Mimic),
    ("preen",       Keyword::Preen),
    ("poop",        Keyword::Poop),
    ("perch",       Keyword::Perch),
    ("chirp",       Keyword::Chirp),
    ("flyto",       Keyword::Flyto),
    ("flap",        Keyword::Flap),
    ("add",         Keyword::Add),
    ("sub",         Keyword::Sub),
    ("mul",         Keyword::Mul),
    ("div",         Keyword::Div),
    ("bob",         Keyword::Bob),
    ("perish",      Keyword::Perish),
    ("into",        Keyword::Into),
    ("empty",       Keyword::Empty),
    ("circle",      Keyword::Circle),
];

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let string = KEYWORDS
            .iter()
            .find(|&&(_, keyword)| keyword == *self)
            .map(|&(name, _)| name)
            .unwrap_or("?");

        fmt.write_str(string)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        KEYWORDS
            .iter()
            .find(|&&(name, _)| NoCase::new(name) == NoCase::new(string))
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<S: Iterator> {
    source: std::iter::Peekable<S>,
    state: State,
    start: Location,
    last: Location,
    layout: Layout,
    pending: VecDeque<Located<Token>>,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Se emitió un error o se llegó al final; no hay más tokens.
    Done,

    /// Estado de completitud; siempre emite el token incluido,
    /// consume la entrada actual y pasa a [`State::Start`].
    Complete(Token),

    /// Se encontró `:`. Puede ser `:` o el inicio de `:>`.
    Colon,

    /// Se encontró `(`. Solo puede iniciar `(:`.
    Paren,

    /// Comentario de línea.
    ///
    /// Este estado vuelve a [`State::Start`] al encontrar `'\n'`,
    /// sin consumirlo.
    LineComment,

    /// Comentario de bloque.
    BlockComment,

    /// Se encontró `:` dentro de un comentario de bloque.
    BlockCommentColon,

    /// Constante entera.
    ///
    /// Este estado incluirá dígitos en el token mientras que
    /// el siguiente carácter sea un dígito.
    Integer(u32),

    /// Referencia a celda, `#` seguido de dígitos.
    CellRef(Option<u32>),

    /// Término que puede ser un identificador o una palabra clave.
    Word(String),

    /// Literal de string en construcción.
    Str(String),

    /// Se encontró `\` dentro de un string.
    StrEscape(String),

    /// Operador de comparación que puede extenderse con `=`.
    Operator(char),
}

/// Seguimiento de la indentación.
struct Layout {
    /// Anchos de los niveles abiertos; el fondo siempre es cero.
    widths: Vec<u32>,

    /// Unidad de indentación, fijada por la primera línea indentada.
    unit: Option<u32>,

    /// Si ya se emitió algún token en la línea actual.
    in_line: bool,

    /// Indentación de la línea física actual, si ya se conoce.
    ///
    /// Se mide en el primer carácter no blanco de la línea, aunque
    /// este inicie un comentario. Una línea que comienza dentro de un
    /// comentario de bloque conserva el nivel vigente.
    margin: Option<u32>,
}

impl<S: InputStream> Lexer<S> {
    /// Crea un lexer en estado inicial a partir de un flujo.
    pub fn new(start: Location, source: S) -> Self {
        let last = start.clone();
        Lexer {
            source: source.peekable(),
            state: State::Start,
            start,
            last,
            layout: Layout {
                widths: vec![0],
                unit: None,
                in_line: false,
                margin: None,
            },
            pending: VecDeque::new(),
        }
    }

    /// Reduce la entrada a una secuencia completa de tokens.
    ///
    /// Falla con el primer error léxico encontrado.
    pub fn collect_tokens(self) -> Result<Vec<Located<Token>>, Located<LexerError>> {
        let tokens = self.collect::<Result<Vec<_>, _>>()?;
        debug!("Lexed {} tokens", tokens.len());

        Ok(tokens)
    }

    /// Avanza hasta encolar al menos un token o terminar.
    fn lex(&mut self) -> Result<(), Located<LexerError>> {
        use State::*;

        let token = loop {
            // Se espera un siguiente carácter, fallando si hay error de E/S
            let (next_char, here) = match self.source.peek() {
                None => (None, self.last.clone()),
                Some(Ok((c, location))) => (Some(*c), location.clone()),
                Some(Err(_)) => {
                    let error = match self.source.next() {
                        Some(Err(error)) => error,
                        _ => unreachable!(),
                    };

                    return Err(Located::at(error.into(), self.last.clone()));
                }
            };

            // La posición de origen se mueve junto a la posición
            // siguiente siempre que no se haya encontrado una
            // frontera de token
            if let Start = self.state {
                self.start = here.clone();

                let blank = next_char.map_or(true, |c| c.is_ascii_whitespace());
                if !blank && self.layout.margin.is_none() {
                    self.layout.margin = Some(here.start().column() - 1);
                }
            }

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            match (&mut self.state, next_char) {
                (Done, _) => return Ok(()),

                // Fin de entrada: se cierran la línea y todos los bloques
                (Start, None) => {
                    self.finish(here);
                    return Ok(());
                }

                // Fin de línea, solo es significativo si hubo tokens
                (Start, Some('\n')) if self.layout.in_line => self.state = Complete(Token::Newline),

                // Tokens triviales
                (Start, Some(':')) => self.state = Colon,
                (Start, Some('(')) => self.state = Paren,
                (Start, Some('"')) => self.state = Str(String::new()),
                (Start, Some('#')) => self.state = CellRef(None),
                (Start, Some(c @ '<')) | (Start, Some(c @ '>')) | (Start, Some(c @ '='))
                | (Start, Some(c @ '!')) => self.state = Operator(c),

                // Identificadores y palabras clave
                (Start, Some(c)) if c.is_ascii_alphabetic() || c == '_' => {
                    self.state = Word(c.to_string())
                }

                // Inicio de una constante numérica. No se consume
                // el dígito, ya que esta lógica ya está implementada
                // en el respectivo caso para un estado de constante
                // entera para el cual el siguiente carácter es un
                // dígito. Por tanto, la constante es inicialmente cero.
                (Start, Some(c)) if c.is_ascii_digit() => {
                    self.state = Integer(0);
                    continue;
                }

                // Espacios en blanco y caracteres inesperados
                (Start, Some(c)) if c.is_ascii_whitespace() => (),
                (Start, Some(c)) => return self.fail(LexerError::BadChar(c), here),

                // Emisión retardada de tokens cualesquiera
                (Complete(value), _) => break std::mem::replace(value, Token::Colon),

                // `:>` es un comentario, `:)` está fuera de lugar
                (Colon, Some('>')) => self.state = LineComment,
                (Colon, Some(')')) => {
                    let start = self.start.clone();
                    return self.fail(LexerError::StrayCommentEnd, start);
                }
                (Colon, _) => break Token::Colon,

                (Paren, Some(':')) => self.state = BlockComment,
                (Paren, _) => return self.fail(LexerError::Expected(':'), here),

                // El fin de línea se procesa desde el estado inicial
                (LineComment, Some('\n')) | (LineComment, None) => {
                    self.state = Start;
                    continue;
                }
                (LineComment, Some(_)) => (),

                (BlockComment, Some(':')) => self.state = BlockCommentColon,
                (BlockCommentColon, Some(')')) => self.state = Start,
                (BlockCommentColon, Some(':')) => (),
                (BlockComment, Some('\n')) | (BlockCommentColon, Some('\n')) => {
                    self.state = BlockComment;
                    if self.layout.in_line {
                        self.layout.in_line = false;
                        self.pending.push_back(Located::at(Token::Newline, here.clone()));
                    }
                }
                (BlockComment, None) | (BlockCommentColon, None) => {
                    let start = self.start.clone();
                    return self.fail(LexerError::UnterminatedComment, start);
                }
                (BlockComment, Some(_)) => (),
                (BlockCommentColon, Some(_)) => self.state = BlockComment,

                // Acumulación dígito por dígito de constantes enteras
                (Integer(accumulated), Some(digit)) | (CellRef(Some(accumulated)), Some(digit))
                    if digit.is_ascii_digit() =>
                {
                    match accumulate(*accumulated, digit) {
                        Some(result) => *accumulated = result,
                        None => {
                            let start = self.start.clone();
                            return self.fail(LexerError::IntOverflow, start);
                        }
                    }
                }

                (CellRef(None), Some(digit)) if digit.is_ascii_digit() => {
                    self.state = CellRef(Some(digit as u32 - '0' as u32));
                }

                // Si sigue algo que no es un dígito, la constante a terminado
                (Integer(integer), _) => break Token::IntLiteral(*integer),
                (CellRef(Some(cell)), _) => break Token::CellRef(*cell),
                (CellRef(None), _) => {
                    let start = self.start.clone();
                    return self.fail(LexerError::EmptyCellRef, start);
                }

                // Extensión de términos
                (Word(word), Some(c)) if is_word_char(c) => word.push(c),

                // Si sigue algo que no puede formar parte del término, ha terminado
                (Word(word), _) => {
                    if let Ok(keyword) = Keyword::from_str(word) {
                        break Token::Keyword(keyword);
                    } else {
                        break Token::Id(Identifier::new(std::mem::take(word)));
                    }
                }

                // Strings, que no pueden cruzar líneas
                (Str(string), Some('"')) => {
                    let string = Rc::from(std::mem::take(string));
                    self.state = Complete(Token::StrLiteral(string));
                }
                (Str(string), Some('\\')) => self.state = StrEscape(std::mem::take(string)),
                (Str(_), Some('\n')) | (Str(_), None) | (StrEscape(_), Some('\n'))
                | (StrEscape(_), None) => {
                    let start = self.start.clone();
                    return self.fail(LexerError::UnterminatedString, start);
                }
                (Str(string), Some(c)) => string.push(c),

                (StrEscape(string), Some(c)) => {
                    let escaped = match c {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        '\\' => '\\',
                        '"' => '"',
                        _ => return self.fail(LexerError::BadEscape(c), here),
                    };

                    string.push(escaped);
                    self.state = Str(std::mem::take(string));
                }

                // Operadores de uno o dos caracteres
                (Operator(first), Some('=')) => {
                    let op = match first {
                        '<' => Comparison::LessOrEqual,
                        '>' => Comparison::GreaterOrEqual,
                        '!' => Comparison::NotEqual,
                        _ => Comparison::Equal,
                    };

                    self.state = Complete(Token::Op(op));
                }

                (Operator('<'), _) => break Token::Op(Comparison::Less),
                (Operator('>'), _) => break Token::Op(Comparison::Greater),
                (Operator('='), _) => break Token::Op(Comparison::Equal),
                (Operator(_), _) => return self.fail(LexerError::Expected('='), here),
            }

            // Si no hubo `continue`, aquí se consume el carácter que
            // se observó con lookahead anteriormente
            if let Some(Ok((c, location))) = self.source.next() {
                self.last = location;

                if c == '\n' {
                    self.layout.margin = match self.state {
                        BlockComment | BlockCommentColon => self.layout.widths.last().copied(),
                        _ => None,
                    };
                }
            }
        };

        self.state = Start;
        let location = Location::span(self.start.clone(), &self.last);
        self.accept(Located::at(token, location))
    }

    /// Encola un token, precedido de los cambios de indentación que
    /// correspondan si es el primero de su línea.
    fn accept(&mut self, token: Located<Token>) -> Result<(), Located<LexerError>> {
        if let Token::Newline = token.as_ref() {
            self.layout.in_line = false;
        } else if !self.layout.in_line {
            self.layout.in_line = true;
            self.indent(token.location())?;
        }

        trace!("{}: {}", token.location(), token.as_ref());
        self.pending.push_back(token);

        Ok(())
    }

    /// Compara la indentación de la línea del primer token contra la pila
    /// de indentación y encola `Indent` o `Dedent` según corresponda.
    fn indent(&mut self, location: &Location) -> Result<(), Located<LexerError>> {
        let width = self
            .layout
            .margin
            .unwrap_or_else(|| location.start().column() - 1);
        let current = *self.layout.widths.last().unwrap_or(&0);

        if width == current {
            return Ok(());
        }

        if width > 0 {
            let unit = *self.layout.unit.get_or_insert(width);
            if width % unit != 0 {
                let error = LexerError::Misaligned { width, unit };
                return self.fail(error, location.clone());
            }
        }

        if width > current {
            self.layout.widths.push(width);
            self.pending
                .push_back(Located::at(Token::Indent, location.clone()));

            return Ok(());
        }

        while self.layout.widths.last().map_or(false, |&top| top > width) {
            self.layout.widths.pop();
            self.pending
                .push_back(Located::at(Token::Dedent, location.clone()));
        }

        if self.layout.widths.last() != Some(&width) {
            return self.fail(LexerError::BadDedent(width), location.clone());
        }

        Ok(())
    }

    /// Cierra la última línea y todos los niveles de indentación abiertos.
    fn finish(&mut self, eof: Location) {
        if self.layout.in_line {
            self.layout.in_line = false;
            self.pending
                .push_back(Located::at(Token::Newline, eof.clone()));
        }

        while self.layout.widths.len() > 1 {
            self.layout.widths.pop();
            self.pending
                .push_back(Located::at(Token::Dedent, eof.clone()));
        }

        self.state = State::Done;
    }

    fn fail(&mut self, error: LexerError, location: Location) -> Result<(), Located<LexerError>> {
        self.state = State::Done;
        self.pending.clear();

        Err(Located::at(error, location))
    }
}

impl<S: InputStream> Iterator for Lexer<S> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(Ok(token));
            }

            if let State::Done = self.state {
                return None;
            }

            if let Err(error) = self.lex() {
                return Some(Err(error));
            }
        }
    }
}

/// Agrega un dígito decimal a una constante, detectando desbordamiento.
fn accumulate(accumulated: u32, digit: char) -> Option<u32> {
    let digit = digit.to_digit(10)?;
    accumulated.checked_mul(10)?.checked_add(digit)
}

/// Determina si un carácter puede pertenecer a un término.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source;

    fn lex(text: &str) -> Result<Vec<Token>, LexerError> {
        let (start, stream) = source::consume(text.as_bytes(), "test.prrt");
        Lexer::new(start, stream)
            .collect_tokens()
            .map(|tokens| tokens.into_iter().map(Located::into_inner).collect())
            .map_err(Located::into_inner)
    }

    fn id(name: &str) -> Token {
        Token::Id(Identifier::new(name))
    }

    #[test]
    fn keywords_are_case_insensitive() {
        use Keyword::*;

        let tokens = lex("peck PECK Squawk hopback\n").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Keyword(Peck),
                Token::Keyword(Peck),
                Token::Keyword(Squawk),
                Token::Keyword(Hopback),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn literals_and_operators() {
        use Token::*;

        let tokens = lex("flap done bowl >= #12 \"a\\n\\\"b\" != 7 < =").unwrap();
        assert_eq!(
            tokens,
            vec![
                Keyword(self::Keyword::Flap),
                id("done"),
                Keyword(self::Keyword::Bowl),
                Op(Comparison::GreaterOrEqual),
                CellRef(12),
                StrLiteral(Rc::from("a\n\"b")),
                Op(Comparison::NotEqual),
                IntLiteral(7),
                Op(Comparison::Less),
                Op(Comparison::Equal),
                Newline,
            ]
        );
    }

    #[test]
    fn comments_are_discarded() {
        use Token::*;

        let text = ":> a whole line\npeck :> trailing\n(: one\n   two :)\nhop\nsquawk (: inline :) poop\n";
        let tokens = lex(text).unwrap();

        assert_eq!(
            tokens,
            vec![
                Keyword(self::Keyword::Peck),
                Newline,
                Keyword(self::Keyword::Hop),
                Newline,
                Keyword(self::Keyword::Squawk),
                Keyword(self::Keyword::Poop),
                Newline,
            ]
        );
    }

    #[test]
    fn leading_comment_does_not_indent() {
        use Keyword::*;

        let tokens = lex("(: note :) peck peck squawk\n").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Keyword(Peck),
                Token::Keyword(Peck),
                Token::Keyword(Squawk),
                Token::Newline,
            ]
        );

        // Dentro de un bloque, el comentario tampoco cuenta como indentación
        let tokens = lex("circle:\n    (: a :)   peck\n    squawk\n").unwrap();
        assert_eq!(tokens.iter().filter(|token| **token == Token::Indent).count(), 1);
    }

    #[test]
    fn line_inside_block_comment_keeps_level() {
        use Keyword::*;

        let tokens = lex("peck (: a\n  b :) peck\nsquawk\n").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Keyword(Peck),
                Token::Newline,
                Token::Keyword(Peck),
                Token::Newline,
                Token::Keyword(Squawk),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn colon_before_comment() {
        use Token::*;

        let tokens = lex("perch top: :> body follows").unwrap();
        assert_eq!(
            tokens,
            vec![Keyword(self::Keyword::Perch), id("top"), Colon, Newline]
        );
    }

    #[test]
    fn nested_blocks_close_every_level() {
        use Token::*;

        let text = "circle:\n    circle:\n        peck\nsquawk\n";
        let tokens = lex(text).unwrap();

        assert_eq!(
            tokens,
            vec![
                Keyword(self::Keyword::Circle),
                Colon,
                Newline,
                Indent,
                Keyword(self::Keyword::Circle),
                Colon,
                Newline,
                Indent,
                Keyword(self::Keyword::Peck),
                Newline,
                Dedent,
                Dedent,
                Keyword(self::Keyword::Squawk),
                Newline,
            ]
        );

        let indents = tokens.iter().filter(|token| **token == Indent).count();
        let dedents = tokens.iter().filter(|token| **token == Dedent).count();
        assert_eq!(indents, dedents);
    }

    #[test]
    fn open_blocks_are_closed_at_end_of_input() {
        use Token::*;

        let tokens = lex("chirp twice:\n  peck\n  peck").unwrap();
        assert_eq!(
            tokens[tokens.len() - 3..],
            [Keyword(self::Keyword::Peck), Newline, Dedent]
        );
    }

    #[test]
    fn blank_and_comment_lines_do_not_indent() {
        use Token::*;

        let text = "perch a:\n\n  peck\n        :> deep comment\n\n  hop\n";
        let tokens = lex(text).unwrap();

        let layout: Vec<_> = tokens
            .iter()
            .filter(|token| matches!(token, Indent | Dedent))
            .collect();

        assert_eq!(layout, vec![&Indent, &Dedent]);
    }

    #[test]
    fn tabs_indent_to_tab_stops() {
        let tokens = lex("circle:\n\tpeck\n    hop\n").unwrap();
        let indents = tokens.iter().filter(|token| **token == Token::Indent).count();

        // Un tabulador y cuatro espacios son el mismo nivel
        assert_eq!(indents, 1);
    }

    #[test]
    fn misaligned_indentation() {
        let error = lex("circle:\n    circle:\n      peck\n").unwrap_err();
        assert!(matches!(error, LexerError::Misaligned { width: 6, unit: 4 }));
    }

    #[test]
    fn dedent_to_unknown_level() {
        let error = lex("circle:\n    circle:\n            peck\n        hop\n").unwrap_err();
        assert!(matches!(error, LexerError::BadDedent(8)));
    }

    #[test]
    fn unterminated_constructs() {
        assert!(matches!(
            lex("mimic \"hello\npeck").unwrap_err(),
            LexerError::UnterminatedString
        ));

        assert!(matches!(
            lex("peck (: never closed\nhop").unwrap_err(),
            LexerError::UnterminatedComment
        ));
    }

    #[test]
    fn malformed_characters() {
        assert!(matches!(lex("peck $").unwrap_err(), LexerError::BadChar('$')));
        assert!(matches!(lex("peck :)").unwrap_err(), LexerError::StrayCommentEnd));
        assert!(matches!(lex("( peck").unwrap_err(), LexerError::Expected(':')));
        assert!(matches!(lex("add # 1").unwrap_err(), LexerError::EmptyCellRef));
        assert!(matches!(lex("mimic \"\\q\"").unwrap_err(), LexerError::BadEscape('q')));
        assert!(matches!(lex("bob 99999999999").unwrap_err(), LexerError::IntOverflow));
    }

    #[test]
    fn lexer_stops_after_first_error() {
        let (start, stream) = source::consume("$ peck\n".as_bytes(), "test.prrt");
        let results: Vec<_> = Lexer::new(start, stream).collect();

        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn tokens_carry_locations() {
        let (start, stream) = source::consume("peck\n  :> x\n hopback".as_bytes(), "loc.prrt");
        let tokens = Lexer::new(start, stream).collect_tokens();

        // `hopback` está indentado sin bloque abierto; eso es asunto del parser
        let tokens = tokens.unwrap();
        let hopback = tokens
            .iter()
            .find(|token| *token.as_ref() == Token::Keyword(Keyword::Hopback))
            .unwrap();

        assert_eq!(hopback.location().start().line(), 3);
        assert_eq!(hopback.location().start().column(), 2);
        assert_eq!(hopback.location().end().column(), 9);
    }
}
