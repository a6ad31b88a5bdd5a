//! Biblioteca de soporte para programas Parrot.
//!
//! # Propósito
//! El código que emite el compilador solo manipula el puntero de datos.
//! Todo acceso a la cinta, entrada y salida, pausas y fallas se delega
//! a esta biblioteca, que además define el contrato de cinta: un arreglo
//! de bytes sin límite a la derecha, inicialmente en cero.
//!
//! # Enlazado
//! `libruntime` se construye como biblioteca estática. El punto de entrada
//! `main` lo define el ensamblador emitido por el compilador, no esta
//! biblioteca, por lo cual se enlaza como cualquier otra biblioteca de C.
//!
//! # Uso
//! `libruntime` exporta símbolos "unmangled" usando la convención de llamada
//! que use el lenguaje C en la plataforma objetivo. Es decir, el compilador no
//! necesita emitir código Rust para usar la biblioteca, sino que es suficiente
//! con conocer el símbolo de cada función, parámetros esperados y tipo de retorno.
//! Cometer una equivocación en la forma de invocar a una función preconstruida
//! resulta en Comportamiento Indefinido y puede ocasionar problemas muy difíciles
//! de depurar.
//!
//! # Espacios de nombres
//! Las funciones preconstruidas o builtins constituyen la enteridad de
//! la interfaz pública de esta biblioteca. Todas son funciones libres
//! cuyos nombres inician con `parrot_`. El compilador solo emite símbolos
//! locales además de `main`.

pub mod builtin;

mod hosted;
mod tape;

use crate::hosted as sys;
