use std::{cell::RefCell, rc::Rc, time::Duration};

use parrot::{
    compile,
    error::Diagnostics,
    ir::Fault,
    lex::{Lexer, Token},
    machine::{Machine, MachineError},
    source,
    target::{self, Arch},
    Compilation,
};

fn build(text: &str) -> Compilation {
    match compile(text.as_bytes(), "test.prrt") {
        Ok(compilation) => compilation,
        Err(diagnostics) => panic!("unexpected diagnostics:\n{}", diagnostics),
    }
}

fn reject(text: &str) -> Diagnostics {
    match compile(text.as_bytes(), "test.prrt") {
        Ok(_) => panic!("program was accepted:\n{}", text),
        Err(diagnostics) => diagnostics,
    }
}

fn execute(text: &str, input: &[u8]) -> (Result<(), MachineError>, Vec<u8>) {
    let compilation = build(text);
    let mut machine = Machine::new(input, Vec::new())
        .with_fuel(100_000)
        .with_sleeper(|_| ());

    let result = machine.run(&compilation.stream);
    (result, machine.into_output())
}

fn output(text: &str, input: &[u8]) -> Vec<u8> {
    let (result, output) = execute(text, input);
    result.unwrap();

    output
}

fn fault(text: &str) -> Fault {
    match execute(text, b"").0 {
        Err(MachineError::Fault(fault)) => fault,
        other => panic!("expected a fault, got {:?}", other),
    }
}

fn first_line(diagnostics: &Diagnostics) -> u32 {
    diagnostics.iter().next().unwrap().location().start().line()
}

#[test]
fn peck_peck_squawk_prints_two() {
    assert_eq!(output("peck peck squawk\n", b""), vec![2]);
}

#[test]
fn macro_invocation_matches_inline_code() {
    let expanded = "chirp double:\n    peck peck\ndouble\nsquawk\n";
    let inline = "peck peck squawk\n";

    assert_eq!(output(expanded, b""), output(inline, b""));
    assert_eq!(
        build(expanded).stream.to_string(),
        build(inline).stream.to_string()
    );
}

#[test]
fn cells_wrap_modulo_256() {
    assert_eq!(output("add bowl 255\npeck squawk\n", b""), vec![0]);
    assert_eq!(output("scratch squawk\n", b""), vec![255]);
    assert_eq!(output("sub #3 1\nadd #3 2\nhop hop hop squawk\n", b""), vec![1]);
}

#[test]
fn only_mul_and_div_squawk() {
    assert_eq!(output("add bowl 6\nmul bowl 7\n", b""), vec![42]);
    assert_eq!(output("add bowl 9\ndiv bowl 2\n", b""), vec![4]);
    assert_eq!(output("add bowl 3\nsub bowl 1\n", b""), Vec::<u8>::new());
}

#[test]
fn undefined_jump_target_reports_its_line() {
    let diagnostics = reject("peck\n\nflyto nowhere\n");
    let text = diagnostics.to_string();

    assert_eq!(first_line(&diagnostics), 3);
    assert!(text.starts_with("Semantic error: Label `nowhere` is undefined"));
    assert!(text.contains("3 | flyto nowhere\n"));
}

#[test]
fn division_by_literal_zero_faults_at_run_time() {
    let compilation = build("peck\ndiv bowl 0\n");
    assert!(compilation.warnings.is_empty());

    assert_eq!(fault("peck\ndiv bowl 0\n"), Fault::DivisionByZero);
}

#[test]
fn nested_loops_close_exactly_two_levels() {
    let text = "circle:\n    circle:\n        peck\n";
    let (start, stream) = source::consume(text.as_bytes(), "test.prrt");
    let tokens = Lexer::new(start, stream).collect_tokens().unwrap();

    let count = |wanted: Token| tokens.iter().filter(|token| *token.val() == wanted).count();
    assert_eq!(count(Token::Indent), 2);
    assert_eq!(count(Token::Dedent), 2);
    assert!(matches!(tokens.last().map(|token| token.val()), Some(Token::Dedent)));
}

#[test]
fn macro_recursion_is_rejected() {
    let direct = reject("chirp again:\n    peck\n    again\n");
    assert!(direct.to_string().contains("Macro `again` invokes itself"));

    let transitive = reject("chirp ping:\n    pong\nchirp pong:\n    ping\n");
    assert!(transitive.to_string().starts_with("Semantic error: Macro"));
}

#[test]
fn labels_and_conditional_jumps_count_down() {
    let text = "\
add bowl 3
perch again:
    squawk
    scratch
    flap again bowl > 0
mimic \"done\"
";

    assert_eq!(output(text, b""), b"\x03\x02\x01done\n".to_vec());
}

#[test]
fn distinct_labels_can_be_targeted_independently() {
    let text = "\
flyto second
perch first:
    mimic \"first\"
    perish
perch second:
    mimic \"second\"
    flyto first
";

    let compilation = build(text);
    assert!(compilation.warnings.is_empty());
    assert_eq!(output(text, b""), b"second\nfirst\n".to_vec());
}

#[test]
fn strings_go_through_the_tape() {
    assert_eq!(output("devour into #1\nregurgitate #1\n", b"hey\nrest"), b"hey\n".to_vec());
    assert_eq!(output("devour into #2 \"yo\"\nregurgitate #2\n", b""), b"yo\n".to_vec());
    assert_eq!(output("mimic \"a\\tb\"\n", b""), b"a\tb\n".to_vec());
}

#[test]
fn input_reads_bytes_or_presets() {
    assert_eq!(output("gulp squawk\n", b"A"), b"A".to_vec());
    assert_eq!(output("gulp squawk\n", b""), vec![0]);
    assert_eq!(output("gulp \"xyz\" squawk\n", b"A"), b"x".to_vec());
    assert_eq!(output("gulp 66 squawk\n", b""), b"B".to_vec());
}

#[test]
fn stomach_keeps_live_cells() {
    assert_eq!(output("add #1 5\nstomach 3\nhop squawk\n", b""), vec![5]);
    assert_eq!(output("add #2 7\nstomach 5\nadd #2 0\nhop hop squawk\n", b""), vec![7]);
}

#[test]
fn huge_stomach_is_free() {
    let text = "peck\nstomach 4000000000\nsquawk\n";

    let (result, output) = execute(text, b"");
    result.unwrap();
    assert_eq!(output, vec![1]);

    let mut assembly = Vec::new();
    target::emit(&build(text).stream, Arch::X86_64, &mut assembly).unwrap();
    assert!(!String::from_utf8(assembly).unwrap().contains(".zero"));
}

#[test]
fn named_stomachs_hold_strings() {
    let text = "stomach 4 buf\ndevour into buf \"hi\"\nregurgitate buf\n";
    assert_eq!(output(text, b""), b"hi\n".to_vec());

    // Se declaran en cualquier parte y no tocan la cinta
    let text = "devour into line\nregurgitate line\nsquawk\nstomach 5 line\n";
    assert_eq!(output(text, b"squawking\n"), b"squa\n\x00".to_vec());

    let text = "stomach name\ndevour into name\nregurgitate name\n";
    assert_eq!(output(text, b"polly\n"), b"polly\n".to_vec());
}

#[test]
fn stomach_names_are_checked() {
    let diagnostics = reject("stomach 4 buf\nregurgitate bag\n");
    assert!(diagnostics.to_string().starts_with("Semantic error: Stomach `bag` is undefined"));
    assert_eq!(first_line(&diagnostics), 2);

    let diagnostics = reject("stomach 2 buf\ndevour into buf \"long\"\n");
    assert!(diagnostics.to_string().starts_with("Code generation error:"));

    let diagnostics = reject("stomach 4 buf\nstomach 8 buf\n");
    assert!(diagnostics.to_string().contains("Redefinition of stomach `buf`"));
}

#[test]
fn nested_macro_cannot_reuse_its_name() {
    let diagnostics = reject("chirp m:\n    chirp m:\n        peck\n    hop\nm squawk\n");
    assert!(diagnostics.to_string().contains("Redefinition of macro `m`"));
    assert_eq!(first_line(&diagnostics), 1);
}

#[test]
fn block_comments_do_not_indent() {
    assert_eq!(output("(: note :) peck peck squawk\n", b""), vec![2]);
    assert_eq!(output("peck (: a\n  b :) peck\nsquawk\n", b""), vec![2]);
}

#[test]
fn moving_left_of_cell_zero() {
    let diagnostics = reject("hop\nhopback\nhopback\n");
    assert!(diagnostics.to_string().starts_with("Code generation error:"));
    assert_eq!(first_line(&diagnostics), 3);

    assert_eq!(fault("perch left:\n    hopback\n"), Fault::IndexUnderflow);
}

#[test]
fn bob_sleeps_whole_seconds() {
    let slept = Rc::new(RefCell::new(Vec::new()));
    let record = Rc::clone(&slept);

    let compilation = build("bob\nbob 3\n");
    let mut machine = Machine::new(&b""[..], Vec::new())
        .with_sleeper(move |duration| record.borrow_mut().push(duration));

    machine.run(&compilation.stream).unwrap();
    assert_eq!(
        *slept.borrow(),
        vec![Duration::from_secs(1), Duration::from_secs(3)]
    );
}

#[test]
fn code_after_perish_is_unreachable() {
    let text = "peck squawk\nperish\nsquawk\n";

    let compilation = build(text);
    assert_eq!(compilation.warnings.len(), 1);
    assert!(compilation.warnings.to_string().contains("Unreachable code"));

    assert_eq!(output(text, b""), vec![1]);
}

#[test]
fn syntax_and_lexical_errors_are_labeled() {
    assert!(reject("add bowl\n").to_string().starts_with("Syntax error:"));
    assert!(reject("peck $\n").to_string().starts_with("Lexical error:"));
    assert!(reject("circle:\npeck\n").to_string().starts_with("Syntax error:"));
}

#[test]
fn keywords_ignore_case() {
    assert_eq!(output("PECK Peck SQUAWK\n", b""), vec![2]);
}

#[test]
fn lowering_defines_main() {
    let compilation = build("circle:\n    gulp\n    squawk\n    flap out bowl == 0\nperch out:\n    perish\n");

    let mut assembly = Vec::new();
    target::emit(&compilation.stream, Arch::X86_64, &mut assembly).unwrap();

    let assembly = String::from_utf8(assembly).unwrap();
    assert!(assembly.contains("main:"));
    assert!(assembly.contains("parrot_gulp@PLT"));
    assert!(assembly.contains("je      .Lprrt."));
}
