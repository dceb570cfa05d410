use super::*;
use crate::bytecode::disassemble;
use crate::parse_source;
use crate::value::NumKind;

fn compile_str(source: &str) -> CompileOutput {
    compile_with(source, &[])
}

fn compile_with(source: &str, foreign: &[&str]) -> CompileOutput {
    let tree = parse_source(source).unwrap();
    let foreign: Vec<String> = foreign.iter().map(|s| s.to_string()).collect();
    compile(source, tree.cursor(), &foreign).unwrap()
}

fn ops(output: &CompileOutput) -> Vec<Op> {
    output.instructions.iter().map(|i| i.op.clone()).collect()
}

fn messages(output: &CompileOutput) -> Vec<&str> {
    output.diagnostics.iter().map(|d| d.message.as_str()).collect()
}

fn int(v: i32) -> Op {
    Op::Push {
        value: Immediate::Number(Number::I32(v)),
    }
}

fn name(s: &str) -> String {
    s.to_string()
}

#[test]
fn test_init_lowering() {
    let output = compile_str("init x = 1 + 2;");
    assert!(output.is_runnable());
    assert_eq!(
        ops(&output),
        vec![
            int(1),
            int(2),
            Op::Binary { op: BinOp::Add },
            Op::Init {
                name: name("x"),
                catch: false
            },
        ]
    );
}

#[test]
fn test_instruction_spans_cover_statements() {
    let source = "init a = 1;\ninit b = a;";
    let output = compile_str(source);
    assert_eq!(output.instructions[0].span.slice(source), "init a = 1;");
    assert_eq!(output.instructions[2].span.slice(source), "init b = a;");
}

#[test]
fn test_number_literal_widths() {
    let output = compile_str("init a = 7; init b = 3000000000; init c = 1.5;");
    let pushes: Vec<_> = output
        .instructions
        .iter()
        .filter_map(|i| match &i.op {
            Op::Push {
                value: Immediate::Number(n),
            } => Some(n.kind()),
            _ => None,
        })
        .collect();
    assert_eq!(pushes, vec![NumKind::I32, NumKind::F64, NumKind::F64]);
}

#[test]
fn test_redeclaration_is_diagnosed() {
    let output = compile_str("init x = 1; init x = 2;");
    assert_eq!(messages(&output), vec!["'x' is already declared in this scope"]);
    assert!(!output.is_runnable());
    assert_eq!(output.diagnostics[0].range.start.column, 18);
}

#[test]
fn test_shadowing_in_block_is_allowed() {
    let output = compile_str("init x = 1; { init x = 2; }");
    assert!(output.is_runnable(), "{:?}", output.diagnostics);
}

#[test]
fn test_undefined_name_is_diagnosed_not_thrown() {
    let output = compile_str("init x = y;");
    assert_eq!(messages(&output), vec!["'y' is not defined"]);
    // Lowering continues past the diagnostic
    assert_eq!(output.instructions.len(), 2);
}

#[test]
fn test_undefined_name_suggests_similar() {
    let output = compile_str("init count = 1; init z = cont;");
    assert_eq!(
        messages(&output),
        vec!["'cont' is not defined; did you mean 'count'?"]
    );
}

#[test]
fn test_tied_suggestions_prefer_first_declared() {
    let output = compile_str("init cat = 1; init car = 2; init z = caz;");
    assert_eq!(messages(&output), vec!["'caz' is not defined; did you mean 'cat'?"]);

    let output = compile_str("init car = 1; init cat = 2; init z = caz;");
    assert_eq!(messages(&output), vec!["'caz' is not defined; did you mean 'car'?"]);
}

#[test]
fn test_change_of_undefined_name() {
    let output = compile_str("change nope = 1;");
    assert_eq!(messages(&output), vec!["'nope' is not defined"]);
}

#[test]
fn test_change_targets() {
    let output = compile_str("init m = new {a: 1}; change m.a = 2; change m[\"b\"] = 3;");
    let ops = ops(&output);
    assert!(ops.contains(&Op::MemberStore { name: name("a") }));
    assert!(ops.contains(&Op::IndexStore));
}

#[test]
fn test_typeof_arity_diagnostic() {
    let output = compile_str("init t = typeof(1, 2);");
    assert_eq!(messages(&output), vec!["typeof expects exactly 1 argument, got 2"]);

    let output = compile_str("init t = typeof(1);");
    assert!(output.is_runnable());
    assert_eq!(ops(&output)[1], Op::Typeof);
}

#[test]
fn test_foreign_call_lowering() {
    let output = compile_with("print(1);", &["print"]);
    assert_eq!(
        ops(&output),
        vec![
            int(1),
            Op::CallForeign {
                name: name("print"),
                argc: 1
            },
            Op::Pop,
        ]
    );
}

#[test]
fn test_local_shadows_foreign_name() {
    let output = compile_with("init print = 1; print(2);", &["print"]);
    assert_eq!(
        &ops(&output)[2..],
        &[
            Op::Load { name: name("print") },
            int(2),
            Op::Call { argc: 1 },
            Op::Pop,
        ]
    );
}

#[test]
fn test_unknown_foreign_name_is_diagnosed() {
    let output = compile_str("prnt(1);");
    assert_eq!(messages(&output), vec!["'prnt' is not defined"]);

    let output = compile_with("prnt(1);", &["print"]);
    assert_eq!(
        messages(&output),
        vec!["'prnt' is not defined; did you mean 'print'?"]
    );
}

#[test]
fn test_if_else_jumps_are_patched() {
    let output = compile_str("if (true) then { init a = 1; } else { init b = 2; }");
    let ops = ops(&output);
    assert_eq!(ops[1], Op::JumpIfFalse { target: 7 });
    assert_eq!(ops[6], Op::Jump { target: 11 });
    assert_eq!(ops[7], Op::EnterScope);
    assert_eq!(ops.len(), 11);
}

#[test]
fn test_if_header_span_is_condition() {
    let source = "init x = 1;\nif (x == 1) then { change x = 2; }";
    let output = compile_str(source);
    let jump = output
        .instructions
        .iter()
        .find(|i| matches!(i.op, Op::JumpIfFalse { .. }))
        .unwrap();
    assert_eq!(jump.span.slice(source), "x == 1");
}

#[test]
fn test_while_loops_back() {
    let output = compile_str("init i = 0; while (i < 3) then { change i = i + 1; }");
    let ops = ops(&output);
    // 2: condition start
    assert_eq!(ops[2], Op::Load { name: name("i") });
    assert_eq!(ops[5], Op::JumpIfFalse { target: 13 });
    assert_eq!(ops[12], Op::Jump { target: 2 });
    assert_eq!(ops.len(), 13);
}

#[test]
fn test_for_loop_variable_is_scoped() {
    let output = compile_with("for (i in range(3)) then { print(i); } i;", &["range", "print"]);
    assert_eq!(messages(&output), vec!["'i' is not defined"]);

    let ops = ops(&output);
    assert_eq!(ops[2], Op::GetIter);
    assert_eq!(ops[3], Op::IterNext);
    assert_eq!(ops[4], Op::JumpIfFalse { target: 12 });
    assert_eq!(ops[5], Op::EnterScope);
    assert_eq!(
        ops[6],
        Op::Init {
            name: name("i"),
            catch: false
        }
    );
    assert_eq!(ops[10], Op::ExitScope);
    assert_eq!(ops[11], Op::Jump { target: 3 });
}

#[test]
fn test_function_declaration_layout() {
    let output = compile_str("func add(a, b) { return a + b; }");
    assert_eq!(
        ops(&output),
        vec![
            Op::Jump { target: 9 },
            Op::Init {
                name: name("a"),
                catch: false
            },
            Op::Init {
                name: name("b"),
                catch: false
            },
            Op::Load { name: name("a") },
            Op::Load { name: name("b") },
            Op::Binary { op: BinOp::Add },
            Op::Ret,
            Op::Push {
                value: Immediate::Nil
            },
            Op::Ret,
            Op::MakeClosure {
                entry: 1,
                arity: 2,
                name: Some(name("add"))
            },
            Op::Init {
                name: name("add"),
                catch: false
            },
        ]
    );
}

#[test]
fn test_functions_are_predeclared() {
    let output = compile_str("init r = twice(2); func twice(n) { return n * 2; }");
    assert!(output.is_runnable(), "{:?}", output.diagnostics);
}

#[test]
fn test_duplicate_parameter() {
    let output = compile_str("func f(a, a) { }");
    assert_eq!(messages(&output), vec!["duplicate parameter 'a'"]);
}

#[test]
fn test_function_literal_is_anonymous() {
    let output = compile_str("init f = func(x) { return x; };");
    assert!(ops(&output).contains(&Op::MakeClosure {
        entry: 1,
        arity: 1,
        name: None
    }));
}

#[test]
fn test_catch_init() {
    let output = compile_str("init catch e = error;");
    assert_eq!(messages(&output), vec!["'error' is not defined"]);
    assert_eq!(
        ops(&output)[1],
        Op::Init {
            name: name("e"),
            catch: true
        }
    );
}

#[test]
fn test_literals_lowering() {
    let output = compile_str("init t = [1, 2]; init l = new [3]; init m = new {k: 4, \"s q\": 5};");
    let ops = ops(&output);
    assert!(ops.contains(&Op::MakeTuple { len: 2 }));
    assert!(ops.contains(&Op::MakeList { len: 1 }));
    assert!(ops.contains(&Op::MakeMap { len: 2 }));
    assert!(ops.contains(&Op::Push {
        value: Immediate::Str(name("s q"))
    }));
}

#[test]
fn test_repl_keeps_trailing_value() {
    let tree = parse_source("1 + 2;").unwrap();
    let output = compile_repl("1 + 2;", tree.cursor(), &[], &[]).unwrap();
    assert_eq!(ops(&output).last(), Some(&Op::Binary { op: BinOp::Add }));

    let output = compile_str("1 + 2;");
    assert_eq!(ops(&output).last(), Some(&Op::Pop));
}

#[test]
fn test_repl_known_names() {
    let known = vec![name("x")];
    let tree = parse_source("x;").unwrap();
    let output = compile_repl("x;", tree.cursor(), &[], &known).unwrap();
    assert!(output.is_runnable());

    // Redeclaring an earlier global is allowed
    let tree = parse_source("init x = 2;").unwrap();
    let output = compile_repl("init x = 2;", tree.cursor(), &[], &known).unwrap();
    assert!(output.is_runnable(), "{:?}", output.diagnostics);
}

#[test]
fn test_error_node_aborts() {
    let source = "init = 1;";
    let tree = crate::parser::parse(source, crate::lexer::tokenize(source).unwrap()).tree;
    let err = compile(source, tree.cursor(), &[]).unwrap_err();
    assert!(err.message().starts_with("syntax error near"), "{err}");
    assert!(err.span().is_some());
}

#[test]
fn test_non_program_root_is_rejected() {
    let source = "init x = 1;";
    let tree = parse_source(source).unwrap();
    let mut cursor = tree.cursor();
    assert!(cursor.first_child());
    let err = compile(source, cursor, &[]).unwrap_err();
    assert!(err.message().starts_with("expected a program node"));
}

#[test]
fn test_disassembly_of_function() {
    let output = compile_str("func id(v) { return v; }");
    let listing = disassemble(&output.instructions);
    let first: Vec<&str> = listing.lines().map(|l| l.split(';').next().unwrap().trim_end()).collect();
    assert_eq!(
        first,
        vec![
            "0  jump @6",
            "1  init v",
            "2  load v",
            "3  ret",
            "4  push nil",
            "5  ret",
            "6  make_closure @1 1 id",
            "7  init id",
        ]
    );
}
