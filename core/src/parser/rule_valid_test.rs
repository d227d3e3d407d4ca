// Tests with valid scripts for each rule in the grammar.

use crate::parser::{Rule, ScriptParser};
use pest::Parser;
use pest::iterators::Pair;

fn contains_rule(pair: Pair<Rule>, target: Rule) -> bool {
    if pair.as_rule() == target {
        return true;
    }
    for inner in pair.into_inner() {
        if contains_rule(inner, target) {
            return true;
        }
    }
    false
}

macro_rules! rule_examples {
    ( $($rule:ident => [$($script:expr),* $(,)?]),* $(,)? ) => {
        $(
            #[test]
            fn $rule() {
                let inputs = vec![$($script),*];
                for input in inputs {
                    let result = ScriptParser::parse(Rule::program, input)
                        .unwrap_or_else(|e| panic!("Failed to parse '{}': {}", input, e));
                    let root = result.into_iter().next().unwrap();
                    assert!(
                        contains_rule(root.clone(), Rule::$rule),
                        "Expected to find rule {:?} in parse tree for input '{}'",
                        Rule::$rule,
                        input
                    );
                }
            }
        )*
    };
}

rule_examples! {
    let_stmt => ["let x;", "let x = 1;", "let x: int = 1;", "let name: string;", "let letter = 1;"],
    type_name => ["let x: number;", "let b: bool = true;"],
    assign_stmt => ["x = 1;", "total = total + 1;", "s = dkv(\"GET k\");"],
    print_stmt => ["print(1);", "print(\"hi\");", "print(a + b,);"],
    if_stmt => ["if x { }", "if a < b { print(a); } else { print(b); }", "if a { } else if b { } else { }"],
    while_stmt => ["while i < 10 { i = i + 1; }", "while false {}"],
    for_stmt => [
        "for i = 0; i < 3; i++ { }",
        "for (let i = 0; i < 3; i = i + 1) { print(i); }",
        "for ;; { }",
        "for (;;) {}",
    ],
    let_clause => ["for let i: int = 0; i < 3; i++ { }"],
    assign_clause => ["for i = 0;; i = i + 2 { }"],
    step_clause => ["for ; i > 0; i-- { }"],
    step_stmt => ["i++;", "count--;"],
    incr => ["i++;"],
    decr => ["i--;"],
    fn_decl => ["fn f() { }", "fn add(a, b) { return a + b; }", "fn greet(name: string,) { print(name); }"],
    params => ["fn f(a) { }"],
    param => ["fn f(a: int, b) { }"],
    return_stmt => ["fn f() { return; }", "fn f() { return 1; }", "return x;"],
    block => ["{ }", "{ let x = 1; { print(x); } }"],
    expr_stmt => ["1;", "dkv(\"SET a 1\");", "f(x);"],
    empty_stmt => [";", ";;"],
    number => ["1;", "3.14;", "007;"],
    string => ["\"\";", "\"hello\";", "\"esc \\\" \\n\";", "\"// not a comment\";"],
    boolean => ["true;", "false;"],
    nil => ["nil;"],
    ident => ["foo;", "_bar123;", "printer;", "dkv_key;", "iffy;"],
    host_call => ["dkv(\"PING\");", "dkv(\"SET\", k, 1);", "print(dkv(\"GET a\"));"],
    call => ["len(s);", "str(1);", "is_error(dkv(\"GET a\"));"],
    grouped => ["(1);", "(a + b) * c;"],
    neg => ["-1;", "- -x;"],
    not => ["!true;", "!!x;"],
    add => ["1 + 2;", "\"a\" + 1;"],
    sub => ["1 - 2;"],
    mul => ["2 * 3;"],
    div => ["6 / 3;", "6 / 3; // comment"],
    rem => ["7 % 2;"],
    eq => ["a == b;"],
    neq => ["a != b;"],
    lt => ["a < b;"],
    le => ["a <= b;"],
    gt => ["a > b;"],
    ge => ["a >= b;"],
    and => ["a && b;"],
    or => ["a || b;"],
}

#[test]
fn test_keywords_are_not_identifiers() {
    for input in [
        "let = 1;",
        "print = 1;",
        "let if = 1;",
        "dkv;",
        "let while;",
        "let fn = 1;",
        "for = 2;",
        "let return;",
    ] {
        assert!(
            ScriptParser::parse(Rule::program, input).is_err(),
            "Expected '{}' to be rejected",
            input
        );
    }
}

#[test]
fn test_functions_only_at_top_level() {
    assert!(ScriptParser::parse(Rule::program, "fn f() { } f();").is_ok());
    assert!(ScriptParser::parse(Rule::program, "{ fn f() { } }").is_err());
    assert!(ScriptParser::parse(Rule::program, "fn f() { fn g() { } }").is_err());
}

#[test]
fn test_step_needs_a_statement_position() {
    assert!(ScriptParser::parse(Rule::program, "x++;").is_ok());
    assert!(ScriptParser::parse(Rule::program, "print(x++);").is_err());
    // Still a subtraction of a negated literal.
    assert!(ScriptParser::parse(Rule::program, "x--1;").is_ok());
}

#[test]
fn test_comments_are_skipped() {
    let input = "// leading\nprint(1); // trailing\n// last line without newline";
    assert!(ScriptParser::parse(Rule::program, input).is_ok());
}
