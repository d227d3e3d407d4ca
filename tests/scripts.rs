mod cases;

use indoc::indoc;

test_case!(
    hello,
    input: r#"print("Hello from DKV Script!");"#,
    output: Ok("Hello from DKV Script!\n"),
);

test_case!(
    empty_script,
    input: "",
    output: Ok(""),
);

test_case!(
    comments_and_empty_statements,
    input: indoc! {r#"
        // nothing to see
        ;;
        print(1); // trailing
    "#},
    output: Ok("1\n"),
);

test_case!(
    arithmetic_precedence,
    input: "print(1 + 2 * 3 - 4 / 2);",
    output: Ok("5\n"),
);

test_case!(
    grouping_and_negation,
    input: "print(-(1 + 2) * 3); print(--4);",
    output: Ok("-9\n4\n"),
);

test_case!(
    fractional_results,
    input: "print(7 / 2); print(7 % 3); print(0.1 + 0.2);",
    output: Ok("3.5\n1\n0.30000000000000004\n"),
);

test_case!(
    string_concatenation,
    input: r#"print("n=" + 42); print(1 + "x"); print("a" + true + nil);"#,
    output: Ok("n=42\n1x\natruenil\n"),
);

test_case!(
    string_escapes,
    input: r#"print("tab\there \"quoted\" é");"#,
    output: Ok("tab\there \"quoted\" \u{e9}\n"),
);

test_case!(
    comparisons,
    input: indoc! {r#"
        print(1 < 2);
        print(2 <= 1);
        print("abc" < "abd");
        print(1 == "1");
        print(nil == nil);
        print(true != false);
    "#},
    output: Ok("true\nfalse\ntrue\nfalse\ntrue\ntrue\n"),
);

test_case!(
    logical_operators,
    input: "print(true && !false); print(false || false); print(!(1 > 2));",
    output: Ok("true\nfalse\ntrue\n"),
);

test_case!(
    if_else_chain,
    input: indoc! {r#"
        let n = 15;
        if n % 15 == 0 {
            print("fizzbuzz");
        } else if n % 3 == 0 {
            print("fizz");
        } else {
            print(n);
        }
    "#},
    output: Ok("fizzbuzz\n"),
);

test_case!(
    while_loop,
    input: indoc! {r#"
        let i = 0;
        let total = 0;
        while i < 5 {
            i = i + 1;
            total = total + i;
        }
        print(total);
    "#},
    output: Ok("15\n"),
);

test_case!(
    nested_loops,
    input: indoc! {r#"
        let row = 0;
        while row < 3 {
            let line = "";
            let col = 0;
            while col <= row {
                line = line + "*";
                col = col + 1;
            }
            print(line);
            row = row + 1;
        }
    "#},
    output: Ok("*\n**\n***\n"),
);

test_case!(
    block_scoping,
    input: indoc! {r#"
        let x = "outer";
        {
            let x = "inner";
            print(x);
        }
        print(x);
    "#},
    output: Ok("inner\nouter\n"),
);

test_case!(
    assignment_reaches_enclosing_scope,
    input: "let x = 1; { x = 2; } print(x);",
    output: Ok("2\n"),
);

test_case!(
    let_defaults,
    input: indoc! {r#"
        let a;
        let b: number;
        let c: string;
        let d: bool;
        print(a); print(b); print(len(c)); print(d);
    "#},
    output: Ok("nil\n0\n0\nfalse\n"),
);

test_case!(
    typed_declarations,
    input: indoc! {r#"
        let count: int = 3;
        let ratio: float = 0.5;
        let name: string = "kv";
        let on: bool = count > 2;
        print(name + ":" + count * ratio + ":" + on);
    "#},
    output: Ok("kv:1.5:true\n"),
);

test_case!(
    builtins,
    input: r#"print(str(12) + str(true)); print(len("héllo")); print(is_error("Error: x"));"#,
    output: Ok("12true\n5\ntrue\n"),
);

test_case!(
    print_formats_special_numbers,
    input: "print(1 / 3); print(1000000 * 1000000); print(0 - 0);",
    output: Ok("0.3333333333333333\n1000000000000\n0\n"),
);

test_case!(
    recursive_function,
    input: indoc! {r#"
        fn fact(n: int) {
            if n <= 1 { return 1; }
            return n * fact(n - 1);
        }
        print(fact(10));
    "#},
    output: Ok("3628800\n"),
);

test_case!(
    functions_declared_after_use,
    input: indoc! {r#"
        greet("world");
        fn greet(who) { print(shout("hello " + who)); }
        fn shout(s: string) { return s + "!"; }
    "#},
    output: Ok("hello world!\n"),
);

test_case!(
    bare_return_yields_nil,
    input: indoc! {r#"
        fn first_even(limit) {
            for let i = 1; i <= limit; i++ {
                if i % 2 == 0 { return i; }
            }
            return;
        }
        print(first_even(5));
        print(first_even(1));
    "#},
    output: Ok("2\nnil\n"),
);

test_case!(
    for_loops,
    input: indoc! {r#"
        let sum = 0;
        for (let i = 0; i < 5; i++) { sum = sum + i; }
        print(sum);
        for let i = 3; i > 0; i-- { print(i); }
    "#},
    output: Ok("10\n3\n2\n1\n"),
);

test_case!(
    increment_and_decrement,
    input: "let n = 1.5; n++; print(n); n--; n--; print(n);",
    output: Ok("2.5\n0.5\n"),
);

test_case!(
    functions_with_host_commands,
    input: indoc! {r#"
        fn put(key, value) { return dkv("SET", key, value); }
        for let i = 0; i < 2; i++ { print(put("k" + i, i * 10)); }
    "#},
    output: Ok("OK\nOK\n"),
    commands: ["SET k0 0", "SET k1 10"],
);

test_case!(
    long_operator_chain,
    input: &format!("print(0{});", " + 1".repeat(5000)),
    output: Ok("5000\n"),
);
