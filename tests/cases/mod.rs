#![allow(dead_code)]

use std::collections::HashMap;

use dkv_script::{Engine, Error};
use pretty_assertions::assert_eq;

/// What a script did: everything it printed, every host command it sent,
/// and the error it stopped with, if any.
#[derive(Debug)]
pub struct Outcome {
    pub output: String,
    pub commands: Vec<String>,
    pub error: Option<Error>,
}

/// Compile and run `source` with a handler that records each command and
/// answers from `replies`, defaulting to `"OK"`.
pub fn run(source: &str, replies: &[(&str, &str)]) -> Outcome {
    let replies: HashMap<&str, &str> = replies.iter().copied().collect();
    let mut commands = Vec::new();
    let mut output = Vec::new();

    let error = match Engine::default().compile(source) {
        Err(e) => Some(e),
        Ok(program) => {
            let mut vm = program.vm().with_output(&mut output);
            vm.set_command_handler(|command: &str| {
                commands.push(command.to_string());
                replies.get(command).copied().unwrap_or("OK").to_string()
            });
            program.run_vm(&mut vm).err()
        }
    };

    Outcome {
        output: String::from_utf8(output).unwrap(),
        commands,
        error,
    }
}

/// `Ok(text)`: the script succeeds and prints exactly `text`.
/// `Err(message)`: the script fails and its first diagnostic says `message`.
pub fn check_output(outcome: &Outcome, expected: Result<&str, &str>) {
    match (expected, &outcome.error) {
        (Ok(text), None) => assert_eq!(outcome.output, text),
        (Ok(_), Some(e)) => panic!(
            "Expected success, got:\n{}",
            dkv_script::render_error_to_string_no_color(e)
        ),
        (Err(message), Some(e)) => {
            let actual = match e.diagnostics().first() {
                Some(diagnostic) => diagnostic.message.clone(),
                None => e.to_string(),
            };
            assert_eq!(actual, message);
        }
        (Err(message), None) => panic!(
            "Expected error '{}', but the script printed:\n{}",
            message, outcome.output
        ),
    }
}

/// Declares a test that runs a script and checks its printed output (or
/// error), optionally with canned host replies and the expected command log.
///
/// ```ignore
/// test_case!(
///     name,
///     input: r#"print(dkv("GET a"));"#,
///     replies: [("GET a", "1")],
///     output: Ok("1\n"),
///     commands: ["GET a"],
/// );
/// ```
#[macro_export]
macro_rules! test_case {
    (
        $name:ident,
        input: $input:expr,
        $(replies: [$(($command:expr, $reply:expr)),* $(,)?],)?
        output: $output:expr
        $(, commands: [$($sent:expr),* $(,)?])?
        $(,)?
    ) => {
        #[test]
        fn $name() {
            let replies: &[(&str, &str)] = &[$($(($command, $reply)),*)?];
            let outcome = $crate::cases::run($input, replies);
            $crate::cases::check_output(&outcome, $output);
            $(
                let expected: Vec<&str> = vec![$($sent),*];
                pretty_assertions::assert_eq!(outcome.commands, expected);
            )?
        }
    };
}
