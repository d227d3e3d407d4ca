//! Lexical helpers shared by the parser.

pub mod string_literal;
