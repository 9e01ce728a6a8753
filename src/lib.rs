//! LALR(1) grammar front end.
//!
//! Rules are authored with [`GrammarBuilder`]: a pattern of whitespace-separated symbols and an action
//! template such as `Op('+', $1, $3)`. The builder derives terminals, nonterminals and precedence into a
//! [`Grammar`], which builds immutable [`ParseTables`] (lemon's LALR(1) algorithm with yacc-style precedence
//! and associativity). A [`Parser`] drives the tables over a token stream and calls the actions on every
//! reduce, through a user-supplied [`SemanticContext`].
//!
//! ```
//! use lemon_grammar::{GrammarBuilder, Parser, Token, Location, SemanticContext, Literal, ActionError};
//!
//! struct Sum;
//! impl SemanticContext for Sum
//! {	type Value = i64;
//!
//! 	fn literal(&mut self, _literal: &Literal) -> Result<i64, ActionError>
//! 	{	Ok(0)
//! 	}
//!
//! 	fn call(&mut self, _helper: &str, args: Vec<i64>) -> Result<i64, ActionError>
//! 	{	Ok(args.iter().sum())
//! 	}
//! }
//!
//! let tables = GrammarBuilder::<Sum>::new()
//! 	.add_tokens("NUM").unwrap()
//! 	.add_helpers("Add")
//! 	.set_left("+").unwrap()
//! 	.add_rule("Expr", "Expr + Expr", "Add($1, $3)").unwrap()
//! 	.add_rule("Expr", "NUM", "").unwrap()
//! 	.try_into_tables().unwrap();
//!
//! let mut parser = Parser::new(&tables, Sum);
//! let at = Location::new(1, 1);
//! let tokens = vec![Token::new("NUM", 2, at), Token::new("+", 0, at), Token::new("NUM", 3, at)];
//! assert_eq!(parser.parse(tokens).unwrap(), 5);
//! ```

mod action;
mod builder;
mod error;
mod grammar;
mod parser;
mod rule;
mod set;
mod tables;

pub use action::{ActionExpr, ActionFn, ActionTemplate, Literal, SemanticContext};
pub use error::{ActionError, BuildError, BuildResult, Conflict, ConflictKind, GrammarError, GrammarResult, ParseError, ParseResult, RuleSite, SyntaxError};
pub use grammar::{Associativity, Diagnostic, Grammar, GrammarBuilder, Precedence, PrecedenceBand, ReduceReducePolicy, ACCEPT_SYMBOL, END_OF_INPUT};
pub use parser::{Location, Parser, Token};
pub use rule::{Production, RuleOptions};
pub use tables::{Action, ParseTables};
