use std::borrow::Cow;
use std::fmt;

use tracing::trace;

use crate::action::SemanticContext;
use crate::error::{ParseError, ParseResult, SyntaxError};
use crate::grammar::END_OF_INPUT;
use crate::tables::{Action, ParseTables};

/// Position of a token in the source.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location
{	pub line: u32,
	pub column: u32,
}
impl Location
{	pub fn new(line: u32, column: u32) -> Self
	{	Self {line, column}
	}
}
impl fmt::Display for Location
{	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{	write!(f, "{}:{}", self.line, self.column)
	}
}

/// Token as delivered by the lexer: terminal name, semantic value and location.
#[derive(Clone, Debug, PartialEq)]
pub struct Token<V>
{	pub terminal: Cow<'static, str>,
	pub value: V,
	pub location: Location,
}
impl<V> Token<V>
{	pub fn new(terminal: impl Into<Cow<'static, str>>, value: V, location: Location) -> Self
	{	Self {terminal: terminal.into(), value, location}
	}
}

#[derive(Debug)]
struct StackEntry<V>
{	n_state: usize,
	/// `None` only in the bottom entry.
	value: Option<V>,
	location: Location,
}

/// Table-driven LALR(1) parser. One per token stream; the tables are only borrowed.
///
/// Tokens can be pushed one at a time with [`add_token()`](Parser::add_token) and [`end()`](Parser::end),
/// or pulled from an iterator with [`parse()`](Parser::parse).
pub struct Parser<'t, C> where C: SemanticContext
{	tables: &'t ParseTables<C>,
	stack: Vec<StackEntry<C::Value>>,
	last_location: Location,
	/// Shared context passed to every action.
	pub context: C,
}
impl<'t, C> Parser<'t, C> where C: SemanticContext
{	pub fn new(tables: &'t ParseTables<C>, context: C) -> Self
	{	let mut this = Self {tables, stack: Vec::with_capacity(64), last_location: Location::default(), context};
		this.reset();
		this
	}

	pub fn into_context(self) -> C
	{	self.context
	}

	/// Clear the stack, so the next token starts a new parse.
	pub fn reset(&mut self)
	{	self.stack.clear();
		self.stack.push(StackEntry {n_state: 0, value: None, location: Location::default()});
		self.last_location = Location::default();
	}

	/// Feed the next token. Reductions it triggers run immediately.
	pub fn add_token(&mut self, token: Token<C::Value>) -> ParseResult<()>
	{	let terminal = match self.tables.terminal(&token.terminal)
		{	Some(terminal) if terminal != 0 => terminal,
			_ =>
			{	self.reset();
				return Err(ParseError::UnknownTerminal {name: token.terminal.into_owned(), location: token.location});
			}
		};
		self.last_location = token.location;
		match self.step(terminal, Some(token.value), token.location)
		{	Ok(_) => Ok(()),
			Err(e) =>
			{	self.reset();
				Err(e)
			}
		}
	}

	/// Signal end of input, and get the value of the start symbol.
	pub fn end(&mut self, location: Location) -> ParseResult<C::Value>
	{	let result = self.step(0, None, location);
		self.reset();
		// `$end` is never shifted, so `step()` only returns through accept or an error
		result?.ok_or(ParseError::NoValue)
	}

	/// Pull tokens until `$end` or until the iterator is exhausted, and return the value of the start symbol.
	pub fn parse<I>(&mut self, tokens: I) -> ParseResult<C::Value> where I: IntoIterator<Item=Token<C::Value>>
	{	self.reset();
		for token in tokens
		{	if token.terminal == END_OF_INPUT
			{	return self.end(token.location);
			}
			self.add_token(token)?;
		}
		self.end(self.last_location)
	}

	fn top_state(&self) -> usize
	{	self.stack.last().map(|e| e.n_state).unwrap_or(0)
	}

	/// Look up an action, trying the fallback terminal if the token itself has none.
	fn lookup(&self, n_state: usize, terminal: usize) -> Action
	{	let action = self.tables.action(n_state, terminal);
		if action == Action::Error
		{	if let Some(fallback) = self.tables.fallback(terminal)
			{	let action = self.tables.action(n_state, fallback);
				if action != Action::Error
				{	trace!(n_state, from = self.tables.symbol_name(terminal), to = self.tables.symbol_name(fallback), "fallback");
					return action;
				}
			}
		}
		action
	}

	/// Run actions for one lookahead until it is shifted (returns `None`) or the input is accepted.
	fn step(&mut self, terminal: usize, mut value: Option<C::Value>, location: Location) -> ParseResult<Option<C::Value>>
	{	trace!(n_state = self.top_state(), token = self.tables.symbol_name(terminal), %location, "input");
		loop
		{	let n_state = self.top_state();
			match self.lookup(n_state, terminal)
			{	Action::Shift(target) =>
				{	trace!(n_state, target, "shift");
					self.stack.push(StackEntry {n_state: target, value: value.take(), location});
					return Ok(None);
				}
				Action::Reduce(n_rule) =>
				{	self.reduce(n_rule, location)?;
				}
				Action::Accept =>
				{	trace!(n_state, "accept");
					let value = self.stack.pop().and_then(|e| e.value);
					return Ok(value);
				}
				Action::Error =>
				{	let expected: Vec<String> = self.tables.expected(n_state).into_iter().map(|s| s.to_string()).collect();
					trace!(n_state, token = self.tables.symbol_name(terminal), "syntax error");
					return Err
					(	SyntaxError
						{	location,
							unexpected: self.tables.symbol_name(terminal).to_string(),
							expected,
						}.into()
					);
				}
			}
		}
	}

	fn reduce(&mut self, n_rule: usize, lookahead_location: Location) -> ParseResult<()>
	{	let tables = self.tables;
		let production = match tables.production(n_rule)
		{	Some(production) => production,
			None => return Err(ParseError::MissingGoto {state: self.top_state(), nonterminal: format!("#{}", n_rule)}),
		};
		let arity = production.rhs.len();
		let from = self.stack.len().saturating_sub(arity).max(1);
		let location = self.stack.get(from).filter(|_| arity > 0).map(|e| e.location).unwrap_or(lookahead_location);
		let values: Vec<C::Value> = self.stack.drain(from ..).filter_map(|e| e.value).collect();
		trace!(n_rule, production = %production, "reduce");
		let value = (production.action)(&mut self.context, values).map_err
		(	|source| ParseError::Action {production: production.to_string(), location, source}
		)?;
		let n_state = self.top_state();
		match tables.goto(n_state, production.lhs)
		{	Some(target) =>
			{	self.stack.push(StackEntry {n_state: target, value: Some(value), location});
				Ok(())
			}
			None => Err(ParseError::MissingGoto {state: n_state, nonterminal: production.lhs_name.clone()}),
		}
	}
}
