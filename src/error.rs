//! Error types for every stage: grammar assembly, table construction and parsing.
//!
//! Grammar and build errors are fatal: no tables are produced. Parse errors abort only
//! the parse in progress; the tables stay valid for the next one.

use std::fmt;

use thiserror::Error;

use crate::parser::Location;

pub type GrammarResult<T> = Result<T, GrammarError>;
pub type BuildResult<T> = Result<T, BuildError>;
pub type ParseResult<T> = Result<T, ParseError>;

/// Source position of the builder call that authored a rule or a declaration.
///
/// Captured with `#[track_caller]`, so errors point at the grammar definition, not into this crate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RuleSite
{	pub file: &'static str,
	pub line: u32,
}
impl RuleSite
{	#[track_caller]
	pub fn caller() -> Self
	{	let location = std::panic::Location::caller();
		Self {file: location.file(), line: location.line()}
	}
}
impl fmt::Display for RuleSite
{	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{	write!(f, "{}({})", self.file, self.line)
	}
}

/// Malformed grammar definition. Raised while rules are added or when the grammar is assembled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError
{	#[error("Empty grammar")]
	EmptyGrammar,

	#[error("{site}: Rule for \"{lhs}\" has an empty pattern and no action")]
	EmptyRule {site: RuleSite, lhs: String},

	#[error("{site}: Invalid symbol name: \"{name}\"")]
	InvalidSymbolName {site: RuleSite, name: String},

	#[error("{site}: Token \"{name}\" can not be the left-hand side of a rule")]
	TokenAsLhs {site: RuleSite, name: String},

	#[error("{site}: Nonterminal \"{name}\" has no rules (referenced in \"{production}\")")]
	UndefinedNonterminal {site: RuleSite, name: String, production: String},

	#[error("{site}: Nonterminal \"{name}\" is not reachable from the start symbol")]
	UnreachableNonterminal {site: RuleSite, name: String},

	#[error("{site}: Error in action template \"{template}\": {message}")]
	TemplateSyntax {site: RuleSite, template: String, message: String},

	#[error("{site}: Capture ${index} is out of range, the pattern has {arity} symbols")]
	CaptureOutOfRange {site: RuleSite, index: usize, arity: usize},

	#[error("{site}: Action refers to unknown helper \"{helper}\"")]
	UnknownHelper {site: RuleSite, helper: String},

	#[error("{site}: Symbol \"{name}\" has already been given a precedence at {previous}")]
	PrecedenceRedefined {site: RuleSite, name: String, previous: RuleSite},

	#[error("{site}: Can only set precedence for terminal symbols, not \"{name}\"")]
	PrecedenceOnNonterminal {site: RuleSite, name: String},

	#[error("{site}: Precedence symbol \"{name}\" has no declared precedence")]
	PrecedenceOverrideUnknown {site: RuleSite, name: String},

	#[error("{site}: Can only set fallback between terminal symbols, not \"{name}\"")]
	FallbackOnNonterminal {site: RuleSite, name: String},

	#[error("{site}: Symbol \"{name}\" is asked to fall back to itself")]
	FallbackToSelf {site: RuleSite, name: String},

	#[error("{site}: More than one fallback assigned to token \"{name}\"")]
	FallbackRedefined {site: RuleSite, name: String},

	#[error("The start symbol \"{name}\" is not a nonterminal of the grammar")]
	UnknownStartSymbol {name: String},
}

/// Kind of an ambiguous table cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConflictKind
{	ShiftReduce,
	ReduceReduce,
}
impl fmt::Display for ConflictKind
{	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{	match self
		{	ConflictKind::ShiftReduce => write!(f, "shift/reduce"),
			ConflictKind::ReduceReduce => write!(f, "reduce/reduce"),
		}
	}
}

/// A table cell that precedence and associativity could not make single-valued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict
{	pub kind: ConflictKind,
	pub state: usize,
	pub lookahead: String,
	/// Items of the state, dot shown as `*`.
	pub items: Vec<String>,
	/// The productions competing for the cell (reduce candidates; for shift/reduce, the one being reduced).
	pub productions: Vec<String>,
}
impl fmt::Display for Conflict
{	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{	writeln!(f, "{} conflict in state {} on \"{}\":", self.kind, self.state, self.lookahead)?;
		for item in self.items.iter()
		{	writeln!(f, "    {}", item)?;
		}
		write!(f, "  competing:")?;
		if self.kind == ConflictKind::ShiftReduce
		{	write!(f, " shift \"{}\",", self.lookahead)?;
		}
		for (i, production) in self.productions.iter().enumerate()
		{	write!(f, "{} reduce {}", if i==0 {""} else {","}, production)?;
		}
		Ok(())
	}
}

fn format_conflicts(conflicts: &[Conflict]) -> String
{	let mut text = format!("{} parsing conflicts", conflicts.len());
	for conflict in conflicts
	{	text.push('\n');
		text.push_str(&conflict.to_string());
	}
	text
}

/// Table construction failure. No tables are returned when this happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError
{	#[error(transparent)]
	Grammar(#[from] GrammarError),

	#[error("{}", format_conflicts(.0))]
	Conflicts(Vec<Conflict>),

	#[error("{site}: This rule can not be reduced: {production}")]
	NeverReduced {site: RuleSite, production: String},
}

/// Failure inside a semantic action while building a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ActionError
{	pub message: String,
}
impl ActionError
{	pub fn new(message: impl Into<String>) -> Self
	{	Self {message: message.into()}
	}
}

/// No table entry for the current state and lookahead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{location}: Syntax error, unexpected {unexpected}, expecting {}", .expected.join(", "))]
pub struct SyntaxError
{	pub location: Location,
	pub unexpected: String,
	/// Terminals that have an action in the state where the error was hit, in symbol order.
	pub expected: Vec<String>,
}

/// Parse-time failure. Aborts the current parse only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError
{	#[error(transparent)]
	Syntax(#[from] SyntaxError),

	#[error("{location}: Unknown terminal \"{name}\"")]
	UnknownTerminal {name: String, location: Location},

	#[error("{location}: Action of \"{production}\" failed: {source}")]
	Action {production: String, location: Location, source: ActionError},

	#[error("No goto from state {state} on \"{nonterminal}\"")]
	MissingGoto {state: usize, nonterminal: String},

	#[error("Parse accepted without a value")]
	NoValue,
}
