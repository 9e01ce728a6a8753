use std::collections::HashMap;
use std::fmt;
use std::io;

use crate::action::SemanticContext;
use crate::grammar::{Diagnostic, Symbol, SymbolKind};
use crate::rule::Production;
use crate::set::TerminalSet;

/// Content of an ACTION cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Action
{	/// Consume the lookahead and go to the state.
	Shift(usize),
	/// Reduce by the production with this id.
	Reduce(usize),
	Accept,
	Error,
}
impl fmt::Display for Action
{	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{	match self
		{	Action::Shift(n_state) => write!(f, "shift {}", n_state),
			Action::Reduce(n_rule) => write!(f, "reduce {}", n_rule),
			Action::Accept => write!(f, "accept"),
			Action::Error => write!(f, "error"),
		}
	}
}

/// Why an action was dropped from a cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ResolvedBy
{	Precedence,
	Associativity,
	/// Reduce/reduce decided by authoring order.
	Order,
}

/// A cell that held more than one action before precedence made it single-valued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Resolution
{	pub n_state: usize,
	pub terminal: usize,
	pub dropped: Action,
	pub by: ResolvedBy,
}

/// Items of one state, for reports and conflict messages. Kernel items come first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StateInfo
{	pub items: Vec<(usize, usize)>,
	pub n_kernel: usize,
}

/// Immutable LALR(1) tables with the productions they reduce by.
///
/// Built once by [`Grammar::build_tables()`](crate::Grammar::build_tables), then shared by reference
/// with any number of [`Parser`](crate::Parser)s, also across threads.
pub struct ParseTables<C> where C: SemanticContext
{	pub(crate) symbols: Vec<Symbol>,
	pub(crate) n_terminals: usize,
	pub(crate) productions: Vec<Production<C>>,
	pub(crate) actions: Vec<Vec<Action>>,
	pub(crate) gotos: Vec<Vec<Option<usize>>>,
	pub(crate) states: Vec<StateInfo>,
	pub(crate) nullable: Vec<bool>,
	pub(crate) first_sets: Vec<TerminalSet>,
	pub(crate) resolutions: Vec<Resolution>,
	pub(crate) diagnostics: Vec<Diagnostic>,
	pub(crate) terminal_index: HashMap<String, usize>,
}
impl<C> ParseTables<C> where C: SemanticContext
{	pub fn n_states(&self) -> usize
	{	self.actions.len()
	}

	pub fn n_terminals(&self) -> usize
	{	self.n_terminals
	}

	pub fn n_nonterminals(&self) -> usize
	{	self.symbols.len() - self.n_terminals
	}

	/// Id of a terminal, including `$end`.
	pub fn terminal(&self, name: &str) -> Option<usize>
	{	self.terminal_index.get(name).copied()
	}

	/// Id of a nonterminal. Nonterminal ids follow terminal ids.
	pub fn nonterminal(&self, name: &str) -> Option<usize>
	{	self.symbols[self.n_terminals ..].iter().position(|s| s.name == name).map(|i| i + self.n_terminals)
	}

	pub fn symbol_name(&self, n_symbol: usize) -> &str
	{	self.symbols.get(n_symbol).map(|s| s.name.as_str()).unwrap_or("?")
	}

	pub fn action(&self, n_state: usize, terminal: usize) -> Action
	{	self.actions.get(n_state).and_then(|row| row.get(terminal)).copied().unwrap_or(Action::Error)
	}

	pub fn goto(&self, n_state: usize, nonterminal: usize) -> Option<usize>
	{	let column = nonterminal.checked_sub(self.n_terminals)?;
		self.gotos.get(n_state).and_then(|row| row.get(column)).copied().flatten()
	}

	pub fn production(&self, id: usize) -> Option<&Production<C>>
	{	self.productions.get(id)
	}

	pub fn productions(&self) -> &[Production<C>]
	{	&self.productions
	}

	/// Terminals that have an action in the state.
	pub fn expected(&self, n_state: usize) -> Vec<&str>
	{	(0 .. self.n_terminals).filter(|&t| self.action(n_state, t) != Action::Error).map(|t| self.symbols[t].name.as_str()).collect()
	}

	pub(crate) fn fallback(&self, terminal: usize) -> Option<usize>
	{	self.symbols.get(terminal).and_then(|s| s.fallback)
	}

	/// Findings that did not prevent the build, like reduce/reduce conflicts decided by rule order.
	pub fn diagnostics(&self) -> &[Diagnostic]
	{	&self.diagnostics
	}

	/// Write the automaton: items and actions of every state, then symbols with their FIRST sets.
	/// With `basis_only` only kernel items are shown. With `show_resolved` also the actions that precedence dropped.
	pub fn write_report<W>(&self, out: &mut W, basis_only: bool, show_resolved: bool) -> io::Result<()> where W: io::Write
	{	for (n_state, state) in self.states.iter().enumerate()
		{	writeln!(out, "State {}:", n_state)?;
			let items = if basis_only {&state.items[.. state.n_kernel]} else {&state.items[..]};
			for &(n_rule, dot) in items.iter()
			{	let production = &self.productions[n_rule];
				if dot == production.arity()
				{	let buf = format!("({})", n_rule);
					write!(out, "    {:>5} ", buf)?;
				}
				else
				{	write!(out, "          ")?;
				}
				writeln!(out, "{}", production.item_text(dot))?;
			}
			writeln!(out)?;
			for terminal in 0 .. self.n_terminals
			{	self.print_action(out, n_state, terminal)?;
			}
			for (column, target) in self.gotos[n_state].iter().enumerate()
			{	if let Some(target) = target
				{	writeln!(out, "{:>30} goto         {}", self.symbols[self.n_terminals + column].name, target)?;
				}
			}
			if show_resolved
			{	for resolution in self.resolutions.iter().filter(|r| r.n_state == n_state)
				{	let how = match resolution.by
					{	ResolvedBy::Precedence => "dropped by precedence",
						ResolvedBy::Associativity => "dropped by associativity",
						ResolvedBy::Order => "dropped by rule order",
					};
					match resolution.dropped
					{	Action::Shift(target) => writeln!(out, "{:>30} shift        {:<7} -- {}", self.symbol_name(resolution.terminal), target, how)?,
						Action::Reduce(n_rule) => writeln!(out, "{:>30} reduce       {:<7} -- {}", self.symbol_name(resolution.terminal), n_rule, how)?,
						_ => {}
					}
				}
			}
			writeln!(out)?;
		}
		writeln!(out, "----------------------------------------------------")?;
		writeln!(out, "Symbols:")?;
		for (i, symbol) in self.symbols.iter().enumerate()
		{	write!(out, " {:>3}: {}", i, symbol.name)?;
			if symbol.kind == SymbolKind::Nonterminal
			{	let n = i - self.n_terminals;
				write!(out, ":")?;
				if self.nullable[n]
				{	write!(out, " <lambda>")?;
				}
				for terminal in self.first_sets[n].iter()
				{	write!(out, " {}", self.symbols[terminal].name)?;
				}
			}
			else if let Some(prec) = symbol.prec
			{	write!(out, " ({} {})", prec.assoc, prec.level)?;
			}
			writeln!(out)?;
		}
		Ok(())
	}

	fn print_action<W>(&self, out: &mut W, n_state: usize, terminal: usize) -> io::Result<()> where W: io::Write
	{	let lookahead = self.symbol_name(terminal);
		match self.actions[n_state][terminal]
		{	Action::Shift(target) => writeln!(out, "{:>30} shift        {}", lookahead, target),
			Action::Reduce(n_rule) => writeln!(out, "{:>30} reduce       {:<7} {}", lookahead, n_rule, self.productions[n_rule]),
			Action::Accept => writeln!(out, "{:>30} accept", lookahead),
			// only nonassoc cells are explicit errors, the rest are empty
			Action::Error if self.resolutions.iter().any(|r| r.n_state==n_state && r.terminal==terminal) => writeln!(out, "{:>30} error", lookahead),
			Action::Error => Ok(()),
		}
	}
}
impl<C> fmt::Debug for ParseTables<C> where C: SemanticContext
{	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{	f.debug_struct("ParseTables")
			.field("n_states", &self.n_states())
			.field("n_terminals", &self.n_terminals)
			.field("n_productions", &self.productions.len())
			.finish()
	}
}
