//! LALR(1) construction.
//!
//! States are LR(0) item sets, interned by their kernel. Lookaheads are computed the way lemon does it:
//! closure items get FIRST of what follows the nonterminal spontaneously, and every item that can pass
//! its own lookahead on (to an item of a goto target, or to a closure item when the rest of the rhs is
//! nullable) gets a propagation link. Then lookaheads flow along the links to a fixpoint.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::action::SemanticContext;
use crate::error::{BuildError, BuildResult, Conflict, ConflictKind};
use crate::grammar::{Associativity, Diagnostic, Grammar, ReduceReducePolicy};
use crate::set::TerminalSet;
use crate::tables::{Action, ParseTables, ResolvedBy, Resolution, StateInfo};

/// Item of a state: production, dot position and lookahead.
struct Item
{	n_rule: usize,
	dot: usize,
	lookahead: TerminalSet,
	/// Items (state, item) that receive this item's lookahead.
	links: Vec<(usize, usize)>,
	/// Lookahead was already passed along the links.
	complete: bool,
}
impl Item
{	fn new(n_rule: usize, dot: usize, n_terminals: usize) -> Self
	{	Self {n_rule, dot, lookahead: TerminalSet::new(n_terminals), links: Vec::new(), complete: false}
	}
}

struct State
{	/// Kernel items first, sorted by (production, dot), then closure items.
	items: Vec<Item>,
	n_kernel: usize,
	/// Shifts and gotos, in the order the symbols follow the dot in `items`.
	transitions: Vec<(usize, usize)>,
}

/// Action table of one state before it is written to [`ParseTables`].
struct Cells
{	actions: Vec<Action>,
	reduced: Vec<usize>,
}

pub(crate) struct TableBuilder<'g, C> where C: SemanticContext
{	grammar: &'g Grammar<C>,
	n_terminals: usize,
	nullable: Vec<bool>,
	first_sets: Vec<TerminalSet>,
	states: Vec<State>,
	state_index: HashMap<Vec<(usize, usize)>, usize>,
	resolutions: Vec<Resolution>,
	conflicts: Vec<Conflict>,
	diagnostics: Vec<Diagnostic>,
}
impl<'g, C> TableBuilder<'g, C> where C: SemanticContext
{	pub fn new(grammar: &'g Grammar<C>) -> Self
	{	let n_terminals = grammar.n_terminals;
		let n_nonterminals = grammar.symbols.len() - n_terminals;
		Self
		{	grammar,
			n_terminals,
			nullable: vec![false; n_nonterminals],
			first_sets: vec![TerminalSet::new(n_terminals); n_nonterminals],
			states: Vec::new(),
			state_index: HashMap::new(),
			resolutions: Vec::new(),
			conflicts: Vec::new(),
			diagnostics: grammar.diagnostics.clone(),
		}
	}

	pub fn build(mut self) -> BuildResult<ParseTables<C>>
	{	self.find_first_sets();
		self.build_states();
		debug!(n_states = self.states.len(), "LR(0) states built");
		self.find_follow_sets();
		dump_states(&self, "lookaheads");

		let grammar = self.grammar;
		let n_nonterminals = grammar.symbols.len() - self.n_terminals;
		let mut actions = Vec::with_capacity(self.states.len());
		let mut gotos = Vec::with_capacity(self.states.len());
		let mut reduced = vec![false; grammar.productions.len()];
		for n_state in 0 .. self.states.len()
		{	let mut row = vec![None; n_nonterminals];
			for &(symbol, target) in self.states[n_state].transitions.iter()
			{	if symbol >= self.n_terminals
				{	row[symbol - self.n_terminals] = Some(target);
				}
			}
			gotos.push(row);
			let cells = self.find_actions(n_state);
			for n_rule in cells.reduced
			{	reduced[n_rule] = true;
			}
			actions.push(cells.actions);
		}
		debug!(n_resolved = self.resolutions.len(), n_conflicts = self.conflicts.len(), "actions assigned");

		if !self.conflicts.is_empty()
		{	return Err(BuildError::Conflicts(self.conflicts));
		}
		for production in grammar.productions.iter().filter(|p| !reduced[p.id])
		{	// lost every reduce/reduce cell to an earlier rule: a diagnostic, not an error
			let dropped_by_order = self.resolutions.iter().any(|r| r.by == ResolvedBy::Order && r.dropped == Self::reduce_action(production.id));
			if !dropped_by_order
			{	return Err(BuildError::NeverReduced {site: production.site, production: production.to_string()});
			}
			warn!(production = %production, "rule is never reduced");
			self.diagnostics.push(Diagnostic {site: Some(production.site), message: format!("This rule can not be reduced: {}", production)});
		}

		let tables = ParseTables
		{	symbols: grammar.symbols.clone(),
			n_terminals: self.n_terminals,
			productions: grammar.productions.clone(),
			actions,
			gotos,
			states: self.states.iter().map(|s| StateInfo {items: s.items.iter().map(|it| (it.n_rule, it.dot)).collect(), n_kernel: s.n_kernel}).collect(),
			nullable: self.nullable,
			first_sets: self.first_sets,
			resolutions: self.resolutions,
			diagnostics: self.diagnostics,
			terminal_index: grammar.symbols[.. self.n_terminals].iter().enumerate().map(|(i, s)| (s.name.clone(), i)).collect(),
		};
		dump_tables(&tables);
		Ok(tables)
	}

	/// Find all nonterminals which will generate the empty string.  Then go back and compute the first sets of every nonterminal.
	/// The first set is the set of all terminal symbols which can begin a string generated by that nonterminal.
	fn find_first_sets(&mut self)
	{	let n_terminals = self.n_terminals;
		let grammar = self.grammar;
		let productions = &grammar.productions;

		// First compute all lambdas
		let mut progress = true;
		while progress
		{	progress = false;
'l:			for production in productions.iter()
			{	let lhs = production.lhs - n_terminals;
				if !self.nullable[lhs]
				{	for &s in production.rhs.iter()
					{	if s < n_terminals || !self.nullable[s - n_terminals]
						{	continue 'l;
						}
					}
					self.nullable[lhs] = true;
					progress = true;
				}
			}
		}

		// Now compute all first sets
		progress = true;
		while progress
		{	progress = false;
			for production in productions.iter()
			{	let lhs = production.lhs - n_terminals;
				for &s in production.rhs.iter()
				{	if s < n_terminals
					{	if self.first_sets[lhs].add(s)
						{	progress = true;
						}
						break;
					}
					let other = s - n_terminals;
					if other != lhs
					{	let first = self.first_sets[other].clone();
						if self.first_sets[lhs].union(&first)
						{	progress = true;
						}
					}
					if !self.nullable[other]
					{	break;
					}
				}
			}
		}
		debug!(n_nullable = self.nullable.iter().filter(|&&v| v).count(), "first sets computed");
	}

	/// FIRST of a symbol sequence, and whether the whole sequence can be empty.
	fn first_of(&self, symbols: &[usize]) -> (TerminalSet, bool)
	{	let mut set = TerminalSet::new(self.n_terminals);
		for &s in symbols.iter()
		{	if s < self.n_terminals
			{	set.add(s);
				return (set, false);
			}
			set.union(&self.first_sets[s - self.n_terminals]);
			if !self.nullable[s - self.n_terminals]
			{	return (set, false);
			}
		}
		(set, true)
	}

	/// Discover all states, from the start state, in breadth-first order.
	fn build_states(&mut self)
	{	let n_start = self.get_state(vec![(0, 0)]);
		self.states[n_start].items[0].lookahead.add(0);
		let mut n_state = 0;
		while n_state < self.states.len()
		{	self.build_shifts(n_state);
			n_state += 1;
		}
	}

	/// Return the state with this kernel, creating and closing it if it is new.
	fn get_state(&mut self, kernel: Vec<(usize, usize)>) -> usize
	{	if let Some(&n_state) = self.state_index.get(&kernel)
		{	return n_state;
		}
		let n_state = self.states.len();
		let mut items: Vec<Item> = kernel.iter().map(|&(n_rule, dot)| Item::new(n_rule, dot, self.n_terminals)).collect();
		self.closure(n_state, &mut items);
		self.states.push(State {items, n_kernel: kernel.len(), transitions: Vec::new()});
		self.state_index.insert(kernel, n_state);
		n_state
	}

	fn closure(&self, n_state: usize, items: &mut Vec<Item>)
	{	let grammar = self.grammar;
		let productions = &grammar.productions;
		let mut positions: HashMap<(usize, usize), usize> = items.iter().enumerate().map(|(i, it)| ((it.n_rule, it.dot), i)).collect();
		let mut i = 0;
		while i < items.len()
		{	let rhs = &productions[items[i].n_rule].rhs;
			let dot = items[i].dot;
			if dot < rhs.len() && rhs[dot] >= self.n_terminals
			{	let (first, rest_nullable) = self.first_of(&rhs[dot+1 ..]);
				for &n_rule in self.grammar.symbols[rhs[dot]].rules.iter()
				{	let j = match positions.get(&(n_rule, 0))
					{	Some(&j) => j,
						None =>
						{	items.push(Item::new(n_rule, 0, self.n_terminals));
							positions.insert((n_rule, 0), items.len() - 1);
							items.len() - 1
						}
					};
					items[j].lookahead.union(&first);
					if rest_nullable && !items[i].links.contains(&(n_state, j))
					{	items[i].links.push((n_state, j));
					}
				}
			}
			i += 1;
		}
	}

	/// Create the transitions out of a state, and link its items to the kernels of the targets.
	fn build_shifts(&mut self, n_state: usize)
	{	let grammar = self.grammar;
		let productions = &grammar.productions;
		let mut groups: Vec<(usize, Vec<(usize, (usize, usize))>)> = Vec::new();
		for (i, item) in self.states[n_state].items.iter().enumerate()
		{	let rhs = &productions[item.n_rule].rhs;
			if item.dot < rhs.len()
			{	let symbol = rhs[item.dot];
				let advanced = (item.n_rule, item.dot + 1);
				match groups.iter_mut().find(|(s, _)| *s == symbol)
				{	Some((_, sources)) => sources.push((i, advanced)),
					None => groups.push((symbol, vec![(i, advanced)])),
				}
			}
		}
		for (symbol, sources) in groups
		{	let mut kernel: Vec<(usize, usize)> = sources.iter().map(|&(_, key)| key).collect();
			kernel.sort_unstable();
			kernel.dedup();
			let target = self.get_state(kernel.clone());
			for (i, key) in sources
			{	if let Ok(j) = kernel.binary_search(&key)
				{	self.states[n_state].items[i].links.push((target, j));
				}
			}
			self.states[n_state].transitions.push((symbol, target));
		}
	}

	/// Pass lookaheads along the links until nothing changes.
	fn find_follow_sets(&mut self)
	{	let mut progress = true;
		while progress
		{	progress = false;
			for n_state in 0 .. self.states.len()
			{	for i in 0 .. self.states[n_state].items.len()
				{	if self.states[n_state].items[i].complete
					{	continue;
					}
					self.states[n_state].items[i].complete = true;
					let lookahead = self.states[n_state].items[i].lookahead.clone();
					for k in 0 .. self.states[n_state].items[i].links.len()
					{	let (to_state, to_item) = self.states[n_state].items[i].links[k];
						let target = &mut self.states[to_state].items[to_item];
						if target.lookahead.union(&lookahead)
						{	target.complete = false;
							progress = true;
						}
					}
				}
			}
		}
	}

	/// Fill the action row of a state, resolving every cell that has more than one candidate.
	fn find_actions(&mut self, n_state: usize) -> Cells
	{	let grammar = self.grammar;
		let productions = &grammar.productions;
		let mut shifts = vec![None; self.n_terminals];
		for &(symbol, target) in self.states[n_state].transitions.iter()
		{	if symbol < self.n_terminals
			{	shifts[symbol] = Some(target);
			}
		}
		let mut reduces = vec![Vec::new(); self.n_terminals];
		for item in self.states[n_state].items.iter()
		{	if item.dot == productions[item.n_rule].rhs.len()
			{	for terminal in item.lookahead.iter()
				{	if !reduces[terminal].contains(&item.n_rule)
					{	reduces[terminal].push(item.n_rule);
					}
				}
			}
		}
		let mut cells = Cells {actions: Vec::with_capacity(self.n_terminals), reduced: Vec::new()};
		for (terminal, mut candidates) in reduces.into_iter().enumerate()
		{	candidates.sort_unstable();
			let reduce = match candidates.len()
			{	0 => None,
				1 => Some(candidates[0]),
				_ => Some(self.resolve_reduce_reduce(n_state, terminal, &candidates)),
			};
			let action = match (shifts[terminal], reduce)
			{	(None, None) => Action::Error,
				(Some(target), None) => Action::Shift(target),
				(None, Some(n_rule)) => Self::reduce_action(n_rule),
				(Some(target), Some(n_rule)) => self.resolve_shift_reduce(n_state, terminal, target, n_rule),
			};
			match action
			{	Action::Reduce(n_rule) => cells.reduced.push(n_rule),
				Action::Accept => cells.reduced.push(0),
				_ => {}
			}
			cells.actions.push(action);
		}
		cells
	}

	fn reduce_action(n_rule: usize) -> Action
	{	if n_rule == 0 {Action::Accept} else {Action::Reduce(n_rule)}
	}

	/// Several productions can be reduced on the same lookahead. Returns the one to keep.
	fn resolve_reduce_reduce(&mut self, n_state: usize, terminal: usize, candidates: &[usize]) -> usize
	{	let grammar = self.grammar;
		let productions = &grammar.productions;
		let explicit_level = |n_rule: usize| if productions[n_rule].has_explicit_prec() {productions[n_rule].prec.map(|p| p.level)} else {None};
		let top = candidates.iter().filter_map(|&r| explicit_level(r)).max();
		let group: Vec<usize> = match top
		{	Some(level) => candidates.iter().copied().filter(|&r| explicit_level(r) == Some(level)).collect(),
			None => candidates.to_vec(),
		};
		let winner = group[0];
		if group.len() > 1
		{	match self.grammar.policy
			{	ReduceReducePolicy::EarliestDeclared =>
				{	let message = format!
					(	"reduce/reduce conflict in state {} on \"{}\" resolved in favour of the earlier rule: {}",
						n_state,
						self.grammar.symbols[terminal].name,
						productions[winner]
					);
					warn!(n_state, lookahead = %self.grammar.symbols[terminal].name, production = %productions[winner], "reduce/reduce conflict resolved by rule order");
					self.diagnostics.push(Diagnostic {site: Some(productions[winner].site), message});
				}
				ReduceReducePolicy::Reject =>
				{	let conflict = self.conflict(ConflictKind::ReduceReduce, n_state, terminal, &group);
					self.conflicts.push(conflict);
				}
			}
		}
		for &n_rule in candidates.iter().filter(|&&r| r != winner)
		{	let by = if group.contains(&n_rule) {ResolvedBy::Order} else {ResolvedBy::Precedence};
			self.resolutions.push(Resolution {n_state, terminal, dropped: Self::reduce_action(n_rule), by});
		}
		winner
	}

	/// Compare the precedence of the lookahead with the precedence of the production.
	fn resolve_shift_reduce(&mut self, n_state: usize, terminal: usize, target: usize, n_rule: usize) -> Action
	{	let shift_prec = self.grammar.symbols[terminal].prec;
		let reduce_prec = self.grammar.productions[n_rule].prec;
		let (action, dropped, by) = match (shift_prec, reduce_prec)
		{	(Some(s), Some(r)) if s.level > r.level => (Action::Shift(target), vec![Self::reduce_action(n_rule)], ResolvedBy::Precedence),
			(Some(s), Some(r)) if s.level < r.level => (Self::reduce_action(n_rule), vec![Action::Shift(target)], ResolvedBy::Precedence),
			(Some(s), Some(_)) => match s.assoc
			{	Associativity::Left => (Self::reduce_action(n_rule), vec![Action::Shift(target)], ResolvedBy::Associativity),
				Associativity::Right => (Action::Shift(target), vec![Self::reduce_action(n_rule)], ResolvedBy::Associativity),
				Associativity::Nonassoc => (Action::Error, vec![Action::Shift(target), Self::reduce_action(n_rule)], ResolvedBy::Associativity),
			},
			_ =>
			{	let conflict = self.conflict(ConflictKind::ShiftReduce, n_state, terminal, &[n_rule]);
				self.conflicts.push(conflict);
				return Action::Shift(target);
			}
		};
		for dropped in dropped
		{	self.resolutions.push(Resolution {n_state, terminal, dropped, by});
		}
		action
	}

	fn conflict(&self, kind: ConflictKind, n_state: usize, terminal: usize, n_rules: &[usize]) -> Conflict
	{	let grammar = self.grammar;
		let productions = &grammar.productions;
		Conflict
		{	kind,
			state: n_state,
			lookahead: self.grammar.symbols[terminal].name.clone(),
			items: self.states[n_state].items.iter().map(|it| productions[it.n_rule].item_text(it.dot)).collect(),
			productions: n_rules.iter().map(|&r| productions[r].to_string()).collect(),
		}
	}
}

#[cfg(not(feature = "with-debug"))]
fn dump_states<C>(_builder: &TableBuilder<'_, C>, _phase: &str) where C: SemanticContext
{
}

#[cfg(not(feature = "with-debug"))]
fn dump_tables<C>(_tables: &ParseTables<C>) where C: SemanticContext
{
}

#[cfg(feature = "with-debug")]
fn dump_states<C>(builder: &TableBuilder<'_, C>, phase: &str) where C: SemanticContext
{	let productions = &builder.grammar.productions;
	for (n_state, state) in builder.states.iter().enumerate()
	{	for (i, item) in state.items.iter().enumerate()
		{	let lookahead: Vec<&str> = item.lookahead.iter().map(|t| builder.grammar.symbols[t].name.as_str()).collect();
			tracing::trace!
			(	phase,
				n_state,
				kernel = i < state.n_kernel,
				item = %productions[item.n_rule].item_text(item.dot),
				lookahead = ?lookahead,
				links = ?item.links,
				"item"
			);
		}
	}
}

#[cfg(feature = "with-debug")]
fn dump_tables<C>(tables: &ParseTables<C>) where C: SemanticContext
{	let mut report = Vec::new();
	if tables.write_report(&mut report, false, true).is_ok()
	{	tracing::trace!(report = %String::from_utf8_lossy(&report), "tables built");
	}
}
