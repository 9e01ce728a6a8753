use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::action::SemanticContext;
use crate::builder::TableBuilder;
use crate::error::{ActionError, BuildError, BuildResult, GrammarError, GrammarResult, RuleSite};
use crate::rule::{is_identifier, is_punctuation, Production, RuleAction, RuleCompiler, RuleOptions};
use crate::tables::ParseTables;

/// Name of the end-of-input terminal. Always terminal 0.
pub const END_OF_INPUT: &str = "$end";
/// Name of the synthetic start nonterminal of the augmented grammar.
pub const ACCEPT_SYMBOL: &str = "$accept";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Associativity
{	Left,
	Right,
	Nonassoc,
}
impl fmt::Display for Associativity
{	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{	match self
		{	Associativity::Left => write!(f, "left"),
			Associativity::Right => write!(f, "right"),
			Associativity::Nonassoc => write!(f, "nonassoc"),
		}
	}
}

/// Binding strength of a terminal or production. Greater `level` binds tighter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Precedence
{	pub level: usize,
	pub assoc: Associativity,
}

/// One line of the precedence table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrecedenceBand
{	pub level: usize,
	pub assoc: Associativity,
	pub symbols: Vec<String>,
}

/// What to do when two reductions compete for a cell and precedence does not decide.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ReduceReducePolicy
{	/// Reduce by the production that was added first, and record a [`Diagnostic`].
	#[default]
	EarliestDeclared,
	/// Report the cell as a conflict.
	Reject,
}

/// Non-fatal finding about the grammar or the tables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic
{	pub site: Option<RuleSite>,
	pub message: String,
}
impl fmt::Display for Diagnostic
{	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{	match self.site
		{	Some(site) => write!(f, "{}: {}", site, self.message),
			None => write!(f, "{}", self.message),
		}
	}
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SymbolKind
{	Terminal,
	Nonterminal,
}

#[derive(Clone, Debug)]
pub(crate) struct Symbol
{	pub name: String,
	pub kind: SymbolKind,
	pub prec: Option<Precedence>,
	/// Terminal to retry with when this one has no action.
	pub fallback: Option<usize>,
	/// Productions with this lhs, in authoring order.
	pub rules: Vec<usize>,
}
impl Symbol
{	fn new(name: &str, kind: SymbolKind) -> Self
	{	Self {name: name.to_string(), kind, prec: None, fallback: None, rules: Vec::new()}
	}
}

struct BandInFile
{	site: RuleSite,
	assoc: Associativity,
	symbols: Vec<String>,
}

struct FallbackInFile
{	site: RuleSite,
	to: String,
	from: String,
}

/// Collects rules and declarations. Call [`try_into_grammar()`](GrammarBuilder::try_into_grammar) or
/// [`try_into_tables()`](GrammarBuilder::try_into_tables) when everything is added.
///
/// ```
/// use lemon_grammar::{GrammarBuilder, SemanticContext, Literal, ActionError};
///
/// struct Calc;
/// impl SemanticContext for Calc
/// {	type Value = f64;
///
/// 	fn literal(&mut self, literal: &Literal) -> Result<f64, ActionError>
/// 	{	match literal
/// 		{	Literal::Int(v) => Ok(*v as f64),
/// 			_ => Err(ActionError::new("number expected")),
/// 		}
/// 	}
///
/// 	fn call(&mut self, helper: &str, args: Vec<f64>) -> Result<f64, ActionError>
/// 	{	match helper
/// 		{	"Add" => Ok(args[0] + args[1]),
/// 			"Mul" => Ok(args[0] * args[1]),
/// 			_ => Err(ActionError::new(format!("no helper {}", helper))),
/// 		}
/// 	}
/// }
///
/// let tables = GrammarBuilder::<Calc>::new()
/// 	.add_tokens("NUM").unwrap()
/// 	.add_helpers("Add Mul")
/// 	.set_left("+").unwrap()
/// 	.set_left("*").unwrap()
/// 	.add_rule("Expr", "Expr + Expr", "Add($1, $3)").unwrap()
/// 	.add_rule("Expr", "Expr * Expr", "Mul($1, $3)").unwrap()
/// 	.add_rule("Expr", "( Expr )", "$2").unwrap()
/// 	.add_rule("Expr", "NUM", "").unwrap()
/// 	.try_into_tables().unwrap();
/// assert!(tables.n_states() > 0);
/// ```
pub struct GrammarBuilder<C> where C: SemanticContext
{	rules: Vec<Production<C>>,
	tokens: Vec<(String, RuleSite)>,
	helpers: HashSet<String>,
	bands: Vec<BandInFile>,
	fallbacks: Vec<FallbackInFile>,
	start_name: Option<String>,
	policy: ReduceReducePolicy,
}
impl<C> Default for GrammarBuilder<C> where C: SemanticContext + 'static
{	fn default() -> Self
	{	Self::new()
	}
}
impl<C> GrammarBuilder<C> where C: SemanticContext + 'static
{	/// Creates new builder
	pub fn new() -> Self
	{	Self
		{	rules: Vec::with_capacity(64),
			tokens: Vec::new(),
			helpers: HashSet::new(),
			bands: Vec::new(),
			fallbacks: Vec::new(),
			start_name: None,
			policy: ReduceReducePolicy::default(),
		}
	}

	fn words(site: RuleSite, symbol_names: &str) -> GrammarResult<Vec<String>>
	{	let mut words = Vec::new();
		for name in symbol_names.split_ascii_whitespace()
		{	if (!is_identifier(name) && !is_punctuation(name)) || name.starts_with('$')
			{	return Err(GrammarError::InvalidSymbolName {site, name: name.to_string()});
			}
			words.push(name.to_string());
		}
		Ok(words)
	}

	/// Register terminals, separated by whitespace. Punctuation words need no registration.
	#[track_caller]
	pub fn add_tokens(mut self, symbol_names: &str) -> GrammarResult<Self>
	{	let site = RuleSite::caller();
		for name in Self::words(site, symbol_names)?
		{	if !self.tokens.iter().any(|(n, _)| *n == name)
			{	self.tokens.push((name, site));
			}
		}
		Ok(self)
	}

	/// Names that action templates may call, like `"Op Value Block.wrap"`.
	pub fn add_helpers(mut self, helper_names: &str) -> Self
	{	for name in helper_names.split_ascii_whitespace()
		{	self.helpers.insert(name.to_string());
		}
		self
	}

	///	Add a precedence band of left-associative terminals. Every next band binds tighter.
	#[track_caller]
	pub fn set_left(self, symbol_names: &str) -> GrammarResult<Self>
	{	self.set_associativity(RuleSite::caller(), symbol_names, Associativity::Left)
	}

	///	Add a precedence band of right-associative terminals.
	#[track_caller]
	pub fn set_right(self, symbol_names: &str) -> GrammarResult<Self>
	{	self.set_associativity(RuleSite::caller(), symbol_names, Associativity::Right)
	}

	///	Add a precedence band of non-associative terminals. `a < b < c` becomes a syntax error.
	#[track_caller]
	pub fn set_nonassoc(self, symbol_names: &str) -> GrammarResult<Self>
	{	self.set_associativity(RuleSite::caller(), symbol_names, Associativity::Nonassoc)
	}

	/// Add several bands at once, from the loosest to the tightest.
	#[track_caller]
	pub fn set_precedence(mut self, bands: &[(Associativity, &str)]) -> GrammarResult<Self>
	{	let site = RuleSite::caller();
		for (assoc, symbol_names) in bands.iter()
		{	self = self.set_associativity(site, symbol_names, *assoc)?;
		}
		Ok(self)
	}

	fn set_associativity(mut self, site: RuleSite, symbol_names: &str, assoc: Associativity) -> GrammarResult<Self>
	{	let symbols = Self::words(site, symbol_names)?;
		for name in symbols.iter()
		{	if let Some(prev) = self.bands.iter().find(|b| b.symbols.contains(name))
			{	return Err(GrammarError::PrecedenceRedefined {site, name: name.clone(), previous: prev.site});
			}
		}
		if !symbols.is_empty()
		{	self.bands.push(BandInFile {site, assoc, symbols});
		}
		Ok(self)
	}

	///	Let terminals in `symbol_names` be parsed as `fallback_to` where they have no action of their own.
	#[track_caller]
	pub fn add_fallback(mut self, fallback_to: &str, symbol_names: &str) -> GrammarResult<Self>
	{	let site = RuleSite::caller();
		let mut words = Self::words(site, fallback_to)?;
		if words.len() != 1
		{	return Err(GrammarError::InvalidSymbolName {site, name: fallback_to.to_string()});
		}
		let to = words.remove(0);
		for from in Self::words(site, symbol_names)?
		{	if from == to
			{	return Err(GrammarError::FallbackToSelf {site, name: from});
			}
			if self.fallbacks.iter().any(|f| f.from == from)
			{	return Err(GrammarError::FallbackRedefined {site, name: from});
			}
			self.fallbacks.push(FallbackInFile {site, to: to.clone(), from});
		}
		Ok(self)
	}

	/// By default the lhs of the first rule.
	pub fn set_start_symbol(mut self, name: &str) -> Self
	{	self.start_name = Some(name.trim().to_string());
		self
	}

	pub fn set_reduce_reduce_policy(mut self, policy: ReduceReducePolicy) -> Self
	{	self.policy = policy;
		self
	}

	///	Add rule like `"Expr"`, `"Expr + Expr"`, `"Op('+', $1, $3)"`. Empty action means pass `$1` through.
	#[track_caller]
	pub fn add_rule(self, lhs_name: &str, pattern: &str, action: &str) -> GrammarResult<Self>
	{	self.add_rule_with(lhs_name, pattern, action, RuleOptions::new())
	}

	/// Like [`add_rule()`](GrammarBuilder::add_rule), with options such as a precedence override.
	#[track_caller]
	pub fn add_rule_with(mut self, lhs_name: &str, pattern: &str, action: &str, options: RuleOptions) -> GrammarResult<Self>
	{	let site = RuleSite::caller();
		let action = if action.trim().is_empty() {RuleAction::Default} else {RuleAction::Template(action.to_string())};
		let production = RuleCompiler::compile(site, lhs_name, pattern, action, options)?;
		self.rules.push(production);
		Ok(self)
	}

	/// Add rule whose action is a native function of the context and the rhs values.
	#[track_caller]
	pub fn add_rule_fn<F>(mut self, lhs_name: &str, pattern: &str, options: RuleOptions, action: F) -> GrammarResult<Self>
	where F: Fn(&mut C, Vec<C::Value>) -> Result<C::Value, ActionError> + Send + Sync + 'static
	{	let site = RuleSite::caller();
		let production = RuleCompiler::compile(site, lhs_name, pattern, RuleAction::Native(Arc::new(action)), options)?;
		self.rules.push(production);
		Ok(self)
	}

	/// Derive symbol sets and precedence, and check the grammar for consistency.
	pub fn try_into_grammar(self) -> GrammarResult<Grammar<C>>
	{	let Self {rules, tokens, helpers, bands, fallbacks, start_name, policy} = self;
		if rules.is_empty()
		{	return Err(GrammarError::EmptyGrammar);
		}
		let mut diagnostics = Vec::new();

		// nonterminals, in order of first definition
		let mut lhs_names: Vec<&str> = Vec::new();
		for rule in rules.iter()
		{	if tokens.iter().any(|(n, _)| *n == rule.lhs_name)
			{	return Err(GrammarError::TokenAsLhs {site: rule.site, name: rule.lhs_name.clone()});
			}
			if !lhs_names.contains(&rule.lhs_name.as_str())
			{	lhs_names.push(&rule.lhs_name);
			}
		}
		let start_name = start_name.unwrap_or_else(|| rules[0].lhs_name.clone());
		if !lhs_names.contains(&start_name.as_str())
		{	return Err(GrammarError::UnknownStartSymbol {name: start_name});
		}

		// terminals: end of input, then registered tokens, then implicit ones as they appear
		let mut symbols = vec![Symbol::new(END_OF_INPUT, SymbolKind::Terminal)];
		for (name, _) in tokens.iter()
		{	symbols.push(Symbol::new(name, SymbolKind::Terminal));
		}
		let mut index: HashMap<String, usize> = symbols.iter().enumerate().map(|(i, s)| (s.name.clone(), i)).collect();
		for rule in rules.iter()
		{	for name in rule.rhs_names.iter()
			{	if !index.contains_key(name) && !lhs_names.contains(&name.as_str())
				{	if !is_punctuation(name)
					{	return Err(GrammarError::UndefinedNonterminal {site: rule.site, name: name.clone(), production: rule.to_string()});
					}
					index.insert(name.clone(), symbols.len());
					symbols.push(Symbol::new(name, SymbolKind::Terminal));
				}
			}
		}
		// precedence-only pseudo terminals, like UMINUS
		for band in bands.iter()
		{	for name in band.symbols.iter()
			{	if lhs_names.contains(&name.as_str())
				{	return Err(GrammarError::PrecedenceOnNonterminal {site: band.site, name: name.clone()});
				}
				if !index.contains_key(name)
				{	index.insert(name.clone(), symbols.len());
					symbols.push(Symbol::new(name, SymbolKind::Terminal));
				}
			}
		}
		for fallback in fallbacks.iter()
		{	for name in [&fallback.to, &fallback.from]
			{	if lhs_names.contains(&name.as_str())
				{	return Err(GrammarError::FallbackOnNonterminal {site: fallback.site, name: name.clone()});
				}
				if !index.contains_key(name)
				{	index.insert(name.clone(), symbols.len());
					symbols.push(Symbol::new(name, SymbolKind::Terminal));
				}
			}
		}
		let n_terminals = symbols.len();

		// nonterminals: $accept, then user ones
		index.insert(ACCEPT_SYMBOL.to_string(), symbols.len());
		symbols.push(Symbol::new(ACCEPT_SYMBOL, SymbolKind::Nonterminal));
		for name in lhs_names.iter()
		{	index.insert(name.to_string(), symbols.len());
			symbols.push(Symbol::new(name, SymbolKind::Nonterminal));
		}
		let start = index[&start_name];

		// precedence levels: the first band authored is the loosest
		for (i, band) in bands.iter().enumerate()
		{	for name in band.symbols.iter()
			{	symbols[index[name]].prec = Some(Precedence {level: i + 1, assoc: band.assoc});
			}
		}
		let precedence: Vec<PrecedenceBand> = bands.iter().enumerate().rev().map(|(i, band)| PrecedenceBand {level: i + 1, assoc: band.assoc, symbols: band.symbols.clone()}).collect();

		for fallback in fallbacks.iter()
		{	symbols[index[&fallback.from]].fallback = Some(index[&fallback.to]);
		}

		// productions: 0 is `$accept ::= Start`
		let accept_site = rules[0].site;
		let mut productions = Vec::with_capacity(rules.len() + 1);
		let mut accept = RuleCompiler::compile::<C>(accept_site, "accept", &start_name, RuleAction::Default, RuleOptions::new())?;
		accept.lhs_name = ACCEPT_SYMBOL.to_string();
		productions.push(accept);
		productions.extend(rules);
		for (id, production) in productions.iter_mut().enumerate()
		{	production.id = id;
			production.lhs = index[&production.lhs_name];
			production.rhs = production.rhs_names.iter().map(|name| index[name]).collect();
			if let Some(name) = production.prec_name.as_deref()
			{	match index.get(name).and_then(|&i| symbols[i].prec)
				{	Some(prec) => production.prec = Some(prec),
					None => return Err(GrammarError::PrecedenceOverrideUnknown {site: production.site, name: name.to_string()}),
				}
			}
			else
			{	production.prec = production.rhs.iter().rev().filter(|&&s| s < n_terminals).find_map(|&s| symbols[s].prec);
			}
			if let Some(template) = production.template.as_ref()
			{	if let Some(helper) = template.helpers().into_iter().find(|h| !helpers.contains(*h))
				{	return Err(GrammarError::UnknownHelper {site: production.site, helper: helper.to_string()});
				}
			}
			symbols[production.lhs].rules.push(id);
		}

		// every nonterminal must be reachable from the start symbol
		let mut reachable = vec![false; symbols.len()];
		let mut queue = VecDeque::from([n_terminals]);
		reachable[n_terminals] = true;
		while let Some(n_symbol) = queue.pop_front()
		{	for &n_rule in symbols[n_symbol].rules.iter()
			{	for &s in productions[n_rule].rhs.iter()
				{	if !reachable[s]
					{	reachable[s] = true;
						if s >= n_terminals
						{	queue.push_back(s);
						}
					}
				}
			}
		}
		for (i, symbol) in symbols.iter().enumerate().skip(n_terminals)
		{	if !reachable[i]
			{	let site = productions[symbol.rules[0]].site;
				return Err(GrammarError::UnreachableNonterminal {site, name: symbol.name.clone()});
			}
		}
		for (name, site) in tokens.iter()
		{	let i = index[name];
			if !reachable[i] && symbols[i].prec.is_none() && fallbacks.iter().all(|f| f.to != *name && f.from != *name)
			{	diagnostics.push(Diagnostic {site: Some(*site), message: format!("Token \"{}\" is not used in any rule", name)});
			}
		}

		debug!(n_terminals, n_nonterminals = symbols.len() - n_terminals, n_productions = productions.len(), start = %start_name, "grammar assembled");
		Ok
		(	Grammar
			{	symbols,
				n_terminals,
				productions,
				start,
				precedence,
				policy,
				diagnostics,
			}
		)
	}

	/// Assemble the grammar and build the parser tables in one step.
	pub fn try_into_tables(self) -> BuildResult<ParseTables<C>>
	{	self.try_into_grammar()?.build_tables()
	}
}

impl<C> TryFrom<GrammarBuilder<C>> for ParseTables<C> where C: SemanticContext + 'static
{	type Error = BuildError;

	fn try_from(builder: GrammarBuilder<C>) -> BuildResult<Self>
	{	builder.try_into_tables()
	}
}

/// Assembled grammar: symbols, productions, precedence and start symbol.
///
/// Terminals have ids `0 .. n_terminals()`, terminal 0 is `$end`.
/// Nonterminals follow, the first of them is `$accept`, and production 0 is `$accept ::= Start`.
pub struct Grammar<C> where C: SemanticContext
{	pub(crate) symbols: Vec<Symbol>,
	pub(crate) n_terminals: usize,
	pub(crate) productions: Vec<Production<C>>,
	pub(crate) start: usize,
	pub(crate) precedence: Vec<PrecedenceBand>,
	pub(crate) policy: ReduceReducePolicy,
	pub(crate) diagnostics: Vec<Diagnostic>,
}
impl<C> fmt::Debug for Grammar<C> where C: SemanticContext
{	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{	f.debug_struct("Grammar")
			.field("start", &self.start_symbol())
			.field("terminals", &self.terminals().collect::<Vec<_>>())
			.field("nonterminals", &self.nonterminals().collect::<Vec<_>>())
			.field("productions", &self.productions)
			.field("precedence", &self.precedence)
			.finish()
	}
}
impl<C> Grammar<C> where C: SemanticContext
{	pub fn start_symbol(&self) -> &str
	{	&self.symbols[self.start].name
	}

	pub fn n_terminals(&self) -> usize
	{	self.n_terminals
	}

	pub fn terminals(&self) -> impl Iterator<Item=&str> + '_
	{	self.symbols[.. self.n_terminals].iter().map(|s| s.name.as_str())
	}

	pub fn nonterminals(&self) -> impl Iterator<Item=&str> + '_
	{	self.symbols[self.n_terminals ..].iter().map(|s| s.name.as_str())
	}

	pub fn is_terminal(&self, name: &str) -> bool
	{	self.terminals().any(|n| n == name)
	}

	/// Bands from the tightest to the loosest.
	pub fn precedence_bands(&self) -> &[PrecedenceBand]
	{	&self.precedence
	}

	/// First band that contains `name`, searching from the tightest.
	pub fn precedence_of(&self, name: &str) -> Option<Precedence>
	{	self.precedence.iter().find(|band| band.symbols.iter().any(|s| s == name)).map(|band| Precedence {level: band.level, assoc: band.assoc})
	}

	pub fn productions(&self) -> &[Production<C>]
	{	&self.productions
	}

	/// Productions of a nonterminal, in the order they were added.
	pub fn productions_of<'a>(&'a self, nonterminal: &str) -> impl Iterator<Item=&'a Production<C>> + 'a
	{	let rules = self.symbols[self.n_terminals ..].iter().find(|s| s.name == nonterminal).map(|s| s.rules.as_slice()).unwrap_or(&[]);
		rules.iter().map(move |&i| &self.productions[i])
	}

	pub fn reduce_reduce_policy(&self) -> ReduceReducePolicy
	{	self.policy
	}

	pub fn diagnostics(&self) -> &[Diagnostic]
	{	&self.diagnostics
	}

	/// Build LALR(1) parser tables. The grammar stays usable, so it can be built again.
	pub fn build_tables(&self) -> BuildResult<ParseTables<C>>
	{	TableBuilder::new(self).build()
	}
}
