use std::fmt;
use std::sync::Arc;

use crate::action::{ActionFn, ActionTemplate, SemanticContext};
use crate::error::{GrammarError, GrammarResult, RuleSite};

/// Per-rule options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleOptions
{	pub(crate) prec: Option<String>,
}
impl RuleOptions
{	pub fn new() -> Self
	{	Self::default()
	}

	/// Take the precedence of this symbol instead of the precedence of the rightmost rhs terminal (yacc `%prec`).
	pub fn prec(mut self, symbol_name: &str) -> Self
	{	self.prec = Some(symbol_name.trim().to_string());
		self
	}
}

/// Action as given by the rule author.
pub(crate) enum RuleAction<C> where C: SemanticContext
{	/// No action: pass the value of `$1` through.
	Default,
	Template(String),
	Native(ActionFn<C>),
}

/// Canonical production: lhs, rhs, compiled action and precedence.
///
/// Symbol ids in `lhs` and `rhs` are assigned when the grammar is assembled; until then only the names are meaningful.
pub struct Production<C> where C: SemanticContext
{	pub(crate) id: usize,
	pub(crate) site: RuleSite,
	pub(crate) lhs_name: String,
	pub(crate) rhs_names: Vec<String>,
	pub(crate) lhs: usize,
	pub(crate) rhs: Vec<usize>,
	pub(crate) prec_name: Option<String>,
	/// Level and associativity, resolved at assembly.
	pub(crate) prec: Option<crate::grammar::Precedence>,
	pub(crate) template: Option<ActionTemplate>,
	pub(crate) action: ActionFn<C>,
}
impl<C> Production<C> where C: SemanticContext
{	pub fn id(&self) -> usize
	{	self.id
	}

	pub fn site(&self) -> RuleSite
	{	self.site
	}

	pub fn lhs(&self) -> &str
	{	&self.lhs_name
	}

	pub fn rhs(&self) -> &[String]
	{	&self.rhs_names
	}

	pub fn arity(&self) -> usize
	{	self.rhs_names.len()
	}

	/// Precedence symbol given with [`RuleOptions::prec`].
	pub fn prec_symbol(&self) -> Option<&str>
	{	self.prec_name.as_deref()
	}

	pub fn precedence(&self) -> Option<crate::grammar::Precedence>
	{	self.prec
	}

	/// Normalized action template, or `None` for native actions.
	pub fn template(&self) -> Option<&ActionTemplate>
	{	self.template.as_ref()
	}

	pub(crate) fn has_explicit_prec(&self) -> bool
	{	self.prec_name.is_some()
	}

	/// Write the production with `*` before the rhs symbol at `dot`. Pass `usize::MAX` to omit the dot.
	pub(crate) fn write_with_dot(&self, f: &mut dyn fmt::Write, dot: usize) -> fmt::Result
	{	write!(f, "{} ::=", self.lhs_name)?;
		for (i, name) in self.rhs_names.iter().enumerate()
		{	if i == dot
			{	write!(f, " *")?;
			}
			write!(f, " {}", name)?;
		}
		if dot == self.rhs_names.len()
		{	write!(f, " *")?;
		}
		Ok(())
	}

	pub(crate) fn item_text(&self, dot: usize) -> String
	{	let mut text = String::new();
		let _ = self.write_with_dot(&mut text, dot);
		text
	}
}
impl<C> Clone for Production<C> where C: SemanticContext
{	fn clone(&self) -> Self
	{	Self
		{	id: self.id,
			site: self.site,
			lhs_name: self.lhs_name.clone(),
			rhs_names: self.rhs_names.clone(),
			lhs: self.lhs,
			rhs: self.rhs.clone(),
			prec_name: self.prec_name.clone(),
			prec: self.prec,
			template: self.template.clone(),
			action: Arc::clone(&self.action),
		}
	}
}
impl<C> fmt::Display for Production<C> where C: SemanticContext
{	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{	self.write_with_dot(f, usize::MAX)
	}
}
impl<C> fmt::Debug for Production<C> where C: SemanticContext
{	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{	f.debug_struct("Production")
			.field("id", &self.id)
			.field("text", &self.to_string())
			.field("prec", &self.prec_name)
			.field("template", &self.template.as_ref().map(|t| t.to_string()))
			.finish()
	}
}

/// Symbol name validity: identifier, or a word made only of ASCII punctuation.
pub(crate) fn is_identifier(name: &str) -> bool
{	let mut chars = name.chars();
	match chars.next()
	{	Some(c) if c.is_ascii_alphabetic() || c=='_' || c=='$' => chars.all(|c| c.is_ascii_alphanumeric() || c=='_'),
		_ => false
	}
}

/// Words like `.`, `..`, `?.` or `++` are terminals without registration.
pub(crate) fn is_punctuation(name: &str) -> bool
{	!name.is_empty() && name.chars().all(|c| c.is_ascii_punctuation())
}

/// Turns one authored rule into a [`Production`].
pub(crate) struct RuleCompiler;
impl RuleCompiler
{	pub fn compile<C>(site: RuleSite, lhs_name: &str, pattern: &str, action: RuleAction<C>, options: RuleOptions) -> GrammarResult<Production<C>> where C: SemanticContext + 'static
	{	let lhs_name = lhs_name.trim();
		if !is_identifier(lhs_name) || lhs_name.starts_with('$')
		{	return Err(GrammarError::InvalidSymbolName {site, name: lhs_name.to_string()});
		}
		let mut rhs_names = Vec::new();
		for word in pattern.split_ascii_whitespace()
		{	if (!is_identifier(word) && !is_punctuation(word)) || word.starts_with('$')
			{	return Err(GrammarError::InvalidSymbolName {site, name: word.to_string()});
			}
			rhs_names.push(word.to_string());
		}
		if let Some(prec) = options.prec.as_deref()
		{	if !is_identifier(prec) && !is_punctuation(prec)
			{	return Err(GrammarError::InvalidSymbolName {site, name: prec.to_string()});
			}
		}
		let arity = rhs_names.len();
		let (template, action) = match action
		{	RuleAction::Default =>
			{	if arity == 0
				{	return Err(GrammarError::EmptyRule {site, lhs: lhs_name.to_string()});
				}
				let template = ActionTemplate::pass_through();
				let action = template.compile::<C>(arity);
				(Some(template), action)
			}
			RuleAction::Template(text) =>
			{	let template = ActionTemplate::parse(site, &text, arity)?;
				let action = template.compile::<C>(arity);
				(Some(template), action)
			}
			RuleAction::Native(action) => (None, action),
		};
		Ok
		(	Production
			{	id: 0,
				site,
				lhs_name: lhs_name.to_string(),
				rhs_names,
				lhs: 0,
				rhs: Vec::new(),
				prec_name: options.prec,
				prec: None,
				template,
				action,
			}
		)
	}
}
