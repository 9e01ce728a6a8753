//! Semantic actions.
//!
//! An action template is read once, at grammar assembly, into a small expression IR
//! ([`ActionTemplate`]), and the IR is compiled into a native closure ([`ActionFn`]).
//! At reduce time the closure receives the values captured for the production's rhs
//! and the shared [`SemanticContext`], through which all helper calls, method calls and
//! literal constructions are resolved.

use std::fmt;
use std::sync::Arc;

use crate::error::{ActionError, GrammarError, GrammarResult, RuleSite};

/// Shared semantic-value context passed into every action.
///
/// The context owns the knowledge of how tree nodes are built: templates never reach
/// global state, they only name helpers, and the context resolves them.
pub trait SemanticContext
{	/// Semantic value carried by tokens and produced by actions.
	type Value: Clone;

	/// Build a value for a literal that appears in a template.
	fn literal(&mut self, literal: &Literal) -> Result<Self::Value, ActionError>;

	/// Call a helper, like `Op("+", $1, $3)`. Only names registered with
	/// [`GrammarBuilder::add_helpers`](crate::GrammarBuilder::add_helpers) reach here.
	fn call(&mut self, helper: &str, args: Vec<Self::Value>) -> Result<Self::Value, ActionError>;

	/// Build a list value, like `[$1, $3]`.
	fn list(&mut self, _items: Vec<Self::Value>) -> Result<Self::Value, ActionError>
	{	Err(ActionError::new("list construction is not supported"))
	}

	/// Call a method on a value, like `$1.add($3)`.
	fn method(&mut self, _receiver: Self::Value, method: &str, _args: Vec<Self::Value>) -> Result<Self::Value, ActionError>
	{	Err(ActionError::new(format!("method \"{}\" is not supported", method)))
	}

	/// Read a field of a value, like `$2.value`.
	fn field(&mut self, _receiver: Self::Value, field: &str) -> Result<Self::Value, ActionError>
	{	Err(ActionError::new(format!("field \"{}\" is not supported", field)))
	}
}

/// Compiled action. Receives the context and the rhs values in left-to-right order.
pub type ActionFn<C> = Arc<dyn Fn(&mut C, Vec<<C as SemanticContext>::Value>) -> Result<<C as SemanticContext>::Value, ActionError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal
{	Null,
	Bool(bool),
	Int(i64),
	Str(String),
}
impl fmt::Display for Literal
{	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{	match self
		{	Literal::Null => write!(f, "null"),
			Literal::Bool(v) => write!(f, "{}", v),
			Literal::Int(v) => write!(f, "{}", v),
			Literal::Str(v) => write!(f, "{:?}", v),
		}
	}
}

/// Node of the action IR.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionExpr
{	/// Value of the rhs symbol at this 0-based position.
	Capture(usize),
	/// Value of a `let` binding of the enclosing template.
	Local(usize),
	Literal(Literal),
	List(Vec<ActionExpr>),
	Call {helper: String, args: Vec<ActionExpr>},
	Method {receiver: Box<ActionExpr>, method: String, args: Vec<ActionExpr>},
	Field {receiver: Box<ActionExpr>, field: String},
}
impl ActionExpr
{	fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a ActionExpr))
	{	f(self);
		match self
		{	ActionExpr::List(args) | ActionExpr::Call {args, ..} =>
			{	for arg in args.iter()
				{	arg.visit(f);
				}
			}
			ActionExpr::Method {receiver, args, ..} =>
			{	receiver.visit(f);
				for arg in args.iter()
				{	arg.visit(f);
				}
			}
			ActionExpr::Field {receiver, ..} => receiver.visit(f),
			ActionExpr::Capture(_) | ActionExpr::Local(_) | ActionExpr::Literal(_) => {}
		}
	}
}
impl ActionExpr
{	fn write(&self, f: &mut fmt::Formatter<'_>, locals: &[String]) -> fmt::Result
	{	fn args(f: &mut fmt::Formatter<'_>, args: &[ActionExpr], locals: &[String]) -> fmt::Result
		{	for (i, arg) in args.iter().enumerate()
			{	if i != 0
				{	write!(f, ", ")?;
				}
				arg.write(f, locals)?;
			}
			Ok(())
		}
		match self
		{	ActionExpr::Capture(i) => write!(f, "${}", i+1),
			ActionExpr::Local(i) => match locals.get(*i)
			{	Some(name) => write!(f, "{}", name),
				None => write!(f, "_{}", i),
			},
			ActionExpr::Literal(v) => write!(f, "{}", v),
			ActionExpr::List(items) =>
			{	write!(f, "[")?;
				args(f, items, locals)?;
				write!(f, "]")
			}
			ActionExpr::Call {helper, args: a} =>
			{	write!(f, "{}(", helper)?;
				args(f, a, locals)?;
				write!(f, ")")
			}
			ActionExpr::Method {receiver, method, args: a} =>
			{	receiver.write(f, locals)?;
				write!(f, ".{}(", method)?;
				args(f, a, locals)?;
				write!(f, ")")
			}
			ActionExpr::Field {receiver, field} =>
			{	receiver.write(f, locals)?;
				write!(f, ".{}", field)
			}
		}
	}
}
impl fmt::Display for ActionExpr
{	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{	self.write(f, &[])
	}
}

/// Normalized action: `let` bindings evaluated in order, then the result expression.
///
/// A template of the form `{ return expr; }` has no bindings and is stored as the bare
/// expression, so it costs nothing extra at reduce time.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionTemplate
{	pub bindings: Vec<(String, ActionExpr)>,
	pub result: ActionExpr,
}
impl ActionTemplate
{	/// The default action: value of rhs position 1, unchanged.
	pub fn pass_through() -> Self
	{	Self {bindings: Vec::new(), result: ActionExpr::Capture(0)}
	}

	/// Read template text. Captures are checked against `arity`.
	pub fn parse(site: RuleSite, template: &str, arity: usize) -> GrammarResult<Self>
	{	let lexemes = tokenize(template).map_err(|message| GrammarError::TemplateSyntax {site, template: template.to_string(), message})?;
		let mut reader = TemplateReader {lexemes, pos: 0, locals: Vec::new()};
		let this = reader.read_template().map_err(|message| GrammarError::TemplateSyntax {site, template: template.to_string(), message})?;
		let mut bad_capture = None;
		this.visit(&mut |expr| if let ActionExpr::Capture(i) = expr
		{	if *i >= arity && bad_capture.is_none()
			{	bad_capture = Some(*i);
			}
		});
		if let Some(i) = bad_capture
		{	return Err(GrammarError::CaptureOutOfRange {site, index: i+1, arity});
		}
		Ok(this)
	}

	/// True if the template is a single expression (no `let` bindings).
	pub fn is_shorthand(&self) -> bool
	{	self.bindings.is_empty()
	}

	/// Names of all helpers the template calls, in order of appearance.
	pub fn helpers(&self) -> Vec<&str>
	{	let mut helpers = Vec::new();
		self.visit(&mut |expr| if let ActionExpr::Call {helper, ..} = expr
		{	helpers.push(helper.as_str());
		});
		helpers
	}

	fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a ActionExpr))
	{	for (_, expr) in self.bindings.iter()
		{	expr.visit(f);
		}
		self.result.visit(f);
	}

	/// Compile into a closure over `arity` captured values.
	pub fn compile<C>(&self, arity: usize) -> ActionFn<C> where C: SemanticContext + 'static
	{	// count uses, so that the last evaluation of every capture moves the value instead of cloning it
		let mut remaining = vec![0usize; arity];
		self.visit(&mut |expr| if let ActionExpr::Capture(i) = expr
		{	if *i >= remaining.len()
			{	remaining.resize(*i + 1, 0);
			}
			remaining[*i] += 1;
		});
		let bindings: Vec<Eval<C>> = self.bindings.iter().map(|(_, expr)| compile_expr(expr, &mut remaining)).collect();
		let result = compile_expr::<C>(&self.result, &mut remaining);
		if bindings.is_empty()
		{	Arc::new
			(	move |context: &mut C, captures: Vec<C::Value>|
				{	let mut scope = Scope {context, captures: captures.into_iter().map(Some).collect(), locals: Vec::new()};
					result(&mut scope)
				}
			)
		}
		else
		{	Arc::new
			(	move |context: &mut C, captures: Vec<C::Value>|
				{	let mut scope = Scope {context, captures: captures.into_iter().map(Some).collect(), locals: Vec::with_capacity(bindings.len())};
					for binding in bindings.iter()
					{	let value = binding(&mut scope)?;
						scope.locals.push(value);
					}
					result(&mut scope)
				}
			)
		}
	}
}
impl fmt::Display for ActionTemplate
{	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{	let locals: Vec<String> = self.bindings.iter().map(|(name, _)| name.clone()).collect();
		if locals.is_empty()
		{	return self.result.write(f, &locals);
		}
		write!(f, "{{")?;
		for (name, expr) in self.bindings.iter()
		{	write!(f, " let {} = ", name)?;
			expr.write(f, &locals)?;
			write!(f, ";")?;
		}
		write!(f, " return ")?;
		self.result.write(f, &locals)?;
		write!(f, "; }}")
	}
}

struct Scope<'a, C> where C: SemanticContext
{	context: &'a mut C,
	captures: Vec<Option<C::Value>>,
	locals: Vec<C::Value>,
}

type Eval<C> = Box<dyn Fn(&mut Scope<'_, C>) -> Result<<C as SemanticContext>::Value, ActionError> + Send + Sync>;

fn compile_args<C>(args: &[ActionExpr], remaining: &mut Vec<usize>) -> Vec<Eval<C>> where C: SemanticContext + 'static
{	args.iter().map(|arg| compile_expr(arg, remaining)).collect()
}

fn eval_args<C>(args: &[Eval<C>], scope: &mut Scope<'_, C>) -> Result<Vec<C::Value>, ActionError> where C: SemanticContext
{	let mut values = Vec::with_capacity(args.len());
	for arg in args.iter()
	{	values.push(arg(scope)?);
	}
	Ok(values)
}

// Must visit nodes in the same order as evaluation does, see `remaining` in `ActionTemplate::compile()`.
fn compile_expr<C>(expr: &ActionExpr, remaining: &mut Vec<usize>) -> Eval<C> where C: SemanticContext + 'static
{	match expr
	{	ActionExpr::Capture(i) =>
		{	let i = *i;
			remaining[i] -= 1;
			if remaining[i] == 0
			{	Box::new
				(	move |scope: &mut Scope<'_, C>|
					{	scope.captures.get_mut(i).and_then(Option::take).ok_or_else(|| ActionError::new(format!("capture ${} is not available", i+1)))
					}
				)
			}
			else
			{	Box::new
				(	move |scope: &mut Scope<'_, C>|
					{	scope.captures.get(i).cloned().flatten().ok_or_else(|| ActionError::new(format!("capture ${} is not available", i+1)))
					}
				)
			}
		}
		ActionExpr::Local(i) =>
		{	let i = *i;
			Box::new(move |scope: &mut Scope<'_, C>| scope.locals.get(i).cloned().ok_or_else(|| ActionError::new("let binding is used before it is defined")))
		}
		ActionExpr::Literal(literal) =>
		{	let literal = literal.clone();
			Box::new(move |scope: &mut Scope<'_, C>| scope.context.literal(&literal))
		}
		ActionExpr::List(items) =>
		{	let items = compile_args::<C>(items, remaining);
			Box::new
			(	move |scope: &mut Scope<'_, C>|
				{	let values = eval_args(&items, scope)?;
					scope.context.list(values)
				}
			)
		}
		ActionExpr::Call {helper, args} =>
		{	let helper = helper.clone();
			let args = compile_args::<C>(args, remaining);
			Box::new
			(	move |scope: &mut Scope<'_, C>|
				{	let values = eval_args(&args, scope)?;
					scope.context.call(&helper, values)
				}
			)
		}
		ActionExpr::Method {receiver, method, args} =>
		{	let receiver = compile_expr::<C>(receiver, remaining);
			let method = method.clone();
			let args = compile_args::<C>(args, remaining);
			Box::new
			(	move |scope: &mut Scope<'_, C>|
				{	let receiver = receiver(scope)?;
					let values = eval_args(&args, scope)?;
					scope.context.method(receiver, &method, values)
				}
			)
		}
		ActionExpr::Field {receiver, field} =>
		{	let receiver = compile_expr::<C>(receiver, remaining);
			let field = field.clone();
			Box::new
			(	move |scope: &mut Scope<'_, C>|
				{	let receiver = receiver(scope)?;
					scope.context.field(receiver, &field)
				}
			)
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
enum Lexeme
{	Capture(usize),
	Int(i64),
	Str(String),
	Ident(String),
	Punct(char),
}
impl fmt::Display for Lexeme
{	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{	match self
		{	Lexeme::Capture(i) => write!(f, "${}", i),
			Lexeme::Int(v) => write!(f, "{}", v),
			Lexeme::Str(v) => write!(f, "{:?}", v),
			Lexeme::Ident(v) => write!(f, "{}", v),
			Lexeme::Punct(c) => write!(f, "{}", c),
		}
	}
}

fn tokenize(template: &str) -> Result<Vec<Lexeme>, String>
{	let mut lexemes = Vec::new();
	let mut it = template.char_indices().peekable();
	while let Some((pos, c)) = it.next()
	{	if c.is_whitespace()
		{	continue;
		}
		if c == '$'
		{	let mut digits = String::new();
			while let Some((_, d)) = it.peek().copied().filter(|(_, d)| d.is_ascii_digit())
			{	digits.push(d);
				it.next();
			}
			let index: usize = digits.parse().map_err(|_| format!("expected capture index after '$' at offset {}", pos))?;
			if index == 0
			{	return Err("captures are numbered from $1".to_string());
			}
			lexemes.push(Lexeme::Capture(index));
		}
		else if c.is_ascii_digit()
		{	let mut digits = c.to_string();
			while let Some((_, d)) = it.peek().copied().filter(|(_, d)| d.is_ascii_digit())
			{	digits.push(d);
				it.next();
			}
			lexemes.push(Lexeme::Int(digits.parse().map_err(|_| format!("integer literal out of range: {}", digits))?));
		}
		else if c=='"' || c=='\''
		{	let mut value = String::new();
			let mut closed = false;
			while let Some((_, d)) = it.next()
			{	match d
				{	'\\' =>
					{	match it.next()
						{	Some((_, 'n')) => value.push('\n'),
							Some((_, 't')) => value.push('\t'),
							Some((_, e)) => value.push(e),
							None => break,
						}
					}
					d if d == c =>
					{	closed = true;
						break;
					}
					d => value.push(d),
				}
			}
			if !closed
			{	return Err(format!("string literal at offset {} is not closed", pos));
			}
			lexemes.push(Lexeme::Str(value));
		}
		else if c.is_alphabetic() || c=='_'
		{	let mut ident = c.to_string();
			while let Some((_, d)) = it.peek().copied().filter(|(_, d)| d.is_alphanumeric() || *d=='_')
			{	ident.push(d);
				it.next();
			}
			lexemes.push(Lexeme::Ident(ident));
		}
		else if "{}()[].,;=".contains(c)
		{	lexemes.push(Lexeme::Punct(c));
		}
		else
		{	return Err(format!("unexpected character '{}' at offset {}", c, pos));
		}
	}
	Ok(lexemes)
}

struct TemplateReader
{	lexemes: Vec<Lexeme>,
	pos: usize,
	locals: Vec<String>,
}
impl TemplateReader
{	fn peek(&self) -> Option<&Lexeme>
	{	self.lexemes.get(self.pos)
	}

	fn next(&mut self) -> Option<Lexeme>
	{	let lexeme = self.lexemes.get(self.pos).cloned();
		self.pos += 1;
		lexeme
	}

	fn is_punct(&self, c: char) -> bool
	{	self.peek() == Some(&Lexeme::Punct(c))
	}

	fn is_keyword(&self, keyword: &str) -> bool
	{	matches!(self.peek(), Some(Lexeme::Ident(ident)) if ident == keyword)
	}

	fn expect_punct(&mut self, c: char) -> Result<(), String>
	{	match self.next()
		{	Some(Lexeme::Punct(p)) if p == c => Ok(()),
			Some(other) => Err(format!("expected '{}', found '{}'", c, other)),
			None => Err(format!("expected '{}' at the end", c)),
		}
	}

	fn expect_ident(&mut self) -> Result<String, String>
	{	match self.next()
		{	Some(Lexeme::Ident(ident)) => Ok(ident),
			Some(other) => Err(format!("expected name, found '{}'", other)),
			None => Err("expected name at the end".to_string()),
		}
	}

	fn read_template(&mut self) -> Result<ActionTemplate, String>
	{	if self.lexemes.is_empty()
		{	return Err("empty template".to_string());
		}
		let template = if self.is_punct('{')
		{	self.read_block()?
		}
		else
		{	ActionTemplate {bindings: Vec::new(), result: self.read_expr()?}
		};
		if let Some(junk) = self.peek()
		{	return Err(format!("junk after the end of action: '{}'", junk));
		}
		Ok(template)
	}

	fn read_block(&mut self) -> Result<ActionTemplate, String>
	{	self.expect_punct('{')?;
		let mut bindings = Vec::new();
		while self.is_keyword("let")
		{	self.next();
			let name = self.expect_ident()?;
			self.expect_punct('=')?;
			let expr = self.read_expr()?;
			self.expect_punct(';')?;
			bindings.push((name.clone(), expr));
			self.locals.push(name);
		}
		if self.is_keyword("return")
		{	self.next();
		}
		let result = self.read_expr()?;
		if self.is_punct(';')
		{	self.next();
		}
		self.expect_punct('}')?;
		Ok(ActionTemplate {bindings, result})
	}

	fn read_args(&mut self, close: char) -> Result<Vec<ActionExpr>, String>
	{	let mut args = Vec::new();
		if self.is_punct(close)
		{	self.next();
			return Ok(args);
		}
		loop
		{	args.push(self.read_expr()?);
			if self.is_punct(',')
			{	self.next();
			}
			else
			{	self.expect_punct(close)?;
				return Ok(args);
			}
		}
	}

	fn read_expr(&mut self) -> Result<ActionExpr, String>
	{	let mut expr = self.read_primary()?;
		while self.is_punct('.')
		{	self.next();
			let name = self.expect_ident()?;
			if self.is_punct('(')
			{	self.next();
				let args = self.read_args(')')?;
				expr = ActionExpr::Method {receiver: Box::new(expr), method: name, args};
			}
			else
			{	expr = ActionExpr::Field {receiver: Box::new(expr), field: name};
			}
		}
		Ok(expr)
	}

	fn read_primary(&mut self) -> Result<ActionExpr, String>
	{	match self.next()
		{	Some(Lexeme::Capture(i)) => Ok(ActionExpr::Capture(i - 1)),
			Some(Lexeme::Int(v)) => Ok(ActionExpr::Literal(Literal::Int(v))),
			Some(Lexeme::Str(v)) => Ok(ActionExpr::Literal(Literal::Str(v))),
			Some(Lexeme::Punct('[')) => Ok(ActionExpr::List(self.read_args(']')?)),
			Some(Lexeme::Punct('(')) =>
			{	let expr = self.read_expr()?;
				self.expect_punct(')')?;
				Ok(expr)
			}
			Some(Lexeme::Ident(ident)) =>
			{	match ident.as_str()
				{	"true" => return Ok(ActionExpr::Literal(Literal::Bool(true))),
					"false" => return Ok(ActionExpr::Literal(Literal::Bool(false))),
					"null" => return Ok(ActionExpr::Literal(Literal::Null)),
					_ => {}
				}
				if let Some(i) = self.locals.iter().rposition(|local| *local == ident)
				{	return Ok(ActionExpr::Local(i));
				}
				// helper path: Name or Name.name... followed by call arguments
				let mut helper = ident;
				while self.is_punct('.')
				{	self.next();
					helper.push('.');
					helper.push_str(&self.expect_ident()?);
				}
				if !self.is_punct('(')
				{	return Err(format!("unknown name \"{}\", expected a helper call or a let binding", helper));
				}
				self.next();
				let args = self.read_args(')')?;
				Ok(ActionExpr::Call {helper, args})
			}
			Some(other) => Err(format!("unexpected '{}'", other)),
			None => Err("unexpected end of template".to_string()),
		}
	}
}
