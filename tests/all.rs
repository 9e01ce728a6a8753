use lemon_grammar::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq)]
enum Ast
{	Num(i64),
	Name(String),
	Str(String),
	Bool(bool),
	Null,
	List(Vec<Ast>),
	Op(String, Vec<Ast>),
}

fn op(name: &str, args: Vec<Ast>) -> Ast
{	Ast::Op(name.to_string(), args)
}

fn num(n: i64) -> Ast
{	Ast::Num(n)
}

fn name(s: &str) -> Ast
{	Ast::Name(s.to_string())
}

#[derive(Default)]
struct Ctx
{	calls: usize,
}
impl SemanticContext for Ctx
{	type Value = Ast;

	fn literal(&mut self, literal: &Literal) -> Result<Ast, ActionError>
	{	Ok
		(	match literal
			{	Literal::Null => Ast::Null,
				Literal::Bool(v) => Ast::Bool(*v),
				Literal::Int(v) => Ast::Num(*v),
				Literal::Str(v) => Ast::Str(v.clone()),
			}
		)
	}

	fn call(&mut self, helper: &str, args: Vec<Ast>) -> Result<Ast, ActionError>
	{	self.calls += 1;
		match helper
		{	"Op" =>
			{	let mut args = args.into_iter();
				match args.next()
				{	Some(Ast::Str(name)) => Ok(Ast::Op(name, args.collect())),
					_ => Err(ActionError::new("Op needs an operator name")),
				}
			}
			"Div" =>
			{	if args.get(1) == Some(&Ast::Num(0))
				{	return Err(ActionError::new("division by zero"));
				}
				Ok(Ast::Op("/".to_string(), args))
			}
			_ => Err(ActionError::new(format!("unknown helper {}", helper))),
		}
	}

	fn list(&mut self, items: Vec<Ast>) -> Result<Ast, ActionError>
	{	Ok(Ast::List(items))
	}

	fn method(&mut self, receiver: Ast, method: &str, args: Vec<Ast>) -> Result<Ast, ActionError>
	{	match (receiver, method)
		{	(Ast::List(mut items), "push") =>
			{	items.extend(args);
				Ok(Ast::List(items))
			}
			(receiver, method) => Err(ActionError::new(format!("{:?} has no method {}", receiver, method))),
		}
	}
}

const KEYWORDS: [&str; 5] = ["if", "then", "else", "other", "value"];

/// Words separated by spaces. Numbers are NUM, keywords are their own terminals, other words are ID.
fn lex(src: &str) -> Vec<Token<Ast>>
{	let mut tokens = Vec::new();
	for (n_line, line) in src.lines().enumerate()
	{	let mut offset = 0;
		for word in line.split(' ')
		{	if !word.is_empty()
			{	let location = Location::new(n_line as u32 + 1, offset as u32 + 1);
				let token = if let Ok(n) = word.parse::<i64>()
				{	Token::new("NUM", num(n), location)
				}
				else if KEYWORDS.contains(&word)
				{	Token::new(word.to_string(), name(word), location)
				}
				else if word.chars().all(|c| c.is_ascii_alphanumeric() || c=='_')
				{	Token::new("ID", name(word), location)
				}
				else
				{	Token::new(word.to_string(), Ast::Null, location)
				};
				tokens.push(token);
			}
			offset += word.len() + 1;
		}
	}
	tokens
}

fn calc() -> GrammarBuilder<Ctx>
{	let builder = GrammarBuilder::new()
		.set_left("+ -").unwrap()
		.set_left("* /").unwrap()
		.set_right("UMINUS").unwrap()
		.set_right("^").unwrap();
	calc_rules(builder)
}

fn calc_rules(builder: GrammarBuilder<Ctx>) -> GrammarBuilder<Ctx>
{	builder
		.add_tokens("NUM ID").unwrap()
		.add_helpers("Op Div")
		.add_rule("Expr", "Expr + Expr", "Op('+', $1, $3)").unwrap()
		.add_rule("Expr", "Expr - Expr", "Op('-', $1, $3)").unwrap()
		.add_rule("Expr", "Expr * Expr", "Op('*', $1, $3)").unwrap()
		.add_rule("Expr", "Expr / Expr", "Div($1, $3)").unwrap()
		.add_rule("Expr", "Expr ^ Expr", "Op('^', $1, $3)").unwrap()
		.add_rule_with("Expr", "- Expr", "Op('neg', $2)", RuleOptions::new().prec("UMINUS")).unwrap()
		.add_rule("Expr", "( Expr )", "{ return $2; }").unwrap()
		.add_rule("Expr", "NUM", "").unwrap()
		.add_rule("Expr", "ID", "").unwrap()
}

fn parse(tables: &ParseTables<Ctx>, src: &str) -> ParseResult<Ast>
{	Parser::new(tables, Ctx::default()).parse(lex(src))
}

#[test]
fn precedence()
{	let tables = calc().try_into_tables().unwrap();
	assert_eq!(parse(&tables, "2 + 3 * 4").unwrap(), op("+", vec![num(2), op("*", vec![num(3), num(4)])]));
	assert_eq!(parse(&tables, "2 * 3 + 4").unwrap(), op("+", vec![op("*", vec![num(2), num(3)]), num(4)]));
	assert_eq!(parse(&tables, "( 2 + 3 ) * 4").unwrap(), op("*", vec![op("+", vec![num(2), num(3)]), num(4)]));
	assert_eq!(parse(&tables, "- a * b").unwrap(), op("*", vec![op("neg", vec![name("a")]), name("b")]));
	assert_eq!(parse(&tables, "- a ^ b").unwrap(), op("neg", vec![op("^", vec![name("a"), name("b")])]));
	assert!(tables.diagnostics().is_empty());
}

#[test]
fn associativity()
{	let tables = calc().try_into_tables().unwrap();
	assert_eq!(parse(&tables, "a + b + c").unwrap(), op("+", vec![op("+", vec![name("a"), name("b")]), name("c")]));
	assert_eq!(parse(&tables, "a - b + c").unwrap(), op("+", vec![op("-", vec![name("a"), name("b")]), name("c")]));
	assert_eq!(parse(&tables, "a ^ b ^ c").unwrap(), op("^", vec![name("a"), op("^", vec![name("b"), name("c")])]));
}

#[test]
fn precedence_table_in_one_call()
{	let builder = GrammarBuilder::new()
		.set_precedence(&[(Associativity::Left, "+ -"), (Associativity::Left, "* /"), (Associativity::Right, "UMINUS"), (Associativity::Right, "^")])
		.unwrap();
	let grammar = calc_rules(builder).try_into_grammar().unwrap();
	let bands: Vec<(usize, Associativity, String)> = grammar.precedence_bands().iter().map(|b| (b.level, b.assoc, b.symbols.join(" "))).collect();
	assert_eq!
	(	bands,
		vec!
		[	(4, Associativity::Right, "^".to_string()),
			(3, Associativity::Right, "UMINUS".to_string()),
			(2, Associativity::Left, "* /".to_string()),
			(1, Associativity::Left, "+ -".to_string()),
		]
	);
	let tables = grammar.build_tables().unwrap();
	assert_eq!(parse(&tables, "2 + 3 * 4").unwrap(), op("+", vec![num(2), op("*", vec![num(3), num(4)])]));
	assert_eq!(parse(&tables, "2 * 3 + 4").unwrap(), op("+", vec![op("*", vec![num(2), num(3)]), num(4)]));
	assert_eq!(parse(&tables, "- a * b").unwrap(), op("*", vec![op("neg", vec![name("a")]), name("b")]));
	assert_eq!(parse(&tables, "a - b + c").unwrap(), op("+", vec![op("-", vec![name("a"), name("b")]), name("c")]));
	assert_eq!(parse(&tables, "a ^ b ^ c").unwrap(), op("^", vec![name("a"), op("^", vec![name("b"), name("c")])]));

	let mut separate = Vec::new();
	calc().try_into_tables().unwrap().write_report(&mut separate, false, true).unwrap();
	let mut combined = Vec::new();
	tables.write_report(&mut combined, false, true).unwrap();
	assert_eq!(String::from_utf8(combined).unwrap(), String::from_utf8(separate).unwrap());
}

#[test]
fn empty_input_after_a_parse_starts_from_scratch()
{	let tables = calc().try_into_tables().unwrap();
	let mut parser = Parser::new(&tables, Ctx::default());
	assert_eq!(parser.parse(vec![Token::new("ID", name("x"), Location::new(9, 9))]).unwrap(), name("x"));
	match parser.parse(Vec::new()).unwrap_err()
	{	ParseError::Syntax(e) =>
		{	assert_eq!(e.unexpected, "$end");
			assert_eq!(e.location, Location::default());
		}
		other => panic!("unexpected {:?}", other),
	}
}

#[test]
fn stray_paren_is_reported_where_it_is()
{	let tables = calc().try_into_tables().unwrap();
	let err = parse(&tables, "( 1 + 2 ) )\n").unwrap_err();
	assert_eq!
	(	err,
		ParseError::Syntax
		(	SyntaxError
			{	location: Location::new(1, 11),
				unexpected: ")".to_string(),
				expected: vec!["$end", "+", "-", "*", "/", "^"].into_iter().map(String::from).collect(),
			}
		)
	);
	assert_eq!(err.to_string(), "1:11: Syntax error, unexpected ), expecting $end, +, -, *, /, ^");
}

#[test]
fn unexpected_end_of_input()
{	let tables = calc().try_into_tables().unwrap();
	let err = parse(&tables, "1 +").unwrap_err();
	match err
	{	ParseError::Syntax(e) =>
		{	assert_eq!(e.unexpected, "$end");
			assert_eq!(e.location, Location::new(1, 3));
			assert!(e.expected.contains(&"NUM".to_string()));
			assert!(e.expected.contains(&"(".to_string()));
		}
		other => panic!("unexpected {:?}", other),
	}
}

#[test]
fn unknown_terminal()
{	let tables = calc().try_into_tables().unwrap();
	let err = parse(&tables, "1 @ 2").unwrap_err();
	assert_eq!(err, ParseError::UnknownTerminal {name: "@".to_string(), location: Location::new(1, 3)});
}

#[test]
fn failing_action_names_the_production()
{	let tables = calc().try_into_tables().unwrap();
	let err = parse(&tables, "7 + 1 / 0").unwrap_err();
	assert_eq!
	(	err,
		ParseError::Action
		{	production: "Expr ::= Expr / Expr".to_string(),
			location: Location::new(1, 5),
			source: ActionError::new("division by zero"),
		}
	);
}

#[test]
fn dangling_else_is_a_conflict()
{	let builder = || GrammarBuilder::<Ctx>::new()
		.add_tokens("if then else other ID").unwrap()
		.add_helpers("Op")
		.add_rule("Stmt", "if Expr then Stmt", "Op('if', $2, $4)").unwrap()
		.add_rule("Stmt", "if Expr then Stmt else Stmt", "Op('if', $2, $4, $6)").unwrap()
		.add_rule("Stmt", "other", "").unwrap()
		.add_rule("Expr", "ID", "").unwrap();

	let err = builder().try_into_tables().unwrap_err();
	match &err
	{	BuildError::Conflicts(conflicts) =>
		{	assert_eq!(conflicts.len(), 1);
			assert_eq!(conflicts[0].kind, ConflictKind::ShiftReduce);
			assert_eq!(conflicts[0].lookahead, "else");
			assert_eq!(conflicts[0].productions, vec!["Stmt ::= if Expr then Stmt".to_string()]);
		}
		other => panic!("unexpected {:?}", other),
	}
	assert!(err.to_string().starts_with("1 parsing conflicts\nshift/reduce conflict in state "));

	// binding else tighter than then attaches it to the nearest if
	let tables = builder().set_nonassoc("then").unwrap().set_nonassoc("else").unwrap().try_into_tables().unwrap();
	assert_eq!
	(	parse(&tables, "if a then if b then other else other").unwrap(),
		op("if", vec![name("a"), op("if", vec![name("b"), name("other"), name("other")])])
	);
}

#[test]
fn nonassoc_operator()
{	let tables = GrammarBuilder::<Ctx>::new()
		.add_tokens("NUM").unwrap()
		.add_helpers("Op")
		.set_nonassoc("<").unwrap()
		.add_rule("Expr", "Expr < Expr", "Op('<', $1, $3)").unwrap()
		.add_rule("Expr", "NUM", "").unwrap()
		.try_into_tables().unwrap();
	assert_eq!(parse(&tables, "1 < 2").unwrap(), op("<", vec![num(1), num(2)]));
	let err = parse(&tables, "1 < 2 < 3").unwrap_err();
	assert_eq!
	(	err,
		ParseError::Syntax(SyntaxError {location: Location::new(1, 7), unexpected: "<".to_string(), expected: vec!["$end".to_string()]})
	);
}

fn reduce_reduce(policy: ReduceReducePolicy) -> BuildResult<ParseTables<Ctx>>
{	GrammarBuilder::<Ctx>::new()
		.add_tokens("c x y").unwrap()
		.add_helpers("Op")
		.set_reduce_reduce_policy(policy)
		.add_rule("S", "A x", "").unwrap()
		.add_rule("S", "B y", "").unwrap()
		.add_rule("S", "B x", "").unwrap()
		.add_rule("A", "c", "Op('A', $1)").unwrap()
		.add_rule("B", "c", "Op('B', $1)").unwrap()
		.try_into_tables()
}

#[test]
fn reduce_reduce_prefers_earlier_rule()
{	let tables = reduce_reduce(ReduceReducePolicy::EarliestDeclared).unwrap();
	assert_eq!(tables.diagnostics().len(), 1);
	assert!(tables.diagnostics()[0].message.starts_with("reduce/reduce conflict in state "));
	assert!(tables.diagnostics()[0].message.ends_with("A ::= c"));
	let tokens = |second: &str| vec![Token::new("c", name("c"), Location::new(1, 1)), Token::new(second.to_string(), Ast::Null, Location::new(1, 3))];
	assert_eq!(Parser::new(&tables, Ctx::default()).parse(tokens("x")).unwrap(), op("A", vec![name("c")]));
	assert_eq!(Parser::new(&tables, Ctx::default()).parse(tokens("y")).unwrap(), op("B", vec![name("c")]));
}

#[test]
fn reduce_reduce_can_be_rejected()
{	let err = reduce_reduce(ReduceReducePolicy::Reject).unwrap_err();
	match err
	{	BuildError::Conflicts(conflicts) =>
		{	assert_eq!(conflicts.len(), 1);
			assert_eq!(conflicts[0].kind, ConflictKind::ReduceReduce);
			assert_eq!(conflicts[0].lookahead, "x");
			assert_eq!(conflicts[0].productions, vec!["A ::= c".to_string(), "B ::= c".to_string()]);
		}
		other => panic!("unexpected {:?}", other),
	}
}

#[test]
fn keyword_falls_back_to_identifier()
{	let tables = GrammarBuilder::<Ctx>::new()
		.add_tokens("value ID").unwrap()
		.add_helpers("Op")
		.add_fallback("ID", "value").unwrap()
		.add_rule("Stmt", "value Expr", "Op('value', $2)").unwrap()
		.add_rule("Stmt", "Expr", "").unwrap()
		.add_rule("Expr", "ID", "").unwrap()
		.try_into_tables().unwrap();
	assert_eq!(parse(&tables, "value value").unwrap(), op("value", vec![name("value")]));
	assert_eq!(parse(&tables, "value x").unwrap(), op("value", vec![name("x")]));
	assert_eq!(parse(&tables, "x").unwrap(), name("x"));
}

#[test]
fn templates_with_lists_and_methods()
{	let tables = GrammarBuilder::<Ctx>::new()
		.add_tokens("NUM ID").unwrap()
		.add_helpers("Op")
		.add_rule("Call", "ID ( Args )", "Op('call', $1, $3)").unwrap()
		.add_rule("Args", "Args , Expr", "{ let a = $1; return a.push($3); }").unwrap()
		.add_rule("Args", "Expr", "[$1]").unwrap()
		.add_rule("Expr", "NUM", "").unwrap()
		.try_into_tables().unwrap();
	assert_eq!
	(	parse(&tables, "f ( 1 , 2 , 3 )").unwrap(),
		op("call", vec![name("f"), Ast::List(vec![num(1), num(2), num(3)])])
	);
	let args: Vec<_> = tables.productions().iter().filter(|p| p.lhs() == "Args").collect();
	assert!(!args[0].template().unwrap().is_shorthand());
	assert!(args[1].template().unwrap().is_shorthand());
}

#[test]
fn return_block_is_unwrapped()
{	let grammar = calc().try_into_grammar().unwrap();
	let paren = grammar.productions().iter().find(|p| p.to_string() == "Expr ::= ( Expr )").unwrap();
	assert!(paren.template().unwrap().is_shorthand());
	assert_eq!(paren.template().unwrap().result, ActionExpr::Capture(1));
}

#[test]
fn native_action()
{	let tables = GrammarBuilder::<Ctx>::new()
		.add_tokens("NUM").unwrap()
		.add_rule_fn
		(	"Sum", "Sum NUM", RuleOptions::new(),
			|_ctx, values| match values.as_slice()
			{	[Ast::Num(a), Ast::Num(b)] => Ok(Ast::Num(a + b)),
				_ => Err(ActionError::new("numbers expected")),
			}
		).unwrap()
		.add_rule("Sum", "NUM", "").unwrap()
		.try_into_tables().unwrap();
	assert_eq!(parse(&tables, "1 2 3 4").unwrap(), num(10));
	assert!(tables.productions()[1].template().is_none());
}

#[test]
fn push_interface()
{	let tables = calc().try_into_tables().unwrap();
	let mut parser = Parser::new(&tables, Ctx::default());
	for token in lex("2 * 3")
	{	parser.add_token(token).unwrap();
	}
	assert_eq!(parser.end(Location::new(1, 6)).unwrap(), op("*", vec![num(2), num(3)]));
	// the parser starts over after accept
	for token in lex("7")
	{	parser.add_token(token).unwrap();
	}
	assert_eq!(parser.end(Location::new(1, 2)).unwrap(), num(7));
	// and after an error
	assert!(parser.add_token(Token::new(")", Ast::Null, Location::new(1, 1))).is_err());
	for token in lex("8")
	{	parser.add_token(token).unwrap();
	}
	assert_eq!(parser.end(Location::new(1, 2)).unwrap(), num(8));
	assert_eq!(parser.into_context().calls, 1);
}

#[test]
fn explicit_end_token_stops_the_parse()
{	let tables = calc().try_into_tables().unwrap();
	let mut tokens = lex("1 + 2");
	tokens.push(Token::new(END_OF_INPUT, Ast::Null, Location::new(1, 6)));
	tokens.push(Token::new("NUM", num(99), Location::new(1, 8)));
	assert_eq!(Parser::new(&tables, Ctx::default()).parse(tokens).unwrap(), op("+", vec![num(1), num(2)]));
}

#[test]
fn rebuild_is_deterministic()
{	let grammar = calc().try_into_grammar().unwrap();
	let a = grammar.build_tables().unwrap();
	let b = grammar.build_tables().unwrap();
	assert_eq!(a.n_states(), b.n_states());
	let report = |tables: &ParseTables<Ctx>|
	{	let mut out = Vec::new();
		tables.write_report(&mut out, false, true).unwrap();
		String::from_utf8(out).unwrap()
	};
	assert_eq!(report(&a), report(&b));
	for n_state in 0 .. a.n_states()
	{	for terminal in 0 .. a.n_terminals()
		{	assert_eq!(a.action(n_state, terminal), b.action(n_state, terminal));
		}
	}
}

#[test]
fn report()
{	let tables = calc().try_into_tables().unwrap();
	let mut out = Vec::new();
	tables.write_report(&mut out, false, true).unwrap();
	let full = String::from_utf8(out).unwrap();
	assert!(full.starts_with("State 0:\n"));
	assert!(full.contains("$accept ::= * Expr"));
	assert!(full.contains(" accept"));
	assert!(full.contains("-- dropped by precedence"));
	assert!(full.contains("-- dropped by associativity"));
	assert!(full.contains("Symbols:"));
	let mut out = Vec::new();
	tables.write_report(&mut out, true, false).unwrap();
	let basis = String::from_utf8(out).unwrap();
	assert!(basis.len() < full.len());
	assert!(!basis.contains("dropped"));
}

#[test]
fn tables_are_shared_between_threads()
{	let tables = calc().try_into_tables().unwrap();
	let cases =
	[	("1 + 2", op("+", vec![num(1), num(2)])),
		("3 * ( 4 - 5 )", op("*", vec![num(3), op("-", vec![num(4), num(5)])])),
		("- x", op("neg", vec![name("x")])),
		("a ^ b", op("^", vec![name("a"), name("b")])),
	];
	std::thread::scope
	(	|scope|
		{	let tables = &tables;
			let handles: Vec<_> = cases.iter().map(|(src, _)| scope.spawn(move || parse(tables, src))).collect();
			for (handle, (_, expected)) in handles.into_iter().zip(cases.iter())
			{	assert_eq!(&handle.join().unwrap().unwrap(), expected);
			}
		}
	);
}

#[test]
fn grammar_errors_point_at_the_rule()
{	let err = GrammarBuilder::<Ctx>::new()
		.add_rule("Expr", "Expr + Term", "").unwrap()
		.try_into_grammar()
		.unwrap_err();
	match err
	{	GrammarError::UndefinedNonterminal {site, name, production} =>
		{	assert!(site.file.ends_with("all.rs"));
			assert_eq!(name, "Term");
			assert_eq!(production, "Expr ::= Expr + Term");
		}
		other => panic!("unexpected {:?}", other),
	}
}

fn print_full(ast: &Ast, out: &mut String)
{	match ast
	{	Ast::Num(n) => out.push_str(&n.to_string()),
		Ast::Op(o, args) =>
		{	out.push_str("( ");
			print_full(&args[0], out);
			out.push_str(&format!(" {} ", o));
			print_full(&args[1], out);
			out.push_str(" )");
		}
		_ => unreachable!(),
	}
}

fn level(o: &str) -> u32
{	if o == "*" {2} else {1}
}

/// Parenthesize only where precedence or left associativity requires it.
fn print_min(ast: &Ast, parent: u32, right: bool, out: &mut String)
{	match ast
	{	Ast::Num(n) => out.push_str(&n.to_string()),
		Ast::Op(o, args) =>
		{	let l = level(o);
			let parens = l < parent || (l == parent && right);
			if parens
			{	out.push_str("( ");
			}
			print_min(&args[0], l, false, out);
			out.push_str(&format!(" {} ", o));
			print_min(&args[1], l, true, out);
			if parens
			{	out.push_str(" )");
			}
		}
		_ => unreachable!(),
	}
}

fn arithmetic() -> impl Strategy<Value=Ast>
{	let leaf = (0i64 .. 1000).prop_map(Ast::Num);
	leaf.prop_recursive
	(	5, 64, 2,
		|inner| (inner.clone(), prop::sample::select(vec!["+", "-", "*"]), inner).prop_map(|(a, o, b)| op(o, vec![a, b]))
	)
}

proptest!
{	#[test]
	fn printed_tree_parses_back(tree in arithmetic())
	{	let tables = calc().try_into_tables().unwrap();
		let mut full = String::new();
		print_full(&tree, &mut full);
		prop_assert_eq!(parse(&tables, &full).unwrap(), tree.clone());
		let mut min = String::new();
		print_min(&tree, 0, false, &mut min);
		prop_assert_eq!(parse(&tables, &min).unwrap(), tree);
	}
}
