// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use tabula_type::Value;

use crate::{
	FormulaError,
	ast::{Ast, BinaryOp, UnaryOp},
	lexer::{Lexer, Token, TokenKind},
};

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
enum Precedence {
	None,
	LogicOr,
	LogicAnd,
	Comparison,
	Term,
	Factor,
	Prefix,
}

fn binary_operator(kind: &TokenKind) -> Option<(BinaryOp, Precedence)> {
	use Precedence::{Comparison, Factor, LogicAnd, LogicOr, Term};

	Some(match kind {
		TokenKind::Or => (BinaryOp::Or, LogicOr),
		TokenKind::And => (BinaryOp::And, LogicAnd),
		TokenKind::Eq => (BinaryOp::Eq, Comparison),
		TokenKind::Ne => (BinaryOp::Ne, Comparison),
		TokenKind::Lt => (BinaryOp::Lt, Comparison),
		TokenKind::Le => (BinaryOp::Le, Comparison),
		TokenKind::Gt => (BinaryOp::Gt, Comparison),
		TokenKind::Ge => (BinaryOp::Ge, Comparison),
		TokenKind::Plus => (BinaryOp::Add, Term),
		TokenKind::Minus => (BinaryOp::Sub, Term),
		TokenKind::Star => (BinaryOp::Mul, Factor),
		TokenKind::Slash => (BinaryOp::Div, Factor),
		TokenKind::Percent => (BinaryOp::Rem, Factor),
		_ => return None,
	})
}

pub fn parse(source: &str) -> crate::Result<Ast> {
	let tokens = Lexer::new(source).tokenize()?;
	let mut parser = Parser {
		tokens,
		position: 0,
	};
	let ast = parser.parse_expr(Precedence::None)?;
	parser.expect(TokenKind::Eof, "end of formula")?;
	Ok(ast)
}

struct Parser {
	tokens: Vec<Token>,
	position: usize,
}

impl Parser {
	fn current(&self) -> &Token {
		// the token list always ends with Eof
		&self.tokens[self.position.min(self.tokens.len() - 1)]
	}

	fn advance(&mut self) -> Token {
		let token = self.current().clone();
		if token.kind != TokenKind::Eof {
			self.position += 1;
		}
		token
	}

	fn unexpected(&self, expected: &'static str) -> FormulaError {
		let token = self.current();
		FormulaError::UnexpectedToken {
			expected,
			found: token.kind.describe(),
			offset: token.offset,
		}
	}

	fn expect(&mut self, kind: TokenKind, expected: &'static str) -> crate::Result<()> {
		if self.current().kind == kind {
			self.advance();
			Ok(())
		} else {
			Err(self.unexpected(expected))
		}
	}

	fn parse_expr(&mut self, precedence: Precedence) -> crate::Result<Ast> {
		let mut left = self.parse_prefix()?;

		while let Some((op, op_precedence)) = binary_operator(&self.current().kind) {
			if op_precedence <= precedence {
				break;
			}
			self.advance();
			let right = self.parse_expr(op_precedence)?;
			left = Ast::Binary {
				op,
				left: Box::new(left),
				right: Box::new(right),
			};
		}

		Ok(left)
	}

	fn parse_prefix(&mut self) -> crate::Result<Ast> {
		let start = self.position;
		let token = self.advance();
		match token.kind {
			TokenKind::Int(v) => Ok(Ast::Literal(Value::Int8(v))),
			TokenKind::Float(v) => Ok(Ast::Literal(Value::float8(v))),
			TokenKind::Text(s) => Ok(Ast::Literal(Value::Utf8(s))),
			TokenKind::True => Ok(Ast::Literal(Value::Boolean(true))),
			TokenKind::False => Ok(Ast::Literal(Value::Boolean(false))),
			TokenKind::Null => Ok(Ast::Literal(Value::Undefined)),
			TokenKind::QuotedIdent(name) => Ok(Ast::Field(name)),
			TokenKind::Ident(name) => {
				if self.current().kind == TokenKind::LParen {
					self.advance();
					let args = self.parse_arguments()?;
					Ok(Ast::Call {
						name,
						args,
					})
				} else {
					Ok(Ast::Field(name))
				}
			}
			TokenKind::LParen => {
				let inner = self.parse_expr(Precedence::None)?;
				self.expect(TokenKind::RParen, "')'")?;
				Ok(inner)
			}
			TokenKind::Minus => {
				let operand = self.parse_expr(Precedence::Prefix)?;
				Ok(match operand {
					Ast::Literal(Value::Int8(v)) => Ast::Literal(Value::Int8(-v)),
					Ast::Literal(Value::Float8(v)) => Ast::Literal(Value::Float8(-v)),
					operand => Ast::Unary {
						op: UnaryOp::Neg,
						operand: Box::new(operand),
					},
				})
			}
			TokenKind::Not => {
				// `not a == b` negates the comparison
				let operand = self.parse_expr(Precedence::LogicAnd)?;
				Ok(Ast::Unary {
					op: UnaryOp::Not,
					operand: Box::new(operand),
				})
			}
			_ => {
				self.position = start;
				Err(self.unexpected("a value"))
			}
		}
	}

	fn parse_arguments(&mut self) -> crate::Result<Vec<Ast>> {
		let mut args = vec![];
		if self.current().kind == TokenKind::RParen {
			self.advance();
			return Ok(args);
		}
		loop {
			args.push(self.parse_expr(Precedence::None)?);
			match self.current().kind {
				TokenKind::Comma => {
					self.advance();
				}
				TokenKind::RParen => {
					self.advance();
					return Ok(args);
				}
				_ => return Err(self.unexpected("',' or ')'")),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn field(name: &str) -> Box<Ast> {
		Box::new(Ast::Field(name.to_string()))
	}

	fn int(v: i64) -> Box<Ast> {
		Box::new(Ast::Literal(Value::Int8(v)))
	}

	#[test]
	fn test_precedence() {
		let ast = parse("a + 2 * 3 == 7 and b").unwrap();
		assert_eq!(
			ast,
			Ast::Binary {
				op: BinaryOp::And,
				left: Box::new(Ast::Binary {
					op: BinaryOp::Eq,
					left: Box::new(Ast::Binary {
						op: BinaryOp::Add,
						left: field("a"),
						right: Box::new(Ast::Binary {
							op: BinaryOp::Mul,
							left: int(2),
							right: int(3),
						}),
					}),
					right: int(7),
				}),
				right: field("b"),
			}
		);
	}

	#[test]
	fn test_left_associative() {
		let ast = parse("10 - 4 - 3").unwrap();
		assert_eq!(
			ast,
			Ast::Binary {
				op: BinaryOp::Sub,
				left: Box::new(Ast::Binary {
					op: BinaryOp::Sub,
					left: int(10),
					right: int(4),
				}),
				right: int(3),
			}
		);
	}

	#[test]
	fn test_not_binds_below_comparison() {
		let ast = parse("not x = 5").unwrap();
		let Ast::Unary {
			op: UnaryOp::Not,
			operand,
		} = &ast
		else {
			panic!("expected not, got {:?}", ast);
		};
		assert!(matches!(**operand, Ast::Binary { op: BinaryOp::Eq, .. }));
	}

	#[test]
	fn test_calls() {
		let ast = parse("geomContains(\"zone\", lat, lon)").unwrap();
		assert_eq!(
			ast,
			Ast::Call {
				name: "geomContains".into(),
				args: vec![Ast::Field("zone".into()), Ast::Field("lat".into()), Ast::Field("lon".into())],
			}
		);
		assert_eq!(
			parse("groupcount()").unwrap(),
			Ast::Call {
				name: "groupcount".into(),
				args: vec![]
			}
		);
	}

	#[test]
	fn test_errors() {
		assert!(matches!(parse("(1 + 2"), Err(FormulaError::UnexpectedToken { .. })));
		assert!(matches!(parse("1 +"), Err(FormulaError::UnexpectedToken { .. })));
		assert!(matches!(parse("f(1 2)"), Err(FormulaError::UnexpectedToken { .. })));
		assert!(matches!(parse("a b"), Err(FormulaError::UnexpectedToken { .. })));
	}
}
