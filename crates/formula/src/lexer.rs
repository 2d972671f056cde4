// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{iter::Peekable, str::CharIndices};

use crate::FormulaError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
	Int(i64),
	Float(f64),
	Text(String),
	/// Bare identifier: a field or a function name.
	Ident(String),
	/// Field name written in double quotes.
	QuotedIdent(String),
	True,
	False,
	Null,
	And,
	Or,
	Not,
	Plus,
	Minus,
	Star,
	Slash,
	Percent,
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
	LParen,
	RParen,
	Comma,
	Eof,
}

impl TokenKind {
	fn from_keyword(text: &str) -> Option<TokenKind> {
		match text.to_ascii_lowercase().as_str() {
			"true" => Some(TokenKind::True),
			"false" => Some(TokenKind::False),
			"null" => Some(TokenKind::Null),
			"and" => Some(TokenKind::And),
			"or" => Some(TokenKind::Or),
			"not" => Some(TokenKind::Not),
			_ => None,
		}
	}

	pub fn describe(&self) -> String {
		match self {
			TokenKind::Int(v) => v.to_string(),
			TokenKind::Float(v) => v.to_string(),
			TokenKind::Text(s) => format!("'{}'", s),
			TokenKind::Ident(s) => s.clone(),
			TokenKind::QuotedIdent(s) => format!("\"{}\"", s),
			TokenKind::Eof => "end of formula".to_string(),
			other => format!("{:?}", other).to_lowercase(),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
	pub kind: TokenKind,
	pub offset: usize,
}

pub struct Lexer<'a> {
	source: &'a str,
	chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
	pub fn new(source: &'a str) -> Self {
		Self {
			source,
			chars: source.char_indices().peekable(),
		}
	}

	pub fn tokenize(mut self) -> crate::Result<Vec<Token>> {
		let mut tokens = Vec::new();
		loop {
			let token = self.next_token()?;
			let is_eof = token.kind == TokenKind::Eof;
			tokens.push(token);
			if is_eof {
				break;
			}
		}
		Ok(tokens)
	}

	fn next_token(&mut self) -> crate::Result<Token> {
		while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}

		let Some(&(offset, ch)) = self.chars.peek() else {
			return Ok(Token {
				kind: TokenKind::Eof,
				offset: self.source.len(),
			});
		};

		let kind = match ch {
			'a'..='z' | 'A'..='Z' | '_' => return Ok(self.scan_identifier(offset)),
			'0'..='9' | '.' => return self.scan_number(offset),
			'\'' => return self.scan_quoted(offset, '\'', "text"),
			'"' => return self.scan_quoted(offset, '"', "quoted field"),
			'=' => {
				self.chars.next();
				self.chars.next_if(|(_, c)| *c == '=');
				TokenKind::Eq
			}
			'!' => {
				self.chars.next();
				if self.chars.next_if(|(_, c)| *c == '=').is_some() {
					TokenKind::Ne
				} else {
					TokenKind::Not
				}
			}
			'<' => {
				self.chars.next();
				if self.chars.next_if(|(_, c)| *c == '=').is_some() {
					TokenKind::Le
				} else if self.chars.next_if(|(_, c)| *c == '>').is_some() {
					TokenKind::Ne
				} else {
					TokenKind::Lt
				}
			}
			'>' => {
				self.chars.next();
				if self.chars.next_if(|(_, c)| *c == '=').is_some() {
					TokenKind::Ge
				} else {
					TokenKind::Gt
				}
			}
			'&' | '|' => {
				self.chars.next();
				if self.chars.next_if(|(_, c)| *c == ch).is_none() {
					return Err(FormulaError::UnexpectedChar {
						ch,
						offset,
					});
				}
				if ch == '&' {
					TokenKind::And
				} else {
					TokenKind::Or
				}
			}
			'+' => self.single(TokenKind::Plus),
			'-' => self.single(TokenKind::Minus),
			'*' => self.single(TokenKind::Star),
			'/' => self.single(TokenKind::Slash),
			'%' => self.single(TokenKind::Percent),
			'(' => self.single(TokenKind::LParen),
			')' => self.single(TokenKind::RParen),
			',' => self.single(TokenKind::Comma),
			_ => {
				return Err(FormulaError::UnexpectedChar {
					ch,
					offset,
				});
			}
		};

		Ok(Token {
			kind,
			offset,
		})
	}

	fn single(&mut self, kind: TokenKind) -> TokenKind {
		self.chars.next();
		kind
	}

	fn scan_identifier(&mut self, start: usize) -> Token {
		let mut end = start;
		while let Some((i, c)) = self.chars.next_if(|(_, c)| c.is_alphanumeric() || *c == '_') {
			end = i + c.len_utf8();
		}
		let text = &self.source[start..end];
		Token {
			kind: TokenKind::from_keyword(text).unwrap_or_else(|| TokenKind::Ident(text.to_string())),
			offset: start,
		}
	}

	fn scan_number(&mut self, start: usize) -> crate::Result<Token> {
		let mut end = start;
		let mut is_float = false;
		while let Some((i, c)) = self.chars.next_if(|(_, c)| c.is_ascii_digit() || *c == '.') {
			is_float |= c == '.';
			end = i + 1;
		}
		// exponent
		if let Some((i, _)) = self.chars.next_if(|(_, c)| *c == 'e' || *c == 'E') {
			is_float = true;
			end = i + 1;
			if let Some((i, _)) = self.chars.next_if(|(_, c)| *c == '-' || *c == '+') {
				end = i + 1;
			}
			while let Some((i, _)) = self.chars.next_if(|(_, c)| c.is_ascii_digit()) {
				end = i + 1;
			}
		}

		let text = &self.source[start..end];
		let invalid = || FormulaError::InvalidNumber {
			text: text.to_string(),
			offset: start,
		};
		let kind = if is_float {
			TokenKind::Float(text.parse().map_err(|_| invalid())?)
		} else {
			match text.parse::<i64>() {
				Ok(v) => TokenKind::Int(v),
				Err(_) => TokenKind::Float(text.parse().map_err(|_| invalid())?),
			}
		};
		Ok(Token {
			kind,
			offset: start,
		})
	}

	/// Quotes are escaped by doubling them.
	fn scan_quoted(&mut self, start: usize, quote: char, what: &'static str) -> crate::Result<Token> {
		self.chars.next();
		let mut value = String::new();
		loop {
			match self.chars.next() {
				None => {
					return Err(FormulaError::Unterminated {
						what,
						offset: start,
					});
				}
				Some((_, c)) if c == quote => {
					if self.chars.next_if(|(_, c)| *c == quote).is_some() {
						value.push(quote);
					} else {
						break;
					}
				}
				Some((_, c)) => value.push(c),
			}
		}
		let kind = if quote == '"' {
			TokenKind::QuotedIdent(value)
		} else {
			TokenKind::Text(value)
		};
		Ok(Token {
			kind,
			offset: start,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn kinds(source: &str) -> Vec<TokenKind> {
		Lexer::new(source).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
	}

	#[test]
	fn test_operators() {
		assert_eq!(
			kinds("a <> 1 && b >= 2.5 || !c"),
			vec![
				TokenKind::Ident("a".into()),
				TokenKind::Ne,
				TokenKind::Int(1),
				TokenKind::And,
				TokenKind::Ident("b".into()),
				TokenKind::Ge,
				TokenKind::Float(2.5),
				TokenKind::Or,
				TokenKind::Not,
				TokenKind::Ident("c".into()),
				TokenKind::Eof,
			]
		);
	}

	#[test]
	fn test_quoted() {
		assert_eq!(
			kinds(r#""Order Id" = 'it''s'"#),
			vec![
				TokenKind::QuotedIdent("Order Id".into()),
				TokenKind::Eq,
				TokenKind::Text("it's".into()),
				TokenKind::Eof
			]
		);
	}

	#[test]
	fn test_keywords_case_insensitive() {
		assert_eq!(kinds("TRUE and Null"), vec![TokenKind::True, TokenKind::And, TokenKind::Null, TokenKind::Eof]);
	}

	#[test]
	fn test_errors() {
		assert!(matches!(Lexer::new("'open").tokenize(), Err(FormulaError::Unterminated { .. })));
		assert!(matches!(Lexer::new("a & b").tokenize(), Err(FormulaError::UnexpectedChar { ch: '&', .. })));
		assert!(matches!(Lexer::new("1.2.3").tokenize(), Err(FormulaError::InvalidNumber { .. })));
	}
}
