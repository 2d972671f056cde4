// SPDX-License-Identifier: MIT
// Copyright (c) 2025 ReifyDB

use std::fmt::Write;

use super::{Geometry, Point};
use crate::TypeError;

pub(super) fn parse(text: &str) -> crate::Result<Geometry> {
	let mut parser = Parser {
		source: text,
		bytes: text.as_bytes(),
		pos: 0,
	};
	let geometry = parser.geometry()?;
	parser.skip_whitespace();
	if parser.pos != parser.bytes.len() {
		return Err(parser.error("unexpected trailing input"));
	}
	Ok(geometry)
}

pub(super) fn write(geometry: &Geometry) -> String {
	let mut out = String::new();
	write_geometry(&mut out, geometry);
	out
}

fn write_geometry(out: &mut String, geometry: &Geometry) {
	match geometry {
		Geometry::Point(p) => {
			let _ = write!(out, "POINT ({} {})", p.x, p.y);
		}
		Geometry::LineString(points) => {
			out.push_str("LINESTRING ");
			write_points(out, points);
		}
		Geometry::Polygon {
			exterior,
			holes,
		} => {
			out.push_str("POLYGON ");
			write_polygon_body(out, exterior, holes);
		}
		Geometry::Multi(parts) if parts.is_empty() => out.push_str("GEOMETRYCOLLECTION EMPTY"),
		Geometry::Multi(parts) if parts.iter().all(|p| matches!(p, Geometry::Polygon { .. })) => {
			out.push_str("MULTIPOLYGON (");
			for (i, part) in parts.iter().enumerate() {
				if i > 0 {
					out.push_str(", ");
				}
				if let Geometry::Polygon {
					exterior,
					holes,
				} = part
				{
					write_polygon_body(out, exterior, holes);
				}
			}
			out.push(')');
		}
		Geometry::Multi(parts) => {
			out.push_str("GEOMETRYCOLLECTION (");
			for (i, part) in parts.iter().enumerate() {
				if i > 0 {
					out.push_str(", ");
				}
				write_geometry(out, part);
			}
			out.push(')');
		}
	}
}

fn write_points(out: &mut String, points: &[Point]) {
	out.push('(');
	for (i, p) in points.iter().enumerate() {
		if i > 0 {
			out.push_str(", ");
		}
		let _ = write!(out, "{} {}", p.x, p.y);
	}
	out.push(')');
}

fn write_polygon_body(out: &mut String, exterior: &[Point], holes: &[Vec<Point>]) {
	out.push('(');
	write_points(out, exterior);
	for hole in holes {
		out.push_str(", ");
		write_points(out, hole);
	}
	out.push(')');
}

struct Parser<'a> {
	source: &'a str,
	bytes: &'a [u8],
	pos: usize,
}

impl<'a> Parser<'a> {
	fn error(&self, reason: &str) -> TypeError {
		TypeError::InvalidGeometry {
			text: self.source.to_string(),
			reason: format!("{} at offset {}", reason, self.pos),
		}
	}

	fn skip_whitespace(&mut self) {
		while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
			self.pos += 1;
		}
	}

	fn peek(&mut self) -> Option<u8> {
		self.skip_whitespace();
		self.bytes.get(self.pos).copied()
	}

	fn expect(&mut self, ch: u8) -> crate::Result<()> {
		if self.peek() == Some(ch) {
			self.pos += 1;
			Ok(())
		} else {
			Err(self.error(&format!("expected '{}'", ch as char)))
		}
	}

	fn keyword(&mut self) -> String {
		self.skip_whitespace();
		let start = self.pos;
		while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_alphabetic() {
			self.pos += 1;
		}
		self.source[start..self.pos].to_ascii_uppercase()
	}

	fn number(&mut self) -> crate::Result<f64> {
		self.skip_whitespace();
		let start = self.pos;
		while self.pos < self.bytes.len() && matches!(self.bytes[self.pos], b'0'..=b'9' | b'.' | b'-' | b'+' | b'e' | b'E') {
			self.pos += 1;
		}
		self.source[start..self.pos].parse::<f64>().map_err(|_| self.error("expected number"))
	}

	fn coordinate(&mut self) -> crate::Result<Point> {
		let x = self.number()?;
		let y = self.number()?;
		Ok(Point::new(x, y))
	}

	fn is_empty_marker(&mut self) -> bool {
		self.skip_whitespace();
		let rest = &self.source[self.pos..];
		if rest.len() >= 5 && rest[..5].eq_ignore_ascii_case("EMPTY") {
			self.pos += 5;
			true
		} else {
			false
		}
	}

	fn point_list(&mut self) -> crate::Result<Vec<Point>> {
		self.expect(b'(')?;
		let mut points = vec![self.coordinate()?];
		while self.peek() == Some(b',') {
			self.pos += 1;
			points.push(self.coordinate()?);
		}
		self.expect(b')')?;
		Ok(points)
	}

	fn polygon_body(&mut self) -> crate::Result<Geometry> {
		self.expect(b'(')?;
		let exterior = self.point_list()?;
		let mut holes = vec![];
		while self.peek() == Some(b',') {
			self.pos += 1;
			holes.push(self.point_list()?);
		}
		self.expect(b')')?;
		Ok(Geometry::Polygon {
			exterior,
			holes,
		})
	}

	fn list<F>(&mut self, mut item: F) -> crate::Result<Vec<Geometry>>
	where
		F: FnMut(&mut Self) -> crate::Result<Geometry>,
	{
		self.expect(b'(')?;
		let mut items = vec![item(self)?];
		while self.peek() == Some(b',') {
			self.pos += 1;
			items.push(item(self)?);
		}
		self.expect(b')')?;
		Ok(items)
	}

	fn geometry(&mut self) -> crate::Result<Geometry> {
		let keyword = self.keyword();
		if keyword.is_empty() {
			return Err(self.error("expected geometry keyword"));
		}
		if self.is_empty_marker() {
			return match keyword.as_str() {
				"LINESTRING" => Ok(Geometry::LineString(vec![])),
				"POLYGON" => Ok(Geometry::polygon(vec![])),
				"POINT" => Err(self.error("empty points are not supported")),
				_ => Ok(Geometry::Multi(vec![])),
			};
		}
		match keyword.as_str() {
			"POINT" => {
				self.expect(b'(')?;
				let p = self.coordinate()?;
				self.expect(b')')?;
				Ok(Geometry::Point(p))
			}
			"LINESTRING" => Ok(Geometry::LineString(self.point_list()?)),
			"POLYGON" => self.polygon_body(),
			"MULTIPOINT" => Ok(Geometry::Multi(self.list(|p| {
				if p.peek() == Some(b'(') {
					p.pos += 1;
					let point = p.coordinate()?;
					p.expect(b')')?;
					Ok(Geometry::Point(point))
				} else {
					Ok(Geometry::Point(p.coordinate()?))
				}
			})?)),
			"MULTILINESTRING" => Ok(Geometry::Multi(self.list(|p| Ok(Geometry::LineString(p.point_list()?)))?)),
			"MULTIPOLYGON" => Ok(Geometry::Multi(self.list(|p| p.polygon_body())?)),
			"GEOMETRYCOLLECTION" => Ok(Geometry::Multi(self.list(|p| p.geometry())?)),
			other => Err(self.error(&format!("unsupported geometry type '{}'", other))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_point() {
		assert_eq!(parse("point(1.5 -2)").unwrap(), Geometry::Point(Point::new(1.5, -2.0)));
	}

	#[test]
	fn test_polygon_text_is_stable() {
		let text = "POLYGON ((0 0, 4 0, 4 4, 0 4), (1 1, 2 1, 2 2))";
		assert_eq!(write(&parse(text).unwrap()), text);
	}

	#[test]
	fn test_multipolygon() {
		let g = parse("MULTIPOLYGON (((0 0, 1 0, 1 1)), ((5 5, 6 5, 6 6)))").unwrap();
		match &g {
			Geometry::Multi(parts) => assert_eq!(parts.len(), 2),
			other => panic!("unexpected {:?}", other),
		}
		assert!(g.contains_point(Point::new(5.9, 5.5)));
	}

	#[test]
	fn test_rejects_garbage() {
		assert!(parse("CIRCLE (1 2)").is_err());
		assert!(parse("POINT (1 2) tail").is_err());
		assert!(parse("POINT (1)").is_err());
	}
}
