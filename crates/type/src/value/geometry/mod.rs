// SPDX-License-Identifier: MIT
// Copyright (c) 2025 ReifyDB

//! Unprojected geometries. `x` is the longitude and `y` the latitude.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

mod wkt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
	pub x: f64,
	pub y: f64,
}

impl Point {
	pub const fn new(x: f64, y: f64) -> Self {
		Self {
			x,
			y,
		}
	}

	pub const fn from_lat_lon(latitude: f64, longitude: f64) -> Self {
		Self {
			x: longitude,
			y: latitude,
		}
	}

	pub fn latitude(&self) -> f64 {
		self.y
	}

	pub fn longitude(&self) -> f64 {
		self.x
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
	pub min_x: f64,
	pub min_y: f64,
	pub max_x: f64,
	pub max_y: f64,
}

impl BoundingBox {
	pub fn of_point(point: Point) -> Self {
		Self {
			min_x: point.x,
			min_y: point.y,
			max_x: point.x,
			max_y: point.y,
		}
	}

	pub fn contains_point(&self, point: Point) -> bool {
		point.x >= self.min_x && point.x <= self.max_x && point.y >= self.min_y && point.y <= self.max_y
	}

	pub fn intersects(&self, other: &BoundingBox) -> bool {
		self.min_x <= other.max_x
			&& self.max_x >= other.min_x
			&& self.min_y <= other.max_y
			&& self.max_y >= other.min_y
	}

	pub fn expand_to_include(&mut self, other: &BoundingBox) {
		self.min_x = self.min_x.min(other.min_x);
		self.min_y = self.min_y.min(other.min_y);
		self.max_x = self.max_x.max(other.max_x);
		self.max_y = self.max_y.max(other.max_y);
	}

	pub fn center(&self) -> Point {
		Point::new((self.min_x + self.max_x) * 0.5, (self.min_y + self.max_y) * 0.5)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
	Point(Point),
	LineString(Vec<Point>),
	Polygon {
		exterior: Vec<Point>,
		holes: Vec<Vec<Point>>,
	},
	Multi(Vec<Geometry>),
}

impl From<Point> for Geometry {
	fn from(point: Point) -> Self {
		Geometry::Point(point)
	}
}

impl Geometry {
	pub fn polygon(exterior: Vec<Point>) -> Self {
		Geometry::Polygon {
			exterior,
			holes: vec![],
		}
	}

	pub fn from_wkt(text: &str) -> crate::Result<Self> {
		wkt::parse(text)
	}

	pub fn to_wkt(&self) -> String {
		wkt::write(self)
	}

	pub fn is_empty(&self) -> bool {
		match self {
			Geometry::Point(_) => false,
			Geometry::LineString(points) => points.is_empty(),
			Geometry::Polygon {
				exterior,
				..
			} => exterior.is_empty(),
			Geometry::Multi(parts) => parts.iter().all(Geometry::is_empty),
		}
	}

	pub fn bbox(&self) -> Option<BoundingBox> {
		match self {
			Geometry::Point(p) => Some(BoundingBox::of_point(*p)),
			Geometry::LineString(points) => points_bbox(points),
			Geometry::Polygon {
				exterior,
				..
			} => points_bbox(exterior),
			Geometry::Multi(parts) => {
				let mut iter = parts.iter().filter_map(Geometry::bbox);
				let mut bounds = iter.next()?;
				for next in iter {
					bounds.expand_to_include(&next);
				}
				Some(bounds)
			}
		}
	}

	/// Boundary-inclusive containment test of a single point.
	pub fn contains_point(&self, point: Point) -> bool {
		match self {
			Geometry::Point(p) => *p == point,
			Geometry::LineString(points) => points.windows(2).any(|w| point_on_segment(w[0], w[1], point)),
			Geometry::Polygon {
				exterior,
				holes,
			} => {
				if !points_bbox(exterior).is_some_and(|b| b.contains_point(point)) {
					return false;
				}
				if !ring_contains(exterior, point) {
					return false;
				}
				!holes.iter().any(|hole| ring_contains(hole, point) && !ring_boundary_contains(hole, point))
			}
			Geometry::Multi(parts) => parts.iter().any(|g| g.contains_point(point)),
		}
	}

	/// Area of polygonal parts, zero for points and lines.
	pub fn area(&self) -> f64 {
		match self {
			Geometry::Polygon {
				exterior,
				holes,
			} => {
				let holes: f64 = holes.iter().map(|h| ring_signed_area(h).abs()).sum();
				(ring_signed_area(exterior).abs() - holes).max(0.0)
			}
			Geometry::Multi(parts) => parts.iter().map(Geometry::area).sum(),
			_ => 0.0,
		}
	}

	pub fn centroid(&self) -> Option<Point> {
		match self {
			Geometry::Point(p) => Some(*p),
			Geometry::LineString(points) => line_centroid(points),
			Geometry::Polygon {
				exterior,
				holes,
			} => {
				let mut area_sum = 0.0;
				let mut cx = 0.0;
				let mut cy = 0.0;
				let (a, c) = ring_area_centroid(exterior)?;
				area_sum += a.abs();
				cx += c.x * a.abs();
				cy += c.y * a.abs();
				for hole in holes {
					if let Some((a, c)) = ring_area_centroid(hole) {
						area_sum -= a.abs();
						cx -= c.x * a.abs();
						cy -= c.y * a.abs();
					}
				}
				if area_sum > f64::EPSILON {
					Some(Point::new(cx / area_sum, cy / area_sum))
				} else {
					vertex_average(exterior)
				}
			}
			Geometry::Multi(parts) => {
				let total_area = self.area();
				if total_area > f64::EPSILON {
					let mut cx = 0.0;
					let mut cy = 0.0;
					for part in parts {
						let a = part.area();
						if let Some(c) = part.centroid().filter(|_| a > 0.0) {
							cx += c.x * a;
							cy += c.y * a;
						}
					}
					Some(Point::new(cx / total_area, cy / total_area))
				} else {
					let centroids: Vec<Point> = parts.iter().filter_map(Geometry::centroid).collect();
					vertex_average(&centroids)
				}
			}
		}
	}

	pub fn latitude(&self) -> Option<f64> {
		self.centroid().map(|p| p.latitude())
	}

	pub fn longitude(&self) -> Option<f64> {
		self.centroid().map(|p| p.longitude())
	}

	/// Flattens nested collections into their simple parts.
	pub fn parts(&self) -> Vec<&Geometry> {
		match self {
			Geometry::Multi(parts) => parts.iter().flat_map(Geometry::parts).collect(),
			other => vec![other],
		}
	}
}

impl Display for Geometry {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.to_wkt())
	}
}

fn points_bbox(points: &[Point]) -> Option<BoundingBox> {
	let first = *points.first()?;
	let mut bounds = BoundingBox::of_point(first);
	for p in points.iter().skip(1) {
		bounds.expand_to_include(&BoundingBox::of_point(*p));
	}
	Some(bounds)
}

fn vertex_average(points: &[Point]) -> Option<Point> {
	if points.is_empty() {
		return None;
	}
	let n = points.len() as f64;
	let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
	Some(Point::new(sx / n, sy / n))
}

fn line_centroid(points: &[Point]) -> Option<Point> {
	let mut length = 0.0;
	let mut cx = 0.0;
	let mut cy = 0.0;
	for w in points.windows(2) {
		let seg = ((w[1].x - w[0].x).powi(2) + (w[1].y - w[0].y).powi(2)).sqrt();
		length += seg;
		cx += (w[0].x + w[1].x) * 0.5 * seg;
		cy += (w[0].y + w[1].y) * 0.5 * seg;
	}
	if length > f64::EPSILON {
		Some(Point::new(cx / length, cy / length))
	} else {
		vertex_average(points)
	}
}

fn ring_signed_area(ring: &[Point]) -> f64 {
	ring_area_centroid(ring).map(|(a, _)| a).unwrap_or(0.0)
}

fn ring_area_centroid(ring: &[Point]) -> Option<(f64, Point)> {
	if ring.len() < 3 {
		return None;
	}
	let mut twice_area = 0.0;
	let mut cx = 0.0;
	let mut cy = 0.0;
	for index in 0..ring.len() {
		let current = ring[index];
		let next = ring[(index + 1) % ring.len()];
		let cross = current.x.mul_add(next.y, -(next.x * current.y));
		twice_area += cross;
		cx += (current.x + next.x) * cross;
		cy += (current.y + next.y) * cross;
	}
	let area = twice_area * 0.5;
	if area.abs() <= f64::EPSILON {
		return Some((0.0, vertex_average(ring)?));
	}
	Some((area, Point::new(cx / (6.0 * area), cy / (6.0 * area))))
}

fn ring_boundary_contains(ring: &[Point], point: Point) -> bool {
	if ring.is_empty() {
		return false;
	}
	let mut previous = ring[ring.len() - 1];
	for &current in ring {
		if point_on_segment(previous, current, point) {
			return true;
		}
		previous = current;
	}
	false
}

fn ring_contains(ring: &[Point], point: Point) -> bool {
	if ring.len() < 3 {
		return false;
	}

	let mut inside = false;
	let mut previous = ring[ring.len() - 1];

	for &current in ring {
		if point_on_segment(previous, current, point) {
			return true;
		}

		let crosses_scanline = (current.y > point.y) != (previous.y > point.y);
		if crosses_scanline {
			let intersection_x =
				((previous.x - current.x) * (point.y - current.y) / (previous.y - current.y)) + current.x;
			if point.x < intersection_x {
				inside = !inside;
			}
		}

		previous = current;
	}

	inside
}

fn point_on_segment(start: Point, end: Point, probe: Point) -> bool {
	let cross = (end.x - start.x) * (probe.y - start.y) - (end.y - start.y) * (probe.x - start.x);
	if cross.abs() > 1e-12 {
		return false;
	}
	probe.x >= start.x.min(end.x) - 1e-12
		&& probe.x <= start.x.max(end.x) + 1e-12
		&& probe.y >= start.y.min(end.y) - 1e-12
		&& probe.y <= start.y.max(end.y) + 1e-12
}

#[cfg(test)]
mod tests {
	use super::*;

	fn square(min: f64, max: f64) -> Vec<Point> {
		vec![Point::new(min, min), Point::new(max, min), Point::new(max, max), Point::new(min, max)]
	}

	#[test]
	fn test_polygon_contains() {
		let polygon = Geometry::polygon(square(0.0, 10.0));
		assert!(polygon.contains_point(Point::new(5.0, 5.0)));
		assert!(polygon.contains_point(Point::new(0.0, 5.0)));
		assert!(!polygon.contains_point(Point::new(10.5, 5.0)));
	}

	#[test]
	fn test_polygon_with_hole() {
		let polygon = Geometry::Polygon {
			exterior: square(0.0, 10.0),
			holes: vec![square(4.0, 6.0)],
		};
		assert!(!polygon.contains_point(Point::new(5.0, 5.0)));
		assert!(polygon.contains_point(Point::new(4.0, 5.0)));
		assert!(polygon.contains_point(Point::new(2.0, 2.0)));
		assert!((polygon.area() - 96.0).abs() < 1e-9);
	}

	#[test]
	fn test_centroid() {
		let polygon = Geometry::polygon(square(0.0, 2.0));
		let c = polygon.centroid().unwrap();
		assert!((c.x - 1.0).abs() < 1e-9 && (c.y - 1.0).abs() < 1e-9);
		assert_eq!(polygon.latitude(), Some(c.y));
	}

	#[test]
	fn test_multi_bbox() {
		let multi = Geometry::Multi(vec![
			Geometry::Point(Point::new(-1.0, 3.0)),
			Geometry::polygon(square(0.0, 2.0)),
		]);
		let b = multi.bbox().unwrap();
		assert_eq!((b.min_x, b.min_y, b.max_x, b.max_y), (-1.0, 0.0, 2.0, 3.0));
	}
}
