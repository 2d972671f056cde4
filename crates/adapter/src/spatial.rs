// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Static point index for the spatial join path.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tabula_core::RowId;
use tabula_type::{BoundingBox, Geometry, Point};
use tracing::debug;
use xxhash_rust::xxh3::Xxh3;

const NODE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy)]
struct Entry {
	point: Point,
	row: RowId,
	/// Position in the input, so query results keep input order.
	position: usize,
}

#[derive(Debug, Clone, Copy)]
struct Node {
	bounds: BoundingBox,
	/// Children in the level below, or entries for the leaf level.
	start: usize,
	end: usize,
}

/// Packed R-tree over points, bulk loaded with sort-tile-recursive packing.
///
/// Queries select candidates by bounding box and keep those the geometry
/// contains.
#[derive(Debug)]
pub struct PointIndex {
	entries: Vec<Entry>,
	/// `levels[0]` holds the leaves; the last level holds the root.
	levels: Vec<Vec<Node>>,
}

impl PointIndex {
	pub fn build(points: impl IntoIterator<Item = (RowId, Point)>) -> Self {
		let mut entries: Vec<Entry> = points
			.into_iter()
			.enumerate()
			.map(|(position, (row, point))| Entry {
				point,
				row,
				position,
			})
			.collect();

		let mut levels = vec![];
		if entries.is_empty() {
			return Self {
				entries,
				levels,
			};
		}

		let leaves = pack(&mut entries, |e| e.point, |chunk, start| Node {
			bounds: bounds_of(chunk.iter().map(|e| BoundingBox::of_point(e.point))),
			start,
			end: start + chunk.len(),
		});
		levels.push(leaves);

		while levels.last().is_some_and(|level| level.len() > 1) {
			let Some(mut below) = levels.pop() else {
				break;
			};
			let above = pack(&mut below, |n| n.bounds.center(), |chunk, start| Node {
				bounds: bounds_of(chunk.iter().map(|n| n.bounds)),
				start,
				end: start + chunk.len(),
			});
			levels.push(below);
			levels.push(above);
		}

		Self {
			entries,
			levels,
		}
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Whether the index was built from exactly `points`, in this order.
	fn holds(&self, points: &[(RowId, Point)]) -> bool {
		self.entries.len() == points.len()
			&& self.entries.iter().all(|e| {
				let (row, point) = points[e.position];
				row == e.row && point.x.to_bits() == e.point.x.to_bits() && point.y.to_bits() == e.point.y.to_bits()
			})
	}

	/// Rows whose point `geometry` contains, in input order.
	pub fn query(&self, geometry: &Geometry) -> Vec<RowId> {
		let (Some(bounds), Some(root)) = (geometry.bbox(), self.levels.last()) else {
			return vec![];
		};

		let mut hits: Vec<&Entry> = vec![];
		let mut stack: Vec<(usize, usize)> = (0..root.len()).map(|i| (self.levels.len() - 1, i)).collect();
		while let Some((level, index)) = stack.pop() {
			let node = &self.levels[level][index];
			if !node.bounds.intersects(&bounds) {
				continue;
			}
			if level == 0 {
				hits.extend(
					self.entries[node.start..node.end]
						.iter()
						.filter(|e| bounds.contains_point(e.point) && geometry.contains_point(e.point)),
				);
			} else {
				stack.extend((node.start..node.end).map(|child| (level - 1, child)));
			}
		}

		hits.sort_unstable_by_key(|e| e.position);
		hits.into_iter().map(|e| e.row).collect()
	}
}

/// Sorts `items` into tiles and returns one parent per chunk of
/// [`NODE_CAPACITY`] consecutive items.
fn pack<T>(items: &mut [T], center: impl Fn(&T) -> Point, node: impl Fn(&[T], usize) -> Node) -> Vec<Node> {
	let leaf_count = items.len().div_ceil(NODE_CAPACITY);
	let slices = (leaf_count as f64).sqrt().ceil().max(1.0) as usize;
	let slice_len = slices * NODE_CAPACITY;

	items.sort_by(|a, b| center(a).x.total_cmp(&center(b).x));
	for slice in items.chunks_mut(slice_len) {
		slice.sort_by(|a, b| center(a).y.total_cmp(&center(b).y));
	}

	items.chunks(NODE_CAPACITY).enumerate().map(|(i, chunk)| node(chunk, i * NODE_CAPACITY)).collect()
}

fn bounds_of(mut boxes: impl Iterator<Item = BoundingBox>) -> BoundingBox {
	let Some(mut result) = boxes.next() else {
		return BoundingBox::of_point(Point::new(0.0, 0.0));
	};
	for b in boxes {
		result.expand_to_include(&b);
	}
	result
}

/// Content hash of a point set, used as the cache key.
pub fn point_set_key(points: &[(RowId, Point)]) -> u64 {
	let mut hasher = Xxh3::new();
	for (row, point) in points {
		hasher.update(&row.raw().to_le_bytes());
		hasher.update(&point.x.to_bits().to_le_bytes());
		hasher.update(&point.y.to_bits().to_le_bytes());
	}
	hasher.digest()
}

/// Recently used point indexes of one build session, keyed by the content
/// hash of their point set. A hit is only used when its points match.
#[derive(Debug)]
pub struct SpatialIndexCache {
	capacity: usize,
	entries: Mutex<IndexMap<u64, Arc<PointIndex>>>,
}

impl SpatialIndexCache {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity,
			entries: Mutex::new(IndexMap::new()),
		}
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn get_or_build(&self, points: Vec<(RowId, Point)>) -> Arc<PointIndex> {
		let key = point_set_key(&points);
		{
			let mut entries = self.entries.lock();
			if let Some(index) = entries.shift_remove(&key) {
				if index.holds(&points) {
					debug!(key, points = index.len(), "spatial index cache hit");
					entries.insert(key, index.clone());
					return index;
				}
				debug!(key, "spatial index cache key collision");
			}
		}

		let index = Arc::new(PointIndex::build(points));
		if self.capacity > 0 {
			let mut entries = self.entries.lock();
			while entries.len() >= self.capacity {
				entries.shift_remove_index(0);
			}
			entries.insert(key, index.clone());
		}
		index
	}
}

#[cfg(test)]
mod tests {
	use tabula_core::TableId;

	use super::*;

	fn grid(side: usize) -> Vec<(RowId, Point)> {
		let mut points = vec![];
		for y in 0..side {
			for x in 0..side {
				points.push((RowId::new(TableId(1), (y * side + x) as u32), Point::new(x as f64, y as f64)));
			}
		}
		points
	}

	#[test]
	fn test_query_matches_brute_force() {
		let points = grid(30);
		let index = PointIndex::build(points.clone());
		assert_eq!(index.len(), 900);

		let zones = [
			"POLYGON ((2.5 2.5, 12.5 2.5, 12.5 7.5, 2.5 7.5))",
			"POLYGON ((0 0, 29 0, 0 29))",
			"POLYGON ((10 10, 20 10, 20 20, 10 20), (12 12, 18 12, 18 18, 12 18))",
			"POLYGON ((100 100, 101 100, 101 101))",
		];
		for wkt in zones {
			let zone = Geometry::from_wkt(wkt).unwrap();
			let expected: Vec<RowId> =
				points.iter().filter(|(_, p)| zone.contains_point(*p)).map(|(row, _)| *row).collect();
			assert_eq!(index.query(&zone), expected, "{wkt}");
		}
	}

	#[test]
	fn test_empty_index() {
		let index = PointIndex::build(vec![]);
		assert!(index.is_empty());
		assert!(index.query(&Geometry::from_wkt("POLYGON ((0 0, 1 0, 1 1))").unwrap()).is_empty());
	}

	#[test]
	fn test_cache_reuses_and_evicts() {
		let cache = SpatialIndexCache::new(2);
		let first = cache.get_or_build(grid(3));
		assert!(Arc::ptr_eq(&first, &cache.get_or_build(grid(3))));

		cache.get_or_build(grid(4));
		cache.get_or_build(grid(3));
		cache.get_or_build(grid(5));
		assert_eq!(cache.len(), 2);
		assert!(Arc::ptr_eq(&first, &cache.get_or_build(grid(3))));

		let uncached = SpatialIndexCache::new(0);
		let a = uncached.get_or_build(grid(2));
		assert!(!Arc::ptr_eq(&a, &uncached.get_or_build(grid(2))));
		assert!(uncached.is_empty());
	}

	#[test]
	fn test_colliding_key_is_not_reused() {
		let cache = SpatialIndexCache::new(2);
		let other = Arc::new(PointIndex::build(grid(4)));
		cache.entries.lock().insert(point_set_key(&grid(3)), other.clone());

		let index = cache.get_or_build(grid(3));
		assert!(!Arc::ptr_eq(&index, &other));
		assert_eq!(index.len(), 9);
		assert_eq!(cache.len(), 1);
		assert!(Arc::ptr_eq(&index, &cache.get_or_build(grid(3))));
	}
}
