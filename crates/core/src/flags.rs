// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::ops::{BitAnd, BitOr, Not};

use serde::{Deserialize, Serialize};

macro_rules! flags {
	($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $flag:ident = $bit:expr),* $(,)? }) => {
		$(#[$meta])*
		#[repr(transparent)]
		#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(pub u32);

		impl $name {
			$($(#[$fmeta])* pub const $flag: $name = $name(1 << $bit);)*

			pub const fn empty() -> Self {
				Self(0)
			}

			pub const fn bits(&self) -> u32 {
				self.0
			}

			pub const fn is_empty(&self) -> bool {
				self.0 == 0
			}

			pub const fn contains(&self, other: Self) -> bool {
				self.0 & other.0 == other.0
			}

			pub fn insert(&mut self, other: Self) {
				self.0 |= other.0;
			}

			pub fn remove(&mut self, other: Self) {
				self.0 &= !other.0;
			}

			pub const fn without(self, other: Self) -> Self {
				Self(self.0 & !other.0)
			}
		}

		impl BitOr for $name {
			type Output = Self;

			fn bitor(self, rhs: Self) -> Self {
				Self(self.0 | rhs.0)
			}
		}

		impl BitAnd for $name {
			type Output = Self;

			fn bitand(self, rhs: Self) -> Self {
				Self(self.0 & rhs.0)
			}
		}

		impl Not for $name {
			type Output = Self;

			fn not(self) -> Self {
				Self(!self.0)
			}
		}
	};
}

flags! {
	/// Permissions a table grants to editors.
	TableFlags {
		ALLOW_ROW_EDIT = 0,
		ALLOW_ADD_ROW = 1,
		ALLOW_DELETE_ROW = 2,
		ALLOW_ADD_COLUMN = 3,
		ALLOW_DELETE_COLUMN = 4,
		ALLOW_MOVE_COLUMN = 5,
		ALLOW_RENAME_COLUMN = 6,
		ALLOW_COLUMN_FLAG_EDIT = 7,
	}
}

impl TableFlags {
	/// Every permission that changes the column layout of a table.
	pub const COLUMN_EDIT: TableFlags = TableFlags(
		Self::ALLOW_ADD_COLUMN.0
			| Self::ALLOW_DELETE_COLUMN.0
			| Self::ALLOW_MOVE_COLUMN.0
			| Self::ALLOW_RENAME_COLUMN.0
			| Self::ALLOW_COLUMN_FLAG_EDIT.0,
	);

	pub const ALL: TableFlags =
		TableFlags(Self::ALLOW_ROW_EDIT.0 | Self::ALLOW_ADD_ROW.0 | Self::ALLOW_DELETE_ROW.0 | Self::COLUMN_EDIT.0);
}

flags! {
	ColumnFlags {
		OPTIONAL = 0,
		READ_ONLY = 1,
		HIDDEN = 2,
	}
}

flags! {
	RowFlags {
		SELECTED = 0,
		LOCKED = 1,
	}
}
