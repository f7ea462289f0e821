// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Declarative bitflag sets used by the descriptor types.

/// Declares a bitflag set with named constants, set operations and a readable `Debug`.
///
/// Unlike a plain integer, the generated type keeps track of the flags it knows about,
/// so `from_bits` can reject values carrying undeclared bits.
#[macro_export]
#[doc(hidden)]
macro_rules! gpu_bitflags {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident: $ty:ty {
            $(
                $(#[$flag_attr:meta])*
                const $flag_name:ident = $flag_value:expr;
            )*
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        $vis struct $name {
            bits: $ty,
        }

        impl $name {
            $(
                $(#[$flag_attr])*
                pub const $flag_name: Self = Self { bits: $flag_value };
            )*

            /// The empty set.
            pub const EMPTY: Self = Self { bits: 0 };

            /// Every declared flag.
            pub const ALL: Self = Self { bits: 0 $(| $flag_value)* };

            /// Builds a set from raw bits, returning `None` if an undeclared bit is set.
            pub const fn from_bits(bits: $ty) -> Option<Self> {
                if bits & !Self::ALL.bits == 0 {
                    Some(Self { bits })
                } else {
                    None
                }
            }

            /// Builds a set from raw bits, dropping undeclared bits.
            pub const fn from_bits_truncate(bits: $ty) -> Self {
                Self { bits: bits & Self::ALL.bits }
            }

            /// Returns the raw bits.
            pub const fn bits(&self) -> $ty {
                self.bits
            }

            /// Returns `true` when no flag is set.
            pub const fn is_empty(&self) -> bool {
                self.bits == 0
            }

            /// Returns `true` if every flag of `other` is set in `self`.
            pub const fn contains(&self, other: Self) -> bool {
                (self.bits & other.bits) == other.bits
            }

            /// Returns `true` if `self` and `other` share at least one flag.
            pub const fn intersects(&self, other: Self) -> bool {
                (self.bits & other.bits) != 0
            }

            /// Returns the union of both sets.
            #[must_use]
            pub const fn union(self, other: Self) -> Self {
                Self { bits: self.bits | other.bits }
            }

            /// Returns the flags present in both sets.
            #[must_use]
            pub const fn intersection(self, other: Self) -> Self {
                Self { bits: self.bits & other.bits }
            }

            /// Returns `self` without the flags of `other`.
            #[must_use]
            pub const fn difference(self, other: Self) -> Self {
                Self { bits: self.bits & !other.bits }
            }

            /// Inserts the flags of `other`.
            pub fn insert(&mut self, other: Self) {
                self.bits |= other.bits;
            }

            /// Removes the flags of `other`.
            pub fn remove(&mut self, other: Self) {
                self.bits &= !other.bits;
            }
        }

        impl core::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, other: Self) -> Self {
                self.union(other)
            }
        }

        impl core::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, other: Self) {
                self.insert(other);
            }
        }

        impl core::ops::BitAnd for $name {
            type Output = Self;
            fn bitand(self, other: Self) -> Self {
                self.intersection(other)
            }
        }

        impl core::ops::Sub for $name {
            type Output = Self;
            fn sub(self, other: Self) -> Self {
                self.difference(other)
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                let mut remaining = self.bits;
                let mut separator = "";
                write!(f, "{}(", stringify!($name))?;
                $(
                    if $flag_value != 0 && remaining & $flag_value == $flag_value {
                        write!(f, "{}{}", separator, stringify!($flag_name))?;
                        remaining &= !$flag_value;
                        separator = " | ";
                    }
                )*
                if remaining != 0 {
                    write!(f, "{}{:#x}", separator, remaining)?;
                } else if self.bits == 0 {
                    write!(f, "EMPTY")?;
                }
                write!(f, ")")
            }
        }
    };
}

#[cfg(test)]
mod tests {
    crate::gpu_bitflags! {
        /// Flags used to exercise the macro.
        pub struct Probe: u32 {
            const A = 1 << 0;
            const B = 1 << 1;
            const C = 1 << 4;
        }
    }

    #[test]
    fn test_all_contains_every_declared_flag() {
        assert_eq!(Probe::ALL.bits(), 0b1_0011);
        assert!(Probe::ALL.contains(Probe::A | Probe::C));
    }

    #[test]
    fn test_from_bits_rejects_unknown_bits() {
        assert_eq!(Probe::from_bits(0b11), Some(Probe::A | Probe::B));
        assert_eq!(Probe::from_bits(1 << 8), None);
        assert_eq!(Probe::from_bits_truncate((1 << 8) | 1), Probe::A);
    }

    #[test]
    fn test_set_operations() {
        let mut flags = Probe::A | Probe::B;
        assert!(flags.intersects(Probe::B | Probe::C));
        assert!(!flags.contains(Probe::C));

        flags.remove(Probe::A);
        assert_eq!(flags, Probe::B);
        assert_eq!((Probe::ALL - Probe::B), Probe::A | Probe::C);
        assert!(Probe::EMPTY.is_empty());
    }

    #[test]
    fn test_debug_lists_flag_names() {
        assert_eq!(format!("{:?}", Probe::A | Probe::C), "Probe(A | C)");
        assert_eq!(format!("{:?}", Probe::EMPTY), "Probe(EMPTY)");
    }
}
