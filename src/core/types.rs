/*!
 * Core Types
 * Common types used across the optimizer
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process ID type
pub type Pid = u32;

/// Thread ID type
pub type Tid = u32;

/// Session identifier as reported by the OS
pub type SessionId = u32;

/// Process names are short; keep them inline
pub type ProcessName = smartstring::alias::String;

/// Foreground or background role of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Foreground,
    Background,
}

impl Role {
    #[inline]
    pub fn from_foreground(is_foreground: bool) -> Self {
        if is_foreground {
            Role::Foreground
        } else {
            Role::Background
        }
    }

    #[inline]
    pub fn is_foreground(self) -> bool {
        matches!(self, Role::Foreground)
    }
}

/// Base scheduling priority class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    Idle,
    BelowNormal,
    Normal,
    AboveNormal,
    High,
}

impl PriorityClass {
    /// Unix nice value used by the Linux backend
    pub fn nice(self) -> i32 {
        match self {
            PriorityClass::Idle => 19,
            PriorityClass::BelowNormal => 10,
            PriorityClass::Normal => 0,
            PriorityClass::AboveNormal => -5,
            PriorityClass::High => -10,
        }
    }

    /// Inverse of [`PriorityClass::nice`], rounding to the closest class
    pub fn from_nice(nice: i32) -> Self {
        match nice {
            n if n >= 15 => PriorityClass::Idle,
            n if n >= 5 => PriorityClass::BelowNormal,
            n if n > -3 => PriorityClass::Normal,
            n if n > -8 => PriorityClass::AboveNormal,
            _ => PriorityClass::High,
        }
    }
}

/// I/O priority level (process-wide or per thread)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoPriority {
    VeryLow,
    Low,
    Normal,
    High,
}

/// Memory page priority, lowest pages are reclaimed first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagePriority {
    Lowest,
    Low,
    Medium,
    BelowNormal,
    Normal,
}

/// Set of logical CPU indices, kept sorted and deduplicated
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoreSet(Vec<usize>);

impl CoreSet {
    pub fn new<I: IntoIterator<Item = usize>>(cores: I) -> Self {
        let mut cores: Vec<usize> = cores.into_iter().collect();
        cores.sort_unstable();
        cores.dedup();
        Self(cores)
    }

    /// Every core in `0..count`
    pub fn all(count: usize) -> Self {
        Self((0..count.max(1)).collect())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn contains(&self, core: usize) -> bool {
        self.0.binary_search(&core).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn intersection(&self, other: &CoreSet) -> CoreSet {
        CoreSet(self.iter().filter(|c| other.contains(*c)).collect())
    }
}

impl fmt::Display for CoreSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", parts.join(","))
    }
}

impl FromIterator<usize> for CoreSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        CoreSet::new(iter)
    }
}

/// Access rights requested when opening a process handle
///
/// Handles are cached per (pid, mask); two masks never share a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccessMask(u32);

impl AccessMask {
    pub const QUERY: AccessMask = AccessMask(0x0001);
    pub const SET_INFORMATION: AccessMask = AccessMask(0x0002);
    pub const SUSPEND_RESUME: AccessMask = AccessMask(0x0004);
    pub const SET_QUOTA: AccessMask = AccessMask(0x0008);
    pub const VM_OPERATION: AccessMask = AccessMask(0x0010);

    /// Rights needed to read and change scheduling knobs
    pub const TUNE: AccessMask = AccessMask(0x0001 | 0x0002);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        AccessMask(bits)
    }

    #[inline]
    pub const fn union(self, other: AccessMask) -> Self {
        AccessMask(self.0 | other.0)
    }

    #[inline]
    pub const fn contains(self, other: AccessMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for AccessMask {
    type Output = AccessMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_set_sorted_and_deduplicated() {
        let set = CoreSet::new([3, 1, 3, 0]);
        assert_eq!(set.as_slice(), &[0, 1, 3]);
        assert!(set.contains(3));
        assert!(!set.contains(2));
        assert_eq!(set.to_string(), "[0,1,3]");
    }

    #[test]
    fn test_core_set_intersection() {
        let a = CoreSet::all(8);
        let b = CoreSet::new([6, 7, 9]);
        assert_eq!(a.intersection(&b), CoreSet::new([6, 7]));
    }

    #[test]
    fn test_priority_nice_round_trip() {
        for class in [
            PriorityClass::Idle,
            PriorityClass::BelowNormal,
            PriorityClass::Normal,
            PriorityClass::AboveNormal,
            PriorityClass::High,
        ] {
            assert_eq!(PriorityClass::from_nice(class.nice()), class);
        }
    }

    #[test]
    fn test_access_mask_union() {
        let mask = AccessMask::QUERY | AccessMask::SUSPEND_RESUME;
        assert!(mask.contains(AccessMask::QUERY));
        assert!(!mask.contains(AccessMask::SET_QUOTA));
        assert_ne!(mask, AccessMask::QUERY);
    }
}
