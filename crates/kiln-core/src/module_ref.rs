//! Deterministic identities for external module references.
//!
//! Instructions that call into another module carry a [`ModuleRef`] instead of
//! the module's name. The reference is a 64-bit hash computed from the module
//! path (and optionally a member name), so the backend never needs the module
//! to be loaded and downstream consumers can link by identity.
//!
//! # Examples
//!
//! ```
//! use kiln_core::ModuleRef;
//!
//! let a = ModuleRef::from_module("std/list");
//! let b = ModuleRef::from_module("std/list");
//! assert_eq!(a, b);
//!
//! let member = ModuleRef::from_member("std/list", "append");
//! assert_ne!(a, member);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

/// Domain-specific mixing constants.
///
/// Keep module hashes and member hashes apart even when the inputs collide.
pub mod hash_constants {
    /// Separator mixed between the module path and the member name.
    pub const SEP: u64 = 0x4bc94d6bd06053ad;

    /// Domain marker for whole-module references.
    pub const MODULE: u64 = 0x6c2a91e4d3b8f015;

    /// Domain marker for module member references.
    pub const MEMBER: u64 = 0x35d7c0f19a4e62b7;
}

/// A deterministic 64-bit identity for a module or one of its members.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ModuleRef(pub u64);

impl ModuleRef {
    /// Reference to a whole module by path.
    #[inline]
    pub fn from_module(path: &str) -> Self {
        ModuleRef(hash_constants::MODULE ^ xxh64(path.as_bytes(), 0))
    }

    /// Reference to a named member of a module.
    ///
    /// Order matters: `("a", "b")` and `("b", "a")` hash differently.
    #[inline]
    pub fn from_member(path: &str, member: &str) -> Self {
        let module = xxh64(path.as_bytes(), 0);
        let hash = module
            .wrapping_mul(hash_constants::SEP)
            .wrapping_add(hash_constants::MEMBER ^ xxh64(member.as_bytes(), 0));
        ModuleRef(hash)
    }
}

impl fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleRef({:#018x})", self.0)
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_hash_is_deterministic() {
        assert_eq!(
            ModuleRef::from_module("net/http"),
            ModuleRef::from_module("net/http")
        );
        assert_ne!(
            ModuleRef::from_module("net/http"),
            ModuleRef::from_module("net/tcp")
        );
    }

    #[test]
    fn member_order_matters() {
        assert_ne!(
            ModuleRef::from_member("a", "b"),
            ModuleRef::from_member("b", "a")
        );
    }

    #[test]
    fn member_differs_from_module() {
        assert_ne!(
            ModuleRef::from_module("list"),
            ModuleRef::from_member("list", "")
        );
    }

    #[test]
    fn display_is_hex() {
        let r = ModuleRef(0xff);
        assert_eq!(format!("{}", r), "0x00000000000000ff");
        assert_eq!(format!("{:?}", r), "ModuleRef(0x00000000000000ff)");
    }
}
