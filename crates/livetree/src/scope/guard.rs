//! RAII guard for automatic section cleanup

use super::Scope;
use crate::error::TreeError;

/// RAII guard that closes a section when dropped.
///
/// # Example
///
/// ```
/// use livetree::Scope;
///
/// let mut scope = Scope::default();
/// {
///     let mut section = scope.section("server").unwrap();
///     section.define("port", "8080").unwrap();
///     assert_eq!(section.depth(), 2);
/// }
/// // guard dropped, section closed
/// assert_eq!(scope.depth(), 1);
/// assert_eq!(scope.root().get_child("server.port").unwrap().as_deref(), Some("8080"));
/// ```
pub struct ScopeGuard<'a> {
    scope: &'a mut Scope,
}

impl Scope {
    /// Open a section now and close it when the guard drops.
    pub fn section(&mut self, name: &str) -> Result<ScopeGuard<'_>, TreeError> {
        self.push_section(name)?;
        Ok(ScopeGuard { scope: self })
    }
}

impl<'a> Drop for ScopeGuard<'a> {
    fn drop(&mut self) {
        self.scope.pop_section();
    }
}

impl<'a> std::ops::Deref for ScopeGuard<'a> {
    type Target = Scope;

    fn deref(&self) -> &Self::Target {
        self.scope
    }
}

impl<'a> std::ops::DerefMut for ScopeGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_pops_on_drop() {
        let mut scope = Scope::default();
        {
            let guard = scope.section("a").unwrap();
            assert_eq!(guard.depth(), 2);
        }
        assert_eq!(scope.depth(), 1);
    }

    #[test]
    fn test_nested_guards() {
        let mut scope = Scope::default();
        {
            let mut outer = scope.section("outer").unwrap();
            outer.define("x", "1").unwrap();
            {
                let mut inner = outer.section("inner").unwrap();
                inner.define("y", "${^x}").unwrap();
                assert_eq!(inner.dotted_path("y"), "outer.inner.y");
            }
            assert_eq!(outer.depth(), 2);
        }
        let root = scope.root();
        assert_eq!(root.get_child("outer.inner.y").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_failed_section_pushes_nothing() {
        let mut scope = Scope::default();
        assert!(scope.section("bad name").is_err());
        assert_eq!(scope.depth(), 1);
    }
}
