#![forbid(unsafe_code)]

//! Scopes: where names in an expression are looked up.
//!
//! A [`Scope`] pairs a binding context (usually a view-model object) with a
//! chain of [`OverrideContext`]s. Each override context carries a locals bag
//! (`$index`, loop variables, `$event`, ...) and its own binding context, and
//! links to the next-outer override context.
//!
//! Name resolution walks the chain from the innermost override context
//! outward; see [`Scope::resolve`].

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use crate::flags::LifecycleFlags;
use crate::value::{ObjectRef, Value};

/// One link of the override chain.
pub struct OverrideContext {
    locals: ObjectRef,
    binding_context: Value,
    parent: Option<Rc<OverrideContext>>,
}

impl OverrideContext {
    #[must_use]
    pub fn new(binding_context: Value, parent: Option<Rc<OverrideContext>>) -> Rc<Self> {
        Self::with_locals(binding_context, ObjectRef::new(), parent)
    }

    #[must_use]
    pub fn with_locals(
        binding_context: Value,
        locals: ObjectRef,
        parent: Option<Rc<OverrideContext>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            locals,
            binding_context,
            parent,
        })
    }

    /// The locals bag. It is an ordinary object, so locals are observable.
    #[must_use]
    pub fn locals(&self) -> &ObjectRef {
        &self.locals
    }

    #[must_use]
    pub fn binding_context(&self) -> &Value {
        &self.binding_context
    }

    #[must_use]
    pub fn parent(&self) -> Option<&Rc<OverrideContext>> {
        self.parent.as_ref()
    }

    /// The context `ancestor` links out, if the chain is long enough.
    #[must_use]
    pub fn ancestor(self: &Rc<Self>, ancestor: u32) -> Option<&Rc<OverrideContext>> {
        let mut current = self;
        for _ in 0..ancestor {
            current = current.parent.as_ref()?;
        }
        Some(current)
    }

    /// The locals bag if it owns `name`, else the binding context if that
    /// owns it.
    fn owner_of(&self, name: &str) -> Option<Value> {
        if self.locals.has(name) {
            Some(Value::Object(self.locals.clone()))
        } else if self.binding_context.has_property(name) {
            Some(self.binding_context.clone())
        } else {
            None
        }
    }
}

impl fmt::Debug for OverrideContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideContext")
            .field("locals", &self.locals)
            .field("binding_context", &self.binding_context)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

struct ScopeInner {
    binding_context: Value,
    override_context: Rc<OverrideContext>,
    parent_scope: OnceCell<Scope>,
}

/// A binding context plus its override chain. Cloning is cheap.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    /// A root scope over `binding_context` with a fresh override context.
    #[must_use]
    pub fn new(binding_context: Value) -> Self {
        let override_context = OverrideContext::new(binding_context.clone(), None);
        Self::with_override_context(binding_context, override_context)
    }

    #[must_use]
    pub fn with_override_context(
        binding_context: Value,
        override_context: Rc<OverrideContext>,
    ) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                binding_context,
                override_context,
                parent_scope: OnceCell::new(),
            }),
        }
    }

    /// A child scope whose override chain continues into `parent`'s.
    #[must_use]
    pub fn from_parent(parent: &Scope, binding_context: Value) -> Self {
        let override_context = OverrideContext::new(
            binding_context.clone(),
            Some(Rc::clone(&parent.inner.override_context)),
        );
        Self::with_override_context(binding_context, override_context)
    }

    /// A child scope with a pre-filled locals bag, chained to `parent`.
    #[must_use]
    pub fn with_locals(parent: &Scope, binding_context: Value, locals: ObjectRef) -> Self {
        let override_context = OverrideContext::with_locals(
            binding_context.clone(),
            locals,
            Some(Rc::clone(&parent.inner.override_context)),
        );
        Self::with_override_context(binding_context, override_context)
    }

    #[must_use]
    pub fn binding_context(&self) -> &Value {
        &self.inner.binding_context
    }

    #[must_use]
    pub fn override_context(&self) -> &Rc<OverrideContext> {
        &self.inner.override_context
    }

    /// Locals bag of the innermost override context.
    #[must_use]
    pub fn locals(&self) -> &ObjectRef {
        &self.inner.override_context.locals
    }

    /// Link the scope of the enclosing structural boundary. The link can be
    /// set once; returns `false` if it was already set.
    pub fn set_parent_scope(&self, parent: Scope) -> bool {
        self.inner.parent_scope.set(parent).is_ok()
    }

    #[must_use]
    pub fn parent_scope(&self) -> Option<&Scope> {
        self.inner.parent_scope.get()
    }

    /// Find the context object owning `name`.
    ///
    /// - `ancestor > 0`: exactly that many override links out; a shorter
    ///   chain yields `Undefined`. The result is that context's locals bag if
    ///   it owns `name`, else its binding context.
    /// - otherwise the innermost context whose locals or binding context owns
    ///   `name`;
    /// - then, with `ALLOW_PARENT_SCOPE_TRAVERSAL`, the same search in the
    ///   parent scope (without further traversal);
    /// - finally this scope's binding context, or its locals bag when the
    ///   binding context is not an object.
    #[must_use]
    pub fn resolve(&self, name: &str, ancestor: u32, flags: LifecycleFlags) -> Value {
        if ancestor > 0 {
            return match self.inner.override_context.ancestor(ancestor) {
                Some(context) => {
                    if context.locals.has(name) {
                        Value::Object(context.locals.clone())
                    } else {
                        context.binding_context.clone()
                    }
                }
                None => Value::Undefined,
            };
        }
        if let Some(found) = self.find(name) {
            return found;
        }
        if flags.contains(LifecycleFlags::ALLOW_PARENT_SCOPE_TRAVERSAL) {
            if let Some(found) = self.parent_scope().and_then(|parent| parent.find(name)) {
                return found;
            }
        }
        self.default_context()
    }

    fn find(&self, name: &str) -> Option<Value> {
        let mut current = Some(&self.inner.override_context);
        while let Some(context) = current {
            if let Some(owner) = context.owner_of(name) {
                return Some(owner);
            }
            current = context.parent.as_ref();
        }
        None
    }

    fn default_context(&self) -> Value {
        match &self.inner.binding_context {
            context @ Value::Object(_) => context.clone(),
            _ => Value::Object(self.inner.override_context.locals.clone()),
        }
    }

    /// `$this` (`ancestor == 0`) or `$parent...`: the binding context
    /// `ancestor` override links out, or `Undefined`.
    #[must_use]
    pub fn access_this(&self, ancestor: u32) -> Value {
        self.inner
            .override_context
            .ancestor(ancestor)
            .map_or(Value::Undefined, |context| context.binding_context.clone())
    }

    /// Whether both handles refer to the same scope.
    #[must_use]
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("binding_context", &self.inner.binding_context)
            .field("override_context", &self.inner.override_context)
            .field("has_parent_scope", &self.inner.parent_scope.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(pairs: &[(&str, i32)]) -> Value {
        Value::Object(ObjectRef::from_pairs(
            pairs.iter().map(|(k, v)| (*k, Value::from(*v))),
        ))
    }

    #[test]
    fn innermost_owner_wins() {
        let outer = Scope::new(object(&[("a", 1), ("b", 1)]));
        let inner = Scope::from_parent(&outer, object(&[("a", 2)]));
        inner.locals().insert("$index", 0.into());

        let a_owner = inner.resolve("a", 0, LifecycleFlags::empty());
        assert!(a_owner.strict_equals(inner.binding_context()));
        let b_owner = inner.resolve("b", 0, LifecycleFlags::empty());
        assert!(b_owner.strict_equals(outer.binding_context()));
        let index_owner = inner.resolve("$index", 0, LifecycleFlags::empty());
        assert!(index_owner.strict_equals(&Value::Object(inner.locals().clone())));
    }

    #[test]
    fn unknown_names_resolve_to_own_binding_context() {
        let outer = Scope::new(object(&[("a", 1)]));
        let inner = Scope::from_parent(&outer, object(&[]));
        let owner = inner.resolve("missing", 0, LifecycleFlags::empty());
        assert!(owner.strict_equals(inner.binding_context()));

        let primitive = Scope::new(Value::from(3));
        let owner = primitive.resolve("x", 0, LifecycleFlags::empty());
        assert!(owner.strict_equals(&Value::Object(primitive.locals().clone())));
    }

    #[test]
    fn ancestor_walks_exact_links() {
        let root = Scope::new(object(&[("name", 1)]));
        let middle = Scope::from_parent(&root, object(&[("name", 2)]));
        let leaf = Scope::from_parent(&middle, object(&[("name", 3)]));

        let flags = LifecycleFlags::empty();
        assert!(leaf.resolve("name", 1, flags).strict_equals(middle.binding_context()));
        assert!(leaf.resolve("name", 2, flags).strict_equals(root.binding_context()));
        assert!(leaf.resolve("name", 3, flags).is_undefined());
        assert!(leaf.access_this(0).strict_equals(leaf.binding_context()));
        assert!(leaf.access_this(2).strict_equals(root.binding_context()));
        assert!(leaf.access_this(5).is_undefined());
    }

    #[test]
    fn parent_scope_traversal_is_opt_in() {
        let host = Scope::new(object(&[("title", 1)]));
        let item = Scope::new(object(&[("label", 1)]));
        assert!(item.set_parent_scope(host.clone()));
        assert!(!item.set_parent_scope(host.clone()));

        let without = item.resolve("title", 0, LifecycleFlags::empty());
        assert!(without.strict_equals(item.binding_context()));
        let with = item.resolve("title", 0, LifecycleFlags::ALLOW_PARENT_SCOPE_TRAVERSAL);
        assert!(with.strict_equals(host.binding_context()));
    }
}
