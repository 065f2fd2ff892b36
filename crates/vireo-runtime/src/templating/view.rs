#![forbid(unsafe_code)]

//! Views: a unit of bindings, child components and host nodes that moves
//! through the lifecycle together.
//!
//! # Phases
//!
//! | Phase    | Runs now                                      | Queued                     |
//! |----------|-----------------------------------------------|----------------------------|
//! | `bind`   | `binding` hook, bindings, children            | `bound`                    |
//! | `attach` | `attaching` hook, children                    | `mount`, `attached`        |
//! | `detach` | `detaching` hook, children                    | `unmount`, `detached`      |
//! | `unbind` | `unbinding` hook, children, bindings          | `unbound`                  |
//!
//! Every phase runs inside a lifecycle batch, so a view tree drains its
//! queued hooks once, when the outermost view ends its batch. Children are
//! enqueued before their parent for `mount` and after it for `unmount`.
//!
//! # Invariants
//!
//! 1. `IS_ATTACHED` implies `IS_BOUND`.
//! 2. `IS_MOUNTED` is set exactly while the node sequence is mounted.
//! 3. A cached view is neither bound nor attached.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use tracing::{debug, trace};
use vireo_core::{LifecycleFlags, QueueLinks, Result, Scope};

use crate::binding::Bindable;
use crate::config::DEFAULT_VIEW_CACHE_SIZE;
use crate::lifecycle::{Lifecycle, LifecycleTask, Participant};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ViewState: u16 {
        const IS_BOUND     = 1 << 0;
        const IS_ATTACHED  = 1 << 1;
        const IS_MOUNTED   = 1 << 2;
        const IS_CACHED    = 1 << 3;
        const IS_BINDING   = 1 << 4;
        const IS_ATTACHING = 1 << 5;
        const IS_DETACHING = 1 << 6;
        const IS_UNBINDING = 1 << 7;
    }
}

/// The host nodes of a view. The runtime never looks inside.
pub trait NodeSequence {
    /// Insert the nodes into the host.
    fn mount(&self, flags: LifecycleFlags) -> Result<()>;

    /// Remove the nodes from the host.
    fn unmount(&self, flags: LifecycleFlags) -> Result<()>;

    /// The view now sits at `index` among its siblings.
    fn set_position(&self, _index: usize) {}
}

/// A node sequence with no nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyNodes;

impl NodeSequence for EmptyNodes {
    fn mount(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn unmount(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }
}

/// User hooks around each phase. `binding`, `attaching`, `detaching` and
/// `unbinding` run synchronously; the others run when the lifecycle drains.
pub trait ViewHooks {
    fn binding(&self, _flags: LifecycleFlags, _scope: &Scope) -> Result<()> {
        Ok(())
    }

    fn bound(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn attaching(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn attached(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn detaching(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn detached(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn unbinding(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn unbound(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn caching(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }
}

/// A child of a view that follows it through every phase.
pub trait Component {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()>;

    fn attach(&self, flags: LifecycleFlags) -> Result<()>;

    fn detach(&self, flags: LifecycleFlags) -> Result<()>;

    fn unbind(&self, flags: LifecycleFlags) -> Result<()>;
}

/// What a template produces for one view.
pub struct ViewParts {
    pub bindings: Vec<Rc<dyn Bindable>>,
    pub children: Vec<Rc<dyn Component>>,
    pub nodes: Rc<dyn NodeSequence>,
    pub hooks: Option<Rc<dyn ViewHooks>>,
}

impl Default for ViewParts {
    fn default() -> Self {
        Self {
            bindings: Vec::new(),
            children: Vec::new(),
            nodes: Rc::new(EmptyNodes),
            hooks: None,
        }
    }
}

impl fmt::Debug for ViewParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewParts")
            .field("bindings", &self.bindings.len())
            .field("children", &self.children.len())
            .field("hooks", &self.hooks.is_some())
            .finish_non_exhaustive()
    }
}

pub struct View {
    me: Weak<View>,
    name: Rc<str>,
    lifecycle: Lifecycle,
    links: QueueLinks,
    state: Cell<ViewState>,
    bindings: Vec<Rc<dyn Bindable>>,
    children: Vec<Rc<dyn Component>>,
    nodes: Rc<dyn NodeSequence>,
    hooks: Option<Rc<dyn ViewHooks>>,
    scope: RefCell<Option<Scope>>,
    factory: Weak<FactoryInner>,
}

impl View {
    #[must_use]
    pub fn new(name: &str, lifecycle: Lifecycle, parts: ViewParts) -> Rc<Self> {
        Self::with_factory(name, lifecycle, parts, Weak::new())
    }

    fn with_factory(
        name: &str,
        lifecycle: Lifecycle,
        parts: ViewParts,
        factory: Weak<FactoryInner>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            name: Rc::from(name),
            lifecycle,
            links: QueueLinks::new(),
            state: Cell::new(ViewState::empty()),
            bindings: parts.bindings,
            children: parts.children,
            nodes: parts.nodes,
            hooks: parts.hooks,
            scope: RefCell::new(None),
            factory,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> ViewState {
        self.state.get()
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.state.get().contains(ViewState::IS_BOUND)
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.state.get().contains(ViewState::IS_ATTACHED)
    }

    #[must_use]
    pub fn scope(&self) -> Option<Scope> {
        self.scope.borrow().clone()
    }

    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    #[must_use]
    pub fn nodes(&self) -> &Rc<dyn NodeSequence> {
        &self.nodes
    }

    #[must_use]
    pub fn bindings(&self) -> &[Rc<dyn Bindable>] {
        &self.bindings
    }

    fn set(&self, bits: ViewState) {
        self.state.set(self.state.get() | bits);
    }

    fn clear(&self, bits: ViewState) {
        self.state.set(self.state.get() - bits);
    }

    fn participant(&self) -> Option<Rc<dyn Participant>> {
        self.me.upgrade().map(|me| me as Rc<dyn Participant>)
    }

    /// Bind the bindings and children to `scope`. Binding to another scope
    /// while bound unbinds first.
    pub fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<Rc<dyn LifecycleTask>> {
        if self.is_bound() {
            let same = self.scope.borrow().as_ref().is_some_and(|s| s.ptr_eq(scope));
            if same {
                return Ok(crate::lifecycle::done());
            }
            self.unbind(flags)?;
        }
        trace!(view = %self.name, "bind");
        self.clear(ViewState::IS_CACHED);
        self.set(ViewState::IS_BINDING);
        self.lifecycle.begin_bind();
        let bound = self.bind_parts(flags | LifecycleFlags::FROM_BIND, scope);
        let ended = self.lifecycle.end_bind(flags);
        self.clear(ViewState::IS_BINDING);
        bound?;
        ended
    }

    fn bind_parts(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if let Some(hooks) = &self.hooks {
            hooks.binding(flags, scope)?;
        }
        *self.scope.borrow_mut() = Some(scope.clone());
        for binding in &self.bindings {
            binding.bind(flags, scope)?;
        }
        for child in &self.children {
            child.bind(flags, scope)?;
        }
        if let Some(me) = self.participant() {
            self.lifecycle.enqueue_bound(me);
        }
        self.set(ViewState::IS_BOUND);
        Ok(())
    }

    /// Attach the children, then queue this view's `mount` and `attached`.
    pub fn attach(&self, flags: LifecycleFlags) -> Result<Rc<dyn LifecycleTask>> {
        if self.is_attached() {
            return Ok(crate::lifecycle::done());
        }
        trace!(view = %self.name, "attach");
        self.set(ViewState::IS_ATTACHING);
        self.lifecycle.begin_attach();
        let attached = self.attach_parts(flags | LifecycleFlags::FROM_ATTACH);
        let ended = self.lifecycle.end_attach(flags);
        self.clear(ViewState::IS_ATTACHING);
        attached?;
        ended
    }

    fn attach_parts(&self, flags: LifecycleFlags) -> Result<()> {
        if let Some(hooks) = &self.hooks {
            hooks.attaching(flags)?;
        }
        for child in &self.children {
            child.attach(flags)?;
        }
        if let Some(me) = self.participant() {
            self.lifecycle.enqueue_mount(Rc::clone(&me));
            self.lifecycle.enqueue_attached(me);
        }
        self.set(ViewState::IS_ATTACHED);
        Ok(())
    }

    /// Queue this view's `unmount` and `detached`, then detach the children.
    pub fn detach(&self, flags: LifecycleFlags) -> Result<Rc<dyn LifecycleTask>> {
        if !self.is_attached() {
            return Ok(crate::lifecycle::done());
        }
        trace!(view = %self.name, "detach");
        self.set(ViewState::IS_DETACHING);
        self.lifecycle.begin_detach();
        let detached = self.detach_parts(flags | LifecycleFlags::FROM_DETACH);
        let ended = self.lifecycle.end_detach(flags);
        self.clear(ViewState::IS_DETACHING);
        detached?;
        ended
    }

    fn detach_parts(&self, flags: LifecycleFlags) -> Result<()> {
        if let Some(hooks) = &self.hooks {
            hooks.detaching(flags)?;
        }
        if let Some(me) = self.participant() {
            self.lifecycle.enqueue_unmount(Rc::clone(&me));
            self.lifecycle.enqueue_detached(me);
        }
        for child in &self.children {
            child.detach(flags)?;
        }
        self.clear(ViewState::IS_ATTACHED);
        Ok(())
    }

    /// Unbind the children and bindings in reverse order.
    pub fn unbind(&self, flags: LifecycleFlags) -> Result<Rc<dyn LifecycleTask>> {
        if !self.is_bound() {
            return Ok(crate::lifecycle::done());
        }
        trace!(view = %self.name, "unbind");
        self.set(ViewState::IS_UNBINDING);
        self.lifecycle.begin_unbind();
        let unbound = self.unbind_parts(flags | LifecycleFlags::FROM_UNBIND);
        let ended = self.lifecycle.end_unbind(flags);
        self.clear(ViewState::IS_UNBINDING);
        unbound?;
        ended
    }

    fn unbind_parts(&self, flags: LifecycleFlags) -> Result<()> {
        if let Some(hooks) = &self.hooks {
            hooks.unbinding(flags)?;
        }
        for child in self.children.iter().rev() {
            child.unbind(flags)?;
        }
        for binding in self.bindings.iter().rev() {
            binding.unbind(flags)?;
        }
        if let Some(me) = self.participant() {
            self.lifecycle.enqueue_unbound(me);
        }
        self.scope.borrow_mut().take();
        self.clear(ViewState::IS_BOUND);
        Ok(())
    }

    /// Detach, then unbind right after the detach batch drains.
    pub fn remove(&self, flags: LifecycleFlags) -> Result<Rc<dyn LifecycleTask>> {
        self.lifecycle.begin_detach();
        let detached = self.detach(flags).map(drop);
        if let Some(me) = self.participant() {
            self.lifecycle.enqueue_unbind_after_detach(me);
        }
        let ended = self.lifecycle.end_detach(flags);
        detached?;
        ended
    }

    /// Return the view to its factory's cache. Returns whether it was
    /// cached; views that are still bound or attached never are.
    pub fn cache(&self, flags: LifecycleFlags) -> Result<bool> {
        let (Some(factory), Some(me)) = (self.factory.upgrade(), self.me.upgrade()) else {
            return Ok(false);
        };
        if !(ViewFactory { inner: factory }).try_return_to_cache(&me) {
            return Ok(false);
        }
        if let Some(hooks) = &self.hooks {
            hooks.caching(flags)?;
        }
        Ok(true)
    }
}

impl Participant for View {
    fn queue_links(&self) -> &QueueLinks {
        &self.links
    }

    fn bound(&self, flags: LifecycleFlags) -> Result<()> {
        match &self.hooks {
            Some(hooks) => hooks.bound(flags),
            None => Ok(()),
        }
    }

    fn mount(&self, flags: LifecycleFlags) -> Result<()> {
        if self.state.get().contains(ViewState::IS_MOUNTED) {
            return Ok(());
        }
        self.nodes.mount(flags)?;
        self.set(ViewState::IS_MOUNTED);
        Ok(())
    }

    fn attached(&self, flags: LifecycleFlags) -> Result<()> {
        match &self.hooks {
            Some(hooks) => hooks.attached(flags),
            None => Ok(()),
        }
    }

    fn unmount(&self, flags: LifecycleFlags) -> Result<()> {
        if !self.state.get().contains(ViewState::IS_MOUNTED) {
            return Ok(());
        }
        self.nodes.unmount(flags)?;
        self.clear(ViewState::IS_MOUNTED);
        Ok(())
    }

    fn detached(&self, flags: LifecycleFlags) -> Result<()> {
        match &self.hooks {
            Some(hooks) => hooks.detached(flags),
            None => Ok(()),
        }
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        View::unbind(self, flags).map(drop)
    }

    fn unbound(&self, flags: LifecycleFlags) -> Result<()> {
        match &self.hooks {
            Some(hooks) => hooks.unbound(flags),
            None => Ok(()),
        }
    }
}

impl Component for View {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        View::bind(self, flags, scope).map(drop)
    }

    fn attach(&self, flags: LifecycleFlags) -> Result<()> {
        View::attach(self, flags).map(drop)
    }

    fn detach(&self, flags: LifecycleFlags) -> Result<()> {
        View::detach(self, flags).map(drop)
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        View::unbind(self, flags).map(drop)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("name", &self.name)
            .field("state", &self.state.get())
            .field("bindings", &self.bindings.len())
            .field("children", &self.children.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Builds the parts of a fresh view.
pub type ViewTemplate = dyn Fn(&Lifecycle) -> Result<ViewParts>;

struct FactoryInner {
    name: Rc<str>,
    lifecycle: Lifecycle,
    template: Box<ViewTemplate>,
    cache: RefCell<Vec<Rc<View>>>,
    cache_size: Cell<usize>,
    created: Cell<u64>,
}

/// Creates views from a template and keeps a bounded pool of unused ones.
/// Cloning yields another handle to the same factory.
#[derive(Clone)]
pub struct ViewFactory {
    inner: Rc<FactoryInner>,
}

impl ViewFactory {
    pub fn new(
        name: &str,
        lifecycle: Lifecycle,
        template: impl Fn(&Lifecycle) -> Result<ViewParts> + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(FactoryInner {
                name: Rc::from(name),
                lifecycle,
                template: Box::new(template),
                cache: RefCell::new(Vec::new()),
                cache_size: Cell::new(DEFAULT_VIEW_CACHE_SIZE),
                created: Cell::new(0),
            }),
        }
    }

    #[must_use]
    pub fn with_cache_size(self, size: usize) -> Self {
        self.set_cache_size(size);
        self
    }

    /// Shrinking the cache drops the surplus views.
    pub fn set_cache_size(&self, size: usize) {
        self.inner.cache_size.set(size);
        self.inner.cache.borrow_mut().truncate(size);
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.inner.cache.borrow().len()
    }

    /// Views built from the template so far (cache hits excluded).
    #[must_use]
    pub fn created_count(&self) -> u64 {
        self.inner.created.get()
    }

    /// A cached view if one is available, otherwise a new one.
    pub fn create(&self) -> Result<Rc<View>> {
        let cached = self.inner.cache.borrow_mut().pop();
        if let Some(view) = cached {
            trace!(factory = %self.inner.name, "view from cache");
            view.clear(ViewState::IS_CACHED);
            return Ok(view);
        }
        let parts = (self.inner.template)(&self.inner.lifecycle)?;
        self.inner.created.set(self.inner.created.get() + 1);
        Ok(View::with_factory(
            &self.inner.name,
            self.inner.lifecycle.clone(),
            parts,
            Rc::downgrade(&self.inner),
        ))
    }

    /// Pool `view` if it came from this factory, is idle and the pool has
    /// room.
    pub fn try_return_to_cache(&self, view: &Rc<View>) -> bool {
        let own = std::ptr::eq(view.factory.as_ptr(), Rc::as_ptr(&self.inner));
        let idle = !view.state().intersects(
            ViewState::IS_BOUND | ViewState::IS_ATTACHED | ViewState::IS_CACHED,
        );
        let mut cache = self.inner.cache.borrow_mut();
        if !own || !idle || cache.len() >= self.inner.cache_size.get() {
            return false;
        }
        debug!(factory = %self.inner.name, cached = cache.len() + 1, "view cached");
        view.set(ViewState::IS_CACHED);
        cache.push(Rc::clone(view));
        true
    }
}

impl fmt::Debug for ViewFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewFactory")
            .field("name", &self.inner.name)
            .field("cached", &self.cached_count())
            .field("cache_size", &self.inner.cache_size.get())
            .field("created", &self.inner.created.get())
            .finish()
    }
}
