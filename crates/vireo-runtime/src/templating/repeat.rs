#![forbid(unsafe_code)]

//! `repeat.for="item of items"`: one view per item.
//!
//! Each view gets its own scope. The binding context holds the names the
//! declaration introduces; the locals hold the contextual properties
//! (`$index`, `$first`, `$last`, `$even`, `$odd`, `$length`). Names not
//! found there resolve through the enclosing scope.
//!
//! Array mutations arrive as one index map per flush. Views of surviving
//! items are moved rather than rebuilt, views for inserted items are
//! created, and views of deleted items are removed and returned to the
//! factory. Replacing the collection, or mutating a map or set, re-renders
//! every view.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};
use vireo_core::observation::{ArrayObserver, MapObserver, SetObserver};
use vireo_core::{
    BindingMode, Connectable, Error, FlushQueue, Flushable, IndexMap, LifecycleFlags, ObjectRef,
    ObserverLocator, ObserverSlots, ParseError, ParseErrorKind, QueueLinks, Result, Scope,
    Subscriber, Value,
};
use vireo_expr::{AppliedBehaviors, BindingHost, Expr, ServiceLocator, for_of};

use super::view::{Component, View, ViewFactory};
use crate::binding::{BindingEnv, subscriber_handle};

enum CollectionSubscription {
    Array(Rc<ArrayObserver>),
    Map(Rc<MapObserver>),
    Set(Rc<SetObserver>),
}

impl CollectionSubscription {
    fn cancel(&self, subscriber: &Rc<dyn Subscriber>) {
        match self {
            Self::Array(observer) => observer.unsubscribe_batched(subscriber),
            Self::Map(observer) => observer.unsubscribe_batched(subscriber),
            Self::Set(observer) => observer.unsubscribe_batched(subscriber),
        }
    }
}

pub struct Repeat {
    me: Weak<Repeat>,
    env: BindingEnv,
    statement: Rc<Expr>,
    factory: ViewFactory,
    mode: Cell<BindingMode>,
    behaviors: AppliedBehaviors,
    slots: ObserverSlots,
    links: QueueLinks,
    scope: RefCell<Option<Scope>>,
    items: RefCell<Value>,
    subscription: RefCell<Option<CollectionSubscription>>,
    views: RefCell<Vec<Rc<View>>>,
    attached: Cell<bool>,
}

impl Repeat {
    /// `statement` must be a `declaration of iterable` expression.
    pub fn new(env: BindingEnv, statement: Rc<Expr>, factory: ViewFactory) -> Result<Rc<Self>> {
        if statement.as_for_of().is_none() {
            return Err(Error::from(ParseError::new(
                ParseErrorKind::InvalidForDeclaration,
                0,
                statement.to_string(),
            )));
        }
        Ok(Rc::new_cyclic(|me| Self {
            me: me.clone(),
            env,
            statement,
            factory,
            mode: Cell::new(BindingMode::ToView),
            behaviors: AppliedBehaviors::new(),
            slots: ObserverSlots::new(),
            links: QueueLinks::new(),
            scope: RefCell::new(None),
            items: RefCell::new(Value::Undefined),
            subscription: RefCell::new(None),
            views: RefCell::new(Vec::new()),
            attached: Cell::new(false),
        }))
    }

    /// The rendered views, in item order.
    #[must_use]
    pub fn views(&self) -> Vec<Rc<View>> {
        self.views.borrow().clone()
    }

    #[must_use]
    pub fn items(&self) -> Value {
        self.items.borrow().clone()
    }

    #[must_use]
    pub fn factory(&self) -> &ViewFactory {
        &self.factory
    }

    fn declaration(&self) -> Option<&Expr> {
        self.statement.as_for_of().map(|(declaration, _)| declaration)
    }

    fn item_scope(&self, flags: LifecycleFlags, parent: &Scope, item: Value) -> Result<Scope> {
        let context = ObjectRef::new();
        if let Some(declaration) = self.declaration() {
            declaration.bind_declaration(flags, &context, item)?;
        }
        let scope = Scope::with_locals(parent, Value::Object(context), ObjectRef::new());
        scope.set_parent_scope(parent.clone());
        Ok(scope)
    }

    /// Re-evaluate the iterable, follow the new collection and re-render.
    fn refresh(&self, flags: LifecycleFlags) -> Result<()> {
        let Some(scope) = self.scope.borrow().clone() else {
            return Ok(());
        };
        let flags = flags | self.env.flags();
        let items = self.statement.evaluate(flags, &scope, self.env.resources())?;
        self.follow(&items);
        *self.items.borrow_mut() = items;
        if self.mode.get().observes_source() {
            self.slots.begin_pass();
            let connected = self.statement.connect(flags, &scope, self);
            self.unobserve(false);
            connected?;
        }
        self.render_all(flags, &scope)
    }

    fn follow(&self, items: &Value) {
        let subscriber = self.as_subscriber();
        if let Some(previous) = self.subscription.borrow_mut().take() {
            previous.cancel(&subscriber);
        }
        let locator = self.env.observer_locator();
        let next = match items {
            Value::Array(array) => {
                let observer = locator.array_observer(array);
                observer.subscribe_batched(subscriber);
                Some(CollectionSubscription::Array(observer))
            }
            Value::Map(map) => {
                let observer = locator.map_observer(map);
                observer.subscribe_batched(subscriber);
                Some(CollectionSubscription::Map(observer))
            }
            Value::Set(set) => {
                let observer = locator.set_observer(set);
                observer.subscribe_batched(subscriber);
                Some(CollectionSubscription::Set(observer))
            }
            _ => None,
        };
        *self.subscription.borrow_mut() = next;
    }

    /// Render one view per item, rebinding existing views in place.
    fn render_all(&self, flags: LifecycleFlags, parent: &Scope) -> Result<()> {
        let items = self.items();
        let mut values = Vec::with_capacity(for_of::count(&items));
        for_of::iterate(&items, |_, item| {
            values.push(item);
            Ok(())
        })?;
        trace!(count = values.len(), "repeat render");

        let lifecycle = self.env.lifecycle().cloned();
        if let Some(lifecycle) = &lifecycle {
            lifecycle.begin_attach();
        }
        let rendered = self.render_values(flags, parent, values);
        let ended = match &lifecycle {
            Some(lifecycle) => lifecycle.end_attach(flags).map(drop),
            None => Ok(()),
        };
        rendered?;
        ended
    }

    fn render_values(
        &self,
        flags: LifecycleFlags,
        parent: &Scope,
        values: Vec<Value>,
    ) -> Result<()> {
        let mut views = std::mem::take(&mut *self.views.borrow_mut());
        if views.len() > values.len() {
            for view in views.split_off(values.len()) {
                release(&view, flags)?;
            }
        }
        let len = values.len();
        for (index, item) in values.into_iter().enumerate() {
            let view = match views.get(index) {
                Some(view) => Rc::clone(view),
                None => {
                    let view = self.factory.create()?;
                    views.push(Rc::clone(&view));
                    view
                }
            };
            let scope = self.item_scope(flags, parent, item)?;
            write_contextual(scope.locals(), index, len, flags)?;
            self.show(&view, flags, &scope)?;
            view.nodes().set_position(index);
        }
        *self.views.borrow_mut() = views;
        Ok(())
    }

    fn show(&self, view: &Rc<View>, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        let flags = flags | LifecycleFlags::ALLOW_PARENT_SCOPE_TRAVERSAL;
        view.bind(flags, scope)?;
        if self.attached.get() {
            view.attach(flags)?;
        }
        Ok(())
    }

    /// Apply an array index map to the rendered views.
    fn apply(&self, index_map: &IndexMap, flags: LifecycleFlags) -> Result<()> {
        let Some(parent) = self.scope.borrow().clone() else {
            return Ok(());
        };
        let Value::Array(array) = self.items() else {
            return self.render_all(flags, &parent);
        };
        debug!(
            len = index_map.len(),
            deleted = index_map.deleted.len(),
            "repeat applying index map"
        );
        let mut previous: Vec<Option<Rc<View>>> = std::mem::take(&mut *self.views.borrow_mut())
            .into_iter()
            .map(Some)
            .collect();

        for deleted in &index_map.deleted {
            if let Some(view) = previous.get_mut(deleted.index).and_then(Option::take) {
                release(&view, flags)?;
            }
        }

        let lifecycle = self.env.lifecycle().cloned();
        if let Some(lifecycle) = &lifecycle {
            lifecycle.begin_attach();
        }
        let placed = self.place(index_map, &array, &mut previous, flags, &parent);
        let ended = match &lifecycle {
            Some(lifecycle) => lifecycle.end_attach(flags).map(drop),
            None => Ok(()),
        };
        placed?;
        ended?;

        for view in previous.into_iter().flatten() {
            release(&view, flags)?;
        }
        Ok(())
    }

    fn place(
        &self,
        index_map: &IndexMap,
        array: &vireo_core::ArrayRef,
        previous: &mut [Option<Rc<View>>],
        flags: LifecycleFlags,
        parent: &Scope,
    ) -> Result<()> {
        let len = index_map.len();
        let mut views = Vec::with_capacity(len);
        for (index, &origin) in index_map.indices.iter().enumerate() {
            let reused = usize::try_from(origin)
                .ok()
                .and_then(|origin| previous.get_mut(origin))
                .and_then(Option::take);
            let view = match reused {
                Some(view) => {
                    if let Some(scope) = view.scope() {
                        write_contextual(scope.locals(), index, len, flags)?;
                    }
                    view
                }
                None => {
                    let view = self.factory.create()?;
                    let scope = self.item_scope(flags, parent, array.get(index))?;
                    write_contextual(scope.locals(), index, len, flags)?;
                    self.show(&view, flags, &scope)?;
                    view
                }
            };
            view.nodes().set_position(index);
            views.push(view);
        }
        *self.views.borrow_mut() = views;
        Ok(())
    }

    fn release_all(&self, flags: LifecycleFlags) -> Result<()> {
        let views = std::mem::take(&mut *self.views.borrow_mut());
        let mut first_error = None;
        for view in views.iter().rev() {
            if let Err(err) = release(view, flags) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Detach, unbind and cache a view that is no longer rendered.
fn release(view: &Rc<View>, flags: LifecycleFlags) -> Result<()> {
    view.remove(flags)?;
    view.cache(flags).map(drop)
}

fn write_contextual(
    locals: &ObjectRef,
    index: usize,
    len: usize,
    flags: LifecycleFlags,
) -> Result<()> {
    let flags = flags - LifecycleFlags::IS_COLLECTION_MUTATION;
    let contextual = [
        ("$index", Value::from(index)),
        ("$first", Value::Bool(index == 0)),
        ("$last", Value::Bool(index + 1 == len)),
        ("$even", Value::Bool(index % 2 == 0)),
        ("$odd", Value::Bool(index % 2 == 1)),
        ("$length", Value::from(len)),
    ];
    for (key, value) in contextual {
        if !locals.get(key).same_value(&value) {
            locals.set(key, value, flags)?;
        }
    }
    Ok(())
}

impl Component for Repeat {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        let same = self.scope.borrow().as_ref().is_some_and(|s| s.ptr_eq(scope));
        if same {
            return Ok(());
        }
        *self.scope.borrow_mut() = Some(scope.clone());
        self.statement.bind(flags | self.env.flags(), scope, self)?;
        self.refresh(flags)
    }

    fn attach(&self, flags: LifecycleFlags) -> Result<()> {
        self.attached.set(true);
        for view in self.views() {
            view.attach(flags)?;
        }
        Ok(())
    }

    fn detach(&self, flags: LifecycleFlags) -> Result<()> {
        self.attached.set(false);
        for view in self.views().iter().rev() {
            view.detach(flags)?;
        }
        Ok(())
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        let Some(scope) = self.scope.borrow_mut().take() else {
            return Ok(());
        };
        if let Some(subscription) = self.subscription.borrow_mut().take() {
            subscription.cancel(&self.as_subscriber());
        }
        self.unobserve(true);
        *self.items.borrow_mut() = Value::Undefined;
        let released = self.release_all(flags);
        self.statement.unbind(flags | self.env.flags(), &scope, self)?;
        released
    }
}

impl Subscriber for Repeat {
    fn handle_change(&self, _: &Value, _: &Value, flags: LifecycleFlags) -> Result<()> {
        if flags.contains(LifecycleFlags::DO_NOT_UPDATE_DOM) {
            if let Some(me) = self.me.upgrade() {
                self.env.observer_locator().flush_queue().enqueue_flush(me);
            }
            return Ok(());
        }
        self.refresh(flags - LifecycleFlags::FROM_BIND)
    }

    fn handle_batched_change(&self, index_map: &IndexMap, flags: LifecycleFlags) -> Result<()> {
        let following_array = match &*self.subscription.borrow() {
            Some(CollectionSubscription::Array(_)) => true,
            Some(_) => false,
            None => return Ok(()),
        };
        if following_array {
            return self.apply(index_map, flags);
        }
        let parent = self.scope.borrow().clone();
        match parent {
            Some(parent) => self.render_all(flags, &parent),
            None => Ok(()),
        }
    }
}

impl Flushable for Repeat {
    fn queue_links(&self) -> &QueueLinks {
        &self.links
    }

    fn flush(&self, flags: LifecycleFlags) -> Result<()> {
        self.refresh(flags)
    }
}

impl Connectable for Repeat {
    fn observer_locator(&self) -> &ObserverLocator {
        self.env.observer_locator()
    }

    fn observer_slots(&self) -> &ObserverSlots {
        &self.slots
    }

    fn as_subscriber(&self) -> Rc<dyn Subscriber> {
        subscriber_handle(&self.me)
    }
}

impl BindingHost for Repeat {
    fn service_locator(&self) -> &dyn ServiceLocator {
        self.env.resources()
    }

    fn mode(&self) -> BindingMode {
        self.mode.get()
    }

    fn set_mode(&self, mode: BindingMode) {
        self.mode.set(mode);
    }

    fn applied_behaviors(&self) -> &AppliedBehaviors {
        &self.behaviors
    }
}

impl fmt::Debug for Repeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repeat")
            .field("statement", &self.statement.to_string())
            .field("views", &self.views.borrow().len())
            .field("attached", &self.attached.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{Bindable, PropertyBinding};
    use crate::lifecycle::Lifecycle;
    use crate::resources::ResourceRegistry;
    use crate::scheduler::Scheduler;
    use crate::templating::view::{ViewParts, ViewState};
    use vireo_core::ArrayRef;
    use vireo_expr::{BindingType, parse};

    const F: LifecycleFlags = LifecycleFlags::empty();

    struct Fixture {
        lifecycle: Lifecycle,
        model: ObjectRef,
        repeat: Rc<Repeat>,
        rows: Rc<RefCell<Vec<ObjectRef>>>,
    }

    /// Each view renders `row.text = <text>` for its item.
    fn fixture(items: &[&str], text: &str) -> Fixture {
        let lifecycle = Lifecycle::new(Scheduler::new());
        let env = BindingEnv::new(&lifecycle, Rc::new(ResourceRegistry::with_builtins()));
        let rows: Rc<RefCell<Vec<ObjectRef>>> = Rc::default();
        let text = Rc::new(parse(text, BindingType::IS_PROPERTY).unwrap());
        let factory = {
            let env = env.clone();
            let rows = Rc::clone(&rows);
            ViewFactory::new("row", lifecycle.clone(), move |_| {
                let row = ObjectRef::new();
                rows.borrow_mut().push(row.clone());
                let binding = PropertyBinding::new(
                    env.clone(),
                    Rc::clone(&text),
                    Value::Object(row),
                    "text",
                    BindingMode::ToView,
                );
                Ok(ViewParts {
                    bindings: vec![binding as Rc<dyn Bindable>],
                    ..ViewParts::default()
                })
            })
        };
        let statement = Rc::new(parse("item of items", BindingType::IS_ITERATOR).unwrap());
        let repeat = Repeat::new(env, statement, factory).unwrap();
        let values = items.iter().map(|s| Value::from(*s)).collect();
        let model = ObjectRef::from_pairs([
            ("items", Value::Array(ArrayRef::from_values(values))),
            ("suffix", Value::from("!")),
        ]);
        let scope = Scope::new(Value::Object(model.clone()));
        lifecycle.begin_attach();
        repeat.bind(F, &scope).unwrap();
        repeat.attach(F).unwrap();
        lifecycle.end_attach(F).unwrap();
        Fixture {
            lifecycle,
            model,
            repeat,
            rows,
        }
    }

    fn items(repeat: &Repeat) -> Vec<String> {
        repeat
            .views()
            .iter()
            .map(|v| {
                let scope = v.scope().unwrap();
                scope.binding_context().get_property("item").to_display_string()
            })
            .collect()
    }

    fn indices(repeat: &Repeat) -> Vec<Value> {
        repeat
            .views()
            .iter()
            .map(|v| v.scope().unwrap().locals().get("$index"))
            .collect()
    }

    fn texts(rows: &RefCell<Vec<ObjectRef>>) -> Vec<String> {
        let mut texts: Vec<String> = rows
            .borrow()
            .iter()
            .map(|row| row.get("text"))
            .filter(|text| !text.is_undefined())
            .map(|text| text.to_display_string())
            .collect();
        texts.sort();
        texts
    }

    fn array(model: &ObjectRef) -> ArrayRef {
        match model.get("items") {
            Value::Array(array) => array,
            other => panic!("items is not an array: {other:?}"),
        }
    }

    #[test]
    fn renders_one_view_per_item_with_contextual_locals() {
        let fx = fixture(&["a", "b", "c"], "$index + ':' + item + suffix");
        assert_eq!(items(&fx.repeat), ["a", "b", "c"]);
        assert_eq!(texts(&fx.rows), ["0:a!", "1:b!", "2:c!"]);
        let last = fx.repeat.views()[2].scope().unwrap();
        assert_eq!(last.locals().get("$last"), Value::Bool(true));
        assert_eq!(last.locals().get("$even"), Value::Bool(true));
        assert_eq!(last.locals().get("$length"), Value::Number(3.0));
        assert!(fx.repeat.views().iter().all(|v| v.is_attached()));
    }

    #[test]
    fn splice_reuses_surviving_views() {
        let fx = fixture(&["a", "b", "c"], "item");
        let before = fx.repeat.views();
        array(&fx.model)
            .splice(1, Some(1), vec![Value::from("x"), Value::from("y")], F)
            .unwrap();
        fx.lifecycle.process_flush_queue(F).unwrap();

        let after = fx.repeat.views();
        assert_eq!(items(&fx.repeat), ["a", "x", "y", "c"]);
        assert!(Rc::ptr_eq(&after[0], &before[0]));
        assert!(Rc::ptr_eq(&after[3], &before[2]));
        assert!(before[1].state().contains(ViewState::IS_CACHED));
        assert_eq!(
            indices(&fx.repeat),
            [0.0, 1.0, 2.0, 3.0].map(Value::Number)
        );
        assert!(after.iter().all(|v| v.is_attached()));
    }

    #[test]
    fn moved_views_see_their_new_index() {
        let fx = fixture(&["a", "b"], "$index + ':' + item");
        array(&fx.model).reverse(F).unwrap();
        fx.lifecycle.process_flush_queue(F).unwrap();
        assert_eq!(items(&fx.repeat), ["b", "a"]);
        assert_eq!(texts(&fx.rows), ["0:b", "1:a"]);
        assert_eq!(fx.repeat.factory().created_count(), 2);
    }

    #[test]
    fn replacing_the_collection_rerenders_and_drops_the_old_one() {
        let fx = fixture(&["a", "b"], "item");
        let old = array(&fx.model);
        let next = ArrayRef::from_values(vec![Value::from("z")]);
        fx.model.set("items", Value::Array(next), F).unwrap();
        assert_eq!(items(&fx.repeat), ["z"]);
        assert_eq!(fx.repeat.factory().cached_count(), 1);

        old.push([Value::from("ignored")], F).unwrap();
        fx.lifecycle.process_flush_queue(F).unwrap();
        assert_eq!(items(&fx.repeat), ["z"]);
    }

    #[test]
    fn unbind_releases_every_view() {
        let fx = fixture(&["a", "b"], "item");
        let views = fx.repeat.views();
        fx.repeat.detach(F).unwrap();
        fx.repeat.unbind(F).unwrap();
        assert!(fx.repeat.views().is_empty());
        assert!(views.iter().all(|v| v.state().contains(ViewState::IS_CACHED)));
    }

    #[test]
    fn rejects_statements_that_are_not_for_of() {
        let lifecycle = Lifecycle::new(Scheduler::new());
        let env = BindingEnv::new(&lifecycle, Rc::new(ResourceRegistry::new()));
        let factory = ViewFactory::new("row", lifecycle, |_| Ok(ViewParts::default()));
        let statement = Rc::new(parse("items", BindingType::IS_PROPERTY).unwrap());
        assert!(Repeat::new(env, statement, factory).unwrap_err().is_parse());
    }
}
