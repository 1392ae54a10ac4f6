//! Wrapper model, reference table and identity caches.
//!
//! Every host value exposed to the engine, and every engine object exposed to
//! the host, is represented by exactly one [`Wrapper`] per direction. The
//! bidirectional reference table (a Lua table in the registry, mapping
//! `host value -> wrapper id` and `wrapper id -> host value`) both provides
//! identity lookups and anchors wrapped host values against the host
//! collector. Engine objects carry their wrapper id in a private slot so a
//! second crossing resolves to the same wrapper, and a weak-valued Lua cache
//! table maps wrapper ids back to the one canonical host userdata.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::rc::Rc;

use mlua::{AnyUserData, Lua, Table, Value};

use crate::bridge::dispatch::JsRef;
use crate::bridge::error::{BridgeError, Result};
use crate::bridge::{lifecycle, BridgeInner};

/// Internal field holding the wrapper id on proxy instances.
pub(crate) const FIELD_ID: usize = 0;
/// Internal field holding the owning-bridge tag on proxy instances.
pub(crate) const FIELD_TAG: usize = 1;

const PRIVATE_SLOT_NAME: &str = "lv8.id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WrapperKind {
    /// A Lua table, function or userdata exposed into the engine.
    HostProxy,
    /// An engine object exposed to Lua.
    EngineProxy,
    /// A plain engine context, addressed through its global object.
    Context,
    /// A context whose global delegates property traffic to a Lua table.
    Sandbox,
}

/// The engine-side handle of a wrapper.
///
/// `Strong` while the wrapper is Live, `Weak` (with a collection finalizer)
/// while it waits for one of the collectors, `Empty` once reclaimed.
pub(crate) enum EngineHandle {
    Strong(v8::Global<v8::Object>),
    Weak(v8::Weak<v8::Object>),
    Empty,
}

pub(crate) struct Wrapper {
    pub(crate) id: u32,
    pub(crate) kind: WrapperKind,
    pub(crate) handle: RefCell<EngineHandle>,
    /// Keeps the context itself alive for context/sandbox wrappers while Live.
    pub(crate) context: RefCell<Option<v8::Global<v8::Context>>>,
    /// Number of live host-side handles (`JsRef` values) over this wrapper.
    pub(crate) host_refs: Cell<usize>,
    pub(crate) js_collected: Cell<bool>,
    pub(crate) resurrected: Cell<bool>,
}

impl Wrapper {
    fn new(id: u32, kind: WrapperKind) -> Rc<Wrapper> {
        Rc::new(Wrapper {
            id,
            kind,
            handle: RefCell::new(EngineHandle::Empty),
            context: RefCell::new(None),
            host_refs: Cell::new(0),
            js_collected: Cell::new(false),
            resurrected: Cell::new(false),
        })
    }

    pub(crate) fn is_context_kind(&self) -> bool {
        matches!(self.kind, WrapperKind::Context | WrapperKind::Sandbox)
    }

    /// Resolves the wrapped engine object into the current scope.
    pub(crate) fn local_object<'s>(
        &self,
        scope: &mut v8::HandleScope<'s, ()>,
    ) -> Result<v8::Local<'s, v8::Object>> {
        match &*self.handle.borrow() {
            EngineHandle::Strong(global) => Ok(v8::Local::new(scope, global)),
            EngineHandle::Weak(weak) => weak.to_local(scope).ok_or(BridgeError::Released),
            EngineHandle::Empty => Err(BridgeError::Released),
        }
    }
}

/// Rust-side registry of wrappers by id.
///
/// Holding the `Rc` here is what keeps a resurrected wrapper (and through it
/// the engine handles) alive after the host finalizer has run.
#[derive(Default)]
pub(crate) struct WrapperRegistry {
    map: RefCell<HashMap<u32, Rc<Wrapper>>>,
    next_id: Cell<u32>,
}

impl WrapperRegistry {
    pub(crate) fn allocate(&self, kind: WrapperKind) -> Rc<Wrapper> {
        let id = self.next_id.get().wrapping_add(1).max(1);
        self.next_id.set(id);
        let wrapper = Wrapper::new(id, kind);
        let previous = self.map.borrow_mut().insert(id, wrapper.clone());
        debug_assert!(previous.is_none(), "wrapper id collision");
        wrapper
    }

    pub(crate) fn get(&self, id: u32) -> Option<Rc<Wrapper>> {
        self.map.borrow().get(&id).cloned()
    }

    pub(crate) fn remove(&self, id: u32) -> Option<Rc<Wrapper>> {
        self.map.borrow_mut().remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.map.borrow().len()
    }

    pub(crate) fn drain(&self) -> Vec<Rc<Wrapper>> {
        self.map.borrow_mut().drain().map(|(_, w)| w).collect()
    }
}

/// Builds the weak-valued cache table (`wrapper id -> userdata`).
pub(crate) fn make_weak_cache(lua: &Lua) -> mlua::Result<Table> {
    let cache = lua.create_table()?;
    let meta = lua.create_table()?;
    meta.raw_set("__mode", "v")?;
    cache.set_metatable(Some(meta));
    Ok(cache)
}

pub(crate) fn ref_lookup_id(refs: &Table, value: &Value) -> Result<Option<u32>> {
    Ok(refs.raw_get::<Option<u32>>(value.clone())?)
}

pub(crate) fn ref_lookup_value(refs: &Table, id: u32) -> Result<Value> {
    Ok(refs.raw_get(id)?)
}

/// Inserts both directions of a reference table entry.
pub(crate) fn ref_insert(refs: &Table, value: &Value, id: u32) -> Result<()> {
    if cfg!(debug_assertions) {
        let existing: Value = refs.raw_get(value.clone())?;
        debug_assert!(existing.is_nil(), "host value already has a wrapper");
    }
    refs.raw_set(value.clone(), id)?;
    refs.raw_set(id, value.clone())?;
    Ok(())
}

/// Removes both directions of a reference table entry. Idempotent.
pub(crate) fn ref_remove(refs: &Table, id: u32) -> Result<()> {
    let value: Value = refs.raw_get(id)?;
    if !value.is_nil() {
        refs.raw_set(value, Value::Nil)?;
        refs.raw_set(id, Value::Nil)?;
    }
    Ok(())
}

/// The private slot carrying a wrapper id on engine objects.
pub(crate) fn private_slot<'s>(
    scope: &mut v8::HandleScope<'s>,
) -> Result<v8::Local<'s, v8::Private>> {
    let name = v8::String::new(scope, PRIVATE_SLOT_NAME).ok_or(BridgeError::Alloc)?;
    Ok(v8::Private::for_api(scope, Some(name)))
}

pub(crate) fn tag_internal_fields(
    bridge: &Rc<BridgeInner>,
    scope: &mut v8::HandleScope,
    object: v8::Local<v8::Object>,
    id: u32,
) {
    if object.internal_field_count() < 2 {
        return;
    }
    let id_value = v8::Integer::new(scope, id as i32);
    let tag = v8::External::new(scope, Rc::as_ptr(bridge) as *mut c_void);
    object.set_internal_field(FIELD_ID, id_value.into());
    object.set_internal_field(FIELD_TAG, tag.into());
}

/// Resolves the wrapper tagged onto `object` through its internal fields,
/// following one prototype hop so the global proxy resolves like the global
/// object behind it. Objects owned by another bridge do not resolve.
pub(crate) fn wrapper_of(
    bridge: &Rc<BridgeInner>,
    scope: &mut v8::HandleScope,
    object: v8::Local<v8::Object>,
) -> Option<Rc<Wrapper>> {
    if let Some(wrapper) = wrapper_of_direct(bridge, scope, object) {
        return Some(wrapper);
    }
    let proto = object.get_prototype(scope)?;
    let proto = v8::Local::<v8::Object>::try_from(proto).ok()?;
    wrapper_of_direct(bridge, scope, proto)
}

fn wrapper_of_direct(
    bridge: &Rc<BridgeInner>,
    scope: &mut v8::HandleScope,
    object: v8::Local<v8::Object>,
) -> Option<Rc<Wrapper>> {
    if object.internal_field_count() < 2 {
        return None;
    }
    let tag = object.get_internal_field(scope, FIELD_TAG)?;
    let tag = v8::Local::<v8::Value>::try_from(tag).ok()?;
    let tag = v8::Local::<v8::External>::try_from(tag).ok()?;
    if tag.value() != Rc::as_ptr(bridge) as *mut c_void {
        return None;
    }
    let id = object.get_internal_field(scope, FIELD_ID)?;
    let id = v8::Local::<v8::Value>::try_from(id).ok()?;
    let id = id.int32_value(scope)? as u32;
    bridge.wrappers.get(id)
}

/// Exposes a host value (table, function or foreign userdata) into the
/// engine, reusing the existing proxy when the value already crossed.
pub(crate) fn wrap_host<'s>(
    bridge: &Rc<BridgeInner>,
    lua: &Lua,
    scope: &mut v8::HandleScope<'s>,
    value: &Value,
) -> Result<v8::Local<'s, v8::Object>> {
    let refs = bridge.refs_table(lua)?;
    if let Some(id) = ref_lookup_id(&refs, value)? {
        if let Some(wrapper) = bridge.wrappers.get(id) {
            match wrapper.local_object(scope) {
                Ok(object) => return Ok(object),
                Err(_) => {
                    // collected proxy whose finalizer has not run yet
                    bridge.wrappers.remove(id);
                    ref_remove(&refs, id)?;
                }
            }
        } else {
            ref_remove(&refs, id)?;
        }
    }

    let wrapper = bridge.wrappers.allocate(WrapperKind::HostProxy);
    let created: Result<v8::Local<v8::Object>> = if let Value::Function(_) = value {
        host_function_proxy(bridge, scope, wrapper.id)
    } else {
        let template = v8::Local::new(scope, &bridge.proxy_template);
        template.new_instance(scope).ok_or(BridgeError::Alloc)
    };
    let object = match created {
        Ok(object) => object,
        Err(err) => {
            bridge.wrappers.remove(wrapper.id);
            return Err(err);
        }
    };
    tag_internal_fields(bridge, scope, object, wrapper.id);
    let slot = private_slot(scope)?;
    let id_value = v8::Integer::new(scope, wrapper.id as i32);
    object.set_private(scope, slot, id_value.into());

    // the reference table entry anchors the host value; the engine handle
    // stays weak so the proxy can be collected once the engine forgets it
    let global = v8::Global::new(scope, object);
    let weak = lifecycle::watch(bridge, scope, &global, wrapper.id);
    *wrapper.handle.borrow_mut() = EngineHandle::Weak(weak);
    drop(global);
    ref_insert(&refs, value, wrapper.id)?;
    Ok(object)
}

/// Builds the engine function standing in for a Lua function. The callback
/// data slot carries `[wrapper id, owning-bridge tag]`.
fn host_function_proxy<'s>(
    bridge: &Rc<BridgeInner>,
    scope: &mut v8::HandleScope<'s>,
    id: u32,
) -> Result<v8::Local<'s, v8::Object>> {
    let data = v8::Array::new(scope, 2);
    let id_value = v8::Integer::new(scope, id as i32);
    data.set_index(scope, 0, id_value.into());
    let tag = v8::External::new(scope, Rc::as_ptr(bridge) as *mut c_void);
    data.set_index(scope, 1, tag.into());
    let function = v8::Function::builder(crate::bridge::dispatch::host_call_trampoline)
        .data(data.into())
        .build(scope)
        .ok_or(BridgeError::Alloc)?;
    Ok(function.into())
}

/// Adopts an engine object into the host, unwrapping host proxies and reusing
/// the canonical userdata for objects that already crossed.
pub(crate) fn adopt_engine(
    bridge: &Rc<BridgeInner>,
    lua: &Lua,
    scope: &mut v8::HandleScope,
    object: v8::Local<v8::Object>,
) -> Result<Value> {
    let wrapper = match wrapper_of(bridge, scope, object) {
        Some(wrapper) => Some(wrapper),
        None => wrapper_from_slot(bridge, scope, object)?,
    };
    if let Some(wrapper) = wrapper {
        match wrapper.kind {
            WrapperKind::HostProxy => {
                // hand the original host value back instead of double-wrapping
                let refs = bridge.refs_table(lua)?;
                let value = ref_lookup_value(&refs, wrapper.id)?;
                debug_assert!(!value.is_nil(), "host proxy without a reference table entry");
                return Ok(value);
            }
            _ => {
                lifecycle::unresurrect(bridge, &wrapper, scope)?;
                return Ok(Value::UserData(userdata_for(bridge, lua, &wrapper)?));
            }
        }
    }

    // first crossing of an engine object
    let wrapper = bridge.wrappers.allocate(WrapperKind::EngineProxy);
    *wrapper.handle.borrow_mut() = EngineHandle::Strong(v8::Global::new(scope, object));
    let slot = private_slot(scope)?;
    let id_value = v8::Integer::new(scope, wrapper.id as i32);
    object.set_private(scope, slot, id_value.into());
    Ok(Value::UserData(userdata_for(bridge, lua, &wrapper)?))
}

fn wrapper_from_slot(
    bridge: &Rc<BridgeInner>,
    scope: &mut v8::HandleScope,
    object: v8::Local<v8::Object>,
) -> Result<Option<Rc<Wrapper>>> {
    let slot = private_slot(scope)?;
    let Some(existing) = object.get_private(scope, slot) else {
        return Ok(None);
    };
    if !existing.is_int32() {
        return Ok(None);
    }
    let id = existing.int32_value(scope).unwrap_or(0) as u32;
    match bridge.wrappers.get(id) {
        Some(wrapper) => Ok(Some(wrapper)),
        None => {
            // slot left over from a wrapper that was already released
            object.delete_private(scope, slot);
            Ok(None)
        }
    }
}

/// Returns the canonical host userdata for a wrapper, creating it when the
/// cached one has been collected.
pub(crate) fn userdata_for(
    bridge: &Rc<BridgeInner>,
    lua: &Lua,
    wrapper: &Rc<Wrapper>,
) -> Result<AnyUserData> {
    let cache = bridge.cache_table(lua)?;
    if let Some(userdata) = cache.raw_get::<Option<AnyUserData>>(wrapper.id)? {
        return Ok(userdata);
    }
    let userdata = lua.create_userdata(JsRef::from_wrapper(bridge.clone(), wrapper.clone()))?;
    cache.raw_set(wrapper.id, &userdata)?;
    Ok(userdata)
}
