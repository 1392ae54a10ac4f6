//! Lifecycle coordination between the two collectors.
//!
//! A wrapper is Live while either runtime can still reach it. When the last
//! host handle over a context/sandbox wrapper is dropped, the wrapper is not
//! torn down: it is *resurrected* inside the bridge registry, its strong
//! engine handle demoted to a weak one with a collection finalizer, and the
//! context handle released so the engine may collect the realm. From there it
//! either gets reclaimed (the engine collects the object, the finalizer runs)
//! or un-resurrected (the engine hands the object back across the boundary
//! before collecting it). All transitions are idempotent; the finalizer is
//! cancelled by dropping the weak handle on un-resurrection.

use std::rc::{Rc, Weak};

use crate::bridge::error::{BridgeError, Result};
use crate::bridge::refs::{self, EngineHandle, Wrapper, WrapperKind};
use crate::bridge::BridgeInner;

/// Installs the engine-side collection finalizer for a wrapper.
pub(crate) fn watch(
    bridge: &Rc<BridgeInner>,
    isolate: &mut v8::Isolate,
    handle: &v8::Global<v8::Object>,
    id: u32,
) -> v8::Weak<v8::Object> {
    let weak_bridge = Rc::downgrade(bridge);
    v8::Weak::with_finalizer(
        isolate,
        handle,
        Box::new(move |isolate| engine_collected(weak_bridge, id, isolate)),
    )
}

/// Host finalizer: the last host handle over a wrapper was dropped.
pub(crate) fn release_host_anchor(bridge: &Rc<BridgeInner>, wrapper: &Rc<Wrapper>) {
    match wrapper.kind {
        WrapperKind::EngineProxy => detach_engine_proxy(bridge, wrapper),
        WrapperKind::Context | WrapperKind::Sandbox => {
            if wrapper.js_collected.get() {
                reclaim(bridge, wrapper);
            } else if !wrapper.resurrected.get() {
                resurrect(bridge, wrapper);
            }
        }
        WrapperKind::HostProxy => {
            debug_assert!(false, "host proxies have no host-side handles");
        }
    }
}

/// Releases an engine proxy once the host no longer references it. The engine
/// object itself lives on; only the wrapper and its identity slot go away.
fn detach_engine_proxy(bridge: &Rc<BridgeInner>, wrapper: &Rc<Wrapper>) {
    let cleared = bridge.enter(|scope| {
        let object = match wrapper.local_object(scope) {
            Ok(object) => object,
            Err(_) => return Ok(()),
        };
        let Some(context) = object.get_creation_context(scope) else {
            return Ok(());
        };
        let scope = &mut v8::ContextScope::new(scope, context);
        let slot = refs::private_slot(scope)?;
        if let Some(existing) = object.get_private(scope, slot) {
            // only clear a slot that still points at this wrapper
            if existing.is_int32()
                && existing.int32_value(scope).unwrap_or(0) as u32 == wrapper.id
            {
                object.delete_private(scope, slot);
            }
        }
        Ok(())
    });
    if let Err(err) = cleared {
        log::warn!("engine proxy #{} release: {err}", wrapper.id);
    }
    *wrapper.handle.borrow_mut() = EngineHandle::Empty;
    bridge.wrappers.remove(wrapper.id);
    log::trace!("engine proxy #{} released", wrapper.id);
}

/// Live -> Resurrecting. The registry `Rc` becomes the only anchor; the
/// engine handle goes weak so the engine may collect the realm.
fn resurrect(bridge: &Rc<BridgeInner>, wrapper: &Rc<Wrapper>) {
    let demoted = {
        let mut handle = wrapper.handle.borrow_mut();
        match &*handle {
            EngineHandle::Strong(global) => {
                let weak =
                    bridge.with_isolate(|isolate| watch(bridge, isolate, global, wrapper.id));
                *handle = EngineHandle::Weak(weak);
                true
            }
            _ => false,
        }
    };
    if demoted {
        wrapper.context.borrow_mut().take();
        wrapper.resurrected.set(true);
        log::trace!("wrapper #{} resurrected", wrapper.id);
    }
}

/// Engine collection finalizer, shared by host proxies and resurrected
/// context wrappers.
pub(crate) fn engine_collected(bridge: Weak<BridgeInner>, id: u32, _isolate: &mut v8::Isolate) {
    let Some(bridge) = bridge.upgrade() else {
        return;
    };
    let Some(wrapper) = bridge.wrappers.get(id) else {
        return;
    };
    match wrapper.kind {
        WrapperKind::HostProxy => {
            // the engine forgot the proxy; unanchor the host value
            *wrapper.handle.borrow_mut() = EngineHandle::Empty;
            bridge.wrappers.remove(id);
            if let Ok(lua) = bridge.lua() {
                if let Ok(table) = bridge.refs_table(&lua) {
                    if let Err(err) = refs::ref_remove(&table, id) {
                        log::warn!("host proxy #{id} unanchor: {err}");
                    }
                }
            }
            log::trace!("host proxy #{id} collected by the engine");
        }
        WrapperKind::Context | WrapperKind::Sandbox => {
            // Resurrecting -> Reclaimed
            if wrapper.resurrected.get() && !wrapper.js_collected.get() {
                wrapper.js_collected.set(true);
                wrapper.resurrected.set(false);
                reclaim(&bridge, &wrapper);
            }
        }
        WrapperKind::EngineProxy => {}
    }
}

/// Final teardown of a context/sandbox wrapper. Idempotent.
fn reclaim(bridge: &Rc<BridgeInner>, wrapper: &Rc<Wrapper>) {
    wrapper.js_collected.set(true);
    *wrapper.handle.borrow_mut() = EngineHandle::Empty;
    wrapper.context.borrow_mut().take();
    if bridge.wrappers.remove(wrapper.id).is_none() {
        return;
    }
    if wrapper.kind == WrapperKind::Sandbox {
        if let Ok(lua) = bridge.lua() {
            if let Ok(table) = bridge.refs_table(&lua) {
                if let Err(err) = refs::ref_remove(&table, wrapper.id) {
                    log::warn!("sandbox #{} unanchor: {err}", wrapper.id);
                }
            }
        }
    }
    log::trace!("wrapper #{} reclaimed", wrapper.id);
}

/// Resurrecting -> Live. The engine handed the object back across the
/// boundary before collecting it: the strong handle is restored first, then
/// the resurrection mark is removed, so no window exists in which the object
/// is unanchored. Dropping the old weak handle cancels the finalizer.
pub(crate) fn unresurrect(
    bridge: &Rc<BridgeInner>,
    wrapper: &Rc<Wrapper>,
    scope: &mut v8::HandleScope<'_, ()>,
) -> Result<()> {
    if !wrapper.resurrected.get() {
        return Ok(());
    }
    let taken = std::mem::replace(&mut *wrapper.handle.borrow_mut(), EngineHandle::Empty);
    let weak = match taken {
        EngineHandle::Weak(weak) => weak,
        other => {
            *wrapper.handle.borrow_mut() = other;
            wrapper.resurrected.set(false);
            return Ok(());
        }
    };
    let Some(global) = weak.to_global(scope) else {
        // collected between the finalizer being scheduled and this crossing
        reclaim(bridge, wrapper);
        wrapper.resurrected.set(false);
        return Err(BridgeError::Released);
    };
    if wrapper.is_context_kind() {
        let local = v8::Local::new(scope, &global);
        if let Some(context) = local.get_creation_context(scope) {
            *wrapper.context.borrow_mut() = Some(v8::Global::new(scope, context));
        }
    }
    *wrapper.handle.borrow_mut() = EngineHandle::Strong(global);
    wrapper.resurrected.set(false);
    log::trace!("wrapper #{} un-resurrected", wrapper.id);
    Ok(())
}
