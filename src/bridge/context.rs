//! Context and sandbox construction, and script evaluation.
//!
//! A plain context is a fresh engine realm addressed through its global
//! object. A sandbox is a context whose global is an instance of the proxy
//! template, so every property access scripts perform on their globals is
//! redirected into a backing Lua table. Both are handed to the host as
//! [`JsRef`] context handles and participate in the resurrection protocol.

use std::rc::Rc;

use mlua::{Table, Value};

use crate::bridge::dispatch::{capture_exception, JsRef};
use crate::bridge::error::{BridgeError, Result};
use crate::bridge::refs::{self, EngineHandle, WrapperKind};
use crate::bridge::value::{to_engine, to_host};
use crate::bridge::{lifecycle, BridgeInner};

/// Creates a fresh context, optionally seeding its global object with a
/// shallow copy of `seed` (a Lua table, or another context/object handle).
pub(crate) fn create_context(bridge: &Rc<BridgeInner>, seed: Option<Value>) -> Result<JsRef> {
    let lua = bridge.lua()?;
    bridge.enter(|scope| {
        let context = v8::Context::new(scope, v8::ContextOptions::default());
        let scope = &mut v8::ContextScope::new(scope, context);
        let global = context.global(scope);

        let wrapper = bridge.wrappers.allocate(WrapperKind::Context);
        *wrapper.handle.borrow_mut() = EngineHandle::Strong(v8::Global::new(scope, global));
        *wrapper.context.borrow_mut() = Some(v8::Global::new(scope, context));
        let slot = refs::private_slot(scope)?;
        let id_value = v8::Integer::new(scope, wrapper.id as i32);
        global.set_private(scope, slot, id_value.into());

        if let Some(seed) = &seed {
            seed_global(bridge, &lua, scope, global, seed)?;
        }

        let userdata = refs::userdata_for(bridge, &lua, &wrapper)?;
        Ok(userdata.borrow::<JsRef>()?.clone())
    })
}

/// Creates a sandbox: a context whose global delegates property traffic to
/// `backing`. The backing table is anchored through the reference table for
/// as long as the sandbox lives.
pub(crate) fn create_sandbox(bridge: &Rc<BridgeInner>, backing: Table) -> Result<JsRef> {
    let lua = bridge.lua()?;
    let backing = Value::Table(backing);
    bridge.enter(|scope| {
        let refs_table = bridge.refs_table(&lua)?;
        if let Some(id) = refs::ref_lookup_id(&refs_table, &backing)? {
            if let Some(wrapper) = bridge.wrappers.get(id) {
                if wrapper.kind == WrapperKind::Sandbox {
                    // one sandbox per backing table
                    lifecycle::unresurrect(bridge, &wrapper, scope)?;
                    let userdata = refs::userdata_for(bridge, &lua, &wrapper)?;
                    return Ok(userdata.borrow::<JsRef>()?.clone());
                }
            }
            return Err(BridgeError::Unsupported(
                "a table already exposed to the engine as a sandbox backing",
            ));
        }

        let template = v8::Local::new(scope, &bridge.proxy_template);
        let context = v8::Context::new(
            scope,
            v8::ContextOptions {
                global_template: Some(template),
                ..Default::default()
            },
        );
        let scope = &mut v8::ContextScope::new(scope, context);
        let proxy = context.global(scope);

        let wrapper = bridge.wrappers.allocate(WrapperKind::Sandbox);
        refs::tag_internal_fields(bridge, scope, proxy, wrapper.id);
        // the global proxy delegates to the real global object behind it
        if let Some(prototype) = proxy.get_prototype(scope) {
            if let Ok(real_global) = v8::Local::<v8::Object>::try_from(prototype) {
                refs::tag_internal_fields(bridge, scope, real_global, wrapper.id);
            }
        }
        let slot = refs::private_slot(scope)?;
        let id_value = v8::Integer::new(scope, wrapper.id as i32);
        proxy.set_private(scope, slot, id_value.into());

        *wrapper.handle.borrow_mut() = EngineHandle::Strong(v8::Global::new(scope, proxy));
        *wrapper.context.borrow_mut() = Some(v8::Global::new(scope, context));
        refs::ref_insert(&refs_table, &backing, wrapper.id)?;

        let userdata = refs::userdata_for(bridge, &lua, &wrapper)?;
        Ok(userdata.borrow::<JsRef>()?.clone())
    })
}

fn seed_global(
    bridge: &Rc<BridgeInner>,
    lua: &mlua::Lua,
    scope: &mut v8::HandleScope,
    global: v8::Local<v8::Object>,
    seed: &Value,
) -> Result<()> {
    match seed {
        Value::Table(table) => {
            for pair in table.pairs::<Value, Value>() {
                let (key, value) = pair?;
                let key = to_engine(bridge, lua, scope, &key)?;
                let value = to_engine(bridge, lua, scope, &value)?;
                global.set(scope, key, value);
            }
            Ok(())
        }
        Value::UserData(userdata) if userdata.is::<JsRef>() => {
            let source = userdata.borrow::<JsRef>()?;
            if !Rc::ptr_eq(&source.bridge, bridge) {
                return Err(BridgeError::Unsupported(
                    "a reference owned by another bridge",
                ));
            }
            let source_object = source.wrapper.local_object(scope)?;
            let names = source_object
                .get_own_property_names(scope, Default::default())
                .ok_or(BridgeError::Alloc)?;
            for index in 0..names.length() {
                let Some(key) = names.get_index(scope, index) else {
                    continue;
                };
                let Some(value) = source_object.get(scope, key) else {
                    continue;
                };
                global.set(scope, key, value);
            }
            Ok(())
        }
        _ => Err(BridgeError::Unsupported("this seed value")),
    }
}

/// Resolves the realm an operation should run in: `target`'s when given,
/// otherwise the bridge's own.
pub(crate) fn target_context<'s>(
    bridge: &Rc<BridgeInner>,
    scope: &mut v8::HandleScope<'s, ()>,
    target: Option<&JsRef>,
) -> Result<v8::Local<'s, v8::Context>> {
    match target {
        Some(reference) => {
            if !reference.wrapper.is_context_kind() {
                return Err(BridgeError::NotAContext);
            }
            let borrow = reference.wrapper.context.borrow();
            let global = borrow.as_ref().ok_or(BridgeError::Released)?;
            Ok(v8::Local::new(scope, global))
        }
        None => Ok(v8::Local::new(scope, &bridge.main_context)),
    }
}

/// Compiles and runs a script, converting the completion value to the host.
///
/// The script runs in `target`'s realm when given (a context or sandbox
/// handle), otherwise in the bridge's own realm. Compilation failures carry
/// the script diagnostics; runtime exceptions carry the stack captured at the
/// throw site.
pub(crate) fn eval(
    bridge: &Rc<BridgeInner>,
    source: &str,
    chunk_name: Option<&str>,
    target: Option<&JsRef>,
) -> Result<Value> {
    let lua = bridge.lua()?;
    bridge.enter(|scope| {
        let context = target_context(bridge, scope, target)?;
        let scope = &mut v8::ContextScope::new(scope, context);
        let tc = &mut v8::TryCatch::new(scope);

        let code = v8::String::new(tc, source).ok_or(BridgeError::Alloc)?;
        let origin = match chunk_name {
            Some(name) => {
                let resource = v8::String::new(tc, name).ok_or(BridgeError::Alloc)?;
                Some(v8::ScriptOrigin::new(
                    tc,
                    resource.into(),
                    0,
                    0,
                    false,
                    0,
                    None,
                    false,
                    false,
                    false,
                    None,
                ))
            }
            None => None,
        };
        let script = match v8::Script::compile(tc, code, origin.as_ref()) {
            Some(script) => script,
            None => return Err(capture_exception(tc).into()),
        };
        match script.run(tc) {
            Some(value) => to_host(bridge, &lua, tc, value),
            None => Err(capture_exception(tc).into()),
        }
    })
}
