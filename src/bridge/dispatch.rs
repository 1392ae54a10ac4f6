//! Call dispatch across the boundary.
//!
//! [`JsRef`] is the host-side handle over an engine object: property access,
//! calls, construction and enumeration from Rust, and Lua metamethods so the
//! same handle behaves like a table from scripts. The other direction is the
//! set of engine callbacks installed on the proxy template: named and indexed
//! interceptors redirecting property traffic on sandbox globals and wrapped
//! tables into protected Lua operations, and the call trampoline invoking
//! wrapped Lua functions.
//!
//! Exceptions cross in both directions: engine exceptions are captured (with
//! their stack trace) into [`JsException`] and raised as host errors; host
//! errors surfacing inside an engine callback are re-thrown as engine
//! exceptions.

use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use mlua::{Lua, MetaMethod, MultiValue, UserData, UserDataMethods, Value};

use crate::bridge::error::{BridgeError, JsException, Result};
use crate::bridge::refs::{self, Wrapper, WrapperKind};
use crate::bridge::value::{to_engine, to_host};
use crate::bridge::{lifecycle, BridgeInner};

/// Host handle over an engine object.
///
/// Cloning is cheap and reference-counted; the wrapped object stays alive at
/// least as long as one handle does. Handles double as Lua userdata, so the
/// same type is what scripts receive.
pub struct JsRef {
    pub(crate) bridge: Rc<BridgeInner>,
    pub(crate) wrapper: Rc<Wrapper>,
}

impl JsRef {
    pub(crate) fn from_wrapper(bridge: Rc<BridgeInner>, wrapper: Rc<Wrapper>) -> JsRef {
        wrapper.host_refs.set(wrapper.host_refs.get() + 1);
        JsRef { bridge, wrapper }
    }

    /// Whether both handles denote the same engine object.
    pub fn ptr_eq(&self, other: &JsRef) -> bool {
        Rc::ptr_eq(&self.wrapper, &other.wrapper)
    }

    /// Whether this handle denotes a context or sandbox.
    pub fn is_context(&self) -> bool {
        self.wrapper.is_context_kind()
    }

    /// The canonical Lua userdata for this handle. Converting through this
    /// keeps identity: the same engine object always yields the same userdata.
    pub fn to_lua(&self, lua: &Lua) -> Result<mlua::AnyUserData> {
        refs::userdata_for(&self.bridge, lua, &self.wrapper)
    }

    /// Enters the engine and the object's context, then runs `f`.
    fn with_object<R>(
        &self,
        f: impl for<'s> FnOnce(&mut v8::HandleScope<'s>, v8::Local<'s, v8::Object>, &Lua) -> Result<R>,
    ) -> Result<R> {
        let lua = self.bridge.lua()?;
        self.bridge.enter(|scope| {
            let object = self.wrapper.local_object(scope)?;
            let context = match &*self.wrapper.context.borrow() {
                Some(global) => v8::Local::new(scope, global),
                None => object
                    .get_creation_context(scope)
                    .ok_or(BridgeError::Released)?,
            };
            let scope = &mut v8::ContextScope::new(scope, context);
            f(scope, object, &lua)
        })
    }

    /// Reads a property.
    pub fn get(&self, key: impl mlua::IntoLua) -> Result<Value> {
        self.with_object(|scope, object, lua| {
            let key = key.into_lua(lua)?;
            let key = to_engine(&self.bridge, lua, scope, &key)?;
            let tc = &mut v8::TryCatch::new(scope);
            match object.get(tc, key) {
                Some(value) if !tc.has_caught() => to_host(&self.bridge, lua, tc, value),
                _ => Err(capture_exception(tc).into()),
            }
        })
    }

    /// Writes a property.
    pub fn set(&self, key: impl mlua::IntoLua, value: impl mlua::IntoLua) -> Result<()> {
        self.with_object(|scope, object, lua| {
            let key = key.into_lua(lua)?;
            let value = value.into_lua(lua)?;
            let key = to_engine(&self.bridge, lua, scope, &key)?;
            let value = to_engine(&self.bridge, lua, scope, &value)?;
            let tc = &mut v8::TryCatch::new(scope);
            match object.set(tc, key, value) {
                Some(_) if !tc.has_caught() => Ok(()),
                _ => Err(capture_exception(tc).into()),
            }
        })
    }

    /// Deletes a property. Returns whether the engine reported success.
    pub fn delete(&self, key: impl mlua::IntoLua) -> Result<bool> {
        self.with_object(|scope, object, lua| {
            let key = key.into_lua(lua)?;
            let key = to_engine(&self.bridge, lua, scope, &key)?;
            let tc = &mut v8::TryCatch::new(scope);
            match object.delete(tc, key) {
                Some(deleted) if !tc.has_caught() => Ok(deleted),
                _ => Err(capture_exception(tc).into()),
            }
        })
    }

    /// Reads the `length` property.
    pub fn length(&self) -> Result<Value> {
        self.get("length")
    }

    /// Calls the object as a function with itself as the receiver.
    pub fn call(&self, args: Vec<Value>) -> Result<Value> {
        self.call_inner(None, args)
    }

    /// Calls the object as a function with an explicit receiver.
    pub fn call_with(&self, receiver: Value, args: Vec<Value>) -> Result<Value> {
        self.call_inner(Some(receiver), args)
    }

    fn call_inner(&self, receiver: Option<Value>, args: Vec<Value>) -> Result<Value> {
        self.with_object(|scope, object, lua| {
            let callee: v8::Local<v8::Value> = object.into();
            let callee = v8::Local::<v8::Function>::try_from(callee)
                .map_err(|_| BridgeError::Unsupported("calling a non-function"))?;
            let mut call_args = Vec::with_capacity(args.len());
            for arg in &args {
                call_args.push(to_engine(&self.bridge, lua, scope, arg)?);
            }
            let receiver: v8::Local<v8::Value> = match &receiver {
                Some(value) => to_engine(&self.bridge, lua, scope, value)?,
                None => object.into(),
            };
            let tc = &mut v8::TryCatch::new(scope);
            match callee.call(tc, receiver, &call_args) {
                Some(value) if !tc.has_caught() => to_host(&self.bridge, lua, tc, value),
                _ => Err(capture_exception(tc).into()),
            }
        })
    }

    /// Invokes the object as a constructor.
    pub fn construct(&self, args: Vec<Value>) -> Result<Value> {
        self.with_object(|scope, object, lua| {
            let callee: v8::Local<v8::Value> = object.into();
            let callee = v8::Local::<v8::Function>::try_from(callee)
                .map_err(|_| BridgeError::Unsupported("constructing a non-function"))?;
            let mut call_args = Vec::with_capacity(args.len());
            for arg in &args {
                call_args.push(to_engine(&self.bridge, lua, scope, arg)?);
            }
            let tc = &mut v8::TryCatch::new(scope);
            match callee.new_instance(tc, &call_args) {
                Some(instance) if !tc.has_caught() => {
                    to_host(&self.bridge, lua, tc, instance.into())
                }
                _ => Err(capture_exception(tc).into()),
            }
        })
    }

    /// Snapshot of the object's own properties, in engine enumeration order.
    pub fn entries(&self) -> Result<IndexMap<String, Value>> {
        self.with_object(|scope, object, lua| {
            let tc = &mut v8::TryCatch::new(scope);
            let names = match object.get_own_property_names(tc, Default::default()) {
                Some(names) => names,
                None => return Err(capture_exception(tc).into()),
            };
            let mut out = IndexMap::with_capacity(names.length() as usize);
            for index in 0..names.length() {
                let Some(key) = names.get_index(tc, index) else {
                    continue;
                };
                let value = match object.get(tc, key) {
                    Some(value) if !tc.has_caught() => value,
                    _ => return Err(capture_exception(tc).into()),
                };
                let value = to_host(&self.bridge, lua, tc, value)?;
                out.insert(key.to_rust_string_lossy(tc), value);
            }
            Ok(out)
        })
    }

    /// Snapshot of the object's indexed elements (`0..length`).
    pub fn elements(&self) -> Result<Vec<Value>> {
        self.with_object(|scope, object, lua| {
            let tc = &mut v8::TryCatch::new(scope);
            let length_key = v8::String::new(tc, "length").ok_or(BridgeError::Alloc)?;
            let length = object
                .get(tc, length_key.into())
                .and_then(|value| value.uint32_value(tc))
                .unwrap_or(0);
            let mut out = Vec::with_capacity(length as usize);
            for index in 0..length {
                let value = match object.get_index(tc, index) {
                    Some(value) if !tc.has_caught() => value,
                    _ => return Err(capture_exception(tc).into()),
                };
                out.push(to_host(&self.bridge, lua, tc, value)?);
            }
            Ok(out)
        })
    }

    /// Human-readable rendering, used by `__tostring`.
    pub fn render(&self) -> Result<String> {
        match self.wrapper.kind {
            WrapperKind::Context => Ok(format!("js<*context>: #{}", self.wrapper.id)),
            WrapperKind::Sandbox => Ok(format!("js<*sandbox>: #{}", self.wrapper.id)),
            _ => self.with_object(|scope, object, _lua| {
                if object.is_native_error() {
                    // errors render with their stack, like the engine prints them
                    let key = v8::String::new(scope, "stack").ok_or(BridgeError::Alloc)?;
                    if let Some(stack) = object.get(scope, key.into()) {
                        if stack.is_string() {
                            return Ok(stack.to_rust_string_lossy(scope));
                        }
                    }
                }
                let constructor = object.get_constructor_name().to_rust_string_lossy(scope);
                Ok(format!("js<{constructor}>: #{}", self.wrapper.id))
            }),
        }
    }
}

impl Clone for JsRef {
    fn clone(&self) -> Self {
        JsRef::from_wrapper(self.bridge.clone(), self.wrapper.clone())
    }
}

impl PartialEq for JsRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Drop for JsRef {
    fn drop(&mut self) {
        let count = self.wrapper.host_refs.get();
        debug_assert!(count > 0, "host handle count underflow");
        self.wrapper.host_refs.set(count.saturating_sub(1));
        if count <= 1 {
            lifecycle::release_host_anchor(&self.bridge, &self.wrapper);
        }
    }
}

impl std::fmt::Debug for JsRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsRef")
            .field("id", &self.wrapper.id)
            .field("kind", &self.wrapper.kind)
            .finish()
    }
}

impl UserData for JsRef {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |_, this, key: Value| {
            Ok(this.get(key)?)
        });
        methods.add_meta_method(
            MetaMethod::NewIndex,
            |_, this, (key, value): (Value, Value)| {
                this.set(key, value)?;
                Ok(())
            },
        );
        methods.add_meta_method(MetaMethod::Call, |_, this, args: MultiValue| {
            Ok(this.call(args.into_iter().collect())?)
        });
        methods.add_meta_method(MetaMethod::Len, |_, this, ()| Ok(this.length()?));
        methods.add_meta_method(MetaMethod::Eq, |_, this, other: mlua::AnyUserData| {
            let other = other.borrow::<JsRef>()?;
            Ok(this.ptr_eq(&other))
        });
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.render()?));
        methods.add_meta_method(MetaMethod::Pairs, |lua, this, ()| {
            let mut entries = Vec::new();
            for (key, value) in this.entries()? {
                entries.push((Value::String(lua.create_string(&key)?), value));
            }
            let mut iter = entries.into_iter();
            let next = lua.create_function_mut(move |_, (_state, _control): (Value, Value)| {
                Ok(match iter.next() {
                    Some((key, value)) => (key, value),
                    None => (Value::Nil, Value::Nil),
                })
            })?;
            Ok((next, Value::Nil, Value::Nil))
        });
    }
}

/// Captures the pending exception of a `TryCatch` into a [`JsException`].
pub(crate) fn capture_exception(tc: &mut v8::TryCatch<v8::HandleScope>) -> JsException {
    let mut out = JsException::default();
    if let Some(exception) = tc.exception() {
        out.message = exception.to_rust_string_lossy(tc);
    } else {
        out.message = "engine terminated execution".into();
    }
    if let Some(trace) = tc.stack_trace() {
        out.trace = trace.to_rust_string_lossy(tc);
    }
    if let Some(message) = tc.message() {
        out.line = message.get_line_number(tc).map(|line| line as u32);
        out.start_column = Some(message.get_start_column() as u32);
        out.end_column = Some(message.get_end_column() as u32);
        if let Some(source_line) = message.get_source_line(tc) {
            out.source_line = Some(source_line.to_rust_string_lossy(tc));
        }
        if let Some(resource) = message.get_script_resource_name(tc) {
            if resource.is_string() {
                out.resource = Some(resource.to_rust_string_lossy(tc));
            }
        }
    }
    if out.trace.is_empty() {
        out.trace = out.message.clone();
    }
    out
}

/// Builds the shared proxy template: interceptors for property traffic plus
/// two internal fields for the wrapper id and owning-bridge tag.
pub(crate) fn build_proxy_template<'s>(
    scope: &mut v8::HandleScope<'s, ()>,
) -> v8::Local<'s, v8::ObjectTemplate> {
    let template = v8::ObjectTemplate::new(scope);
    template.set_internal_field_count(2);
    template.set_named_property_handler(
        v8::NamedPropertyHandlerConfiguration::new()
            .getter(named_getter)
            .setter(named_setter)
            .deleter(named_deleter)
            .enumerator(enumerator),
    );
    template.set_indexed_property_handler(
        v8::IndexedPropertyHandlerConfiguration::new()
            .getter(indexed_getter)
            .setter(indexed_setter)
            .deleter(indexed_deleter),
    );
    template
}

/// Resolves bridge, host runtime and backing host value for a callback.
fn callback_target(
    scope: &mut v8::HandleScope,
    this: v8::Local<v8::Object>,
) -> Option<(Rc<BridgeInner>, Lua, Value)> {
    let bridge = scope.get_slot::<Weak<BridgeInner>>()?.clone().upgrade()?;
    let lua = bridge.lua().ok()?;
    let wrapper = refs::wrapper_of(&bridge, scope, this)?;
    let table = bridge.refs_table(&lua).ok()?;
    let target = refs::ref_lookup_value(&table, wrapper.id).ok()?;
    if target.is_nil() {
        return None;
    }
    Some((bridge, lua, target))
}

fn throw_host_error(scope: &mut v8::HandleScope, err: &mlua::Error) {
    if let Some(message) = v8::String::new(scope, &err.to_string()) {
        let exception = v8::Exception::error(scope, message);
        scope.throw_exception(exception);
    }
}

fn throw_bridge_error(scope: &mut v8::HandleScope, err: &BridgeError) {
    if let Some(message) = v8::String::new(scope, &err.to_string()) {
        let exception = v8::Exception::error(scope, message);
        scope.throw_exception(exception);
    }
}

/// Protected read through the host's dynamic indexing. Tables index
/// directly; userdata goes through a chunk so `__index` metamethods apply.
fn host_index(lua: &Lua, target: &Value, key: Value) -> mlua::Result<Value> {
    match target {
        Value::Table(table) => table.get(key),
        Value::UserData(_) => lua
            .load("local o, k = ...\nreturn o[k]")
            .call::<Value>((target.clone(), key)),
        other => Err(mlua::Error::RuntimeError(format!(
            "attempt to index a {} value",
            other.type_name()
        ))),
    }
}

/// Protected write through the host's dynamic indexing.
fn host_newindex(lua: &Lua, target: &Value, key: Value, value: Value) -> mlua::Result<()> {
    match target {
        Value::Table(table) => table.set(key, value),
        Value::UserData(_) => lua
            .load("local o, k, v = ...\no[k] = v")
            .call::<()>((target.clone(), key, value)),
        other => Err(mlua::Error::RuntimeError(format!(
            "attempt to index a {} value",
            other.type_name()
        ))),
    }
}

fn intercept_get(
    scope: &mut v8::HandleScope,
    this: v8::Local<v8::Object>,
    key_of: impl FnOnce(&Lua) -> mlua::Result<Value>,
    rv: &mut v8::ReturnValue<v8::Value>,
) -> v8::Intercepted {
    let Some((bridge, lua, target)) = callback_target(scope, this) else {
        return v8::Intercepted::No;
    };
    let _entered = bridge.entry_guard();
    let key = match key_of(&lua) {
        Ok(key) => key,
        Err(err) => {
            throw_host_error(scope, &err);
            return v8::Intercepted::Yes;
        }
    };
    match host_index(&lua, &target, key) {
        // a miss is not answered: the lookup falls through to the object
        // behind the proxy, so sandbox globals keep the engine builtins
        Ok(Value::Nil) => v8::Intercepted::No,
        Ok(value) => match to_engine(&bridge, &lua, scope, &value) {
            Ok(converted) => {
                rv.set(converted);
                v8::Intercepted::Yes
            }
            Err(err) => {
                throw_bridge_error(scope, &err);
                v8::Intercepted::Yes
            }
        },
        Err(err) => {
            throw_host_error(scope, &err);
            v8::Intercepted::Yes
        }
    }
}

fn intercept_set(
    scope: &mut v8::HandleScope,
    this: v8::Local<v8::Object>,
    key_of: impl FnOnce(&Lua) -> mlua::Result<Value>,
    value: v8::Local<v8::Value>,
) -> v8::Intercepted {
    let Some((bridge, lua, target)) = callback_target(scope, this) else {
        return v8::Intercepted::No;
    };
    let _entered = bridge.entry_guard();
    let key = match key_of(&lua) {
        Ok(key) => key,
        Err(err) => {
            throw_host_error(scope, &err);
            return v8::Intercepted::Yes;
        }
    };
    let value = match to_host(&bridge, &lua, scope, value) {
        Ok(value) => value,
        Err(err) => {
            throw_bridge_error(scope, &err);
            return v8::Intercepted::Yes;
        }
    };
    if let Err(err) = host_newindex(&lua, &target, key, value) {
        throw_host_error(scope, &err);
    }
    v8::Intercepted::Yes
}

fn named_getter(
    scope: &mut v8::HandleScope,
    key: v8::Local<v8::Name>,
    args: v8::PropertyCallbackArguments,
    mut rv: v8::ReturnValue<v8::Value>,
) -> v8::Intercepted {
    if key.is_symbol() {
        return v8::Intercepted::No;
    }
    let name = key.to_rust_string_lossy(scope);
    intercept_get(
        scope,
        args.this(),
        move |lua| Ok(Value::String(lua.create_string(&name)?)),
        &mut rv,
    )
}

fn named_setter(
    scope: &mut v8::HandleScope,
    key: v8::Local<v8::Name>,
    value: v8::Local<v8::Value>,
    args: v8::PropertyCallbackArguments,
    _rv: v8::ReturnValue<()>,
) -> v8::Intercepted {
    if key.is_symbol() {
        return v8::Intercepted::No;
    }
    let name = key.to_rust_string_lossy(scope);
    intercept_set(
        scope,
        args.this(),
        move |lua| Ok(Value::String(lua.create_string(&name)?)),
        value,
    )
}

fn named_deleter(
    scope: &mut v8::HandleScope,
    key: v8::Local<v8::Name>,
    args: v8::PropertyCallbackArguments,
    mut rv: v8::ReturnValue<v8::Boolean>,
) -> v8::Intercepted {
    if key.is_symbol() {
        return v8::Intercepted::No;
    }
    let name = key.to_rust_string_lossy(scope);
    let undefined = v8::undefined(scope).into();
    let intercepted = intercept_set(
        scope,
        args.this(),
        move |lua| Ok(Value::String(lua.create_string(&name)?)),
        undefined,
    );
    rv.set_bool(true);
    intercepted
}

fn enumerator(
    scope: &mut v8::HandleScope,
    args: v8::PropertyCallbackArguments,
    mut rv: v8::ReturnValue<v8::Array>,
) {
    let Some((bridge, lua, target)) = callback_target(scope, args.this()) else {
        return;
    };
    let _entered = bridge.entry_guard();
    let Value::Table(table) = target else {
        return;
    };
    let mut keys: Vec<v8::Local<v8::Value>> = Vec::new();
    for pair in table.pairs::<Value, Value>() {
        let Ok((key, _)) = pair else { break };
        if let Ok(converted) = to_engine(&bridge, &lua, scope, &key) {
            keys.push(converted);
        }
    }
    let array = v8::Array::new_with_elements(scope, &keys);
    rv.set(array);
}

fn indexed_getter(
    scope: &mut v8::HandleScope,
    index: u32,
    args: v8::PropertyCallbackArguments,
    mut rv: v8::ReturnValue<v8::Value>,
) -> v8::Intercepted {
    // raw passthrough: engine indices stay 0-based on the host side
    intercept_get(
        scope,
        args.this(),
        move |_| Ok(Value::Integer(index as i64)),
        &mut rv,
    )
}

fn indexed_setter(
    scope: &mut v8::HandleScope,
    index: u32,
    value: v8::Local<v8::Value>,
    args: v8::PropertyCallbackArguments,
    _rv: v8::ReturnValue<()>,
) -> v8::Intercepted {
    intercept_set(
        scope,
        args.this(),
        move |_| Ok(Value::Integer(index as i64)),
        value,
    )
}

fn indexed_deleter(
    scope: &mut v8::HandleScope,
    index: u32,
    args: v8::PropertyCallbackArguments,
    mut rv: v8::ReturnValue<v8::Boolean>,
) -> v8::Intercepted {
    let undefined = v8::undefined(scope).into();
    let intercepted = intercept_set(
        scope,
        args.this(),
        move |_| Ok(Value::Integer(index as i64)),
        undefined,
    );
    rv.set_bool(true);
    intercepted
}

/// Engine-to-host call trampoline for wrapped Lua functions. The wrapper id
/// travels in the callback data slot.
pub(crate) fn host_call_trampoline(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    let Some((bridge, lua, target)) = trampoline_target(scope, &args) else {
        let message = v8::String::new(scope, "callable is no longer available");
        if let Some(message) = message {
            let exception = v8::Exception::error(scope, message);
            scope.throw_exception(exception);
        }
        return;
    };
    let _entered = bridge.entry_guard();

    let mut converted_args = Vec::with_capacity(args.length() as usize);
    for index in 0..args.length() {
        match to_host(&bridge, &lua, scope, args.get(index)) {
            Ok(value) => converted_args.push(value),
            Err(err) => {
                throw_bridge_error(scope, &err);
                return;
            }
        }
    }
    let call_args = MultiValue::from_iter(converted_args);

    let results = match &target {
        Value::Function(function) => function.call::<MultiValue>(call_args),
        Value::Table(table) => table.call::<MultiValue>(call_args),
        other => Err(mlua::Error::RuntimeError(format!(
            "attempt to call a {} value",
            other.type_name()
        ))),
    };
    let results = match results {
        Ok(results) => results,
        Err(err) => {
            throw_host_error(scope, &err);
            return;
        }
    };

    // multi-return packing: none -> undefined, one -> the value, many -> array
    match results.len() {
        0 => rv.set(v8::undefined(scope).into()),
        1 => {
            let value = results.into_iter().next().unwrap_or(Value::Nil);
            match to_engine(&bridge, &lua, scope, &value) {
                Ok(converted) => rv.set(converted),
                Err(err) => throw_bridge_error(scope, &err),
            }
        }
        _ => {
            let mut converted = Vec::with_capacity(results.len());
            for value in results {
                match to_engine(&bridge, &lua, scope, &value) {
                    Ok(item) => converted.push(item),
                    Err(err) => {
                        throw_bridge_error(scope, &err);
                        return;
                    }
                }
            }
            let array = v8::Array::new_with_elements(scope, &converted);
            rv.set(array.into());
        }
    }
}

fn trampoline_target(
    scope: &mut v8::HandleScope,
    args: &v8::FunctionCallbackArguments,
) -> Option<(Rc<BridgeInner>, Lua, Value)> {
    let bridge = scope.get_slot::<Weak<BridgeInner>>()?.clone().upgrade()?;
    let lua = bridge.lua().ok()?;
    let data = v8::Local::<v8::Array>::try_from(args.data()).ok()?;
    let id = data.get_index(scope, 0)?.int32_value(scope)? as u32;
    let tag = v8::Local::<v8::External>::try_from(data.get_index(scope, 1)?).ok()?;
    if tag.value() != Rc::as_ptr(&bridge) as *mut std::ffi::c_void {
        return None;
    }
    let wrapper = bridge.wrappers.get(id)?;
    let table = bridge.refs_table(&lua).ok()?;
    let target = refs::ref_lookup_value(&table, wrapper.id).ok()?;
    if target.is_nil() {
        return None;
    }
    Some((bridge, lua, target))
}
