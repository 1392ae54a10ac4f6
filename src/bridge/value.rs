//! Value conversion between the two runtimes.
//!
//! Primitives are copied by value on every crossing; strings copy as UTF-8
//! (lossily in the engine-to-host direction). Tables, functions and foreign
//! userdata fall through to the wrapper path in [`crate::bridge::refs`], as
//! do engine objects, so reference semantics are preserved per direction.

use std::rc::Rc;

use mlua::{Lua, Value};

use crate::bridge::dispatch::JsRef;
use crate::bridge::error::{BridgeError, Result};
use crate::bridge::refs;
use crate::bridge::BridgeInner;

/// Converts a host value into the engine, inside an entered context.
pub(crate) fn to_engine<'s>(
    bridge: &Rc<BridgeInner>,
    lua: &Lua,
    scope: &mut v8::HandleScope<'s>,
    value: &Value,
) -> Result<v8::Local<'s, v8::Value>> {
    match value {
        Value::Nil => Ok(v8::undefined(scope).into()),
        Value::Boolean(b) => Ok(v8::Boolean::new(scope, *b).into()),
        Value::Integer(i) => {
            if let Ok(small) = i32::try_from(*i) {
                Ok(v8::Integer::new(scope, small).into())
            } else {
                Ok(v8::Number::new(scope, *i as f64).into())
            }
        }
        Value::Number(n) => Ok(v8::Number::new(scope, *n).into()),
        Value::String(s) => {
            let bytes = s.as_bytes();
            let string = v8::String::new_from_utf8(scope, &bytes, v8::NewStringType::Normal)
                .ok_or(BridgeError::Alloc)?;
            Ok(string.into())
        }
        Value::UserData(userdata) if userdata.is::<JsRef>() => {
            // unwrap our own reference instead of double-wrapping it
            let reference = userdata.borrow::<JsRef>()?;
            if !Rc::ptr_eq(&reference.bridge, bridge) {
                return Err(BridgeError::Unsupported(
                    "a reference owned by another bridge",
                ));
            }
            Ok(reference.wrapper.local_object(scope)?.into())
        }
        Value::Table(_) | Value::Function(_) | Value::UserData(_) => {
            Ok(refs::wrap_host(bridge, lua, scope, value)?.into())
        }
        Value::Error(err) => {
            let message =
                v8::String::new(scope, &err.to_string()).ok_or(BridgeError::Alloc)?;
            Ok(v8::Exception::error(scope, message))
        }
        Value::Thread(_) => Err(BridgeError::Unsupported("a coroutine")),
        Value::LightUserData(_) => Err(BridgeError::Unsupported("a light userdata")),
        _ => Err(BridgeError::Unsupported("this host value")),
    }
}

/// Converts an engine value into the host, inside an entered context.
pub(crate) fn to_host(
    bridge: &Rc<BridgeInner>,
    lua: &Lua,
    scope: &mut v8::HandleScope,
    value: v8::Local<v8::Value>,
) -> Result<Value> {
    if value.is_null_or_undefined() {
        return Ok(Value::Nil);
    }
    if value.is_boolean() {
        return Ok(Value::Boolean(value.is_true()));
    }
    if value.is_int32() {
        return Ok(Value::Integer(value.int32_value(scope).unwrap_or(0) as i64));
    }
    if value.is_number() {
        return Ok(Value::Number(value.number_value(scope).unwrap_or(f64::NAN)));
    }
    if value.is_string() {
        let text = value.to_rust_string_lossy(scope);
        return Ok(Value::String(lua.create_string(&text)?));
    }
    if let Ok(object) = v8::Local::<v8::Object>::try_from(value) {
        return refs::adopt_engine(bridge, lua, scope, object);
    }
    // symbols and the like have no host representation
    Err(BridgeError::Unsupported("this engine value"))
}
