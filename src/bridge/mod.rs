//! Lua 5.4 <-> V8 reference bridge.
//!
//! One [`Bridge`] per Lua state owns one V8 isolate. Values cross the
//! boundary by copy (primitives) or by reference through wrappers: a host
//! table or function becomes an engine proxy, an engine object becomes a
//! [`JsRef`] userdata, and a given object resolves to the same wrapper on
//! every crossing. Wrapped objects stay alive while either runtime can reach
//! them and are reclaimed once both collectors have let go; the coordination
//! protocol lives in [`lifecycle`].
//!
//! The engine platform is process-global and initialized exactly once; all
//! bridge operations are synchronous and single-threaded, with reentrancy
//! (host calling engine calling host, and so on) handled through nested
//! scopes on the one native stack.

mod config;
mod context;
mod dispatch;
mod error;
mod lifecycle;
mod refs;
mod shim;
mod value;

use std::cell::Cell;
use std::rc::{Rc, Weak};

use mlua::{Lua, Table, Value, WeakLua};
use once_cell::sync::OnceCell;

pub use config::BridgeConfig;
pub use dispatch::JsRef;
pub use error::{BridgeError, JsException, Result};

use refs::{EngineHandle, WrapperRegistry};

static V8_PLATFORM: OnceCell<v8::SharedRef<v8::Platform>> = OnceCell::new();
static V8_FLAGS: OnceCell<String> = OnceCell::new();

/// Initializes the process-wide engine platform. Idempotent; the flag string
/// of the first call wins, later differing flags are ignored with a warning.
pub fn initialize_platform_once(flags: Option<&str>) {
    let mut first = false;
    V8_PLATFORM.get_or_init(|| {
        // gc() must stay available to scripts so collection is forcible
        let mut all_flags = String::from("--expose-gc");
        if let Some(extra) = flags {
            all_flags.push(' ');
            all_flags.push_str(extra);
        }
        v8::V8::set_flags_from_string(&all_flags);
        let _ = V8_FLAGS.set(flags.unwrap_or_default().to_string());
        let platform = v8::new_default_platform(0, false).make_shared();
        v8::V8::initialize_platform(platform.clone());
        v8::V8::initialize();
        first = true;
        platform
    });
    if !first {
        if let Some(requested) = flags {
            if V8_FLAGS.get().map(String::as_str) != Some(requested) {
                log::warn!("engine flags are fixed at first use; ignoring {requested:?}");
            }
        }
    }
}

pub fn is_platform_initialized() -> bool {
    V8_PLATFORM.get().is_some()
}

/// Shared bridge state. Reached from the host through [`Bridge`] handles and
/// from engine callbacks through a weak isolate slot.
pub(crate) struct BridgeInner {
    pub(crate) lua: WeakLua,
    pub(crate) wrappers: WrapperRegistry,
    refs_key: mlua::RegistryKey,
    cache_key: mlua::RegistryKey,
    pub(crate) proxy_template: v8::Global<v8::ObjectTemplate>,
    pub(crate) main_context: v8::Global<v8::Context>,
    depth: Cell<usize>,
    isolate_ptr: *mut v8::Isolate,
    // declared last: every engine handle above must drop before the isolate
    _isolate: v8::OwnedIsolate,
}

/// Marks an engine-initiated activation while a callback runs, so nested
/// host-to-engine calls reenter through a callback scope.
pub(crate) struct EntryGuard<'a> {
    depth: &'a Cell<usize>,
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

impl BridgeInner {
    pub(crate) fn lua(&self) -> Result<Lua> {
        self.lua.try_upgrade().ok_or(BridgeError::HostGone)
    }

    pub(crate) fn refs_table(&self, lua: &Lua) -> Result<Table> {
        Ok(lua.registry_value(&self.refs_key)?)
    }

    pub(crate) fn cache_table(&self, lua: &Lua) -> Result<Table> {
        Ok(lua.registry_value(&self.cache_key)?)
    }

    pub(crate) fn entry_guard(&self) -> EntryGuard<'_> {
        self.depth.set(self.depth.get() + 1);
        EntryGuard { depth: &self.depth }
    }

    pub(crate) fn with_isolate<R>(&self, f: impl FnOnce(&mut v8::Isolate) -> R) -> R {
        // the isolate is owned by this state and never moves; operations are
        // single-threaded by construction
        unsafe { f(&mut *self.isolate_ptr) }
    }

    /// Opens a handle scope and runs `f` inside it. The first activation on
    /// the stack opens a plain scope; nested activations (host code called
    /// from an engine callback calling back in) go through a callback scope.
    pub(crate) fn enter<R>(
        &self,
        f: impl FnOnce(&mut v8::HandleScope<'_, ()>) -> Result<R>,
    ) -> Result<R> {
        let nested = self.depth.get() > 0;
        let _guard = self.entry_guard();
        if nested {
            let mut scope = unsafe { v8::CallbackScope::new(&mut *self.isolate_ptr) };
            f(&mut scope)
        } else {
            let isolate = unsafe { &mut *self.isolate_ptr };
            let mut scope = v8::HandleScope::new(isolate);
            f(&mut scope)
        }
    }
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        let live = self.wrappers.len();
        if live > 0 {
            log::warn!("bridge shut down with {live} live wrapper(s)");
        }
        for wrapper in self.wrappers.drain() {
            *wrapper.handle.borrow_mut() = EngineHandle::Empty;
            wrapper.context.borrow_mut().take();
        }
    }
}

/// A handle on the bridge attached to one Lua state.
///
/// Cloning is cheap; all clones address the same isolate and wrapper tables.
#[derive(Clone)]
pub struct Bridge {
    inner: Rc<BridgeInner>,
}

impl Bridge {
    /// Attaches a bridge to `lua`, or returns the one already attached.
    ///
    /// The first bridge in the process fixes the engine flags; per-bridge
    /// heap limits come from `config`.
    pub fn new(lua: &Lua, config: BridgeConfig) -> Result<Bridge> {
        if let Some(existing) = lua.app_data_ref::<Bridge>() {
            return Ok(existing.clone());
        }
        config.validate()?;
        initialize_platform_once(config.engine_flags.as_deref());

        let mut params = v8::CreateParams::default();
        if let Some(max) = config.max_heap_size {
            params = params.heap_limits(config.initial_heap_size.unwrap_or(0), max);
        }
        let mut isolate = v8::Isolate::new(params);
        let isolate_ptr: *mut v8::Isolate = &mut *isolate;

        let (proxy_template, main_context) = {
            let scope = &mut v8::HandleScope::new(&mut isolate);
            let template = dispatch::build_proxy_template(scope);
            let template = v8::Global::new(scope, template);
            let context = v8::Context::new(scope, v8::ContextOptions::default());
            let context = v8::Global::new(scope, context);
            (template, context)
        };

        let refs_table = lua.create_table()?;
        let cache_table = refs::make_weak_cache(lua)?;
        let refs_key = lua.create_registry_value(refs_table)?;
        let cache_key = lua.create_registry_value(cache_table)?;

        let inner = Rc::new(BridgeInner {
            lua: lua.weak(),
            wrappers: WrapperRegistry::default(),
            refs_key,
            cache_key,
            proxy_template,
            main_context,
            depth: Cell::new(0),
            isolate_ptr,
            _isolate: isolate,
        });
        inner.with_isolate(|isolate| {
            isolate.set_slot::<Weak<BridgeInner>>(Rc::downgrade(&inner));
        });

        let bridge = Bridge { inner };
        lua.set_app_data(bridge.clone());
        log::trace!("bridge attached");
        Ok(bridge)
    }

    /// Compiles and runs a script. `chunk_name` feeds the script origin used
    /// in stack traces and diagnostics; `target` selects the context, the
    /// bridge's own realm by default.
    pub fn eval(
        &self,
        source: &str,
        chunk_name: Option<&str>,
        target: Option<&JsRef>,
    ) -> Result<Value> {
        context::eval(&self.inner, source, chunk_name, target)
    }

    /// Creates a fresh context, optionally shallow-seeding its globals.
    pub fn create_context(&self, seed: Option<Value>) -> Result<JsRef> {
        context::create_context(&self.inner, seed)
    }

    /// Creates a sandbox whose global delegates to `backing`.
    pub fn create_sandbox(&self, backing: Table) -> Result<JsRef> {
        context::create_sandbox(&self.inner, backing)
    }

    /// Installs the `binding` syscall shim into the target context.
    pub fn install_bindings(&self, target: Option<&JsRef>) -> Result<()> {
        shim::install(&self.inner, target)
    }

    /// A handle on the bridge realm's global object.
    pub fn global(&self) -> Result<JsRef> {
        let lua = self.inner.lua()?;
        self.inner.enter(|scope| {
            let context = v8::Local::new(scope, &self.inner.main_context);
            let scope = &mut v8::ContextScope::new(scope, context);
            let global = context.global(scope);
            match value::to_host(&self.inner, &lua, scope, global.into())? {
                Value::UserData(userdata) => Ok(userdata.borrow::<JsRef>()?.clone()),
                _ => Err(BridgeError::Released),
            }
        })
    }

    /// Number of live wrappers, for leak diagnostics.
    pub fn live_wrappers(&self) -> usize {
        self.inner.wrappers.len()
    }

    /// Asks the engine for a full collection pass.
    pub fn collect_engine_garbage(&self) {
        self.inner
            .with_isolate(|isolate| isolate.low_memory_notification());
    }

    /// Builds the Lua-facing module table: `eval`, `context`, `sandbox`,
    /// `bindings` and `version`.
    pub fn exports(&self, lua: &Lua) -> Result<Table> {
        let table = lua.create_table()?;

        let bridge = self.clone();
        table.set(
            "eval",
            lua.create_function(
                move |_,
                      (source, chunk_name, target): (
                    String,
                    Option<String>,
                    Option<mlua::AnyUserData>,
                )| {
                    let target = match &target {
                        Some(userdata) => Some(userdata.borrow::<JsRef>()?),
                        None => None,
                    };
                    Ok(bridge.eval(&source, chunk_name.as_deref(), target.as_deref())?)
                },
            )?,
        )?;

        let bridge = self.clone();
        table.set(
            "context",
            lua.create_function(move |lua, seed: Option<Value>| {
                let reference = bridge.create_context(seed)?;
                Ok(reference.to_lua(lua)?)
            })?,
        )?;

        let bridge = self.clone();
        table.set(
            "sandbox",
            lua.create_function(move |lua, backing: Table| {
                let reference = bridge.create_sandbox(backing)?;
                Ok(reference.to_lua(lua)?)
            })?,
        )?;

        let bridge = self.clone();
        table.set(
            "bindings",
            lua.create_function(move |_, target: Option<mlua::AnyUserData>| {
                let target = match &target {
                    Some(userdata) => Some(userdata.borrow::<JsRef>()?),
                    None => None,
                };
                bridge.install_bindings(target.as_deref())?;
                Ok(())
            })?,
        )?;

        table.set("version", v8::V8::get_version())?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge_fixture() -> (Lua, Bridge) {
        let lua = Lua::new();
        let bridge = Bridge::new(&lua, BridgeConfig::default()).unwrap();
        (lua, bridge)
    }

    fn collect_host(lua: &Lua) {
        lua.gc_collect().unwrap();
        lua.gc_collect().unwrap();
    }

    fn as_ref(value: &Value) -> JsRef {
        match value {
            Value::UserData(userdata) => userdata.borrow::<JsRef>().unwrap().clone(),
            other => panic!("expected a bridge reference, got {other:?}"),
        }
    }

    #[test]
    fn test_platform_initializes_once() {
        let (_lua, _bridge) = bridge_fixture();
        assert!(is_platform_initialized());
        // a second call with different flags must not disturb anything
        initialize_platform_once(Some("--max-old-space-size=32"));
        assert!(is_platform_initialized());
    }

    #[test]
    fn test_attach_is_idempotent_per_state() {
        let lua = Lua::new();
        let first = Bridge::new(&lua, BridgeConfig::default()).unwrap();
        let second = Bridge::new(&lua, BridgeConfig::default()).unwrap();
        assert!(Rc::ptr_eq(&first.inner, &second.inner));
    }

    #[test]
    fn test_eval_returns_primitives() {
        let (_lua, bridge) = bridge_fixture();
        assert_eq!(bridge.eval("6 * 7", None, None).unwrap(), Value::Integer(42));
        assert_eq!(
            bridge.eval("1.5 + 1", None, None).unwrap(),
            Value::Number(2.5)
        );
        assert_eq!(
            bridge.eval("true && false", None, None).unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(bridge.eval("undefined", None, None).unwrap(), Value::Nil);
        assert_eq!(bridge.eval("null", None, None).unwrap(), Value::Nil);
        let text = bridge.eval("'ab' + 'c'", None, None).unwrap();
        assert_eq!(text.as_str().as_deref(), Some("abc"));
    }

    #[test]
    fn test_primitive_round_trip_through_globals() {
        let (lua, bridge) = bridge_fixture();
        let global = bridge.global().unwrap();
        global.set("n", 17).unwrap();
        global.set("f", 2.25).unwrap();
        global.set("s", "hi").unwrap();
        global.set("b", true).unwrap();
        assert_eq!(global.get("n").unwrap(), Value::Integer(17));
        assert_eq!(global.get("f").unwrap(), Value::Number(2.25));
        assert_eq!(
            global.get("s").unwrap(),
            Value::String(lua.create_string("hi").unwrap())
        );
        assert_eq!(global.get("b").unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_host_object_identity_preserved() {
        let (lua, bridge) = bridge_fixture();
        let global = bridge.global().unwrap();
        let table = lua.create_table().unwrap();
        table.set("tag", "original").unwrap();
        global.set("a", &table).unwrap();
        global.set("b", &table).unwrap();
        assert_eq!(
            bridge.eval("a === b", None, None).unwrap(),
            Value::Boolean(true)
        );
        // crossing back unwraps to the very same table
        let back = global.get("a").unwrap();
        assert_eq!(back, Value::Table(table));
    }

    #[test]
    fn test_engine_object_identity_preserved() {
        let (_lua, bridge) = bridge_fixture();
        bridge.eval("globalThis.o = { x: 1 }", None, None).unwrap();
        let first = bridge.eval("o", None, None).unwrap();
        let second = bridge.eval("o", None, None).unwrap();
        assert!(as_ref(&first).ptr_eq(&as_ref(&second)));
        assert_eq!(first, second);
    }

    #[test]
    fn test_engine_object_access_from_host() {
        let (_lua, bridge) = bridge_fixture();
        let object = bridge
            .eval("({ answer: 42, nested: { deep: true } })", None, None)
            .unwrap();
        let object = as_ref(&object);
        assert_eq!(object.get("answer").unwrap(), Value::Integer(42));
        let nested = object.get("nested").unwrap();
        assert_eq!(as_ref(&nested).get("deep").unwrap(), Value::Boolean(true));
        object.set("answer", 43).unwrap();
        assert_eq!(object.get("answer").unwrap(), Value::Integer(43));
        assert!(object.delete("answer").unwrap());
        assert_eq!(object.get("answer").unwrap(), Value::Nil);
    }

    #[test]
    fn test_array_length_and_elements() {
        let (_lua, bridge) = bridge_fixture();
        let array = bridge.eval("[10, 20, 30]", None, None).unwrap();
        let array = as_ref(&array);
        assert_eq!(array.length().unwrap(), Value::Integer(3));
        let elements = array.elements().unwrap();
        assert_eq!(
            elements,
            vec![Value::Integer(10), Value::Integer(20), Value::Integer(30)]
        );
    }

    #[test]
    fn test_entries_preserve_engine_order() {
        let (_lua, bridge) = bridge_fixture();
        let object = bridge
            .eval("({ first: 1, second: 2, third: 3 })", None, None)
            .unwrap();
        let entries = as_ref(&object).entries().unwrap();
        let keys: Vec<&str> = entries.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_call_and_construct() {
        let (_lua, bridge) = bridge_fixture();
        let double = bridge.eval("(function (n) { return n * 2 })", None, None).unwrap();
        let double = as_ref(&double);
        assert_eq!(
            double.call(vec![Value::Integer(21)]).unwrap(),
            Value::Integer(42)
        );

        let object = bridge
            .eval("({ v: 7, read() { return this.v } })", None, None)
            .unwrap();
        let object = as_ref(&object);
        let read = as_ref(&object.get("read").unwrap());
        let result = read
            .call_with(bridge.eval("o2 = { v: 9 }; o2", None, None).unwrap(), vec![])
            .unwrap();
        assert_eq!(result, Value::Integer(9));

        let point = bridge
            .eval("(function Point(x) { this.x = x })", None, None)
            .unwrap();
        let instance = as_ref(&point).construct(vec![Value::Integer(3)]).unwrap();
        assert_eq!(as_ref(&instance).get("x").unwrap(), Value::Integer(3));
    }

    #[test]
    fn test_wrapped_lua_function_and_multi_return() {
        let (lua, bridge) = bridge_fixture();
        let global = bridge.global().unwrap();
        let double = lua
            .create_function(|_, n: i64| Ok(n * 2))
            .unwrap();
        let spread = lua
            .create_function(|_, ()| Ok((1, 2, 3)))
            .unwrap();
        let silent = lua.create_function(|_, ()| Ok(())).unwrap();
        global.set("double", double).unwrap();
        global.set("spread", spread).unwrap();
        global.set("silent", silent).unwrap();

        assert_eq!(
            bridge.eval("double(21)", None, None).unwrap(),
            Value::Integer(42)
        );
        // many results pack into an array, none becomes undefined
        assert_eq!(
            bridge.eval("spread()[1]", None, None).unwrap(),
            Value::Integer(2)
        );
        assert_eq!(
            bridge.eval("spread().length", None, None).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(bridge.eval("silent()", None, None).unwrap(), Value::Nil);
        // the same function wraps to the same engine object
        assert_eq!(
            bridge.eval("double === double", None, None).unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn test_lua_error_crosses_as_engine_exception() {
        let (lua, bridge) = bridge_fixture();
        let global = bridge.global().unwrap();
        let failing = lua
            .create_function(|_, ()| -> mlua::Result<()> {
                Err(mlua::Error::RuntimeError("kaput".into()))
            })
            .unwrap();
        global.set("failing", failing).unwrap();
        let caught = bridge
            .eval("try { failing() } catch (e) { e.message }", None, None)
            .unwrap();
        let caught = caught.as_str().map(|s| s.to_string()).unwrap_or_default();
        assert!(caught.contains("kaput"), "message was {caught:?}");
    }

    #[test]
    fn test_engine_exception_carries_trace() {
        let (_lua, bridge) = bridge_fixture();
        let err = bridge
            .eval(
                "(function boom() { throw new Error('kaboom') })()",
                Some("trace.js"),
                None,
            )
            .unwrap_err();
        let BridgeError::Exception(exception) = err else {
            panic!("expected an exception");
        };
        assert!(exception.message.contains("kaboom"));
        assert!(!exception.trace.is_empty());
        assert!(exception.trace.contains("boom"), "trace was {:?}", exception.trace);
    }

    #[test]
    fn test_syntax_error_diagnostics() {
        let (_lua, bridge) = bridge_fixture();
        let err = bridge
            .eval("\nlocal x = 1", Some("boot.js"), None)
            .unwrap_err();
        let BridgeError::Exception(exception) = err else {
            panic!("expected an exception");
        };
        assert!(exception.message.contains("SyntaxError"));
        assert_eq!(exception.resource.as_deref(), Some("boot.js"));
        assert_eq!(exception.line, Some(2));
        assert!(exception.source_line.as_deref().unwrap_or("").contains("local"));
    }

    #[test]
    fn test_exception_from_wrapped_function_call() {
        let (_lua, bridge) = bridge_fixture();
        let thrower = bridge
            .eval("(function nope() { throw new Error('no') })", None, None)
            .unwrap();
        let err = as_ref(&thrower).call(vec![]).unwrap_err();
        let BridgeError::Exception(exception) = err else {
            panic!("expected an exception");
        };
        assert!(!exception.trace.is_empty());
    }

    #[test]
    fn test_context_isolation_and_seeding() {
        let (lua, bridge) = bridge_fixture();
        let seed = lua.create_table().unwrap();
        seed.set("a", 1).unwrap();
        let context = bridge.create_context(Some(Value::Table(seed))).unwrap();
        assert_eq!(
            bridge.eval("a", None, Some(&context)).unwrap(),
            Value::Integer(1)
        );
        // the seed was copied, not shared with the bridge realm
        let kind = bridge.eval("typeof a", None, None).unwrap();
        assert_eq!(kind.as_str().as_deref(), Some("undefined"));
    }

    #[test]
    fn test_context_seeded_from_other_context() {
        let (_lua, bridge) = bridge_fixture();
        let first = bridge.create_context(None).unwrap();
        bridge
            .eval("globalThis.shared = 5", None, Some(&first))
            .unwrap();
        let global_value = bridge.eval("globalThis", None, Some(&first)).unwrap();
        let second = bridge.create_context(Some(global_value)).unwrap();
        assert_eq!(
            bridge.eval("shared", None, Some(&second)).unwrap(),
            Value::Integer(5)
        );
    }

    #[test]
    fn test_sandbox_interception_both_ways() {
        let (lua, bridge) = bridge_fixture();
        let backing = lua.create_table().unwrap();
        backing.set("greeting", "hello").unwrap();
        let sandbox = bridge.create_sandbox(backing.clone()).unwrap();

        // reads come from the table
        let greeting = bridge.eval("greeting", None, Some(&sandbox)).unwrap();
        assert_eq!(greeting.as_str().as_deref(), Some("hello"));

        // writes land in the table
        bridge
            .eval("greeting = 'bye'; count = 2", None, Some(&sandbox))
            .unwrap();
        assert_eq!(backing.get::<String>("greeting").unwrap(), "bye");
        assert_eq!(backing.get::<i64>("count").unwrap(), 2);

        // host-side writes are visible to scripts immediately
        backing.set("fresh", 9).unwrap();
        assert_eq!(
            bridge.eval("fresh", None, Some(&sandbox)).unwrap(),
            Value::Integer(9)
        );
    }

    #[test]
    fn test_sandbox_enumeration() {
        let (lua, bridge) = bridge_fixture();
        let backing = lua.create_table().unwrap();
        backing.set("alpha", 1).unwrap();
        backing.set("beta", 2).unwrap();
        let sandbox = bridge.create_sandbox(backing).unwrap();
        let joined = bridge
            .eval(
                "Object.keys(globalThis).sort().join(',')",
                None,
                Some(&sandbox),
            )
            .unwrap();
        let joined = joined.as_str().map(|s| s.to_string()).unwrap_or_default();
        assert!(joined.contains("alpha"), "keys were {joined:?}");
        assert!(joined.contains("beta"), "keys were {joined:?}");
    }

    #[test]
    fn test_sandbox_keeps_engine_builtins() {
        let (lua, bridge) = bridge_fixture();
        let backing = lua.create_table().unwrap();
        backing.set("limit", 10).unwrap();
        let sandbox = bridge.create_sandbox(backing.clone()).unwrap();

        // a backing-table miss falls through to the real global behind the
        // proxy, so the standard library stays reachable
        assert_eq!(
            bridge
                .eval("Math.min(limit, 99)", None, Some(&sandbox))
                .unwrap(),
            Value::Integer(10)
        );
        let json = bridge
            .eval("JSON.stringify({ n: limit })", None, Some(&sandbox))
            .unwrap();
        assert_eq!(json.as_str().as_deref(), Some("{\"n\":10}"));
        let keys = bridge
            .eval("typeof Object.keys", None, Some(&sandbox))
            .unwrap();
        assert_eq!(keys.as_str().as_deref(), Some("function"));

        // a backing entry shadows the builtin of the same name
        backing.set("Math", "shadowed").unwrap();
        let shadowed = bridge.eval("Math", None, Some(&sandbox)).unwrap();
        assert_eq!(shadowed.as_str().as_deref(), Some("shadowed"));
    }

    #[test]
    fn test_sandbox_identity_on_reuse() {
        let (lua, bridge) = bridge_fixture();
        let backing = lua.create_table().unwrap();
        let first = bridge.create_sandbox(backing.clone()).unwrap();
        let second = bridge.create_sandbox(backing).unwrap();
        assert!(first.ptr_eq(&second));
    }

    #[test]
    fn test_metamethods_from_lua() {
        let (lua, bridge) = bridge_fixture();
        let object = bridge
            .eval("({ x: 1, y: 2, z: 3 })", None, None)
            .unwrap();
        lua.globals().set("obj", object).unwrap();
        let x: i64 = lua.load("return obj.x").eval().unwrap();
        assert_eq!(x, 1);
        lua.load("obj.x = 10").exec().unwrap();
        let x: i64 = lua.load("return obj.x").eval().unwrap();
        assert_eq!(x, 10);
        let count: i64 = lua
            .load("local n = 0 for k, v in pairs(obj) do n = n + 1 end return n")
            .eval()
            .unwrap();
        assert_eq!(count, 3);

        let array = bridge.eval("[1, 2, 3, 4]", None, None).unwrap();
        lua.globals().set("arr", array).unwrap();
        let len: i64 = lua.load("return #arr").eval().unwrap();
        assert_eq!(len, 4);
        // raw index passthrough: engine arrays stay 0-based
        let first: i64 = lua.load("return arr[0]").eval().unwrap();
        assert_eq!(first, 1);

        let double = bridge.eval("(function (n) { return n * 2 })", None, None).unwrap();
        lua.globals().set("double", double).unwrap();
        let result: i64 = lua.load("return double(5)").eval().unwrap();
        assert_eq!(result, 10);
    }

    #[test]
    fn test_wrapped_userdata_indexes_through_metamethods() {
        use mlua::{MetaMethod, UserData, UserDataMethods};

        struct Gauge {
            level: Cell<i64>,
        }

        impl UserData for Gauge {
            fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
                methods.add_meta_method(MetaMethod::Index, |_, this, key: String| {
                    Ok(match key.as_str() {
                        "level" => Value::Integer(this.level.get()),
                        _ => Value::Nil,
                    })
                });
                methods.add_meta_method(
                    MetaMethod::NewIndex,
                    |_, this, (key, value): (String, i64)| {
                        if key == "level" {
                            this.level.set(value);
                        }
                        Ok(())
                    },
                );
            }
        }

        let (lua, bridge) = bridge_fixture();
        let gauge = lua.create_userdata(Gauge { level: Cell::new(7) }).unwrap();
        let global = bridge.global().unwrap();
        global.set("gauge", gauge).unwrap();
        assert_eq!(
            bridge.eval("gauge.level", None, None).unwrap(),
            Value::Integer(7)
        );
        bridge.eval("gauge.level = 9", None, None).unwrap();
        assert_eq!(
            bridge.eval("gauge.level", None, None).unwrap(),
            Value::Integer(9)
        );
    }

    #[test]
    fn test_tostring_rendering() {
        let (lua, bridge) = bridge_fixture();
        let context = bridge.create_context(None).unwrap();
        assert!(context.render().unwrap().starts_with("js<*context>"));
        let backing = lua.create_table().unwrap();
        let sandbox = bridge.create_sandbox(backing).unwrap();
        assert!(sandbox.render().unwrap().starts_with("js<*sandbox>"));
        let error = bridge.eval("new Error('shown')", None, None).unwrap();
        let rendered = as_ref(&error).render().unwrap();
        assert!(rendered.contains("shown"), "rendered {rendered:?}");
    }

    #[test]
    fn test_unsupported_values_are_rejected() {
        let (lua, bridge) = bridge_fixture();
        let global = bridge.global().unwrap();
        let thread = lua
            .create_thread(lua.create_function(|_, ()| Ok(())).unwrap())
            .unwrap();
        let err = global.set("t", Value::Thread(thread)).unwrap_err();
        assert!(matches!(err, BridgeError::Unsupported(_)));
    }

    #[test]
    fn test_resurrection_and_unresurrection() {
        let (lua, bridge) = bridge_fixture();
        let context = bridge.create_context(None).unwrap();
        bridge
            .eval("globalThis.x = 42", None, Some(&context))
            .unwrap();
        let wrapper = context.wrapper.clone();

        // park the context global in the bridge realm so the engine still
        // reaches it after the host lets go
        let global = bridge.global().unwrap();
        let context_value = bridge.eval("globalThis", None, Some(&context)).unwrap();
        global.set("saved", context_value).unwrap();

        drop(context);
        collect_host(&lua);
        assert!(wrapper.resurrected.get());
        assert!(!wrapper.js_collected.get());

        // the engine hands the realm back across the boundary
        let restored = global.get("saved").unwrap();
        let restored = as_ref(&restored);
        assert!(!wrapper.resurrected.get());
        assert!(Rc::ptr_eq(&restored.wrapper, &wrapper));
        assert_eq!(
            bridge.eval("x", None, Some(&restored)).unwrap(),
            Value::Integer(42)
        );

        // the finalizer pending from resurrection was cancelled; later
        // collections must not reclaim the now-Live wrapper
        for _ in 0..3 {
            bridge.collect_engine_garbage();
        }
        assert!(!wrapper.js_collected.get());
        assert!(!wrapper.resurrected.get());
        assert_eq!(
            bridge.eval("x + 1", None, Some(&restored)).unwrap(),
            Value::Integer(43)
        );
    }

    #[test]
    fn test_eventual_collection_of_abandoned_context() {
        let (lua, bridge) = bridge_fixture();
        let baseline = bridge.live_wrappers();
        let context = bridge.create_context(None).unwrap();
        let wrapper = context.wrapper.clone();
        assert_eq!(bridge.live_wrappers(), baseline + 1);

        drop(context);
        collect_host(&lua);
        assert!(wrapper.resurrected.get());
        assert_eq!(bridge.live_wrappers(), baseline + 1);

        for _ in 0..3 {
            bridge.collect_engine_garbage();
        }
        assert!(wrapper.js_collected.get());
        assert_eq!(bridge.live_wrappers(), baseline);
    }

    #[test]
    fn test_host_proxy_collected_when_engine_forgets() {
        let (lua, bridge) = bridge_fixture();
        let global = bridge.global().unwrap();
        let baseline = bridge.live_wrappers();
        let table = lua.create_table().unwrap();
        global.set("temp", &table).unwrap();
        assert_eq!(bridge.live_wrappers(), baseline + 1);

        bridge.eval("delete globalThis.temp", None, None).unwrap();
        for _ in 0..3 {
            bridge.collect_engine_garbage();
        }
        assert_eq!(bridge.live_wrappers(), baseline);
        // the table itself is untouched by reclamation
        table.set("still", "usable").unwrap();
    }

    #[test]
    fn test_shim_exposes_process_facts() {
        let (_lua, bridge) = bridge_fixture();
        bridge.install_bindings(None).unwrap();
        assert_eq!(
            bridge.eval("binding.pid", None, None).unwrap(),
            Value::Integer(std::process::id() as i64)
        );
        let platform = bridge.eval("binding.platform", None, None).unwrap();
        assert_eq!(platform.as_str().as_deref(), Some(std::env::consts::OS));
        let cwd = bridge.eval("binding.getcwd()", None, None).unwrap();
        assert!(cwd.as_str().is_some());
        let version = bridge.eval("binding.version", None, None).unwrap();
        assert!(version.as_str().is_some());
    }

    #[test]
    fn test_shim_errno_error_objects() {
        let (_lua, bridge) = bridge_fixture();
        bridge.install_bindings(None).unwrap();
        let errsym = bridge
            .eval(
                "binding.stat('/definitely/not/here').errsym",
                None,
                None,
            )
            .unwrap();
        assert_eq!(errsym.as_str().as_deref(), Some("ENOENT"));
        let errcode = bridge
            .eval(
                "binding.stat('/definitely/not/here').errcode === binding.consts.ENOENT",
                None,
                None,
            )
            .unwrap();
        assert_eq!(errcode, Value::Boolean(true));
        let syscall = bridge
            .eval("binding.stat('/definitely/not/here').syscall", None, None)
            .unwrap();
        assert_eq!(syscall.as_str().as_deref(), Some("stat"));
    }

    #[test]
    fn test_shim_file_round_trip() {
        let (_lua, bridge) = bridge_fixture();
        bridge.install_bindings(None).unwrap();
        let script = r#"
            const path = '/tmp/lv8-shim-test-' + binding.pid;
            const fd = binding.open(path, binding.consts.O_RDWR | binding.consts.O_CREAT | binding.consts.O_TRUNC);
            binding.write(fd, 'payload');
            binding.lseek(fd, 0, binding.consts.SEEK_SET);
            const buf = binding.read(fd, 64);
            binding.close(fd);
            const size = binding.stat(path).size;
            binding.unlink(path);
            size
        "#;
        assert_eq!(
            bridge.eval(script, Some("shim.js"), None).unwrap(),
            Value::Integer(7)
        );
    }

    #[test]
    fn test_shim_read_length_is_bounded() {
        let (_lua, bridge) = bridge_fixture();
        bridge.install_bindings(None).unwrap();
        let oversized = bridge
            .eval("binding.read(0, 1e15).errsym", None, None)
            .unwrap();
        assert_eq!(oversized.as_str().as_deref(), Some("EINVAL"));
        let negative = bridge
            .eval("binding.read(0, -1).errsym", None, None)
            .unwrap();
        assert_eq!(negative.as_str().as_deref(), Some("EINVAL"));
    }

    #[test]
    fn test_shim_extended_file_calls() {
        let (_lua, bridge) = bridge_fixture();
        bridge.install_bindings(None).unwrap();
        let script = r#"
            const path = '/tmp/lv8-shim-ext-' + binding.pid;
            const fd = binding.open(path, binding.consts.O_RDWR | binding.consts.O_CREAT | binding.consts.O_TRUNC);
            binding.pwrite(fd, 'abcdef', 0);
            const head = binding.pread(fd, 3, 0);
            binding.ftruncate(fd, 4);
            const size = binding.fstat(fd).size;
            binding.chmod(path, 0o600);
            const mode = binding.stat(path).mode & 0o777;
            const lnk = path + '.lnk';
            binding.symlink(path, lnk);
            const target = binding.readlink(lnk);
            const kind = binding.lstat(lnk).mode & binding.consts.S_IFMT;
            binding.unlink(lnk);
            binding.close(fd);
            binding.unlink(path);
            [head.byteLength, size, mode, target === path, kind === binding.consts.S_IFLNK]
        "#;
        let result = bridge.eval(script, Some("shim-ext.js"), None).unwrap();
        let elements = as_ref(&result).elements().unwrap();
        assert_eq!(
            elements,
            vec![
                Value::Integer(3),
                Value::Integer(4),
                Value::Integer(0o600),
                Value::Boolean(true),
                Value::Boolean(true),
            ]
        );
    }

    #[test]
    fn test_lua_module_exports() {
        let (lua, bridge) = bridge_fixture();
        let exports = bridge.exports(&lua).unwrap();
        lua.globals().set("js", exports).unwrap();
        let sum: i64 = lua.load("return js.eval('2 + 3')").eval().unwrap();
        assert_eq!(sum, 5);
        let answer: i64 = lua
            .load(
                r#"
                local ctx = js.context({ seeded = 40 })
                return js.eval('seeded + 2', 'mod.js', ctx)
                "#,
            )
            .eval()
            .unwrap();
        assert_eq!(answer, 42);
        let greeting: String = lua
            .load(
                r#"
                local env = { word = 'hi' }
                local sb = js.sandbox(env)
                return js.eval("word + '!'", nil, sb)
                "#,
            )
            .eval()
            .unwrap();
        assert_eq!(greeting, "hi!");
    }
}
