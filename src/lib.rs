//! lv8: a reference bridge between Lua 5.4 and the V8 JavaScript engine.
//!
//! Attach a [`Bridge`] to a Lua state, then move values across the boundary:
//! primitives convert by value, tables and functions cross by reference with
//! identity preserved in both directions. Scripts run in the bridge's own
//! realm, in fresh contexts, or in sandboxes backed by Lua tables.
//!
//! ```no_run
//! use mlua::Lua;
//! use lv8::{Bridge, BridgeConfig};
//!
//! # fn main() -> lv8::Result<()> {
//! let lua = Lua::new();
//! let bridge = Bridge::new(&lua, BridgeConfig::default())?;
//! let answer = bridge.eval("6 * 7", Some("answer.js"), None)?;
//! assert_eq!(answer, mlua::Value::Integer(42));
//!
//! // expose the bridge to Lua code as a module table
//! lua.globals().set("js", bridge.exports(&lua)?)?;
//! lua.load("print(js.eval('1 + 1'))").exec()?;
//! # Ok(())
//! # }
//! ```

mod bridge;

pub use bridge::{
    initialize_platform_once, is_platform_initialized, Bridge, BridgeConfig, BridgeError,
    JsException, JsRef, Result,
};
