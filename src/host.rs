//! Host-side facade. The engine's scripting system owns one
//! [`ScriptInstance`] per scripted entity and drives it through the
//! `Start`/`Update`/`Stop` lifecycle, once per frame from a single thread.

use crate::{
    diagnostics::{Diagnostic, Result},
    runtime::Interpreter,
    value::Value,
};

/// The script functions the host invokes, when the script defines them.
const START_HOOK: &str = "Start";
const UPDATE_HOOK: &str = "Update";
const STOP_HOOK: &str = "Stop";

/// One loaded script with its own interpreter; instances share nothing, so
/// many of them can run per frame without coordination.
pub struct ScriptInstance {
    interpreter: Interpreter,
}

impl Default for ScriptInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptInstance {
    pub fn new() -> Self {
        Self {
            interpreter: Interpreter::new(),
        }
    }

    /// Registers a host function before (or after) loading. Only primitive
    /// values cross this boundary.
    pub fn register_native<F>(&mut self, name: &str, arity: Option<usize>, callback: F)
    where
        F: Fn(&[Value]) -> std::result::Result<Value, Diagnostic> + 'static,
    {
        self.interpreter.register_native(name, arity, callback);
    }

    /// Runs the top level of the script, defining its globals and hooks.
    pub fn load(&mut self, source: &str) -> Result<()> {
        self.interpreter.eval_source(source)?;
        Ok(())
    }

    /// Called once after load. A script without a `Start` hook is fine.
    pub fn start(&mut self) -> Result<()> {
        self.call_hook(START_HOOK, &[])
    }

    /// Called once per frame with the frame delta in seconds.
    pub fn update(&mut self, delta_time: f64) -> Result<()> {
        self.call_hook(UPDATE_HOOK, &[Value::Number(delta_time)])
    }

    /// Called once when the entity is despawned or the script unloaded.
    pub fn stop(&mut self) -> Result<()> {
        self.call_hook(STOP_HOOK, &[])
    }

    fn call_hook(&mut self, name: &str, args: &[Value]) -> Result<()> {
        self.interpreter.call_global(name, args)?;
        Ok(())
    }
}
