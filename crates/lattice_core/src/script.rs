//! The scripting bridge contract. The embedded interpreter is a policy
//! object behind [`ScriptEngine`]; the host hands it a source file, the
//! interpreter drives the file and must call back [`ScriptApi::register`]
//! during load or the script is rejected. Script-registered callbacks go
//! through the hook registry like native code, with the script name as the
//! hook owner, and dispatch marshals values through [`ScriptValue`].

use std::path::{Path, PathBuf};

use log::{error, info};

use crate::hooks::HookStatus;
use crate::Core;

/// Values crossing the host/interpreter boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptValue {
    Str(String),
    Int(i64),
}

impl ScriptValue {
    /// Dispatch-outcome convention: 0 = ok, 1 = ok-eat, negative = error.
    pub fn to_status(&self) -> HookStatus {
        match self {
            ScriptValue::Int(0) => HookStatus::Ok,
            ScriptValue::Int(1) => HookStatus::OkEat,
            ScriptValue::Int(_) => HookStatus::Error,
            ScriptValue::Str(_) => HookStatus::Ok,
        }
    }
}

/// What a script declares about itself when it registers.
#[derive(Debug, Clone)]
pub struct ScriptRegistration {
    pub name: String,
    pub author: String,
    pub version: String,
    pub license: String,
    pub description: String,
    /// Function the host calls on unload.
    pub shutdown_fn: Option<String>,
    pub charset: Option<String>,
}

/// Host surface the interpreter sees while loading a file.
pub trait ScriptApi {
    /// Returns false when the registration is rejected (duplicate call or
    /// duplicate name); the interpreter should abort the load then.
    fn register(&mut self, reg: ScriptRegistration) -> bool;
}

/// An embedded interpreter.
pub trait ScriptEngine {
    fn language(&self) -> &str;

    /// Evaluate the file. Must call `api.register` exactly once for the
    /// load to be accepted.
    fn load(&mut self, path: &Path, api: &mut dyn ScriptApi) -> Result<(), String>;

    /// Call a function of a loaded script.
    fn call(
        &mut self,
        script: &str,
        func: &str,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, String>;

    /// Forget a script's interpreter state.
    fn drop_script(&mut self, script: &str);
}

struct LoadedScript {
    registration: ScriptRegistration,
    path: PathBuf,
    /// Config files created by this script, with the save-on-unload bit.
    config_files: Vec<(String, bool)>,
}

/// Tracks loaded scripts and drives the unload lifecycle.
#[derive(Default)]
pub struct ScriptHost {
    scripts: Vec<LoadedScript>,
}

struct RegisterCollector {
    reg: Option<ScriptRegistration>,
    taken_names: Vec<String>,
}

impl ScriptApi for RegisterCollector {
    fn register(&mut self, reg: ScriptRegistration) -> bool {
        if self.reg.is_some() || self.taken_names.contains(&reg.name) {
            return false;
        }
        self.reg = Some(reg);
        true
    }
}

impl ScriptHost {
    pub fn new() -> ScriptHost {
        ScriptHost::default()
    }

    /// Load a script file. Rejected when the interpreter fails, when the
    /// file never calls `register`, or when the name is already taken.
    pub fn load(&mut self, engine: &mut dyn ScriptEngine, path: &Path) -> Result<String, String> {
        let mut collector = RegisterCollector {
            reg: None,
            taken_names: self.scripts.iter().map(|s| s.registration.name.clone()).collect(),
        };
        engine.load(path, &mut collector)?;
        let Some(registration) = collector.reg else {
            return Err(format!(
                "{}: script did not call register(), load rejected",
                path.display()
            ));
        };
        let name = registration.name.clone();
        info!(
            "loaded {} script {} v{}",
            engine.language(),
            name,
            registration.version
        );
        self.scripts.push(LoadedScript {
            registration,
            path: path.to_owned(),
            config_files: Vec::new(),
        });
        Ok(name)
    }

    /// Record a config file as owned by a script, so unload can hand it
    /// back for saving/dropping.
    pub fn track_config_file(&mut self, script: &str, file: &str, save_on_unload: bool) {
        if let Some(s) = self.scripts.iter_mut().find(|s| s.registration.name == script) {
            s.config_files.push((file.to_owned(), save_on_unload));
        }
    }

    /// Unload a script: shutdown function, then hooks, then buffers, then
    /// interpreter state. Returns the script's config files (name, save
    /// bit) for the caller to save and drop; `None` if no such script.
    pub fn unload(
        &mut self,
        core: &Core,
        engine: &mut dyn ScriptEngine,
        name: &str,
    ) -> Option<Vec<(String, bool)>> {
        let idx = self
            .scripts
            .iter()
            .position(|s| s.registration.name == name)?;

        if let Some(shutdown_fn) = self.scripts[idx].registration.shutdown_fn.clone() {
            if let Err(err) = engine.call(name, &shutdown_fn, &[]) {
                error!("script {}: error in {}: {}", name, shutdown_fn, err);
            }
        }

        core.unhook_owner(name);
        for id in core.buffer_ids() {
            let owned = core.with_buffer(id, |b| b.plugin == name).unwrap_or(false);
            if owned {
                core.buffer_close(id);
            }
        }
        engine.drop_script(name);

        let script = self.scripts.remove(idx);
        info!("unloaded script {}", name);
        Some(script.config_files)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.scripts.iter().any(|s| s.registration.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.scripts
            .iter()
            .map(|s| s.registration.name.clone())
            .collect()
    }

    pub fn path_of(&self, name: &str) -> Option<&Path> {
        self.scripts
            .iter()
            .find(|s| s.registration.name == name)
            .map(|s| s.path.as_path())
    }
}

/// Dispatch a script hook callback. An interpreter error is logged with the
/// script and function name and becomes the neutral error return; it never
/// propagates.
pub fn call_script_status(
    engine: &mut dyn ScriptEngine,
    script: &str,
    func: &str,
    args: &[ScriptValue],
) -> HookStatus {
    match engine.call(script, func, args) {
        Ok(value) => value.to_status(),
        Err(err) => {
            error!("script {}: error in {}: {}", script, func, err);
            HookStatus::Error
        }
    }
}

/// Dispatch a script modifier/info callback. Errors are logged and yield
/// `None` ("unchanged" / "no answer").
pub fn call_script_string(
    engine: &mut dyn ScriptEngine,
    script: &str,
    func: &str,
    args: &[ScriptValue],
) -> Option<String> {
    match engine.call(script, func, args) {
        Ok(ScriptValue::Str(s)) => Some(s),
        Ok(ScriptValue::Int(_)) => None,
        Err(err) => {
            error!("script {}: error in {}: {}", script, func, err);
            None
        }
    }
}
