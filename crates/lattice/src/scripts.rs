//! Script autoload. Interpreters are integrator-provided [`ScriptEngine`]s
//! registered by extension; files in `<home>/script/autoload` are handed to
//! the matching engine at startup.

use crate::App;

use lattice_core::script::{ScriptEngine, ScriptHost};

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use log::{info, warn};

#[derive(Default)]
pub(crate) struct Scripts {
    pub(crate) host: ScriptHost,
    /// Extension (without dot) to interpreter.
    engines: HashMap<String, Box<dyn ScriptEngine>>,
}

pub(crate) type ScriptsHandle = Rc<RefCell<Scripts>>;

impl Scripts {
    pub(crate) fn register_engine(&mut self, extension: &str, engine: Box<dyn ScriptEngine>) {
        self.engines.insert(extension.to_owned(), engine);
    }

    pub(crate) fn load(&mut self, path: &Path) -> Result<String, String> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_owned();
        match self.engines.get_mut(&ext) {
            Some(engine) => self.host.load(engine.as_mut(), path),
            None => Err(format!(
                "{}: no interpreter registered for .{} scripts",
                path.display(),
                ext
            )),
        }
    }

    pub(crate) fn unload(&mut self, app: &App, name: &str) -> bool {
        // Find the engine that owns this script by asking each in turn.
        let Some(path) = self.host.path_of(name).map(Path::to_owned) else {
            return false;
        };
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_owned();
        let Some(engine) = self.engines.get_mut(&ext) else {
            return false;
        };
        match self.host.unload(&app.core, engine.as_mut(), name) {
            Some(config_files) => {
                for (file, save) in config_files {
                    if save {
                        // Script config files live next to ours; saving is
                        // the launcher's job since it owns the stores.
                        info!("script {}: config file {} marked for save", name, file);
                    }
                }
                true
            }
            None => false,
        }
    }
}

/// Load everything under `<home>/script/autoload`.
pub(crate) fn autoload(scripts: &ScriptsHandle, home: &Path) {
    let dir = home.join("script").join("autoload");
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match scripts.borrow_mut().load(&path) {
            Ok(name) => info!("autoloaded script {}", name),
            Err(err) => warn!("autoload: {}", err),
        }
    }
}
