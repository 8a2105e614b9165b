//! Best-effort on-disk persistence for writable parameters across
//! restarts: load whatever validates, drop the rest with a warning,
//! and save atomically, but only once there is nothing still pending
//! in the write queue.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;

use frappy_datatypes::Value;

use crate::module::Module;

/// Per-parameter persistence mode, mirroring SECoP's
/// `persistent` property: `Off` never loads or saves, `On` loads at
/// startup but never auto-saves, `Auto` also saves on every value
/// change once the write queue has drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistentMode {
    #[default]
    Off,
    On,
    Auto,
}

/// A JSON file backing one module's persisted parameters.
pub struct PersistentStore {
    path: PathBuf,
}

impl PersistentStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        PersistentStore { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file and parse it as a flat `{parameter: value}` JSON
    /// object. Any failure — missing file, malformed JSON, wrong shape —
    /// is logged and treated as "nothing persisted yet", never fatal to
    /// module construction.
    #[must_use]
    pub fn load_raw(&self) -> IndexMap<String, serde_json::Value> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return IndexMap::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not read persistence file");
                return IndexMap::new();
            }
        };
        match serde_json::from_str::<serde_json::Value>(&contents) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            Ok(_) => {
                tracing::warn!(path = %self.path.display(), "persistence file is not a JSON object");
                IndexMap::new()
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not parse persistence file");
                IndexMap::new()
            }
        }
    }

    /// Write `data` atomically: serialize to a temp file in the same
    /// directory, then rename over the target. Skips the write entirely
    /// if the serialized content is unchanged from what's already on
    /// disk, so a quiescent module doesn't keep touching its own file's
    /// mtime.
    pub fn atomic_save(&self, data: &IndexMap<String, serde_json::Value>) -> io::Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        if let Ok(existing) = fs::read_to_string(&self.path) {
            if existing == serialized {
                return Ok(());
            }
        }
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        io::Write::write_all(&mut tmp, serialized.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Captures each persistent parameter's value at construction time,
/// before any persisted override is applied, so `factory_reset` has
/// something to restore.
#[derive(Debug, Clone, Default)]
pub struct FactoryDefaults(IndexMap<String, Value>);

impl FactoryDefaults {
    #[must_use]
    pub fn capture(module: &Module, persistent_params: &[String]) -> Self {
        let mut map = IndexMap::new();
        for name in persistent_params {
            if let Some(v) = module.current_value(name) {
                map.insert(name.clone(), v);
            }
        }
        FactoryDefaults(map)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }
}

/// Load persisted values and queue each one that still validates
/// against its parameter's datatype as a pending write, exactly like
/// a node's startup path and a `loadParameters()`-style recovery API.
/// Called both at construction and whenever an operator wants to
/// re-apply the on-disk state without restarting the node.
pub fn load_parameters(module: &Module, store: &PersistentStore, persistent_params: &[String]) {
    let raw = store.load_raw();
    for name in persistent_params {
        let Some(json_val) = raw.get(name) else { continue };
        let Some(decl) = module.class().parameter(name) else { continue };
        match decl.datatype.import_value(json_val) {
            Ok(value) => module.queue_write(name, value),
            Err(e) => {
                tracing::warn!(parameter = %name, error = %e, "dropping invalid persisted value");
            }
        }
    }
}

/// Save every persistent parameter's current value, unless the write
/// queue still has pending entries — saving mid-write-storm would
/// capture a half-applied configuration, so it's simply skipped until
/// the queue drains on its own.
pub fn save_parameters(module: &Module, store: &PersistentStore, persistent_params: &[String]) -> io::Result<()> {
    if !module.write_dict_is_empty() {
        return Ok(());
    }
    let mut data = IndexMap::new();
    for name in persistent_params {
        let Some(decl) = module.class().parameter(name) else { continue };
        let Some(value) = module.current_value(name) else { continue };
        data.insert(name.clone(), decl.datatype.export_value(&value));
    }
    store.atomic_save(&data)
}

/// `factory_reset`: re-queue the captured factory defaults as pending
/// writes, the same mechanism startup uses for configured/persisted
/// values, so the usual write handlers apply them to hardware.
pub fn factory_reset(module: &Module, defaults: &FactoryDefaults, persistent_params: &[String]) {
    for name in persistent_params {
        if let Some(value) = defaults.get(name) {
            module.queue_write(name, value.clone());
        }
    }
}

/// Register the value-callback `PersistentMode::Auto` implies: every
/// successful update of `parameter` immediately triggers a save of the
/// whole `persistent_params` set. This is the one documented case of
/// auto-persistence being wired through the ordinary callback registry
/// (component C) rather than a bespoke code path — `save_parameters`
/// itself stays a no-op while writes are still pending, so a storm of
/// updates during startup doesn't thrash the file.
pub fn wire_autosave(module: &Arc<Module>, parameter: &str, store: Arc<PersistentStore>, persistent_params: Arc<Vec<String>>) {
    let target = Arc::clone(module);
    module.callbacks().on_value(
        parameter,
        Box::new(move |_value| {
            if let Err(e) = save_parameters(&target, &store, &persistent_params) {
                tracing::warn!(path = %store.path().display(), error = %e, "auto-persistence save failed");
            }
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessible::ParameterDecl;
    use crate::module_class::{merge_class, ClassLevel};
    use frappy_datatypes::{Datatype, FloatRange};
    use std::sync::Arc;

    fn build_module() -> Module {
        let level = ClassLevel {
            parameters: vec![
                ParameterDecl::new("ramp", Datatype::FloatRange(FloatRange::default()))
                    .writable()
                    .with_default(Value::Double(1.0)),
            ],
            ..Default::default()
        };
        Module::new("th", Arc::new(merge_class(&[level]).unwrap()))
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::new(dir.path().join("nope.json"));
        assert!(store.load_raw().is_empty());
    }

    #[test]
    fn invalid_persisted_value_is_dropped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        fs::write(&path, r#"{"ramp": "not-a-number"}"#).unwrap();
        let store = PersistentStore::new(path);
        let module = build_module();
        load_parameters(&module, &store, &["ramp".to_string()]);
        assert!(!module.has_queued_write("ramp"));
    }

    #[test]
    fn valid_persisted_value_is_queued() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        fs::write(&path, r#"{"ramp": 2.5}"#).unwrap();
        let store = PersistentStore::new(path);
        let module = build_module();
        load_parameters(&module, &store, &["ramp".to_string()]);
        assert_eq!(module.take_queued_write("ramp"), Some(Value::Double(2.5)));
    }

    #[test]
    fn save_is_skipped_while_write_queue_nonempty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        let store = PersistentStore::new(&path);
        let module = build_module();
        module.queue_write("ramp", Value::Double(9.0));
        save_parameters(&module, &store, &["ramp".to_string()]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn factory_reset_requeues_captured_defaults() {
        let module = build_module();
        let defaults = FactoryDefaults::capture(&module, &["ramp".to_string()]);
        module.announce_update("ramp", Value::Double(42.0), 0.0);
        factory_reset(&module, &defaults, &["ramp".to_string()]);
        assert_eq!(module.take_queued_write("ramp"), Some(Value::Double(1.0)));
    }

    #[test]
    fn auto_mode_saves_on_every_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        let module = Arc::new(build_module());
        let store = Arc::new(PersistentStore::new(&path));
        let params = Arc::new(vec!["ramp".to_string()]);
        wire_autosave(&module, "ramp", Arc::clone(&store), Arc::clone(&params));

        module.announce_update("ramp", Value::Double(7.5), 0.0);

        let saved = store.load_raw();
        assert_eq!(saved.get("ramp"), Some(&serde_json::json!(7.5)));
    }
}
