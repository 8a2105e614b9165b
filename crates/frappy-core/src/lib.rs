//! The module metamodel and runtime: declarative parameter/command
//! descriptors, class-build-time merging across an ancestor chain, the
//! per-instance module runtime with its parameter cache and deferred
//! write queue, the cooperative state-machine driver, grouped handler
//! decorators, and best-effort on-disk persistence.

pub mod accessible;
pub mod callbacks;
pub mod config;
pub mod error;
pub mod handlers;
pub mod module;
pub mod module_class;
pub mod module_factory;
pub mod node_ctx;
pub mod param_cell;
pub mod persistence;
pub mod statemachine;

pub use frappy_datatypes::status;

pub use accessible::{CommandDecl, ParameterDecl, PollPriority, PropertyBag, Visibility};
pub use callbacks::{register_callbacks, CallbackRegistry, ErrorCallback, UpdateHandlers, ValueCallback};
pub use config::{ConfigMap, ConfigValue};
pub use error::{SecopError, SecopResult};
pub use handlers::{CommandFn, CommandHandler, CommonReadHandler, CommonWriteHandler, ReadFn, WriteFn, WriteParameters};
pub use module::Module;
pub use module_class::{merge_class, validate_module_class, ClassLevel, MergedClass, ParameterOverride};
pub use module_factory::{BuiltModule, ModuleFactory};
pub use node_ctx::{NodeHandle, NullNodeHandle};
pub use param_cell::{now, ParamCell};
pub use persistence::{wire_autosave, FactoryDefaults, PersistentMode, PersistentStore};
pub use statemachine::{CleanupReason, StateFn, StateMachine, StateResult};
