//! The construction-time seam between a concrete module type and the
//! generic node runtime: one [`ModuleFactory`] per class name a node
//! descriptor can name, handing back a [`BuiltModule`] the runtime
//! wires into the scheduler (component E) and dispatcher (component G)
//! without either of those crates needing to know the concrete type.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ConfigMap;
use crate::error::SecopResult;
use crate::handlers::{CommandHandler, CommonReadHandler, CommonWriteHandler};
use crate::module::Module;
use crate::node_ctx::NodeHandle;

/// Everything one constructed module instance hands back to the node
/// runtime: the module itself, plus the read/write/command handler
/// wiring the scheduler and dispatcher need. Kept here, not in either
/// of those crates, so a concrete module type depends only on
/// `frappy-core` and `frappy-datatypes`.
pub struct BuiltModule {
    pub module: Arc<Module>,
    pub reads: Vec<CommonReadHandler>,
    pub writes: Vec<Arc<CommonWriteHandler>>,
    pub commands: Vec<CommandHandler>,
    pub pollinterval: Duration,
    pub slowinterval_multiple: u32,
}

impl BuiltModule {
    #[must_use]
    pub fn new(module: Arc<Module>) -> Self {
        BuiltModule {
            module,
            reads: Vec::new(),
            writes: Vec::new(),
            commands: Vec::new(),
            pollinterval: Duration::from_secs(1),
            slowinterval_multiple: 4,
        }
    }

    #[must_use]
    pub fn with_reads(mut self, reads: Vec<CommonReadHandler>) -> Self {
        self.reads = reads;
        self
    }

    #[must_use]
    pub fn with_writes(mut self, writes: Vec<Arc<CommonWriteHandler>>) -> Self {
        self.writes = writes;
        self
    }

    #[must_use]
    pub fn with_commands(mut self, commands: Vec<CommandHandler>) -> Self {
        self.commands = commands;
        self
    }

    #[must_use]
    pub fn with_pollinterval(mut self, pollinterval: Duration) -> Self {
        self.pollinterval = pollinterval;
        self
    }

    #[must_use]
    pub fn with_slowinterval_multiple(mut self, multiple: u32) -> Self {
        self.slowinterval_multiple = multiple;
        self
    }
}

/// A static registration stand-in for dynamic module-class lookup by
/// dotted import path (`self.moduleCls = ...`): one factory per
/// concrete module type, registered under the `class` string a node
/// descriptor names. `node` is a handle a factory hands straight to
/// `Module::with_node` during construction; by the time any handler
/// actually runs, the real dispatcher is bound behind it.
pub trait ModuleFactory: Send + Sync {
    /// The `class` string a `[modules.*]` section must name to select
    /// this factory.
    fn class_name(&self) -> &'static str;

    /// Build one instance named `name` from its configuration slice.
    /// An unknown key in `config` that this factory doesn't recognise
    /// is a construction error, not a silent ignore.
    fn build(&self, name: &str, config: &ConfigMap, node: Arc<dyn NodeHandle>) -> SecopResult<BuiltModule>;
}
