//! The SECoP wire codec (parsing requests, formatting replies) and the
//! dispatcher that routes them to modules and fans out asynchronous
//! updates to subscribed connections.

pub mod dispatcher;
pub mod error_mapping;
pub mod message;
pub mod registry;

pub use dispatcher::{ConnId, Dispatcher, HandlerTables};
pub use error_mapping::wire_kind;
pub use message::{parse_request, Request, IDN_REPLY};
pub use registry::{validate_handler_tables, ModuleRegistry, NodeInfo};
