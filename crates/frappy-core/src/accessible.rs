use frappy_datatypes::Datatype;

/// Visibility hint carried by every accessible, purely advisory for
/// clients building a UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    User = 1,
    Advanced = 2,
    Expert = 3,
}

/// How eagerly the poller should read a parameter. `Auto` is resolved to
/// one of the other three at module-class build time, based on whether
/// the parameter is `value`/`status` and whether it is read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPriority {
    /// Never polled.
    Never,
    /// Resolved to Slow/Dynamic/Regular at declaration time.
    Auto,
    /// Polled with lower priority, a multiple of `pollinterval`.
    Slow,
    /// Polled every `pollinterval`.
    Regular,
    /// `value`/`status`: a fraction of `pollinterval` while busy, else
    /// `pollinterval`.
    Dynamic,
}

/// A declarative parameter descriptor, merged across a module's ancestor
/// chain at class-build time. This is the *class-level* shape; per-instance
/// state (current value, timestamp, error) lives in `ParamCell`.
#[derive(Debug, Clone)]
pub struct ParameterDecl {
    pub name: String,
    pub description: String,
    pub datatype: Datatype,
    pub readonly: bool,
    pub default: Option<frappy_datatypes::Value>,
    pub group: String,
    pub visibility: Visibility,
    pub export: bool,
    pub poll: PollPriority,
    pub needs_config: bool,
    pub initwrite: Option<bool>,
    /// Names of other parameters whose value may change as a side effect
    /// of writing this one (used by clients to decide what to re-read).
    pub influences: Vec<String>,
}

impl ParameterDecl {
    #[must_use]
    pub fn new(name: impl Into<String>, datatype: Datatype) -> Self {
        ParameterDecl {
            name: name.into(),
            description: String::new(),
            datatype,
            readonly: true,
            default: None,
            group: String::new(),
            visibility: Visibility::User,
            export: true,
            poll: PollPriority::Auto,
            needs_config: false,
            initwrite: None,
            influences: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, d: impl Into<String>) -> Self {
        self.description = d.into();
        self
    }

    #[must_use]
    pub fn writable(mut self) -> Self {
        self.readonly = false;
        self
    }

    #[must_use]
    pub fn with_default(mut self, v: frappy_datatypes::Value) -> Self {
        self.default = Some(v);
        self
    }

    #[must_use]
    pub fn with_poll(mut self, p: PollPriority) -> Self {
        self.poll = p;
        self
    }

    #[must_use]
    pub fn nopoll(mut self) -> Self {
        self.poll = PollPriority::Never;
        self
    }

    #[must_use]
    pub fn needing_config(mut self) -> Self {
        self.needs_config = true;
        self
    }

    /// Resolve `Auto` into a concrete priority, following SECoP's
    /// `poll=True` → SLOW/DYNAMIC/REGULAR conversion rule.
    #[must_use]
    pub fn resolved_poll(&self) -> PollPriority {
        match self.poll {
            PollPriority::Auto => {
                if self.name == "value" || self.name == "status" {
                    PollPriority::Dynamic
                } else if !self.readonly {
                    PollPriority::Slow
                } else {
                    PollPriority::Regular
                }
            }
            other => other,
        }
    }
}

/// A declarative command descriptor.
#[derive(Debug, Clone)]
pub struct CommandDecl {
    pub name: String,
    pub description: String,
    pub argument: Option<Datatype>,
    pub result: Option<Datatype>,
    pub group: String,
    pub visibility: Visibility,
    pub export: bool,
}

impl CommandDecl {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        CommandDecl {
            name: name.into(),
            description: String::new(),
            argument: None,
            result: None,
            group: String::new(),
            visibility: Visibility::User,
            export: true,
        }
    }

    #[must_use]
    pub fn with_description(mut self, d: impl Into<String>) -> Self {
        self.description = d.into();
        self
    }

    #[must_use]
    pub fn with_argument(mut self, dt: Datatype) -> Self {
        self.argument = Some(dt);
        self
    }

    #[must_use]
    pub fn with_result(mut self, dt: Datatype) -> Self {
        self.result = Some(dt);
        self
    }
}

/// Typed, class-level metadata on a module (not a parameter): group,
/// description, the interface-class list, and so on. Kept as a simple
/// string map at this layer; concrete modules expose strongly-typed
/// accessors over it.
#[derive(Debug, Clone, Default)]
pub struct PropertyBag(indexmap::IndexMap<String, String>);

impl PropertyBag {
    #[must_use]
    pub fn new() -> Self {
        PropertyBag(indexmap::IndexMap::new())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
