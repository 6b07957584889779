//! Typed SyncML message model: the header/command/item structures the
//! parser lifts an element tree into, and the builder lowers back down.

/// A recognized `Meta` key, with an escape hatch for anything the protocol
/// doesn't name explicitly. Kept as an enum (rather than a bare string) so
/// callers match on the keys they care about; `Meta` itself preserves
/// insertion order for deterministic re-emission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetaKey {
    NextNonce,
    MaxMsgSize,
    MaxObjSize,
    Type,
    Format,
    Size,
    Mark,
    Anchor,
    Version,
    Other(String),
}

impl MetaKey {
    pub fn as_str(&self) -> &str {
        match self {
            MetaKey::NextNonce => "NextNonce",
            MetaKey::MaxMsgSize => "MaxMsgSize",
            MetaKey::MaxObjSize => "MaxObjSize",
            MetaKey::Type => "Type",
            MetaKey::Format => "Format",
            MetaKey::Size => "Size",
            MetaKey::Mark => "Mark",
            MetaKey::Anchor => "Anchor",
            MetaKey::Version => "Version",
            MetaKey::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "NextNonce" => MetaKey::NextNonce,
            "MaxMsgSize" => MetaKey::MaxMsgSize,
            "MaxObjSize" => MetaKey::MaxObjSize,
            "Type" => MetaKey::Type,
            "Format" => MetaKey::Format,
            "Size" => MetaKey::Size,
            "Mark" => MetaKey::Mark,
            "Anchor" => MetaKey::Anchor,
            "Version" => MetaKey::Version,
            other => MetaKey::Other(other.to_string()),
        }
    }
}

/// An insertion-ordered `key -> text` map for `Meta` elements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Meta(pub Vec<(MetaKey, String)>);

impl Meta {
    pub fn new() -> Self {
        Meta(Vec::new())
    }

    pub fn get(&self, key: &MetaKey) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn insert(&mut self, key: MetaKey, value: impl Into<String>) {
        let value = value.into();
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `SyncHdr/Cred`: authentication credentials presented by the sender.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cred {
    pub cred_type: Option<String>,
    pub format: Option<String>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncMLHeader {
    pub ver_dtd: String,
    pub ver_proto: String,
    pub session_id: String,
    pub msg_id: String,
    pub target: String,
    pub source: String,
    pub cred: Option<Cred>,
    pub meta: Meta,
}

impl SyncMLHeader {
    pub fn new() -> Self {
        SyncMLHeader {
            ver_dtd: "1.2".to_string(),
            ver_proto: "DM/1.2".to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncMLItem {
    pub target: Option<String>,
    pub source: Option<String>,
    pub data: Option<String>,
    pub meta: Meta,
}

/// Tagged union over the command names the dispatcher understands in full.
/// Anything outside this set is still parsed generically (see
/// [`SyncMLCommand`]) and acknowledged with `Status 200`, per the
/// server's handling of map/copy/delete/atomic/sequence/search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Alert,
    Get,
    Put,
    Replace,
    Results,
    Status,
    Exec,
    Add,
    Delete,
    Sync,
    Map,
    Copy,
    Atomic,
    Sequence,
    Search,
    Unrecognized(String),
}

impl CommandKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Alert" => CommandKind::Alert,
            "Get" => CommandKind::Get,
            "Put" => CommandKind::Put,
            "Replace" => CommandKind::Replace,
            "Results" => CommandKind::Results,
            "Status" => CommandKind::Status,
            "Exec" => CommandKind::Exec,
            "Add" => CommandKind::Add,
            "Delete" => CommandKind::Delete,
            "Sync" => CommandKind::Sync,
            "Map" => CommandKind::Map,
            "Copy" => CommandKind::Copy,
            "Atomic" => CommandKind::Atomic,
            "Sequence" => CommandKind::Sequence,
            "Search" => CommandKind::Search,
            other => CommandKind::Unrecognized(other.to_string()),
        }
    }

    /// The wire tag name for this kind, e.g. for logging or re-emission.
    pub fn name(&self) -> &str {
        match self {
            CommandKind::Alert => "Alert",
            CommandKind::Get => "Get",
            CommandKind::Put => "Put",
            CommandKind::Replace => "Replace",
            CommandKind::Results => "Results",
            CommandKind::Status => "Status",
            CommandKind::Exec => "Exec",
            CommandKind::Add => "Add",
            CommandKind::Delete => "Delete",
            CommandKind::Sync => "Sync",
            CommandKind::Map => "Map",
            CommandKind::Copy => "Copy",
            CommandKind::Atomic => "Atomic",
            CommandKind::Sequence => "Sequence",
            CommandKind::Search => "Search",
            CommandKind::Unrecognized(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMLCommand {
    pub kind: CommandKind,
    pub cmd_id: String,
    pub msg_ref: Option<String>,
    pub cmd_ref: Option<String>,
    /// For `Status`: the name of the command being statused.
    pub cmd: Option<String>,
    pub target_ref: Option<String>,
    pub source_ref: Option<String>,
    pub data: Option<String>,
    pub items: Vec<SyncMLItem>,
    pub meta: Meta,
    pub no_resp: bool,
}

impl SyncMLCommand {
    pub fn new(kind: CommandKind) -> Self {
        SyncMLCommand {
            kind,
            cmd_id: String::new(),
            msg_ref: None,
            cmd_ref: None,
            cmd: None,
            target_ref: None,
            source_ref: None,
            data: None,
            items: Vec::new(),
            meta: Meta::new(),
            no_resp: false,
        }
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncMLMessage {
    pub header: SyncMLHeader,
    pub commands: Vec<SyncMLCommand>,
    pub is_final: bool,
}

impl SyncMLMessage {
    pub fn command(&self, name: &str) -> Option<&SyncMLCommand> {
        self.commands.iter().find(|c| c.name() == name)
    }
}
