//! Static WBXML token tables for SyncML 1.2 and OMA DM.
//!
//! Based on OMA-TS-SyncML_RepPro-V1_2 and OMA-TS-DM_Protocol-V1_2.

use lazy_static::lazy_static;
use std::collections::HashMap;

/// WBXML global tokens
pub const SWITCH_PAGE: u8 = 0x00;
/// Closes the current element
pub const END: u8 = 0x01;
/// Inline, NUL-terminated UTF-8 string
pub const STR_I: u8 = 0x03;
/// Tag whose name lives in the string table
pub const LITERAL: u8 = 0x04;
/// String table reference
pub const STR_T: u8 = 0x83;
/// Length-prefixed binary payload
pub const OPAQUE: u8 = 0xC3;

/// Set on a tag token when the element has text or child content
pub const TAG_HAS_CONTENT: u8 = 0x40;
/// Set on a tag token when the element carries attributes (never emitted by this codec)
pub const TAG_HAS_ATTRS: u8 = 0x80;

/// Mask to recover the bare tag code from a token byte
pub const TAG_CODE_MASK: u8 = 0x3F;

/// `-//SYNCML//DTD SyncML 1.2//EN`
pub const SYNCML_1_2_PUBLIC_ID: u32 = 0x1201;

/// Code page index for SyncML tags
pub const PAGE_SYNCML: u8 = 0x00;
/// Code page index for MetInf tags
pub const PAGE_METINF: u8 = 0x01;
/// Code page index for DevInf tags (not used on the hot path)
pub const PAGE_DEVINF: u8 = 0x00;

macro_rules! token_table {
    ($name:ident, $rev:ident, { $($code:literal => $tag:literal),+ $(,)? }) => {
        lazy_static! {
            /// token -> tag name
            pub static ref $name: HashMap<u8, &'static str> = {
                let mut m = HashMap::new();
                $(m.insert($code, $tag);)+
                m
            };
            /// tag name -> token, for encoding
            pub static ref $rev: HashMap<&'static str, u8> = {
                let mut m = HashMap::new();
                $(m.insert($tag, $code);)+
                m
            };
        }
    };
}

token_table!(SYNCML_TAGS, SYNCML_TAGS_REV, {
    0x05 => "Add",
    0x06 => "Alert",
    0x07 => "Archive",
    0x08 => "Atomic",
    0x09 => "Chal",
    0x0A => "Cmd",
    0x0B => "CmdID",
    0x0C => "CmdRef",
    0x0D => "Copy",
    0x0E => "Cred",
    0x0F => "Data",
    0x10 => "Delete",
    0x11 => "Exec",
    0x12 => "Final",
    0x13 => "Get",
    0x14 => "Item",
    0x15 => "Lang",
    0x16 => "LocName",
    0x17 => "LocURI",
    0x18 => "Map",
    0x19 => "MapItem",
    0x1A => "Meta",
    0x1B => "MsgID",
    0x1C => "MsgRef",
    0x1D => "NoResp",
    0x1E => "NoResults",
    0x1F => "Put",
    0x20 => "Replace",
    0x21 => "RespURI",
    0x22 => "Results",
    0x23 => "Search",
    0x24 => "Sequence",
    0x25 => "SessionID",
    0x26 => "SftDel",
    0x27 => "Source",
    0x28 => "SourceRef",
    0x29 => "Status",
    0x2A => "Sync",
    0x2B => "SyncBody",
    0x2C => "SyncHdr",
    0x2D => "SyncML",
    0x2E => "Target",
    0x2F => "TargetRef",
    0x30 => "Reserved",
    0x31 => "VerDTD",
    0x32 => "VerProto",
    0x33 => "NumberOfChanges",
    0x34 => "MoreData",
    0x35 => "Field",
    0x36 => "Filter",
    0x37 => "Record",
    0x38 => "FilterType",
    0x39 => "SourceParent",
    0x3A => "TargetParent",
    0x3B => "Move",
    0x3C => "Correlator",
});

token_table!(METINF_TAGS, METINF_TAGS_REV, {
    0x05 => "Anchor",
    0x06 => "EMI",
    0x07 => "Format",
    0x08 => "FreeID",
    0x09 => "FreeMem",
    0x0A => "Last",
    0x0B => "Mark",
    0x0C => "MaxMsgSize",
    0x0D => "Mem",
    0x0E => "MetInf",
    0x0F => "Next",
    0x10 => "NextNonce",
    0x11 => "SharedMem",
    0x12 => "Size",
    0x13 => "Type",
    0x14 => "Version",
    0x15 => "MaxObjSize",
    0x16 => "FieldLevel",
});

// Retained for responses that embed DevInf subtrees; not on the hot path.
token_table!(DEVINF_TAGS, DEVINF_TAGS_REV, {
    0x05 => "CTCap",
    0x06 => "CTType",
    0x07 => "DataStore",
    0x08 => "DataType",
    0x09 => "DevID",
    0x0A => "DevInf",
    0x0B => "DevTyp",
    0x0C => "DisplayName",
    0x0D => "DSMem",
    0x0E => "Ext",
    0x0F => "FwV",
    0x10 => "HwV",
    0x11 => "Man",
    0x12 => "MaxGUIDSize",
    0x13 => "MaxID",
    0x14 => "MaxMem",
    0x15 => "Mod",
    0x16 => "OEM",
    0x17 => "ParamName",
    0x18 => "PropName",
    0x19 => "Rx",
    0x1A => "Rx-Pref",
    0x1B => "SharedMem",
    0x1C => "Size",
    0x1D => "SourceRef",
    0x1E => "SwV",
    0x1F => "SyncCap",
    0x20 => "SyncType",
    0x21 => "Tx",
    0x22 => "Tx-Pref",
    0x23 => "ValEnum",
    0x24 => "VerCT",
    0x25 => "VerDTD",
    0x26 => "XNam",
    0x27 => "XVal",
    0x28 => "UTC",
    0x29 => "SupportNumberOfChanges",
    0x2A => "SupportLargeObjs",
    0x2B => "Property",
    0x2C => "PropParam",
    0x2D => "MaxOccur",
    0x2E => "NoTruncate",
    0x2F => "Filter-Rx",
    0x30 => "FilterCap",
    0x31 => "FilterKeyword",
    0x32 => "FieldLevel",
    0x33 => "SupportHierarchicalSync",
});

/// Look up a tag's forward table for the given code page.
pub fn page_tags(page: u8) -> &'static HashMap<u8, &'static str> {
    match page {
        PAGE_METINF => &METINF_TAGS,
        _ => &SYNCML_TAGS,
    }
}

/// Look up a tag's reverse table for the given code page.
pub fn page_tags_rev(page: u8) -> &'static HashMap<&'static str, u8> {
    match page {
        PAGE_METINF => &METINF_TAGS_REV,
        _ => &SYNCML_TAGS_REV,
    }
}
