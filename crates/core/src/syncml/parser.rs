//! Parser (C4): lifts a decoded element tree (from XML or WBXML) into the
//! typed [`SyncMLMessage`] model.

use super::model::{Cred, Meta, MetaKey, SyncMLCommand, SyncMLHeader, SyncMLItem, SyncMLMessage};
use crate::wbxml::{self, Element};
use crate::Error;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Parse a SyncML message from raw bytes, auto-detecting WBXML vs XML.
///
/// Format detection: a `Content-Type` ending in `wbxml`, or a first byte of
/// `0x02`/`0x03` (a WBXML version byte), selects the binary codec;
/// otherwise the body is parsed as XML.
pub fn parse(data: &[u8], content_type: &str) -> crate::Result<SyncMLMessage> {
    let root = if content_type.ends_with("wbxml") || matches!(data.first(), Some(0x02) | Some(0x03))
    {
        wbxml::decode(data)?
    } else {
        xml_to_element(data)?
    };

    Ok(parse_syncml(&root))
}

fn xml_to_element(data: &[u8]) -> crate::Result<Element> {
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                stack.push(Element::new(name));
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let elem = Element::new(name);
                push_completed(&mut stack, &mut root, elem);
            }
            Event::Text(t) => {
                let text = t.unescape()?.into_owned();
                if let Some(top) = stack.last_mut() {
                    if !text.trim().is_empty() {
                        top.text = Some(text);
                    }
                }
            }
            Event::End(_) => {
                let elem = stack
                    .pop()
                    .ok_or_else(|| Error::ParseError("unbalanced XML element".into()))?;
                push_completed(&mut stack, &mut root, elem);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    root.ok_or_else(|| Error::ParseError("empty XML document".into()))
}

fn push_completed(stack: &mut Vec<Element>, root: &mut Option<Element>, elem: Element) {
    if let Some(parent) = stack.last_mut() {
        parent.push(elem);
    } else {
        *root = Some(elem);
    }
}

fn parse_syncml(root: &Element) -> SyncMLMessage {
    let mut msg = SyncMLMessage::default();

    if let Some(hdr) = find_nested(root, "SyncHdr") {
        msg.header = parse_header(hdr);
    }

    if let Some(body) = find_nested(root, "SyncBody") {
        msg.commands = body
            .children
            .iter()
            .filter(|c| c.tag != "Final")
            .map(parse_command)
            .collect();
        msg.is_final = body.find("Final").is_some();
    }

    msg
}

/// `root.find()` only looks at direct children; SyncHdr/SyncBody are direct
/// children of SyncML in every message we produce or accept, but mirror the
/// original's depth-first `.//` search in case a client wraps the document.
fn find_nested<'a>(root: &'a Element, tag: &str) -> Option<&'a Element> {
    if let Some(found) = root.find(tag) {
        return Some(found);
    }
    root.children.iter().find_map(|c| find_nested(c, tag))
}

fn parse_header(hdr: &Element) -> SyncMLHeader {
    let mut header = SyncMLHeader {
        ver_dtd: hdr.child_text("VerDTD").unwrap_or_else(|| "1.2".to_string()),
        ver_proto: hdr
            .child_text("VerProto")
            .unwrap_or_else(|| "DM/1.2".to_string()),
        session_id: hdr.child_text("SessionID").unwrap_or_default(),
        msg_id: hdr.child_text("MsgID").unwrap_or_default(),
        ..Default::default()
    };

    if let Some(target) = hdr.find("Target") {
        header.target = target.child_text("LocURI").unwrap_or_default();
    }
    if let Some(source) = hdr.find("Source") {
        header.source = source.child_text("LocURI").unwrap_or_default();
    }

    if let Some(cred) = hdr.find("Cred") {
        let mut c = Cred::default();
        if let Some(meta) = cred.find("Meta") {
            c.cred_type = meta.child_text("Type");
            c.format = meta.child_text("Format");
        }
        c.data = cred.child_text("Data");
        header.cred = Some(c);
    }

    if let Some(meta) = hdr.find("Meta") {
        header.meta = parse_meta(meta);
    }

    header
}

fn parse_meta(meta: &Element) -> Meta {
    let mut result = Meta::new();
    for child in &meta.children {
        if let Some(text) = &child.text {
            result.insert(MetaKey::parse(&child.tag), text.clone());
        }
    }
    result
}

fn parse_command(elem: &Element) -> SyncMLCommand {
    let mut cmd = SyncMLCommand::new(super::model::CommandKind::from_tag(&elem.tag));
    cmd.cmd_id = elem.child_text("CmdID").unwrap_or_default();
    cmd.msg_ref = elem.child_text("MsgRef");
    cmd.cmd_ref = elem.child_text("CmdRef");
    cmd.cmd = elem.child_text("Cmd");
    cmd.target_ref = elem.child_text("TargetRef");
    cmd.source_ref = elem.child_text("SourceRef");
    cmd.data = elem.child_text("Data");
    cmd.no_resp = elem.find("NoResp").is_some();
    cmd.items = elem.find_all("Item").map(parse_item).collect();
    if let Some(meta) = elem.find("Meta") {
        cmd.meta = parse_meta(meta);
    }
    cmd
}

fn parse_item(elem: &Element) -> SyncMLItem {
    let mut item = SyncMLItem::default();
    if let Some(target) = elem.find("Target") {
        item.target = target.child_text("LocURI");
    }
    if let Some(source) = elem.find("Source") {
        item.source = source.child_text("LocURI");
    }
    item.data = elem.child_text("Data");
    if let Some(meta) = elem.find("Meta") {
        item.meta = parse_meta(meta);
    }
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn parses_client_init_message() {
        let xml = indoc! {r#"
            <SyncML>
              <SyncHdr>
                <VerDTD>1.2</VerDTD>
                <VerProto>DM/1.2</VerProto>
                <SessionID>42</SessionID>
                <MsgID>1</MsgID>
                <Target><LocURI>SERVER-ID</LocURI></Target>
                <Source><LocURI>DEV-A</LocURI></Source>
              </SyncHdr>
              <SyncBody>
                <Alert>
                  <CmdID>1</CmdID>
                  <Data>1201</Data>
                </Alert>
                <Final/>
              </SyncBody>
            </SyncML>
        "#};

        let msg = parse(xml.as_bytes(), "application/vnd.syncml.dm+xml").unwrap();
        assert_eq!(msg.header.session_id, "42");
        assert_eq!(msg.header.msg_id, "1");
        assert_eq!(msg.header.source, "DEV-A");
        assert!(msg.is_final);
        assert_eq!(msg.commands.len(), 1);
        assert_eq!(msg.commands[0].name(), "Alert");
        assert_eq!(msg.commands[0].data.as_deref(), Some("1201"));
    }

    #[test]
    fn parses_results_with_items() {
        let xml = indoc! {r#"
            <SyncML>
              <SyncHdr>
                <SessionID>42</SessionID>
                <MsgID>2</MsgID>
                <Target><LocURI>SERVER-ID</LocURI></Target>
                <Source><LocURI>DEV-A</LocURI></Source>
              </SyncHdr>
              <SyncBody>
                <Results>
                  <CmdID>1</CmdID>
                  <CmdRef>3</CmdRef>
                  <Item>
                    <Source><LocURI>./Software/Build</LocURI></Source>
                    <Data>Nova-3.0.5-64</Data>
                  </Item>
                </Results>
                <Final/>
              </SyncBody>
            </SyncML>
        "#};

        let msg = parse(xml.as_bytes(), "application/vnd.syncml.dm+xml").unwrap();
        let results = msg.command("Results").unwrap();
        assert_eq!(results.cmd_ref.as_deref(), Some("3"));
        assert_eq!(results.items.len(), 1);
        assert_eq!(results.items[0].source.as_deref(), Some("./Software/Build"));
        assert_eq!(results.items[0].data.as_deref(), Some("Nova-3.0.5-64"));
    }

    #[test]
    fn ignores_unrecognized_children_without_failing() {
        let xml = indoc! {r#"
            <SyncML>
              <SyncHdr>
                <SessionID>1</SessionID>
                <MsgID>1</MsgID>
              </SyncHdr>
              <SyncBody>
                <Alert><CmdID>1</CmdID><Data>1201</Data><Correlator>x</Correlator></Alert>
                <Final/>
              </SyncBody>
            </SyncML>
        "#};

        let msg = parse(xml.as_bytes(), "application/vnd.syncml.dm+xml").unwrap();
        assert_eq!(msg.commands.len(), 1);
    }
}
