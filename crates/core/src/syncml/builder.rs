//! Builder (C5): assembles response commands as element trees and
//! serializes them to XML or WBXML.

use crate::wbxml::{self, Element};
use crate::Error;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;

/// A single `Item` to attach to a command being built.
#[derive(Debug, Clone, Default)]
pub struct ItemSpec {
    pub target: Option<String>,
    pub source: Option<String>,
    pub data: Option<String>,
    pub meta: Vec<(String, String)>,
}

impl ItemSpec {
    pub fn target(target: impl Into<String>, data: impl Into<String>) -> Self {
        ItemSpec {
            target: Some(target.into()),
            data: Some(data.into()),
            ..Default::default()
        }
    }

    pub fn source(source: impl Into<String>, data: impl Into<String>) -> Self {
        ItemSpec {
            source: Some(source.into()),
            data: Some(data.into()),
            ..Default::default()
        }
    }

    fn into_element(self) -> Element {
        let mut item = Element::new("Item");
        if let Some(target) = self.target {
            item.push(Element::new("Target").child(Element::with_text("LocURI", target)));
        }
        if let Some(source) = self.source {
            item.push(Element::new("Source").child(Element::with_text("LocURI", source)));
        }
        if !self.meta.is_empty() {
            let mut meta_elem = Element::new("Meta");
            for (k, v) in self.meta {
                meta_elem.push(Element::with_text(k, v));
            }
            item.push(meta_elem);
        }
        if let Some(data) = self.data {
            item.push(Element::with_text("Data", data));
        }
        item
    }
}

/// Builds a single response message. A fresh instance is used per request;
/// the `CmdID` counter resets whenever [`ResponseBuilder::build_response`]
/// assembles the final message, so commands built earlier in the request
/// (e.g. a `Get` queued by an `Alert` handler) are only numbered once they
/// are placed into the response in their final order.
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    cmd_id_counter: u32,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        ResponseBuilder { cmd_id_counter: 0 }
    }

    fn next_cmd_id(&mut self) -> u32 {
        self.cmd_id_counter += 1;
        self.cmd_id_counter
    }

    /// Build a `Status` element, without a `CmdID` (assigned by
    /// `build_response`).
    #[allow(clippy::too_many_arguments)]
    pub fn build_status(
        &self,
        msg_ref: &str,
        cmd_ref: &str,
        cmd: &str,
        status_code: u32,
        target_ref: Option<&str>,
        source_ref: Option<&str>,
    ) -> Element {
        let mut elem = Element::new("Status");
        elem.push(Element::with_text("MsgRef", msg_ref));
        elem.push(Element::with_text("CmdRef", cmd_ref));
        elem.push(Element::with_text("Cmd", cmd));
        elem.push(Element::with_text("Data", status_code.to_string()));
        if let Some(t) = target_ref {
            elem.push(Element::with_text("TargetRef", t));
        }
        if let Some(s) = source_ref {
            elem.push(Element::with_text("SourceRef", s));
        }
        elem
    }

    pub fn build_get(&self, targets: &[&str]) -> Element {
        let mut elem = Element::new("Get");
        for target in targets {
            elem.push(
                Element::new("Item")
                    .child(Element::new("Target").child(Element::with_text("LocURI", *target))),
            );
        }
        elem
    }

    pub fn build_replace(&self, items: Vec<ItemSpec>) -> Element {
        let mut elem = Element::new("Replace");
        for item in items {
            elem.push(item.into_element());
        }
        elem
    }

    pub fn build_add(&self, items: Vec<ItemSpec>) -> Element {
        let mut elem = Element::new("Add");
        for item in items {
            elem.push(item.into_element());
        }
        elem
    }

    pub fn build_exec(&self, target: &str, data: Option<&str>) -> Element {
        let mut item = Element::new("Item")
            .child(Element::new("Target").child(Element::with_text("LocURI", target)));
        if let Some(data) = data {
            item.push(Element::with_text("Data", data));
        }
        Element::new("Exec").child(item)
    }

    pub fn build_alert(&self, alert_code: u32, items: Vec<ItemSpec>) -> Element {
        let mut elem = Element::new("Alert");
        elem.push(Element::with_text("Data", alert_code.to_string()));
        for item in items {
            elem.push(item.into_element());
        }
        elem
    }

    pub fn build_results(&self, msg_ref: &str, cmd_ref: &str, items: Vec<ItemSpec>) -> Element {
        let mut elem = Element::new("Results");
        elem.push(Element::with_text("MsgRef", msg_ref));
        elem.push(Element::with_text("CmdRef", cmd_ref));
        for item in items {
            elem.push(item.into_element());
        }
        elem
    }

    fn assign_cmd_id(&mut self, mut elem: Element) -> Element {
        let id = self.next_cmd_id();
        elem.children.insert(0, Element::with_text("CmdID", id.to_string()));
        elem
    }

    /// Assemble the complete response: reset the `CmdID` counter, number
    /// `statuses` first (in the order their referenced commands arrived),
    /// then `commands` (in emission order), and close with `Final`.
    #[allow(clippy::too_many_arguments)]
    pub fn build_response(
        &mut self,
        session_id: &str,
        msg_id: &str,
        target: &str,
        source: &str,
        statuses: Vec<Element>,
        commands: Vec<Element>,
        is_final: bool,
    ) -> Element {
        self.cmd_id_counter = 0;

        let mut sync_hdr = Element::new("SyncHdr");
        sync_hdr.push(Element::with_text("VerDTD", "1.2"));
        sync_hdr.push(Element::with_text("VerProto", "DM/1.2"));
        sync_hdr.push(Element::with_text("SessionID", session_id));
        sync_hdr.push(Element::with_text("MsgID", msg_id));
        sync_hdr.push(Element::new("Target").child(Element::with_text("LocURI", target)));
        sync_hdr.push(Element::new("Source").child(Element::with_text("LocURI", source)));

        let mut sync_body = Element::new("SyncBody");
        for status in statuses {
            let status = self.assign_cmd_id(status);
            sync_body.push(status);
        }
        for command in commands {
            let command = self.assign_cmd_id(command);
            sync_body.push(command);
        }
        if is_final {
            sync_body.push(Element::new("Final"));
        }

        Element::new("SyncML").child(sync_hdr).child(sync_body)
    }
}

/// Serialize an element tree to WBXML via the codec (C2).
pub fn to_wbxml(root: &Element) -> Vec<u8> {
    wbxml::encode(root)
}

/// Serialize an element tree to a UTF-8 XML document with declaration.
pub fn to_xml(root: &Element) -> crate::Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(Error::from)?;
    write_element(&mut writer, root)?;
    Ok(writer.into_inner())
}

fn write_element(writer: &mut Writer<Vec<u8>>, elem: &Element) -> crate::Result<()> {
    let start = BytesStart::new(elem.tag.as_str());
    writer.write_event(Event::Start(start)).map_err(Error::from)?;

    if let Some(text) = &elem.text {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(Error::from)?;
    }
    for child in &elem.children {
        write_element(writer, child)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(elem.tag.as_str())))
        .map_err(Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd_ids_are_assigned_in_assembly_order() {
        let mut builder = ResponseBuilder::new();
        let status = builder.build_status("1", "0", "SyncHdr", 212, None, None);
        let get = builder.build_get(&["./DevInfo/DevId"]);

        let response = builder.build_response("42", "1", "DEV-A", "SERVER-ID", vec![status], vec![get], true);

        let body = response.find("SyncBody").unwrap();
        let status_elem = &body.children[0];
        let get_elem = &body.children[1];
        assert_eq!(status_elem.child_text("CmdID"), Some("1".to_string()));
        assert_eq!(get_elem.child_text("CmdID"), Some("2".to_string()));
        assert!(body.find("Final").is_some());
    }

    #[test]
    fn xml_round_trips_through_wbxml() {
        let mut builder = ResponseBuilder::new();
        let status = builder.build_status("1", "0", "SyncHdr", 212, Some("SERVER-ID"), Some("DEV-A"));
        let response = builder.build_response("42", "1", "DEV-A", "SERVER-ID", vec![status], vec![], true);

        let wbxml_bytes = to_wbxml(&response);
        let decoded = wbxml::decode(&wbxml_bytes).unwrap();
        assert_eq!(decoded, response);
    }
}
