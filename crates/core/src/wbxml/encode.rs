use super::element::Element;
use super::tokens::*;
use cookie_factory::{bytes::be_u8, combinator::slice, sequence::tuple, gen_simple, SerializeFn};
use std::collections::HashMap;
use std::io::Write;

fn mb_uint32_bytes(value: u32) -> Vec<u8> {
    let mut septets = vec![(value & 0x7F) as u8];
    let mut v = value >> 7;
    while v > 0 {
        septets.push((v & 0x7F) as u8 | 0x80);
        v >>= 7;
    }
    septets.reverse();
    septets
}

#[cfg(test)]
pub(crate) fn test_mb_uint32(value: u32) -> Vec<u8> {
    mb_uint32_bytes(value)
}

/// Tracks which literal tag names (those absent from both code page tables)
/// have already been interned, and at what byte offset.
struct StringTable {
    bytes: Vec<u8>,
    offsets: HashMap<String, usize>,
}

impl StringTable {
    fn new() -> Self {
        StringTable {
            bytes: Vec::new(),
            offsets: HashMap::new(),
        }
    }

    fn intern(&mut self, s: &str) -> usize {
        if let Some(&offset) = self.offsets.get(s) {
            return offset;
        }
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(s.to_string(), offset);
        offset
    }
}

struct Encoder {
    current_page: u8,
    table: StringTable,
    out: Vec<u8>,
}

impl Encoder {
    fn switch_page(&mut self, page: u8) {
        if page != self.current_page {
            self.out.push(SWITCH_PAGE);
            self.out.push(page);
            self.current_page = page;
        }
    }

    fn encode_element(&mut self, elem: &Element) {
        let has_content = elem.has_content();

        if let Some(&code) = page_tags_rev(PAGE_METINF).get(elem.tag.as_str()) {
            if page_tags_rev(PAGE_SYNCML).get(elem.tag.as_str()).is_none() {
                self.switch_page(PAGE_METINF);
                self.write_known_tag(code, has_content);
                self.encode_content(elem);
                return;
            }
        }

        if let Some(&code) = page_tags_rev(self.current_page).get(elem.tag.as_str()) {
            self.write_known_tag(code, has_content);
            self.encode_content(elem);
            return;
        }

        if let Some(&code) = page_tags_rev(PAGE_SYNCML).get(elem.tag.as_str()) {
            self.switch_page(PAGE_SYNCML);
            self.write_known_tag(code, has_content);
            self.encode_content(elem);
            return;
        }

        // Unknown tag: fall back to a LITERAL reference into the string table.
        let token = LITERAL | if has_content { TAG_HAS_CONTENT } else { 0 };
        self.out.push(token);
        let offset = self.table.intern(&elem.tag);
        self.out.extend_from_slice(&mb_uint32_bytes(offset as u32));
        self.encode_content(elem);
    }

    fn write_known_tag(&mut self, code: u8, has_content: bool) {
        let token = code | if has_content { TAG_HAS_CONTENT } else { 0 };
        self.out.push(token);
    }

    fn encode_content(&mut self, elem: &Element) {
        if !elem.has_content() {
            return;
        }
        if let Some(text) = &elem.text {
            self.out.push(STR_I);
            self.out.extend_from_slice(text.as_bytes());
            self.out.push(0);
        }
        for child in &elem.children {
            self.encode_element(child);
        }
        self.out.push(END);
    }
}

/// Encode an element tree into a complete WBXML document: version 1.3,
/// the SyncML 1.2 public identifier, UTF-8 charset, and a string table
/// holding any literal tag names.
pub fn encode(root: &Element) -> Vec<u8> {
    let mut encoder = Encoder {
        current_page: PAGE_SYNCML,
        table: StringTable::new(),
        out: Vec::new(),
    };
    encoder.encode_element(root);

    let body = encoder.out;
    let string_table = encoder.table.bytes;

    let version = [0x03u8];
    let public_id = mb_uint32_bytes(SYNCML_1_2_PUBLIC_ID);
    let charset = mb_uint32_bytes(106); // UTF-8
    let str_table_len = mb_uint32_bytes(string_table.len() as u32);

    let writer = tuple((
        slice(version),
        slice(public_id.as_slice()),
        slice(charset.as_slice()),
        slice(str_table_len.as_slice()),
        slice(string_table.as_slice()),
        slice(body.as_slice()),
    ));

    gen_simple(writer, Vec::new()).expect("writing to a Vec<u8> cannot fail")
}

/// Writes a single byte using cookie-factory's primitive combinator; kept
/// around for callers that build up a frame incrementally rather than via
/// `encode`.
pub(crate) fn write_byte<W: Write>(b: u8) -> impl SerializeFn<W> {
    be_u8(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mb_uint32_matches_spec_examples() {
        assert_eq!(mb_uint32_bytes(0), vec![0x00]);
        assert_eq!(mb_uint32_bytes(127), vec![0x7F]);
        assert_eq!(mb_uint32_bytes(128), vec![0x81, 0x00]);
        assert_eq!(mb_uint32_bytes(16384), vec![0x81, 0x80, 0x00]);
    }

    #[test]
    fn encodes_empty_syncml_element() {
        let elem = Element::new("SyncML");
        let bytes = encode(&elem);
        assert_eq!(bytes, vec![0x03, 0xA4, 0x01, 0x6A, 0x00, 0x2D]);
    }

    #[test]
    fn round_trips_through_decode() {
        let tree = Element::new("SyncML").child(
            Element::new("SyncHdr")
                .child(Element::with_text("VerDTD", "1.2"))
                .child(Element::with_text("SessionID", "1")),
        );
        let bytes = encode(&tree);
        let decoded = super::super::decode::decode(&bytes).unwrap();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn unknown_tag_round_trips_via_literal() {
        let tree = Element::new("SyncML").child(Element::with_text("XCustomVendorTag", "v"));
        let bytes = encode(&tree);
        let decoded = super::super::decode::decode(&bytes).unwrap();
        assert_eq!(decoded, tree);
    }
}
